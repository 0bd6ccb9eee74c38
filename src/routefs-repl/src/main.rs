//! Interactive driver for a routefs filesystem.
//!
//! Reads one command per line from stdin (or a script file given as the
//! first argument) and applies it to an in-memory filesystem whose file
//! contents live in per-inode byte buffers installed through the route
//! table.  Open handles are kept in small descriptor tables and addressed
//! by number, so scripts can exercise the full open/read/write/close
//! lifecycle.
//!
//! ```text
//! $ routefs-repl
//! > mkdir /tmp 755
//! > create /tmp/hello 644
//! 0
//! > write 0 0 hello world
//! 11
//! > read 0 0 64
//! hello world
//! > close 0
//! > exit
//! ```

use std::io::{self, BufRead, BufReader, Write as _};
use std::sync::{Arc, Mutex};

use routefs::{
    access, chmod, chown, close, closedir, create, deferred_remove, detach_all, fsync, ftrunc,
    getxattr, link, listdir, listxattr, mkdir, mknod, open, opendir, read, readdir, readlink,
    removexattr, rename, rmdir, setxattr, stat, statvfs, symlink, trunc, unlink, write, AppData,
    Consistency, Core, DirHandle, Error, FileHandle, RequestData, Result, XattrFlags,
};

const MAX_HANDLES: usize = 1024;

/// Per-inode byte buffer backing file contents.
struct FileBuf {
    data: Mutex<Vec<u8>>,
}

/// REPL state: the core, the descriptor tables, and the acting identity.
struct Repl {
    core: Arc<Core>,
    files: Vec<Option<FileHandle>>,
    dirs: Vec<Option<DirHandle>>,
    user: u64,
    group: u64,
}

fn filebuf_of(req: &RequestData) -> Result<Arc<FileBuf>> {
    let data = req.target().app_data().ok_or(Error::Io)?;
    data.downcast::<FileBuf>().map_err(|_| Error::Io)
}

/// Route every path's data plane into an in-memory byte buffer.
fn install_byte_store(core: &Core) {
    core.route_create(
        "^/.*$",
        Consistency::Concurrent,
        Box::new(|_core, _req, _mode| {
            let buf: AppData = Arc::new(FileBuf {
                data: Mutex::new(Vec::new()),
            });
            Ok((Some(buf), None))
        }),
    )
    .expect("create route");

    core.route_write(
        "^/.*$",
        Consistency::Sequential,
        Box::new(|_core, req, buf, offset, _handle| {
            let fb = filebuf_of(req)?;
            let mut data = fb.data.lock().unwrap();
            let end = offset as usize + buf.len();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset as usize..end].copy_from_slice(buf);
            Ok(buf.len())
        }),
    )
    .expect("write route");

    core.route_read(
        "^/.*$",
        Consistency::Concurrent,
        Box::new(|_core, req, buf, offset, _handle| {
            let fb = filebuf_of(req)?;
            let data = fb.data.lock().unwrap();
            let offset = offset as usize;
            if offset >= data.len() {
                return Ok(0);
            }
            let n = (data.len() - offset).min(buf.len());
            buf[..n].copy_from_slice(&data[offset..offset + n]);
            Ok(n)
        }),
    )
    .expect("read route");

    core.route_trunc(
        "^/.*$",
        Consistency::Sequential,
        Box::new(|_core, req, new_size, _handle| {
            let fb = filebuf_of(req)?;
            fb.data.lock().unwrap().resize(new_size as usize, 0);
            Ok(())
        }),
    )
    .expect("trunc route");
}

fn parse_mode(s: &str) -> Option<u32> {
    u32::from_str_radix(s, 8).ok()
}

fn parse_flags(s: &str) -> Option<i32> {
    let mut flags = match s {
        s if s.starts_with("rw") => libc::O_RDWR,
        s if s.starts_with('r') => libc::O_RDONLY,
        s if s.starts_with('w') => libc::O_WRONLY,
        _ => return None,
    };
    if s.contains('c') {
        flags |= libc::O_CREAT;
    }
    if s.contains('x') {
        flags |= libc::O_EXCL;
    }
    if s.contains('t') {
        flags |= libc::O_TRUNC;
    }
    Some(flags)
}

fn type_char(mode: u32) -> char {
    match mode & libc::S_IFMT as u32 {
        m if m == libc::S_IFDIR as u32 => 'd',
        m if m == libc::S_IFLNK as u32 => 'l',
        m if m == libc::S_IFIFO as u32 => 'p',
        m if m == libc::S_IFSOCK as u32 => 's',
        m if m == libc::S_IFCHR as u32 => 'c',
        m if m == libc::S_IFBLK as u32 => 'b',
        _ => '-',
    }
}

impl Repl {
    fn new(core: Arc<Core>) -> Repl {
        Repl {
            core,
            files: (0..MAX_HANDLES).map(|_| None).collect(),
            dirs: (0..MAX_HANDLES).map(|_| None).collect(),
            user: 0,
            group: 0,
        }
    }

    fn stash_file(&mut self, fh: FileHandle) -> Option<usize> {
        let slot = self.files.iter().position(|s| s.is_none())?;
        self.files[slot] = Some(fh);
        Some(slot)
    }

    fn stash_dir(&mut self, dh: DirHandle) -> Option<usize> {
        let slot = self.dirs.iter().position(|s| s.is_none())?;
        self.dirs[slot] = Some(dh);
        Some(slot)
    }

    fn take_file(&mut self, arg: &str) -> Option<FileHandle> {
        let fd: usize = arg.parse().ok()?;
        self.files.get_mut(fd)?.take()
    }

    fn file(&self, arg: &str) -> Option<&FileHandle> {
        let fd: usize = arg.parse().ok()?;
        self.files.get(fd)?.as_ref()
    }

    fn take_dir(&mut self, arg: &str) -> Option<DirHandle> {
        let dd: usize = arg.parse().ok()?;
        self.dirs.get_mut(dd)?.take()
    }

    fn dir(&self, arg: &str) -> Option<&DirHandle> {
        let dd: usize = arg.parse().ok()?;
        self.dirs.get(dd)?.as_ref()
    }

    /// Run one statement.  Returns false when the REPL should exit.
    fn dispatch(&mut self, line: &str) -> bool {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (cmd, args) = match words.split_first() {
            Some(split) => split,
            None => return true,
        };

        if *cmd == "exit" || *cmd == "quit" {
            return false;
        }

        match self.run_cmd(*cmd, args) {
            Ok(output) => {
                if !output.is_empty() {
                    println!("{}", output);
                }
            }
            Err(e) => println!("rc = {} ({})", e.errno(), e),
        }

        true
    }

    fn run_cmd(&mut self, cmd: &str, args: &[&str]) -> Result<String> {
        let (user, group) = (self.user, self.group);

        match (cmd, args) {
            ("user", [uid, gid]) => {
                self.user = uid.parse().map_err(|_| Error::Invalid)?;
                self.group = gid.parse().map_err(|_| Error::Invalid)?;
                Ok(String::new())
            }

            ("mkdir", [path, mode]) => {
                let mode = parse_mode(mode).ok_or(Error::Invalid)?;
                mkdir(&self.core, path, mode, user, group)?;
                Ok(String::new())
            }

            ("create", [path, mode]) => {
                let mode = parse_mode(mode).ok_or(Error::Invalid)?;
                let fh = create(&self.core, path, user, group, mode)?;
                let fd = self.stash_file(fh).ok_or(Error::NoMemory)?;
                Ok(fd.to_string())
            }

            ("open", [path, flags]) => {
                let flags = parse_flags(flags).ok_or(Error::Invalid)?;
                let fh = open(&self.core, path, user, group, flags, 0o644)?;
                let fd = self.stash_file(fh).ok_or(Error::NoMemory)?;
                Ok(fd.to_string())
            }

            ("close", [fd]) => {
                let fh = self.take_file(fd).ok_or(Error::BadFd)?;
                close(&self.core, fh)?;
                Ok(String::new())
            }

            ("read", [fd, offset, len]) => {
                let fh = self.file(fd).ok_or(Error::BadFd)?;
                let offset: u64 = offset.parse().map_err(|_| Error::Invalid)?;
                let len: usize = len.parse().map_err(|_| Error::Invalid)?;
                let mut buf = vec![0u8; len];
                let n = read(&self.core, fh, &mut buf, offset)?;
                Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
            }

            ("write", [fd, offset, rest @ ..]) => {
                let fh = self.file(fd).ok_or(Error::BadFd)?;
                let offset: u64 = offset.parse().map_err(|_| Error::Invalid)?;
                let data = rest.join(" ");
                let n = write(&self.core, fh, data.as_bytes(), offset)?;
                Ok(n.to_string())
            }

            ("trunc", [path, size]) => {
                let size: u64 = size.parse().map_err(|_| Error::Invalid)?;
                trunc(&self.core, path, user, group, size)?;
                Ok(String::new())
            }

            ("ftrunc", [fd, size]) => {
                let fh = self.file(fd).ok_or(Error::BadFd)?;
                let size: u64 = size.parse().map_err(|_| Error::Invalid)?;
                ftrunc(&self.core, fh, size)?;
                Ok(String::new())
            }

            ("sync", [fd]) => {
                let fh = self.file(fd).ok_or(Error::BadFd)?;
                fsync(&self.core, fh)?;
                Ok(String::new())
            }

            ("unlink", [path]) => {
                unlink(&self.core, path, user, group)?;
                Ok(String::new())
            }

            ("rmdir", [path]) => {
                rmdir(&self.core, path, user, group)?;
                Ok(String::new())
            }

            ("rename", [from, to]) => {
                rename(&self.core, from, to, user, group)?;
                Ok(String::new())
            }

            ("link", [from, to]) => {
                link(&self.core, from, to, user, group)?;
                Ok(String::new())
            }

            ("symlink", [target, linkpath]) => {
                symlink(&self.core, target, linkpath, user, group)?;
                Ok(String::new())
            }

            ("readlink", [path]) => {
                let mut buf = vec![0u8; 4096];
                let n = readlink(&self.core, path, user, group, &mut buf)?;
                let target = &buf[..n.saturating_sub(1)]; // drop the NUL
                Ok(String::from_utf8_lossy(target).into_owned())
            }

            ("mknod", [path, mode, dev]) => {
                let mode = parse_mode(mode).ok_or(Error::Invalid)?;
                let dev: u64 = dev.parse().map_err(|_| Error::Invalid)?;
                mknod(&self.core, path, mode, dev, user, group)?;
                Ok(String::new())
            }

            ("stat", [path]) => {
                let sb = stat(&self.core, path, user, group)?;
                let mode = sb.st_mode as u32;
                Ok(format!(
                    "{}{:04o} ino={:x} nlink={} uid={} gid={} size={}",
                    type_char(mode),
                    mode & 0o7777,
                    sb.st_ino,
                    sb.st_nlink,
                    sb.st_uid,
                    sb.st_gid,
                    sb.st_size
                ))
            }

            ("statvfs", [path]) => {
                let vfs = statvfs(&self.core, path, user, group)?;
                Ok(format!(
                    "fsid={:#x} files={} namemax={}",
                    vfs.f_fsid, vfs.f_files, vfs.f_namemax
                ))
            }

            ("access", [path, amode]) => {
                let mut mask = 0;
                if amode.contains('r') {
                    mask |= libc::R_OK;
                }
                if amode.contains('w') {
                    mask |= libc::W_OK;
                }
                if amode.contains('x') {
                    mask |= libc::X_OK;
                }
                access(&self.core, path, user, group, mask)?;
                Ok("ok".to_string())
            }

            ("chmod", [path, mode]) => {
                let mode = parse_mode(mode).ok_or(Error::Invalid)?;
                chmod(&self.core, path, user, group, mode)?;
                Ok(String::new())
            }

            ("chown", [path, new_uid, new_gid]) => {
                let new_uid: u64 = new_uid.parse().map_err(|_| Error::Invalid)?;
                let new_gid: u64 = new_gid.parse().map_err(|_| Error::Invalid)?;
                chown(&self.core, path, user, group, new_uid, new_gid)?;
                Ok(String::new())
            }

            ("opendir", [path]) => {
                let dh = opendir(&self.core, path, user, group)?;
                let dd = self.stash_dir(dh).ok_or(Error::NoMemory)?;
                Ok(dd.to_string())
            }

            ("readdir", [dd, count]) => {
                let dh = self.dir(dd).ok_or(Error::BadFd)?;
                let count: u64 = count.parse().map_err(|_| Error::Invalid)?;
                let entries = readdir(&self.core, dh, count)?;
                Ok(entries
                    .iter()
                    .map(|e| format!("{} (ino {:x})", e.name, e.file_id))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            ("listdir", [dd]) => {
                let dh = self.dir(dd).ok_or(Error::BadFd)?;
                let entries = listdir(&self.core, dh)?;
                Ok(entries
                    .iter()
                    .map(|e| format!("{} (ino {:x})", e.name, e.file_id))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            ("closedir", [dd]) => {
                let dh = self.take_dir(dd).ok_or(Error::BadFd)?;
                closedir(&self.core, dh)?;
                Ok(String::new())
            }

            ("getxattr", [path, name]) => {
                let mut probe = [];
                let len = getxattr(&self.core, path, user, group, name, &mut probe)?;
                let mut buf = vec![0u8; len];
                getxattr(&self.core, path, user, group, name, &mut buf)?;
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }

            ("setxattr", [path, name, value]) => {
                setxattr(
                    &self.core,
                    path,
                    user,
                    group,
                    name,
                    value.as_bytes(),
                    XattrFlags::empty(),
                )?;
                Ok(String::new())
            }

            ("listxattr", [path]) => {
                let mut probe = [];
                let len = listxattr(&self.core, path, user, group, &mut probe)?;
                let mut buf = vec![0u8; len];
                listxattr(&self.core, path, user, group, &mut buf)?;
                Ok(buf
                    .split(|b| *b == 0)
                    .filter(|n| !n.is_empty())
                    .map(|n| String::from_utf8_lossy(n).into_owned())
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            ("removexattr", [path, name]) => {
                removexattr(&self.core, path, user, group, name)?;
                Ok(String::new())
            }

            ("rm_deferred", [path]) => {
                deferred_remove(&self.core, path, user, group)?;
                Ok(String::new())
            }

            ("detach_all", [path]) => {
                detach_all(&self.core, path)?;
                Ok(String::new())
            }

            ("help", _) => Ok(HELP.trim_end().to_string()),

            _ => Err(Error::Invalid),
        }
    }

    /// Close every descriptor that is still open.
    fn close_all(&mut self) {
        for slot in self.files.iter_mut() {
            if let Some(fh) = slot.take() {
                if let Err(e) = close(&self.core, fh) {
                    log::error!("close rc = {}", e.errno());
                }
            }
        }
        for slot in self.dirs.iter_mut() {
            if let Some(dh) = slot.take() {
                if let Err(e) = closedir(&self.core, dh) {
                    log::error!("closedir rc = {}", e.errno());
                }
            }
        }
    }
}

const HELP: &str = "\
commands:
  user UID GID                  act as this identity (default 0 0)
  mkdir PATH MODE               create a directory (octal mode)
  create PATH MODE              create+open a file, prints the fd
  open PATH FLAGS               open a file (r/w/rw plus c, x, t), prints the fd
  close FD                      close a file
  read FD OFFSET LEN            read bytes
  write FD OFFSET DATA...       write bytes, prints the count
  trunc PATH SIZE / ftrunc FD SIZE
  sync FD
  unlink PATH / rmdir PATH / rename FROM TO / link FROM TO
  symlink TARGET LINKPATH / readlink PATH
  mknod PATH MODE DEV
  stat PATH / statvfs PATH / access PATH [rwx]
  chmod PATH MODE / chown PATH UID GID
  opendir PATH / readdir DD COUNT / listdir DD / closedir DD
  getxattr PATH NAME / setxattr PATH NAME VALUE
  listxattr PATH / removexattr PATH NAME
  rm_deferred PATH / detach_all PATH
  exit
";

fn main() -> io::Result<()> {
    env_logger::init();

    routefs::library_init().expect("library init");

    let core = Core::new(None);
    install_byte_store(&core);

    let mut repl = Repl::new(core.clone());

    let interactive;
    let reader: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(script) => {
            interactive = false;
            Box::new(BufReader::new(std::fs::File::open(script)?))
        }
        None => {
            interactive = true;
            Box::new(BufReader::new(io::stdin()))
        }
    };

    if interactive {
        print!("> ");
        io::stdout().flush()?;
    }

    for line in reader.lines() {
        let line = line?;

        if !repl.dispatch(&line) {
            break;
        }

        if interactive {
            print!("> ");
            io::stdout().flush()?;
        }
    }

    repl.close_all();

    if let Err(e) = core.shutdown() {
        log::error!("shutdown rc = {}", e.errno());
    }

    routefs::library_shutdown().expect("library shutdown");

    Ok(())
}
