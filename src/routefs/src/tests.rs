use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::*;

//--------------------------------------------------------------------------------------------------
// Helpers
//--------------------------------------------------------------------------------------------------

mod helper {
    use super::*;

    /// Per-inode byte buffer installed as inode app data by the create
    /// route; the read/write/trunc routes operate on it.
    pub struct FileBuf {
        pub data: Mutex<Vec<u8>>,
    }

    fn filebuf_of(req: &RequestData) -> Result<Arc<FileBuf>> {
        let data = req.target().app_data().ok_or(Error::Io)?;
        data.downcast::<FileBuf>().map_err(|_| Error::Io)
    }

    /// Install create/read/write/trunc routes that store file contents in
    /// an in-memory buffer per inode, under paths matching `pattern`.
    pub fn install_byte_store(core: &Core, pattern: &str) {
        core.route_create(
            pattern,
            Consistency::Concurrent,
            Box::new(|_core, _req, _mode| {
                let buf: AppData = Arc::new(FileBuf {
                    data: Mutex::new(Vec::new()),
                });
                Ok((Some(buf), None))
            }),
        )
        .unwrap();

        core.route_write(
            pattern,
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
        .unwrap();

        core.route_read(
            pattern,
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
        .unwrap();

        core.route_trunc(
            pattern,
            Consistency::Sequential,
            Box::new(|_core, req, new_size, _handle| {
                let fb = filebuf_of(req)?;
                fb.data.lock().unwrap().resize(new_size as usize, 0);
                Ok(())
            }),
        )
        .unwrap();
    }

    /// Count destroy-route invocations under `pattern`.
    pub fn install_destroy_counter(core: &Core, pattern: &str) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let hook = counter.clone();

        core.route_destroy(
            pattern,
            Consistency::Concurrent,
            Box::new(move |_core, _req, _data| {
                hook.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

        counter
    }

    /// Count detach-route invocations under `pattern`.
    pub fn install_detach_counter(core: &Core, pattern: &str) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let hook = counter.clone();

        core.route_detach(
            pattern,
            Consistency::Concurrent,
            Box::new(move |_core, _req, _data| {
                hook.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();

        counter
    }

    pub fn wait_until(cond: impl Fn() -> bool) -> bool {
        for _ in 0..500 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    pub fn names(entries: &[DirEntry]) -> Vec<String> {
        entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn now_secs() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }
}

use helper::{install_byte_store, install_destroy_counter, install_detach_counter, names};

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test]
fn test_simple_tree() {
    // mkdir /a -> mkdir /a/b -> create /a/b/f, then check the stat record
    // and the directory listing
    let core = Core::new(None);

    mkdir(&core, "/a", 0o755, 0, 0).unwrap();
    mkdir(&core, "/a/b", 0o755, 0, 0).unwrap();

    let fh = create(&core, "/a/b/f", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    let sb = stat(&core, "/a/b/f", 0, 0).unwrap();
    assert_eq!(sb.st_mode as u32, 0o100644);
    assert_eq!(sb.st_nlink as u64, 1);
    assert_eq!(sb.st_size, 0);

    let dirh = opendir(&core, "/a/b", 0, 0).unwrap();
    let entries = listdir(&core, &dirh).unwrap();
    assert_eq!(names(&entries), vec!["f"]);
    closedir(&core, dirh).unwrap();
}

#[test]
fn test_resolve_permission_denied() {
    // a 0700 directory owned by 1:1 blocks (2,2) but not root
    let core = Core::new(None);

    mkdir(&core, "/priv", 0o700, 0, 0).unwrap();
    chown(&core, "/priv", 0, 0, 1, 1).unwrap();

    let fh = create(&core, "/priv/secret", 1, 1, 0o600).unwrap();
    close(&core, fh).unwrap();

    assert_eq!(stat(&core, "/priv/secret", 2, 2).unwrap_err(), Error::Access);
    assert!(stat(&core, "/priv/secret", 0, 0).is_ok());
    assert!(stat(&core, "/priv/secret", 1, 1).is_ok());
}

#[test]
fn test_unlink_while_open() {
    // unlink of an open file: the name disappears, I/O through the handle
    // keeps working, and the inode dies with the last close
    let core = Core::new(None);
    install_byte_store(&core, "^/t$");
    let destroyed = install_destroy_counter(&core, "^/t$");

    let fh = create(&core, "/t", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    let fh = open(&core, "/t", 0, 0, libc::O_RDWR, 0).unwrap();
    let node = fh.inode();

    unlink(&core, "/t", 0, 0).unwrap();

    assert_eq!(
        open(&core, "/t", 0, 0, libc::O_RDWR, 0).unwrap_err(),
        Error::NoEntry
    );

    assert_eq!(write(&core, &fh, b"hello", 0).unwrap(), 5);
    let mut buf = [0u8; 5];
    assert_eq!(read(&core, &fh, &mut buf, 0).unwrap(), 5);
    assert_eq!(&buf, b"hello");

    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    close(&core, fh).unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);

    // a retained reference observes the destruction
    assert_eq!(fstat(&core, "/t", &node).unwrap_err(), Error::NoEntry);
}

#[test]
fn test_rename_overwriting() {
    // rename /a over /b: /b resolves to the old /a inode and carries its
    // contents; /a is gone
    let core = Core::new(None);
    install_byte_store(&core, "^/[ab]$");

    let fa = create(&core, "/a", 0, 0, 0o644).unwrap();
    write(&core, &fa, b"xyz", 0).unwrap();
    close(&core, fa).unwrap();

    let fb = create(&core, "/b", 0, 0, 0o644).unwrap();
    close(&core, fb).unwrap();

    let a_ino = stat(&core, "/a", 0, 0).unwrap().st_ino;

    rename(&core, "/a", "/b", 0, 0).unwrap();

    let sb = stat(&core, "/b", 0, 0).unwrap();
    assert_eq!(sb.st_ino, a_ino);
    assert_eq!(stat(&core, "/a", 0, 0).unwrap_err(), Error::NoEntry);

    let fh = open(&core, "/b", 0, 0, libc::O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(read(&core, &fh, &mut buf, 0).unwrap(), 3);
    assert_eq!(&buf[..3], b"xyz");
    close(&core, fh).unwrap();
}

#[test]
fn test_route_dispatch_write() {
    // a write route returning the byte count drives the size and mtime
    // bookkeeping
    let core = Core::new(None);

    core.route_write(
        "^/data/[^/]+$",
        Consistency::Sequential,
        Box::new(|_core, _req, buf, _offset, _handle| Ok(buf.len())),
    )
    .unwrap();

    mkdir(&core, "/data", 0o755, 0, 0).unwrap();
    let fh = create(&core, "/data/x", 0, 0, 0o644).unwrap();

    let before = helper::now_secs();
    assert_eq!(write(&core, &fh, b"12345", 10).unwrap(), 5);
    close(&core, fh).unwrap();

    let sb = stat(&core, "/data/x", 0, 0).unwrap();
    assert_eq!(sb.st_size, 15);
    assert!(sb.st_mtime >= before);
}

#[test]
fn test_route_match_groups() {
    // captured groups arrive in declaration order, whole-path anchored
    let core = Core::new(None);

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    core.route_write(
        "^/g/(x+)/([0-9]+)$",
        Consistency::Sequential,
        Box::new(move |_core, req, buf, _offset, _handle| {
            *sink.lock().unwrap() = req.match_groups().to_vec();
            Ok(buf.len())
        }),
    )
    .unwrap();

    mkdir(&core, "/g", 0o755, 0, 0).unwrap();
    mkdir(&core, "/g/xx", 0o755, 0, 0).unwrap();
    let fh = create(&core, "/g/xx/42", 0, 0, 0o644).unwrap();
    write(&core, &fh, b"!", 0).unwrap();
    close(&core, fh).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["xx".to_string(), "42".to_string()]);

    // a prefix match is not a match
    let fh = create(&core, "/g/xx/42nope", 0, 0, 0o644).unwrap();
    assert_eq!(write(&core, &fh, b"!", 0).unwrap(), 0);
    close(&core, fh).unwrap();
}

#[test]
fn test_xattr_bounds() {
    let core = Core::new(None);

    let fh = create(&core, "/f", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    setxattr(&core, "/f", 0, 0, "user.k", b"hello", XattrFlags::empty()).unwrap();

    let mut small = [0u8; 4];
    assert_eq!(
        getxattr(&core, "/f", 0, 0, "user.k", &mut small).unwrap_err(),
        Error::Range
    );

    assert_eq!(getxattr(&core, "/f", 0, 0, "user.k", &mut []).unwrap(), 5);

    let mut exact = [0u8; 5];
    assert_eq!(getxattr(&core, "/f", 0, 0, "user.k", &mut exact).unwrap(), 5);
    assert_eq!(&exact, b"hello");

    // list is NUL-separated and covers every name exactly once
    setxattr(&core, "/f", 0, 0, "user.j", b"x", XattrFlags::empty()).unwrap();
    let mut list = [0u8; 64];
    let len = listxattr(&core, "/f", 0, 0, &mut list).unwrap();
    assert_eq!(&list[..len], b"user.j\0user.k\0");

    // create/replace modes
    assert_eq!(
        setxattr(&core, "/f", 0, 0, "user.k", b"v", XattrFlags::CREATE).unwrap_err(),
        Error::Exists
    );
    assert_eq!(
        setxattr(&core, "/f", 0, 0, "user.nope", b"v", XattrFlags::REPLACE).unwrap_err(),
        Error::NoAttr
    );

    removexattr(&core, "/f", 0, 0, "user.k").unwrap();
    assert_eq!(
        removexattr(&core, "/f", 0, 0, "user.k").unwrap_err(),
        Error::NoAttr
    );
}

#[test]
fn test_name_uniqueness() {
    let core = Core::new(None);

    let fh = create(&core, "/x", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    assert_eq!(
        open(
            &core,
            "/x",
            0,
            0,
            libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY,
            0o644
        )
        .unwrap_err(),
        Error::Exists
    );
    assert_eq!(mkdir(&core, "/x", 0o755, 0, 0).unwrap_err(), Error::Exists);
}

#[test]
fn test_link_count_conservation() {
    let core = Core::new(None);

    let fh = create(&core, "/f1", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    link(&core, "/f1", "/f2", 0, 0).unwrap();

    assert_eq!(stat(&core, "/f1", 0, 0).unwrap().st_nlink as u64, 2);
    assert_eq!(
        stat(&core, "/f2", 0, 0).unwrap().st_ino,
        stat(&core, "/f1", 0, 0).unwrap().st_ino
    );

    unlink(&core, "/f2", 0, 0).unwrap();
    assert_eq!(stat(&core, "/f1", 0, 0).unwrap().st_nlink as u64, 1);

    // directories cannot be hard-linked
    mkdir(&core, "/d", 0o755, 0, 0).unwrap();
    assert_eq!(link(&core, "/d", "/d2", 0, 0).unwrap_err(), Error::Perm);
}

#[test]
fn test_link_route_failure_undoes_insertion() {
    let core = Core::new(None);

    core.route_link(
        "^/f1$",
        Consistency::Concurrent,
        Box::new(|_core, _req, _new_path| Err(Error::Perm)),
    )
    .unwrap();

    let fh = create(&core, "/f1", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    assert_eq!(link(&core, "/f1", "/f2", 0, 0).unwrap_err(), Error::Perm);
    assert_eq!(stat(&core, "/f2", 0, 0).unwrap_err(), Error::NoEntry);
    assert_eq!(stat(&core, "/f1", 0, 0).unwrap().st_nlink as u64, 1);
}

#[test]
fn test_rename_loop_prevention() {
    let core = Core::new(None);

    mkdir(&core, "/a", 0o755, 0, 0).unwrap();
    mkdir(&core, "/a/b", 0o755, 0, 0).unwrap();
    mkdir(&core, "/a/b/c", 0o755, 0, 0).unwrap();

    assert_eq!(
        rename(&core, "/a", "/a/b/c", 0, 0).unwrap_err(),
        Error::Invalid
    );
    assert_eq!(rename(&core, "/a", "/a/b", 0, 0).unwrap_err(), Error::Invalid);

    // a legal cross-directory move of a non-empty tree still works
    mkdir(&core, "/elsewhere", 0o755, 0, 0).unwrap();
    rename(&core, "/a/b", "/elsewhere/b", 0, 0).unwrap();
    assert!(stat(&core, "/elsewhere/b/c", 0, 0).is_ok());
    assert_eq!(stat(&core, "/a/b", 0, 0).unwrap_err(), Error::NoEntry);
}

#[test]
fn test_rename_type_mismatch() {
    let core = Core::new(None);

    mkdir(&core, "/dir", 0o755, 0, 0).unwrap();
    let fh = create(&core, "/file", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    assert_eq!(rename(&core, "/file", "/dir", 0, 0).unwrap_err(), Error::IsDir);
    assert_eq!(rename(&core, "/dir", "/file", 0, 0).unwrap_err(), Error::NotDir);

    // overwriting a non-empty directory is refused, and the source stays put
    mkdir(&core, "/dir2", 0o755, 0, 0).unwrap();
    mkdir(&core, "/dir/sub", 0o755, 0, 0).unwrap();
    assert_eq!(
        rename(&core, "/dir2", "/dir", 0, 0).unwrap_err(),
        Error::NotEmpty
    );
    assert!(stat(&core, "/dir2", 0, 0).is_ok());
}

#[test]
fn test_readdir_pagination() {
    // bookmark-based pagination covers every live name exactly once, in
    // name order, without . or ..
    let core = Core::new(None);

    mkdir(&core, "/ch", 0o755, 0, 0).unwrap();
    for name in ["f0", "f1", "f2", "f3", "f4"] {
        let fh = create(&core, &format!("/ch/{}", name), 0, 0, 0o644).unwrap();
        close(&core, fh).unwrap();
    }

    let dirh = opendir(&core, "/ch", 0, 0).unwrap();

    let mut all = Vec::new();
    loop {
        let chunk = readdir(&core, &dirh, 2).unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= 2);
        all.extend(names(&chunk));
    }

    assert_eq!(all, vec!["f0", "f1", "f2", "f3", "f4"]);

    // rewind and do it again in one go
    rewinddir(&dirh);
    let entries = listdir(&core, &dirh).unwrap();
    assert_eq!(names(&entries), vec!["f0", "f1", "f2", "f3", "f4"]);

    closedir(&core, dirh).unwrap();
}

#[test]
fn test_readdir_route_omission() {
    let core = Core::new(None);

    core.route_readdir(
        "^/om$",
        Consistency::Concurrent,
        Box::new(|_core, _req, dents| {
            for slot in dents.iter_mut() {
                if slot.as_ref().map_or(false, |d| d.name == "skipme") {
                    *slot = None;
                }
            }
            Ok(())
        }),
    )
    .unwrap();

    mkdir(&core, "/om", 0o755, 0, 0).unwrap();
    for name in ["keep", "skipme", "also"] {
        let fh = create(&core, &format!("/om/{}", name), 0, 0, 0o644).unwrap();
        close(&core, fh).unwrap();
    }

    let dirh = opendir(&core, "/om", 0, 0).unwrap();
    let entries = listdir(&core, &dirh).unwrap();
    assert_eq!(names(&entries), vec!["also", "keep"]);
    closedir(&core, dirh).unwrap();
}

#[test]
fn test_telldir_seekdir() {
    let core = Core::new(None);

    mkdir(&core, "/td", 0o755, 0, 0).unwrap();
    for name in ["a", "b", "c"] {
        let fh = create(&core, &format!("/td/{}", name), 0, 0, 0o644).unwrap();
        close(&core, fh).unwrap();
    }

    let dirh = opendir(&core, "/td", 0, 0).unwrap();

    assert_eq!(names(&readdir(&core, &dirh, 1).unwrap()), vec!["a"]);
    let mark = telldir(&dirh);

    assert_eq!(names(&readdir(&core, &dirh, 2).unwrap()), vec!["b", "c"]);

    seekdir(&dirh, mark);
    assert_eq!(names(&readdir(&core, &dirh, 2).unwrap()), vec!["b", "c"]);

    closedir(&core, dirh).unwrap();
}

#[test]
fn test_route_slot_reuse() {
    let core = Core::new(None);

    let cb = || -> WriteCallback { Box::new(|_c, _r, buf, _o, _h| Ok(buf.len())) };

    let h0 = core.route_write("^/p1$", Consistency::Sequential, cb()).unwrap();
    let h1 = core.route_write("^/p2$", Consistency::Sequential, cb()).unwrap();
    assert_eq!(h0, 0);
    assert_eq!(h1, 1);

    core.unroute_write(h0).unwrap();
    assert_eq!(core.unroute_write(h0).unwrap_err(), Error::Invalid);

    // the freed slot is reused by the next declaration
    let h2 = core.route_write("^/p3$", Consistency::Sequential, cb()).unwrap();
    assert_eq!(h2, 0);
}

#[test]
fn test_rename_route_discipline_rejected() {
    let core = Core::new(None);

    let mk = || -> RenameCallback { Box::new(|_c, _r, _new_path, _dest| Ok(())) };

    assert_eq!(
        core.route_rename("^/.*$", Consistency::InodeSequential, mk())
            .unwrap_err(),
        Error::Invalid
    );
    assert_eq!(
        core.route_rename("^/.*$", Consistency::InodeConcurrent, mk())
            .unwrap_err(),
        Error::Invalid
    );
    assert!(core.route_rename("^/.*$", Consistency::Sequential, mk()).is_ok());
}

#[test]
fn test_bad_route_pattern_rejected() {
    let core = Core::new(None);

    assert_eq!(
        core.route_write(
            "^/(unclosed$",
            Consistency::Sequential,
            Box::new(|_c, _r, buf, _o, _h| Ok(buf.len()))
        )
        .unwrap_err(),
        Error::Invalid
    );
}

#[test]
fn test_deferred_remove() {
    let core = Core::new(None);
    install_byte_store(&core, "^/df$");
    let destroyed = install_destroy_counter(&core, "^/df$");

    let fh = open(&core, "/df", 0, 0, libc::O_CREAT | libc::O_RDWR, 0o644).unwrap();
    write(&core, &fh, b"payload", 0).unwrap();

    deferred_remove(&core, "/df", 0, 0).unwrap();

    // the name is gone immediately
    assert_eq!(stat(&core, "/df", 0, 0).unwrap_err(), Error::NoEntry);

    let dirh = opendir(&core, "/", 0, 0).unwrap();
    assert!(!names(&listdir(&core, &dirh).unwrap()).contains(&"df".to_string()));
    closedir(&core, dirh).unwrap();

    // the handle still works while the deferred job waits on it
    let mut buf = [0u8; 7];
    assert_eq!(read(&core, &fh, &mut buf, 0).unwrap(), 7);
    assert_eq!(&buf, b"payload");
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    close(&core, fh).unwrap();

    assert!(helper::wait_until(|| destroyed.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_deferred_remove_rejects_directories() {
    let core = Core::new(None);
    mkdir(&core, "/dd", 0o755, 0, 0).unwrap();
    assert_eq!(deferred_remove(&core, "/dd", 0, 0).unwrap_err(), Error::IsDir);
}

#[test]
fn test_detach_all() {
    let core = Core::new(None);
    let destroyed = install_destroy_counter(&core, "^/t(/.*)?$");
    let detached = install_detach_counter(&core, "^/t(/.*)?$");

    mkdir(&core, "/t", 0o755, 0, 0).unwrap();
    mkdir(&core, "/t/d1", 0o755, 0, 0).unwrap();
    mkdir(&core, "/t/d1/d2", 0o755, 0, 0).unwrap();
    for path in ["/t/f1", "/t/d1/f2", "/t/d1/d2/f3"] {
        let fh = create(&core, path, 0, 0, 0o644).unwrap();
        close(&core, fh).unwrap();
    }

    detach_all(&core, "/t").unwrap();

    // 5 descendants were reclaimed; /t itself is tombstoned
    assert_eq!(destroyed.load(Ordering::SeqCst), 5);
    assert_eq!(detached.load(Ordering::SeqCst), 5);
    assert_eq!(stat(&core, "/t/f1", 0, 0).unwrap_err(), Error::NoEntry);
    assert_eq!(stat(&core, "/t/d1/d2/f3", 0, 0).unwrap_err(), Error::NoEntry);
    assert_eq!(stat(&core, "/t", 0, 0).unwrap_err(), Error::NoEntry);
}

#[test]
fn test_deferred_remove_all_with_open_handle() {
    let core = Core::new(None);
    install_byte_store(&core, "^/tree/.*$");
    let destroyed = install_destroy_counter(&core, "^/tree/.*$");

    mkdir(&core, "/tree", 0o755, 0, 0).unwrap();
    mkdir(&core, "/tree/sub", 0o755, 0, 0).unwrap();
    let keeper = open(
        &core,
        "/tree/sub/keep",
        0,
        0,
        libc::O_CREAT | libc::O_RDWR,
        0o644,
    )
    .unwrap();
    write(&core, &keeper, b"still here", 0).unwrap();
    let fh = create(&core, "/tree/sub/gone", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    deferred_remove_all(&core, "/tree", 0, 0).unwrap();

    assert_eq!(stat(&core, "/tree/sub/keep", 0, 0).unwrap_err(), Error::NoEntry);

    // "gone" and "sub" are reclaimed once the queue drains; "keep" survives
    // as long as its handle does
    assert!(helper::wait_until(|| destroyed.load(Ordering::SeqCst) == 2));

    let mut buf = [0u8; 10];
    assert_eq!(read(&core, &keeper, &mut buf, 0).unwrap(), 10);
    assert_eq!(&buf, b"still here");

    close(&core, keeper).unwrap();
    assert!(helper::wait_until(|| destroyed.load(Ordering::SeqCst) == 3));
}

#[test]
fn test_statvfs() {
    let core = Core::new(None);

    mkdir(&core, "/sv", 0o755, 0, 0).unwrap();
    for name in ["a", "b"] {
        let fh = create(&core, &format!("/sv/{}", name), 0, 0, 0o644).unwrap();
        close(&core, fh).unwrap();
    }

    let vfs = statvfs(&core, "/sv", 0, 0).unwrap();
    assert_eq!(vfs.f_fsid as u64, 0x19880119);
    assert_eq!(vfs.f_namemax as usize, NAME_MAX);
    assert_eq!(vfs.f_files as u64, 3);
    assert_eq!(vfs.f_blocks, 0);

    unlink(&core, "/sv/a", 0, 0).unwrap();
    let vfs = statvfs(&core, "/sv", 0, 0).unwrap();
    assert_eq!(vfs.f_files as u64, 2);
}

#[test]
fn test_path_iterator() {
    let core = Core::new(None);

    mkdir(&core, "/p1", 0o755, 0, 0).unwrap();
    mkdir(&core, "/p1/p2", 0o755, 0, 0).unwrap();

    let mut prefixes = Vec::new();
    let mut itr = PathIterator::begin(&core, "/p1/p2", false);
    while !itr.end() {
        prefixes.push(itr.path_so_far().to_string());
        itr.next();
    }
    assert!(itr.error().is_none());
    assert_eq!(prefixes, vec!["/", "/p1", "/p1/p2"]);

    let mut itr = PathIterator::begin(&core, "/nope/x", false);
    while !itr.end() {
        itr.next();
    }
    assert_eq!(itr.error(), Some(Error::NoEntry));
}

#[test]
fn test_symlink_readlink() {
    let core = Core::new(None);

    symlink(&core, "/target/elsewhere", "/lnk", 0, 0).unwrap();

    let sb = stat(&core, "/lnk", 0, 0).unwrap();
    assert_eq!(sb.st_mode as u32 & libc::S_IFMT as u32, libc::S_IFLNK as u32);
    assert_eq!(sb.st_size as usize, "/target/elsewhere".len());

    let mut buf = [0u8; 64];
    let n = readlink(&core, "/lnk", 0, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"/target/elsewhere\0");

    // a short buffer truncates
    let mut short = [0u8; 7];
    let n = readlink(&core, "/lnk", 0, 0, &mut short).unwrap();
    assert_eq!(&short[..n], b"/target");

    // readlink of a non-symlink is invalid
    mkdir(&core, "/dir", 0o755, 0, 0).unwrap();
    assert_eq!(
        readlink(&core, "/dir", 0, 0, &mut buf).unwrap_err(),
        Error::Invalid
    );
}

#[test]
fn test_mknod_types() {
    let core = Core::new(None);

    mknod(&core, "/fifo", libc::S_IFIFO as u32 | 0o600, 0, 0, 0).unwrap();
    mknod(&core, "/cdev", libc::S_IFCHR as u32 | 0o600, 0x0501, 0, 0).unwrap();

    let sb = stat(&core, "/fifo", 0, 0).unwrap();
    assert_eq!(sb.st_mode as u32, libc::S_IFIFO as u32 | 0o600);

    let sb = stat(&core, "/cdev", 0, 0).unwrap();
    assert_eq!(sb.st_mode as u32, libc::S_IFCHR as u32 | 0o600);
    assert_eq!(sb.st_rdev as u64, 0x0501);

    assert_eq!(
        mknod(&core, "/bad", libc::S_IFDIR as u32 | 0o755, 0, 0, 0).unwrap_err(),
        Error::Invalid
    );
}

#[test]
fn test_access_checks() {
    let core = Core::new(None);

    let fh = create(&core, "/af", 0, 0, 0o640).unwrap();
    close(&core, fh).unwrap();
    chown(&core, "/af", 0, 0, 1, 1).unwrap();

    assert!(access(&core, "/af", 1, 1, libc::R_OK | libc::W_OK).is_ok());
    assert!(access(&core, "/af", 2, 1, libc::R_OK).is_ok()); // group read
    assert_eq!(
        access(&core, "/af", 2, 1, libc::W_OK).unwrap_err(),
        Error::Access
    );
    assert_eq!(
        access(&core, "/af", 2, 2, libc::R_OK).unwrap_err(),
        Error::Access
    );
    assert!(access(&core, "/af", 0, 0, libc::R_OK | libc::W_OK).is_ok());
    assert!(access(&core, "/af", 2, 2, 0).is_ok()); // F_OK
}

#[test]
fn test_chmod_chown_ownership() {
    let core = Core::new(None);

    let fh = create(&core, "/own", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();
    chown(&core, "/own", 0, 0, 1, 1).unwrap();

    assert_eq!(chmod(&core, "/own", 2, 2, 0o600).unwrap_err(), Error::Perm);
    chmod(&core, "/own", 1, 1, 0o600).unwrap();
    assert_eq!(stat(&core, "/own", 0, 0).unwrap().st_mode as u32 & 0o7777, 0o600);

    chown(&core, "/own", 0, 0, 3, 3).unwrap();
    let sb = stat(&core, "/own", 0, 0).unwrap();
    assert_eq!(sb.st_uid, 3);
    assert_eq!(sb.st_gid, 3);

    // the old owner lost the right to chmod
    assert_eq!(chmod(&core, "/own", 1, 1, 0o644).unwrap_err(), Error::Perm);
}

#[test]
fn test_utimes() {
    let core = Core::new(None);

    let fh = create(&core, "/ut", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    utimes(&core, "/ut", 0, 0, (100, 1), (200, 2)).unwrap();

    let sb = stat(&core, "/ut", 0, 0).unwrap();
    assert_eq!(sb.st_atime, 100);
    assert_eq!(sb.st_mtime, 200);

    assert_eq!(
        utimes(&core, "/ut", 5, 5, (0, 0), (0, 0)).unwrap_err(),
        Error::Perm
    );
}

#[test]
fn test_open_flag_checks() {
    let core = Core::new(None);
    install_byte_store(&core, "^/flags$");

    let fh = create(&core, "/flags", 0, 0, 0o644).unwrap();
    write(&core, &fh, b"abc", 0).unwrap();

    // the create handle is write-only
    let mut buf = [0u8; 3];
    assert_eq!(read(&core, &fh, &mut buf, 0).unwrap_err(), Error::BadFd);
    close(&core, fh).unwrap();

    let fh = open(&core, "/flags", 0, 0, libc::O_RDONLY, 0).unwrap();
    assert_eq!(write(&core, &fh, b"no", 0).unwrap_err(), Error::BadFd);
    assert_eq!(ftrunc(&core, &fh, 0).unwrap_err(), Error::BadFd);
    close(&core, fh).unwrap();

    // opening a directory for writing is refused
    mkdir(&core, "/od", 0o755, 0, 0).unwrap();
    assert_eq!(
        open(&core, "/od", 0, 0, libc::O_WRONLY, 0).unwrap_err(),
        Error::IsDir
    );
}

#[test]
fn test_trunc_updates_size() {
    let core = Core::new(None);
    install_byte_store(&core, "^/tr$");

    let fh = create(&core, "/tr", 0, 0, 0o644).unwrap();
    write(&core, &fh, b"0123456789", 0).unwrap();
    assert_eq!(stat(&core, "/tr", 0, 0).unwrap().st_size, 10);

    ftrunc(&core, &fh, 4).unwrap();
    assert_eq!(stat(&core, "/tr", 0, 0).unwrap().st_size, 4);
    close(&core, fh).unwrap();

    trunc(&core, "/tr", 0, 0, 0).unwrap();
    assert_eq!(stat(&core, "/tr", 0, 0).unwrap().st_size, 0);
}

#[test]
fn test_create_reuses_tombstoned_name() {
    // O_CREAT against a name flagged for deletion garbage-collects the
    // tombstone and proceeds
    let core = Core::new(None);
    let destroyed = install_destroy_counter(&core, "^/re$");

    let fh = create(&core, "/re", 0, 0, 0o644).unwrap();
    write(&core, &fh, b"x", 0).unwrap();

    deferred_remove(&core, "/re", 0, 0).unwrap();

    // recreate while the old inode is still open: the tombstone is
    // detached (it survives under its handle) and the name is reusable
    let fh2 = create(&core, "/re", 0, 0, 0o600).unwrap();
    let sb = stat(&core, "/re", 0, 0).unwrap();
    assert_eq!(sb.st_mode as u32 & 0o7777, 0o600);

    close(&core, fh).unwrap();
    close(&core, fh2).unwrap();

    assert!(helper::wait_until(|| destroyed.load(Ordering::SeqCst) >= 1));
}

#[test]
fn test_rmdir_semantics() {
    let core = Core::new(None);

    mkdir(&core, "/rd", 0o755, 0, 0).unwrap();
    let fh = create(&core, "/rd/f", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();

    assert_eq!(rmdir(&core, "/rd", 0, 0).unwrap_err(), Error::NotEmpty);

    unlink(&core, "/rd/f", 0, 0).unwrap();
    rmdir(&core, "/rd", 0, 0).unwrap();
    assert_eq!(stat(&core, "/rd", 0, 0).unwrap_err(), Error::NoEntry);

    assert_eq!(unlink(&core, "/rd", 0, 0).unwrap_err(), Error::NoEntry);
}

#[test]
fn test_unlink_is_not_rmdir() {
    let core = Core::new(None);

    mkdir(&core, "/ud", 0o755, 0, 0).unwrap();
    assert_eq!(unlink(&core, "/ud", 0, 0).unwrap_err(), Error::IsDir);

    let fh = create(&core, "/uf", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();
    assert_eq!(rmdir(&core, "/uf", 0, 0).unwrap_err(), Error::NotDir);
}

#[test]
fn test_shutdown() {
    let core = Core::new(Some(Arc::new(42u32)));

    mkdir(&core, "/s", 0o755, 0, 0).unwrap();

    let data = core.shutdown().unwrap().unwrap();
    assert_eq!(*data.downcast::<u32>().unwrap(), 42);

    // the filesystem is nuked: everything fails with no-entry
    assert_eq!(mkdir(&core, "/post", 0o755, 0, 0).unwrap_err(), Error::NoEntry);
    assert_eq!(stat(&core, "/", 0, 0).unwrap_err(), Error::NoEntry);

    // a second shutdown is refused
    assert_eq!(core.shutdown().unwrap_err(), Error::Invalid);
}

#[test]
fn test_dot_and_dotdot_resolution() {
    let core = Core::new(None);

    mkdir(&core, "/dd", 0o755, 0, 0).unwrap();
    mkdir(&core, "/dd/sub", 0o755, 0, 0).unwrap();

    let a = stat(&core, "/dd", 0, 0).unwrap().st_ino;
    assert_eq!(stat(&core, "/dd/.", 0, 0).unwrap().st_ino, a);
    assert_eq!(stat(&core, "/dd/sub/..", 0, 0).unwrap().st_ino, a);
    assert_eq!(stat(&core, "/dd/", 0, 0).unwrap().st_ino, a);
    assert_eq!(stat(&core, "/dd//sub/./..", 0, 0).unwrap().st_ino, a);

    // /.. of the root is the root
    let root_ino = stat(&core, "/", 0, 0).unwrap().st_ino;
    assert_eq!(stat(&core, "/..", 0, 0).unwrap().st_ino, root_ino);
}

#[test]
fn test_concurrent_create_stat_unlink() {
    let core = Core::new(None);
    mkdir(&core, "/c", 0o755, 0, 0).unwrap();

    let writer_core = core.clone();
    let writer = std::thread::spawn(move || {
        for i in 0..200 {
            let path = format!("/c/f{}", i % 8);
            if let Ok(fh) = create(&writer_core, &path, 0, 0, 0o644) {
                close(&writer_core, fh).unwrap();
            }
            let _ = unlink(&writer_core, &path, 0, 0);
        }
    });

    let reader_core = core.clone();
    let reader = std::thread::spawn(move || {
        for i in 0..200 {
            let _ = stat(&reader_core, &format!("/c/f{}", i % 8), 0, 0);
            if let Ok(dirh) = opendir(&reader_core, "/c", 0, 0) {
                let _ = listdir(&reader_core, &dirh);
                let _ = closedir(&reader_core, dirh);
            }
        }
    });

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn test_rename_atomicity_under_readers() {
    // once the source name stops resolving, the destination must resolve
    // to the original inode; there is no in-between window
    let core = Core::new(None);

    mkdir(&core, "/ra", 0o755, 0, 0).unwrap();
    let fh = create(&core, "/ra/src", 0, 0, 0o644).unwrap();
    close(&core, fh).unwrap();
    let src_ino = stat(&core, "/ra/src", 0, 0).unwrap().st_ino;

    let reader_core = core.clone();
    let reader = std::thread::spawn(move || loop {
        match stat(&reader_core, "/ra/src", 0, 0) {
            Ok(_) => continue,
            Err(_) => {
                // the rename committed; the destination must exist now
                let sb = stat(&reader_core, "/ra/dst", 0, 0).unwrap();
                assert_eq!(sb.st_ino, src_ino);
                break;
            }
        }
    });

    std::thread::sleep(Duration::from_millis(10));
    rename(&core, "/ra/src", "/ra/dst", 0, 0).unwrap();

    reader.join().unwrap();
}

#[test]
fn test_close_route_failure_still_closes() {
    let core = Core::new(None);

    core.route_close(
        "^/cf$",
        Consistency::Concurrent,
        Box::new(|_core, _req, _handle| Err(Error::Io)),
    )
    .unwrap();
    let destroyed = install_destroy_counter(&core, "^/cf$");

    let fh = create(&core, "/cf", 0, 0, 0o644).unwrap();
    unlink(&core, "/cf", 0, 0).unwrap();

    // the callback error is reported, but the handle is gone and the
    // inode is reclaimed
    assert_eq!(close(&core, fh).unwrap_err(), Error::Io);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_open_count_tracks_handles() {
    let core = Core::new(None);

    let fh1 = create(&core, "/oc", 0, 0, 0o644).unwrap();
    let fh2 = open(&core, "/oc", 0, 0, libc::O_RDONLY, 0).unwrap();

    let node = fh1.inode();
    assert_eq!(node.read().open_count(), 2);

    close(&core, fh1).unwrap();
    assert_eq!(node.read().open_count(), 1);

    close(&core, fh2).unwrap();
    assert_eq!(node.read().open_count(), 0);
}
