//! Special file creation.

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc::try_garbage_collect;
use crate::inode::{
    attach_lowlevel, is_searchable, is_writeable, wlock, AppData, Inode, InodeRef, InodeType,
};
use crate::ops::split_path;
use crate::path::sanitize_path;
use crate::resolve::resolve_path_write;
use crate::route::{self, Dispatched, NodeInfo};

/// Make a filesystem node: regular file, FIFO, socket, or device.  The
/// type is taken from the `S_IFMT` bits of `mode`; `cls` is an opaque
/// payload forwarded to the mknod route.
pub fn mknod_ex(
    core: &Core,
    path: &str,
    mode: u32,
    dev: u64,
    user: u64,
    group: u64,
    cls: Option<AppData>,
) -> Result<()> {
    let fs_path = sanitize_path(path);
    let (dir_path, name) = split_path(&fs_path)?;

    let mut parent = resolve_path_write(core, &dir_path, user, group)?;

    if parent.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }
    if !is_searchable(parent.mode(), parent.owner(), parent.group(), user, group)
        || !is_writeable(parent.mode(), parent.owner(), parent.group(), user, group)
    {
        return Err(Error::Access);
    }

    if let Some(child) = parent.children().and_then(|c| c.find(&name)) {
        match wlock(&child, "mknod") {
            Ok(child_guard) => {
                if !child_guard.is_deletion_in_progress() {
                    return Err(Error::Exists);
                }
                match try_garbage_collect(core, &fs_path, &mut parent, child_guard) {
                    Ok(Some(still_alive)) => drop(still_alive),
                    Ok(None) => {}
                    Err(Error::Exists) => return Err(Error::Exists),
                    Err(e) => {
                        fs_error!("BUG: garbage collection of '{}' rc = {}", fs_path, e.errno());
                        return Err(Error::Io);
                    }
                }
            }
            Err(_) => {
                if let Some(children) = parent.children_mut() {
                    children.remove(&name);
                }
            }
        }
    }

    let perm = mode & 0o777;
    let fmt = mode & libc::S_IFMT as u32;

    let (child, kind): (InodeRef, InodeType) = if fmt == libc::S_IFREG as u32 || fmt == 0 {
        (Inode::new_file(0, user, group, perm), InodeType::File)
    } else if fmt == libc::S_IFIFO as u32 {
        (Inode::new_fifo(0, user, group, perm), InodeType::Fifo)
    } else if fmt == libc::S_IFSOCK as u32 {
        (Inode::new_sock(0, user, group, perm), InodeType::Sock)
    } else if fmt == libc::S_IFCHR as u32 {
        (Inode::new_chr(0, user, group, perm, dev), InodeType::CharDev)
    } else if fmt == libc::S_IFBLK as u32 {
        (Inode::new_blk(0, user, group, perm, dev), InodeType::BlockDev)
    } else {
        fs_error!("invalid/unsupported mode {:o}", mode);
        return Err(Error::Invalid);
    };

    let file_id = {
        let mut state = child.write();
        let id = core.allocate_inode_id(&parent, &state)?;
        state.set_file_id(id);
        // reference, so it cannot vanish during the route
        *state.open_count_mut() += 1;
        id
    };

    let tinfo = NodeInfo::new(file_id, kind, None);
    let parent_info = NodeInfo::of(&parent);

    let inode_data = match route::call_mknod(
        core, &fs_path, &child, tinfo, parent_info, mode, dev, cls,
    ) {
        Ok(Dispatched::Handled(data)) => data,
        Ok(Dispatched::NoRoute) => None,
        Err(e) => {
            fs_error!("mknod route on '{}' rc = {}", fs_path, e.errno());
            core.release_inode_id(file_id);
            return Err(e);
        }
    };

    {
        let mut state = wlock(&child, "mknod")?;
        *state.open_count_mut() -= 1;
        state.set_app_data(inode_data);
        attach_lowlevel(&mut parent, &mut state, &name);
    }
    core.file_count_update(1);

    Ok(())
}

/// [`mknod_ex`] without the route payload.
pub fn mknod(core: &Core, path: &str, mode: u32, dev: u64, user: u64, group: u64) -> Result<()> {
    mknod_ex(core, path, mode, dev, user, group, None)
}
