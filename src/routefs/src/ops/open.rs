//! Opening, creating, and closing files.

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc::{self, try_destroy, try_garbage_collect};
use crate::handle::FileHandle;
use crate::inode::{
    attach_lowlevel, guard_node, is_readable, is_searchable, is_writeable, rlock, wlock, Inode,
    InodeType, WriteGuard,
};
use crate::ops::{io, split_path};
use crate::path::sanitize_path;
use crate::resolve::resolve_path_write;
use crate::route::{self, Dispatched, NodeInfo};

/// Open (and possibly create) a file, returning a handle on success.
///
/// With `O_CREAT|O_EXCL` the open fails with `exists` unless the name is
/// absent or tombstoned; with `O_CREAT` alone a tombstoned entry is
/// garbage-collected first and the create proceeds.  Newly created files
/// run the create route; existing files run the open route.  `O_TRUNC` on
/// a writable open truncates through the trunc route.
pub fn open(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    flags: i32,
    mode: u32,
) -> Result<FileHandle> {
    let fs_path = sanitize_path(path);
    let (dir_path, name) = split_path(&fs_path)?;

    let mut parent = resolve_path_write(core, &dir_path, user, group)?;

    if parent.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }
    if !is_searchable(parent.mode(), parent.owner(), parent.group(), user, group) {
        return Err(Error::Access);
    }

    let mut existing = parent.children().and_then(|c| c.find(&name));

    if flags & libc::O_CREAT != 0 {
        if let Some(child) = existing.clone() {
            match wlock(&child, "open") {
                Ok(child_guard) => {
                    if child_guard.is_deletion_in_progress() {
                        // wait the tombstone out, then take the name
                        if let Some(still_alive) =
                            try_garbage_collect(core, &fs_path, &mut parent, child_guard)?
                        {
                            drop(still_alive);
                        }
                        existing = None;
                    } else if flags & libc::O_EXCL != 0 {
                        return Err(Error::Exists);
                    }
                }
                Err(_) => {
                    // a destroyed husk still named here; free the slot
                    if let Some(children) = parent.children_mut() {
                        children.remove(&name);
                    }
                    existing = None;
                }
            }
        }

        if existing.is_none() {
            return do_create(core, &fs_path, &mut parent, &name, flags, mode, user, group);
        }
    }

    // open an existing file
    let child = match existing {
        Some(child) => child,
        None => return Err(Error::NoEntry),
    };

    let mut child_guard = wlock(&child, "open").map_err(|_| Error::NoEntry)?;
    drop(parent);

    if child_guard.is_deletion_in_progress() || child_guard.link_count() <= 0 {
        // someone unlinked this child at the last minute
        return Err(Error::NoEntry);
    }

    let accmode = flags & libc::O_ACCMODE;
    let wants_read = accmode == libc::O_RDONLY || accmode == libc::O_RDWR;
    let wants_write = accmode == libc::O_WRONLY || accmode == libc::O_RDWR;

    if child_guard.kind() == InodeType::Dir && wants_write {
        return Err(Error::IsDir);
    }

    if wants_read
        && !is_readable(
            child_guard.mode(),
            child_guard.owner(),
            child_guard.group(),
            user,
            group,
        )
    {
        return Err(Error::Access);
    }
    if wants_write
        && !is_writeable(
            child_guard.mode(),
            child_guard.owner(),
            child_guard.group(),
            user,
            group,
        )
    {
        return Err(Error::Access);
    }

    // reference across the route
    *child_guard.open_count_mut() += 1;
    let file_id = child_guard.file_id();
    let tinfo = NodeInfo::of(&child_guard);
    let node = guard_node(&child_guard);
    drop(child_guard);

    let handle_data = match route::call_open(core, &fs_path, &node, tinfo.clone(), flags) {
        Ok(Dispatched::Handled(data)) => data,
        Ok(Dispatched::NoRoute) => None,
        Err(e) => {
            let _ = gc::unref(core, &fs_path, &node);
            return Err(e);
        }
    };

    if flags & libc::O_TRUNC != 0 && wants_write {
        if let Err(e) = io::truncate_node(core, &fs_path, &node, tinfo, 0, handle_data.clone()) {
            let _ = gc::unref(core, &fs_path, &node);
            return Err(e);
        }
    }

    if let Ok(mut guard) = wlock(&node, "open") {
        guard.set_atime(None);
    }

    Ok(FileHandle::create(node, &fs_path, file_id, flags, handle_data))
}

/// Create a new file under a write-locked parent, run the create route,
/// and attach it.  The new child is born with an open count of 1, which
/// becomes the handle's reference.
#[allow(clippy::too_many_arguments)]
fn do_create(
    core: &Core,
    fs_path: &str,
    parent: &mut WriteGuard,
    name: &str,
    flags: i32,
    mode: u32,
    user: u64,
    group: u64,
) -> Result<FileHandle> {
    if !is_writeable(parent.mode(), parent.owner(), parent.group(), user, group) {
        return Err(Error::Access);
    }

    let child = Inode::new_file(0, user, group, mode);

    let file_id = {
        let mut state = child.write();
        let id = core.allocate_inode_id(parent, &state)?;
        state.set_file_id(id);
        // reference, so the dispatcher sees a live target
        *state.open_count_mut() += 1;
        id
    };

    let tinfo = NodeInfo::new(file_id, InodeType::File, None);
    let parent_info = NodeInfo::of(parent);

    let handle_data =
        match route::call_create(core, fs_path, &child, tinfo, parent_info, mode) {
            Ok(Dispatched::Handled((inode_data, handle_data))) => {
                child.write().set_app_data(inode_data);
                handle_data
            }
            Ok(Dispatched::NoRoute) => None,
            Err(e) => {
                fs_error!("create route on '{}' rc = {}", fs_path, e.errno());
                core.release_inode_id(file_id);
                return Err(e);
            }
        };

    {
        let mut state = wlock(&child, "do_create")?;
        attach_lowlevel(parent, &mut state, name);
        state.set_atime(None);
    }
    core.file_count_update(1);

    Ok(FileHandle::create(child, fs_path, file_id, flags, handle_data))
}

/// Shorthand for `open` with `O_CREAT|O_WRONLY|O_TRUNC`.
pub fn create(core: &Core, path: &str, user: u64, group: u64, mode: u32) -> Result<FileHandle> {
    open(
        core,
        path,
        user,
        group,
        libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC,
        mode,
    )
}

/// Close a handle: run the close route, drop the handle's reference, and
/// destroy the inode if nothing else names or holds it.  The handle is
/// consumed regardless of the callback's verdict; its error, if any, is
/// returned after the bookkeeping completes.
pub fn close(core: &Core, fh: FileHandle) -> Result<()> {
    let handle_data = fh.state.read().app_data.clone();

    let tinfo = match rlock(&fh.node, "close") {
        Ok(state) => {
            if state.file_id() != fh.file_id {
                return Err(Error::BadFd);
            }
            NodeInfo::of(&state)
        }
        Err(_) => return Err(Error::BadFd),
    };

    let mut result = Ok(());

    if let Err(e) = route::call_close(core, &fh.path, &fh.node, tinfo, handle_data) {
        fs_error!("close route on '{}' rc = {}", fh.path, e.errno());
        result = Err(e);
    }

    if let Ok(mut guard) = wlock(&fh.node, "close") {
        *guard.open_count_mut() -= 1;
        if let Err(e) = try_destroy(core, &fh.path, guard) {
            result = result.and(Err(e));
        }
    }

    result
}
