//! Data plane: read, write, truncate, and sync.
//!
//! The library stores no file content; these façades dispatch to the
//! application's I/O routes and keep the inode metadata (size and
//! timestamps) in step via continuations that run while the route's
//! consistency lock is still held.

use crate::core::Core;
use crate::error::{Error, Result};
use crate::gc;
use crate::handle::FileHandle;
use crate::inode::{rlock, wlock, AppData, Inode, InodeRef};
use crate::resolve::resolve_path_write;
use crate::route::{self, Dispatched, NodeInfo};

/// Read up to `buf.len()` bytes at `offset` through the read route.
/// Without a matching route, reads return 0 bytes.
pub fn read(core: &Core, fh: &FileHandle, buf: &mut [u8], offset: u64) -> Result<usize> {
    let handle_state = fh.state.read();

    if fh.flags & libc::O_ACCMODE == libc::O_WRONLY {
        return Err(Error::BadFd);
    }

    let tinfo = snapshot(fh)?;
    let handle_data = handle_state.app_data.clone();

    let nread = match route::call_read(
        core,
        &fh.path,
        &fh.node,
        tinfo,
        buf,
        offset,
        handle_data,
    )? {
        Dispatched::Handled(n) => n,
        Dispatched::NoRoute => 0,
    };

    if let Ok(mut guard) = wlock(&fh.node, "read") {
        guard.set_atime(None);
    }

    Ok(nread)
}

/// Write `buf` at `offset` through the write route.  On success the
/// continuation extends the size to cover the written range and stamps
/// mtime/atime under the same locks as the callback.
pub fn write(core: &Core, fh: &FileHandle, buf: &[u8], offset: u64) -> Result<usize> {
    let handle_state = fh.state.read();

    let accmode = fh.flags & libc::O_ACCMODE;
    if accmode != libc::O_WRONLY && accmode != libc::O_RDWR {
        return Err(Error::BadFd);
    }

    let tinfo = snapshot(fh)?;
    let handle_data = handle_state.app_data.clone();

    let cont = |state: &mut Inode, nwritten: &usize| {
        state.set_mtime(None);
        state.set_atime(None);
        let end = offset + *nwritten as u64;
        if end > state.size() {
            state.set_size(end);
        }
    };

    let nwritten = match route::call_write(
        core,
        &fh.path,
        &fh.node,
        tinfo,
        buf,
        offset,
        handle_data,
        Some(&cont),
    )? {
        Dispatched::Handled(n) => n,
        Dispatched::NoRoute => {
            if let Ok(mut guard) = wlock(&fh.node, "write") {
                guard.set_mtime(None);
                guard.set_atime(None);
            }
            0
        }
    };

    Ok(nwritten)
}

/// Truncate through a file handle.
pub fn ftrunc(core: &Core, fh: &FileHandle, new_size: u64) -> Result<()> {
    let handle_state = fh.state.read();

    let accmode = fh.flags & libc::O_ACCMODE;
    if accmode != libc::O_WRONLY && accmode != libc::O_RDWR {
        return Err(Error::BadFd);
    }

    let tinfo = snapshot(fh)?;
    let handle_data = handle_state.app_data.clone();

    truncate_node(core, &fh.path, &fh.node, tinfo, new_size, handle_data)
}

/// Truncate by path.  The inode is referenced across the route and may be
/// destroyed on the way out if it was concurrently unlinked.
pub fn trunc(core: &Core, path: &str, user: u64, group: u64, new_size: u64) -> Result<()> {
    let (node, tinfo) = {
        let mut guard = resolve_path_write(core, path, user, group)?;
        if !crate::inode::is_writeable(guard.mode(), guard.owner(), guard.group(), user, group) {
            return Err(Error::Access);
        }
        *guard.open_count_mut() += 1;
        (crate::inode::guard_node(&guard), NodeInfo::of(&guard))
    };

    let result = truncate_node(core, path, &node, tinfo, new_size, None);

    let unref_result = gc::unref(core, path, &node);
    result.and(unref_result)
}

/// Dispatch the trunc route (or apply the default size update when no
/// route matches).  The continuation sets the size and timestamps while
/// the route's consistency lock is held.
pub(crate) fn truncate_node(
    core: &Core,
    path: &str,
    node: &InodeRef,
    tinfo: NodeInfo,
    new_size: u64,
    handle_data: Option<AppData>,
) -> Result<()> {
    let cont = |state: &mut Inode, _: &()| {
        state.set_mtime(None);
        state.set_atime(None);
        state.set_size(new_size);
    };

    match route::call_trunc(core, path, node, tinfo, new_size, handle_data, Some(&cont))? {
        Dispatched::Handled(()) => Ok(()),
        Dispatched::NoRoute => {
            let mut guard = wlock(node, "trunc")?;
            guard.set_mtime(None);
            guard.set_atime(None);
            guard.set_size(new_size);
            Ok(())
        }
    }
}

/// Sync a file handle through the sync route.
pub fn fsync(core: &Core, fh: &FileHandle) -> Result<()> {
    let _handle_state = fh.state.read();

    let tinfo = snapshot(fh)?;

    match route::call_sync(core, &fh.path, &fh.node, tinfo)? {
        Dispatched::Handled(()) | Dispatched::NoRoute => Ok(()),
    }
}

/// Snapshot a handle's inode, checking staleness.
fn snapshot(fh: &FileHandle) -> Result<NodeInfo> {
    let state = rlock(&fh.node, "io_snapshot").map_err(|_| Error::BadFd)?;
    if state.file_id() != fh.file_id {
        return Err(Error::BadFd);
    }
    Ok(NodeInfo::of(&state))
}
