//! Introspection: stat and statvfs.

use crate::core::Core;
use crate::error::Result;
use crate::gc;
use crate::inode::{rlock, Inode, InodeRef, InodeType, NAME_MAX};
use crate::resolve::resolve_path_read;
use crate::route::{self, NodeInfo};
use crate::FILESYSTEM_TYPE;

/// Build the full `st_mode` value from a type and permission bits.
pub fn fullmode(kind: InodeType, mode: u32) -> u32 {
    kind.mode_bits() | (mode & 0o7777)
}

/// Fill a stat record from a locked inode.  Only the portable fields are
/// populated; blocks and block size are zero.
pub(crate) fn entry_stat(state: &Inode) -> libc::stat {
    let mut sb: libc::stat = unsafe { std::mem::zeroed() };

    sb.st_dev = 0;
    sb.st_ino = state.file_id() as _;
    sb.st_mode = fullmode(state.kind(), state.mode()) as _;
    sb.st_nlink = state.link_count() as _;
    sb.st_uid = state.owner() as _;
    sb.st_gid = state.group() as _;
    sb.st_rdev = state.dev() as _;
    sb.st_size = state.size() as _;
    sb.st_blksize = 0;
    sb.st_blocks = 0;

    sb.st_atime = state.atime().0 as _;
    sb.st_atime_nsec = state.atime().1 as _;
    sb.st_mtime = state.mtime().0 as _;
    sb.st_mtime_nsec = state.mtime().1 as _;
    sb.st_ctime = state.ctime().0 as _;
    sb.st_ctime_nsec = state.ctime().1 as _;

    sb
}

/// Stat a path.  The inode is referenced across the stat route.
pub fn stat(core: &Core, path: &str, user: u64, group: u64) -> Result<libc::stat> {
    let node = gc::ref_path(core, path, user, group)?;

    let result = fstat(core, path, &node);

    let _ = gc::unref(core, path, &node);
    result
}

/// Stat an inode directly.  The stat route may rewrite the record.
pub fn fstat(core: &Core, path: &str, node: &InodeRef) -> Result<libc::stat> {
    let (mut sb, tinfo) = {
        let state = rlock(node, "fstat")?;
        (entry_stat(&state), NodeInfo::of(&state))
    };

    route::call_stat(core, path, node, tinfo, &mut sb)?;

    Ok(sb)
}

/// Stat the filesystem that holds `path`.  The fs id is fixed, the file
/// count reflects the core's running count, and all block-related fields
/// are zero.
pub fn statvfs(core: &Core, path: &str, user: u64, group: u64) -> Result<libc::statvfs> {
    let guard = resolve_path_read(core, path, user, group)?;
    drop(guard);

    let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };

    vfs.f_bsize = 0;
    vfs.f_frsize = 0;
    vfs.f_blocks = 0;
    vfs.f_bfree = 0;
    vfs.f_bavail = 0;
    vfs.f_files = core.file_count() as _;
    vfs.f_ffree = 0;
    vfs.f_favail = 0;
    vfs.f_fsid = FILESYSTEM_TYPE as _;
    vfs.f_flag = 0;
    vfs.f_namemax = NAME_MAX as _;

    Ok(vfs)
}
