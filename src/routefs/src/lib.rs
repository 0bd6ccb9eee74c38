//! routefs: a library for building multi-threaded, in-memory virtual
//! filesystems.
//!
//! Applications embed a [`Core`] to get a POSIX-shaped hierarchical
//! namespace whose data operations are serviced by in-process callbacks
//! ("routes") instead of backing storage.  The library owns the directory
//! tree, inode metadata, handle tables, permission checks, path
//! resolution, concurrency control, and inode lifecycle; the application
//! supplies behavior for read/write/trunc/sync and is notified at the
//! create, open, close, detach, destroy, and other lifecycle points.
//!
//! ```no_run
//! use routefs::{Consistency, Core};
//!
//! let core = Core::new(None);
//!
//! // serve reads under /proc-style paths from a callback
//! core.route_read("^/status/([^/]+)$", Consistency::Concurrent,
//!     Box::new(|_core, req, buf, _off, _handle| {
//!         let payload = format!("worker {}\n", &req.match_groups()[0]);
//!         let n = payload.len().min(buf.len());
//!         buf[..n].copy_from_slice(&payload.as_bytes()[..n]);
//!         Ok(n)
//!     }))
//!     .unwrap();
//!
//! routefs::mkdir(&core, "/status", 0o755, 0, 0).unwrap();
//! ```

pub mod debug;

mod core;
mod error;
mod gc;
mod handle;
mod inode;
mod ops;
pub mod path;
mod resolve;
mod route;
mod wq;

#[cfg(test)]
mod tests;

pub use crate::core::{Core, InodeAllocator, InodeReleaser};
pub use crate::error::{Error, Result};
pub use crate::gc::{
    deferred_remove, deferred_remove_all, detach_all, detach_all_ctx, detach_all_resume,
    DetachCtx, DetachCtxFlags,
};
pub use crate::handle::{DirHandle, FileHandle};
pub use crate::inode::{
    AppData, Inode, InodeRef, InodeType, Timespec, XattrFlags, NAME_MAX, ROOT_GROUP_ID,
    ROOT_USER_ID,
};
pub use crate::resolve::PathIterator;
pub use crate::route::{
    CloseCallback, Consistency, CreateCallback, DestroyCallback, DetachCallback, GetxattrCallback,
    LinkCallback, ListxattrCallback, MkdirCallback, MknodCallback, NodeInfo, OpenCallback,
    ReadCallback, ReaddirCallback, RemovexattrCallback, RenameCallback, RequestData, RouteHandle,
    RouteKind, SetxattrCallback, StatCallback, SyncCallback, TruncCallback, WriteCallback,
};

pub use crate::ops::access::access;
pub use crate::ops::attr::{chmod, chown, utimes};
pub use crate::ops::io::{fsync, ftrunc, read, trunc, write};
pub use crate::ops::link::link;
pub use crate::ops::mkdir::mkdir;
pub use crate::ops::mknod::{mknod, mknod_ex};
pub use crate::ops::open::{close, create, open};
pub use crate::ops::readdir::{
    closedir, listdir, opendir, readdir, rewinddir, seekdir, telldir, DirEntry,
};
pub use crate::ops::rename::rename;
pub use crate::ops::rmdir::rmdir;
pub use crate::ops::stat::{fstat, fullmode, stat, statvfs};
pub use crate::ops::symlink::{readlink, symlink};
pub use crate::ops::unlink::unlink;
pub use crate::ops::xattr::{
    fgetxattr, flistxattr, fremovexattr, fremovexattr_all, fsetxattr, getxattr, listxattr,
    removexattr, setxattr,
};

/// Filesystem id reported by [`statvfs`].
pub const FILESYSTEM_TYPE: u64 = 0x1988_0119;

/// Prepare process-wide library state.  Nothing currently needs seeding;
/// applications that want a symmetric bracket around their filesystem
/// lifetimes call this before the first [`Core::new`].
pub fn library_init() -> Result<()> {
    Ok(())
}

/// Tear down process-wide library state set up by [`library_init`].
pub fn library_shutdown() -> Result<()> {
    Ok(())
}
