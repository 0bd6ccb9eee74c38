//! POSIX-shaped operation façades.
//!
//! Each façade follows one pattern: resolve the relevant paths to locked
//! inodes, re-check permissions, reference the inode and release its lock
//! while user callbacks run, dispatch the matching route, reacquire the
//! lock for bookkeeping, and unreference (possibly destroying the inode).

pub mod access;
pub mod attr;
pub mod io;
pub mod link;
pub mod mkdir;
pub mod mknod;
pub mod open;
pub mod readdir;
pub mod rename;
pub mod rmdir;
pub mod stat;
pub mod symlink;
pub mod unlink;
pub mod xattr;

use crate::error::{Error, Result};
use crate::inode::NAME_MAX;
use crate::path::{basename, dirname, sanitize_path};

/// Split a path into (dirname, basename), rejecting over-long and empty
/// names.
pub(crate) fn split_path(path: &str) -> Result<(String, String)> {
    let clean = sanitize_path(path);
    let name = basename(&clean);

    if name.is_empty() {
        return Err(Error::Invalid);
    }
    if name.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }

    Ok((dirname(&clean), name))
}
