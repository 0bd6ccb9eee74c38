//! Metadata updates: chmod, chown, utimes.

use crate::core::Core;
use crate::error::{Error, Result};
use crate::inode::{Timespec, ROOT_USER_ID};
use crate::resolve::resolve_path_write;

/// Change permission bits (including suid/sgid/sticky).  Only the owner or
/// root may do this.
pub fn chmod(core: &Core, path: &str, user: u64, group: u64, mode: u32) -> Result<()> {
    let mut guard = resolve_path_write(core, path, user, group)?;

    if user != ROOT_USER_ID && guard.owner() != user {
        return Err(Error::Perm);
    }

    guard.set_mode(mode & 0o7777);
    guard.set_ctime(None);

    Ok(())
}

/// Change ownership.  Only the owner or root may do this; no in-group
/// check is made on the new group, so the caller must enforce its own
/// security model.
pub fn chown(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    new_user: u64,
    new_group: u64,
) -> Result<()> {
    let mut guard = resolve_path_write(core, path, user, group)?;

    if user != ROOT_USER_ID && guard.owner() != user {
        return Err(Error::Perm);
    }

    guard.set_owner_and_group(new_user, new_group);
    guard.set_ctime(None);

    Ok(())
}

/// Set access and modification times explicitly.  Only the owner or root
/// may do this.
pub fn utimes(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    atime: Timespec,
    mtime: Timespec,
) -> Result<()> {
    let mut guard = resolve_path_write(core, path, user, group)?;

    if user != ROOT_USER_ID && guard.owner() != user {
        return Err(Error::Perm);
    }

    guard.set_atime(Some(atime));
    guard.set_mtime(Some(mtime));
    guard.set_ctime(None);

    Ok(())
}
