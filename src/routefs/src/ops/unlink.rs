//! File removal.

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc::try_destroy;
use crate::inode::{detach_lowlevel, is_writeable, wlock, InodeType};
use crate::ops::split_path;
use crate::path::sanitize_path;
use crate::resolve::resolve_path_write;

/// Unlink a file: remove its name and destroy the inode unless a handle
/// still references it.
pub fn unlink(core: &Core, path: &str, user: u64, group: u64) -> Result<()> {
    let fs_path = sanitize_path(path);
    let (dir_path, name) = split_path(&fs_path)?;

    let mut parent = resolve_path_write(core, &dir_path, user, group)?;

    if parent.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }
    if !is_writeable(parent.mode(), parent.owner(), parent.group(), user, group) {
        return Err(Error::Access);
    }

    let child = parent
        .children()
        .and_then(|c| c.find(&name))
        .ok_or(Error::NoEntry)?;

    let mut child_guard = wlock(&child, "unlink").map_err(|_| Error::NoEntry)?;

    if child_guard.kind() == InodeType::Dir {
        return Err(Error::IsDir);
    }

    // don't worry if someone raced ahead of us
    match detach_lowlevel(&mut parent, &mut child_guard, &name) {
        Ok(()) | Err(Error::NoEntry) => {}
        Err(e) => {
            fs_error!("detach of '{}' rc = {}", fs_path, e.errno());
            return Err(e);
        }
    }

    drop(parent);

    try_destroy(core, &fs_path, child_guard)?;
    Ok(())
}
