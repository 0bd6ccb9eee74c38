//! Symbolic links.

use crate::core::Core;
use crate::error::{Error, Result};
use crate::inode::{attach_lowlevel, is_writeable, wlock, Inode, InodeType};
use crate::ops::split_path;
use crate::path::sanitize_path;
use crate::resolve::{resolve_path_read, resolve_path_write};

/// Create a symlink at `linkpath` holding `target` verbatim.
pub fn symlink(core: &Core, target: &str, linkpath: &str, user: u64, group: u64) -> Result<()> {
    let fs_path = sanitize_path(linkpath);
    let (dir_path, name) = split_path(&fs_path)?;

    let mut parent = resolve_path_write(core, &dir_path, user, group)?;

    if parent.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }
    if !is_writeable(parent.mode(), parent.owner(), parent.group(), user, group) {
        return Err(Error::Access);
    }

    if parent
        .children()
        .map(|c| c.contains(&name))
        .unwrap_or(false)
    {
        return Err(Error::Exists);
    }

    let child = Inode::new_symlink(0, user, group, target);

    {
        let mut state = child.write();
        let id = core.allocate_inode_id(&parent, &state)?;
        state.set_file_id(id);
    }

    {
        let mut state = wlock(&child, "symlink")?;
        attach_lowlevel(&mut parent, &mut state, &name);
    }
    core.file_count_update(1);

    Ok(())
}

/// Read a symlink's target into `buf`, including the terminating NUL, up
/// to the buffer's capacity.  Returns the number of bytes copied.
pub fn readlink(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    buf: &mut [u8],
) -> Result<usize> {
    let guard = resolve_path_read(core, path, user, group)?;

    if guard.kind() != InodeType::Symlink {
        return Err(Error::Invalid);
    }

    let target = match guard.symlink_target() {
        Some(target) => target,
        None => {
            crate::debug::fs_error!(
                "BUG: inode {:X} is a symlink with no target",
                guard.file_id()
            );
            return Err(Error::Io);
        }
    };

    let mut bytes = target.as_bytes().to_vec();
    bytes.push(0);

    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);

    Ok(n)
}
