//! Directory creation.

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc::try_garbage_collect;
use crate::inode::{
    attach_lowlevel, guard_node, is_writeable, wlock, Inode, InodeType, WriteGuard,
};
use crate::ops::split_path;
use crate::path::sanitize_path;
use crate::resolve::resolve_path_write;
use crate::route::{self, Dispatched, NodeInfo};

/// Create a directory.
pub fn mkdir(core: &Core, path: &str, mode: u32, user: u64, group: u64) -> Result<()> {
    let fs_path = sanitize_path(path);
    let (dir_path, name) = split_path(&fs_path)?;

    let mut parent = resolve_path_write(core, &dir_path, user, group)?;

    if parent.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }

    if !is_writeable(parent.mode(), parent.owner(), parent.group(), user, group) {
        fs_error!(
            "'{}' is not writable by {} (mode {:o}, owner {}:{})",
            dir_path,
            user,
            parent.mode(),
            parent.owner(),
            parent.group()
        );
        return Err(Error::Access);
    }

    mkdir_lowlevel(core, &fs_path, &mut parent, &name, mode, user, group)
}

/// Create a directory under a write-locked parent: clear any tombstoned
/// entry out of the way, allocate the child, run the mkdir route, and
/// attach.
fn mkdir_lowlevel(
    core: &Core,
    fs_path: &str,
    parent: &mut WriteGuard,
    name: &str,
    mode: u32,
    user: u64,
    group: u64,
) -> Result<()> {
    if let Some(child) = parent.children().and_then(|c| c.find(name)) {
        match wlock(&child, "mkdir") {
            Ok(child_guard) => {
                if !child_guard.is_deletion_in_progress() {
                    return Err(Error::Exists);
                }
                match try_garbage_collect(core, fs_path, parent, child_guard) {
                    Ok(Some(still_alive)) => drop(still_alive), // detached but still open
                    Ok(None) => {}
                    Err(Error::Exists) => return Err(Error::Exists),
                    Err(e) => {
                        fs_error!("BUG: garbage collection of '{}' rc = {}", fs_path, e.errno());
                        return Err(Error::Io);
                    }
                }
            }
            Err(_) => {
                // a destroyed husk still named here; free the slot
                if let Some(children) = parent.children_mut() {
                    children.remove(name);
                }
            }
        }
    }

    let parent_node = guard_node(parent);
    let child = Inode::new_dir(0, user, group, mode, &parent_node);

    let file_id = {
        let mut state = child.write();
        let id = core.allocate_inode_id(parent, &state)?;
        state.set_file_id(id);
        // reference this directory so it cannot vanish during the route
        *state.open_count_mut() += 1;
        id
    };

    let tinfo = NodeInfo::new(file_id, InodeType::Dir, None);
    let parent_info = NodeInfo::of(parent);

    let inode_data = match route::call_mkdir(core, fs_path, &child, tinfo, parent_info, mode) {
        Ok(Dispatched::Handled(data)) => data,
        Ok(Dispatched::NoRoute) => None,
        Err(e) => {
            fs_error!("mkdir route on '{}' rc = {}", fs_path, e.errno());
            core.release_inode_id(file_id);
            return Err(e);
        }
    };

    {
        let mut state = wlock(&child, "mkdir")?;
        *state.open_count_mut() -= 1;
        state.set_app_data(inode_data);
        attach_lowlevel(parent, &mut state, name);
    }
    core.file_count_update(1);

    Ok(())
}
