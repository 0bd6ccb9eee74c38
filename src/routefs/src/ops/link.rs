//! Hard links.

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc;
use crate::inode::{
    attach_lowlevel, detach_lowlevel, guard_node, is_writeable, wlock, InodeType, WriteGuard,
};
use crate::ops::split_path;
use crate::path::{depth, sanitize_path};
use crate::resolve::resolve_path_write;
use crate::route::{self, NodeInfo};

/// Hard-link the inode at `from` to the name `to`.  Directories cannot be
/// hard-linked.  If the link route fails, the new name is removed again.
pub fn link(core: &Core, from: &str, to: &str, user: u64, group: u64) -> Result<()> {
    let from_path = sanitize_path(from);
    let to_path = sanitize_path(to);
    let (to_dir, to_name) = split_path(&to_path)?;

    // lock order: deeper path first, ties broken lexicographically
    let from_first = match depth(&from_path).cmp(&depth(&to_path)) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => from_path <= to_dir,
    };

    let mut from_guard: WriteGuard;
    let mut to_parent: WriteGuard;

    if from_first {
        from_guard = resolve_path_write(core, &from_path, user, group)?;
        to_parent = resolve_path_write(core, &to_dir, user, group)?;
    } else {
        to_parent = resolve_path_write(core, &to_dir, user, group)?;
        from_guard = resolve_path_write(core, &from_path, user, group)?;
    }

    if from_guard.kind() == InodeType::Dir {
        return Err(Error::Perm);
    }

    if to_parent.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }
    if !is_writeable(to_parent.mode(), to_parent.owner(), to_parent.group(), user, group) {
        return Err(Error::Access);
    }

    if to_parent
        .children()
        .map(|c| c.contains(&to_name))
        .unwrap_or(false)
    {
        return Err(Error::Exists);
    }

    // create the new name
    attach_lowlevel(&mut to_parent, &mut from_guard, &to_name);

    // preserve across the route
    *from_guard.open_count_mut() += 1;
    let tinfo = NodeInfo::of(&from_guard);
    let new_parent_info = NodeInfo::of(&to_parent);
    let from_node = guard_node(&from_guard);
    drop(from_guard);

    let route_result = route::call_link(
        core,
        &from_path,
        &from_node,
        tinfo,
        new_parent_info,
        &to_path,
    );

    if let Err(e) = route_result {
        // undo the insertion
        match wlock(&from_node, "link") {
            Ok(mut guard) => {
                if let Err(undo) = detach_lowlevel(&mut to_parent, &mut guard, &to_name) {
                    fs_error!("BUG: link undo of '{}' rc = {}", to_path, undo.errno());
                }
            }
            Err(_) => {
                fs_error!("BUG: link undo of '{}' found a dead source", to_path);
            }
        }
        drop(to_parent);
        let _ = gc::unref(core, &from_path, &from_node);
        return Err(e);
    }

    drop(to_parent);
    gc::unref(core, &from_path, &from_node)
}
