//! Atomic rename.
//!
//! The two parent directories are resolved deepest-first (ties broken by
//! dirname order) so that concurrent renames cannot deadlock; when the
//! paths share a parent it is locked once.  The destination side is
//! resolved with the loop-detecting evaluator so a rename cannot move a
//! directory beneath itself.  No reader ever observes a window where both
//! names resolve, or neither does: every mutation happens under all the
//! relevant write locks, and the route runs before any of it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc::try_destroy;
use crate::inode::{
    attach_lowlevel, detach_lowlevel, detach_lowlevel_unchecked, is_searchable, is_writeable,
    wlock, Inode, InodeType, WriteGuard,
};
use crate::ops::split_path;
use crate::path::{depth, sanitize_path};
use crate::resolve::{resolve_path_write, resolve_path_write_with};
use crate::route::{self, NodeInfo};

/// Rename `old_path` to `new_path`, atomically replacing any existing
/// destination of the same type.
pub fn rename(
    core: &Core,
    old_path: &str,
    new_path: &str,
    user: u64,
    group: u64,
) -> Result<()> {
    let old_path = sanitize_path(old_path);
    let new_path = sanitize_path(new_path);

    let (old_dir, old_name) = split_path(&old_path)?;
    let (new_dir, new_name) = split_path(&new_path)?;

    // inode ids seen while resolving the destination's parent; the source
    // must not appear among them, or the rename would create a loop
    let mut seen = HashSet::new();

    let same_parent = old_dir == new_dir;
    let mut old_parent: WriteGuard;
    let mut new_parent: Option<WriteGuard> = None;

    if same_parent {
        old_parent = resolve_path_write(core, &old_dir, user, group)?;
    } else {
        // resolve the parent lower in the hierarchy first; break ties on
        // the dirname string to get a total lock order
        let old_first = match depth(&old_path).cmp(&depth(&new_path)) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => old_dir <= new_dir,
        };

        let mut eval = |state: &Inode| -> Result<()> {
            if !seen.insert(state.file_id()) {
                return Err(Error::Invalid);
            }
            Ok(())
        };

        if old_first {
            old_parent = resolve_path_write(core, &old_dir, user, group)?;
            new_parent = Some(resolve_path_write_with(
                core, &new_dir, user, group,
                Some(&mut eval),
            )?);
        } else {
            new_parent = Some(resolve_path_write_with(
                core, &new_dir, user, group,
                Some(&mut eval),
            )?);
            old_parent = resolve_path_write(core, &old_dir, user, group)?;
        }
    }

    // both parents must be searchable and writable
    {
        let mut check = |state: &Inode| -> Result<()> {
            if !is_searchable(state.mode(), state.owner(), state.group(), user, group)
                || !is_writeable(state.mode(), state.owner(), state.group(), user, group)
            {
                return Err(Error::Access);
            }
            Ok(())
        };
        check(&old_parent)?;
        if let Some(ref np) = new_parent {
            check(np)?;
        }
    }

    let fent_old = old_parent
        .children()
        .and_then(|c| c.find(&old_name))
        .ok_or(Error::NoEntry)?;

    let fent_new = match new_parent.as_ref() {
        Some(np) => np.children().and_then(|c| c.find(&new_name)),
        None => old_parent.children().and_then(|c| c.find(&new_name)),
    };

    // renaming an inode onto itself is a no-op
    if let Some(ref fent_new) = fent_new {
        if Arc::ptr_eq(&fent_old, fent_new) {
            return Ok(());
        }
    }

    let mut old_guard = wlock(&fent_old, "rename").map_err(|_| Error::NoEntry)?;

    let mut new_guard = match fent_new {
        Some(ref fent_new) => match wlock(fent_new, "rename") {
            Ok(guard) => Some(guard),
            // a destroyed husk under the destination name; overwrite it
            Err(_) => None,
        },
        None => None,
    };

    // source and existing destination must agree on directory-ness
    if let Some(ref ng) = new_guard {
        if ng.kind() != old_guard.kind() {
            return Err(if ng.kind() == InodeType::Dir {
                Error::IsDir
            } else {
                Error::NotDir
            });
        }
    }

    // refuse a destination whose ancestor chain contains the source
    if seen.contains(&old_guard.file_id()) {
        return Err(Error::Invalid);
    }

    // run the user route before any mutation; by construction its
    // discipline is route-level, so holding the inode locks here is safe
    {
        let tinfo = NodeInfo::of(&old_guard);
        let old_parent_info = NodeInfo::of(&old_parent);
        let new_parent_info = match new_parent.as_ref() {
            Some(np) => NodeInfo::of(np),
            None => old_parent_info.clone(),
        };
        let dest_info = new_guard.as_ref().map(|g| NodeInfo::of(g));

        route::call_rename(
            core,
            &old_path,
            &fent_old,
            tinfo,
            old_parent_info,
            new_parent_info,
            &new_path,
            dest_info,
        )?;
    }

    // perform the rename: evict the destination first, so a refused
    // eviction (non-empty directory) leaves the source untouched
    if let Some(ref mut ng) = new_guard {
        let dst_parent_state: &mut Inode = match new_parent.as_mut() {
            Some(np) => np,
            None => &mut old_parent,
        };
        detach_lowlevel(dst_parent_state, ng, &new_name)?;
    }

    {
        let src_parent_state: &mut Inode = &mut old_parent;
        if let Err(e) = detach_lowlevel_unchecked(src_parent_state, &mut old_guard, &old_name) {
            fs_error!("BUG: rename detach of '{}' rc = {}", old_path, e.errno());
            return Err(Error::Io);
        }
    }

    {
        let dst_parent = match new_parent.as_mut() {
            Some(np) => np,
            None => &mut old_parent,
        };
        attach_lowlevel(dst_parent, &mut old_guard, &new_name);
    }

    drop(old_guard);

    // the overwritten inode may now be fully unreferenced
    if let Some(ng) = new_guard {
        try_destroy(core, &new_path, ng)?;
    }

    Ok(())
}
