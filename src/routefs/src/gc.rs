//! Inode destruction, subtree detach, and deferred garbage collection.
//!
//! Destruction is two-phase.  Detaching removes a name and decrements the
//! link count; the inode lives on while handles reference it.  Destroying
//! reclaims the inode once both the link count and the open count have
//! reached zero: the detach and destroy notifications run, the inode is
//! marked dead, its fields are dropped, and its id goes back to the
//! allocator.  Whole subtrees are detached breadth-first so the engine
//! never holds a parent's lock while locking a child against the grain of
//! a concurrent lookup.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::core::Core;
use crate::debug::{fs_debug, fs_error};
use crate::error::{Error, Result};
use crate::inode::{
    detach_lowlevel_ex, guard_node, wlock, wlock_raw, AppData, EntrySet, Inode, InodeRef,
    InodeType, WriteGuard,
};
use crate::path::{basename, fullpath};
use crate::resolve::resolve_path_write;
use crate::route::{self, NodeInfo};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

bitflags! {
    /// Behavior switches for a [`DetachCtx`].
    pub struct DetachCtxFlags: u32 {
        /// Abort the teardown if a detach/destroy callback fails.
        const FAIL_ON_CALLBACK_ERROR = 0x1;
    }
}

/// Work list for a breadth-first subtree teardown.  A teardown that stops
/// early (callback failure with [`DetachCtxFlags::FAIL_ON_CALLBACK_ERROR`])
/// keeps its place here and can be resumed by calling
/// [`detach_all_ex`] again with `None` for the children.
pub struct DetachCtx {
    queue: VecDeque<(String, InodeRef)>,
    flags: DetachCtxFlags,
    cbrc: Option<Error>,
}

/// What [`try_destroy`] did with the inode.
pub(crate) enum DestroyOutcome {
    /// Still referenced; the caller gets its lock back.
    Kept(WriteGuard),
    /// Reclaimed.  Carries the callback error, if one was masked.
    Destroyed(Option<Error>),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DetachCtx {
    pub fn new() -> DetachCtx {
        DetachCtx {
            queue: VecDeque::new(),
            flags: DetachCtxFlags::empty(),
            cbrc: None,
        }
    }

    /// Replace the flags, returning the previous set.
    pub fn set_flags(&mut self, flags: DetachCtxFlags) -> DetachCtxFlags {
        std::mem::replace(&mut self.flags, flags)
    }

    /// The error from the last failed detach/destroy callback.
    pub fn last_callback_error(&self) -> Option<Error> {
        self.cbrc
    }
}

impl Default for DetachCtx {
    fn default() -> Self {
        DetachCtx::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Run the detach notification for an inode whose name is going away.
/// Route misses are not errors; callback failures are returned.
pub(crate) fn run_user_detach(
    core: &Core,
    path: &str,
    garbage_collect: bool,
    data: Option<AppData>,
    node: &InodeRef,
) -> Result<()> {
    let tinfo = {
        let state = node.read_arc();
        NodeInfo::new(state.file_id(), state.kind(), data.clone())
    };

    match route::call_detach(core, path, Some(node), tinfo, garbage_collect, data) {
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Run the destroy notification for an inode that is about to be reclaimed.
pub(crate) fn run_user_destroy(
    core: &Core,
    path: &str,
    data: Option<AppData>,
    node: &InodeRef,
) -> Result<()> {
    let tinfo = {
        let state = node.read_arc();
        NodeInfo::new(state.file_id(), state.kind(), data.clone())
    };

    match route::call_destroy(core, path, Some(node), tinfo, data) {
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Mark an inode dead and drop its fields, returning the id to the
/// allocator and decrementing the file count.  Idempotent.
pub(crate) fn destroy_fields(core: &Core, node: &InodeRef) {
    let file_id = {
        let mut guard = wlock_raw(node, "destroy_fields");
        if guard.kind() == InodeType::Dead {
            return;
        }

        fs_debug!("destroy inode {:X}", guard.file_id());

        let file_id = guard.file_id();
        guard.set_kind(InodeType::Dead);
        guard.take_children_set();
        guard.xattrs_mut().clear();
        guard.take_app_data();
        file_id
    };

    core.release_inode_id(file_id);

    // the root (id 0) is never part of the file count
    if file_id != 0 {
        core.file_count_update(-1);
    }
}

/// Destroy an inode if nothing links to it and nothing has it open.
///
/// The caller hands over its write lock.  If the inode survives, the lock
/// comes back in [`DestroyOutcome::Kept`].  If it is destroyed, the open
/// count is transiently bumped so no other thread can race the same
/// destruction, the lock is dropped while the detach and destroy
/// notifications run, and the inode is then reclaimed.  Callback failures
/// are masked into the outcome.
pub(crate) fn try_destroy(
    core: &Core,
    path: &str,
    mut guard: WriteGuard,
) -> Result<DestroyOutcome> {
    if guard.link_count() > 0 || guard.open_count() > 0 {
        return Ok(DestroyOutcome::Kept(guard));
    }

    if guard.link_count() < 0 || guard.open_count() < 0 {
        fs_error!(
            "BUG: entry {:X} has negative counts (link = {}, open = {})",
            guard.file_id(),
            guard.link_count(),
            guard.open_count()
        );
        return Err(Error::Io);
    }

    // bar other threads from entering this destruction
    *guard.open_count_mut() += 1;

    let node = guard_node(&guard);
    let garbage_collect = guard.is_deletion_in_progress();
    let data = guard.app_data();
    drop(guard);

    let mut cbrc = None;

    if let Err(e) = run_user_detach(core, path, garbage_collect, data.clone(), &node) {
        fs_error!("WARN: detach route on '{}' rc = {}", path, e.errno());
        cbrc = Some(e);
    }

    if let Err(e) = run_user_destroy(core, path, data, &node) {
        fs_error!("WARN: destroy route on '{}' rc = {}", path, e.errno());
        cbrc = cbrc.or(Some(e));
    }

    destroy_fields(core, &node);

    Ok(DestroyOutcome::Destroyed(cbrc))
}

/// Detach `child` (already tombstoned) from `parent` and destroy it if
/// possible.  Returns the child's lock if it was detached but survives,
/// `None` if it was destroyed, and `exists` if it was never tombstoned.
pub(crate) fn try_garbage_collect(
    core: &Core,
    path: &str,
    parent: &mut Inode,
    mut child: WriteGuard,
) -> Result<Option<WriteGuard>> {
    if !child.is_deletion_in_progress() {
        return Err(Error::Exists);
    }

    let name = basename(path);
    let child_id = child.file_id();

    // detach without an mtime bump; the name was already semantically gone
    match detach_lowlevel_ex(parent, &mut child, &name, false) {
        Ok(()) => {}
        Err(Error::NoEntry) => {} // already removed
        Err(Error::NotEmpty) => return Err(Error::NotEmpty),
        Err(e) => {
            fs_error!("BUG: detach of '{}' rc = {}", path, e.errno());
            return Err(Error::Io);
        }
    }

    match try_destroy(core, path, child)? {
        DestroyOutcome::Kept(guard) => Ok(Some(guard)),
        DestroyOutcome::Destroyed(_) => {
            fs_debug!("garbage-collected {} ({:X})", path, child_id);
            Ok(None)
        }
    }
}

/// Tombstone an inode.  For a directory, swap its children out for a fresh
/// empty set and hand the old set back; the caller decides what happens to
/// them.  Cannot be undone.
pub(crate) fn tag_garbage(guard: &mut WriteGuard) -> Result<Option<EntrySet>> {
    fs_debug!(
        "tag {:X} as garbage (link count {}, open count {})",
        guard.file_id(),
        guard.link_count(),
        guard.open_count()
    );

    if guard.kind() != InodeType::Dir {
        guard.set_deletion_in_progress();
        return Ok(None);
    }

    let node = guard_node(guard);
    let old = match guard.take_children_set() {
        Some(old) => old,
        None => {
            fs_error!("BUG: directory {:X} has no children set", guard.file_id());
            return Err(Error::Io);
        }
    };

    let parent_weak = match old.parent() {
        Some(parent) => Arc::downgrade(&parent),
        // the parent may already have been reclaimed by a teardown above us
        None => Weak::new(),
    };

    let fresh = EntrySet::with_dots(Arc::downgrade(&node), parent_weak);
    guard.put_children_set(fresh);
    guard.set_deletion_in_progress();

    Ok(Some(old))
}

/// Move every real child of `set` onto the work list.
fn detach_queue_children(ctx: &mut DetachCtx, dir_path: &str, set: &mut EntrySet) {
    for (name, node) in set.take_children() {
        ctx.queue.push_back((fullpath(dir_path, &name), node));
    }
}

/// Breadth-first teardown of the queued subtree.
///
/// `dir_children` is the set previously swapped out of the subtree root by
/// [`tag_garbage`]; pass `None` when resuming a stopped context.  Each
/// dequeued directory is tagged, its children are appended, and the inode
/// is unlinked and destroyed if no handle keeps it alive.  Inodes that are
/// still open stay in the dead-but-linkless state until their last handle
/// closes.
pub(crate) fn detach_all_ex(
    core: &Core,
    dir_path: &str,
    dir_children: Option<&mut EntrySet>,
    ctx: &mut DetachCtx,
) -> Result<()> {
    // Breadth-first order matters: lookups lock parent before child, so the
    // teardown releases each directory before descending into it.
    if let Some(children) = dir_children {
        detach_queue_children(ctx, dir_path, children);
    }

    while let Some((path, node)) = ctx.queue.pop_front() {
        let mut guard = match wlock(&node, "detach_all") {
            Ok(guard) => guard,
            Err(_) => {
                fs_error!("BUG: dead child at '{}'", path);
                continue;
            }
        };

        if guard.kind() == InodeType::Dir {
            if let Some(mut children) = tag_garbage(&mut guard)? {
                detach_queue_children(ctx, &path, &mut children);
            }
        } else {
            guard.set_deletion_in_progress();
        }

        // this entry was detached from exactly one parent by this teardown;
        // a tombstone that already gave up its links has nothing left to lose
        if guard.link_count() > 0 {
            *guard.link_count_mut() -= 1;
        }

        match try_destroy(core, &path, guard)? {
            DestroyOutcome::Kept(guard) => drop(guard),
            DestroyOutcome::Destroyed(Some(e))
                if ctx.flags.contains(DetachCtxFlags::FAIL_ON_CALLBACK_ERROR) =>
            {
                ctx.cbrc = Some(e);
                return Err(e);
            }
            DestroyOutcome::Destroyed(_) => {}
        }
    }

    Ok(())
}

/// Detach and destroy everything below `root_path`, tombstoning the
/// directory itself.
pub fn detach_all(core: &Core, root_path: &str) -> Result<()> {
    let mut ctx = DetachCtx::new();
    detach_all_ctx(core, root_path, &mut ctx)
}

/// [`detach_all`] with a caller-provided context, so a teardown stopped by
/// a callback failure (with [`DetachCtxFlags::FAIL_ON_CALLBACK_ERROR`]
/// set) can be resumed with [`detach_all_resume`].
pub fn detach_all_ctx(core: &Core, root_path: &str, ctx: &mut DetachCtx) -> Result<()> {
    let mut guard = resolve_path_write(core, root_path, 0, 0)?;
    let mut children = match tag_garbage(&mut guard)? {
        Some(children) => children,
        None => return Err(Error::NotDir),
    };
    drop(guard);

    detach_all_ex(core, root_path, Some(&mut children), ctx)
}

/// Resume a stopped teardown where it left off.
pub fn detach_all_resume(core: &Core, root_path: &str, ctx: &mut DetachCtx) -> Result<()> {
    detach_all_ex(core, root_path, None, ctx)
}

/// Tombstone a file and schedule its destruction on the deferred queue.
///
/// Resolution of the name fails from this point on; the inode survives
/// until the queued job runs and any open handles close.  Directories are
/// rejected with `is-dir`; use [`deferred_remove_all`].
pub fn deferred_remove(core: &Arc<Core>, child_path: &str, user: u64, group: u64) -> Result<()> {
    let mut guard = resolve_path_write(core, child_path, user, group)?;

    if guard.kind() == InodeType::Dir {
        return Err(Error::IsDir);
    }

    guard.set_deletion_in_progress();
    *guard.link_count_mut() -= 1;
    if guard.link_count() < 0 {
        *guard.link_count_mut() = 0;
    }

    // keep the inode resident until the job runs
    *guard.open_count_mut() += 1;

    let node = guard_node(&guard);
    drop(guard);

    let weak_core = Arc::downgrade(core);
    let path = child_path.to_string();

    core.enqueue_deferred(Box::new(move || {
        let core = match weak_core.upgrade() {
            Some(core) => core,
            None => return,
        };

        fs_debug!("deferred: garbage-collect {}", path);

        let mut guard = wlock_raw(&node, "deferred_remove");
        if guard.kind() == InodeType::Dead {
            return;
        }
        *guard.open_count_mut() -= 1;

        if let Err(e) = try_destroy(&core, &path, guard) {
            fs_error!("LEAK: deferred destroy of '{}' rc = {}", path, e.errno());
        }
    }))
}

/// Tombstone a directory and all of its descendants and schedule their
/// destruction on the deferred queue.
pub fn deferred_remove_all(
    core: &Arc<Core>,
    child_path: &str,
    user: u64,
    group: u64,
) -> Result<()> {
    let mut guard = resolve_path_write(core, child_path, user, group)?;

    if guard.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }

    let mut children = match tag_garbage(&mut guard)? {
        Some(children) => children,
        None => return Err(Error::NotDir),
    };

    *guard.link_count_mut() -= 1;
    if guard.link_count() < 0 {
        *guard.link_count_mut() = 0;
    }
    drop(guard);

    let weak_core = Arc::downgrade(core);
    let path = child_path.to_string();

    core.enqueue_deferred(Box::new(move || {
        let core = match weak_core.upgrade() {
            Some(core) => core,
            None => return,
        };

        fs_debug!("deferred: garbage-collect all children of {}", path);

        let mut ctx = DetachCtx::new();
        if let Err(e) = detach_all_ex(&core, &path, Some(&mut children), &mut ctx) {
            fs_error!("LEAK: deferred teardown of '{}' rc = {}", path, e.errno());
        }
    }))
}

/// Resolve `path`, take a reference on the terminal inode, and hand the
/// inode back unlocked.  Pair with [`unref`].
pub(crate) fn ref_path(core: &Core, path: &str, user: u64, group: u64) -> Result<InodeRef> {
    let mut guard = resolve_path_write(core, path, user, group)?;
    *guard.open_count_mut() += 1;
    Ok(guard_node(&guard))
}

/// Drop a reference taken with [`ref_path`] (or by bumping the open count
/// directly), destroying the inode if it was the last.
pub(crate) fn unref(core: &Core, path: &str, node: &InodeRef) -> Result<()> {
    let guard = match wlock(node, "unref") {
        Ok(guard) => guard,
        // already destroyed by a racing teardown; nothing to release
        Err(_) => return Ok(()),
    };

    let mut guard = guard;
    *guard.open_count_mut() -= 1;

    try_destroy(core, path, guard).map(|_| ())
}
