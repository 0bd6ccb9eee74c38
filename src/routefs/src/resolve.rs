//! Path resolution over the inode graph.
//!
//! The resolver walks a path with hand-over-hand locking: each child is
//! locked before the lock on its parent is released, so a concurrent
//! rename or unlink either happens entirely before the step (and the
//! lookup fails cleanly) or entirely after (and the mutator waits).
//! Intermediate inodes are read-locked; the terminal inode is locked in
//! the mode the caller asked for.

use std::ops::Deref;
use std::sync::Arc;

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::inode::{
    guard_node, is_searchable, read_guard_node, rlock, wlock, Inode, InodeRef, InodeType,
    ReadGuard, WriteGuard,
};
use crate::path::components;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A locked terminal inode, in whichever mode the caller requested.
pub(crate) enum Resolved {
    Read(ReadGuard),
    Write(WriteGuard),
}

/// Per-step evaluator run against each inode as the walk visits it, while
/// both it and its parent are still locked.  A failure aborts the walk with
/// the evaluator's error.
pub(crate) type EvalFn<'e> = dyn FnMut(&Inode) -> Result<()> + 'e;

/// A stepwise walk down a path, exposing each intermediate inode and path
/// prefix.  Prior holds are released on [`PathIterator::next`] and on
/// [`PathIterator::release`]; a failure halts iteration and records the
/// error.
pub struct PathIterator<'a> {
    segs: Vec<String>,
    next_idx: usize,
    prefix: String,
    cur: Option<Resolved>,
    err: Option<Error>,
    writelock: bool,
    done: bool,
    _core: &'a Core,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Resolved {
    /// The inode this guard is holding.
    pub(crate) fn node(&self) -> InodeRef {
        match self {
            Resolved::Read(g) => read_guard_node(g),
            Resolved::Write(g) => guard_node(g),
        }
    }
}

impl Deref for Resolved {
    type Target = Inode;

    fn deref(&self) -> &Inode {
        match self {
            Resolved::Read(g) => &**g,
            Resolved::Write(g) => &**g,
        }
    }
}

impl<'a> PathIterator<'a> {
    /// Start a walk at the root.  The iterator initially holds the root
    /// locked; call [`PathIterator::next`] to advance one component.
    pub fn begin(core: &'a Core, path: &str, writelock: bool) -> PathIterator<'a> {
        let mut itr = PathIterator {
            segs: components(path),
            next_idx: 0,
            prefix: "/".to_string(),
            cur: None,
            err: None,
            writelock,
            done: false,
            _core: core,
        };

        let root = core.root();
        let locked = if writelock {
            wlock(&root, "path_iterator").map(Resolved::Write)
        } else {
            rlock(&root, "path_iterator").map(Resolved::Read)
        };

        match locked {
            Ok(guard) if guard.link_count() > 0 => itr.cur = Some(guard),
            Ok(_) => {
                itr.err = Some(Error::NoEntry);
                itr.done = true;
            }
            Err(e) => {
                itr.err = Some(e);
                itr.done = true;
            }
        }

        itr
    }

    /// True once the walk has passed the final component or failed.
    pub fn end(&self) -> bool {
        self.done
    }

    /// Advance one path component, releasing the previous hold.
    pub fn next(&mut self) {
        if self.done {
            return;
        }

        if self.next_idx >= self.segs.len() {
            self.release();
            return;
        }

        let name = self.segs[self.next_idx].clone();
        self.next_idx += 1;

        let cur = match self.cur.as_ref() {
            Some(c) => c,
            None => {
                self.done = true;
                return;
            }
        };

        if cur.kind() != InodeType::Dir {
            self.fail(Error::NotDir);
            return;
        }

        let child = match cur.children().and_then(|c| c.find(&name)) {
            Some(child) => child,
            None => {
                self.fail(Error::NoEntry);
                return;
            }
        };

        // `..` of the root is the root; stay put
        if Arc::ptr_eq(&child, &cur.node()) {
            self.prefix = crate::path::fullpath(&self.prefix, &name);
            return;
        }

        let locked = if self.writelock {
            wlock(&child, "path_iterator").map(Resolved::Write)
        } else {
            rlock(&child, "path_iterator").map(Resolved::Read)
        };

        match locked {
            Ok(guard) => {
                if guard.is_deletion_in_progress() || guard.link_count() == 0 {
                    self.fail(Error::NoEntry);
                    return;
                }
                self.prefix = crate::path::fullpath(&self.prefix, &name);
                self.cur = Some(guard); // releases the parent hold
            }
            Err(e) => {
                self.fail(e);
            }
        }
    }

    /// The inode currently held, if any.
    pub fn entry(&self) -> Option<&Inode> {
        self.cur.as_ref().map(|c| &**c)
    }

    /// The path prefix resolved so far.
    pub fn path_so_far(&self) -> &str {
        &self.prefix
    }

    /// The error that halted the walk, if any.
    pub fn error(&self) -> Option<Error> {
        self.err
    }

    /// Drop all holds and finish the walk.
    pub fn release(&mut self) {
        self.cur = None;
        self.done = true;
    }

    fn fail(&mut self, err: Error) {
        self.err = Some(err);
        self.release();
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Resolve `path`, returning the terminal inode read-locked.
pub(crate) fn resolve_path_read(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
) -> Result<ReadGuard> {
    match resolve_inner(core, path, user, group, false, None)? {
        Resolved::Read(g) => Ok(g),
        Resolved::Write(_) => {
            fs_error!("BUG: resolver returned a write guard for a read request");
            Err(Error::Io)
        }
    }
}

/// Resolve `path`, returning the terminal inode write-locked.
pub(crate) fn resolve_path_write(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
) -> Result<WriteGuard> {
    resolve_path_write_with(core, path, user, group, None)
}

/// Resolve `path` write-locked, running `eval` against every visited inode.
pub(crate) fn resolve_path_write_with(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    eval: Option<&mut EvalFn<'_>>,
) -> Result<WriteGuard> {
    match resolve_inner(core, path, user, group, true, eval)? {
        Resolved::Write(g) => Ok(g),
        Resolved::Read(_) => {
            fs_error!("BUG: resolver returned a read guard for a write request");
            Err(Error::Io)
        }
    }
}

fn resolve_inner(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    write: bool,
    mut eval: Option<&mut EvalFn<'_>>,
) -> Result<Resolved> {
    if path.is_empty() {
        return Err(Error::Invalid);
    }

    let segs = components(path);

    let root = core.root();
    let mut cur = if segs.is_empty() && write {
        Resolved::Write(wlock(&root, "resolve_path")?)
    } else {
        Resolved::Read(rlock(&root, "resolve_path")?)
    };

    if cur.link_count() == 0 || cur.is_deletion_in_progress() {
        // the filesystem was nuked
        return Err(Error::NoEntry);
    }

    if let Some(ref mut f) = eval {
        f(&cur)?;
    }

    for (i, name) in segs.iter().enumerate() {
        let last = i + 1 == segs.len();

        if cur.kind() != InodeType::Dir {
            return Err(Error::NotDir);
        }

        if !is_searchable(cur.mode(), cur.owner(), cur.group(), user, group) {
            fs_error!(
                "user {} of group {} cannot search directory {:X} owned by {}:{}",
                user,
                group,
                cur.file_id(),
                cur.owner(),
                cur.group()
            );
            return Err(Error::Access);
        }

        let child = match cur.children().and_then(|c| c.find(name)) {
            Some(child) => child,
            None => return Err(Error::NoEntry),
        };

        // `..` of the root resolves to the root itself; re-locking would
        // self-deadlock, so stay on the current hold
        if Arc::ptr_eq(&child, &cur.node()) {
            if last && write {
                drop(cur);
                let guard = wlock(&child, "resolve_path")?;
                if guard.link_count() == 0 || guard.is_deletion_in_progress() {
                    return Err(Error::NoEntry);
                }
                cur = Resolved::Write(guard);
            }
            continue;
        }

        let next = if last && write {
            Resolved::Write(wlock(&child, "resolve_path")?)
        } else {
            Resolved::Read(rlock(&child, "resolve_path")?)
        };

        // run the evaluator while the parent is still locked
        if let Some(ref mut f) = eval {
            f(&next)?;
        }

        if next.link_count() == 0 || next.is_deletion_in_progress() {
            // just got removed
            return Err(Error::NoEntry);
        }

        // hand-over-hand: adopting the child releases the parent
        cur = next;
    }

    Ok(cur)
}
