//! Directory handles and listing.
//!
//! Readdir pagination is bookmark-based: the handle remembers the name of
//! the last entry returned, and the next call resumes at the first name
//! that sorts after it.  This stays stable when entries are inserted or
//! removed between calls; offset-based positions would not, and are not
//! offered.  `telldir` tokens snapshot the bookmark for later `seekdir`.

use crate::core::Core;
use crate::debug::fs_error;
use crate::error::{Error, Result};
use crate::gc::{self, try_destroy};
use crate::handle::DirHandle;
use crate::inode::{guard_node, is_readable, rlock, wlock, InodeType};
use crate::path::sanitize_path;
use crate::resolve::resolve_path_write;
use crate::route::{self, Dispatched, NodeInfo};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A directory entry snapshot handed to readdir callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry type
    pub kind: InodeType,

    /// Inode id
    pub file_id: u64,

    /// Entry name
    pub name: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Open a directory, producing a handle for [`readdir`].
pub fn opendir(core: &Core, path: &str, user: u64, group: u64) -> Result<DirHandle> {
    let fs_path = sanitize_path(path);

    let mut guard = resolve_path_write(core, &fs_path, user, group)?;

    if guard.kind() != InodeType::Dir {
        return Err(Error::NotDir);
    }
    if !is_readable(guard.mode(), guard.owner(), guard.group(), user, group) {
        return Err(Error::Access);
    }

    // reference it; it cannot be unlinked out from under the handle
    *guard.open_count_mut() += 1;
    let file_id = guard.file_id();
    let tinfo = NodeInfo::of(&guard);
    let node = guard_node(&guard);
    drop(guard);

    let handle_data = match route::call_open(core, &fs_path, &node, tinfo, 0) {
        Ok(Dispatched::Handled(data)) => data,
        Ok(Dispatched::NoRoute) => None,
        Err(e) => {
            fs_error!("open route on '{}' rc = {}", fs_path, e.errno());
            let _ = gc::unref(core, &fs_path, &node);
            return Err(e);
        }
    };

    Ok(DirHandle::create(node, &fs_path, file_id, handle_data))
}

/// Close a directory handle: run the close route, release the reference,
/// and destroy the directory if it was unlinked.  The handle is consumed
/// regardless.
pub fn closedir(core: &Core, dirh: DirHandle) -> Result<()> {
    let handle_data = dirh.state.read().app_data.clone();

    let tinfo = match rlock(&dirh.node, "closedir") {
        Ok(state) => {
            if state.file_id() != dirh.file_id {
                return Err(Error::BadFd);
            }
            NodeInfo::of(&state)
        }
        Err(_) => return Err(Error::BadFd),
    };

    let mut result = Ok(());

    if let Err(e) = route::call_close(core, &dirh.path, &dirh.node, tinfo, handle_data) {
        fs_error!("close route on '{}' rc = {}", dirh.path, e.errno());
        result = Err(e);
    }

    if let Ok(mut guard) = wlock(&dirh.node, "closedir") {
        *guard.open_count_mut() -= 1;
        if let Err(e) = try_destroy(core, &dirh.path, guard) {
            result = result.and(Err(e));
        }
    }

    result
}

/// Read up to `count` entries, resuming at the handle's bookmark.  `.` and
/// `..` are skipped, as are entries flagged for deletion.  Each returned
/// entry is snapshotted under the child's read lock.  The readdir route
/// may omit entries; the listing is compacted before it is returned.
pub fn readdir(core: &Core, dirh: &DirHandle, count: u64) -> Result<Vec<DirEntry>> {
    let mut handle_state = dirh.state.write();

    if handle_state.eof {
        return Ok(Vec::new());
    }

    let guard = rlock(&dirh.node, "readdir").map_err(|_| Error::BadFd)?;
    if guard.file_id() != dirh.file_id {
        return Err(Error::BadFd);
    }

    let children = guard.children().ok_or(Error::NotDir)?;
    let bookmark = handle_state.curr_name.clone();
    let want = usize::try_from(count).unwrap_or(usize::MAX);

    let mut collected: Vec<DirEntry> = Vec::new();

    {
        let iter: Box<dyn Iterator<Item = _> + '_> = match bookmark.as_deref() {
            Some(mark) => Box::new(children.iter_after(mark)),
            None => Box::new(children.iter()),
        };

        for (name, entry) in iter {
            if collected.len() >= want {
                break;
            }
            if name == "." || name == ".." {
                continue;
            }

            let child = match entry.upgrade() {
                Some(child) => child,
                None => continue,
            };

            // snapshot under the child's read lock; skip tombstones
            match rlock(&child, "readdir") {
                Ok(state) => {
                    if state.is_deletion_in_progress() {
                        continue;
                    }
                    collected.push(DirEntry {
                        kind: state.kind(),
                        file_id: state.file_id(),
                        name: name.clone(),
                    });
                }
                Err(_) => continue,
            }
        }
    }

    if collected.is_empty() {
        handle_state.eof = true;
        return Ok(Vec::new());
    }

    if let Some(last) = collected.last() {
        handle_state.curr_name = Some(last.name.clone());
    }

    let tinfo = NodeInfo::of(&guard);
    drop(guard);

    // give the user's readdir route a chance to omit entries
    let mut slots: Vec<Option<DirEntry>> = collected.into_iter().map(Some).collect();
    route::call_readdir(core, &dirh.path, &dirh.node, tinfo, &mut slots)?;

    Ok(slots.into_iter().flatten().collect())
}

/// Read the remainder of the directory in one call.
pub fn listdir(core: &Core, dirh: &DirHandle) -> Result<Vec<DirEntry>> {
    readdir(core, dirh, u64::MAX)
}

/// Store the current read position and return an opaque token for
/// [`seekdir`].
pub fn telldir(dirh: &DirHandle) -> i64 {
    let token = rand::random::<i64>();

    let mut state = dirh.state.write();
    let mark = state.curr_name.clone();
    state.telldir.push((token, mark));

    token
}

/// Return to a position previously saved with [`telldir`].  Unknown
/// tokens are ignored.
pub fn seekdir(dirh: &DirHandle, loc: i64) {
    let mut state = dirh.state.write();

    if let Some(mark) = state
        .telldir
        .iter()
        .find(|(token, _)| *token == loc)
        .map(|(_, mark)| mark.clone())
    {
        state.curr_name = mark;
        state.eof = false;
    }
}

/// Reset the read position to the beginning of the directory.
pub fn rewinddir(dirh: &DirHandle) {
    let mut state = dirh.state.write();
    state.curr_name = None;
    state.eof = false;
}
