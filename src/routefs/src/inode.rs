//! In-memory inodes, directory entry sets, and extended attribute sets.
//!
//! An inode is shared as `Arc<RwLock<Inode>>`; the lock protects every
//! mutable field, including the open and link counts and the xattr set.
//! Lock helpers hand out owned guards so that callers can carry a locked
//! inode across function boundaries (the resolver returns one), and they
//! refuse to lock an inode whose type is [`InodeType::Dead`] so that a
//! reader racing a destruction observes "no entry" rather than a carcass.

use std::any::Any;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::debug::{fs_error, fs_lock_trace};
use crate::error::{Error, Result};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Maximum length of a single directory entry name, in bytes.
pub const NAME_MAX: usize = 255;

/// User id that bypasses permission checks.
pub const ROOT_USER_ID: u64 = 0;

/// Group id of the superuser group.
pub const ROOT_GROUP_ID: u64 = 0;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Opaque application payload attached to the core, to inodes, and to
/// handles.
pub type AppData = Arc<dyn Any + Send + Sync>;

/// Shared reference to an inode.
pub type InodeRef = Arc<RwLock<Inode>>;

/// Weak reference to an inode; used for the `.` and `..` entries, which are
/// not ownership edges.
pub(crate) type WeakInodeRef = Weak<RwLock<Inode>>;

/// Owned read guard on an inode.
pub type ReadGuard = ArcRwLockReadGuard<RawRwLock, Inode>;

/// Owned write guard on an inode.
pub type WriteGuard = ArcRwLockWriteGuard<RawRwLock, Inode>;

/// A (seconds, nanoseconds) timestamp.
pub type Timespec = (i64, i32);

/// The type of an inode.  `Dead` is terminal: an inode observed in this
/// state must be treated as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Dead,
    File,
    Dir,
    Fifo,
    Sock,
    CharDev,
    BlockDev,
    Symlink,
}

impl InodeType {
    /// The `S_IF*` bits for this type, or 0 for `Dead`.
    pub fn mode_bits(self) -> u32 {
        match self {
            InodeType::Dead => 0,
            InodeType::File => libc::S_IFREG as u32,
            InodeType::Dir => libc::S_IFDIR as u32,
            InodeType::Fifo => libc::S_IFIFO as u32,
            InodeType::Sock => libc::S_IFSOCK as u32,
            InodeType::CharDev => libc::S_IFCHR as u32,
            InodeType::BlockDev => libc::S_IFBLK as u32,
            InodeType::Symlink => libc::S_IFLNK as u32,
        }
    }
}

/// One slot in a directory's entry set.  `.` and `..` are weak back-edges;
/// real children are owned.
#[derive(Clone)]
pub(crate) enum EntryRef {
    Strong(InodeRef),
    Weak(WeakInodeRef),
}

impl EntryRef {
    pub(crate) fn upgrade(&self) -> Option<InodeRef> {
        match self {
            EntryRef::Strong(node) => Some(node.clone()),
            EntryRef::Weak(node) => node.upgrade(),
        }
    }
}

/// An ordered set of (name, inode) pairs.  Every directory set carries the
/// mandatory `.` and `..` entries; they are excluded from child counts and
/// cannot be removed.
pub(crate) struct EntrySet {
    entries: BTreeMap<String, EntryRef>,
}

bitflags! {
    /// Modes for inserting an extended attribute.
    pub struct XattrFlags: u32 {
        /// Fail with `exists` if the attribute is already present.
        const CREATE = 0x1;
        /// Fail with `no-attr` if the attribute is not present.
        const REPLACE = 0x2;
    }
}

/// An ordered set of (name, bytes) extended attributes.  Shares the inode
/// lock.
#[derive(Default)]
pub(crate) struct XattrSet {
    entries: BTreeMap<String, Vec<u8>>,
}

/// The lockable state of one filesystem object.
pub struct Inode {
    /// Inode number
    file_id: u64,

    /// Object type; `Dead` once destroyed
    kind: InodeType,

    /// Permission bits (and suid/sgid/sticky)
    mode: u32,

    /// Owning user id
    owner: u64,

    /// Owning group id
    group: u64,

    /// Status-change, modification, and access times
    ctime: Timespec,
    mtime: Timespec,
    atime: Timespec,

    /// Number of directory entries (other than `.`) naming this inode
    link_count: i64,

    /// Number of live handles plus in-flight references
    open_count: i64,

    /// Size in bytes, as maintained by the I/O continuations
    size: u64,

    /// Device major/minor for special files
    dev: u64,

    /// Tombstone: the inode has been semantically removed but not reclaimed
    deletion_in_progress: bool,

    /// Children (directories only)
    children: Option<EntrySet>,

    /// Extended attributes
    xattrs: XattrSet,

    /// Symlink target (symlinks only)
    symlink_target: Option<String>,

    /// Application payload installed by create/mkdir/mknod callbacks
    app_data: Option<AppData>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EntrySet {
    /// A fresh set holding only `.` and `..`.
    pub(crate) fn with_dots(me: WeakInodeRef, parent: WeakInodeRef) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(".".to_string(), EntryRef::Weak(me));
        entries.insert("..".to_string(), EntryRef::Weak(parent));
        EntrySet { entries }
    }

    pub(crate) fn find(&self, name: &str) -> Option<InodeRef> {
        self.entries.get(name).and_then(EntryRef::upgrade)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert a child, replacing any previous entry under the same name.
    /// Existence checks belong to the caller, which holds the directory
    /// write lock anyway.
    pub(crate) fn insert(&mut self, name: &str, child: InodeRef) {
        self.entries.insert(name.to_string(), EntryRef::Strong(child));
    }

    /// Remove a name.  Returns false if absent.  Removing `.` or `..` is a
    /// bug; it is refused and logged.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        if name == "." || name == ".." {
            fs_error!("BUG: tried to remove '{}'", name);
            return false;
        }
        self.entries.remove(name).is_some()
    }

    /// Point `..` at a new parent.  Called when a directory is attached.
    pub(crate) fn set_parent(&mut self, parent: WeakInodeRef) {
        self.entries.insert("..".to_string(), EntryRef::Weak(parent));
    }

    pub(crate) fn parent(&self) -> Option<InodeRef> {
        self.find("..")
    }

    /// Number of entries other than `.` and `..`.
    pub(crate) fn num_children(&self) -> usize {
        self.entries.len().saturating_sub(2)
    }

    /// Iterate all entries (including `.` and `..`) in name order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &EntryRef)> {
        self.entries.iter()
    }

    /// Iterate entries whose names sort strictly after `name`.
    pub(crate) fn iter_after<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = (&'a String, &'a EntryRef)> + 'a {
        self.entries
            .range::<str, _>((Bound::Excluded(name), Bound::Unbounded))
    }

    /// Drain every entry other than `.` and `..`, yielding owned pairs.
    pub(crate) fn take_children(&mut self) -> Vec<(String, InodeRef)> {
        let names: Vec<String> = self
            .entries
            .keys()
            .filter(|n| *n != "." && *n != "..")
            .cloned()
            .collect();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(EntryRef::Strong(node)) = self.entries.remove(&name) {
                out.push((name, node));
            }
        }
        out
    }
}

impl XattrSet {
    /// Insert an attribute, honoring [`XattrFlags`].
    pub(crate) fn insert(
        &mut self,
        name: &str,
        value: &[u8],
        flags: XattrFlags,
    ) -> Result<()> {
        let present = self.entries.contains_key(name);

        if present && flags.contains(XattrFlags::CREATE) {
            return Err(Error::Exists);
        }
        if !present && flags.contains(XattrFlags::REPLACE) {
            return Err(Error::NoAttr);
        }

        self.entries.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    pub(crate) fn find(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(|v| v.as_slice())
    }

    pub(crate) fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

impl Inode {
    /// Common prologue shared by the typed constructors: stamp all three
    /// timestamps with "now" and zero the counters.
    fn init_common(kind: InodeType, file_id: u64, owner: u64, group: u64, mode: u32) -> Inode {
        let now = clock_now();
        Inode {
            file_id,
            kind,
            mode,
            owner,
            group,
            ctime: now,
            mtime: now,
            atime: now,
            link_count: 0,
            open_count: 0,
            size: 0,
            dev: 0,
            deletion_in_progress: false,
            children: None,
            xattrs: XattrSet::default(),
            symlink_target: None,
            app_data: None,
        }
    }

    /// Make a regular file inode.
    pub(crate) fn new_file(file_id: u64, owner: u64, group: u64, mode: u32) -> InodeRef {
        Arc::new(RwLock::new(Inode::init_common(
            InodeType::File,
            file_id,
            owner,
            group,
            mode,
        )))
    }

    /// Make a directory inode with `.` and `..` in place.
    pub(crate) fn new_dir(
        file_id: u64,
        owner: u64,
        group: u64,
        mode: u32,
        parent: &InodeRef,
    ) -> InodeRef {
        let node = Arc::new(RwLock::new(Inode::init_common(
            InodeType::Dir,
            file_id,
            owner,
            group,
            mode,
        )));
        let dots = EntrySet::with_dots(Arc::downgrade(&node), Arc::downgrade(parent));
        node.write().children = Some(dots);
        node
    }

    /// Make the root directory: its `..` refers back to itself and its link
    /// count is pinned at 1.
    pub(crate) fn new_root(owner: u64, group: u64, mode: u32) -> InodeRef {
        let node = Arc::new(RwLock::new(Inode::init_common(
            InodeType::Dir,
            0,
            owner,
            group,
            mode,
        )));
        let dots = EntrySet::with_dots(Arc::downgrade(&node), Arc::downgrade(&node));
        {
            let mut state = node.write();
            state.children = Some(dots);
            state.link_count = 1;
        }
        node
    }

    /// Make a FIFO inode.
    pub(crate) fn new_fifo(file_id: u64, owner: u64, group: u64, mode: u32) -> InodeRef {
        Arc::new(RwLock::new(Inode::init_common(
            InodeType::Fifo,
            file_id,
            owner,
            group,
            mode,
        )))
    }

    /// Make a UNIX domain socket inode.
    pub(crate) fn new_sock(file_id: u64, owner: u64, group: u64, mode: u32) -> InodeRef {
        Arc::new(RwLock::new(Inode::init_common(
            InodeType::Sock,
            file_id,
            owner,
            group,
            mode,
        )))
    }

    /// Make a character device inode.
    pub(crate) fn new_chr(file_id: u64, owner: u64, group: u64, mode: u32, dev: u64) -> InodeRef {
        let node = Arc::new(RwLock::new(Inode::init_common(
            InodeType::CharDev,
            file_id,
            owner,
            group,
            mode,
        )));
        node.write().dev = dev;
        node
    }

    /// Make a block device inode.
    pub(crate) fn new_blk(file_id: u64, owner: u64, group: u64, mode: u32, dev: u64) -> InodeRef {
        let node = Arc::new(RwLock::new(Inode::init_common(
            InodeType::BlockDev,
            file_id,
            owner,
            group,
            mode,
        )));
        node.write().dev = dev;
        node
    }

    /// Make a symlink inode holding `target` verbatim.  Symlinks are always
    /// mode 0777 and their size is the target length.
    pub(crate) fn new_symlink(file_id: u64, owner: u64, group: u64, target: &str) -> InodeRef {
        let node = Arc::new(RwLock::new(Inode::init_common(
            InodeType::Symlink,
            file_id,
            owner,
            group,
            0o777,
        )));
        {
            let mut state = node.write();
            state.size = target.len() as u64;
            state.symlink_target = Some(target.to_string());
        }
        node
    }

    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    pub(crate) fn set_file_id(&mut self, file_id: u64) {
        self.file_id = file_id;
    }

    pub fn kind(&self) -> InodeType {
        self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: InodeType) {
        self.kind = kind;
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: u32) {
        self.mode = mode;
    }

    pub fn owner(&self) -> u64 {
        self.owner
    }

    pub fn group(&self) -> u64 {
        self.group
    }

    pub(crate) fn set_owner_and_group(&mut self, owner: u64, group: u64) {
        self.owner = owner;
        self.group = group;
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn link_count(&self) -> i64 {
        self.link_count
    }

    pub(crate) fn link_count_mut(&mut self) -> &mut i64 {
        &mut self.link_count
    }

    pub fn open_count(&self) -> i64 {
        self.open_count
    }

    pub(crate) fn open_count_mut(&mut self) -> &mut i64 {
        &mut self.open_count
    }

    pub fn is_deletion_in_progress(&self) -> bool {
        self.deletion_in_progress
    }

    pub(crate) fn set_deletion_in_progress(&mut self) {
        self.deletion_in_progress = true;
    }

    pub fn ctime(&self) -> Timespec {
        self.ctime
    }

    pub fn mtime(&self) -> Timespec {
        self.mtime
    }

    pub fn atime(&self) -> Timespec {
        self.atime
    }

    /// Set ctime; `None` means "now".
    pub(crate) fn set_ctime(&mut self, when: Option<Timespec>) {
        self.ctime = when.unwrap_or_else(clock_now);
    }

    pub(crate) fn set_mtime(&mut self, when: Option<Timespec>) {
        self.mtime = when.unwrap_or_else(clock_now);
    }

    pub(crate) fn set_atime(&mut self, when: Option<Timespec>) {
        self.atime = when.unwrap_or_else(clock_now);
    }

    pub fn symlink_target(&self) -> Option<&str> {
        self.symlink_target.as_deref()
    }

    /// Application payload on this inode.
    pub fn app_data(&self) -> Option<AppData> {
        self.app_data.clone()
    }

    pub fn set_app_data(&mut self, data: Option<AppData>) {
        self.app_data = data;
    }

    pub(crate) fn take_app_data(&mut self) -> Option<AppData> {
        self.app_data.take()
    }

    /// Number of real children.  `None` for non-directories.
    pub fn num_children(&self) -> Option<usize> {
        self.children.as_ref().map(EntrySet::num_children)
    }

    pub(crate) fn children(&self) -> Option<&EntrySet> {
        self.children.as_ref()
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut EntrySet> {
        self.children.as_mut()
    }

    pub(crate) fn take_children_set(&mut self) -> Option<EntrySet> {
        self.children.take()
    }

    pub(crate) fn put_children_set(&mut self, set: EntrySet) {
        self.children = Some(set);
    }

    pub(crate) fn xattrs(&self) -> &XattrSet {
        &self.xattrs
    }

    pub(crate) fn xattrs_mut(&mut self) -> &mut XattrSet {
        &mut self.xattrs
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The current wall-clock time as (seconds, nanoseconds).
pub(crate) fn clock_now() -> Timespec {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i32),
        Err(_) => (0, 0),
    }
}

/// Read-lock an inode.  Fails with `no-entry` if the inode is dead.
pub(crate) fn rlock(node: &InodeRef, from: &str) -> Result<ReadGuard> {
    fs_lock_trace!("rlock {:p} from {}", Arc::as_ptr(node), from);

    let guard = node.read_arc();
    if guard.kind == InodeType::Dead {
        return Err(Error::NoEntry);
    }
    Ok(guard)
}

/// Write-lock an inode.  Fails with `no-entry` if the inode is dead.
pub(crate) fn wlock(node: &InodeRef, from: &str) -> Result<WriteGuard> {
    fs_lock_trace!("wlock {:p} from {}", Arc::as_ptr(node), from);

    let guard = node.write_arc();
    if guard.kind == InodeType::Dead {
        return Err(Error::NoEntry);
    }
    Ok(guard)
}

/// Write-lock an inode without the liveness check.  Only destruction and
/// the deferred reaper, which own the last reference to a dying inode, may
/// use this.
pub(crate) fn wlock_raw(node: &InodeRef, from: &str) -> WriteGuard {
    fs_lock_trace!("wlock_raw {:p} from {}", Arc::as_ptr(node), from);
    node.write_arc()
}

/// The inode a guard is locking.
pub(crate) fn guard_node(guard: &WriteGuard) -> InodeRef {
    ArcRwLockWriteGuard::rwlock(guard).clone()
}

/// The inode a read guard is locking.
pub(crate) fn read_guard_node(guard: &ReadGuard) -> InodeRef {
    ArcRwLockReadGuard::rwlock(guard).clone()
}

/// Attach `child` under `parent` as `name`.  Both must be write-locked.
/// Bumps the child's link count, stamps the parent's mtime, and (for
/// directories) points the child's `..` at the parent.
pub(crate) fn attach_lowlevel(parent: &mut WriteGuard, child: &mut WriteGuard, name: &str) {
    let parent_node = guard_node(parent);
    let child_node = guard_node(child);

    if !Arc::ptr_eq(&parent_node, &child_node) {
        child.link_count += 1;
    }

    parent.set_mtime(None);

    if child.kind == InodeType::Dir {
        if let Some(children) = child.children_mut() {
            children.set_parent(Arc::downgrade(&parent_node));
        }
    }

    if let Some(children) = parent.children_mut() {
        children.insert(name, child_node);
    }
}

/// Detach the entry `name` (which must be `child`) from `parent`.  Both
/// must be write-locked.  The child's link count is decremented; the child
/// itself is not destroyed.
pub(crate) fn detach_lowlevel(
    parent: &mut Inode,
    child: &mut WriteGuard,
    name: &str,
) -> Result<()> {
    detach_lowlevel_ex(parent, child, name, true)
}

pub(crate) fn detach_lowlevel_ex(
    parent: &mut Inode,
    child: &mut WriteGuard,
    name: &str,
    update_mtime: bool,
) -> Result<()> {
    detach_lowlevel_inner(parent, child, name, update_mtime, false)
}

/// Detach without the emptiness check.  Rename moves non-empty directories
/// and reattaches them immediately under the new name.
pub(crate) fn detach_lowlevel_unchecked(
    parent: &mut Inode,
    child: &mut WriteGuard,
    name: &str,
) -> Result<()> {
    detach_lowlevel_inner(parent, child, name, true, true)
}

fn detach_lowlevel_inner(
    parent: &mut Inode,
    child: &mut WriteGuard,
    name: &str,
    update_mtime: bool,
    allow_children: bool,
) -> Result<()> {
    let child_node = guard_node(child);

    let children = match parent.children_mut() {
        Some(c) => c,
        None => return Err(Error::NotDir),
    };

    match children.find(name) {
        Some(found) if Arc::ptr_eq(&found, &child_node) => {}
        Some(_) | None => return Err(Error::NoEntry),
    }

    // a non-empty directory cannot be detached
    if !allow_children && child.kind == InodeType::Dir && child.num_children().unwrap_or(0) > 0 {
        return Err(Error::NotEmpty);
    }

    if !children.remove(name) {
        fs_error!("BUG: entry '{}' vanished during detach", name);
        return Err(Error::NoEntry);
    }

    if update_mtime {
        parent.set_mtime(None);
    }

    // a tombstone that already gave up its last link only loses its name
    if child.link_count > 0 {
        child.link_count -= 1;
    } else if !child.deletion_in_progress {
        fs_error!(
            "BUG: negative link count on {:X} ('{}')",
            child.file_id(),
            name
        );
        child.link_count = 0;
    }

    Ok(())
}

/// POSIX read check: root, then other, then group, then owner bits.
pub(crate) fn is_readable(mode: u32, node_uid: u64, node_gid: u64, uid: u64, gid: u64) -> bool {
    uid == ROOT_USER_ID
        || (mode & libc::S_IROTH as u32) != 0
        || (node_gid == gid && (mode & libc::S_IRGRP as u32) != 0)
        || (node_uid == uid && (mode & libc::S_IRUSR as u32) != 0)
}

/// POSIX write check.
pub(crate) fn is_writeable(mode: u32, node_uid: u64, node_gid: u64, uid: u64, gid: u64) -> bool {
    uid == ROOT_USER_ID
        || (mode & libc::S_IWOTH as u32) != 0
        || (node_gid == gid && (mode & libc::S_IWGRP as u32) != 0)
        || (node_uid == uid && (mode & libc::S_IWUSR as u32) != 0)
}

/// POSIX execute check; on a directory this means searchable.
pub(crate) fn is_executable(mode: u32, node_uid: u64, node_gid: u64, uid: u64, gid: u64) -> bool {
    uid == ROOT_USER_ID
        || (mode & libc::S_IXOTH as u32) != 0
        || (node_gid == gid && (mode & libc::S_IXGRP as u32) != 0)
        || (node_uid == uid && (mode & libc::S_IXUSR as u32) != 0)
}

pub(crate) fn is_searchable(mode: u32, node_uid: u64, node_gid: u64, uid: u64, gid: u64) -> bool {
    is_executable(mode, node_uid, node_gid, uid, gid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_set_dots() {
        let root = Inode::new_root(0, 0, 0o755);
        let state = root.read();
        let children = state.children().unwrap();

        assert!(children.contains("."));
        assert!(children.contains(".."));
        assert_eq!(children.num_children(), 0);
        assert!(Arc::ptr_eq(&children.find("..").unwrap(), &root));
    }

    #[test]
    fn test_entry_set_refuses_dot_removal() {
        let root = Inode::new_root(0, 0, 0o755);
        let mut state = root.write();
        let children = state.children_mut().unwrap();

        assert!(!children.remove("."));
        assert!(!children.remove(".."));
    }

    #[test]
    fn test_xattr_flags() {
        let mut set = XattrSet::default();

        set.insert("user.a", b"1", XattrFlags::empty()).unwrap();
        assert_eq!(
            set.insert("user.a", b"2", XattrFlags::CREATE),
            Err(Error::Exists)
        );
        assert_eq!(
            set.insert("user.b", b"2", XattrFlags::REPLACE),
            Err(Error::NoAttr)
        );
        set.insert("user.a", b"2", XattrFlags::REPLACE).unwrap();
        assert_eq!(set.find("user.a"), Some(&b"2"[..]));
    }

    #[test]
    fn test_permission_bits() {
        // 0700 dir owned by 1:1
        assert!(is_searchable(0o700, 1, 1, 0, 0)); // root passes
        assert!(is_searchable(0o700, 1, 1, 1, 1)); // owner passes
        assert!(!is_searchable(0o700, 1, 1, 2, 2)); // other denied
        assert!(is_readable(0o044, 1, 1, 2, 2)); // other bit
        assert!(is_writeable(0o020, 1, 1, 2, 1)); // group bit
    }

    #[test]
    fn test_dead_inode_lock_fails() {
        let node = Inode::new_file(42, 0, 0, 0o644);
        node.write().set_kind(InodeType::Dead);

        assert!(rlock(&node, "test").is_err());
        assert!(wlock(&node, "test").is_err());
    }
}
