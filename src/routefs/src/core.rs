//! The filesystem core: root inode, inode id allocation, the aggregate file
//! count, the route table, and the deferred work queue.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::debug::{fs_debug, fs_error};
use crate::error::{Error, Result};
use crate::gc;
use crate::inode::{wlock, AppData, Inode, InodeRef};
use crate::route::RouteTable;
use crate::wq::{Job, WorkQueue};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Produces the inode id for a freshly created inode.  Called with the
/// parent and the new child both write-locked; must not touch the core.
/// An id of 0 is reserved for the root.
pub type InodeAllocator = Box<dyn Fn(&Inode, &Inode) -> Result<u64> + Send + Sync>;

/// Returns an inode id to the application once the inode is destroyed.
pub type InodeReleaser = Box<dyn Fn(u64) + Send + Sync>;

struct CoreState {
    /// Inode id allocation hook
    inode_alloc: InodeAllocator,

    /// Inode id release hook
    inode_free: InodeReleaser,

    /// Application-wide payload
    app_data: Option<AppData>,

    /// Number of files and directories that exist
    num_files: u64,
}

/// One in-memory filesystem.
///
/// The core owns the root directory, the allocator hooks, the route table,
/// and the deferred garbage-collection queue.  It is shared as `Arc<Core>`;
/// all operations take `&Core` (or `&Arc<Core>` where they must enqueue
/// deferred work).
pub struct Core {
    /// The embedded root directory
    root: InodeRef,

    /// Allocator hooks, app data, and the file count
    state: RwLock<CoreState>,

    /// Path routes, indexed by route kind
    routes: RwLock<RouteTable>,

    /// Single-consumer queue for deferred garbage collection
    deferred: WorkQueue,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Core {
    /// Create a core with an empty root directory (mode 0755, owned by
    /// root) and start its deferred work queue.
    pub fn new(app_data: Option<AppData>) -> Arc<Core> {
        let root = Inode::new_root(0, 0, 0o755);

        Arc::new(Core {
            root,
            state: RwLock::new(CoreState {
                inode_alloc: default_inode_alloc(),
                inode_free: default_inode_free(),
                app_data,
                num_files: 0,
            }),
            routes: RwLock::new(RouteTable::new()),
            deferred: WorkQueue::start(),
        })
    }

    /// Tear the filesystem down: drain the deferred queue, run the detach
    /// and destroy notifications for `/`, destroy the root, and drop all
    /// routes.  Returns the application payload.
    ///
    /// Inodes still held open through handles survive as dead husks until
    /// their last reference drops; all subsequent operations on this core
    /// fail with `no-entry`.
    pub fn shutdown(&self) -> Result<Option<AppData>> {
        self.deferred.stop();

        let root_data = {
            // forcibly detach the root; fails if already shut down
            let mut guard = wlock(&self.root, "core_shutdown").map_err(|_| Error::Invalid)?;
            *guard.open_count_mut() = 1;
            *guard.link_count_mut() = 0;
            guard.set_deletion_in_progress();
            guard.app_data()
        };

        fs_debug!("destroy root inode");
        if let Err(e) = gc::run_user_detach(self, "/", true, root_data.clone(), &self.root) {
            fs_error!("WARN: detach route on '/' rc = {}", e.errno());
        }
        if let Err(e) = gc::run_user_destroy(self, "/", root_data, &self.root) {
            fs_error!("WARN: destroy route on '/' rc = {}", e.errno());
        }
        gc::destroy_fields(self, &self.root);

        self.routes.write().clear();

        Ok(self.state.write().app_data.take())
    }

    /// The root directory.
    pub fn root(&self) -> InodeRef {
        self.root.clone()
    }

    /// Replace the inode id allocator.
    pub fn set_inode_allocator(&self, alloc: InodeAllocator) {
        self.state.write().inode_alloc = alloc;
    }

    /// Replace the inode id releaser.
    pub fn set_inode_releaser(&self, free: InodeReleaser) {
        self.state.write().inode_free = free;
    }

    /// Draw the next inode id from the allocator.
    pub(crate) fn allocate_inode_id(&self, parent: &Inode, child: &Inode) -> Result<u64> {
        let state = self.state.read();
        let id = (state.inode_alloc)(parent, child)?;
        if id == 0 {
            return Err(Error::Io);
        }
        Ok(id)
    }

    /// Return an inode id to the allocator.
    pub(crate) fn release_inode_id(&self, file_id: u64) {
        let state = self.state.read();
        (state.inode_free)(file_id);
    }

    /// The application-wide payload.
    pub fn app_data(&self) -> Option<AppData> {
        self.state.read().app_data.clone()
    }

    /// Adjust the aggregate file count and return the new value.
    pub(crate) fn file_count_update(&self, delta: i64) -> u64 {
        let mut state = self.state.write();
        if delta < 0 {
            state.num_files = state.num_files.saturating_sub(delta.unsigned_abs());
        } else {
            state.num_files += delta as u64;
        }
        state.num_files
    }

    /// Number of files and directories that exist.
    pub fn file_count(&self) -> u64 {
        self.state.read().num_files
    }

    pub(crate) fn routes(&self) -> &RwLock<RouteTable> {
        &self.routes
    }

    /// Hand a job to the deferred queue.  Fails with `again` after
    /// shutdown.
    pub(crate) fn enqueue_deferred(&self, job: Job) -> Result<()> {
        self.deferred.enqueue(job)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Default inode id allocator: a random nonzero 64-bit number.
fn default_inode_alloc() -> InodeAllocator {
    Box::new(|_parent, _child| loop {
        let id: u64 = rand::random();
        if id != 0 {
            return Ok(id);
        }
    })
}

/// Default inode id releaser: does nothing.
fn default_inode_free() -> InodeReleaser {
    Box::new(|_file_id| {})
}
