//! Open file and directory handles.
//!
//! A handle pins an inode (via its open count), remembers the path it was
//! opened with (later operations route on that path), and carries the
//! application payload installed by the open or create callback.  Handle
//! locks are always taken before the inode they reference.

use parking_lot::RwLock;

use crate::inode::{AppData, InodeRef};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

pub(crate) struct FileHandleState {
    /// Application payload installed by the open/create callback
    pub(crate) app_data: Option<AppData>,
}

/// A live reference to an open file.
pub struct FileHandle {
    /// The inode this handle pins
    pub(crate) node: InodeRef,

    /// The path used to open this handle
    pub(crate) path: String,

    /// The inode id at open time, for staleness detection
    pub(crate) file_id: u64,

    /// Open flags
    pub(crate) flags: i32,

    pub(crate) state: RwLock<FileHandleState>,
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("file_id", &self.file_id)
            .field("flags", &self.flags)
            .finish()
    }
}

pub(crate) struct DirHandleState {
    /// Application payload installed by the open callback
    pub(crate) app_data: Option<AppData>,

    /// Name of the last entry handed out; readdir resumes just past it
    pub(crate) curr_name: Option<String>,

    /// Set once a readdir walks off the end of the directory
    pub(crate) eof: bool,

    /// Saved (token, bookmark) pairs for telldir/seekdir
    pub(crate) telldir: Vec<(i64, Option<String>)>,
}

/// A live reference to an open directory.
pub struct DirHandle {
    pub(crate) node: InodeRef,
    pub(crate) path: String,
    pub(crate) file_id: u64,
    pub(crate) state: RwLock<DirHandleState>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FileHandle {
    pub(crate) fn create(
        node: InodeRef,
        path: &str,
        file_id: u64,
        flags: i32,
        app_data: Option<AppData>,
    ) -> FileHandle {
        FileHandle {
            node,
            path: path.to_string(),
            file_id,
            flags,
            state: RwLock::new(FileHandleState { app_data }),
        }
    }

    /// The path this handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The id of the opened inode.
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    /// The open flags.
    pub fn flags(&self) -> i32 {
        self.flags
    }

    /// The inode this handle references.
    pub fn inode(&self) -> InodeRef {
        self.node.clone()
    }

    /// The handle's application payload.
    pub fn app_data(&self) -> Option<AppData> {
        self.state.read().app_data.clone()
    }

    pub fn set_app_data(&self, data: Option<AppData>) {
        self.state.write().app_data = data;
    }
}

impl DirHandle {
    pub(crate) fn create(
        node: InodeRef,
        path: &str,
        file_id: u64,
        app_data: Option<AppData>,
    ) -> DirHandle {
        DirHandle {
            node,
            path: path.to_string(),
            file_id,
            state: RwLock::new(DirHandleState {
                app_data,
                curr_name: None,
                eof: false,
                telldir: Vec::new(),
            }),
        }
    }

    /// The path this handle was opened with.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The id of the opened directory.
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    /// The inode this handle references.
    pub fn inode(&self) -> InodeRef {
        self.node.clone()
    }

    /// The handle's application payload.
    pub fn app_data(&self) -> Option<AppData> {
        self.state.read().app_data.clone()
    }

    pub fn set_app_data(&self, data: Option<AppData>) {
        self.state.write().app_data = data;
    }
}
