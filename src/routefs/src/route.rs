//! Regex-indexed route table and callback dispatcher.
//!
//! Applications attach behavior to paths by declaring routes: a compiled
//! regex, a consistency discipline, and a callback for one operation kind.
//! The dispatcher matches the whole path (patterns are anchored at both
//! ends), captures the match groups, enforces the discipline by locking
//! either the route or the matched inode, and invokes the callback.  A miss
//! is not an error; the façades fall back to their default behavior.

use std::collections::HashMap;

use parking_lot::RwLock;
use regex::Regex;

use crate::core::Core;
use crate::debug::{fs_debug, fs_error};
use crate::error::{Error, Result};
use crate::inode::{rlock, wlock, AppData, Inode, InodeRef, InodeType, XattrFlags};
use crate::ops::readdir::DirEntry;
use crate::path::basename;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stable identifier for a declared route, scoped to its kind.
pub type RouteHandle = usize;

/// The closed set of operations a route can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Create,
    Mknod,
    Mkdir,
    Open,
    Close,
    Readdir,
    Read,
    Write,
    Trunc,
    Detach,
    Destroy,
    Stat,
    Sync,
    Rename,
    Link,
    Getxattr,
    Setxattr,
    Listxattr,
    Removexattr,
}

/// The locking regime the dispatcher enforces around a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Write-lock the route: at most one invocation of this route at a time.
    Sequential,
    /// Read-lock the route: invocations may overlap; removal waits.
    Concurrent,
    /// Write-lock the matched inode for the duration of the callback.
    InodeSequential,
    /// Read-lock the matched inode for the duration of the callback.
    InodeConcurrent,
}

/// Snapshot of an inode taken by the façade while it held the inode lock:
/// the id, the type, and the application payload.
#[derive(Clone)]
pub struct NodeInfo {
    id: u64,
    kind: InodeType,
    data: Option<AppData>,
}

/// The bundle handed to every route callback: the matched path, the
/// captured groups, and operation-specific context.
pub struct RequestData {
    path: String,
    name: String,
    groups: Vec<String>,
    target: NodeInfo,
    parent: Option<NodeInfo>,
    new_parent: Option<NodeInfo>,
    new_path: Option<String>,
    garbage_collect: bool,
    cls: Option<AppData>,
}

pub type CreateCallback = Box<
    dyn Fn(&Core, &RequestData, u32) -> Result<(Option<AppData>, Option<AppData>)> + Send + Sync,
>;
pub type MknodCallback =
    Box<dyn Fn(&Core, &RequestData, u32, u64) -> Result<Option<AppData>> + Send + Sync>;
pub type MkdirCallback =
    Box<dyn Fn(&Core, &RequestData, u32) -> Result<Option<AppData>> + Send + Sync>;
pub type OpenCallback =
    Box<dyn Fn(&Core, &RequestData, i32) -> Result<Option<AppData>> + Send + Sync>;
pub type CloseCallback =
    Box<dyn Fn(&Core, &RequestData, Option<&AppData>) -> Result<()> + Send + Sync>;
pub type ReaddirCallback =
    Box<dyn Fn(&Core, &RequestData, &mut Vec<Option<DirEntry>>) -> Result<()> + Send + Sync>;
pub type ReadCallback = Box<
    dyn Fn(&Core, &RequestData, &mut [u8], u64, Option<&AppData>) -> Result<usize> + Send + Sync,
>;
pub type WriteCallback =
    Box<dyn Fn(&Core, &RequestData, &[u8], u64, Option<&AppData>) -> Result<usize> + Send + Sync>;
pub type TruncCallback =
    Box<dyn Fn(&Core, &RequestData, u64, Option<&AppData>) -> Result<()> + Send + Sync>;
pub type DetachCallback =
    Box<dyn Fn(&Core, &RequestData, Option<&AppData>) -> Result<()> + Send + Sync>;
pub type DestroyCallback =
    Box<dyn Fn(&Core, &RequestData, Option<&AppData>) -> Result<()> + Send + Sync>;
pub type StatCallback =
    Box<dyn Fn(&Core, &RequestData, &mut libc::stat) -> Result<()> + Send + Sync>;
pub type SyncCallback = Box<dyn Fn(&Core, &RequestData) -> Result<()> + Send + Sync>;
pub type RenameCallback =
    Box<dyn Fn(&Core, &RequestData, &str, Option<&NodeInfo>) -> Result<()> + Send + Sync>;
pub type LinkCallback = Box<dyn Fn(&Core, &RequestData, &str) -> Result<()> + Send + Sync>;
pub type GetxattrCallback = Box<
    dyn Fn(&Core, &RequestData, &str, &mut [u8]) -> Result<Option<usize>> + Send + Sync,
>;
pub type SetxattrCallback = Box<
    dyn Fn(&Core, &RequestData, &str, &[u8], XattrFlags) -> Result<()> + Send + Sync,
>;
pub type ListxattrCallback = Box<
    dyn Fn(&Core, &RequestData, Option<&mut [u8]>) -> Result<Option<usize>> + Send + Sync,
>;
pub type RemovexattrCallback =
    Box<dyn Fn(&Core, &RequestData, &str) -> Result<()> + Send + Sync>;

/// The callback a route carries, tagged by kind.
pub(crate) enum RouteHandler {
    Create(CreateCallback),
    Mknod(MknodCallback),
    Mkdir(MkdirCallback),
    Open(OpenCallback),
    Close(CloseCallback),
    Readdir(ReaddirCallback),
    Read(ReadCallback),
    Write(WriteCallback),
    Trunc(TruncCallback),
    Detach(DetachCallback),
    Destroy(DestroyCallback),
    Stat(StatCallback),
    Sync(SyncCallback),
    Rename(RenameCallback),
    Link(LinkCallback),
    Getxattr(GetxattrCallback),
    Setxattr(SetxattrCallback),
    Listxattr(ListxattrCallback),
    Removexattr(RemovexattrCallback),
}

/// A declared route.
pub(crate) struct Route {
    /// Original pattern, kept for diagnostics
    pattern: String,

    /// Compiled pattern, anchored at both ends
    regex: Regex,

    /// Upper bound on the number of match groups
    num_groups: usize,

    consistency: Consistency,
    kind: RouteKind,
    handler: RouteHandler,

    /// Lock used by the route-level consistency disciplines
    lock: RwLock<()>,
}

/// Route lists per kind.  Slots are stable: removal clears a slot, and the
/// next declaration of that kind reuses it.
pub(crate) struct RouteTable {
    rows: HashMap<RouteKind, Vec<Option<Route>>>,
}

/// Outcome of a dispatch attempt: either no route matched (the façade
/// proceeds with default behavior) or the callback ran and produced `T`.
pub(crate) enum Dispatched<T> {
    NoRoute,
    Handled(T),
}

/// Operation-specific metadata fed into [`RequestData`].
#[derive(Default)]
pub(crate) struct MetaArgs {
    pub name: Option<String>,
    pub parent: Option<NodeInfo>,
    pub new_parent: Option<NodeInfo>,
    pub new_path: Option<String>,
    pub garbage_collect: bool,
    pub cls: Option<AppData>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NodeInfo {
    pub(crate) fn new(id: u64, kind: InodeType, data: Option<AppData>) -> NodeInfo {
        NodeInfo { id, kind, data }
    }

    /// Snapshot a locked inode.
    pub(crate) fn of(state: &Inode) -> NodeInfo {
        NodeInfo {
            id: state.file_id(),
            kind: state.kind(),
            data: state.app_data(),
        }
    }

    pub fn file_id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> InodeType {
        self.kind
    }

    pub fn app_data(&self) -> Option<AppData> {
        self.data.clone()
    }
}

impl RequestData {
    /// The path the route matched.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The final path component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The captured match groups, in order.
    pub fn match_groups(&self) -> &[String] {
        &self.groups
    }

    /// The matched inode.
    pub fn target(&self) -> &NodeInfo {
        &self.target
    }

    /// The parent of the matched inode (creation kinds and rename only).
    pub fn parent(&self) -> Option<&NodeInfo> {
        self.parent.as_ref()
    }

    /// The destination parent (rename and link only).
    pub fn new_parent(&self) -> Option<&NodeInfo> {
        self.new_parent.as_ref()
    }

    /// The destination path (rename and link only).
    pub fn new_path(&self) -> Option<&str> {
        self.new_path.as_deref()
    }

    /// Whether the matched inode is being garbage-collected (detach only).
    pub fn is_garbage_collect(&self) -> bool {
        self.garbage_collect
    }

    /// The caller-given closure (mknod only).
    pub fn cls(&self) -> Option<AppData> {
        self.cls.clone()
    }
}

impl Route {
    fn new(
        pattern: &str,
        consistency: Consistency,
        kind: RouteKind,
        handler: RouteHandler,
    ) -> Result<Route> {
        // anchor at both ends: a route matches the entire path or not at all
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            fs_error!("cannot compile route pattern '{}': {}", pattern, e);
            Error::Invalid
        })?;

        let num_groups = regex.captures_len();

        Ok(Route {
            pattern: pattern.to_string(),
            regex,
            num_groups,
            consistency,
            kind,
            handler,
            lock: RwLock::new(()),
        })
    }

    pub(crate) fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl RouteTable {
    pub(crate) fn new() -> RouteTable {
        RouteTable {
            rows: HashMap::new(),
        }
    }

    /// Insert a route, filling the first free slot of its kind.  Returns
    /// the slot index as the route handle.
    fn insert(&mut self, route: Route) -> RouteHandle {
        let row = self.rows.entry(route.kind).or_default();

        for (i, slot) in row.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(route);
                return i;
            }
        }

        row.push(Some(route));
        row.len() - 1
    }

    /// Clear a slot, returning its route.
    fn remove(&mut self, kind: RouteKind, handle: RouteHandle) -> Option<Route> {
        let row = self.rows.get_mut(&kind)?;
        row.get_mut(handle)?.take()
    }

    fn row(&self, kind: RouteKind) -> Option<&Vec<Option<Route>>> {
        self.rows.get(&kind)
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }
}

//--------------------------------------------------------------------------------------------------
// Dispatch
//--------------------------------------------------------------------------------------------------

/// Match `path` against the routes for `kind`; first hit wins.
fn match_route<'t>(
    table: &'t RouteTable,
    kind: RouteKind,
    path: &str,
) -> Option<(&'t Route, Vec<String>)> {
    let row = table.row(kind)?;

    for route in row.iter().flatten() {
        if let Some(caps) = route.regex.captures(path) {
            let mut groups = Vec::with_capacity(route.num_groups.saturating_sub(1));
            for m in caps.iter().skip(1) {
                groups.push(m.map(|m| m.as_str().to_string()).unwrap_or_default());
            }
            return Some((route, groups));
        }
    }

    fs_debug!("no route of kind {:?} matches '{}'", kind, path);
    None
}

/// Run one dispatch: match, check the reference precondition, enforce the
/// consistency discipline, invoke, and run the I/O continuation (if any)
/// before the discipline lock is released.
fn call_route<R>(
    core: &Core,
    kind: RouteKind,
    fs_path: &str,
    target: Option<&InodeRef>,
    tinfo: NodeInfo,
    meta: MetaArgs,
    invoke: impl FnOnce(&Route, &RequestData) -> Result<R>,
    cont: Option<&dyn Fn(&mut Inode, &R)>,
) -> Result<Dispatched<R>> {
    // hold the route table read-locked across the callback so routes cannot
    // be removed out from under it
    let table = core.routes().read();

    let (route, groups) = match match_route(&table, kind, fs_path) {
        Some(hit) => hit,
        None => return Ok(Dispatched::NoRoute),
    };

    let req = RequestData {
        path: fs_path.to_string(),
        name: meta.name.unwrap_or_else(|| basename(fs_path)),
        groups,
        target: tinfo,
        parent: meta.parent,
        new_parent: meta.new_parent,
        new_path: meta.new_path,
        garbage_collect: meta.garbage_collect,
        cls: meta.cls,
    };

    // every callback except detach and destroy requires the target to be
    // referenced for the duration of the call; rename is also skipped, as
    // it invokes the dispatcher with both inodes already write-locked
    if !matches!(
        kind,
        RouteKind::Detach | RouteKind::Destroy | RouteKind::Rename
    ) {
        if let Some(node) = target {
            let guard = rlock(node, "route_dispatch")?;
            if guard.open_count() <= 0 && guard.link_count() <= 0 {
                fs_error!(
                    "BUG: entry {:X} is not referenced (open = {}, link = {})",
                    guard.file_id(),
                    guard.open_count(),
                    guard.link_count()
                );
                return Err(Error::Io);
            }
        }
    }

    fs_debug!(
        "call route {:?} '{}' on '{}'",
        kind,
        route.pattern(),
        fs_path
    );

    match route.consistency {
        Consistency::Sequential | Consistency::Concurrent => {
            let _discipline = if route.consistency == Consistency::Sequential {
                DisciplineGuard::RouteWrite(route.lock.write())
            } else {
                DisciplineGuard::RouteRead(route.lock.read())
            };

            let out = invoke(route, &req)?;

            if let (Some(cont), Some(node)) = (cont, target) {
                let mut guard = wlock(node, "route_continuation")?;
                cont(&mut guard, &out);
            }

            Ok(Dispatched::Handled(out))
        }

        Consistency::InodeSequential => match target {
            Some(node) => {
                let mut guard = wlock(node, "route_dispatch")?;
                let out = invoke(route, &req)?;
                if let Some(cont) = cont {
                    cont(&mut guard, &out);
                }
                Ok(Dispatched::Handled(out))
            }
            None => Ok(Dispatched::Handled(invoke(route, &req)?)),
        },

        Consistency::InodeConcurrent => match target {
            Some(node) => {
                let guard = rlock(node, "route_dispatch")?;
                let out = invoke(route, &req)?;
                drop(guard);
                if let Some(cont) = cont {
                    let mut guard = wlock(node, "route_continuation")?;
                    cont(&mut guard, &out);
                }
                Ok(Dispatched::Handled(out))
            }
            None => Ok(Dispatched::Handled(invoke(route, &req)?)),
        },
    }
}

enum DisciplineGuard<'a> {
    RouteWrite(parking_lot::RwLockWriteGuard<'a, ()>),
    RouteRead(parking_lot::RwLockReadGuard<'a, ()>),
}

fn handler_mismatch<R>(route: &Route) -> Result<R> {
    fs_error!(
        "BUG: route '{}' of kind {:?} carries a mismatched callback",
        route.pattern(),
        route.kind
    );
    Err(Error::Io)
}

pub(crate) fn call_create(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    parent: NodeInfo,
    mode: u32,
) -> Result<Dispatched<(Option<AppData>, Option<AppData>)>> {
    let meta = MetaArgs {
        parent: Some(parent),
        ..Default::default()
    };
    call_route(
        core,
        RouteKind::Create,
        path,
        Some(target),
        tinfo,
        meta,
        |route, req| match &route.handler {
            RouteHandler::Create(cb) => cb(core, req, mode),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_mknod(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    parent: NodeInfo,
    mode: u32,
    dev: u64,
    cls: Option<AppData>,
) -> Result<Dispatched<Option<AppData>>> {
    let meta = MetaArgs {
        parent: Some(parent),
        cls,
        ..Default::default()
    };
    call_route(
        core,
        RouteKind::Mknod,
        path,
        Some(target),
        tinfo,
        meta,
        |route, req| match &route.handler {
            RouteHandler::Mknod(cb) => cb(core, req, mode, dev),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_mkdir(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    parent: NodeInfo,
    mode: u32,
) -> Result<Dispatched<Option<AppData>>> {
    let meta = MetaArgs {
        parent: Some(parent),
        ..Default::default()
    };
    call_route(
        core,
        RouteKind::Mkdir,
        path,
        Some(target),
        tinfo,
        meta,
        |route, req| match &route.handler {
            RouteHandler::Mkdir(cb) => cb(core, req, mode),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_open(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    flags: i32,
) -> Result<Dispatched<Option<AppData>>> {
    call_route(
        core,
        RouteKind::Open,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Open(cb) => cb(core, req, flags),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_close(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    handle_data: Option<AppData>,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Close,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Close(cb) => cb(core, req, handle_data.as_ref()),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_readdir(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    dents: &mut Vec<Option<DirEntry>>,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Readdir,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Readdir(cb) => cb(core, req, dents),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_read(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    buf: &mut [u8],
    offset: u64,
    handle_data: Option<AppData>,
) -> Result<Dispatched<usize>> {
    call_route(
        core,
        RouteKind::Read,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Read(cb) => cb(core, req, buf, offset, handle_data.as_ref()),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_write(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    buf: &[u8],
    offset: u64,
    handle_data: Option<AppData>,
    cont: Option<&dyn Fn(&mut Inode, &usize)>,
) -> Result<Dispatched<usize>> {
    call_route(
        core,
        RouteKind::Write,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Write(cb) => cb(core, req, buf, offset, handle_data.as_ref()),
            _ => handler_mismatch(route),
        },
        cont,
    )
}

pub(crate) fn call_trunc(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    new_size: u64,
    handle_data: Option<AppData>,
    cont: Option<&dyn Fn(&mut Inode, &())>,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Trunc,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Trunc(cb) => cb(core, req, new_size, handle_data.as_ref()),
            _ => handler_mismatch(route),
        },
        cont,
    )
}

pub(crate) fn call_detach(
    core: &Core,
    path: &str,
    target: Option<&InodeRef>,
    tinfo: NodeInfo,
    garbage_collect: bool,
    inode_data: Option<AppData>,
) -> Result<Dispatched<()>> {
    let meta = MetaArgs {
        garbage_collect,
        ..Default::default()
    };
    call_route(
        core,
        RouteKind::Detach,
        path,
        target,
        tinfo,
        meta,
        |route, req| match &route.handler {
            RouteHandler::Detach(cb) => cb(core, req, inode_data.as_ref()),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_destroy(
    core: &Core,
    path: &str,
    target: Option<&InodeRef>,
    tinfo: NodeInfo,
    inode_data: Option<AppData>,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Destroy,
        path,
        target,
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Destroy(cb) => cb(core, req, inode_data.as_ref()),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_stat(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    sb: &mut libc::stat,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Stat,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Stat(cb) => cb(core, req, sb),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_sync(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Sync,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Sync(cb) => cb(core, req),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_rename(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    parent: NodeInfo,
    new_parent: NodeInfo,
    new_path: &str,
    dest: Option<NodeInfo>,
) -> Result<Dispatched<()>> {
    let meta = MetaArgs {
        parent: Some(parent),
        new_parent: Some(new_parent),
        new_path: Some(new_path.to_string()),
        ..Default::default()
    };
    call_route(
        core,
        RouteKind::Rename,
        path,
        Some(target),
        tinfo,
        meta,
        |route, req| match &route.handler {
            RouteHandler::Rename(cb) => cb(core, req, new_path, dest.as_ref()),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_link(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    new_parent: NodeInfo,
    new_path: &str,
) -> Result<Dispatched<()>> {
    let meta = MetaArgs {
        new_parent: Some(new_parent),
        new_path: Some(new_path.to_string()),
        ..Default::default()
    };
    call_route(
        core,
        RouteKind::Link,
        path,
        Some(target),
        tinfo,
        meta,
        |route, req| match &route.handler {
            RouteHandler::Link(cb) => cb(core, req, new_path),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_getxattr(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    name: &str,
    buf: &mut [u8],
) -> Result<Dispatched<Option<usize>>> {
    call_route(
        core,
        RouteKind::Getxattr,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Getxattr(cb) => cb(core, req, name, buf),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_setxattr(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    name: &str,
    value: &[u8],
    flags: XattrFlags,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Setxattr,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Setxattr(cb) => cb(core, req, name, value, flags),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_listxattr(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    buf: Option<&mut [u8]>,
) -> Result<Dispatched<Option<usize>>> {
    call_route(
        core,
        RouteKind::Listxattr,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Listxattr(cb) => cb(core, req, buf),
            _ => handler_mismatch(route),
        },
        None,
    )
}

pub(crate) fn call_removexattr(
    core: &Core,
    path: &str,
    target: &InodeRef,
    tinfo: NodeInfo,
    name: &str,
) -> Result<Dispatched<()>> {
    call_route(
        core,
        RouteKind::Removexattr,
        path,
        Some(target),
        tinfo,
        MetaArgs::default(),
        |route, req| match &route.handler {
            RouteHandler::Removexattr(cb) => cb(core, req, name),
            _ => handler_mismatch(route),
        },
        None,
    )
}

//--------------------------------------------------------------------------------------------------
// Declaration
//--------------------------------------------------------------------------------------------------

impl Core {
    fn route_decl(
        &self,
        pattern: &str,
        consistency: Consistency,
        kind: RouteKind,
        handler: RouteHandler,
    ) -> Result<RouteHandle> {
        let route = Route::new(pattern, consistency, kind, handler)?;

        let mut table = self.routes().write();
        let handle = table.insert(route);

        fs_debug!("declared {:?} route '{}' at slot {}", kind, pattern, handle);
        Ok(handle)
    }

    fn route_undecl(&self, kind: RouteKind, handle: RouteHandle) -> Result<()> {
        let mut table = self.routes().write();
        match table.remove(kind, handle) {
            Some(_) => Ok(()),
            None => Err(Error::Invalid),
        }
    }

    /// Declare a route for creating a file.
    pub fn route_create(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: CreateCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Create, RouteHandler::Create(cb))
    }

    pub fn unroute_create(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Create, handle)
    }

    /// Declare a route for creating a device node or special file.
    pub fn route_mknod(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: MknodCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Mknod, RouteHandler::Mknod(cb))
    }

    pub fn unroute_mknod(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Mknod, handle)
    }

    /// Declare a route for making a directory.
    pub fn route_mkdir(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: MkdirCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Mkdir, RouteHandler::Mkdir(cb))
    }

    pub fn unroute_mkdir(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Mkdir, handle)
    }

    /// Declare a route for opening a file or directory.
    pub fn route_open(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: OpenCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Open, RouteHandler::Open(cb))
    }

    pub fn unroute_open(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Open, handle)
    }

    /// Declare a route for closing a file or directory.
    pub fn route_close(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: CloseCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Close, RouteHandler::Close(cb))
    }

    pub fn unroute_close(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Close, handle)
    }

    /// Declare a route for reading a directory.  The callback may omit
    /// entries by clearing their slots; the listing is compacted afterward.
    pub fn route_readdir(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: ReaddirCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Readdir, RouteHandler::Readdir(cb))
    }

    pub fn unroute_readdir(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Readdir, handle)
    }

    /// Declare a route for reading file data.
    pub fn route_read(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: ReadCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Read, RouteHandler::Read(cb))
    }

    pub fn unroute_read(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Read, handle)
    }

    /// Declare a route for writing file data.
    pub fn route_write(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: WriteCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Write, RouteHandler::Write(cb))
    }

    pub fn unroute_write(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Write, handle)
    }

    /// Declare a route for truncating a file.
    pub fn route_trunc(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: TruncCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Trunc, RouteHandler::Trunc(cb))
    }

    pub fn unroute_trunc(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Trunc, handle)
    }

    /// Declare a route notified when an inode's name is going away.
    pub fn route_detach(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: DetachCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Detach, RouteHandler::Detach(cb))
    }

    pub fn unroute_detach(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Detach, handle)
    }

    /// Declare a route notified when an inode is reclaimed.
    pub fn route_destroy(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: DestroyCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Destroy, RouteHandler::Destroy(cb))
    }

    pub fn unroute_destroy(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Destroy, handle)
    }

    /// Declare a route that may post-process stat records.
    pub fn route_stat(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: StatCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Stat, RouteHandler::Stat(cb))
    }

    pub fn unroute_stat(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Stat, handle)
    }

    /// Declare a route for syncing a file.
    pub fn route_sync(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: SyncCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Sync, RouteHandler::Sync(cb))
    }

    pub fn unroute_sync(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Sync, handle)
    }

    /// Declare a route for renaming.  Rename write-locks both inodes
    /// itself, so the inode disciplines are rejected with `invalid`.
    pub fn route_rename(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: RenameCallback,
    ) -> Result<RouteHandle> {
        if consistency != Consistency::Sequential && consistency != Consistency::Concurrent {
            return Err(Error::Invalid);
        }
        self.route_decl(pattern, consistency, RouteKind::Rename, RouteHandler::Rename(cb))
    }

    pub fn unroute_rename(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Rename, handle)
    }

    /// Declare a route for hard-linking.
    pub fn route_link(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: LinkCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Link, RouteHandler::Link(cb))
    }

    pub fn unroute_link(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Link, handle)
    }

    /// Declare a route that may service getxattr requests.
    pub fn route_getxattr(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: GetxattrCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Getxattr, RouteHandler::Getxattr(cb))
    }

    pub fn unroute_getxattr(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Getxattr, handle)
    }

    /// Declare a route notified before an xattr is stored.
    pub fn route_setxattr(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: SetxattrCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Setxattr, RouteHandler::Setxattr(cb))
    }

    pub fn unroute_setxattr(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Setxattr, handle)
    }

    /// Declare a route that may service listxattr requests.
    pub fn route_listxattr(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: ListxattrCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(pattern, consistency, RouteKind::Listxattr, RouteHandler::Listxattr(cb))
    }

    pub fn unroute_listxattr(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Listxattr, handle)
    }

    /// Declare a route notified before an xattr is removed.
    pub fn route_removexattr(
        &self,
        pattern: &str,
        consistency: Consistency,
        cb: RemovexattrCallback,
    ) -> Result<RouteHandle> {
        self.route_decl(
            pattern,
            consistency,
            RouteKind::Removexattr,
            RouteHandler::Removexattr(cb),
        )
    }

    pub fn unroute_removexattr(&self, handle: RouteHandle) -> Result<()> {
        self.route_undecl(RouteKind::Removexattr, handle)
    }

    /// Drop every declared route.
    pub fn unroute_all(&self) {
        self.routes().write().clear();
    }
}
