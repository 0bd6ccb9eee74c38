//! Extended attributes.
//!
//! The library owns the xattr store; the xattr routes are notification and
//! override points.  Get and list callbacks may service a request entirely
//! (returning `Some(len)`) or decline (`None`), in which case the built-in
//! store answers.  Set and remove callbacks are notified before the store
//! is updated and may veto the operation by failing.

use crate::core::Core;
use crate::error::{Error, Result};
use crate::gc;
use crate::inode::{rlock, wlock, InodeRef, XattrFlags};
use crate::route::{self, Dispatched, NodeInfo};

/// Get an xattr by path.
pub fn getxattr(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    name: &str,
    buf: &mut [u8],
) -> Result<usize> {
    let node = gc::ref_path(core, path, user, group)?;
    let result = fgetxattr(core, path, &node, name, buf);
    let _ = gc::unref(core, path, &node);
    result
}

/// Get an xattr value.  With an empty buffer, returns the value's length;
/// with a buffer too small for the value, fails with `range`.
pub fn fgetxattr(
    core: &Core,
    path: &str,
    node: &InodeRef,
    name: &str,
    buf: &mut [u8],
) -> Result<usize> {
    let tinfo = {
        let state = rlock(node, "fgetxattr")?;
        NodeInfo::of(&state)
    };

    match route::call_getxattr(core, path, node, tinfo, name, buf)? {
        Dispatched::Handled(Some(len)) => return Ok(len),
        Dispatched::Handled(None) | Dispatched::NoRoute => {}
    }

    let state = rlock(node, "fgetxattr")?;
    let value = state.xattrs().find(name).ok_or(Error::NoAttr)?;

    if buf.is_empty() {
        return Ok(value.len());
    }
    if value.len() > buf.len() {
        return Err(Error::Range);
    }

    buf[..value.len()].copy_from_slice(value);
    Ok(value.len())
}

/// Set an xattr by path.
pub fn setxattr(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    name: &str,
    value: &[u8],
    flags: XattrFlags,
) -> Result<()> {
    let node = gc::ref_path(core, path, user, group)?;
    let result = fsetxattr(core, path, &node, name, value, flags);
    let _ = gc::unref(core, path, &node);
    result
}

/// Set an xattr value, honoring [`XattrFlags::CREATE`] and
/// [`XattrFlags::REPLACE`].
pub fn fsetxattr(
    core: &Core,
    path: &str,
    node: &InodeRef,
    name: &str,
    value: &[u8],
    flags: XattrFlags,
) -> Result<()> {
    if flags.contains(XattrFlags::CREATE | XattrFlags::REPLACE) {
        return Err(Error::Invalid);
    }

    let tinfo = {
        let state = rlock(node, "fsetxattr")?;
        NodeInfo::of(&state)
    };

    // the route may veto the store
    route::call_setxattr(core, path, node, tinfo, name, value, flags)?;

    let mut state = wlock(node, "fsetxattr")?;
    state.xattrs_mut().insert(name, value, flags)?;
    state.set_ctime(None);

    Ok(())
}

/// List xattr names by path.
pub fn listxattr(
    core: &Core,
    path: &str,
    user: u64,
    group: u64,
    buf: &mut [u8],
) -> Result<usize> {
    let node = gc::ref_path(core, path, user, group)?;
    let result = flistxattr(core, path, &node, buf);
    let _ = gc::unref(core, path, &node);
    result
}

/// List xattr names, NUL-separated.  With an empty buffer, returns the
/// total length of the name list; with a buffer too small, fails with
/// `range`.
pub fn flistxattr(core: &Core, path: &str, node: &InodeRef, buf: &mut [u8]) -> Result<usize> {
    let tinfo = {
        let state = rlock(node, "flistxattr")?;
        NodeInfo::of(&state)
    };

    let route_buf = if buf.is_empty() {
        None
    } else {
        Some(&mut *buf)
    };

    match route::call_listxattr(core, path, node, tinfo, route_buf)? {
        Dispatched::Handled(Some(len)) => return Ok(len),
        Dispatched::Handled(None) | Dispatched::NoRoute => {}
    }

    let state = rlock(node, "flistxattr")?;

    let total: usize = state.xattrs().names().map(|n| n.len() + 1).sum();

    if buf.is_empty() {
        return Ok(total);
    }
    if total > buf.len() {
        return Err(Error::Range);
    }

    let mut offset = 0;
    for name in state.xattrs().names() {
        buf[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        offset += name.len();
        buf[offset] = 0;
        offset += 1;
    }

    Ok(total)
}

/// Remove an xattr by path.
pub fn removexattr(core: &Core, path: &str, user: u64, group: u64, name: &str) -> Result<()> {
    let node = gc::ref_path(core, path, user, group)?;
    let result = fremovexattr(core, path, &node, name);
    let _ = gc::unref(core, path, &node);
    result
}

/// Remove an xattr.  Fails with `no-attr` if it is absent.
pub fn fremovexattr(core: &Core, path: &str, node: &InodeRef, name: &str) -> Result<()> {
    let tinfo = {
        let state = rlock(node, "fremovexattr")?;
        NodeInfo::of(&state)
    };

    route::call_removexattr(core, path, node, tinfo, name)?;

    let mut state = wlock(node, "fremovexattr")?;
    if !state.xattrs_mut().remove(name) {
        return Err(Error::NoAttr);
    }
    state.set_ctime(None);

    Ok(())
}

/// Drop every xattr on an inode at once.
pub fn fremovexattr_all(_core: &Core, node: &InodeRef) -> Result<()> {
    let mut state = wlock(node, "fremovexattr_all")?;
    state.xattrs_mut().clear();
    state.set_ctime(None);
    Ok(())
}
