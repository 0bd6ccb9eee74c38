//! Access checks.

use crate::core::Core;
use crate::error::{Error, Result};
use crate::gc;
use crate::inode::{is_executable, is_readable, is_writeable};
use crate::ops::stat::fstat;

/// Check whether (user, group) may access `path` with the requested
/// `amode` (a mask of `R_OK`/`W_OK`/`X_OK`; `F_OK` is implied by a
/// successful resolution).  The check runs against the stat record after
/// the stat route has had its say.
pub fn access(core: &Core, path: &str, user: u64, group: u64, amode: i32) -> Result<()> {
    let node = gc::ref_path(core, path, user, group)?;

    let result = (|| {
        let sb = fstat(core, path, &node)?;

        let mode = sb.st_mode as u32;
        let uid = sb.st_uid as u64;
        let gid = sb.st_gid as u64;

        if amode & libc::R_OK != 0 && !is_readable(mode, uid, gid, user, group) {
            return Err(Error::Access);
        }
        if amode & libc::W_OK != 0 && !is_writeable(mode, uid, gid, user, group) {
            return Err(Error::Access);
        }
        if amode & libc::X_OK != 0 && !is_executable(mode, uid, gid, user, group) {
            return Err(Error::Access);
        }

        Ok(())
    })();

    let _ = gc::unref(core, path, &node);
    result
}
