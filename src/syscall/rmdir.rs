//! The `rmdir` syscall removes an empty directory.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `rmdir` syscall.
pub fn rmdir(proc: &Arc<Mutex<Process>>, pathname: usize) -> EResult<usize> {
	let resolved = util::resolve_user_path(proc, pathname, false)?;

	let (fs, uid, gid) = {
		let proc = proc.lock();
		(proc.fs.clone(), proc.euid, proc.egid)
	};
	if !file::can_access_node(&resolved.parent, uid, gid, file::ACCESS_WRITE) {
		return Err(errno!(EACCES));
	}

	fs.remove_node(&resolved.parent, &resolved.name, true)?;
	Ok(0)
}
