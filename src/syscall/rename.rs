//! The `rename` syscall moves or renames a file.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `rename` syscall.
pub fn rename(proc: &Arc<Mutex<Process>>, oldpath: usize, newpath: usize) -> EResult<usize> {
	let old = util::resolve_user_path(proc, oldpath, false)?;
	if old.node.is_none() {
		return Err(errno!(ENOENT));
	}
	let new = util::resolve_user_path(proc, newpath, false)?;

	let (fs, uid, gid) = {
		let proc = proc.lock();
		(proc.fs.clone(), proc.euid, proc.egid)
	};
	if !file::can_access_node(&old.parent, uid, gid, file::ACCESS_WRITE)
		|| !file::can_access_node(&new.parent, uid, gid, file::ACCESS_WRITE)
	{
		return Err(errno!(EACCES));
	}

	fs.rename(&old.parent, &old.name, &new.parent, &new.name)?;
	Ok(0)
}
