//! The `mkdir` syscall creates a directory.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::file::fs::ext2::NewNode;
use crate::file::Mode;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `mkdir` syscall.
pub fn mkdir(proc: &Arc<Mutex<Process>>, pathname: usize, mode: Mode) -> EResult<usize> {
	let resolved = util::resolve_user_path(proc, pathname, true)?;
	if resolved.node.is_some() {
		return Err(errno!(EEXIST));
	}

	let (fs, uid, gid, umask) = {
		let proc = proc.lock();
		(proc.fs.clone(), proc.euid, proc.egid, proc.umask)
	};
	if !file::can_access_node(&resolved.parent, uid, gid, file::ACCESS_WRITE) {
		return Err(errno!(EACCES));
	}

	fs.create_node(
		&resolved.parent,
		&resolved.name,
		mode & !umask & 0o777,
		uid,
		gid,
		NewNode::Directory,
	)?;
	Ok(0)
}
