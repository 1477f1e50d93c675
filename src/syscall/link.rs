//! The `link` syscall creates a hard link.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::file::fs::ext2::NewNode;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `link` syscall.
///
/// The new link points to the same inode as `oldpath`.
pub fn link(proc: &Arc<Mutex<Process>>, oldpath: usize, newpath: usize) -> EResult<usize> {
	let target = util::get_user_path_file(proc, oldpath, false)?;

	let resolved = util::resolve_user_path(proc, newpath, false)?;
	if resolved.node.is_some() {
		return Err(errno!(EEXIST));
	}

	let (fs, uid, gid) = {
		let proc = proc.lock();
		(proc.fs.clone(), proc.euid, proc.egid)
	};
	if !file::can_access_node(&resolved.parent, uid, gid, file::ACCESS_WRITE) {
		return Err(errno!(EACCES));
	}

	fs.create_node(
		&resolved.parent,
		&resolved.name,
		0,
		uid,
		gid,
		NewNode::Link(&target),
	)?;
	Ok(0)
}
