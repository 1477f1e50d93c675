//! The `symlink` syscall creates a symbolic link.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::file::fs::ext2::NewNode;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `symlink` syscall.
///
/// `target` is the link's target path, stored as-is; `linkpath` is the
/// location of the new link.
pub fn symlink(proc: &Arc<Mutex<Process>>, target: usize, linkpath: usize) -> EResult<usize> {
	let target = util::read_user_string(proc, target)?;
	if target.is_empty() {
		return Err(errno!(ENOENT));
	}

	let resolved = util::resolve_user_path(proc, linkpath, false)?;
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
		0o777,
		uid,
		gid,
		NewNode::Symlink(&target),
	)?;
	Ok(0)
}
