//! The `readlink` syscall reads the target of a symbolic link.

use crate::errno;
use crate::errno::EResult;
use crate::file::FileType;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use core::cmp::min;

/// The implementation of the `readlink` syscall.
///
/// The target is written into the user buffer without a trailing null byte;
/// the syscall returns the number of bytes written.
pub fn readlink(
	proc: &Arc<Mutex<Process>>,
	pathname: usize,
	buf: usize,
	bufsiz: usize,
) -> EResult<usize> {
	let node = util::get_user_path_file(proc, pathname, false)?;
	if node.get_type() != FileType::Link {
		return Err(errno!(EINVAL));
	}

	let fs = proc.lock().fs.clone();
	let target = fs.readlink(&node)?;
	let len = min(target.len(), bufsiz);
	util::copy_to_user(proc, buf, &target[..len])?;
	Ok(len)
}
