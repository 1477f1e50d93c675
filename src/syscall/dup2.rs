//! The `dup2` syscall allows to duplicate a file descriptor, specifying the
//! id of the newly created file descriptor.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `dup2` syscall.
///
/// The descriptor `newfd` is closed first if it is open; the duplicate's
/// close-on-exec flag is clear.
pub fn dup2(proc: &Arc<Mutex<Process>>, oldfd: u32, newfd: u32) -> EResult<usize> {
	let fds = proc.lock().fds.clone();
	let newfd = fds.write().dup2(oldfd, newfd)?;
	Ok(newfd as usize)
}
