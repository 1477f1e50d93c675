//! The `dup` syscall allows to duplicate a file descriptor.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `dup` syscall.
///
/// The duplicate gets the lowest available id.
pub fn dup(proc: &Arc<Mutex<Process>>, oldfd: u32) -> EResult<usize> {
	let fds = proc.lock().fds.clone();
	let newfd = fds.write().dup(oldfd)?;
	Ok(newfd as usize)
}
