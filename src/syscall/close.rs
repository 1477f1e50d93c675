//! The `close` syscall closes the given file descriptor.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `close` syscall.
pub fn close(proc: &Arc<Mutex<Process>>, fd: u32) -> EResult<usize> {
	let fds = proc.lock().fds.clone();
	fds.write().close_fd(fd)?;
	Ok(0)
}
