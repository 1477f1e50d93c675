//! The `fork` syscall duplicates the current process into a child process.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `fork` syscall.
///
/// The syscall returns the child's PID in the parent and zero in the child.
pub fn fork(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	let child = Process::fork(proc)?;
	let child_pid = child.lock().get_pid();
	Ok(child_pid as usize)
}
