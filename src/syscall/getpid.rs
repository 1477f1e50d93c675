//! The `getpid` syscall returns the PID of the current process.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `getpid` syscall.
pub fn getpid(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	Ok(proc.lock().get_pid() as usize)
}
