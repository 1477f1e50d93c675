//! The `getppid` syscall returns the PID of the parent of the current
//! process.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `getppid` syscall.
pub fn getppid(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	Ok(proc.lock().get_parent_pid().unwrap_or(0) as usize)
}
