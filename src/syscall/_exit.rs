//! The `_exit` syscall allows to terminate the current process with the
//! given status code.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `_exit` syscall.
///
/// The syscall does not return to userspace.
pub fn _exit(proc: &Arc<Mutex<Process>>, status: u32) -> EResult<usize> {
	proc.lock().exit(status & 0xff, false);
	Ok(0)
}
