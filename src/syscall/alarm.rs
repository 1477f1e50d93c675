//! The `alarm` syscall arms a timer raising `SIGALRM` at expiry.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `alarm` syscall.
///
/// The syscall returns the seconds remaining on the previously armed timer;
/// passing zero disarms the timer.
pub fn alarm(proc: &Arc<Mutex<Process>>, seconds: u32) -> EResult<usize> {
	Ok(proc.lock().alarm(seconds) as usize)
}
