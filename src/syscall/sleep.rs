//! The `sleep` syscall suspends the process for the given number of seconds.

use crate::errno::EResult;
use crate::process::Process;
use crate::time;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use core::hint::spin_loop;

/// The implementation of the `sleep` syscall.
///
/// The syscall returns zero when the full time has elapsed, or the number of
/// seconds remaining when woken early by a signal.
pub fn sleep(proc: &Arc<Mutex<Process>>, seconds: u32) -> EResult<usize> {
	let deadline = time::get() as u64 + seconds as u64;

	loop {
		let now = time::get() as u64;
		if now >= deadline {
			return Ok(0);
		}

		// A signal wakes the sleep early; the remaining time is reported
		if proc.lock().has_signal_pending() {
			return Ok((deadline - now) as usize);
		}
		spin_loop();
	}
}
