//! The `nanosleep` syscall suspends the process with a sub-second
//! granularity.

use crate::errno;
use crate::errno::EResult;
use crate::process::Process;
use crate::time;
use crate::util::lock::Mutex;
use crate::syscall::util;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::hint::spin_loop;

/// The time record exchanged with userspace.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UserTimespec {
	/// Seconds.
	pub tv_sec: u32,
	/// Nanoseconds.
	pub tv_nsec: u32,
}

/// The implementation of the `nanosleep` syscall.
///
/// When woken early by a signal, the remaining time is written to `rem` (if
/// not null) and the syscall fails with `EINTR`.
pub fn nanosleep(proc: &Arc<Mutex<Process>>, req: usize, rem: usize) -> EResult<usize> {
	let req: UserTimespec = util::read_user_obj(proc, req)?;
	if req.tv_nsec >= 1_000_000_000 {
		return Err(errno!(EINVAL));
	}

	// The clock has a second granularity; sub-second sleeps round up
	let seconds = req.tv_sec as u64 + u64::from(req.tv_nsec > 0);
	let deadline = time::get() as u64 + seconds;

	loop {
		let now = time::get() as u64;
		if now >= deadline {
			return Ok(0);
		}

		if proc.lock().has_signal_pending() {
			if rem != 0 {
				let remaining = UserTimespec {
					tv_sec: (deadline - now) as u32,
					tv_nsec: 0,
				};
				util::write_user_obj(proc, rem, &remaining)?;
			}
			return Err(errno!(EINTR));
		}
		spin_loop();
	}
}
