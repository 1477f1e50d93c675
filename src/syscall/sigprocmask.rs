//! The `sigprocmask` syscall examines the process's signal mask.
//!
//! Changing the mask from userspace is not wired yet: only the handler entry
//! and return paths manipulate it. The syscall reports the current mask and
//! accepts the arguments without acting on them.

use crate::errno::EResult;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `sigprocmask` syscall.
pub fn sigprocmask(proc: &Arc<Mutex<Process>>, _how: i32, _set: usize, oldset: usize) -> EResult<usize> {
	let mask = proc.lock().sigmask;
	if oldset != 0 {
		util::write_user_obj(proc, oldset, &mask)?;
	}
	Ok(0)
}
