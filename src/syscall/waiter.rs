//! The waiter syscalls: kernel-side support for the userspace pthread
//! synchronization primitives.

use crate::errno;
use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `waiter_create` syscall.
///
/// The syscall returns the handle of the new waiter.
pub fn waiter_create(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	Ok(proc.lock().waiter_create() as usize)
}

/// The implementation of the `waiter_destroy` syscall.
pub fn waiter_destroy(proc: &Arc<Mutex<Process>>, id: u32) -> EResult<usize> {
	proc.lock().waiter_destroy(id)?;
	Ok(0)
}

/// The implementation of the `waiter_wait` syscall.
///
/// Waiting with a single thread in the process can never be satisfied, so it
/// fails with `EDEADLK`. An interrupting signal makes the syscall fail with
/// `EINTR`, the thread's interrupted flag set.
pub fn waiter_wait(proc: &Arc<Mutex<Process>>, id: u32) -> EResult<usize> {
	let (waiter, thread) = {
		let proc = proc.lock();
		if proc.threads.len() <= 1 {
			return Err(errno!(EDEADLK));
		}
		(proc.get_waiter(id)?, proc.get_thread(proc.current_tid)?)
	};

	waiter.wait(thread.interrupted_flag())?;
	Ok(0)
}

/// The implementation of the `waiter_trigger` syscall.
pub fn waiter_trigger(proc: &Arc<Mutex<Process>>, id: u32) -> EResult<usize> {
	let waiter = proc.lock().get_waiter(id)?;
	waiter.trigger();
	Ok(0)
}
