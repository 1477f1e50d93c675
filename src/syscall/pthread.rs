//! The pthread syscalls: thread creation, join, detach, exit, kill and
//! sigmask.

use crate::errno::EResult;
use crate::process::signal::Signal;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;

/// The thread attributes record read from userspace.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UserPthreadAttr {
	/// The detach state of the new thread.
	pub detachstate: i32,
	/// The size of the new thread's stack in bytes; zero for the default.
	pub stacksize: u32,
}

/// The implementation of the `pthread_create` syscall.
///
/// Arguments:
/// - `thread` is a userspace pointer receiving the new thread's ID.
/// - `attr` is an optional userspace pointer to a [`UserPthreadAttr`].
/// - `start_routine` is the userspace address of the thread's start routine.
/// - `arg` is the argument passed to the start routine.
pub fn pthread_create(
	proc: &Arc<Mutex<Process>>,
	thread: usize,
	attr: usize,
	start_routine: u32,
	arg: u32,
) -> EResult<usize> {
	let attr: UserPthreadAttr = if attr != 0 {
		util::read_user_obj(proc, attr)?
	} else {
		Default::default()
	};

	let tid = proc
		.lock()
		.pthread_create(attr.stacksize as usize, start_routine, arg)?;
	if attr.detachstate != 0 {
		proc.lock().pthread_detach(tid)?;
	}

	if thread != 0 {
		util::write_user_obj(proc, thread, &tid)?;
	}
	Ok(tid as usize)
}

/// The implementation of the `pthread_join` syscall.
///
/// `retval` is an optional userspace pointer receiving the thread's return
/// value.
pub fn pthread_join(proc: &Arc<Mutex<Process>>, tid: u32, retval: usize) -> EResult<usize> {
	// The check happens under the process lock, the wait outside of it: the
	// target needs the lock to exit
	let thread = {
		let proc = proc.lock();
		if proc.current_tid == tid {
			return Err(errno!(EDEADLK));
		}
		let thread = proc.get_thread(tid)?;
		if thread.is_detached() {
			return Err(errno!(EINVAL));
		}
		thread
	};

	let value = thread.join_wait()?;
	proc.lock().reap_thread(tid);

	if retval != 0 {
		util::write_user_obj(proc, retval, &(value as u32))?;
	}
	Ok(0)
}

/// The implementation of the `pthread_detach` syscall.
pub fn pthread_detach(proc: &Arc<Mutex<Process>>, tid: u32) -> EResult<usize> {
	proc.lock().pthread_detach(tid)?;
	Ok(0)
}

/// The implementation of the `pthread_exit` syscall.
///
/// The syscall does not return to the calling thread.
pub fn pthread_exit(proc: &Arc<Mutex<Process>>, retval: usize) -> EResult<usize> {
	let mut proc = proc.lock();
	let tid = proc.current_tid;
	proc.pthread_exit(tid, retval)?;
	Ok(0)
}

/// The implementation of the `pthread_kill` syscall.
///
/// Signal handling state is process-wide: the signal is raised on the
/// process after validating the target thread.
pub fn pthread_kill(proc: &Arc<Mutex<Process>>, tid: u32, signum: i32) -> EResult<usize> {
	let sig = Signal::new(signum)?;

	let mut proc = proc.lock();
	proc.get_thread(tid)?;
	proc.raise_signal(&sig);
	proc.deliver_pending_signals();
	Ok(0)
}
