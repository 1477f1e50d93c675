//! The thread-specific data key syscalls.
//!
//! Key destructors are userspace functions: `pthread_key_delete` reports the
//! destructor and the current value back to the calling thread, which
//! invokes the destructor before the slot is gone.

use crate::errno::EResult;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `pthread_key_create` syscall.
///
/// Arguments:
/// - `key` is a userspace pointer receiving the new key's index.
/// - `destructor` is the userspace address of the destructor, zero for none.
pub fn pthread_key_create(
	proc: &Arc<Mutex<Process>>,
	key: usize,
	destructor: u32,
) -> EResult<usize> {
	let index = {
		let proc = proc.lock();
		let thread = proc.get_thread(proc.current_tid)?;
		let index = thread.keys.lock().key_create(destructor)?;
		index
	};

	if key != 0 {
		util::write_user_obj(proc, key, &(index as u32))?;
	}
	Ok(index)
}

/// The implementation of the `pthread_key_delete` syscall.
///
/// `out` is a userspace pointer receiving the destructor address and the
/// value, each a machine word, when a destructor is to be run; both are
/// written as zero otherwise.
pub fn pthread_key_delete(proc: &Arc<Mutex<Process>>, key: usize, out: usize) -> EResult<usize> {
	let pair = {
		let proc = proc.lock();
		let thread = proc.get_thread(proc.current_tid)?;
		let pair = thread.keys.lock().key_delete(key)?;
		pair
	};

	if out != 0 {
		let (destructor, value) = pair.unwrap_or((0, 0));
		util::write_user_obj(proc, out, &[destructor, value as u32])?;
	}
	Ok(0)
}

/// The implementation of the `pthread_setspecific` syscall.
pub fn pthread_setspecific(proc: &Arc<Mutex<Process>>, key: usize, value: usize) -> EResult<usize> {
	let proc = proc.lock();
	let thread = proc.get_thread(proc.current_tid)?;
	thread.keys.lock().set_specific(key, value)?;
	Ok(0)
}

/// The implementation of the `pthread_getspecific` syscall.
///
/// A deleted or unset key yields zero.
pub fn pthread_getspecific(proc: &Arc<Mutex<Process>>, key: usize) -> EResult<usize> {
	let proc = proc.lock();
	let thread = proc.get_thread(proc.current_tid)?;
	let value = thread.keys.lock().get_specific(key);
	Ok(value)
}
