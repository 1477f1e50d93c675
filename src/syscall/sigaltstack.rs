//! The `sigaltstack` syscall installs an alternate signal stack.

use crate::errno::EResult;
use crate::process::signal::SS_DISABLE;
use crate::process::signal::SS_ONSTACK;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;

/// The alternate stack record exchanged with userspace.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UserStack {
	/// The base address of the stack.
	pub ss_sp: u32,
	/// Flags: `SS_DISABLE`, `SS_ONSTACK`.
	pub ss_flags: i32,
	/// The size of the stack in bytes.
	pub ss_size: u32,
}

/// The implementation of the `sigaltstack` syscall.
///
/// `ss` and `old_ss` are userspace pointers to [`UserStack`] records; either
/// may be null. The stack cannot be replaced while a handler runs on it.
pub fn sigaltstack(proc: &Arc<Mutex<Process>>, ss: usize, old_ss: usize) -> EResult<usize> {
	let old = {
		let proc = proc.lock();
		let stack = &proc.altstack;
		UserStack {
			ss_sp: stack.base,
			ss_flags: (if stack.enabled {
				0
			} else {
				SS_DISABLE
			}) | (if stack.in_use {
				SS_ONSTACK
			} else {
				0
			}),
			ss_size: stack.size,
		}
	};

	if ss != 0 {
		let new: UserStack = util::read_user_obj(proc, ss)?;
		let enabled = new.ss_flags & SS_DISABLE == 0;
		proc.lock().altstack.install(new.ss_sp, new.ss_size, enabled)?;
	}

	if old_ss != 0 {
		util::write_user_obj(proc, old_ss, &old)?;
	}
	Ok(0)
}
