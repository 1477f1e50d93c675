//! The `sigreturn` syscall restores the context saved when a signal handler
//! was entered.
//!
//! Userspace does not call it directly: the signal trampoline traps through
//! it when the handler returns.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `sigreturn` syscall.
///
/// The return value is the interrupted context's own return register, so
/// that resuming it is transparent.
pub fn sigreturn(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	let mut proc = proc.lock();
	proc.signal_restore()?;
	Ok(proc.regs.eax as usize)
}
