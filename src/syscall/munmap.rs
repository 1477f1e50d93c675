//! The `munmap` syscall unmaps a region of the process's address space.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `munmap` syscall.
pub fn munmap(proc: &Arc<Mutex<Process>>, addr: usize, length: usize) -> EResult<usize> {
	let mem_space = proc.lock().mem_space.clone();
	mem_space.lock().unmap(addr, length)?;
	Ok(0)
}
