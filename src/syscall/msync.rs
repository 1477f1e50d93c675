//! The `msync` syscall writes a file-backed mapping back to its file.

use crate::errno::EResult;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `msync` syscall.
pub fn msync(proc: &Arc<Mutex<Process>>, addr: usize, length: usize, _flags: i32) -> EResult<usize> {
	let mem_space = proc.lock().mem_space.clone();
	mem_space.lock().msync(addr, length)?;
	Ok(0)
}
