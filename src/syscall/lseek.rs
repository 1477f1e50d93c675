//! The `lseek` syscall repositions the offset of the given file descriptor.

use crate::errno::EResult;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `lseek` syscall.
///
/// The syscall returns the new offset.
pub fn lseek(proc: &Arc<Mutex<Process>>, fd: u32, offset: i64, whence: i32) -> EResult<usize> {
	let open_file = util::get_open_file(proc, fd)?;
	let new = open_file.lseek(offset, whence)?;
	Ok(new as usize)
}
