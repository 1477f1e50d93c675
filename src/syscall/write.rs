//! The `write` syscall writes a user buffer to a file descriptor.

use crate::errno::EResult;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec;

/// The implementation of the `write` syscall.
///
/// The syscall returns the number of bytes written.
pub fn write(proc: &Arc<Mutex<Process>>, fd: u32, buf: usize, count: usize) -> EResult<usize> {
	let open_file = util::get_open_file(proc, fd)?;

	let mut buff = vec![0u8; count];
	util::copy_from_user(proc, buf, &mut buff)?;
	let len = open_file.write(&buff)?;
	Ok(len)
}
