//! The `read` syscall reads from a file descriptor into a user buffer.

use crate::errno::EResult;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec;

/// The implementation of the `read` syscall.
///
/// The syscall returns the number of bytes read; zero at end of file.
pub fn read(proc: &Arc<Mutex<Process>>, fd: u32, buf: usize, count: usize) -> EResult<usize> {
	let open_file = util::get_open_file(proc, fd)?;

	let mut buff = vec![0u8; count];
	let len = open_file.read(&mut buff)?;
	util::copy_to_user(proc, buf, &buff[..len])?;
	Ok(len)
}
