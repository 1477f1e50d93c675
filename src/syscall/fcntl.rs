//! The `fcntl` syscall manipulates a file descriptor.

use crate::errno;
use crate::errno::EResult;
use crate::file::fd::FD_CLOEXEC;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// `fcntl` command: duplicate the descriptor onto the lowest id at least
/// `arg`.
pub const F_DUPFD: i32 = 0;
/// `fcntl` command: get the descriptor's flags.
pub const F_GETFD: i32 = 1;
/// `fcntl` command: set the descriptor's flags.
pub const F_SETFD: i32 = 2;
/// `fcntl` command: get the file status flags.
pub const F_GETFL: i32 = 3;
/// `fcntl` command: set the file status flags.
pub const F_SETFL: i32 = 4;

/// The implementation of the `fcntl` syscall.
pub fn fcntl(proc: &Arc<Mutex<Process>>, fd: u32, cmd: i32, arg: usize) -> EResult<usize> {
	let fds = proc.lock().fds.clone();

	match cmd {
		F_DUPFD => {
			let newfd = fds.write().dup_min(fd, arg as u32)?;
			Ok(newfd as usize)
		}
		F_GETFD => {
			let fds = fds.read();
			let fd = fds.get_fd(fd).ok_or_else(|| errno!(EBADF))?;
			Ok(fd.get_flags() as usize)
		}
		F_SETFD => {
			let mut fds = fds.write();
			let fd = fds.get_fd_mut(fd).ok_or_else(|| errno!(EBADF))?;
			fd.set_flags(arg as i32 & FD_CLOEXEC);
			Ok(0)
		}
		F_GETFL => {
			let open_file = util::get_open_file(proc, fd)?;
			Ok(open_file.get_status_flags() as usize)
		}
		F_SETFL => {
			let open_file = util::get_open_file(proc, fd)?;
			open_file.set_status_flags(arg as i32);
			Ok(0)
		}
		_ => Err(errno!(EINVAL)),
	}
}
