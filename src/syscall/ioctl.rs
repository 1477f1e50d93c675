//! The `ioctl` syscall performs device-specific operations on a file
//! descriptor.

use crate::errno;
use crate::errno::EResult;
use crate::file::open_file::O_NONBLOCK;
use crate::process::Process;
use crate::syscall::util;
use crate::tty::WinSize;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// `ioctl` command: get the terminal window size.
pub const TIOCGWINSZ: u32 = 0x5413;
/// `ioctl` command: set the terminal window size.
pub const TIOCSWINSZ: u32 = 0x5414;
/// `ioctl` command: toggle non-blocking I/O.
pub const FIONBIO: u32 = 0x5421;

/// The implementation of the `ioctl` syscall.
pub fn ioctl(proc: &Arc<Mutex<Process>>, fd: u32, cmd: u32, arg: usize) -> EResult<usize> {
	// The descriptor must be valid regardless of the command
	let open_file = util::get_open_file(proc, fd)?;

	match cmd {
		TIOCGWINSZ => {
			let tty = proc.lock().tty.clone().ok_or_else(|| errno!(ENOTTY))?;
			util::write_user_obj(proc, arg, &tty.get_winsize())?;
			Ok(0)
		}
		TIOCSWINSZ => {
			let tty = proc.lock().tty.clone().ok_or_else(|| errno!(ENOTTY))?;
			let winsize: WinSize = util::read_user_obj(proc, arg)?;
			tty.set_winsize(winsize);
			Ok(0)
		}
		FIONBIO => {
			let on: i32 = util::read_user_obj(proc, arg)?;
			let flags = open_file.get_status_flags();
			if on != 0 {
				open_file.set_status_flags(flags | O_NONBLOCK);
			} else {
				open_file.set_status_flags(flags & !O_NONBLOCK);
			}
			Ok(0)
		}
		_ => Err(errno!(EINVAL)),
	}
}
