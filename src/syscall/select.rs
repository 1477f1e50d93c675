//! The `select` syscall waits for readiness on sets of file descriptors.

use crate::errno;
use crate::errno::EResult;
use crate::file::open_file::POLLIN;
use crate::file::open_file::POLLOUT;
use crate::process::Process;
use crate::syscall::util;
use crate::time;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::hint::spin_loop;

/// The maximum number of descriptors in a set.
pub const FD_SETSIZE: usize = 1024;

/// A set of file descriptors, one bit per descriptor.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FdSet {
	/// The set's bits.
	pub fds_bits: [u32; FD_SETSIZE / 32],
}

impl Default for FdSet {
	fn default() -> Self {
		Self {
			fds_bits: [0; FD_SETSIZE / 32],
		}
	}
}

impl FdSet {
	/// Tells whether the descriptor `fd` is in the set.
	fn is_set(&self, fd: usize) -> bool {
		self.fds_bits[fd / 32] & (1 << (fd % 32)) != 0
	}

	/// Adds the descriptor `fd` to the set.
	fn set(&mut self, fd: usize) {
		self.fds_bits[fd / 32] |= 1 << (fd % 32);
	}
}

/// The time record of the `select` syscall.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UserTimeval {
	/// Seconds.
	pub tv_sec: u32,
	/// Microseconds.
	pub tv_usec: u32,
}

/// Reads an optional descriptor set from userspace.
fn read_set(proc: &Arc<Mutex<Process>>, addr: usize) -> EResult<Option<FdSet>> {
	if addr == 0 {
		return Ok(None);
	}
	Ok(Some(util::read_user_obj(proc, addr)?))
}

/// The implementation of the `select` syscall.
///
/// The syscall returns the number of ready descriptors across the three
/// sets.
pub fn select(
	proc: &Arc<Mutex<Process>>,
	nfds: usize,
	readfds: usize,
	writefds: usize,
	exceptfds: usize,
	timeout: usize,
) -> EResult<usize> {
	if nfds > FD_SETSIZE {
		return Err(errno!(EINVAL));
	}

	let read_in = read_set(proc, readfds)?;
	let write_in = read_set(proc, writefds)?;
	// Exceptional conditions are not reported on regular files
	let _ = read_set(proc, exceptfds)?;

	let deadline = if timeout != 0 {
		let tv: UserTimeval = util::read_user_obj(proc, timeout)?;
		let seconds = tv.tv_sec as u64 + u64::from(tv.tv_usec > 0);
		Some(time::get() as u64 + seconds)
	} else {
		None
	};

	loop {
		let mut read_out = FdSet::default();
		let mut write_out = FdSet::default();
		let mut count = 0;

		for fd in 0..nfds {
			let want_read = read_in.as_ref().map(|s| s.is_set(fd)).unwrap_or(false);
			let want_write = write_in.as_ref().map(|s| s.is_set(fd)).unwrap_or(false);
			if !want_read && !want_write {
				continue;
			}

			let open_file = util::get_open_file(proc, fd as u32)?;
			let revents = open_file.poll(POLLIN | POLLOUT);
			if want_read && revents & POLLIN != 0 {
				read_out.set(fd);
				count += 1;
			}
			if want_write && revents & POLLOUT != 0 {
				write_out.set(fd);
				count += 1;
			}
		}

		let expired = deadline.map(|d| time::get() as u64 >= d).unwrap_or(false);
		if count > 0 || expired {
			if readfds != 0 {
				util::write_user_obj(proc, readfds, &read_out)?;
			}
			if writefds != 0 {
				util::write_user_obj(proc, writefds, &write_out)?;
			}
			if exceptfds != 0 {
				util::write_user_obj(proc, exceptfds, &FdSet::default())?;
			}
			return Ok(count);
		}

		if proc.lock().has_signal_pending() {
			return Err(errno!(EINTR));
		}
		spin_loop();
	}
}
