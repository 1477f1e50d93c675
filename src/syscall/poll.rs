//! The `poll` syscall waits for events on a set of file descriptors.

use crate::errno;
use crate::errno::EResult;
use crate::process::Process;
use crate::syscall::util;
use crate::time;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec::Vec;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::hint::spin_loop;
use core::mem::size_of;

/// A descriptor's entry in the `poll` syscall.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct PollFd {
	/// The file descriptor.
	pub fd: i32,
	/// The requested events.
	pub events: i16,
	/// The returned events.
	pub revents: i16,
}

/// Computes the ready events for each entry, returning the number of entries
/// with at least one.
fn scan(proc: &Arc<Mutex<Process>>, fds: &mut [PollFd]) -> usize {
	let mut count = 0;
	for entry in fds.iter_mut() {
		if entry.fd < 0 {
			entry.revents = 0;
			continue;
		}

		let revents = match util::get_open_file(proc, entry.fd as u32) {
			Ok(open_file) => open_file.poll(entry.events as u32) as i16,
			// POLLNVAL
			Err(_) => 0x20,
		};
		entry.revents = revents;
		if revents != 0 {
			count += 1;
		}
	}
	count
}

/// The implementation of the `poll` syscall.
///
/// `timeout` is in milliseconds; a negative value blocks indefinitely.
pub fn poll(proc: &Arc<Mutex<Process>>, fds: usize, nfds: usize, timeout: i32) -> EResult<usize> {
	if nfds > crate::limits::OPEN_MAX {
		return Err(errno!(EINVAL));
	}

	// Read the entries
	let mut entries: Vec<PollFd> = Vec::with_capacity(nfds);
	for i in 0..nfds {
		entries.push(util::read_user_obj(proc, fds + i * size_of::<PollFd>())?);
	}

	let deadline = (timeout >= 0)
		.then(|| time::get() as u64 + (timeout as u64).div_ceil(1000));

	loop {
		let count = scan(proc, &mut entries);
		let expired = deadline.map(|d| time::get() as u64 >= d).unwrap_or(false);

		if count > 0 || expired {
			for (i, entry) in entries.iter().enumerate() {
				util::write_user_obj(proc, fds + i * size_of::<PollFd>(), entry)?;
			}
			return Ok(count);
		}

		if proc.lock().has_signal_pending() {
			return Err(errno!(EINTR));
		}
		spin_loop();
	}
}
