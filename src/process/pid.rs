//! This module implements the PID allocator.

use crate::util::bitmap::Bitmap;
use crate::util::lock::Mutex;

/// Type representing a process ID.
pub type Pid = u32;

/// The PID of the init process.
pub const INIT_PID: Pid = 1;

/// The PID allocator's bitmap. Bit `i` stands for PID `i + 1`.
static PIDS: Mutex<Bitmap> = Mutex::new(Bitmap::new());

/// Allocates a PID, the lowest available.
pub fn alloc() -> Pid {
	let mut pids = PIDS.lock();
	let index = pids.find_first_clear();
	pids.set(index);
	index as Pid + 1
}

/// Releases the given PID.
pub fn free(pid: Pid) {
	if pid >= 1 {
		PIDS.lock().clear(pid as usize - 1);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn pid_alloc_free() {
		let a = alloc();
		let b = alloc();
		assert_ne!(a, b);

		free(a);
		free(b);
	}
}
