//! This module contains the Semaphore structure.
//!
//! Semaphores are the kernel's blocking primitive: waiting on process state
//! changes and the waiter objects handed to user-space synchronization
//! primitives are both built on them.

use crate::errno;
use crate::errno::EResult;
use crate::util::lock::Mutex;
use core::hint::spin_loop;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering::Acquire;

/// A counting semaphore.
pub struct Semaphore {
	/// The semaphore's counter.
	count: Mutex<u64>,
}

impl Semaphore {
	/// Creates a new semaphore with the given initial count.
	pub const fn new(count: u64) -> Self {
		Self {
			count: Mutex::new(count),
		}
	}

	/// Increments the semaphore's counter, releasing one waiter.
	pub fn post(&self) {
		*self.count.lock() += 1;
	}

	/// Tries to decrement the semaphore's counter.
	///
	/// The function returns `true` if the counter was decremented.
	pub fn try_wait(&self) -> bool {
		let mut count = self.count.lock();
		if *count > 0 {
			*count -= 1;
			true
		} else {
			false
		}
	}

	/// Decrements the semaphore's counter, blocking until it is possible.
	///
	/// If `interrupted` is set while waiting, the function fails with
	/// `EINTR` without decrementing the counter.
	pub fn wait(&self, interrupted: Option<&AtomicBool>) -> EResult<()> {
		loop {
			if self.try_wait() {
				return Ok(());
			}
			if let Some(flag) = interrupted {
				if flag.load(Acquire) {
					return Err(errno!(EINTR));
				}
			}
			spin_loop();
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use core::sync::atomic::Ordering::Release;

	#[test]
	fn semaphore_count() {
		let sem = Semaphore::new(1);
		assert!(sem.try_wait());
		assert!(!sem.try_wait());

		sem.post();
		assert!(sem.try_wait());
	}

	#[test]
	fn semaphore_interrupted() {
		let sem = Semaphore::new(0);
		let flag = AtomicBool::new(true);
		flag.store(true, Release);

		let res = sem.wait(Some(&flag));
		assert_eq!(res.unwrap_err().as_int(), errno::EINTR);
	}
}
