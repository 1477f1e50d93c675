//! This module is the interface with the system clock.
//!
//! The actual time source (PIT, RTC, ...) is driven by the surrounding
//! kernel, which pushes the current timestamp through [`set`]. The rest of
//! the kernel only ever reads it.

use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering::Acquire;
use core::sync::atomic::Ordering::Release;

/// Type representing a timestamp in seconds since the Unix epoch.
pub type Timestamp = u32;

/// The current timestamp, updated by the timer interrupt.
static CURRENT: AtomicU64 = AtomicU64::new(0);

/// Returns the current timestamp in seconds.
pub fn get() -> Timestamp {
	CURRENT.load(Acquire) as Timestamp
}

/// Sets the current timestamp in seconds.
///
/// This function is called by the clock source on time updates.
pub fn set(ts: Timestamp) {
	CURRENT.store(ts as u64, Release);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn clock_set_get() {
		set(1000);
		assert_eq!(get(), 1000);
	}
}
