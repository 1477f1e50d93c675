//! This module implements the locking primitives used across the kernel.
//!
//! The underlying implementation is provided by the `spin` crate. Aliases are
//! kept so that callers do not depend on the implementation directly.

/// Mutual exclusion lock.
pub type Mutex<T> = spin::Mutex<T>;
/// Guard for [`Mutex`].
pub type MutexGuard<'a, T> = spin::MutexGuard<'a, T>;

/// Single-writer/many-readers lock.
///
/// Used for structures which are read often but written rarely, such as the
/// file descriptor table and the signal handler table.
pub type RwLock<T> = spin::RwLock<T>;

/// One-time initialization cell.
pub type Once<T> = spin::Once<T>;
