//! This module stores the errno utilities.
//!
//! Internal helpers return an [`EResult`]. The syscall dispatcher is
//! responsible for turning an `Err` into the calling thread's error indicator
//! together with a `-1` return value.

use core::fmt;

/// Creates an [`crate::errno::Errno`] from its identifier.
#[macro_export]
macro_rules! errno {
	($id:ident) => {
		$crate::errno::Errno::new($crate::errno::$id)
	};
}

/// Type holding the numeric value of an errno.
pub type ErrnoId = i32;

/// Result alias for functions which may fail with an errno.
pub type EResult<T> = core::result::Result<T, Errno>;

/// Operation not permitted.
pub const EPERM: ErrnoId = 1;
/// No such file or directory.
pub const ENOENT: ErrnoId = 2;
/// No such process.
pub const ESRCH: ErrnoId = 3;
/// Interrupted function.
pub const EINTR: ErrnoId = 4;
/// I/O error.
pub const EIO: ErrnoId = 5;
/// Executable file format error.
pub const ENOEXEC: ErrnoId = 8;
/// Bad file descriptor.
pub const EBADF: ErrnoId = 9;
/// No child processes.
pub const ECHILD: ErrnoId = 10;
/// Resource unavailable, try again.
pub const EAGAIN: ErrnoId = 11;
/// Not enough space.
pub const ENOMEM: ErrnoId = 12;
/// Permission denied.
pub const EACCES: ErrnoId = 13;
/// Bad address.
pub const EFAULT: ErrnoId = 14;
/// Device or resource busy.
pub const EBUSY: ErrnoId = 16;
/// File exists.
pub const EEXIST: ErrnoId = 17;
/// Not a directory or a symbolic link to a directory.
pub const ENOTDIR: ErrnoId = 20;
/// Is a directory.
pub const EISDIR: ErrnoId = 21;
/// Invalid argument.
pub const EINVAL: ErrnoId = 22;
/// File descriptor value too large.
pub const EMFILE: ErrnoId = 24;
/// Inappropriate I/O control operation.
pub const ENOTTY: ErrnoId = 25;
/// File too large.
pub const EFBIG: ErrnoId = 27;
/// No space left on device.
pub const ENOSPC: ErrnoId = 28;
/// Invalid seek.
pub const ESPIPE: ErrnoId = 29;
/// Read-only file system.
pub const EROFS: ErrnoId = 30;
/// Too many links.
pub const EMLINK: ErrnoId = 31;
/// Result too large.
pub const ERANGE: ErrnoId = 34;
/// Resource deadlock would occur.
pub const EDEADLK: ErrnoId = 35;
/// Filename too long.
pub const ENAMETOOLONG: ErrnoId = 36;
/// Functionality not supported.
pub const ENOSYS: ErrnoId = 38;
/// Directory not empty.
pub const ENOTEMPTY: ErrnoId = 39;
/// Too many levels of symbolic links.
pub const ELOOP: ErrnoId = 40;
/// Socket is connected.
pub const EISCONN: ErrnoId = 106;
/// Connection already in progress.
pub const EALREADY: ErrnoId = 114;
/// Operation in progress.
pub const EINPROGRESS: ErrnoId = 115;

/// Structure representing a Unix errno.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Errno {
	/// The errno's numeric value.
	errno: ErrnoId,
}

impl Errno {
	/// Creates a new instance from the given numeric value.
	pub const fn new(errno: ErrnoId) -> Self {
		Self {
			errno,
		}
	}

	/// Returns the errno's numeric value.
	pub const fn as_int(&self) -> ErrnoId {
		self.errno
	}

	/// Returns the message associated with the errno.
	pub fn strerror(&self) -> &'static str {
		match self.errno {
			EPERM => "Operation not permitted",
			ENOENT => "No such file or directory",
			ESRCH => "No such process",
			EINTR => "Interrupted system call",
			EIO => "Input/output error",
			ENOEXEC => "Exec format error",
			EBADF => "Bad file descriptor",
			ECHILD => "No child processes",
			EAGAIN => "Resource temporarily unavailable",
			ENOMEM => "Cannot allocate memory",
			EACCES => "Permission denied",
			EFAULT => "Bad address",
			EBUSY => "Device or resource busy",
			EEXIST => "File exists",
			ENOTDIR => "Not a directory",
			EISDIR => "Is a directory",
			EINVAL => "Invalid argument",
			EMFILE => "Too many open files",
			ENOTTY => "Inappropriate ioctl for device",
			EFBIG => "File too large",
			ENOSPC => "No space left on device",
			ESPIPE => "Illegal seek",
			EROFS => "Read-only file system",
			EMLINK => "Too many links",
			ERANGE => "Numerical result out of range",
			EDEADLK => "Resource deadlock avoided",
			ENAMETOOLONG => "File name too long",
			ENOSYS => "Function not implemented",
			ENOTEMPTY => "Directory not empty",
			ELOOP => "Too many levels of symbolic links",
			EISCONN => "Transport endpoint is already connected",
			EALREADY => "Operation already in progress",
			EINPROGRESS => "Operation now in progress",
			_ => "Unknown error",
		}
	}
}

impl fmt::Debug for Errno {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(fmt, "errno {}: {}", self.errno, self.strerror())
	}
}

impl fmt::Display for Errno {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(fmt, "{}", self.strerror())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn errno_value() {
		assert_eq!(errno!(ENOENT).as_int(), ENOENT);
		assert_ne!(errno!(ENOENT), errno!(EIO));
	}
}
