//! This module implements POSIX limits.

/// Maximum number of file descriptors a process can open at once.
pub const OPEN_MAX: usize = 1024;
/// Maximum length of a filename, in bytes.
pub const NAME_MAX: usize = 255;
/// Maximum length of a path, in bytes.
pub const PATH_MAX: usize = 4096;
/// Maximum number of links to a single file.
pub const LINK_MAX: usize = 32000;
/// Maximum number of bytes in a symbolic link's target.
pub const SYMLINK_MAX: usize = PATH_MAX;

/// Number of signals supported by the signal facility.
pub const NSIG: usize = 32;
/// Minimum size in bytes of an alternate signal stack.
pub const MINSIGSTKSZ: usize = 2048;
/// Default size in bytes of an alternate signal stack.
pub const SIGSTKSZ: usize = 8192;

/// Minimum size in bytes of a thread's stack.
pub const PTHREAD_STACK_MIN: usize = 16384;
/// Default size in bytes of a thread's stack.
pub const PTHREAD_STACK_DEFAULT: usize = 0x100000;
/// Maximum number of thread-specific data keys per thread.
pub const PTHREAD_KEYS_MAX: usize = 128;
