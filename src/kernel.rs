//! Basalt is a POSIX kernel integration layer: an ext2 filesystem driver and
//! the process substrate (file descriptors, signals, pthreads, system calls)
//! exposing it to user programs.
//!
//! The surrounding kernel (scheduler, virtual memory manager, block cache
//! internals, trap handling) is reached through the interfaces of the
//! [`device`], [`time`] and [`process::mem_space`] modules.

#![cfg_attr(not(test), no_std)]
#![allow(dead_code)]

extern crate alloc;

#[macro_use]
pub mod errno;
#[macro_use]
pub mod logger;

pub mod device;
pub mod file;
pub mod limits;
pub mod process;
pub mod syscall;
pub mod time;
pub mod tty;
pub mod util;

/// Current kernel version.
pub const KERNEL_VERSION: &str = "1.0";
