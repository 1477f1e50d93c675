//! This module implements the process-control side of the terminal.
//!
//! Rendering and input are handled elsewhere; the substrate only tracks the
//! foreground process group and the window size, which the session and
//! `ioctl` syscalls manipulate.

use crate::process::pid::Pid;
use crate::util::lock::Mutex;
use bytemuck::Pod;
use bytemuck::Zeroable;

/// The size of a terminal window.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct WinSize {
	/// The number of rows.
	pub ws_row: u16,
	/// The number of columns.
	pub ws_col: u16,
	/// The width in pixels.
	pub ws_xpixel: u16,
	/// The height in pixels.
	pub ws_ypixel: u16,
}

/// The process-control state of a terminal.
pub struct Tty {
	/// The foreground process group.
	fg_pgrp: Mutex<Pid>,
	/// The window size.
	winsize: Mutex<WinSize>,
}

impl Tty {
	/// Creates a new terminal state with the given initial foreground group.
	pub fn new(fg_pgrp: Pid) -> Self {
		Self {
			fg_pgrp: Mutex::new(fg_pgrp),
			winsize: Mutex::new(WinSize {
				ws_row: 25,
				ws_col: 80,
				ws_xpixel: 0,
				ws_ypixel: 0,
			}),
		}
	}

	/// Returns the foreground process group.
	pub fn get_fg_pgrp(&self) -> Pid {
		*self.fg_pgrp.lock()
	}

	/// Sets the foreground process group.
	pub fn set_fg_pgrp(&self, pgrp: Pid) {
		*self.fg_pgrp.lock() = pgrp;
	}

	/// Returns the window size.
	pub fn get_winsize(&self) -> WinSize {
		*self.winsize.lock()
	}

	/// Sets the window size.
	pub fn set_winsize(&self, winsize: WinSize) {
		*self.winsize.lock() = winsize;
	}
}
