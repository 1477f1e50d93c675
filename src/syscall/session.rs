//! The session and process group syscalls: `setsid`, `setpgid`, `getpgrp`,
//! `tcgetpgrp` and `tcsetpgrp`.

use crate::errno;
use crate::errno::EResult;
use crate::process::pid::Pid;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `setsid` syscall.
///
/// The caller becomes the leader of a new session; a process that is already
/// a group leader may not call it.
pub fn setsid(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	let sid = proc.lock().setsid()?;
	Ok(sid as usize)
}

/// The implementation of the `setpgid` syscall.
///
/// `pid` zero designates the caller; `pgid` zero means a group of its own.
pub fn setpgid(proc: &Arc<Mutex<Process>>, pid: i32, pgid: i32) -> EResult<usize> {
	if pid < 0 || pgid < 0 {
		return Err(errno!(EINVAL));
	}

	let caller_pid = proc.lock().get_pid();
	let target_pid = if pid == 0 {
		caller_pid
	} else {
		pid as Pid
	};

	if target_pid == caller_pid {
		proc.lock().set_pgid(pgid as Pid)?;
		return Ok(0);
	}

	// Only the caller itself or one of its children may be moved
	if !proc.lock().get_children().contains(&target_pid) {
		return Err(errno!(ESRCH));
	}
	let target = Process::get_by_pid(target_pid).ok_or_else(|| errno!(ESRCH))?;
	target.lock().set_pgid(pgid as Pid)?;
	Ok(0)
}

/// The implementation of the `getpgrp` syscall.
pub fn getpgrp(proc: &Arc<Mutex<Process>>) -> EResult<usize> {
	Ok(proc.lock().get_pgid() as usize)
}

/// The implementation of the `tcgetpgrp` syscall.
///
/// The descriptor must refer to the caller's controlling terminal.
pub fn tcgetpgrp(proc: &Arc<Mutex<Process>>, fd: u32) -> EResult<usize> {
	// The descriptor must at least be valid
	util::get_open_file(proc, fd)?;

	let tty = proc.lock().tty.clone().ok_or_else(|| errno!(ENOTTY))?;
	Ok(tty.get_fg_pgrp() as usize)
}

/// The implementation of the `tcsetpgrp` syscall.
pub fn tcsetpgrp(proc: &Arc<Mutex<Process>>, fd: u32, pgrp: i32) -> EResult<usize> {
	if pgrp <= 0 {
		return Err(errno!(EINVAL));
	}
	util::get_open_file(proc, fd)?;

	let tty = proc.lock().tty.clone().ok_or_else(|| errno!(ENOTTY))?;
	tty.set_fg_pgrp(pgrp as Pid);
	Ok(0)
}
