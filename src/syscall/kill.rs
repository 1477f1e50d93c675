//! The `kill` syscall sends a signal to one or several processes.

use crate::errno;
use crate::errno::EResult;
use crate::process::signal;
use crate::process::signal::Signal;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `kill` syscall.
///
/// The targets are designated by `pid`:
/// - `pid > 0`: the process with that PID;
/// - `pid == 0`: every process in the caller's group;
/// - `pid == -1`: every child of the caller;
/// - `pid < -1`: every process in the group `-pid`.
pub fn kill(proc: &Arc<Mutex<Process>>, pid: i32, signum: i32) -> EResult<usize> {
	// Zero probes for the existence of the targets without sending anything
	if signum == 0 {
		if pid > 0 && Process::get_by_pid(pid as u32).is_none() {
			return Err(errno!(ESRCH));
		}
		return Ok(0);
	}

	let sig = Signal::new(signum)?;
	signal::kill(proc, pid, sig)?;
	Ok(0)
}
