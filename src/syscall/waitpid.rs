//! The `waitpid` syscall waits for a state change of one of the caller's
//! children.

use crate::errno;
use crate::errno::EResult;
use crate::process::pid::Pid;
use crate::process::signal::SIGCONT;
use crate::process::Process;
use crate::process::State;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// `waitpid` option: do not block if no child has changed state.
pub const WNOHANG: i32 = 1;
/// `waitpid` option: also report stopped children.
pub const WUNTRACED: i32 = 2;
/// `waitpid` option: also report continued children.
pub const WCONTINUED: i32 = 4;

/// A reportable state change of one child.
struct WaitResult {
	/// The child's PID.
	pid: Pid,
	/// The encoded wait status.
	status: i32,
	/// Tells whether the child is a zombie to reap.
	reap: bool,
}

/// Returns the caller's children matching the `pid` filter.
fn candidates(proc: &Arc<Mutex<Process>>, pid: i32) -> Vec<Arc<Mutex<Process>>> {
	let (children, caller_pgid) = {
		let proc = proc.lock();
		(proc.get_children().to_vec(), proc.get_pgid())
	};

	children
		.into_iter()
		.filter_map(Process::get_by_pid)
		.filter(|child| {
			let child = child.lock();
			if pid > 0 {
				child.get_pid() == pid as Pid
			} else if pid == 0 {
				child.get_pgid() == caller_pgid
			} else if pid == -1 {
				true
			} else {
				child.get_pgid() == -pid as Pid
			}
		})
		.collect()
}

/// Scans the candidates for a reportable state change.
fn scan(list: &[Arc<Mutex<Process>>], options: i32) -> Option<WaitResult> {
	for child in list {
		let mut child = child.lock();

		if child.get_state() == State::Zombie {
			return Some(WaitResult {
				pid: child.get_pid(),
				status: (((child.get_exit_status() & 0xff) as i32) << 8)
					| (child.get_termsig() as i32),
				reap: true,
			});
		}

		if let Some(sig) = child.waitable_signal() {
			if sig as i32 == SIGCONT {
				if options & WCONTINUED != 0 {
					child.clear_waitable();
					return Some(WaitResult {
						pid: child.get_pid(),
						status: 0xffff,
						reap: false,
					});
				}
			} else if options & WUNTRACED != 0 {
				child.clear_waitable();
				return Some(WaitResult {
					pid: child.get_pid(),
					status: 0x7f | ((sig as i32) << 8),
					reap: false,
				});
			}
		}
	}
	None
}

/// The implementation of the `waitpid` syscall.
///
/// The syscall returns the PID of the child whose state change is reported,
/// or zero with `WNOHANG` when no child is reportable.
pub fn waitpid(
	proc: &Arc<Mutex<Process>>,
	pid: i32,
	wstatus: usize,
	options: i32,
) -> EResult<usize> {
	// A per-call semaphore is subscribed to every candidate through the
	// parent record; any child state change posts it. Spurious wakeups only
	// cause a rescan.
	let event = proc.lock().child_event.clone();

	loop {
		let list = candidates(proc, pid);
		if list.is_empty() {
			return Err(errno!(ECHILD));
		}

		if let Some(res) = scan(&list, options) {
			if wstatus != 0 {
				util::write_user_obj(proc, wstatus, &res.status)?;
			}
			if res.reap {
				let mut parent = proc.lock();
				parent.remove_child(res.pid);
				drop(parent);
				Process::reap(res.pid);
			}
			return Ok(res.pid as usize);
		}

		if options & WNOHANG != 0 {
			return Ok(0);
		}

		// Block until a child changes state; a signal interrupts the wait
		let interrupted = {
			let proc = proc.lock();
			proc.threads.get(&proc.main_tid).cloned()
		};
		match &interrupted {
			Some(thread) => {
				event.wait(Some(thread.interrupted_flag()))?;
			}
			None => {
				event.wait(None)?;
			}
		}
	}
}
