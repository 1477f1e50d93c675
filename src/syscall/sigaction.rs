//! The `sigaction` syscall installs a signal handler and returns the
//! previous one.

use crate::errno::EResult;
use crate::process::signal::SigAction;
use crate::process::signal::Signal;
use crate::process::signal::SignalHandler;
use crate::process::signal::SIG_DFL;
use crate::process::signal::SIG_IGN;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;

/// The `sigaction` record exchanged with userspace.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UserSigAction {
	/// The userspace address of the handler, or `SIG_IGN`/`SIG_DFL`.
	pub sa_handler: u32,
	/// The mask of signals to block while the handler runs.
	pub sa_mask: u32,
	/// Flags modifying the behaviour of the signal.
	pub sa_flags: i32,
}

/// Converts an installed handler back to its userspace representation.
fn to_user(handler: SignalHandler) -> UserSigAction {
	match handler {
		SignalHandler::Ignore => UserSigAction {
			sa_handler: SIG_IGN,
			..Default::default()
		},
		SignalHandler::Default => UserSigAction {
			sa_handler: SIG_DFL,
			..Default::default()
		},
		SignalHandler::Handler(action) => UserSigAction {
			sa_handler: action.sa_handler,
			sa_mask: action.sa_mask,
			sa_flags: action.sa_flags,
		},
	}
}

/// The implementation of the `sigaction` syscall.
///
/// `act` and `oldact` are userspace pointers to [`UserSigAction`] records;
/// either may be null.
pub fn sigaction(proc: &Arc<Mutex<Process>>, signum: i32, act: usize, oldact: usize) -> EResult<usize> {
	let sig = Signal::new(signum)?;

	let old = {
		let proc = proc.lock();
		proc.get_signal_handler(&sig)
	};

	if act != 0 {
		let action: UserSigAction = util::read_user_obj(proc, act)?;
		let handler = SignalHandler::from_action(SigAction {
			sa_handler: action.sa_handler,
			sa_mask: action.sa_mask,
			sa_flags: action.sa_flags,
		});

		proc.lock().set_signal_handler(&sig, handler)?;
	}

	if oldact != 0 {
		util::write_user_obj(proc, oldact, &to_user(old))?;
	}
	Ok(0)
}
