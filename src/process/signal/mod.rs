//! This module implements process signals.
//!
//! A signal raised on a process is recorded as pending; on the next return
//! to user mode, the kernel either performs the signal's default action or
//! switches the user stack and jumps to a trampoline page which invokes the
//! user handler. The handler returns through a dedicated syscall restoring
//! the saved state.

pub mod trampoline;

use crate::errno;
use crate::errno::EResult;
use crate::limits::MINSIGSTKSZ;
use crate::limits::NSIG;
use crate::process::pid::Pid;
use crate::process::Process;
use crate::process::SavedSigContext;
use crate::process::State;
use crate::time;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Type representing the type of a signal.
pub type SignalType = i32;
/// Type representing a signal mask.
pub type SigSet = u32;

/// Hangup.
pub const SIGHUP: SignalType = 1;
/// Terminal interrupt.
pub const SIGINT: SignalType = 2;
/// Terminal quit.
pub const SIGQUIT: SignalType = 3;
/// Illegal instruction.
pub const SIGILL: SignalType = 4;
/// Trace/breakpoint trap.
pub const SIGTRAP: SignalType = 5;
/// Process abort.
pub const SIGABRT: SignalType = 6;
/// Emulator trap.
pub const SIGEMT: SignalType = 7;
/// Erroneous arithmetic operation.
pub const SIGFPE: SignalType = 8;
/// Kill.
pub const SIGKILL: SignalType = 9;
/// Access to an undefined portion of a memory object.
pub const SIGBUS: SignalType = 10;
/// Invalid memory reference.
pub const SIGSEGV: SignalType = 11;
/// Bad system call.
pub const SIGSYS: SignalType = 12;
/// Write on a pipe with no one to read it.
pub const SIGPIPE: SignalType = 13;
/// Alarm clock.
pub const SIGALRM: SignalType = 14;
/// Termination.
pub const SIGTERM: SignalType = 15;
/// High bandwidth data is available at a socket.
pub const SIGURG: SignalType = 16;
/// Stop executing.
pub const SIGSTOP: SignalType = 17;
/// Terminal stop.
pub const SIGTSTP: SignalType = 18;
/// Continue executing.
pub const SIGCONT: SignalType = 19;
/// Child process terminated.
pub const SIGCHLD: SignalType = 20;
/// Background process attempting read.
pub const SIGTTIN: SignalType = 21;
/// Background process attempting write.
pub const SIGTTOU: SignalType = 22;
/// Pollable event.
pub const SIGPOLL: SignalType = 23;
/// CPU time limit exceeded.
pub const SIGXCPU: SignalType = 24;
/// File size limit exceeded.
pub const SIGXFSZ: SignalType = 25;
/// Virtual timer expired.
pub const SIGVTALRM: SignalType = 26;
/// Profiling timer expired.
pub const SIGPROF: SignalType = 27;
/// Window resize.
pub const SIGWINCH: SignalType = 28;
/// User-defined signal 1.
pub const SIGUSR1: SignalType = 30;
/// User-defined signal 2.
pub const SIGUSR2: SignalType = 31;

/// Ignoring the signal.
pub const SIG_IGN: u32 = 0x0;
/// The default action for the signal.
pub const SIG_DFL: u32 = 0x1;

/// The size of the redzone in userspace, in bytes.
pub const REDZONE_SIZE: u32 = 128;

/// `sigaltstack` flag: the stack is disabled.
pub const SS_DISABLE: i32 = 0x2;
/// `sigaltstack` flag: the stack is in use.
pub const SS_ONSTACK: i32 = 0x1;

/// An action to perform for a signal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalAction {
	/// Abnormal termination of the process.
	Terminate,
	/// Abnormal termination with a diagnostic line.
	Abort,
	/// Ignore the signal.
	Ignore,
	/// Stop the process.
	Stop,
	/// Continue the process, if it is stopped.
	Continue,
}

/// An action installed with `sigaction`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SigAction {
	/// The userspace address of the handler.
	pub sa_handler: u32,
	/// The mask of signals to block while the handler runs.
	pub sa_mask: SigSet,
	/// Flags modifying the behaviour of the signal.
	pub sa_flags: i32,
}

/// The handling of one signal: the three-valued type tag of the handler
/// table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalHandler {
	/// Ignores the signal.
	Ignore,
	/// Executes the default action.
	Default,
	/// A user-installed handler.
	Handler(SigAction),
}

impl SignalHandler {
	/// Creates a handler from the raw `sa_handler` field of a `sigaction`
	/// call.
	pub fn from_action(action: SigAction) -> Self {
		match action.sa_handler {
			SIG_IGN => Self::Ignore,
			SIG_DFL => Self::Default,
			_ => Self::Handler(action),
		}
	}
}

/// A process's alternate signal stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct AltStack {
	/// The base address of the stack.
	pub base: u32,
	/// The size of the stack in bytes.
	pub size: u32,
	/// Tells whether the stack is enabled.
	pub enabled: bool,
	/// Tells whether a handler is currently running on the stack.
	pub in_use: bool,
}

impl AltStack {
	/// Installs a new alternate stack.
	///
	/// The stack cannot be replaced while a handler runs on it, and its size
	/// must be at least `MINSIGSTKSZ`.
	pub fn install(&mut self, base: u32, size: u32, enabled: bool) -> EResult<()> {
		if self.in_use {
			return Err(errno!(EPERM));
		}
		if enabled && (size as usize) < MINSIGSTKSZ {
			return Err(errno!(ENOMEM));
		}

		self.base = base;
		self.size = size;
		self.enabled = enabled;
		Ok(())
	}
}

/// Array containing the default action for each signal.
static DEFAULT_ACTIONS: [SignalAction; NSIG] = [
	SignalAction::Ignore,    // No signal
	SignalAction::Terminate, // SIGHUP
	SignalAction::Terminate, // SIGINT
	SignalAction::Terminate, // SIGQUIT
	SignalAction::Abort,     // SIGILL
	SignalAction::Terminate, // SIGTRAP
	SignalAction::Abort,     // SIGABRT
	SignalAction::Terminate, // SIGEMT
	SignalAction::Terminate, // SIGFPE
	SignalAction::Terminate, // SIGKILL
	SignalAction::Abort,     // SIGBUS
	SignalAction::Abort,     // SIGSEGV
	SignalAction::Terminate, // SIGSYS
	SignalAction::Terminate, // SIGPIPE
	SignalAction::Terminate, // SIGALRM
	SignalAction::Terminate, // SIGTERM
	SignalAction::Ignore,    // SIGURG
	SignalAction::Stop,      // SIGSTOP
	SignalAction::Stop,      // SIGTSTP
	SignalAction::Continue,  // SIGCONT
	SignalAction::Ignore,    // SIGCHLD
	SignalAction::Stop,      // SIGTTIN
	SignalAction::Stop,      // SIGTTOU
	SignalAction::Terminate, // SIGPOLL
	SignalAction::Abort,     // SIGXCPU
	SignalAction::Abort,     // SIGXFSZ
	SignalAction::Terminate, // SIGVTALRM
	SignalAction::Terminate, // SIGPROF
	SignalAction::Ignore,    // SIGWINCH
	SignalAction::Ignore,    // unused
	SignalAction::Terminate, // SIGUSR1
	SignalAction::Terminate, // SIGUSR2
];

/// A process signal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signal {
	/// The signal type.
	type_: SignalType,
}

impl Signal {
	/// Creates a new instance.
	///
	/// `type_` is the signal type; an invalid one makes the function fail
	/// with `EINVAL`.
	pub fn new(type_: SignalType) -> EResult<Self> {
		if (1..NSIG as SignalType).contains(&type_) {
			Ok(Self {
				type_,
			})
		} else {
			Err(errno!(EINVAL))
		}
	}

	/// Returns the signal's type.
	pub fn get_type(&self) -> SignalType {
		self.type_
	}

	/// Returns the default action for the signal.
	pub fn get_default_action(&self) -> SignalAction {
		DEFAULT_ACTIONS[self.type_ as usize % NSIG]
	}

	/// Tells whether the signal can be caught or ignored.
	pub fn can_catch(&self) -> bool {
		self.type_ != SIGKILL && self.type_ != SIGSTOP
	}

	/// Executes the action associated with the signal for the process
	/// `proc`.
	///
	/// If `no_handler` is `true`, the default action is executed regardless
	/// of the installed handler.
	pub fn execute_action(&self, proc: &mut Process, no_handler: bool) {
		proc.sigpending &= !(1 << self.type_);

		if proc.get_state() == State::Zombie {
			return;
		}

		let handler = if !self.can_catch() || no_handler {
			SignalHandler::Default
		} else {
			proc.sig_handlers.read()[self.type_ as usize % NSIG]
		};

		match handler {
			SignalHandler::Ignore => {}
			SignalHandler::Default => match self.get_default_action() {
				SignalAction::Ignore => {}
				SignalAction::Terminate => {
					proc.exit(self.type_ as u32, true);
				}
				SignalAction::Abort => {
					// Diagnostic on the controlling terminal
					log!(
						"process {}: killed by signal {} ({})",
						proc.get_pid(),
						self.type_,
						self.name()
					);
					proc.exit(self.type_ as u32, true);
				}
				SignalAction::Stop => {
					if proc.get_state() == State::Running {
						proc.set_state(State::Stopped);
					}
					proc.set_waitable(self.type_ as u8);
				}
				SignalAction::Continue => {
					if proc.get_state() == State::Stopped {
						proc.set_state(State::Running);
					}
					proc.set_waitable(self.type_ as u8);
				}
			},
			SignalHandler::Handler(action) => {
				if proc.saved_sig.is_some() {
					// A handler is already running: leave the signal pending
					proc.sigpending |= 1 << self.type_;
					return;
				}

				trampoline::ensure_mapped(proc);

				// Save the state to be restored by sigreturn
				proc.saved_sig = Some(SavedSigContext {
					regs: proc.regs,
					mask: proc.sigmask,
					sig: self.type_ as u8,
				});
				proc.sigmask |= action.sa_mask | (1 << self.type_);

				// Pick the stack the handler runs on
				let stack_top = if proc.altstack.enabled && !proc.altstack.in_use {
					proc.altstack.in_use = true;
					proc.altstack.base + proc.altstack.size
				} else {
					proc.regs.esp.wrapping_sub(REDZONE_SIZE)
				};

				// One word holding the signal number
				let esp = stack_top.wrapping_sub(4);
				{
					let mut mem_space = proc.mem_space.lock();
					let _ = mem_space.copy_to(esp as usize, &(self.type_ as u32).to_ne_bytes());
				}

				proc.regs.esp = esp;
				proc.regs.eip = trampoline::EVENT_HANDLER_TRAMPOLINE;
				// The trampoline stub finds the handler's address in eax
				proc.regs.eax = action.sa_handler;
				proc.regs.ebx = self.type_ as u32;
			}
		}
	}

	/// Returns the name of the signal.
	pub fn name(&self) -> &'static str {
		match self.type_ {
			SIGHUP => "SIGHUP",
			SIGINT => "SIGINT",
			SIGQUIT => "SIGQUIT",
			SIGILL => "SIGILL",
			SIGTRAP => "SIGTRAP",
			SIGABRT => "SIGABRT",
			SIGEMT => "SIGEMT",
			SIGFPE => "SIGFPE",
			SIGKILL => "SIGKILL",
			SIGBUS => "SIGBUS",
			SIGSEGV => "SIGSEGV",
			SIGSYS => "SIGSYS",
			SIGPIPE => "SIGPIPE",
			SIGALRM => "SIGALRM",
			SIGTERM => "SIGTERM",
			SIGURG => "SIGURG",
			SIGSTOP => "SIGSTOP",
			SIGTSTP => "SIGTSTP",
			SIGCONT => "SIGCONT",
			SIGCHLD => "SIGCHLD",
			SIGTTIN => "SIGTTIN",
			SIGTTOU => "SIGTTOU",
			SIGPOLL => "SIGPOLL",
			SIGXCPU => "SIGXCPU",
			SIGXFSZ => "SIGXFSZ",
			SIGVTALRM => "SIGVTALRM",
			SIGPROF => "SIGPROF",
			SIGWINCH => "SIGWINCH",
			SIGUSR1 => "SIGUSR1",
			SIGUSR2 => "SIGUSR2",
			_ => "?",
		}
	}
}

impl Process {
	/// Returns the handler installed for the given signal.
	pub fn get_signal_handler(&self, sig: &Signal) -> SignalHandler {
		self.sig_handlers.read()[sig.get_type() as usize % NSIG]
	}

	/// Installs a handler for the given signal and returns the previous one.
	///
	/// `SIGKILL` and `SIGSTOP` may not be reassigned.
	pub fn set_signal_handler(
		&mut self,
		sig: &Signal,
		handler: SignalHandler,
	) -> EResult<SignalHandler> {
		if !sig.can_catch() {
			return Err(errno!(EINVAL));
		}

		let mut handlers = self.sig_handlers.write();
		let old = handlers[sig.get_type() as usize % NSIG];
		handlers[sig.get_type() as usize % NSIG] = handler;
		Ok(old)
	}

	/// Tells whether the given signal is blocked by the process's mask.
	pub fn is_signal_blocked(&self, sig: &Signal) -> bool {
		self.sigmask & (1 << sig.get_type()) != 0
	}

	/// Marks the given signal pending on the process.
	pub fn raise_signal(&mut self, sig: &Signal) {
		self.sigpending |= 1 << sig.get_type();

		// Waking threads blocked in interruptible waits
		for thread in self.threads.values() {
			thread.interrupt();
		}
	}

	/// Tells whether the process has a deliverable pending signal.
	pub fn has_signal_pending(&self) -> bool {
		self.sigpending & !self.sigmask != 0
	}

	/// Returns the next deliverable pending signal, lowest number first.
	pub fn next_pending_signal(&self) -> Option<Signal> {
		let deliverable = self.sigpending & !self.sigmask;
		if deliverable == 0 {
			return None;
		}
		Signal::new(deliverable.trailing_zeros() as SignalType).ok()
	}

	/// Delivers every deliverable pending signal.
	///
	/// This is the check performed on each return to user mode.
	pub fn deliver_pending_signals(&mut self) {
		while let Some(sig) = self.next_pending_signal() {
			sig.execute_action(self, false);
			if self.get_state() == State::Zombie || self.saved_sig.is_some() {
				break;
			}
		}
	}

	/// Returns from a signal handler, restoring the saved context.
	///
	/// If no handler is running, the function fails with `EINVAL`.
	pub fn signal_restore(&mut self) -> EResult<()> {
		let saved = self.saved_sig.take().ok_or_else(|| errno!(EINVAL))?;
		self.regs = saved.regs;
		self.sigmask = saved.mask;
		self.altstack.in_use = false;
		Ok(())
	}

	/// Arms the alarm timer to raise `SIGALRM` in `seconds` seconds and
	/// returns the seconds remaining on the previously armed timer.
	///
	/// Zero disarms the timer.
	pub fn alarm(&mut self, seconds: u32) -> u32 {
		let now = time::get() as u64;
		let remaining = match self.alarm_deadline {
			Some(deadline) if deadline > now => (deadline - now) as u32,
			_ => 0,
		};

		self.alarm_deadline = if seconds > 0 {
			Some(now + seconds as u64)
		} else {
			None
		};
		remaining
	}

	/// Raises `SIGALRM` if the alarm timer has expired.
	pub fn check_alarm(&mut self) {
		let now = time::get() as u64;
		if let Some(deadline) = self.alarm_deadline {
			if now >= deadline {
				self.alarm_deadline = None;
				if let Ok(sig) = Signal::new(SIGALRM) {
					self.raise_signal(&sig);
				}
			}
		}
	}
}

/// Sends the signal `sig` to the targets designated by `pid`, POSIX `kill`
/// style:
/// - `pid > 0`: the process with that PID;
/// - `pid == 0`: every process in the caller's group;
/// - `pid == -1`: every child of the caller;
/// - `pid < -1`: every process in the group `-pid`.
///
/// If the caller is among the targets, the signal is dispatched to it
/// synchronously before the function returns.
pub fn kill(caller: &Arc<Mutex<Process>>, pid: i32, sig: Signal) -> EResult<()> {
	let (caller_pid, caller_pgid, children) = {
		let caller = caller.lock();
		(
			caller.get_pid(),
			caller.get_pgid(),
			caller.get_children().to_vec(),
		)
	};

	// Collect target PIDs
	let targets: Vec<Pid> = if pid > 0 {
		alloc::vec![pid as Pid]
	} else if pid == 0 {
		group_members(caller_pgid)
	} else if pid == -1 {
		children
	} else {
		group_members(-pid as Pid)
	};

	if targets.is_empty() {
		return Err(errno!(ESRCH));
	}

	let mut caller_is_target = false;
	for target_pid in targets {
		if target_pid == caller_pid {
			caller_is_target = true;
			continue;
		}
		let Some(target) = Process::get_by_pid(target_pid) else {
			if pid > 0 {
				return Err(errno!(ESRCH));
			}
			continue;
		};
		target.lock().raise_signal(&sig);
	}

	if caller_is_target {
		// Dispatch synchronously on the caller's own stack
		let mut caller = caller.lock();
		caller.raise_signal(&sig);
		caller.deliver_pending_signals();
	}
	Ok(())
}

/// Returns the PIDs of every process in the group `pgid`.
fn group_members(pgid: Pid) -> Vec<Pid> {
	Process::list()
		.into_iter()
		.filter_map(|proc| {
			let proc = proc.lock();
			(proc.get_pgid() == pgid).then(|| proc.get_pid())
		})
		.collect()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fs::ext2;

	fn test_proc() -> Arc<Mutex<Process>> {
		let dev = Arc::new(RamDisk::new(512 * 1024));
		let fs = ext2::format(dev, &Default::default()).unwrap();
		Process::new(fs).unwrap()
	}

	#[test]
	fn sigaction_kill_rejected() {
		let proc = test_proc();
		let mut proc = proc.lock();

		let res = proc.set_signal_handler(
			&Signal::new(SIGKILL).unwrap(),
			SignalHandler::Ignore,
		);
		assert_eq!(res.unwrap_err().as_int(), errno::EINVAL);

		let pid = proc.get_pid();
		drop(proc);
		Process::reap(pid);
	}

	#[test]
	fn handler_entry_on_altstack() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();

			// Map a stack and enable it as the alternate signal stack
			let base = {
				let mut mem = proc.mem_space.lock();
				mem.map(
					None,
					crate::limits::SIGSTKSZ,
					crate::process::mem_space::PROT_READ | crate::process::mem_space::PROT_WRITE,
					None,
				)
				.unwrap()
			};
			proc.altstack
				.install(base as u32, crate::limits::SIGSTKSZ as u32, true)
				.unwrap();

			let sig = Signal::new(SIGUSR1).unwrap();
			proc.set_signal_handler(
				&sig,
				SignalHandler::Handler(SigAction {
					sa_handler: 0x1234,
					sa_mask: 0,
					sa_flags: 0,
				}),
			)
			.unwrap();

			proc.raise_signal(&sig);
			proc.deliver_pending_signals();

			// Handler entry: stack switched to the alternate stack's top
			// minus one word, trampoline as instruction pointer
			let top = base as u32 + crate::limits::SIGSTKSZ as u32;
			assert_eq!(proc.regs.esp, top - 4);
			assert_eq!(proc.regs.eip, trampoline::EVENT_HANDLER_TRAMPOLINE);
			assert_eq!(proc.regs.eax, 0x1234);
			assert!(proc.altstack.in_use);

			// The return path clears the in-use flag and restores the state
			proc.signal_restore().unwrap();
			assert!(!proc.altstack.in_use);
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}

	#[test]
	fn default_terminate() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();
			let sig = Signal::new(SIGTERM).unwrap();
			proc.raise_signal(&sig);
			proc.deliver_pending_signals();

			assert_eq!(proc.get_state(), State::Zombie);
			assert_eq!(proc.get_termsig(), SIGTERM as u8);
			assert_eq!(proc.get_exit_status(), 128 + SIGTERM as u32);
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}

	#[test]
	fn blocked_signal_stays_pending() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();
			let sig = Signal::new(SIGUSR2).unwrap();
			proc.sigmask = 1 << SIGUSR2;
			proc.raise_signal(&sig);
			proc.deliver_pending_signals();

			// Still pending, not delivered
			assert_eq!(proc.get_state(), State::Running);
			assert!(proc.sigpending & (1 << SIGUSR2) != 0);
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}
}
