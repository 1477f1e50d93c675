//! This module implements processes and their resources: file descriptors,
//! signals, threads and address space.
//!
//! Scheduling itself is the surrounding kernel's concern; the substrate
//! tracks the states and resources the POSIX syscall surface manipulates.

pub mod exec;
pub mod mem_space;
pub mod pid;
pub mod pthread;
pub mod regs;
pub mod semaphore;
pub mod signal;

use crate::errno;
use crate::errno::EResult;
use crate::file::fd::FileDescriptorTable;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::fs::ext2::Ext2Node;
use crate::file::Gid;
use crate::file::Mode;
use crate::file::Uid;
use crate::limits::NSIG;
use crate::tty::Tty;
use crate::util::lock::Mutex;
use crate::util::lock::RwLock;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use mem_space::MemSpace;
use pid::Pid;
use pthread::Thread;
use pthread::Tid;
use pthread::Waiter;
use regs::Regs;
use semaphore::Semaphore;
use signal::AltStack;
use signal::SigSet;
use signal::Signal;
use signal::SignalHandler;

/// The state of a process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
	/// The process is running or waiting to run.
	Running,
	/// The process is sleeping, waiting for a resource.
	Sleeping,
	/// The process has been stopped by a signal.
	Stopped,
	/// The process has terminated and waits to be reaped.
	Zombie,
}

/// The position of a process within its group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupRole {
	/// The process leads its group.
	Leader,
	/// The process is a member of a group led by another process.
	Member,
	/// The process is in no group.
	NoGroup,
}

/// The register context saved when a signal handler is entered, restored by
/// the return-from-signal syscall.
#[derive(Clone, Copy)]
pub struct SavedSigContext {
	/// The saved register state.
	pub regs: Regs,
	/// The saved signal mask.
	pub mask: SigSet,
	/// The signal being handled.
	pub sig: u8,
}

/// The table of every process on the system.
static PROCESSES: RwLock<Option<HashMap<Pid, Arc<Mutex<Process>>>>> = RwLock::new(None);

/// A process.
pub struct Process {
	/// The process's ID.
	pid: Pid,
	/// The parent process's ID.
	parent: Option<Pid>,
	/// The PIDs of the process's children.
	children: Vec<Pid>,
	/// The ID of the process's group.
	pgid: Pid,
	/// The ID of the process's session.
	sid: Pid,

	/// The process's state.
	state: State,
	/// The process's exit status, valid once zombie.
	exit_status: u32,
	/// The signal that terminated the process, if any.
	term_sig: u8,
	/// The signal which made the process waitable, if any.
	waitable: Option<u8>,

	/// The process's real user ID.
	pub uid: Uid,
	/// The process's real group ID.
	pub gid: Gid,
	/// The process's effective user ID.
	pub euid: Uid,
	/// The process's effective group ID.
	pub egid: Gid,
	/// The process's file creation mask.
	pub umask: Mode,

	/// The mounted filesystem the process lives on.
	pub fs: Arc<Ext2Fs>,
	/// The process's current working directory.
	pub cwd: Arc<Ext2Node>,
	/// The textual path of the current working directory.
	pub cwd_path: Vec<u8>,
	/// The process's file descriptor table.
	pub fds: Arc<RwLock<FileDescriptorTable>>,
	/// The process's address space.
	pub mem_space: Arc<Mutex<MemSpace>>,

	/// The process's signal handler table.
	pub sig_handlers: Arc<RwLock<[SignalHandler; NSIG]>>,
	/// The process's signal mask.
	pub sigmask: SigSet,
	/// The set of pending signals.
	pub sigpending: SigSet,
	/// The context saved on signal handler entry.
	pub saved_sig: Option<SavedSigContext>,
	/// The process's alternate signal stack.
	pub altstack: AltStack,
	/// Tells whether the trampoline pages have been installed.
	pub trampolines_mapped: bool,

	/// The process's register state (main thread).
	pub regs: Regs,

	/// The timestamp at which `SIGALRM` is to be raised, if armed.
	pub alarm_deadline: Option<u64>,

	/// The process's threads.
	pub threads: HashMap<Tid, Arc<Thread>>,
	/// The ID of the main thread.
	pub main_tid: Tid,
	/// The ID of the thread currently trapped in the kernel, maintained by
	/// the scheduler on context switches.
	pub current_tid: Tid,
	/// The next thread ID.
	next_tid: Tid,

	/// The process's waiter objects.
	pub waiters: HashMap<u32, Arc<Waiter>>,
	/// The next waiter ID.
	next_waiter: u32,

	/// Semaphore posted on every state change of a child, waking `waitpid`.
	pub child_event: Arc<Semaphore>,
	/// The process's controlling terminal.
	pub tty: Option<Arc<Tty>>,

	/// The process's error indicator, set by failing syscalls.
	pub errno: i32,
}

/// Returns the process table, initializing it on first use.
fn processes_init<R>(f: impl FnOnce(&mut HashMap<Pid, Arc<Mutex<Process>>>) -> R) -> R {
	let mut guard = PROCESSES.write();
	f(guard.get_or_insert_with(HashMap::new))
}

impl Process {
	/// Creates a new process with no parent, running on the given filesystem.
	///
	/// The process starts with an empty descriptor table, default signal
	/// handlers, and a single thread.
	pub fn new(fs: Arc<Ext2Fs>) -> EResult<Arc<Mutex<Self>>> {
		let pid = pid::alloc();
		let cwd = fs.get_root()?;

		let mut threads = HashMap::new();
		let main_tid: Tid = 1;
		threads.insert(main_tid, Arc::new(Thread::new(main_tid, 0, 0)));

		let proc = Self {
			pid,
			parent: None,
			children: Vec::new(),
			pgid: pid,
			sid: pid,

			state: State::Running,
			exit_status: 0,
			term_sig: 0,
			waitable: None,

			uid: 0,
			gid: 0,
			euid: 0,
			egid: 0,
			umask: 0o022,

			fs,
			cwd,
			cwd_path: b"/".to_vec(),
			fds: Arc::new(RwLock::new(FileDescriptorTable::default())),
			mem_space: Arc::new(Mutex::new(MemSpace::new())),

			sig_handlers: Arc::new(RwLock::new([SignalHandler::Default; NSIG])),
			sigmask: 0,
			sigpending: 0,
			saved_sig: None,
			altstack: AltStack::default(),
			trampolines_mapped: false,

			regs: Regs::default(),

			alarm_deadline: None,

			threads,
			main_tid,
			current_tid: main_tid,
			next_tid: main_tid + 1,

			waiters: HashMap::new(),
			next_waiter: 0,

			child_event: Arc::new(Semaphore::new(0)),
			tty: None,

			errno: 0,
		};

		let proc = Arc::new(Mutex::new(proc));
		processes_init(|procs| procs.insert(pid, proc.clone()));
		Ok(proc)
	}

	/// Returns the process with the given PID, if any.
	pub fn get_by_pid(pid: Pid) -> Option<Arc<Mutex<Self>>> {
		PROCESSES.read().as_ref()?.get(&pid).cloned()
	}

	/// Returns every process on the system.
	pub fn list() -> Vec<Arc<Mutex<Self>>> {
		PROCESSES
			.read()
			.as_ref()
			.map(|procs| procs.values().cloned().collect())
			.unwrap_or_default()
	}

	/// Returns the process's PID.
	pub fn get_pid(&self) -> Pid {
		self.pid
	}

	/// Returns the PID of the process's parent.
	pub fn get_parent_pid(&self) -> Option<Pid> {
		self.parent
	}

	/// Returns the PIDs of the process's children.
	pub fn get_children(&self) -> &[Pid] {
		&self.children
	}

	/// Returns the ID of the process's group.
	pub fn get_pgid(&self) -> Pid {
		self.pgid
	}

	/// Returns the ID of the process's session.
	pub fn get_sid(&self) -> Pid {
		self.sid
	}

	/// Returns the process's role within its group.
	pub fn get_group_role(&self) -> GroupRole {
		if self.pgid == self.pid {
			GroupRole::Leader
		} else if self.pgid != 0 {
			GroupRole::Member
		} else {
			GroupRole::NoGroup
		}
	}

	/// Sets the ID of the process's group.
	///
	/// A `pgid` of zero puts the process in a group of its own.
	pub fn set_pgid(&mut self, pgid: Pid) -> EResult<()> {
		let pgid = if pgid == 0 {
			self.pid
		} else {
			pgid
		};

		if pgid != self.pid {
			// The target group must exist within the same session
			let leader = Process::get_by_pid(pgid).ok_or_else(|| errno!(EPERM))?;
			let leader = leader.lock();
			if leader.sid != self.sid {
				return Err(errno!(EPERM));
			}
		}

		self.pgid = pgid;
		Ok(())
	}

	/// Makes the process the leader of a new session.
	///
	/// If the process is already a group leader, the function fails with
	/// `EPERM`.
	pub fn setsid(&mut self) -> EResult<Pid> {
		if self.get_group_role() == GroupRole::Leader {
			return Err(errno!(EPERM));
		}

		self.pgid = self.pid;
		self.sid = self.pid;
		self.tty = None;
		Ok(self.sid)
	}

	/// Returns the process's state.
	pub fn get_state(&self) -> State {
		self.state
	}

	/// Sets the process's state.
	pub fn set_state(&mut self, state: State) {
		self.state = state;
	}

	/// Returns the process's exit status, valid once zombie.
	pub fn get_exit_status(&self) -> u32 {
		self.exit_status
	}

	/// Returns the signal that terminated the process, or zero.
	pub fn get_termsig(&self) -> u8 {
		self.term_sig
	}

	/// Tells whether the process has a state change to report to `waitpid`.
	pub fn is_waitable(&self) -> bool {
		self.state == State::Zombie || self.waitable.is_some()
	}

	/// Marks the process as waitable for the given signal.
	pub fn set_waitable(&mut self, sig: u8) {
		self.waitable = Some(sig);
		self.wake_parent();
	}

	/// Returns the signal which made the process waitable, without clearing
	/// it.
	pub fn waitable_signal(&self) -> Option<u8> {
		self.waitable
	}

	/// Clears the process's waitable state.
	pub fn clear_waitable(&mut self) -> Option<u8> {
		self.waitable.take()
	}

	/// Posts the parent's child-event semaphore.
	fn wake_parent(&self) {
		let Some(parent_pid) = self.parent else {
			return;
		};
		let Some(parent) = Process::get_by_pid(parent_pid) else {
			return;
		};
		let sem = parent.lock().child_event.clone();
		sem.post();
	}

	/// Allocates a thread ID.
	pub fn alloc_tid(&mut self) -> Tid {
		let tid = self.next_tid;
		self.next_tid += 1;
		tid
	}

	/// Allocates a waiter ID.
	pub fn alloc_waiter_id(&mut self) -> u32 {
		let id = self.next_waiter;
		self.next_waiter += 1;
		id
	}

	/// Forks the process, returning the child.
	///
	/// The child gets a copy of the descriptor table (sharing the open file
	/// descriptions, hence the offsets), a copy of the signal handler table,
	/// a copy of the address space, and no pending signal.
	pub fn fork(parent: &Arc<Mutex<Self>>) -> EResult<Arc<Mutex<Self>>> {
		let child_pid = pid::alloc();

		let child = {
			let mut parent = parent.lock();

			let mut threads = HashMap::new();
			let main_tid: Tid = 1;
			threads.insert(main_tid, Arc::new(Thread::new(main_tid, 0, 0)));

			let mut regs = parent.regs;
			// fork returns zero in the child
			regs.eax = 0;

			let child = Self {
				pid: child_pid,
				parent: Some(parent.pid),
				children: Vec::new(),
				pgid: parent.pgid,
				sid: parent.sid,

				state: State::Running,
				exit_status: 0,
				term_sig: 0,
				waitable: None,

				uid: parent.uid,
				gid: parent.gid,
				euid: parent.euid,
				egid: parent.egid,
				umask: parent.umask,

				fs: parent.fs.clone(),
				cwd: parent.cwd.clone(),
				cwd_path: parent.cwd_path.clone(),
				fds: Arc::new(RwLock::new(parent.fds.read().clone())),
				mem_space: Arc::new(Mutex::new(parent.mem_space.lock().clone())),

				sig_handlers: Arc::new(RwLock::new(*parent.sig_handlers.read())),
				sigmask: parent.sigmask,
				sigpending: 0,
				saved_sig: None,
				altstack: parent.altstack,
				trampolines_mapped: parent.trampolines_mapped,

				regs,

				alarm_deadline: None,

				threads,
				main_tid,
				current_tid: main_tid,
				next_tid: main_tid + 1,

				waiters: HashMap::new(),
				next_waiter: 0,

				child_event: Arc::new(Semaphore::new(0)),
				tty: parent.tty.clone(),

				errno: 0,
			};

			parent.children.push(child_pid);
			child
		};

		let child = Arc::new(Mutex::new(child));
		processes_init(|procs| procs.insert(child_pid, child.clone()));
		Ok(child)
	}

	/// Exits the process with the given status.
	///
	/// `signaled` tells whether the exit is caused by a signal, in which case
	/// the status is the signal number.
	pub fn exit(&mut self, status: u32, signaled: bool) {
		if self.state == State::Zombie {
			return;
		}

		self.state = State::Zombie;
		if signaled {
			self.term_sig = status as u8;
			self.exit_status = 128 + status;
		} else {
			self.exit_status = status;
		}

		// Resources are released now; the PID and the zombie record stay
		// until the process is reaped
		*self.fds.write() = FileDescriptorTable::default();
		self.mem_space.lock().clear();
		self.waiters.clear();
		for thread in self.threads.values() {
			thread.exit(0);
		}

		// Reparent children to init
		let children = core::mem::take(&mut self.children);
		for child_pid in children {
			if let Some(child) = Process::get_by_pid(child_pid) {
				let mut child = child.lock();
				child.parent = Some(pid::INIT_PID);
			}
		}

		self.wake_parent();
		// Notify the parent with SIGCHLD
		if let Some(parent_pid) = self.parent {
			if let Some(parent) = Process::get_by_pid(parent_pid) {
				let mut parent = parent.lock();
				if let Ok(sig) = Signal::new(signal::SIGCHLD) {
					parent.sigpending |= 1 << sig.get_type();
				}
			}
		}
	}

	/// Removes the given PID from the process's child list.
	pub fn remove_child(&mut self, pid: Pid) {
		self.children.retain(|p| *p != pid);
	}

	/// Reaps the zombie process, removing it from the process table and
	/// releasing its PID.
	///
	/// The parent's child list is updated by the caller.
	pub fn reap(pid: Pid) {
		processes_init(|procs| procs.remove(&pid));
		pid::free(pid);
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fs::ext2;

	fn test_fs() -> Arc<Ext2Fs> {
		let dev = Arc::new(RamDisk::new(512 * 1024));
		ext2::format(dev, &Default::default()).unwrap()
	}

	#[test]
	fn process_group_roles() {
		let fs = test_fs();
		let proc = Process::new(fs).unwrap();
		{
			let p = proc.lock();
			assert_eq!(p.get_group_role(), GroupRole::Leader);
		}

		let child = Process::fork(&proc).unwrap();
		{
			let mut c = child.lock();
			assert_eq!(c.get_group_role(), GroupRole::Member);
			// A group leader may not create a new session
			assert!(c.setsid().is_ok());
			assert_eq!(c.setsid().unwrap_err().as_int(), errno::EPERM);
		}

		let (pid, child_pid) = (proc.lock().get_pid(), child.lock().get_pid());
		Process::reap(child_pid);
		Process::reap(pid);
	}

	#[test]
	fn fork_shares_open_files() {
		let fs = test_fs();
		let proc = Process::new(fs).unwrap();
		let child = Process::fork(&proc).unwrap();

		{
			let p = proc.lock();
			let c = child.lock();
			assert_eq!(c.get_parent_pid(), Some(p.get_pid()));
			assert!(p.get_children().contains(&c.get_pid()));
			// fork returns 0 in the child
			assert_eq!(c.regs.eax, 0);
		}

		let (pid, child_pid) = (proc.lock().get_pid(), child.lock().get_pid());
		Process::reap(child_pid);
		Process::reap(pid);
	}
}
