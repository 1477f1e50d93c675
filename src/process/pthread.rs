//! This module implements the kernel side of the pthread facility: thread
//! records, join/detach, thread-specific data keys and waiter objects.
//!
//! A thread is created with an entry trampoline: the kernel-side shim jumps
//! to the pthread entry stub, which invokes the user's start routine and
//! traps back through `pthread_exit`.

use crate::errno;
use crate::errno::EResult;
use crate::limits::PTHREAD_KEYS_MAX;
use crate::limits::PTHREAD_STACK_DEFAULT;
use crate::limits::PTHREAD_STACK_MIN;
use crate::process::mem_space::PROT_READ;
use crate::process::mem_space::PROT_WRITE;
use crate::process::regs::Regs;
use crate::process::semaphore::Semaphore;
use crate::process::signal::trampoline;
use crate::process::Process;
use crate::util::bitmap::Bitmap;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use hashbrown::HashMap;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::AtomicI32;
use core::sync::atomic::Ordering::Acquire;
use core::sync::atomic::Ordering::Release;

/// Type representing a thread ID.
pub type Tid = u32;

/// A thread-specific data slot: the value and the destructor registered when
/// the key was created.
///
/// The destructor is a userspace function address: it is handed back to
/// userspace on key deletion, to be invoked there.
#[derive(Clone, Copy, Debug)]
pub struct KeySlot {
	/// The userspace address of the destructor, zero for none.
	pub destructor: u32,
	/// The value associated with the key for this thread.
	pub value: usize,
}

/// The thread-specific data of one thread.
#[derive(Default)]
pub struct ThreadKeys {
	/// Bitmap of the allocated key indices.
	bitmap: Bitmap,
	/// The slots, by key index.
	slots: HashMap<usize, KeySlot>,
}

/// A thread of a process.
pub struct Thread {
	/// The thread's ID.
	tid: Tid,
	/// The base address of the thread's stack.
	stack_base: usize,
	/// The size of the thread's stack in bytes.
	stack_size: usize,

	/// Tells whether the thread is detached.
	detached: AtomicBool,
	/// Tells whether the thread has exited.
	exited: AtomicBool,
	/// Semaphore released on exit, on which `join` blocks.
	running: Semaphore,
	/// The thread's return value.
	retval: Mutex<usize>,

	/// The thread's register state.
	pub regs: Mutex<Regs>,
	/// The thread-specific data keys.
	pub keys: Mutex<ThreadKeys>,
	/// Set when a signal interrupts the thread's blocking operations.
	interrupted: AtomicBool,
	/// The thread's error indicator.
	pub errno: AtomicI32,
}

impl Thread {
	/// Creates a new thread record.
	pub fn new(tid: Tid, stack_base: usize, stack_size: usize) -> Self {
		Self {
			tid,
			stack_base,
			stack_size,

			detached: AtomicBool::new(false),
			exited: AtomicBool::new(false),
			running: Semaphore::new(0),
			retval: Mutex::new(0),

			regs: Mutex::new(Regs::default()),
			keys: Mutex::new(ThreadKeys::default()),
			interrupted: AtomicBool::new(false),
			errno: AtomicI32::new(0),
		}
	}

	/// Returns the thread's ID.
	pub fn get_tid(&self) -> Tid {
		self.tid
	}

	/// Tells whether the thread is detached.
	pub fn is_detached(&self) -> bool {
		self.detached.load(Acquire)
	}

	/// Marks the thread as detached.
	pub fn detach(&self) {
		self.detached.store(true, Release);
	}

	/// Tells whether the thread has exited.
	pub fn has_exited(&self) -> bool {
		self.exited.load(Acquire)
	}

	/// Exits the thread with the given return value, releasing every thread
	/// joined on it.
	pub fn exit(&self, retval: usize) {
		*self.retval.lock() = retval;
		self.exited.store(true, Release);
		self.running.post();
	}

	/// Blocks until the thread exits and returns its return value.
	pub fn join_wait(&self) -> EResult<usize> {
		self.running.wait(Some(&self.interrupted))?;
		// Keep the semaphore released for other joiners checking the record
		self.running.post();
		Ok(*self.retval.lock())
	}

	/// Marks the thread's blocking operations as interrupted.
	pub fn interrupt(&self) {
		self.interrupted.store(true, Release);
	}

	/// Clears the thread's interrupted flag.
	pub fn clear_interrupt(&self) {
		self.interrupted.store(false, Release);
	}

	/// Tells whether the thread has been interrupted.
	pub fn is_interrupted(&self) -> bool {
		self.interrupted.load(Acquire)
	}

	/// Returns the thread's interruption flag.
	pub fn interrupted_flag(&self) -> &AtomicBool {
		&self.interrupted
	}
}

impl ThreadKeys {
	/// Allocates a key index with the given destructor.
	///
	/// If every key is in use, the function fails with `EAGAIN`.
	pub fn key_create(&mut self, destructor: u32) -> EResult<usize> {
		let key = self.bitmap.find_first_clear();
		if key >= PTHREAD_KEYS_MAX {
			return Err(errno!(EAGAIN));
		}

		self.bitmap.set(key);
		self.slots.insert(
			key,
			KeySlot {
				destructor,
				value: 0,
			},
		);
		Ok(key)
	}

	/// Deletes the key `key` and releases its index.
	///
	/// The function returns the destructor and the current value, for the
	/// caller to invoke the destructor in userspace. The destructor is
	/// reported only when a value is set.
	pub fn key_delete(&mut self, key: usize) -> EResult<Option<(u32, usize)>> {
		if !self.bitmap.is_set(key) {
			return Err(errno!(EINVAL));
		}

		let slot = self.slots.remove(&key);
		self.bitmap.clear(key);
		Ok(slot.and_then(|s| {
			(s.destructor != 0 && s.value != 0).then_some((s.destructor, s.value))
		}))
	}

	/// Sets the calling thread's value for the key `key`.
	pub fn set_specific(&mut self, key: usize, value: usize) -> EResult<()> {
		let slot = self.slots.get_mut(&key).ok_or_else(|| errno!(EINVAL))?;
		slot.value = value;
		Ok(())
	}

	/// Returns the calling thread's value for the key `key`.
	///
	/// A deleted or unset key yields zero.
	pub fn get_specific(&self, key: usize) -> usize {
		self.slots.get(&key).map(|s| s.value).unwrap_or(0)
	}

	/// Tells whether the key index `key` is marked in the bitmap.
	pub fn is_allocated(&self, key: usize) -> bool {
		self.bitmap.is_set(key)
	}
}

/// A waiter object: an opaque handle wrapping a counting semaphore, used by
/// the userspace pthread primitives (mutexes, condition variables, rwlocks).
pub struct Waiter {
	/// The semaphore the waiter wraps.
	sem: Semaphore,
}

impl Waiter {
	/// Creates a new waiter.
	pub fn new() -> Self {
		Self {
			sem: Semaphore::new(0),
		}
	}

	/// Releases one waiting thread.
	pub fn trigger(&self) {
		self.sem.post();
	}

	/// Blocks until the waiter is triggered.
	///
	/// `interrupted` is the calling thread's interruption flag.
	pub fn wait(&self, interrupted: &AtomicBool) -> EResult<()> {
		self.sem.wait(Some(interrupted))
	}
}

impl Default for Waiter {
	fn default() -> Self {
		Self::new()
	}
}

impl Process {
	/// Creates a new thread in the process.
	///
	/// Arguments:
	/// - `stack_size` is the size of the thread's stack; it is clamped to at
	///   least `PTHREAD_STACK_MIN`, zero meaning the default size.
	/// - `start_routine` is the userspace address of the start routine.
	/// - `arg` is the argument passed to the start routine.
	///
	/// The thread enters userspace through the pthread entry trampoline.
	pub fn pthread_create(
		&mut self,
		stack_size: usize,
		start_routine: u32,
		arg: u32,
	) -> EResult<Tid> {
		let stack_size = if stack_size == 0 {
			PTHREAD_STACK_DEFAULT
		} else {
			stack_size.max(PTHREAD_STACK_MIN)
		};

		trampoline::ensure_mapped(self);
		let stack_base = self
			.mem_space
			.lock()
			.map(None, stack_size, PROT_READ | PROT_WRITE, None)?;

		let tid = self.alloc_tid();
		let thread = Thread::new(tid, stack_base, stack_size);
		{
			let mut regs = thread.regs.lock();
			regs.esp = (stack_base + stack_size) as u32;
			regs.eip = trampoline::PTHREAD_ENTRY_TRAMPOLINE;
			regs.eax = start_routine;
			regs.ebx = arg;
		}

		self.threads.insert(tid, Arc::new(thread));
		Ok(tid)
	}

	/// Terminates the thread `tid` with the given return value.
	///
	/// A detached thread is reaped immediately.
	pub fn pthread_exit(&mut self, tid: Tid, retval: usize) -> EResult<()> {
		let thread = self.threads.get(&tid).ok_or_else(|| errno!(ESRCH))?;
		thread.exit(retval);

		if thread.is_detached() {
			self.reap_thread(tid);
		}
		Ok(())
	}

	/// Waits for the thread `tid` to exit and returns its return value,
	/// reaping the record.
	///
	/// Joining a detached thread fails with `EINVAL`; a thread joining
	/// itself fails with `EDEADLK`.
	pub fn pthread_join(&mut self, caller_tid: Tid, tid: Tid) -> EResult<usize> {
		if caller_tid == tid {
			return Err(errno!(EDEADLK));
		}
		let thread = self.threads.get(&tid).ok_or_else(|| errno!(ESRCH))?.clone();
		if thread.is_detached() {
			return Err(errno!(EINVAL));
		}

		let retval = thread.join_wait()?;
		self.reap_thread(tid);
		Ok(retval)
	}

	/// Detaches the thread `tid`, reaping it immediately if it has already
	/// exited.
	pub fn pthread_detach(&mut self, tid: Tid) -> EResult<()> {
		let thread = self.threads.get(&tid).ok_or_else(|| errno!(ESRCH))?;
		thread.detach();

		if thread.has_exited() {
			self.reap_thread(tid);
		}
		Ok(())
	}

	/// Removes the record of the thread `tid` and releases its stack.
	pub fn reap_thread(&mut self, tid: Tid) {
		if let Some(thread) = self.threads.remove(&tid) {
			if thread.stack_size > 0 {
				let _ = self
					.mem_space
					.lock()
					.unmap(thread.stack_base, thread.stack_size);
			}
		}
	}

	/// Returns the thread `tid` of the process.
	pub fn get_thread(&self, tid: Tid) -> EResult<Arc<Thread>> {
		self.threads.get(&tid).cloned().ok_or_else(|| errno!(ESRCH))
	}

	/// Creates a waiter object and returns its handle.
	pub fn waiter_create(&mut self) -> u32 {
		let id = self.alloc_waiter_id();
		self.waiters.insert(id, Arc::new(Waiter::new()));
		id
	}

	/// Destroys the waiter `id`.
	pub fn waiter_destroy(&mut self, id: u32) -> EResult<()> {
		self.waiters.remove(&id).ok_or_else(|| errno!(EINVAL))?;
		Ok(())
	}

	/// Returns the waiter `id`.
	pub fn get_waiter(&self, id: u32) -> EResult<Arc<Waiter>> {
		self.waiters.get(&id).cloned().ok_or_else(|| errno!(EINVAL))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fs::ext2;
	use crate::process::Process;

	fn test_proc() -> Arc<Mutex<Process>> {
		let dev = Arc::new(RamDisk::new(512 * 1024));
		let fs = ext2::format(dev, &Default::default()).unwrap();
		Process::new(fs).unwrap()
	}

	#[test]
	fn thread_create_entry() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();
			let tid = proc.pthread_create(0, 0x1000, 42).unwrap();
			let thread = proc.get_thread(tid).unwrap();

			let regs = thread.regs.lock();
			assert_eq!(regs.eip, trampoline::PTHREAD_ENTRY_TRAMPOLINE);
			assert_eq!(regs.eax, 0x1000);
			assert_eq!(regs.ebx, 42);
			// The stack is mapped
			assert!(proc
				.mem_space
				.lock()
				.is_mapped(regs.esp as usize - PTHREAD_STACK_MIN, 16, true));
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}

	#[test]
	fn thread_join_transfers_retval() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();
			let tid = proc.pthread_create(0, 0x1000, 0).unwrap();

			// The thread exits before being joined
			proc.pthread_exit(tid, 0xdead).unwrap();
			let main_tid = proc.main_tid;
			let retval = proc.pthread_join(main_tid, tid).unwrap();
			assert_eq!(retval, 0xdead);

			// Reaped
			assert!(proc.get_thread(tid).is_err());
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}

	#[test]
	fn thread_join_detached_rejected() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();
			let tid = proc.pthread_create(0, 0x1000, 0).unwrap();
			proc.pthread_detach(tid).unwrap();

			let main_tid = proc.main_tid;
			let res = proc.pthread_join(main_tid, tid);
			assert_eq!(res.unwrap_err().as_int(), errno::EINVAL);

			// A detached thread is reaped on exit
			proc.pthread_exit(tid, 0).unwrap();
			assert!(proc.get_thread(tid).is_err());
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}

	#[test]
	fn key_lifecycle() {
		let thread = Thread::new(1, 0, 0);
		let mut keys = thread.keys.lock();

		let key = keys.key_create(0x2000).unwrap();
		assert!(keys.is_allocated(key));

		keys.set_specific(key, 0xbeef).unwrap();
		assert_eq!(keys.get_specific(key), 0xbeef);

		// Deleting the key reports the destructor and the value exactly once
		let pair = keys.key_delete(key).unwrap();
		assert_eq!(pair, Some((0x2000, 0xbeef)));
		assert!(!keys.is_allocated(key));
		assert_eq!(keys.get_specific(key), 0);

		// Deleting again fails
		assert!(keys.key_delete(key).is_err());
	}

	#[test]
	fn key_indices_reused_lowest_first() {
		let thread = Thread::new(1, 0, 0);
		let mut keys = thread.keys.lock();

		let a = keys.key_create(0).unwrap();
		let b = keys.key_create(0).unwrap();
		let c = keys.key_create(0).unwrap();
		assert_eq!((a, b, c), (0, 1, 2));

		keys.key_delete(b).unwrap();
		assert_eq!(keys.key_create(0).unwrap(), 1);
	}

	#[test]
	fn waiter_single_thread_deadlock() {
		let proc_mutex = test_proc();
		{
			let mut proc = proc_mutex.lock();
			let id = proc.waiter_create();

			// With a single thread, no one can ever trigger the waiter
			assert_eq!(proc.threads.len(), 1);
			let waiter = proc.get_waiter(id).unwrap();

			// Triggered first, then waiting, does not block
			waiter.trigger();
			let flag = AtomicBool::new(false);
			waiter.wait(&flag).unwrap();

			proc.waiter_destroy(id).unwrap();
			assert!(proc.get_waiter(id).is_err());
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}
}
