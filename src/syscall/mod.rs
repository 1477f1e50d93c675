//! This module handles system calls. A system call is a "function" that
//! allows to communicate between userspace and kernelspace.
//!
//! The architecture-specific trap handler saves the caller's registers and
//! calls [`dispatch`] with the syscall number and its parameters; the return
//! value goes back in the caller's return register. A failing handler sets
//! the calling thread's error indicator and yields `-1`.

mod _exit;
mod alarm;
mod close;
mod dup;
mod dup2;
mod execve;
mod fcntl;
mod fork;
mod getpid;
mod getppid;
mod ioctl;
mod kill;
mod link;
mod lseek;
mod mkdir;
mod mmap;
mod msync;
mod munmap;
mod nanosleep;
mod open;
mod poll;
mod pthread;
mod pthread_key;
mod read;
mod readlink;
mod rename;
mod rmdir;
mod select;
mod session;
mod sigaction;
mod sigaltstack;
mod sigprocmask;
mod sigreturn;
mod sleep;
mod stat;
mod symlink;
mod unlink;
mod waiter;
mod waitpid;
mod write;
pub mod util;

use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// `_exit` syscall number.
pub const SYS_EXIT: usize = 1;
/// `fork` syscall number.
pub const SYS_FORK: usize = 2;
/// `read` syscall number.
pub const SYS_READ: usize = 3;
/// `write` syscall number.
pub const SYS_WRITE: usize = 4;
/// `open` syscall number.
pub const SYS_OPEN: usize = 5;
/// `close` syscall number.
pub const SYS_CLOSE: usize = 6;
/// `waitpid` syscall number.
pub const SYS_WAITPID: usize = 7;
/// `lseek` syscall number.
pub const SYS_LSEEK: usize = 8;
/// `dup` syscall number.
pub const SYS_DUP: usize = 9;
/// `dup2` syscall number.
pub const SYS_DUP2: usize = 10;
/// `execve` syscall number.
pub const SYS_EXECVE: usize = 11;
/// `stat` syscall number.
pub const SYS_STAT: usize = 12;
/// `fstat` syscall number.
pub const SYS_FSTAT: usize = 13;
/// `lstat` syscall number.
pub const SYS_LSTAT: usize = 14;
/// `mkdir` syscall number.
pub const SYS_MKDIR: usize = 15;
/// `rmdir` syscall number.
pub const SYS_RMDIR: usize = 16;
/// `unlink` syscall number.
pub const SYS_UNLINK: usize = 17;
/// `symlink` syscall number.
pub const SYS_SYMLINK: usize = 18;
/// `link` syscall number.
pub const SYS_LINK: usize = 19;
/// `rename` syscall number.
pub const SYS_RENAME: usize = 20;
/// `readlink` syscall number.
pub const SYS_READLINK: usize = 21;
/// `ioctl` syscall number.
pub const SYS_IOCTL: usize = 22;
/// `select` syscall number.
pub const SYS_SELECT: usize = 23;
/// `poll` syscall number.
pub const SYS_POLL: usize = 24;
/// `fcntl` syscall number.
pub const SYS_FCNTL: usize = 25;
/// `getpid` syscall number.
pub const SYS_GETPID: usize = 26;
/// `getppid` syscall number.
pub const SYS_GETPPID: usize = 27;
/// `sigaction` syscall number.
pub const SYS_SIGACTION: usize = 30;
/// `kill` syscall number.
pub const SYS_KILL: usize = 31;
/// `alarm` syscall number.
pub const SYS_ALARM: usize = 32;
/// `sleep` syscall number.
pub const SYS_SLEEP: usize = 33;
/// `nanosleep` syscall number.
pub const SYS_NANOSLEEP: usize = 34;
/// `sigaltstack` syscall number.
pub const SYS_SIGALTSTACK: usize = 35;
/// `sigreturn` syscall number.
pub const SYS_SIGRETURN: usize = 36;
/// `sigprocmask` syscall number.
pub const SYS_SIGPROCMASK: usize = 37;
/// `pthread_create` syscall number.
pub const SYS_PTHREAD_CREATE: usize = 40;
/// `pthread_join` syscall number.
pub const SYS_PTHREAD_JOIN: usize = 41;
/// `pthread_detach` syscall number.
pub const SYS_PTHREAD_DETACH: usize = 42;
/// `pthread_exit` syscall number.
pub const SYS_PTHREAD_EXIT: usize = 43;
/// `pthread_kill` syscall number.
pub const SYS_PTHREAD_KILL: usize = 44;
/// `pthread_sigmask` syscall number.
pub const SYS_PTHREAD_SIGMASK: usize = 45;
/// `pthread_key_create` syscall number.
pub const SYS_PTHREAD_KEY_CREATE: usize = 46;
/// `pthread_key_delete` syscall number.
pub const SYS_PTHREAD_KEY_DELETE: usize = 47;
/// `pthread_setspecific` syscall number.
pub const SYS_PTHREAD_SETSPECIFIC: usize = 48;
/// `pthread_getspecific` syscall number.
pub const SYS_PTHREAD_GETSPECIFIC: usize = 49;
/// `waiter_create` syscall number.
pub const SYS_WAITER_CREATE: usize = 50;
/// `waiter_destroy` syscall number.
pub const SYS_WAITER_DESTROY: usize = 51;
/// `waiter_wait` syscall number.
pub const SYS_WAITER_WAIT: usize = 52;
/// `waiter_trigger` syscall number.
pub const SYS_WAITER_TRIGGER: usize = 53;
/// `setsid` syscall number.
pub const SYS_SETSID: usize = 60;
/// `setpgid` syscall number.
pub const SYS_SETPGID: usize = 61;
/// `getpgrp` syscall number.
pub const SYS_GETPGRP: usize = 62;
/// `tcgetpgrp` syscall number.
pub const SYS_TCGETPGRP: usize = 63;
/// `tcsetpgrp` syscall number.
pub const SYS_TCSETPGRP: usize = 64;
/// `mmap` syscall number.
pub const SYS_MMAP: usize = 70;
/// `munmap` syscall number.
pub const SYS_MUNMAP: usize = 71;
/// `msync` syscall number.
pub const SYS_MSYNC: usize = 72;

/// Dispatches the system call `id` for the process `proc`.
///
/// `args` holds up to five machine-word parameters. The function returns the
/// value to put in the caller's return register.
///
/// An out-of-range number yields an error log line and a zero return.
pub fn dispatch(proc: &Arc<Mutex<Process>>, id: usize, args: [usize; 5]) -> isize {
	let result = match id {
		SYS_EXIT => _exit::_exit(proc, args[0] as u32),
		SYS_FORK => fork::fork(proc),
		SYS_READ => read::read(proc, args[0] as u32, args[1], args[2]),
		SYS_WRITE => write::write(proc, args[0] as u32, args[1], args[2]),
		SYS_OPEN => open::open(proc, args[0], args[1] as i32, args[2] as u16),
		SYS_CLOSE => close::close(proc, args[0] as u32),
		SYS_WAITPID => waitpid::waitpid(proc, args[0] as i32, args[1], args[2] as i32),
		SYS_LSEEK => lseek::lseek(proc, args[0] as u32, args[1] as i64, args[2] as i32),
		SYS_DUP => dup::dup(proc, args[0] as u32),
		SYS_DUP2 => dup2::dup2(proc, args[0] as u32, args[1] as u32),
		SYS_EXECVE => execve::execve(proc, args[0], args[1], args[2]),
		SYS_STAT => stat::stat(proc, args[0], args[1]),
		SYS_FSTAT => stat::fstat(proc, args[0] as u32, args[1]),
		SYS_LSTAT => stat::lstat(proc, args[0], args[1]),
		SYS_MKDIR => mkdir::mkdir(proc, args[0], args[1] as u16),
		SYS_RMDIR => rmdir::rmdir(proc, args[0]),
		SYS_UNLINK => unlink::unlink(proc, args[0]),
		SYS_SYMLINK => symlink::symlink(proc, args[0], args[1]),
		SYS_LINK => link::link(proc, args[0], args[1]),
		SYS_RENAME => rename::rename(proc, args[0], args[1]),
		SYS_READLINK => readlink::readlink(proc, args[0], args[1], args[2]),
		SYS_IOCTL => ioctl::ioctl(proc, args[0] as u32, args[1] as u32, args[2]),
		SYS_SELECT => select::select(proc, args[0], args[1], args[2], args[3], args[4]),
		SYS_POLL => poll::poll(proc, args[0], args[1], args[2] as i32),
		SYS_FCNTL => fcntl::fcntl(proc, args[0] as u32, args[1] as i32, args[2]),
		SYS_GETPID => getpid::getpid(proc),
		SYS_GETPPID => getppid::getppid(proc),
		SYS_SIGACTION => sigaction::sigaction(proc, args[0] as i32, args[1], args[2]),
		SYS_KILL => kill::kill(proc, args[0] as i32, args[1] as i32),
		SYS_ALARM => alarm::alarm(proc, args[0] as u32),
		SYS_SLEEP => sleep::sleep(proc, args[0] as u32),
		SYS_NANOSLEEP => nanosleep::nanosleep(proc, args[0], args[1]),
		SYS_SIGALTSTACK => sigaltstack::sigaltstack(proc, args[0], args[1]),
		SYS_SIGRETURN => sigreturn::sigreturn(proc),
		SYS_SIGPROCMASK => sigprocmask::sigprocmask(proc, args[0] as i32, args[1], args[2]),
		SYS_PTHREAD_CREATE => {
			pthread::pthread_create(proc, args[0], args[1], args[2] as u32, args[3] as u32)
		}
		SYS_PTHREAD_JOIN => pthread::pthread_join(proc, args[0] as u32, args[1]),
		SYS_PTHREAD_DETACH => pthread::pthread_detach(proc, args[0] as u32),
		SYS_PTHREAD_EXIT => pthread::pthread_exit(proc, args[0]),
		SYS_PTHREAD_KILL => pthread::pthread_kill(proc, args[0] as u32, args[1] as i32),
		SYS_PTHREAD_SIGMASK => {
			sigprocmask::sigprocmask(proc, args[0] as i32, args[1], args[2])
		}
		SYS_PTHREAD_KEY_CREATE => pthread_key::pthread_key_create(proc, args[0], args[1] as u32),
		SYS_PTHREAD_KEY_DELETE => pthread_key::pthread_key_delete(proc, args[0], args[1]),
		SYS_PTHREAD_SETSPECIFIC => {
			pthread_key::pthread_setspecific(proc, args[0], args[1])
		}
		SYS_PTHREAD_GETSPECIFIC => pthread_key::pthread_getspecific(proc, args[0]),
		SYS_WAITER_CREATE => waiter::waiter_create(proc),
		SYS_WAITER_DESTROY => waiter::waiter_destroy(proc, args[0] as u32),
		SYS_WAITER_WAIT => waiter::waiter_wait(proc, args[0] as u32),
		SYS_WAITER_TRIGGER => waiter::waiter_trigger(proc, args[0] as u32),
		SYS_SETSID => session::setsid(proc),
		SYS_SETPGID => session::setpgid(proc, args[0] as i32, args[1] as i32),
		SYS_GETPGRP => session::getpgrp(proc),
		SYS_TCGETPGRP => session::tcgetpgrp(proc, args[0] as u32),
		SYS_TCSETPGRP => session::tcsetpgrp(proc, args[0] as u32, args[1] as i32),
		SYS_MMAP => mmap::mmap(proc, args[0]),
		SYS_MUNMAP => munmap::munmap(proc, args[0], args[1]),
		SYS_MSYNC => msync::msync(proc, args[0], args[1], args[2] as i32),

		_ => {
			log!("unknown syscall {id}");
			return 0;
		}
	};

	// The hooks run on every return to user mode
	let mut proc = proc.lock();
	let ret = match result {
		Ok(value) => value as isize,
		Err(errno) => {
			proc.errno = errno.as_int();
			let current_tid = proc.current_tid;
			if let Some(thread) = proc.threads.get(&current_tid) {
				thread
					.errno
					.store(errno.as_int(), core::sync::atomic::Ordering::Release);
			}
			-1
		}
	};

	// If the syscall itself set up a signal handler context, the return
	// value belongs to the interrupted context
	match &mut proc.saved_sig {
		Some(saved) => saved.regs.eax = ret as u32,
		None => proc.regs.eax = ret as u32,
	}

	proc.check_alarm();
	proc.deliver_pending_signals();
	ret
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fs::ext2;
	use crate::file::open_file;
	use crate::process::mem_space::PROT_READ;
	use crate::process::mem_space::PROT_WRITE;
	use crate::process::State;

	/// `waitpid` option, as a syscall parameter.
	const WNOHANG: usize = waitpid::WNOHANG as usize;

	/// A process with a fresh filesystem and a scratch user buffer, for
	/// driving syscalls end-to-end.
	struct TestSystem {
		proc: Arc<Mutex<Process>>,
		/// The base of the scratch user mapping.
		scratch: usize,
		/// The allocation head inside the scratch mapping.
		head: usize,
	}

	impl TestSystem {
		fn new() -> Self {
			let dev = Arc::new(RamDisk::new(1024 * 1024));
			let fs = ext2::format(dev, &Default::default()).unwrap();
			let proc = Process::new(fs).unwrap();

			let scratch = proc
				.lock()
				.mem_space
				.lock()
				.map(None, 0x10000, PROT_READ | PROT_WRITE, None)
				.unwrap();
			Self {
				proc,
				scratch,
				head: 0,
			}
		}

		/// Copies `data` into the scratch mapping and returns its address.
		fn push(&mut self, data: &[u8]) -> usize {
			let addr = self.scratch + self.head;
			self.head += (data.len() + 8) & !7;
			self.proc
				.lock()
				.mem_space
				.lock()
				.copy_to(addr, data)
				.unwrap();
			addr
		}

		/// Copies a path into the scratch mapping, null-terminated.
		fn push_str(&mut self, s: &[u8]) -> usize {
			let mut buff = s.to_vec();
			buff.push(0);
			self.push(&buff)
		}

		/// Reads back `len` bytes from the scratch mapping at `addr`.
		fn read(&self, addr: usize, len: usize) -> alloc::vec::Vec<u8> {
			let mut buff = alloc::vec![0u8; len];
			self.proc
				.lock()
				.mem_space
				.lock()
				.copy_from(addr, &mut buff)
				.unwrap();
			buff
		}

		fn call(&self, id: usize, args: [usize; 5]) -> isize {
			dispatch(&self.proc, id, args)
		}

		fn errno(&self) -> i32 {
			self.proc.lock().errno
		}
	}

	impl Drop for TestSystem {
		fn drop(&mut self) {
			let pid = self.proc.lock().get_pid();
			Process::reap(pid);
		}
	}

	#[test]
	fn open_write_lseek_read_close() {
		let mut sys = TestSystem::new();
		let path = sys.push_str(b"/a");

		let fd = sys.call(
			SYS_OPEN,
			[
				path,
				(open_file::O_CREAT | open_file::O_RDWR) as usize,
				0o644,
				0,
				0,
			],
		);
		assert!(fd >= 0);

		let buf = sys.push(b"abc");
		assert_eq!(sys.call(SYS_WRITE, [fd as usize, buf, 3, 0, 0]), 3);

		// write; lseek back; read: the same bytes come back
		assert_eq!(sys.call(SYS_LSEEK, [fd as usize, 0usize.wrapping_sub(3), open_file::SEEK_CUR as usize, 0, 0]), 0);
		let out = sys.push(&[0u8; 4]);
		assert_eq!(sys.call(SYS_READ, [fd as usize, out, 4, 0, 0]), 3);
		assert_eq!(&sys.read(out, 3), b"abc");

		assert_eq!(sys.call(SYS_CLOSE, [fd as usize, 0, 0, 0, 0]), 0);
		assert_eq!(sys.call(SYS_CLOSE, [fd as usize, 0, 0, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::EBADF);
	}

	#[test]
	fn fstat_reports_size() {
		let mut sys = TestSystem::new();
		let path = sys.push_str(b"/f");

		let fd = sys.call(
			SYS_OPEN,
			[
				path,
				(open_file::O_CREAT | open_file::O_WRONLY) as usize,
				0o644,
				0,
				0,
			],
		) as usize;
		let buf = sys.push(b"abc");
		assert_eq!(sys.call(SYS_WRITE, [fd, buf, 3, 0, 0]), 3);

		let statbuf = sys.push(&[0u8; 64]);
		assert_eq!(sys.call(SYS_FSTAT, [fd, statbuf, 0, 0, 0]), 0);
		let stat: stat::UserStat =
			bytemuck::pod_read_unaligned(&sys.read(statbuf, core::mem::size_of::<stat::UserStat>()));
		assert_eq!(stat.st_size, 3);
		assert_eq!(stat.st_nlink, 1);
	}

	#[test]
	fn dup2_shares_offset() {
		let mut sys = TestSystem::new();
		let path = sys.push_str(b"/d");

		let a = sys.call(
			SYS_OPEN,
			[
				path,
				(open_file::O_CREAT | open_file::O_RDWR) as usize,
				0o644,
				0,
				0,
			],
		) as usize;
		let buf = sys.push(b"xyzw");
		assert_eq!(sys.call(SYS_WRITE, [a, buf, 4, 0, 0]), 4);
		assert_eq!(sys.call(SYS_LSEEK, [a, 0, open_file::SEEK_SET as usize, 0, 0]), 0);

		let b = 7usize;
		assert_eq!(sys.call(SYS_DUP2, [a, b, 0, 0, 0]), b as isize);

		// Reading through the duplicate advances the same offset as `a`
		let out = sys.push(&[0u8; 2]);
		assert_eq!(sys.call(SYS_READ, [b, out, 2, 0, 0]), 2);
		assert_eq!(&sys.read(out, 2), b"xy");
		assert_eq!(sys.call(SYS_READ, [a, out, 2, 0, 0]), 2);
		assert_eq!(&sys.read(out, 2), b"zw");
	}

	#[test]
	fn mkdir_unlink_errors() {
		let mut sys = TestSystem::new();
		let dir = sys.push_str(b"/sub");

		assert_eq!(sys.call(SYS_MKDIR, [dir, 0o755, 0, 0, 0]), 0);
		// unlink on a directory is rejected; rmdir succeeds
		assert_eq!(sys.call(SYS_UNLINK, [dir, 0, 0, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::EISDIR);
		assert_eq!(sys.call(SYS_RMDIR, [dir, 0, 0, 0, 0]), 0);

		let missing = sys.push_str(b"/missing");
		assert_eq!(sys.call(SYS_RMDIR, [missing, 0, 0, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::ENOENT);
	}

	#[test]
	fn symlink_resolution_and_loop() {
		let mut sys = TestSystem::new();

		// A symlink pointing at a real file resolves through open
		let file = sys.push_str(b"/real");
		let fd = sys.call(
			SYS_OPEN,
			[
				file,
				(open_file::O_CREAT | open_file::O_WRONLY) as usize,
				0o644,
				0,
				0,
			],
		) as usize;
		let buf = sys.push(b"ok");
		sys.call(SYS_WRITE, [fd, buf, 2, 0, 0]);
		sys.call(SYS_CLOSE, [fd, 0, 0, 0, 0]);

		let target = sys.push_str(b"/real");
		let linkpath = sys.push_str(b"/lnk");
		assert_eq!(sys.call(SYS_SYMLINK, [target, linkpath, 0, 0, 0]), 0);

		let fd = sys.call(SYS_OPEN, [linkpath, open_file::O_RDONLY as usize, 0, 0, 0]) as usize;
		let out = sys.push(&[0u8; 2]);
		assert_eq!(sys.call(SYS_READ, [fd, out, 2, 0, 0]), 2);
		assert_eq!(&sys.read(out, 2), b"ok");

		// A self-referential link fails with ELOOP
		let loop_target = sys.push_str(b"/loop");
		let loop_path = sys.push_str(b"/loop");
		assert_eq!(sys.call(SYS_SYMLINK, [loop_target, loop_path, 0, 0, 0]), 0);
		assert_eq!(
			sys.call(SYS_OPEN, [loop_path, open_file::O_RDONLY as usize, 0, 0, 0]),
			-1
		);
		assert_eq!(sys.errno(), crate::errno::ELOOP);
	}

	#[test]
	fn kill_self_dispatches_synchronously() {
		use crate::process::signal::trampoline::EVENT_HANDLER_TRAMPOLINE;
		use crate::process::signal::SIGUSR1;

		let mut sys = TestSystem::new();
		let pid = sys.proc.lock().get_pid();

		// Install a handler through sigaction
		let act = sigaction::UserSigAction {
			sa_handler: 0x4242,
			sa_mask: 0,
			sa_flags: 0,
		};
		let act_addr = sys.push(bytemuck::bytes_of(&act));
		let old_addr = sys.push(&[0u8; core::mem::size_of::<sigaction::UserSigAction>()]);
		assert_eq!(
			sys.call(SYS_SIGACTION, [SIGUSR1 as usize, act_addr, old_addr, 0, 0]),
			0
		);

		// kill(self): dispatched before the syscall returns
		assert_eq!(sys.call(SYS_KILL, [pid as usize, SIGUSR1 as usize, 0, 0, 0]), 0);
		{
			let proc = sys.proc.lock();
			assert_eq!(proc.regs.eip, EVENT_HANDLER_TRAMPOLINE);
			assert_eq!(proc.regs.eax, 0x4242);
			assert!(proc.saved_sig.is_some());
		}

		// The trampoline returns through sigreturn
		assert_eq!(sys.call(SYS_SIGRETURN, [0, 0, 0, 0, 0]), 0);
		assert!(sys.proc.lock().saved_sig.is_none());
	}

	#[test]
	fn sigaction_kill_rejected() {
		use crate::process::signal::SIGKILL;

		let mut sys = TestSystem::new();
		let act = sigaction::UserSigAction {
			sa_handler: 0x1,
			sa_mask: 0,
			sa_flags: 0,
		};
		let act_addr = sys.push(bytemuck::bytes_of(&act));
		assert_eq!(sys.call(SYS_SIGACTION, [SIGKILL as usize, act_addr, 0, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::EINVAL);
	}

	#[test]
	fn fork_waitpid_exit() {
		let sys = TestSystem::new();

		let child_pid = sys.call(SYS_FORK, [0, 0, 0, 0, 0]);
		assert!(child_pid > 0);
		let child = Process::get_by_pid(child_pid as u32).unwrap();

		// The child exits; the parent reaps it
		child.lock().exit(7, false);
		assert_eq!(child.lock().get_state(), State::Zombie);

		let status_addr = sys.scratch + 0x8000;
		let reaped = sys.call(SYS_WAITPID, [child_pid as usize, status_addr, 0, 0, 0]);
		assert_eq!(reaped, child_pid);

		let status = i32::from_ne_bytes(sys.read(status_addr, 4).try_into().unwrap());
		assert_eq!((status >> 8) & 0xff, 7);
		assert!(Process::get_by_pid(child_pid as u32).is_none());
	}

	#[test]
	fn waitpid_no_children() {
		let sys = TestSystem::new();
		assert_eq!(sys.call(SYS_WAITPID, [0usize.wrapping_sub(1), 0, WNOHANG, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::ECHILD);
	}

	#[test]
	fn unknown_syscall_returns_zero() {
		let sys = TestSystem::new();
		assert_eq!(sys.call(9999, [0, 0, 0, 0, 0]), 0);
	}

	#[test]
	fn pthread_key_destructor_reported_once() {
		let mut sys = TestSystem::new();

		let key_out = sys.push(&[0u8; 4]);
		assert_eq!(sys.call(SYS_PTHREAD_KEY_CREATE, [key_out, 0x7777, 0, 0, 0]), 0);
		let key = u32::from_ne_bytes(sys.read(key_out, 4).try_into().unwrap()) as usize;

		assert_eq!(sys.call(SYS_PTHREAD_SETSPECIFIC, [key, 0xbeef, 0, 0, 0]), 0);
		assert_eq!(sys.call(SYS_PTHREAD_GETSPECIFIC, [key, 0, 0, 0, 0]), 0xbeef);

		// Deletion reports the destructor and value exactly once
		let pair_out = sys.push(&[0u8; 8]);
		assert_eq!(sys.call(SYS_PTHREAD_KEY_DELETE, [key, pair_out, 0, 0, 0]), 0);
		let pair = sys.read(pair_out, 8);
		assert_eq!(u32::from_ne_bytes(pair[0..4].try_into().unwrap()), 0x7777);
		assert_eq!(u32::from_ne_bytes(pair[4..8].try_into().unwrap()), 0xbeef);

		// The key is gone: getspecific yields null, deleting again fails
		assert_eq!(sys.call(SYS_PTHREAD_GETSPECIFIC, [key, 0, 0, 0, 0]), 0);
		assert_eq!(sys.call(SYS_PTHREAD_KEY_DELETE, [key, 0, 0, 0, 0]), -1);
	}

	#[test]
	fn waiter_deadlock_detection() {
		let sys = TestSystem::new();

		let id = sys.call(SYS_WAITER_CREATE, [0, 0, 0, 0, 0]) as usize;
		// A single-threaded process waiting can never be triggered
		assert_eq!(sys.call(SYS_WAITER_WAIT, [id, 0, 0, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::EDEADLK);
		assert_eq!(sys.call(SYS_WAITER_DESTROY, [id, 0, 0, 0, 0]), 0);
	}

	#[test]
	fn session_calls() {
		let sys = TestSystem::new();
		let pid = sys.proc.lock().get_pid() as isize;

		assert_eq!(sys.call(SYS_GETPID, [0, 0, 0, 0, 0]), pid);
		assert_eq!(sys.call(SYS_GETPGRP, [0, 0, 0, 0, 0]), pid);
		// The process leads its group: setsid is rejected
		assert_eq!(sys.call(SYS_SETSID, [0, 0, 0, 0, 0]), -1);
		assert_eq!(sys.errno(), crate::errno::EPERM);
	}

	#[test]
	fn mmap_munmap_msync() {
		let mut sys = TestSystem::new();

		// A file to map
		let path = sys.push_str(b"/m");
		let fd = sys.call(
			SYS_OPEN,
			[
				path,
				(open_file::O_CREAT | open_file::O_RDWR) as usize,
				0o644,
				0,
				0,
			],
		) as usize;
		let buf = sys.push(&[0x11u8; 4096]);
		assert_eq!(sys.call(SYS_WRITE, [fd, buf, 4096, 0, 0]), 4096);

		let args = mmap::MmapArgs {
			addr: 0,
			len: 4096,
			prot: mmap::PROT_READ_FLAG | mmap::PROT_WRITE_FLAG,
			flags: 0,
			fd: fd as i32,
			offset: 0,
		};
		let args_addr = sys.push(bytemuck::bytes_of(&args));
		let addr = sys.call(SYS_MMAP, [args_addr, 0, 0, 0, 0]);
		assert!(addr > 0);

		// The mapping holds the file's content
		assert_eq!(sys.read(addr as usize, 1)[0], 0x11);

		// Modify and write back
		sys.proc
			.lock()
			.mem_space
			.lock()
			.copy_to(addr as usize, &[0x22])
			.unwrap();
		assert_eq!(sys.call(SYS_MSYNC, [addr as usize, 4096, 0, 0, 0]), 0);

		assert_eq!(sys.call(SYS_LSEEK, [fd, 0, open_file::SEEK_SET as usize, 0, 0]), 0);
		let out = sys.push(&[0u8; 1]);
		assert_eq!(sys.call(SYS_READ, [fd, out, 1, 0, 0]), 1);
		assert_eq!(sys.read(out, 1)[0], 0x22);

		assert_eq!(sys.call(SYS_MUNMAP, [addr as usize, 4096, 0, 0, 0]), 0);
	}
}
