//! Program execution.
//!
//! `execve` replaces the process's image. The substrate's share of the work
//! is: building the new address space, closing the close-on-exec descriptors,
//! and rebuilding the signal handler table. Parsing of richer executable
//! formats lives with the program loader, outside this subsystem; images are
//! loaded as flat binaries.

use crate::errno;
use crate::errno::EResult;
use crate::limits::NSIG;
use crate::process::mem_space::MemSpace;
use crate::process::mem_space::PROT_EXEC;
use crate::process::mem_space::PROT_READ;
use crate::process::mem_space::PROT_WRITE;
use crate::process::regs::Regs;
use crate::process::signal::SignalHandler;
use crate::process::Process;
use alloc::vec::Vec;

/// The address at which program images are loaded.
const IMAGE_BASE: usize = 0x08048000;
/// The top of the user stack.
const STACK_TOP: usize = 0xc0000000;
/// The size of the user stack.
const STACK_SIZE: usize = 0x100000;

/// Builds the new address space for the given image and arguments.
///
/// On success, the function returns the address space and the initial
/// register state: the instruction pointer at the image's entry, the stack
/// holding the argument and environment blocks.
fn build_image(image: &[u8], argv: &[Vec<u8>], envp: &[Vec<u8>]) -> EResult<(MemSpace, Regs)> {
	if image.is_empty() {
		return Err(errno!(ENOEXEC));
	}

	let mut mem_space = MemSpace::new();
	mem_space.map(
		Some(IMAGE_BASE),
		image.len(),
		PROT_READ | PROT_WRITE | PROT_EXEC,
		None,
	)?;
	mem_space.copy_to(IMAGE_BASE, image)?;

	let stack_base = STACK_TOP - STACK_SIZE;
	mem_space.map(Some(stack_base), STACK_SIZE, PROT_READ | PROT_WRITE, None)?;

	// The argument and environment blocks are copied under the stack top,
	// each string null-terminated
	let mut blocks = Vec::new();
	for s in argv.iter().chain(envp.iter()) {
		blocks.extend_from_slice(s);
		blocks.push(0);
	}
	let args_addr = STACK_TOP - blocks.len();
	mem_space.copy_to(args_addr, &blocks)?;

	let mut regs = Regs {
		eip: IMAGE_BASE as u32,
		esp: (args_addr & !0xf) as u32,
		..Default::default()
	};
	// argc in eax, the argument block address in ebx
	regs.eax = argv.len() as u32;
	regs.ebx = args_addr as u32;
	Ok((mem_space, regs))
}

impl Process {
	/// Replaces the process's image.
	///
	/// Arguments:
	/// - `image` is the program image.
	/// - `argv` is the argument list.
	/// - `envp` is the environment list.
	///
	/// On success, the close-on-exec descriptors are closed and the
	/// user-installed signal handlers are reset to their default action. The
	/// syscall does not return to the old image.
	pub fn exec(&mut self, image: &[u8], argv: &[Vec<u8>], envp: &[Vec<u8>]) -> EResult<()> {
		// Everything fallible happens before the old image is torn down; a
		// failure past this point would be fatal to the process
		let (mem_space, regs) = build_image(image, argv, envp)?;

		// Close-on-exec descriptors are closed before the new image runs
		self.fds.write().close_cloexec();

		// The handler table is rebuilt: user-installed handlers reset to
		// their default action
		{
			let mut handlers = self.sig_handlers.write();
			for handler in handlers.iter_mut().take(NSIG) {
				if let SignalHandler::Handler(_) = handler {
					*handler = SignalHandler::Default;
				}
			}
		}
		self.saved_sig = None;
		self.altstack = Default::default();
		self.trampolines_mapped = false;

		*self.mem_space.lock() = mem_space;
		self.regs = regs;
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fd::FD_CLOEXEC;
	use crate::file::fs::ext2;
	use crate::file::open_file::OpenFile;
	use crate::file::open_file::O_RDWR;
	use crate::file::FileLocation;
	use alloc::sync::Arc;

	#[test]
	fn exec_closes_cloexec_and_resets_handlers() {
		use crate::process::signal::SigAction;
		use crate::process::signal::Signal;
		use crate::process::signal::SIGUSR1;

		let dev = Arc::new(RamDisk::new(512 * 1024));
		let fs = ext2::format(dev, &Default::default()).unwrap();
		let proc_mutex = Process::new(fs.clone()).unwrap();

		{
			let mut proc = proc_mutex.lock();

			// One descriptor with close-on-exec, one without
			let file = Arc::new(OpenFile::new(
				FileLocation {
					fs: fs.clone(),
					node: fs.get_root().unwrap(),
				},
				O_RDWR,
			));
			let kept = proc.fds.write().create_fd(file.clone(), 0).unwrap();
			let dropped = proc.fds.write().create_fd(file, FD_CLOEXEC).unwrap();

			// A user-installed handler
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

			proc.exec(b"\xcc", &[b"init".to_vec()], &[]).unwrap();

			assert!(proc.fds.read().get_fd(kept).is_some());
			assert!(proc.fds.read().get_fd(dropped).is_none());
			assert_eq!(proc.get_signal_handler(&sig), SignalHandler::Default);
			assert_eq!(proc.regs.eip, IMAGE_BASE as u32);
		}

		let pid = proc_mutex.lock().get_pid();
		Process::reap(pid);
	}
}
