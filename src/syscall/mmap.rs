//! The `mmap` syscall maps a region of the process's address space.
//!
//! The parameters are passed through a single userspace record, the syscall
//! surface carrying at most five machine words.

use crate::errno;
use crate::errno::EResult;
use crate::process::mem_space::FileMapping;
use crate::process::mem_space::PROT_EXEC;
use crate::process::mem_space::PROT_READ;
use crate::process::mem_space::PROT_WRITE;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;

/// `mmap` flag: the mapping is not backed by a file.
pub const MAP_ANONYMOUS: u32 = 0x20;
/// `mmap` flag: place the mapping exactly at the given address.
pub const MAP_FIXED: u32 = 0x10;

/// `mmap` protection: readable.
pub const PROT_READ_FLAG: u32 = 0x1;
/// `mmap` protection: writable.
pub const PROT_WRITE_FLAG: u32 = 0x2;
/// `mmap` protection: executable.
pub const PROT_EXEC_FLAG: u32 = 0x4;

/// The record holding the `mmap` parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MmapArgs {
	/// The address hint.
	pub addr: u32,
	/// The size of the mapping in bytes.
	pub len: u32,
	/// The protection of the mapping.
	pub prot: u32,
	/// The mapping's flags.
	pub flags: u32,
	/// The descriptor of the mapped file; ignored with `MAP_ANONYMOUS`.
	pub fd: i32,
	/// The offset of the mapping in the file.
	pub offset: u32,
}

/// The implementation of the `mmap` syscall.
///
/// `args` is a userspace pointer to a [`MmapArgs`] record. The syscall
/// returns the address of the mapping.
pub fn mmap(proc: &Arc<Mutex<Process>>, args: usize) -> EResult<usize> {
	let args: MmapArgs = util::read_user_obj(proc, args)?;

	let mut prot = 0u8;
	if args.prot & PROT_READ_FLAG != 0 {
		prot |= PROT_READ;
	}
	if args.prot & PROT_WRITE_FLAG != 0 {
		prot |= PROT_WRITE;
	}
	if args.prot & PROT_EXEC_FLAG != 0 {
		prot |= PROT_EXEC;
	}

	let file = if args.flags & MAP_ANONYMOUS == 0 {
		let open_file = util::get_open_file(proc, args.fd as u32)?;
		if !open_file.can_read() {
			return Err(errno!(EACCES));
		}
		Some(FileMapping {
			location: open_file.get_location().clone(),
			offset: args.offset as u64,
		})
	} else {
		None
	};

	let addr = (args.flags & MAP_FIXED != 0 || args.addr != 0).then_some(args.addr as usize);

	let mem_space = proc.lock().mem_space.clone();
	let addr = mem_space.lock().map(addr, args.len as usize, prot, file)?;
	Ok(addr)
}
