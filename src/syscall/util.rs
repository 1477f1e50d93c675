//! Utility functions for system call handlers.
//!
//! Pointer arguments are validated against the process's address space
//! before any dereference. A range that is not mapped with the required
//! access sets the error indicator to `EINVAL`.

use crate::errno;
use crate::errno::EResult;
use crate::errno::Errno;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::fs::ext2::Ext2Node;
use crate::file::open_file::OpenFile;
use crate::file::vfs;
use crate::file::vfs::ResolutionSettings;
use crate::file::vfs::Resolved;
use crate::process::Process;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bytemuck::Pod;
use core::mem::size_of;

/// Turns a memory access failure into the `EINVAL` the dispatcher reports
/// for bad pointer arguments.
fn map_fault(e: Errno) -> Errno {
	if e.as_int() == errno::EFAULT {
		errno!(EINVAL)
	} else {
		e
	}
}

/// Copies `buff.len()` bytes from the process's address space at `addr`.
pub fn copy_from_user(proc: &Arc<Mutex<Process>>, addr: usize, buff: &mut [u8]) -> EResult<()> {
	let mem_space = proc.lock().mem_space.clone();
	let mem_space = mem_space.lock();
	mem_space.copy_from(addr, buff).map_err(map_fault)
}

/// Copies `data` into the process's address space at `addr`.
pub fn copy_to_user(proc: &Arc<Mutex<Process>>, addr: usize, data: &[u8]) -> EResult<()> {
	let mem_space = proc.lock().mem_space.clone();
	let mut mem_space = mem_space.lock();
	mem_space.copy_to(addr, data).map_err(map_fault)
}

/// Reads a null-terminated string from the process's address space at
/// `addr`.
pub fn read_user_string(proc: &Arc<Mutex<Process>>, addr: usize) -> EResult<Vec<u8>> {
	let mem_space = proc.lock().mem_space.clone();
	let mem_space = mem_space.lock();
	mem_space.read_string(addr).map_err(map_fault)
}

/// Reads an object of type `T` from the process's address space at `addr`.
pub fn read_user_obj<T: Pod>(proc: &Arc<Mutex<Process>>, addr: usize) -> EResult<T> {
	let mut buff = vec![0u8; size_of::<T>()];
	copy_from_user(proc, addr, &mut buff)?;
	Ok(bytemuck::pod_read_unaligned(&buff))
}

/// Writes an object of type `T` into the process's address space at `addr`.
pub fn write_user_obj<T: Pod>(proc: &Arc<Mutex<Process>>, addr: usize, obj: &T) -> EResult<()> {
	copy_to_user(proc, addr, bytemuck::bytes_of(obj))
}

/// Returns the open file description pointed to by the descriptor `fd` of
/// the process.
pub fn get_open_file(proc: &Arc<Mutex<Process>>, fd: u32) -> EResult<Arc<OpenFile>> {
	let fds = proc.lock().fds.clone();
	let fds = fds.read();
	fds.get_open_file(fd)
}

/// Returns the process's filesystem, current working directory and
/// resolution settings.
pub fn resolution_context(
	proc: &Arc<Mutex<Process>>,
	follow_link: bool,
) -> (Arc<Ext2Fs>, Arc<Ext2Node>, ResolutionSettings) {
	let proc = proc.lock();
	(
		proc.fs.clone(),
		proc.cwd.clone(),
		ResolutionSettings {
			uid: proc.euid,
			gid: proc.egid,
			follow_link,
		},
	)
}

/// Resolves the path read from the process's address space at `path_addr`.
pub fn resolve_user_path(
	proc: &Arc<Mutex<Process>>,
	path_addr: usize,
	follow_link: bool,
) -> EResult<Resolved> {
	let path = read_user_string(proc, path_addr)?;
	let (fs, cwd, settings) = resolution_context(proc, follow_link);
	vfs::resolve_path(&fs, &cwd, &path, &settings)
}

/// Resolves the path read from the process's address space at `path_addr`
/// and returns the node it points to.
///
/// If the file does not exist, the function fails with `ENOENT`.
pub fn get_user_path_file(
	proc: &Arc<Mutex<Process>>,
	path_addr: usize,
	follow_link: bool,
) -> EResult<Arc<Ext2Node>> {
	resolve_user_path(proc, path_addr, follow_link)?
		.node
		.ok_or_else(|| errno!(ENOENT))
}
