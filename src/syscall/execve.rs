//! The `execve` syscall replaces the current process image with a new
//! program.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::file::FileType;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// The maximum number of entries read from an argument or environment array.
const ARG_MAX_ENTRIES: usize = 1024;

/// Reads a null-terminated array of string pointers from userspace.
fn read_string_array(proc: &Arc<Mutex<Process>>, addr: usize) -> EResult<Vec<Vec<u8>>> {
	let mut strings = Vec::new();
	if addr == 0 {
		return Ok(strings);
	}

	for i in 0..ARG_MAX_ENTRIES {
		let ptr: u32 = util::read_user_obj(proc, addr + i * 4)?;
		if ptr == 0 {
			return Ok(strings);
		}
		strings.push(util::read_user_string(proc, ptr as usize)?);
	}
	Err(errno!(EINVAL))
}

/// The implementation of the `execve` syscall.
///
/// On success the syscall does not return: the process resumes in the new
/// image.
pub fn execve(proc: &Arc<Mutex<Process>>, pathname: usize, argv: usize, envp: usize) -> EResult<usize> {
	let node = util::get_user_path_file(proc, pathname, true)?;
	if node.get_type() == FileType::Directory {
		return Err(errno!(EISDIR));
	}

	let (fs, uid, gid) = {
		let proc = proc.lock();
		(proc.fs.clone(), proc.euid, proc.egid)
	};
	if !file::can_access_node(&node, uid, gid, file::ACCESS_EXEC) {
		return Err(errno!(EACCES));
	}

	let argv = read_string_array(proc, argv)?;
	let envp = read_string_array(proc, envp)?;

	// Read the whole image
	let size = node.get_size() as usize;
	let mut image = vec![0u8; size];
	node.read(&fs, 0, &mut image)?;

	let mut proc = proc.lock();
	proc.exec(&image, &argv, &envp)?;
	// The syscall does not return: the value written back to the return
	// register is the new context's own
	Ok(proc.regs.eax as usize)
}
