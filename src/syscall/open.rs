//! The `open` system call allows a process to open a file and get a file
//! descriptor.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::file::fd::FD_CLOEXEC;
use crate::file::fs::ext2::NewNode;
use crate::file::open_file;
use crate::file::open_file::OpenFile;
use crate::file::FileLocation;
use crate::file::FileType;
use crate::file::Mode;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;

/// The implementation of the `open` syscall.
pub fn open(
	proc: &Arc<Mutex<Process>>,
	pathname: usize,
	flags: i32,
	mode: Mode,
) -> EResult<usize> {
	let follow = flags & open_file::O_NOFOLLOW == 0;
	let resolved = util::resolve_user_path(proc, pathname, follow)?;

	let (fs, uid, gid, umask) = {
		let proc = proc.lock();
		(proc.fs.clone(), proc.euid, proc.egid, proc.umask)
	};

	let node = match resolved.node {
		Some(node) => {
			if flags & open_file::O_CREAT != 0 && flags & open_file::O_EXCL != 0 {
				return Err(errno!(EEXIST));
			}
			node
		}
		None => {
			if flags & open_file::O_CREAT == 0 {
				return Err(errno!(ENOENT));
			}
			// Creating a file requires write permission on the parent
			if !file::can_access_node(&resolved.parent, uid, gid, file::ACCESS_WRITE) {
				return Err(errno!(EACCES));
			}
			fs.create_node(
				&resolved.parent,
				&resolved.name,
				mode & !umask & 0o777,
				uid,
				gid,
				NewNode::Regular,
			)?
		}
	};

	if flags & open_file::O_DIRECTORY != 0 && node.get_type() != FileType::Directory {
		return Err(errno!(ENOTDIR));
	}
	if !follow && node.get_type() == FileType::Link {
		return Err(errno!(ELOOP));
	}

	// Permission checks against the access mode
	let want_read = flags & open_file::O_ACCMODE != open_file::O_WRONLY;
	let want_write = flags & open_file::O_ACCMODE != open_file::O_RDONLY;
	if want_read && !file::can_access_node(&node, uid, gid, file::ACCESS_READ) {
		return Err(errno!(EACCES));
	}
	if want_write {
		if node.get_type() == FileType::Directory {
			return Err(errno!(EISDIR));
		}
		if !file::can_access_node(&node, uid, gid, file::ACCESS_WRITE) {
			return Err(errno!(EACCES));
		}
	}

	if flags & open_file::O_TRUNC != 0 && want_write && node.get_type() == FileType::Regular {
		node.truncate(&fs)?;
	}

	let open_file = Arc::new(OpenFile::new(
		FileLocation {
			fs,
			node,
		},
		flags,
	));
	let fd_flags = if flags & open_file::O_CLOEXEC != 0 {
		FD_CLOEXEC
	} else {
		0
	};

	let fds = proc.lock().fds.clone();
	let fd = fds.write().create_fd(open_file, fd_flags)?;
	Ok(fd as usize)
}
