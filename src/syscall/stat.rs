//! The `stat`, `lstat` and `fstat` syscalls return the status of a file.

use crate::errno::EResult;
use crate::file::Stat;
use crate::process::Process;
use crate::syscall::util;
use crate::util::lock::Mutex;
use alloc::sync::Arc;
use bytemuck::Pod;
use bytemuck::Zeroable;

/// The file status record written to userspace.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UserStat {
	/// The device the file resides on.
	pub st_dev: u32,
	/// The file's inode number.
	pub st_ino: u32,
	/// The file's mode: type and permissions.
	pub st_mode: u16,
	/// The number of hard links to the file.
	pub st_nlink: u16,
	/// The file owner's user ID.
	pub st_uid: u16,
	/// The file owner's group ID.
	pub st_gid: u16,
	/// The device number, for device files.
	pub st_rdev: u32,
	/// The size of the file in bytes.
	pub st_size: u32,
	/// The preferred I/O block size.
	pub st_blksize: u32,
	/// The number of 512-byte sectors used by the file.
	pub st_blocks: u32,
	/// Timestamp of the last access.
	pub st_atime: u32,
	/// Timestamp of the last content modification.
	pub st_mtime: u32,
	/// Timestamp of the last metadata modification.
	pub st_ctime: u32,
}

/// Fills a [`UserStat`] from the given status.
fn fill(stat: Stat, blksize: u32) -> UserStat {
	UserStat {
		st_dev: 0,
		st_ino: stat.inode,
		st_mode: stat.mode,
		st_nlink: stat.links,
		st_uid: stat.uid,
		st_gid: stat.gid,
		st_rdev: 0,
		st_size: stat.size as u32,
		st_blksize: blksize,
		st_blocks: stat.blocks as u32,
		st_atime: stat.atime,
		st_mtime: stat.mtime,
		st_ctime: stat.ctime,
	}
}

/// The implementation of the `stat` syscall.
pub fn stat(proc: &Arc<Mutex<Process>>, pathname: usize, statbuf: usize) -> EResult<usize> {
	let node = util::get_user_path_file(proc, pathname, true)?;
	let fs = proc.lock().fs.clone();

	let stat = fs.stat(&node)?;
	util::write_user_obj(proc, statbuf, &fill(stat, fs.get_block_size()))?;
	Ok(0)
}

/// The implementation of the `lstat` syscall: like `stat`, without following
/// a symbolic link as the last component.
pub fn lstat(proc: &Arc<Mutex<Process>>, pathname: usize, statbuf: usize) -> EResult<usize> {
	let node = util::get_user_path_file(proc, pathname, false)?;
	let fs = proc.lock().fs.clone();

	let stat = fs.stat(&node)?;
	util::write_user_obj(proc, statbuf, &fill(stat, fs.get_block_size()))?;
	Ok(0)
}

/// The implementation of the `fstat` syscall.
pub fn fstat(proc: &Arc<Mutex<Process>>, fd: u32, statbuf: usize) -> EResult<usize> {
	let open_file = util::get_open_file(proc, fd)?;
	let location = open_file.get_location();

	let stat = location.fs.stat(&location.node)?;
	util::write_user_obj(proc, statbuf, &fill(stat, location.fs.get_block_size()))?;
	Ok(0)
}
