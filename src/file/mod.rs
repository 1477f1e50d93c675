//! This module handles files and filesystems.
//!
//! The filesystem owns every file object through its node arena; the rest of
//! the kernel refers to files through [`alloc::sync::Arc`] handles into it.

pub mod fd;
pub mod fs;
pub mod open_file;
pub mod vfs;

use crate::file::fs::ext2::Ext2Fs;
use crate::file::fs::ext2::Ext2Node;
use alloc::sync::Arc;

/// Type representing an inode number.
pub type INode = u32;
/// Type representing a user ID.
pub type Uid = u16;
/// Type representing a group ID.
pub type Gid = u16;
/// Type representing a file mode (permissions).
pub type Mode = u16;

/// The user ID of the superuser.
pub const ROOT_UID: Uid = 0;
/// The group ID of the superuser.
pub const ROOT_GID: Gid = 0;

/// Read permission, used with [`can_access`].
pub const ACCESS_READ: Mode = 0o4;
/// Write permission, used with [`can_access`].
pub const ACCESS_WRITE: Mode = 0o2;
/// Execute permission, used with [`can_access`].
pub const ACCESS_EXEC: Mode = 0o1;

/// Enumeration of file types.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
	/// A regular file storing data.
	Regular,
	/// A directory, containing other files.
	Directory,
	/// A symbolic link.
	Link,
	/// A named pipe.
	Fifo,
	/// A Unix domain socket.
	Socket,
	/// A block device file.
	BlockDevice,
	/// A char device file.
	CharDevice,
}

/// The status of a file, as returned by the `stat` family of syscalls.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stat {
	/// The file's inode number.
	pub inode: INode,
	/// The file's mode: type and permissions.
	pub mode: u16,
	/// The number of hard links to the file.
	pub links: u16,
	/// The file owner's user ID.
	pub uid: Uid,
	/// The file owner's group ID.
	pub gid: Gid,
	/// The size of the file in bytes.
	pub size: u64,
	/// The number of 512-byte sectors used by the file.
	pub blocks: u64,
	/// Timestamp of the last access.
	pub atime: u32,
	/// Timestamp of the last content modification.
	pub mtime: u32,
	/// Timestamp of the last metadata modification.
	pub ctime: u32,
}

/// Tells whether the given credentials can access a file.
///
/// Arguments:
/// - `uid` and `gid` are the credentials of the accessing process.
/// - `file_uid`, `file_gid` and `perms` describe the file.
/// - `access` is the requested access, one of [`ACCESS_READ`],
///   [`ACCESS_WRITE`] and [`ACCESS_EXEC`].
pub fn can_access(
	uid: Uid,
	gid: Gid,
	file_uid: Uid,
	file_gid: Gid,
	perms: Mode,
	access: Mode,
) -> bool {
	if uid == ROOT_UID {
		return true;
	}

	let shift = if uid == file_uid {
		6
	} else if gid == file_gid {
		3
	} else {
		0
	};
	(perms >> shift) & access == access
}

/// Tells whether the given credentials can access the given node.
pub fn can_access_node(node: &Ext2Node, uid: Uid, gid: Gid, access: Mode) -> bool {
	let (file_uid, file_gid, perms) = node.access_info();
	can_access(uid, gid, file_uid, file_gid, perms, access)
}

/// A handle on a mounted filesystem together with one of its nodes.
///
/// This is the unit the descriptor table and the process's working directory
/// refer to.
#[derive(Clone)]
pub struct FileLocation {
	/// The filesystem the node belongs to.
	pub fs: Arc<Ext2Fs>,
	/// The node.
	pub node: Arc<Ext2Node>,
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn access_owner() {
		assert!(can_access(1000, 1000, 1000, 1000, 0o600, ACCESS_READ));
		assert!(!can_access(1000, 1000, 1000, 1000, 0o600, ACCESS_EXEC));
	}

	#[test]
	fn access_group_other() {
		assert!(can_access(1001, 1000, 1000, 1000, 0o640, ACCESS_READ));
		assert!(!can_access(1001, 1000, 1000, 1000, 0o640, ACCESS_WRITE));
		assert!(can_access(1001, 1001, 1000, 1000, 0o604, ACCESS_READ));
		assert!(!can_access(1001, 1001, 1000, 1000, 0o600, ACCESS_READ));
	}

	#[test]
	fn access_root_bypass() {
		assert!(can_access(0, 0, 1000, 1000, 0o000, ACCESS_WRITE));
	}
}
