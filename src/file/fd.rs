//! This module implements file descriptors-related features.
//!
//! A file descriptor is a small nonnegative integer held by a process,
//! pointing to an entry in its open file description table. A dense bitmap
//! tracks the in-use integers so that allocation always returns the lowest
//! available one.

use crate::errno;
use crate::errno::EResult;
use crate::file::open_file::OpenFile;
use crate::limits;
use crate::util::bitmap::Bitmap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;

/// File descriptor flag: If set, the file descriptor is closed on successful
/// call to `execve`.
pub const FD_CLOEXEC: i32 = 1;

/// An advisory lock held through a file descriptor.
///
/// The lock is released when the descriptor is freed.
#[derive(Clone, Debug)]
pub struct AdvisoryLock {
	/// The byte offset at which the locked range starts.
	pub start: u64,
	/// The length of the locked range. Zero means until the end of the file.
	pub len: u64,
	/// Tells whether the lock is exclusive.
	pub exclusive: bool,
}

/// Metadata carried by a descriptor which names a socket.
#[derive(Clone, Debug, Default)]
pub struct SocketInfo {
	/// The socket's domain.
	pub domain: i32,
	/// The socket's type.
	pub socket_type: i32,
	/// The local endpoint, if bound.
	pub local: Option<Vec<u8>>,
	/// The remote endpoint, if connected.
	pub remote: Option<Vec<u8>>,
}

/// A file descriptor.
#[derive(Clone)]
pub struct FileDescriptor {
	/// The descriptor's id.
	id: u32,
	/// The descriptor's flags.
	flags: i32,

	/// The open file description the descriptor points to.
	open_file: Arc<OpenFile>,
	/// The advisory lock held through the descriptor, if any.
	lock: Option<AdvisoryLock>,
	/// Socket metadata, when the descriptor names a socket.
	socket: Option<SocketInfo>,
}

impl FileDescriptor {
	/// Returns the descriptor's id.
	pub fn get_id(&self) -> u32 {
		self.id
	}

	/// Returns the descriptor's flags.
	pub fn get_flags(&self) -> i32 {
		self.flags
	}

	/// Sets the descriptor's flags.
	pub fn set_flags(&mut self, flags: i32) {
		self.flags = flags;
	}

	/// Returns the open file description the descriptor points to.
	pub fn get_open_file(&self) -> &Arc<OpenFile> {
		&self.open_file
	}

	/// Returns the advisory lock held through the descriptor, if any.
	pub fn get_lock(&self) -> Option<&AdvisoryLock> {
		self.lock.as_ref()
	}

	/// Sets the advisory lock held through the descriptor.
	pub fn set_lock(&mut self, lock: Option<AdvisoryLock>) {
		self.lock = lock;
	}

	/// Returns the socket metadata, when the descriptor names a socket.
	pub fn get_socket(&self) -> Option<&SocketInfo> {
		self.socket.as_ref()
	}
}

/// A table of file descriptors, owned by a process.
///
/// The table appears atomic to other threads of the process: it is always
/// manipulated behind the process's single-writer/many-readers lock.
#[derive(Clone, Default)]
pub struct FileDescriptorTable {
	/// Bitmap of the in-use descriptor ids.
	bitmap: Bitmap,
	/// The descriptors, by id.
	fds: HashMap<u32, FileDescriptor>,
}

impl FileDescriptorTable {
	/// Creates a descriptor pointing to the given open file description and
	/// returns its id.
	///
	/// The lowest unused id is allocated. If the table is full, the function
	/// fails with `EMFILE`.
	pub fn create_fd(&mut self, open_file: Arc<OpenFile>, flags: i32) -> EResult<u32> {
		let id = self.bitmap.find_first_clear();
		if id >= limits::OPEN_MAX {
			return Err(errno!(EMFILE));
		}

		self.bitmap.set(id);
		let id = id as u32;
		self.fds.insert(
			id,
			FileDescriptor {
				id,
				flags,

				open_file,
				lock: None,
				socket: None,
			},
		);
		Ok(id)
	}

	/// Returns the descriptor with id `id`, if any.
	pub fn get_fd(&self, id: u32) -> Option<&FileDescriptor> {
		self.fds.get(&id)
	}

	/// Returns a mutable reference to the descriptor with id `id`, if any.
	pub fn get_fd_mut(&mut self, id: u32) -> Option<&mut FileDescriptor> {
		self.fds.get_mut(&id)
	}

	/// Returns the open file description pointed to by the descriptor `id`.
	///
	/// If the descriptor does not exist, the function fails with `EBADF`.
	pub fn get_open_file(&self, id: u32) -> EResult<Arc<OpenFile>> {
		self.fds
			.get(&id)
			.map(|fd| fd.open_file.clone())
			.ok_or_else(|| errno!(EBADF))
	}

	/// Closes the descriptor `id`, releasing its record.
	///
	/// Releasing the record drops its reference to the open file description
	/// and releases any advisory lock.
	pub fn close_fd(&mut self, id: u32) -> EResult<()> {
		if self.fds.remove(&id).is_none() {
			return Err(errno!(EBADF));
		}
		self.bitmap.clear(id as usize);
		Ok(())
	}

	/// Duplicates the descriptor `id` onto the lowest available id.
	///
	/// The duplicate shares the open file description, hence the offset, and
	/// its close-on-exec flag is clear.
	pub fn dup(&mut self, id: u32) -> EResult<u32> {
		let open_file = self.get_open_file(id)?;
		self.create_fd(open_file, 0)
	}

	/// Duplicates the descriptor `id` onto the lowest available id at least
	/// `min`.
	///
	/// The duplicate shares the open file description and its close-on-exec
	/// flag is clear.
	pub fn dup_min(&mut self, id: u32, min: u32) -> EResult<u32> {
		let open_file = self.get_open_file(id)?;

		let mut newfd = min as usize;
		while self.bitmap.is_set(newfd) {
			newfd += 1;
		}
		if newfd >= limits::OPEN_MAX {
			return Err(errno!(EMFILE));
		}

		self.bitmap.set(newfd);
		let newfd = newfd as u32;
		self.fds.insert(
			newfd,
			FileDescriptor {
				id: newfd,
				flags: 0,

				open_file,
				lock: None,
				socket: None,
			},
		);
		Ok(newfd)
	}

	/// Duplicates the descriptor `oldfd` onto `newfd`, closing `newfd` first
	/// if it is open.
	///
	/// The operation is atomic with respect to the rest of the table. If
	/// `oldfd == newfd`, the function does nothing. The duplicate's
	/// close-on-exec flag is clear.
	pub fn dup2(&mut self, oldfd: u32, newfd: u32) -> EResult<u32> {
		if newfd as usize >= limits::OPEN_MAX {
			return Err(errno!(EBADF));
		}
		let fd = self.fds.get(&oldfd).ok_or_else(|| errno!(EBADF))?;
		if oldfd == newfd {
			return Ok(newfd);
		}

		let mut new_fd = fd.clone();
		new_fd.id = newfd;
		new_fd.flags = 0;
		self.fds.insert(newfd, new_fd);
		self.bitmap.set(newfd as usize);
		Ok(newfd)
	}

	/// Closes every descriptor whose close-on-exec flag is set.
	pub fn close_cloexec(&mut self) {
		let ids: Vec<u32> = self
			.fds
			.values()
			.filter(|fd| fd.flags & FD_CLOEXEC != 0)
			.map(|fd| fd.id)
			.collect();
		for id in ids {
			let _ = self.close_fd(id);
		}
	}

	/// Returns an iterator over the table's descriptors.
	pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
		self.fds.values()
	}

	/// Tells whether the id `id` is marked in-use in the table's bitmap.
	pub fn is_in_bitmap(&self, id: u32) -> bool {
		self.bitmap.is_set(id as usize)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::file::open_file::O_RDWR;

	fn dummy_open_file() -> Arc<OpenFile> {
		use crate::device::ram::RamDisk;
		use crate::file::fs::ext2;
		use crate::file::FileLocation;

		let dev = Arc::new(RamDisk::new(256 * 1024));
		let fs = ext2::format(dev, &Default::default()).unwrap();
		let node = fs.get_root().unwrap();
		Arc::new(OpenFile::new(
			FileLocation {
				fs,
				node,
			},
			O_RDWR,
		))
	}

	#[test]
	fn fd_lowest_available() {
		let mut table = FileDescriptorTable::default();
		let file = dummy_open_file();

		assert_eq!(table.create_fd(file.clone(), 0).unwrap(), 0);
		assert_eq!(table.create_fd(file.clone(), 0).unwrap(), 1);
		assert_eq!(table.create_fd(file.clone(), 0).unwrap(), 2);

		table.close_fd(1).unwrap();
		assert_eq!(table.create_fd(file, 0).unwrap(), 1);
	}

	#[test]
	fn fd_bitmap_invariant() {
		let mut table = FileDescriptorTable::default();
		let file = dummy_open_file();

		let a = table.create_fd(file.clone(), 0).unwrap();
		let b = table.create_fd(file, 0).unwrap();
		assert!(table.is_in_bitmap(a));
		assert!(table.is_in_bitmap(b));

		table.close_fd(a).unwrap();
		assert!(!table.is_in_bitmap(a));
	}

	#[test]
	fn fd_dup2_replaces() {
		let mut table = FileDescriptorTable::default();
		let file = dummy_open_file();

		let a = table.create_fd(file.clone(), 0).unwrap();
		let b = table.create_fd(file, FD_CLOEXEC).unwrap();

		assert_eq!(table.dup2(a, b).unwrap(), b);
		// The duplicate shares the open file description and has no cloexec
		let dup = table.get_fd(b).unwrap();
		assert_eq!(dup.get_flags() & FD_CLOEXEC, 0);
		assert!(Arc::ptr_eq(
			table.get_fd(a).unwrap().get_open_file(),
			dup.get_open_file()
		));
	}

	#[test]
	fn fd_close_cloexec() {
		let mut table = FileDescriptorTable::default();
		let file = dummy_open_file();

		let a = table.create_fd(file.clone(), 0).unwrap();
		let b = table.create_fd(file.clone(), FD_CLOEXEC).unwrap();
		let c = table.create_fd(file, 0).unwrap();

		table.close_cloexec();
		assert!(table.get_fd(a).is_some());
		assert!(table.get_fd(b).is_none());
		assert!(table.get_fd(c).is_some());
	}
}
