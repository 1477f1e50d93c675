//! This module implements the interface with the block device layer.
//!
//! The filesystem accesses the storage medium through the [`BlkCache`], which
//! serves fixed-size blocks addressed by their byte offset on the device. A
//! block returned by [`BlkCache::read_block`] is pinned for as long as the
//! returned [`Frame`] reference is held; the cache returns the same frame for
//! the same offset. The cache internals (eviction, writeback scheduling) are
//! the block layer's concern, not the filesystem's.

pub mod ram;

use crate::errno;
use crate::errno::EResult;
use crate::util::io::IO;
use crate::util::lock::Mutex;
use crate::util::lock::MutexGuard;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering::Acquire;
use core::sync::atomic::Ordering::Release;
use hashbrown::HashMap;

/// A block buffer held by the cache.
///
/// The frame stays pinned in the cache while at least one `Arc` reference to
/// it exists outside of the cache itself.
#[derive(Debug)]
pub struct Frame {
	/// The byte offset of the block on the device.
	off: u64,
	/// Tells whether the frame is the read-only sparse block.
	sparse: bool,

	/// The block's data.
	data: Mutex<Box<[u8]>>,
	/// Tells whether the frame has been modified since last written back.
	dirty: AtomicBool,
}

impl Frame {
	/// Returns the byte offset of the block on the device.
	pub fn offset(&self) -> u64 {
		self.off
	}

	/// Locks and returns the frame's content.
	pub fn data(&self) -> MutexGuard<'_, Box<[u8]>> {
		self.data.lock()
	}

	/// Marks the frame as modified.
	pub fn mark_dirty(&self) {
		self.dirty.store(true, Release);
	}
}

/// A cache of blocks read from a device.
///
/// Blocks all have the same size, fixed at creation.
pub struct BlkCache {
	/// The device the cache reads from and writes to.
	dev: Arc<dyn IO>,
	/// The size of a block in bytes.
	blk_size: u32,

	/// The cached frames, by byte offset.
	frames: Mutex<HashMap<u64, Arc<Frame>>>,
	/// The shared zero block, returned for byte offset `0`.
	sparse: Arc<Frame>,
}

impl BlkCache {
	/// Creates a new cache on top of the given device.
	///
	/// `blk_size` is the size of a block in bytes.
	pub fn new(dev: Arc<dyn IO>, blk_size: u32) -> Self {
		let sparse = Arc::new(Frame {
			off: 0,
			sparse: true,

			data: Mutex::new(vec![0; blk_size as usize].into_boxed_slice()),
			dirty: AtomicBool::new(false),
		});
		Self {
			dev,
			blk_size,

			frames: Mutex::new(HashMap::new()),
			sparse,
		}
	}

	/// Returns the size of a block in bytes.
	pub fn get_block_size(&self) -> u32 {
		self.blk_size
	}

	/// Returns the underlying device.
	pub fn get_device(&self) -> &Arc<dyn IO> {
		&self.dev
	}

	/// Reads the block at byte offset `off` and returns a pinned reference to
	/// its frame.
	///
	/// `off` must be aligned to the block size. Offset `0` designates the
	/// sparse block: a shared, read-only page of zeros.
	///
	/// Two calls with the same offset return the same frame as long as the
	/// first frame is still pinned.
	pub fn read_block(&self, off: u64) -> EResult<Arc<Frame>> {
		if off == 0 {
			return Ok(self.sparse.clone());
		}
		if off % self.blk_size as u64 != 0 {
			return Err(errno!(EINVAL));
		}

		let mut frames = self.frames.lock();
		if let Some(frame) = frames.get(&off) {
			return Ok(frame.clone());
		}

		let mut buff = vec![0u8; self.blk_size as usize];
		self.dev.read(off, &mut buff)?;

		let frame = Arc::new(Frame {
			off,
			sparse: false,

			data: Mutex::new(buff.into_boxed_slice()),
			dirty: AtomicBool::new(false),
		});
		frames.insert(off, frame.clone());
		Ok(frame)
	}

	/// Writes back the cached block at byte offset `off`.
	///
	/// Writing the sparse block is invalid and fails with `EROFS`.
	pub fn write_block(&self, off: u64) -> EResult<()> {
		if off == 0 {
			return Err(errno!(EROFS));
		}

		let frame = {
			let frames = self.frames.lock();
			frames.get(&off).cloned()
		};
		let Some(frame) = frame else {
			// Nothing cached for this offset
			return Ok(());
		};

		let data = frame.data();
		self.dev.write(off, &data)?;
		frame.dirty.store(false, Release);
		Ok(())
	}

	/// Writes back the block at byte offset `off` if it is dirty.
	pub fn flush(&self, off: u64) -> EResult<()> {
		let frame = {
			let frames = self.frames.lock();
			frames.get(&off).cloned()
		};
		if let Some(frame) = frame {
			if frame.dirty.load(Acquire) {
				let data = frame.data();
				self.dev.write(off, &data)?;
				frame.dirty.store(false, Release);
			}
		}
		Ok(())
	}

	/// Writes back every dirty block.
	pub fn sync(&self) -> EResult<()> {
		let frames: Vec<Arc<Frame>> = {
			let frames = self.frames.lock();
			frames.values().cloned().collect()
		};
		for frame in frames {
			if frame.dirty.load(Acquire) {
				let data = frame.data();
				self.dev.write(frame.off, &data)?;
				frame.dirty.store(false, Release);
			}
		}
		Ok(())
	}

	/// Drops every unpinned frame from the cache, writing back dirty ones.
	pub fn shrink(&self) -> EResult<()> {
		self.sync()?;
		let mut frames = self.frames.lock();
		frames.retain(|_, frame| Arc::strong_count(frame) > 1);
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;

	#[test]
	fn sparse_block() {
		let dev = Arc::new(RamDisk::new(4096));
		let cache = BlkCache::new(dev, 1024);

		let frame = cache.read_block(0).unwrap();
		assert!(frame.data().iter().all(|b| *b == 0));
		assert!(cache.write_block(0).is_err());
	}

	#[test]
	fn same_offset_same_frame() {
		let dev = Arc::new(RamDisk::new(4096));
		let cache = BlkCache::new(dev, 1024);

		let a = cache.read_block(1024).unwrap();
		let b = cache.read_block(1024).unwrap();
		assert!(Arc::ptr_eq(&a, &b));
	}

	#[test]
	fn write_back() {
		let dev = Arc::new(RamDisk::new(4096));
		let cache = BlkCache::new(dev.clone(), 1024);

		{
			let frame = cache.read_block(1024).unwrap();
			frame.data()[0] = 42;
			frame.mark_dirty();
		}
		cache.write_block(1024).unwrap();

		let mut buff = [0u8; 1];
		dev.read(1024, &mut buff).unwrap();
		assert_eq!(buff[0], 42);
	}
}
