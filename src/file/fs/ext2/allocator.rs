//! Block and inode allocation.
//!
//! Both allocators share the same strategy: starting from a group biased
//! toward locality, skip groups whose descriptor claims no free entry, then
//! scan the group's bitmap a word at a time for the first clear bit.
//!
//! Every metadata update follows the same order: bitmap bit, then superblock
//! count, then group descriptor count, each written back in turn.

use crate::errno;
use crate::errno::EResult;
use crate::file::fs::ext2::bgd::BlockGroupDescriptor;
use crate::file::fs::ext2::inode::Ext2INode;
use crate::file::fs::ext2::Ext2Fs;
use crate::time;
use core::mem::size_of;

/// The number of bits in a bitmap word.
const WORD_BITS: u32 = u32::BITS;

impl Ext2Fs {
	/// Searches the bitmap starting at block `bitmap_blk` for the first clear
	/// bit among `entries` entries.
	///
	/// Bitmap blocks are loaded lazily through the block cache. Words with
	/// every bit set are skipped whole; inside a word, bits are scanned
	/// LSB-first.
	fn bitmap_search(&self, bitmap_blk: u32, entries: u32) -> EResult<Option<u32>> {
		let blk_size = self.get_block_size();
		let bits_per_blk = blk_size * 8;

		let mut i = 0;
		while i < entries {
			let blk = bitmap_blk + i / bits_per_blk;
			let frame = self.read_blk(blk)?;
			let data = frame.data();

			for word_off in 0..(blk_size as usize / size_of::<u32>()) {
				let off = word_off * size_of::<u32>();
				let word = u32::from_le(bytemuck::pod_read_unaligned(
					&data[off..off + size_of::<u32>()],
				));
				if word == !0 {
					continue;
				}

				let bit = word.trailing_ones();
				let index = i + word_off as u32 * WORD_BITS + bit;
				if index >= entries {
					return Ok(None);
				}
				return Ok(Some(index));
			}

			i += bits_per_blk;
		}

		Ok(None)
	}

	/// Sets or clears the bit `index` in the bitmap starting at block
	/// `bitmap_blk`, and writes the containing bitmap block back.
	///
	/// The function returns the previous value of the bit.
	fn bitmap_set(&self, bitmap_blk: u32, index: u32, value: bool) -> EResult<bool> {
		let bits_per_blk = self.get_block_size() * 8;
		let blk = bitmap_blk + index / bits_per_blk;
		let inner = index % bits_per_blk;

		let frame = self.read_blk(blk)?;
		let prev = {
			let mut data = frame.data();
			let byte = (inner / 8) as usize;
			let bit = inner % 8;
			let prev = data[byte] & (1 << bit) != 0;
			if value {
				data[byte] |= 1 << bit;
			} else {
				data[byte] &= !(1 << bit);
			}
			frame.mark_dirty();
			prev
		};
		self.write_blk(blk)?;
		Ok(prev)
	}

	/// Allocates a free block and returns its number.
	///
	/// `requesting_inode` is the inode the block is allocated for; the search
	/// starts in its group for locality.
	///
	/// If no block is available, the function fails with `ENOSPC`.
	pub(super) fn alloc_block(&self, requesting_inode: u32) -> EResult<u32> {
		let _guard = self.alloc_lock.lock();
		let mut sp = self.superblock();

		let groups = sp.get_groups_count();
		let start = if requesting_inode >= 1 {
			(requesting_inode - 1) / sp.get_inodes_per_group() % groups
		} else {
			0
		};

		for g in (start..groups).chain(0..start) {
			let mut bgd = BlockGroupDescriptor::read(g, self)?;
			if bgd.get_free_blocks_count() == 0 {
				continue;
			}

			let Some(index) = self.bitmap_search(bgd.get_block_bitmap(), sp.get_blocks_per_group())?
			else {
				panic!("ext2: group {g}: free blocks advertised but the bitmap has no clear bit");
			};
			self.bitmap_set(bgd.get_block_bitmap(), index, true)?;

			sp.set_free_blocks_count(sp.get_free_blocks_count() - 1);
			self.write_superblock(&sp)?;

			bgd.set_free_blocks_count(bgd.get_free_blocks_count() - 1);
			bgd.write(g, self)?;

			return Ok(g * sp.get_blocks_per_group() + index + sp.get_first_data_block());
		}

		Err(errno!(ENOSPC))
	}

	/// Releases the block `blk`.
	///
	/// Releasing a block that is already free is logged and ignored.
	pub(super) fn free_block(&self, blk: u32) -> EResult<()> {
		let _guard = self.alloc_lock.lock();
		let mut sp = self.superblock();

		let rel = blk - sp.get_first_data_block();
		let g = rel / sp.get_blocks_per_group();
		let index = rel % sp.get_blocks_per_group();

		let mut bgd = BlockGroupDescriptor::read(g, self)?;
		let prev = self.bitmap_set(bgd.get_block_bitmap(), index, false)?;
		if !prev {
			log!("ext2: double free of block {blk}");
			return Ok(());
		}

		sp.set_free_blocks_count(sp.get_free_blocks_count() + 1);
		self.write_superblock(&sp)?;

		bgd.set_free_blocks_count(bgd.get_free_blocks_count() + 1);
		bgd.write(g, self)
	}

	/// Allocates a free inode and returns its number.
	///
	/// `directory` tells whether the inode is allocated for a directory, in
	/// which case the group's directories count is updated.
	///
	/// If no inode is available, the function fails with `ENOSPC`.
	pub(super) fn alloc_inode(&self, directory: bool) -> EResult<u32> {
		let _guard = self.alloc_lock.lock();
		let mut sp = self.superblock();

		for g in 0..sp.get_groups_count() {
			let mut bgd = BlockGroupDescriptor::read(g, self)?;
			if bgd.get_free_inodes_count() == 0 {
				continue;
			}

			let Some(index) = self.bitmap_search(bgd.get_inode_bitmap(), sp.get_inodes_per_group())?
			else {
				panic!("ext2: group {g}: free inodes advertised but the bitmap has no clear bit");
			};
			self.bitmap_set(bgd.get_inode_bitmap(), index, true)?;

			sp.set_free_inodes_count(sp.get_free_inodes_count() - 1);
			self.write_superblock(&sp)?;

			bgd.set_free_inodes_count(bgd.get_free_inodes_count() - 1);
			if directory {
				bgd.set_used_dirs_count(bgd.get_used_dirs_count() + 1);
			}
			bgd.write(g, self)?;

			return Ok(g * sp.get_inodes_per_group() + index + 1);
		}

		Err(errno!(ENOSPC))
	}

	/// Releases the inode `inode`, setting its deletion time first.
	///
	/// `directory` tells whether the inode was a directory, in which case the
	/// group's directories count is updated.
	///
	/// Releasing an inode that is already free is logged and ignored.
	pub(super) fn free_inode(&self, inode: u32, directory: bool) -> EResult<()> {
		debug_assert!(inode >= 1);

		// Stamp the deletion before the inode is given away
		let mut inode_ = Ext2INode::read(inode, self)?;
		inode_.set_dtime(time::get());
		inode_.write(inode, self)?;

		let _guard = self.alloc_lock.lock();
		let mut sp = self.superblock();

		let g = (inode - 1) / sp.get_inodes_per_group();
		let index = (inode - 1) % sp.get_inodes_per_group();

		let mut bgd = BlockGroupDescriptor::read(g, self)?;
		let prev = self.bitmap_set(bgd.get_inode_bitmap(), index, false)?;
		if !prev {
			log!("ext2: double free of inode {inode}");
			return Ok(());
		}

		sp.set_free_inodes_count(sp.get_free_inodes_count() + 1);
		self.write_superblock(&sp)?;

		bgd.set_free_inodes_count(bgd.get_free_inodes_count() + 1);
		if directory {
			bgd.set_used_dirs_count(bgd.get_used_dirs_count() - 1);
		}
		bgd.write(g, self)
	}
}
