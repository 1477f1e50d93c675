//! The Block Group Descriptor Table (BGDT) is a table stored after the
//! superblock, which stores the descriptor of every block group of the
//! filesystem.

use crate::errno::EResult;
use crate::file::fs::ext2::Ext2Fs;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::mem::size_of;

/// A block group descriptor.
///
/// Every multi-byte field is stored little-endian and must be accessed
/// through the associated methods, which perform the conversion.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BlockGroupDescriptor {
	/// The block address of the block usage bitmap.
	bg_block_bitmap: u32,
	/// The block address of the inode usage bitmap.
	bg_inode_bitmap: u32,
	/// Starting block address of inode table.
	bg_inode_table: u32,
	/// Number of unallocated blocks in group.
	bg_free_blocks_count: u16,
	/// Number of unallocated inodes in group.
	bg_free_inodes_count: u16,
	/// Number of directories in group.
	bg_used_dirs_count: u16,
	/// Structure padding.
	bg_pad: u16,
	/// Structure padding.
	bg_reserved: [u8; 12],
}

impl BlockGroupDescriptor {
	/// Reads the descriptor of the block group `group` from the BGDT.
	pub fn read(group: u32, fs: &Ext2Fs) -> EResult<Self> {
		let (blk, inner_off) = Self::locate(group, fs);
		let frame = fs.read_blk(blk)?;
		let data = frame.data();
		Ok(bytemuck::pod_read_unaligned(
			&data[inner_off..inner_off + size_of::<Self>()],
		))
	}

	/// Writes the descriptor of the block group `group` back to the BGDT.
	pub fn write(&self, group: u32, fs: &Ext2Fs) -> EResult<()> {
		let (blk, inner_off) = Self::locate(group, fs);
		let frame = fs.read_blk(blk)?;
		{
			let mut data = frame.data();
			data[inner_off..inner_off + size_of::<Self>()]
				.copy_from_slice(bytemuck::bytes_of(self));
			frame.mark_dirty();
		}
		fs.write_blk(blk)
	}

	/// Returns the block containing the descriptor of the group `group`,
	/// along with the offset of the descriptor inside of that block.
	fn locate(group: u32, fs: &Ext2Fs) -> (u32, usize) {
		let blk_size = fs.get_block_size();
		let off = group as u64 * size_of::<Self>() as u64;
		let blk = fs.get_bgdt_block() + (off / blk_size as u64) as u32;
		(blk, (off % blk_size as u64) as usize)
	}

	/// Returns the block address of the block usage bitmap.
	pub fn get_block_bitmap(&self) -> u32 {
		u32::from_le(self.bg_block_bitmap)
	}

	/// Sets the block address of the block usage bitmap.
	pub fn set_block_bitmap(&mut self, blk: u32) {
		self.bg_block_bitmap = blk.to_le();
	}

	/// Sets the block address of the inode usage bitmap.
	pub fn set_inode_bitmap(&mut self, blk: u32) {
		self.bg_inode_bitmap = blk.to_le();
	}

	/// Sets the starting block address of the group's inode table.
	pub fn set_inode_table(&mut self, blk: u32) {
		self.bg_inode_table = blk.to_le();
	}

	/// Returns the block address of the inode usage bitmap.
	pub fn get_inode_bitmap(&self) -> u32 {
		u32::from_le(self.bg_inode_bitmap)
	}

	/// Returns the starting block address of the group's inode table.
	pub fn get_inode_table(&self) -> u32 {
		u32::from_le(self.bg_inode_table)
	}

	/// Returns the number of unallocated blocks in the group.
	pub fn get_free_blocks_count(&self) -> u16 {
		u16::from_le(self.bg_free_blocks_count)
	}

	/// Sets the number of unallocated blocks in the group.
	pub fn set_free_blocks_count(&mut self, count: u16) {
		self.bg_free_blocks_count = count.to_le();
	}

	/// Returns the number of unallocated inodes in the group.
	pub fn get_free_inodes_count(&self) -> u16 {
		u16::from_le(self.bg_free_inodes_count)
	}

	/// Sets the number of unallocated inodes in the group.
	pub fn set_free_inodes_count(&mut self, count: u16) {
		self.bg_free_inodes_count = count.to_le();
	}

	/// Returns the number of directories in the group.
	pub fn get_used_dirs_count(&self) -> u16 {
		u16::from_le(self.bg_used_dirs_count)
	}

	/// Sets the number of directories in the group.
	pub fn set_used_dirs_count(&mut self, count: u16) {
		self.bg_used_dirs_count = count.to_le();
	}
}
