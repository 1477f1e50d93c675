//! An inode represents a file in the filesystem.
//!
//! The name of the file is not included in the inode but in the directory
//! entries associated with it, since several entries can refer to the same
//! inode (hard links).

use crate::errno;
use crate::errno::EResult;
use crate::file::fs::ext2::bgd::BlockGroupDescriptor;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::FileType;
use crate::file::Gid;
use crate::file::Mode;
use crate::file::Uid;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::mem::size_of;

/// The maximum number of direct blocks for each inode.
pub const DIRECT_BLOCKS_COUNT: u32 = 12;
/// The offset of the singly indirect block pointer in `i_block`.
pub const INDIRECT_BLOCK: usize = 12;
/// The offset of the doubly indirect block pointer in `i_block`.
pub const BI_INDIRECT_BLOCK: usize = 13;
/// The offset of the triply indirect block pointer in `i_block`.
pub const TRI_INDIRECT_BLOCK: usize = 14;

/// The size of a sector in bytes, as counted by `i_blocks`.
pub const SECTOR_SIZE: u32 = 512;

/// The maximum length for a symlink target to be stored in the inode itself
/// instead of separate blocks.
pub const SYMLINK_INLINE_LIMIT: u64 = 60;

/// The inode of the root directory.
pub const ROOT_DIRECTORY_INODE: u32 = 2;

/// INode type: FIFO
pub const INODE_TYPE_FIFO: u16 = 0x1000;
/// INode type: Char device
pub const INODE_TYPE_CHAR_DEVICE: u16 = 0x2000;
/// INode type: Directory
pub const INODE_TYPE_DIRECTORY: u16 = 0x4000;
/// INode type: Block device
pub const INODE_TYPE_BLOCK_DEVICE: u16 = 0x6000;
/// INode type: Regular file
pub const INODE_TYPE_REGULAR: u16 = 0x8000;
/// INode type: Symbolic link
pub const INODE_TYPE_SYMLINK: u16 = 0xa000;
/// INode type: Socket
pub const INODE_TYPE_SOCKET: u16 = 0xc000;

/// `i_flags`: File compression
pub const INODE_FLAG_COMPRESSION: u32 = 0x00004;

/// The mask of the 9 permission bits in `i_mode`.
pub const PERM_MASK: u16 = 0o777;

/// An ext2 inode.
///
/// Every multi-byte field is stored little-endian and must be accessed
/// through the associated methods, which perform the conversion.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Ext2INode {
	/// Type and permissions.
	i_mode: u16,
	/// User ID.
	i_uid: u16,
	/// Lower 32 bits of size in bytes.
	i_size: u32,
	/// Timestamp of the last access.
	i_atime: u32,
	/// Timestamp of the last modification of the metadata.
	i_ctime: u32,
	/// Timestamp of the last modification of the content.
	i_mtime: u32,
	/// Timestamp of the deletion.
	i_dtime: u32,
	/// Group ID.
	i_gid: u16,
	/// The number of hard links to this inode.
	i_links_count: u16,
	/// The number of 512-byte sectors used by this inode.
	i_blocks: u32,
	/// INode flags.
	i_flags: u32,
	/// OS-specific value.
	i_osd1: u32,
	/// Block pointers. `0..12` are direct, `12` is singly indirect, `13` is
	/// doubly indirect and `14` is triply indirect.
	///
	/// For symbolic links whose target is shorter than
	/// [`SYMLINK_INLINE_LIMIT`], the array holds the target itself.
	i_block: [u32; 15],
	/// Generation number.
	i_generation: u32,
	/// The file's ACL.
	i_file_acl: u32,
	/// Higher 32 bits of size in bytes (unused: files of 2^32 bytes and more
	/// are not supported).
	i_dir_acl: u32,
	/// Block address of fragment.
	i_faddr: u32,
	/// OS-specific value.
	i_osd2: [u8; 12],
}

impl Ext2INode {
	/// Returns the block containing the inode `i`, along with the offset of
	/// the inode inside of that block.
	///
	/// The index `i` starts at `1`.
	fn locate(i: u32, fs: &Ext2Fs) -> EResult<(u32, usize)> {
		if i == 0 {
			return Err(errno!(EINVAL));
		}

		let blk_size = fs.get_block_size();
		let inode_size = fs.get_inode_size() as u32;

		// The block group the inode is located in
		let group = (i - 1) / fs.get_inodes_per_group();
		// The offset of the inode in the group's inode table
		let table_off = ((i - 1) % fs.get_inodes_per_group()) as u64 * inode_size as u64;

		let bgd = BlockGroupDescriptor::read(group, fs)?;
		let blk = bgd.get_inode_table() + (table_off / blk_size as u64) as u32;
		Ok((blk, (table_off % blk_size as u64) as usize))
	}

	/// Reads the inode `i` from the filesystem. The index `i` starts at `1`.
	pub fn read(i: u32, fs: &Ext2Fs) -> EResult<Self> {
		let (blk, inner_off) = Self::locate(i, fs)?;
		let frame = fs.read_blk(blk)?;
		let data = frame.data();
		Ok(bytemuck::pod_read_unaligned(
			&data[inner_off..inner_off + size_of::<Self>()],
		))
	}

	/// Writes the inode back to the filesystem at index `i`.
	pub fn write(&self, i: u32, fs: &Ext2Fs) -> EResult<()> {
		let (blk, inner_off) = Self::locate(i, fs)?;
		let frame = fs.read_blk(blk)?;
		{
			let mut data = frame.data();
			data[inner_off..inner_off + size_of::<Self>()]
				.copy_from_slice(bytemuck::bytes_of(self));
			frame.mark_dirty();
		}
		fs.write_blk(blk)
	}

	/// Returns the type of the file.
	pub fn get_type(&self) -> FileType {
		match u16::from_le(self.i_mode) & 0xf000 {
			INODE_TYPE_FIFO => FileType::Fifo,
			INODE_TYPE_CHAR_DEVICE => FileType::CharDevice,
			INODE_TYPE_DIRECTORY => FileType::Directory,
			INODE_TYPE_BLOCK_DEVICE => FileType::BlockDevice,
			INODE_TYPE_SYMLINK => FileType::Link,
			INODE_TYPE_SOCKET => FileType::Socket,
			_ => FileType::Regular,
		}
	}

	/// Returns the mode of the file (type and permissions).
	pub fn get_mode(&self) -> u16 {
		u16::from_le(self.i_mode)
	}

	/// Sets the mode of the file (type and permissions).
	pub fn set_mode(&mut self, mode: u16) {
		self.i_mode = mode.to_le();
	}

	/// Returns the 9 permission bits of the file.
	pub fn get_permissions(&self) -> Mode {
		(u16::from_le(self.i_mode) & PERM_MASK) as Mode
	}

	/// Sets the 9 permission bits of the file, preserving the type and any
	/// other high mode bits (setuid, setgid, sticky).
	pub fn set_permissions(&mut self, perms: Mode) {
		let mode = (u16::from_le(self.i_mode) & !PERM_MASK) | (perms as u16 & PERM_MASK);
		self.i_mode = mode.to_le();
	}

	/// Returns the user ID of the file's owner.
	pub fn get_uid(&self) -> Uid {
		u16::from_le(self.i_uid)
	}

	/// Sets the user ID of the file's owner.
	pub fn set_uid(&mut self, uid: Uid) {
		self.i_uid = uid.to_le();
	}

	/// Returns the group ID of the file.
	pub fn get_gid(&self) -> Gid {
		u16::from_le(self.i_gid)
	}

	/// Sets the group ID of the file.
	pub fn set_gid(&mut self, gid: Gid) {
		self.i_gid = gid.to_le();
	}

	/// Returns the size of the file's content in bytes.
	pub fn get_size(&self) -> u64 {
		u32::from_le(self.i_size) as u64
	}

	/// Sets the size of the file's content in bytes.
	pub fn set_size(&mut self, size: u64) {
		self.i_size = (size as u32).to_le();
	}

	/// Returns the timestamp of the last access.
	pub fn get_atime(&self) -> u32 {
		u32::from_le(self.i_atime)
	}

	/// Sets the timestamp of the last access.
	pub fn set_atime(&mut self, ts: u32) {
		self.i_atime = ts.to_le();
	}

	/// Returns the timestamp of the last metadata modification.
	pub fn get_ctime(&self) -> u32 {
		u32::from_le(self.i_ctime)
	}

	/// Sets the timestamp of the last metadata modification.
	pub fn set_ctime(&mut self, ts: u32) {
		self.i_ctime = ts.to_le();
	}

	/// Returns the timestamp of the last content modification.
	pub fn get_mtime(&self) -> u32 {
		u32::from_le(self.i_mtime)
	}

	/// Sets the timestamp of the last content modification.
	pub fn set_mtime(&mut self, ts: u32) {
		self.i_mtime = ts.to_le();
	}

	/// Sets the timestamp of the inode's deletion.
	pub fn set_dtime(&mut self, ts: u32) {
		self.i_dtime = ts.to_le();
	}

	/// Returns the number of hard links to the inode.
	pub fn get_links_count(&self) -> u16 {
		u16::from_le(self.i_links_count)
	}

	/// Sets the number of hard links to the inode.
	pub fn set_links_count(&mut self, count: u16) {
		self.i_links_count = count.to_le();
	}

	/// Returns the number of 512-byte sectors used by the inode's content.
	pub fn get_sectors_count(&self) -> u32 {
		u32::from_le(self.i_blocks)
	}

	/// Sets the number of 512-byte sectors used by the inode's content.
	pub fn set_sectors_count(&mut self, count: u32) {
		self.i_blocks = count.to_le();
	}

	/// Returns the number of content blocks used by the inode, in filesystem
	/// blocks.
	pub fn get_blocks_count(&self, fs: &Ext2Fs) -> u32 {
		(u32::from_le(self.i_blocks) / (fs.get_block_size() / SECTOR_SIZE)) as u32
	}

	/// Sets the number of content blocks used by the inode, in filesystem
	/// blocks.
	pub fn set_blocks_count(&mut self, fs: &Ext2Fs, count: u32) {
		self.i_blocks = (count * (fs.get_block_size() / SECTOR_SIZE)).to_le();
	}

	/// Returns the inode's flags.
	pub fn get_flags(&self) -> u32 {
		u32::from_le(self.i_flags)
	}

	/// Tells whether the inode's content is compressed.
	///
	/// Compression is not supported: such an inode is unreadable.
	pub fn is_compressed(&self) -> bool {
		self.get_flags() & INODE_FLAG_COMPRESSION != 0
	}

	/// Returns the `i`th block pointer.
	pub fn get_block(&self, i: usize) -> u32 {
		u32::from_le(self.i_block[i])
	}

	/// Sets the `i`th block pointer.
	pub fn set_block(&mut self, i: usize, blk: u32) {
		self.i_block[i] = blk.to_le();
	}

	/// Returns the `i_block` array reinterpreted as bytes, for symlinks whose
	/// target is stored inline.
	pub fn get_inline_bytes(&self) -> &[u8] {
		bytemuck::cast_slice(&self.i_block)
	}

	/// Writes the given bytes into the `i_block` array, for symlinks whose
	/// target is stored inline.
	pub fn set_inline_bytes(&mut self, buff: &[u8]) {
		let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.i_block);
		bytes[..buff.len()].copy_from_slice(buff);
	}

	/// Zeroes the block pointer array.
	pub fn clear_blocks(&mut self) {
		self.i_block = [0; 15];
	}
}

/// Returns the `i_mode` type bits for the given file type.
pub fn type_bits(file_type: FileType) -> u16 {
	match file_type {
		FileType::Fifo => INODE_TYPE_FIFO,
		FileType::CharDevice => INODE_TYPE_CHAR_DEVICE,
		FileType::Directory => INODE_TYPE_DIRECTORY,
		FileType::BlockDevice => INODE_TYPE_BLOCK_DEVICE,
		FileType::Regular => INODE_TYPE_REGULAR,
		FileType::Link => INODE_TYPE_SYMLINK,
		FileType::Socket => INODE_TYPE_SOCKET,
	}
}
