//! A directory entry is an entry stored into an inode's content which
//! represents a subfile in a directory.
//!
//! Entries are variable-length records packed into the directory's blocks.
//! An entry never crosses a block boundary and the last entry of a block
//! extends to the block's end, so that walking a block by record length
//! always lands exactly on the block's end.

use crate::errno;
use crate::errno::EResult;
use crate::file::fs::ext2::Superblock;
use crate::file::FileType;
use crate::util;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::mem::size_of;

/// Directory entry type indicator: Unknown
const TYPE_INDICATOR_UNKNOWN: u8 = 0;
/// Directory entry type indicator: Regular file
const TYPE_INDICATOR_REGULAR: u8 = 1;
/// Directory entry type indicator: Directory
const TYPE_INDICATOR_DIRECTORY: u8 = 2;
/// Directory entry type indicator: Char device
const TYPE_INDICATOR_CHAR_DEVICE: u8 = 3;
/// Directory entry type indicator: Block device
const TYPE_INDICATOR_BLOCK_DEVICE: u8 = 4;
/// Directory entry type indicator: FIFO
const TYPE_INDICATOR_FIFO: u8 = 5;
/// Directory entry type indicator: Socket
const TYPE_INDICATOR_SOCKET: u8 = 6;
/// Directory entry type indicator: Symbolic link
const TYPE_INDICATOR_SYMLINK: u8 = 7;

/// The offset of the name in an entry.
pub const NAME_OFF: usize = 8;
/// The alignment of directory entries.
pub const ALIGN: usize = 4;

/// The header of a directory entry, as stored on disk.
///
/// Every multi-byte field is stored little-endian and must be accessed
/// through [`Dirent`], which performs the conversion.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DirentHeader {
	/// The inode associated with the entry. Zero means the entry is unused.
	d_inode: u32,
	/// The total size of the record.
	d_rec_len: u16,
	/// Name length least-significant bits.
	d_name_len: u8,
	/// Name length most-significant bits, or type indicator when the
	/// filesystem has the directory-type feature.
	d_file_type: u8,
}

/// A decoded directory entry header.
#[derive(Clone, Copy, Debug)]
pub struct Dirent {
	/// The inode associated with the entry. Zero means the entry is unused.
	pub inode: u32,
	/// The total size of the record.
	pub rec_len: u16,
	/// Raw name length least-significant bits.
	name_len: u8,
	/// Raw name length most-significant bits or type indicator.
	file_type: u8,
}

impl Dirent {
	/// Decodes the entry at offset `off` in the block `blk`.
	///
	/// `sp` is the filesystem's superblock.
	///
	/// If the record is malformed (crosses the block boundary, is not
	/// aligned, or is too short to hold its own name), the function fails
	/// with `EIO`.
	pub fn read(blk: &[u8], off: usize, sp: &Superblock) -> EResult<Self> {
		if off + NAME_OFF > blk.len() {
			return Err(errno!(EIO));
		}

		let header: DirentHeader =
			bytemuck::pod_read_unaligned(&blk[off..off + size_of::<DirentHeader>()]);
		let ent = Self {
			inode: u32::from_le(header.d_inode),
			rec_len: u16::from_le(header.d_rec_len),
			name_len: header.d_name_len,
			file_type: header.d_file_type,
		};

		let rec_len = ent.rec_len as usize;
		if rec_len == 0 {
			// End marker: walkers stop on it
			return Ok(ent);
		}
		if rec_len < NAME_OFF || rec_len % ALIGN != 0 || off + rec_len > blk.len() {
			return Err(errno!(EIO));
		}
		if !ent.is_free() && NAME_OFF + ent.name_len(sp) > rec_len {
			return Err(errno!(EIO));
		}

		Ok(ent)
	}

	/// Encodes the entry's header at offset `off` in the block `blk`.
	pub fn write(&self, blk: &mut [u8], off: usize) {
		let header = DirentHeader {
			d_inode: self.inode.to_le(),
			d_rec_len: self.rec_len.to_le(),
			d_name_len: self.name_len,
			d_file_type: self.file_type,
		};
		blk[off..off + size_of::<DirentHeader>()].copy_from_slice(bytemuck::bytes_of(&header));
	}

	/// Writes a whole new entry, header and name, at offset `off` in the
	/// block `blk`.
	///
	/// Arguments:
	/// - `sp` is the filesystem's superblock.
	/// - `entry_inode` is the target inode.
	/// - `rec_len` is the length of the record.
	/// - `file_type` is the type of the target.
	/// - `name` is the name of the entry.
	pub fn write_new(
		blk: &mut [u8],
		off: usize,
		sp: &Superblock,
		entry_inode: u32,
		rec_len: u16,
		file_type: FileType,
		name: &[u8],
	) -> EResult<Self> {
		if (rec_len as usize) < NAME_OFF + name.len()
			|| rec_len as usize % ALIGN != 0
			|| off + rec_len as usize > blk.len()
		{
			return Err(errno!(EINVAL));
		}
		if name.len() > u8::MAX as usize {
			return Err(errno!(ENAMETOOLONG));
		}

		let mut ent = Self {
			inode: entry_inode,
			rec_len,
			name_len: name.len() as u8,
			file_type: 0,
		};
		ent.set_type(sp, file_type);
		ent.write(blk, off);
		blk[off + NAME_OFF..off + NAME_OFF + name.len()].copy_from_slice(name);
		Ok(ent)
	}

	/// Returns the length of the entry's name.
	///
	/// When the filesystem does not have the directory-type feature, the high
	/// byte of the name length is stored in the type field.
	pub fn name_len(&self, sp: &Superblock) -> usize {
		if sp.has_directory_type() {
			self.name_len as usize
		} else {
			((self.file_type as usize) << 8) | (self.name_len as usize)
		}
	}

	/// Returns the entry's name, read from the block `blk` for the entry at
	/// offset `off`.
	pub fn name<'b>(&self, blk: &'b [u8], off: usize, sp: &Superblock) -> &'b [u8] {
		let len = self.name_len(sp);
		&blk[off + NAME_OFF..off + NAME_OFF + len]
	}

	/// Returns the file type stored in the entry.
	///
	/// If the filesystem does not have the directory-type feature, or the
	/// indicator is unknown, the function returns `None`.
	pub fn get_type(&self, sp: &Superblock) -> Option<FileType> {
		if !sp.has_directory_type() {
			return None;
		}
		match self.file_type {
			TYPE_INDICATOR_REGULAR => Some(FileType::Regular),
			TYPE_INDICATOR_DIRECTORY => Some(FileType::Directory),
			TYPE_INDICATOR_CHAR_DEVICE => Some(FileType::CharDevice),
			TYPE_INDICATOR_BLOCK_DEVICE => Some(FileType::BlockDevice),
			TYPE_INDICATOR_FIFO => Some(FileType::Fifo),
			TYPE_INDICATOR_SOCKET => Some(FileType::Socket),
			TYPE_INDICATOR_SYMLINK => Some(FileType::Link),
			_ => None,
		}
	}

	/// Sets the file type stored in the entry, if the filesystem has the
	/// directory-type feature.
	pub fn set_type(&mut self, sp: &Superblock, file_type: FileType) {
		if sp.has_directory_type() {
			self.file_type = match file_type {
				FileType::Regular => TYPE_INDICATOR_REGULAR,
				FileType::Directory => TYPE_INDICATOR_DIRECTORY,
				FileType::CharDevice => TYPE_INDICATOR_CHAR_DEVICE,
				FileType::BlockDevice => TYPE_INDICATOR_BLOCK_DEVICE,
				FileType::Fifo => TYPE_INDICATOR_FIFO,
				FileType::Socket => TYPE_INDICATOR_SOCKET,
				FileType::Link => TYPE_INDICATOR_SYMLINK,
			};
		}
	}

	/// Creates a free (tombstone) entry spanning `rec_len` bytes.
	pub fn free(rec_len: u16) -> Self {
		Self {
			inode: 0,
			rec_len,
			name_len: 0,
			file_type: 0,
		}
	}

	/// Tells whether the entry is unused.
	pub fn is_free(&self) -> bool {
		self.inode == 0
	}

	/// Returns the size actually used by the entry: header plus name, rounded
	/// up to the entry alignment.
	pub fn used_size(&self, sp: &Superblock) -> u16 {
		util::align_up(NAME_OFF + self.name_len(sp), ALIGN) as u16
	}
}

/// Returns the record size required to store an entry with a name of
/// `name_len` bytes.
pub fn required_size(name_len: usize) -> u16 {
	util::align_up(NAME_OFF + name_len, ALIGN) as u16
}
