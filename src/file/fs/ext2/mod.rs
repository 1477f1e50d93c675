//! The ext2 filesystem is a classical filesystem used in Unix systems.
//!
//! The filesystem divides the storage device into several substructures:
//! - Block Group: stored in the Block Group Descriptor Table (BGDT)
//! - Block: stored inside of block groups
//! - INode: represents a file in the filesystem
//! - Directory entry: an entry stored into the inode's content
//!
//! The access to an INode's data is divided into several parts, each
//! overflowing on the next when full:
//! - Direct Block Pointers: each inode has 12 of them
//! - Singly Indirect Block Pointer: a pointer to a block dedicated to storing
//!   a list of more blocks to store the inode's data. The number of blocks it
//!   can store depends on the size of a block.
//! - Doubly Indirect Block Pointer: a pointer to a block storing pointers to
//!   Singly Indirect Block Pointers, each storing pointers to more blocks.
//! - Triply Indirect Block Pointer: a pointer to a block storing pointers to
//!   Doubly Indirect Block Pointers, each storing pointers to Singly Indirect
//!   Block Pointers, each storing pointers to more blocks.

mod allocator;
mod bgd;
mod dirent;
mod directory;
mod format;
mod inode;
mod node;

pub use directory::Ext2Directory;
pub use format::format;
pub use format::FormatOptions;
pub use node::DirChild;
pub use node::Ext2Node;

use crate::device::BlkCache;
use crate::device::Frame;
use crate::errno;
use crate::errno::EResult;
use crate::file::FileType;
use crate::file::Gid;
use crate::file::Mode;
use crate::file::Stat;
use crate::file::Uid;
use crate::time;
use crate::util::io::IO;
use crate::util::lock::Mutex;
use crate::util::math;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use bytemuck::Pod;
use bytemuck::Zeroable;
use core::mem::size_of;
use hashbrown::HashMap;
use inode::Ext2INode;

/// The offset of the superblock from the beginning of the device.
const SUPERBLOCK_OFFSET: u64 = 1024;
/// The filesystem's signature.
const EXT2_MAGIC: u16 = 0xef53;

/// The maximum supported block size.
const MAX_BLOCK_SIZE: u32 = 4096;

/// State telling that the filesystem is clean.
const FS_STATE_CLEAN: u16 = 1;
/// State telling that the filesystem has errors.
const FS_STATE_ERROR: u16 = 2;

/// `s_feature_incompat`: Compression
const REQUIRED_FEATURE_COMPRESSION: u32 = 0x1;
/// `s_feature_incompat`: Directory entries have a type field
const REQUIRED_FEATURE_DIRECTORY_TYPE: u32 = 0x2;
/// `s_feature_incompat`: Filesystem needs to replay its journal
const REQUIRED_FEATURE_JOURNAL_REPLAY: u32 = 0x4;
/// `s_feature_incompat`: Filesystem uses a journal device
const REQUIRED_FEATURE_JOURNAL_DEVICE: u32 = 0x8;


/// Reads an object of the given type from the device.
///
/// `offset` is the offset in bytes on the device.
fn read_obj<T: Pod>(dev: &dyn IO, offset: u64) -> EResult<T> {
	let mut buff = vec![0u8; size_of::<T>()];
	dev.read(offset, &mut buff)?;
	Ok(bytemuck::pod_read_unaligned(&buff))
}

/// Writes an object of the given type to the device.
///
/// `offset` is the offset in bytes on the device.
fn write_obj<T: Pod>(obj: &T, dev: &dyn IO, offset: u64) -> EResult<()> {
	dev.write(offset, bytemuck::bytes_of(obj))
}

/// The ext2 superblock.
///
/// Every multi-byte field is stored little-endian and must be accessed
/// through the associated methods, which perform the conversion.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Superblock {
	/// Total number of inodes in the filesystem.
	s_inodes_count: u32,
	/// Total number of blocks in the filesystem.
	s_blocks_count: u32,
	/// Number of blocks reserved for the superuser.
	s_r_blocks_count: u32,
	/// Total number of unallocated blocks.
	s_free_blocks_count: u32,
	/// Total number of unallocated inodes.
	s_free_inodes_count: u32,
	/// The index of the block containing the superblock.
	s_first_data_block: u32,
	/// `log2(block_size) - 10`
	s_log_block_size: u32,
	/// `log2(fragment_size) - 10`
	s_log_frag_size: u32,
	/// The number of blocks per block group.
	s_blocks_per_group: u32,
	/// The number of fragments per block group.
	s_frags_per_group: u32,
	/// The number of inodes per block group.
	s_inodes_per_group: u32,
	/// The timestamp of the last mount operation.
	s_mtime: u32,
	/// The timestamp of the last write operation.
	s_wtime: u32,
	/// The number of mounts since the last consistency check.
	s_mnt_count: u16,
	/// The number of mounts allowed before a consistency check must be done.
	s_max_mnt_count: u16,
	/// The ext2 signature.
	s_magic: u16,
	/// The filesystem's state.
	s_state: u16,
	/// The action to perform when an error is detected.
	s_errors: u16,
	/// The minor version.
	s_minor_rev_level: u16,
	/// The timestamp of the last consistency check.
	s_lastcheck: u32,
	/// The interval between mandatory consistency checks.
	s_checkinterval: u32,
	/// The id of the operating system from which the filesystem was created.
	s_creator_os: u32,
	/// The revision level.
	s_rev_level: u32,
	/// The UID of the user that can use reserved blocks.
	s_def_resuid: u16,
	/// The GID of the group that can use reserved blocks.
	s_def_resgid: u16,

	// Extended superblock fields, valid for revision >= 1

	/// The first non-reserved inode.
	s_first_ino: u32,
	/// The size of the inode structure in bytes.
	s_inode_size: u16,
	/// The block group containing this superblock.
	s_block_group_nr: u16,
	/// Optional features.
	s_feature_compat: u32,
	/// Required features.
	s_feature_incompat: u32,
	/// Features required for writing.
	s_feature_ro_compat: u32,
	/// The filesystem id.
	s_uuid: [u8; 16],
	/// The volume name.
	s_volume_name: [u8; 16],
	/// The path the volume was last mounted to.
	s_last_mounted: [u8; 64],
	/// Used compression algorithms.
	s_algo_bitmap: u32,
	/// The number of blocks to preallocate for files.
	s_prealloc_blocks: u8,
	/// The number of blocks to preallocate for directories.
	s_prealloc_dir_blocks: u8,
	/// Unused.
	s_padding: u16,
	/// Structure padding.
	s_reserved: [u8; 816],
}

impl Superblock {
	/// Reads the superblock from the given device.
	pub fn read(dev: &dyn IO) -> EResult<Self> {
		read_obj(dev, SUPERBLOCK_OFFSET)
	}

	/// Writes the superblock back to the given device.
	pub fn write(&self, dev: &dyn IO) -> EResult<()> {
		write_obj(self, dev, SUPERBLOCK_OFFSET)
	}

	/// Tells whether the superblock's signature is valid.
	pub fn is_valid(&self) -> bool {
		u16::from_le(self.s_magic) == EXT2_MAGIC
	}

	/// Returns the size of a block in bytes.
	pub fn get_block_size(&self) -> u32 {
		math::pow2(u32::from_le(self.s_log_block_size) + 10) as u32
	}

	/// Returns the revision level of the filesystem.
	pub fn get_rev_level(&self) -> u32 {
		u32::from_le(self.s_rev_level)
	}

	/// Returns the total number of blocks.
	pub fn get_blocks_count(&self) -> u32 {
		u32::from_le(self.s_blocks_count)
	}

	/// Returns the total number of inodes.
	pub fn get_inodes_count(&self) -> u32 {
		u32::from_le(self.s_inodes_count)
	}

	/// Returns the index of the first data block.
	pub fn get_first_data_block(&self) -> u32 {
		u32::from_le(self.s_first_data_block)
	}

	/// Returns the block at which the Block Group Descriptor Table begins.
	pub fn get_bgdt_block(&self) -> u32 {
		self.get_first_data_block() + 1
	}

	/// Returns the number of blocks per block group.
	pub fn get_blocks_per_group(&self) -> u32 {
		u32::from_le(self.s_blocks_per_group)
	}

	/// Returns the number of inodes per block group.
	pub fn get_inodes_per_group(&self) -> u32 {
		u32::from_le(self.s_inodes_per_group)
	}

	/// Returns the number of block groups.
	pub fn get_groups_count(&self) -> u32 {
		math::ceil_div(
			(self.get_blocks_count() - self.get_first_data_block()) as u64,
			self.get_blocks_per_group() as u64,
		) as u32
	}

	/// Returns the total number of unallocated blocks.
	pub fn get_free_blocks_count(&self) -> u32 {
		u32::from_le(self.s_free_blocks_count)
	}

	/// Sets the total number of unallocated blocks.
	pub fn set_free_blocks_count(&mut self, count: u32) {
		self.s_free_blocks_count = count.to_le();
	}

	/// Returns the total number of unallocated inodes.
	pub fn get_free_inodes_count(&self) -> u32 {
		u32::from_le(self.s_free_inodes_count)
	}

	/// Sets the total number of unallocated inodes.
	pub fn set_free_inodes_count(&mut self, count: u32) {
		self.s_free_inodes_count = count.to_le();
	}

	/// Returns the size of an inode in bytes.
	///
	/// The field exists only for revision 1 and later; earlier filesystems
	/// use the structure's own size.
	pub fn get_inode_size(&self) -> u16 {
		if self.get_rev_level() >= 1 {
			u16::from_le(self.s_inode_size)
		} else {
			size_of::<Ext2INode>() as u16
		}
	}

	/// Returns the first inode that is not reserved.
	pub fn get_first_ino(&self) -> u32 {
		if self.get_rev_level() >= 1 {
			u32::from_le(self.s_first_ino)
		} else {
			11
		}
	}

	/// Returns the required features of the filesystem.
	pub fn get_feature_incompat(&self) -> u32 {
		if self.get_rev_level() >= 1 {
			u32::from_le(self.s_feature_incompat)
		} else {
			0
		}
	}

	/// Tells whether directory entries carry the file type of their target.
	pub fn has_directory_type(&self) -> bool {
		self.get_feature_incompat() & REQUIRED_FEATURE_DIRECTORY_TYPE != 0
	}

	/// Returns the filesystem's state.
	pub fn get_state(&self) -> u16 {
		u16::from_le(self.s_state)
	}

	/// Returns the volume name.
	pub fn get_volume_name(&self) -> &[u8; 16] {
		&self.s_volume_name
	}

	/// Returns the compression algorithms bitmap.
	pub fn get_algo_bitmap(&self) -> u32 {
		u32::from_le(self.s_algo_bitmap)
	}
}

/// The content of a node to be created by [`Ext2Fs::create_node`].
pub enum NewNode<'a> {
	/// A regular file.
	Regular,
	/// A directory.
	Directory,
	/// A symbolic link with the given target.
	Symlink(&'a [u8]),
	/// A hard link to the given node.
	Link(&'a Arc<Ext2Node>),
}

/// An instance of the ext2 filesystem.
pub struct Ext2Fs {
	/// The block cache on top of the device.
	cache: BlkCache,
	/// The filesystem's superblock.
	sp: Mutex<Superblock>,
	/// Tells whether the filesystem is mounted read-only.
	readonly: bool,

	/// Filesystem-wide lock guarding the allocators.
	alloc_lock: Mutex<()>,
	/// The node arena, keyed by inode number.
	///
	/// The arena owns every node object; directories and descriptors refer to
	/// nodes through it, so that several paths to the same inode collapse to
	/// the same object.
	nodes: Mutex<HashMap<u32, Arc<Ext2Node>>>,
}

impl Ext2Fs {
	/// Tells whether the given device holds an ext2 filesystem.
	pub fn probe(dev: &dyn IO) -> bool {
		Superblock::read(dev).map(|sp| sp.is_valid()).unwrap_or(false)
	}

	/// Mounts the filesystem from the given device.
	///
	/// `readonly` tells whether the filesystem is mounted read-only.
	pub fn mount(dev: Arc<dyn IO>, readonly: bool) -> EResult<Arc<Self>> {
		let mut sp = Superblock::read(&*dev)?;
		if !sp.is_valid() {
			return Err(errno!(EINVAL));
		}

		let blk_size = sp.get_block_size();
		if blk_size > MAX_BLOCK_SIZE {
			log!("ext2: unsupported block size {blk_size}");
			return Err(errno!(EINVAL));
		}

		let incompat = sp.get_feature_incompat();
		let unsupported =
			incompat & !(REQUIRED_FEATURE_DIRECTORY_TYPE | REQUIRED_FEATURE_COMPRESSION);
		if unsupported != 0 {
			log!("ext2: unsupported required features {unsupported:#x}");
			return Err(errno!(EINVAL));
		}
		if incompat & REQUIRED_FEATURE_COMPRESSION != 0 {
			// Compressed inodes are marked unreadable on access
			log!(
				"ext2: compression is not supported (algorithms {:#x}), compressed files will be unreadable",
				sp.get_algo_bitmap()
			);
		}

		if sp.get_state() == FS_STATE_ERROR {
			log!("ext2: filesystem has errors, no consistency check is performed");
		}

		if !readonly {
			sp.s_mnt_count = (u16::from_le(sp.s_mnt_count) + 1).to_le();
			sp.s_mtime = time::get().to_le();
			sp.write(&*dev)?;
		}

		Ok(Arc::new(Self {
			cache: BlkCache::new(dev, blk_size),
			sp: Mutex::new(sp),
			readonly,

			alloc_lock: Mutex::new(()),
			nodes: Mutex::new(HashMap::new()),
		}))
	}

	/// Tells whether the filesystem is mounted read-only.
	pub fn is_readonly(&self) -> bool {
		self.readonly
	}

	/// Returns a copy of the filesystem's superblock.
	pub fn superblock(&self) -> Superblock {
		*self.sp.lock()
	}

	/// Writes the given superblock to both the cached copy and the device.
	pub(super) fn write_superblock(&self, sp: &Superblock) -> EResult<()> {
		*self.sp.lock() = *sp;
		sp.write(&**self.cache.get_device())
	}

	/// Returns the size of a block in bytes.
	pub fn get_block_size(&self) -> u32 {
		self.cache.get_block_size()
	}

	/// Returns the size of an inode in bytes.
	pub fn get_inode_size(&self) -> u16 {
		self.sp.lock().get_inode_size()
	}

	/// Returns the number of inodes per block group.
	pub fn get_inodes_per_group(&self) -> u32 {
		self.sp.lock().get_inodes_per_group()
	}

	/// Returns the block at which the Block Group Descriptor Table begins.
	pub fn get_bgdt_block(&self) -> u32 {
		self.sp.lock().get_bgdt_block()
	}

	/// Reads the block `blk` through the block cache and returns its pinned
	/// frame.
	///
	/// Block zero designates the sparse block: a shared page of zeros.
	pub(super) fn read_blk(&self, blk: u32) -> EResult<Arc<Frame>> {
		self.cache
			.read_block(blk as u64 * self.get_block_size() as u64)
	}

	/// Writes the cached block `blk` back to the device.
	pub(super) fn write_blk(&self, blk: u32) -> EResult<()> {
		self.cache
			.write_block(blk as u64 * self.get_block_size() as u64)
	}

	/// Zeroes the block `blk` and writes it back.
	pub(super) fn zero_blk(&self, blk: u32) -> EResult<()> {
		let frame = self.read_blk(blk)?;
		{
			let mut data = frame.data();
			data.fill(0);
			frame.mark_dirty();
		}
		self.write_blk(blk)
	}

	/// Returns the node for inode `ino` from the arena, loading it if
	/// needed.
	pub fn node(&self, ino: u32) -> EResult<Arc<Ext2Node>> {
		let mut nodes = self.nodes.lock();
		if let Some(node) = nodes.get(&ino) {
			return Ok(node.clone());
		}

		let node = Arc::new(Ext2Node::load(ino, self)?);
		nodes.insert(ino, node.clone());
		Ok(node)
	}

	/// Drops the node for inode `ino` from the arena.
	fn drop_node(&self, ino: u32) {
		self.nodes.lock().remove(&ino);
	}

	/// Returns the root directory of the filesystem.
	pub fn get_root(&self) -> EResult<Arc<Ext2Node>> {
		self.node(inode::ROOT_DIRECTORY_INODE)
	}

	/// Creates a node in the filesystem and adds it under `parent` with the
	/// given name.
	///
	/// Arguments:
	/// - `parent` is the parent directory.
	/// - `name` is the name of the new entry.
	/// - `perms` is the permission set of the new node.
	/// - `uid` and `gid` are the owner of the new node.
	/// - `content` describes the node to create. For [`NewNode::Link`], no
	///   inode is allocated: the entry points to the target's inode.
	pub fn create_node(
		&self,
		parent: &Arc<Ext2Node>,
		name: &[u8],
		perms: Mode,
		uid: Uid,
		gid: Gid,
		content: NewNode<'_>,
	) -> EResult<Arc<Ext2Node>> {
		if self.readonly {
			return Err(errno!(EROFS));
		}
		let dir = Ext2Directory::new(parent)?;
		if name.is_empty() || name == b"." || name == b".." {
			return Err(errno!(EINVAL));
		}
		if dir.lookup(self, name)?.is_some() {
			return Err(errno!(EEXIST));
		}

		// Hard links reuse the target's inode
		if let NewNode::Link(target) = &content {
			if target.get_type() == FileType::Directory {
				return Err(errno!(EPERM));
			}
			dir.add_entry(self, name, target.get_inode(), target.get_type())?;
			return Ok((*target).clone());
		}

		let (file_type, directory) = match &content {
			NewNode::Regular => (FileType::Regular, false),
			NewNode::Directory => (FileType::Directory, true),
			NewNode::Symlink(_) => (FileType::Link, false),
			NewNode::Link(_) => unreachable!(),
		};

		let ino = self.alloc_inode(directory)?;
		let ts = time::get();

		let mut inode_ = Ext2INode::zeroed();
		inode_.set_mode(inode::type_bits(file_type) | (perms & inode::PERM_MASK as Mode) as u16);
		inode_.set_uid(uid);
		inode_.set_gid(gid);
		inode_.set_atime(ts);
		inode_.set_ctime(ts);
		inode_.set_mtime(ts);

		// Short symlink targets are stored in the block pointer array itself
		let mut long_target: Option<&[u8]> = None;
		if let NewNode::Symlink(target) = &content {
			if (target.len() as u64) < inode::SYMLINK_INLINE_LIMIT {
				inode_.set_inline_bytes(target);
				inode_.set_size(target.len() as u64);
			} else {
				long_target = Some(target);
			}
		}

		inode_.write(ino, self)?;

		let node = self.node(ino)?;
		if directory {
			let new_dir = Ext2Directory::new(&node)?;
			new_dir.add_entry(self, b".", ino, FileType::Directory)?;
			new_dir.add_entry(self, b"..", parent.get_inode(), FileType::Directory)?;
		}
		if let Some(target) = long_target {
			node.write(self, 0, target)?;
		}

		dir.add_entry(self, name, ino, file_type)?;
		Ok(node)
	}

	/// Removes the entry `name` from the directory `parent`, releasing the
	/// node when its last link goes away.
	///
	/// `rmdir` tells whether the operation removes a directory: removing a
	/// directory with `rmdir == false` fails with `EISDIR` and conversely
	/// with `ENOTDIR`.
	pub fn remove_node(&self, parent: &Arc<Ext2Node>, name: &[u8], rmdir: bool) -> EResult<()> {
		if self.readonly {
			return Err(errno!(EROFS));
		}
		if name == b"." || name == b".." {
			return Err(errno!(EINVAL));
		}

		let dir = Ext2Directory::new(parent)?;
		let child = dir.lookup(self, name)?.ok_or_else(|| errno!(ENOENT))?;
		let node = self.node(child.inode)?;

		let directory = node.get_type() == FileType::Directory;
		if directory != rmdir {
			return Err(if directory {
				errno!(EISDIR)
			} else {
				errno!(ENOTDIR)
			});
		}
		if directory && !Ext2Directory::new(&node)?.is_empty(self)? {
			return Err(errno!(ENOTEMPTY));
		}

		dir.remove_entry(self, name)?;

		let mut inode_ = Ext2INode::read(child.inode, self)?;
		if directory {
			// The removed entry and the directory's own `.` entry
			let links = inode_.get_links_count().saturating_sub(2);
			inode_.set_links_count(links);
			inode_.write(child.inode, self)?;

			// The directory's `..` entry no longer links the parent
			let mut parent_inode = Ext2INode::read(parent.get_inode(), self)?;
			parent_inode.set_links_count(parent_inode.get_links_count() - 1);
			parent_inode.write(parent.get_inode(), self)?;

			node.truncate(self)?;
			self.free_inode(child.inode, true)?;
			self.drop_node(child.inode);
		} else {
			let links = inode_.get_links_count() - 1;
			inode_.set_links_count(links);
			inode_.write(child.inode, self)?;

			if links == 0 {
				node.truncate(self)?;
				self.free_inode(child.inode, false)?;
				self.drop_node(child.inode);
			}
		}

		Ok(())
	}

	/// Moves the entry `old_name` of `old_parent` to `new_name` under
	/// `new_parent`.
	///
	/// If the destination already exists, it is removed first.
	pub fn rename(
		&self,
		old_parent: &Arc<Ext2Node>,
		old_name: &[u8],
		new_parent: &Arc<Ext2Node>,
		new_name: &[u8],
	) -> EResult<()> {
		if self.readonly {
			return Err(errno!(EROFS));
		}
		if old_name == b"." || old_name == b".." || new_name == b"." || new_name == b".." {
			return Err(errno!(EINVAL));
		}

		let old_dir = Ext2Directory::new(old_parent)?;
		let child = old_dir.lookup(self, old_name)?.ok_or_else(|| errno!(ENOENT))?;
		let node = self.node(child.inode)?;
		let directory = node.get_type() == FileType::Directory;

		let new_dir = Ext2Directory::new(new_parent)?;
		if new_dir.lookup(self, new_name)?.is_some() {
			self.remove_node(new_parent, new_name, directory)?;
		}

		new_dir.add_entry(self, new_name, child.inode, child.file_type)?;
		old_dir.remove_entry(self, old_name)?;

		// The links count is unchanged overall
		let mut inode_ = Ext2INode::read(child.inode, self)?;
		inode_.set_links_count(inode_.get_links_count() - 1);
		inode_.write(child.inode, self)?;

		// A moved directory's `..` entry must point to its new parent
		if directory && old_parent.get_inode() != new_parent.get_inode() {
			let moved = Ext2Directory::new(&node)?;
			moved.remove_entry(self, b"..")?;
			moved.add_entry(self, b"..", new_parent.get_inode(), FileType::Directory)?;

			let mut old_parent_inode = Ext2INode::read(old_parent.get_inode(), self)?;
			old_parent_inode.set_links_count(old_parent_inode.get_links_count() - 1);
			old_parent_inode.write(old_parent.get_inode(), self)?;
		}

		Ok(())
	}

	/// Returns the status of the given node.
	pub fn stat(&self, node: &Ext2Node) -> EResult<Stat> {
		let inode_ = Ext2INode::read(node.get_inode(), self)?;
		Ok(Stat {
			inode: node.get_inode(),
			mode: inode_.get_mode(),
			links: inode_.get_links_count(),
			uid: inode_.get_uid(),
			gid: inode_.get_gid(),
			size: inode_.get_size(),
			blocks: inode_.get_sectors_count() as u64,
			atime: inode_.get_atime(),
			mtime: inode_.get_mtime(),
			ctime: inode_.get_ctime(),
		})
	}

	/// Reads the target of the given symbolic link.
	pub fn readlink(&self, node: &Ext2Node) -> EResult<Vec<u8>> {
		if node.get_type() != FileType::Link {
			return Err(errno!(EINVAL));
		}

		let len = node.get_size() as usize;
		let mut buff = vec![0u8; len];
		let n = node.read(self, 0, &mut buff)?;
		buff.truncate(n);
		Ok(buff)
	}

	/// Writes every dirty cached block and the superblock back to the device.
	pub fn sync(&self) -> EResult<()> {
		let sp = self.superblock();
		sp.write(&**self.cache.get_device())?;
		self.cache.sync()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fs::ext2::dirent::Dirent;
	use crate::file::fs::ext2::format::FormatOptions;

	/// Formats a fresh filesystem on a RAM disk of the given size.
	fn test_fs(size: usize) -> Arc<Ext2Fs> {
		let dev = Arc::new(RamDisk::new(size));
		format::format(dev, &FormatOptions::default()).unwrap()
	}

	/// Counts the zero bits over the first `entries` bits of the bitmap
	/// starting at block `bitmap_blk`.
	fn count_free_bits(fs: &Ext2Fs, bitmap_blk: u32, entries: u32) -> u32 {
		let bits_per_blk = fs.get_block_size() * 8;
		let mut free = 0;
		for i in 0..entries {
			let frame = fs.read_blk(bitmap_blk + i / bits_per_blk).unwrap();
			let data = frame.data();
			let inner = i % bits_per_blk;
			if data[(inner / 8) as usize] & (1 << (inner % 8)) == 0 {
				free += 1;
			}
		}
		free
	}

	/// Checks that the superblock's free counts match the population count of
	/// zeros in the bitmaps.
	fn assert_free_counts(fs: &Ext2Fs) {
		let sp = fs.superblock();
		let mut free_blocks = 0;
		let mut free_inodes = 0;
		for g in 0..sp.get_groups_count() {
			let bgd = bgd::BlockGroupDescriptor::read(g, fs).unwrap();
			free_blocks += count_free_bits(fs, bgd.get_block_bitmap(), sp.get_blocks_per_group());
			free_inodes += count_free_bits(fs, bgd.get_inode_bitmap(), sp.get_inodes_per_group());
			assert_eq!(
				count_free_bits(fs, bgd.get_block_bitmap(), sp.get_blocks_per_group()),
				bgd.get_free_blocks_count() as u32
			);
			assert_eq!(
				count_free_bits(fs, bgd.get_inode_bitmap(), sp.get_inodes_per_group()),
				bgd.get_free_inodes_count() as u32
			);
		}
		assert_eq!(free_blocks, sp.get_free_blocks_count());
		assert_eq!(free_inodes, sp.get_free_inodes_count());
	}

	/// Checks that walking a directory block by record length lands exactly
	/// on the block's end.
	fn assert_dirent_walk(fs: &Ext2Fs, dir: &Arc<Ext2Node>) {
		let blk_size = fs.get_block_size() as usize;
		let sp = fs.superblock();
		let inode_ = Ext2INode::read(dir.get_inode(), fs).unwrap();

		let mut state = dir.state();
		for blk_off in 0..state.get_blocks_count() {
			let blk = state.resolve(&inode_, fs, blk_off).unwrap();
			let frame = fs.read_blk(blk).unwrap();
			let data = frame.data();

			let mut off = 0;
			while off < blk_size {
				let ent = Dirent::read(&data, off, &sp).unwrap();
				assert!(ent.rec_len > 0);
				off += ent.rec_len as usize;
			}
			assert_eq!(off, blk_size);
		}
	}

	#[test]
	fn probe_valid_magic() {
		let dev = Arc::new(RamDisk::new(256 * 1024));
		assert!(!Ext2Fs::probe(&*dev));
		format::format(dev.clone(), &FormatOptions::default()).unwrap();
		assert!(Ext2Fs::probe(&*dev));
	}

	#[test]
	fn mount_and_list_root() {
		let dev = Arc::new(RamDisk::new(256 * 1024));
		let fs = format::format(dev.clone(), &FormatOptions::default()).unwrap();
		let root = fs.get_root().unwrap();
		fs.create_node(&root, b"hello", 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		fs.sync().unwrap();
		drop(root);
		drop(fs);

		// Remount and list: the three names come back in insertion order
		let fs = Ext2Fs::mount(dev, false).unwrap();
		let root = fs.get_root().unwrap();
		let dir = Ext2Directory::new(&root).unwrap();
		let entries = dir.entries(&fs).unwrap();

		let names: Vec<&[u8]> = entries.iter().map(|c| c.name.as_slice()).collect();
		assert_eq!(names, [b".".as_slice(), b"..".as_slice(), b"hello".as_slice()]);
		assert_eq!(entries[0].inode, inode::ROOT_DIRECTORY_INODE);
		assert_eq!(entries[1].inode, inode::ROOT_DIRECTORY_INODE);
		assert_dirent_walk(&fs, &root);
	}

	#[test]
	fn create_write_read_back() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();

		let node = fs
			.create_node(&root, b"a", 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		assert_eq!(node.write(&fs, 0, b"abc").unwrap(), 3);

		let mut buff = [0u8; 4];
		let n = node.read(&fs, 0, &mut buff).unwrap();
		assert_eq!(n, 3);
		assert_eq!(&buff[..3], b"abc");

		let stat = fs.stat(&node).unwrap();
		assert_eq!(stat.size, 3);
		assert_eq!(stat.links, 1);
		assert_free_counts(&fs);
	}

	#[test]
	fn cross_indirect_write() {
		let fs = test_fs(1024 * 1024);
		let root = fs.get_root().unwrap();

		let node = fs
			.create_node(&root, b"big", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		// 20 KiB with 1 KiB blocks: 12 direct blocks, 8 singly indirect
		// entries, plus the index block itself
		let data = alloc::vec![0xa5u8; 20 * 1024];
		node.write(&fs, 0, &data).unwrap();

		let stat = fs.stat(&node).unwrap();
		assert_eq!(stat.blocks * 512 / 1024, 21);

		// Content comes back identical across the indirect boundary
		let mut buff = alloc::vec![0u8; 20 * 1024];
		assert_eq!(node.read(&fs, 0, &mut buff).unwrap(), 20 * 1024);
		assert_eq!(buff, data);

		// Truncating then writing one byte leaves a single block
		node.truncate(&fs).unwrap();
		node.write(&fs, 0, b"x").unwrap();
		let stat = fs.stat(&node).unwrap();
		assert_eq!(stat.blocks * 512 / 1024, 1);
		assert_eq!(stat.size, 1);
		assert_free_counts(&fs);
	}

	#[test]
	fn thirteenth_block_allocates_indirect() {
		let fs = test_fs(1024 * 1024);
		let root = fs.get_root().unwrap();
		let node = fs
			.create_node(&root, b"f", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		// Exactly 12 blocks: no index block yet
		let data = alloc::vec![1u8; 12 * 1024];
		node.write(&fs, 0, &data).unwrap();
		assert_eq!(fs.stat(&node).unwrap().blocks, 12 * 2);

		// The 13th block brings the singly indirect index block with it
		node.write(&fs, 12 * 1024, b"x").unwrap();
		assert_eq!(fs.stat(&node).unwrap().blocks, 14 * 2);

		let inode_ = Ext2INode::read(node.get_inode(), &fs).unwrap();
		assert_ne!(inode_.get_block(inode::INDIRECT_BLOCK), 0);
		assert_eq!(inode_.get_block(inode::BI_INDIRECT_BLOCK), 0);
	}

	#[test]
	fn bi_indirect_transition() {
		// 12 + 256 blocks of data plus metadata fit in a 2 MiB image
		let fs = test_fs(2 * 1024 * 1024);
		let root = fs.get_root().unwrap();
		let node = fs
			.create_node(&root, b"f", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		// Fill the direct and singly indirect tiers: 12 + 256 blocks
		let size = (12 + 256) * 1024;
		let data = alloc::vec![7u8; size];
		node.write(&fs, 0, &data).unwrap();
		{
			let inode_ = Ext2INode::read(node.get_inode(), &fs).unwrap();
			assert_eq!(inode_.get_block(inode::BI_INDIRECT_BLOCK), 0);
		}

		// One more block allocates the bi-indirect outer index block
		node.write(&fs, size as u64, b"y").unwrap();
		let inode_ = Ext2INode::read(node.get_inode(), &fs).unwrap();
		assert_ne!(inode_.get_block(inode::BI_INDIRECT_BLOCK), 0);

		// Data across all tiers reads back
		let mut buff = alloc::vec![0u8; size + 1];
		assert_eq!(node.read(&fs, 0, &mut buff).unwrap(), size + 1);
		assert_eq!(&buff[..size], &data[..]);
		assert_eq!(buff[size], b'y');
		assert_free_counts(&fs);
	}

	#[test]
	fn eof_gap_is_zero_filled() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();
		let node = fs
			.create_node(&root, b"gap", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		// Writing past EOF extends the file, zero-filling the gap
		node.write(&fs, 3000, b"end").unwrap();
		assert_eq!(node.get_size(), 3003);

		let mut buff = alloc::vec![0xffu8; 3000];
		assert_eq!(node.read(&fs, 0, &mut buff).unwrap(), 3000);
		assert!(buff.iter().all(|b| *b == 0));
	}

	#[test]
	fn hardlink_count() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();

		let a = fs
			.create_node(&root, b"a", 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		let a_inode = a.get_inode();
		let b = fs
			.create_node(&root, b"b", 0, 0, 0, NewNode::Link(&a))
			.unwrap();
		assert_eq!(b.get_inode(), a_inode);
		assert_eq!(fs.stat(&a).unwrap().links, 2);

		fs.remove_node(&root, b"a", false).unwrap();
		let b = fs.node(a_inode).unwrap();
		let stat = fs.stat(&b).unwrap();
		assert_eq!(stat.links, 1);
		assert_eq!(stat.inode, a_inode);
		assert_free_counts(&fs);
	}

	#[test]
	fn create_unlink_restores_free_counts() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();

		let sp = fs.superblock();
		let (free_blocks, free_inodes) =
			(sp.get_free_blocks_count(), sp.get_free_inodes_count());

		let node = fs
			.create_node(&root, b"tmp", 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		node.write(&fs, 0, &alloc::vec![1u8; 4096]).unwrap();
		fs.remove_node(&root, b"tmp", false).unwrap();

		let sp = fs.superblock();
		assert_eq!(sp.get_free_blocks_count(), free_blocks);
		assert_eq!(sp.get_free_inodes_count(), free_inodes);
		assert_free_counts(&fs);
	}

	#[test]
	fn mkdir_rmdir_used_dirs() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();

		let used = bgd::BlockGroupDescriptor::read(0, &fs)
			.unwrap()
			.get_used_dirs_count();

		fs.create_node(&root, b"d", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		assert_eq!(
			bgd::BlockGroupDescriptor::read(0, &fs)
				.unwrap()
				.get_used_dirs_count(),
			used + 1
		);

		fs.remove_node(&root, b"d", true).unwrap();
		assert_eq!(
			bgd::BlockGroupDescriptor::read(0, &fs)
				.unwrap()
				.get_used_dirs_count(),
			used
		);
		// Root's links count is back to its original value
		assert_eq!(fs.stat(&root).unwrap().links, 2);
		assert_free_counts(&fs);
	}

	#[test]
	fn rmdir_non_empty_rejected() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();

		let dir = fs
			.create_node(&root, b"d", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		fs.create_node(&dir, b"f", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		assert_eq!(
			fs.remove_node(&root, b"d", true).unwrap_err().as_int(),
			errno::ENOTEMPTY
		);
		fs.remove_node(&dir, b"f", false).unwrap();
		fs.remove_node(&root, b"d", true).unwrap();
	}

	#[test]
	fn symlink_inline_and_long() {
		let fs = test_fs(256 * 1024);
		let root = fs.get_root().unwrap();

		// A short target is stored inline in the block pointer array
		let short = fs
			.create_node(&root, b"s", 0o777, 0, 0, NewNode::Symlink(b"target"))
			.unwrap();
		assert_eq!(fs.readlink(&short).unwrap(), b"target");
		assert_eq!(fs.stat(&short).unwrap().blocks, 0);

		// A long target goes through the normal write path
		let target = alloc::vec![b'x'; 100];
		let long = fs
			.create_node(&root, b"l", 0o777, 0, 0, NewNode::Symlink(&target))
			.unwrap();
		assert_eq!(fs.readlink(&long).unwrap(), target);
		assert!(fs.stat(&long).unwrap().blocks > 0);
	}

	#[test]
	fn dirent_slack_donation() {
		let fs = test_fs(1024 * 1024);
		let root = fs.get_root().unwrap();
		let dir = fs
			.create_node(&root, b"d", 0o755, 0, 0, NewNode::Directory)
			.unwrap();

		// Fill entries until the directory grows a second block, then check
		// the walker invariant holds throughout
		for i in 0..100u32 {
			let name = alloc::format!("file{i:03}");
			fs.create_node(&dir, name.as_bytes(), 0o644, 0, 0, NewNode::Regular)
				.unwrap();
			assert_dirent_walk(&fs, &dir);
		}

		let view = Ext2Directory::new(&dir).unwrap();
		assert_eq!(view.entries(&fs).unwrap().len(), 102);

		// Remove from the middle: the record is folded into its predecessor
		fs.remove_node(&dir, b"file050", false).unwrap();
		assert_dirent_walk(&fs, &dir);
		assert!(view.lookup(&fs, b"file050").unwrap().is_none());

		// The freed slack is reused
		fs.create_node(&dir, b"file200", 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		assert_dirent_walk(&fs, &dir);
	}

	#[test]
	fn dirent_exact_slack_boundary() {
		let fs = test_fs(1024 * 1024);
		let root = fs.get_root().unwrap();

		// With 1 KiB blocks, `.` and `..` use 24 bytes; sixty 7-byte names
		// (16-byte records each) leave exactly 40 bytes of slack
		let dir = fs
			.create_node(&root, b"exact", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		for i in 0..60u32 {
			let name = alloc::format!("file{i:03}");
			fs.create_node(&dir, name.as_bytes(), 0o644, 0, 0, NewNode::Regular)
				.unwrap();
		}
		assert_eq!(fs.stat(&dir).unwrap().blocks * 512 / 1024, 1);

		// A 32-byte name needs exactly the 40 remaining bytes: same block
		let name = [b'a'; 32];
		fs.create_node(&dir, &name, 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		assert_eq!(fs.stat(&dir).unwrap().blocks * 512 / 1024, 1);
		assert_dirent_walk(&fs, &dir);

		// The same fill with one alignment step more does not fit: a fresh
		// block is allocated
		let dir = fs
			.create_node(&root, b"spill", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		for i in 0..60u32 {
			let name = alloc::format!("file{i:03}");
			fs.create_node(&dir, name.as_bytes(), 0o644, 0, 0, NewNode::Regular)
				.unwrap();
		}
		let name = [b'b'; 33];
		fs.create_node(&dir, &name, 0o644, 0, 0, NewNode::Regular)
			.unwrap();
		assert_eq!(fs.stat(&dir).unwrap().blocks * 512 / 1024, 2);
		assert_dirent_walk(&fs, &dir);
	}

	#[test]
	fn rename_moves_and_updates_dotdot() {
		let fs = test_fs(512 * 1024);
		let root = fs.get_root().unwrap();
		let a = fs
			.create_node(&root, b"a", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		let b = fs
			.create_node(&root, b"b", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		let d = fs
			.create_node(&a, b"d", 0o755, 0, 0, NewNode::Directory)
			.unwrap();
		fs.create_node(&d, b"f", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		fs.rename(&a, b"d", &b, b"e").unwrap();

		let b_view = Ext2Directory::new(&b).unwrap();
		let moved = b_view.lookup(&fs, b"e").unwrap().unwrap();
		assert_eq!(moved.inode, d.get_inode());

		// `..` of the moved directory points to its new parent
		let d_view = Ext2Directory::new(&d).unwrap();
		let dotdot = d_view.lookup(&fs, b"..").unwrap().unwrap();
		assert_eq!(dotdot.inode, b.get_inode());

		let a_view = Ext2Directory::new(&a).unwrap();
		assert!(a_view.lookup(&fs, b"d").unwrap().is_none());
		assert_free_counts(&fs);
	}

	#[test]
	fn revision0_namelen_convention() {
		let dev = Arc::new(RamDisk::new(256 * 1024));
		let opts = FormatOptions {
			revision: 0,
			directory_type: false,
			..Default::default()
		};
		let fs = format::format(dev, &opts).unwrap();
		let root = fs.get_root().unwrap();

		fs.create_node(&root, b"oldstyle", 0o644, 0, 0, NewNode::Regular)
			.unwrap();

		// Without the directory-type feature, the child's type is read from
		// its inode
		let dir = Ext2Directory::new(&root).unwrap();
		let child = dir.lookup(&fs, b"oldstyle").unwrap().unwrap();
		assert_eq!(child.file_type, FileType::Regular);
		assert_dirent_walk(&fs, &root);
	}

	#[test]
	fn write_survives_remount() {
		let dev = Arc::new(RamDisk::new(256 * 1024));
		let fs = format::format(dev.clone(), &FormatOptions::default()).unwrap();
		{
			let root = fs.get_root().unwrap();
			let node = fs
				.create_node(&root, b"persist", 0o644, 0, 0, NewNode::Regular)
				.unwrap();
			node.write(&fs, 0, b"data").unwrap();
			fs.sync().unwrap();
		}
		drop(fs);

		let fs = Ext2Fs::mount(dev, false).unwrap();
		let root = fs.get_root().unwrap();
		let dir = Ext2Directory::new(&root).unwrap();
		let child = dir.lookup(&fs, b"persist").unwrap().unwrap();
		let node = fs.node(child.inode).unwrap();

		let mut buff = [0u8; 4];
		assert_eq!(node.read(&fs, 0, &mut buff).unwrap(), 4);
		assert_eq!(&buff, b"data");
		assert_free_counts(&fs);
	}
}
