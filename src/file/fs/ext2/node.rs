//! An ext2 node gives access to the content of one inode: block resolution
//! through the direct and indirect pointers, reads, writes, extension and
//! truncation.
//!
//! The node keeps a lazily-populated array mapping each logical block index
//! of the inode to its filesystem block number, so that indirect blocks are
//! only walked once.

use crate::errno;
use crate::errno::EResult;
use crate::file::fs::ext2::inode::Ext2INode;
use crate::file::fs::ext2::inode::BI_INDIRECT_BLOCK;
use crate::file::fs::ext2::inode::DIRECT_BLOCKS_COUNT;
use crate::file::fs::ext2::inode::INDIRECT_BLOCK;
use crate::file::fs::ext2::inode::SECTOR_SIZE;
use crate::file::fs::ext2::inode::TRI_INDIRECT_BLOCK;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::FileType;
use crate::file::Gid;
use crate::file::Mode;
use crate::file::Uid;
use crate::time;
use crate::util::lock::Mutex;
use crate::util::lock::MutexGuard;
use crate::util::math;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::min;
use core::mem::size_of;

/// Sentinel marking a logical block whose backing pointer has not been
/// resolved yet.
const BLK_UNRESOLVED: u32 = u32::MAX;

/// A cached directory child, as found while walking the directory's entries.
#[derive(Clone, Debug)]
pub struct DirChild {
	/// The entry's name.
	pub name: Vec<u8>,
	/// The child's inode.
	pub inode: u32,
	/// The child's file type.
	pub file_type: FileType,
}

/// The mutable part of an [`Ext2Node`].
pub(super) struct NodeState {
	/// Map from logical block indexes to filesystem block numbers.
	///
	/// [`BLK_UNRESOLVED`] marks an index which has not been resolved yet.
	/// Zero marks a hole.
	blocks: Vec<u32>,
	/// The size of the node's content in bytes.
	size: u64,

	/// The node's permissions.
	pub perms: Mode,
	/// The node's owner user ID.
	pub uid: Uid,
	/// The node's owner group ID.
	pub gid: Gid,

	/// For directories: the cached children, in on-disk order. `None` until
	/// populated.
	pub children: Option<Vec<DirChild>>,
}

/// A handle on an inode, owned by the filesystem's node arena.
pub struct Ext2Node {
	/// The inode's number.
	inode: u32,
	/// The node's file type.
	file_type: FileType,

	/// The node's mutable state.
	state: Mutex<NodeState>,
}

impl Ext2Node {
	/// Loads the node for inode `inode` from the filesystem.
	pub fn load(inode: u32, fs: &Ext2Fs) -> EResult<Self> {
		let inode_ = Ext2INode::read(inode, fs)?;
		let blk_size = fs.get_block_size();

		let size = inode_.get_size();
		let symlink_inline = inode_.get_sectors_count() == 0 && size > 0;
		let blk_count = if symlink_inline {
			0
		} else {
			math::ceil_div(size, blk_size as u64) as usize
		};

		let mut blocks = vec![BLK_UNRESOLVED; blk_count];
		for i in 0..min(DIRECT_BLOCKS_COUNT as usize, blk_count) {
			blocks[i] = inode_.get_block(i);
		}

		Ok(Self {
			inode,
			file_type: inode_.get_type(),

			state: Mutex::new(NodeState {
				blocks,
				size,

				perms: inode_.get_permissions(),
				uid: inode_.get_uid(),
				gid: inode_.get_gid(),

				children: None,
			}),
		})
	}

	/// Returns the inode's number.
	pub fn get_inode(&self) -> u32 {
		self.inode
	}

	/// Returns the node's file type.
	pub fn get_type(&self) -> FileType {
		self.file_type
	}

	/// Returns the size of the node's content in bytes.
	pub fn get_size(&self) -> u64 {
		self.state.lock().size
	}

	/// Returns the node's owner user ID, owner group ID and permissions.
	pub fn access_info(&self) -> (Uid, Gid, Mode) {
		let state = self.state.lock();
		(state.uid, state.gid, state.perms)
	}

	/// Locks and returns the node's state.
	pub(super) fn state(&self) -> MutexGuard<'_, NodeState> {
		self.state.lock()
	}

	/// Reads the node's content.
	///
	/// Arguments:
	/// - `off` is the offset at which the content is read.
	/// - `buff` is the buffer in which the data is written.
	///
	/// The read is clamped to the size of the content. The function returns
	/// the number of bytes read.
	pub fn read(&self, fs: &Ext2Fs, off: u64, buff: &mut [u8]) -> EResult<usize> {
		let mut state = self.state.lock();
		let inode_ = Ext2INode::read(self.inode, fs)?;
		if inode_.is_compressed() {
			return Err(errno!(EIO));
		}

		if off >= state.size {
			return Ok(0);
		}
		let len = min(buff.len() as u64, state.size - off) as usize;

		// Symlinks short enough have their target stored in the block pointer
		// array itself
		if inode_.get_sectors_count() == 0 && state.size > 0 {
			let inline = inode_.get_inline_bytes();
			buff[..len].copy_from_slice(&inline[off as usize..off as usize + len]);
			return Ok(len);
		}

		let blk_size = fs.get_block_size() as u64;
		let mut i = 0;
		while i < len {
			let pos = off + i as u64;
			let blk_off = (pos / blk_size) as u32;
			let inner_off = (pos % blk_size) as usize;
			let chunk = min(len - i, blk_size as usize - inner_off);

			let blk = state.resolve(&inode_, fs, blk_off)?;
			// A zero block number designates a hole: the sparse zero block is
			// returned for it
			let frame = fs.read_blk(blk)?;
			let data = frame.data();
			buff[i..i + chunk].copy_from_slice(&data[inner_off..inner_off + chunk]);

			i += chunk;
		}

		Ok(len)
	}

	/// Writes the node's content.
	///
	/// Arguments:
	/// - `off` is the offset at which the content is written.
	/// - `buff` is the buffer containing the data to write.
	///
	/// If the content is not large enough, it is extended, the gap being
	/// zero-filled. The function returns the number of bytes written.
	pub fn write(&self, fs: &Ext2Fs, off: u64, buff: &[u8]) -> EResult<usize> {
		let mut state = self.state.lock();
		let mut inode_ = Ext2INode::read(self.inode, fs)?;
		if inode_.is_compressed() {
			return Err(errno!(EIO));
		}

		state.ensure_large_enough(self.inode, &mut inode_, fs, off + buff.len() as u64)?;

		let blk_size = fs.get_block_size() as u64;
		let mut i = 0;
		while i < buff.len() {
			let pos = off + i as u64;
			let blk_off = (pos / blk_size) as u32;
			let inner_off = (pos % blk_size) as usize;
			let chunk = min(buff.len() - i, blk_size as usize - inner_off);

			let blk = state.resolve(&inode_, fs, blk_off)?;
			if blk == 0 {
				// A hole in a foreign image cannot be filled in place
				log!("ext2: write into a sparse region of inode {}", self.inode);
				return Err(errno!(EIO));
			}
			let frame = fs.read_blk(blk)?;
			{
				let mut data = frame.data();
				data[inner_off..inner_off + chunk].copy_from_slice(&buff[i..i + chunk]);
				frame.mark_dirty();
			}
			fs.write_blk(blk)?;

			i += chunk;
		}

		inode_.set_mtime(time::get());
		inode_.write(self.inode, fs)?;
		Ok(buff.len())
	}

	/// Releases every block of the node's content and resets its size to
	/// zero.
	pub fn truncate(&self, fs: &Ext2Fs) -> EResult<()> {
		let mut state = self.state.lock();
		let mut inode_ = Ext2INode::read(self.inode, fs)?;

		// Symlinks short enough hold their target in the block pointer array:
		// there is no block to release
		if inode_.get_sectors_count() > 0 {
			// Release data blocks
			for i in 0..state.blocks.len() {
				let blk = state.resolve(&inode_, fs, i as u32)?;
				if blk != 0 {
					fs.free_block(blk)?;
				}
			}
			// Release the indirection blocks themselves
			free_index_tree(fs, inode_.get_block(INDIRECT_BLOCK), 0)?;
			free_index_tree(fs, inode_.get_block(BI_INDIRECT_BLOCK), 1)?;
			free_index_tree(fs, inode_.get_block(TRI_INDIRECT_BLOCK), 2)?;
		}

		state.blocks.clear();
		state.size = 0;

		inode_.clear_blocks();
		inode_.set_sectors_count(0);
		inode_.set_size(0);
		let ts = time::get();
		inode_.set_mtime(ts);
		inode_.set_ctime(ts);
		inode_.write(self.inode, fs)
	}

	/// Updates the node's owner and permissions.
	///
	/// High mode bits which are not part of the 9 permission bits are
	/// preserved.
	pub fn set_metadata(&self, fs: &Ext2Fs, uid: Uid, gid: Gid, perms: Mode) -> EResult<()> {
		let mut state = self.state.lock();
		let mut inode_ = Ext2INode::read(self.inode, fs)?;

		inode_.set_uid(uid);
		inode_.set_gid(gid);
		inode_.set_permissions(perms);
		inode_.set_ctime(time::get());
		inode_.write(self.inode, fs)?;

		state.uid = uid;
		state.gid = gid;
		state.perms = perms;
		Ok(())
	}
}

impl NodeState {
	/// Returns the number of content blocks currently tracked by the node.
	pub fn get_blocks_count(&self) -> u32 {
		self.blocks.len() as u32
	}

	/// Returns the size of the node's content in bytes.
	pub fn get_size(&self) -> u64 {
		self.size
	}

	/// Returns the filesystem block number backing the logical block `n`,
	/// resolving indirections on demand.
	///
	/// Resolved numbers are cached in the logical-to-physical array. A zero
	/// return designates a hole.
	pub fn resolve(&mut self, inode_: &Ext2INode, fs: &Ext2Fs, n: u32) -> EResult<u32> {
		let n = n as usize;
		if n >= self.blocks.len() {
			panic!("ext2: logical block index {n} exceeds tracked count (inode content resolution)");
		}
		if self.blocks[n] != BLK_UNRESOLVED {
			return Ok(self.blocks[n]);
		}

		let per_blk = (fs.get_block_size() / size_of::<u32>() as u32) as usize;
		let direct = DIRECT_BLOCKS_COUNT as usize;

		if n < direct {
			self.blocks[n] = inode_.get_block(n);
		} else if n < direct + per_blk {
			let table = inode_.get_block(INDIRECT_BLOCK);
			self.fill_from_table(fs, table, direct)?;
		} else if n < direct + per_blk + per_blk * per_blk {
			let off = n - direct - per_blk;
			let outer = off / per_blk;
			let inner_table = read_table_entry(fs, inode_.get_block(BI_INDIRECT_BLOCK), outer)?;
			self.fill_from_table(fs, inner_table, direct + per_blk + outer * per_blk)?;
		} else {
			let off = n - direct - per_blk - per_blk * per_blk;
			let o1 = off / (per_blk * per_blk);
			let o2 = (off / per_blk) % per_blk;
			let mid_table = read_table_entry(fs, inode_.get_block(TRI_INDIRECT_BLOCK), o1)?;
			let inner_table = read_table_entry(fs, mid_table, o2)?;
			let base = direct + per_blk + per_blk * per_blk + o1 * per_blk * per_blk + o2 * per_blk;
			self.fill_from_table(fs, inner_table, base)?;
		}

		Ok(self.blocks[n])
	}

	/// Fills the logical-to-physical array from the index block `table`,
	/// starting at logical index `start`.
	///
	/// A zero `table` marks the whole range as holes.
	fn fill_from_table(&mut self, fs: &Ext2Fs, table: u32, start: usize) -> EResult<()> {
		let per_blk = (fs.get_block_size() / size_of::<u32>() as u32) as usize;
		let end = min(start + per_blk, self.blocks.len());

		if table == 0 {
			for b in &mut self.blocks[start..end] {
				*b = 0;
			}
			return Ok(());
		}

		let frame = fs.read_blk(table)?;
		let data = frame.data();
		for i in start..end {
			let off = (i - start) * size_of::<u32>();
			let raw: u32 = bytemuck::pod_read_unaligned(&data[off..off + size_of::<u32>()]);
			self.blocks[i] = u32::from_le(raw);
		}
		Ok(())
	}

	/// Grows the content until it can hold at least `size` bytes, allocating
	/// and zeroing fresh blocks.
	///
	/// The inode's size is updated if `size` grows it. The inode is not
	/// written back; this is the caller's responsibility.
	pub fn ensure_large_enough(
		&mut self,
		inode: u32,
		inode_: &mut Ext2INode,
		fs: &Ext2Fs,
		size: u64,
	) -> EResult<()> {
		let blk_size = fs.get_block_size() as u64;

		while size > self.blocks.len() as u64 * blk_size {
			let blk = fs.alloc_block(inode)?;
			self.add_block(inode, inode_, fs, blk)?;
			fs.zero_blk(blk)?;
		}

		if size > self.size {
			self.size = size;
			inode_.set_size(size);
		}
		Ok(())
	}

	/// Appends the block `blk_value` to the node's content, updating the
	/// block pointers.
	///
	/// Transitions into the indirect and bi-indirect tiers allocate and zero
	/// the needed index blocks. The tri-indirect tier is not implemented for
	/// writes and fails with `ENOSYS`.
	pub fn add_block(
		&mut self,
		inode: u32,
		inode_: &mut Ext2INode,
		fs: &Ext2Fs,
		blk_value: u32,
	) -> EResult<()> {
		let per_blk = (fs.get_block_size() / size_of::<u32>() as u32) as usize;
		let direct = DIRECT_BLOCKS_COUNT as usize;
		let sectors_per_blk = fs.get_block_size() / SECTOR_SIZE;
		let n = self.blocks.len();

		if n < direct {
			inode_.set_block(n, blk_value);
		} else if n < direct + per_blk {
			if n == direct {
				let table = alloc_index_block(inode, inode_, fs, sectors_per_blk)?;
				inode_.set_block(INDIRECT_BLOCK, table);
			}
			write_table_entry(fs, inode_.get_block(INDIRECT_BLOCK), n - direct, blk_value)?;
		} else if n < direct + per_blk + per_blk * per_blk {
			let bi_off = n - direct - per_blk;
			let outer = bi_off / per_blk;
			let inner = bi_off % per_blk;

			if bi_off == 0 {
				let table = alloc_index_block(inode, inode_, fs, sectors_per_blk)?;
				inode_.set_block(BI_INDIRECT_BLOCK, table);
			}
			let outer_table = inode_.get_block(BI_INDIRECT_BLOCK);
			if inner == 0 {
				let table = alloc_index_block(inode, inode_, fs, sectors_per_blk)?;
				write_table_entry(fs, outer_table, outer, table)?;
			}
			let inner_table = read_table_entry(fs, outer_table, outer)?;
			write_table_entry(fs, inner_table, inner, blk_value)?;
		} else {
			return Err(errno!(ENOSYS));
		}

		self.blocks.push(blk_value);
		inode_.set_sectors_count(inode_.get_sectors_count() + sectors_per_blk);
		Ok(())
	}
}

/// Allocates and zeroes an index block, and accounts for it in the inode's
/// sector count.
fn alloc_index_block(
	inode: u32,
	inode_: &mut Ext2INode,
	fs: &Ext2Fs,
	sectors_per_blk: u32,
) -> EResult<u32> {
	let blk = fs.alloc_block(inode)?;
	fs.zero_blk(blk)?;
	inode_.set_sectors_count(inode_.get_sectors_count() + sectors_per_blk);
	Ok(blk)
}

/// Reads the `i`th entry of the index block `table`.
///
/// A zero `table` yields a zero entry.
fn read_table_entry(fs: &Ext2Fs, table: u32, i: usize) -> EResult<u32> {
	if table == 0 {
		return Ok(0);
	}
	let frame = fs.read_blk(table)?;
	let data = frame.data();
	let off = i * size_of::<u32>();
	let raw: u32 = bytemuck::pod_read_unaligned(&data[off..off + size_of::<u32>()]);
	Ok(u32::from_le(raw))
}

/// Writes `value` into the `i`th entry of the index block `table`.
fn write_table_entry(fs: &Ext2Fs, table: u32, i: usize, value: u32) -> EResult<()> {
	let frame = fs.read_blk(table)?;
	{
		let mut data = frame.data();
		let off = i * size_of::<u32>();
		data[off..off + size_of::<u32>()].copy_from_slice(&value.to_le_bytes());
		frame.mark_dirty();
	}
	fs.write_blk(table)
}

/// Releases the index block `table` and, for `depth > 0`, every index block
/// it points to.
fn free_index_tree(fs: &Ext2Fs, table: u32, depth: u8) -> EResult<()> {
	if table == 0 {
		return Ok(());
	}

	if depth > 0 {
		let per_blk = (fs.get_block_size() / size_of::<u32>() as u32) as usize;
		for i in 0..per_blk {
			let sub = read_table_entry(fs, table, i)?;
			free_index_tree(fs, sub, depth - 1)?;
		}
	}
	fs.free_block(table)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::ram::RamDisk;
	use crate::file::fs::ext2;
	use alloc::sync::Arc;
	use bytemuck::Zeroable;

	#[test]
	fn tri_indirect_write_unimplemented() {
		let dev = Arc::new(RamDisk::new(512 * 1024));
		let fs = ext2::format(dev, &Default::default()).unwrap();

		// A node whose content already fills the direct, indirect and
		// bi-indirect tiers: the next block would need the tri-indirect one
		let per_blk = (fs.get_block_size() / size_of::<u32>() as u32) as usize;
		let full = 12 + per_blk + per_blk * per_blk;
		let mut state = NodeState {
			blocks: vec![1; full],
			size: full as u64 * fs.get_block_size() as u64,
			perms: 0o644,
			uid: 0,
			gid: 0,
			children: None,
		};

		let mut inode_ = Ext2INode::zeroed();
		let res = state.add_block(12, &mut inode_, &fs, 4242);
		assert_eq!(res.unwrap_err().as_int(), errno::ENOSYS);
		// Nothing was appended
		assert_eq!(state.get_blocks_count() as usize, full);
	}
}
