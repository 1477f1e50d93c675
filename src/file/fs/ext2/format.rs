//! Creation of a fresh ext2 filesystem on a device.
//!
//! This is the in-kernel counterpart of the `mkfs.ext2` tool, used to
//! initialise RAM disks and blank devices.

use crate::errno;
use crate::errno::EResult;
use crate::file::fs::ext2::bgd::BlockGroupDescriptor;
use crate::file::fs::ext2::inode;
use crate::file::fs::ext2::inode::Ext2INode;
use crate::file::fs::ext2::write_obj;
use crate::file::fs::ext2::Ext2Directory;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::fs::ext2::Superblock;
use crate::file::fs::ext2::EXT2_MAGIC;
use crate::file::fs::ext2::FS_STATE_CLEAN;
use crate::file::fs::ext2::REQUIRED_FEATURE_DIRECTORY_TYPE;
use crate::file::FileType;
use crate::time;
use crate::util::io::IO;
use crate::util::math;
use alloc::sync::Arc;
use alloc::vec;
use bytemuck::Zeroable;
use core::mem::size_of;

/// Options for the creation of an ext2 filesystem.
pub struct FormatOptions {
	/// The size of a block in bytes.
	pub block_size: u32,
	/// The number of blocks per block group.
	pub blocks_per_group: u32,
	/// The number of inodes per block group.
	pub inodes_per_group: u32,
	/// The revision level.
	pub revision: u32,
	/// Tells whether directory entries carry the type of their target.
	pub directory_type: bool,
	/// The volume name.
	pub volume_name: [u8; 16],
}

impl Default for FormatOptions {
	fn default() -> Self {
		Self {
			block_size: 1024,
			blocks_per_group: 8192,
			inodes_per_group: 128,
			revision: 1,
			directory_type: true,
			volume_name: [0; 16],
		}
	}
}

/// Creates an ext2 filesystem on the given device and mounts it.
pub fn format(dev: Arc<dyn IO>, opts: &FormatOptions) -> EResult<Arc<Ext2Fs>> {
	let bs = opts.block_size;
	if !bs.is_power_of_two() || !(1024..=4096).contains(&bs) {
		return Err(errno!(EINVAL));
	}
	if opts.inodes_per_group % 8 != 0 || opts.blocks_per_group % 8 != 0 {
		return Err(errno!(EINVAL));
	}

	let inode_size = size_of::<Ext2INode>() as u32;
	let first_data_block: u32 = if bs == 1024 { 1 } else { 0 };
	let total_blocks = (dev.get_size() / bs as u64) as u32;
	let groups = math::ceil_div(
		(total_blocks - first_data_block) as u64,
		opts.blocks_per_group as u64,
	) as u32;
	if groups == 0 {
		return Err(errno!(EINVAL));
	}

	let bgdt_blocks = math::ceil_div(
		groups as u64 * size_of::<BlockGroupDescriptor>() as u64,
		bs as u64,
	) as u32;
	let table_blocks = math::ceil_div(
		opts.inodes_per_group as u64 * inode_size as u64,
		bs as u64,
	) as u32;

	let ts = time::get();
	let first_ino = 11;
	let mut total_free_blocks = 0u32;
	let mut total_free_inodes = 0u32;

	// Lay out and write each group's metadata
	for g in 0..groups {
		let base = first_data_block + g * opts.blocks_per_group;
		// Group 0 also holds the superblock and the BGDT
		let meta = if g == 0 {
			base + 1 + bgdt_blocks
		} else {
			base
		};
		let block_bitmap = meta;
		let inode_bitmap = meta + 1;
		let inode_table = meta + 2;
		let first_free = inode_table + table_blocks;

		let group_end = base + opts.blocks_per_group;
		if first_free >= total_blocks.min(group_end) {
			return Err(errno!(EINVAL));
		}

		// Metadata blocks, and bits beyond the device's end, are used
		let meta_used = first_free - base;
		let tail = group_end.saturating_sub(total_blocks);
		let free_blocks = opts.blocks_per_group - meta_used - tail;

		// Block bitmap
		let mut bitmap = vec![0u8; bs as usize];
		for i in 0..meta_used {
			bitmap[(i / 8) as usize] |= 1 << (i % 8);
		}
		for i in (opts.blocks_per_group - tail)..opts.blocks_per_group {
			bitmap[(i / 8) as usize] |= 1 << (i % 8);
		}
		dev.write(block_bitmap as u64 * bs as u64, &bitmap)?;

		// Inode bitmap: group 0 has the reserved inodes
		let mut bitmap = vec![0u8; bs as usize];
		let reserved = if g == 0 {
			first_ino - 1
		} else {
			0
		};
		for i in 0..reserved {
			bitmap[(i / 8) as usize] |= 1 << (i % 8);
		}
		// Bits beyond the inode count do not exist
		for i in opts.inodes_per_group..(bs * 8) {
			bitmap[(i / 8) as usize] |= 1 << (i % 8);
		}
		dev.write(inode_bitmap as u64 * bs as u64, &bitmap)?;

		// Inode table
		let zero = vec![0u8; bs as usize];
		for i in 0..table_blocks {
			dev.write((inode_table + i) as u64 * bs as u64, &zero)?;
		}

		let free_inodes = opts.inodes_per_group - reserved;
		total_free_blocks += free_blocks;
		total_free_inodes += free_inodes;

		let mut bgd = BlockGroupDescriptor::zeroed();
		bgd.set_free_blocks_count(free_blocks as u16);
		bgd.set_free_inodes_count(free_inodes as u16);
		bgd.set_used_dirs_count(if g == 0 {
			1
		} else {
			0
		});
		write_raw_bgd(&*dev, &bgd, g, first_data_block, bs, block_bitmap, inode_bitmap, inode_table)?;
	}

	// The superblock
	let mut sp = Superblock::zeroed();
	sp.s_inodes_count = (groups * opts.inodes_per_group).to_le();
	sp.s_blocks_count = total_blocks.to_le();
	sp.s_free_blocks_count = total_free_blocks.to_le();
	sp.s_free_inodes_count = total_free_inodes.to_le();
	sp.s_first_data_block = first_data_block.to_le();
	sp.s_log_block_size = (math::log2(bs as u64) - 10).to_le();
	sp.s_log_frag_size = sp.s_log_block_size;
	sp.s_blocks_per_group = opts.blocks_per_group.to_le();
	sp.s_frags_per_group = opts.blocks_per_group.to_le();
	sp.s_inodes_per_group = opts.inodes_per_group.to_le();
	sp.s_mtime = ts.to_le();
	sp.s_wtime = ts.to_le();
	sp.s_max_mnt_count = u16::MAX.to_le();
	sp.s_magic = EXT2_MAGIC.to_le();
	sp.s_state = FS_STATE_CLEAN.to_le();
	sp.s_rev_level = opts.revision.to_le();
	if opts.revision >= 1 {
		sp.s_first_ino = first_ino.to_le();
		sp.s_inode_size = (inode_size as u16).to_le();
		if opts.directory_type {
			sp.s_feature_incompat = REQUIRED_FEATURE_DIRECTORY_TYPE.to_le();
		}
	}
	sp.s_volume_name = opts.volume_name;
	sp.write(&*dev)?;

	// The root directory's inode
	let mut root = Ext2INode::zeroed();
	root.set_mode(inode::INODE_TYPE_DIRECTORY | 0o755);
	root.set_atime(ts);
	root.set_ctime(ts);
	root.set_mtime(ts);
	let root_off = root_inode_offset(&sp, bgdt_blocks, bs);
	write_obj(&root, &*dev, root_off)?;

	// Mount and populate the root directory
	let fs = Ext2Fs::mount(dev, false)?;
	let node = fs.get_root()?;
	let root_dir = Ext2Directory::new(&node)?;
	root_dir.add_entry(&fs, b".", inode::ROOT_DIRECTORY_INODE, FileType::Directory)?;
	root_dir.add_entry(&fs, b"..", inode::ROOT_DIRECTORY_INODE, FileType::Directory)?;
	fs.sync()?;
	Ok(fs)
}

/// Writes the group descriptor `bgd` of the group `g` directly to the
/// device, before the filesystem is mounted.
#[allow(clippy::too_many_arguments)]
fn write_raw_bgd(
	dev: &dyn IO,
	bgd: &BlockGroupDescriptor,
	g: u32,
	first_data_block: u32,
	bs: u32,
	block_bitmap: u32,
	inode_bitmap: u32,
	inode_table: u32,
) -> EResult<()> {
	let mut bgd = *bgd;
	bgd.set_block_bitmap(block_bitmap);
	bgd.set_inode_bitmap(inode_bitmap);
	bgd.set_inode_table(inode_table);

	let bgdt_off = (first_data_block + 1) as u64 * bs as u64;
	let off = bgdt_off + g as u64 * size_of::<BlockGroupDescriptor>() as u64;
	write_obj(&bgd, dev, off)
}

/// Returns the byte offset of the root directory's inode.
fn root_inode_offset(sp: &Superblock, bgdt_blocks: u32, bs: u32) -> u64 {
	// Group 0 layout: superblock, BGDT, block bitmap, inode bitmap, table
	let inode_table = sp.get_first_data_block() + 1 + bgdt_blocks + 2;
	let index = (inode::ROOT_DIRECTORY_INODE - 1) as u64;
	inode_table as u64 * bs as u64 + index * sp.get_inode_size() as u64
}
