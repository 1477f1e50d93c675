//! An ext2 directory is a node whose content is a list of variable-length
//! entries, each naming a child inode.
//!
//! The directory keeps a cache of its children, populated lazily by walking
//! the entries once.

use crate::errno;
use crate::errno::EResult;
use crate::file::fs::ext2::dirent;
use crate::file::fs::ext2::dirent::Dirent;
use crate::file::fs::ext2::inode::Ext2INode;
use crate::file::fs::ext2::node::DirChild;
use crate::file::fs::ext2::node::Ext2Node;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::FileType;
use crate::time;
use alloc::vec::Vec;

/// A view of an [`Ext2Node`] as a directory.
pub struct Ext2Directory<'n> {
	/// The underlying node.
	pub node: &'n Ext2Node,
}

impl<'n> Ext2Directory<'n> {
	/// Creates a view of the given node as a directory.
	///
	/// If the node is not a directory, the function fails with `ENOTDIR`.
	pub fn new(node: &'n Ext2Node) -> EResult<Self> {
		if node.get_type() != FileType::Directory {
			return Err(errno!(ENOTDIR));
		}
		Ok(Self {
			node,
		})
	}

	/// Populates the children cache if it has not been populated yet.
	fn populate(&self, fs: &Ext2Fs) -> EResult<()> {
		let mut state = self.node.state();
		if state.children.is_some() {
			return Ok(());
		}

		let inode_ = Ext2INode::read(self.node.get_inode(), fs)?;
		let blk_size = fs.get_block_size() as usize;
		let sp = fs.superblock();

		let mut children = Vec::new();
		'blocks: for blk_off in 0..state.get_blocks_count() {
			let blk = state.resolve(&inode_, fs, blk_off)?;
			let frame = fs.read_blk(blk)?;
			let data = frame.data();

			let mut off = 0;
			while off + dirent::NAME_OFF <= blk_size {
				let ent = Dirent::read(&data, off, &sp)?;
				if ent.rec_len == 0 {
					// End of the directory's entries
					break 'blocks;
				}
				if ent.is_free() {
					// Tombstone: step over it
					off += ent.rec_len as usize;
					continue;
				}

				let name = ent.name(&data, off, &sp).to_vec();
				// The entry carries the child's type only when the matching
				// feature is enabled; read the child's inode otherwise
				let file_type = match ent.get_type(&sp) {
					Some(t) => t,
					None => Ext2INode::read(ent.inode, fs)?.get_type(),
				};
				children.push(DirChild {
					name,
					inode: ent.inode,
					file_type,
				});

				off += ent.rec_len as usize;
			}
		}

		state.children = Some(children);
		Ok(())
	}

	/// Returns the directory's children, in on-disk order.
	pub fn entries(&self, fs: &Ext2Fs) -> EResult<Vec<DirChild>> {
		self.populate(fs)?;
		let state = self.node.state();
		Ok(state.children.as_ref().unwrap().clone())
	}

	/// Returns the child with the given name, if any.
	pub fn lookup(&self, fs: &Ext2Fs, name: &[u8]) -> EResult<Option<DirChild>> {
		self.populate(fs)?;
		let state = self.node.state();
		let children = state.children.as_ref().unwrap();
		Ok(children.iter().find(|c| c.name == name).cloned())
	}

	/// Adds an entry to the directory, and increments the links count of the
	/// target inode.
	///
	/// Arguments:
	/// - `name` is the name of the entry.
	/// - `target` is the inode the entry points to.
	/// - `file_type` is the type of the target.
	///
	/// The function first looks for a tombstone large enough, then for a used
	/// entry whose record has enough slack to donate. The donor's record is
	/// shortened to its minimum length and the new record takes the donated
	/// slack; both live in the same block, so a single block write publishes
	/// the change. When no block has room, a fresh block is appended whose
	/// single entry spans the whole block.
	pub fn add_entry(
		&self,
		fs: &Ext2Fs,
		name: &[u8],
		target: u32,
		file_type: FileType,
	) -> EResult<()> {
		let blk_size = fs.get_block_size() as usize;
		let required = dirent::required_size(name.len());
		if required as usize > blk_size {
			return Err(errno!(ENAMETOOLONG));
		}

		self.populate(fs)?;
		let mut state = self.node.state();
		let mut inode_ = Ext2INode::read(self.node.get_inode(), fs)?;
		let sp = fs.superblock();

		let mut placed = false;
		'blocks: for blk_off in 0..state.get_blocks_count() {
			let blk = state.resolve(&inode_, fs, blk_off)?;
			let frame = fs.read_blk(blk)?;
			{
				let mut data = frame.data();

				let mut off = 0;
				while off + dirent::NAME_OFF <= blk_size {
					let ent = Dirent::read(&data, off, &sp)?;
					if ent.rec_len == 0 {
						break;
					}

					if ent.is_free() && ent.rec_len >= required {
						// Reuse the tombstone as-is
						Dirent::write_new(
							&mut data, off, &sp, target, ent.rec_len, file_type, name,
						)?;
						placed = true;
						break;
					}

					let used = ent.used_size(&sp);
					if !ent.is_free() && ent.rec_len - used >= required {
						// Shorten the donor record and put the new entry in
						// the donated slack
						let slack = ent.rec_len - used;
						let mut donor = ent;
						donor.rec_len = used;
						donor.write(&mut data, off);
						Dirent::write_new(
							&mut data,
							off + used as usize,
							&sp,
							target,
							slack,
							file_type,
							name,
						)?;
						placed = true;
						break;
					}

					off += ent.rec_len as usize;
				}
			}

			if placed {
				frame.mark_dirty();
				fs.write_blk(blk)?;
				break 'blocks;
			}
		}

		if !placed {
			// No slack anywhere: append a fresh block whose single entry
			// spans it whole
			let blk = fs.alloc_block(self.node.get_inode())?;
			state.add_block(self.node.get_inode(), &mut inode_, fs, blk)?;
			fs.zero_blk(blk)?;

			let frame = fs.read_blk(blk)?;
			{
				let mut data = frame.data();
				Dirent::write_new(&mut data, 0, &sp, target, blk_size as u16, file_type, name)?;
				frame.mark_dirty();
			}
			fs.write_blk(blk)?;

			let new_size = state.get_blocks_count() as u64 * blk_size as u64;
			state.ensure_large_enough(self.node.get_inode(), &mut inode_, fs, new_size)?;
		}

		let ts = time::get();
		inode_.set_mtime(ts);
		inode_.set_atime(ts);
		inode_.write(self.node.get_inode(), fs)?;

		// Increment the target's links count
		let mut target_inode = Ext2INode::read(target, fs)?;
		target_inode.set_links_count(target_inode.get_links_count() + 1);
		target_inode.set_ctime(ts);
		target_inode.write(target, fs)?;

		if let Some(children) = &mut state.children {
			children.push(DirChild {
				name: name.to_vec(),
				inode: target,
				file_type,
			});
		}
		Ok(())
	}

	/// Removes the entry with the given name from the directory.
	///
	/// The record's content is zeroed. When a previous entry exists in the
	/// same block, the freed slack is folded into its record length;
	/// otherwise the record is kept as a tombstone so the walker still steps
	/// over it.
	///
	/// The function returns the removed child. The links count of the target
	/// inode is not touched; this is the filesystem's responsibility.
	pub fn remove_entry(&self, fs: &Ext2Fs, name: &[u8]) -> EResult<DirChild> {
		self.populate(fs)?;
		let mut state = self.node.state();
		let inode_ = Ext2INode::read(self.node.get_inode(), fs)?;
		let blk_size = fs.get_block_size() as usize;
		let sp = fs.superblock();

		let mut removed: Option<DirChild> = None;
		'blocks: for blk_off in 0..state.get_blocks_count() {
			let blk = state.resolve(&inode_, fs, blk_off)?;
			let frame = fs.read_blk(blk)?;
			{
				let mut data = frame.data();

				let mut prev: Option<(usize, Dirent)> = None;
				let mut off = 0;
				while off + dirent::NAME_OFF <= blk_size {
					let ent = Dirent::read(&data, off, &sp)?;
					if ent.rec_len == 0 {
						break;
					}

					if !ent.is_free() && ent.name(&data, off, &sp) == name {
						let file_type = match ent.get_type(&sp) {
							Some(t) => t,
							None => Ext2INode::read(ent.inode, fs)?.get_type(),
						};
						removed = Some(DirChild {
							name: name.to_vec(),
							inode: ent.inode,
							file_type,
						});

						let rec_len = ent.rec_len;
						data[off..off + rec_len as usize].fill(0);
						if let Some((prev_off, mut prev_ent)) = prev {
							// Fold the freed slack into the previous record
							prev_ent.rec_len += rec_len;
							prev_ent.write(&mut data, prev_off);
						} else {
							// First record of the block: keep a tombstone
							Dirent::free(rec_len).write(&mut data, off);
						}
						break;
					}

					prev = Some((off, ent));
					off += ent.rec_len as usize;
				}
			}

			if removed.is_some() {
				frame.mark_dirty();
				fs.write_blk(blk)?;
				break 'blocks;
			}
		}

		let Some(child) = removed else {
			return Err(errno!(ENOENT));
		};

		if let Some(children) = &mut state.children {
			children.retain(|c| c.name != name);
		}
		Ok(child)
	}

	/// Tells whether the directory contains no entry other than `.` and `..`.
	pub fn is_empty(&self, fs: &Ext2Fs) -> EResult<bool> {
		self.populate(fs)?;
		let state = self.node.state();
		let children = state.children.as_ref().unwrap();
		Ok(children
			.iter()
			.all(|c| c.name == b"." || c.name == b".."))
	}
}
