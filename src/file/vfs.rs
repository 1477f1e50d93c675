//! Path resolution on the mounted filesystem.
//!
//! Paths are byte strings whose components are separated by `/`. Resolution
//! walks the directory tree from the filesystem's root (absolute paths) or
//! from a given directory (relative paths), following symbolic links up to a
//! fixed depth.

use crate::errno;
use crate::errno::EResult;
use crate::file;
use crate::file::fs::ext2::Ext2Directory;
use crate::file::fs::ext2::Ext2Fs;
use crate::file::fs::ext2::Ext2Node;
use crate::file::FileType;
use crate::file::Gid;
use crate::file::Uid;
use crate::limits;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// The maximum number of symbolic links followed in a single resolution
/// before failing with `ELOOP`.
pub const SYMLOOP_MAX: usize = 40;

/// The result of a path resolution.
pub struct Resolved {
	/// The directory containing the resolved entry.
	pub parent: Arc<Ext2Node>,
	/// The name of the entry in `parent`.
	pub name: Vec<u8>,
	/// The resolved node, if it exists.
	pub node: Option<Arc<Ext2Node>>,
}

/// Settings for a path resolution.
#[derive(Clone, Copy)]
pub struct ResolutionSettings {
	/// The user ID used for permission checks.
	pub uid: Uid,
	/// The group ID used for permission checks.
	pub gid: Gid,
	/// Tells whether a symbolic link as the last component is followed.
	pub follow_link: bool,
}

impl ResolutionSettings {
	/// Resolution for the superuser, following links.
	pub fn kernel() -> Self {
		Self {
			uid: file::ROOT_UID,
			gid: file::ROOT_GID,
			follow_link: true,
		}
	}
}

/// Splits a path into its components, ignoring empty ones.
fn components(path: &[u8]) -> impl Iterator<Item = &[u8]> {
	path.split(|b| *b == b'/').filter(|c| !c.is_empty())
}

/// Resolves the given path and returns the node it points to.
///
/// Arguments:
/// - `fs` is the mounted filesystem.
/// - `cwd` is the directory relative paths start from.
/// - `path` is the path to resolve.
/// - `settings` are the resolution settings.
///
/// If the entry does not exist, the function fails with `ENOENT`.
pub fn get_file(
	fs: &Arc<Ext2Fs>,
	cwd: &Arc<Ext2Node>,
	path: &[u8],
	settings: &ResolutionSettings,
) -> EResult<Arc<Ext2Node>> {
	let resolved = resolve_path(fs, cwd, path, settings)?;
	resolved.node.ok_or_else(|| errno!(ENOENT))
}

/// Resolves the given path down to its parent directory and final component.
///
/// Every intermediate component must exist and be a directory the caller can
/// search. The final component may or may not exist.
pub fn resolve_path(
	fs: &Arc<Ext2Fs>,
	cwd: &Arc<Ext2Node>,
	path: &[u8],
	settings: &ResolutionSettings,
) -> EResult<Resolved> {
	if path.len() > limits::PATH_MAX {
		return Err(errno!(ENAMETOOLONG));
	}

	let mut depth = 0;
	resolve_impl(fs, cwd, path, settings, &mut depth)
}

/// Inner implementation of [`resolve_path`], tracking the number of symbolic
/// links followed.
fn resolve_impl(
	fs: &Arc<Ext2Fs>,
	cwd: &Arc<Ext2Node>,
	path: &[u8],
	settings: &ResolutionSettings,
	depth: &mut usize,
) -> EResult<Resolved> {
	let root = fs.get_root()?;
	let mut dir = if path.first() == Some(&b'/') {
		root.clone()
	} else {
		cwd.clone()
	};

	let mut comps = components(path).peekable();
	// An empty path, or the root itself
	let Some(mut comp) = comps.next() else {
		return Ok(Resolved {
			parent: dir.clone(),
			name: b".".to_vec(),
			node: Some(dir),
		});
	};

	loop {
		if comp.len() > limits::NAME_MAX {
			return Err(errno!(ENAMETOOLONG));
		}

		// Walking into a directory requires search permission on it
		if !file::can_access_node(&dir, settings.uid, settings.gid, file::ACCESS_EXEC) {
			return Err(errno!(EACCES));
		}

		let dir_view = Ext2Directory::new(&dir)?;
		let child = dir_view.lookup(fs, comp)?;
		let last = comps.peek().is_none();

		let node = match child {
			Some(c) => Some(fs.node(c.inode)?),
			None => None,
		};

		// Follow symbolic links
		if let Some(node_) = &node {
			let follow = !last || settings.follow_link;
			if node_.get_type() == FileType::Link && follow {
				*depth += 1;
				if *depth > SYMLOOP_MAX {
					return Err(errno!(ELOOP));
				}

				let target = fs.readlink(node_)?;
				let sub = resolve_impl(fs, &dir, &target, settings, depth)?;
				let Some(sub_node) = sub.node else {
					if last {
						// Dangling link: report the link's own target location
						return Ok(sub);
					}
					return Err(errno!(ENOENT));
				};

				if last {
					return Ok(Resolved {
						parent: sub.parent,
						name: sub.name,
						node: Some(sub_node),
					});
				}
				dir = sub_node;
				comp = comps.next().unwrap();
				continue;
			}
		}

		if last {
			return Ok(Resolved {
				parent: dir,
				name: comp.to_vec(),
				node,
			});
		}

		let Some(next_dir) = node else {
			return Err(errno!(ENOENT));
		};
		if next_dir.get_type() != FileType::Directory {
			return Err(errno!(ENOTDIR));
		}
		dir = next_dir;
		comp = comps.next().unwrap();
	}
}
