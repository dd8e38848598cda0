use std::io::{Read, Write};

use crate::{
	ioext::*,
	VoxResult,
};

/// Path from the root to a node, packed 4 bits per level.
/// The nibble at `4 * lod` holds `child_index + 1` of the node at that lod,
/// so the root is `0` and a parent always sorts before its descendants.
/// Sorting ids gives the depth first order of the tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
	pub const ROOT: NodeId = NodeId(0);
	/// 64 bits hold 16 nibbles, the root level doesn't need one.
	pub const MAX_DEPTH: u8 = 15;

	/// The id of a child at `child_lod`.
	#[inline(always)]
	pub fn child(self, child_lod: u8, index: usize) -> NodeId {
		debug_assert!(index < 8);
		NodeId(self.0 | ((index as u64 + 1) << (4 * child_lod as u32)))
	}

	/// Tests if this id is `ancestor` or lies below it.
	#[inline(always)]
	pub fn is_descendant_of(self, ancestor: NodeId, ancestor_lod: u8) -> bool {
		let shift = 4 * ancestor_lod as u32;
		if shift >= 64 {
			return true;
		}
		(self.0 >> shift) == (ancestor.0 >> shift)
	}

	/// The child index taken at `lod` on the way to this node.
	/// Returns `None` if the path stops above `lod`.
	#[inline(always)]
	pub fn child_index_at(self, lod: u8) -> Option<usize> {
		let nibble = (self.0 >> (4 * lod as u32)) & 0xf;
		(nibble as usize).checked_sub(1)
	}

	/// Tests if this is the id of a LOD 0 leaf in a tree of `depth`.
	pub fn is_leaf_id(self, depth: u8) -> bool {
		if depth > Self::MAX_DEPTH {
			return false;
		}
		let used = 4 * depth as u32;
		if used < 64 && (self.0 >> used) != 0 {
			return false;
		}
		(0..depth).all(|lod| matches!(self.child_index_at(lod), Some(0..=7)))
	}
}

impl Readable for NodeId {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		Ok(Self(reader.read_value()?))
	}
}

impl Writable for NodeId {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		writer.write_value(self.0)
	}
}
