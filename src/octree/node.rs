use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::{
	leaf::{LeafOptions, LeafStore},
	math::IntBox,
};

use super::{
	id::NodeId,
	lock::{DataLock, LockKind, StructuralLock},
};

/// Stable index of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub(crate) u32);

/// A node of the data octree.
/// A node is a leaf until its 8 children are allocated, which happens at most once.
#[derive(Debug)]
pub struct DataNode {
	id: NodeId,
	lod: u8,
	bounds: IntBox,
	index: NodeIndex,
	parent: Option<NodeIndex>,
	/// Index of the first of 8 consecutive children.
	pub(super) children: OnceLock<NodeIndex>,
	pub(super) structure: StructuralLock,
	pub(crate) lock: DataLock,
	leaf: Option<RwLock<LeafStore>>,
}

impl DataNode {
	pub(super) fn new(id: NodeId, lod: u8, bounds: IntBox, index: NodeIndex, parent: Option<NodeIndex>, options: LeafOptions) -> Self {
		Self {
			id,
			lod,
			bounds,
			index,
			parent,
			children: OnceLock::new(),
			structure: StructuralLock::new(),
			lock: DataLock::new(),
			leaf: (lod == 0).then(|| RwLock::new(LeafStore::new(bounds, options))),
		}
	}

	#[inline(always)]
	pub fn id(&self) -> NodeId {
		self.id
	}

	#[inline(always)]
	pub fn lod(&self) -> u8 {
		self.lod
	}

	#[inline(always)]
	pub fn bounds(&self) -> IntBox {
		self.bounds
	}

	pub fn index(&self) -> NodeIndex {
		self.index
	}

	pub fn parent(&self) -> Option<NodeIndex> {
		self.parent
	}

	#[inline(always)]
	pub fn is_leaf(&self) -> bool {
		self.children.get().is_none()
	}

	/// The dense storage. Only LOD 0 nodes have one.
	pub fn store(&self) -> Option<&RwLock<LeafStore>> {
		self.leaf.as_ref()
	}

	pub fn is_dirty(&self) -> bool {
		self.leaf.as_ref().map_or(false, |store| store.read().is_dirty())
	}

	/// Tests if the calling thread holds this node's data lock.
	/// A write hold also satisfies a read query.
	pub fn is_held_by_current_thread(&self, kind: LockKind) -> bool {
		self.lock.is_held_by_current_thread(LockKind::Write)
		|| (kind == LockKind::Read && self.lock.is_held_by_current_thread(LockKind::Read))
	}
}
