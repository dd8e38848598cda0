use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
	leaf::LeafOptions,
	math::{
		geometry::{child_index, child_offset, node_size},
		IntBox,
		IntVector,
	},
};

use super::{
	id::NodeId,
	lock::LockKind,
	node::{DataNode, NodeIndex},
};

/// Arena backed octree of [DataNode]s.
///
/// Nodes are never removed, so a [NodeIndex] stays valid for the life of
/// the tree. The root covers a cube of `CELL_SIZE << depth` centred on the origin.
#[derive(Debug)]
pub struct DataOctree {
	depth: u8,
	options: LeafOptions,
	nodes: RwLock<Vec<Arc<DataNode>>>,
}

impl DataOctree {
	pub fn new(depth: u8, options: LeafOptions) -> Self {
		debug_assert!(depth <= NodeId::MAX_DEPTH);
		let size = node_size(depth);
		let bounds = IntBox::cube(IntVector::splat(-size / 2), size);
		let root = DataNode::new(NodeId::ROOT, depth, bounds, NodeIndex(0), None, options);
		Self {
			depth,
			options,
			nodes: RwLock::new(vec![Arc::new(root)]),
		}
	}

	pub fn depth(&self) -> u8 {
		self.depth
	}

	pub fn options(&self) -> LeafOptions {
		self.options
	}

	/// The region covered by the tree.
	pub fn bounds(&self) -> IntBox {
		self.root().bounds()
	}

	pub fn root(&self) -> Arc<DataNode> {
		self.node(NodeIndex(0))
	}

	pub fn node(&self, index: NodeIndex) -> Arc<DataNode> {
		Arc::clone(&self.nodes.read()[index.0 as usize])
	}

	pub fn node_count(&self) -> usize {
		self.nodes.read().len()
	}

	/// The children of `node`, if it has been subdivided.
	pub fn children(&self, node: &DataNode) -> Option<[Arc<DataNode>; 8]> {
		let first = node.children.get()?.0 as usize;
		let nodes = self.nodes.read();
		Some(std::array::from_fn(|i| Arc::clone(&nodes[first + i])))
	}

	/// Subdivides `node` if it is still a leaf and returns its children.
	/// Must not be called on a LOD 0 node.
	pub fn ensure_children(&self, node: &DataNode) -> [Arc<DataNode>; 8] {
		debug_assert!(node.lod() > 0, "LOD 0 nodes can't be subdivided");
		let first = node.children.get_or_init(|| {
			let child_lod = node.lod() - 1;
			let child_size = node_size(child_lod);
			let mut nodes = self.nodes.write();
			let first = nodes.len() as u32;
			for index in 0..8 {
				let min = node.bounds().min + child_offset(index) * child_size;
				nodes.push(Arc::new(DataNode::new(
					node.id().child(child_lod, index),
					child_lod,
					IntBox::cube(min, child_size),
					NodeIndex(first + index as u32),
					Some(node.index()),
					self.options,
				)));
			}
			log::trace!("subdivided {:?} at lod {}", node.id(), node.lod());
			NodeIndex(first)
		}).0 as usize;
		let nodes = self.nodes.read();
		std::array::from_fn(|i| Arc::clone(&nodes[first + i]))
	}

	/// The deepest existing node containing `p`. Never subdivides.
	pub fn leaf_at(&self, p: IntVector) -> Option<Arc<DataNode>> {
		let mut node = self.root();
		if !node.bounds().contains(p) {
			return None;
		}
		while let Some(children) = self.children(&node) {
			let center = node.bounds().min + node_size(node.lod() - 1);
			node = Arc::clone(&children[child_index(p, center)]);
		}
		Some(node)
	}

	/// The LOD 0 leaf containing `p`, subdividing on the way down.
	/// The caller must hold a write lock covering `p`.
	pub fn find_leaf_at(&self, p: IntVector) -> Option<Arc<DataNode>> {
		let mut node = self.root();
		if !node.bounds().contains(p) {
			return None;
		}
		while node.lod() > 0 {
			debug_assert!(
				!node.is_leaf() || self.is_locked_by_current_thread(&node, LockKind::Write),
				"subdividing {:?} without holding its write lock",
				node.id()
			);
			let center = node.bounds().min + node_size(node.lod() - 1);
			let children = self.ensure_children(&node);
			node = Arc::clone(&children[child_index(p, center)]);
		}
		Some(node)
	}

	/// Visits existing leaves intersecting `bounds` in ascending id order.
	/// Leaves above LOD 0 are included. Never subdivides.
	pub fn visit_leaves_overlapping<F: FnMut(&Arc<DataNode>)>(&self, bounds: &IntBox, visit: &mut F) {
		self.visit_node(&self.root(), bounds, visit);
	}

	fn visit_node<F: FnMut(&Arc<DataNode>)>(&self, node: &Arc<DataNode>, bounds: &IntBox, visit: &mut F) {
		if !node.bounds().intersects(bounds) {
			return;
		}
		match self.children(node) {
			Some(children) => {
				for child in children.iter() {
					self.visit_node(child, bounds, visit);
				}
			}
			None => visit(node),
		}
	}

	/// Visits every LOD 0 leaf intersecting `bounds` in ascending id order,
	/// subdividing where needed. The caller must hold a write lock covering `bounds`.
	pub fn visit_leaves_subdividing<F: FnMut(&Arc<DataNode>)>(&self, bounds: &IntBox, visit: &mut F) {
		self.visit_subdividing(&self.root(), bounds, visit);
	}

	fn visit_subdividing<F: FnMut(&Arc<DataNode>)>(&self, node: &Arc<DataNode>, bounds: &IntBox, visit: &mut F) {
		if !node.bounds().intersects(bounds) {
			return;
		}
		if node.lod() == 0 {
			visit(node);
			return;
		}
		debug_assert!(
			!node.is_leaf() || self.is_locked_by_current_thread(node, LockKind::Write),
			"subdividing {:?} without holding its write lock",
			node.id()
		);
		for child in self.ensure_children(node).iter() {
			self.visit_subdividing(child, bounds, visit);
		}
	}

	/// Finds the node with exactly this id. Never subdivides.
	pub fn node_by_id(&self, id: NodeId) -> Option<Arc<DataNode>> {
		let mut node = self.root();
		loop {
			if node.id() == id {
				return Some(node);
			}
			if node.lod() == 0 || !id.is_descendant_of(node.id(), node.lod()) {
				return None;
			}
			let index = id.child_index_at(node.lod() - 1)?;
			let children = self.children(&node)?;
			node = Arc::clone(&children[index]);
		}
	}

	/// Tests if the calling thread holds a lock of `kind` on `node` or one of its ancestors.
	pub fn is_locked_by_current_thread(&self, node: &DataNode, kind: LockKind) -> bool {
		if node.is_held_by_current_thread(kind) {
			return true;
		}
		let mut parent = node.parent();
		while let Some(index) = parent {
			let ancestor = self.node(index);
			if ancestor.is_held_by_current_thread(kind) {
				return true;
			}
			parent = ancestor.parent();
		}
		false
	}

	/// Number of LOD 0 leaves that own dense arrays.
	pub fn dirty_leaf_count(&self) -> usize {
		let mut count = 0;
		self.visit_leaves_overlapping(&IntBox::INFINITE, &mut |node| {
			count += node.is_dirty() as usize;
		});
		count
	}
}
