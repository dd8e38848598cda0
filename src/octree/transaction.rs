//! Region transactions over a [DataOctree].
//!
//! Locking walks down from the root hand over hand: a node's structural
//! lock is held while its data lock is taken and, for inner nodes, until
//! the structural locks of the children in the region are held. A node
//! that is still a leaf above LOD 0 is subdivided at that point, so
//! transactions always end on LOD 0 leaves. Those keep their data lock and
//! are reported as tokens in ascending id order. Unlocking replays the
//! tokens from the tail.

use std::{
	sync::Arc,
	thread::{self, ThreadId},
	time::Instant,
};

use crate::{
	math::IntBox,
	VoxError,
	VoxResult,
};

use super::{
	id::NodeId,
	lock::{LockFailure, LockKind, StructuralGuard},
	node::DataNode,
	tree::DataOctree,
};

/// Where [lock_region] stops descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
	/// Subdivide down to LOD 0 and lock the leaves there.
	Cells,
	/// Lock the leaves that exist, whatever their LOD. Used for whole world
	/// operations, which would otherwise allocate every leaf of the tree.
	Existing,
}

impl LockFailure {
	fn into_error(self, bounds: &IntBox) -> VoxError {
		match self {
			LockFailure::Reentrant => VoxError::ReentrantTransaction,
			LockFailure::Timeout(holder) => {
				log::error!("lock timeout on {bounds:?}, held by \"{holder}\"");
				VoxError::LockTimeout {
					holder,
					bounds: *bounds,
				}
			}
			LockFailure::NotHeld => VoxError::LockNotHeld,
		}
	}
}

/// Locks every leaf intersecting `bounds` for the calling thread and returns their ids.
/// On failure, everything acquired so far is released again.
pub fn lock_region(
	octree: &DataOctree,
	bounds: &IntBox,
	kind: LockKind,
	depth: LockDepth,
	name: &str,
	deadline: Option<Instant>,
) -> VoxResult<Vec<NodeId>> {
	let mut tokens = Vec::new();
	let result = StructuralGuard::lock(octree.root(), name, deadline)
		.map_err(|failure| failure.into_error(bounds))
		.and_then(|guard| lock_node(octree, guard, bounds, kind, depth, name, deadline, &mut tokens));
	match result {
		Ok(()) => {
			log::debug!("{name}: {kind:?} lock on {bounds:?} holds {} leaves", tokens.len());
			Ok(tokens)
		}
		Err(err) => {
			if let Err(release) = unlock_region(octree, tokens, kind, thread::current().id()) {
				log::error!("{name}: failed to release partial lock: {release}");
			}
			if err.is_protocol_fault() {
				Err(err.protocol_fault())
			} else {
				Err(err)
			}
		}
	}
}

fn lock_node(
	octree: &DataOctree,
	guard: StructuralGuard,
	bounds: &IntBox,
	kind: LockKind,
	depth: LockDepth,
	name: &str,
	deadline: Option<Instant>,
	tokens: &mut Vec<NodeId>,
) -> VoxResult<()> {
	let node = Arc::clone(guard.node());
	if !node.bounds().intersects(bounds) {
		return Ok(());
	}
	// Waits for any transaction that still holds this node as a leaf.
	node.lock.acquire(kind, name, deadline).map_err(|failure| failure.into_error(bounds))?;
	let children = match octree.children(&node) {
		Some(children) => children,
		None if node.lod() == 0 || depth == LockDepth::Existing => {
			tokens.push(node.id());
			return Ok(());
		}
		None => octree.ensure_children(&node),
	};
	if let Err(failure) = node.lock.release(kind, thread::current().id()) {
		log::error!("{name}: lost transient lock on {:?}: {failure:?}", node.id());
	}
	let mut child_guards = Vec::with_capacity(8);
	for child in children {
		if child.bounds().intersects(bounds) {
			child_guards.push(
				StructuralGuard::lock(child, name, deadline).map_err(|failure| failure.into_error(bounds))?
			);
		}
	}
	drop(guard);
	// Guards left in the iterator after an early return are dropped with it.
	for child_guard in child_guards {
		lock_node(octree, child_guard, bounds, kind, depth, name, deadline, tokens)?;
	}
	Ok(())
}

/// Releases the holds `owner` took on the leaves named by `tokens`.
///
/// Tokens must be strictly increasing and name nodes of this tree. A list
/// that isn't is a protocol fault, but every node in it that `owner` still
/// holds is released first so nothing leaks. Every token is released even
/// if some releases fail; the first failure is returned.
pub fn unlock_region(octree: &DataOctree, tokens: Vec<NodeId>, kind: LockKind, owner: ThreadId) -> VoxResult<()> {
	let sorted = tokens.windows(2).all(|w| w[0] < w[1]);
	let unknown = tokens.iter().find(|&&id| octree.node_by_id(id).is_none()).copied();
	if !sorted || unknown.is_some() {
		if let Some(unknown) = unknown {
			log::error!("token {unknown:?} doesn't name a node");
		}
		let mut held = tokens.into_iter()
			.filter(|&id| octree.node_by_id(id).map_or(false, |node| node.lock.is_held_by(owner, kind)))
			.collect::<Vec<_>>();
		held.sort_unstable();
		held.dedup();
		log::error!("malformed {kind:?} tokens, releasing the {} leaves still held", held.len());
		release_sorted(octree, held, kind, owner);
		return Err(VoxError::MalformedTokens.protocol_fault());
	}
	let count = tokens.len();
	let first_error = release_sorted(octree, tokens, kind, owner);
	log::debug!("released {kind:?} lock on {count} leaves");
	match first_error {
		Some(err) => Err(err.protocol_fault()),
		None => Ok(()),
	}
}

fn release_sorted(octree: &DataOctree, tokens: Vec<NodeId>, kind: LockKind, owner: ThreadId) -> Option<VoxError> {
	let mut remaining = tokens;
	let mut first_error = None;
	unlock_node(octree, &octree.root(), &mut remaining, kind, owner, &mut first_error);
	debug_assert!(remaining.is_empty());
	first_error
}

fn unlock_node(
	octree: &DataOctree,
	node: &Arc<DataNode>,
	tokens: &mut Vec<NodeId>,
	kind: LockKind,
	owner: ThreadId,
	first_error: &mut Option<VoxError>,
) {
	let Some(&last) = tokens.last() else {
		return;
	};
	if last != node.id() {
		if !last.is_descendant_of(node.id(), node.lod()) {
			return;
		}
		if let Some(children) = octree.children(node) {
			for child in children.iter().rev() {
				unlock_node(octree, child, tokens, kind, owner, first_error);
			}
		}
	}
	if tokens.last() == Some(&node.id()) {
		tokens.pop();
		if let Err(failure) = node.lock.release(kind, owner) {
			log::error!("failed to release {:?}: {failure:?}", node.id());
			first_error.get_or_insert(failure.into_error(&node.bounds()));
		}
	}
}
