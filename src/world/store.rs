//! [VolumeStore], the public entry point.
//!
//! Callers open a transaction over a box with `begin_read`/`begin_write`
//! (or a scope), do their reads and writes, then end it with the tokens
//! they were given. Operations that span the whole world (saving, diffs,
//! history) lock every existing leaf themselves, so they must be called
//! without an open transaction on the same thread.

use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	thread::{self, ThreadId},
	time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};

use crate::{
	data::{
		EmptyState,
		Material,
		QueryZone,
		Value,
		WorldGenerator,
	},
	leaf::{
		DiffBatch,
		LeafStore,
		Snapshot,
	},
	log_time,
	return_if,
	math::{
		IntBox,
		IntVector,
		CELL_COUNT,
		CELL_SIZE,
	},
	octree::{
		lock_region,
		unlock_region,
		DataNode,
		DataOctree,
		LockDepth,
		LockKind,
		NodeId,
	},
	VoxError,
	VoxResult,
};

use super::{
	config::StoreConfig,
	io::{LeafRecord, WorldSave},
	scope::{ReadScope, WriteScope},
};

/// The leaves held by an open transaction, in ascending id order.
/// The tokens may be handed to another thread to end the transaction.
#[derive(Debug, PartialEq, Eq)]
pub struct TransactionTokens {
	kind: LockKind,
	owner: ThreadId,
	ids: Vec<NodeId>,
}

impl TransactionTokens {
	/// Tokens for locks the calling thread took.
	pub fn new(kind: LockKind, ids: Vec<NodeId>) -> Self {
		Self {
			kind,
			owner: thread::current().id(),
			ids,
		}
	}

	pub fn kind(&self) -> LockKind {
		self.kind
	}

	/// The thread the locks were taken for.
	pub fn owner(&self) -> ThreadId {
		self.owner
	}

	pub fn ids(&self) -> &[NodeId] {
		&self.ids
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}
}

/// What [VolumeStore::discard_values] does with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardAction {
	/// Leave every edit under the node alone.
	Keep,
	/// Reset every edited leaf under the node to the generator.
	Discard,
	/// Ask again for each child, or for each cell of a LOD 0 leaf.
	Subdivide,
}

#[derive(Debug, Default, Clone, Copy)]
struct HistoryState {
	position: u64,
	max: u64,
}

/// A sparse, editable voxel volume over a [WorldGenerator].
pub struct VolumeStore {
	config: StoreConfig,
	octree: DataOctree,
	generator: RwLock<Arc<dyn WorldGenerator>>,
	history: Mutex<HistoryState>,
	mismatches: AtomicU64,
}

impl VolumeStore {
	pub fn new(config: StoreConfig, generator: Arc<dyn WorldGenerator>) -> VoxResult<Self> {
		config.validate()?;
		log::debug!("creating store with {config:?}");
		Ok(Self {
			config,
			octree: DataOctree::new(config.depth, config.leaf_options()),
			generator: RwLock::new(generator),
			history: Mutex::new(HistoryState::default()),
			mismatches: AtomicU64::new(0),
		})
	}

	pub fn config(&self) -> &StoreConfig {
		&self.config
	}

	pub fn depth(&self) -> u8 {
		self.config.depth
	}

	/// The region backed by the octree. Everything outside reads from the generator.
	pub fn bounds(&self) -> IntBox {
		self.octree.bounds()
	}

	pub fn octree(&self) -> &DataOctree {
		&self.octree
	}

	pub fn generator(&self) -> Arc<dyn WorldGenerator> {
		Arc::clone(&*self.generator.read())
	}

	fn deadline(&self) -> Option<Instant> {
		self.config.lock_timeout.map(|timeout| Instant::now() + timeout)
	}

	fn begin(&self, bounds: &IntBox, kind: LockKind, name: &str, deadline: Option<Instant>) -> VoxResult<TransactionTokens> {
		let ids = lock_region(&self.octree, bounds, kind, LockDepth::Cells, name, deadline)?;
		Ok(TransactionTokens::new(kind, ids))
	}

	/// Releases the tokens with the kind they were taken with, even when the
	/// caller asked for the other kind.
	fn end(&self, tokens: TransactionTokens, kind: LockKind) -> VoxResult<()> {
		let TransactionTokens {
			kind: held,
			owner,
			ids,
		} = tokens;
		let released = unlock_region(&self.octree, ids, held, owner);
		if held != kind {
			log::error!("{kind:?} transaction ended with {held:?} tokens");
			return Err(VoxError::MalformedTokens.protocol_fault());
		}
		released
	}

	/// Takes shared locks on every leaf intersecting `bounds`.
	/// `name` identifies the caller in timeout reports.
	pub fn begin_read(&self, bounds: &IntBox, name: &str) -> VoxResult<TransactionTokens> {
		self.begin(bounds, LockKind::Read, name, self.deadline())
	}

	/// Takes exclusive locks on every leaf intersecting `bounds`.
	pub fn begin_write(&self, bounds: &IntBox, name: &str) -> VoxResult<TransactionTokens> {
		self.begin(bounds, LockKind::Write, name, self.deadline())
	}

	pub fn try_begin_read(&self, bounds: &IntBox, name: &str, timeout: Duration) -> VoxResult<TransactionTokens> {
		self.begin(bounds, LockKind::Read, name, Some(Instant::now() + timeout))
	}

	pub fn try_begin_write(&self, bounds: &IntBox, name: &str, timeout: Duration) -> VoxResult<TransactionTokens> {
		self.begin(bounds, LockKind::Write, name, Some(Instant::now() + timeout))
	}

	pub fn end_read(&self, tokens: TransactionTokens) -> VoxResult<()> {
		self.end(tokens, LockKind::Read)
	}

	pub fn end_write(&self, tokens: TransactionTokens) -> VoxResult<()> {
		self.end(tokens, LockKind::Write)
	}

	pub fn read_scope(&self, bounds: &IntBox, name: &str) -> VoxResult<ReadScope<'_>> {
		let tokens = self.begin_read(bounds, name)?;
		Ok(ReadScope::new(self, *bounds, tokens))
	}

	pub fn write_scope(&self, bounds: &IntBox, name: &str) -> VoxResult<WriteScope<'_>> {
		let tokens = self.begin_write(bounds, name)?;
		Ok(WriteScope::new(self, *bounds, tokens))
	}

	/// Runs `f` with every existing leaf locked.
	fn with_world_lock<T, F>(&self, kind: LockKind, name: &str, f: F) -> VoxResult<T>
	where
	F: FnOnce() -> VoxResult<T> {
		let tokens = lock_region(&self.octree, &IntBox::INFINITE, kind, LockDepth::Existing, name, self.deadline())?;
		let result = f();
		let released = unlock_region(&self.octree, tokens, kind, thread::current().id());
		let value = result?;
		released?;
		Ok(value)
	}

	fn visit_stores<F>(&self, bounds: &IntBox, mut visit: F)
	where
	F: FnMut(&Arc<DataNode>, &RwLock<LeafStore>) {
		self.octree.visit_leaves_overlapping(bounds, &mut |node| {
			if let Some(store) = node.store() {
				visit(node, store);
			}
		});
	}

	fn note_snapshot(&self, snapshot: Snapshot) {
		if snapshot == Snapshot::Inconsistent {
			self.mismatches.fetch_add(1, Ordering::Relaxed);
		}
	}

	fn read_at<T, F>(&self, p: IntVector, read: F) -> T
	where
	F: FnOnce(&dyn WorldGenerator, Option<&LeafStore>) -> T {
		let generator = self.generator();
		let Some(node) = self.octree.leaf_at(p) else {
			return read(&*generator, None);
		};
		debug_assert!(
			self.octree.is_locked_by_current_thread(&node, LockKind::Read),
			"reading {p:?} without a read lock"
		);
		match node.store() {
			Some(store) => read(&*generator, Some(&*store.read())),
			None => read(&*generator, None),
		}
	}

	/// The value at `p`. The caller must hold a read lock covering `p`.
	pub fn get_value(&self, p: IntVector) -> Value {
		self.read_at(p, |generator, store| match store {
			Some(store) => store.value(p, generator),
			None => generator.value(p),
		})
	}

	/// The material at `p`. The caller must hold a read lock covering `p`.
	pub fn get_material(&self, p: IntVector) -> Material {
		self.read_at(p, |generator, store| match store {
			Some(store) => store.material(p, generator),
			None => generator.material(p),
		})
	}

	/// Reads `zone.region` into the buffers that are present.
	/// The caller must hold a read lock covering the part inside the world.
	pub fn get_values_and_materials(
		&self,
		zone: &QueryZone,
		mut values: Option<&mut [Value]>,
		mut materials: Option<&mut [Material]>,
	) {
		debug_assert!(values.as_ref().map_or(true, |values| values.len() >= zone.len()));
		debug_assert!(materials.as_ref().map_or(true, |materials| materials.len() >= zone.len()));
		let generator = self.generator();
		self.octree.visit_leaves_overlapping(&zone.region, &mut |node| {
			debug_assert!(
				self.octree.is_locked_by_current_thread(node, LockKind::Read),
				"reading {:?} without a read lock",
				node.bounds()
			);
			match node.store() {
				Some(store) => store.read().fill_zone(zone, values.as_deref_mut(), materials.as_deref_mut(), &*generator),
				None => {
					if let Some(sub_zone) = zone.sub_zone(&node.bounds()) {
						generator.fill(&sub_zone, values.as_deref_mut(), materials.as_deref_mut());
					}
				}
			}
		});
		for outside in zone.region.subtract(&self.bounds()) {
			if let Some(sub_zone) = zone.sub_zone(&outside) {
				generator.fill(&sub_zone, values.as_deref_mut(), materials.as_deref_mut());
			}
		}
	}

	/// Fails unless the calling thread holds write locks on every leaf in `region`.
	fn check_write_lock(&self, region: &IntBox) -> VoxResult<()> {
		let mut held = true;
		self.octree.visit_leaves_overlapping(region, &mut |node| {
			held = held && self.octree.is_locked_by_current_thread(node, LockKind::Write);
		});
		if held {
			Ok(())
		} else {
			log::error!("write to {region:?} without a write lock");
			Err(VoxError::LockNotHeld.protocol_fault())
		}
	}

	fn write_at(&self, p: IntVector, value: Option<Value>, material: Option<Material>) -> VoxResult<bool> {
		return_if!(!self.bounds().contains(p) => Ok(false));
		self.check_write_lock(&IntBox::from_point(p))?;
		let Some(node) = self.octree.find_leaf_at(p) else {
			return Ok(false);
		};
		let Some(store) = node.store() else {
			return Ok(false);
		};
		let generator = self.generator();
		let snapshot = store.write().write(p, value, material, &*generator);
		self.note_snapshot(snapshot);
		Ok(true)
	}

	/// Sets the value at `p`. The caller must hold a write lock covering `p`.
	/// Returns false if `p` is outside the world.
	pub fn set_value(&self, p: IntVector, value: Value) -> VoxResult<bool> {
		self.write_at(p, Some(value), None)
	}

	/// Sets the material at `p`. See [VolumeStore::set_value].
	pub fn set_material(&self, p: IntVector, material: Material) -> VoxResult<bool> {
		self.write_at(p, None, Some(material))
	}

	/// Runs `edit` on every cell of `bounds` inside the world and returns the
	/// number of cells it changed. The caller must hold a write lock covering `bounds`.
	pub fn edit_values<F>(&self, bounds: &IntBox, mut edit: F) -> VoxResult<usize>
	where
	F: FnMut(IntVector, &mut Value, &mut Material) {
		let Some(region) = bounds.overlap(&self.bounds()) else {
			return Ok(0);
		};
		self.check_write_lock(&region)?;
		let generator = self.generator();
		let mut changed = 0;
		self.octree.visit_leaves_subdividing(&region, &mut |node| {
			if let Some(store) = node.store() {
				let (snapshot, count) = store.write().edit(&region, &*generator, &mut edit);
				self.note_snapshot(snapshot);
				changed += count;
			}
		});
		log::trace!("edit of {region:?} changed {changed} cells");
		Ok(changed)
	}

	/// Classifies the values in `bounds`.
	/// The caller must hold a read lock covering the part inside the world.
	pub fn is_empty(&self, bounds: &IntBox) -> EmptyState {
		let generator = self.generator();
		let mut state: Option<EmptyState> = None;
		let mut merge = |current: EmptyState| {
			state = Some(state.map_or(current, |state| state.merge(current)));
		};
		self.octree.visit_leaves_overlapping(bounds, &mut |node| {
			let Some(region) = node.bounds().overlap(bounds) else {
				return;
			};
			let current = match node.store() {
				Some(store) => {
					let store = store.read();
					match store.values() {
						Some(values) => EmptyState::of_values(region.iter().map(|p| &values[store.local_index(p)])),
						None => generator.emptiness(&region),
					}
				}
				None => generator.emptiness(&region),
			};
			merge(current);
		});
		for outside in bounds.subtract(&self.bounds()) {
			merge(generator.emptiness(&outside));
		}
		state.unwrap_or(EmptyState::Unknown)
	}

	/// Walks the tree asking `predicate` what to do with each node.
	/// Returns the bounds of every leaf that changed. In multiplayer mode the
	/// restored cells go out with the next [collect_diffs](Self::collect_diffs).
	pub fn discard_values<F>(&self, mut predicate: F) -> VoxResult<Vec<IntBox>>
	where
	F: FnMut(&IntBox) -> DiscardAction {
		self.with_world_lock(LockKind::Write, "discard_values", || {
			let generator = self.generator();
			let mut changed = Vec::new();
			self.discard_node(&self.octree.root(), &mut predicate, &*generator, &mut changed);
			log::debug!("discarded edits in {} leaves", changed.len());
			Ok(changed)
		})
	}

	fn discard_node<F>(&self, node: &Arc<DataNode>, predicate: &mut F, generator: &dyn WorldGenerator, changed: &mut Vec<IntBox>)
	where
	F: FnMut(&IntBox) -> DiscardAction {
		match predicate(&node.bounds()) {
			DiscardAction::Keep => (),
			DiscardAction::Discard => {
				self.visit_stores(&node.bounds(), |leaf, store| {
					if store.write().reset(generator) {
						changed.push(leaf.bounds());
					}
				});
			}
			DiscardAction::Subdivide => {
				if let Some(children) = self.octree.children(node) {
					for child in children.iter() {
						self.discard_node(child, predicate, generator, changed);
					}
				} else if let Some(store) = node.store() {
					let discarded = store.write().discard_cells(generator, |p| {
						predicate(&IntBox::from_point(p)) == DiscardAction::Discard
					});
					if discarded {
						changed.push(node.bounds());
					}
				}
			}
		}
	}

	/// Clears every dirty leaf and returns their bounds. Pending diffs are
	/// dropped. The world must be write locked.
	fn reset_all(&self) -> Vec<IntBox> {
		let mut reset = Vec::new();
		self.visit_stores(&IntBox::INFINITE, |node, store| {
			if store.write().clear() {
				reset.push(node.bounds());
			}
		});
		reset
	}

	fn clear_history(&self) {
		self.visit_stores(&IntBox::INFINITE, |_, store| store.write().clear_frames());
		*self.history.lock() = HistoryState::default();
	}

	/// Replaces the generator. Every edit and all history is discarded.
	/// Returns the bounds of the leaves that were reset.
	pub fn set_generator(&self, generator: Arc<dyn WorldGenerator>) -> VoxResult<Vec<IntBox>> {
		self.with_world_lock(LockKind::Write, "set_generator", || {
			let reset = self.reset_all();
			self.clear_history();
			*self.generator.write() = generator;
			log::debug!("generator replaced, {} leaves reset", reset.len());
			Ok(reset)
		})
	}

	/// The current history position. Starts at zero and grows by one per saved frame.
	pub fn history_position(&self) -> u64 {
		self.history.lock().position
	}

	fn current_frames_empty(&self) -> bool {
		let mut empty = true;
		self.visit_stores(&IntBox::INFINITE, |_, store| {
			empty = empty && store.read().is_current_frame_empty();
		});
		empty
	}

	pub fn is_current_frame_empty(&self) -> VoxResult<bool> {
		self.with_world_lock(LockKind::Read, "is_current_frame_empty", || {
			Ok(self.current_frames_empty())
		})
	}

	/// Commits the edits made since the last frame.
	pub fn save_frame(&self) -> VoxResult<()> {
		return_if!(!self.config.undo_redo => Ok(()));
		self.with_world_lock(LockKind::Write, "save_frame", || {
			let mut history = self.history.lock();
			let position = history.position;
			self.visit_stores(&IntBox::INFINITE, |_, store| store.write().save_frame(position));
			history.position += 1;
			history.max = history.position;
			log::debug!("saved frame {position}");
			Ok(())
		})
	}

	/// Reverts the last saved frame. Returns the bounds of the leaves it touched.
	pub fn undo(&self) -> VoxResult<Vec<IntBox>> {
		self.step_history(true)
	}

	/// Reapplies the last undone frame. Returns the bounds of the leaves it touched.
	pub fn redo(&self) -> VoxResult<Vec<IntBox>> {
		self.step_history(false)
	}

	fn step_history(&self, undo: bool) -> VoxResult<Vec<IntBox>> {
		return_if!(!self.config.undo_redo => Ok(Vec::new()));
		let operation = if undo { "undo" } else { "redo" };
		self.with_world_lock(LockKind::Write, operation, || {
			let mut history = self.history.lock();
			let position = if undo {
				if history.position == 0 {
					return Ok(Vec::new());
				}
				history.position - 1
			} else {
				if history.position >= history.max {
					return Ok(Vec::new());
				}
				history.position + 1
			};
			if !self.current_frames_empty() {
				log::warn!("{operation} ignored, the current frame has uncommitted edits");
				return Err(VoxError::UncommittedEdits);
			}
			let generator = self.generator();
			let mut touched = Vec::new();
			let mut failure = None;
			self.visit_stores(&IntBox::INFINITE, |node, store| {
				if failure.is_some() {
					return;
				}
				let mut store = store.write();
				let result = if undo {
					store.undo(position, &*generator)
				} else {
					store.redo(position, &*generator)
				};
				match result {
					Ok(Some(snapshot)) => {
						self.note_snapshot(snapshot);
						touched.push(node.bounds());
					}
					Ok(None) => (),
					Err(err) => failure = Some(err),
				}
			});
			if let Some(err) = failure {
				return Err(err);
			}
			history.position = position;
			log::debug!("{operation} to position {position} touched {} leaves", touched.len());
			Ok(touched)
		})
	}

	/// Drops every frame and resets the history position to zero.
	pub fn clear_frames(&self) -> VoxResult<()> {
		self.with_world_lock(LockKind::Write, "clear_frames", || {
			self.clear_history();
			Ok(())
		})
	}

	/// Walks down from `node` once for a stack of records sorted so that the
	/// smallest id is on top, subdividing towards each and handing every
	/// record to `apply` at its leaf. Ids must be validated leaf ids.
	fn walk_to_leaves<R, I, F>(&self, node: &Arc<DataNode>, pending: &mut Vec<R>, id_of: &I, apply: &mut F)
	where
	I: Fn(&R) -> NodeId,
	F: FnMut(&Arc<DataNode>, R) {
		while let Some(id) = pending.last().map(id_of) {
			if id == node.id() {
				if let Some(record) = pending.pop() {
					apply(node, record);
				}
				continue;
			}
			if node.lod() == 0 || !id.is_descendant_of(node.id(), node.lod()) {
				return;
			}
			for child in self.octree.ensure_children(node).iter() {
				self.walk_to_leaves(child, pending, id_of, apply);
			}
		}
	}

	/// Drains the modified cells of every leaf, sorted by ascending leaf id.
	pub fn collect_diffs(&self) -> VoxResult<DiffBatch> {
		self.with_world_lock(LockKind::Write, "collect_diffs", || {
			let generator = self.generator();
			let mut batch = DiffBatch::new();
			log_time!("collect_diffs"; self.visit_stores(&IntBox::INFINITE, |node, store| {
				store.write().collect_diffs(node.id(), &mut batch, &*generator);
			}));
			Ok(batch)
		})
	}

	/// Applies diffs collected from another store in one walk down the tree.
	/// Nothing is recorded in history or marked for sending.
	/// Returns the modified positions, sorted and deduplicated.
	pub fn apply_diffs(&self, batch: &DiffBatch) -> VoxResult<Vec<IntVector>> {
		if !batch.is_sorted() {
			return Err(VoxError::UnsortedDiffs);
		}
		let depth = self.depth();
		let records = batch.values.iter().map(|diff| (diff.id, diff.index))
			.chain(batch.materials.iter().map(|diff| (diff.id, diff.index)));
		for (id, index) in records {
			if !id.is_leaf_id(depth) {
				return Err(VoxError::InvalidLeafId(id.0));
			}
			if index as usize >= CELL_COUNT {
				return Err(VoxError::OutOfRange);
			}
		}
		self.with_world_lock(LockKind::Write, "apply_diffs", || {
			let generator = self.generator();
			let mut pending = batch.leaves();
			pending.reverse();
			let mut modified = Vec::new();
			log_time!("apply_diffs"; self.walk_to_leaves(
				&self.octree.root(),
				&mut pending,
				&|group| group.id,
				&mut |node, group| {
					if let Some(store) = node.store() {
						let snapshot = store.write().apply_diffs(group.values, group.materials, &*generator, &mut modified);
						self.note_snapshot(snapshot);
					}
				},
			));
			modified.sort();
			modified.dedup();
			Ok(modified)
		})
	}

	/// Copies every dirty leaf.
	pub fn save(&self) -> VoxResult<WorldSave> {
		self.with_world_lock(LockKind::Read, "save", || {
			let mut save = WorldSave::new(self.depth());
			log_time!("save"; self.visit_stores(&IntBox::INFINITE, |node, store| {
				let store = store.read();
				if let (Some(values), Some(materials)) = (store.values(), store.materials()) {
					save.records.push(LeafRecord::new(node.id(), values, materials));
				}
			}));
			log::debug!("saved {} dirty leaves", save.len());
			Ok(save)
		})
	}

	/// Loads a save on top of the current edits, or in place of them if `reset`
	/// is set. A reset also clears all history.
	/// Returns the minimum corners of every affected leaf and its 26 neighbours.
	pub fn load(&self, save: &WorldSave, reset: bool) -> VoxResult<Vec<IntVector>> {
		if save.depth != self.depth() {
			return Err(VoxError::DepthMismatch {
				expected: self.depth(),
				found: save.depth,
			});
		}
		save.validate()?;
		self.with_world_lock(LockKind::Write, "load", || {
			let mut affected = Vec::new();
			if reset {
				affected = self.reset_all();
				self.clear_history();
			}
			let mut pending = save.records.iter().rev().collect::<Vec<_>>();
			let mut failure = None;
			log_time!("load"; self.walk_to_leaves(
				&self.octree.root(),
				&mut pending,
				&|record: &&LeafRecord| record.id,
				&mut |node, record| {
					let Some(store) = node.store() else {
						return;
					};
					match store.write().load(&record.values, &record.materials) {
						Ok(()) => affected.push(node.bounds()),
						Err(err) => {
							failure.get_or_insert(err);
						}
					}
				},
			));
			if let Some(err) = failure {
				return Err(err);
			}
			log::debug!("loaded {} leaves", save.len());
			Ok(refresh_positions(&affected))
		})
	}

	/// Number of leaves that own dense arrays.
	pub fn dirty_leaf_count(&self) -> usize {
		self.octree.dirty_leaf_count()
	}

	pub fn node_count(&self) -> usize {
		self.octree.node_count()
	}

	/// Number of leaves whose generator snapshot disagreed with a point query.
	pub fn generator_mismatches(&self) -> u64 {
		self.mismatches.load(Ordering::Relaxed)
	}
}

/// Leaf corners to re-mesh after `leaves` changed, including every neighbour.
fn refresh_positions(leaves: &[IntBox]) -> Vec<IntVector> {
	let mut positions = Vec::with_capacity(leaves.len() * 27);
	for leaf in leaves.iter() {
		positions.push(leaf.min);
		positions.extend(IntVector::neighbor_offsets().map(|offset| leaf.min + offset * CELL_SIZE));
	}
	positions.sort();
	positions.dedup();
	positions
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		data::FlatGenerator,
		world::config::StoreConfig,
	};
	use rand::{rngs::StdRng, Rng, SeedableRng};
	use std::panic::{self, AssertUnwindSafe};

	fn store(config: StoreConfig) -> VolumeStore {
		VolumeStore::new(config, Arc::new(FlatGenerator::new(0))).unwrap()
	}

	fn value_at(store: &VolumeStore, p: IntVector) -> Value {
		let scope = store.read_scope(&IntBox::from_point(p), "reader").unwrap();
		let value = scope.get_value(p);
		value
	}

	#[test]
	fn edit_then_undo_twice() {
		let store = store(StoreConfig::default().with_depth(3).with_undo_redo(true));
		let generator = FlatGenerator::new(0);
		let target = IntVector::new(5, 5, 5);
		let neighbour = IntVector::new(5, 5, 6);
		{
			let scope = store.write_scope(&IntBox::new((5, 5, 5), (6, 6, 7)), "editor").unwrap();
			assert!(scope.set_value(target, Value(-1.0)).unwrap());
			assert!(store.octree().leaf_at(target).unwrap().is_dirty());
			assert_eq!(scope.get_value(target), Value(-1.0));
			assert_eq!(scope.get_value(neighbour), generator.value(neighbour));
		}
		assert_eq!(store.dirty_leaf_count(), 1);
		store.save_frame().unwrap();
		{
			let scope = store.write_scope(&IntBox::from_point(target), "editor").unwrap();
			scope.set_value(target, Value(1.0)).unwrap();
		}
		store.save_frame().unwrap();
		assert_eq!(store.history_position(), 2);
		assert_eq!(store.undo().unwrap().len(), 1);
		assert_eq!(value_at(&store, target), Value(-1.0));
		store.undo().unwrap();
		assert_eq!(value_at(&store, target), generator.value(target));
		assert_eq!(store.history_position(), 0);
		assert!(store.undo().unwrap().is_empty());
		store.redo().unwrap();
		store.redo().unwrap();
		assert_eq!(value_at(&store, target), Value(1.0));
		assert!(store.redo().unwrap().is_empty());
	}

	#[test]
	fn undo_refuses_uncommitted_edits() {
		let store = store(StoreConfig::default().with_depth(2).with_undo_redo(true));
		let p = IntVector::new(-3, 4, 1);
		{
			let scope = store.write_scope(&IntBox::from_point(p), "editor").unwrap();
			scope.set_value(p, Value::FULL).unwrap();
		}
		store.save_frame().unwrap();
		{
			let scope = store.write_scope(&IntBox::from_point(p), "editor").unwrap();
			scope.set_value(p, Value(0.25)).unwrap();
		}
		assert!(!store.is_current_frame_empty().unwrap());
		assert!(matches!(store.undo(), Err(VoxError::UncommittedEdits)));
		assert_eq!(value_at(&store, p), Value(0.25));
		assert_eq!(store.history_position(), 1);
		store.save_frame().unwrap();
		store.undo().unwrap();
		assert_eq!(value_at(&store, p), Value::FULL);
	}

	#[test]
	fn outside_the_world() {
		let store = store(StoreConfig::default().with_depth(1));
		let generator = FlatGenerator::new(0);
		assert_eq!(store.bounds(), IntBox::new((-16, -16, -16), (16, 16, 16)));
		let outside = IntVector::new(100, 0, -40);
		let scope = store.write_scope(&IntBox::new((10, 0, 0), (20, 1, 1)), "editor").unwrap();
		assert!(!scope.set_value(outside, Value::FULL).unwrap());
		assert_eq!(scope.get_value(outside), generator.value(outside));
		scope.set_value(IntVector::new(12, 0, 0), Value::FULL).unwrap();
		let zone = QueryZone::new(IntBox::new((10, 0, 0), (20, 1, 1)));
		let mut values = vec![Value(0.0); zone.len()];
		let mut materials = vec![Material::default(); zone.len()];
		scope.get_values_and_materials(&zone, Some(values.as_mut_slice()), Some(materials.as_mut_slice()));
		assert_eq!(values[2], Value::FULL);
		assert_eq!(values[8], generator.value(IntVector::new(18, 0, 0)));
		assert!(materials.iter().all(|&m| m == generator.material));
		assert_eq!(scope.edit_values(&IntBox::new((30, 30, 30), (40, 40, 40)), |_, value, _| *value = Value::FULL).unwrap(), 0);
	}

	#[test]
	#[cfg_attr(debug_assertions, should_panic)]
	fn write_without_lock_is_a_fault() {
		let store = store(StoreConfig::default().with_depth(2));
		let result = store.set_value(IntVector::ZERO, Value::FULL);
		assert!(matches!(result, Err(VoxError::LockNotHeld)));
		assert_eq!(store.dirty_leaf_count(), 0);
	}

	#[test]
	fn emptiness() {
		let store = store(StoreConfig::default().with_depth(2));
		let sky = IntBox::new((-8, -8, 4), (8, 8, 20));
		{
			let scope = store.read_scope(&sky, "sky").unwrap();
			assert_eq!(scope.is_empty(&sky), EmptyState::Empty);
			assert_eq!(scope.is_empty(&IntBox::new((0, 0, -40), (4, 4, -30))), EmptyState::Full);
		}
		let scope = store.write_scope(&sky, "editor").unwrap();
		scope.edit_values(&IntBox::new((0, 0, 5), (2, 2, 7)), |_, value, _| *value = Value::FULL).unwrap();
		assert_eq!(scope.is_empty(&sky), EmptyState::Unknown);
		assert_eq!(scope.is_empty(&IntBox::new((0, 0, 5), (2, 2, 7))), EmptyState::Full);
	}

	#[test]
	fn save_load_roundtrip() {
		let config = StoreConfig::default().with_depth(3);
		let source = store(config);
		let mut rng = StdRng::seed_from_u64(0x5eed);
		let region = IntBox::new((-40, -40, -40), (40, 40, 40));
		{
			let scope = source.write_scope(&region, "editor").unwrap();
			for _ in 0..200 {
				let p = IntVector::new(rng.gen_range(-40..40), rng.gen_range(-40..40), rng.gen_range(-40..40));
				scope.set_value(p, Value(rng.gen_range(-2.0..2.0))).unwrap();
				scope.set_material(p, Material::single(rng.gen())).unwrap();
			}
		}
		let save = source.save().unwrap();
		assert_eq!(save.len(), source.dirty_leaf_count());
		assert!(save.records.windows(2).all(|w| w[0].id < w[1].id));

		let target = store(config);
		let positions = target.load(&save, false).unwrap();
		assert!(positions.windows(2).all(|w| w[0] < w[1]));
		assert!(positions.len() > save.len());
		assert!(save.records.iter().all(|record| {
			let leaf = target.octree().node_by_id(record.id).unwrap();
			positions.binary_search(&leaf.bounds().min).is_ok()
		}));
		assert_eq!(target.dirty_leaf_count(), save.len());
		let source_scope = source.read_scope(&region, "reader").unwrap();
		let target_scope = target.read_scope(&region, "reader").unwrap();
		for p in region.iter().step_by(7) {
			assert_eq!(source_scope.get_value(p), target_scope.get_value(p));
			assert_eq!(source_scope.get_material(p), target_scope.get_material(p));
		}
		drop(target_scope);

		let reset = target.load(&WorldSave::new(3), true).unwrap();
		assert!(!reset.is_empty());
		assert_eq!(target.dirty_leaf_count(), 0);
		assert!(matches!(
			target.load(&WorldSave::new(4), false),
			Err(VoxError::DepthMismatch { expected: 3, found: 4 })
		));
	}

	#[test]
	fn diffs_replicate_and_are_idempotent() {
		let config = StoreConfig::default().with_depth(3).with_multiplayer(true);
		let host = store(config);
		let client = store(config);
		let edit = IntBox::new((-20, 0, 0), (20, 2, 2));
		{
			let scope = host.write_scope(&edit, "editor").unwrap();
			scope.edit_values(&edit, |p, value, material| {
				*value = Value::FULL;
				if p.x == 0 {
					*material = Material::single(9);
				}
			}).unwrap();
		}
		let batch = host.collect_diffs().unwrap();
		assert!(batch.is_sorted());
		assert!(!batch.is_empty());
		assert!(host.collect_diffs().unwrap().is_empty());
		let first = client.apply_diffs(&batch).unwrap();
		let second = client.apply_diffs(&batch).unwrap();
		assert_eq!(first, second);
		assert!(client.collect_diffs().unwrap().is_empty());
		let scope = client.read_scope(&edit, "reader").unwrap();
		for p in edit.iter() {
			assert_eq!(scope.get_value(p), Value::FULL);
		}
		assert_eq!(scope.get_material(IntVector::new(0, 1, 1)), Material::single(9));
		drop(scope);

		let mut packets = batch.split(100);
		assert!(packets.len() > 1);
		packets[0].values.reverse();
		assert!(matches!(client.apply_diffs(&packets[0]), Err(VoxError::UnsortedDiffs)));
	}

	#[test]
	fn discards_replicate() {
		let config = StoreConfig::default().with_depth(2).with_multiplayer(true);
		let generator = FlatGenerator::new(0);
		let host = store(config);
		let client = store(config);
		let edit = IntBox::new((-4, 0, 0), (4, 2, 2));
		{
			let scope = host.write_scope(&edit, "editor").unwrap();
			scope.edit_values(&edit, |_, value, _| *value = Value::FULL).unwrap();
		}
		client.apply_diffs(&host.collect_diffs().unwrap()).unwrap();
		host.discard_values(|bounds| {
			if bounds.max.x <= 0 {
				DiscardAction::Discard
			} else if bounds.min.x >= 0 {
				DiscardAction::Keep
			} else {
				DiscardAction::Subdivide
			}
		}).unwrap();
		let batch = host.collect_diffs().unwrap();
		assert_eq!(batch.values.len(), 4 * 2 * 2);
		client.apply_diffs(&batch).unwrap();
		let scope = client.read_scope(&edit, "reader").unwrap();
		for p in edit.iter() {
			let expected = if p.x < 0 { generator.value(p) } else { Value::FULL };
			assert_eq!(scope.get_value(p), expected);
		}
	}

	#[test]
	fn discard_by_predicate() {
		let store = store(StoreConfig::default().with_depth(2));
		let generator = FlatGenerator::new(0);
		let edit = IntBox::new((-4, 0, 0), (4, 2, 2));
		{
			let scope = store.write_scope(&edit, "editor").unwrap();
			scope.edit_values(&edit, |_, value, _| *value = Value::FULL).unwrap();
		}
		assert_eq!(store.dirty_leaf_count(), 2);
		let split = |limit: i32| move |bounds: &IntBox| {
			if bounds.max.x <= limit {
				DiscardAction::Discard
			} else if bounds.min.x >= limit {
				DiscardAction::Keep
			} else {
				DiscardAction::Subdivide
			}
		};
		let changed = store.discard_values(split(0)).unwrap();
		assert_eq!(changed, vec![IntBox::cube(IntVector::new(-16, 0, 0), 16)]);
		assert_eq!(store.dirty_leaf_count(), 1);
		let changed = store.discard_values(split(2)).unwrap();
		assert_eq!(changed, vec![IntBox::cube(IntVector::new(0, 0, 0), 16)]);
		let scope = store.read_scope(&edit, "reader").unwrap();
		assert_eq!(scope.get_value(IntVector::new(-2, 0, 0)), generator.value(IntVector::new(-2, 0, 0)));
		assert_eq!(scope.get_value(IntVector::new(1, 1, 1)), generator.value(IntVector::new(1, 1, 1)));
		assert_eq!(scope.get_value(IntVector::new(2, 1, 1)), Value::FULL);
	}

	#[test]
	fn set_generator_discards_edits() {
		let store = store(StoreConfig::default().with_depth(2).with_undo_redo(true));
		let p = IntVector::new(7, 7, 7);
		{
			let scope = store.write_scope(&IntBox::from_point(p), "editor").unwrap();
			scope.set_value(p, Value::FULL).unwrap();
		}
		store.save_frame().unwrap();
		let reset = store.set_generator(Arc::new(FlatGenerator::new(100))).unwrap();
		assert_eq!(reset.len(), 1);
		assert_eq!(store.dirty_leaf_count(), 0);
		assert_eq!(store.history_position(), 0);
		assert_eq!(value_at(&store, p), FlatGenerator::new(100).value(p));
	}

	#[test]
	fn timed_begin_reports_holder() {
		let store = Arc::new(store(StoreConfig::default().with_depth(2)));
		let bounds = IntBox::new((0, 0, 0), (4, 4, 4));
		let tokens = store.begin_write(&bounds, "editor").unwrap();
		assert_eq!(tokens.kind(), LockKind::Write);
		let other = Arc::clone(&store);
		let result = thread::spawn(move || {
			other.try_begin_read(&bounds, "mesher", Duration::from_millis(20))
		}).join().unwrap();
		match result {
			Err(VoxError::LockTimeout { holder, .. }) => assert_eq!(holder, "editor"),
			other => panic!("expected a timeout, got {other:?}"),
		}
		store.end_write(tokens).unwrap();
		let tokens = store.try_begin_read(&bounds, "mesher", Duration::from_millis(20)).unwrap();
		store.end_read(tokens).unwrap();
	}

	#[test]
	fn ending_with_the_wrong_kind_still_releases() {
		let store = store(StoreConfig::default().with_depth(1));
		let bounds = IntBox::from_point((0, 0, 0));
		let tokens = store.begin_read(&bounds, "reader").unwrap();
		let result = panic::catch_unwind(AssertUnwindSafe(|| store.end_write(tokens)));
		match result {
			Ok(result) => assert!(matches!(result, Err(VoxError::MalformedTokens))),
			Err(_) => assert!(cfg!(debug_assertions)),
		}
		let tokens = store.try_begin_write(&bounds, "writer", Duration::from_millis(200)).unwrap();
		store.end_write(tokens).unwrap();
	}

	#[test]
	fn tokens_can_be_ended_by_another_thread() {
		let store = Arc::new(store(StoreConfig::default().with_depth(2)));
		let bounds = IntBox::new((0, 0, 0), (4, 4, 4));
		let mine = store.begin_read(&bounds, "mine").unwrap();
		let other = Arc::clone(&store);
		let theirs = thread::spawn(move || other.begin_read(&bounds, "theirs").unwrap()).join().unwrap();
		assert_ne!(theirs.owner(), mine.owner());
		store.end_read(theirs).unwrap();
		let leaf = store.octree().node_by_id(mine.ids()[0]).unwrap();
		assert!(store.octree().is_locked_by_current_thread(&leaf, LockKind::Read));
		assert_eq!(value_at(&store, IntVector::new(1, 1, 1)), FlatGenerator::new(0).value(IntVector::new(1, 1, 1)));
		store.end_read(mine).unwrap();
		assert!(!leaf.lock.is_locked_for_read());
	}
}
