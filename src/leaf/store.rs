use crate::{
	data::{
		Material,
		QueryZone,
		Value,
		WorldGenerator,
	},
	math::{
		cell_coords,
		cell_index,
		IntBox,
		IntVector,
		CELL_COUNT,
	},
	octree::NodeId,
	VoxResult,
};

use super::{
	diff::{
		DiffBatch,
		DirtySet,
		MaterialDiff,
		ValueDiff,
	},
	history::{
		EditHistory,
		Frame,
	},
};

/// Which change tracking a leaf carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafOptions {
	pub history: bool,
	pub diffs: bool,
}

/// The result of making sure a leaf owns its arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
	/// The leaf was already dirty.
	Existing,
	/// The generator was copied into fresh arrays.
	Taken,
	/// The generator was copied, but a point query disagreed with its batched output.
	Inconsistent,
}

/// Dense storage of a LOD 0 leaf.
///
/// A clean leaf owns nothing and reads through to the generator. The first
/// write copies the generator's output for the whole leaf and edits that copy.
#[derive(Debug)]
pub struct LeafStore {
	bounds: IntBox,
	values: Option<Box<[Value]>>,
	materials: Option<Box<[Material]>>,
	history: Option<EditHistory>,
	diffs: Option<DirtySet>,
}

impl LeafStore {
	pub fn new(bounds: IntBox, options: LeafOptions) -> Self {
		debug_assert_eq!(bounds.count() as usize, CELL_COUNT);
		Self {
			bounds,
			values: None,
			materials: None,
			history: options.history.then(EditHistory::new),
			diffs: options.diffs.then(DirtySet::new),
		}
	}

	pub fn bounds(&self) -> IntBox {
		self.bounds
	}

	#[inline(always)]
	pub fn is_dirty(&self) -> bool {
		debug_assert_eq!(self.values.is_some(), self.materials.is_some());
		self.values.is_some()
	}

	#[inline(always)]
	pub fn local_index(&self, p: IntVector) -> usize {
		debug_assert!(self.bounds.contains(p), "{p:?} outside {:?}", self.bounds);
		cell_index(p - self.bounds.min)
	}

	/// World position of a cell index.
	pub fn position(&self, index: usize) -> IntVector {
		self.bounds.min + cell_coords(index)
	}

	pub fn values(&self) -> Option<&[Value]> {
		self.values.as_deref()
	}

	pub fn materials(&self) -> Option<&[Material]> {
		self.materials.as_deref()
	}

	pub fn history(&self) -> Option<&EditHistory> {
		self.history.as_ref()
	}

	pub fn value(&self, p: IntVector, generator: &dyn WorldGenerator) -> Value {
		match &self.values {
			Some(values) => values[self.local_index(p)],
			None => generator.value(p),
		}
	}

	pub fn material(&self, p: IntVector, generator: &dyn WorldGenerator) -> Material {
		match &self.materials {
			Some(materials) => materials[self.local_index(p)],
			None => generator.material(p),
		}
	}

	pub fn read(&self, p: IntVector, generator: &dyn WorldGenerator) -> (Value, Material) {
		(self.value(p, generator), self.material(p, generator))
	}

	/// Copies the part of `zone` inside this leaf into the buffers.
	pub fn fill_zone(
		&self,
		zone: &QueryZone,
		mut values: Option<&mut [Value]>,
		mut materials: Option<&mut [Material]>,
		generator: &dyn WorldGenerator,
	) {
		let Some(zone) = zone.sub_zone(&self.bounds) else {
			return;
		};
		let (Some(own_values), Some(own_materials)) = (&self.values, &self.materials) else {
			generator.fill(&zone, values, materials);
			return;
		};
		for p in zone.region.iter() {
			let source = self.local_index(p);
			let target = zone.index(p);
			if let Some(values) = values.as_deref_mut() {
				values[target] = own_values[source];
			}
			if let Some(materials) = materials.as_deref_mut() {
				materials[target] = own_materials[source];
			}
		}
	}

	/// Makes the leaf dirty, copying the generator's output into new arrays.
	pub fn materialize(&mut self, generator: &dyn WorldGenerator) -> Snapshot {
		if self.is_dirty() {
			return Snapshot::Existing;
		}
		let (values, materials) = generated(self.bounds, generator);
		let corner = self.bounds.min;
		let consistent = generator.value(corner) == values[0]
			&& generator.material(corner) == materials[0];
		self.values = Some(values);
		self.materials = Some(materials);
		if consistent {
			Snapshot::Taken
		} else {
			log::warn!(
				"generator returned different data for {corner:?} when queried twice, leaf {:?} keeps its batched snapshot",
				self.bounds
			);
			Snapshot::Inconsistent
		}
	}

	/// Sets the value and/or material of one cell.
	/// The previous contents are recorded even if they don't change.
	pub fn write(
		&mut self,
		p: IntVector,
		value: Option<Value>,
		material: Option<Material>,
		generator: &dyn WorldGenerator,
	) -> Snapshot {
		let snapshot = self.materialize(generator);
		let index = self.local_index(p);
		let (Some(values), Some(materials)) = (self.values.as_deref_mut(), self.materials.as_deref_mut()) else {
			return snapshot;
		};
		if let Some(value) = value {
			if let Some(history) = self.history.as_mut() {
				history.record_value(index, values[index]);
			}
			if let Some(diffs) = self.diffs.as_mut() {
				diffs.mark_value(index);
			}
			values[index] = value;
		}
		if let Some(material) = material {
			if let Some(history) = self.history.as_mut() {
				history.record_material(index, materials[index]);
			}
			if let Some(diffs) = self.diffs.as_mut() {
				diffs.mark_material(index);
			}
			materials[index] = material;
		}
		snapshot
	}

	/// Runs `edit` on every cell of `region` inside this leaf.
	/// Only cells whose contents change are recorded.
	/// Returns the snapshot outcome and the number of changed cells.
	pub fn edit<F>(&mut self, region: &IntBox, generator: &dyn WorldGenerator, edit: &mut F) -> (Snapshot, usize)
	where
	F: FnMut(IntVector, &mut Value, &mut Material) {
		let Some(region) = self.bounds.overlap(region) else {
			return (Snapshot::Existing, 0);
		};
		let snapshot = self.materialize(generator);
		let bounds_min = self.bounds.min;
		let (Some(values), Some(materials)) = (self.values.as_deref_mut(), self.materials.as_deref_mut()) else {
			return (snapshot, 0);
		};
		let mut changed = 0;
		for p in region.iter() {
			let index = cell_index(p - bounds_min);
			let mut value = values[index];
			let mut material = materials[index];
			edit(p, &mut value, &mut material);
			let mut touched = false;
			if value != values[index] {
				if let Some(history) = self.history.as_mut() {
					history.record_value(index, values[index]);
				}
				if let Some(diffs) = self.diffs.as_mut() {
					diffs.mark_value(index);
				}
				values[index] = value;
				touched = true;
			}
			if material != materials[index] {
				if let Some(history) = self.history.as_mut() {
					history.record_material(index, materials[index]);
				}
				if let Some(diffs) = self.diffs.as_mut() {
					diffs.mark_material(index);
				}
				materials[index] = material;
				touched = true;
			}
			changed += touched as usize;
		}
		(snapshot, changed)
	}

	/// Frees the arrays, returning the leaf to the generator.
	/// History is kept. With diffs on, every cell that differed from the
	/// generator is marked so that replicas reset it too.
	/// Returns true if the leaf was dirty.
	pub fn reset(&mut self, generator: &dyn WorldGenerator) -> bool {
		let (Some(values), Some(materials)) = (self.values.take(), self.materials.take()) else {
			return false;
		};
		if let Some(diffs) = self.diffs.as_mut() {
			let (restored_values, restored_materials) = generated(self.bounds, generator);
			for index in 0..CELL_COUNT {
				if values[index] != restored_values[index] {
					diffs.mark_value(index);
				}
				if materials[index] != restored_materials[index] {
					diffs.mark_material(index);
				}
			}
		}
		true
	}

	/// Frees the arrays and drops pending diffs. History is kept.
	/// Returns true if the leaf was dirty.
	pub fn clear(&mut self) -> bool {
		if let Some(diffs) = self.diffs.as_mut() {
			diffs.clear();
		}
		let was_dirty = self.is_dirty();
		self.values = None;
		self.materials = None;
		was_dirty
	}

	/// Restores individual cells from the generator.
	/// `discard` decides per cell. Nothing is recorded in history, but
	/// restored cells that change are marked for replication.
	/// Returns true if any cell was restored.
	pub fn discard_cells<F>(&mut self, generator: &dyn WorldGenerator, mut discard: F) -> bool
	where
	F: FnMut(IntVector) -> bool {
		let bounds = self.bounds;
		let (Some(values), Some(materials)) = (self.values.as_deref_mut(), self.materials.as_deref_mut()) else {
			return false;
		};
		let mut diffs = self.diffs.as_mut();
		let mut any = false;
		for (index, p) in (0..CELL_COUNT).map(|index| (index, bounds.min + cell_coords(index))) {
			if !discard(p) {
				continue;
			}
			let value = generator.value(p);
			let material = generator.material(p);
			if let Some(diffs) = diffs.as_deref_mut() {
				if value != values[index] {
					diffs.mark_value(index);
				}
				if material != materials[index] {
					diffs.mark_material(index);
				}
			}
			values[index] = value;
			materials[index] = material;
			any = true;
		}
		any
	}

	/// Replaces the contents with loaded arrays. Nothing is recorded.
	pub fn load(&mut self, values: &[Value], materials: &[Material]) -> VoxResult<()> {
		if values.len() != CELL_COUNT || materials.len() != CELL_COUNT {
			return Err(crate::VoxError::InvalidSave("leaf record has the wrong length"));
		}
		self.values = Some(values.into());
		self.materials = Some(materials.into());
		Ok(())
	}

	/// Applies received diffs for this leaf. Nothing is recorded or re-marked.
	pub fn apply_diffs(
		&mut self,
		values: &[ValueDiff],
		materials: &[MaterialDiff],
		generator: &dyn WorldGenerator,
		modified: &mut Vec<IntVector>,
	) -> Snapshot {
		let snapshot = self.materialize(generator);
		let bounds_min = self.bounds.min;
		let (Some(own_values), Some(own_materials)) = (self.values.as_deref_mut(), self.materials.as_deref_mut()) else {
			return snapshot;
		};
		for diff in values.iter() {
			own_values[diff.index as usize] = diff.value;
			modified.push(bounds_min + cell_coords(diff.index as usize));
		}
		for diff in materials.iter() {
			own_materials[diff.index as usize] = diff.material;
			modified.push(bounds_min + cell_coords(diff.index as usize));
		}
		snapshot
	}

	/// Emits pending diffs for this leaf. A leaf that was reset since its
	/// cells were marked sends the generator's contents.
	pub fn collect_diffs(&mut self, id: NodeId, out: &mut DiffBatch, generator: &dyn WorldGenerator) {
		let Some(diffs) = self.diffs.as_mut().filter(|diffs| !diffs.is_empty()) else {
			return;
		};
		match (self.values.as_deref(), self.materials.as_deref()) {
			(Some(values), Some(materials)) => diffs.drain_into(id, values, materials, out),
			_ => {
				let (values, materials) = generated(self.bounds, generator);
				diffs.drain_into(id, &values, &materials, out);
			}
		}
	}

	pub fn is_current_frame_empty(&self) -> bool {
		self.history.as_ref().map_or(true, EditHistory::is_current_frame_empty)
	}

	pub fn save_frame(&mut self, history_position: u64) {
		if let Some(history) = self.history.as_mut() {
			history.save_frame(history_position);
		}
	}

	pub fn clear_frames(&mut self) {
		if let Some(history) = self.history.as_mut() {
			history.clear_frames();
		}
	}

	/// Undoes the frame at `history_position`.
	/// A leaf that was reset since is rebuilt from the generator first.
	/// Returns `None` if the leaf had nothing to undo at that position.
	pub fn undo(&mut self, history_position: u64, generator: &dyn WorldGenerator) -> VoxResult<Option<Snapshot>> {
		self.step(history_position, generator, true)
	}

	/// Redoes the frame at `history_position`. See [LeafStore::undo].
	pub fn redo(&mut self, history_position: u64, generator: &dyn WorldGenerator) -> VoxResult<Option<Snapshot>> {
		self.step(history_position, generator, false)
	}

	fn step(&mut self, history_position: u64, generator: &dyn WorldGenerator, undo: bool) -> VoxResult<Option<Snapshot>> {
		let Some(history) = self.history.as_ref() else {
			return Ok(None);
		};
		history.check_current_frame(if undo { "undo" } else { "redo" })?;
		let ready = if undo {
			history.can_undo(history_position)
		} else {
			history.can_redo(history_position)
		};
		if !ready {
			return Ok(None);
		}
		let snapshot = self.materialize(generator);
		let (Some(history), Some(values), Some(materials)) = (self.history.as_mut(), self.values.as_deref_mut(), self.materials.as_deref_mut()) else {
			return Ok(None);
		};
		let frame: Option<&Frame> = if undo {
			history.undo(history_position, values, materials)?
		} else {
			history.redo(history_position, values, materials)?
		};
		if let (Some(frame), Some(diffs)) = (frame, self.diffs.as_mut()) {
			for &(index, _) in frame.values.iter() {
				diffs.mark_value(index as usize);
			}
			for &(index, _) in frame.materials.iter() {
				diffs.mark_material(index as usize);
			}
		}
		Ok(Some(snapshot))
	}
}

/// The generator's contents of a whole leaf.
fn generated(bounds: IntBox, generator: &dyn WorldGenerator) -> (Box<[Value]>, Box<[Material]>) {
	let mut values = vec![Value::default(); CELL_COUNT].into_boxed_slice();
	let mut materials = vec![Material::default(); CELL_COUNT].into_boxed_slice();
	let zone = QueryZone::new(bounds);
	generator.fill(&zone, Some(&mut values[..]), Some(&mut materials[..]));
	(values, materials)
}
