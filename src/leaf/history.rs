use sorted_vec::SortedVec;

use crate::{
	data::{Material, Value},
	VoxError,
	VoxResult,
};

/// The previous contents of every cell touched by one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
	pub history_position: u64,
	pub values: Vec<(u16, Value)>,
	pub materials: Vec<(u16, Material)>,
}

impl Frame {
	fn new(history_position: u64) -> Self {
		Self {
			history_position,
			..Default::default()
		}
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty() && self.materials.is_empty()
	}

	/// Writes this frame into the arrays and returns what it overwrote,
	/// tagged with `history_position`.
	fn apply(&self, history_position: u64, values: &mut [Value], materials: &mut [Material]) -> Frame {
		let mut inverse = Frame::new(history_position);
		inverse.values.reserve(self.values.len());
		for &(index, value) in self.values.iter() {
			let slot = &mut values[index as usize];
			inverse.values.push((index, *slot));
			*slot = value;
		}
		inverse.materials.reserve(self.materials.len());
		for &(index, material) in self.materials.iter() {
			let slot = &mut materials[index as usize];
			inverse.materials.push((index, *slot));
			*slot = material;
		}
		inverse
	}
}

/// Undo and redo stacks of a single leaf.
///
/// Edits accumulate in the current frame until [EditHistory::save_frame]
/// commits them. Only the first previous value of a cell is kept per commit.
#[derive(Debug)]
pub struct EditHistory {
	current: Frame,
	recorded_values: SortedVec<u16>,
	recorded_materials: SortedVec<u16>,
	undo_stack: Vec<Frame>,
	redo_stack: Vec<Frame>,
}

impl EditHistory {
	pub fn new() -> Self {
		Self {
			current: Frame::default(),
			recorded_values: SortedVec::new(),
			recorded_materials: SortedVec::new(),
			undo_stack: Vec::new(),
			redo_stack: Vec::new(),
		}
	}

	pub fn record_value(&mut self, index: usize, previous: Value) {
		let index = index as u16;
		if self.recorded_values.binary_search(&index).is_err() {
			self.recorded_values.insert(index);
			self.current.values.push((index, previous));
		}
	}

	pub fn record_material(&mut self, index: usize, previous: Material) {
		let index = index as u16;
		if self.recorded_materials.binary_search(&index).is_err() {
			self.recorded_materials.insert(index);
			self.current.materials.push((index, previous));
		}
	}

	pub fn is_current_frame_empty(&self) -> bool {
		self.current.is_empty()
	}

	/// Commits the current frame at `history_position`. Always invalidates redo.
	pub fn save_frame(&mut self, history_position: u64) {
		if !self.current.is_empty() {
			let mut frame = std::mem::take(&mut self.current);
			frame.history_position = history_position;
			self.undo_stack.push(frame);
			self.recorded_values = SortedVec::new();
			self.recorded_materials = SortedVec::new();
		}
		self.redo_stack.clear();
	}

	/// Tests if [EditHistory::undo] at `history_position` would apply a frame.
	pub fn can_undo(&self, history_position: u64) -> bool {
		self.undo_stack.last().map_or(false, |frame| frame.history_position == history_position)
	}

	pub fn can_redo(&self, history_position: u64) -> bool {
		self.redo_stack.last().map_or(false, |frame| frame.history_position == history_position)
	}

	/// Reverts the frame committed at `history_position`, if it is on top of the
	/// undo stack. The overwritten contents go to the redo stack tagged
	/// `history_position + 1`, which is returned.
	pub fn undo(&mut self, history_position: u64, values: &mut [Value], materials: &mut [Material]) -> VoxResult<Option<&Frame>> {
		self.check_current_frame("undo")?;
		if !self.can_undo(history_position) {
			return Ok(None);
		}
		let Some(frame) = self.undo_stack.pop() else {
			return Ok(None);
		};
		let inverse = frame.apply(history_position + 1, values, materials);
		self.redo_stack.push(inverse);
		Ok(self.redo_stack.last())
	}

	/// Reapplies the frame undone at `history_position`, if it is on top of the
	/// redo stack. The overwritten contents go back to the undo stack tagged
	/// `history_position - 1`, which is returned.
	pub fn redo(&mut self, history_position: u64, values: &mut [Value], materials: &mut [Material]) -> VoxResult<Option<&Frame>> {
		self.check_current_frame("redo")?;
		if !self.can_redo(history_position) {
			return Ok(None);
		}
		let Some(frame) = self.redo_stack.pop() else {
			return Ok(None);
		};
		let inverse = frame.apply(history_position.saturating_sub(1), values, materials);
		self.undo_stack.push(inverse);
		Ok(self.undo_stack.last())
	}

	/// Drops every frame, including uncommitted edits.
	pub fn clear_frames(&mut self) {
		self.current = Frame::default();
		self.recorded_values = SortedVec::new();
		self.recorded_materials = SortedVec::new();
		self.undo_stack.clear();
		self.redo_stack.clear();
	}

	pub fn undo_depth(&self) -> usize {
		self.undo_stack.len()
	}

	pub fn redo_depth(&self) -> usize {
		self.redo_stack.len()
	}

	/// Fails with a warning if there are uncommitted edits.
	pub fn check_current_frame(&self, operation: &str) -> VoxResult<()> {
		if self.current.is_empty() {
			Ok(())
		} else {
			log::warn!("{operation} ignored: current frame has uncommitted edits, save the frame first");
			Err(VoxError::UncommittedEdits)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn arrays() -> (Vec<Value>, Vec<Material>) {
		(vec![Value(0.5); 8], vec![Material::single(0); 8])
	}

	fn set(history: &mut EditHistory, values: &mut [Value], index: usize, value: f32) {
		history.record_value(index, values[index]);
		values[index] = Value(value);
	}

	#[test]
	fn undo_redo_inverse() {
		let (mut values, mut materials) = arrays();
		let mut history = EditHistory::new();
		set(&mut history, &mut values, 3, -1.0);
		set(&mut history, &mut values, 3, -2.0);
		history.record_material(1, materials[1]);
		materials[1] = Material::single(9);
		history.save_frame(1);
		assert!(history.is_current_frame_empty());
		let before = (values.clone(), materials.clone());

		let redo = history.undo(1, &mut values, &mut materials).unwrap().cloned().unwrap();
		assert_eq!(redo.history_position, 2);
		assert_eq!(values[3], Value(0.5));
		assert_eq!(materials[1], Material::single(0));

		let undo = history.redo(2, &mut values, &mut materials).unwrap().cloned().unwrap();
		assert_eq!(undo.history_position, 1);
		assert_eq!((values, materials), before);
	}

	#[test]
	fn first_previous_value_wins() {
		let (mut values, _) = arrays();
		let mut history = EditHistory::new();
		set(&mut history, &mut values, 0, 1.0);
		set(&mut history, &mut values, 0, 2.0);
		set(&mut history, &mut values, 0, 3.0);
		history.save_frame(0);
		assert_eq!(history.undo_stack[0].values, vec![(0, Value(0.5))]);
	}

	#[test]
	fn positions_must_match() {
		let (mut values, mut materials) = arrays();
		let mut history = EditHistory::new();
		set(&mut history, &mut values, 2, 1.0);
		history.save_frame(1);
		assert!(history.undo(0, &mut values, &mut materials).unwrap().is_none());
		assert!(history.redo(2, &mut values, &mut materials).unwrap().is_none());
		assert_eq!(values[2], Value(1.0));
		assert!(history.undo(1, &mut values, &mut materials).unwrap().is_some());
		assert_eq!(values[2], Value(0.5));
	}

	#[test]
	fn empty_commit_still_invalidates_redo() {
		let (mut values, mut materials) = arrays();
		let mut history = EditHistory::new();
		set(&mut history, &mut values, 1, 1.0);
		history.save_frame(0);
		history.undo(0, &mut values, &mut materials).unwrap();
		assert_eq!(history.redo_depth(), 1);
		history.save_frame(0);
		assert_eq!(history.redo_depth(), 0);
		assert_eq!(history.undo_depth(), 0);
	}

	#[test]
	fn uncommitted_edits_block_undo() {
		let (mut values, mut materials) = arrays();
		let mut history = EditHistory::new();
		set(&mut history, &mut values, 1, 1.0);
		history.save_frame(0);
		set(&mut history, &mut values, 1, 2.0);
		let result = history.undo(0, &mut values, &mut materials);
		assert!(matches!(result, Err(VoxError::UncommittedEdits)));
		assert_eq!(values[1], Value(2.0));
		assert_eq!(history.undo_depth(), 1);
	}
}
