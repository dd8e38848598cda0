use std::io::{Read, Write};

use byteorder::{
	BigEndian,
	ReadBytesExt,
	WriteBytesExt,
};

use crate::{
	data::{Material, Value},
	ioext::*,
	math::CELL_COUNT,
	octree::NodeId,
	VoxError,
	VoxResult,
};

/// The dense arrays of one dirty leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRecord {
	pub id: NodeId,
	pub values: Box<[Value]>,
	pub materials: Box<[Material]>,
}

impl LeafRecord {
	pub fn new(id: NodeId, values: &[Value], materials: &[Material]) -> Self {
		Self {
			id,
			values: values.into(),
			materials: materials.into(),
		}
	}

	fn check_length(&self) -> VoxResult<()> {
		if self.values.len() != CELL_COUNT || self.materials.len() != CELL_COUNT {
			return Err(VoxError::InvalidSave("leaf record has the wrong length"));
		}
		Ok(())
	}
}

impl Readable for LeafRecord {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		let id: NodeId = reader.read_value()?;
		let mut values = vec![Value::default(); CELL_COUNT].into_boxed_slice();
		reader.read_f32_into::<BigEndian>(bytemuck::cast_slice_mut(&mut values[..]))?;
		let mut materials = vec![Material::default(); CELL_COUNT].into_boxed_slice();
		reader.read_exact(bytemuck::cast_slice_mut(&mut materials[..]))?;
		Ok(Self {
			id,
			values,
			materials,
		})
	}
}

impl Writable for LeafRecord {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		self.check_length()?;
		let mut length = writer.write_value(self.id)?;
		let floats: &[f32] = bytemuck::cast_slice(&self.values[..]);
		for &value in floats {
			writer.write_f32::<BigEndian>(value)?;
		}
		length += floats.len() * 4;
		let bytes: &[u8] = bytemuck::cast_slice(&self.materials[..]);
		writer.write_all(bytes)?;
		length += bytes.len();
		Ok(length)
	}
}

/// Every dirty leaf of a store, sorted by ascending id.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSave {
	pub depth: u8,
	pub records: Vec<LeafRecord>,
}

impl WorldSave {
	pub fn new(depth: u8) -> Self {
		Self {
			depth,
			records: Vec::new(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	/// Checks the invariants `load` depends on: strictly ascending leaf ids
	/// of a tree of this depth, and full length arrays.
	pub fn validate(&self) -> VoxResult<()> {
		if self.depth > NodeId::MAX_DEPTH {
			return Err(VoxError::InvalidSave("depth is too large"));
		}
		if !self.records.windows(2).all(|w| w[0].id < w[1].id) {
			return Err(VoxError::InvalidSave("records are not sorted by ascending id"));
		}
		for record in self.records.iter() {
			if !record.id.is_leaf_id(self.depth) {
				return Err(VoxError::InvalidLeafId(record.id.0));
			}
			record.check_length()?;
		}
		Ok(())
	}
}

impl Readable for WorldSave {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		let depth: u8 = reader.read_value()?;
		let count: u32 = reader.read_value()?;
		let mut records = Vec::with_capacity(count.min(1024) as usize);
		for _ in 0..count {
			records.push(reader.read_value::<LeafRecord>()?);
		}
		let save = Self {
			depth,
			records,
		};
		save.validate()?;
		Ok(save)
	}
}

impl Writable for WorldSave {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		let mut length = writer.write_value(self.depth)?;
		length += writer.write_value(self.records.len() as u32)?;
		for record in self.records.iter() {
			length += writer.write_value(record)?;
		}
		Ok(length)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(id: NodeId, fill: f32) -> LeafRecord {
		LeafRecord::new(id, &[Value(fill); CELL_COUNT], &[Material::new(1, 2, 3, 4); CELL_COUNT])
	}

	#[test]
	fn encode_decode() {
		let leaf = NodeId::ROOT.child(0, 3);
		let save = WorldSave {
			depth: 1,
			records: vec![record(leaf, -0.25)],
		};
		let mut buffer = Vec::new();
		let written = buffer.write_value(&save).unwrap();
		assert_eq!(written, buffer.len());
		assert_eq!(written, 1 + 4 + 8 + CELL_COUNT * 8);
		let decoded: WorldSave = buffer.as_slice().read_value().unwrap();
		assert_eq!(decoded, save);
	}

	#[test]
	fn rejects_bad_records() {
		let first = NodeId::ROOT.child(0, 1);
		let second = NodeId::ROOT.child(0, 2);
		let unsorted = WorldSave {
			depth: 1,
			records: vec![record(second, 0.0), record(first, 0.0)],
		};
		assert!(matches!(unsorted.validate(), Err(VoxError::InvalidSave(_))));
		let not_a_leaf = WorldSave {
			depth: 2,
			records: vec![record(first, 0.0)],
		};
		assert!(matches!(not_a_leaf.validate(), Err(VoxError::InvalidLeafId(_))));
		let short = WorldSave {
			depth: 1,
			records: vec![LeafRecord::new(first, &[Value(0.0)], &[Material::default()])],
		};
		assert!(short.validate().is_err());
		assert!(Vec::<u8>::new().write_value(&short).is_err());
	}
}
