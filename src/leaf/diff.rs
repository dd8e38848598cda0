use std::io::{Read, Write};

use sorted_vec::SortedVec;

use crate::{
	data::{Material, Value},
	ioext::*,
	octree::NodeId,
	VoxError,
	VoxResult,
};

/// Post-edit value of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueDiff {
	pub id: NodeId,
	pub index: u16,
	pub value: Value,
}

/// Post-edit material of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialDiff {
	pub id: NodeId,
	pub index: u16,
	pub material: Material,
}

/// Cells modified since the last synchronization, per leaf.
#[derive(Debug)]
pub struct DirtySet {
	values: SortedVec<u16>,
	materials: SortedVec<u16>,
}

impl DirtySet {
	pub fn new() -> Self {
		Self {
			values: SortedVec::new(),
			materials: SortedVec::new(),
		}
	}

	pub fn mark_value(&mut self, index: usize) {
		mark(&mut self.values, index as u16);
	}

	pub fn mark_material(&mut self, index: usize) {
		mark(&mut self.materials, index as u16);
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty() && self.materials.is_empty()
	}

	pub fn clear(&mut self) {
		self.values = SortedVec::new();
		self.materials = SortedVec::new();
	}

	/// Emits the current contents of every marked cell in ascending index order,
	/// then clears the marks.
	pub fn drain_into(&mut self, id: NodeId, values: &[Value], materials: &[Material], out: &mut DiffBatch) {
		let marked = std::mem::replace(&mut self.values, SortedVec::new());
		out.values.extend(marked.iter().map(|&index| ValueDiff {
			id,
			index,
			value: values[index as usize],
		}));
		let marked = std::mem::replace(&mut self.materials, SortedVec::new());
		out.materials.extend(marked.iter().map(|&index| MaterialDiff {
			id,
			index,
			material: materials[index as usize],
		}));
	}
}

fn mark(set: &mut SortedVec<u16>, index: u16) {
	if set.binary_search(&index).is_err() {
		set.insert(index);
	}
}

/// A replication packet. Records are sorted by ascending leaf id so the
/// receiver can apply them in one walk down the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffBatch {
	pub values: Vec<ValueDiff>,
	pub materials: Vec<MaterialDiff>,
}

impl DiffBatch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty() && self.materials.is_empty()
	}

	pub fn len(&self) -> usize {
		self.values.len() + self.materials.len()
	}

	/// Tests that both record lists are ordered by leaf id.
	pub fn is_sorted(&self) -> bool {
		self.values.windows(2).all(|w| w[0].id <= w[1].id)
		&& self.materials.windows(2).all(|w| w[0].id <= w[1].id)
	}

	/// Groups the records by leaf in ascending id order.
	/// The batch must be sorted.
	pub fn leaves(&self) -> Vec<LeafDiffs<'_>> {
		debug_assert!(self.is_sorted());
		let mut groups = Vec::new();
		let (mut v, mut m) = (0, 0);
		while v < self.values.len() || m < self.materials.len() {
			let id = match (self.values.get(v), self.materials.get(m)) {
				(Some(value), Some(material)) => value.id.min(material.id),
				(Some(value), None) => value.id,
				(None, Some(material)) => material.id,
				(None, None) => break,
			};
			let value_end = v + self.values[v..].iter().take_while(|diff| diff.id == id).count();
			let material_end = m + self.materials[m..].iter().take_while(|diff| diff.id == id).count();
			groups.push(LeafDiffs {
				id,
				values: &self.values[v..value_end],
				materials: &self.materials[m..material_end],
			});
			v = value_end;
			m = material_end;
		}
		groups
	}

	/// Splits the batch into packets of at most `max_records` records each.
	/// Every packet stays sorted.
	pub fn split(&self, max_records: usize) -> Vec<DiffBatch> {
		let max_records = max_records.max(1);
		let mut packets = Vec::new();
		for chunk in self.values.chunks(max_records) {
			packets.push(DiffBatch {
				values: chunk.to_vec(),
				materials: Vec::new(),
			});
		}
		for chunk in self.materials.chunks(max_records) {
			packets.push(DiffBatch {
				values: Vec::new(),
				materials: chunk.to_vec(),
			});
		}
		packets
	}
}

/// The records of a [DiffBatch] that target one leaf.
#[derive(Debug, Clone, Copy)]
pub struct LeafDiffs<'a> {
	pub id: NodeId,
	pub values: &'a [ValueDiff],
	pub materials: &'a [MaterialDiff],
}

impl Readable for DiffBatch {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		let value_count: u32 = reader.read_value()?;
		let mut values = Vec::with_capacity(value_count.min(1 << 16) as usize);
		for _ in 0..value_count {
			values.push(ValueDiff {
				id: reader.read_value()?,
				index: reader.read_value()?,
				value: reader.read_value()?,
			});
		}
		let material_count: u32 = reader.read_value()?;
		let mut materials = Vec::with_capacity(material_count.min(1 << 16) as usize);
		for _ in 0..material_count {
			materials.push(MaterialDiff {
				id: reader.read_value()?,
				index: reader.read_value()?,
				material: reader.read_value()?,
			});
		}
		let batch = Self {
			values,
			materials,
		};
		if !batch.is_sorted() {
			return Err(VoxError::UnsortedDiffs);
		}
		Ok(batch)
	}
}

impl Writable for DiffBatch {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		let mut length = writer.write_value(self.values.len() as u32)?;
		for diff in self.values.iter() {
			length += writer.write_value(diff.id)?;
			length += writer.write_value(diff.index)?;
			length += writer.write_value(diff.value)?;
		}
		length += writer.write_value(self.materials.len() as u32)?;
		for diff in self.materials.iter() {
			length += writer.write_value(diff.id)?;
			length += writer.write_value(diff.index)?;
			length += writer.write_value(diff.material)?;
		}
		Ok(length)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drain_is_sorted_and_clears() {
		let mut dirty = DirtySet::new();
		for index in [40, 3, 40, 17] {
			dirty.mark_value(index);
		}
		dirty.mark_material(5);
		let values = (0..64).map(|i| Value(i as f32)).collect::<Vec<_>>();
		let materials = vec![Material::single(7); 64];
		let mut batch = DiffBatch::new();
		dirty.drain_into(NodeId(9), &values, &materials, &mut batch);
		assert!(dirty.is_empty());
		let indices = batch.values.iter().map(|d| d.index).collect::<Vec<_>>();
		assert_eq!(indices, vec![3, 17, 40]);
		assert_eq!(batch.values[2].value, Value(40.0));
		assert_eq!(batch.materials, vec![MaterialDiff { id: NodeId(9), index: 5, material: Material::single(7) }]);
	}

	#[test]
	fn split_and_encode() {
		let batch = DiffBatch {
			values: (0..5).map(|i| ValueDiff { id: NodeId(i / 2), index: i as u16, value: Value(-1.0) }).collect(),
			materials: vec![MaterialDiff { id: NodeId(4), index: 1, material: Material::new(1, 2, 3, 4) }],
		};
		let packets = batch.split(2);
		assert_eq!(packets.len(), 4);
		assert!(packets.iter().all(|p| p.len() <= 2 && p.is_sorted()));
		let mut buffer = Vec::new();
		let written = buffer.write_value(&packets[0]).unwrap();
		assert_eq!(written, buffer.len());
		let decoded: DiffBatch = buffer.as_slice().read_value().unwrap();
		assert_eq!(decoded, packets[0]);
	}

	#[test]
	fn grouped_by_leaf() {
		let batch = DiffBatch {
			values: vec![
				ValueDiff { id: NodeId(1), index: 0, value: Value(1.0) },
				ValueDiff { id: NodeId(1), index: 4, value: Value(1.0) },
				ValueDiff { id: NodeId(3), index: 2, value: Value(1.0) },
			],
			materials: vec![
				MaterialDiff { id: NodeId(2), index: 0, material: Material::single(1) },
				MaterialDiff { id: NodeId(3), index: 9, material: Material::single(1) },
			],
		};
		let groups = batch.leaves();
		let ids = groups.iter().map(|group| group.id).collect::<Vec<_>>();
		assert_eq!(ids, vec![NodeId(1), NodeId(2), NodeId(3)]);
		assert_eq!((groups[0].values.len(), groups[0].materials.len()), (2, 0));
		assert_eq!((groups[1].values.len(), groups[1].materials.len()), (0, 1));
		assert_eq!((groups[2].values.len(), groups[2].materials.len()), (1, 1));
	}

	#[test]
	fn unsorted_packets_are_rejected() {
		let batch = DiffBatch {
			values: vec![
				ValueDiff { id: NodeId(5), index: 0, value: Value(1.0) },
				ValueDiff { id: NodeId(2), index: 0, value: Value(1.0) },
			],
			materials: Vec::new(),
		};
		let mut buffer = Vec::new();
		buffer.write_value(&batch).unwrap();
		let decoded = buffer.as_slice().read_value::<DiffBatch>();
		assert!(matches!(decoded, Err(VoxError::UnsortedDiffs)));
	}
}
