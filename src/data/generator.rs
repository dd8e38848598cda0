use crate::math::{IntBox, IntVector};

use super::{
	material::Material,
	value::Value,
};

/// What is known about the density inside a region without sampling every voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmptyState {
	/// Every value is empty (positive).
	Empty,
	/// Every value is full (not positive).
	Full,
	Unknown,
}

impl EmptyState {
	/// Combines the states of two disjoint regions.
	pub fn merge(self, other: EmptyState) -> EmptyState {
		if self == other {
			self
		} else {
			EmptyState::Unknown
		}
	}

	/// Classifies a set of values.
	pub fn of_values<'a, It: IntoIterator<Item = &'a Value>>(values: It) -> EmptyState {
		let mut state: Option<EmptyState> = None;
		for value in values {
			let current = if value.is_empty() {
				EmptyState::Empty
			} else {
				EmptyState::Full
			};
			let merged = state.map_or(current, |s| s.merge(current));
			if merged == EmptyState::Unknown {
				return EmptyState::Unknown;
			}
			state = Some(merged);
		}
		state.unwrap_or(EmptyState::Unknown)
	}
}

/// Describes a region being read into a flat output buffer.
/// `bounds` is the full extent of the buffer and `region` is the part
/// of it that should be written. Buffers are laid out x fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryZone {
	pub bounds: IntBox,
	pub region: IntBox,
}

impl QueryZone {
	pub fn new(bounds: IntBox) -> Self {
		Self {
			bounds,
			region: bounds,
		}
	}

	/// The part of this zone that overlaps `region`, writing into the same buffer.
	pub fn sub_zone(&self, region: &IntBox) -> Option<QueryZone> {
		self.region.overlap(region).map(|region| QueryZone {
			bounds: self.bounds,
			region,
		})
	}

	/// The buffer length needed for this zone.
	pub fn len(&self) -> usize {
		self.bounds.count() as usize
	}

	#[inline(always)]
	pub fn index(&self, p: IntVector) -> usize {
		let size = self.bounds.size();
		let local = p - self.bounds.min;
		(local.x + size.x * (local.y + size.y * local.z)) as usize
	}
}

/// The procedural source of every voxel that hasn't been edited.
/// Implementations must be deterministic: the same position always
/// yields the same output.
pub trait WorldGenerator: Send + Sync {
	fn value(&self, p: IntVector) -> Value;
	fn material(&self, p: IntVector) -> Material;

	/// Fills `zone.region` of the buffers that are present.
	fn fill(&self, zone: &QueryZone, mut values: Option<&mut [Value]>, mut materials: Option<&mut [Material]>) {
		for p in zone.region.iter() {
			let index = zone.index(p);
			if let Some(values) = values.as_deref_mut() {
				values[index] = self.value(p);
			}
			if let Some(materials) = materials.as_deref_mut() {
				materials[index] = self.material(p);
			}
		}
	}

	/// Lets the store skip work for regions the generator knows are uniform.
	fn emptiness(&self, _bounds: &IntBox) -> EmptyState {
		EmptyState::Unknown
	}
}

/// A horizontal ground plane at `height`. Everything below is full.
#[derive(Debug, Clone, Copy)]
pub struct FlatGenerator {
	pub height: i32,
	pub material: Material,
}

impl FlatGenerator {
	pub fn new(height: i32) -> Self {
		Self {
			height,
			material: Material::single(1),
		}
	}
}

impl WorldGenerator for FlatGenerator {
	fn value(&self, p: IntVector) -> Value {
		Value::clamped((p.z - self.height) as f32 + 0.5)
	}

	fn material(&self, _p: IntVector) -> Material {
		self.material
	}

	fn emptiness(&self, bounds: &IntBox) -> EmptyState {
		if bounds.min.z >= self.height {
			EmptyState::Empty
		} else if bounds.max.z <= self.height {
			EmptyState::Full
		} else {
			EmptyState::Unknown
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flat_emptiness_matches_values() {
		let generator = FlatGenerator::new(4);
		let above = IntBox::new((0, 0, 4), (8, 8, 12));
		let below = IntBox::new((0, 0, -8), (8, 8, 4));
		let across = IntBox::new((0, 0, 0), (8, 8, 8));
		for (bounds, expected) in [(above, EmptyState::Empty), (below, EmptyState::Full), (across, EmptyState::Unknown)] {
			assert_eq!(generator.emptiness(&bounds), expected);
			let values = bounds.iter().map(|p| generator.value(p)).collect::<Vec<_>>();
			assert_eq!(EmptyState::of_values(&values), expected);
		}
	}

	#[test]
	fn fill_sub_zone() {
		let generator = FlatGenerator::new(0);
		let zone = QueryZone::new(IntBox::new((0, 0, -2), (4, 4, 2)));
		let mut values = vec![Value(9.0); zone.len()];
		let sub = zone.sub_zone(&IntBox::new((0, 0, 0), (4, 4, 8))).unwrap();
		generator.fill(&sub, Some(values.as_mut_slice()), None);
		for p in zone.bounds.iter() {
			let value = values[zone.index(p)];
			if p.z >= 0 {
				assert_eq!(value, generator.value(p));
			} else {
				assert_eq!(value, Value(9.0));
			}
		}
	}
}
