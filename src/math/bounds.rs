use std::io::{Read, Write};

use super::coord::*;
use crate::{
	ioext::*,
	VoxResult,
};

/// An axis aligned box on the voxel lattice.
/// `min` is inclusive and `max` is exclusive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntBox {
	pub min: IntVector,
	pub max: IntVector,
}

impl IntBox {
	/// A box that contains every representable position.
	pub const INFINITE: IntBox = IntBox {
		min: IntVector::splat(i32::MIN / 2),
		max: IntVector::splat(i32::MAX / 2),
	};

	/// Creates a box from two corners. The corners are sorted per axis.
	pub fn new<T: Into<IntVector>>(a: T, b: T) -> Self {
		let a: IntVector = a.into();
		let b: IntVector = b.into();
		Self {
			min: a.min(b),
			max: a.max(b),
		}
	}

	/// A box containing exactly one voxel.
	pub fn from_point<T: Into<IntVector>>(point: T) -> Self {
		let point: IntVector = point.into();
		Self {
			min: point,
			max: point + 1,
		}
	}

	/// A cube with its minimum corner at `min`.
	pub fn cube(min: IntVector, size: i32) -> Self {
		Self {
			min,
			max: min + size,
		}
	}

	pub fn size(&self) -> IntVector {
		self.max - self.min
	}

	/// The number of voxels within the box.
	pub fn count(&self) -> u64 {
		if self.is_empty() {
			return 0;
		}
		let size = self.size();
		size.x as u64 * size.y as u64 * size.z as u64
	}

	pub fn is_empty(&self) -> bool {
		self.min.x >= self.max.x
		|| self.min.y >= self.max.y
		|| self.min.z >= self.max.z
	}

	pub fn contains<T: Into<IntVector>>(&self, point: T) -> bool {
		let p: IntVector = point.into();
		self.min.x <= p.x && p.x < self.max.x
		&& self.min.y <= p.y && p.y < self.max.y
		&& self.min.z <= p.z && p.z < self.max.z
	}

	/// Tests if `other` lies entirely within this box.
	pub fn contains_box(&self, other: &IntBox) -> bool {
		self.min.x <= other.min.x && other.max.x <= self.max.x
		&& self.min.y <= other.min.y && other.max.y <= self.max.y
		&& self.min.z <= other.min.z && other.max.z <= self.max.z
	}

	pub fn intersects(&self, other: &IntBox) -> bool {
		self.min.x < other.max.x && other.min.x < self.max.x
		&& self.min.y < other.max.y && other.min.y < self.max.y
		&& self.min.z < other.max.z && other.min.z < self.max.z
	}

	/// The shared region of two boxes, if there is one.
	pub fn overlap(&self, other: &IntBox) -> Option<IntBox> {
		let result = IntBox {
			min: self.min.max(other.min),
			max: self.max.min(other.max),
		};
		if result.is_empty() {
			None
		} else {
			Some(result)
		}
	}

	/// The part of this box outside `other`, as at most 6 disjoint boxes.
	pub fn subtract(&self, other: &IntBox) -> Vec<IntBox> {
		let Some(inner) = self.overlap(other) else {
			return if self.is_empty() { Vec::new() } else { vec![*self] };
		};
		let mut pieces = Vec::with_capacity(6);
		let mut rest = *self;
		// Slabs are peeled off along z, then y, then x.
		if rest.min.z < inner.min.z {
			pieces.push(IntBox { min: rest.min, max: IntVector::new(rest.max.x, rest.max.y, inner.min.z) });
			rest.min.z = inner.min.z;
		}
		if inner.max.z < rest.max.z {
			pieces.push(IntBox { min: IntVector::new(rest.min.x, rest.min.y, inner.max.z), max: rest.max });
			rest.max.z = inner.max.z;
		}
		if rest.min.y < inner.min.y {
			pieces.push(IntBox { min: rest.min, max: IntVector::new(rest.max.x, inner.min.y, rest.max.z) });
			rest.min.y = inner.min.y;
		}
		if inner.max.y < rest.max.y {
			pieces.push(IntBox { min: IntVector::new(rest.min.x, inner.max.y, rest.min.z), max: rest.max });
			rest.max.y = inner.max.y;
		}
		if rest.min.x < inner.min.x {
			pieces.push(IntBox { min: rest.min, max: IntVector::new(inner.min.x, rest.max.y, rest.max.z) });
		}
		if inner.max.x < rest.max.x {
			pieces.push(IntBox { min: IntVector::new(inner.max.x, rest.min.y, rest.min.z), max: rest.max });
		}
		pieces
	}

	/// Grows the box by `amount` on every side.
	pub fn extend(&self, amount: i32) -> IntBox {
		IntBox {
			min: self.min - amount,
			max: self.max + amount,
		}
	}

	/// The 8 inclusive corners of the box.
	pub fn corners(&self) -> [IntVector; 8] {
		let lo = self.min;
		let hi = self.max - 1;
		[
			IntVector::new(lo.x, lo.y, lo.z),
			IntVector::new(hi.x, lo.y, lo.z),
			IntVector::new(lo.x, hi.y, lo.z),
			IntVector::new(hi.x, hi.y, lo.z),
			IntVector::new(lo.x, lo.y, hi.z),
			IntVector::new(hi.x, lo.y, hi.z),
			IntVector::new(lo.x, hi.y, hi.z),
			IntVector::new(hi.x, hi.y, hi.z),
		]
	}

	/// Iterates every position in the box, x varying fastest.
	pub fn iter(&self) -> impl Iterator<Item = IntVector> {
		let bounds = *self;
		let empty = bounds.is_empty();
		(bounds.min.z..bounds.max.z)
			.filter(move |_| !empty)
			.flat_map(move |z| {
				(bounds.min.y..bounds.max.y).flat_map(move |y| {
					(bounds.min.x..bounds.max.x).map(move |x| IntVector::new(x, y, z))
				})
			})
	}
}

impl<T: Into<IntVector>> From<(T, T)> for IntBox {
	fn from(value: (T, T)) -> Self {
		Self::new(value.0, value.1)
	}
}

impl Readable for IntBox {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		Ok(Self {
			min: reader.read_value()?,
			max: reader.read_value()?,
		})
	}
}

impl Writable for IntBox {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		Ok(writer.write_value(self.min)? + writer.write_value(self.max)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn overlap_and_contains() {
		let a = IntBox::new((0, 0, 0), (16, 16, 16));
		let b = IntBox::new((8, -4, 15), (20, 4, 30));
		assert!(a.intersects(&b));
		assert_eq!(a.overlap(&b), Some(IntBox::new((8, 0, 15), (16, 4, 16))));
		assert!(a.contains((15, 15, 15)));
		assert!(!a.contains((16, 0, 0)));
		let touching = IntBox::new((16, 0, 0), (32, 16, 16));
		assert!(!a.intersects(&touching));
		assert_eq!(a.overlap(&touching), None);
		assert!(IntBox::INFINITE.contains_box(&a));
	}

	#[test]
	fn subtract_covers_the_rest() {
		let outer = IntBox::new((0, 0, 0), (4, 4, 4));
		let inner = IntBox::new((1, 1, 1), (3, 3, 3));
		let pieces = outer.subtract(&inner);
		assert_eq!(pieces.len(), 6);
		assert_eq!(pieces.iter().map(IntBox::count).sum::<u64>(), 64 - 8);
		for (i, piece) in pieces.iter().enumerate() {
			assert!(outer.contains_box(piece));
			assert!(!piece.intersects(&inner));
			assert!(pieces[i + 1..].iter().all(|other| !other.intersects(piece)));
		}
		assert!(outer.subtract(&IntBox::INFINITE).is_empty());
		assert_eq!(outer.subtract(&IntBox::new((10, 10, 10), (11, 11, 11))), vec![outer]);
	}

	#[test]
	fn iteration_order() {
		let b = IntBox::new((0, 0, 0), (2, 2, 2));
		let points = b.iter().collect::<Vec<_>>();
		assert_eq!(points.len() as u64, b.count());
		assert_eq!(points[0], IntVector::new(0, 0, 0));
		assert_eq!(points[1], IntVector::new(1, 0, 0));
		assert_eq!(points[2], IntVector::new(0, 1, 0));
		assert_eq!(points[4], IntVector::new(0, 0, 1));
		assert_eq!(IntBox::new((0, 0, 0), (0, 5, 5)).iter().count(), 0);
	}
}
