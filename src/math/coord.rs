use std::ops::{
	Add, Sub, Mul, Neg,
};

use std::io::{Read, Write};

use crate::{
	ioext::*,
	VoxResult,
};

/// A position on the integer voxel lattice.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntVector {
	pub x: i32,
	pub y: i32,
	pub z: i32,
}

impl IntVector {
	pub const ZERO: IntVector = IntVector::splat(0);
	pub const ONE: IntVector = IntVector::splat(1);

	#[inline(always)]
	pub const fn new(x: i32, y: i32, z: i32) -> Self {
		Self {
			x,
			y,
			z
		}
	}

	#[inline(always)]
	pub const fn splat(value: i32) -> Self {
		Self::new(value, value, value)
	}

	#[inline(always)]
	pub fn map<F: Fn(i32)->i32>(self, map: F) -> Self {
		Self {
			x: map(self.x),
			y: map(self.y),
			z: map(self.z)
		}
	}

	#[inline(always)]
	pub fn xyz(self) -> (i32, i32, i32) {
		(
			self.x,
			self.y,
			self.z
		)
	}

	#[inline(always)]
	pub fn min(self, rhs: Self) -> Self {
		Self::new(
			self.x.min(rhs.x),
			self.y.min(rhs.y),
			self.z.min(rhs.z)
		)
	}

	#[inline(always)]
	pub fn max(self, rhs: Self) -> Self {
		Self::new(
			self.x.max(rhs.x),
			self.y.max(rhs.y),
			self.z.max(rhs.z)
		)
	}

	/// The smallest of the three components.
	pub fn min_element(self) -> i32 {
		self.x.min(self.y).min(self.z)
	}

	/// The largest of the three components.
	pub fn max_element(self) -> i32 {
		self.x.max(self.y).max(self.z)
	}

	/// Squared euclidean length, widened so that it can't overflow.
	pub fn length_squared(self) -> i64 {
		let (x, y, z) = (self.x as i64, self.y as i64, self.z as i64);
		x * x + y * y + z * z
	}

	/// All 26 offsets to the cells surrounding the origin.
	pub fn neighbor_offsets() -> impl Iterator<Item = IntVector> {
		(-1..=1).flat_map(|z| {
			(-1..=1).flat_map(move |y| {
				(-1..=1).map(move |x| IntVector::new(x, y, z))
			})
		}).filter(|offset| *offset != IntVector::ZERO)
	}
}

impl From<(i32, i32, i32)> for IntVector {
	#[inline(always)]
	fn from(value: (i32, i32, i32)) -> Self {
		IntVector::new(value.0, value.1, value.2)
	}
}

impl From<[i32; 3]> for IntVector {
	#[inline(always)]
	fn from(value: [i32; 3]) -> Self {
		IntVector::new(value[0], value[1], value[2])
	}
}

impl From<IntVector> for (i32, i32, i32) {
	#[inline(always)]
	fn from(value: IntVector) -> Self {
		value.xyz()
	}
}

impl Add for IntVector {
	type Output = Self;

	fn add(self, rhs: Self) -> Self::Output {
		Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
	}
}

impl Sub for IntVector {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self::Output {
		Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
	}
}

impl Add<i32> for IntVector {
	type Output = Self;

	fn add(self, rhs: i32) -> Self::Output {
		self.map(|v| v + rhs)
	}
}

impl Sub<i32> for IntVector {
	type Output = Self;

	fn sub(self, rhs: i32) -> Self::Output {
		self.map(|v| v - rhs)
	}
}

impl Mul<i32> for IntVector {
	type Output = Self;

	fn mul(self, rhs: i32) -> Self::Output {
		self.map(|v| v * rhs)
	}
}

impl Neg for IntVector {
	type Output = Self;

	fn neg(self) -> Self::Output {
		self.map(|v| -v)
	}
}

impl Readable for IntVector {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		Ok(Self::new(
			reader.read_value()?,
			reader.read_value()?,
			reader.read_value()?,
		))
	}
}

impl Writable for IntVector {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		Ok(
			writer.write_value(self.x)?
			+ writer.write_value(self.y)?
			+ writer.write_value(self.z)?
		)
	}
}
