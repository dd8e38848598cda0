use std::io::{Read, Write};

use bytemuck::{Pod, Zeroable};

use crate::{
	ioext::*,
	VoxResult,
};

/// A density sample. Positive is outside the surface, negative is inside.
#[repr(transparent)]
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Pod, Zeroable)]
pub struct Value(pub f32);

impl Value {
	pub const EMPTY: Value = Value(1.0);
	pub const FULL: Value = Value(-1.0);
	/// Edits are expected to stay within `[-MAX_MAGNITUDE, MAX_MAGNITUDE]`.
	pub const MAX_MAGNITUDE: f32 = 2.0;

	#[inline(always)]
	pub const fn new(value: f32) -> Self {
		Self(value)
	}

	/// Clamps a raw density to the supported band.
	pub fn clamped(value: f32) -> Self {
		Self(value.clamp(-Self::MAX_MAGNITUDE, Self::MAX_MAGNITUDE))
	}

	#[inline(always)]
	pub fn is_empty(self) -> bool {
		self.0 > 0.0
	}

	#[inline(always)]
	pub fn get(self) -> f32 {
		self.0
	}
}

impl From<f32> for Value {
	fn from(value: f32) -> Self {
		Self(value)
	}
}

impl From<Value> for f32 {
	fn from(value: Value) -> Self {
		value.0
	}
}

impl Readable for Value {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		Ok(Self(reader.read_value()?))
	}
}

impl Writable for Value {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		writer.write_value(self.0)
	}
}
