use std::io::{Read, Write};

use bytemuck::{Pod, Zeroable};

use crate::{
	ioext::*,
	VoxResult,
};

/// Per voxel material channels.
/// Storage never looks inside a material.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Material {
	pub index_a: u8,
	pub index_b: u8,
	pub blend: u8,
	pub grass: u8,
}

impl Material {
	pub const fn new(index_a: u8, index_b: u8, blend: u8, grass: u8) -> Self {
		Self {
			index_a,
			index_b,
			blend,
			grass,
		}
	}

	/// A material using a single index with no blending.
	pub const fn single(index: u8) -> Self {
		Self::new(index, index, 0, 0)
	}
}

impl Readable for Material {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		let mut buf = [0u8; 4];
		reader.read_exact(&mut buf)?;
		Ok(bytemuck::cast(buf))
	}
}

impl Writable for Material {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		writer.write_all(bytemuck::bytes_of(self))?;
		Ok(4)
	}
}
