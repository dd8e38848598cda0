use std::io::{
	Read, Write,
};

use byteorder::{
	BigEndian,
	ReadBytesExt,
	WriteBytesExt,
};

use crate::{
	for_each_int_type,
	VoxResult,
};

/// A type that can be decoded from a big-endian byte stream.
pub trait Readable: Sized {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self>;
}

/// A type that can be encoded to a big-endian byte stream.
/// Returns the number of bytes written.
pub trait Writable {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize>;
}

pub trait ReadExt: Read + Sized {
	fn read_value<T: Readable>(&mut self) -> VoxResult<T>;
}

pub trait WriteExt: Write + Sized {
	fn write_value<T: Writable>(&mut self, value: T) -> VoxResult<usize>;
}

impl<R: Read> ReadExt for R {
	#[inline(always)]
	fn read_value<T: Readable>(&mut self) -> VoxResult<T> {
		T::read_from(self)
	}
}

impl<W: Write> WriteExt for W {
	#[inline(always)]
	fn write_value<T: Writable>(&mut self, value: T) -> VoxResult<usize> {
		value.write_to(self)
	}
}

impl<T: Writable> Writable for &T {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		T::write_to(*self, writer)
	}
}

macro_rules! __primitive_io {
	($type:ty) => {
		impl Readable for $type {
			fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
				let mut buf = [0u8; std::mem::size_of::<$type>()];
				reader.read_exact(&mut buf)?;
				Ok(<$type>::from_be_bytes(buf))
			}
		}

		impl Writable for $type {
			fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
				writer.write_all(&self.to_be_bytes())?;
				Ok(std::mem::size_of::<$type>())
			}
		}
	};
}

for_each_int_type!(__primitive_io);

impl Readable for f32 {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		Ok(reader.read_f32::<BigEndian>()?)
	}
}

impl Writable for f32 {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		writer.write_f32::<BigEndian>(*self)?;
		Ok(4)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn big_endian_layout() {
		let mut buffer = Vec::new();
		buffer.write_value(0x01020304u32).unwrap();
		buffer.write_value(-1i16).unwrap();
		assert_eq!(buffer, [1, 2, 3, 4, 0xff, 0xff]);
		let mut reader = buffer.as_slice();
		assert_eq!(reader.read_value::<u32>().unwrap(), 0x01020304);
		assert_eq!(reader.read_value::<i16>().unwrap(), -1);
		assert!(reader.read_value::<u8>().is_err());
	}
}
