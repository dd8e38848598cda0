use std::{
	fs::File,
	io::{BufReader, BufWriter, Read, Write},
	path::Path,
};

use chrono::{DateTime, TimeZone, Utc};
use flate2::{
	read::ZlibDecoder,
	write::ZlibEncoder,
	Compression,
};

use crate::{
	ioext::*,
	world::config::ConfigFlags,
	VoxError,
	VoxResult,
};

use super::save::WorldSave;

/// A zlib compressed [WorldSave] with a small uncompressed header.
///
/// Layout (big-endian):
/// ```text
/// u32  version
/// u8   depth
/// u32  config flags
/// i64  saved at (unix seconds)
/// u32  compressed length
/// [u8] zlib stream of the WorldSave
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedSave {
	pub version: u32,
	pub depth: u8,
	pub flags: ConfigFlags,
	pub saved_at: DateTime<Utc>,
	pub data: Vec<u8>,
}

impl CompressedSave {
	pub const VERSION: u32 = 1;

	pub fn compress(save: &WorldSave, flags: ConfigFlags) -> VoxResult<Self> {
		let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
		save.write_to(&mut encoder)?;
		let data = encoder.finish()?;
		log::debug!("compressed {} leaves into {} bytes", save.len(), data.len());
		Ok(Self {
			version: Self::VERSION,
			depth: save.depth,
			flags,
			saved_at: now_in_seconds(),
			data,
		})
	}

	pub fn decompress(&self) -> VoxResult<WorldSave> {
		if self.version != Self::VERSION {
			return Err(VoxError::UnsupportedVersion(self.version));
		}
		let mut decoder = ZlibDecoder::new(self.data.as_slice());
		let save: WorldSave = decoder.read_value()?;
		if save.depth != self.depth {
			return Err(VoxError::InvalidSave("header depth doesn't match the compressed data"));
		}
		Ok(save)
	}

	pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> VoxResult<usize> {
		let mut writer = BufWriter::new(File::create(path)?);
		let length = writer.write_value(self)?;
		writer.flush()?;
		Ok(length)
	}

	pub fn read_from_file<P: AsRef<Path>>(path: P) -> VoxResult<Self> {
		let mut reader = BufReader::new(File::open(path)?);
		reader.read_value()
	}
}

/// Timestamps are stored in whole seconds.
fn now_in_seconds() -> DateTime<Utc> {
	let now = Utc::now();
	Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now)
}

impl Readable for CompressedSave {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		let version: u32 = reader.read_value()?;
		if version != Self::VERSION {
			return Err(VoxError::UnsupportedVersion(version));
		}
		let depth: u8 = reader.read_value()?;
		let flags: ConfigFlags = reader.read_value()?;
		let seconds: i64 = reader.read_value()?;
		let saved_at = Utc.timestamp_opt(seconds, 0)
			.single()
			.ok_or(VoxError::InvalidSave("timestamp is out of range"))?;
		let length: u32 = reader.read_value()?;
		let mut data = Vec::new();
		reader.take(length as u64).read_to_end(&mut data)?;
		if data.len() != length as usize {
			return Err(VoxError::InvalidSave("compressed data is truncated"));
		}
		Ok(Self {
			version,
			depth,
			flags,
			saved_at,
			data,
		})
	}
}

impl Writable for CompressedSave {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		let mut length = writer.write_value(self.version)?;
		length += writer.write_value(self.depth)?;
		length += writer.write_value(self.flags)?;
		length += writer.write_value(self.saved_at.timestamp())?;
		length += writer.write_value(self.data.len() as u32)?;
		writer.write_all(&self.data)?;
		Ok(length + self.data.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		data::{Material, Value},
		math::CELL_COUNT,
		octree::NodeId,
		world::io::LeafRecord,
	};

	fn sample() -> WorldSave {
		let values = (0..CELL_COUNT).map(|i| Value((i % 7) as f32 - 3.0)).collect::<Vec<_>>();
		let materials = vec![Material::single(2); CELL_COUNT];
		WorldSave {
			depth: 2,
			records: vec![
				LeafRecord::new(NodeId::ROOT.child(1, 0).child(0, 5), &values, &materials),
				LeafRecord::new(NodeId::ROOT.child(1, 6).child(0, 0), &values, &materials),
			],
		}
	}

	#[test]
	fn file_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("world.vox");
		let save = sample();
		let compressed = CompressedSave::compress(&save, ConfigFlags::UNDO_REDO).unwrap();
		assert!(compressed.data.len() < CELL_COUNT * 8);
		let written = compressed.write_to_file(&path).unwrap();
		assert_eq!(written as u64, std::fs::metadata(&path).unwrap().len());
		let read = CompressedSave::read_from_file(&path).unwrap();
		assert_eq!(read, compressed);
		assert_eq!(read.flags, ConfigFlags::UNDO_REDO);
		assert_eq!(read.decompress().unwrap(), save);
	}

	#[test]
	fn rejects_unknown_version() {
		let mut compressed = CompressedSave::compress(&WorldSave::new(3), ConfigFlags::empty()).unwrap();
		compressed.version = 7;
		assert!(matches!(compressed.decompress(), Err(VoxError::UnsupportedVersion(7))));
		let mut buffer = Vec::new();
		buffer.write_value(&compressed).unwrap();
		assert!(matches!(
			buffer.as_slice().read_value::<CompressedSave>(),
			Err(VoxError::UnsupportedVersion(7))
		));
	}
}
