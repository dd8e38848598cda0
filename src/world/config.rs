use std::{
	io::{Read, Write},
	time::Duration,
};

use bitflags::bitflags;

use crate::{
	ioext::*,
	leaf::LeafOptions,
	octree::NodeId,
	VoxError,
	VoxResult,
};

bitflags! {
	/// The change tracking a store was created with.
	pub struct ConfigFlags: u32 {
		const MULTIPLAYER = 0b01;
		const UNDO_REDO = 0b10;
	}
}

impl Readable for ConfigFlags {
	fn read_from<R: Read>(reader: &mut R) -> VoxResult<Self> {
		let bits: u32 = reader.read_value()?;
		ConfigFlags::from_bits(bits).ok_or(VoxError::InvalidConfigFlags(bits))
	}
}

impl Writable for ConfigFlags {
	fn write_to<W: Write>(&self, writer: &mut W) -> VoxResult<usize> {
		writer.write_value(self.bits())
	}
}

/// Settings of a [VolumeStore](super::VolumeStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
	/// Number of levels above the LOD 0 leaves.
	/// The world is a cube of `16 << depth` voxels centred on the origin.
	pub depth: u8,
	/// Track modified cells for [collect_diffs](super::VolumeStore::collect_diffs).
	pub multiplayer: bool,
	/// Record edits for undo and redo.
	pub undo_redo: bool,
	/// How long `begin_*` waits for a lock. `None` waits forever.
	pub lock_timeout: Option<Duration>,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			depth: 10,
			multiplayer: false,
			undo_redo: false,
			lock_timeout: None,
		}
	}
}

impl StoreConfig {
	pub fn with_depth(mut self, depth: u8) -> Self {
		self.depth = depth;
		self
	}

	pub fn with_multiplayer(mut self, multiplayer: bool) -> Self {
		self.multiplayer = multiplayer;
		self
	}

	pub fn with_undo_redo(mut self, undo_redo: bool) -> Self {
		self.undo_redo = undo_redo;
		self
	}

	pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.lock_timeout = timeout;
		self
	}

	pub fn validate(&self) -> VoxResult<()> {
		if self.depth > NodeId::MAX_DEPTH {
			return Err(VoxError::InvalidConfig(format!(
				"depth {} is above the maximum of {}",
				self.depth,
				NodeId::MAX_DEPTH
			)));
		}
		if self.lock_timeout == Some(Duration::ZERO) {
			return Err(VoxError::InvalidConfig("lock timeout must not be zero".to_owned()));
		}
		Ok(())
	}

	pub fn flags(&self) -> ConfigFlags {
		let mut flags = ConfigFlags::empty();
		flags.set(ConfigFlags::MULTIPLAYER, self.multiplayer);
		flags.set(ConfigFlags::UNDO_REDO, self.undo_redo);
		flags
	}

	pub fn leaf_options(&self) -> LeafOptions {
		LeafOptions {
			history: self.undo_redo,
			diffs: self.multiplayer,
		}
	}
}
