use thiserror::Error;

use crate::math::IntBox;

/// The master error type.
#[derive(Debug, Error)]
pub enum VoxError {
	#[error("IO Error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Timed out waiting for lock on {bounds:?} (held by \"{holder}\").")]
	LockTimeout {
		holder: String,
		bounds: IntBox,
	},
	#[error("Transaction requested on a region already locked by this thread.")]
	ReentrantTransaction,
	#[error("Token list is not strictly increasing or does not match the tree.")]
	MalformedTokens,
	#[error("Attempted to release a lock that was not held.")]
	LockNotHeld,
	#[error("Current frame has uncommitted edits.")]
	UncommittedEdits,
	#[error("Invalid config: {0}")]
	InvalidConfig(String),
	#[error("Save depth mismatch (expected {expected}, found {found}).")]
	DepthMismatch {
		expected: u8,
		found: u8,
	},
	#[error("Unsupported save version: {0}")]
	UnsupportedVersion(u32),
	#[error("Invalid config flags: {0:#x}")]
	InvalidConfigFlags(u32),
	#[error("Diffs are not sorted by ascending leaf id.")]
	UnsortedDiffs,
	#[error("Id {0:#x} does not name a leaf of this tree.")]
	InvalidLeafId(u64),
	#[error("Invalid save: {0}")]
	InvalidSave(&'static str),
	#[error("Out of range error.")]
	OutOfRange,
}

impl VoxError {
	/// Reports misuse of the lock or history protocol.
	/// Debug builds abort here. Release builds log and hand the error back
	/// so that the caller can turn the operation into a no-op.
	#[track_caller]
	pub fn protocol_fault(self) -> Self {
		log::error!("protocol fault: {self}");
		debug_assert!(false, "protocol fault: {self}");
		self
	}

	/// Returns true for errors caused by misuse of the lock protocol.
	pub fn is_protocol_fault(&self) -> bool {
		matches!(
			self,
			VoxError::ReentrantTransaction
			| VoxError::MalformedTokens
			| VoxError::LockNotHeld
		)
	}
}

pub type VoxResult<T> = Result<T,VoxError>;
