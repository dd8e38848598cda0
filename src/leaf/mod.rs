pub mod store;
pub mod history;
pub mod diff;

pub use store::{
	LeafOptions,
	LeafStore,
	Snapshot,
};
pub use history::{
	EditHistory,
	Frame,
};
pub use diff::{
	DiffBatch,
	DirtySet,
	LeafDiffs,
	MaterialDiff,
	ValueDiff,
};
