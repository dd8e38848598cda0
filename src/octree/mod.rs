pub mod id;
pub mod lock;
pub mod node;
pub mod tree;
pub mod transaction;

pub use id::NodeId;
pub use lock::LockKind;
pub use node::{
	DataNode,
	NodeIndex,
};
pub use tree::DataOctree;
pub use transaction::{
	lock_region,
	LockDepth,
	unlock_region,
};
