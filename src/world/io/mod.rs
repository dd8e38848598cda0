pub mod save;
pub mod compressed;

pub use save::{
	LeafRecord,
	WorldSave,
};
pub use compressed::CompressedSave;
