pub mod value;
pub mod material;
pub mod generator;

pub use value::Value;
pub use material::Material;
pub use generator::{
	EmptyState,
	FlatGenerator,
	QueryZone,
	WorldGenerator,
};
