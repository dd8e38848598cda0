pub mod coord;
pub mod bounds;
pub mod geometry;

pub use coord::IntVector;
pub use bounds::IntBox;
pub use geometry::{
	CELL_SIZE,
	CELL_COUNT,
	cell_index,
	cell_coords,
};
