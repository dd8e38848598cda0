//! A sparse, editable voxel volume.
//!
//! Values and materials live in a lazily subdivided octree whose LOD 0
//! leaves only allocate storage once they are edited. Readers and writers
//! lock regions of the tree through [world::VolumeStore], and edits can be
//! undone, replicated as diffs, and saved.

pub mod error;
pub mod ioext;
pub mod macros;
pub mod math;
pub mod data;
pub mod octree;
pub mod leaf;
pub mod world;

pub use flate2;

pub use error::VoxError;
pub use error::VoxResult;
