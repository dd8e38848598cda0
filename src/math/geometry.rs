/*
Leaf cell layout and octree child addressing.
*/

use super::coord::IntVector;

/// Edge length of a LOD 0 leaf.
pub const CELL_SIZE: i32 = 16;
pub const CELL_SIZE_BITS: u32 = 4;
/// Number of voxels stored by a LOD 0 leaf.
pub const CELL_COUNT: usize = (CELL_SIZE * CELL_SIZE * CELL_SIZE) as usize;

/// In a 16x16x16 leaf, there are 4096 voxels.
/// This function returns an index in a flattened array
/// where a voxel would be stored. This is merely a bit manipulation.
/// Here is how the bits would be laid out (from right to left):
/// ```text
/// ╭────────────╮
/// │       <-- 0│
/// │zzzzyyyyxxxx│
/// │321032103210│
/// ╰────────────╯
/// ```
/// `local` is relative to the leaf's minimum corner.
#[inline(always)]
pub fn cell_index(local: IntVector) -> usize {
	let x = (local.x & 0xf) as usize;
	let y = (local.y & 0xf) as usize;
	let z = (local.z & 0xf) as usize;
	(z << 8) | (y << 4) | x
}

/// The inverse of [cell_index].
#[inline(always)]
pub fn cell_coords(index: usize) -> IntVector {
	IntVector::new(
		(index & 0xf) as i32,
		((index >> 4) & 0xf) as i32,
		((index >> 8) & 0xf) as i32,
	)
}

/// Selects which of the 8 octants around `center` contains `point`.
/// Bit 0 is set for +X, bit 1 for +Y and bit 2 for +Z.
#[inline(always)]
pub fn child_index(point: IntVector, center: IntVector) -> usize {
	(point.x >= center.x) as usize
	| ((point.y >= center.y) as usize) << 1
	| ((point.z >= center.z) as usize) << 2
}

/// The offset of an octant in units of the child's size.
#[inline(always)]
pub fn child_offset(index: usize) -> IntVector {
	IntVector::new(
		(index & 1) as i32,
		((index >> 1) & 1) as i32,
		((index >> 2) & 1) as i32,
	)
}

/// Edge length of a node at `lod`.
#[inline(always)]
pub fn node_size(lod: u8) -> i32 {
	CELL_SIZE << lod
}
