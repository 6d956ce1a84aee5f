// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

mod transforms;

pub use transforms::{UniformTransforms, CLIP_NEAR, CLIP_FAR, FOV_Y_DEGREES};

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex: binding 0, location 0 = pos, location 1 = color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

// Unit quad in the z=0 plane, one color per corner.
pub const QUAD_VERTICES: &[Vertex] = &[
    Vertex {
        pos: [-0.5, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        pos: [0.5, -0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        pos: [0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
    Vertex {
        pos: [-0.5, 0.5, 0.0],
        color: [1.0, 1.0, 1.0],
    },
];

// Counter-clockwise seen from the camera side (+Z).
pub const QUAD_INDICES: &[u16] = &[0, 1, 2, 2, 3, 0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_indices_stay_in_range() {
        assert_eq!(QUAD_INDICES.len() % 3, 0);
        assert!(QUAD_INDICES
            .iter()
            .all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(QUAD_VERTICES).len(), 96);
    }
}
