// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

pub const QUAD_VERTICES: &[Vertex] = &[
    // top-left (red)
    Vertex {
        pos: [-0.5, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    // top-right (green)
    Vertex {
        pos: [0.5, -0.5],
        color: [0.0, 1.0, 0.0],
    },
    // bottom-right (blue)
    Vertex {
        pos: [0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
    // bottom-left (cyan)
    Vertex {
        pos: [-0.5, 0.5],
        color: [0.0, 1.0, 1.0],
    },
];

/// Two clockwise triangles.
pub const QUAD_INDICES: &[u16] = &[0, 1, 2, 2, 3, 0];
