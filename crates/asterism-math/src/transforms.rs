// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

pub const FOV_Y_DEGREES: f32 = 45.0;
pub const CLIP_NEAR: f32 = 0.1;
pub const CLIP_FAR: f32 = 10.0;

const SPIN_DEGREES_PER_SEC: f32 = 90.0;
const EYE: Vec3 = Vec3::ONE;
const TARGET: Vec3 = Vec3::ZERO;
const UP: Vec3 = Vec3::Z;

/// Camera/model triple written to each swapchain image's uniform buffer.
///
/// Layout matches the vertex shader's `set = 0, binding = 0` block: three
/// column-major `mat4`s, no padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformTransforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformTransforms {
    /// Transforms for `elapsed_secs` into the run, for a target of
    /// `width` x `height` pixels.
    pub fn at(elapsed_secs: f32, width: u32, height: u32) -> Self {
        let model = Mat4::from_rotation_z(elapsed_secs * SPIN_DEGREES_PER_SEC.to_radians());
        let view = Mat4::look_at_rh(EYE, TARGET, UP);

        let aspect = width as f32 / height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, CLIP_NEAR, CLIP_FAR);
        // Vulkan clip space has +Y pointing down.
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}
