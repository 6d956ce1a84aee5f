// SPDX-License-Identifier: CEPL-1.0
//! Command pool and the per-image command buffers, recorded once per swapchain.

use crate::targets::RenderTargets;
use crate::uniform::UniformStream;
use crate::upload::GeometryBuffer;
use anyhow::{Context as _, Result};
use ash::vk;

pub(crate) unsafe fn create_pool(device: &ash::Device, queue_family: u32) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        queue_family_index: queue_family,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        ..Default::default()
    };
    Ok(device
        .create_command_pool(&pool_info, None)
        .context("create_command_pool")?)
}

pub(crate) unsafe fn allocate(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: count as u32,
        ..Default::default()
    };
    Ok(device
        .allocate_command_buffers(&alloc_info)
        .context("allocate_command_buffers")?)
}

/// Everything a draw references; all of it outlives the recorded buffers.
pub(crate) struct DrawInputs<'a> {
    pub targets: &'a RenderTargets,
    pub extent: vk::Extent2D,
    pub geometry: &'a GeometryBuffer,
    pub uniforms: &'a UniformStream,
    pub clear: [f32; 4],
}

/// Records `cmds[i]` to draw into framebuffer `i` with descriptor set `i`.
pub(crate) unsafe fn record_all(
    device: &ash::Device,
    cmds: &[vk::CommandBuffer],
    inputs: &DrawInputs<'_>,
) -> Result<()> {
    for (i, &cmd) in cmds.iter().enumerate() {
        record_one(
            device,
            cmd,
            inputs.targets.framebuffers[i],
            inputs.uniforms.set(i),
            inputs,
        )?;
    }
    Ok(())
}

unsafe fn record_one(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    set: vk::DescriptorSet,
    inputs: &DrawInputs<'_>,
) -> Result<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .context("begin_command_buffer")?;

    let clear = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: inputs.clear,
        },
    };
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: inputs.targets.render_pass,
        framebuffer,
        render_area: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: inputs.extent,
        },
        clear_value_count: 1,
        p_clear_values: &clear,
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

    device.cmd_bind_pipeline(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        inputs.targets.pipeline,
    );

    let geometry = inputs.geometry;
    device.cmd_bind_vertex_buffers(cmd, 0, &[geometry.vertices.handle], &[0]);
    device.cmd_bind_index_buffer(cmd, geometry.indices.handle, 0, vk::IndexType::UINT16);

    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        inputs.targets.pipeline_layout,
        0,
        std::slice::from_ref(&set),
        &[],
    );

    device.cmd_draw_indexed(cmd, geometry.index_count, 1, 0, 0, 0);

    device.cmd_end_render_pass(cmd);
    device
        .end_command_buffer(cmd)
        .context("end_command_buffer")?;
    Ok(())
}
