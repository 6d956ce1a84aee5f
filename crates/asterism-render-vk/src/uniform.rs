// SPDX-License-Identifier: CEPL-1.0
//! Per-image uniform buffers and the descriptor sets that expose them.

use crate::context::Context;
use crate::upload::Buffer;
use anyhow::{Context as _, Result};
use ash::vk;
use asterism_math::UniformTransforms;

const UBO_SIZE: vk::DeviceSize = std::mem::size_of::<UniformTransforms>() as vk::DeviceSize;

/// Set 0, binding 0: one uniform buffer read by the vertex stage.
pub(crate) unsafe fn create_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::VERTEX,
        ..Default::default()
    };
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    Ok(device
        .create_descriptor_set_layout(&ci, None)
        .context("create_descriptor_set_layout")?)
}

/// One host-visible uniform buffer + descriptor set per swapchain image.
#[derive(Default)]
pub(crate) struct UniformStream {
    buffers: Vec<Buffer>,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl UniformStream {
    pub unsafe fn create(
        ctx: &Context,
        set_layout: vk::DescriptorSetLayout,
        image_count: usize,
    ) -> Result<Self> {
        let mut stream = Self::default();
        if let Err(e) = stream.fill(ctx, set_layout, image_count) {
            stream.destroy(&ctx.device);
            return Err(e);
        }
        Ok(stream)
    }

    unsafe fn fill(
        &mut self,
        ctx: &Context,
        set_layout: vk::DescriptorSetLayout,
        image_count: usize,
    ) -> Result<()> {
        let device = &ctx.device;

        // 1) UBOs
        self.buffers.reserve(image_count);
        for _ in 0..image_count {
            self.buffers.push(Buffer::create(
                ctx,
                UBO_SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?);
        }

        // 2) Pool
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count as u32,
        }];
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: image_count as u32,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        self.pool = device
            .create_descriptor_pool(&pool_ci, None)
            .context("create_descriptor_pool")?;

        // 3) Sets
        let layouts = vec![set_layout; image_count];
        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: self.pool,
            descriptor_set_count: image_count as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        self.sets = device
            .allocate_descriptor_sets(&alloc)
            .context("allocate_descriptor_sets")?;

        // 4) Point each set at its image's buffer
        let infos: Vec<vk::DescriptorBufferInfo> = self
            .buffers
            .iter()
            .map(|b| vk::DescriptorBufferInfo {
                buffer: b.handle,
                offset: 0,
                range: UBO_SIZE,
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = self
            .sets
            .iter()
            .zip(&infos)
            .map(|(&dst_set, info)| vk::WriteDescriptorSet {
                s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                dst_set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                p_buffer_info: info,
                ..Default::default()
            })
            .collect();
        device.update_descriptor_sets(&writes, &[]);
        Ok(())
    }

    pub fn set(&self, image_index: usize) -> vk::DescriptorSet {
        self.sets[image_index]
    }

    /// Overwrites the buffer of `image_index`. The caller guarantees the GPU is
    /// done reading it.
    pub unsafe fn write(
        &self,
        device: &ash::Device,
        image_index: usize,
        data: &UniformTransforms,
    ) -> Result<()> {
        self.buffers[image_index].write(device, bytemuck::bytes_of(data))
    }

    /// Buffers and their memory, then the pool (which frees the sets).
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for mut b in self.buffers.drain(..) {
            b.destroy(device);
        }
        if self.pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(self.pool, None);
            self.pool = vk::DescriptorPool::null();
        }
        self.sets.clear();
    }
}
