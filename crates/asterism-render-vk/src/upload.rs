// SPDX-License-Identifier: CEPL-1.0
//! Buffer allocation and the one-shot staging upload.

use crate::context::Context;
use anyhow::{Context as _, Result};
use ash::vk;
use asterism_core::RenderError;
use asterism_math::Vertex;

/// A buffer and the memory bound to it.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Buffer {
    pub handle: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl Buffer {
    pub unsafe fn create(
        ctx: &Context,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let device = &ctx.device;
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let handle = device.create_buffer(&bci, None).context("create_buffer")?;
        let mut buffer = Self {
            handle,
            memory: vk::DeviceMemory::null(),
            size,
        };
        if let Err(e) = buffer.bind_new_memory(ctx, props) {
            buffer.destroy(device);
            return Err(e);
        }
        Ok(buffer)
    }

    unsafe fn bind_new_memory(&mut self, ctx: &Context, props: vk::MemoryPropertyFlags) -> Result<()> {
        let device = &ctx.device;
        let req = device.get_buffer_memory_requirements(self.handle);
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: find_memory_type(&ctx.memory, req.memory_type_bits, props)?,
            ..Default::default()
        };
        self.memory = device
            .allocate_memory(&mai, None)
            .context("allocate_memory")?;
        device
            .bind_buffer_memory(self.handle, self.memory, 0)
            .context("bind_buffer_memory")?;
        Ok(())
    }

    /// Copies `bytes` to the start of a host-visible, host-coherent buffer.
    pub unsafe fn write(&self, device: &ash::Device, bytes: &[u8]) -> Result<()> {
        debug_assert!(bytes.len() as vk::DeviceSize <= self.size);
        let ptr = device
            .map_memory(
                self.memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
            .context("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(self.memory);
        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Buffer::null() {
            device.destroy_buffer(self.handle, None);
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory, None);
        }
        *self = Self::default();
    }
}

/// First memory type allowed by `type_bits` whose flags contain `req`.
pub(crate) fn find_memory_type(
    mem: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32, RenderError> {
    (0..mem.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0 && mem.memory_types[i as usize].property_flags.contains(req)
        })
        .ok_or(RenderError::NoMemoryType)
}

/// Host->staging, then staging->`dst` on `queue` with a one-time command buffer.
/// Blocks until the copy has finished.
pub(crate) unsafe fn upload_via_staging(
    ctx: &Context,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    dst: vk::Buffer,
    src_data: &[u8],
) -> Result<()> {
    let device = &ctx.device;
    let size = src_data.len() as vk::DeviceSize;

    // 1) staging buffer, released on every path
    let mut staging = Buffer::create(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let copied = match staging.write(device, src_data) {
        Ok(()) => copy_once(device, queue, cmd_pool, staging.handle, dst, size),
        Err(e) => Err(e),
    };
    staging.destroy(device);
    copied
}

unsafe fn copy_once(
    device: &ash::Device,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    // 2) one-time command buffer
    let ai = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: cmd_pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: 1,
        ..Default::default()
    };
    let cmd = device
        .allocate_command_buffers(&ai)
        .context("allocate_command_buffers(staging)")?[0];

    let result = record_and_wait(device, queue, cmd, src, dst, size);

    // 4) cleanup
    device.free_command_buffers(cmd_pool, std::slice::from_ref(&cmd));
    result
}

unsafe fn record_and_wait(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let bi = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &bi)
        .context("begin_command_buffer(staging)")?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
    device
        .end_command_buffer(cmd)
        .context("end_command_buffer(staging)")?;

    // 3) submit and wait
    let si = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        ..Default::default()
    };
    device
        .queue_submit(queue, std::slice::from_ref(&si), vk::Fence::null())
        .context("queue_submit(staging)")?;
    device
        .queue_wait_idle(queue)
        .context("queue_wait_idle(staging)")?;
    Ok(())
}

/// Device-local vertex + index buffers, filled once.
#[derive(Default)]
pub(crate) struct GeometryBuffer {
    pub vertices: Buffer,
    pub indices: Buffer,
    pub index_count: u32,
}

impl GeometryBuffer {
    pub unsafe fn upload(
        ctx: &Context,
        queue: vk::Queue,
        cmd_pool: vk::CommandPool,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<Self> {
        let mut geometry = Self {
            index_count: indices.len() as u32,
            ..Self::default()
        };
        if let Err(e) = geometry.fill(ctx, queue, cmd_pool, vertices, indices) {
            geometry.destroy(&ctx.device);
            return Err(e);
        }
        Ok(geometry)
    }

    unsafe fn fill(
        &mut self,
        ctx: &Context,
        queue: vk::Queue,
        cmd_pool: vk::CommandPool,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<()> {
        let vbytes: &[u8] = bytemuck::cast_slice(vertices);
        let ibytes: &[u8] = bytemuck::cast_slice(indices);

        self.vertices = Buffer::create(
            ctx,
            vbytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.indices = Buffer::create(
            ctx,
            ibytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        upload_via_staging(ctx, queue, cmd_pool, self.vertices.handle, vbytes)?;
        upload_via_staging(ctx, queue, cmd_pool, self.indices.handle, ibytes)?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.vertices.destroy(device);
        self.indices.destroy(device);
    }
}
