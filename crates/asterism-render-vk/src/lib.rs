// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend.

mod cache;
mod commands;
mod context;
mod shader;
mod surface;
mod swapchain;
mod sync;
mod targets;
mod uniform;
mod upload;

pub use shader::{stage_for_path, ShaderCompiler, FRAGMENT_SHADER_FILE, VERTEX_SHADER_FILE};

use crate::cache::PipelineCache;
use crate::commands::DrawInputs;
use crate::context::Context;
use crate::surface::SurfaceSupport;
use crate::swapchain::{Swapchain, SwapchainPlan};
use crate::sync::FrameSync;
use crate::targets::RenderTargets;
use crate::uniform::UniformStream;
use crate::upload::GeometryBuffer;
use anyhow::{anyhow, Context as _, Result};
use ash::vk;
use asterism_math::{UniformTransforms, QUAD_INDICES, QUAD_VERTICES};
use asterism_render::{
    AcquireOutcome, FrameDevice, FrameScheduler, FrameStatus, PresentOutcome, QueueRole,
    RenderSettings, RenderSize, Renderer, ShaderBinaries, WindowEvents,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Duration;
use tracing::{debug, info};

pub struct VkRenderer {
    gpu: Gpu,
    scheduler: FrameScheduler,
}

/// Every Vulkan object the renderer owns. Implements the per-frame operations
/// the scheduler sequences.
struct Gpu {
    // --- Swapchain-scoped: rebuilt on every recreate ---
    swapchain: Swapchain,
    targets: RenderTargets,
    uniforms: UniformStream,
    cmd_bufs: Vec<vk::CommandBuffer>,

    // --- Renderer lifetime ---
    frames: Vec<FrameSync>,
    cmd_pool: vk::CommandPool,
    set_layout: vk::DescriptorSetLayout,
    geometry: GeometryBuffer,
    pipeline_cache: PipelineCache,
    swapchain_loader: ash::khr::swapchain::Device,
    clear: [f32; 4],
    shaders: ShaderBinaries,

    // Dropped last: device, debug messenger, surface, instance.
    ctx: Context,
}

impl Gpu {
    unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        // 1) Instance, surface, adapter, device, queues
        let ctx = Context::new(window, display, settings.validation)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        // Empty until filled below; Drop releases whatever a failed step left behind.
        let mut gpu = Self {
            swapchain: Swapchain::default(),
            targets: RenderTargets::default(),
            uniforms: UniformStream::default(),
            cmd_bufs: Vec::new(),
            frames: Vec::new(),
            cmd_pool: vk::CommandPool::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            geometry: GeometryBuffer::default(),
            pipeline_cache: PipelineCache::default(),
            swapchain_loader,
            clear: settings.clear_color,
            shaders: settings.shaders.clone(),
            ctx,
        };

        // 2) Objects that outlive any one swapchain
        let ctx = &gpu.ctx;
        gpu.pipeline_cache =
            PipelineCache::open(&ctx.device, &ctx.props, settings.pipeline_cache.as_deref())?;
        gpu.set_layout = uniform::create_set_layout(&ctx.device)?;
        gpu.cmd_pool = commands::create_pool(&ctx.device, ctx.family(QueueRole::Graphics))?;
        gpu.geometry = GeometryBuffer::upload(
            ctx,
            ctx.queues.graphics,
            gpu.cmd_pool,
            QUAD_VERTICES,
            QUAD_INDICES,
        )?;
        sync::create_frame_sync(&ctx.device, &mut gpu.frames)?;

        // 3) Swapchain and everything sized by it
        gpu.build_swapchain(size)?;
        Ok(gpu)
    }

    // STRICT ORDER (build):
    // swapchain + views → render pass, pipeline, framebuffers → per-image
    // uniforms + descriptor sets → per-image command buffers (recorded here).
    unsafe fn build_swapchain(&mut self, hint: RenderSize) -> Result<()> {
        let ctx = &self.ctx;
        let device = &ctx.device;

        let support = SurfaceSupport::query(&ctx.surface_loader, ctx.phys, ctx.surface)?;
        let plan = SwapchainPlan::new(&support, &ctx.families, hint)?;

        self.swapchain = Swapchain::create(device, &self.swapchain_loader, ctx.surface, &plan)?;
        self.targets = RenderTargets::create(
            device,
            self.pipeline_cache.handle,
            &self.swapchain,
            self.set_layout,
            &self.shaders,
        )?;

        let image_count = self.swapchain.images.len();
        self.uniforms = UniformStream::create(ctx, self.set_layout, image_count)?;
        self.cmd_bufs = commands::allocate(device, self.cmd_pool, image_count)?;
        commands::record_all(
            device,
            &self.cmd_bufs,
            &DrawInputs {
                targets: &self.targets,
                extent: self.swapchain.extent,
                geometry: &self.geometry,
                uniforms: &self.uniforms,
                clear: self.clear,
            },
        )?;
        Ok(())
    }

    // STRICT ORDER (teardown), device must be idle:
    // command buffers → framebuffers → pipeline → pipeline layout → render pass
    // → image views → swapchain → uniform buffers + memory → descriptor pool.
    unsafe fn teardown_swapchain(&mut self) {
        let device = &self.ctx.device;
        if !self.cmd_bufs.is_empty() {
            device.free_command_buffers(self.cmd_pool, &self.cmd_bufs);
            self.cmd_bufs.clear();
        }
        self.targets.destroy(device);
        self.swapchain.destroy(device, &self.swapchain_loader);
        self.uniforms.destroy(device);
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }
}

impl FrameDevice for Gpu {
    fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[self.frames[slot].in_flight], true, u64::MAX)
                .context("wait_for_fences")
        }
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                self.frames[slot].image_available,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(anyhow!("acquire_next_image: {e}")),
        }
    }

    fn update_uniforms(&mut self, image_index: u32, elapsed: Duration) -> Result<()> {
        let extent = self.extent();
        let data = UniformTransforms::at(elapsed.as_secs_f32(), extent.width, extent.height);
        unsafe {
            self.uniforms
                .write(&self.ctx.device, image_index as usize, &data)
        }
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .reset_fences(&[self.frames[slot].in_flight])
                .context("reset_fences")
        }
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let f = &self.frames[slot];
        let cmd = self.cmd_bufs[image_index as usize];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        // wait on image-available; signal render-finished; track with this slot's fence
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &f.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &f.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(
                    self.ctx.queues.graphics,
                    std::slice::from_ref(&submit),
                    f.in_flight,
                )
                .context("queue_submit")
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.frames[slot].render_finished,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let presented = unsafe {
            self.swapchain_loader
                .queue_present(self.ctx.queues.present, &present)
        };
        match presented {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(anyhow!("queue_present: {e}")),
        }
    }

    fn recreate(&mut self, window: &mut dyn WindowEvents) -> Result<()> {
        let Some(size) = asterism_render::wait_for_drawable(window) else {
            debug!("vk: close requested while minimized; skipping recreate");
            return Ok(());
        };

        unsafe {
            self.ctx
                .device
                .device_wait_idle()
                .context("device_wait_idle")?;
            self.teardown_swapchain();
            self.build_swapchain(size)?;
        }

        let extent = self.extent();
        info!(
            "vk: swapchain recreated {}x{} with {} images",
            extent.width,
            extent.height,
            self.image_count()
        );
        Ok(())
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - per-slot sync objects
// - command buffers, then their pool
// - swapchain-scoped resources
// - descriptor set layout, geometry, pipeline cache (saved first)
// - device, debug messenger, surface, instance (Context::drop)
impl Drop for Gpu {
    fn drop(&mut self) {
        unsafe {
            let device = &self.ctx.device;
            device.device_wait_idle().ok();

            sync::destroy_frame_sync(device, &mut self.frames);

            if !self.cmd_bufs.is_empty() {
                device.free_command_buffers(self.cmd_pool, &self.cmd_bufs);
                self.cmd_bufs.clear();
            }
            device.destroy_command_pool(self.cmd_pool, None);

            self.teardown_swapchain();

            let device = &self.ctx.device;
            device.destroy_descriptor_set_layout(self.set_layout, None);
            self.geometry.destroy(device);
            self.pipeline_cache.destroy(device);
        }
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let gpu = unsafe { Gpu::new(window, display, size, settings)? };
        let scheduler = FrameScheduler::new(gpu.image_count());
        Ok(Self { gpu, scheduler })
    }

    fn render(&mut self, window: &mut dyn WindowEvents) -> Result<FrameStatus> {
        self.scheduler.draw_frame(&mut self.gpu, window)
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.gpu
                .ctx
                .device
                .device_wait_idle()
                .context("device_wait_idle")
        }
    }
}
