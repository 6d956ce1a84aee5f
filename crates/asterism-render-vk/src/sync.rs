// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context as _, Result};
use ash::vk;
use asterism_render::MAX_FRAMES_IN_FLIGHT;

/// Semaphores and fence owned by one frame slot.
#[derive(Default)]
pub(crate) struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// Pushes one `FrameSync` per slot into `frames`. Fences start signaled so the
/// first wait on each slot returns immediately. On failure, objects created so
/// far are released.
pub(crate) unsafe fn create_frame_sync(
    device: &ash::Device,
    frames: &mut Vec<FrameSync>,
) -> Result<()> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };

    frames.reserve(MAX_FRAMES_IN_FLIGHT);
    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        let mut slot = FrameSync::default();
        let created = (|| -> Result<()> {
            slot.image_available = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(image_available)")?;
            slot.render_finished = device
                .create_semaphore(&sem_ci, None)
                .context("create_semaphore(render_finished)")?;
            slot.in_flight = device
                .create_fence(&fence_ci, None)
                .context("create_fence(in_flight)")?;
            Ok(())
        })();
        frames.push(slot);
        if created.is_err() {
            destroy_frame_sync(device, frames);
            return created;
        }
    }
    Ok(())
}

pub(crate) unsafe fn destroy_frame_sync(device: &ash::Device, frames: &mut Vec<FrameSync>) {
    for f in frames.drain(..) {
        device.destroy_fence(f.in_flight, None);
        device.destroy_semaphore(f.render_finished, None);
        device.destroy_semaphore(f.image_available, None);
    }
}
