// SPDX-License-Identifier: CEPL-1.0
//! Swapchain planning, creation and teardown.

use crate::surface::{
    choose_extent, choose_present_mode, choose_surface_format, fmt_name, image_count, pm_name,
    SurfaceSupport,
};
use anyhow::{Context as _, Result};
use ash::khr::swapchain;
use ash::vk;
use asterism_core::RenderError;
use asterism_render::{QueueFamilySet, QueueRole, RenderSize};
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SharingPlan {
    Exclusive,
    /// Graphics and present families, in that order.
    Concurrent([u32; 2]),
}

impl SharingPlan {
    pub fn for_families(graphics: u32, present: u32) -> Self {
        if graphics == present {
            SharingPlan::Exclusive
        } else {
            SharingPlan::Concurrent([graphics, present])
        }
    }
}

/// Every parameter of the next swapchain, decided without touching the device.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SwapchainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: SharingPlan,
}

impl SwapchainPlan {
    pub fn new(
        support: &SurfaceSupport,
        families: &QueueFamilySet,
        hint: RenderSize,
    ) -> Result<Self, RenderError> {
        let family = |role: QueueRole| {
            families
                .family(role)
                .ok_or_else(|| RenderError::MissingQueueRole(role.to_string()))
        };
        let sharing = SharingPlan::for_families(
            family(QueueRole::Graphics)?,
            family(QueueRole::Present)?,
        );

        let caps = &support.capabilities;
        let pre_transform = caps.current_transform;

        Ok(Self {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(caps, hint),
            image_count: image_count(caps),
            pre_transform,
            sharing,
        })
    }
}

#[derive(Default)]
pub(crate) struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    pub unsafe fn create(
        device: &ash::Device,
        loader: &swapchain::Device,
        surface: vk::SurfaceKHR,
        plan: &SwapchainPlan,
    ) -> Result<Self> {
        let (image_sharing_mode, family_indices): (vk::SharingMode, &[u32]) = match &plan.sharing {
            SharingPlan::Exclusive => (vk::SharingMode::EXCLUSIVE, &[] as &[u32]),
            SharingPlan::Concurrent(indices) => (vk::SharingMode::CONCURRENT, &indices[..]),
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count: plan.image_count,
            image_format: plan.format.format,
            image_color_space: plan.format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: plan.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            // The previous chain is always destroyed before a new one is built.
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let handle = loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;
        let mut chain = Self {
            handle,
            format: plan.format.format,
            extent: plan.extent,
            ..Self::default()
        };
        if let Err(e) = chain.create_views(device, loader) {
            chain.destroy(device, loader);
            return Err(e);
        }

        info!(
            "vk: swapchain format={} present_mode={} extent={}x{} images={} (asked {}) sharing={:?}",
            fmt_name(plan.format.format),
            pm_name(plan.present_mode),
            plan.extent.width,
            plan.extent.height,
            chain.images.len(),
            plan.image_count,
            plan.sharing,
        );
        Ok(chain)
    }

    unsafe fn create_views(&mut self, device: &ash::Device, loader: &swapchain::Device) -> Result<()> {
        self.images = loader
            .get_swapchain_images(self.handle)
            .context("get_swapchain_images")?;
        for &image in &self.images {
            self.views.push(create_color_view(device, image, self.format)?);
        }
        Ok(())
    }

    /// Image views, then the swapchain itself.
    pub unsafe fn destroy(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        for view in self.views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

unsafe fn create_color_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let iv_info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    Ok(device
        .create_image_view(&iv_info, None)
        .context("create_image_view")?)
}
