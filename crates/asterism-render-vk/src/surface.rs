// SPDX-License-Identifier: CEPL-1.0
//! Surface capability query and the swapchain selection policy.

use anyhow::{Context as _, Result};
use ash::khr::surface;
use ash::vk;
use asterism_core::RenderError;
use asterism_render::RenderSize;

/// Used when the driver reports no preference, and preferred when listed.
pub(crate) const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// What a surface supports on one adapter. Both lists are non-empty.
#[derive(Clone, Debug)]
pub(crate) struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub unsafe fn query(
        loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        // capabilities: image counts, transforms, current extent (or u32::MAX for free-size)
        let capabilities = loader
            .get_physical_device_surface_capabilities(phys, surface)
            .context("get_physical_device_surface_capabilities")?;
        let formats = loader
            .get_physical_device_surface_formats(phys, surface)
            .context("get_physical_device_surface_formats")?;
        let present_modes = loader
            .get_physical_device_surface_present_modes(phys, surface)
            .context("get_physical_device_surface_present_modes")?;
        Ok(Self::new(capabilities, formats, present_modes)?)
    }

    pub fn new(
        capabilities: vk::SurfaceCapabilitiesKHR,
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
    ) -> Result<Self, RenderError> {
        if formats.is_empty() {
            return Err(RenderError::NoSurfaceFormats);
        }
        if present_modes.is_empty() {
            return Err(RenderError::NoPresentModes);
        }
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return DEFAULT_SURFACE_FORMAT;
        }
    }
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == DEFAULT_SURFACE_FORMAT.format
                && f.color_space == DEFAULT_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(DEFAULT_SURFACE_FORMAT)
}

/// MAILBOX if listed, else IMMEDIATE if listed, else FIFO.
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let mut best = vk::PresentModeKHR::FIFO;
    for &mode in modes {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        }
        if mode == vk::PresentModeKHR::IMMEDIATE {
            best = mode;
        }
    }
    best
}

pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, hint: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: hint
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: hint
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub(crate) fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

// Info only
pub(crate) fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        _ => "OTHER",
    }
}

pub(crate) fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}
