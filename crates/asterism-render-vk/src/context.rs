// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, adapter and logical device.
//!
//! STRICT ORDER:
//! 1) instance (platform WSI extensions, optional validation)
//! 2) surface from THIS instance
//! 3) adapter + queue families queried AGAINST this surface
//! 4) device with one queue per unique family
//! Teardown runs the other way round in `Drop`.

use anyhow::{Context as _, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use asterism_core::RenderError;
use asterism_render::{QueueCaps, QueueFamilyInfo, QueueFamilySet, QueueRole};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use std::ffi::{c_char, CStr};
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"asterism";

/// Roles the renderer asks for; `Present` is appended during resolution.
const REQUIRED_ROLES: [QueueRole; 2] = [QueueRole::Graphics, QueueRole::Compute];

pub(crate) struct Queues {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub present: vk::Queue,
}

pub(crate) struct Context {
    _entry: Entry,
    pub instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
    pub props: vk::PhysicalDeviceProperties,
    pub memory: vk::PhysicalDeviceMemoryProperties,
    pub device: ash::Device,
    pub families: QueueFamilySet,
    pub queues: Queues,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(target: "vulkan", "{msg}");
    } else {
        debug!(target: "vulkan", "{msg}");
    }
    vk::FALSE
}

/// First discrete GPU, else first integrated GPU.
pub(crate) fn pick_adapter(kinds: &[vk::PhysicalDeviceType]) -> Option<usize> {
    kinds
        .iter()
        .position(|&k| k == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or_else(|| {
            kinds
                .iter()
                .position(|&k| k == vk::PhysicalDeviceType::INTEGRATED_GPU)
        })
}

pub(crate) fn queue_caps(flags: vk::QueueFlags) -> QueueCaps {
    let mut caps = QueueCaps::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        caps |= QueueCaps::GRAPHICS;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        caps |= QueueCaps::COMPUTE;
    }
    if flags.contains(vk::QueueFlags::TRANSFER) {
        caps |= QueueCaps::TRANSFER;
    }
    caps
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name)
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> Result<Instance> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut exts: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();
    if validation {
        exts.push(debug_utils::NAME.as_ptr());
    }

    let layers = [VALIDATION_LAYER.as_ptr()];
    let (enabled_layer_count, pp_enabled_layer_names) = if validation {
        (layers.len() as u32, layers.as_ptr())
    } else {
        (0u32, std::ptr::null())
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count,
        pp_enabled_layer_names,
        ..Default::default()
    };

    Ok(entry
        .create_instance(&create_info, None)
        .context("create_instance")?)
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .context("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

unsafe fn select_adapter(instance: &Instance) -> Result<vk::PhysicalDevice> {
    let adapters = instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?;
    let kinds: Vec<_> = adapters
        .iter()
        .map(|&p| instance.get_physical_device_properties(p).device_type)
        .collect();
    let index = pick_adapter(&kinds).ok_or(RenderError::NoSuitableAdapter)?;
    Ok(adapters[index])
}

unsafe fn check_device_extensions(instance: &Instance, phys: vk::PhysicalDevice) -> Result<()> {
    let ext_props = instance
        .enumerate_device_extension_properties(phys)
        .context("enumerate_device_extension_properties")?;
    let has = |name: &CStr| {
        ext_props
            .iter()
            .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
    };
    if !has(swapchain::NAME) {
        return Err(
            RenderError::MissingDeviceExtension(swapchain::NAME.to_string_lossy().into_owned())
                .into(),
        );
    }
    Ok(())
}

unsafe fn resolve_families(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> Result<QueueFamilySet> {
    let families: Vec<QueueFamilyInfo> = instance
        .get_physical_device_queue_family_properties(phys)
        .iter()
        .map(|q| QueueFamilyInfo {
            caps: queue_caps(q.queue_flags),
        })
        .collect();

    QueueFamilySet::resolve(&families, &REQUIRED_ROLES, |index| {
        Ok(surface_loader
            .get_physical_device_surface_support(phys, index, surface)
            .context("get_physical_device_surface_support")?)
    })
}

unsafe fn create_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: &QueueFamilySet,
) -> Result<ash::Device> {
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique_families()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    Ok(instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?)
}

impl Context {
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        want_validation: bool,
    ) -> Result<Self> {
        // --- Platform handles ---
        let dh = display
            .display_handle()
            .map_err(|e| anyhow::anyhow!("display handle: {e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow::anyhow!("window handle: {e}"))?
            .as_raw();

        // --- Instance ---
        let entry = Entry::load().context("load Vulkan library")?;
        let mut validation = want_validation && cfg!(debug_assertions);
        if validation && !has_layer(&entry, VALIDATION_LAYER) {
            warn!("vk: validation requested but {VALIDATION_LAYER:?} is not installed");
            validation = false;
        }
        let instance = create_instance(&entry, dh, validation)?;
        let debug = if validation {
            Some(create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        // --- Surface ---
        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
            .context("ash_window::create_surface")?;

        // --- Adapter ---
        let phys = select_adapter(&instance)?;
        let props = instance.get_physical_device_properties(phys);
        let memory = instance.get_physical_device_memory_properties(phys);
        let name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy();
        info!(
            "vk: adapter {name} ({:?}), api {}.{}.{}",
            props.device_type,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version),
        );
        check_device_extensions(&instance, phys)?;

        // --- Queues + device ---
        let families = resolve_families(&instance, &surface_loader, surface, phys)?;
        let device = create_device(&instance, phys, &families)?;
        let queue_of = |role: QueueRole| {
            families
                .family(role)
                .map(|family| device.get_device_queue(family, 0))
                .ok_or_else(|| RenderError::MissingQueueRole(role.to_string()))
        };
        let queues = Queues {
            graphics: queue_of(QueueRole::Graphics)?,
            compute: queue_of(QueueRole::Compute)?,
            present: queue_of(QueueRole::Present)?,
        };
        debug!(
            "vk: queues graphics={:?} compute={:?} present={:?}",
            queues.graphics, queues.compute, queues.present
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            props,
            memory,
            device,
            families,
            queues,
        })
    }

    pub fn family(&self, role: QueueRole) -> u32 {
        // Every role in `REQUIRED_ROLES` plus `Present` resolved in `new`.
        self.families.family(role).unwrap_or_default()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_beats_integrated_regardless_of_order() {
        let kinds = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        assert_eq!(pick_adapter(&kinds), Some(2));
    }

    #[test]
    fn integrated_is_the_fallback() {
        let kinds = [
            vk::PhysicalDeviceType::VIRTUAL_GPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
        ];
        assert_eq!(pick_adapter(&kinds), Some(1));
    }

    #[test]
    fn no_gpu_means_no_adapter() {
        assert_eq!(pick_adapter(&[]), None);
        assert_eq!(pick_adapter(&[vk::PhysicalDeviceType::CPU]), None);
    }

    #[test]
    fn queue_flags_map_to_caps() {
        let caps = queue_caps(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);
        assert_eq!(caps, QueueCaps::GRAPHICS | QueueCaps::COMPUTE);
        assert_eq!(queue_caps(vk::QueueFlags::SPARSE_BINDING), QueueCaps::empty());
        assert_eq!(queue_caps(vk::QueueFlags::TRANSFER), QueueCaps::TRANSFER);
    }
}
