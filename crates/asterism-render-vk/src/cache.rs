// SPDX-License-Identifier: CEPL-1.0
//! Driver pipeline cache persisted between runs.

use anyhow::{Context as _, Result};
use ash::vk;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn hex_bytes(b: &[u8]) -> String {
    let mut s = String::with_capacity(b.len() * 2);
    for x in b {
        let _ = write!(&mut s, "{:02x}", x);
    }
    s
}

/// Keyed by vendor, device, driver version and the driver's cache UUID.
pub(crate) fn cache_file_name(props: &vk::PhysicalDeviceProperties) -> String {
    format!(
        "vk_pipeline_cache_{:04x}_{:04x}_{:08x}_{}.bin",
        props.vendor_id,
        props.device_id,
        props.driver_version,
        hex_bytes(&props.pipeline_cache_uuid)
    )
}

#[derive(Default)]
pub(crate) struct PipelineCache {
    pub handle: vk::PipelineCache,
    path: Option<PathBuf>,
}

impl PipelineCache {
    /// With `dir == None` the cache lives in memory only.
    pub unsafe fn open(
        device: &ash::Device,
        props: &vk::PhysicalDeviceProperties,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let path = dir.map(|d| d.join(cache_file_name(props)));
        let data = path.as_ref().and_then(|p| fs::read(p).ok());
        if let (Some(p), Some(bytes)) = (&path, &data) {
            debug!("vk: pipeline cache {} ({} bytes)", p.display(), bytes.len());
        }

        let (p_initial_data, initial_data_size) = match &data {
            Some(bytes) => (bytes.as_ptr() as *const std::ffi::c_void, bytes.len()),
            None => (std::ptr::null(), 0),
        };
        let ci = vk::PipelineCacheCreateInfo {
            s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
            initial_data_size,
            p_initial_data,
            ..Default::default()
        };
        let handle = device
            .create_pipeline_cache(&ci, None)
            .context("create_pipeline_cache")?;
        Ok(Self { handle, path })
    }

    /// Writes the cache back to disk, then destroys it. Save failures are logged only.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.handle == vk::PipelineCache::null() {
            return;
        }
        if let Some(path) = &self.path {
            match device.get_pipeline_cache_data(self.handle) {
                Ok(bytes) => {
                    if let Some(parent) = path.parent() {
                        let _ = fs::create_dir_all(parent);
                    }
                    if let Err(e) = fs::write(path, &bytes) {
                        warn!("vk: could not save pipeline cache {}: {e}", path.display());
                    }
                }
                // some drivers fail if the cache is empty or the device is lost
                Err(e) => debug!("vk: get_pipeline_cache_data: {e}"),
            }
        }
        device.destroy_pipeline_cache(self.handle, None);
        self.handle = vk::PipelineCache::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_encodes_device_and_cache_uuid() {
        let mut props = vk::PhysicalDeviceProperties {
            vendor_id: 0x10de,
            device_id: 0x2484,
            driver_version: 0x0123_4567,
            ..Default::default()
        };
        props.pipeline_cache_uuid[0] = 0xab;
        props.pipeline_cache_uuid[15] = 0x01;

        let name = cache_file_name(&props);
        assert_eq!(
            name,
            "vk_pipeline_cache_10de_2484_01234567_ab000000000000000000000000000001.bin"
        );
    }
}
