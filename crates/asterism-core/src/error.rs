// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions the renderer reports by kind.
///
/// Stale or suboptimal surfaces are not errors and never show up here; the
/// frame scheduler recovers from them by rebuilding the swapchain.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No discrete or integrated GPU was enumerated.
    #[error("no suitable GPU found (need a discrete or integrated adapter)")]
    NoSuitableAdapter,

    /// A required queue role has no family that satisfies it.
    #[error("GPU has no queue family for the {0} role")]
    MissingQueueRole(String),

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("surface reports no supported present modes")]
    NoPresentModes,

    #[error("device extension {0} is not supported")]
    MissingDeviceExtension(String),

    #[error("no memory type matches the requested properties")]
    NoMemoryType,

    #[error("shader {}: {diagnostic}", .path.display())]
    Shader { path: PathBuf, diagnostic: String },

    #[error("cannot infer shader stage from {}", .0.display())]
    UnknownShaderStage(PathBuf),

    #[error("shader compiler is already initialised for this process")]
    ShaderCompilerAlreadyInitialized,

    #[error("config: {0}")]
    Config(String),
}
