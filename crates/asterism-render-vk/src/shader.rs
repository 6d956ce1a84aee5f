// SPDX-License-Identifier: CEPL-1.0
//! GLSL → SPIR-V compilation with `shaderc`.

use anyhow::Result;
use asterism_core::RenderError;
use asterism_render::ShaderBinaries;
use portable_atomic::{AtomicBool, Ordering};
use std::fs;
use std::path::Path;
use tracing::info;

static COMPILER_ALIVE: AtomicBool = AtomicBool::new(false);

pub const VERTEX_SHADER_FILE: &str = "shader.vert";
pub const FRAGMENT_SHADER_FILE: &str = "shader.frag";

/// Shader stage from the file suffix.
pub fn stage_for_path(path: &Path) -> Result<shaderc::ShaderKind, RenderError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    Ok(match ext {
        "vert" => shaderc::ShaderKind::Vertex,
        "tesc" => shaderc::ShaderKind::TessControl,
        "tese" => shaderc::ShaderKind::TessEvaluation,
        "geom" => shaderc::ShaderKind::Geometry,
        "frag" => shaderc::ShaderKind::Fragment,
        "comp" => shaderc::ShaderKind::Compute,
        _ => return Err(RenderError::UnknownShaderStage(path.to_path_buf())),
    })
}

/// The process-wide shader compiler. At most one exists at a time; dropping it
/// releases the slot.
pub struct ShaderCompiler {
    compiler: shaderc::Compiler,
    options: shaderc::CompileOptions<'static>,
}

impl std::fmt::Debug for ShaderCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCompiler").finish_non_exhaustive()
    }
}

impl ShaderCompiler {
    pub fn init() -> Result<Self> {
        if COMPILER_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RenderError::ShaderCompilerAlreadyInitialized.into());
        }

        let built = shaderc::Compiler::new().and_then(|compiler| {
            let mut options = shaderc::CompileOptions::new()?;
            options.set_target_env(
                shaderc::TargetEnv::Vulkan,
                shaderc::EnvVersion::Vulkan1_0 as u32,
            );
            options.set_optimization_level(shaderc::OptimizationLevel::Performance);
            Ok((compiler, options))
        });
        match built {
            Ok((compiler, options)) => Ok(Self { compiler, options }),
            Err(e) => {
                COMPILER_ALIVE.store(false, Ordering::Release);
                Err(anyhow::anyhow!("shaderc init: {e}"))
            }
        }
    }

    /// Compiles one GLSL file; the stage comes from its suffix.
    pub fn compile_file(&mut self, path: &Path) -> Result<Vec<u32>, RenderError> {
        let kind = stage_for_path(path)?;
        let source = fs::read_to_string(path).map_err(|e| RenderError::Shader {
            path: path.to_path_buf(),
            diagnostic: e.to_string(),
        })?;
        let name = path.to_string_lossy();
        let artifact = self
            .compiler
            .compile_into_spirv(&source, kind, &name, "main", Some(&self.options))
            .map_err(|e| RenderError::Shader {
                path: path.to_path_buf(),
                diagnostic: e.to_string(),
            })?;
        if artifact.get_num_warnings() > 0 {
            tracing::warn!("{}: {}", path.display(), artifact.get_warning_messages());
        }
        Ok(artifact.as_binary().to_vec())
    }

    /// `shader.vert` and `shader.frag` from `dir`.
    pub fn compile_pipeline(&mut self, dir: &Path) -> Result<ShaderBinaries, RenderError> {
        let vertex = self.compile_file(&dir.join(VERTEX_SHADER_FILE))?;
        let fragment = self.compile_file(&dir.join(FRAGMENT_SHADER_FILE))?;
        info!(
            "shaders: compiled {} ({} words vert, {} words frag)",
            dir.display(),
            vertex.len(),
            fragment.len()
        );
        Ok(ShaderBinaries { vertex, fragment })
    }
}

impl Drop for ShaderCompiler {
    fn drop(&mut self) {
        COMPILER_ALIVE.store(false, Ordering::Release);
    }
}
