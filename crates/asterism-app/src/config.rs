// SPDX-License-Identifier: CEPL-1.0
use asterism_core::RenderError;
use asterism_platform::WindowConfig;
use asterism_render::{RenderSettings, ShaderBinaries};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    /// Directory holding `shader.vert` and `shader.frag`.
    pub shader_dir: PathBuf,
    /// Only honoured in debug builds, and only when the layer is installed.
    pub validation: bool,
    /// Persist the driver pipeline cache next to the executable.
    pub pipeline_cache: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "asterism".to_owned(),
            width: 1024,
            height: 768,
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_dir: PathBuf::from("shaders"),
            validation: true,
            pipeline_cache: true,
        }
    }
}

impl AppConfig {
    /// A missing file yields the defaults; anything unreadable or malformed is fatal.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)
                .map_err(|e| RenderError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(read_error(path, e)),
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply_overrides(&mut self, width: Option<u32>, height: Option<u32>) {
        if let Some(w) = width {
            self.window.width = w;
        }
        if let Some(h) = height {
            self.window.height = h;
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }

    /// `cache_dir` is where the pipeline cache goes when it is enabled.
    pub fn render_settings(
        &self,
        shaders: ShaderBinaries,
        cache_dir: Option<PathBuf>,
    ) -> RenderSettings {
        RenderSettings {
            clear_color: self.render.clear_color,
            validation: self.render.validation,
            pipeline_cache: if self.render.pipeline_cache {
                cache_dir
            } else {
                None
            },
            shaders,
        }
    }
}

fn read_error(path: &Path, e: io::Error) -> RenderError {
    RenderError::Config(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(AppConfig::parse("").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppConfig::parse(
            r#"
            [window]
            width = 640

            [render]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            validation = false
            "#,
        )
        .unwrap();

        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.window.height, 768);
        assert_eq!(cfg.window.title, "asterism");
        assert_eq!(cfg.render.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert!(!cfg.render.validation);
        assert!(cfg.render.pipeline_cache);
        assert_eq!(cfg.render.shader_dir, PathBuf::from("shaders"));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(AppConfig::parse("[window]\nwidth = \"wide\"\n").is_err());
        assert!(AppConfig::parse("[render]\nclear_color = [1.0]\n").is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let path = std::env::temp_dir().join("asterism-config-does-not-exist.toml");
        assert_eq!(AppConfig::load(&path).unwrap(), AppConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error_naming_the_path() {
        let path = std::env::temp_dir().join(format!("asterism-bad-{}.toml", std::process::id()));
        fs::write(&path, "[window\nwidth = 1").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        let _ = fs::remove_file(&path);

        match err {
            RenderError::Config(msg) => assert!(msg.contains("asterism-bad-"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn cli_overrides_win() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(Some(1920), None);
        assert_eq!((cfg.window.width, cfg.window.height), (1920, 768));
    }

    #[test]
    fn disabled_cache_drops_the_directory() {
        let mut cfg = AppConfig::default();
        let dir = Some(PathBuf::from("/tmp"));
        assert_eq!(
            cfg.render_settings(ShaderBinaries::default(), dir.clone())
                .pipeline_cache,
            dir
        );
        cfg.render.pipeline_cache = false;
        assert_eq!(
            cfg.render_settings(ShaderBinaries::default(), dir)
                .pipeline_cache,
            None
        );
    }
}
