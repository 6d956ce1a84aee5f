// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use anyhow::{Context, Result};
use asterism_core::init_tracing;
use asterism_platform::Platform;
use asterism_render::{FrameStatus, Renderer, WindowEvents};
use asterism_render_vk::{ShaderCompiler, VkRenderer};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config; a missing file means built-in defaults
    #[arg(long, default_value = "asterism.toml")]
    config: PathBuf,

    /// Override the window width from the config
    #[arg(long)]
    width: Option<u32>,

    /// Override the window height from the config
    #[arg(long)]
    height: Option<u32>,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = AppConfig::load(&args.config)?;
    cfg.apply_overrides(args.width, args.height);
    debug!("config = {cfg:?}");

    // One compiler per process; it outlives the renderer.
    let mut compiler = ShaderCompiler::init().context("shader compiler init")?;
    let shaders = compiler
        .compile_pipeline(&cfg.render.shader_dir)
        .context("compile shaders")?;
    let settings = cfg.render_settings(shaders, exe_dir());

    let mut platform = Platform::new(cfg.window_config()).context("open window")?;
    let mut renderer = {
        let window = platform.window()?;
        VkRenderer::new(window, window, platform.framebuffer_size(), &settings)
            .context("renderer init")?
    };

    let mut frames: u32 = 0;
    let mut last_fps_instant = Instant::now();

    while !platform.should_close() {
        platform.pump();
        if platform.should_close() {
            break;
        }
        if platform.framebuffer_size().is_zero_area() {
            platform.wait_events();
            continue;
        }

        match renderer.render(&mut platform)? {
            FrameStatus::Presented => frames = frames.saturating_add(1),
            FrameStatus::Recreated => {
                frames = frames.saturating_add(1);
                debug!("swapchain rebuilt after present");
            }
            FrameStatus::Skipped => debug!("frame skipped, swapchain was out of date"),
        }

        let now = Instant::now();
        if now.duration_since(last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {frames}");
            frames = 0;
            last_fps_instant = now;
        }
    }

    renderer.wait_idle()?;
    info!("shutdown");
    Ok(())
}

fn exe_dir() -> Option<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => exe.parent().map(Path::to_path_buf),
        Err(e) => {
            warn!("cannot locate executable ({e}); pipeline cache stays in memory");
            None
        }
    }
}
