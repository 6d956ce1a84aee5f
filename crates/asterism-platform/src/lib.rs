// SPDX-License-Identifier: CEPL-1.0
//! Window collaborator on top of `winit`.
//!
//! The event loop is pumped explicitly so the frame loop stays in charge of
//! the thread: `pump` drains pending events without blocking and `wait_events`
//! blocks until at least one arrives.

pub use winit;

use anyhow::{anyhow, bail, Result};
use asterism_render::{RenderSize, WindowEvents};
use std::time::Duration;
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resize {
    Minimized,
    Resized(RenderSize),
}

impl Resize {
    pub fn classify(size: PhysicalSize<u32>) -> Self {
        let size = RenderSize {
            width: size.width,
            height: size.height,
        };
        if size.is_zero_area() {
            Resize::Minimized
        } else {
            Resize::Resized(size)
        }
    }
}

/// Application state the event loop calls back into.
struct Handler {
    config: WindowConfig,
    window: Option<Window>,
    resized: bool,
    close_requested: bool,
    create_error: Option<String>,
}

impl Handler {
    fn on_key(&mut self, event: &KeyEvent) {
        if event.state == ElementState::Pressed
            && event.logical_key == Key::Named(NamedKey::Escape)
        {
            info!("escape pressed; closing");
            self.close_requested = true;
        }
    }
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                info!("window created {}x{}", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                match Resize::classify(size) {
                    Resize::Minimized => info!("window minimized"),
                    Resize::Resized(s) => info!("window resized {}x{}", s.width, s.height),
                }
                self.resized = true;
            }
            WindowEvent::KeyboardInput { event, .. } => self.on_key(&event),
            _ => {}
        }
    }
}

pub struct Platform {
    event_loop: EventLoop<()>,
    handler: Handler,
}

impl Platform {
    /// Opens the window. Blocks until the platform has delivered it.
    pub fn new(config: WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let mut platform = Self {
            event_loop,
            handler: Handler {
                config,
                window: None,
                resized: false,
                close_requested: false,
                create_error: None,
            },
        };

        while platform.handler.window.is_none() {
            if let PumpStatus::Exit(code) = platform.pump_with(Some(Duration::from_millis(16))) {
                bail!("event loop exited with {code} before the window was created");
            }
            if let Some(e) = platform.handler.create_error.take() {
                bail!("create_window: {e}");
            }
        }
        // Initial size is not a resize.
        platform.handler.resized = false;
        Ok(platform)
    }

    pub fn window(&self) -> Result<&Window> {
        self.handler
            .window
            .as_ref()
            .ok_or_else(|| anyhow!("window is gone"))
    }

    /// Handles whatever events are queued, without blocking.
    pub fn pump(&mut self) {
        self.pump_with(Some(Duration::ZERO));
    }

    /// The frame loop's continuation predicate.
    pub fn should_close(&self) -> bool {
        self.handler.close_requested
    }

    fn pump_with(&mut self, timeout: Option<Duration>) -> PumpStatus {
        let status = self.event_loop.pump_app_events(timeout, &mut self.handler);
        if let PumpStatus::Exit(code) = status {
            debug!("event loop exit status {code}");
            self.handler.close_requested = true;
        }
        status
    }
}

impl WindowEvents for Platform {
    fn framebuffer_size(&self) -> RenderSize {
        match &self.handler.window {
            Some(w) => {
                let size = w.inner_size();
                RenderSize {
                    width: size.width,
                    height: size.height,
                }
            }
            None => RenderSize {
                width: 0,
                height: 0,
            },
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.handler.resized)
    }

    fn wait_events(&mut self) {
        self.pump_with(None);
    }

    fn close_requested(&self) -> bool {
        self.handler.close_requested
    }
}
