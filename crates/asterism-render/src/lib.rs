// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

pub mod frame;
pub mod queue;

pub use frame::{
    AcquireOutcome, FrameDevice, FrameScheduler, FrameStatus, PresentOutcome,
    MAX_FRAMES_IN_FLIGHT,
};
pub use queue::{QueueCaps, QueueFamilyInfo, QueueFamilySet, QueueRole};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// SPIR-V words for the single graphics pipeline.
#[derive(Clone, Debug, Default)]
pub struct ShaderBinaries {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub pipeline_cache: Option<PathBuf>,
    pub shaders: ShaderBinaries,
}

/// What the frame loop needs from the window while it runs.
pub trait WindowEvents {
    /// Current drawable size in pixels; zero while minimized.
    fn framebuffer_size(&self) -> RenderSize;

    /// Returns whether a resize was reported since the last call, and clears it.
    fn take_resized(&mut self) -> bool;

    /// Blocks until at least one window event has been processed.
    fn wait_events(&mut self);

    /// Whether the user asked to close; ends a wait for a non-zero size.
    fn close_requested(&self) -> bool {
        false
    }
}

/// Blocks while the window has no drawable area, polling its events.
///
/// Returns the first non-zero size, or `None` if the window was asked to close
/// first.
pub fn wait_for_drawable(window: &mut dyn WindowEvents) -> Option<RenderSize> {
    loop {
        let size = window.framebuffer_size();
        if !size.is_zero_area() {
            return Some(size);
        }
        if window.close_requested() {
            return None;
        }
        window.wait_events();
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Runs one iteration of the frame loop.
    fn render(&mut self, window: &mut dyn WindowEvents) -> Result<FrameStatus>;

    /// Blocks until the GPU has finished everything submitted so far.
    fn wait_idle(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    /// Reports the front size until the next wait; the last one sticks.
    struct MinimizedWindow {
        sizes: VecDeque<RenderSize>,
        waits: usize,
        close_after_waits: Option<usize>,
    }

    impl MinimizedWindow {
        fn new(zero_polls: usize, then: RenderSize) -> Self {
            let mut sizes: VecDeque<_> = std::iter::repeat(size(0, 0)).take(zero_polls).collect();
            sizes.push_back(then);
            Self {
                sizes,
                waits: 0,
                close_after_waits: None,
            }
        }
    }

    impl WindowEvents for MinimizedWindow {
        fn framebuffer_size(&self) -> RenderSize {
            self.sizes[0]
        }
        fn take_resized(&mut self) -> bool {
            false
        }
        fn wait_events(&mut self) {
            self.waits += 1;
            if self.sizes.len() > 1 {
                self.sizes.pop_front();
            }
        }
        fn close_requested(&self) -> bool {
            self.close_after_waits.is_some_and(|n| self.waits >= n)
        }
    }

    #[test]
    fn zero_area_covers_either_dimension() {
        assert!(size(0, 600).is_zero_area());
        assert!(size(800, 0).is_zero_area());
        assert!(!size(1, 1).is_zero_area());
    }

    #[test]
    fn drawable_size_returns_without_waiting() {
        let mut win = MinimizedWindow::new(0, size(800, 600));
        assert_eq!(wait_for_drawable(&mut win), Some(size(800, 600)));
        assert_eq!(win.waits, 0);
    }

    #[test]
    fn minimized_window_is_polled_until_it_has_area() {
        let mut win = MinimizedWindow::new(3, size(800, 600));
        assert_eq!(wait_for_drawable(&mut win), Some(size(800, 600)));
        assert_eq!(win.waits, 3);
    }

    #[test]
    fn close_while_minimized_ends_the_wait() {
        let mut win = MinimizedWindow::new(10, size(800, 600));
        win.close_after_waits = Some(2);
        assert_eq!(wait_for_drawable(&mut win), None);
        assert_eq!(win.waits, 2);
    }
}
