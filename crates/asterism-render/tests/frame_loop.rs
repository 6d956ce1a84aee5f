// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use asterism_render::{
    AcquireOutcome, FrameDevice, FrameScheduler, FrameStatus, PresentOutcome, RenderSize,
    WindowEvents, MAX_FRAMES_IN_FLIGHT,
};
use std::collections::VecDeque;
use std::time::Duration;

/// A swapchain that hands out images round-robin and can change its image
/// count on rebuild.
struct FakeSwapchain {
    images: usize,
    next_image: u32,
    rebuilt_images: usize,
    generation: u32,
    stale_acquires: VecDeque<bool>,
    fence_waits: Vec<usize>,
    submitted: Vec<(u32, usize, u32)>,
    pending_submits: [bool; MAX_FRAMES_IN_FLIGHT],
}

impl FakeSwapchain {
    fn new(images: usize, rebuilt_images: usize) -> Self {
        Self {
            images,
            next_image: 0,
            rebuilt_images,
            generation: 0,
            stale_acquires: VecDeque::new(),
            fence_waits: Vec::new(),
            submitted: Vec::new(),
            pending_submits: [false; MAX_FRAMES_IN_FLIGHT],
        }
    }
}

impl FrameDevice for FakeSwapchain {
    fn image_count(&self) -> usize {
        self.images
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        self.fence_waits.push(slot);
        self.pending_submits[slot] = false;
        Ok(())
    }

    fn acquire_next_image(&mut self, _slot: usize) -> Result<AcquireOutcome> {
        if self.stale_acquires.pop_front().unwrap_or(false) {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.images as u32;
        Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn update_uniforms(&mut self, image_index: u32, _elapsed: Duration) -> Result<()> {
        assert!((image_index as usize) < self.images);
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        assert!(!self.pending_submits[slot], "slot {slot} reset while its work is pending");
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.pending_submits[slot] = true;
        self.submitted.push((self.generation, slot, image_index));
        Ok(())
    }

    fn present(&mut self, _slot: usize, _image_index: u32) -> Result<PresentOutcome> {
        Ok(PresentOutcome::Presented)
    }

    fn recreate(&mut self, _window: &mut dyn WindowEvents) -> Result<()> {
        self.generation += 1;
        self.images = self.rebuilt_images;
        self.next_image = 0;
        Ok(())
    }
}

struct ResizingWindow {
    resize_after: VecDeque<bool>,
}

impl WindowEvents for ResizingWindow {
    fn framebuffer_size(&self) -> RenderSize {
        RenderSize {
            width: 640,
            height: 480,
        }
    }

    fn take_resized(&mut self) -> bool {
        self.resize_after.pop_front().unwrap_or(false)
    }

    fn wait_events(&mut self) {}
}

#[test]
fn resize_then_stale_acquire_keeps_the_loop_consistent() {
    let mut dev = FakeSwapchain::new(3, 2);
    dev.stale_acquires = [false, false, true].into_iter().collect();
    let mut window = ResizingWindow {
        resize_after: [false, true].into_iter().collect(),
    };
    let mut scheduler = FrameScheduler::new(dev.image_count());

    let statuses: Vec<FrameStatus> = (0..6)
        .map(|_| scheduler.draw_frame(&mut dev, &mut window).unwrap())
        .collect();

    assert_eq!(
        statuses,
        vec![
            FrameStatus::Presented,
            FrameStatus::Recreated,
            FrameStatus::Skipped,
            FrameStatus::Presented,
            FrameStatus::Presented,
            FrameStatus::Presented,
        ]
    );
    assert_eq!(dev.generation, 2);
    assert_eq!(dev.image_count(), 2);

    // The skipped frame reused slot 0; frames then alternate slots again.
    assert_eq!(
        dev.submitted,
        vec![(0, 0, 0), (0, 1, 1), (2, 0, 0), (2, 1, 1), (2, 0, 0)]
    );
    assert_eq!(scheduler.current_frame(), 1);
}

#[test]
fn every_image_index_stays_within_the_current_swapchain() {
    let mut dev = FakeSwapchain::new(4, 3);
    let mut window = ResizingWindow {
        resize_after: [false, false, false, true].into_iter().collect(),
    };
    let mut scheduler = FrameScheduler::new(dev.image_count());

    for _ in 0..12 {
        scheduler.draw_frame(&mut dev, &mut window).unwrap();
    }

    for &(generation, slot, image) in &dev.submitted {
        let images = if generation == 0 { 4 } else { 3 };
        assert!((image as usize) < images);
        assert!(slot < MAX_FRAMES_IN_FLIGHT);
    }
    assert_eq!(dev.submitted.len(), 12);
}
