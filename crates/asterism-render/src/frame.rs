// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing and the swapchain-recreation state machine.
//!
//! The scheduler owns no GPU objects. It drives a [`FrameDevice`] through
//! wait → acquire → record/submit → present for one of `MAX_FRAMES_IN_FLIGHT`
//! slots, and decides when the swapchain has to be rebuilt.

use crate::WindowEvents;
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// What one call to [`FrameScheduler::draw_frame`] ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// Submitted and presented; the swapchain is still valid.
    Presented,
    /// Submitted and presented, then the swapchain was rebuilt.
    Recreated,
    /// Acquire reported out-of-date. The swapchain was rebuilt and nothing was
    /// submitted; the same slot is used again on the next call.
    Skipped,
}

/// The per-frame GPU operations the scheduler sequences.
///
/// `slot` is always in `0..MAX_FRAMES_IN_FLIGHT`; `image_index` is whatever
/// the last acquire returned.
pub trait FrameDevice {
    /// Number of images in the current swapchain.
    fn image_count(&self) -> usize;

    /// Blocks until the in-flight fence of `slot` is signaled.
    fn wait_for_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquires the next image, signaling the image-available semaphore of `slot`.
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Writes the per-image uniform data for `elapsed` since start.
    fn update_uniforms(&mut self, image_index: u32, elapsed: Duration) -> Result<()>;

    fn reset_fence(&mut self, slot: usize) -> Result<()>;

    /// Submits the command buffer of `image_index`, signaling the fence of `slot`.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Tears down and rebuilds everything sized by the swapchain.
    fn recreate(&mut self, window: &mut dyn WindowEvents) -> Result<()>;
}

#[derive(Debug)]
pub struct FrameScheduler {
    current_frame: usize,
    /// For each swapchain image, the slot whose submission last used it.
    images_in_flight: Vec<Option<usize>>,
    started: Instant,
}

impl FrameScheduler {
    pub fn new(image_count: usize) -> Self {
        Self {
            current_frame: 0,
            images_in_flight: vec![None; image_count],
            started: Instant::now(),
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn draw_frame<D>(&mut self, dev: &mut D, window: &mut dyn WindowEvents) -> Result<FrameStatus>
    where
        D: FrameDevice + ?Sized,
    {
        let slot = self.current_frame;

        dev.wait_for_fence(slot)?;

        // A suboptimal acquire still draws; only present outcomes and resizes rebuild.
        let image_index = match dev.acquire_next_image(slot)? {
            AcquireOutcome::Ready { image_index, .. } => image_index,
            AcquireOutcome::OutOfDate => {
                info!("swapchain out of date on acquire; recreating");
                self.recreate(dev, window)?;
                return Ok(FrameStatus::Skipped);
            }
        };

        let image = image_index as usize;
        if image >= self.images_in_flight.len() {
            self.images_in_flight.resize(image + 1, None);
        }
        if let Some(owner) = self.images_in_flight[image] {
            if owner != slot {
                debug!(image, owner, slot, "image still in flight; waiting on owner");
                dev.wait_for_fence(owner)?;
            }
        }
        self.images_in_flight[image] = Some(slot);

        dev.update_uniforms(image_index, self.started.elapsed())?;

        dev.reset_fence(slot)?;
        dev.submit(slot, image_index)?;

        let presented = dev.present(slot, image_index)?;
        let resized = window.take_resized();

        let status = if resized || presented != PresentOutcome::Presented {
            info!(?presented, resized, "recreating swapchain after present");
            self.recreate(dev, window)?;
            FrameStatus::Recreated
        } else {
            FrameStatus::Presented
        };

        self.current_frame = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(status)
    }

    fn recreate<D>(&mut self, dev: &mut D, window: &mut dyn WindowEvents) -> Result<()>
    where
        D: FrameDevice + ?Sized,
    {
        dev.recreate(window)?;
        self.images_in_flight = vec![None; dev.image_count()];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RenderSize;
    use std::collections::VecDeque;
    use std::sync::{mpsc, Arc, Condvar, Mutex};
    use std::thread;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Update(u32),
        Reset(usize),
        Submit(usize, u32),
        Present(usize, u32),
        Recreate,
    }

    struct MockDevice {
        calls: Vec<Call>,
        images: usize,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
    }

    impl MockDevice {
        fn new(images: usize) -> Self {
            Self {
                calls: Vec::new(),
                images,
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
            }
        }

        fn ready(index: u32) -> AcquireOutcome {
            AcquireOutcome::Ready {
                image_index: index,
                suboptimal: false,
            }
        }
    }

    impl FrameDevice for MockDevice {
        fn image_count(&self) -> usize {
            self.images
        }
        fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }
        fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.acquires.pop_front().unwrap_or(Self::ready(slot as u32)))
        }
        fn update_uniforms(&mut self, image_index: u32, _elapsed: Duration) -> Result<()> {
            self.calls.push(Call::Update(image_index));
            Ok(())
        }
        fn reset_fence(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Reset(slot));
            Ok(())
        }
        fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.calls.push(Call::Submit(slot, image_index));
            Ok(())
        }
        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }
        fn recreate(&mut self, _window: &mut dyn WindowEvents) -> Result<()> {
            self.calls.push(Call::Recreate);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockWindow {
        resized: bool,
    }

    impl WindowEvents for MockWindow {
        fn framebuffer_size(&self) -> RenderSize {
            RenderSize {
                width: 800,
                height: 600,
            }
        }
        fn take_resized(&mut self) -> bool {
            std::mem::take(&mut self.resized)
        }
        fn wait_events(&mut self) {}
    }

    #[test]
    fn steady_state_frame_runs_in_order_and_advances() {
        let mut dev = MockDevice::new(3);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let status = sched.draw_frame(&mut dev, &mut win).unwrap();

        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(
            dev.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Update(0),
                Call::Reset(0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(sched.current_frame(), 1);
    }

    #[test]
    fn slots_cycle_through_frames_in_flight() {
        let mut dev = MockDevice::new(3);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(sched.current_frame());
            sched.draw_frame(&mut dev, &mut win).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn out_of_date_acquire_recreates_without_submitting() {
        let mut dev = MockDevice::new(3);
        dev.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let status = sched.draw_frame(&mut dev, &mut win).unwrap();

        assert_eq!(status, FrameStatus::Skipped);
        assert_eq!(dev.calls, vec![Call::Wait(0), Call::Acquire(0), Call::Recreate]);
        assert_eq!(sched.current_frame(), 0);

        // The retry reuses the same slot; its fence was never reset.
        dev.calls.clear();
        let status = sched.draw_frame(&mut dev, &mut win).unwrap();
        assert_eq!(status, FrameStatus::Presented);
        assert_eq!(dev.calls[0], Call::Wait(0));
        assert!(dev.calls.contains(&Call::Submit(0, 0)));
        assert_eq!(sched.current_frame(), 1);
    }

    #[test]
    fn suboptimal_present_recreates_after_presenting() {
        let mut dev = MockDevice::new(3);
        dev.presents.push_back(PresentOutcome::Suboptimal);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let status = sched.draw_frame(&mut dev, &mut win).unwrap();

        assert_eq!(status, FrameStatus::Recreated);
        assert_eq!(dev.calls.last(), Some(&Call::Recreate));
        assert!(dev.calls.contains(&Call::Present(0, 0)));
        assert_eq!(sched.current_frame(), 1);
    }

    #[test]
    fn out_of_date_present_recreates() {
        let mut dev = MockDevice::new(3);
        dev.presents.push_back(PresentOutcome::OutOfDate);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        assert_eq!(sched.draw_frame(&mut dev, &mut win).unwrap(), FrameStatus::Recreated);
    }

    #[test]
    fn suboptimal_acquire_draws_without_recreating() {
        let mut dev = MockDevice::new(3);
        dev.acquires.push_back(AcquireOutcome::Ready {
            image_index: 2,
            suboptimal: true,
        });
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let status = sched.draw_frame(&mut dev, &mut win).unwrap();
        assert_eq!(status, FrameStatus::Presented);
        assert!(dev.calls.contains(&Call::Submit(0, 2)));
        assert!(!dev.calls.contains(&Call::Recreate));
    }

    #[test]
    fn persistently_suboptimal_acquire_never_rebuilds() {
        let mut dev = MockDevice::new(3);
        for i in 0..5 {
            dev.acquires.push_back(AcquireOutcome::Ready {
                image_index: i % 3,
                suboptimal: true,
            });
        }
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let statuses: Vec<_> = (0..5)
            .map(|_| sched.draw_frame(&mut dev, &mut win).unwrap())
            .collect();
        assert_eq!(statuses, vec![FrameStatus::Presented; 5]);
        assert!(!dev.calls.contains(&Call::Recreate));
    }

    #[test]
    fn resize_flag_forces_recreate_and_is_cleared() {
        let mut dev = MockDevice::new(3);
        let mut win = MockWindow { resized: true };
        let mut sched = FrameScheduler::new(3);

        assert_eq!(sched.draw_frame(&mut dev, &mut win).unwrap(), FrameStatus::Recreated);
        assert!(!win.resized);

        dev.calls.clear();
        assert_eq!(sched.draw_frame(&mut dev, &mut win).unwrap(), FrameStatus::Presented);
        assert!(!dev.calls.contains(&Call::Recreate));
    }

    #[test]
    fn image_owned_by_other_slot_waits_on_that_fence() {
        let mut dev = MockDevice::new(3);
        dev.acquires
            .extend([MockDevice::ready(0), MockDevice::ready(1), MockDevice::ready(1)]);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        for _ in 0..3 {
            sched.draw_frame(&mut dev, &mut win).unwrap();
        }

        let third: Vec<_> = dev
            .calls
            .iter()
            .skip_while(|c| **c != Call::Present(1, 1))
            .skip(1)
            .cloned()
            .collect();
        assert_eq!(
            third,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Wait(1),
                Call::Update(1),
                Call::Reset(0),
                Call::Submit(0, 1),
                Call::Present(0, 1),
            ]
        );
    }

    #[test]
    fn recreate_forgets_image_ownership() {
        let mut dev = MockDevice::new(2);
        dev.acquires.extend([MockDevice::ready(1), MockDevice::ready(1)]);
        dev.presents.push_back(PresentOutcome::Suboptimal);
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(2);

        sched.draw_frame(&mut dev, &mut win).unwrap();
        dev.calls.clear();
        sched.draw_frame(&mut dev, &mut win).unwrap();

        // Slot 1 acquires image 1, which slot 0 used before the rebuild.
        assert_eq!(dev.calls.iter().filter(|c| matches!(c, Call::Wait(_))).count(), 1);
    }

    #[test]
    fn errors_abort_the_frame() {
        struct Broken(MockDevice);
        impl FrameDevice for Broken {
            fn image_count(&self) -> usize {
                self.0.image_count()
            }
            fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
                self.0.wait_for_fence(slot)
            }
            fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
                self.0.acquire_next_image(slot)
            }
            fn update_uniforms(&mut self, i: u32, e: Duration) -> Result<()> {
                self.0.update_uniforms(i, e)
            }
            fn reset_fence(&mut self, slot: usize) -> Result<()> {
                self.0.reset_fence(slot)
            }
            fn submit(&mut self, _slot: usize, _image_index: u32) -> Result<()> {
                anyhow::bail!("device lost")
            }
            fn present(&mut self, slot: usize, i: u32) -> Result<PresentOutcome> {
                self.0.present(slot, i)
            }
            fn recreate(&mut self, w: &mut dyn WindowEvents) -> Result<()> {
                self.0.recreate(w)
            }
        }

        let mut dev = Broken(MockDevice::new(3));
        let mut win = MockWindow::default();
        let mut sched = FrameScheduler::new(3);

        let err = sched.draw_frame(&mut dev, &mut win).unwrap_err();
        assert!(err.to_string().contains("device lost"));
        assert!(!dev.0.calls.iter().any(|c| matches!(c, Call::Present(..))));
        assert_eq!(sched.current_frame(), 0);
    }

    // Fences as (signaled, condvar); the test thread plays the GPU.
    type Fence = Arc<(Mutex<bool>, Condvar)>;

    struct FencedDevice {
        fences: Vec<Fence>,
        next_image: u32,
    }

    impl FrameDevice for FencedDevice {
        fn image_count(&self) -> usize {
            3
        }
        fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
            let (lock, cv) = &*self.fences[slot];
            let mut signaled = lock.lock().unwrap();
            while !*signaled {
                signaled = cv.wait(signaled).unwrap();
            }
            Ok(())
        }
        fn acquire_next_image(&mut self, _slot: usize) -> Result<AcquireOutcome> {
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % 3;
            Ok(AcquireOutcome::Ready {
                image_index,
                suboptimal: false,
            })
        }
        fn update_uniforms(&mut self, _: u32, _: Duration) -> Result<()> {
            Ok(())
        }
        fn reset_fence(&mut self, slot: usize) -> Result<()> {
            *self.fences[slot].0.lock().unwrap() = false;
            Ok(())
        }
        fn submit(&mut self, _: usize, _: u32) -> Result<()> {
            Ok(())
        }
        fn present(&mut self, _: usize, _: u32) -> Result<PresentOutcome> {
            Ok(PresentOutcome::Presented)
        }
        fn recreate(&mut self, _: &mut dyn WindowEvents) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cpu_blocks_once_frames_in_flight_are_exhausted() {
        let fences: Vec<Fence> = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Arc::new((Mutex::new(true), Condvar::new())))
            .collect();
        let gpu_side = fences.clone();

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            let mut dev = FencedDevice {
                fences,
                next_image: 0,
            };
            let mut win = MockWindow::default();
            let mut sched = FrameScheduler::new(3);
            for frame in 0..MAX_FRAMES_IN_FLIGHT + 1 {
                sched.draw_frame(&mut dev, &mut win).unwrap();
                tx.send(frame).unwrap();
            }
        });

        for frame in 0..MAX_FRAMES_IN_FLIGHT {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), frame);
        }
        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

        let (lock, cv) = &*gpu_side[0];
        *lock.lock().unwrap() = true;
        cv.notify_all();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            MAX_FRAMES_IN_FLIGHT
        );
        worker.join().unwrap();
    }
}
