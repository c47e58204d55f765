// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::gpu::Gpu;

/// Per frame-in-flight acquire signal and CPU fence. The fence starts
/// signaled so the first wait on each slot returns immediately.
/// Render-finished semaphores are per swapchain image, see `FrameResources`.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub fn create<G: Gpu>(gpu: &mut G) -> Result<Self> {
        let image_available = gpu.create_semaphore().context("create_semaphore")?;
        let in_flight = match gpu.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                gpu.destroy_semaphore(image_available);
                return Err(e.context("create_fence"));
            }
        };
        Ok(Self {
            image_available,
            in_flight,
        })
    }

    /// Swaps in fresh objects. Used when a submit failed after the fence was
    /// reset: that fence has nothing left to signal it and the acquire
    /// semaphore holds a signal nobody will wait on.
    pub fn renew<G: Gpu>(&mut self, gpu: &mut G) -> Result<()> {
        let fresh = FrameSync::create(gpu)?;
        std::mem::replace(self, fresh).destroy(gpu);
        Ok(())
    }

    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        gpu.destroy_semaphore(self.image_available);
        gpu.destroy_fence(self.in_flight);
    }
}

/// `count` slots; on failure the slots already made are released.
pub fn create_frame_sync<G: Gpu>(gpu: &mut G, count: usize) -> Result<Vec<FrameSync>> {
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        match FrameSync::create(gpu) {
            Ok(s) => slots.push(s),
            Err(e) => {
                for s in slots {
                    s.destroy(gpu);
                }
                return Err(e);
            }
        }
    }
    Ok(slots)
}
