// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tessel_render::{
    AssetStore, FrameOutcome, PresentPreference, RenderSettings, RenderSize, Renderer,
    QUAD_INDICES, QUAD_VERTICES,
};
use tracing::{debug, info, trace, warn};

use crate::context::VkContext;
use crate::frames::FrameResources;
use crate::geometry::GeometryBuffers;
use crate::gpu::{AcquireOutcome, Gpu};
use crate::pipeline::{PipelineCache, PipelineObjects, ShaderModules};
use crate::swapchain::SwapchainResources;
use crate::sync::{create_frame_sync, FrameSync};

/// Where `render` is in the frame. Every call starts and ends in `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Submitting,
    Presenting,
    Resizing,
}

// CREATION ORDER (startup):
//   shader modules, pipeline cache, command pool
//   swapchain + views -> render pass + pipeline -> geometry -> framebuffers
//   + command buffers -> frame sync
// The swapchain-bound group (swapchain, pipeline objects, frame resources) is
// the only part rebuilt on resize. Everything sits in an Option so a failure
// halfway through leaves a state `release_all` can unwind.
pub struct VkRenderer<G: Gpu = VkContext> {
    gpu: G,
    assets: Box<dyn AssetStore>,
    slots: usize,
    present_mode: PresentPreference,

    shaders: Option<ShaderModules>,
    cache: Option<PipelineCache>,
    command_pool: Option<vk::CommandPool>,
    geometry: Option<GeometryBuffers>,

    swapchain: Option<SwapchainResources>,
    pipeline: Option<PipelineObjects>,
    frames: Option<FrameResources>,

    sync: Vec<FrameSync>,

    window: RenderSize,
    stale: bool,
    state: FrameState,
    frame_count: u64,
    released: bool,
    lost_slot: Option<usize>,
}

impl<G: Gpu> VkRenderer<G> {
    /// Builds every renderer-owned object on top of an existing device.
    pub fn with_gpu(
        gpu: G,
        settings: &RenderSettings,
        assets: Box<dyn AssetStore>,
        size: RenderSize,
    ) -> Result<Self> {
        let mut r = VkRenderer {
            gpu,
            assets,
            slots: settings.frame_slots(),
            present_mode: settings.present_mode,
            shaders: None,
            cache: None,
            command_pool: None,
            geometry: None,
            swapchain: None,
            pipeline: None,
            frames: None,
            sync: Vec::new(),
            window: size,
            stale: false,
            state: FrameState::Idle,
            frame_count: 0,
            released: false,
            lost_slot: None,
        };
        // on error `r` drops here and Drop unwinds whatever was built
        r.init(settings)?;
        Ok(r)
    }

    fn init(&mut self, settings: &RenderSettings) -> Result<()> {
        self.shaders = Some(ShaderModules::load(
            &mut self.gpu,
            &*self.assets,
            &settings.vertex_shader,
            &settings.fragment_shader,
        )?);
        self.cache = Some(PipelineCache::load(
            &mut self.gpu,
            &*self.assets,
            &settings.pipeline_cache_dir,
        )?);
        let graphics = self.gpu.queue_families().graphics;
        self.command_pool = Some(
            self.gpu
                .create_command_pool(graphics)
                .context("create_command_pool")?,
        );

        if self.window.is_empty() {
            info!("vk: window is 0x0 at startup, swapchain deferred");
            self.stale = true;
        } else {
            self.create_swapchain_and_pipeline()?;
        }

        let pool = self.pool()?;
        self.geometry = Some(GeometryBuffers::upload(
            &mut self.gpu,
            pool,
            QUAD_VERTICES,
            QUAD_INDICES,
        )?);

        if !self.stale {
            self.create_frames()?;
        }

        self.sync = create_frame_sync(&mut self.gpu, self.slots)?;

        info!(
            "vk: renderer ready on '{}' ({} frames in flight)",
            self.gpu.adapter().name,
            self.slots
        );
        Ok(())
    }

    fn pool(&self) -> Result<vk::CommandPool> {
        self.command_pool.context("command pool not created")
    }

    fn create_swapchain_and_pipeline(&mut self) -> Result<()> {
        let sc = SwapchainResources::create(&mut self.gpu, self.present_mode, self.window)?;
        let (format, extent) = (sc.format, sc.extent);
        self.swapchain = Some(sc);

        let shaders = self.shaders.as_ref().context("shader modules not loaded")?;
        let cache = self.cache.as_ref().context("pipeline cache not created")?;
        self.pipeline = Some(PipelineObjects::create(
            &mut self.gpu,
            shaders,
            cache,
            format,
            extent,
        )?);
        Ok(())
    }

    fn create_frames(&mut self) -> Result<()> {
        let pool = self.pool()?;
        let (Some(sc), Some(pipeline), Some(geometry)) =
            (&self.swapchain, &self.pipeline, &self.geometry)
        else {
            anyhow::bail!("frame resources need swapchain, pipeline and geometry");
        };
        self.frames = Some(FrameResources::create(
            &mut self.gpu,
            pool,
            sc,
            pipeline,
            geometry,
        )?);
        Ok(())
    }

    // STRICT RELEASE ORDER (shared by resize and shutdown):
    // command buffers -> pipeline + layout -> render pass -> framebuffers
    // -> image views -> swapchain
    fn release_swapchain_bound(&mut self) {
        if let (Some(frames), Some(pool)) = (self.frames.as_mut(), self.command_pool) {
            frames.free_commands(&mut self.gpu, pool);
        }
        if let Some(p) = self.pipeline.take() {
            p.destroy(&mut self.gpu);
        }
        if let Some(frames) = self.frames.take() {
            frames.destroy(&mut self.gpu);
        }
        if let Some(sc) = self.swapchain.take() {
            sc.destroy(&mut self.gpu);
        }
    }

    fn release_all(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let idle = self.gpu.wait_idle();
        if let Err(e) = &idle {
            warn!("vk: device_wait_idle before teardown failed: {e:#}");
        }

        if let Some(cache) = &self.cache {
            cache.save(&self.gpu, &*self.assets);
        }

        self.release_swapchain_bound();
        for s in std::mem::take(&mut self.sync) {
            s.destroy(&mut self.gpu);
        }
        if let Some(g) = self.geometry.take() {
            g.destroy(&mut self.gpu);
        }
        if let Some(pool) = self.command_pool.take() {
            self.gpu.destroy_command_pool(pool);
        }
        if let Some(cache) = self.cache.take() {
            cache.destroy(&mut self.gpu);
        }
        if let Some(shaders) = self.shaders.take() {
            shaders.destroy(&mut self.gpu);
        }
        debug!("vk: renderer objects released");
        idle.context("device_wait_idle")
    }

    /// Drains the device and rebuilds the swapchain-bound group against the
    /// current window size. A zero-area window postpones the rebuild.
    fn recreate_swapchain(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.stale = true;
        if self.window.is_empty() {
            debug!("vk: swapchain rebuild deferred (window is 0x0)");
            return Ok(());
        }
        self.state = FrameState::Resizing;

        self.gpu.wait_idle().context("device_wait_idle")?;
        self.release_swapchain_bound();
        self.create_swapchain_and_pipeline()?;
        self.create_frames()?;

        self.stale = false;
        if let Some(sc) = &self.swapchain {
            debug!(
                "vk: swapchain rebuilt at {}x{} ({} images)",
                sc.extent.width,
                sc.extent.height,
                sc.image_count()
            );
        }
        Ok(())
    }

    fn draw_frame(&mut self) -> Result<FrameOutcome> {
        let slot = (self.frame_count % self.slots as u64) as usize;
        let (image_available, in_flight) = {
            let s = &self.sync[slot];
            (s.image_available, s.in_flight)
        };
        let swapchain = self
            .swapchain
            .as_ref()
            .map(|sc| sc.handle)
            .context("no swapchain")?;

        self.state = FrameState::Acquiring;
        self.gpu
            .wait_for_fence(in_flight)
            .context("wait_for_fences(in flight)")?;
        let (index, acquire_suboptimal) = match self
            .gpu
            .acquire_next_image(swapchain, image_available)
            .context("acquire_next_image")?
        {
            AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("vk: acquire reported out of date");
                self.recreate_swapchain()?;
                return Ok(FrameOutcome::Rebuilt);
            }
        };

        self.state = FrameState::Submitting;
        let (cmd, render_finished) = self
            .frames
            .as_ref()
            .and_then(|f| {
                let i = index as usize;
                Some((*f.command_buffers.get(i)?, *f.render_finished.get(i)?))
            })
            .context("no command buffer for acquired image")?;
        // an out-of-date acquire above must leave the fence signaled
        self.gpu.reset_fence(in_flight).context("reset_fences")?;
        if let Err(e) = self
            .gpu
            .submit_draw(cmd, image_available, render_finished, in_flight)
        {
            self.renew_slot(slot);
            return Err(e.context("queue_submit"));
        }

        self.state = FrameState::Presenting;
        let presented = self
            .gpu
            .present(swapchain, index, render_finished)
            .context("queue_present")?;
        self.frame_count += 1;

        if acquire_suboptimal || presented.is_stale() {
            debug!(
                "vk: surface stale after present (acquire suboptimal={}, present={:?})",
                acquire_suboptimal, presented
            );
            self.recreate_swapchain()?;
            return Ok(FrameOutcome::Rebuilt);
        }
        Ok(FrameOutcome::Presented)
    }

    /// A failed submit leaves the slot's fence reset with nothing to signal it.
    /// Replace the slot's objects so the next frame on it does not block forever;
    /// if that fails too, every later frame reports the slot as lost.
    fn renew_slot(&mut self, slot: usize) {
        if let Err(e) = self.gpu.wait_idle() {
            warn!("vk: device_wait_idle after failed submit: {e:#}");
        }
        if let Err(e) = self.sync[slot].renew(&mut self.gpu) {
            warn!("vk: frame slot {slot} could not be renewed: {e:#}");
            self.lost_slot = Some(slot);
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(|sc| sc.extent)
    }

    pub fn swapchain(&self) -> Option<&SwapchainResources> {
        self.swapchain.as_ref()
    }

    pub fn pipeline(&self) -> Option<&PipelineObjects> {
        self.pipeline.as_ref()
    }

    pub fn frames(&self) -> Option<&FrameResources> {
        self.frames.as_ref()
    }

    pub fn geometry(&self) -> Option<&GeometryBuffers> {
        self.geometry.as_ref()
    }

    pub fn frame_sync(&self) -> &[FrameSync] {
        &self.sync
    }

    /// Swapchain images, views, framebuffers and command buffers, in that
    /// order. All four match whenever the swapchain exists.
    pub fn per_image_counts(&self) -> (usize, usize, usize, usize) {
        let (images, views) = self
            .swapchain
            .as_ref()
            .map_or((0, 0), |sc| (sc.images.len(), sc.views.len()));
        let (fbs, cmds) = self
            .frames
            .as_ref()
            .map_or((0, 0), |f| (f.framebuffers.len(), f.command_buffers.len()));
        (images, views, fbs, cmds)
    }

    /// Surface size changed. Zero area parks the renderer until a real size
    /// arrives.
    pub fn resize_to(&mut self, size: RenderSize) -> Result<()> {
        if self.released {
            debug!("vk: resize after shutdown ignored");
            return Ok(());
        }
        if size.is_empty() && !self.window.is_empty() {
            info!("vk: resize to {}x{} -> paused", size.width, size.height);
        } else if !size.is_empty() && self.window.is_empty() {
            info!("vk: resize to {}x{} -> resumed", size.width, size.height);
        }
        self.window = size;
        let out = self.recreate_swapchain();
        self.state = FrameState::Idle;
        out
    }

    pub fn draw(&mut self) -> Result<FrameOutcome> {
        if self.released {
            return Ok(FrameOutcome::Skipped);
        }
        if let Some(slot) = self.lost_slot {
            anyhow::bail!("frame slot {slot} lost after a failed submit");
        }
        if self.window.is_empty() {
            return Ok(FrameOutcome::Skipped);
        }
        if self.stale {
            // an earlier rebuild was deferred or failed; retry before drawing
            let out = self.recreate_swapchain();
            self.state = FrameState::Idle;
            out?;
            return Ok(FrameOutcome::Rebuilt);
        }
        let out = self.draw_frame();
        trace!("vk: frame {} ended in {:?}", self.frame_count, self.state);
        self.state = FrameState::Idle;
        out
    }

    pub fn release(&mut self) -> Result<()> {
        self.release_all()
    }
}

impl<G: Gpu> Drop for VkRenderer<G> {
    fn drop(&mut self) {
        if let Err(e) = self.release_all() {
            warn!("vk: teardown on drop: {e:#}");
        }
    }
}

impl Renderer for VkRenderer<VkContext> {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        assets: Box<dyn AssetStore>,
    ) -> Result<Self> {
        let ctx = VkContext::new(window, display, settings.validation)?;
        VkRenderer::with_gpu(ctx, settings, assets, size)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.resize_to(size)
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        self.draw()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.release()
    }
}
