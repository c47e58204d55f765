// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::geometry::GeometryBuffers;
use crate::gpu::{DrawRecording, Gpu};
use crate::pipeline::PipelineObjects;
use crate::swapchain::SwapchainResources;

pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// One framebuffer, one pre-recorded command buffer and one render-finished
/// semaphore per swapchain image. The semaphore is keyed by image index: the
/// present that waits on it is not covered by any frame fence, so it can only
/// be signaled again once the same image comes back from acquire.
pub struct FrameResources {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub render_finished: Vec<vk::Semaphore>,
}

impl FrameResources {
    pub fn create<G: Gpu>(
        gpu: &mut G,
        pool: vk::CommandPool,
        swapchain: &SwapchainResources,
        pipeline: &PipelineObjects,
        geometry: &GeometryBuffers,
    ) -> Result<Self> {
        let mut frames = FrameResources {
            framebuffers: Vec::with_capacity(swapchain.views.len()),
            command_buffers: Vec::new(),
            render_finished: Vec::with_capacity(swapchain.views.len()),
        };
        if let Err(e) = frames.build(gpu, pool, swapchain, pipeline, geometry) {
            frames.free_commands(gpu, pool);
            frames.destroy(gpu);
            return Err(e);
        }
        Ok(frames)
    }

    fn build<G: Gpu>(
        &mut self,
        gpu: &mut G,
        pool: vk::CommandPool,
        swapchain: &SwapchainResources,
        pipeline: &PipelineObjects,
        geometry: &GeometryBuffers,
    ) -> Result<()> {
        for &view in &swapchain.views {
            let fb = gpu
                .create_framebuffer(pipeline.render_pass, view, swapchain.extent)
                .context("create_framebuffer")?;
            self.framebuffers.push(fb);
        }

        self.command_buffers = gpu
            .allocate_command_buffers(pool, self.framebuffers.len() as u32)
            .context("allocate_command_buffers")?;

        for (&cmd, &framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            let draw = DrawRecording {
                render_pass: pipeline.render_pass,
                framebuffer,
                extent: swapchain.extent,
                pipeline: pipeline.pipeline,
                vertex_buffer: geometry.vertex.buffer,
                index_buffer: geometry.index.buffer,
                index_count: geometry.index_count,
                clear_color: CLEAR_COLOR,
            };
            gpu.record_draw(cmd, &draw).context("record draw commands")?;
        }

        for _ in &self.framebuffers {
            let sem = gpu.create_semaphore().context("create_semaphore(render finished)")?;
            self.render_finished.push(sem);
        }
        Ok(())
    }

    /// First step of the swapchain release; the pipeline goes next.
    pub fn free_commands<G: Gpu>(&mut self, gpu: &mut G, pool: vk::CommandPool) {
        if !self.command_buffers.is_empty() {
            gpu.free_command_buffers(pool, &self.command_buffers);
            self.command_buffers.clear();
        }
    }

    /// Framebuffers, then the render-finished semaphores. Command buffers
    /// must already be freed.
    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        for fb in self.framebuffers {
            gpu.destroy_framebuffer(fb);
        }
        for sem in self.render_finished {
            gpu.destroy_semaphore(sem);
        }
    }
}
