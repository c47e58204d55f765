// SPDX-License-Identifier: CEPL-1.0
//! The seam between the renderer's lifecycle logic and the Vulkan device.
//!
//! `VkRenderer` decides *what* gets created, in which order, and when it is
//! torn down; a `Gpu` implementation only knows *how* to make one object.
//! [`crate::VkContext`] is the real ash-backed implementation.

use anyhow::Result;
use ash::vk;

/// Queue family indices chosen at device creation. They may be equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// One entry per distinct family, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    /// Swapchain image sharing for these families.
    pub fn sharing(&self) -> ImageSharing {
        if self.is_shared() {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent([self.graphics, self.present])
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    Concurrent([u32; 2]),
}

/// Identity of the selected physical device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub driver_version: u32,
    pub pipeline_cache_uuid: [u8; vk::UUID_SIZE],
}

/// Snapshot of what the surface supports right now.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: ImageSharing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub cache: vk::PipelineCache,
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub extent: vk::Extent2D,
}

/// Everything one pre-recorded command buffer draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawRecording {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub clear_color: [f32; 4],
}

/// A buffer together with the memory bound to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    /// The surface changed under the swapchain; nothing was signaled.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn is_stale(self) -> bool {
        !matches!(self, PresentOutcome::Optimal)
    }
}

pub trait Gpu {
    fn adapter(&self) -> &AdapterInfo;
    fn queue_families(&self) -> QueueFamilies;
    fn surface_support(&self) -> Result<SurfaceSupport>;

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    fn create_image_view(&mut self, image: vk::Image, format: vk::Format)
        -> Result<vk::ImageView>;
    fn destroy_image_view(&mut self, view: vk::ImageView);

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&mut self, module: vk::ShaderModule);
    fn create_pipeline_cache(&mut self, initial_data: &[u8]) -> Result<vk::PipelineCache>;
    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> Result<Vec<u8>>;
    fn destroy_pipeline_cache(&mut self, cache: vk::PipelineCache);
    fn create_render_pass(&mut self, color_format: vk::Format) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);
    fn create_command_pool(&mut self, queue_family: u32) -> Result<vk::CommandPool>;
    fn destroy_command_pool(&mut self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn record_draw(&mut self, cmd: vk::CommandBuffer, draw: &DrawRecording) -> Result<()>;

    fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer>;
    /// Map, copy, unmap. The buffer must be host visible.
    fn write_buffer(&mut self, buffer: &GpuBuffer, bytes: &[u8]) -> Result<()>;
    /// One-time copy on the graphics queue; returns once the queue drained.
    fn copy_buffer(&mut self, pool: vk::CommandPool, src: &GpuBuffer, dst: &GpuBuffer)
        -> Result<()>;
    fn destroy_buffer(&mut self, buffer: GpuBuffer);

    fn create_semaphore(&mut self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()>;

    /// Blocks without timeout until an image is available or the surface is stale.
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome>;
    fn submit_draw(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()>;
    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome>;
    fn wait_idle(&mut self) -> Result<()>;
}
