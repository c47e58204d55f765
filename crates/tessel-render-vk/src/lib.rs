// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend for the `tessel_render::Renderer` trait.

mod context;
mod error;
mod frames;
mod geometry;
mod gpu;
#[cfg(test)]
mod mock;
mod pipeline;
mod renderer;
mod swapchain;
mod sync;

pub use context::{select_queue_families, VkContext};
pub use error::InitError;
pub use frames::{FrameResources, CLEAR_COLOR};
pub use geometry::{find_memory_type, GeometryBuffers};
pub use gpu::{
    AcquireOutcome, AdapterInfo, DrawRecording, Gpu, GpuBuffer, ImageSharing, PipelineDesc,
    PresentOutcome, QueueFamilies, SurfaceSupport, SwapchainDesc,
};
pub use pipeline::{pipeline_cache_path, PipelineCache, PipelineObjects, ShaderModules};
pub use renderer::{FrameState, VkRenderer};
pub use swapchain::{
    choose_present_mode, choose_surface_format, extent_from_caps, image_count,
    SwapchainResources, PREFERRED_SURFACE_FORMAT,
};
pub use sync::FrameSync;
