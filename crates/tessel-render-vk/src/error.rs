// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;

/// Conditions that abort renderer initialization. Anything created before
/// the failure has been released by the time one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("no Vulkan adapter available")]
    NoAdapter,

    #[error("adapter '{0}' has no graphics + present queue family pair")]
    NoQueueFamilies(String),

    #[error("adapter '{0}' does not support VK_KHR_swapchain")]
    MissingSwapchainExtension(String),

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("surface reports no present modes")]
    NoPresentModes,

    #[error("shader binary '{}' is missing or empty", .0.display())]
    MissingShader(PathBuf),

    #[error("shader binary '{}' is not valid SPIR-V", .path.display())]
    InvalidShader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no memory type in filter {type_bits:#x} has {properties:?}")]
    NoMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },
}
