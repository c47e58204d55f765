// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use tessel_render::{PresentPreference, RenderSize};
use tracing::info;

use crate::error::InitError;
use crate::gpu::{Gpu, QueueFamilies, SurfaceSupport, SwapchainDesc};

/// Used when the surface has no preference, and preferred when it is listed.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

fn is_preferred(f: &vk::SurfaceFormatKHR) -> bool {
    f.format == PREFERRED_SURFACE_FORMAT.format
        && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
}

/// `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(PREFERRED_SURFACE_FORMAT),
        _ => Some(
            formats
                .iter()
                .copied()
                .find(is_preferred)
                .unwrap_or(formats[0]),
        ),
    }
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentPreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        // FIFO is required to be supported everywhere
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Resolves every negotiated swapchain parameter from the surface's support.
pub fn describe_swapchain(
    support: &SurfaceSupport,
    families: QueueFamilies,
    preference: PresentPreference,
    window: RenderSize,
) -> Result<SwapchainDesc, InitError> {
    let format = choose_surface_format(&support.formats).ok_or(InitError::NoSurfaceFormats)?;
    if support.present_modes.is_empty() {
        return Err(InitError::NoPresentModes);
    }
    let caps = &support.capabilities;
    Ok(SwapchainDesc {
        min_image_count: image_count(caps),
        format,
        extent: extent_from_caps(caps, window),
        present_mode: choose_present_mode(&support.present_modes, preference),
        pre_transform: caps.current_transform,
        sharing: families.sharing(),
    })
}

/// The chain plus its per-image views. Images belong to the chain.
pub struct SwapchainResources {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl SwapchainResources {
    pub fn create<G: Gpu>(
        gpu: &mut G,
        preference: PresentPreference,
        window: RenderSize,
    ) -> Result<Self> {
        let support = gpu.surface_support().context("query surface support")?;
        let desc = describe_swapchain(&support, gpu.queue_families(), preference, window)?;

        let handle = gpu.create_swapchain(&desc).context("create_swapchain")?;
        let mut sc = SwapchainResources {
            handle,
            format: desc.format.format,
            extent: desc.extent,
            images: Vec::new(),
            views: Vec::new(),
        };
        if let Err(e) = sc.create_views(gpu) {
            sc.destroy(gpu);
            return Err(e);
        }

        info!(
            "swapchain: format {:?} / {:?}, present_mode {:?}, extent {}x{}, images (min={} -> got {})",
            desc.format.format,
            desc.format.color_space,
            desc.present_mode,
            desc.extent.width,
            desc.extent.height,
            support.capabilities.min_image_count,
            sc.images.len()
        );
        Ok(sc)
    }

    fn create_views<G: Gpu>(&mut self, gpu: &mut G) -> Result<()> {
        self.images = gpu
            .swapchain_images(self.handle)
            .context("get_swapchain_images")?;
        self.views.reserve(self.images.len());
        for &image in &self.images {
            let view = gpu
                .create_image_view(image, self.format)
                .context("create_image_view")?;
            self.views.push(view);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Views first, then the chain that owns the images.
    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        for view in self.views {
            gpu.destroy_image_view(view);
        }
        gpu.destroy_swapchain(self.handle);
    }
}
