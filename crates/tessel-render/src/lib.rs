// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub mod assets;
pub mod geometry;
pub mod settings;

pub use assets::{AssetStore, MemoryAssets};
pub use geometry::{Vertex, QUAD_INDICES, QUAD_VERTICES};
pub use settings::{PresentPreference, RenderSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-area size; nothing can be presented to it.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What a call to [`Renderer::render`] ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and handed to the presentation engine.
    Presented,
    /// The surface went stale; swapchain-dependent state was rebuilt and the
    /// frame was dropped before submission.
    Rebuilt,
    /// Nothing to draw into (zero-area window).
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        assets: Box<dyn AssetStore>,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Surface-size-changed notification.
    fn resize(&mut self, size: RenderSize) -> Result<()>;

    /// Per-frame logic hook, called before [`Renderer::render`].
    fn update(&mut self) {}

    fn render(&mut self) -> Result<FrameOutcome>;

    /// Drains GPU work, persists caches and releases every GPU object.
    /// Calling it more than once is a no-op.
    fn shutdown(&mut self) -> Result<()>;
}
