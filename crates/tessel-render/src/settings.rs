// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::path::PathBuf;

/// Which present mode to ask for when the surface offers a choice.
/// FIFO is the fallback either way since every surface supports it.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentPreference {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    /// Enable the Khronos validation layer and debug messenger when available.
    pub validation: bool,
    pub frames_in_flight: usize,
    pub present_mode: PresentPreference,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub pipeline_cache_dir: PathBuf,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            present_mode: PresentPreference::Mailbox,
            vertex_shader: PathBuf::from("shaders/quad.vert.spv"),
            fragment_shader: PathBuf::from("shaders/quad.frag.spv"),
            pipeline_cache_dir: PathBuf::from("pipeline_cache"),
        }
    }
}

impl RenderSettings {
    /// At least one frame slot is always needed.
    pub fn frame_slots(&self) -> usize {
        if self.frames_in_flight == 0 {
            tracing::warn!("frames_in_flight = 0 is invalid, using 1");
        }
        self.frames_in_flight.max(1)
    }
}
