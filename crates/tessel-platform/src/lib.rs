// SPDX-License-Identifier: CEPL-1.0
//! Host-side platform glue: the windowing crate and filesystem assets.

pub mod assets;

pub use assets::FsAssets;
pub use winit;
