// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::{fs, io};
use tessel_render::RenderSettings;
use tracing::info;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            width: 640,
            height: 480,
            title: "tessel".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderSettings,
}

/// A missing file means defaults; a file that does not parse is an error.
pub fn load_config(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => {
            toml::from_str::<AppCfg>(&s).with_context(|| format!("parse {}", path.display()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}
