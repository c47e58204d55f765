// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tessel_core::init_tracing;
use tessel_platform::FsAssets;
use tessel_render::{FrameOutcome, RenderSize, Renderer};
use tessel_render_vk::VkRenderer;
use tracing::{error, info, warn};

use tessel_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use config::{load_config, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config; defaults apply when it does not exist
    #[arg(long, default_value = "tessel.toml")]
    config: PathBuf,
    /// Directory that shader binaries and the pipeline cache resolve against
    #[arg(long, default_value = ".")]
    assets: PathBuf,
}

struct App {
    cfg: AppCfg,
    assets_root: PathBuf,
    // Drop order matters: the renderer must go before the window it draws into.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,

    exiting: bool,
    paused: bool,
    fatal: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg, assets_root: PathBuf) -> Self {
        App {
            cfg,
            assets_root,
            renderer: None,
            window: None,
            render_size: RenderSize::new(0, 0),
            exiting: false,
            paused: false,
            fatal: None,
            frames: 0,
            last_fps_instant: Instant::now(),
        }
    }

    fn create_window_and_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(w.title.clone())
                    .with_inner_size(PhysicalSize::new(w.width, w.height)),
            )
            .context("create window")?;

        let size = window.inner_size();
        self.render_size = RenderSize::new(size.width, size.height);

        let assets = Box::new(FsAssets::new(&self.assets_root));
        let renderer = <VkRenderer as Renderer>::new(
            &window,
            &window,
            self.render_size,
            &self.cfg.render,
            assets,
        )
        .context("vulkan renderer init")?;

        info!(
            "renderer up: {}x{}, {} frame(s) in flight",
            self.render_size.width,
            self.render_size.height,
            self.cfg.render.frame_slots()
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Records the error, releases everything and leaves the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{e:#}");
        self.shutdown();
        self.fatal = Some(e);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        self.exiting = true;
        if let Some(mut r) = self.renderer.take() {
            if let Err(e) = r.shutdown() {
                warn!("shutdown: {e:#}");
            }
        }
        self.window = None;
    }

    fn request_redraw(&self) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_renderer(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        self.paused = self.render_size.is_empty();
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            self.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize::new(new_size.width, new_size.height);
                let now_paused = self.render_size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                }
                info!(
                    "Resized → {}x{} (paused={})",
                    self.render_size.width, self.render_size.height, self.paused
                );

                // Zero sizes are forwarded too; the renderer defers its rebuild on them.
                let size = self.render_size;
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(size) {
                        warn!("resize: {e:#}");
                    }
                }
                if !self.paused {
                    self.request_redraw();
                }
            }

            WindowEvent::Occluded(occluded) => {
                let now_paused = occluded || self.render_size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!("Occluded={} → paused={}", occluded, self.paused);
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(r) = &mut self.renderer else {
                    return;
                };
                r.update();
                match r.render() {
                    // count only frames that reached the presentation engine
                    Ok(FrameOutcome::Presented) => self.frames = self.frames.saturating_add(1),
                    Ok(FrameOutcome::Rebuilt) => {}
                    Ok(FrameOutcome::Skipped) => {}
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.paused {
            self.frames = 0;
            return;
        }
        self.request_redraw();

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App::new(cfg, args.assets);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e.context("tessel exited on error")),
        None => Ok(()),
    }
}
