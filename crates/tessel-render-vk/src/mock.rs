// SPDX-License-Identifier: CEPL-1.0
//! Handle-tracking stand-in for the device, used by the renderer tests.
//!
//! Every created object gets a unique raw handle and a [`Kind`]. Destroying a
//! handle that is not alive (or is of another kind) panics, as does any use
//! of a dead handle, so leaks and dangling references show up as either a
//! non-zero [`MockGpu::live_count`] or a test panic. Queue work completes
//! immediately: a submit signals its fence and semaphore on the spot.

use anyhow::{bail, Result};
use ash::vk::{self, Handle};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::gpu::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Swapchain,
    ImageView,
    ShaderModule,
    PipelineCache,
    RenderPass,
    PipelineLayout,
    Pipeline,
    Framebuffer,
    CommandPool,
    CommandBuffer,
    Buffer,
    Memory,
    Semaphore,
    Fence,
}

/// Scripted result for one `acquire_next_image` call.
#[derive(Clone, Copy, Debug)]
pub enum ScriptedAcquire {
    OutOfDate,
    Suboptimal,
}

pub const MOCK_CACHE_BLOB: &[u8] = b"mock pipeline cache";

#[derive(Default)]
pub struct MockState {
    next: u64,
    live: HashMap<u64, Kind>,

    pub support: Option<SurfaceSupport>,
    pub families: Option<QueueFamilies>,
    /// Operations that return an error when called.
    pub fail: HashSet<&'static str>,
    /// Refuse any non-empty seed handed to `create_pipeline_cache`.
    pub reject_cache_blobs: bool,

    swapchain_images: HashMap<u64, Vec<u64>>,
    view_image: HashMap<u64, u64>,
    pool_buffers: HashMap<u64, Vec<u64>>,
    buffer_memory: HashMap<u64, u64>,
    next_image: HashMap<u64, u32>,
    fence_signaled: HashMap<u64, bool>,
    semaphore_signaled: HashMap<u64, bool>,
    cache_data: HashMap<u64, Vec<u8>>,

    pub acquire_script: VecDeque<ScriptedAcquire>,
    pub present_script: VecDeque<PresentOutcome>,

    pub swapchain_descs: Vec<SwapchainDesc>,
    pub pipeline_extents: Vec<vk::Extent2D>,
    pub cache_seeds: Vec<Vec<u8>>,
    pub recordings: HashMap<u64, DrawRecording>,
    pub buffer_contents: HashMap<u64, Vec<u8>>,
    pub buffer_usage: HashMap<u64, (vk::BufferUsageFlags, vk::MemoryPropertyFlags)>,
    pub copies: usize,
    pub acquires: usize,
    pub submits: Vec<vk::CommandBuffer>,
    pub presents: Vec<u32>,
    pub present_waits: Vec<vk::Semaphore>,
    pub wait_idles: usize,
    /// Kinds in the order they were destroyed.
    pub destroyed: Vec<Kind>,
}

impl MockState {
    fn make<H: Handle>(&mut self, kind: Kind) -> H {
        self.next += 1;
        self.live.insert(self.next, kind);
        H::from_raw(self.next)
    }

    fn kill<H: Handle + Copy + std::fmt::Debug>(&mut self, h: H, kind: Kind) {
        match self.live.remove(&h.as_raw()) {
            Some(k) if k == kind => {}
            other => panic!("destroy of {kind:?} {h:?}: handle is {other:?}"),
        }
        self.destroyed.push(kind);
    }

    fn expect_live<H: Handle + Copy + std::fmt::Debug>(&self, h: H, kind: Kind) {
        let got = self.live.get(&h.as_raw());
        assert_eq!(got, Some(&kind), "use of {kind:?} {h:?} that is not alive");
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.fail.contains(op) {
            bail!("mock: injected failure in {op}");
        }
        Ok(())
    }

    fn signal(&mut self, sem: vk::Semaphore) {
        self.expect_live(sem, Kind::Semaphore);
        let s = self.semaphore_signaled.entry(sem.as_raw()).or_default();
        assert!(!*s, "semaphore {sem:?} signaled twice without a wait");
        *s = true;
    }

    fn consume(&mut self, sem: vk::Semaphore) {
        self.expect_live(sem, Kind::Semaphore);
        let s = self.semaphore_signaled.entry(sem.as_raw()).or_default();
        assert!(*s, "wait on semaphore {sem:?} that nothing signaled");
        *s = false;
    }
}

pub fn mock_support() -> SurfaceSupport {
    SurfaceSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

/// Cloning shares the state, so a test can still inspect it after handing
/// the device to a renderer.
#[derive(Clone)]
pub struct MockGpu {
    adapter: AdapterInfo,
    state: Rc<RefCell<MockState>>,
}

impl MockGpu {
    pub fn new() -> Self {
        let state = MockState {
            support: Some(mock_support()),
            ..Default::default()
        };
        MockGpu {
            adapter: AdapterInfo {
                name: "Mock Adapter".into(),
                vendor_id: 0x1234,
                device_id: 0x5678,
                driver_version: 1,
                pipeline_cache_uuid: [7; vk::UUID_SIZE],
            },
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn state(&self) -> std::cell::RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn live_of(&self, kind: Kind) -> usize {
        self.state.borrow().live.values().filter(|&&k| k == kind).count()
    }

    pub fn is_live<H: Handle>(&self, h: H) -> bool {
        self.state.borrow().live.contains_key(&h.as_raw())
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state.borrow_mut().fail.insert(op);
    }

    pub fn set_surface_support(&self, support: SurfaceSupport) {
        self.state.borrow_mut().support = Some(support);
    }

    pub fn script_acquire(&self, outcome: ScriptedAcquire) {
        self.state.borrow_mut().acquire_script.push_back(outcome);
    }

    pub fn script_present(&self, outcome: PresentOutcome) {
        self.state.borrow_mut().present_script.push_back(outcome);
    }
}

impl Gpu for MockGpu {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn queue_families(&self) -> QueueFamilies {
        self.state.borrow().families.unwrap_or(QueueFamilies {
            graphics: 0,
            present: 0,
        })
    }

    fn surface_support(&self) -> Result<SurfaceSupport> {
        let s = self.state.borrow();
        s.check("surface_support")?;
        match &s.support {
            Some(support) => Ok(support.clone()),
            None => bail!("mock: surface lost"),
        }
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let mut s = self.state.borrow_mut();
        s.check("create_swapchain")?;
        let sc: vk::SwapchainKHR = s.make(Kind::Swapchain);
        let images = (0..desc.min_image_count)
            .map(|i| 0xA000_0000 + sc.as_raw() * 16 + i as u64)
            .collect();
        s.swapchain_images.insert(sc.as_raw(), images);
        s.swapchain_descs.push(*desc);
        Ok(sc)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        let s = self.state.borrow();
        s.expect_live(swapchain, Kind::Swapchain);
        Ok(s.swapchain_images[&swapchain.as_raw()]
            .iter()
            .map(|&raw| vk::Image::from_raw(raw))
            .collect())
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state.borrow_mut();
        let images = s
            .swapchain_images
            .remove(&swapchain.as_raw())
            .unwrap_or_default();
        let dangling = s.view_image.values().filter(|&i| images.contains(i)).count();
        assert_eq!(dangling, 0, "swapchain destroyed while {dangling} views live");
        s.next_image.remove(&swapchain.as_raw());
        s.kill(swapchain, Kind::Swapchain);
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        _format: vk::Format,
    ) -> Result<vk::ImageView> {
        let mut s = self.state.borrow_mut();
        s.check("create_image_view")?;
        let owned = s
            .swapchain_images
            .values()
            .any(|imgs| imgs.contains(&image.as_raw()));
        assert!(owned, "view of image {image:?} that no live swapchain owns");
        let view: vk::ImageView = s.make(Kind::ImageView);
        s.view_image.insert(view.as_raw(), image.as_raw());
        Ok(view)
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        let mut s = self.state.borrow_mut();
        s.view_image.remove(&view.as_raw());
        s.kill(view, Kind::ImageView);
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule> {
        let mut s = self.state.borrow_mut();
        s.check("create_shader_module")?;
        assert!(!code.is_empty());
        Ok(s.make(Kind::ShaderModule))
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        self.state.borrow_mut().kill(module, Kind::ShaderModule);
    }

    fn create_pipeline_cache(&mut self, initial_data: &[u8]) -> Result<vk::PipelineCache> {
        let mut s = self.state.borrow_mut();
        s.check("create_pipeline_cache")?;
        s.cache_seeds.push(initial_data.to_vec());
        if s.reject_cache_blobs && !initial_data.is_empty() {
            bail!("mock: ERROR_INITIALIZATION_FAILED");
        }
        let cache: vk::PipelineCache = s.make(Kind::PipelineCache);
        let data = if initial_data.is_empty() {
            MOCK_CACHE_BLOB.to_vec()
        } else {
            initial_data.to_vec()
        };
        s.cache_data.insert(cache.as_raw(), data);
        Ok(cache)
    }

    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> Result<Vec<u8>> {
        let s = self.state.borrow();
        s.expect_live(cache, Kind::PipelineCache);
        Ok(s.cache_data[&cache.as_raw()].clone())
    }

    fn destroy_pipeline_cache(&mut self, cache: vk::PipelineCache) {
        let mut s = self.state.borrow_mut();
        s.cache_data.remove(&cache.as_raw());
        s.kill(cache, Kind::PipelineCache);
    }

    fn create_render_pass(&mut self, _color_format: vk::Format) -> Result<vk::RenderPass> {
        let mut s = self.state.borrow_mut();
        s.check("create_render_pass")?;
        Ok(s.make(Kind::RenderPass))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.state.borrow_mut().kill(render_pass, Kind::RenderPass);
    }

    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout> {
        let mut s = self.state.borrow_mut();
        s.check("create_pipeline_layout")?;
        Ok(s.make(Kind::PipelineLayout))
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().kill(layout, Kind::PipelineLayout);
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline> {
        let mut s = self.state.borrow_mut();
        s.check("create_graphics_pipeline")?;
        s.expect_live(desc.render_pass, Kind::RenderPass);
        s.expect_live(desc.layout, Kind::PipelineLayout);
        s.expect_live(desc.cache, Kind::PipelineCache);
        s.expect_live(desc.vertex_shader, Kind::ShaderModule);
        s.expect_live(desc.fragment_shader, Kind::ShaderModule);
        s.pipeline_extents.push(desc.extent);
        Ok(s.make(Kind::Pipeline))
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.state.borrow_mut().kill(pipeline, Kind::Pipeline);
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let mut s = self.state.borrow_mut();
        s.check("create_framebuffer")?;
        s.expect_live(render_pass, Kind::RenderPass);
        s.expect_live(view, Kind::ImageView);
        Ok(s.make(Kind::Framebuffer))
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.state.borrow_mut().kill(framebuffer, Kind::Framebuffer);
    }

    fn create_command_pool(&mut self, _queue_family: u32) -> Result<vk::CommandPool> {
        let mut s = self.state.borrow_mut();
        s.check("create_command_pool")?;
        let pool: vk::CommandPool = s.make(Kind::CommandPool);
        s.pool_buffers.insert(pool.as_raw(), Vec::new());
        Ok(pool)
    }

    /// Like the real call, buffers still allocated from the pool go with it.
    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        let mut s = self.state.borrow_mut();
        for raw in s.pool_buffers.remove(&pool.as_raw()).unwrap_or_default() {
            s.live.remove(&raw);
        }
        s.kill(pool, Kind::CommandPool);
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let mut s = self.state.borrow_mut();
        s.check("allocate_command_buffers")?;
        s.expect_live(pool, Kind::CommandPool);
        let cmds: Vec<vk::CommandBuffer> =
            (0..count).map(|_| s.make(Kind::CommandBuffer)).collect();
        if let Some(owned) = s.pool_buffers.get_mut(&pool.as_raw()) {
            owned.extend(cmds.iter().map(|c| c.as_raw()));
        }
        Ok(cmds)
    }

    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state.borrow_mut();
        s.expect_live(pool, Kind::CommandPool);
        for &cmd in buffers {
            s.recordings.remove(&cmd.as_raw());
            if let Some(owned) = s.pool_buffers.get_mut(&pool.as_raw()) {
                owned.retain(|&raw| raw != cmd.as_raw());
            }
            s.kill(cmd, Kind::CommandBuffer);
        }
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, draw: &DrawRecording) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.check("record_draw")?;
        s.expect_live(cmd, Kind::CommandBuffer);
        s.expect_live(draw.render_pass, Kind::RenderPass);
        s.expect_live(draw.framebuffer, Kind::Framebuffer);
        s.expect_live(draw.pipeline, Kind::Pipeline);
        s.expect_live(draw.vertex_buffer, Kind::Buffer);
        s.expect_live(draw.index_buffer, Kind::Buffer);
        s.recordings.insert(cmd.as_raw(), *draw);
        Ok(())
    }

    fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer> {
        let mut s = self.state.borrow_mut();
        s.check("create_buffer")?;
        let buffer: vk::Buffer = s.make(Kind::Buffer);
        let memory: vk::DeviceMemory = s.make(Kind::Memory);
        s.buffer_memory.insert(buffer.as_raw(), memory.as_raw());
        s.buffer_usage.insert(buffer.as_raw(), (usage, properties));
        s.buffer_contents
            .insert(buffer.as_raw(), vec![0; size as usize]);
        Ok(GpuBuffer {
            buffer,
            memory,
            size,
        })
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, bytes: &[u8]) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.check("write_buffer")?;
        s.expect_live(buffer.buffer, Kind::Buffer);
        let (_, props) = s.buffer_usage[&buffer.buffer.as_raw()];
        assert!(
            props.contains(vk::MemoryPropertyFlags::HOST_VISIBLE),
            "write to memory that is not host visible"
        );
        s.buffer_contents.insert(buffer.buffer.as_raw(), bytes.to_vec());
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        pool: vk::CommandPool,
        src: &GpuBuffer,
        dst: &GpuBuffer,
    ) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.check("copy_buffer")?;
        s.expect_live(pool, Kind::CommandPool);
        s.expect_live(src.buffer, Kind::Buffer);
        s.expect_live(dst.buffer, Kind::Buffer);
        let bytes = s.buffer_contents[&src.buffer.as_raw()].clone();
        s.buffer_contents.insert(dst.buffer.as_raw(), bytes);
        s.copies += 1;
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        let mut s = self.state.borrow_mut();
        s.buffer_memory.remove(&buffer.buffer.as_raw());
        s.buffer_usage.remove(&buffer.buffer.as_raw());
        s.buffer_contents.remove(&buffer.buffer.as_raw());
        s.kill(buffer.buffer, Kind::Buffer);
        s.kill(buffer.memory, Kind::Memory);
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        let mut s = self.state.borrow_mut();
        s.check("create_semaphore")?;
        let sem: vk::Semaphore = s.make(Kind::Semaphore);
        s.semaphore_signaled.insert(sem.as_raw(), false);
        Ok(sem)
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        let mut s = self.state.borrow_mut();
        s.semaphore_signaled.remove(&semaphore.as_raw());
        s.kill(semaphore, Kind::Semaphore);
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        let mut s = self.state.borrow_mut();
        s.check("create_fence")?;
        let fence: vk::Fence = s.make(Kind::Fence);
        s.fence_signaled.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        let mut s = self.state.borrow_mut();
        s.fence_signaled.remove(&fence.as_raw());
        s.kill(fence, Kind::Fence);
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        let s = self.state.borrow();
        s.expect_live(fence, Kind::Fence);
        assert!(
            s.fence_signaled[&fence.as_raw()],
            "wait on fence {fence:?} that will never signal"
        );
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.expect_live(fence, Kind::Fence);
        s.fence_signaled.insert(fence.as_raw(), false);
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        let mut s = self.state.borrow_mut();
        s.check("acquire_next_image")?;
        s.expect_live(swapchain, Kind::Swapchain);
        s.acquires += 1;
        let suboptimal = match s.acquire_script.pop_front() {
            Some(ScriptedAcquire::OutOfDate) => return Ok(AcquireOutcome::OutOfDate),
            Some(ScriptedAcquire::Suboptimal) => true,
            None => false,
        };
        let count = s.swapchain_images[&swapchain.as_raw()].len() as u32;
        let next = s.next_image.entry(swapchain.as_raw()).or_insert(0);
        let index = *next;
        *next = (index + 1) % count;
        s.signal(signal);
        Ok(AcquireOutcome::Image { index, suboptimal })
    }

    fn submit_draw(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.check("submit_draw")?;
        s.expect_live(cmd, Kind::CommandBuffer);
        assert!(
            s.recordings.contains_key(&cmd.as_raw()),
            "submit of unrecorded command buffer {cmd:?}"
        );
        s.expect_live(fence, Kind::Fence);
        assert!(
            !s.fence_signaled[&fence.as_raw()],
            "submit with fence {fence:?} still signaled"
        );
        s.consume(wait);
        s.signal(signal);
        s.fence_signaled.insert(fence.as_raw(), true);
        s.submits.push(cmd);
        Ok(())
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let mut s = self.state.borrow_mut();
        s.check("present")?;
        s.expect_live(swapchain, Kind::Swapchain);
        assert!((image_index as usize) < s.swapchain_images[&swapchain.as_raw()].len());
        s.consume(wait);
        s.presents.push(image_index);
        s.present_waits.push(wait);
        Ok(s.present_script.pop_front().unwrap_or(PresentOutcome::Optimal))
    }

    fn wait_idle(&mut self) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.check("wait_idle")?;
        s.wait_idles += 1;
        Ok(())
    }
}
