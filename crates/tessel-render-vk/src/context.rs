// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr};
use tracing::{debug, error, info, trace, warn};

use crate::error::InitError;
use crate::geometry::find_memory_type;
use crate::gpu::*;
use crate::pipeline::{
    color_attachment, color_blend_attachment, external_dependency, rasterization_state, scissor,
    vertex_attributes, vertex_binding, viewport, COLOR_ATTACHMENT_REF,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const SHADER_ENTRY: &CStr = c"main";

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan] {msg}");
    } else {
        trace!("[vulkan] {msg}");
    }
    vk::FALSE
}

unsafe fn name_of(raw: &[c_char]) -> String {
    CStr::from_ptr(raw.as_ptr()).to_string_lossy().into_owned()
}

/// Graphics family that can also present wins outright. Otherwise the first
/// graphics family pairs with the first present-capable non-graphics one.
pub fn select_queue_families(families: &[(vk::QueueFlags, bool)]) -> Option<QueueFamilies> {
    let mut graphics = None;
    let mut present = None;
    for (i, &(flags, can_present)) in families.iter().enumerate() {
        let i = i as u32;
        if flags.contains(vk::QueueFlags::GRAPHICS) {
            if can_present {
                return Some(QueueFamilies {
                    graphics: i,
                    present: i,
                });
            }
            graphics.get_or_insert(i);
        } else if can_present {
            present.get_or_insert(i);
        }
    }
    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

// ---------------------------------------------------------------------------
// Instance-level objects
// ---------------------------------------------------------------------------

struct InstanceContext {
    entry: Entry,
    instance: Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
}

// STRICT ORDER: instance, then messenger + surface from THIS instance.
// Drop reverses it; the device must already be gone.
impl InstanceContext {
    unsafe fn new(dh: RawDisplayHandle, wh: RawWindowHandle, want_validation: bool) -> Result<Self> {
        let entry = Entry::linked();

        let layers = entry
            .enumerate_instance_layer_properties()
            .context("enumerate_instance_layer_properties")?;
        let exts = entry
            .enumerate_instance_extension_properties(None)
            .context("enumerate_instance_extension_properties")?;
        for l in &layers {
            debug!("instance layer: {}", name_of(&l.layer_name));
        }
        for e in &exts {
            debug!("instance extension: {}", name_of(&e.extension_name));
        }

        let has_layer = layers
            .iter()
            .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == VALIDATION_LAYER);
        let has_debug_ext = exts
            .iter()
            .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == debug_utils::NAME);

        let validation = want_validation && has_layer;
        let messenger = want_validation && has_debug_ext;
        if want_validation && !has_layer {
            warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }
        if want_validation && !has_debug_ext {
            warn!("validation requested but VK_EXT_debug_utils is unavailable");
        }

        let mut ext_names = ash_window::enumerate_required_extensions(dh)
            .context("enumerate_required_extensions")?
            .to_vec();
        if messenger {
            ext_names.push(debug_utils::NAME.as_ptr());
        }
        let layer_names = [VALIDATION_LAYER.as_ptr()];

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: c"Tessel".as_ptr(),
            application_version: 0,
            p_engine_name: c"Tessel".as_ptr(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: ext_names.len() as u32,
            pp_enabled_extension_names: ext_names.as_ptr(),
            enabled_layer_count: if validation { 1 } else { 0 },
            pp_enabled_layer_names: if validation {
                layer_names.as_ptr()
            } else {
                std::ptr::null()
            },
            ..Default::default()
        };
        let instance = entry
            .create_instance(&create_info, None)
            .context("create_instance")?;

        let surface_loader = surface::Instance::new(&entry, &instance);
        let mut ctx = InstanceContext {
            entry,
            instance,
            debug: None,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
        };

        if messenger {
            let loader = debug_utils::Instance::new(&ctx.entry, &ctx.instance);
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            match loader.create_debug_utils_messenger(&ci, None) {
                Ok(m) => ctx.debug = Some((loader, m)),
                Err(e) => warn!("debug messenger unavailable: {e:?}"),
            }
        }

        // dropping `ctx` on error tears down the instance
        ctx.surface = ash_window::create_surface(&ctx.entry, &ctx.instance, dh, wh, None)
            .context("ash_window::create_surface")?;
        Ok(ctx)
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// ---------------------------------------------------------------------------
// Device context
// ---------------------------------------------------------------------------

/// Instance, surface, adapter, logical device and its two queues. Owns no
/// renderer objects; those are created and destroyed through [`Gpu`].
pub struct VkContext {
    phys: vk::PhysicalDevice,
    device: ash::Device,
    swapchain_loader: swapchain::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    families: QueueFamilies,
    memory: vk::PhysicalDeviceMemoryProperties,
    adapter: AdapterInfo,
    // declared last: dropped after the device
    inst: InstanceContext,
}

impl VkContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        validation: bool,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        unsafe { Self::build(dh, wh, validation) }
    }

    unsafe fn build(dh: RawDisplayHandle, wh: RawWindowHandle, validation: bool) -> Result<Self> {
        let inst = InstanceContext::new(dh, wh, validation)?;
        let instance = &inst.instance;

        // first enumerated adapter, no scoring
        let phys = instance
            .enumerate_physical_devices()
            .context("enumerate_physical_devices")?
            .first()
            .copied()
            .ok_or(InitError::NoAdapter)?;
        let props = instance.get_physical_device_properties(phys);
        let adapter = AdapterInfo {
            name: name_of(&props.device_name),
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            driver_version: props.driver_version,
            pipeline_cache_uuid: props.pipeline_cache_uuid,
        };
        info!(
            "adapter: {} (vendor {:04x}, device {:04x}, {:?})",
            adapter.name, adapter.vendor_id, adapter.device_id, props.device_type
        );

        let qprops = instance.get_physical_device_queue_family_properties(phys);
        let caps: Vec<(vk::QueueFlags, bool)> = qprops
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let present = inst
                    .surface_loader
                    .get_physical_device_surface_support(phys, i as u32, inst.surface)
                    .unwrap_or(false);
                (q.queue_flags, present)
            })
            .collect();
        let families = select_queue_families(&caps)
            .ok_or_else(|| InitError::NoQueueFamilies(adapter.name.clone()))?;
        debug!(
            "queue families: graphics={} present={}",
            families.graphics, families.present
        );

        let dev_exts = instance
            .enumerate_device_extension_properties(phys)
            .context("enumerate_device_extension_properties")?;
        for e in &dev_exts {
            debug!("device extension: {}", name_of(&e.extension_name));
        }
        if !dev_exts
            .iter()
            .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == swapchain::NAME)
        {
            return Err(InitError::MissingSwapchainExtension(adapter.name.clone()).into());
        }

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();
        let device_exts = [swapchain::NAME.as_ptr()];
        let features = vk::PhysicalDeviceFeatures::default();
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = instance
            .create_device(phys, &dinfo, None)
            .context("create_device")?;

        let graphics_queue = device.get_device_queue(families.graphics, 0);
        let present_queue = device.get_device_queue(families.present, 0);
        let swapchain_loader = swapchain::Device::new(instance, &device);
        let memory = instance.get_physical_device_memory_properties(phys);

        Ok(VkContext {
            phys,
            device,
            swapchain_loader,
            graphics_queue,
            present_queue,
            families,
            memory,
            adapter,
            inst,
        })
    }

    unsafe fn run_copy(
        &self,
        cmd: vk::CommandBuffer,
        src: &GpuBuffer,
        dst: &GpuBuffer,
    ) -> Result<()> {
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        self.device.begin_command_buffer(cmd, &bi)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: src.size.min(dst.size),
        };
        self.device
            .cmd_copy_buffer(cmd, src.buffer, dst.buffer, std::slice::from_ref(&region));
        self.device.end_command_buffer(cmd)?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        self.device
            .queue_submit(self.graphics_queue, std::slice::from_ref(&si), vk::Fence::null())
            .context("queue_submit(copy)")?;
        self.device
            .queue_wait_idle(self.graphics_queue)
            .context("queue_wait_idle(copy)")?;
        Ok(())
    }
}

impl Drop for VkContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
    }
}

impl Gpu for VkContext {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn queue_families(&self) -> QueueFamilies {
        self.families
    }

    fn surface_support(&self) -> Result<SurfaceSupport> {
        let (loader, surface) = (&self.inst.surface_loader, self.inst.surface);
        unsafe {
            Ok(SurfaceSupport {
                capabilities: loader
                    .get_physical_device_surface_capabilities(self.phys, surface)
                    .context("get_physical_device_surface_capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(self.phys, surface)
                    .context("get_physical_device_surface_formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(self.phys, surface)
                    .context("get_physical_device_surface_present_modes")?,
            })
        }
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let (sharing_mode, families): (vk::SharingMode, &[u32]) = match &desc.sharing {
            ImageSharing::Exclusive => (vk::SharingMode::EXCLUSIVE, &[]),
            ImageSharing::Concurrent(f) => (vk::SharingMode::CONCURRENT, &f[..]),
        };
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.inst.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: families.len() as u32,
            p_queue_family_indices: families.as_ptr(),
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        Ok(unsafe { self.swapchain_loader.create_swapchain(&info, None)? })
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? })
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(
        &mut self,
        image: vk::Image,
        format: vk::Format,
    ) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            },
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        Ok(unsafe { self.device.create_image_view(&info, None)? })
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_shader_module(&mut self, code: &[u32]) -> Result<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            p_code: code.as_ptr(),
            code_size: std::mem::size_of_val(code),
            ..Default::default()
        };
        Ok(unsafe { self.device.create_shader_module(&info, None)? })
    }

    fn destroy_shader_module(&mut self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_cache(&mut self, initial_data: &[u8]) -> Result<vk::PipelineCache> {
        let info = vk::PipelineCacheCreateInfo {
            s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
            initial_data_size: initial_data.len(),
            p_initial_data: if initial_data.is_empty() {
                std::ptr::null()
            } else {
                initial_data.as_ptr().cast()
            },
            ..Default::default()
        };
        Ok(unsafe { self.device.create_pipeline_cache(&info, None)? })
    }

    fn pipeline_cache_data(&self, cache: vk::PipelineCache) -> Result<Vec<u8>> {
        Ok(unsafe { self.device.get_pipeline_cache_data(cache)? })
    }

    fn destroy_pipeline_cache(&mut self, cache: vk::PipelineCache) {
        unsafe { self.device.destroy_pipeline_cache(cache, None) }
    }

    fn create_render_pass(&mut self, color_format: vk::Format) -> Result<vk::RenderPass> {
        let attachment = color_attachment(color_format);
        let color_ref = COLOR_ATTACHMENT_REF;
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        let dependency = external_dependency();
        let info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &attachment,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        Ok(unsafe { self.device.create_render_pass(&info, None)? })
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_pipeline_layout(&mut self) -> Result<vk::PipelineLayout> {
        // no descriptor sets, no push constants
        let info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        Ok(unsafe { self.device.create_pipeline_layout(&info, None)? })
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&mut self, desc: &PipelineDesc) -> Result<vk::Pipeline> {
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: desc.vertex_shader,
                p_name: SHADER_ENTRY.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: desc.fragment_shader,
                p_name: SHADER_ENTRY.as_ptr(),
                ..Default::default()
            },
        ];

        let binding = vertex_binding();
        let attributes = vertex_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &binding,
            vertex_attribute_description_count: attributes.len() as u32,
            p_vertex_attribute_descriptions: attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };
        // baked to the extent; a resize rebuilds the pipeline
        let vp = viewport(desc.extent);
        let sc = scissor(desc.extent);
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &vp,
            scissor_count: 1,
            p_scissors: &sc,
            ..Default::default()
        };
        let raster = rasterization_state();
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: vk::FALSE,
            ..Default::default()
        };
        let blend_attachment = color_blend_attachment();
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            attachment_count: 1,
            p_attachments: &blend_attachment,
            ..Default::default()
        };

        let info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout: desc.layout,
            render_pass: desc.render_pass,
            subpass: 0,
            ..Default::default()
        };

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(desc.cache, std::slice::from_ref(&info), None)
        }
        .map_err(|(_, err)| anyhow!("create_graphics_pipelines failed: {err:?}"))?;
        pipelines
            .first()
            .copied()
            .context("create_graphics_pipelines returned nothing")
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: &view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        Ok(unsafe { self.device.create_framebuffer(&info, None)? })
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_command_pool(&mut self, queue_family: u32) -> Result<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            ..Default::default()
        };
        Ok(unsafe { self.device.create_command_pool(&info, None)? })
    }

    fn destroy_command_pool(&mut self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &mut self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(unsafe { self.device.allocate_command_buffers(&info)? })
    }

    fn free_command_buffers(&mut self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn record_draw(&mut self, cmd: vk::CommandBuffer, draw: &DrawRecording) -> Result<()> {
        let d = &self.device;
        unsafe {
            // resubmitted every frame, possibly while still pending
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)?;

            let clears = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: draw.clear_color,
                },
            }];
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: draw.render_pass,
                framebuffer: draw.framebuffer,
                render_area: scissor(draw.extent),
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
            d.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
            d.cmd_bind_index_buffer(cmd, draw.index_buffer, 0, vk::IndexType::UINT16);
            d.cmd_draw_indexed(cmd, draw.index_count, 1, 0, 0, 0);
            d.cmd_end_render_pass(cmd);

            d.end_command_buffer(cmd)?;
        }
        Ok(())
    }

    fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<GpuBuffer> {
        let d = &self.device;
        unsafe {
            let bci = vk::BufferCreateInfo {
                s_type: vk::StructureType::BUFFER_CREATE_INFO,
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            let buffer = d.create_buffer(&bci, None).context("create_buffer")?;
            let req = d.get_buffer_memory_requirements(buffer);
            let Some(memory_type_index) =
                find_memory_type(&self.memory, req.memory_type_bits, properties)
            else {
                d.destroy_buffer(buffer, None);
                return Err(InitError::NoMemoryType {
                    type_bits: req.memory_type_bits,
                    properties,
                }
                .into());
            };
            let mai = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index,
                ..Default::default()
            };
            let memory = match d.allocate_memory(&mai, None) {
                Ok(m) => m,
                Err(e) => {
                    d.destroy_buffer(buffer, None);
                    return Err(anyhow!("allocate_memory: {e:?}"));
                }
            };
            if let Err(e) = d.bind_buffer_memory(buffer, memory, 0) {
                d.destroy_buffer(buffer, None);
                d.free_memory(memory, None);
                return Err(anyhow!("bind_buffer_memory: {e:?}"));
            }
            Ok(GpuBuffer {
                buffer,
                memory,
                size,
            })
        }
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, bytes: &[u8]) -> Result<()> {
        unsafe {
            let ptr = self
                .device
                .map_memory(
                    buffer.memory,
                    0,
                    bytes.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .context("map_memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
            self.device.unmap_memory(buffer.memory);
        }
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        pool: vk::CommandPool,
        src: &GpuBuffer,
        dst: &GpuBuffer,
    ) -> Result<()> {
        let cmd = self
            .allocate_command_buffers(pool, 1)?
            .first()
            .copied()
            .context("allocate_command_buffers(copy)")?;
        let res = unsafe { self.run_copy(cmd, src, dst) };
        self.free_command_buffers(pool, &[cmd]);
        res
    }

    fn destroy_buffer(&mut self, buffer: GpuBuffer) {
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
            self.device.free_memory(buffer.memory, None);
        }
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&info, None)? })
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        Ok(unsafe { self.device.create_fence(&info, None)? })
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        Ok(unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX)? })
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        Ok(unsafe { self.device.reset_fences(&[fence])? })
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquireOutcome> {
        // no timeout: blocks until the presentation engine hands an image over
        match unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        } {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    fn submit_draw(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, std::slice::from_ref(&submit), fence)?
        };
        Ok(())
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe { self.swapchain_loader.queue_present(self.present_queue, &info) } {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        Ok(unsafe { self.device.device_wait_idle()? })
    }
}
