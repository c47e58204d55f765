// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tessel_render::{AssetStore, Vertex};
use tracing::{debug, warn};

use crate::error::InitError;
use crate::gpu::{AdapterInfo, Gpu, PipelineDesc};

// ---------------------------------------------------------------------------
// Fixed-function state. The ash backend assembles create infos from these.
// ---------------------------------------------------------------------------

pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

pub const COLOR_ATTACHMENT_REF: vk::AttachmentReference = vk::AttachmentReference {
    attachment: 0,
    layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
};

/// Orders the subpass's color writes after whatever touched the image before
/// the pass (the presentation engine reading it, or the layout transition).
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, color) as u32,
        },
    ]
}

/// Viewport and scissor are baked into the pipeline; a resize rebuilds it.
pub fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    }
}

pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: vk::FALSE,
        color_write_mask: vk::ColorComponentFlags::RGBA,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Shader modules (resize independent)
// ---------------------------------------------------------------------------

/// Reads a SPIR-V binary through the asset store. Empty means missing.
pub fn load_spirv(assets: &dyn AssetStore, path: &Path) -> Result<Vec<u32>, InitError> {
    let bytes = assets.read(path);
    if bytes.is_empty() {
        return Err(InitError::MissingShader(path.to_path_buf()));
    }
    read_spv(&mut Cursor::new(&bytes[..])).map_err(|source| InitError::InvalidShader {
        path: path.to_path_buf(),
        source,
    })
}

pub struct ShaderModules {
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
}

impl ShaderModules {
    pub fn load<G: Gpu>(
        gpu: &mut G,
        assets: &dyn AssetStore,
        vertex: &Path,
        fragment: &Path,
    ) -> Result<Self> {
        // both binaries are validated before any module exists
        let vs_code = load_spirv(assets, vertex)?;
        let fs_code = load_spirv(assets, fragment)?;

        let vertex = gpu
            .create_shader_module(&vs_code)
            .context("create vertex shader module")?;
        let fragment = match gpu.create_shader_module(&fs_code) {
            Ok(m) => m,
            Err(e) => {
                gpu.destroy_shader_module(vertex);
                return Err(e.context("create fragment shader module"));
            }
        };
        Ok(Self { vertex, fragment })
    }

    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        gpu.destroy_shader_module(self.vertex);
        gpu.destroy_shader_module(self.fragment);
    }
}

// ---------------------------------------------------------------------------
// Pipeline cache (resize independent, persisted as an opaque blob)
// ---------------------------------------------------------------------------

/// Blob file for this exact adapter + driver, so a cache written by another
/// GPU or driver build is never fed back.
pub fn pipeline_cache_path(dir: &Path, adapter: &AdapterInfo) -> PathBuf {
    dir.join(format!(
        "vk_pipeline_cache_{:04x}_{:04x}_{:08x}_{:032x}.bin",
        adapter.vendor_id,
        adapter.device_id,
        adapter.driver_version,
        u128::from_be_bytes(adapter.pipeline_cache_uuid)
    ))
}

/// Driver-defined bytes stored as-is. This is a local warm-start cache, not
/// protected data; nothing here is encrypted or obfuscated.
pub struct PipelineCache {
    pub handle: vk::PipelineCache,
    path: PathBuf,
}

impl PipelineCache {
    /// A missing blob, or one the driver refuses, yields an empty cache.
    pub fn load<G: Gpu>(gpu: &mut G, assets: &dyn AssetStore, dir: &Path) -> Result<Self> {
        let path = pipeline_cache_path(dir, gpu.adapter());
        let blob = assets.read(&path);
        let handle = if blob.is_empty() {
            debug!("pipeline cache miss: {}", path.display());
            gpu.create_pipeline_cache(&[])
        } else {
            debug!(
                "pipeline cache hit: {} ({} bytes)",
                path.display(),
                blob.len()
            );
            gpu.create_pipeline_cache(&blob).or_else(|e| {
                warn!("stored pipeline cache rejected ({e:#}), starting empty");
                gpu.create_pipeline_cache(&[])
            })
        }
        .context("create_pipeline_cache")?;
        Ok(Self { handle, path })
    }

    /// Writes the current blob back. Failures only cost warm-start time.
    pub fn save<G: Gpu>(&self, gpu: &G, assets: &dyn AssetStore) {
        match gpu.pipeline_cache_data(self.handle) {
            Ok(bytes) => match assets.write(&self.path, &bytes) {
                Ok(()) => debug!(
                    "pipeline cache saved: {} ({} bytes)",
                    self.path.display(),
                    bytes.len()
                ),
                Err(e) => warn!("pipeline cache not saved: {e:#}"),
            },
            Err(e) => warn!("pipeline cache data unavailable: {e:#}"),
        }
    }

    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        gpu.destroy_pipeline_cache(self.handle);
    }
}

// ---------------------------------------------------------------------------
// Render pass + pipeline (rebuilt with the swapchain)
// ---------------------------------------------------------------------------

pub struct PipelineObjects {
    pub render_pass: vk::RenderPass,
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl PipelineObjects {
    pub fn create<G: Gpu>(
        gpu: &mut G,
        shaders: &ShaderModules,
        cache: &PipelineCache,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let render_pass = gpu.create_render_pass(format).context("create_render_pass")?;
        let layout = match gpu.create_pipeline_layout() {
            Ok(l) => l,
            Err(e) => {
                gpu.destroy_render_pass(render_pass);
                return Err(e.context("create_pipeline_layout"));
            }
        };
        let desc = PipelineDesc {
            render_pass,
            layout,
            cache: cache.handle,
            vertex_shader: shaders.vertex,
            fragment_shader: shaders.fragment,
            extent,
        };
        match gpu.create_graphics_pipeline(&desc) {
            Ok(pipeline) => Ok(Self {
                render_pass,
                layout,
                pipeline,
            }),
            Err(e) => {
                gpu.destroy_pipeline_layout(layout);
                gpu.destroy_render_pass(render_pass);
                Err(e.context("create_graphics_pipelines"))
            }
        }
    }

    /// Pipeline and layout, then the pass they were built against.
    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        gpu.destroy_pipeline(self.pipeline);
        gpu.destroy_pipeline_layout(self.layout);
        gpu.destroy_render_pass(self.render_pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_render::MemoryAssets;

    fn spirv_bytes() -> Vec<u8> {
        [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect()
    }

    #[test]
    fn missing_shader_is_a_typed_error() {
        let assets = MemoryAssets::new();
        let err = load_spirv(&assets, Path::new("shaders/quad.vert.spv")).unwrap_err();
        assert!(matches!(err, InitError::MissingShader(p) if p.ends_with("quad.vert.spv")));
    }

    #[test]
    fn misaligned_shader_is_invalid() {
        let assets = MemoryAssets::new().with("bad.spv", vec![0x03, 0x02, 0x23]);
        let err = load_spirv(&assets, Path::new("bad.spv")).unwrap_err();
        assert!(matches!(err, InitError::InvalidShader { .. }));
    }

    #[test]
    fn valid_shader_decodes_to_words() {
        let assets = MemoryAssets::new().with("ok.spv", spirv_bytes());
        let words = load_spirv(&assets, Path::new("ok.spv")).unwrap();
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words.len(), 5);
    }

    #[test]
    fn cache_path_encodes_adapter_identity() {
        let adapter = AdapterInfo {
            name: "Mock".into(),
            vendor_id: 0x10de,
            device_id: 0x2204,
            driver_version: 0x1234_5678,
            pipeline_cache_uuid: [0xab; vk::UUID_SIZE],
        };
        let p = pipeline_cache_path(Path::new("pipeline_cache"), &adapter);
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(p.starts_with("pipeline_cache"));
        assert_eq!(
            name,
            format!("vk_pipeline_cache_10de_2204_12345678_{}.bin", "ab".repeat(16))
        );
    }

    #[test]
    fn cache_uuid_keeps_byte_order_and_leading_zeros() {
        let mut uuid = [0u8; vk::UUID_SIZE];
        for (i, b) in uuid.iter_mut().enumerate() {
            *b = i as u8;
        }
        let adapter = AdapterInfo {
            name: "Mock".into(),
            vendor_id: 0x1,
            device_id: 0x2,
            driver_version: 0x3,
            pipeline_cache_uuid: uuid,
        };
        let p = pipeline_cache_path(Path::new("c"), &adapter);
        assert_eq!(
            p.file_name().unwrap().to_string_lossy(),
            "vk_pipeline_cache_0001_0002_00000003_000102030405060708090a0b0c0d0e0f.bin"
        );
    }

    #[test]
    fn vertex_input_matches_vertex_struct() {
        let b = vertex_binding();
        assert_eq!(b.stride, 20);
        let [pos, color] = vertex_attributes();
        assert_eq!((pos.location, pos.offset), (0, 0));
        assert_eq!(pos.format, vk::Format::R32G32_SFLOAT);
        assert_eq!((color.location, color.offset), (1, 8));
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn render_pass_clears_and_presents() {
        let att = color_attachment(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(att.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(att.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(att.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(att.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let dep = external_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn rasterizer_culls_back_faces_clockwise() {
        let r = rasterization_state();
        assert_eq!(r.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(r.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(r.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(r.depth_bias_enable, vk::FALSE);
        let blend = color_blend_attachment();
        assert_eq!(blend.blend_enable, vk::FALSE);
        assert_eq!(blend.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
