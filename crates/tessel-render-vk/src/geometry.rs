// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use tessel_render::Vertex;

use crate::gpu::{Gpu, GpuBuffer};

/// First memory type allowed by `type_bits` whose flags contain `req`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize].property_flags.contains(req)
    })
}

/// Copies `bytes` into a fresh device-local buffer through a staging buffer.
/// Blocks until the copy has executed; the staging buffer is gone on return.
pub fn upload_via_staging<G: Gpu>(
    gpu: &mut G,
    pool: vk::CommandPool,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<GpuBuffer> {
    let size = bytes.len() as vk::DeviceSize;
    let staging = gpu
        .create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .context("create staging buffer")?;

    let result = fill_and_copy(gpu, pool, &staging, bytes, usage);
    gpu.destroy_buffer(staging);
    result
}

fn fill_and_copy<G: Gpu>(
    gpu: &mut G,
    pool: vk::CommandPool,
    staging: &GpuBuffer,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<GpuBuffer> {
    gpu.write_buffer(staging, bytes)
        .context("fill staging buffer")?;
    let dst = gpu
        .create_buffer(
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .context("create device-local buffer")?;
    if let Err(e) = gpu.copy_buffer(pool, staging, &dst) {
        gpu.destroy_buffer(dst);
        return Err(e.context("staging copy"));
    }
    Ok(dst)
}

/// Device-local quad geometry. Survives every swapchain rebuild.
pub struct GeometryBuffers {
    pub vertex: GpuBuffer,
    pub index: GpuBuffer,
    pub index_count: u32,
}

impl GeometryBuffers {
    pub fn upload<G: Gpu>(
        gpu: &mut G,
        pool: vk::CommandPool,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<Self> {
        let vertex = upload_via_staging(
            gpu,
            pool,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )
        .context("upload vertex buffer")?;
        let index = match upload_via_staging(
            gpu,
            pool,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        ) {
            Ok(b) => b,
            Err(e) => {
                gpu.destroy_buffer(vertex);
                return Err(e.context("upload index buffer"));
            }
        };
        Ok(Self {
            vertex,
            index,
            index_count: indices.len() as u32,
        })
    }

    pub fn destroy<G: Gpu>(self, gpu: &mut G) {
        gpu.destroy_buffer(self.index);
        gpu.destroy_buffer(self.vertex);
    }
}
