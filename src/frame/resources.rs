//! Per-swapchain-image uniform buffers and descriptor sets.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::backend::{BufferDesc, DeviceBuffer, GpuDevice};
use crate::error::{AllocationError, RendererError, SurfaceStateError};
use crate::memory::MappedMemory;
use crate::pipeline::UNIFORM_BINDING;

/// Uniform data for one frame, padded to 256 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniformBlock {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub padding: [f32; 32],
}

impl FrameUniformBlock {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            padding: [0.0; 32],
        }
    }
}

/// One uniform buffer and one descriptor set per swapchain image.
///
/// Descriptor set `i` is pointed at uniform buffer `i` once at creation and
/// never rewritten; per frame only the bytes behind the buffer change.
#[derive(Debug)]
pub struct FrameResourceSet {
    uniform_buffers: Vec<DeviceBuffer>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
}

impl FrameResourceSet {
    /// Create resources for `image_count` swapchain images.
    ///
    /// Buffers and the pool created before a failure are released before the
    /// error is returned.
    pub fn new<D: GpuDevice + ?Sized>(
        device: &D,
        image_count: u32,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self, AllocationError> {
        let mut uniform_buffers = Vec::with_capacity(image_count as usize);
        for i in 0..image_count {
            let label = format!("frame uniforms {}", i);
            let desc = BufferDesc {
                label: &label,
                size: FrameUniformBlock::SIZE,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            };
            match device.create_buffer(&desc) {
                Ok(buffer) => uniform_buffers.push(buffer),
                Err(err) => {
                    release_buffers(device, uniform_buffers);
                    return Err(err);
                }
            }
        }

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: image_count,
        }];
        let descriptor_pool = match device.create_descriptor_pool(image_count, &pool_sizes) {
            Ok(pool) => pool,
            Err(result) => {
                release_buffers(device, uniform_buffers);
                return Err(AllocationError::DescriptorPool(result));
            }
        };

        let layouts = vec![set_layout; image_count as usize];
        let descriptor_sets = match device.allocate_descriptor_sets(descriptor_pool, &layouts) {
            Ok(sets) => sets,
            Err(result) => {
                device.destroy_descriptor_pool(descriptor_pool);
                release_buffers(device, uniform_buffers);
                return Err(AllocationError::DescriptorSets(result));
            }
        };

        for (set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
            device.write_uniform_descriptor(
                *set,
                UNIFORM_BINDING,
                buffer.buffer,
                FrameUniformBlock::SIZE,
            );
        }

        log::debug!("Created frame resources for {} swapchain images", image_count);

        Ok(Self {
            uniform_buffers,
            descriptor_pool,
            descriptor_sets,
        })
    }

    /// Number of swapchain images covered.
    pub fn image_count(&self) -> u32 {
        self.uniform_buffers.len() as u32
    }

    /// Write fresh view and projection matrices into image `index`'s buffer.
    pub fn update_for_image<D: GpuDevice + ?Sized>(
        &self,
        device: &D,
        index: u32,
        view: Mat4,
        projection: Mat4,
    ) -> Result<(), RendererError> {
        let buffer = self.uniform_buffer(index)?;
        let block = FrameUniformBlock::new(view, projection);

        let mut mapped = MappedMemory::new(device, buffer.memory, 0, FrameUniformBlock::SIZE)?;
        mapped.write(bytemuck::bytes_of(&block))?;
        Ok(())
    }

    /// Descriptor set bound to image `index`'s uniform buffer.
    pub fn descriptor_set(&self, index: u32) -> Result<vk::DescriptorSet, SurfaceStateError> {
        self.descriptor_sets
            .get(index as usize)
            .copied()
            .ok_or(SurfaceStateError::ImageOutOfRange {
                index,
                count: self.image_count(),
            })
    }

    /// Uniform buffer of image `index`.
    pub fn uniform_buffer(&self, index: u32) -> Result<DeviceBuffer, SurfaceStateError> {
        self.uniform_buffers
            .get(index as usize)
            .copied()
            .ok_or(SurfaceStateError::ImageOutOfRange {
                index,
                count: self.image_count(),
            })
    }

    /// Destroy the descriptor pool (and with it every set) and all uniform
    /// buffers. The device must be idle.
    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &D) {
        device.destroy_descriptor_pool(self.descriptor_pool);
        release_buffers(device, self.uniform_buffers);
    }
}

fn release_buffers<D: GpuDevice + ?Sized>(device: &D, buffers: Vec<DeviceBuffer>) {
    for buffer in buffers {
        device.destroy_buffer(buffer);
    }
}
