//! Device abstraction layer
//!
//! Every GPU call the renderer makes goes through [`GpuDevice`]. Two
//! implementations exist: [`vulkan::VulkanDevice`] drives a real device via
//! ash, [`dummy::DummyDevice`] records calls in memory for tests.
//!
//! Handles are plain `ash::vk` handles in both implementations, so the
//! resource structs above this layer do not care which device made them.

pub mod conversion;
pub mod dummy;
pub mod vulkan;

use crate::error::AllocationError;
use crate::pipeline::PipelineState;
use ash::prelude::VkResult;
use ash::vk;

pub use dummy::DummyDevice;
pub use vulkan::VulkanDevice;

/// Parameters for a buffer with its own dedicated memory allocation.
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory_properties: vk::MemoryPropertyFlags,
}

/// A buffer together with the memory bound to it at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
}

/// Everything needed to create the graphics pipeline object.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub state: &'a PipelineState,
    pub vertex_module: vk::ShaderModule,
    pub fragment_module: vk::ShaderModule,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
}

/// Index-draw parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndexed {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// The subset of a Vulkan logical device the renderer uses.
pub trait GpuDevice {
    // Resources

    /// Create a buffer and bind a fresh allocation with the requested
    /// memory properties to it.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<DeviceBuffer, AllocationError>;

    /// Destroy a buffer and free its memory.
    fn destroy_buffer(&self, buffer: DeviceBuffer);

    /// Map `size` bytes of `memory` starting at `offset`.
    ///
    /// The returned pointer is valid until [`unmap_memory`](Self::unmap_memory).
    /// Prefer [`MappedMemory`](crate::memory::MappedMemory) over calling this
    /// directly.
    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> VkResult<*mut u8>;

    fn unmap_memory(&self, memory: vk::DeviceMemory);

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;

    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VkResult<vk::DescriptorSetLayout>;

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout>;

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline>;

    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool>;

    /// Destroy a descriptor pool, implicitly freeing every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>>;

    /// Point `binding` of `set` at the first `range` bytes of `buffer`.
    fn write_uniform_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: u64,
    );

    // Commands

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[u64],
    );

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    );

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, draw: DrawIndexed);

    // Synchronization

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> VkResult<()>;
}
