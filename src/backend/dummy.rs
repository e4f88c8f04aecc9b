//! Dummy device for testing.
//!
//! This device doesn't talk to a GPU. It hands out fabricated handles, backs
//! buffer memory with host allocations, and records every command and
//! resource event so tests can inspect what the renderer did. Individual
//! operations can be made to fail to exercise error paths.

use std::collections::{HashMap, HashSet};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::backend::{BufferDesc, DeviceBuffer, DrawIndexed, GpuDevice, GraphicsPipelineDesc};
use crate::error::AllocationError;
use crate::pipeline::PipelineState;

/// A resource created through the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Buffer(vk::Buffer),
    Memory(vk::DeviceMemory),
    ShaderModule(vk::ShaderModule),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    DescriptorPool(vk::DescriptorPool),
}

/// Resource-level events in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Created(Resource),
    Destroyed(Resource),
    Mapped {
        memory: vk::DeviceMemory,
        offset: u64,
        size: u64,
    },
    Unmapped(vk::DeviceMemory),
    WaitIdle,
}

/// A recorded command buffer command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissor {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    BindPipeline(vk::Pipeline),
    BindDescriptorSet {
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<u64>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    },
    DrawIndexed(DrawIndexed),
}

/// An operation that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    CreateBuffer,
    MapMemory,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    GraphicsPipeline,
    DescriptorPool,
    DescriptorSets,
    WaitIdle,
}

/// What a buffer was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRecord {
    pub label: String,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory_properties: vk::MemoryPropertyFlags,
    pub memory: vk::DeviceMemory,
}

/// One binding of a created descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

/// A recorded descriptor write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub buffer: vk::Buffer,
    pub range: u64,
}

#[derive(Default)]
struct DummyState {
    next_handle: u64,
    memory: HashMap<vk::DeviceMemory, Box<[u8]>>,
    buffers: HashMap<vk::Buffer, BufferRecord>,
    mapped: HashSet<vk::DeviceMemory>,
    map_count: usize,
    unmap_count: usize,
    maps_before_failure: Option<usize>,
    failures: HashSet<FailurePoint>,
    events: Vec<DeviceEvent>,
    commands: Vec<(vk::CommandBuffer, Command)>,
    pipelines: Vec<(vk::Pipeline, PipelineState, vk::RenderPass)>,
    descriptor_layouts: HashMap<vk::DescriptorSetLayout, Vec<LayoutBinding>>,
    descriptor_pools: HashMap<vk::DescriptorPool, (u32, Vec<vk::DescriptorPoolSize>)>,
    descriptor_writes: Vec<DescriptorWrite>,
}

impl DummyState {
    fn next<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    fn created(&mut self, resource: Resource) {
        self.events.push(DeviceEvent::Created(resource));
    }

    fn destroyed(&mut self, resource: Resource) {
        self.events.push(DeviceEvent::Destroyed(resource));
    }

    fn check(&self, point: FailurePoint, result: vk::Result) -> VkResult<()> {
        if self.failures.contains(&point) {
            Err(result)
        } else {
            Ok(())
        }
    }
}

/// Recording [`GpuDevice`] with no GPU behind it.
#[derive(Default)]
pub struct DummyDevice {
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the device name.
    pub fn name(&self) -> &'static str {
        "Dummy Device"
    }

    /// Make every subsequent call of `point` fail.
    pub fn fail_on(&self, point: FailurePoint) {
        self.state.lock().failures.insert(point);
    }

    /// Stop failing calls of `point`.
    pub fn clear_failure(&self, point: FailurePoint) {
        self.state.lock().failures.remove(&point);
    }

    /// Allow `count` more successful maps, then fail every map after that.
    pub fn fail_map_after(&self, count: usize) {
        self.state.lock().maps_before_failure = Some(count);
    }

    /// Contents of a memory allocation, if it is still alive.
    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.state.lock().memory.get(&memory).map(|bytes| bytes.to_vec())
    }

    /// Contents of the memory bound to a live buffer.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let record = state.buffers.get(&buffer)?;
        state.memory.get(&record.memory).map(|bytes| bytes.to_vec())
    }

    /// Creation parameters of a live buffer.
    pub fn buffer_record(&self, buffer: vk::Buffer) -> Option<BufferRecord> {
        self.state.lock().buffers.get(&buffer).cloned()
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn is_mapped(&self, memory: vk::DeviceMemory) -> bool {
        self.state.lock().mapped.contains(&memory)
    }

    pub fn map_count(&self) -> usize {
        self.state.lock().map_count
    }

    pub fn unmap_count(&self) -> usize {
        self.state.lock().unmap_count
    }

    /// Every resource event so far, in order.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().events.clone()
    }

    /// Resources created and not yet destroyed.
    pub fn live_resources(&self) -> Vec<Resource> {
        let state = self.state.lock();
        let mut live = Vec::new();
        for event in &state.events {
            match *event {
                DeviceEvent::Created(resource) => live.push(resource),
                DeviceEvent::Destroyed(resource) => {
                    if let Some(pos) = live.iter().position(|r| *r == resource) {
                        live.remove(pos);
                    }
                }
                _ => {}
            }
        }
        live
    }

    /// How often `resource` was destroyed.
    pub fn destroy_count(&self, resource: Resource) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|event| **event == DeviceEvent::Destroyed(resource))
            .count()
    }

    /// Commands recorded into `cmd`, oldest first.
    pub fn commands(&self, cmd: vk::CommandBuffer) -> Vec<Command> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|(recorded, _)| *recorded == cmd)
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Forget every recorded command.
    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Fixed state and render pass of every pipeline created so far.
    pub fn pipelines(&self) -> Vec<(vk::Pipeline, PipelineState, vk::RenderPass)> {
        self.state.lock().pipelines.clone()
    }

    /// Bindings a descriptor set layout was created with.
    pub fn descriptor_set_layout_bindings(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Option<Vec<LayoutBinding>> {
        self.state.lock().descriptor_layouts.get(&layout).cloned()
    }

    /// `(max_sets, pool_sizes)` a descriptor pool was created with.
    pub fn descriptor_pool_sizes(
        &self,
        pool: vk::DescriptorPool,
    ) -> Option<(u32, Vec<vk::DescriptorPoolSize>)> {
        self.state.lock().descriptor_pools.get(&pool).cloned()
    }

    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.state.lock().descriptor_writes.clone()
    }

    fn record(&self, cmd: vk::CommandBuffer, command: Command) {
        log::trace!("DummyDevice: {:?} <- {:?}", cmd, command);
        self.state.lock().commands.push((cmd, command));
    }
}

impl GpuDevice for DummyDevice {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<DeviceBuffer, AllocationError> {
        let mut state = self.state.lock();
        state
            .check(FailurePoint::CreateBuffer, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            .map_err(|result| AllocationError::MemoryAllocation {
                label: desc.label.to_string(),
                size: desc.size,
                result,
            })?;

        let buffer: vk::Buffer = state.next();
        let memory: vk::DeviceMemory = state.next();
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );

        state
            .memory
            .insert(memory, vec![0u8; desc.size as usize].into_boxed_slice());
        state.buffers.insert(
            buffer,
            BufferRecord {
                label: desc.label.to_string(),
                size: desc.size,
                usage: desc.usage,
                memory_properties: desc.memory_properties,
                memory,
            },
        );
        state.created(Resource::Buffer(buffer));
        state.created(Resource::Memory(memory));

        Ok(DeviceBuffer {
            buffer,
            memory,
            size: desc.size,
        })
    }

    fn destroy_buffer(&self, buffer: DeviceBuffer) {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer.buffer);
        state.memory.remove(&buffer.memory);
        state.destroyed(Resource::Buffer(buffer.buffer));
        state.destroyed(Resource::Memory(buffer.memory));
    }

    fn map_memory(&self, memory: vk::DeviceMemory, offset: u64, size: u64) -> VkResult<*mut u8> {
        let mut state = self.state.lock();
        state.check(FailurePoint::MapMemory, vk::Result::ERROR_MEMORY_MAP_FAILED)?;
        if let Some(remaining) = state.maps_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
            }
            *remaining -= 1;
        }
        if state.mapped.contains(&memory) {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }

        let Some(bytes) = state.memory.get_mut(&memory) else {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        };
        if offset.saturating_add(size) > bytes.len() as u64 {
            return Err(vk::Result::ERROR_MEMORY_MAP_FAILED);
        }
        // Boxed storage does not move while the map entry lives.
        let ptr = unsafe { bytes.as_mut_ptr().add(offset as usize) };

        state.mapped.insert(memory);
        state.map_count += 1;
        state.events.push(DeviceEvent::Mapped {
            memory,
            offset,
            size,
        });
        Ok(ptr)
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.lock();
        state.mapped.remove(&memory);
        state.unmap_count += 1;
        state.events.push(DeviceEvent::Unmapped(memory));
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let mut state = self.state.lock();
        state.check(FailurePoint::ShaderModule, vk::Result::ERROR_INVALID_SHADER_NV)?;
        let module = state.next();
        log::trace!("DummyDevice: creating shader module ({} words)", code.len());
        state.created(Resource::ShaderModule(module));
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.lock().destroyed(Resource::ShaderModule(module));
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VkResult<vk::DescriptorSetLayout> {
        let mut state = self.state.lock();
        state.check(
            FailurePoint::DescriptorSetLayout,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        )?;
        let layout = state.next();
        let stored = bindings
            .iter()
            .map(|binding| LayoutBinding {
                binding: binding.binding,
                descriptor_type: binding.descriptor_type,
                descriptor_count: binding.descriptor_count,
                stage_flags: binding.stage_flags,
            })
            .collect();
        state.descriptor_layouts.insert(layout, stored);
        state.created(Resource::DescriptorSetLayout(layout));
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state
            .lock()
            .destroyed(Resource::DescriptorSetLayout(layout));
    }

    fn create_pipeline_layout(
        &self,
        _set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout> {
        let mut state = self.state.lock();
        state.check(FailurePoint::PipelineLayout, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        let layout = state.next();
        state.created(Resource::PipelineLayout(layout));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.lock().destroyed(Resource::PipelineLayout(layout));
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> VkResult<vk::Pipeline> {
        let mut state = self.state.lock();
        state.check(
            FailurePoint::GraphicsPipeline,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        )?;
        let pipeline = state.next();
        state
            .pipelines
            .push((pipeline, desc.state.clone(), desc.render_pass));
        state.created(Resource::Pipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.lock().destroyed(Resource::Pipeline(pipeline));
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        let mut state = self.state.lock();
        state.check(FailurePoint::DescriptorPool, vk::Result::ERROR_OUT_OF_HOST_MEMORY)?;
        let pool = state.next();
        state
            .descriptor_pools
            .insert(pool, (max_sets, pool_sizes.to_vec()));
        state.created(Resource::DescriptorPool(pool));
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state.lock().destroyed(Resource::DescriptorPool(pool));
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state.lock();
        state.check(
            FailurePoint::DescriptorSets,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        )?;
        let Some(&(max_sets, _)) = state.descriptor_pools.get(&pool) else {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        };
        if layouts.len() > max_sets as usize {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        Ok(layouts.iter().map(|_| state.next()).collect())
    }

    fn write_uniform_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: u64,
    ) {
        self.state.lock().descriptor_writes.push(DescriptorWrite {
            set,
            binding,
            buffer,
            range,
        });
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(
            cmd,
            Command::SetViewport {
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            },
        );
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(
            cmd,
            Command::SetScissor {
                x: scissor.offset.x,
                y: scissor.offset.y,
                width: scissor.extent.width,
                height: scissor.extent.height,
            },
        );
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(cmd, Command::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.record(cmd, Command::BindDescriptorSet { layout, set });
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[u64],
    ) {
        self.record(
            cmd,
            Command::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
                offsets: offsets.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    ) {
        self.record(
            cmd,
            Command::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            },
        );
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, draw: DrawIndexed) {
        self.record(cmd, Command::DrawIndexed(draw));
    }

    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.state.lock();
        state.check(FailurePoint::WaitIdle, vk::Result::ERROR_DEVICE_LOST)?;
        state.events.push(DeviceEvent::WaitIdle);
        Ok(())
    }
}
