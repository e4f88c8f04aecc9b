//! Error taxonomy for the viewer.
//!
//! Setup failures (asset, shader, layout, allocation, pipeline) are fatal and
//! unwind [`Renderer::initialize`](crate::Renderer::initialize). Surface state
//! errors are transient: the renderer skips the frame and tries again on the
//! next tick.

use ash::vk;
use thiserror::Error;

/// Failure to turn a scene file into a [`MeshData`](crate::mesh::MeshData).
#[derive(Error, Debug)]
pub enum AssetLoadError {
    #[error("failed to read scene file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("glTF parse error: {0}")]
    Parse(#[from] gltf_dep::Error),
    #[error("scene contains no meshes")]
    NoMeshes,
    #[error("mesh {mesh} has no primitives")]
    NoPrimitives { mesh: usize },
    #[error("primitive is missing required attribute {semantic}")]
    MissingAttribute { semantic: &'static str },
    #[error("primitive has no index accessor")]
    MissingIndices,
    #[error("unsupported primitive topology: {0}")]
    UnsupportedTopology(String),
    #[error("unsupported format for {semantic}: {detail}")]
    UnsupportedFormat {
        semantic: &'static str,
        detail: String,
    },
    #[error("unsupported index data: {0}")]
    UnsupportedIndices(String),
    #[error("accessor error: {0}")]
    Accessor(String),
    #[error("buffer error: {0}")]
    Buffer(String),
}

/// Failure to produce SPIR-V for one shader stage.
#[derive(Error, Debug)]
pub enum ShaderCompileError {
    #[error("failed to read shader source '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} shader parse errors:\n{diagnostic}")]
    Parse {
        stage: &'static str,
        diagnostic: String,
    },
    #[error("{stage} shader validation errors:\n{diagnostic}")]
    Validation {
        stage: &'static str,
        diagnostic: String,
    },
    #[error("{stage} shader has no entry point '{entry_point}'")]
    MissingEntryPoint {
        stage: &'static str,
        entry_point: String,
    },
    #[error("{stage} shader SPIR-V generation failed: {diagnostic}")]
    Codegen {
        stage: &'static str,
        diagnostic: String,
    },
    #[error("{stage} shader binary is not valid SPIR-V: {reason}")]
    InvalidBinary {
        stage: &'static str,
        reason: String,
    },
}

/// The mesh streams cannot be packed into a unified buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("expected {expected} attribute streams, got {actual}")]
    AttributeCountMismatch { expected: usize, actual: usize },
    #[error("attribute stream {index} ({semantic}) has zero size")]
    EmptyAttribute { index: usize, semantic: &'static str },
    #[error("attribute stream {index} is {actual}, pipeline expects {expected}")]
    SemanticMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("index stream has zero size")]
    EmptyIndices,
    #[error("index stream uses {actual}-byte indices, configured width is {expected} bytes")]
    IndexWidthMismatch { expected: u64, actual: u64 },
    #[error("region alignment {0} is not a power of two")]
    InvalidAlignment(u64),
    #[error("index region offset {offset} is not a multiple of the index width {width}")]
    MisalignedIndexRegion { offset: u64, width: u64 },
}

/// Device memory or descriptor storage could not be obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("failed to create buffer '{label}' ({size} bytes): {result:?}")]
    BufferCreation {
        label: String,
        size: u64,
        result: vk::Result,
    },
    #[error("no memory type supports {properties:?} for buffer '{label}'")]
    NoSuitableMemoryType {
        label: String,
        properties: vk::MemoryPropertyFlags,
    },
    #[error("failed to allocate {size} bytes of device memory for '{label}': {result:?}")]
    MemoryAllocation {
        label: String,
        size: u64,
        result: vk::Result,
    },
    #[error("failed to map {size} bytes at offset {offset}: {result:?}")]
    Map {
        offset: u64,
        size: u64,
        result: vk::Result,
    },
    #[error("source span of {source_len} bytes does not fit mapped range of {mapped_len} bytes")]
    CopyOverflow { source_len: usize, mapped_len: usize },
    #[error("failed to create descriptor pool: {0:?}")]
    DescriptorPool(vk::Result),
    #[error("failed to allocate descriptor sets: {0:?}")]
    DescriptorSets(vk::Result),
}

/// The GPU rejected part of the fixed pipeline state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineCreationError {
    #[error("failed to create {stage} shader module: {result:?}")]
    ShaderModule {
        stage: &'static str,
        result: vk::Result,
    },
    #[error("failed to create descriptor set layout: {0:?}")]
    DescriptorSetLayout(vk::Result),
    #[error("failed to create pipeline layout: {0:?}")]
    PipelineLayout(vk::Result),
    #[error("failed to create graphics pipeline: {0:?}")]
    GraphicsPipeline(vk::Result),
}

/// The surface cannot hand out a recordable frame right now.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceStateError {
    #[error("no swapchain image is currently acquired")]
    NoCurrentImage,
    #[error("no command buffer for swapchain image {0}")]
    NoCommandBuffer(u32),
    #[error("swapchain image {index} out of range ({count} images)")]
    ImageOutOfRange { index: u32, count: u32 },
    #[error("surface is being recreated")]
    Recreating,
    #[error("surface has zero extent")]
    ZeroExtent,
    #[error("surface query failed: {0:?}")]
    Query(vk::Result),
}

/// A device-wide operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("failed to wait for device idle: {0:?}")]
    WaitIdle(vk::Result),
    #[error("device initialization failed: {0}")]
    Initialization(String),
    #[error("failed to submit frame commands: {0:?}")]
    Submit(vk::Result),
    #[error("failed to present frame: {0:?}")]
    Present(vk::Result),
}

/// Umbrella error returned by the renderer's public entry points.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),
    #[error(transparent)]
    ShaderCompile(#[from] ShaderCompileError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    PipelineCreation(#[from] PipelineCreationError),
    #[error(transparent)]
    SurfaceState(#[from] SurfaceStateError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl RendererError {
    /// Whether the failure only affects the current frame.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SurfaceState(_))
    }
}

pub type RendererResult<T> = Result<T, RendererError>;
