//! Mesh Viewer - draws one glTF mesh through a fixed Vulkan pipeline
//!
//! Every vertex attribute and the index stream are packed into a single
//! host-visible buffer and drawn with one indexed draw per frame. The
//! renderer works against three collaborators it does not own:
//! - **Device provider**: logical device, render pass, swapchain images and
//!   their command buffers ([`surface::VulkanSurface`] for a real window)
//! - **Asset provider**: the mesh streams ([`asset::GltfAsset`])
//! - **Shader provider**: SPIR-V for both stages ([`shader::WgslShaders`],
//!   [`shader::SpirvShaders`])
//!
//! # Lifecycle
//! [`Renderer::initialize`] creates every GPU resource,
//! [`Renderer::render_frame`] records one frame (or
//! [`Renderer::present_frame`] runs it end to end on a [`FrameHost`]) and
//! [`Renderer::shutdown`] waits for the device and releases everything.

pub mod asset;
pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod memory;
pub mod mesh;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod surface;

pub use asset::{AssetProvider, GltfAsset};
pub use backend::{DummyDevice, GpuDevice, VulkanDevice};
pub use camera::{CameraProvider, FixedCamera, FreeLookCamera};
pub use config::RendererConfig;
pub use error::{
    AllocationError, AssetLoadError, DeviceError, LayoutError, PipelineCreationError,
    RendererError, RendererResult, ShaderCompileError, SurfaceStateError,
};
pub use frame::FrameState;
pub use mesh::{BufferLayoutPlan, MeshData};
pub use renderer::{FrameOutcome, Renderer};
pub use shader::{ShaderProvider, SpirvShaders, WgslShaders};
pub use surface::{DeviceProvider, FrameHost, SurfaceDesc, VulkanSurface};
