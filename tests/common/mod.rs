//! Common utilities for renderer integration tests.
//!
//! Everything runs against [`DummyDevice`]: a fake surface hands out
//! fabricated command buffers, a static asset provider returns a quad, and a
//! static shader provider returns placeholder SPIR-V.

#![allow(dead_code)]

use ash::vk::{self, Handle};

use mesh_viewer::asset::AssetProvider;
use mesh_viewer::backend::DummyDevice;
use mesh_viewer::error::{AssetLoadError, DeviceError, ShaderCompileError, SurfaceStateError};
use mesh_viewer::mesh::{
    AttributeFormat, AttributeSemantic, AttributeStream, IndexFormat, IndexStream, MeshData,
};
use mesh_viewer::shader::{CompiledShaders, ShaderProvider};
use mesh_viewer::surface::{DeviceProvider, FrameHost};

/// Command buffer handles start here so they never collide with device handles.
const COMMAND_BUFFER_BASE: u64 = 0x1000;

// ============================================================================
// Fake surface
// ============================================================================

/// Window surface stand-in with a controllable size and current image.
pub struct FakeSurface {
    device: DummyDevice,
    width: u32,
    height: u32,
    image_count: u32,
    current_image: Option<u32>,
    command_buffers_available: bool,
    render_pass: vk::RenderPass,
    frames_begun: u32,
    frames_ended: u32,
    submit_failure: Option<vk::Result>,
}

impl FakeSurface {
    /// An 800x600 surface with `image_count` images and image 0 acquired.
    pub fn new(image_count: u32) -> Self {
        Self {
            device: DummyDevice::new(),
            width: 800,
            height: 600,
            image_count,
            current_image: Some(0),
            command_buffers_available: true,
            render_pass: vk::RenderPass::from_raw(0xAAAA),
            frames_begun: 0,
            frames_ended: 0,
            submit_failure: None,
        }
    }

    pub fn dummy(&self) -> &DummyDevice {
        &self.device
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_current_image(&mut self, image: Option<u32>) {
        self.current_image = image;
    }

    pub fn set_command_buffers_available(&mut self, available: bool) {
        self.command_buffers_available = available;
    }

    /// The command buffer the surface hands out for `image`.
    pub fn command_buffer_for(image: u32) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(COMMAND_BUFFER_BASE + image as u64)
    }

    pub fn render_pass_handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Make every following `end_frame` fail to submit with `result`.
    pub fn fail_submit(&mut self, result: vk::Result) {
        self.submit_failure = Some(result);
    }

    pub fn frames_begun(&self) -> u32 {
        self.frames_begun
    }

    pub fn frames_ended(&self) -> u32 {
        self.frames_ended
    }
}

impl DeviceProvider for FakeSurface {
    type Device = DummyDevice;

    fn device(&self) -> &DummyDevice {
        &self.device
    }

    fn physical_device(&self) -> vk::PhysicalDevice {
        vk::PhysicalDevice::null()
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn swapchain_image_count(&self) -> u32 {
        self.image_count
    }

    fn swapchain_current_image(&self) -> Result<u32, SurfaceStateError> {
        self.current_image.ok_or(SurfaceStateError::NoCurrentImage)
    }

    fn command_buffer(&self, image_index: u32) -> Result<vk::CommandBuffer, SurfaceStateError> {
        if image_index >= self.image_count {
            return Err(SurfaceStateError::ImageOutOfRange {
                index: image_index,
                count: self.image_count,
            });
        }
        if !self.command_buffers_available {
            return Err(SurfaceStateError::NoCommandBuffer(image_index));
        }
        Ok(Self::command_buffer_for(image_index))
    }

    fn client_width(&self) -> u32 {
        self.width
    }

    fn client_height(&self) -> u32 {
        self.height
    }
}

impl FrameHost for FakeSurface {
    fn begin_frame(
        &mut self,
        _clear_color: [f32; 4],
        _clear_depth: f32,
    ) -> Result<u32, SurfaceStateError> {
        let image = self.current_image.ok_or(SurfaceStateError::NoCurrentImage)?;
        self.frames_begun += 1;
        Ok(image)
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        self.frames_ended += 1;
        match self.submit_failure {
            Some(e) => Err(DeviceError::Submit(e)),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Asset provider returning a fixed mesh.
pub struct StaticAsset(pub MeshData);

impl AssetProvider for StaticAsset {
    fn load_mesh(
        &self,
        _attributes: &[AttributeSemantic],
        _index_format: IndexFormat,
    ) -> Result<MeshData, AssetLoadError> {
        Ok(self.0.clone())
    }
}

/// Shader provider returning placeholder binaries.
pub struct StaticShaders;

impl ShaderProvider for StaticShaders {
    fn compile(&self) -> Result<CompiledShaders, ShaderCompileError> {
        Ok(CompiledShaders {
            vertex: vec![0x0723_0203, 0x0001_0300, 1, 2],
            fragment: vec![0x0723_0203, 0x0001_0300, 3, 4],
        })
    }
}

/// Shader provider that always fails.
pub struct BrokenShaders;

impl ShaderProvider for BrokenShaders {
    fn compile(&self) -> Result<CompiledShaders, ShaderCompileError> {
        Err(ShaderCompileError::Parse {
            stage: "vertex",
            diagnostic: "error: expected ';'".to_string(),
        })
    }
}

// ============================================================================
// Mesh builders
// ============================================================================

fn float_bytes(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// A unit quad: positions and normals are 48 bytes each, texcoords 32,
/// colors 64 and the six 16-bit indices 12.
pub fn quad_mesh() -> MeshData {
    let positions = float_bytes(&[
        -0.5, -0.5, 0.0, //
        0.5, -0.5, 0.0, //
        0.5, 0.5, 0.0, //
        -0.5, 0.5, 0.0,
    ]);
    let normals = float_bytes(&[
        0.0, 0.0, -1.0, //
        0.0, 0.0, -1.0, //
        0.0, 0.0, -1.0, //
        0.0, 0.0, -1.0,
    ]);
    let texcoords = float_bytes(&[
        0.0, 1.0, //
        1.0, 1.0, //
        1.0, 0.0, //
        0.0, 0.0,
    ]);
    let colors = float_bytes(&[
        1.0, 0.0, 0.0, 1.0, //
        0.0, 1.0, 0.0, 1.0, //
        0.0, 0.0, 1.0, 1.0, //
        1.0, 1.0, 1.0, 1.0,
    ]);

    MeshData::new(
        vec![
            AttributeStream::packed(AttributeSemantic::Position, AttributeFormat::Float3, positions),
            AttributeStream::packed(AttributeSemantic::Normal, AttributeFormat::Float3, normals),
            AttributeStream::packed(AttributeSemantic::TexCoord, AttributeFormat::Float2, texcoords),
            AttributeStream::packed(AttributeSemantic::Color, AttributeFormat::Float4, colors),
        ],
        IndexStream::from_u16(&[0, 1, 2, 2, 3, 0]),
    )
}

/// Minimal glTF JSON with an asset header and no meshes.
pub const EMPTY_SCENE_GLTF: &str = r#"{"asset":{"version":"2.0"}}"#;

/// Floats of one interleaved vertex: position, normal, texcoord, color.
pub type InterleavedVertex = [f32; 12];

/// The quad of [`quad_mesh`] as a binary glTF whose four attributes share
/// one 48-byte interleaved view. Indices follow in their own view.
pub fn interleaved_quad_glb() -> (Vec<u8>, Vec<InterleavedVertex>) {
    let vertices: Vec<InterleavedVertex> = vec![
        [-0.5, -0.5, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0],
        [0.5, -0.5, 0.0, 0.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0],
        [0.5, 0.5, 0.0, 0.0, 0.0, -1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0],
        [-0.5, 0.5, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
    ];
    let mut bin: Vec<u8> = bytemuck::cast_slice(&vertices).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice::<u16, u8>(&[0, 1, 2, 2, 3, 0]));

    let json = r#"{
        "asset": {"version": "2.0"},
        "buffers": [{"byteLength": 204}],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 192, "byteStride": 48, "target": 34962},
            {"buffer": 0, "byteOffset": 192, "byteLength": 12, "target": 34963}
        ],
        "accessors": [
            {"bufferView": 0, "byteOffset": 0, "componentType": 5126, "count": 4, "type": "VEC3",
             "min": [-0.5, -0.5, 0.0], "max": [0.5, 0.5, 0.0]},
            {"bufferView": 0, "byteOffset": 12, "componentType": 5126, "count": 4, "type": "VEC3"},
            {"bufferView": 0, "byteOffset": 24, "componentType": 5126, "count": 4, "type": "VEC2"},
            {"bufferView": 0, "byteOffset": 32, "componentType": 5126, "count": 4, "type": "VEC4"},
            {"bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR"}
        ],
        "meshes": [{"name": "quad", "primitives": [
            {"attributes": {"POSITION": 0, "NORMAL": 1, "TEXCOORD_0": 2, "COLOR_0": 3},
             "indices": 4}
        ]}]
    }"#;
    (glb(json, &bin), vertices)
}

/// Wrap a JSON chunk and a binary chunk in a GLB container.
fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}
