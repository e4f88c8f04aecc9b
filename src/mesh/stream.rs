//! Source streams of a parsed mesh.
//!
//! A [`MeshData`] is what the asset provider hands to the renderer: one
//! [`AttributeStream`] per semantic role the pipeline consumes plus a single
//! [`IndexStream`]. Streams are immutable once read from the asset; the
//! renderer only ever reads their bytes.

/// Semantic role of a per-vertex attribute stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    /// Vertex position (typically float3).
    Position,
    /// Vertex normal (typically float3).
    Normal,
    /// First texture coordinate set (typically float2).
    TexCoord,
    /// First vertex color set (typically float4).
    Color,
}

impl AttributeSemantic {
    /// The glTF attribute name this semantic is read from.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Position => "POSITION",
            Self::Normal => "NORMAL",
            Self::TexCoord => "TEXCOORD_0",
            Self::Color => "COLOR_0",
        }
    }
}

impl std::fmt::Display for AttributeSemantic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Element format of an attribute stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    /// Single 32-bit float.
    Float,
    /// Two 32-bit floats.
    Float2,
    /// Three 32-bit floats.
    Float3,
    /// Four 32-bit floats.
    Float4,
    /// Four 8-bit unsigned integers (normalized to 0.0-1.0).
    Unorm8x4,
    /// Four 16-bit unsigned integers (normalized to 0.0-1.0).
    Unorm16x4,
}

impl AttributeFormat {
    /// Size in bytes of one element.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Unorm8x4 => 4,
            Self::Unorm16x4 => 8,
        }
    }
}

/// Width of one index element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    #[default]
    Uint16,
    /// 32-bit unsigned indices.
    Uint32,
}

impl IndexFormat {
    /// Size in bytes of one index.
    pub fn size(&self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// One per-vertex data channel as it sits in the source asset.
///
/// `stride` is the accessor's byte stride, which may exceed the element size
/// when the source data is interleaved or padded. The byte span starts at
/// the first element and ends after the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeStream {
    semantic: AttributeSemantic,
    format: AttributeFormat,
    data: Vec<u8>,
    stride: u32,
    count: u32,
}

impl AttributeStream {
    /// Create a stream from raw bytes.
    pub fn new(
        semantic: AttributeSemantic,
        format: AttributeFormat,
        data: Vec<u8>,
        stride: u32,
        count: u32,
    ) -> Self {
        Self {
            semantic,
            format,
            data,
            stride,
            count,
        }
    }

    /// Create a tightly packed stream: stride equals the element size.
    pub fn packed(semantic: AttributeSemantic, format: AttributeFormat, data: Vec<u8>) -> Self {
        let stride = format.size();
        let count = (data.len() / stride as usize) as u32;
        Self::new(semantic, format, data, stride, count)
    }

    pub fn semantic(&self) -> AttributeSemantic {
        self.semantic
    }

    pub fn format(&self) -> AttributeFormat {
        self.format
    }

    /// The source bytes of this stream.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Byte stride between consecutive elements in [`bytes`](Self::bytes).
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of elements (vertices).
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Length of the byte span.
    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// The index channel of a mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStream {
    data: Vec<u8>,
    count: u32,
    format: IndexFormat,
}

impl IndexStream {
    /// Create an index stream from raw little-endian bytes.
    pub fn new(data: Vec<u8>, count: u32, format: IndexFormat) -> Self {
        Self {
            data,
            count,
            format,
        }
    }

    /// Create a 16-bit index stream from index values.
    pub fn from_u16(indices: &[u16]) -> Self {
        Self::new(
            bytemuck::cast_slice(indices).to_vec(),
            indices.len() as u32,
            IndexFormat::Uint16,
        )
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of indices.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A single parsed mesh: attribute streams in pipeline binding order plus
/// one index stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshData {
    pub attributes: Vec<AttributeStream>,
    pub indices: IndexStream,
}

impl MeshData {
    pub fn new(attributes: Vec<AttributeStream>, indices: IndexStream) -> Self {
        Self {
            attributes,
            indices,
        }
    }

    /// Number of vertices, taken from the first attribute stream.
    pub fn vertex_count(&self) -> u32 {
        self.attributes.first().map(|a| a.count()).unwrap_or(0)
    }
}
