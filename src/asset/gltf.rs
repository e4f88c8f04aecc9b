//! glTF 2.0 mesh loading.
//!
//! Reads the first primitive of the first mesh. Attribute streams keep the
//! source layout: the bytes start at the accessor's first element and keep
//! the buffer view's stride, so interleaved files upload as they are.
//! Indices are converted to the requested width.

use std::path::{Path, PathBuf};

use gltf_dep::accessor::{DataType, Dimensions};

use crate::asset::AssetProvider;
use crate::error::AssetLoadError;
use crate::mesh::{
    AttributeFormat, AttributeSemantic, AttributeStream, IndexFormat, IndexStream, MeshData,
};

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// A `.gltf` or `.glb` scene, on disk or in memory.
#[derive(Debug, Clone)]
pub struct GltfAsset {
    source: Source,
}

impl GltfAsset {
    /// Load from a file. External buffers resolve relative to its directory.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    /// Load from memory. Only embedded (GLB or data URI) buffers resolve.
    pub fn from_slice(data: impl Into<Vec<u8>>) -> Self {
        Self {
            source: Source::Bytes(data.into()),
        }
    }

    fn read(&self) -> Result<(Vec<u8>, Option<&Path>), AssetLoadError> {
        match &self.source {
            Source::File(path) => {
                let data = std::fs::read(path).map_err(|source| AssetLoadError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Ok((data, path.parent()))
            }
            Source::Bytes(data) => Ok((data.clone(), None)),
        }
    }
}

impl AssetProvider for GltfAsset {
    fn load_mesh(
        &self,
        attributes: &[AttributeSemantic],
        index_format: IndexFormat,
    ) -> Result<MeshData, AssetLoadError> {
        let (data, base) = self.read()?;
        let gltf = gltf_dep::Gltf::from_slice(&data)?;
        let buffers = gltf_dep::import_buffers(&gltf.document, base, gltf.blob.clone())
            .map_err(|e| AssetLoadError::Buffer(e.to_string()))?;

        let mesh = gltf.document.meshes().next().ok_or(AssetLoadError::NoMeshes)?;
        let primitive = mesh
            .primitives()
            .next()
            .ok_or(AssetLoadError::NoPrimitives { mesh: mesh.index() })?;

        if primitive.mode() != gltf_dep::mesh::Mode::Triangles {
            return Err(AssetLoadError::UnsupportedTopology(format!(
                "{:?}",
                primitive.mode()
            )));
        }

        let streams = attributes
            .iter()
            .map(|&semantic| {
                let accessor = primitive
                    .get(&gltf_semantic(semantic))
                    .ok_or(AssetLoadError::MissingAttribute {
                        semantic: semantic.name(),
                    })?;
                read_attribute(semantic, &accessor, &buffers)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let indices = read_indices(&primitive, &buffers, index_format)?;

        log::info!(
            "Loaded mesh {:?}: {} vertices, {} indices",
            mesh.name().unwrap_or("<unnamed>"),
            streams.first().map(|s| s.count()).unwrap_or(0),
            indices.count()
        );

        Ok(MeshData::new(streams, indices))
    }
}

fn gltf_semantic(semantic: AttributeSemantic) -> gltf_dep::Semantic {
    match semantic {
        AttributeSemantic::Position => gltf_dep::Semantic::Positions,
        AttributeSemantic::Normal => gltf_dep::Semantic::Normals,
        AttributeSemantic::TexCoord => gltf_dep::Semantic::TexCoords(0),
        AttributeSemantic::Color => gltf_dep::Semantic::Colors(0),
    }
}

/// Map an accessor's component type and shape to a vertex format.
fn attribute_format(
    semantic: AttributeSemantic,
    accessor: &gltf_dep::Accessor,
) -> Result<AttributeFormat, AssetLoadError> {
    let format = match (accessor.data_type(), accessor.dimensions(), accessor.normalized()) {
        (DataType::F32, Dimensions::Scalar, _) => AttributeFormat::Float,
        (DataType::F32, Dimensions::Vec2, _) => AttributeFormat::Float2,
        (DataType::F32, Dimensions::Vec3, _) => AttributeFormat::Float3,
        (DataType::F32, Dimensions::Vec4, _) => AttributeFormat::Float4,
        (DataType::U8, Dimensions::Vec4, true) => AttributeFormat::Unorm8x4,
        (DataType::U16, Dimensions::Vec4, true) => AttributeFormat::Unorm16x4,
        (data_type, dimensions, normalized) => {
            return Err(AssetLoadError::UnsupportedFormat {
                semantic: semantic.name(),
                detail: format!(
                    "{:?} {:?}{}",
                    data_type,
                    dimensions,
                    if normalized { " (normalized)" } else { "" }
                ),
            })
        }
    };
    Ok(format)
}

/// Copy the byte span of an attribute accessor, keeping the view stride.
fn read_attribute(
    semantic: AttributeSemantic,
    accessor: &gltf_dep::Accessor,
    buffers: &[gltf_dep::buffer::Data],
) -> Result<AttributeStream, AssetLoadError> {
    if accessor.sparse().is_some() {
        return Err(AssetLoadError::Accessor(format!(
            "accessor {} ({}) is sparse",
            accessor.index(),
            semantic
        )));
    }
    let format = attribute_format(semantic, accessor)?;

    let view = accessor.view().ok_or_else(|| {
        AssetLoadError::Accessor(format!(
            "accessor {} ({}) has no buffer view",
            accessor.index(),
            semantic
        ))
    })?;
    let buffer_index = view.buffer().index();
    let buffer_data = buffers.get(buffer_index).ok_or_else(|| {
        AssetLoadError::Buffer(format!("buffer index {} out of range", buffer_index))
    })?;

    let element_size = format.size() as usize;
    let stride = view.stride().unwrap_or(element_size);
    let count = accessor.count();
    let start = view.offset() + accessor.offset();
    let len = match count {
        0 => 0,
        n => (n - 1) * stride + element_size,
    };
    let end = start + len;

    let view_end = view.offset() + view.length();
    if end > view_end || end > buffer_data.len() {
        return Err(AssetLoadError::Buffer(format!(
            "{} accessor reads bytes {}..{} past the end of its view ({} bytes)",
            semantic, start, end, view_end
        )));
    }

    Ok(AttributeStream::new(
        semantic,
        format,
        buffer_data[start..end].to_vec(),
        stride as u32,
        count as u32,
    ))
}

fn read_indices(
    primitive: &gltf_dep::Primitive,
    buffers: &[gltf_dep::buffer::Data],
    index_format: IndexFormat,
) -> Result<IndexStream, AssetLoadError> {
    let accessor = primitive.indices().ok_or(AssetLoadError::MissingIndices)?;
    if accessor.dimensions() != Dimensions::Scalar {
        return Err(AssetLoadError::UnsupportedIndices(format!(
            "{:?} index accessor",
            accessor.dimensions()
        )));
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
    let values: Vec<u32> = reader
        .read_indices()
        .ok_or(AssetLoadError::MissingIndices)?
        .into_u32()
        .collect();

    let stream = match index_format {
        IndexFormat::Uint16 => {
            let narrowed = values
                .iter()
                .map(|&value| {
                    u16::try_from(value).map_err(|_| {
                        AssetLoadError::UnsupportedIndices(format!(
                            "index {} does not fit in 16 bits",
                            value
                        ))
                    })
                })
                .collect::<Result<Vec<u16>, _>>()?;
            IndexStream::from_u16(&narrowed)
        }
        IndexFormat::Uint32 => IndexStream::new(
            bytemuck::cast_slice(&values).to_vec(),
            values.len() as u32,
            IndexFormat::Uint32,
        ),
    };

    log::debug!(
        "Read {} indices ({:?} source, {:?} output)",
        stream.count(),
        accessor.data_type(),
        index_format
    );
    Ok(stream)
}
