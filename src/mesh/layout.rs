//! Byte layout of the unified vertex/index buffer.
//!
//! Attribute regions are laid out in pipeline binding order, followed by the
//! index region. With a region alignment of 1 the regions are packed back to
//! back: `offset[0] == 0`, `offset[i + 1] == offset[i] + size[i]` and the
//! index region starts at the sum of all attribute sizes.

use crate::config::RendererConfig;
use crate::error::LayoutError;
use crate::mesh::MeshData;

/// One contiguous byte range inside the unified buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRegion {
    pub offset: u64,
    pub size: u64,
}

impl BufferRegion {
    /// First byte past the region.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Where every stream of a mesh lives in the unified buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayoutPlan {
    attributes: Vec<BufferRegion>,
    index: BufferRegion,
    total_size: u64,
}

impl BufferLayoutPlan {
    /// Plan the buffer for `mesh` against the configured attribute set.
    pub fn new(mesh: &MeshData, config: &RendererConfig) -> Result<Self, LayoutError> {
        let alignment = config.region_alignment;
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(LayoutError::InvalidAlignment(alignment));
        }

        if mesh.attributes.len() != config.attributes.len() {
            return Err(LayoutError::AttributeCountMismatch {
                expected: config.attributes.len(),
                actual: mesh.attributes.len(),
            });
        }

        let mut running = 0u64;
        let mut attributes = Vec::with_capacity(mesh.attributes.len());
        for (index, (stream, expected)) in mesh.attributes.iter().zip(&config.attributes).enumerate() {
            if stream.semantic() != *expected {
                return Err(LayoutError::SemanticMismatch {
                    index,
                    expected: expected.name(),
                    actual: stream.semantic().name(),
                });
            }
            if stream.byte_len() == 0 {
                return Err(LayoutError::EmptyAttribute {
                    index,
                    semantic: stream.semantic().name(),
                });
            }

            let offset = align_up(running, alignment);
            attributes.push(BufferRegion {
                offset,
                size: stream.byte_len(),
            });
            running = offset + stream.byte_len();
        }

        let indices = &mesh.indices;
        if indices.byte_len() == 0 {
            return Err(LayoutError::EmptyIndices);
        }
        if indices.format() != config.index_format {
            return Err(LayoutError::IndexWidthMismatch {
                expected: config.index_format.size(),
                actual: indices.format().size(),
            });
        }

        let index_offset = align_up(running, alignment);
        let width = indices.format().size();
        if index_offset % width != 0 {
            return Err(LayoutError::MisalignedIndexRegion {
                offset: index_offset,
                width,
            });
        }

        let index = BufferRegion {
            offset: index_offset,
            size: indices.byte_len(),
        };

        Ok(Self {
            attributes,
            total_size: index.end(),
            index,
        })
    }

    /// Region of attribute stream `i`.
    pub fn attribute(&self, i: usize) -> Option<BufferRegion> {
        self.attributes.get(i).copied()
    }

    /// Attribute regions in binding order.
    pub fn attributes(&self) -> &[BufferRegion] {
        &self.attributes
    }

    /// Per-binding byte offsets, as passed to the vertex buffer bind call.
    pub fn attribute_offsets(&self) -> Vec<u64> {
        self.attributes.iter().map(|r| r.offset).collect()
    }

    pub fn index(&self) -> BufferRegion {
        self.index
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Log the layout the way the viewer reports it at startup.
    pub fn log_report(&self, mesh: &MeshData) {
        log::info!("Total buffer size: {} bytes", self.total_size);
        for (stream, region) in mesh.attributes.iter().zip(&self.attributes) {
            log::info!(
                "  {}: offset {} size {} stride {}",
                stream.semantic(),
                region.offset,
                region.size,
                stream.stride()
            );
        }
        log::info!(
            "  indices: offset {} size {} count {}",
            self.index.offset,
            self.index.size,
            mesh.indices.count()
        );
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
