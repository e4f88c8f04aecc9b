//! Asset providers
//!
//! An asset provider turns a scene file into a single [`MeshData`]: one
//! attribute stream per requested semantic plus the index stream.

pub mod gltf;

pub use self::gltf::GltfAsset;

use crate::error::AssetLoadError;
use crate::mesh::{AttributeSemantic, IndexFormat, MeshData};

/// Source of the mesh the renderer draws.
pub trait AssetProvider {
    /// Load the first mesh, with streams in the order of `attributes` and
    /// indices converted to `index_format`.
    fn load_mesh(
        &self,
        attributes: &[AttributeSemantic],
        index_format: IndexFormat,
    ) -> Result<MeshData, AssetLoadError>;
}
