//! Mesh data and its GPU-side buffer
//!
//! - [`stream`]: attribute and index streams as read from an asset
//! - [`layout`]: byte layout of the unified vertex/index buffer
//! - [`upload`]: allocation and upload of that buffer

pub mod layout;
pub mod stream;
pub mod upload;

pub use layout::{BufferLayoutPlan, BufferRegion};
pub use stream::{
    AttributeFormat, AttributeSemantic, AttributeStream, IndexFormat, IndexStream, MeshData,
};
pub use upload::BufferResources;
