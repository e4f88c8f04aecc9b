//! Renderer configuration

use crate::mesh::{AttributeSemantic, IndexFormat};
use glam::Vec3;

/// Configuration for initializing the renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Attribute streams the pipeline consumes, in binding/location order
    pub attributes: Vec<AttributeSemantic>,
    /// Width of the index stream
    pub index_format: IndexFormat,
    /// Every region of the unified buffer starts at a multiple of this
    /// (must be a power of two; 1 packs regions back to back)
    pub region_alignment: u64,
    /// Initial camera position
    pub eye: Vec3,
    /// Point the initial camera looks at
    pub target: Vec3,
    /// Initial camera up vector
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            attributes: vec![
                AttributeSemantic::Position,
                AttributeSemantic::Normal,
                AttributeSemantic::TexCoord,
                AttributeSemantic::Color,
            ],
            index_format: IndexFormat::Uint16,
            region_alignment: 1,
            eye: Vec3::new(1.9, 1.0, -1.5),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 60.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}
