//! Conversions from mesh formats to Vulkan enums

use crate::mesh::{AttributeFormat, IndexFormat};
use ash::vk;

pub fn vertex_format(format: AttributeFormat) -> vk::Format {
    match format {
        AttributeFormat::Float => vk::Format::R32_SFLOAT,
        AttributeFormat::Float2 => vk::Format::R32G32_SFLOAT,
        AttributeFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
        AttributeFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        AttributeFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
        AttributeFormat::Unorm16x4 => vk::Format::R16G16B16A16_UNORM,
    }
}

pub fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_attribute_formats() {
        assert_eq!(vertex_format(AttributeFormat::Float3), vk::Format::R32G32B32_SFLOAT);
        assert_eq!(vertex_format(AttributeFormat::Float2), vk::Format::R32G32_SFLOAT);
        assert_eq!(vertex_format(AttributeFormat::Float4), vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(index_type(IndexFormat::Uint16), vk::IndexType::UINT16);
    }
}
