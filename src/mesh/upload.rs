//! Upload of mesh streams into the unified buffer.

use crate::backend::{conversion, BufferDesc, DeviceBuffer, GpuDevice};
use crate::error::AllocationError;
use crate::memory::MappedMemory;
use crate::mesh::{BufferLayoutPlan, MeshData};
use ash::vk;

/// The unified vertex/index buffer and where each stream sits in it.
#[derive(Debug)]
pub struct BufferResources {
    buffer: DeviceBuffer,
    plan: BufferLayoutPlan,
    index_count: u32,
    index_type: vk::IndexType,
}

impl BufferResources {
    /// Allocate one host-visible buffer sized to `plan` and copy every
    /// stream of `mesh` into its region.
    ///
    /// Each region is mapped, written and unmapped on its own. If any copy
    /// fails, the buffer is destroyed before the error is returned.
    pub fn upload<D: GpuDevice + ?Sized>(
        device: &D,
        mesh: &MeshData,
        plan: BufferLayoutPlan,
    ) -> Result<Self, AllocationError> {
        let buffer = device.create_buffer(&BufferDesc {
            label: "mesh",
            size: plan.total_size(),
            usage: vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER,
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        })?;

        if let Err(err) = Self::copy_streams(device, &buffer, mesh, &plan) {
            log::error!("Mesh upload failed, releasing buffer: {}", err);
            device.destroy_buffer(buffer);
            return Err(err);
        }

        log::debug!(
            "Uploaded mesh: {} vertices, {} indices, {} bytes",
            mesh.vertex_count(),
            mesh.indices.count(),
            plan.total_size()
        );

        Ok(Self {
            buffer,
            index_count: mesh.indices.count(),
            index_type: conversion::index_type(mesh.indices.format()),
            plan,
        })
    }

    fn copy_streams<D: GpuDevice + ?Sized>(
        device: &D,
        buffer: &DeviceBuffer,
        mesh: &MeshData,
        plan: &BufferLayoutPlan,
    ) -> Result<(), AllocationError> {
        let sources = mesh
            .attributes
            .iter()
            .map(|stream| stream.bytes())
            .chain(std::iter::once(mesh.indices.bytes()));
        let regions = plan
            .attributes()
            .iter()
            .copied()
            .chain(std::iter::once(plan.index()));

        for (bytes, region) in sources.zip(regions) {
            let mut mapped = MappedMemory::new(device, buffer.memory, region.offset, region.size)?;
            mapped.write(bytes)?;
        }
        Ok(())
    }

    /// The buffer every attribute and the index binding view into.
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    pub fn plan(&self) -> &BufferLayoutPlan {
        &self.plan
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_type(&self) -> vk::IndexType {
        self.index_type
    }

    /// Bind every attribute region as its own vertex binding and the index
    /// region as the index source.
    pub fn bind<D: GpuDevice + ?Sized>(&self, device: &D, cmd: vk::CommandBuffer) {
        let offsets = self.plan.attribute_offsets();
        let buffers = vec![self.buffer.buffer; offsets.len()];
        device.cmd_bind_vertex_buffers(cmd, 0, &buffers, &offsets);
        device.cmd_bind_index_buffer(cmd, self.buffer.buffer, self.plan.index().offset, self.index_type);
    }

    /// Destroy the buffer and its memory. The device must be idle.
    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &D) {
        log::debug!("Destroying mesh buffer {:?}", self.buffer.buffer);
        device.destroy_buffer(self.buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{Command, DeviceEvent, DummyDevice, FailurePoint};
    use crate::config::RendererConfig;
    use crate::mesh::{AttributeFormat, AttributeSemantic, AttributeStream, IndexStream};

    fn quad() -> MeshData {
        let fill = |len: usize, seed: u8| (0..len).map(|i| seed.wrapping_add(i as u8)).collect::<Vec<_>>();
        MeshData::new(
            vec![
                AttributeStream::packed(AttributeSemantic::Position, AttributeFormat::Float3, fill(48, 0)),
                AttributeStream::packed(AttributeSemantic::Normal, AttributeFormat::Float3, fill(48, 60)),
                AttributeStream::packed(AttributeSemantic::TexCoord, AttributeFormat::Float2, fill(32, 120)),
                AttributeStream::packed(AttributeSemantic::Color, AttributeFormat::Float4, fill(64, 180)),
            ],
            IndexStream::from_u16(&[0, 1, 2, 2, 3, 0]),
        )
    }

    #[test]
    fn test_buffer_mirrors_streams() {
        let device = DummyDevice::new();
        let mesh = quad();
        let plan = BufferLayoutPlan::new(&mesh, &RendererConfig::default()).unwrap();
        let resources = BufferResources::upload(&device, &mesh, plan).unwrap();

        let contents = device.buffer_contents(resources.buffer()).unwrap();
        assert_eq!(contents.len(), 204);

        let mut expected = Vec::new();
        for stream in &mesh.attributes {
            expected.extend_from_slice(stream.bytes());
        }
        expected.extend_from_slice(mesh.indices.bytes());
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_buffer_usage_and_visibility() {
        let device = DummyDevice::new();
        let mesh = quad();
        let plan = BufferLayoutPlan::new(&mesh, &RendererConfig::default()).unwrap();
        let resources = BufferResources::upload(&device, &mesh, plan).unwrap();

        let record = device.buffer_record(resources.buffer()).unwrap();
        assert_eq!(record.size, 204);
        assert!(record.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(record.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert!(record
            .memory_properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT));
    }

    #[test]
    fn test_one_scoped_map_per_region() {
        let device = DummyDevice::new();
        let mesh = quad();
        let plan = BufferLayoutPlan::new(&mesh, &RendererConfig::default()).unwrap();
        let resources = BufferResources::upload(&device, &mesh, plan).unwrap();

        let maps: Vec<_> = device
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::Mapped { offset, size, .. } => Some((offset, size)),
                _ => None,
            })
            .collect();
        assert_eq!(maps, vec![(0, 48), (48, 48), (96, 32), (128, 64), (192, 12)]);
        assert_eq!(device.map_count(), device.unmap_count());
        assert_eq!(resources.index_count(), 6);
        assert_eq!(resources.index_type(), vk::IndexType::UINT16);
    }

    #[test]
    fn test_failed_copy_releases_buffer() {
        let device = DummyDevice::new();
        let mesh = quad();
        let plan = BufferLayoutPlan::new(&mesh, &RendererConfig::default()).unwrap();
        device.fail_map_after(2);

        let err = BufferResources::upload(&device, &mesh, plan).unwrap_err();
        assert!(matches!(err, AllocationError::Map { offset: 96, size: 32, .. }));
        assert!(device.live_resources().is_empty());
        assert_eq!(device.map_count(), device.unmap_count());
    }

    #[test]
    fn test_allocation_failure() {
        let device = DummyDevice::new();
        let mesh = quad();
        let plan = BufferLayoutPlan::new(&mesh, &RendererConfig::default()).unwrap();
        device.fail_on(FailurePoint::CreateBuffer);

        assert!(BufferResources::upload(&device, &mesh, plan).is_err());
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_bind_uses_planned_offsets() {
        let device = DummyDevice::new();
        let mesh = quad();
        let plan = BufferLayoutPlan::new(&mesh, &RendererConfig::default()).unwrap();
        let resources = BufferResources::upload(&device, &mesh, plan).unwrap();
        let cmd = vk::Handle::from_raw(77);

        resources.bind(&device, cmd);

        let buffer = resources.buffer();
        assert_eq!(
            device.commands(cmd),
            vec![
                Command::BindVertexBuffers {
                    first_binding: 0,
                    buffers: vec![buffer; 4],
                    offsets: vec![0, 48, 96, 128],
                },
                Command::BindIndexBuffer {
                    buffer,
                    offset: 192,
                    index_type: vk::IndexType::UINT16,
                },
            ]
        );
    }
}
