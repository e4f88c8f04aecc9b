//! Scoped host mapping of device memory

use crate::backend::GpuDevice;
use crate::error::AllocationError;
use ash::vk;

/// A mapped byte range of a device memory allocation.
///
/// The range is mapped when the guard is created and unmapped when it is
/// dropped, on every path out of the scope. Memory is never left mapped
/// between uploads.
pub struct MappedMemory<'a, D: GpuDevice + ?Sized> {
    device: &'a D,
    memory: vk::DeviceMemory,
    ptr: *mut u8,
    len: usize,
}

impl<'a, D: GpuDevice + ?Sized> MappedMemory<'a, D> {
    /// Map `size` bytes of `memory` starting at `offset`.
    pub fn new(
        device: &'a D,
        memory: vk::DeviceMemory,
        offset: u64,
        size: u64,
    ) -> Result<Self, AllocationError> {
        let ptr = device
            .map_memory(memory, offset, size)
            .map_err(|result| AllocationError::Map {
                offset,
                size,
                result,
            })?;
        log::trace!("Mapped {} bytes at offset {} of {:?}", size, offset, memory);

        Ok(Self {
            device,
            memory,
            ptr,
            len: size as usize,
        })
    }

    /// Length of the mapped range in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `bytes` to the start of the mapped range.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), AllocationError> {
        if bytes.len() > self.len {
            return Err(AllocationError::CopyOverflow {
                source_len: bytes.len(),
                mapped_len: self.len,
            });
        }
        self.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// The mapped range as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // The device guarantees `len` bytes at `ptr` until unmap, and the
        // guard is the only path to them.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl<D: GpuDevice + ?Sized> Drop for MappedMemory<'_, D> {
    fn drop(&mut self) {
        self.device.unmap_memory(self.memory);
        log::trace!("Unmapped {:?}", self.memory);
    }
}
