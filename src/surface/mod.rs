//! Window surface and device provider
//!
//! The renderer never owns the device, the swapchain or the command buffers.
//! It reaches them through [`DeviceProvider`], which the window host
//! implements. [`VulkanSurface`] is the real host; tests implement the trait
//! over [`DummyDevice`](crate::backend::DummyDevice).

pub mod vulkan;

pub use vulkan::{SurfaceDesc, VulkanSurface};

use ash::vk;

use crate::backend::GpuDevice;
use crate::error::{DeviceError, SurfaceStateError};

/// Access to the device, render target and per-image command buffers.
pub trait DeviceProvider {
    type Device: GpuDevice;

    /// The logical device all renderer resources are created on.
    fn device(&self) -> &Self::Device;

    fn physical_device(&self) -> vk::PhysicalDevice;

    /// Render pass the pipeline is compatible with.
    fn render_pass(&self) -> vk::RenderPass;

    fn swapchain_image_count(&self) -> u32;

    /// Index of the swapchain image currently being recorded.
    fn swapchain_current_image(&self) -> Result<u32, SurfaceStateError>;

    /// Command buffer recording into swapchain image `image_index`, already
    /// begun and inside the render pass.
    fn command_buffer(&self, image_index: u32) -> Result<vk::CommandBuffer, SurfaceStateError>;

    /// Width of the render area in pixels.
    fn client_width(&self) -> u32;

    /// Height of the render area in pixels.
    fn client_height(&self) -> u32;

    fn aspect_ratio(&self) -> f32 {
        let height = self.client_height().max(1);
        self.client_width() as f32 / height as f32
    }
}

/// A [`DeviceProvider`] that also drives acquisition and presentation.
pub trait FrameHost: DeviceProvider {
    /// Acquire the next image and open its render pass with the given
    /// clears. Errors are transient; the caller skips the frame.
    fn begin_frame(
        &mut self,
        clear_color: [f32; 4],
        clear_depth: f32,
    ) -> Result<u32, SurfaceStateError>;

    /// Close the render pass, submit and present the open frame. A no-op
    /// when no frame is open. Errors are fatal.
    fn end_frame(&mut self) -> Result<(), DeviceError>;
}
