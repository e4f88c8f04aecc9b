//! Per-frame command recording.

use ash::vk;
use glam::Mat4;

use crate::backend::{DrawIndexed, GpuDevice};
use crate::camera::{self, CameraProvider};
use crate::config::RendererConfig;
use crate::error::{RendererError, SurfaceStateError};
use crate::frame::FrameResourceSet;
use crate::mesh::BufferResources;
use crate::pipeline::PipelineResources;
use crate::surface::DeviceProvider;

/// Where the renderer is within the current frame.
///
/// Acquisition and submission belong to the surface; the renderer walks
/// `Acquired -> Bound -> Drawn` and returns to `Idle` when a frame fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquired {
        image_index: u32,
        command_buffer: vk::CommandBuffer,
    },
    Bound {
        image_index: u32,
        command_buffer: vk::CommandBuffer,
    },
    Drawn {
        image_index: u32,
        command_buffer: vk::CommandBuffer,
    },
}

/// Everything a frame binds, borrowed from the renderer.
pub struct FrameInputs<'a> {
    pub buffers: &'a BufferResources,
    pub pipeline: &'a PipelineResources,
    pub frames: &'a FrameResourceSet,
    pub config: &'a RendererConfig,
}

/// Records the single indexed draw into the surface's current command buffer.
pub struct FrameRenderer {
    view: Mat4,
    state: FrameState,
}

impl FrameRenderer {
    pub fn new(initial_view: Mat4) -> Self {
        Self {
            view: initial_view,
            state: FrameState::Idle,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// The view matrix of the last recorded frame.
    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// Record one frame.
    ///
    /// Surface problems come back as [`RendererError::SurfaceState`] with no
    /// commands recorded.
    pub fn render_frame<S: DeviceProvider>(
        &mut self,
        surface: &S,
        inputs: &FrameInputs,
        camera: &mut dyn CameraProvider,
    ) -> Result<DrawIndexed, RendererError> {
        self.state = FrameState::Idle;

        let image_index = surface.swapchain_current_image()?;
        let command_buffer = surface.command_buffer(image_index)?;
        let (width, height) = (surface.client_width(), surface.client_height());
        if width == 0 || height == 0 {
            return Err(SurfaceStateError::ZeroExtent.into());
        }
        let descriptor_set = inputs.frames.descriptor_set(image_index)?;
        self.state = FrameState::Acquired {
            image_index,
            command_buffer,
        };

        let device = surface.device();
        Self::set_viewport(device, command_buffer, width, height);

        let view = camera.advance_view(self.view);
        let projection = camera::projection(inputs.config, surface.aspect_ratio());
        if let Err(e) = inputs
            .frames
            .update_for_image(device, image_index, view, projection)
        {
            self.state = FrameState::Idle;
            return Err(e);
        }
        self.view = view;

        device.cmd_bind_pipeline(command_buffer, inputs.pipeline.pipeline());
        device.cmd_bind_descriptor_set(command_buffer, inputs.pipeline.layout(), descriptor_set);
        inputs.buffers.bind(device, command_buffer);
        self.state = FrameState::Bound {
            image_index,
            command_buffer,
        };

        let draw = DrawIndexed {
            index_count: inputs.buffers.index_count(),
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        };
        device.cmd_draw_indexed(command_buffer, draw);
        self.state = FrameState::Drawn {
            image_index,
            command_buffer,
        };

        log::trace!(
            "Recorded frame for image {} ({}x{}, {} indices)",
            image_index,
            width,
            height,
            draw.index_count
        );
        Ok(draw)
    }

    fn set_viewport<D: GpuDevice + ?Sized>(
        device: &D,
        cmd: vk::CommandBuffer,
        width: u32,
        height: u32,
    ) {
        device.cmd_set_viewport(
            cmd,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        device.cmd_set_scissor(
            cmd,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width, height },
            },
        );
    }
}
