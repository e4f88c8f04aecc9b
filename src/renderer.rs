//! Renderer lifecycle: initialize, render frames, shut down.

use ash::vk;

use crate::asset::AssetProvider;
use crate::backend::{DrawIndexed, GpuDevice};
use crate::camera::{self, CameraProvider};
use crate::config::RendererConfig;
use crate::error::{DeviceError, RendererError, SurfaceStateError};
use crate::frame::{FrameInputs, FrameRenderer, FrameResourceSet, FrameState};
use crate::mesh::{BufferLayoutPlan, BufferResources};
use crate::pipeline::{self, PipelineResources, PipelineStateBuilder};
use crate::shader::ShaderProvider;
use crate::surface::{DeviceProvider, FrameHost};

/// Result of one [`Renderer::render_frame`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The indexed draw was recorded.
    Drawn(DrawIndexed),
    /// The surface could not provide a frame; nothing was recorded.
    Skipped(SurfaceStateError),
}

/// Every GPU object the renderer creates.
#[derive(Debug)]
struct GpuResources {
    buffers: BufferResources,
    set_layout: vk::DescriptorSetLayout,
    frames: FrameResourceSet,
    pipeline: PipelineResources,
}

impl GpuResources {
    fn destroy<D: GpuDevice + ?Sized>(self, device: &D) {
        self.pipeline.destroy(device);
        self.frames.destroy(device);
        device.destroy_descriptor_set_layout(self.set_layout);
        self.buffers.destroy(device);
    }
}

/// Tracks consecutive skipped frames so a persistent surface problem is
/// warned about once instead of every frame.
#[derive(Debug, Default)]
struct SkipTracker {
    reason: Option<SurfaceStateError>,
    count: u64,
}

impl SkipTracker {
    /// Record a skip. Returns true when `reason` starts a new run.
    fn skipped(&mut self, reason: &SurfaceStateError) -> bool {
        self.count += 1;
        if self.reason.as_ref() == Some(reason) {
            return false;
        }
        self.reason = Some(reason.clone());
        self.count = 1;
        true
    }

    /// Record a drawn frame. Returns the length of the run that just ended.
    fn drawn(&mut self) -> Option<(SurfaceStateError, u64)> {
        let reason = self.reason.take()?;
        let count = std::mem::take(&mut self.count);
        Some((reason, count))
    }
}

/// Warns when a renderer goes away without [`Renderer::shutdown`].
#[derive(Debug)]
struct LeakCheck {
    armed: bool,
}

impl Drop for LeakCheck {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        // The device may already be gone, so nothing is released here.
        log::warn!(
            "Renderer dropped without shutdown(). GPU resources have leaked. \
             Always call shutdown() before destroying the device."
        );
    }
}

/// Draws one mesh with a fixed pipeline into a [`DeviceProvider`]'s frames.
///
/// The renderer never owns the device. The host keeps the surface alive
/// until [`Renderer::shutdown`] has returned.
pub struct Renderer {
    config: RendererConfig,
    camera: Box<dyn CameraProvider>,
    frame: FrameRenderer,
    resources: GpuResources,
    skips: SkipTracker,
    leak_check: LeakCheck,
}

impl Renderer {
    /// Load the mesh, compile shaders and create every GPU resource.
    ///
    /// Asset and shader failures happen before the device is touched. Later
    /// failures release whatever was already created, newest first, before
    /// the error is returned.
    pub fn initialize<S: DeviceProvider>(
        surface: &S,
        assets: &dyn AssetProvider,
        shaders: &dyn ShaderProvider,
        camera: Box<dyn CameraProvider>,
        config: RendererConfig,
    ) -> Result<Self, RendererError> {
        let mesh = assets.load_mesh(&config.attributes, config.index_format)?;
        let compiled = shaders.compile()?;
        log::info!(
            "Shaders ready: vertex {} bytes, fragment {} bytes",
            compiled.vertex_byte_len(),
            compiled.fragment_byte_len()
        );

        let plan = BufferLayoutPlan::new(&mesh, &config)?;
        plan.log_report(&mesh);
        let state = PipelineStateBuilder::for_mesh(&mesh).build();

        log::debug!("Initializing on physical device {:?}", surface.physical_device());
        let device = surface.device();

        let buffers = BufferResources::upload(device, &mesh, plan)?;

        let set_layout = match pipeline::create_uniform_set_layout(device) {
            Ok(layout) => layout,
            Err(e) => {
                buffers.destroy(device);
                return Err(e.into());
            }
        };

        let frames =
            match FrameResourceSet::new(device, surface.swapchain_image_count(), set_layout) {
                Ok(frames) => frames,
                Err(e) => {
                    device.destroy_descriptor_set_layout(set_layout);
                    buffers.destroy(device);
                    return Err(e.into());
                }
            };

        let pipeline = match PipelineResources::create(
            device,
            &compiled,
            &state,
            set_layout,
            surface.render_pass(),
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                frames.destroy(device);
                device.destroy_descriptor_set_layout(set_layout);
                buffers.destroy(device);
                return Err(e.into());
            }
        };

        log::info!(
            "Renderer initialized: {} indices, {} swapchain images",
            buffers.index_count(),
            frames.image_count()
        );

        let initial_view = camera::initial_view(&config);
        Ok(Self {
            config,
            camera,
            frame: FrameRenderer::new(initial_view),
            resources: GpuResources {
                buffers,
                set_layout,
                frames,
                pipeline,
            },
            skips: SkipTracker::default(),
            leak_check: LeakCheck { armed: true },
        })
    }

    /// Record the mesh draw into the surface's current command buffer.
    ///
    /// A surface that cannot provide a frame yields
    /// [`FrameOutcome::Skipped`]; every other error is fatal.
    pub fn render_frame<S: DeviceProvider>(
        &mut self,
        surface: &S,
    ) -> Result<FrameOutcome, RendererError> {
        let inputs = FrameInputs {
            buffers: &self.resources.buffers,
            pipeline: &self.resources.pipeline,
            frames: &self.resources.frames,
            config: &self.config,
        };

        match self
            .frame
            .render_frame(surface, &inputs, self.camera.as_mut())
        {
            Ok(draw) => {
                if let Some((reason, count)) = self.skips.drawn() {
                    log::info!("Drawing again after {} skipped frames ({})", count, reason);
                }
                Ok(FrameOutcome::Drawn(draw))
            }
            Err(RendererError::SurfaceState(e)) => {
                if self.skips.skipped(&e) {
                    log::warn!("Skipping frames: {}", e);
                } else {
                    log::trace!("Skipping frame: {}", e);
                }
                Ok(FrameOutcome::Skipped(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Run one whole frame on a host: acquire, record, submit and present.
    ///
    /// Returns `None` when the host could not acquire an image. A frame that
    /// was acquired is always ended, even when recording was skipped, so its
    /// render pass is closed and the clear still reaches the screen. Failing
    /// to end the frame is fatal.
    pub fn present_frame<H: FrameHost>(
        &mut self,
        host: &mut H,
        clear_color: [f32; 4],
        clear_depth: f32,
    ) -> Result<Option<FrameOutcome>, RendererError> {
        if let Err(e) = host.begin_frame(clear_color, clear_depth) {
            log::trace!("No frame this tick: {}", e);
            return Ok(None);
        }

        let outcome = self.render_frame(&*host);
        let ended = host.end_frame();

        let outcome = outcome?;
        ended?;
        Ok(Some(outcome))
    }

    /// Wait for the device to go idle, then destroy every resource.
    ///
    /// If the wait fails nothing is destroyed and the resources leak.
    pub fn shutdown<S: DeviceProvider>(self, surface: &S) -> Result<(), RendererError> {
        let device = surface.device();
        device.wait_idle().map_err(DeviceError::WaitIdle)?;

        let Self {
            resources,
            mut leak_check,
            ..
        } = self;
        resources.destroy(device);
        leak_check.armed = false;

        log::info!("Renderer shut down");
        Ok(())
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame.state()
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.resources.pipeline.pipeline()
    }

    pub fn buffers(&self) -> &BufferResources {
        &self.resources.buffers
    }

    pub fn frame_resources(&self) -> &FrameResourceSet {
        &self.resources.frames
    }
}
