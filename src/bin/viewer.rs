//! Mesh viewer binary
//!
//! Opens a window, loads a glTF model and draws it with the free-look camera.
//!
//! Controls:
//! - WASD: move
//! - E/Space, Q/Ctrl: up, down
//! - Shift: sprint
//! - Right mouse: look around
//! - Escape: exit

use std::path::{Path, PathBuf};

use clap::Parser;
use mesh_viewer::camera::SharedCameraInput;
use mesh_viewer::{
    FrameOutcome, FreeLookCamera, GltfAsset, Renderer, RendererConfig, RendererError,
    ShaderProvider, SpirvShaders, SurfaceDesc, VulkanSurface, WgslShaders,
};
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowBuilder};

const CLEAR_COLOR: [f32; 4] = [0.529, 0.0, 0.016, 1.0];
const CLEAR_DEPTH: f32 = 1.0;

/// Single-mesh glTF viewer.
#[derive(Parser, Debug)]
#[command(name = "viewer", version, about)]
struct Args {
    /// glTF (.gltf or .glb) file to display.
    #[arg(long)]
    model: PathBuf,

    /// Vertex shader, WGSL source or precompiled .spv. Defaults to the
    /// built-in shader.
    #[arg(long, requires = "fragment_shader")]
    vertex_shader: Option<PathBuf>,

    /// Fragment shader, WGSL source or precompiled .spv.
    #[arg(long, requires = "vertex_shader")]
    fragment_shader: Option<PathBuf>,

    /// Initial window width in pixels.
    #[arg(long, default_value = "800")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "600")]
    height: u32,

    /// Enable Vulkan validation layers.
    #[arg(long)]
    validation: bool,
}

fn is_spirv(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("spv"))
        .unwrap_or(false)
}

fn shader_provider(args: &Args) -> Result<Box<dyn ShaderProvider>, RendererError> {
    match (&args.vertex_shader, &args.fragment_shader) {
        (Some(vertex), Some(fragment)) if is_spirv(vertex) && is_spirv(fragment) => {
            Ok(Box::new(SpirvShaders::new(vertex, fragment)))
        }
        (Some(vertex), Some(fragment)) => Ok(Box::new(WgslShaders::from_files(vertex, fragment)?)),
        _ => Ok(Box::new(WgslShaders::builtin())),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let assets = GltfAsset::open(&args.model);
    let shaders = shader_provider(&args)?;

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(format!("Mesh Viewer - {}", args.model.display()))
        .with_inner_size(PhysicalSize::new(args.width, args.height))
        .build(&event_loop)?;

    let surface = VulkanSurface::new(
        &window,
        &SurfaceDesc {
            validation: args.validation,
            ..Default::default()
        },
    )?;

    let camera = FreeLookCamera::new();
    let input = camera.input();
    let renderer = Renderer::initialize(
        &surface,
        &assets,
        shaders.as_ref(),
        Box::new(camera),
        RendererConfig::default(),
    )?;

    let mut app = ViewerState {
        surface: Some(surface),
        renderer: Some(renderer),
        input,
        cursor_grabbed: false,
        failed: false,
    };

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, .. } => {
                if !app.handle_window_event(&event, &window) {
                    elwt.exit();
                }
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                let mut input = app.input.lock();
                if input.mouse_look_active {
                    input.mouse_delta.x += delta.0 as f32;
                    input.mouse_delta.y += delta.1 as f32;
                }
            }
            Event::AboutToWait => window.request_redraw(),
            Event::LoopExiting => app.shutdown(),
            _ => {}
        }
    })?;

    Ok(())
}

struct ViewerState {
    surface: Option<VulkanSurface>,
    renderer: Option<Renderer>,
    input: SharedCameraInput,
    cursor_grabbed: bool,
    failed: bool,
}

impl ViewerState {
    /// Returns false when the viewer should exit.
    fn handle_window_event(&mut self, event: &WindowEvent, window: &Window) -> bool {
        match event {
            WindowEvent::CloseRequested => return false,
            WindowEvent::Resized(size) => {
                if let Some(surface) = &mut self.surface {
                    surface.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.draw_frame() {
                    log::error!("Rendering failed: {}", e);
                    self.failed = true;
                    return false;
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                if let PhysicalKey::Code(key) = event.physical_key {
                    let mut input = self.input.lock();
                    match key {
                        KeyCode::Escape => return false,
                        KeyCode::KeyW => input.forward = pressed,
                        KeyCode::KeyS => input.backward = pressed,
                        KeyCode::KeyA => input.left = pressed,
                        KeyCode::KeyD => input.right = pressed,
                        KeyCode::KeyQ | KeyCode::ControlLeft => input.down = pressed,
                        KeyCode::KeyE | KeyCode::Space => input.up = pressed,
                        KeyCode::ShiftLeft | KeyCode::ShiftRight => input.sprint = pressed,
                        _ => {}
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } if *button == MouseButton::Right => {
                let pressed = *state == ElementState::Pressed;
                self.input.lock().mouse_look_active = pressed;
                self.grab_cursor(window, pressed);
            }
            WindowEvent::Focused(false) => {
                *self.input.lock() = Default::default();
                self.grab_cursor(window, false);
            }
            _ => {}
        }
        true
    }

    fn grab_cursor(&mut self, window: &Window, grab: bool) {
        if grab == self.cursor_grabbed {
            return;
        }
        let mode = if grab {
            CursorGrabMode::Confined
        } else {
            CursorGrabMode::None
        };
        if let Err(e) = window.set_cursor_grab(mode) {
            log::debug!("Cursor grab not supported: {}", e);
        }
        window.set_cursor_visible(!grab);
        self.cursor_grabbed = grab;
    }

    fn draw_frame(&mut self) -> Result<(), RendererError> {
        let (Some(surface), Some(renderer)) = (&mut self.surface, &mut self.renderer) else {
            return Ok(());
        };

        if let Some(FrameOutcome::Skipped(reason)) =
            renderer.present_frame(surface, CLEAR_COLOR, CLEAR_DEPTH)?
        {
            log::debug!("Frame skipped: {}", reason);
        }
        Ok(())
    }

    /// Shut the renderer down, then release the surface.
    fn shutdown(&mut self) {
        if let (Some(renderer), Some(surface)) = (self.renderer.take(), &self.surface) {
            if let Err(e) = renderer.shutdown(surface) {
                log::error!("Renderer shutdown failed: {}", e);
            }
        }
        self.surface = None;

        if self.failed {
            std::process::exit(1);
        }
    }
}
