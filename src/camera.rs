//! Camera providers
//!
//! The renderer owns the view matrix and hands it to a [`CameraProvider`]
//! once per frame to get the next one. Matrices are left-handed: +X right,
//! +Y up, +Z into the screen.
//!
//! - [`FixedCamera`]: never moves
//! - [`FreeLookCamera`]: WASD movement, mouse look while a button is held

use std::sync::Arc;
use std::time::Instant;

use glam::{Mat3, Mat4, Vec2, Vec3};
use parking_lot::Mutex;

use crate::config::RendererConfig;

/// Advances the view matrix once per frame.
pub trait CameraProvider {
    /// Return the view matrix for the next frame given the current one.
    fn advance_view(&mut self, current: Mat4) -> Mat4;
}

/// Initial view matrix from the configured eye, target and up vector.
pub fn initial_view(config: &RendererConfig) -> Mat4 {
    Mat4::look_at_lh(config.eye, config.target, config.up)
}

/// Perspective projection for the given aspect ratio (depth range 0..1).
pub fn projection(config: &RendererConfig, aspect_ratio: f32) -> Mat4 {
    Mat4::perspective_lh(config.fov_y, aspect_ratio, config.near, config.far)
}

/// A camera that keeps whatever view it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCamera;

impl CameraProvider for FixedCamera {
    fn advance_view(&mut self, current: Mat4) -> Mat4 {
        current
    }
}

/// Input state for the free-look camera
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD, E/Space up, Q/Ctrl down)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Sprint modifier
    pub sprint: bool,

    /// Mouse delta since last frame (in pixels)
    pub mouse_delta: Vec2,

    /// Whether mouse look is active (e.g., right mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }
}

/// Pitch stays short of straight up/down to avoid gimbal lock.
const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Left-handed camera basis (right, up, forward) for the given angles.
fn rotation_from_angles(yaw: f32, pitch: f32) -> Mat3 {
    let forward = Vec3::new(
        yaw.sin() * pitch.cos(),
        pitch.sin(),
        yaw.cos() * pitch.cos(),
    );
    let right = Vec3::Y.cross(forward).normalize();
    let up = forward.cross(right);
    Mat3::from_cols(right, up, forward)
}

/// Input shared between the event loop and the camera.
pub type SharedCameraInput = Arc<Mutex<CameraInput>>;

/// Free-look camera
///
/// Moves in its own frame of reference: forward/backward along the view
/// direction, left/right along the camera's right axis, up/down along world
/// Y. Mouse X yaws around world Y, mouse Y pitches around the camera's right
/// axis.
pub struct FreeLookCamera {
    input: SharedCameraInput,
    /// Movement speed in units per second
    pub move_speed: f32,
    /// Mouse sensitivity (radians per pixel)
    pub mouse_sensitivity: f32,
    /// Speed multiplier when sprinting
    pub sprint_multiplier: f32,
    last_update: Option<Instant>,
}

impl Default for FreeLookCamera {
    fn default() -> Self {
        Self {
            input: Arc::new(Mutex::new(CameraInput::default())),
            move_speed: 1.0,
            mouse_sensitivity: 0.003,
            sprint_multiplier: 3.0,
            last_update: None,
        }
    }
}

impl FreeLookCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle the event loop writes key and mouse state into.
    pub fn input(&self) -> SharedCameraInput {
        Arc::clone(&self.input)
    }

    /// Advance `view` by `dt` seconds of the current input.
    pub fn advance_view_by(&mut self, view: Mat4, dt: f32) -> Mat4 {
        let mut input = self.input.lock();

        let world = view.inverse();
        let position = world.w_axis.truncate();

        // Rebuilt from yaw/pitch each frame: orthonormal, no roll.
        let forward = world.z_axis.truncate().normalize_or_zero();
        let mut yaw = forward.x.atan2(forward.z);
        let mut pitch = forward.y.clamp(-1.0, 1.0).asin();

        if input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            yaw += input.mouse_delta.x * self.mouse_sensitivity;
            pitch -= input.mouse_delta.y * self.mouse_sensitivity;
            yaw %= std::f32::consts::TAU;
        }
        pitch = pitch.clamp(-MAX_PITCH, MAX_PITCH);
        let rotation = rotation_from_angles(yaw, pitch);

        let mut local = Vec3::ZERO;
        if input.forward {
            local.z += 1.0;
        }
        if input.backward {
            local.z -= 1.0;
        }
        if input.right {
            local.x += 1.0;
        }
        if input.left {
            local.x -= 1.0;
        }

        let mut vertical = 0.0;
        if input.up {
            vertical += 1.0;
        }
        if input.down {
            vertical -= 1.0;
        }

        let speed = if input.sprint {
            self.move_speed * self.sprint_multiplier
        } else {
            self.move_speed
        };

        let mut velocity = rotation * local + Vec3::Y * vertical;
        if velocity.length_squared() > 0.0 {
            velocity = velocity.normalize();
        }
        let position = position + velocity * speed * dt;

        input.reset_deltas();

        Mat4::from_cols(
            rotation.x_axis.extend(0.0),
            rotation.y_axis.extend(0.0),
            rotation.z_axis.extend(0.0),
            position.extend(1.0),
        )
        .inverse()
    }
}

impl CameraProvider for FreeLookCamera {
    fn advance_view(&mut self, current: Mat4) -> Mat4 {
        let now = Instant::now();
        let dt = self
            .last_update
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_update = Some(now);
        self.advance_view_by(current, dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye_of(view: Mat4) -> Vec3 {
        view.inverse().w_axis.truncate()
    }

    #[test]
    fn test_initial_view_places_eye() {
        let view = initial_view(&RendererConfig::default());
        assert!(eye_of(view).abs_diff_eq(Vec3::new(1.9, 1.0, -1.5), 1e-5));
        // The target lands straight ahead, on +Z in view space.
        let target = view.transform_point3(Vec3::ZERO);
        assert!(target.x.abs() < 1e-5 && target.y.abs() < 1e-5 && target.z > 0.0);
    }

    #[test]
    fn test_projection_maps_near_and_far_to_unit_depth() {
        let config = RendererConfig::default();
        let proj = projection(&config, 800.0 / 600.0);

        let near = proj.project_point3(Vec3::new(0.0, 0.0, 0.1));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, 100.0));
        assert!((near.z - 0.0).abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fixed_camera_keeps_view() {
        let view = initial_view(&RendererConfig::default());
        assert_eq!(FixedCamera.advance_view(view), view);
    }

    #[test]
    fn test_idle_free_look_keeps_view() {
        let view = initial_view(&RendererConfig::default());
        let mut camera = FreeLookCamera::new();

        let next = camera.advance_view_by(view, 0.5);
        assert!(next.abs_diff_eq(view, 1e-5));
    }

    #[test]
    fn test_forward_moves_along_view_direction() {
        let view = Mat4::look_at_lh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let mut camera = FreeLookCamera::new();
        camera.move_speed = 2.0;
        camera.input().lock().forward = true;

        let next = camera.advance_view_by(view, 0.5);
        assert!(eye_of(next).abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-5));
    }

    #[test]
    fn test_up_moves_along_world_y() {
        let view = initial_view(&RendererConfig::default());
        let mut camera = FreeLookCamera::new();
        camera.input().lock().up = true;

        let next = camera.advance_view_by(view, 1.0);
        assert!(eye_of(next).abs_diff_eq(Vec3::new(1.9, 2.0, -1.5), 1e-4));
    }

    #[test]
    fn test_mouse_delta_is_consumed() {
        let view = Mat4::look_at_lh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let mut camera = FreeLookCamera::new();
        {
            let input = camera.input();
            let mut input = input.lock();
            input.mouse_look_active = true;
            input.mouse_delta = Vec2::new(100.0, 0.0);
        }

        let turned = camera.advance_view_by(view, 0.0);
        assert!(!turned.abs_diff_eq(view, 1e-3));
        assert_eq!(camera.input().lock().mouse_delta, Vec2::ZERO);

        let again = camera.advance_view_by(turned, 0.0);
        assert!(again.abs_diff_eq(turned, 1e-5));
    }

    #[test]
    fn test_long_mouse_look_stays_orthonormal() {
        let mut view = initial_view(&RendererConfig::default());
        let mut camera = FreeLookCamera::new();
        camera.input().lock().mouse_look_active = true;

        for i in 0..10_000 {
            let delta = Vec2::new(((i % 7) as f32 - 3.0) * 5.0, ((i % 5) as f32 - 2.0) * 3.0);
            camera.input().lock().mouse_delta = delta;
            view = camera.advance_view_by(view, 0.0);
        }

        let rotation = Mat3::from_mat4(view.inverse());
        let (right, up, forward) = (rotation.x_axis, rotation.y_axis, rotation.z_axis);
        for axis in [right, up, forward] {
            assert!((axis.length() - 1.0).abs() < 1e-4);
        }
        assert!(right.dot(up).abs() < 1e-4);
        assert!(right.dot(forward).abs() < 1e-4);
        assert!(up.dot(forward).abs() < 1e-4);
        // No roll: the right axis stays horizontal.
        assert!(right.y.abs() < 1e-4);
        assert!(eye_of(view).abs_diff_eq(Vec3::new(1.9, 1.0, -1.5), 1e-3));
    }

    #[test]
    fn test_pitch_stops_short_of_vertical() {
        let view = Mat4::look_at_lh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let mut camera = FreeLookCamera::new();
        {
            let input = camera.input();
            let mut input = input.lock();
            input.mouse_look_active = true;
            input.mouse_delta = Vec2::new(0.0, -100_000.0);
        }

        let next = camera.advance_view_by(view, 0.0);
        let forward = Mat3::from_mat4(next.inverse()).z_axis;
        assert!(forward.y > 0.99 && forward.y < 1.0);
        assert!(next.is_finite());
    }
}
