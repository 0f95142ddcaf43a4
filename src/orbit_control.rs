//! Pointer-drag orbit control.
//!
//! The orbit control is the single source of truth for camera orientation:
//! the gyroscope and VR strategies never set absolute angles, they nudge
//! this control through [`rotate_left`](OrbitControl::rotate_left) /
//! [`rotate_up`](OrbitControl::rotate_up).

use std::f32::consts::PI;

use crate::camera::{PanoCamera, sphere_dir};

/// Camera-orientation strategy driven by pointer/touch drag.
#[derive(Clone, Debug)]
pub struct OrbitControl {
    /// Whether the render tick consults this control.
    pub enabled: bool,
    /// Auto-rotate around the vertical axis when idle.
    pub auto_rotate: bool,
    /// Auto-rotate speed in radians per second.
    pub auto_rotate_speed: f32,
    azimuth: f32,
    polar: f32,
}

impl Default for OrbitControl {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_rotate: false,
            auto_rotate_speed: 0.1,
            azimuth: 0.0,
            polar: 0.0,
        }
    }
}

impl OrbitControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the azimuthal angle (radians).
    pub fn rotate_left(&mut self, angle: f32) {
        self.azimuth += angle;
    }

    /// Add to the polar angle (radians), clamped to [0, π].
    pub fn rotate_up(&mut self, angle: f32) {
        self.polar = (self.polar + angle).clamp(0.0, PI);
    }

    pub fn get_azimuthal_angle(&self) -> f32 {
        self.azimuth
    }

    pub fn get_polar_angle(&self) -> f32 {
        self.polar
    }

    /// Restore both angles to zero. Callers compose the actual orientation
    /// with `rotate_left` / `rotate_up` afterwards.
    pub fn reset(&mut self) {
        self.azimuth = 0.0;
        self.polar = 0.0;
    }

    /// Advance auto-rotation and write the look direction to the camera.
    pub fn update(&mut self, dt_ms: f32, camera: &mut PanoCamera) {
        if self.auto_rotate {
            self.rotate_left(self.auto_rotate_speed * dt_ms / 1000.0);
        }
        camera.look = sphere_dir(self.azimuth, self.polar);
    }

    pub fn dispose(&mut self) {
        self.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Angle set/query used by the viewer's set_look/get_look, checked here
    /// at the control level: the spherical mapping must invert exactly.
    #[test]
    fn look_angles_round_trip() {
        let mut orbit = OrbitControl::new();
        for lng in [-180.0f32, -90.0, 0.0, 90.0, 179.0] {
            for lat in [-90.0f32, -45.0, 0.0, 45.0, 90.0] {
                let theta = (180.0 - lng).to_radians();
                let phi = (90.0 - lat).to_radians();
                orbit.reset();
                orbit.rotate_left(theta);
                orbit.rotate_up(phi);

                let lng_back = 180.0 - orbit.get_azimuthal_angle().to_degrees();
                let lat_back = 90.0 - orbit.get_polar_angle().to_degrees();
                assert!(
                    (lng_back - lng).to_radians().abs() < 1e-6,
                    "lng {} -> {}",
                    lng,
                    lng_back
                );
                assert!(
                    (lat_back - lat).to_radians().abs() < 1e-6,
                    "lat {} -> {}",
                    lat,
                    lat_back
                );
            }
        }
    }

    #[test]
    fn polar_is_clamped_to_the_poles() {
        let mut orbit = OrbitControl::new();
        orbit.rotate_up(4.0);
        assert!((orbit.get_polar_angle() - PI).abs() < 1e-6);
        orbit.rotate_up(-10.0);
        assert!(orbit.get_polar_angle().abs() < 1e-6);
    }

    #[test]
    fn auto_rotate_advances_azimuth_per_tick() {
        let mut orbit = OrbitControl::new();
        let mut camera = PanoCamera::new(90.0, 1.0);
        orbit.auto_rotate = true;
        orbit.auto_rotate_speed = 1.0;

        orbit.update(500.0, &mut camera);
        assert!((orbit.get_azimuthal_angle() - 0.5).abs() < 1e-6);
    }
}
