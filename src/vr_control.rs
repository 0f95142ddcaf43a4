//! Headset (VR) control.
//!
//! Consumes head-pose quaternions from an external headset integration and
//! converts each pose into spherical deltas against the previous frame,
//! nudging the orbit control — the same single-source-of-truth shape as the
//! gyroscope strategy.

use glam::{Quat, Vec3};

use crate::camera::PanoCamera;
use crate::orbit_control::OrbitControl;

/// Camera-orientation strategy driven by a headset pose feed.
pub struct VrControl {
    pub enabled: bool,
    pose: Option<Quat>,
    last: Option<(f32, f32)>,
}

impl VrControl {
    pub fn new() -> Self {
        Self {
            enabled: false,
            pose: None,
            last: None,
        }
    }

    /// Feed the latest head pose.
    pub fn feed_pose(&mut self, pose: Quat) {
        self.pose = Some(pose);
    }

    pub fn connect(&mut self) {
        self.enabled = true;
    }

    pub fn disconnect(&mut self) {
        self.enabled = false;
        self.pose = None;
        self.last = None;
    }

    /// Forget the delta baseline.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Per-tick update: nudge the orbit control by the pose delta, then run
    /// the orbit update. Falls back to a plain orbit update without a pose.
    pub fn update(&mut self, orbit: &mut OrbitControl, dt_ms: f32, camera: &mut PanoCamera) {
        let pose = match (self.enabled, self.pose) {
            (true, Some(pose)) => pose,
            _ => {
                orbit.update(dt_ms, camera);
                return;
            }
        };

        let dir = pose * Vec3::NEG_Z;
        let theta = dir.x.atan2(dir.z);
        let phi = dir.y.clamp(-1.0, 1.0).acos();

        if let Some((last_theta, last_phi)) = self.last {
            orbit.rotate_left(theta - last_theta);
            orbit.rotate_up(phi - last_phi);
        }
        self.last = Some((theta, phi));

        orbit.update(dt_ms, camera);
    }
}

impl Default for VrControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn pose_deltas_nudge_the_orbit() {
        let mut vr = VrControl::new();
        let mut orbit = OrbitControl::new();
        let mut camera = PanoCamera::new(90.0, 1.0);
        vr.connect();
        orbit.rotate_up(std::f32::consts::FRAC_PI_2);

        vr.feed_pose(Quat::IDENTITY);
        vr.update(&mut orbit, 16.0, &mut camera);
        let azimuth0 = orbit.get_azimuthal_angle();

        vr.feed_pose(Quat::from_rotation_y(FRAC_PI_4));
        vr.update(&mut orbit, 16.0, &mut camera);
        assert!(
            (orbit.get_azimuthal_angle() - azimuth0).abs() > 1e-4,
            "yaw pose change should rotate the orbit"
        );
    }

    #[test]
    fn no_pose_falls_back_to_orbit() {
        let mut vr = VrControl::new();
        let mut orbit = OrbitControl::new();
        let mut camera = PanoCamera::new(90.0, 1.0);
        vr.connect();

        vr.update(&mut orbit, 16.0, &mut camera);
        assert!(orbit.get_azimuthal_angle().abs() < 1e-6);
    }
}
