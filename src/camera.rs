//! The viewer camera.
//!
//! The camera sits at the origin inside the environment sphere and only ever
//! rotates; controls steer its look direction through spherical angles.

use glam::{Mat4, Vec3};

/// Convert spherical control angles to a unit look direction.
///
/// `theta` is the azimuthal angle and `phi` the polar angle measured from
/// +Y, matching the longitude/latitude mapping `theta = (180 - lng)·π/180`,
/// `phi = (90 - lat)·π/180` — longitude 0 / latitude 0 looks down -Z.
pub fn sphere_dir(theta: f32, phi: f32) -> Vec3 {
    Vec3::new(
        phi.sin() * theta.sin(),
        phi.cos(),
        phi.sin() * theta.cos(),
    )
}

/// Camera state snapshot handed to the rendering backend each frame.
#[derive(Clone, Copy, Debug)]
pub struct CameraState {
    pub view: Mat4,
    pub proj: Mat4,
    pub fov_deg: f32,
}

/// A perspective camera fixed at the origin.
#[derive(Clone, Copy, Debug)]
pub struct PanoCamera {
    /// Field of view in degrees.
    pub fov_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Unit look direction, written by the active control each tick.
    pub look: Vec3,
}

impl PanoCamera {
    pub fn new(fov_deg: f32, aspect: f32) -> Self {
        Self {
            fov_deg,
            aspect,
            near: 0.1,
            far: 10000.0,
            look: Vec3::NEG_Z,
        }
    }

    pub fn view(&self) -> Mat4 {
        // Near the poles Y is unusable as the up reference.
        let up = if self.look.y.abs() > 0.999 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Mat4::look_at_rh(Vec3::ZERO, self.look, up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            view: self.view(),
            proj: self.projection(),
            fov_deg: self.fov_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn front_center_looks_down_negative_z() {
        let dir = sphere_dir(PI, FRAC_PI_2);
        assert!(dir.abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn poles_map_to_up_and_down() {
        assert!(sphere_dir(PI, 0.0).abs_diff_eq(Vec3::Y, 1e-6));
        assert!(sphere_dir(PI, PI).abs_diff_eq(Vec3::NEG_Y, 1e-6));
    }

    #[test]
    fn view_is_finite_at_the_poles() {
        let mut camera = PanoCamera::new(90.0, 16.0 / 9.0);
        camera.look = Vec3::Y;
        let view = camera.view();
        assert!(view.to_cols_array().iter().all(|v| v.is_finite()));
    }
}
