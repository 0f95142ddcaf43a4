//! Device-orientation (gyroscope) control.
//!
//! Converts raw device-orientation angles plus the screen rotation into a
//! quaternion, derives the per-frame azimuth/polar delta against the previous
//! sample and forwards that delta to the orbit control — the gyroscope never
//! sets absolute orientation. On frames with no sample yet, the orbit control
//! updates as usual.

use std::f32::consts::{FRAC_PI_2, FRAC_1_SQRT_2};

use glam::{EulerRot, Quat, Vec3};

use crate::camera::PanoCamera;
use crate::orbit_control::OrbitControl;

/// One device-orientation reading, all angles in degrees.
///
/// `alpha` rotates about the device z axis (0..360), `beta` about x
/// (-180..180), `gamma` about y (-90..90).
#[derive(Clone, Copy, Debug, Default)]
pub struct OrientationSample {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

/// Euler decomposition of a device quaternion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct EulerAngles {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Camera-orientation strategy driven by device-orientation sensor deltas,
/// layered on top of the orbit control.
pub struct GyroControl {
    pub enabled: bool,
    sample: OrientationSample,
    screen_orient_deg: f32,
    last_roll: Option<f32>,
    last_yaw: Option<f32>,
}

impl GyroControl {
    pub fn new() -> Self {
        Self {
            enabled: false,
            sample: OrientationSample::default(),
            screen_orient_deg: 0.0,
            last_roll: None,
            last_yaw: None,
        }
    }

    /// Start consuming orientation samples.
    pub fn connect(&mut self) {
        self.enabled = true;
    }

    /// Stop consuming samples and forget the accumulated state.
    pub fn disconnect(&mut self) {
        self.enabled = false;
        self.sample = OrientationSample::default();
        self.screen_orient_deg = 0.0;
        self.last_roll = None;
        self.last_yaw = None;
    }

    /// Feed the latest device-orientation reading.
    pub fn feed_orientation(&mut self, sample: OrientationSample) {
        self.sample = sample;
    }

    /// Feed the current screen rotation in degrees (0, 90, 180, 270).
    pub fn feed_screen_orientation(&mut self, degrees: f32) {
        self.screen_orient_deg = degrees;
    }

    /// Forget the delta baseline, e.g. after an explicit look reset.
    pub fn reset(&mut self) {
        self.last_roll = None;
        self.last_yaw = None;
    }

    /// Per-tick update: nudge the orbit control by the sample delta, then run
    /// the orbit update. Falls back to a plain orbit update while disabled or
    /// before the first real sample arrives.
    pub fn update(&mut self, orbit: &mut OrbitControl, dt_ms: f32, camera: &mut PanoCamera) {
        if !self.enabled {
            orbit.update(dt_ms, camera);
            return;
        }

        let alpha = self.sample.alpha.to_radians();
        let beta = self.sample.beta.to_radians();
        let gamma = self.sample.gamma.to_radians();
        if alpha == 0.0 && beta == 0.0 && gamma == 0.0 {
            orbit.update(dt_ms, camera);
            return;
        }

        let orient = self.screen_orient_deg.to_radians();
        let angles = quat_to_angle(device_quat(alpha, beta, gamma, orient));

        if let (Some(last_roll), Some(last_yaw)) = (self.last_roll, self.last_yaw) {
            orbit.rotate_left(last_yaw - angles.yaw);
            orbit.rotate_up(last_roll - angles.roll);
        }
        self.last_roll = Some(angles.roll);
        self.last_yaw = Some(angles.yaw);

        orbit.update(dt_ms, camera);
    }
}

impl Default for GyroControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Orientation quaternion for a device-orientation sample.
///
/// The device reports 'ZXY' intrinsic angles with the phone lying flat;
/// rotate -90° about X so the rest pose is the phone held upright, then
/// compensate for the screen rotation.
pub(crate) fn device_quat(alpha: f32, beta: f32, gamma: f32, orient: f32) -> Quat {
    let q1 = Quat::from_xyzw(-FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
    let q = Quat::from_euler(EulerRot::YXZ, alpha, beta, -gamma);
    q * q1 * Quat::from_axis_angle(Vec3::Z, -orient)
}

/// Decompose a quaternion into pitch/roll/yaw, special-casing the two poles
/// to avoid the gimbal-lock division.
pub(crate) fn quat_to_angle(q: Quat) -> EulerAngles {
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);
    let factor = x * y + z * w;

    // north pole
    if factor > 0.499 {
        return EulerAngles {
            pitch: FRAC_PI_2,
            roll: 0.0,
            yaw: 2.0 * x.atan2(w),
        };
    }
    // south pole
    if factor < -0.499 {
        return EulerAngles {
            pitch: -FRAC_PI_2,
            roll: 0.0,
            yaw: -2.0 * x.atan2(w),
        };
    }

    let sqx = x * x;
    let sqy = y * y;
    let sqz = z * z;
    EulerAngles {
        pitch: (2.0 * factor).asin(),
        roll: (2.0 * x * w - 2.0 * y * z).atan2(1.0 - 2.0 * sqx - 2.0 * sqz),
        yaw: (2.0 * y * w - 2.0 * x * z).atan2(1.0 - 2.0 * sqy - 2.0 * sqz),
    }
}
