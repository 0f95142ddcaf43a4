//! Camera-control strategy set.
//!
//! At most one strategy is consulted per render tick, with gyroscope taking
//! precedence over the headset strategy, and the headset over plain orbit.
//! The layered strategies borrow the orbit control on update, so switching
//! strategies preserves the derived look direction.

use crate::camera::PanoCamera;
use crate::gyro_control::GyroControl;
use crate::orbit_control::OrbitControl;
use crate::vr_control::VrControl;

pub struct ControlSet {
    pub orbit: OrbitControl,
    pub gyro: Option<GyroControl>,
    pub vr: Option<VrControl>,
}

impl ControlSet {
    pub fn new(with_gyro: bool) -> Self {
        Self {
            orbit: OrbitControl::new(),
            gyro: with_gyro.then(GyroControl::new),
            vr: None,
        }
    }

    /// Run the active strategy for this frame.
    pub fn update(&mut self, dt_ms: f32, camera: &mut PanoCamera) {
        if let Some(gyro) = self.gyro.as_mut() {
            gyro.update(&mut self.orbit, dt_ms, camera);
        } else if let Some(vr) = self.vr.as_mut() {
            vr.update(&mut self.orbit, dt_ms, camera);
        } else {
            self.orbit.update(dt_ms, camera);
        }
    }

    /// Enable or disable the active strategy.
    pub fn set_enabled(&mut self, enabled: bool) {
        if let Some(gyro) = self.gyro.as_mut() {
            gyro.enabled = enabled;
        } else if let Some(vr) = self.vr.as_mut() {
            vr.enabled = enabled;
        }
        self.orbit.enabled = enabled;
    }

    /// Reset the active strategy (and the orbit baseline under it).
    pub fn reset(&mut self) {
        self.orbit.reset();
        if let Some(gyro) = self.gyro.as_mut() {
            gyro.reset();
        }
        if let Some(vr) = self.vr.as_mut() {
            vr.reset();
        }
    }

    /// Start the controls after the entrance window.
    pub fn start(&mut self) {
        if let Some(gyro) = self.gyro.as_mut() {
            if !gyro.enabled {
                gyro.connect();
            }
        }
        self.orbit.enabled = true;
    }

    /// Tear the strategy set down.
    pub fn stop(&mut self) {
        if let Some(mut gyro) = self.gyro.take() {
            gyro.disconnect();
        }
        if let Some(mut vr) = self.vr.take() {
            vr.disconnect();
        }
        self.orbit.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gyro_takes_precedence_without_a_sample_orbit_still_runs() {
        let mut set = ControlSet::new(true);
        let mut camera = PanoCamera::new(90.0, 1.0);
        set.orbit.auto_rotate = true;
        set.orbit.auto_rotate_speed = 1.0;
        set.gyro.as_mut().unwrap().connect();

        // No orientation sample yet: the gyro falls through to orbit, whose
        // auto-rotate still advances.
        set.update(1000.0, &mut camera);
        assert!((set.orbit.get_azimuthal_angle() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn stop_drops_the_layered_strategies() {
        let mut set = ControlSet::new(true);
        set.stop();
        assert!(set.gyro.is_none());
        assert!(!set.orbit.enabled);
    }
}
