//! Viewer plugins.
//!
//! Plugins are built by a factory that receives an explicit control surface
//! — no hidden binding to viewer internals. The viewer forwards every
//! lifecycle event to its plugins and ticks them once per frame.

use std::cell::RefCell;
use std::rc::Rc;

use crate::camera::PanoCamera;
use crate::controls::ControlSet;
use crate::events::{EventBus, Payload, topic};
use crate::tween::TweenDriver;

/// The slice of the viewer a plugin may act on.
pub struct PluginCtl<'a> {
    pub bus: &'a EventBus,
    pub controls: &'a mut ControlSet,
    pub tweens: &'a TweenDriver,
    pub camera: &'a Rc<RefCell<PanoCamera>>,
    pub(crate) nav: &'a mut Vec<String>,
}

impl PluginCtl<'_> {
    /// Request navigation to a scene by id; the viewer resolves it against
    /// the loaded scene group after the current notification completes.
    pub fn enter_scene(&mut self, id: impl Into<String>) {
        self.nav.push(id.into());
    }
}

/// A viewer extension. All hooks have default no-op implementations.
pub trait Plugin {
    /// Called for every event the viewer emits, before bus subscribers.
    fn on_event(&mut self, _topic: &str, _payload: &Payload, _ctl: &mut PluginCtl<'_>) {}

    /// Called once per render tick.
    fn tick(&mut self, _dt_ms: f32, _ctl: &mut PluginCtl<'_>) {}

    /// Called on viewer dispose.
    fn dispose(&mut self) {}
}

/// Idle auto-rotation.
///
/// Starts the orbit auto-rotate after a warm-up delay, interrupts it the
/// moment the user drags or zooms, and resumes once input has been idle for
/// the recovery window.
pub struct RotatePlugin {
    speed: f32,
    start_delay_ms: f32,
    recover_ms: f32,
    warmup_ms: f32,
    idle_ms: f32,
    armed: bool,
    disturbed: bool,
}

impl RotatePlugin {
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            start_delay_ms: 2000.0,
            recover_ms: 5000.0,
            warmup_ms: 0.0,
            idle_ms: 0.0,
            armed: false,
            disturbed: false,
        }
    }

    pub fn start_delay(mut self, ms: f32) -> Self {
        self.start_delay_ms = ms;
        self
    }

    pub fn recover(mut self, ms: f32) -> Self {
        self.recover_ms = ms;
        self
    }
}

impl Plugin for RotatePlugin {
    fn on_event(&mut self, event: &str, _payload: &Payload, ctl: &mut PluginCtl<'_>) {
        if event == topic::UI_DRAG || event == topic::UI_ZOOM {
            ctl.controls.orbit.auto_rotate = false;
            self.disturbed = true;
            self.idle_ms = 0.0;
        }
    }

    fn tick(&mut self, dt_ms: f32, ctl: &mut PluginCtl<'_>) {
        if !self.armed {
            self.warmup_ms += dt_ms;
            if self.warmup_ms >= self.start_delay_ms {
                ctl.controls.orbit.auto_rotate_speed = self.speed;
                ctl.controls.orbit.auto_rotate = true;
                self.armed = true;
            }
            return;
        }
        if self.disturbed {
            self.idle_ms += dt_ms;
            if self.idle_ms >= self.recover_ms {
                ctl.controls.orbit.auto_rotate = true;
                self.disturbed = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctl_parts() -> (EventBus, ControlSet, TweenDriver, Rc<RefCell<PanoCamera>>, Vec<String>) {
        (
            EventBus::new(),
            ControlSet::new(false),
            TweenDriver::new(),
            Rc::new(RefCell::new(PanoCamera::new(90.0, 1.0))),
            Vec::new(),
        )
    }

    #[test]
    fn rotate_arms_after_delay_and_recovers_after_disturb() {
        let (bus, mut controls, tweens, camera, mut nav) = ctl_parts();
        let mut plugin = RotatePlugin::new(0.5).start_delay(100.0).recover(200.0);

        let mut ctl = PluginCtl {
            bus: &bus,
            controls: &mut controls,
            tweens: &tweens,
            camera: &camera,
            nav: &mut nav,
        };

        plugin.tick(50.0, &mut ctl);
        assert!(!ctl.controls.orbit.auto_rotate);
        plugin.tick(50.0, &mut ctl);
        assert!(ctl.controls.orbit.auto_rotate);

        plugin.on_event(topic::UI_DRAG, &Payload::None, &mut ctl);
        assert!(!ctl.controls.orbit.auto_rotate);

        plugin.tick(100.0, &mut ctl);
        assert!(!ctl.controls.orbit.auto_rotate);
        plugin.tick(100.0, &mut ctl);
        assert!(ctl.controls.orbit.auto_rotate);
    }
}
