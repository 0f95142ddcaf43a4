//! Tick-paced value interpolation.
//!
//! Tweens are advanced by the render loop, not by a wall-clock timer: an
//! animation that is started but never ticked does not progress. Multiple
//! handles may run concurrently on unrelated properties; handles touching
//! the same property are not coalesced — callers stop the prior handle
//! before starting a conflicting one.

use std::cell::RefCell;
use std::rc::Rc;

/// Easing functions for animated values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Easing {
    /// Constant speed throughout.
    #[default]
    Linear,
    /// Start slow, accelerate.
    QuadIn,
    /// Start fast, decelerate.
    QuadOut,
    /// Start slow, speed up, then slow down.
    QuadInOut,
    /// Overshoot the target slightly, then settle back.
    BackOut,
}

impl Easing {
    /// Apply the easing curve to a linear progress value (0.0 to 1.0).
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::QuadIn => t * t,
            Easing::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::QuadInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Easing::BackOut => {
                const C1: f32 = 1.70158;
                const C3: f32 = C1 + 1.0;
                let u = t - 1.0;
                1.0 + C3 * u * u * u + C1 * u * u
            }
        }
    }

    /// Look up an easing by its configuration name.
    pub fn by_name(name: &str) -> Option<Easing> {
        match name {
            "linear" => Some(Easing::Linear),
            "quadEaseIn" => Some(Easing::QuadIn),
            "quadEaseOut" => Some(Easing::QuadOut),
            "quadEaseInOut" => Some(Easing::QuadInOut),
            "backOut" => Some(Easing::BackOut),
            _ => None,
        }
    }
}

/// Handle to a running tween.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TweenId(u64);

/// A batch of `(name, value, previous)` property samples for one frame of
/// one tween.
pub struct TweenUpdate<'a> {
    pub samples: &'a [(String, f32, f32)],
}

impl TweenUpdate<'_> {
    /// The new value of a property, if it is part of this tween.
    pub fn value(&self, name: &str) -> Option<f32> {
        self.samples
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|&(_, v, _)| v)
    }
}

struct Prop {
    name: String,
    from: f32,
    to: f32,
    current: f32,
}

struct ActiveTween {
    id: TweenId,
    props: Vec<Prop>,
    easing: Easing,
    duration_ms: f32,
    elapsed_ms: f32,
    process: Option<Box<dyn FnMut(&TweenUpdate<'_>)>>,
    complete: Option<Box<dyn FnOnce()>>,
}

struct DriverInner {
    active: Vec<ActiveTween>,
    stop_requests: Vec<TweenId>,
    next_id: u64,
}

/// The per-viewer animation driver. Cloneable handle; all clones share the
/// same set of running tweens.
#[derive(Clone)]
pub struct TweenDriver {
    inner: Rc<RefCell<DriverInner>>,
}

impl TweenDriver {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DriverInner {
                active: Vec::new(),
                stop_requests: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Begin building a tween.
    pub fn tween(&self) -> TweenBuilder {
        TweenBuilder {
            driver: self.clone(),
            props: Vec::new(),
            easing: Easing::Linear,
            duration_ms: 1000.0,
            process: None,
            complete: None,
        }
    }

    /// Run a callback once after `delay_ms` of ticked time.
    pub fn delay<F: FnOnce() + 'static>(&self, delay_ms: f32, f: F) -> TweenId {
        self.tween().duration(delay_ms).complete(f).start()
    }

    /// Cancel a tween immediately. Its complete callback never fires.
    /// Stopping an already-finished handle is a no-op.
    pub fn stop(&self, id: TweenId) {
        let mut inner = self.inner.borrow_mut();
        if let Some(pos) = inner.active.iter().position(|t| t.id == id) {
            inner.active.remove(pos);
        } else {
            // May be mid-advance; applied when the batch is merged back.
            inner.stop_requests.push(id);
        }
    }

    /// Drop every running tween without firing completions.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.active.clear();
        inner.stop_requests.clear();
    }

    /// Number of tweens currently running.
    pub fn running(&self) -> usize {
        self.inner.borrow().active.len()
    }

    /// Advance all running tweens by one frame of `dt_ms` ticked time.
    ///
    /// Process callbacks fire with the frame's interpolated values; a tween
    /// whose elapsed time reaches its duration fires its complete callback
    /// exactly once (after the final process call) and is removed. Callbacks
    /// may start or stop tweens on this driver re-entrantly.
    pub fn advance(&self, dt_ms: f32) {
        let mut batch = std::mem::take(&mut self.inner.borrow_mut().active);
        let mut retained = Vec::with_capacity(batch.len());

        for mut tween in batch.drain(..) {
            tween.elapsed_ms += dt_ms;
            let t = if tween.duration_ms <= 0.0 {
                1.0
            } else {
                (tween.elapsed_ms / tween.duration_ms).clamp(0.0, 1.0)
            };
            let eased = tween.easing.apply(t);

            let samples: Vec<(String, f32, f32)> = tween
                .props
                .iter_mut()
                .map(|p| {
                    let previous = p.current;
                    p.current = p.from + (p.to - p.from) * eased;
                    (p.name.clone(), p.current, previous)
                })
                .collect();

            if self.stopped(tween.id) {
                continue;
            }
            if let Some(process) = tween.process.as_mut() {
                process(&TweenUpdate { samples: &samples });
            }
            if self.stopped(tween.id) {
                continue;
            }

            if tween.elapsed_ms >= tween.duration_ms {
                if let Some(complete) = tween.complete.take() {
                    complete();
                }
            } else {
                retained.push(tween);
            }
        }

        let mut inner = self.inner.borrow_mut();
        // Tweens started from inside callbacks landed in `active`; keep them
        // after the survivors so they are first advanced on the next frame.
        let started = std::mem::take(&mut inner.active);
        inner.active = retained;
        inner.active.extend(started);
        let stops = std::mem::take(&mut inner.stop_requests);
        inner.active.retain(|t| !stops.contains(&t.id));
    }

    fn stopped(&self, id: TweenId) -> bool {
        self.inner.borrow().stop_requests.contains(&id)
    }

    fn register(&self, tween: ActiveTween) -> TweenId {
        let id = tween.id;
        self.inner.borrow_mut().active.push(tween);
        id
    }

    fn next_id(&self) -> TweenId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        TweenId(inner.next_id)
    }
}

impl Default for TweenDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder returned by [`TweenDriver::tween`].
pub struct TweenBuilder {
    driver: TweenDriver,
    props: Vec<Prop>,
    easing: Easing,
    duration_ms: f32,
    process: Option<Box<dyn FnMut(&TweenUpdate<'_>)>>,
    complete: Option<Box<dyn FnOnce()>>,
}

impl TweenBuilder {
    /// Interpolate a named property from `from` to `to`.
    pub fn prop(mut self, name: impl Into<String>, from: f32, to: f32) -> Self {
        self.props.push(Prop {
            name: name.into(),
            from,
            to,
            current: from,
        });
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Duration in milliseconds of ticked time.
    pub fn duration(mut self, duration_ms: f32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Per-frame callback receiving the interpolated values.
    pub fn process<F: FnMut(&TweenUpdate<'_>) + 'static>(mut self, f: F) -> Self {
        self.process = Some(Box::new(f));
        self
    }

    /// One-shot callback fired when elapsed time reaches the duration.
    pub fn complete<F: FnOnce() + 'static>(mut self, f: F) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    /// Register the tween with the driver and return its handle.
    pub fn start(self) -> TweenId {
        let id = self.driver.next_id();
        self.driver.register(ActiveTween {
            id,
            props: self.props,
            easing: self.easing,
            duration_ms: self.duration_ms,
            elapsed_ms: 0.0,
            process: self.process,
            complete: self.complete,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: f32 = 1000.0 / 60.0;

    #[test]
    fn easing_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::QuadIn,
            Easing::QuadOut,
            Easing::QuadInOut,
            Easing::BackOut,
        ] {
            assert!((easing.apply(0.0)).abs() < 1e-6);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn complete_fires_exactly_once_after_duration() {
        let driver = TweenDriver::new();
        let completions = Rc::new(RefCell::new(0));
        let process_after_complete = Rc::new(RefCell::new(false));

        let done = Rc::clone(&completions);
        let flag = Rc::clone(&process_after_complete);
        let done2 = Rc::clone(&completions);
        driver
            .tween()
            .prop("fov", 90.0, 120.0)
            .duration(500.0)
            .process(move |_| {
                if *done.borrow() > 0 {
                    *flag.borrow_mut() = true;
                }
            })
            .complete(move || *done2.borrow_mut() += 1)
            .start();

        // Ten frames at 60fps: well short of 500ms.
        let mut elapsed = 0.0;
        for _ in 0..10 {
            driver.advance(FRAME);
            elapsed += FRAME;
        }
        assert_eq!(*completions.borrow(), 0);

        while elapsed < 500.0 + FRAME * 2.0 {
            driver.advance(FRAME);
            elapsed += FRAME;
        }
        assert_eq!(*completions.borrow(), 1);
        assert!(!*process_after_complete.borrow());
        assert_eq!(driver.running(), 0);
    }

    #[test]
    fn process_reports_new_and_previous_values() {
        let driver = TweenDriver::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&seen);
        driver
            .tween()
            .prop("opacity", 0.0, 1.0)
            .duration(100.0)
            .process(move |u| {
                let (_, value, previous) = u.samples[0].clone();
                log.borrow_mut().push((value, previous));
            })
            .start();

        driver.advance(50.0);
        driver.advance(50.0);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!((seen[0].0 - 0.5).abs() < 1e-6);
        assert!((seen[0].1 - 0.0).abs() < 1e-6);
        assert!((seen[1].0 - 1.0).abs() < 1e-6);
        assert!((seen[1].1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stop_cancels_without_completion() {
        let driver = TweenDriver::new();
        let completions = Rc::new(RefCell::new(0));

        let done = Rc::clone(&completions);
        let id = driver
            .tween()
            .prop("x", 0.0, 1.0)
            .duration(100.0)
            .complete(move || *done.borrow_mut() += 1)
            .start();

        driver.advance(50.0);
        driver.stop(id);
        driver.advance(100.0);

        assert_eq!(*completions.borrow(), 0);
        assert_eq!(driver.running(), 0);
    }

    #[test]
    fn concurrent_handles_are_independent() {
        let driver = TweenDriver::new();
        let done = Rc::new(RefCell::new(Vec::new()));

        let a = Rc::clone(&done);
        driver
            .tween()
            .prop("fov", 90.0, 100.0)
            .duration(100.0)
            .complete(move || a.borrow_mut().push("fov"))
            .start();
        let b = Rc::clone(&done);
        driver
            .tween()
            .prop("opacity", 0.0, 1.0)
            .duration(200.0)
            .complete(move || b.borrow_mut().push("opacity"))
            .start();

        driver.advance(100.0);
        assert_eq!(*done.borrow(), vec!["fov"]);
        assert_eq!(driver.running(), 1);

        driver.advance(100.0);
        assert_eq!(*done.borrow(), vec!["fov", "opacity"]);
    }

    #[test]
    fn callback_may_start_a_tween_reentrantly() {
        let driver = TweenDriver::new();
        let chained = Rc::new(RefCell::new(false));

        let d2 = driver.clone();
        let flag = Rc::clone(&chained);
        driver
            .tween()
            .prop("x", 0.0, 1.0)
            .duration(10.0)
            .complete(move || {
                let flag = Rc::clone(&flag);
                d2.tween()
                    .prop("y", 0.0, 1.0)
                    .duration(10.0)
                    .complete(move || *flag.borrow_mut() = true)
                    .start();
            })
            .start();

        driver.advance(10.0);
        assert!(!*chained.borrow());
        driver.advance(10.0);
        assert!(*chained.borrow());
    }

    #[test]
    fn delay_fires_once() {
        let driver = TweenDriver::new();
        let fired = Rc::new(RefCell::new(0));

        let hits = Rc::clone(&fired);
        driver.delay(100.0, move || *hits.borrow_mut() += 1);

        driver.advance(99.0);
        assert_eq!(*fired.borrow(), 0);
        driver.advance(1.0);
        assert_eq!(*fired.borrow(), 1);
        driver.advance(100.0);
        assert_eq!(*fired.borrow(), 1);
    }
}
