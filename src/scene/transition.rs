//! Transition effects between environments.
//!
//! An effect is a named factory; the active effect is polled once per render
//! tick with both environments attached. The lifecycle brackets the effect
//! with attach-start/attach events and, on completion, keeps exactly the
//! incoming environment and disposes the outgoing one — effects only decide
//! what the handoff looks like.

use std::collections::HashMap;

use crate::backend::{Environment, RenderBackend};
use crate::tween::Easing;

/// Mutable view of the two environments an effect animates.
pub struct TransitionCtx<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub outgoing: Environment,
    pub incoming: Environment,
}

/// One visual handoff between the outgoing and incoming environment.
pub trait TransitionEffect {
    /// Called once, right after the incoming environment is attached
    /// (opacity zero).
    fn begin(&mut self, ctx: &mut TransitionCtx<'_>);

    /// Advance by one frame of ticked time. Return `true` when complete;
    /// the incoming environment must be fully visible by then.
    fn update(&mut self, dt_ms: f32, ctx: &mut TransitionCtx<'_>) -> bool;
}

/// Constructor for a registered effect.
pub type EffectFactory = fn() -> Box<dyn TransitionEffect>;

/// The built-in effect table: `fade` and `trans`.
pub fn builtin_effects() -> HashMap<String, EffectFactory> {
    let mut effects: HashMap<String, EffectFactory> = HashMap::new();
    effects.insert("fade".to_owned(), || Box::new(Fade::new(1000.0)));
    effects.insert("trans".to_owned(), || Box::new(Reveal::new(1000.0, 400.0)));
    effects
}

/// Crossfade: the incoming environment fades in while the outgoing fades
/// out over the same window.
pub struct Fade {
    duration_ms: f32,
    elapsed_ms: f32,
}

impl Fade {
    pub fn new(duration_ms: f32) -> Self {
        Self {
            duration_ms,
            elapsed_ms: 0.0,
        }
    }
}

impl TransitionEffect for Fade {
    fn begin(&mut self, _ctx: &mut TransitionCtx<'_>) {}

    fn update(&mut self, dt_ms: f32, ctx: &mut TransitionCtx<'_>) -> bool {
        self.elapsed_ms += dt_ms;
        let t = (self.elapsed_ms / self.duration_ms).clamp(0.0, 1.0);
        let eased = Easing::QuadInOut.apply(t);
        ctx.backend.set_opacity(ctx.incoming.mesh, eased);
        ctx.backend.set_opacity(ctx.outgoing.mesh, 1.0 - eased);
        t >= 1.0
    }
}

/// Two-phase reveal used for pre-loaded scene changes: the incoming
/// environment eases in fully, then the outgoing one drops away.
pub struct Reveal {
    in_ms: f32,
    out_ms: f32,
    elapsed_ms: f32,
}

impl Reveal {
    pub fn new(in_ms: f32, out_ms: f32) -> Self {
        Self {
            in_ms,
            out_ms,
            elapsed_ms: 0.0,
        }
    }
}

impl TransitionEffect for Reveal {
    fn begin(&mut self, _ctx: &mut TransitionCtx<'_>) {}

    fn update(&mut self, dt_ms: f32, ctx: &mut TransitionCtx<'_>) -> bool {
        self.elapsed_ms += dt_ms;
        if self.elapsed_ms < self.in_ms {
            let t = (self.elapsed_ms / self.in_ms).clamp(0.0, 1.0);
            ctx.backend
                .set_opacity(ctx.incoming.mesh, Easing::QuadOut.apply(t));
            return false;
        }
        ctx.backend.set_opacity(ctx.incoming.mesh, 1.0);
        let t = ((self.elapsed_ms - self.in_ms) / self.out_ms).clamp(0.0, 1.0);
        ctx.backend
            .set_opacity(ctx.outgoing.mesh, 1.0 - Easing::QuadIn.apply(t));
        t >= 1.0
    }
}
