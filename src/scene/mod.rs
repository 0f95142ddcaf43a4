//! Scene state, lifecycle and transitions.
//!
//! [`Viewer`] is the heart of the crate: it owns the current scene, drives
//! progressive resource loading, sequences transition effects and publishes
//! the lifecycle events everything else hangs off.

pub mod data;
pub mod history;
pub mod lifecycle;
pub mod transition;

pub use data::{Hotspot, SceneData, SceneInfo, SourceConfig, ViewerOpts};
pub use history::{History, HistoryEntry};
pub use lifecycle::{ENV_RADIUS, Viewer};
pub use transition::{EffectFactory, Fade, Reveal, TransitionCtx, TransitionEffect};
