//! # Horama
//!
//! **An embeddable panorama tour engine.**
//!
//! Horama renders a spherical environment around a virtual camera, lets the
//! user look around by drag, gyroscope or headset, and moves between scenes
//! with progressive low→high-resolution loading and animated crossfades.
//!
//! ## Quick Start
//!
//! ```no_run
//! use horama::{AppConfig, SourceConfig, run_viewer};
//!
//! fn main() {
//!     let source = SourceConfig::from_json(r#"{
//!         "sceneGroup": [
//!             {"id": "hall", "pimg": "hall-preview.jpg", "simg": "hall", "suffix": ".jpg",
//!              "fov": 90, "lng": 0, "lat": 0}
//!         ]
//!     }"#).unwrap();
//!
//!     run_viewer(AppConfig::new().title("Tour"), source, |viewer| {
//!         viewer.add_plugin(|_| Box::new(horama::RotatePlugin::new(0.2)));
//!     }).unwrap();
//! }
//! ```
//!
//! ## Architecture
//!
//! - The **scene lifecycle** ([`Viewer`]) owns the current scene, drives
//!   progressive texture loading, sequences transitions and publishes the
//!   lifecycle events (`scene-create` → `scene-init` → `scene-load`, with
//!   `scene-ready` once the entrance settles).
//! - Rendering goes through the [`RenderBackend`] trait; the crate ships a
//!   wgpu implementation but the core never names a concrete graphics type.
//! - Every asynchronous load is tagged with a scene-entry generation and
//!   checked for currency before it is applied, so rapid navigation can
//!   never attach a stale texture.

mod app;
mod backend;
mod camera;
mod controls;
mod error;
mod events;
mod gpu;
mod gyro_control;
mod input;
mod loader;
mod orbit_control;
mod overlay;
mod plugin;
pub mod runtime;
pub mod scene;
mod tween;
mod vr_control;
mod wgpu_backend;

pub use app::{AppConfig, run_viewer};
pub use backend::{Environment, MeshHandle, RenderBackend, TextureHandle};
pub use camera::{CameraState, PanoCamera, sphere_dir};
pub use controls::ControlSet;
pub use error::{Error, LoadError};
pub use events::{EventBus, Payload, Subscription, topic};
pub use gpu::GpuContext;
pub use gyro_control::{GyroControl, OrientationSample};
pub use input::Input;
pub use loader::{Fetcher, FsFetcher, LoadResult, LoadedImage, ResourceLoader, ResourcePayload, Ticket};
pub use orbit_control::OrbitControl;
pub use overlay::OverlayManager;
pub use plugin::{Plugin, PluginCtl, RotatePlugin};
pub use scene::{
    ENV_RADIUS, EffectFactory, Fade, History, HistoryEntry, Hotspot, Reveal, SceneData, SceneInfo,
    SourceConfig, TransitionCtx, TransitionEffect, Viewer, ViewerOpts,
};
pub use tween::{Easing, TweenDriver, TweenId, TweenUpdate};
pub use vr_control::VrControl;
pub use wgpu_backend::WgpuBackend;

// Re-export the math types used across the public API.
pub use glam::{Mat4, Quat, Vec2, Vec3};
