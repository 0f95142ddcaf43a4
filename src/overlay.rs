//! Hotspot overlays.
//!
//! The overlay manager keeps the hotspot set of every known scene and
//! maintains backend markers for the current one: hidden when a scene change
//! starts, rebuilt when the new scene attaches, extended when additional
//! scene groups arrive. Visual treatment of markers belongs to plugins; this
//! is only the lifecycle bookkeeping plus the spherical anchoring.

use std::collections::HashMap;

use glam::Vec3;

use crate::backend::{MeshHandle, RenderBackend};
use crate::camera::sphere_dir;
use crate::events::{Payload, topic};
use crate::scene::{Hotspot, SceneData};

/// Distance from the camera at which markers are anchored, inside the
/// environment sphere.
const ANCHOR_RADIUS: f32 = 1000.0;
/// Marker plane edge length.
const MARKER_SIZE: f32 = 64.0;

/// Unit-sphere anchor direction for a hotspot coordinate.
pub fn anchor_position(lng: f32, lat: f32) -> Vec3 {
    let theta = (180.0 - lng).to_radians();
    let phi = (90.0 - lat).to_radians();
    sphere_dir(theta, phi) * ANCHOR_RADIUS
}

struct ActiveMarker {
    hotspot_id: String,
    mesh: MeshHandle,
}

/// Hotspot set attached to the current scene.
#[derive(Default)]
pub struct OverlayManager {
    scenes: HashMap<String, Vec<Hotspot>>,
    active: Vec<ActiveMarker>,
    current_scene: Option<String>,
}

impl OverlayManager {
    pub fn new(group: &[SceneData]) -> Self {
        let mut manager = Self::default();
        manager.add_scenes(group);
        manager
    }

    /// Record the hotspot lists of additional scenes.
    pub fn add_scenes(&mut self, group: &[SceneData]) {
        for scene in group {
            self.scenes
                .insert(scene.id.clone(), scene.hotspots.clone());
        }
    }

    /// Lifecycle hook dispatch.
    pub fn on_event(&mut self, event: &str, payload: &Payload, backend: &mut dyn RenderBackend) {
        match event {
            topic::SCENE_INIT | topic::SCENE_ATTACH => {
                if let Payload::Scene(scene) = payload {
                    self.rebuild(&scene.id, backend);
                }
            }
            topic::SCENE_ATTACHSTART => self.hide(backend),
            _ => {}
        }
    }

    /// Add a hotspot to the current scene and attach its marker.
    pub fn create(&mut self, hotspot: Hotspot, backend: &mut dyn RenderBackend) {
        if let Some(scene_id) = self.current_scene.clone() {
            self.attach_marker(&hotspot, backend);
            self.scenes.entry(scene_id).or_default().push(hotspot);
        }
    }

    /// Remove a hotspot by id from the current scene.
    pub fn remove(&mut self, hotspot_id: &str, backend: &mut dyn RenderBackend) {
        if let Some(pos) = self.active.iter().position(|m| m.hotspot_id == hotspot_id) {
            let marker = self.active.remove(pos);
            backend.detach(marker.mesh);
            backend.dispose_mesh(marker.mesh);
        }
        if let Some(scene_id) = &self.current_scene {
            if let Some(hotspots) = self.scenes.get_mut(scene_id) {
                hotspots.retain(|h| h.id != hotspot_id);
            }
        }
    }

    /// Number of markers currently attached.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        self.clear(backend);
        self.scenes.clear();
        self.current_scene = None;
    }

    fn rebuild(&mut self, scene_id: &str, backend: &mut dyn RenderBackend) {
        self.clear(backend);
        if let Some(hotspots) = self.scenes.get(scene_id).cloned() {
            for hotspot in &hotspots {
                self.attach_marker(hotspot, backend);
            }
        }
        self.current_scene = Some(scene_id.to_owned());
    }

    fn attach_marker(&mut self, hotspot: &Hotspot, backend: &mut dyn RenderBackend) {
        let mesh = backend.create_plane(MARKER_SIZE, MARKER_SIZE);
        backend.set_position(mesh, anchor_position(hotspot.lng, hotspot.lat));
        backend.attach(mesh);
        self.active.push(ActiveMarker {
            hotspot_id: hotspot.id.clone(),
            mesh,
        });
    }

    fn hide(&mut self, backend: &mut dyn RenderBackend) {
        for marker in &self.active {
            backend.detach(marker.mesh);
        }
    }

    fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for marker in self.active.drain(..) {
            backend.detach(marker.mesh);
            backend.dispose_mesh(marker.mesh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_for_front_center_is_negative_z() {
        let pos = anchor_position(0.0, 0.0);
        assert!(pos.abs_diff_eq(Vec3::NEG_Z * ANCHOR_RADIUS, 1e-3));
    }

    #[test]
    fn anchor_stays_on_the_sphere() {
        for (lng, lat) in [(30.0, -10.0), (-120.0, 45.0), (179.0, -89.0)] {
            let pos = anchor_position(lng, lat);
            assert!((pos.length() - ANCHOR_RADIUS).abs() < 1e-2);
        }
    }
}
