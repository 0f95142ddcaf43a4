//! The scene lifecycle core.
//!
//! [`Viewer`] owns the current scene state and sequences every transition:
//! progressive preview → high-resolution loading, crossfade handoffs,
//! control freezing during the entrance window, and the lifecycle events
//! plugins and overlays subscribe to.
//!
//! Everything is driven by [`Viewer::tick`], one call per display refresh:
//! loader results are drained and applied between renders, animations are
//! paced by ticked time, and every asynchronous completion re-checks that
//! its scene entry is still current before touching state. A scene entry is
//! identified by a generation number that increments on each navigation;
//! results tagged with a stale generation are discarded, never applied.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::backend::{Environment, RenderBackend, TextureHandle};
use crate::camera::PanoCamera;
use crate::controls::ControlSet;
use crate::error::{Error, LoadError};
use crate::events::{EventBus, Payload, topic};
use crate::loader::{FsFetcher, LoadResult, ResourceLoader, ResourcePayload, Ticket};
use crate::overlay::OverlayManager;
use crate::plugin::{Plugin, PluginCtl};
use crate::scene::data::{Hotspot, SceneData, SourceConfig, ViewerOpts};
use crate::scene::history::{History, HistoryEntry};
use crate::scene::transition::{
    EffectFactory, TransitionCtx, TransitionEffect, builtin_effects,
};
use crate::tween::{Easing, TweenDriver, TweenId};

/// Radius of the environment sphere.
pub const ENV_RADIUS: f32 = 2000.0;
/// Settle delay between a direct texture swap and the attach event.
const ATTACH_SETTLE_MS: f32 = 100.0;

struct PendingLoad {
    ticket: Ticket,
    generation: u64,
    purpose: Purpose,
}

enum Purpose {
    /// Preview texture of the initial scene.
    InitPreview,
    /// High-resolution texture of the initial scene.
    InitHighRes,
    /// Preview texture of a successor scene (`preTrans` path).
    NextPreview { data: SceneData },
    /// High-resolution texture of a successor scene (direct path).
    NextHighRes { data: SceneData },
    /// Background sharpen of the current scene; applied silently.
    SilentUpgrade { data: SceneData },
    /// Scene-group JSON for back-navigation.
    GroupFetch { scene_id: String },
}

struct ActiveTransition {
    effect: Box<dyn TransitionEffect>,
    outgoing: Environment,
    incoming: Environment,
    data: SceneData,
}

struct DelayedEvent {
    remaining_ms: f32,
    event: &'static str,
    payload: Payload,
}

/// The panorama viewer: scene lifecycle, camera controls, and rendering
/// orchestration over an opaque backend.
pub struct Viewer {
    bus: EventBus,
    loader: ResourceLoader,
    tweens: TweenDriver,
    backend: Box<dyn RenderBackend>,
    camera: Rc<RefCell<PanoCamera>>,
    controls: ControlSet,
    overlays: OverlayManager,
    plugins: Vec<Box<dyn Plugin>>,
    effects: HashMap<String, EffectFactory>,

    source: SourceConfig,
    opts: ViewerOpts,
    scene_data: SceneData,
    history: History,
    dataset_key: Option<String>,

    environment: Option<Environment>,
    entry_generation: u64,
    pending: Vec<PendingLoad>,
    transition: Option<ActiveTransition>,
    stashed_upgrade: Option<(SceneData, TextureHandle)>,
    delayed: Vec<DelayedEvent>,
    fov_tween: Option<TweenId>,

    frozen: bool,
    interactable: bool,
    ready_fired: bool,
    pending_ready: bool,
    started: bool,
    disposed: bool,
    elapsed_ms: f64,
    size: (u32, u32),
}

impl Viewer {
    /// Build a viewer over the given backend, loading resources from the
    /// filesystem. Fails with a config error when the source resolves no
    /// scene.
    pub fn new(backend: Box<dyn RenderBackend>, source: SourceConfig) -> Result<Self, Error> {
        let loader = ResourceLoader::new(Arc::new(FsFetcher));
        Self::with_loader(backend, source, loader)
    }

    /// Build a viewer with a custom resource loader (HTTP fetch, caches,
    /// test doubles).
    pub fn with_loader(
        backend: Box<dyn RenderBackend>,
        source: SourceConfig,
        loader: ResourceLoader,
    ) -> Result<Self, Error> {
        let scene_data = source
            .find_scene()
            .cloned()
            .ok_or_else(|| Error::Config("source resolves no scene data".to_owned()))?;
        let opts = source.opts();

        let size = (1280u32, 720u32);
        let camera = Rc::new(RefCell::new(PanoCamera::new(
            scene_data.fov.unwrap_or(opts.fov),
            size.0 as f32 / size.1 as f32,
        )));
        let controls = ControlSet::new(opts.gyro);
        let overlays = OverlayManager::new(&source.scene_group);
        let mut history = History::new(opts.history);
        history.init(HistoryEntry {
            scene_id: scene_data.id.clone(),
            dataset_key: None,
        });

        let mut viewer = Self {
            bus: EventBus::new(),
            loader,
            tweens: TweenDriver::new(),
            backend,
            camera,
            controls,
            overlays,
            plugins: Vec::new(),
            effects: builtin_effects(),
            source,
            opts,
            scene_data,
            history,
            dataset_key: None,
            environment: None,
            entry_generation: 1,
            pending: Vec::new(),
            transition: None,
            stashed_upgrade: None,
            delayed: Vec::new(),
            fov_tween: None,
            frozen: true,
            interactable: true,
            ready_fired: false,
            pending_ready: false,
            started: false,
            disposed: false,
            elapsed_ms: 0.0,
            size,
        };

        let lng = viewer.scene_data.lng.unwrap_or(0.0);
        let lat = viewer.scene_data.lat.unwrap_or(0.0);
        viewer.set_look(lng, lat);
        Ok(viewer)
    }

    /// Start the render pipeline: publish the create event and begin loading
    /// the preview texture. Progress is driven by [`Viewer::tick`];
    /// completion is observable through the `scene-init` / `scene-load`
    /// events.
    pub fn run(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.emit_sync(topic::SCENE_CREATE, Payload::Scene(self.scene_data.clone()));

        let ticket = self
            .loader
            .load_image(&self.scene_data.pimg, self.entry_generation);
        self.pending.push(PendingLoad {
            ticket,
            generation: self.entry_generation,
            purpose: Purpose::InitPreview,
        });
    }

    /// Run one frame: apply completed loads, advance animations and the
    /// active transition, update the camera control (unless frozen), render,
    /// and deliver events. `dt_ms` is the frame delta in milliseconds.
    pub fn tick(&mut self, dt_ms: f32) {
        if self.disposed {
            return;
        }
        self.elapsed_ms += f64::from(dt_ms);

        let results = self.loader.drain();
        for result in results {
            self.handle_load(result);
        }

        self.tweens.advance(dt_ms);

        if let Some(mut active) = self.transition.take() {
            let done = {
                let mut ctx = TransitionCtx {
                    backend: &mut *self.backend,
                    outgoing: active.outgoing,
                    incoming: active.incoming,
                };
                active.effect.update(dt_ms, &mut ctx)
            };
            if done {
                self.finish_transition(active);
            } else {
                self.transition = Some(active);
            }
        }

        let mut due = Vec::new();
        self.delayed.retain_mut(|d| {
            d.remaining_ms -= dt_ms;
            if d.remaining_ms <= 0.0 {
                due.push((d.event, d.payload.clone()));
                false
            } else {
                true
            }
        });
        for (event, payload) in due {
            self.emit(event, payload);
        }

        self.tick_plugins(dt_ms);

        if !self.frozen {
            self.controls.update(dt_ms, &mut self.camera.borrow_mut());
        }
        self.render_frame();
        self.emit_sync(
            topic::RENDER_PROCESS,
            Payload::Frame {
                elapsed_ms: self.elapsed_ms,
            },
        );
        self.bus.drain();
    }

    /// Enter a successor scene.
    ///
    /// The current scene keeps rendering until the successor's first
    /// resource has loaded; any failure abandons the change and the current
    /// scene stays. A second `enter_next` before the first resolves
    /// supersedes it — the earlier result is discarded when it arrives.
    pub fn enter_next(&mut self, data: SceneData) {
        self.entry_generation += 1;
        let generation = self.entry_generation;

        if self.opts.pre_trans {
            let ticket = self.loader.load_image(&data.pimg, generation);
            self.pending.push(PendingLoad {
                ticket,
                generation,
                purpose: Purpose::NextPreview { data },
            });
        } else {
            let ticket = self.loader.load_image(&data.high_res_url(), generation);
            self.pending.push(PendingLoad {
                ticket,
                generation,
                purpose: Purpose::NextHighRes { data },
            });
        }
    }

    /// Enter a scene whose texture the caller already holds (space-jump
    /// effects): pushes history, resets environment parameters and swaps
    /// without re-fetching.
    pub fn enter_thru(&mut self, data: SceneData, texture: TextureHandle) {
        self.entry_generation += 1;
        self.history.push(HistoryEntry {
            scene_id: data.id.clone(),
            dataset_key: self.dataset_key.clone(),
        });
        self.reset_env(&data);
        self.replace_texture(texture, false);
    }

    /// Swap the active environment texture. Publishes attach-start, then the
    /// attach event after a short settle delay — unless `silent`, used for
    /// the same-scene sharpen upgrade that must not read as a scene change.
    pub fn replace_texture(&mut self, texture: TextureHandle, silent: bool) {
        if silent {
            self.swap_env_texture(texture);
            return;
        }
        self.emit(
            topic::SCENE_ATTACHSTART,
            Payload::Scene(self.scene_data.clone()),
        );
        self.swap_env_texture(texture);
        self.delayed.push(DelayedEvent {
            remaining_ms: ATTACH_SETTLE_MS,
            event: topic::SCENE_ATTACH,
            payload: Payload::Scene(self.scene_data.clone()),
        });
    }

    /// Signal entrance-animation completion: unfreeze, start the controls
    /// and publish the ready event. Called before the environment exists,
    /// the signal is held back until the init event has fired. Further calls
    /// for the same scene entry are ignored.
    pub fn no_timeline(&mut self) {
        if self.ready_fired {
            log::warn!("no_timeline called twice for scene {}", self.scene_data.id);
            return;
        }
        if self.environment.is_none() {
            self.pending_ready = true;
            return;
        }
        self.frozen = false;
        self.controls.start();
        self.ready_fired = true;
        self.emit_sync(topic::SCENE_READY, Payload::Scene(self.scene_data.clone()));
    }

    /// Point the camera: longitude in [-180, 180], latitude in [-90, 90]
    /// degrees. Longitude 0 / latitude 0 faces the image center.
    pub fn set_look(&mut self, lng: f32, lat: f32) {
        let theta = (180.0 - lng).to_radians();
        let phi = (90.0 - lat).to_radians();
        let orbit = &mut self.controls.orbit;
        orbit.reset();
        orbit.rotate_left(theta);
        orbit.rotate_up(phi);
        orbit.update(0.0, &mut self.camera.borrow_mut());
        if let Some(gyro) = self.controls.gyro.as_mut() {
            gyro.reset();
        }
        if let Some(vr) = self.controls.vr.as_mut() {
            vr.reset();
        }
    }

    /// Current camera orientation in degrees, the inverse of
    /// [`Viewer::set_look`].
    pub fn get_look(&self) -> (f32, f32) {
        let orbit = &self.controls.orbit;
        (
            180.0 - orbit.get_azimuthal_angle().to_degrees(),
            90.0 - orbit.get_polar_angle().to_degrees(),
        )
    }

    /// Set the field of view in degrees, animated when `fovTrans` is
    /// enabled. A prior fov animation still in flight is stopped first.
    pub fn set_fov(&mut self, fov: f32, duration_ms: Option<f32>) {
        if self.opts.fov_trans {
            if let Some(prev) = self.fov_tween.take() {
                self.tweens.stop(prev);
            }
            let camera = Rc::clone(&self.camera);
            let from = camera.borrow().fov_deg;
            let id = self
                .tweens
                .tween()
                .prop("fov", from, fov)
                .easing(Easing::QuadOut)
                .duration(duration_ms.unwrap_or(1000.0))
                .process(move |u| {
                    if let Some(value) = u.value("fov") {
                        camera.borrow_mut().fov_deg = value;
                    }
                })
                .start();
            self.fov_tween = Some(id);
        } else {
            self.camera.borrow_mut().fov_deg = fov;
        }
    }

    pub fn get_fov(&self) -> f32 {
        self.camera.borrow().fov_deg
    }

    /// Restore the configured default field of view.
    pub fn reset_fov(&mut self) {
        self.camera.borrow_mut().fov_deg = self.opts.fov;
    }

    /// Enable or disable the active camera control.
    pub fn make_control(&mut self, enabled: bool) {
        self.controls.set_enabled(enabled);
    }

    /// Lock or unlock user interaction (drag/zoom input).
    pub fn make_interact(&mut self, interactable: bool) {
        self.interactable = interactable;
    }

    pub fn reset_control(&mut self) {
        self.controls.reset();
    }

    pub fn set_rotate(&mut self, rotate: bool) {
        self.controls.orbit.auto_rotate = rotate;
    }

    pub fn set_rotate_speed(&mut self, speed: f32) {
        self.controls.orbit.auto_rotate_speed = speed;
    }

    /// Apply a pointer drag of `(dx, dy)` pixels to the orbit control.
    pub fn pointer_drag(&mut self, dx_px: f32, dy_px: f32) {
        if !self.interactable || self.frozen || !self.controls.orbit.enabled {
            return;
        }
        let (w, h) = self.size;
        if w == 0 || h == 0 {
            return;
        }
        let (v_fov, aspect) = {
            let camera = self.camera.borrow();
            (camera.fov_deg.to_radians(), camera.aspect)
        };
        let h_fov = 2.0 * ((v_fov / 2.0).tan() * aspect).atan();
        self.controls.orbit.rotate_left(dx_px * h_fov / w as f32);
        self.controls.orbit.rotate_up(dy_px * v_fov / h as f32);

        let (lng, lat) = self.get_look();
        self.emit(topic::UI_DRAG, Payload::Look { lng, lat });
    }

    /// Apply a scroll-zoom delta to the field of view.
    pub fn pointer_zoom(&mut self, delta: f32) {
        if !self.interactable {
            return;
        }
        let fov = (self.get_fov() - delta * 2.5).clamp(30.0, 150.0);
        self.camera.borrow_mut().fov_deg = fov;
        self.emit(topic::UI_ZOOM, Payload::None);
    }

    /// Respond to a surface resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        self.camera.borrow_mut().aspect = width as f32 / height as f32;
        self.backend.resize(width, height);
    }

    /// Step back through navigation history. Scenes whose dataset is no
    /// longer resident are restored by re-fetching their scene group.
    pub fn back(&mut self) {
        let Some(entry) = self.history.back() else {
            return;
        };
        if entry.scene_id == self.scene_data.id {
            return;
        }
        if let Some(scene) = self
            .source
            .scene_group
            .iter()
            .find(|s| s.id == entry.scene_id)
            .cloned()
        {
            self.enter_next(scene);
            return;
        }
        let (Some(surl), Some(key)) = (self.opts.surl.clone(), entry.dataset_key.clone()) else {
            log::warn!(
                "history entry for scene {} has no resident dataset and no group service",
                entry.scene_id
            );
            return;
        };
        let url = format!("{}&xrkey={}&sceneid={}", surl, key, entry.scene_id);
        let ticket = self.loader.load_json(&url, self.entry_generation);
        self.pending.push(PendingLoad {
            ticket,
            generation: self.entry_generation,
            purpose: Purpose::GroupFetch {
                scene_id: entry.scene_id,
            },
        });
    }

    /// Key identifying the dataset of subsequently visited scenes, recorded
    /// into history entries.
    pub fn set_dataset_key(&mut self, key: Option<String>) {
        self.dataset_key = key;
    }

    /// Install a plugin built by `build`.
    pub fn add_plugin<F>(&mut self, build: F)
    where
        F: FnOnce(&mut PluginCtl<'_>) -> Box<dyn Plugin>,
    {
        let mut nav = Vec::new();
        let plugin = {
            let mut ctl = PluginCtl {
                bus: &self.bus,
                controls: &mut self.controls,
                tweens: &self.tweens,
                camera: &self.camera,
                nav: &mut nav,
            };
            build(&mut ctl)
        };
        self.plugins.push(plugin);
        self.process_nav(nav);
    }

    /// Add a hotspot overlay to the current scene.
    pub fn add_overlay(&mut self, hotspot: Hotspot) {
        let mut overlays = std::mem::take(&mut self.overlays);
        overlays.create(hotspot, &mut *self.backend);
        self.overlays = overlays;
    }

    /// Remove a hotspot overlay from the current scene.
    pub fn remove_overlay(&mut self, hotspot_id: &str) {
        let mut overlays = std::mem::take(&mut self.overlays);
        overlays.remove(hotspot_id, &mut *self.backend);
        self.overlays = overlays;
    }

    /// Merge additional scene groups (overlay data for multi-dataset tours)
    /// and notify subscribers.
    pub fn supply_overlay_scenes(&mut self, scenes: Vec<SceneData>) {
        self.emit(topic::SCENE_RESET, Payload::Scene(self.scene_data.clone()));
        self.overlays.add_scenes(&scenes);
        for scene in scenes {
            if !self.source.scene_group.iter().any(|s| s.id == scene.id) {
                self.source.scene_group.push(scene);
            }
        }
    }

    /// Register a transition effect under a name usable from scene data.
    pub fn register_effect(&mut self, name: impl Into<String>, factory: EffectFactory) {
        self.effects.insert(name.into(), factory);
    }

    /// The event bus of this viewer instance.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn camera(&self) -> Rc<RefCell<PanoCamera>> {
        Rc::clone(&self.camera)
    }

    pub fn controls(&self) -> &ControlSet {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut ControlSet {
        &mut self.controls
    }

    /// The scene currently displayed.
    pub fn scene_data(&self) -> &SceneData {
        &self.scene_data
    }

    /// The loaded scene group.
    pub fn scene_group(&self) -> &[SceneData] {
        &self.source.scene_group
    }

    pub fn get_size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Upload decoded pixels through the backend; the handle is owned by the
    /// caller until passed back via `replace_texture` or `enter_thru`.
    pub fn upload_texture(
        &mut self,
        image: &crate::loader::LoadedImage,
        label: &str,
    ) -> TextureHandle {
        self.backend.upload_texture(image, label)
    }

    /// Tear the viewer down: cancel pending work, dispose every resource
    /// handle, plugins and overlays, and drop all subscriptions. Always
    /// completes; repeated calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.loader.cancel_all();
        self.tweens.clear();
        self.delayed.clear();
        self.pending.clear();

        if let Some(active) = self.transition.take() {
            // The outgoing environment is still `self.environment`; only the
            // half-faded incoming one needs explicit teardown here.
            self.backend.detach(active.incoming.mesh);
            self.backend.dispose_texture(active.incoming.texture);
            self.backend.dispose_mesh(active.incoming.mesh);
        }
        if let Some((_, texture)) = self.stashed_upgrade.take() {
            self.backend.dispose_texture(texture);
        }

        for plugin in &mut self.plugins {
            plugin.dispose();
        }
        self.plugins.clear();

        let mut overlays = std::mem::take(&mut self.overlays);
        overlays.dispose(&mut *self.backend);

        self.controls.stop();

        if let Some(env) = self.environment.take() {
            self.backend.detach(env.mesh);
            self.backend.dispose_texture(env.texture);
            self.backend.dispose_mesh(env.mesh);
        }

        self.bus.publish_sync(topic::RENDER_DISPOSE, Payload::None);
        self.bus.clear();
    }

    // ------------------------------------------------------------------
    // internal
    // ------------------------------------------------------------------

    fn render_frame(&mut self) {
        let state = self.camera.borrow().state();
        self.backend.render(&state);
    }

    fn handle_load(&mut self, result: LoadResult) {
        let Some(pos) = self.pending.iter().position(|p| p.ticket == result.ticket) else {
            return;
        };
        let pending = self.pending.remove(pos);

        let stale = pending.generation != self.entry_generation;
        let payload = match result.payload {
            Ok(payload) => payload,
            Err(e) => {
                if !stale {
                    self.report_load_failure(&result.url, &e);
                }
                return;
            }
        };

        match (pending.purpose, payload) {
            // Scene-entry loads from a superseded generation: discard.
            (
                Purpose::InitPreview
                | Purpose::InitHighRes
                | Purpose::NextPreview { .. }
                | Purpose::NextHighRes { .. },
                _,
            ) if stale => {
                log::debug!("discarding stale load of {}", result.url);
            }
            (Purpose::InitPreview, ResourcePayload::Image(image)) => {
                self.on_init_preview(&image);
            }
            (Purpose::InitHighRes, ResourcePayload::Image(image)) => {
                let texture = self.backend.upload_texture(&image, "environment");
                self.swap_env_texture(texture);
                self.emit_sync(topic::SCENE_LOAD, Payload::Scene(self.scene_data.clone()));
            }
            (Purpose::NextPreview { data }, ResourcePayload::Image(image)) => {
                self.on_next_preview(data, &image);
            }
            (Purpose::NextHighRes { data }, ResourcePayload::Image(image)) => {
                self.on_next_high_res(data, &image);
            }
            (Purpose::SilentUpgrade { data }, ResourcePayload::Image(image)) => {
                self.on_silent_upgrade(data, &image);
            }
            (Purpose::GroupFetch { scene_id }, ResourcePayload::Json(value)) => {
                self.on_group_fetch(&scene_id, value);
            }
            (_, payload) => {
                log::warn!("unexpected payload for {}: {:?}", result.url, payload);
            }
        }
    }

    fn on_init_preview(&mut self, image: &crate::loader::LoadedImage) {
        let texture = self.backend.upload_texture(image, "environment-preview");
        let mesh = self.backend.create_sphere(ENV_RADIUS);
        self.backend.set_texture(mesh, texture);
        self.backend.attach(mesh);
        self.environment = Some(Environment { mesh, texture });

        self.emit_sync(topic::SCENE_INIT, Payload::Scene(self.scene_data.clone()));
        self.render_frame();
        if self.pending_ready {
            self.pending_ready = false;
            self.no_timeline();
        }

        let ticket = self
            .loader
            .load_image(&self.scene_data.high_res_url(), self.entry_generation);
        self.pending.push(PendingLoad {
            ticket,
            generation: self.entry_generation,
            purpose: Purpose::InitHighRes,
        });
    }

    fn on_next_preview(&mut self, data: SceneData, image: &crate::loader::LoadedImage) {
        let texture = self.backend.upload_texture(image, "environment-preview");
        self.reset_env(&data);
        self.replace_history(&data);

        if self.opts.scene_trans {
            let effect = data.effect.clone().unwrap_or_else(|| "trans".to_owned());
            self.begin_transition(&effect, data.clone(), texture);
        } else {
            self.replace_texture(texture, false);
        }

        // Sharpen in the background; applied only if this scene is still
        // current when the load completes.
        let ticket = self
            .loader
            .load_image(&data.high_res_url(), self.entry_generation);
        self.pending.push(PendingLoad {
            ticket,
            generation: self.entry_generation,
            purpose: Purpose::SilentUpgrade { data },
        });
    }

    fn on_next_high_res(&mut self, data: SceneData, image: &crate::loader::LoadedImage) {
        let texture = self.backend.upload_texture(image, "environment");
        self.reset_env(&data);
        self.replace_history(&data);

        if self.opts.scene_trans {
            let effect = data.effect.clone().unwrap_or_else(|| "fade".to_owned());
            self.begin_transition(&effect, data, texture);
        } else {
            self.replace_texture(texture, false);
        }
    }

    fn on_silent_upgrade(&mut self, data: SceneData, image: &crate::loader::LoadedImage) {
        if data != self.scene_data {
            log::debug!("discarding sharpen for superseded scene {}", data.id);
            return;
        }
        let texture = self.backend.upload_texture(image, "environment");
        let mid_transition = self
            .transition
            .as_ref()
            .is_some_and(|active| active.data == data);
        if mid_transition {
            if let Some((_, old)) = self.stashed_upgrade.replace((data, texture)) {
                self.backend.dispose_texture(old);
            }
        } else {
            self.swap_env_texture(texture);
        }
    }

    fn on_group_fetch(&mut self, scene_id: &str, value: serde_json::Value) {
        let scenes: Vec<SceneData> = match serde_json::from_value(value["sceneGroup"].clone()) {
            Ok(scenes) => scenes,
            Err(e) => {
                self.report_load_failure(scene_id, &LoadError::Json(e.to_string()));
                return;
            }
        };
        let target = scenes.iter().find(|s| s.id == scene_id).cloned();
        self.supply_overlay_scenes(scenes);
        match target {
            Some(scene) => {
                self.enter_next(scene);
                self.emit(topic::THRU_BACK, Payload::Value(value));
            }
            None => log::warn!("scene {} missing from re-fetched group", scene_id),
        }
    }

    /// Reset per-scene environment parameters and make `data` current.
    /// The look angles only apply when no gyroscope drives the camera.
    fn reset_env(&mut self, data: &SceneData) {
        let fov = data.fov.unwrap_or(self.opts.fov);
        self.scene_data = data.clone();
        self.ready_fired = false;

        if self.controls.gyro.is_none() {
            if let (Some(lng), Some(lat)) = (data.lng, data.lat) {
                self.set_look(lng, lat);
            }
        }
        if (fov - self.camera.borrow().fov_deg).abs() > f32::EPSILON {
            self.set_fov(fov, None);
        }
    }

    fn replace_history(&mut self, data: &SceneData) {
        self.history.replace(HistoryEntry {
            scene_id: data.id.clone(),
            dataset_key: self.dataset_key.clone(),
        });
    }

    fn swap_env_texture(&mut self, texture: TextureHandle) {
        match self.environment.as_mut() {
            Some(env) => {
                let old = env.texture;
                env.texture = texture;
                self.backend.set_texture(env.mesh, texture);
                self.backend.dispose_texture(old);
            }
            None => {
                log::warn!("texture swap without an environment");
                self.backend.dispose_texture(texture);
            }
        }
    }

    fn begin_transition(&mut self, name: &str, data: SceneData, texture: TextureHandle) {
        // A still-running handoff from a superseded entry is completed
        // instantly so each environment is torn down exactly once.
        if let Some(active) = self.transition.take() {
            self.finish_transition(active);
        }
        let Some(outgoing) = self.environment else {
            self.replace_texture(texture, false);
            return;
        };

        self.emit(topic::SCENE_ATTACHSTART, Payload::Scene(data.clone()));

        let mesh = self.backend.create_sphere(ENV_RADIUS);
        self.backend.set_texture(mesh, texture);
        self.backend.set_opacity(mesh, 0.0);
        self.backend.attach(mesh);
        let incoming = Environment { mesh, texture };

        let factory = match self.effects.get(name) {
            Some(factory) => *factory,
            None => {
                log::warn!("unknown transition effect '{}', using fade", name);
                self.effects["fade"]
            }
        };
        let mut effect = factory();
        let mut ctx = TransitionCtx {
            backend: &mut *self.backend,
            outgoing,
            incoming,
        };
        effect.begin(&mut ctx);

        self.transition = Some(ActiveTransition {
            effect,
            outgoing,
            incoming,
            data,
        });
    }

    fn finish_transition(&mut self, active: ActiveTransition) {
        self.backend.set_opacity(active.incoming.mesh, 1.0);
        self.backend.detach(active.outgoing.mesh);
        self.backend.dispose_texture(active.outgoing.texture);
        self.backend.dispose_mesh(active.outgoing.mesh);
        self.environment = Some(active.incoming);
        self.emit(topic::SCENE_ATTACH, Payload::Scene(active.data));

        if let Some((data, texture)) = self.stashed_upgrade.take() {
            if data == self.scene_data {
                self.swap_env_texture(texture);
            } else {
                self.backend.dispose_texture(texture);
            }
        }
    }

    fn report_load_failure(&mut self, url: &str, error: &LoadError) {
        log::warn!("load of {} failed: {}", url, error);
        self.emit(
            topic::RENDER_EXCEPTION,
            Payload::Error {
                message: format!("{}: {}", url, error),
            },
        );
    }

    /// Deliver an event to overlays and plugins, then queue it on the bus.
    fn emit(&mut self, event: &'static str, payload: Payload) {
        self.notify_components(event, &payload);
        self.bus.publish(event, payload);
    }

    /// Deliver an event to overlays, plugins and bus subscribers in-call.
    fn emit_sync(&mut self, event: &'static str, payload: Payload) {
        self.notify_components(event, &payload);
        self.bus.publish_sync(event, payload);
    }

    fn notify_components(&mut self, event: &'static str, payload: &Payload) {
        let mut overlays = std::mem::take(&mut self.overlays);
        overlays.on_event(event, payload, &mut *self.backend);
        self.overlays = overlays;

        let mut plugins = std::mem::take(&mut self.plugins);
        let mut nav = Vec::new();
        {
            let mut ctl = PluginCtl {
                bus: &self.bus,
                controls: &mut self.controls,
                tweens: &self.tweens,
                camera: &self.camera,
                nav: &mut nav,
            };
            for plugin in plugins.iter_mut() {
                plugin.on_event(event, payload, &mut ctl);
            }
        }
        plugins.extend(std::mem::take(&mut self.plugins));
        self.plugins = plugins;
        self.process_nav(nav);
    }

    fn tick_plugins(&mut self, dt_ms: f32) {
        let mut plugins = std::mem::take(&mut self.plugins);
        let mut nav = Vec::new();
        {
            let mut ctl = PluginCtl {
                bus: &self.bus,
                controls: &mut self.controls,
                tweens: &self.tweens,
                camera: &self.camera,
                nav: &mut nav,
            };
            for plugin in plugins.iter_mut() {
                plugin.tick(dt_ms, &mut ctl);
            }
        }
        plugins.extend(std::mem::take(&mut self.plugins));
        self.plugins = plugins;
        self.process_nav(nav);
    }

    fn process_nav(&mut self, nav: Vec<String>) {
        for id in nav {
            match self.source.scene_group.iter().find(|s| s.id == id).cloned() {
                Some(scene) => self.enter_next(scene),
                None => log::warn!("navigation requested to unknown scene {}", id),
            }
        }
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.dispose();
    }
}
