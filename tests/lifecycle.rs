//! End-to-end lifecycle tests against a recording backend and an in-memory
//! resource fetcher.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use horama::{
    CameraState, EventBus, Fetcher, LoadError, LoadedImage, MeshHandle, RenderBackend,
    ResourceLoader, SourceConfig, TextureHandle, Vec3, Viewer, topic,
};

// ---------------------------------------------------------------------------
// test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BackendState {
    next_id: u64,
    live_textures: HashSet<u64>,
    live_meshes: HashSet<u64>,
    texture_disposals: HashMap<u64, u32>,
    mesh_disposals: HashMap<u64, u32>,
    allocated_textures: u64,
    allocated_meshes: u64,
    attached: Vec<u64>,
    mesh_textures: HashMap<u64, u64>,
    opacities: HashMap<u64, f32>,
    renders: u64,
}

/// Backend double that counts every allocation, attachment and disposal and
/// asserts no disposed handle is ever rendered or disposed twice.
#[derive(Clone, Default)]
struct RecordingBackend {
    state: Rc<RefCell<BackendState>>,
}

impl RecordingBackend {
    fn live_meshes(&self) -> usize {
        self.state.borrow().live_meshes.len()
    }

    fn live_textures(&self) -> usize {
        self.state.borrow().live_textures.len()
    }

    fn attached_count(&self) -> usize {
        self.state.borrow().attached.len()
    }

    fn renders(&self) -> u64 {
        self.state.borrow().renders
    }

    fn assert_all_disposed_exactly_once(&self) {
        let state = self.state.borrow();
        assert!(state.live_textures.is_empty(), "textures leaked");
        assert!(state.live_meshes.is_empty(), "meshes leaked");
        assert_eq!(
            state.texture_disposals.len() as u64,
            state.allocated_textures,
            "every texture must be disposed"
        );
        assert_eq!(
            state.mesh_disposals.len() as u64,
            state.allocated_meshes,
            "every mesh must be disposed"
        );
        for (id, count) in state.texture_disposals.iter().chain(&state.mesh_disposals) {
            assert_eq!(*count, 1, "handle {} disposed {} times", id, count);
        }
    }
}

impl RenderBackend for RecordingBackend {
    fn upload_texture(&mut self, _image: &LoadedImage, _label: &str) -> TextureHandle {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.live_textures.insert(id);
        state.allocated_textures += 1;
        TextureHandle(id)
    }

    fn create_sphere(&mut self, _radius: f32) -> MeshHandle {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.live_meshes.insert(id);
        state.allocated_meshes += 1;
        MeshHandle(id)
    }

    fn create_plane(&mut self, _width: f32, _height: f32) -> MeshHandle {
        self.create_sphere(0.0)
    }

    fn set_texture(&mut self, mesh: MeshHandle, texture: TextureHandle) {
        let mut state = self.state.borrow_mut();
        assert!(state.live_textures.contains(&texture.0), "stale texture set");
        state.mesh_textures.insert(mesh.0, texture.0);
    }

    fn set_opacity(&mut self, mesh: MeshHandle, opacity: f32) {
        self.state.borrow_mut().opacities.insert(mesh.0, opacity);
    }

    fn set_position(&mut self, _mesh: MeshHandle, _position: Vec3) {}

    fn attach(&mut self, mesh: MeshHandle) {
        let mut state = self.state.borrow_mut();
        if !state.attached.contains(&mesh.0) {
            state.attached.push(mesh.0);
        }
    }

    fn detach(&mut self, mesh: MeshHandle) {
        self.state.borrow_mut().attached.retain(|id| *id != mesh.0);
    }

    fn render(&mut self, _camera: &CameraState) {
        let mut state = self.state.borrow_mut();
        let attached = state.attached.clone();
        for mesh in attached {
            assert!(
                state.live_meshes.contains(&mesh),
                "render references disposed mesh {}",
                mesh
            );
            if let Some(texture) = state.mesh_textures.get(&mesh) {
                assert!(
                    state.live_textures.contains(texture),
                    "render references disposed texture {}",
                    texture
                );
            }
        }
        state.renders += 1;
    }

    fn dispose_texture(&mut self, texture: TextureHandle) {
        let mut state = self.state.borrow_mut();
        assert!(
            state.live_textures.remove(&texture.0),
            "texture {} disposed twice",
            texture.0
        );
        let in_use = state.attached.iter().any(|mesh| {
            state.mesh_textures.get(mesh) == Some(&texture.0)
        });
        assert!(!in_use, "texture {} disposed while attached", texture.0);
        *state.texture_disposals.entry(texture.0).or_insert(0) += 1;
    }

    fn dispose_mesh(&mut self, mesh: MeshHandle) {
        let mut state = self.state.borrow_mut();
        assert!(
            state.live_meshes.remove(&mesh.0),
            "mesh {} disposed twice",
            mesh.0
        );
        state.attached.retain(|id| *id != mesh.0);
        *state.mesh_disposals.entry(mesh.0).or_insert(0) += 1;
    }

    fn resize(&mut self, _width: u32, _height: u32) {}
}

struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    delays: HashMap<String, u64>,
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        if let Some(ms) = self.delays.get(url) {
            thread::sleep(Duration::from_millis(*ms));
        }
        self.files.get(url).cloned().ok_or_else(|| {
            LoadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                url.to_owned(),
            ))
        })
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([120, 80, 40, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

// ---------------------------------------------------------------------------
// fixtures
// ---------------------------------------------------------------------------

const FRAME_MS: f32 = 16.0;

fn source_json(pano: &str) -> String {
    format!(
        r#"{{
            "pano": {pano},
            "sceneGroup": [
                {{"id": "s1", "pimg": "p1.jpg", "simg": "s1.jpg",
                  "fov": 90, "lng": 0, "lat": 0,
                  "hotspots": [{{"id": "h1", "lng": 30, "lat": -10, "sceneId": "s2"}}]}},
                {{"id": "s2", "pimg": "p2.jpg", "simg": "s2.jpg", "fov": 95}},
                {{"id": "s3", "pimg": "p3.jpg", "simg": "s3.jpg"}}
            ]
        }}"#
    )
}

fn build_viewer(pano: &str, delays: &[(&str, u64)]) -> (Viewer, RecordingBackend) {
    let backend = RecordingBackend::default();
    let source = SourceConfig::from_json(&source_json(pano)).unwrap();

    let mut files = HashMap::new();
    for url in ["p1.jpg", "s1.jpg", "p2.jpg", "s2.jpg", "p3.jpg", "s3.jpg"] {
        files.insert(url.to_owned(), png_bytes());
    }
    let delays = delays
        .iter()
        .map(|(url, ms)| ((*url).to_owned(), *ms))
        .collect();
    let loader = ResourceLoader::new(Arc::new(MemoryFetcher { files, delays }));

    let viewer = Viewer::with_loader(Box::new(backend.clone()), source, loader).unwrap();
    (viewer, backend)
}

fn record_topics(bus: &EventBus, topics: &[&'static str]) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for event in topics {
        let log = Rc::clone(&log);
        let name = *event;
        bus.subscribe(event, move |_| log.borrow_mut().push(name.to_owned()));
    }
    log
}

/// Tick the viewer until the predicate holds, with a wall-clock guard for
/// the worker-thread loads.
fn pump_until(viewer: &mut Viewer, mut pred: impl FnMut(&mut Viewer) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        viewer.tick(FRAME_MS);
        if pred(viewer) {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Run the startup pipeline to its stable state (high-res loaded).
fn settle(viewer: &mut Viewer) {
    let log = record_topics(viewer.bus(), &[topic::SCENE_LOAD]);
    assert!(pump_until(viewer, |_| count(&log, topic::SCENE_LOAD) == 1));
}

fn count(log: &Rc<RefCell<Vec<String>>>, event: &str) -> usize {
    log.borrow().iter().filter(|e| e.as_str() == event).count()
}

fn index_of(log: &Rc<RefCell<Vec<String>>>, event: &str) -> Option<usize> {
    log.borrow().iter().position(|e| e == event)
}

// ---------------------------------------------------------------------------
// tests
// ---------------------------------------------------------------------------

#[test]
fn startup_scenario_publishes_create_init_load_in_order() {
    let (mut viewer, _backend) = build_viewer("{}", &[]);
    let log = record_topics(
        viewer.bus(),
        &[topic::SCENE_CREATE, topic::SCENE_INIT, topic::SCENE_LOAD],
    );

    viewer.run();
    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::SCENE_LOAD) == 1
    }));

    assert_eq!(
        *log.borrow(),
        vec![topic::SCENE_CREATE, topic::SCENE_INIT, topic::SCENE_LOAD]
    );
    assert!((viewer.get_fov() - 90.0).abs() < 1e-4);
    let (lng, lat) = viewer.get_look();
    assert!(lng.to_radians().abs() < 1e-6);
    assert!(lat.to_radians().abs() < 1e-6);
}

#[test]
fn lifecycle_topics_fire_exactly_once_per_entry() {
    let (mut viewer, _backend) = build_viewer("{}", &[]);
    let log = record_topics(
        viewer.bus(),
        &[
            topic::SCENE_CREATE,
            topic::SCENE_INIT,
            topic::SCENE_LOAD,
            topic::SCENE_READY,
        ],
    );

    viewer.run();
    // Entrance completion may be signalled before the preview resolves; the
    // ready event still follows init.
    viewer.no_timeline();
    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::SCENE_LOAD) == 1
    }));
    viewer.no_timeline();
    viewer.tick(FRAME_MS);

    for event in [
        topic::SCENE_CREATE,
        topic::SCENE_INIT,
        topic::SCENE_LOAD,
        topic::SCENE_READY,
    ] {
        assert_eq!(count(&log, event), 1, "{} must fire exactly once", event);
    }
    assert!(index_of(&log, topic::SCENE_CREATE) < index_of(&log, topic::SCENE_INIT));
    assert!(index_of(&log, topic::SCENE_INIT) < index_of(&log, topic::SCENE_LOAD));
    assert!(index_of(&log, topic::SCENE_INIT) < index_of(&log, topic::SCENE_READY));
    assert!(!viewer.is_frozen());
}

#[test]
fn current_scene_changes_only_after_the_load_resolves() {
    let (mut viewer, _backend) = build_viewer("{}", &[("s2.jpg", 80)]);
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);

    let next = viewer.scene_group()[1].clone();
    viewer.enter_next(next);
    assert_eq!(viewer.scene_data().id, "s1", "change must wait for the load");

    assert!(pump_until(&mut viewer, |v| v.scene_data().id == "s2"));
    assert!((viewer.get_fov() - 95.0).abs() < 1e-4);
}

#[test]
fn rapid_double_navigation_discards_the_first_result() {
    let (mut viewer, _backend) = build_viewer("{}", &[("s3.jpg", 250)]);
    let log = record_topics(viewer.bus(), &[topic::SCENE_ATTACHSTART]);
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);

    let slow = viewer.scene_group()[2].clone();
    let fast = viewer.scene_group()[1].clone();
    viewer.enter_next(slow);
    viewer.enter_next(fast);

    assert!(pump_until(&mut viewer, |v| v.scene_data().id == "s2"));

    // Wait out the slow load; its result must be discarded.
    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline {
        viewer.tick(FRAME_MS);
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(viewer.scene_data().id, "s2");
    assert_eq!(count(&log, topic::SCENE_ATTACHSTART), 1);
}

#[test]
fn attach_follows_attachstart_after_the_settle_delay() {
    let (mut viewer, _backend) = build_viewer("{}", &[]);
    let log = record_topics(
        viewer.bus(),
        &[topic::SCENE_ATTACHSTART, topic::SCENE_ATTACH],
    );
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);

    let next = viewer.scene_group()[1].clone();
    viewer.enter_next(next);
    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::SCENE_ATTACHSTART) == 1
    }));
    assert_eq!(count(&log, topic::SCENE_ATTACH), 0);

    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::SCENE_ATTACH) == 1
    }));
    assert!(index_of(&log, topic::SCENE_ATTACHSTART) < index_of(&log, topic::SCENE_ATTACH));
}

#[test]
fn every_superseded_handle_is_disposed_exactly_once() {
    let (mut viewer, backend) = build_viewer("{}", &[]);
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);

    for scene_index in [1usize, 2, 0] {
        let next = viewer.scene_group()[scene_index].clone();
        let id = next.id.clone();
        viewer.enter_next(next);
        assert!(pump_until(&mut viewer, |v| v.scene_data().id == id));
    }

    assert!(backend.renders() > 0);
    viewer.dispose();
    backend.assert_all_disposed_exactly_once();
}

#[test]
fn transition_brackets_the_handoff_and_upgrades_silently() {
    let (mut viewer, backend) = build_viewer(r#"{"preTrans": true, "sceneTrans": true}"#, &[]);
    let log = record_topics(
        viewer.bus(),
        &[topic::SCENE_ATTACHSTART, topic::SCENE_ATTACH],
    );
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);

    let next = viewer.scene_group()[1].clone();
    viewer.enter_next(next);
    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::SCENE_ATTACHSTART) == 1
    }));
    // Both environments render while the effect runs.
    assert!(backend.attached_count() >= 2);

    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::SCENE_ATTACH) == 1
    }));
    assert_eq!(viewer.scene_data().id, "s2");

    // The sharpen upgrade leaves one environment, one texture (markers of s1
    // were dropped when its scene detached).
    assert!(pump_until(&mut viewer, |_| backend.live_textures() == 1));
    assert_eq!(backend.live_meshes(), 1);

    viewer.dispose();
    backend.assert_all_disposed_exactly_once();
}

#[test]
fn load_failure_keeps_the_previous_scene_stable() {
    let (mut viewer, backend) = build_viewer("{}", &[]);
    let log = record_topics(viewer.bus(), &[topic::RENDER_EXCEPTION]);
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);
    let renders_before = backend.renders();

    let mut broken = viewer.scene_group()[1].clone();
    broken.simg = "missing.jpg".to_owned();
    viewer.enter_next(broken);

    assert!(pump_until(&mut viewer, |_| {
        count(&log, topic::RENDER_EXCEPTION) == 1
    }));
    assert_eq!(viewer.scene_data().id, "s1");
    assert!(backend.renders() > renders_before, "rendering must continue");
}

#[test]
fn hotspot_markers_follow_the_scene() {
    let (mut viewer, backend) = build_viewer("{}", &[]);
    viewer.run();
    viewer.no_timeline();
    settle(&mut viewer);
    // Environment sphere plus the s1 marker.
    assert_eq!(backend.live_meshes(), 2);

    let next = viewer.scene_group()[1].clone();
    viewer.enter_next(next);
    assert!(pump_until(&mut viewer, |v| v.scene_data().id == "s2"));
    assert!(pump_until(&mut viewer, |_| backend.live_meshes() == 1));

    viewer.dispose();
    backend.assert_all_disposed_exactly_once();
}

#[test]
fn look_angles_round_trip_through_the_viewer() {
    let (mut viewer, _backend) = build_viewer("{}", &[]);
    for lng in [-180.0f32, -90.0, 0.0, 90.0, 179.0] {
        for lat in [-90.0f32, -45.0, 0.0, 45.0, 90.0] {
            viewer.set_look(lng, lat);
            let (lng_back, lat_back) = viewer.get_look();
            assert!((lng_back - lng).to_radians().abs() < 1e-6);
            assert!((lat_back - lat).to_radians().abs() < 1e-6);
        }
    }
}

#[test]
fn empty_source_is_a_config_error() {
    let source = SourceConfig::from_json(r#"{"sceneGroup": []}"#).unwrap();
    let result = Viewer::new(Box::new(RecordingBackend::default()), source);
    assert!(matches!(result, Err(horama::Error::Config(_))));
}

#[test]
fn frozen_viewer_still_renders_but_ignores_control_updates() {
    let (mut viewer, backend) = build_viewer("{}", &[]);
    let log = record_topics(viewer.bus(), &[topic::SCENE_INIT]);
    viewer.run();
    assert!(pump_until(&mut viewer, |_| count(&log, topic::SCENE_INIT) == 1));
    assert!(backend.renders() > 0);
    assert!(viewer.is_frozen());

    viewer.set_rotate_speed(10.0);
    viewer.set_rotate(true);
    let (lng_before, _) = viewer.get_look();
    viewer.tick(FRAME_MS);
    let (lng_frozen, _) = viewer.get_look();
    assert!((lng_frozen - lng_before).abs() < 1e-6);

    viewer.no_timeline();
    viewer.tick(FRAME_MS);
    let (lng_after, _) = viewer.get_look();
    assert!((lng_after - lng_frozen).abs() > 1e-6);
}

#[test]
fn dispose_discards_late_results_and_is_idempotent() {
    let (mut viewer, backend) = build_viewer("{}", &[("s1.jpg", 150)]);
    viewer.run();
    // Preview resolves, high-res is still in flight.
    assert!(pump_until(&mut viewer, |_| backend.live_textures() == 1));

    viewer.dispose();
    viewer.dispose();
    backend.assert_all_disposed_exactly_once();

    // A late high-res result must not resurrect any state.
    thread::sleep(Duration::from_millis(250));
    viewer.tick(FRAME_MS);
    backend.assert_all_disposed_exactly_once();
}
