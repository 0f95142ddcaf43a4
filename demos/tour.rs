//! Minimal two-scene tour.
//!
//! Expects the referenced images next to the working directory:
//!
//! ```sh
//! cargo run --example tour
//! ```

use horama::{AppConfig, RotatePlugin, SourceConfig, run_viewer};

fn main() {
    let source = SourceConfig::from_json(
        r#"{
            "pano": {"fov": 90, "preTrans": true, "sceneTrans": true},
            "sceneGroup": [
                {"id": "hall", "pimg": "assets/hall-preview.jpg", "simg": "assets/hall", "suffix": ".jpg",
                 "lng": 0, "lat": 0,
                 "hotspots": [{"id": "to-garden", "lng": 40, "lat": -5, "sceneId": "garden"}]},
                {"id": "garden", "pimg": "assets/garden-preview.jpg", "simg": "assets/garden", "suffix": ".jpg",
                 "fov": 100}
            ]
        }"#,
    )
    .expect("valid tour source");

    run_viewer(AppConfig::new().title("Horama Tour"), source, |viewer| {
        viewer.add_plugin(|_| Box::new(RotatePlugin::new(0.15)));
    })
    .expect("viewer run");
}
