//! Scene descriptors and viewer source configuration.
//!
//! The wire format is JSON: a `sceneGroup` of scene descriptors with fields
//! `id, pimg, simg, suffix, fov, lng, lat, info, hotspots`, plus a `pano`
//! options block. Scene data is immutable once constructed — a new value is
//! built on every scene change — and compares equal by identifier.

use serde::Deserialize;

use crate::error::Error;

/// A clickable marker anchored to a spherical coordinate in a scene.
#[derive(Clone, Debug, Deserialize)]
pub struct Hotspot {
    pub id: String,
    /// Marker kind; defaults to "dom".
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub lng: f32,
    pub lat: f32,
    #[serde(default)]
    pub img: Option<String>,
    /// Scene to jump to when activated.
    #[serde(rename = "sceneId", default)]
    pub scene_id: Option<String>,
}

/// Attribution block shown by the copyright overlay.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SceneInfo {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// One scene of a tour.
#[derive(Clone, Debug, Deserialize)]
pub struct SceneData {
    pub id: String,
    /// Preview-quality image, shown immediately.
    pub pimg: String,
    /// High-resolution image, swapped in progressively.
    pub simg: String,
    /// Format suffix appended to `simg`.
    #[serde(default)]
    pub suffix: Option<String>,
    /// Scene field of view in degrees.
    #[serde(default)]
    pub fov: Option<f32>,
    /// Initial look longitude, degrees in [-180, 180].
    #[serde(default)]
    pub lng: Option<f32>,
    /// Initial look latitude, degrees in [-90, 90].
    #[serde(default)]
    pub lat: Option<f32>,
    #[serde(default)]
    pub info: Option<SceneInfo>,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
    /// Transition-effect name used when entering this scene.
    #[serde(default)]
    pub effect: Option<String>,
}

impl SceneData {
    /// Full URL of the high-resolution image.
    pub fn high_res_url(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}{}", self.simg, suffix),
            None => self.simg.clone(),
        }
    }
}

impl PartialEq for SceneData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SceneData {}

fn default_fov() -> f32 {
    90.0
}

/// Viewer options carried in the source's `pano` block.
#[derive(Clone, Debug, Deserialize)]
pub struct ViewerOpts {
    /// Construct the gyroscope strategy alongside orbit.
    #[serde(default)]
    pub gyro: bool,
    /// Fallback field of view for scenes that set none.
    #[serde(default = "default_fov")]
    pub fov: f32,
    /// Play a transition effect on scene change instead of a direct swap.
    #[serde(rename = "sceneTrans", default)]
    pub scene_trans: bool,
    /// Load the successor's preview before switching; defeats `sceneTrans`
    /// latency by showing the low-res frame first.
    #[serde(rename = "preTrans", default)]
    pub pre_trans: bool,
    /// Animate `set_fov` instead of applying it immediately.
    #[serde(rename = "fovTrans", default)]
    pub fov_trans: bool,
    /// Record navigation history.
    #[serde(default)]
    pub history: bool,
    /// Scene-group service used to restore datasets on back-navigation.
    #[serde(default)]
    pub surl: Option<String>,
}

impl Default for ViewerOpts {
    fn default() -> Self {
        Self {
            gyro: false,
            fov: default_fov(),
            scene_trans: false,
            pre_trans: false,
            fov_trans: false,
            history: false,
            surl: None,
        }
    }
}

/// The embedding application's source configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "sceneGroup")]
    pub scene_group: Vec<SceneData>,
    #[serde(rename = "defaultSceneId", default)]
    pub default_scene_id: Option<String>,
    #[serde(default)]
    pub pano: Option<ViewerOpts>,
}

impl SourceConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Resolve the initial scene: the default id if it matches, otherwise
    /// the first of the group.
    pub fn find_scene(&self) -> Option<&SceneData> {
        match &self.default_scene_id {
            Some(id) => self
                .scene_group
                .iter()
                .find(|s| &s.id == id)
                .or_else(|| self.scene_group.first()),
            None => self.scene_group.first(),
        }
    }

    /// The effective viewer options.
    pub fn opts(&self) -> ViewerOpts {
        self.pano.clone().unwrap_or_default()
    }
}
