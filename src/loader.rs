//! Asynchronous resource loading.
//!
//! Fetch and decode run on worker threads; results come home over a channel
//! and are drained on the main task queue once per render tick, so the scene
//! graph is only ever mutated between ticks. Every request carries a ticket
//! and the scene-entry generation that issued it — stale results are
//! discarded at drain time, never applied.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

use crate::error::LoadError;

/// Decoded RGBA8 image data, ready for texture upload.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Byte source behind the loader. The default implementation reads from the
/// filesystem; embedders may substitute HTTP fetch or an in-memory cache.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads resources from local paths.
pub struct FsFetcher;

impl Fetcher for FsFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        Ok(std::fs::read(url)?)
    }
}

/// Handle to one in-flight load request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// The decoded payload of a completed load.
#[derive(Debug)]
pub enum ResourcePayload {
    Image(LoadedImage),
    Json(serde_json::Value),
}

/// A completed load, successful or not, tagged with its request identity.
#[derive(Debug)]
pub struct LoadResult {
    pub ticket: Ticket,
    pub generation: u64,
    pub url: String,
    pub payload: Result<ResourcePayload, LoadError>,
}

/// Spawns fetch/decode work and collects completions.
pub struct ResourceLoader {
    fetcher: Arc<dyn Fetcher>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
    next_ticket: u64,
    cancelled: HashSet<Ticket>,
    closed: bool,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let (tx, rx) = channel();
        Self {
            fetcher,
            tx,
            rx,
            next_ticket: 0,
            cancelled: HashSet::new(),
            closed: false,
        }
    }

    /// Fetch and decode an image on a worker thread.
    pub fn load_image(&mut self, url: &str, generation: u64) -> Ticket {
        self.spawn(url, generation, decode_image)
    }

    /// Fetch and parse a JSON payload on a worker thread.
    pub fn load_json(&mut self, url: &str, generation: u64) -> Ticket {
        self.spawn(url, generation, decode_json)
    }

    /// Mark a request cancelled; its result is dropped at drain time.
    pub fn cancel(&mut self, ticket: Ticket) {
        self.cancelled.insert(ticket);
    }

    /// Drop every pending and future result. Used on viewer dispose.
    pub fn cancel_all(&mut self) {
        self.closed = true;
        self.cancelled.clear();
    }

    /// Collect completed loads. Non-blocking; cancelled results are dropped
    /// here and never surfaced.
    pub fn drain(&mut self) -> Vec<LoadResult> {
        let mut out = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            if self.closed || self.cancelled.remove(&result.ticket) {
                log::debug!("dropping cancelled load of {}", result.url);
                continue;
            }
            out.push(result);
        }
        out
    }

    fn spawn(
        &mut self,
        url: &str,
        generation: u64,
        decode: fn(Vec<u8>) -> Result<ResourcePayload, LoadError>,
    ) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let url = url.to_owned();
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();

        thread::spawn(move || {
            let payload = fetcher.fetch(&url).and_then(decode);
            // The receiver is gone once the viewer is dropped; nothing to do.
            let _ = tx.send(LoadResult {
                ticket,
                generation,
                url,
                payload,
            });
        });

        ticket
    }
}

fn decode_image(bytes: Vec<u8>) -> Result<ResourcePayload, LoadError> {
    let img = image::load_from_memory(&bytes)
        .map_err(|e| LoadError::Decode(e.to_string()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(ResourcePayload::Image(LoadedImage {
        pixels: img.into_raw(),
        width,
        height,
    }))
}

fn decode_json(bytes: Vec<u8>) -> Result<ResourcePayload, LoadError> {
    let value = serde_json::from_slice(&bytes).map_err(|e| LoadError::Json(e.to_string()))?;
    Ok(ResourcePayload::Json(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([16, 32, 64, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    struct MapFetcher(HashMap<String, Vec<u8>>);

    impl Fetcher for MapFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
            self.0.get(url).cloned().ok_or_else(|| {
                LoadError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            })
        }
    }

    fn drain_one(loader: &mut ResourceLoader) -> Option<LoadResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let mut results = loader.drain();
            if !results.is_empty() {
                return Some(results.remove(0));
            }
            thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn image_load_round_trip() {
        let mut map = HashMap::new();
        map.insert("p.png".to_owned(), png_bytes(4, 2));
        let mut loader = ResourceLoader::new(Arc::new(MapFetcher(map)));

        let ticket = loader.load_image("p.png", 7);
        let result = drain_one(&mut loader).expect("load completed");

        assert_eq!(result.ticket, ticket);
        assert_eq!(result.generation, 7);
        match result.payload.unwrap() {
            ResourcePayload::Image(img) => {
                assert_eq!((img.width, img.height), (4, 2));
                assert_eq!(img.pixels.len(), 4 * 2 * 4);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn json_load_round_trip() {
        let mut map = HashMap::new();
        map.insert("g.json".to_owned(), br#"{"id":"s1"}"#.to_vec());
        let mut loader = ResourceLoader::new(Arc::new(MapFetcher(map)));

        loader.load_json("g.json", 1);
        let result = drain_one(&mut loader).expect("load completed");
        match result.payload.unwrap() {
            ResourcePayload::Json(v) => assert_eq!(v["id"], "s1"),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn missing_resource_surfaces_error() {
        let mut loader = ResourceLoader::new(Arc::new(MapFetcher(HashMap::new())));
        loader.load_image("nope.png", 0);
        let result = drain_one(&mut loader).expect("load completed");
        assert!(result.payload.is_err());
    }

    #[test]
    fn cancelled_results_are_dropped() {
        let mut map = HashMap::new();
        map.insert("p.png".to_owned(), png_bytes(2, 2));
        let mut loader = ResourceLoader::new(Arc::new(MapFetcher(map)));

        let ticket = loader.load_image("p.png", 0);
        loader.cancel(ticket);

        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            assert!(loader.drain().is_empty());
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn cancel_all_closes_the_drain() {
        let mut map = HashMap::new();
        map.insert("p.png".to_owned(), png_bytes(2, 2));
        let mut loader = ResourceLoader::new(Arc::new(MapFetcher(map)));

        loader.load_image("p.png", 0);
        loader.cancel_all();

        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            assert!(loader.drain().is_empty());
            thread::sleep(Duration::from_millis(5));
        }
    }
}
