//! Per-viewer publish/subscribe channel.
//!
//! Every viewer instance owns one [`EventBus`]. Topics are flat strings,
//! grouped by convention into scene / render / vr / ui / thru / animation
//! namespaces (see [`topic`]). `publish` defers delivery until the bus is
//! drained at the end of the current tick; `publish_sync` delivers in-call,
//! which the lifecycle uses for events whose subscribers must observe state
//! before the next render tick.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::scene::SceneData;

/// Well-known topic names.
pub mod topic {
    pub const SCENE_CREATE: &str = "scene-create";
    pub const SCENE_INIT: &str = "scene-init";
    pub const SCENE_LOAD: &str = "scene-load";
    pub const SCENE_READY: &str = "scene-ready";
    pub const SCENE_ATTACHSTART: &str = "scene-attachstart";
    pub const SCENE_ATTACH: &str = "scene-attach";
    pub const SCENE_RESET: &str = "scene-reset";

    pub const RENDER_PROCESS: &str = "render-process";
    pub const RENDER_DISPOSE: &str = "render-dispose";
    pub const RENDER_EXCEPTION: &str = "render-exception";
    pub const RENDER_UNSUPPORT: &str = "render-unsupport";

    pub const VR_ENTER: &str = "vr-enter";
    pub const VR_EXIT: &str = "vr-exit";

    pub const UI_PANOCLICK: &str = "pano-click";
    pub const UI_OVERLAYCLICK: &str = "overlay-click";
    pub const UI_MULTIPLEACTIVE: &str = "multiple-active";
    pub const UI_DRAG: &str = "pano-drag";
    pub const UI_ZOOM: &str = "pano-zoom";

    pub const THRU_SHOW: &str = "thru-show";
    pub const THRU_CHANGE: &str = "thru-change";
    pub const THRU_BACK: &str = "thru-back";

    pub const ANIMATION_END: &str = "animation-end";
}

/// Payload delivered with an event.
#[derive(Clone, Debug)]
pub enum Payload {
    /// No data beyond the topic itself.
    None,
    /// A scene lifecycle event carrying the scene it concerns.
    Scene(SceneData),
    /// A per-frame render tick.
    Frame { elapsed_ms: f64 },
    /// Camera orientation, degrees.
    Look { lng: f32, lat: f32 },
    /// A recovered error surfaced for observability.
    Error { message: String },
    /// Free-form JSON, used by thru/back-navigation events.
    Value(serde_json::Value),
}

/// Handle to one subscription. Pass it back to [`EventBus::unsubscribe`]
/// to remove the handler; the bus never expires subscriptions on its own.
#[derive(Clone, Debug)]
pub struct Subscription {
    topic: String,
    id: u64,
}

type Handler = Rc<RefCell<dyn FnMut(&Payload)>>;

struct Slot {
    id: u64,
    handler: Handler,
}

struct BusInner {
    subs: HashMap<String, Vec<Slot>>,
    deferred: VecDeque<(String, Payload)>,
    next_id: u64,
}

/// Cloneable handle to a viewer's event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                subs: HashMap::new(),
                deferred: VecDeque::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a handler for a topic. Handlers on the same topic are
    /// delivered in subscription order.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: FnMut(&Payload) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subs.entry(topic.to_owned()).or_default().push(Slot {
            id,
            handler: Rc::new(RefCell::new(handler)),
        });
        Subscription {
            topic: topic.to_owned(),
            id,
        }
    }

    /// Remove a subscription. Unsubscribing a handler that is no longer
    /// registered is a no-op, not an error.
    pub fn unsubscribe(&self, sub: &Subscription) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slots) = inner.subs.get_mut(&sub.topic) {
            slots.retain(|s| s.id != sub.id);
        }
    }

    /// Queue an event for delivery at the next [`EventBus::drain`].
    pub fn publish(&self, topic: &str, payload: Payload) {
        self.inner
            .borrow_mut()
            .deferred
            .push_back((topic.to_owned(), payload));
    }

    /// Deliver an event to all current subscribers immediately.
    pub fn publish_sync(&self, topic: &str, payload: Payload) {
        self.deliver(topic, &payload);
    }

    /// Deliver all queued events. Called once per render tick; events
    /// published during the drain are delivered in the same drain.
    pub fn drain(&self) {
        loop {
            let next = self.inner.borrow_mut().deferred.pop_front();
            match next {
                Some((topic, payload)) => self.deliver(&topic, &payload),
                None => break,
            }
        }
    }

    /// Drop every subscription and queued event. Used on viewer dispose.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.subs.clear();
        inner.deferred.clear();
    }

    fn deliver(&self, topic: &str, payload: &Payload) {
        // Snapshot the handler list so a handler may subscribe or
        // unsubscribe during delivery without poisoning the borrow.
        let handlers: Vec<Handler> = match self.inner.borrow().subs.get(topic) {
            Some(slots) => slots.iter().map(|s| Rc::clone(&s.handler)).collect(),
            None => return,
        };
        for handler in handlers {
            (handler.borrow_mut())(payload);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> impl FnMut(&Payload) + use<> {
        let log = Rc::clone(log);
        move |_| log.borrow_mut().push(tag.to_owned())
    }

    #[test]
    fn sync_delivers_in_call_deferred_waits_for_drain() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.subscribe(topic::SCENE_ATTACH, recorder(&log, "attach"));
        bus.subscribe(topic::SCENE_INIT, recorder(&log, "init"));

        bus.publish(topic::SCENE_ATTACH, Payload::None);
        bus.publish_sync(topic::SCENE_INIT, Payload::None);
        assert_eq!(*log.borrow(), vec!["init"]);

        bus.drain();
        assert_eq!(*log.borrow(), vec!["init", "attach"]);
    }

    #[test]
    fn subscription_order_is_preserved() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        bus.subscribe("t", recorder(&log, "first"));
        bus.subscribe("t", recorder(&log, "second"));
        bus.publish_sync("t", Payload::None);

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let sub = bus.subscribe("t", recorder(&log, "x"));
        bus.unsubscribe(&sub);
        bus.unsubscribe(&sub);
        bus.publish_sync("t", Payload::None);

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn handler_may_unsubscribe_during_delivery() {
        let bus = EventBus::new();
        let hits = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let sub = {
            let bus2 = bus.clone();
            let hits = Rc::clone(&hits);
            let slot = Rc::clone(&slot);
            bus.subscribe("t", move |_| {
                *hits.borrow_mut() += 1;
                if let Some(sub) = slot.borrow_mut().take() {
                    bus2.unsubscribe(&sub);
                }
            })
        };
        *slot.borrow_mut() = Some(sub);

        bus.publish_sync("t", Payload::None);
        bus.publish_sync("t", Payload::None);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn publish_during_drain_is_delivered_in_same_drain() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let bus2 = bus.clone();
            let log2 = Rc::clone(&log);
            bus.subscribe("a", move |_| {
                log2.borrow_mut().push("a".to_owned());
                bus2.publish("b", Payload::None);
            });
        }
        bus.subscribe("b", recorder(&log, "b"));

        bus.publish("a", Payload::None);
        bus.drain();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }
}
