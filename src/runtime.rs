//! Named viewer instances.
//!
//! The embedding application can register viewers under string refs and
//! retrieve them later, the way a page-level API addresses multiple embedded
//! tours. Instances are thread-local: a viewer lives and dies on the thread
//! that created it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::RenderBackend;
use crate::error::Error;
use crate::scene::{SourceConfig, Viewer};

thread_local! {
    static INSTANCES: RefCell<HashMap<String, Rc<RefCell<Viewer>>>> =
        RefCell::new(HashMap::new());
}

/// Build a viewer from a source configuration, start it, and register it
/// under `viewer_ref`. Replaces (and disposes) any instance previously
/// registered under the same ref.
pub fn start(
    viewer_ref: &str,
    source: SourceConfig,
    backend: Box<dyn RenderBackend>,
) -> Result<Rc<RefCell<Viewer>>, Error> {
    let mut viewer = Viewer::new(backend, source)?;
    viewer.run();
    let viewer = Rc::new(RefCell::new(viewer));

    let previous = INSTANCES.with(|instances| {
        instances
            .borrow_mut()
            .insert(viewer_ref.to_owned(), Rc::clone(&viewer))
    });
    if let Some(previous) = previous {
        previous.borrow_mut().dispose();
    }
    Ok(viewer)
}

/// Look up a running instance.
pub fn get_instance(viewer_ref: &str) -> Option<Rc<RefCell<Viewer>>> {
    INSTANCES.with(|instances| instances.borrow().get(viewer_ref).cloned())
}

/// Dispose and deregister an instance. Unknown refs are a no-op.
pub fn dispose(viewer_ref: &str) {
    let removed = INSTANCES.with(|instances| instances.borrow_mut().remove(viewer_ref));
    if let Some(viewer) = removed {
        viewer.borrow_mut().dispose();
    }
}
