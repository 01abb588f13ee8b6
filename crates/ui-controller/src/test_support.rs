use crate::Controller;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bare controller for registry tests; builds without the `mock` feature.
pub(crate) struct StubController {
    name: String,
    device: String,
    workable: Arc<AtomicBool>,
}

impl StubController {
    pub(crate) fn new(name: &str, device: &str, workable: bool) -> Self {
        Self {
            name: name.to_string(),
            device: device.to_string(),
            workable: Arc::new(AtomicBool::new(workable)),
        }
    }

    /// Flag that keeps controlling workability after the stub is moved into a registry.
    pub(crate) fn workable_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.workable)
    }
}

impl Controller for StubController {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn is_workable(&self) -> bool {
        self.workable.load(Ordering::SeqCst)
    }
}

pub(crate) fn stub(name: &str, device: &str, workable: bool) -> Box<dyn Controller> {
    Box::new(StubController::new(name, device, workable))
}
