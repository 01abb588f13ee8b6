//! In-process controller backend for tests and dry runs.

use crate::{Controller, Result};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Toggles the workability of a [`MockController`] after it has been moved into a registry.
#[derive(Clone, Debug)]
pub struct WorkableHandle(Arc<AtomicBool>);

impl WorkableHandle {
    pub fn set(&self, workable: bool) {
        self.0.store(workable, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A controller that reports a fixed UI tree and a switchable workable flag.
#[derive(Debug)]
pub struct MockController {
    name: String,
    device: String,
    workable: Arc<AtomicBool>,
}

impl MockController {
    /// New mock controller; not workable until told otherwise.
    pub fn new(name: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            workable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn workable(self, workable: bool) -> Self {
        self.set_workable(workable);
        self
    }

    pub fn set_workable(&self, workable: bool) {
        self.workable.store(workable, Ordering::SeqCst);
    }

    pub fn workable_handle(&self) -> WorkableHandle {
        WorkableHandle(Arc::clone(&self.workable))
    }
}

impl Controller for MockController {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn is_workable(&self) -> bool {
        self.workable.load(Ordering::SeqCst)
    }

    fn ui_dom(&self) -> Result<serde_json::Value> {
        Ok(json!({
            "attributes": {
                "type": "Root",
                "controller": self.name,
                "device": self.device,
            },
            "children": [],
        }))
    }
}
