use crate::Controller;

/// Lazily constructs controllers for a device the first time it is addressed.
pub trait ControllerProvider: Send + Sync {
    fn provide(&self, device_id: &str) -> anyhow::Result<Vec<Box<dyn Controller>>>;
}

impl<F> ControllerProvider for F
where
    F: Fn(&str) -> anyhow::Result<Vec<Box<dyn Controller>>> + Send + Sync,
{
    fn provide(&self, device_id: &str) -> anyhow::Result<Vec<Box<dyn Controller>>> {
        self(device_id)
    }
}

pub type BoxedProvider = Box<dyn ControllerProvider>;
