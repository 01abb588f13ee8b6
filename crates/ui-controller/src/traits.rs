use crate::{RegistryError, Result};

/// A backend able to drive UI automation on one device, or on any device when
/// its scope is empty.
pub trait Controller: Send + Sync {
    /// Unique identifier, used for removal.
    fn name(&self) -> &str;

    /// Device this controller is bound to. Empty means generic.
    fn device(&self) -> &str;

    /// Whether the controller can serve requests right now. Polled on every lookup.
    fn is_workable(&self) -> bool;

    /// Dump the current UI hierarchy of the device.
    fn ui_dom(&self) -> Result<serde_json::Value> {
        Err(RegistryError::Unsupported("ui dom dump"))
    }
}

/// True when `controller` may serve `device_id`: exact scope match, or a generic controller.
pub fn matches_device(controller: &dyn Controller, device_id: &str) -> bool {
    let scope = controller.device();
    scope.is_empty() || scope == device_id
}
