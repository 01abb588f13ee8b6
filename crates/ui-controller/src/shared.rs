use crate::provider::BoxedProvider;
use crate::{Controller, ControllerInfo, ControllerRegistry, Priority, RegistryError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Cloneable, thread-safe handle to one [`ControllerRegistry`].
///
/// Selected controllers cannot outlive the lock, so lookups hand the controller to a closure.
#[derive(Clone, Debug, Default)]
pub struct SharedControllerRegistry {
    inner: Arc<Mutex<ControllerRegistry>>,
}

impl SharedControllerRegistry {
    pub fn new(registry: ControllerRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ControllerRegistry>> {
        self.inner.lock().map_err(|_| RegistryError::Poisoned)
    }

    pub fn register_controller(
        &self,
        controller: Box<dyn Controller>,
        priority: Priority,
    ) -> Result<()> {
        self.lock()?.register_controller(controller, priority);
        Ok(())
    }

    pub fn remove_controller(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.remove_controller(name))
    }

    pub fn remove_all_controllers(&self) -> Result<()> {
        self.lock()?.remove_all_controllers();
        Ok(())
    }

    pub fn register_controller_provider(&self, provider: Option<BoxedProvider>) -> Result<()> {
        self.lock()?.register_controller_provider(provider);
        Ok(())
    }

    pub fn install_for_device(&self, device_id: &str) -> Result<usize> {
        self.lock()?.install_for_device(device_id)
    }

    /// Run `f` against the controller selected for `device_id`, if any.
    pub fn with_controller<R>(
        &self,
        device_id: &str,
        f: impl FnOnce(&dyn Controller) -> R,
    ) -> Result<Option<R>> {
        let guard = self.lock()?;
        Ok(guard.get_controller(device_id).map(f))
    }

    /// Like [`with_controller`](Self::with_controller), but on a miss asks the provider for
    /// `device_id` (once per device, see [`ControllerRegistry::ensure_installed`]) and retries.
    ///
    /// The lock is held while the provider runs, so a provider doing slow device discovery
    /// blocks every other caller of this registry until it returns.
    pub fn get_or_install<R>(
        &self,
        device_id: &str,
        f: impl FnOnce(&dyn Controller) -> R,
    ) -> Result<Option<R>> {
        let mut guard = self.lock()?;
        if guard.get_controller(device_id).is_none() {
            let installed = guard.ensure_installed(device_id)?;
            debug!(device = device_id, installed, "lookup miss, installed on demand");
        }
        Ok(guard.get_controller(device_id).map(f))
    }

    pub fn controllers(&self) -> Result<Vec<ControllerInfo>> {
        Ok(self.lock()?.controllers())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

impl From<ControllerRegistry> for SharedControllerRegistry {
    fn from(registry: ControllerRegistry) -> Self {
        Self::new(registry)
    }
}
