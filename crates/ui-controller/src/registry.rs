use crate::provider::BoxedProvider;
use crate::traits::matches_device;
use crate::{Controller, ControllerInfo, Priority, RegistryError, RegistryMetrics, Result};
use core::fmt;
use std::collections::HashSet;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

struct Entry {
    controller: Box<dyn Controller>,
    priority: Priority,
    // Registration order; breaks ties between equal priorities (newest wins).
    seq: u64,
    registered_at: OffsetDateTime,
}

impl Entry {
    fn rank(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

/// Owns every registered controller and picks the best usable one per device.
pub struct ControllerRegistry {
    entries: Vec<Entry>,
    provider: Option<BoxedProvider>,
    install_priority: Priority,
    // Devices the current provider has already been asked about.
    installed_devices: HashSet<String>,
    next_seq: u64,
    metrics: Option<RegistryMetrics>,
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.entries.len())
            .field("has_provider", &self.provider.is_some())
            .field("install_priority", &self.install_priority)
            .finish()
    }
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            provider: None,
            install_priority: Priority::DEFAULT_INSTALL,
            installed_devices: HashSet::new(),
            next_seq: 0,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RegistryMetrics) -> Self {
        metrics.registered.set(self.entries.len() as i64);
        self.metrics = Some(metrics);
        self
    }

    /// Priority used for controllers installed through the provider.
    pub fn with_install_priority(mut self, priority: Priority) -> Self {
        self.install_priority = priority;
        self
    }

    pub fn install_priority(&self) -> Priority {
        self.install_priority
    }

    /// Take ownership of `controller` and make it eligible for lookups.
    /// Names are not deduplicated.
    pub fn register_controller(&mut self, controller: Box<dyn Controller>, priority: Priority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.entries.iter().any(|e| e.controller.name() == controller.name()) {
            warn!(name = controller.name(), "registering duplicate controller name");
        }
        info!(
            name = controller.name(),
            device = controller.device(),
            %priority,
            "controller registered"
        );
        self.entries.push(Entry {
            controller,
            priority,
            seq,
            registered_at: OffsetDateTime::now_utc(),
        });
        self.update_gauge();
    }

    /// Drop the first entry called `name`, counting newest registration first; this is the
    /// entry a lookup prefers among equal priorities.
    /// Returns false (and does nothing) when no such controller exists.
    pub fn remove_controller(&mut self, name: &str) -> bool {
        match self
            .entries
            .iter()
            .rposition(|e| e.controller.name() == name)
        {
            Some(idx) => {
                let entry = self.entries.remove(idx);
                info!(controller = name, device = entry.controller.device(), "controller removed");
                self.update_gauge();
                true
            }
            None => {
                debug!(controller = name, "remove: no such controller");
                false
            }
        }
    }

    /// Drop every controller and the provider, and forget which devices were installed.
    pub fn remove_all_controllers(&mut self) {
        if !self.entries.is_empty() || self.provider.is_some() {
            info!(count = self.entries.len(), "removing all controllers");
        }
        self.entries.clear();
        self.provider = None;
        self.installed_devices.clear();
        self.update_gauge();
    }

    /// Highest-priority workable controller whose scope covers `device_id`.
    pub fn get_controller(&self, device_id: &str) -> Option<&dyn Controller> {
        if let Some(m) = &self.metrics {
            m.lookups.inc();
        }
        let found = self
            .entries
            .iter()
            .filter(|e| matches_device(e.controller.as_ref(), device_id))
            .filter(|e| e.controller.is_workable())
            .max_by_key(|e| e.rank());
        match found {
            Some(e) => Some(e.controller.as_ref()),
            None => {
                debug!(device = device_id, "no workable controller");
                if let Some(m) = &self.metrics {
                    m.lookup_misses.inc();
                }
                None
            }
        }
    }

    /// Replace the provider; `None` disables lazy installation.
    /// A new provider has not served any device yet.
    pub fn register_controller_provider(&mut self, provider: Option<BoxedProvider>) {
        debug!(
            installed = provider.is_some(),
            replaced = self.provider.is_some(),
            "controller provider updated"
        );
        self.provider = provider;
        self.installed_devices.clear();
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Ask the provider for controllers serving `device_id` and register them.
    ///
    /// Returns how many controllers were registered; `Ok(0)` without a provider.
    /// A provider failure registers nothing and is returned to the caller.
    pub fn install_for_device(&mut self, device_id: &str) -> Result<usize> {
        let Some(provider) = &self.provider else {
            debug!(device = device_id, "install: no provider");
            return Ok(0);
        };
        let controllers = provider
            .provide(device_id)
            .map_err(|source| RegistryError::Provider {
                device: device_id.to_string(),
                source,
            })?;
        self.installed_devices.insert(device_id.to_string());
        let count = controllers.len();
        let priority = self.install_priority;
        for controller in controllers {
            self.register_controller(controller, priority);
        }
        if let Some(m) = &self.metrics {
            m.installed.inc_by(count as u64);
        }
        info!(device = device_id, count, "installed controllers from provider");
        Ok(count)
    }

    /// Whether the current provider already ran for `device_id`.
    pub fn is_installed(&self, device_id: &str) -> bool {
        self.installed_devices.contains(device_id)
    }

    /// Run the provider for `device_id` unless it already ran for that device.
    ///
    /// Unlike [`install_for_device`](Self::install_for_device) this never registers a second
    /// batch, even when the first batch is unworkable or did not cover the device.
    pub fn ensure_installed(&mut self, device_id: &str) -> Result<usize> {
        if self.provider.is_none() || self.is_installed(device_id) {
            return Ok(0);
        }
        self.install_for_device(device_id)
    }

    /// Snapshot of all entries, most preferred first.
    pub fn controllers(&self) -> Vec<ControllerInfo> {
        let mut ranked: Vec<&Entry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.rank().cmp(&a.rank()));
        ranked
            .into_iter()
            .map(|e| ControllerInfo {
                name: e.controller.name().to_string(),
                device: e.controller.device().to_string(),
                priority: e.priority,
                workable: e.controller.is_workable(),
                registered_at: e.registered_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update_gauge(&self) {
        if let Some(m) = &self.metrics {
            m.registered.set(self.entries.len() as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stub as ctrl, StubController};
    use std::sync::atomic::Ordering;

    fn selected(reg: &ControllerRegistry, device: &str) -> Option<String> {
        reg.get_controller(device).map(|c| c.name().to_string())
    }

    fn dummy_provider() -> BoxedProvider {
        Box::new(
            |device: &str| -> anyhow::Result<Vec<Box<dyn Controller>>> {
                if device == "dummy_device" {
                    Ok(vec![ctrl("dummy_controller", "dummy_device", true)])
                } else {
                    Ok(Vec::new())
                }
            },
        )
    }

    #[test]
    fn empty_registry_yields_nothing() {
        let reg = ControllerRegistry::new();
        assert!(reg.get_controller("").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn add_and_remove_by_priority() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("controller1", "", true), Priority::Low);
        reg.register_controller(ctrl("controller2", "", true), Priority::High);
        assert_eq!(selected(&reg, "").as_deref(), Some("controller2"));

        assert!(reg.remove_controller("controller2"));
        assert_eq!(selected(&reg, "").as_deref(), Some("controller1"));

        assert!(reg.remove_controller("controller1"));
        assert!(reg.get_controller("").is_none());
    }

    #[test]
    fn highest_of_three_bands_wins() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("controller1", "", true), Priority::Low);
        reg.register_controller(ctrl("controller2", "", true), Priority::High);
        reg.register_controller(ctrl("controller3", "", true), Priority::Medium);
        assert_eq!(selected(&reg, "").as_deref(), Some("controller2"));
    }

    #[test]
    fn unworkable_controllers_are_skipped() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("controller1", "", false), Priority::Low);
        reg.register_controller(ctrl("controller2", "", false), Priority::High);
        assert!(reg.get_controller("").is_none());

        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("controller1", "", true), Priority::Low);
        reg.register_controller(ctrl("controller2", "", false), Priority::High);
        assert_eq!(selected(&reg, "").as_deref(), Some("controller1"));
    }

    #[test]
    fn workability_is_polled_on_every_lookup() {
        let mut reg = ControllerRegistry::new();
        let high = StubController::new("high", "", false);
        let flag = high.workable_flag();
        reg.register_controller(ctrl("low", "", true), Priority::Low);
        reg.register_controller(Box::new(high), Priority::High);
        assert_eq!(selected(&reg, "").as_deref(), Some("low"));
        flag.store(true, Ordering::SeqCst);
        assert_eq!(selected(&reg, "").as_deref(), Some("high"));
        flag.store(false, Ordering::SeqCst);
        assert_eq!(selected(&reg, "").as_deref(), Some("low"));
    }

    #[test]
    fn controllers_are_scoped_to_devices() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("controller1", "device1", true), Priority::Medium);
        reg.register_controller(ctrl("controller2", "device2", true), Priority::Medium);
        assert_eq!(selected(&reg, "device1").as_deref(), Some("controller1"));
        assert_eq!(selected(&reg, "device2").as_deref(), Some("controller2"));

        reg.remove_controller("controller1");
        assert!(reg.get_controller("device1").is_none());
        assert_eq!(selected(&reg, "device2").as_deref(), Some("controller2"));
    }

    #[test]
    fn generic_controller_serves_any_device() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("generic", "", true), Priority::Low);
        assert_eq!(selected(&reg, "").as_deref(), Some("generic"));
        assert_eq!(selected(&reg, "device1").as_deref(), Some("generic"));

        reg.register_controller(ctrl("scoped", "device1", true), Priority::Medium);
        assert_eq!(selected(&reg, "device1").as_deref(), Some("scoped"));
        // a scoped controller never serves the empty (unspecified) device id
        assert_eq!(selected(&reg, "").as_deref(), Some("generic"));
    }

    #[test]
    fn newest_registration_wins_priority_ties() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("first", "", true), Priority::Medium);
        reg.register_controller(ctrl("second", "", true), Priority::Medium);
        assert_eq!(selected(&reg, "").as_deref(), Some("second"));
        reg.register_controller(ctrl("third", "", true), Priority::Low);
        assert_eq!(selected(&reg, "").as_deref(), Some("second"));
        reg.remove_controller("second");
        assert_eq!(selected(&reg, "").as_deref(), Some("first"));
    }

    #[test]
    fn duplicate_names_are_kept_and_removed_newest_first() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("dup", "a", true), Priority::Medium);
        reg.register_controller(ctrl("dup", "b", true), Priority::Medium);
        assert_eq!(reg.len(), 2);
        assert!(reg.remove_controller("dup"));
        assert_eq!(reg.len(), 1);
        assert_eq!(selected(&reg, "a").as_deref(), Some("dup"));
        assert!(reg.get_controller("b").is_none());
    }

    #[test]
    fn removing_unknown_name_is_a_noop() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("c", "", true), Priority::Low);
        assert!(!reg.remove_controller("missing"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_all_is_idempotent_and_clears_provider() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("c1", "", true), Priority::Low);
        reg.register_controller(ctrl("c2", "d", true), Priority::High);
        reg.register_controller_provider(Some(dummy_provider()));
        reg.remove_all_controllers();
        assert!(reg.is_empty());
        assert!(!reg.has_provider());
        reg.remove_all_controllers();
        assert!(reg.is_empty());
        assert!(!reg.has_provider());
        assert!(reg.get_controller("").is_none());
        assert_eq!(reg.install_for_device("dummy_device").unwrap(), 0);
    }

    #[test]
    fn install_without_provider_is_a_noop() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(None);
        assert_eq!(reg.install_for_device("dummy_device").unwrap(), 0);
        assert!(reg.get_controller("dummy_device").is_none());
    }

    #[test]
    fn provider_installs_device_controllers() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(dummy_provider()));
        assert!(reg.get_controller("dummy_device").is_none());

        assert_eq!(reg.install_for_device("dummy_device").unwrap(), 1);
        assert_eq!(
            selected(&reg, "dummy_device").as_deref(),
            Some("dummy_controller")
        );
        assert!(reg.get_controller("dummy_device_2").is_none());
        assert_eq!(reg.controllers()[0].priority, Priority::DEFAULT_INSTALL);

        reg.remove_controller("dummy_controller");
        assert!(reg.get_controller("dummy_device").is_none());
    }

    #[test]
    fn provider_for_other_device_installs_nothing() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(dummy_provider()));
        assert_eq!(reg.install_for_device("dummy_device_2").unwrap(), 0);
        assert!(reg.is_empty());
    }

    #[test]
    fn new_provider_replaces_previous() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(dummy_provider()));
        reg.register_controller_provider(Some(Box::new(
            |device: &str| -> anyhow::Result<Vec<Box<dyn Controller>>> {
                Ok(vec![ctrl("replacement", device, true)])
            },
        )));
        reg.install_for_device("dummy_device").unwrap();
        assert_eq!(
            selected(&reg, "dummy_device").as_deref(),
            Some("replacement")
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn provider_failure_is_propagated() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(Box::new(
            |_device: &str| -> anyhow::Result<Vec<Box<dyn Controller>>> {
                anyhow::bail!("device offline")
            },
        )));
        let err = reg.install_for_device("phone").unwrap_err();
        match err {
            RegistryError::Provider { device, source } => {
                assert_eq!(device, "phone");
                assert!(source.to_string().contains("device offline"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn install_priority_is_configurable() {
        let mut reg = ControllerRegistry::new().with_install_priority(Priority::High);
        reg.register_controller(ctrl("eager", "dummy_device", true), Priority::Medium);
        reg.register_controller_provider(Some(dummy_provider()));
        reg.install_for_device("dummy_device").unwrap();
        assert_eq!(
            selected(&reg, "dummy_device").as_deref(),
            Some("dummy_controller")
        );
    }

    #[test]
    fn ensure_installed_runs_provider_once_per_device() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(Box::new(
            |device: &str| -> anyhow::Result<Vec<Box<dyn Controller>>> {
                Ok(vec![ctrl("dev_ctrl", device, false)])
            },
        )));
        assert!(!reg.is_installed("phone"));
        assert_eq!(reg.ensure_installed("phone").unwrap(), 1);
        for _ in 0..4 {
            assert_eq!(reg.ensure_installed("phone").unwrap(), 0);
        }
        assert!(reg.is_installed("phone"));
        assert_eq!(reg.len(), 1);
        assert!(reg.get_controller("phone").is_none());

        assert_eq!(reg.ensure_installed("tablet").unwrap(), 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn failed_install_is_retried() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(Box::new(
            |_device: &str| -> anyhow::Result<Vec<Box<dyn Controller>>> {
                anyhow::bail!("device offline")
            },
        )));
        assert!(reg.ensure_installed("phone").is_err());
        assert!(!reg.is_installed("phone"));
    }

    #[test]
    fn installed_devices_reset_with_provider_and_remove_all() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller_provider(Some(dummy_provider()));
        reg.ensure_installed("dummy_device").unwrap();
        assert!(reg.is_installed("dummy_device"));

        reg.register_controller_provider(Some(dummy_provider()));
        assert!(!reg.is_installed("dummy_device"));
        assert_eq!(reg.ensure_installed("dummy_device").unwrap(), 1);

        reg.remove_all_controllers();
        assert!(!reg.is_installed("dummy_device"));
        assert_eq!(reg.ensure_installed("dummy_device").unwrap(), 0);
    }

    #[test]
    fn snapshot_is_ordered_by_preference() {
        let mut reg = ControllerRegistry::new();
        reg.register_controller(ctrl("a", "", true), Priority::Low);
        reg.register_controller(ctrl("b", "", false), Priority::High);
        reg.register_controller(ctrl("c", "", true), Priority::Low);
        let names: Vec<String> = reg.controllers().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert!(!reg.controllers()[0].workable);
    }

    #[test]
    fn metrics_track_lookups_and_installs() {
        let metrics = RegistryMetrics::new().unwrap();
        let mut reg = ControllerRegistry::new().with_metrics(metrics.clone());
        reg.register_controller_provider(Some(dummy_provider()));
        assert!(reg.get_controller("dummy_device").is_none());
        reg.install_for_device("dummy_device").unwrap();
        assert!(reg.get_controller("dummy_device").is_some());
        assert_eq!(metrics.lookups.get(), 2);
        assert_eq!(metrics.lookup_misses.get(), 1);
        assert_eq!(metrics.installed.get(), 1);
        assert_eq!(metrics.registered.get(), 1);
        reg.remove_all_controllers();
        assert_eq!(metrics.registered.get(), 0);
    }
}
