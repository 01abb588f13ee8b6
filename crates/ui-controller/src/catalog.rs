//! YAML catalog of controllers to register eagerly and to serve lazily per device.

use crate::provider::BoxedProvider;
use crate::{Controller, ControllerRegistry, MockController, Priority, RegistryError};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

fn default_workable() -> bool {
    true
}

/// Controller registered as soon as the catalog is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSpec {
    pub name: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_workable")]
    pub workable: bool,
}

/// Controller built by the catalog provider when its device is first addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidedSpec {
    pub name: String,
    pub device: String,
    #[serde(default = "default_workable")]
    pub workable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub install_priority: Option<Priority>,
    #[serde(default)]
    pub controllers: Vec<ControllerSpec>,
    #[serde(default)]
    pub provided: Vec<ProvidedSpec>,
}

impl Catalog {
    pub fn validate(&self) -> Result<(), RegistryError> {
        for spec in &self.controllers {
            if spec.name.trim().is_empty() {
                return Err(RegistryError::Catalog("controller with empty name".into()));
            }
        }
        for spec in &self.provided {
            if spec.name.trim().is_empty() {
                return Err(RegistryError::Catalog(
                    "provided controller with empty name".into(),
                ));
            }
            if spec.device.is_empty() {
                return Err(RegistryError::Catalog(format!(
                    "provided controller '{}' has no device",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Append `other`; its install priority wins when set.
    pub fn merge(&mut self, other: Catalog) {
        if other.install_priority.is_some() {
            self.install_priority = other.install_priority;
        }
        self.controllers.extend(other.controllers);
        self.provided.extend(other.provided);
    }

    pub fn install_priority(&self) -> Priority {
        self.install_priority.unwrap_or(Priority::DEFAULT_INSTALL)
    }

    /// Register every eager controller into `registry`.
    pub fn populate(&self, registry: &mut ControllerRegistry) {
        for spec in &self.controllers {
            let controller = MockController::new(&spec.name, &spec.device).workable(spec.workable);
            registry.register_controller(Box::new(controller), spec.priority);
        }
    }

    /// Provider yielding the `provided` controllers whose device equals the requested id.
    pub fn provider(&self) -> BoxedProvider {
        let specs = self.provided.clone();
        Box::new(
            move |device: &str| -> anyhow::Result<Vec<Box<dyn Controller>>> {
                let out: Vec<Box<dyn Controller>> = specs
                    .iter()
                    .filter(|s| s.device == device)
                    .map(|s| {
                        Box::new(MockController::new(&s.name, &s.device).workable(s.workable))
                            as Box<dyn Controller>
                    })
                    .collect();
                debug!(device, count = out.len(), "catalog provider");
                Ok(out)
            },
        )
    }

    /// Fresh registry holding the eager controllers, with the catalog provider installed
    /// when anything is provided lazily.
    pub fn build_registry(&self) -> ControllerRegistry {
        let mut registry = ControllerRegistry::new().with_install_priority(self.install_priority());
        self.populate(&mut registry);
        if !self.provided.is_empty() {
            registry.register_controller_provider(Some(self.provider()));
        }
        registry
    }
}

pub fn load_catalog_file(path: impl AsRef<Path>) -> anyhow::Result<Catalog> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading catalog: {}", path.display()))?;
    let catalog: Catalog =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    catalog
        .validate()
        .with_context(|| format!("validating catalog: {}", path.display()))?;
    Ok(catalog)
}

/// Merge every `*.yml`/`*.yaml` file in `dir`, in file name order.
pub fn load_catalogs_dir(dir: impl AsRef<Path>) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::default();
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    for p in entries {
        catalog.merge(load_catalog_file(&p)?);
    }
    Ok(catalog)
}

/// Load a single catalog file, or every catalog in a directory.
pub fn load_catalog(path: impl AsRef<Path>) -> anyhow::Result<Catalog> {
    let path = path.as_ref();
    if path.is_dir() {
        load_catalogs_dir(path)
    } else {
        load_catalog_file(path)
    }
}
