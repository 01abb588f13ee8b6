//! ui-controller: picks the controller that drives UI automation on a device
//!
//! Controllers are registered with a [`Priority`]; a lookup returns the highest-priority
//! controller that is currently workable and scoped to the requested device (or generic).
//! A single [`ControllerProvider`] can construct device-specific controllers on demand.

mod types;
pub use types::{ControllerInfo, Priority};

mod error;
pub use error::{RegistryError, Result};

mod traits;
pub use traits::{matches_device, Controller};

mod provider;
pub use provider::{BoxedProvider, ControllerProvider};

mod metrics;
pub use metrics::RegistryMetrics;

mod registry;
pub use registry::ControllerRegistry;

mod shared;
pub use shared::SharedControllerRegistry;

#[cfg(test)]
mod test_support;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockController, WorkableHandle};

#[cfg(feature = "mock")]
mod catalog;

#[cfg(feature = "mock")]
pub use catalog::{
    load_catalog, load_catalog_file, load_catalogs_dir, Catalog, ControllerSpec, ProvidedSpec,
};
