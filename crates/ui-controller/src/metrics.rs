use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Counters describing how the controller registry is used.
#[derive(Clone)]
pub struct RegistryMetrics {
    pub registry: Registry,
    pub lookups: IntCounter,
    pub lookup_misses: IntCounter,
    pub installed: IntCounter,
    pub registered: IntGauge,
}

impl RegistryMetrics {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let lookups = IntCounter::new("uic_lookups_total", "Total controller lookups")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let lookup_misses = IntCounter::new(
            "uic_lookup_misses_total",
            "Lookups that found no workable controller",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let installed = IntCounter::new(
            "uic_controllers_installed_total",
            "Controllers registered through a provider",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let registered = IntGauge::new(
            "uic_controllers_registered",
            "Number of controllers currently registered",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let _ = registry.register(Box::new(lookups.clone()));
        let _ = registry.register(Box::new(lookup_misses.clone()));
        let _ = registry.register(Box::new(installed.clone()));
        let _ = registry.register(Box::new(registered.clone()));
        Ok(Self {
            registry,
            lookups,
            lookup_misses,
            installed,
            registered,
        })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
