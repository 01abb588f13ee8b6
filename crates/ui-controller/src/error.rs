use thiserror::Error;

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("controller provider failed for device '{device}': {source}")]
    Provider {
        device: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("operation not supported by this controller: {0}")]
    Unsupported(&'static str),
    #[error("controller registry lock poisoned")]
    Poisoned,
    #[error("invalid catalog: {0}")]
    Catalog(String),
}
