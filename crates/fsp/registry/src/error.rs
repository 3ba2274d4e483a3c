use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid service info: {detail}")]
    InvalidServiceInfo { detail: String },

    #[error("service '{service_id}' is already registered")]
    DuplicateService { service_id: String },

    #[error("unknown service '{service_id}'")]
    UnknownService { service_id: String },

    #[error("registry lock poisoned")]
    LockPoisoned,
}
