use thiserror::Error;

pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("registry error: {0}")]
    Registry(#[from] quadracode_registry::RegistryError),

    #[error("launcher error: {0}")]
    Launcher(String),

    #[error("agent {0} did not register within the spawn timeout")]
    SpawnTimeout(String),
}
