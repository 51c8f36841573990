//! The agent registry (C3): identity, liveness, and hotpath gating behind
//! an in-process store, an HTTP surface, and a retrying HTTP client, the
//! way `knhk-sidecar` splits health tracking from its server and client
//! halves.

pub mod client;
pub mod error;
pub mod http;
pub mod registry;

pub use client::RegistryClient;
pub use error::{RegistryError, Result};
pub use registry::{HealthTimeout, HeartbeatRequest, ListFilter, RegisterRequest, Registry, RegistryStats};
