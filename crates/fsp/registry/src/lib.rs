//! Flow service registry.
//!
//! Maps installed flow services to the stages they serve and the endpoint
//! addresses they are reachable at. Stages and whole services can be enabled
//! and disabled at runtime; a coordinator resolves the enabled services for
//! a stage and opens a transport connection against the returned address.

#![deny(unsafe_code)]

pub mod error;
pub mod info;
pub mod registry;

pub use error::RegistryError;
pub use info::{FlowServiceInfo, FlowServiceInfoBuilder};
pub use registry::{RegisteredService, ServiceRegistry};
