//! Infrastructure layer - shared runtime state

pub mod registry;

pub use registry::{RegistryError, RegistryLimits, SessionRegistry, spawn_sweeper};
