//! Application layer - signaling use cases

pub mod usecases;
