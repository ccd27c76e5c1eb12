//! Use cases - Business logic operations
pub mod signaling_usecase;

pub use signaling_usecase::{OfferOutcome, SessionStatus, SignalingError, SignalingUseCase};
