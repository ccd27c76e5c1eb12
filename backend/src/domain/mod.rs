//! Domain layer

mod session;

pub use session::{Session, SessionId};
