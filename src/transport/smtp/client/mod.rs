//! The session state machine and command/auth layer.

pub mod session;

pub use session::{Session, SessionConfig, State, CRLF, DEFAULT_TIMEOUT, GREYLIST_DELAY};
