//! A client-side SMTP/ESMTP engine: connect, negotiate capabilities,
//! optionally upgrade to TLS, authenticate, and issue the command verbs
//! needed to submit a message.

pub mod authentication;
pub mod client;
pub mod commands;
pub mod error;
pub mod extension;
pub mod net;
pub mod response;

pub use authentication::{Credentials, Mechanism};
pub use client::{Session, SessionConfig, State};
pub use error::{Error, Kind, SmtpResult};
pub use extension::{FeatureValue, Features};
pub use net::TlsParameters;
pub use response::Response;
