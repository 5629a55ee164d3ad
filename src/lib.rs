//! A client-side SMTP/ESMTP session engine.
//!
//! [`Session`] owns a single connection to a Mail Submission or Mail
//! Transfer Agent: it negotiates `EHLO`/`HELO`, optionally upgrades to TLS
//! (implicit or via `STARTTLS`), authenticates, and exposes the command
//! verbs needed to submit a message. Composing a full submission (building
//! `MAIL FROM`/`RCPT TO`/`DATA` around a MIME message, retrying across a
//! pool, routing by MX) is left to callers; this crate is the protocol
//! engine underneath that.
#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unsafe_code
)]

pub mod transport;

pub use crate::transport::smtp::{
    authentication::{Credentials, Mechanism},
    client::{Session, SessionConfig, State},
    error::{Error, Kind, SmtpResult},
    extension::{FeatureValue, Features},
    net::TlsParameters,
    response::Response,
};
