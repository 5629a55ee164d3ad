//! Transport layer: a single client-side SMTP engine module.

pub mod smtp;
