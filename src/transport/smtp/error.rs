//! Error types for the SMTP client.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// The kind of failure that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Transport-level failure while opening the socket.
    CouldNotConnect,
    /// TLS peer verification failed when explicit trust material was supplied.
    ConnectionAuth,
    /// Malformed reply, missing/empty fields, or unexpected status code.
    BadResponse,
    /// Operation attempted while the session was not `Connected`.
    NoConnection,
    /// No offered AUTH mechanism matches the configured preference order.
    AuthNotSupported,
    /// The authentication mechanism dance returned a non-success status.
    AuthFailed,
    /// The inactivity timer elapsed.
    Timeout,
    /// Malformed wire reply that could not be parsed at all.
    Response,
    /// Precondition or programming-error style failure (e.g. second in-flight command).
    Client,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::CouldNotConnect => "could not connect",
            Kind::ConnectionAuth => "TLS peer verification failed",
            Kind::BadResponse => "bad response",
            Kind::NoConnection => "no connection",
            Kind::AuthNotSupported => "no supported authentication mechanism",
            Kind::AuthFailed => "authentication failed",
            Kind::Timeout => "timed out",
            Kind::Response => "could not parse response",
            Kind::Client => "client error",
        };
        f.write_str(s)
    }
}

/// The crate-wide error type.
pub struct Error {
    kind: Kind,
    message: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: Kind, message: Option<String>) -> Self {
        Error { kind, message, source: None }
    }

    fn with_source(
        kind: Kind,
        message: Option<String>,
        source: Box<dyn StdError + Send + Sync>,
    ) -> Self {
        Error { kind, message, source: Some(source) }
    }

    /// The semantic error kind, for callers that branch on failure class.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Appends context to the message, keeping the original `Display`
    /// rendering visible (used to suffix STARTTLS failures with
    /// `" while establishing a starttls session"`).
    pub fn with_context(mut self, suffix: &str) -> Error {
        self.message = Some(match self.message {
            Some(m) => format!("{}{}", m, suffix),
            None => suffix.trim_start().to_string(),
        });
        self
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Error");
        s.field("kind", &self.kind);
        if let Some(m) = &self.message {
            s.field("message", m);
        }
        s.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.kind, m),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::with_source(Kind::CouldNotConnect, None, Box::new(err))
    }
}

impl From<native_tls::Error> for Error {
    fn from(err: native_tls::Error) -> Self {
        Error::with_source(Kind::ConnectionAuth, None, Box::new(err))
    }
}

/// Builds a `CouldNotConnect` error from an I/O failure.
pub fn network(err: io::Error) -> Error {
    Error::with_source(Kind::CouldNotConnect, None, Box::new(err))
}

/// Builds a `Client` error carrying a static message (precondition violations).
pub fn client(message: &'static str) -> Error {
    Error::new(Kind::Client, Some(message.to_string()))
}

/// Builds a `Response` error (malformed wire reply).
pub fn response(message: impl Into<String>) -> Error {
    Error::new(Kind::Response, Some(message.into()))
}

/// Builds a `BadResponse` error for a classified-but-unexpected status code.
pub fn code(code: u16, message: Option<String>) -> Error {
    let text = match message {
        Some(m) => format!("code {}: {}", code, m),
        None => format!("code {}", code),
    };
    Error::new(Kind::BadResponse, Some(text))
}

/// Builds the `bad response on command '<word>': <message>` error described
/// in §4.4's `command()` classification.
pub fn bad_response_on_command(first_word: &str, message: &str) -> Error {
    Error::new(
        Kind::BadResponse,
        Some(format!("bad response on command '{}': {}", first_word, message)),
    )
}

/// Builds an `AuthNotSupported` error.
pub fn auth_not_supported() -> Error {
    Error::new(Kind::AuthNotSupported, None)
}

/// Builds an `AuthFailed` error.
pub fn auth_failed(message: impl Into<String>) -> Error {
    Error::new(Kind::AuthFailed, Some(message.into()))
}

/// Builds a `NoConnection` error.
pub fn no_connection() -> Error {
    Error::new(Kind::NoConnection, None)
}

/// Builds a `Timeout` error.
pub fn timeout() -> Error {
    Error::new(Kind::Timeout, None)
}

pub type SmtpResult<T> = Result<T, Error>;
