//! The connection lifecycle (§4.3) and the command/auth layer built on top of
//! it (§4.4, §4.5): this is the component callers actually drive.

use std::time::Duration;

use tokio::time;

use super::super::authentication::{self, Credentials, Mechanism};
use super::super::commands;
use super::super::error::{self, Error};
use super::super::extension::Features;
use super::super::net::{NetworkStream, TlsParameters};
use super::super::response::{Response, ResponseMonitor};

pub const CRLF: &str = "\r\n";
pub const GREYLIST_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const SMTP_PORT: u16 = 25;
pub const SUBMISSIONS_PORT: u16 = 465;
pub const SUBMISSION_PORT: u16 = 587;

/// The connection lifecycle state (§4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    NotConnected,
    Connecting,
    Connected,
}

/// Immutable-after-construction session configuration (§6).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    host: String,
    port: Option<u16>,
    domain: String,
    timeout: Duration,
    ssl: Option<TlsParameters>,
    tls: Option<TlsParameters>,
    auth_order: Vec<Mechanism>,
    user: Option<String>,
    password: Option<String>,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        let domain = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        SessionConfig {
            host: host.into(),
            port: None,
            domain,
            timeout: DEFAULT_TIMEOUT,
            ssl: None,
            tls: None,
            auth_order: vec![Mechanism::CramMd5, Mechanism::Login, Mechanism::Plain, Mechanism::Xoauth2],
            user: None,
            password: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn ssl(mut self, params: TlsParameters) -> Self {
        self.ssl = Some(params);
        self
    }

    pub fn tls(mut self, params: TlsParameters) -> Self {
        self.tls = Some(params);
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn auth_order(mut self, order: Vec<Mechanism>) -> Self {
        self.auth_order = order;
        self
    }

    fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.ssl.is_some() {
            SUBMISSIONS_PORT
        } else if self.tls.is_some() {
            SUBMISSION_PORT
        } else {
            SMTP_PORT
        })
    }

    fn has_credentials(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::new("localhost")
    }
}

/// A single connection to an MTA/MSA: the top-level entity of this crate.
pub struct Session {
    config: SessionConfig,
    state: State,
    secure: bool,
    logged_in: bool,
    monitor: Option<ResponseMonitor>,
    features: Option<Features>,
}

impl Session {
    /// Validates `config` and creates a session in the `NotConnected` state.
    /// Rejects `password` set without `user`.
    pub fn new(config: SessionConfig) -> Result<Self, Error> {
        if config.password.is_some() && config.user.is_none() {
            return Err(error::client("password set without a user"));
        }
        let logged_in = !config.has_credentials();
        Ok(Session { config, state: State::NotConnected, secure: false, logged_in, monitor: None, features: None })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn authorized(&self) -> bool {
        self.logged_in
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Opens the transport and waits for the `220` greeting. Re-entry from
    /// `Connected` gracefully quits the current connection first.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.state == State::Connected {
            let _ = self.quit().await;
        }

        self.state = State::Connecting;
        tracing::info!(host = %self.config.host, port = self.config.effective_port(), "connecting");

        let stream = match &self.config.ssl {
            Some(params) => NetworkStream::connect_tls(&self.config.host, self.config.effective_port(), params).await,
            None => NetworkStream::connect_plain(&self.config.host, self.config.effective_port()).await,
        };
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                self.state = State::NotConnected;
                return Err(e);
            }
        };

        self.secure = stream.is_encrypted();
        self.monitor = Some(ResponseMonitor::new(stream, self.config.timeout));

        let greeting = self.monitor_mut()?.read_response().await;
        let greeting = match greeting {
            Ok(r) => r,
            Err(e) => {
                self.close(true).await;
                return Err(e);
            }
        };

        if greeting.code() != 220 {
            // best-effort QUIT before tearing the connection down, matching
            // the documented bad-greeting scenario. Written directly through
            // the monitor: `send()` requires `Connected`, which we aren't yet.
            if let Some(monitor) = self.monitor.as_mut() {
                let _ = monitor.write(format!("{}{}", commands::quit(), CRLF).as_bytes()).await;
            }
            self.close(true).await;
            return Err(error::code(greeting.code(), Some(greeting.message().to_string())));
        }

        self.state = State::Connected;
        tracing::debug!("connected, greeting: {}", greeting.message());
        Ok(())
    }

    /// Idempotent: stops the monitor, drops the transport, and resets
    /// session-derived state. `force=true` drops the socket immediately;
    /// `force=false` performs an orderly shutdown.
    pub async fn close(&mut self, force: bool) {
        if let Some(monitor) = self.monitor.take() {
            let stream = monitor.into_inner();
            let _ = stream.close(force);
        }
        self.state = State::NotConnected;
        self.features = None;
        self.secure = false;
        self.logged_in = !self.config.has_credentials();
    }

    fn monitor_mut(&mut self) -> Result<&mut ResponseMonitor, Error> {
        self.monitor.as_mut().ok_or_else(error::no_connection)
    }

    /// Writes `line` (already including trailing CRLF) and waits for the
    /// reply. Requires `Connected`; any failure forces the connection closed.
    pub async fn send(&mut self, line: &str) -> Result<Response, Error> {
        if self.state != State::Connected {
            self.close(true).await;
            return Err(error::no_connection());
        }

        let result = async {
            let monitor = self.monitor_mut()?;
            monitor.write(line.as_bytes()).await?;
            monitor.read_response().await
        }
        .await;

        match result {
            Ok(r) => Ok(r),
            Err(e) => {
                self.close(true).await;
                Err(e)
            }
        }
    }

    /// Sends `cmd` (without CRLF) and classifies the reply against
    /// `expected`, retrying once after `GREYLIST_DELAY` on a greylisted
    /// 450/451.
    pub async fn command(&mut self, cmd: &str, expected: &[u16]) -> Result<(String, String), Error> {
        let mut retried = false;
        loop {
            let line = format!("{}{}", cmd, CRLF);
            let response = self.send(&line).await?;

            if expected.contains(&response.code()) {
                return Ok((response.data().to_string(), response.message().to_string()));
            }

            if !retried && matches!(response.code(), 450 | 451) && response.message_contains("greylist") {
                retried = true;
                tracing::debug!("greylisted, retrying '{}' in {:?}", commands::first_word(cmd), GREYLIST_DELAY);
                time::sleep(GREYLIST_DELAY).await;
                continue;
            }

            return Err(error::bad_response_on_command(commands::first_word(cmd), response.message()));
        }
    }

    /// `EHLO`, populating the feature map; upgrades to TLS first if `tls` is
    /// configured and the connection isn't already secure.
    pub async fn ehlo(&mut self, domain: Option<&str>) -> Result<(), Error> {
        self.features = Some(Features::new());
        let domain = domain.unwrap_or(&self.config.domain).to_string();

        let (data, _) = self.command(&commands::ehlo(&domain), &[250]).await?;
        self.features = Some(Features::parse(&data));

        if self.config.tls.is_some() && !self.secure {
            self.starttls().await?;
            let (data, _) = self.command(&commands::ehlo(&domain), &[250]).await?;
            self.features = Some(Features::parse(&data));
        }
        Ok(())
    }

    /// Legacy fallback: plain `HELO`, no feature map.
    pub async fn helo(&mut self, domain: Option<&str>) -> Result<(), Error> {
        let domain = domain.unwrap_or(&self.config.domain).to_string();
        self.command(&commands::helo(&domain), &[250]).await?;
        Ok(())
    }

    /// No-op if a feature map already exists; otherwise tries `EHLO`,
    /// falling back to `HELO` on failure.
    ///
    /// Preserves a source quirk: a failed `EHLO` still leaves `features` set
    /// to an empty map (from the `ehlo()` call above), so once `HELO` has
    /// run, later calls see `features.is_some()` and skip renegotiation.
    pub async fn ehlo_or_helo_if_needed(&mut self) -> Result<(), Error> {
        if self.features.is_some() {
            return Ok(());
        }
        if self.ehlo(None).await.is_err() {
            self.helo(None).await?;
        }
        Ok(())
    }

    /// Issues `STARTTLS`, wraps the transport, and rebinds the monitor with
    /// the same timeout.
    pub async fn starttls(&mut self) -> Result<(), Error> {
        let tls = self
            .config
            .tls
            .clone()
            .ok_or_else(|| error::client("STARTTLS requested but no TLS parameters configured"))?;

        let result = async {
            self.command(&commands::starttls(), &[220]).await?;
            let monitor = self.monitor.take().ok_or_else(error::no_connection)?;
            let timeout = self.config.timeout;
            let stream = monitor.into_inner();
            let stream = stream.upgrade_tls(&tls).await?;
            self.monitor = Some(ResponseMonitor::new(stream, timeout));
            self.secure = true;
            Ok(())
        }
        .await;

        result.map_err(|e: Error| e.with_context(" while establishing a starttls session"))
    }

    /// Whether `keyword` is present in the feature map advertised by the
    /// last successful `EHLO`.
    pub fn supports_feature(&self, keyword: &str) -> bool {
        self.features.as_ref().map(|f| f.supports(keyword)).unwrap_or(false)
    }

    /// See the doc comment on [`Features::has_extn`]: intentionally
    /// inverted relative to its name.
    pub fn has_extn(&self, keyword: &str) -> bool {
        self.features.as_ref().map(|f| f.has_extn(keyword)).unwrap_or(true)
    }

    pub async fn help(&mut self, topic: Option<&str>) -> Result<(String, String), Error> {
        self.command(&commands::help(topic), &[211, 214]).await
    }

    pub async fn rset(&mut self) -> Result<(String, String), Error> {
        self.command(&commands::rset(), &[250]).await
    }

    /// Dispatched via raw `send`, not `command`: the reply is returned
    /// as-is and never classified as success or failure.
    pub async fn noop(&mut self) -> Result<Response, Error> {
        self.send(&format!("{}{}", commands::noop(), CRLF)).await
    }

    pub async fn mail(&mut self, from: &str) -> Result<(String, String), Error> {
        self.command(&commands::mail(from), &[250]).await
    }

    pub async fn rcpt(&mut self, to: &str) -> Result<(String, String), Error> {
        self.command(&commands::rcpt(to), &[250, 251]).await
    }

    pub async fn data(&mut self) -> Result<(String, String), Error> {
        self.command(&commands::data(), &[354]).await
    }

    pub async fn data_end(&mut self) -> Result<(String, String), Error> {
        self.command("\r\n.", &[250]).await
    }

    pub async fn vrfy(&mut self, address: &str) -> Result<(String, String), Error> {
        self.command(&commands::vrfy(address), &[250, 251, 252]).await
    }

    pub async fn expn(&mut self, address: &str) -> Result<(String, String), Error> {
        self.command(&commands::expn(address), &[250]).await
    }

    pub async fn quit(&mut self) -> Result<(String, String), Error> {
        let result = self.command(&commands::quit(), &[221, 250]).await;
        self.close(false).await;
        result
    }

    /// Raw write for `DATA`-phase body streaming: bypasses the
    /// command/response pipeline since body lines are not responses.
    pub async fn message(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.state != State::Connected {
            return Err(error::no_connection());
        }
        self.monitor_mut()?.write(bytes).await
    }

    /// Ensures `EHLO`/`HELO` ran, selects an AUTH mechanism, and performs its
    /// challenge/response dance. Sets `authorized()` on success; on any
    /// failure, gracefully closes the connection and surfaces `AuthFailed`.
    pub async fn login(
        &mut self,
        user: Option<&str>,
        password: Option<&str>,
        method: Option<Mechanism>,
        domain: Option<&str>,
    ) -> Result<(), Error> {
        self.ehlo_or_helo_if_needed().await?;
        if let Some(d) = domain {
            if self.features.is_none() {
                self.ehlo(Some(d)).await?;
            }
        }

        let user = user.or(self.config.user.as_deref()).unwrap_or_default().to_string();
        let password = password.or(self.config.password.as_deref()).unwrap_or_default().to_string();
        let credentials = Credentials::new(user, password);

        let result = self.authenticate(&credentials, method).await;
        match result {
            Ok(()) => {
                self.logged_in = true;
                Ok(())
            }
            Err(e) => {
                self.logged_in = false;
                self.close(false).await;
                Err(error::auth_failed(e.to_string()))
            }
        }
    }

    async fn authenticate(&mut self, credentials: &Credentials, method: Option<Mechanism>) -> Result<(), Error> {
        let mechanism = match method {
            Some(m) => m,
            None => {
                let advertised = self
                    .features
                    .as_ref()
                    .and_then(|f| f.get("auth"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                authentication::select(&self.config.auth_order, advertised).ok_or_else(error::auth_not_supported)?
            }
        };

        tracing::debug!(mechanism = mechanism.name(), "authenticating");

        let opener = mechanism.initial_command(credentials);
        let mut response = self.send(&format!("{}{}", opener, CRLF)).await?;

        let mut step = 0;
        while mechanism.uses_challenge() && response.has_code(334) {
            let reply = mechanism.challenge_response(credentials, step, response.message())?;
            response = self.send(&format!("{}{}", reply, CRLF)).await?;
            step += 1;
        }

        match response.code() {
            235 | 503 => Ok(()),
            code => Err(error::code(code, Some(response.message().to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_without_user_is_rejected_at_construction() {
        let mut config = SessionConfig::new("127.0.0.1");
        config.password = Some("honey".to_string());
        let err = Session::new(config).unwrap_err();
        assert_eq!(err.kind(), error::Kind::Client);
    }

    #[test]
    fn fresh_session_without_credentials_is_already_authorized() {
        let session = Session::new(SessionConfig::new("127.0.0.1")).unwrap();
        assert!(session.authorized());
        assert_eq!(session.state(), State::NotConnected);
    }

    #[test]
    fn session_with_credentials_starts_unauthorized() {
        let config = SessionConfig::new("127.0.0.1").credentials("pooh", "honey");
        let session = Session::new(config).unwrap();
        assert!(!session.authorized());
    }

    #[test]
    fn effective_port_depends_on_tls_mode() {
        assert_eq!(SessionConfig::new("h").effective_port(), SMTP_PORT);
        assert_eq!(SessionConfig::new("h").tls(TlsParameters::new("h")).effective_port(), SUBMISSION_PORT);
        assert_eq!(SessionConfig::new("h").ssl(TlsParameters::new("h")).effective_port(), SUBMISSIONS_PORT);
    }
}
