//! Integration-level scenario tests: each test spawns a tiny loopback
//! server task that speaks just enough SMTP for the scenario, then drives a
//! real [`Session`] against it.

mod support;

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use smtp_session::{Kind, Mechanism, Session, SessionConfig};

async fn read_line(reader: &mut (impl AsyncBufReadExt + Unpin)) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read a line from the client");
    line.trim_end_matches("\r\n").to_string()
}

#[tokio::test]
async fn plain_auth_success() {
    let (listener, port) = support::bind().await;
    let server = tokio::spawn(async move {
        let stream = support::accept_one(listener).await;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"220 mx.example.test ESMTP ready\r\n").await.unwrap();

        let ehlo = read_line(&mut reader).await;
        assert!(ehlo.starts_with("EHLO"));
        write_half
            .write_all(b"250-mx.example.test\r\n250 AUTH PLAIN LOGIN\r\n")
            .await
            .unwrap();

        let auth = read_line(&mut reader).await;
        assert_eq!(auth, "AUTH PLAIN AHBvb2gAaG9uZXk=");
        write_half.write_all(b"235 Authenticated\r\n").await.unwrap();

        let quit = read_line(&mut reader).await;
        assert_eq!(quit, "QUIT");
        write_half.write_all(b"221 Bye\r\n").await.unwrap();
    });

    let config = SessionConfig::new("127.0.0.1").port(port).credentials("pooh", "honey");
    let mut session = Session::new(config).unwrap();
    session.connect().await.unwrap();
    session.ehlo_or_helo_if_needed().await.unwrap();
    session.login(None, None, Some(Mechanism::Plain), None).await.unwrap();
    assert!(session.authorized());
    session.quit().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn login_three_step() {
    let (listener, port) = support::bind().await;
    let server = tokio::spawn(async move {
        let stream = support::accept_one(listener).await;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"220 mx.example.test ESMTP ready\r\n").await.unwrap();

        let ehlo = read_line(&mut reader).await;
        assert!(ehlo.starts_with("EHLO"));
        write_half.write_all(b"250-mx.example.test\r\n250 AUTH LOGIN\r\n").await.unwrap();

        let auth = read_line(&mut reader).await;
        assert_eq!(auth, "AUTH LOGIN");
        write_half.write_all(b"334 VXNlcm5hbWU6\r\n").await.unwrap();

        let user = read_line(&mut reader).await;
        assert_eq!(user, "cG9vaA==");
        write_half.write_all(b"334 UGFzc3dvcmQ6\r\n").await.unwrap();

        let pass = read_line(&mut reader).await;
        assert_eq!(pass, "aG9uZXk=");
        write_half.write_all(b"235 Authenticated\r\n").await.unwrap();
    });

    let config = SessionConfig::new("127.0.0.1").port(port).credentials("pooh", "honey");
    let mut session = Session::new(config).unwrap();
    session.connect().await.unwrap();
    session.login(None, None, Some(Mechanism::Login), None).await.unwrap();
    assert!(session.authorized());

    server.await.unwrap();
}

#[tokio::test]
async fn greylist_retry_succeeds_after_one_retry() {
    let (listener, port) = support::bind().await;
    let server = tokio::spawn(async move {
        let stream = support::accept_one(listener).await;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"220 mx.example.test ESMTP ready\r\n").await.unwrap();

        let mail = read_line(&mut reader).await;
        assert_eq!(mail, "MAIL FROM:<a@example.test>");
        write_half
            .write_all(b"450 4.2.0 greylisted, try again later\r\n")
            .await
            .unwrap();

        let retry = read_line(&mut reader).await;
        assert_eq!(retry, "MAIL FROM:<a@example.test>");
        write_half.write_all(b"250 OK\r\n").await.unwrap();
    });

    let config = SessionConfig::new("127.0.0.1").port(port);
    let mut session = Session::new(config).unwrap();
    session.connect().await.unwrap();
    let start = std::time::Instant::now();
    session.mail("a@example.test").await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));

    server.await.unwrap();
}

#[tokio::test]
async fn bad_greeting_surfaces_bad_response() {
    let (listener, port) = support::bind().await;
    let server = tokio::spawn(async move {
        let stream = support::accept_one(listener).await;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"554 No SMTP service here\r\n").await.unwrap();

        let quit = read_line(&mut reader).await;
        assert_eq!(quit, "QUIT");
    });

    let config = SessionConfig::new("127.0.0.1").port(port);
    let mut session = Session::new(config).unwrap();
    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), Kind::BadResponse);

    server.await.unwrap();
}

#[tokio::test]
async fn timeout_on_missing_greeting() {
    let (listener, port) = support::bind().await;
    let server = tokio::spawn(async move {
        let _stream = support::accept_one(listener).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = SessionConfig::new("127.0.0.1").port(port).timeout_ms(50);
    let mut session = Session::new(config).unwrap();
    let err = session.connect().await.unwrap_err();
    assert_eq!(err.kind(), Kind::Timeout);

    server.abort();
}

#[tokio::test]
async fn starttls_is_never_attempted_without_tls_configured() {
    let (listener, port) = support::bind().await;
    let server = tokio::spawn(async move {
        let stream = support::accept_one(listener).await;
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        write_half.write_all(b"220 mx.example.test ESMTP ready\r\n").await.unwrap();

        let ehlo = read_line(&mut reader).await;
        assert!(ehlo.starts_with("EHLO"));
        write_half
            .write_all(b"250-mx.example.test\r\n250 STARTTLS\r\n")
            .await
            .unwrap();

        // A plain connection must never send STARTTLS on its own; drive the
        // dialogue to completion so the server task doesn't hang.
        let quit = read_line(&mut reader).await;
        assert_eq!(quit, "QUIT");
        write_half.write_all(b"221 Bye\r\n").await.unwrap();
    });

    let config = SessionConfig::new("127.0.0.1").port(port);
    let mut session = Session::new(config).unwrap();
    session.connect().await.unwrap();
    session.ehlo(None).await.unwrap();
    assert!(session.supports_feature("starttls"));
    assert!(!session.is_secure());
    session.quit().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn fresh_session_without_credentials_is_already_authorized() {
    let config = SessionConfig::new("127.0.0.1");
    let session = Session::new(config).unwrap();
    assert!(session.authorized());
}

#[tokio::test]
async fn session_with_credentials_starts_unauthorized() {
    let config = SessionConfig::new("127.0.0.1").credentials("pooh", "honey");
    let session = Session::new(config).unwrap();
    assert!(!session.authorized());
}
