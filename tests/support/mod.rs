//! A minimal scripted SMTP server for integration tests: binds a loopback
//! listener and hands the raw socket to the test so it can read commands and
//! write replies in whatever order the scenario needs.

use tokio::net::{TcpListener, TcpStream};

/// Binds an ephemeral loopback port and returns it alongside the listener.
pub async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let port = listener.local_addr().expect("local_addr").port();
    (listener, port)
}

pub async fn accept_one(listener: TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().await.expect("accept one connection");
    stream
}
