//! SMTP server reply parsing and the inactivity-timed read loop (RFC 5321 §4.2).

use std::fmt;
use std::time::Duration;

use nom::{
    bytes::complete::take_while_m_n,
    character::complete::{line_ending, not_line_ending, one_of},
    combinator::map,
    multi::many1,
    sequence::tuple,
    Err as NomErr, IResult,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time;

use super::error::{self, Error};
use super::net::NetworkStream;

/// One parsed SMTP reply, possibly folded from several continuation lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    code: u16,
    data: String,
    message: String,
}

impl Response {
    pub fn new(code: u16, data: String, message: String) -> Self {
        Response { code, data, message }
    }

    /// The final line's status code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// The text of every line, joined with `\n`.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The text of the last line only.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `2xx`/`3xx` codes are positive completions or intermediates.
    pub fn is_positive(&self) -> bool {
        matches!(self.code / 100, 2 | 3)
    }

    pub fn has_code(&self, code: u16) -> bool {
        self.code == code
    }

    /// Case-insensitive substring match against the reply text; used by the
    /// greylist-retry check.
    pub fn message_contains(&self, needle: &str) -> bool {
        self.message.to_lowercase().contains(&needle.to_lowercase())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

fn escape_crlf(s: &str) -> String {
    s.replace('\r', "\\r").replace('\n', "\\n")
}

struct Line {
    code: u16,
    continued: bool,
    text: String,
}

fn is_ascii_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn reply_line(input: &str) -> IResult<&str, Line> {
    map(
        tuple((
            take_while_m_n(3, 3, is_ascii_digit),
            one_of("- "),
            not_line_ending,
            line_ending,
        )),
        |(code, sep, text, _): (&str, char, &str, &str)| Line {
            code: code.parse().expect("3 ascii digits always parse"),
            continued: sep == '-',
            text: text.to_string(),
        },
    )(input)
}

/// Parses as many complete, newline-terminated lines as are available and
/// folds them into one `Response` once a non-continuation line is seen.
///
/// Mirrors the read loop's expectations: `Err(NomErr::Incomplete(_))` means
/// "keep reading", `Err(NomErr::Failure(_))`/`Err(NomErr::Error(_))` mean the
/// buffered text is not a valid SMTP reply.
pub fn parse_response(input: &str) -> IResult<&str, Response> {
    let (rest, lines) = many1(reply_line)(input)?;
    let last = lines.last().expect("many1 yields at least one line");
    if last.continued {
        return Err(NomErr::Incomplete(nom::Needed::Unknown));
    }
    let code = last.code;
    let message = last.text.clone();
    let data = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    Ok((rest, Response::new(code, data, message)))
}

/// Reads bytes from the bound transport, assembles multi-line replies, and
/// enforces the inactivity timer. Bound 1-to-1 to a `NetworkStream`; rebuilt
/// (not mutated) whenever the stream is replaced, e.g. after STARTTLS.
pub struct ResponseMonitor {
    stream: BufReader<NetworkStream>,
    timeout: Duration,
}

impl ResponseMonitor {
    pub fn new(stream: NetworkStream, timeout: Duration) -> Self {
        ResponseMonitor { stream: BufReader::new(stream), timeout }
    }

    pub fn is_encrypted(&self) -> bool {
        self.stream.get_ref().is_encrypted()
    }

    pub fn into_inner(self) -> NetworkStream {
        self.stream.into_inner()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Writes `bytes` to the transport, resetting the inactivity timer.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        tracing::debug!(wire = %escape_crlf(&String::from_utf8_lossy(bytes)), "write");
        time::timeout(self.timeout, async {
            self.stream.get_mut().write_all(bytes).await?;
            self.stream.get_mut().flush().await
        })
        .await
        .map_err(|_| error::timeout())?
        .map_err(error::network)
    }

    /// Reads one complete reply, resetting the inactivity timer on every byte
    /// received. A malformed line surfaces as `BadResponse`; elapsed
    /// inactivity surfaces as `Timeout`.
    pub async fn read_response(&mut self) -> Result<Response, Error> {
        let mut buffer = String::with_capacity(128);
        loop {
            let read = time::timeout(self.timeout, self.stream.read_line(&mut buffer))
                .await
                .map_err(|_| error::timeout())?
                .map_err(error::network)?;

            if read == 0 {
                return Err(error::response("connection closed before a complete reply"));
            }

            match parse_response(&buffer) {
                Ok((_remaining, response)) => {
                    tracing::debug!(wire = %escape_crlf(&buffer), code = response.code(), "read");
                    return Ok(response);
                }
                Err(NomErr::Incomplete(_)) => continue,
                Err(NomErr::Failure(_)) | Err(NomErr::Error(_)) => {
                    return Err(error::response(format!(
                        "malformed SMTP reply line: {:?}",
                        buffer.trim_end()
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_reply() {
        let (rest, resp) = parse_response("250 ok\r\n").unwrap();
        assert_eq!(rest, "");
        assert_eq!(resp.code(), 250);
        assert_eq!(resp.data(), "ok");
        assert_eq!(resp.message(), "ok");
    }

    #[test]
    fn folds_continuation_lines() {
        let (_, resp) = parse_response("250-one\r\n250-two\r\n250 three\r\n").unwrap();
        assert_eq!(resp.code(), 250);
        assert_eq!(resp.data(), "one\ntwo\nthree");
        assert_eq!(resp.message(), "three");
    }

    #[test]
    fn incomplete_waits_for_more_input() {
        let err = parse_response("250-partial\r\n").unwrap_err();
        assert!(matches!(err, NomErr::Incomplete(_)));
    }

    #[test]
    fn rejects_non_numeric_code() {
        let err = parse_response("abc ok\r\n").unwrap_err();
        assert!(matches!(err, NomErr::Error(_)));
    }

    #[test]
    fn message_contains_is_case_insensitive() {
        let (_, resp) = parse_response("451 Greylisted, try again later\r\n").unwrap();
        assert!(resp.message_contains("greylist"));
        assert!(resp.message_contains("GREYLIST"));
    }

    #[test]
    fn continuation_code_mismatch_keeps_final_code_authoritative() {
        let (_, resp) = parse_response("250-ignored\r\n421 final\r\n").unwrap();
        assert_eq!(resp.code(), 421);
    }
}
