//! Wire formatting for each SMTP verb (§4.4 verb table). `CRLF` is appended
//! by the caller at send time, not here, so these stay plain `String`s.

pub fn helo(domain: &str) -> String {
    format!("HELO {}", domain)
}

pub fn ehlo(domain: &str) -> String {
    format!("EHLO {}", domain)
}

pub fn help(topic: Option<&str>) -> String {
    match topic {
        Some(t) => format!("HELP {}", t),
        None => "HELP".to_string(),
    }
}

pub fn rset() -> String {
    "RSET".to_string()
}

pub fn noop() -> String {
    "NOOP".to_string()
}

pub fn mail(from: &str) -> String {
    format!("MAIL FROM:<{}>", from)
}

pub fn rcpt(to: &str) -> String {
    format!("RCPT TO:<{}>", to)
}

pub fn data() -> String {
    "DATA".to_string()
}

pub fn vrfy(address: &str) -> String {
    format!("VRFY {}", address)
}

pub fn expn(address: &str) -> String {
    format!("EXPN {}", address)
}

pub fn quit() -> String {
    "QUIT".to_string()
}

pub fn starttls() -> String {
    "STARTTLS".to_string()
}

/// First whitespace-delimited word of a command line, used in
/// `BadResponse` messages (`bad response on command '<word>': ...`).
pub fn first_word(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}
