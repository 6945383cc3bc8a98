//! Server replies: code extraction, acceptance checking and the
//! structured payload grammars (PASV, EPSV, PWD, SYST).
//!
//! Framing happens in the control channel, which hands a complete
//! (possibly multi-line) reply text to [`Reply::parse`]. The payload
//! extractors are free functions invoked by the session engine only for
//! the commands that need them.

use std::net::Ipv4Addr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{FtpError, Result};

lazy_static! {
    // The endpoint sextet in a 227 reply: (h1,h2,h3,h4,p1,p2).
    static ref PASV_RE: Regex =
        Regex::new(r"\((\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})\)").unwrap();

    // The RFC 2428 229 tuple: (|||port|). Address family and address are
    // optional; only the port is required.
    static ref EPSV_RE: Regex = Regex::new(r"\(([^|()]*)\|([^|()]*)\|([^|()]*)\|(\d{1,5})\|\)").unwrap();
}

/// One complete server reply: every line-leading code, in order, plus the
/// verbatim text (intermediate CRLFs included).
#[derive(Debug, Clone)]
pub struct Reply {
    pub codes: Vec<u32>,
    pub text: String,
}

impl Reply {
    /// Extracts the reply codes from an already-framed reply text. A text
    /// without a single line-leading code is malformed.
    pub fn parse(text: String) -> Result<Reply> {
        let codes: Vec<u32> = text.lines().filter_map(leading_code).collect();
        if codes.is_empty() {
            return Err(FtpError::MalformedReply(text));
        }
        Ok(Reply { codes, text })
    }

    /// The primary code: the one on the final line.
    pub fn code(&self) -> u32 {
        // parse() guarantees at least one code
        self.codes.last().copied().unwrap_or(0)
    }

    /// Succeeds iff the parsed codes intersect the acceptance set.
    pub fn expect(&self, accepted: &[u32]) -> Result<()> {
        if self.codes.iter().any(|code| accepted.contains(code)) {
            Ok(())
        } else {
            Err(FtpError::UnexpectedReply {
                codes: self.codes.clone(),
                text: self.text.clone(),
            })
        }
    }

    /// Whether any parsed code is in the acceptance set.
    pub fn matches(&self, accepted: &[u32]) -> bool {
        self.codes.iter().any(|code| accepted.contains(code))
    }
}

// A code is exactly three digits at the start of a line, first digit in
// the 1-6 class range of RFC 959/2228.
fn leading_code(line: &str) -> Option<u32> {
    let bytes = line.as_bytes();
    if bytes.len() < 3
        || !(b'1'..=b'6').contains(&bytes[0])
        || !bytes[1].is_ascii_digit()
        || !bytes[2].is_ascii_digit()
    {
        return None;
    }
    if bytes.len() > 3 && bytes[3].is_ascii_digit() {
        return None;
    }
    line[..3].parse().ok()
}

/// Pulls the data endpoint out of a 227 reply. The port is `p1·256 + p2`.
pub fn parse_pasv(text: &str) -> Result<(Ipv4Addr, u16)> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::MalformedReply(text.to_string()))?;

    let mut fields = [0u8; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = caps[i + 1]
            .parse()
            .map_err(|_| FtpError::MalformedReply(text.to_string()))?;
    }

    let [h1, h2, h3, h4, p1, p2] = fields;
    let port = u16::from(p1) << 8 | u16::from(p2);
    Ok((Ipv4Addr::new(h1, h2, h3, h4), port))
}

/// Pulls the port out of a 229 reply. RFC 2428 leaves the host to the
/// control connection's peer address.
pub fn parse_epsv(text: &str) -> Result<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpError::MalformedReply(text.to_string()))?;
    caps[4]
        .parse()
        .map_err(|_| FtpError::MalformedReply(text.to_string()))
}

/// Extracts the pathname from a 257 reply: the text between the first
/// pair of double quotes, with embedded `""` unescaped to `"`.
pub fn parse_pwd(text: &str) -> Result<String> {
    let start = text
        .find('"')
        .ok_or_else(|| FtpError::MalformedReply(text.to_string()))?;

    let mut path = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c != '"' {
            path.push(c);
        } else if chars.peek() == Some(&'"') {
            chars.next();
            path.push('"');
        } else {
            return Ok(path);
        }
    }
    // Ran out of text before the closing quote.
    Err(FtpError::MalformedReply(text.to_string()))
}

/// Extracts the system name from a 215 reply: everything after the first
/// space.
pub fn parse_syst(text: &str) -> Result<String> {
    match text.split_once(' ') {
        Some((_, rest)) if !rest.trim_end().is_empty() => Ok(rest.trim_end().to_string()),
        _ => Err(FtpError::MalformedReply(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status;

    #[test]
    fn single_line_reply() {
        let reply = Reply::parse("220 ready\r\n".to_string()).unwrap();
        assert_eq!(reply.codes, vec![220]);
        assert_eq!(reply.code(), 220);
        assert_eq!(reply.text, "220 ready\r\n");
    }

    #[test]
    fn multi_line_reply_keeps_text_and_collects_codes() {
        let raw = "211-Features:\r\n UTF8\r\n211 End\r\n";
        let reply = Reply::parse(raw.to_string()).unwrap();
        assert_eq!(reply.text, raw);
        assert_eq!(reply.codes, vec![211, 211]);
        assert_eq!(reply.code(), 211);
    }

    #[test]
    fn codes_must_be_exactly_three_digits_at_line_start() {
        let reply = Reply::parse("220 the year 2038 awaits\r\n".to_string()).unwrap();
        assert_eq!(reply.codes, vec![220]);

        // A four-digit run is not a reply code.
        assert!(Reply::parse("2202 nope\r\n".to_string()).is_err());
        assert!(Reply::parse("greeting without code\r\n".to_string()).is_err());
        assert!(Reply::parse("999 out of class\r\n".to_string()).is_err());
    }

    #[test]
    fn every_code_lands_in_a_reply_class() {
        let raw = "150-starting\r\n226 done\r\n";
        let reply = Reply::parse(raw.to_string()).unwrap();
        for code in &reply.codes {
            assert!(status::class_of(*code).is_some(), "code {} unclassified", code);
        }
    }

    #[test]
    fn acceptance_is_set_intersection() {
        let reply = Reply::parse("150 opening\r\n226 done\r\n".to_string()).unwrap();
        assert!(reply.expect(&[status::CLOSING_DATA_CONNECTION]).is_ok());
        assert!(reply.expect(&[status::ABOUT_TO_SEND]).is_ok());
        match reply.expect(&[status::COMMAND_OK]) {
            Err(FtpError::UnexpectedReply { codes, .. }) => assert_eq!(codes, vec![150, 226]),
            other => panic!("expected UnexpectedReply, got {:?}", other),
        }
    }

    #[test]
    fn pasv_endpoint_roundtrip() {
        let (ip, port) =
            parse_pasv("227 Entering Passive Mode (192,168,1,7,195,80).\r\n").unwrap();
        assert_eq!(ip, Ipv4Addr::new(192, 168, 1, 7));
        assert_eq!(port, 50000);

        // Through the PORT encoder and back.
        let line = crate::command::Command::Port(ip, port).encode().unwrap();
        let (ip2, port2) = parse_pasv(&format!("({})", &line[5..line.len() - 2])).unwrap();
        assert_eq!((ip2, port2), (ip, port));
    }

    #[test]
    fn pasv_rejects_out_of_range_octets() {
        assert!(parse_pasv("227 (999,0,0,1,0,80)\r\n").is_err());
        assert!(parse_pasv("227 passive, but no endpoint\r\n").is_err());
    }

    #[test]
    fn epsv_needs_only_the_port() {
        assert_eq!(parse_epsv("229 Entering Extended Passive Mode (|||50000|)\r\n").unwrap(), 50000);
        assert_eq!(parse_epsv("229 ok (|2|::1|2121|)\r\n").unwrap(), 2121);
        assert!(parse_epsv("229 (|||65536|)\r\n").is_err());
        assert!(parse_epsv("229 no tuple\r\n").is_err());
    }

    #[test]
    fn pwd_unquotes_doubled_quotes() {
        assert_eq!(parse_pwd("257 \"/home/admin\" created\r\n").unwrap(), "/home/admin");
        assert_eq!(parse_pwd("257 \"a\"\"b\"\r\n").unwrap(), "a\"b");
        assert!(parse_pwd("257 no quotes here\r\n").is_err());
        assert!(parse_pwd("257 \"unterminated\r\n").is_err());
    }

    #[test]
    fn syst_returns_the_tail() {
        assert_eq!(parse_syst("215 UNIX Type: L8\r\n").unwrap(), "UNIX Type: L8");
        assert!(parse_syst("215\r\n").is_err());
    }
}
