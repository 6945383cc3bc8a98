//! The control channel: a single transport carrying the command/reply
//! dialogue, with strict write-then-read discipline and RFC 959
//! multi-line reply framing.

use std::net::SocketAddr;
use std::time::Duration;

use log::debug;

#[cfg(feature = "secure")]
use native_tls::TlsConnector;

use crate::command::Command;
use crate::reply::Reply;
use crate::stream::Connection;
use crate::types::{FtpError, Result};

pub struct ControlChannel {
    conn: Connection,
    trace: bool,
}

impl ControlChannel {
    pub fn new(conn: Connection, trace: bool) -> ControlChannel {
        ControlChannel { conn, trace }
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.conn.peer_addr()
    }

    pub fn timeout(&self) -> Duration {
        self.conn.timeout()
    }

    /// Writes one command and immediately reads its reply. The channel
    /// never has more than one command outstanding: this is the only
    /// write path, and it does not return until the reply is consumed.
    pub fn exchange(&mut self, command: &Command) -> Result<Reply> {
        let line = command.encode()?;
        if self.trace {
            // Never put credentials in the log.
            match command {
                Command::Pass(_) => debug!("--> PASS ****"),
                _ => debug!("--> {}", line.trim_end()),
            }
        }
        self.conn.write_all(line.as_bytes())?;
        self.read_reply()
    }

    /// Reads one complete reply. A reply opening with `ddd-` continues
    /// until a line opening with `ddd ` (same three digits); the text is
    /// kept verbatim across all lines.
    pub fn read_reply(&mut self) -> Result<Reply> {
        let first = self.conn.read_line()?;
        let header = first.as_bytes();
        if header.len() < 4 || !header[..3].iter().all(|b| b.is_ascii_digit()) {
            return Err(FtpError::MalformedReply(first));
        }

        let mut text = first.clone();
        if header[3] == b'-' {
            let closing = format!("{} ", &first[..3]);
            loop {
                let line = self.conn.read_line()?;
                let terminal = line.starts_with(&closing);
                text.push_str(&line);
                if terminal {
                    break;
                }
            }
        }

        if self.trace {
            for line in text.lines() {
                debug!("<-- {}", line);
            }
        }
        Reply::parse(text)
    }

    pub fn close(&mut self) -> Result<()> {
        self.conn.close()
    }

    /// Upgrades the underlying transport to TLS (AUTH TLS bring-up).
    #[cfg(feature = "secure")]
    pub fn secure_with(self, connector: &TlsConnector, domain: &str) -> Result<ControlChannel> {
        let trace = self.trace;
        let conn = self.conn.secure_with(connector, domain)?;
        Ok(ControlChannel { conn, trace })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn pair(server_sends: &'static [u8]) -> ControlChannel {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(server_sends).unwrap();
        });
        let conn = Connection::open("127.0.0.1", addr.port(), Duration::from_secs(5)).unwrap();
        ControlChannel::new(conn, false)
    }

    #[test]
    fn single_line_reply_is_terminal() {
        let mut control = pair(b"220 ready\r\n");
        let reply = control.read_reply().unwrap();
        assert_eq!(reply.codes, vec![220]);
        assert_eq!(reply.text, "220 ready\r\n");
    }

    #[test]
    fn hyphen_opens_a_multi_line_reply() {
        let raw: &[u8] = b"220-Welcome\r\nmid line\r\n230 decoy\r\n220 ready\r\n";
        let mut control = pair(raw);
        let reply = control.read_reply().unwrap();
        assert_eq!(reply.text, String::from_utf8_lossy(raw));
        assert_eq!(reply.codes, vec![220, 230, 220]);
        assert_eq!(reply.code(), 220);
    }

    #[test]
    fn garbage_header_is_malformed() {
        let mut control = pair(b"hello there\r\n");
        assert!(matches!(control.read_reply(), Err(FtpError::MalformedReply(_))));
    }
}
