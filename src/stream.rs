//! The byte-stream transport: blocking TCP (optionally TLS) bounded by
//! the session timeout, plus the active-mode listener.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

#[cfg(feature = "secure")]
use native_tls::{TlsConnector, TlsStream};

use crate::types::{FtpError, Result};

// Poll interval for the non-blocking active-mode accept loop.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// The stream beneath a control or data connection, plain or TLS.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(feature = "secure")]
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    fn tcp(&self) -> &TcpStream {
        match self {
            Stream::Tcp(stream) => stream,
            #[cfg(feature = "secure")]
            Stream::Tls(stream) => stream.get_ref(),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.read(buf),
            #[cfg(feature = "secure")]
            Stream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.write(buf),
            #[cfg(feature = "secure")]
            Stream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.flush(),
            #[cfg(feature = "secure")]
            Stream::Tls(stream) => stream.flush(),
        }
    }
}

/// A buffered, timeout-bounded blocking byte stream.
///
/// Every read and write is bounded by the timeout given at construction;
/// exceeding it surfaces [`FtpError::Timeout`]. A peer close during read
/// surfaces [`FtpError::EndOfStream`], which is the normal end of a
/// stream-mode data transfer.
#[derive(Debug)]
pub struct Connection {
    reader: BufReader<Stream>,
    timeout: Duration,
}

impl Connection {
    /// Resolves `host` and establishes TCP within `timeout`.
    pub fn open(host: &str, port: u16, timeout: Duration) -> Result<Connection> {
        if host.is_empty() {
            return Err(FtpError::BadArgument("empty hostname".to_string()));
        }
        if port == 0 {
            return Err(FtpError::BadArgument("port must be non-zero".to_string()));
        }

        let addrs = (host, port).to_socket_addrs().map_err(FtpError::Transport)?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    debug!("connected to {}", addr);
                    return Connection::from_tcp(stream, timeout);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) => FtpError::from(err),
            None => FtpError::Transport(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", host),
            )),
        })
    }

    /// Wraps an established socket, arming its read/write timeouts.
    pub fn from_tcp(stream: TcpStream, timeout: Duration) -> Result<Connection> {
        stream.set_read_timeout(Some(timeout)).map_err(FtpError::Transport)?;
        stream.set_write_timeout(Some(timeout)).map_err(FtpError::Transport)?;
        Ok(Connection {
            reader: BufReader::new(Stream::Tcp(stream)),
            timeout,
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.reader.get_ref().tcp().peer_addr().map_err(FtpError::Transport)
    }

    /// The bound applied to every blocking operation on this stream.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reads between 1 and `max` bytes.
    pub fn read_some(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        let n = self.reader.read(&mut buf)?;
        if n == 0 {
            return Err(FtpError::EndOfStream);
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Reads one LF-terminated line, terminator included. A peer close
    /// before the terminator is an `EndOfStream`.
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        self.reader.read_until(b'\n', &mut line)?;
        if !line.ends_with(b"\n") {
            return Err(FtpError::EndOfStream);
        }
        String::from_utf8(line)
            .map_err(|err| FtpError::MalformedReply(String::from_utf8_lossy(err.as_bytes()).into_owned()))
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(buf)?;
        stream.flush()?;
        Ok(())
    }

    /// Orderly shutdown; safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        match self.reader.get_ref().tcp().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(ref err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(FtpError::Transport(err)),
        }
    }

    /// Wraps the plain TCP stream in TLS, keeping the timeout discipline.
    #[cfg(feature = "secure")]
    pub fn secure_with(self, connector: &TlsConnector, domain: &str) -> Result<Connection> {
        let timeout = self.timeout;
        let tcp = match self.reader.into_inner() {
            Stream::Tcp(stream) => stream,
            Stream::Tls(_) => return Err(FtpError::Usage("connection is already secured".to_string())),
        };
        let tls = connector.connect(domain, tcp)?;
        Ok(Connection {
            reader: BufReader::new(Stream::Tls(Box::new(tls))),
            timeout,
        })
    }
}

/// The listening half of an active-mode data connection.
///
/// The socket is non-blocking and [`DataListener::accept_within`] polls
/// it, so the accepting side always terminates by its deadline or by the
/// cancel flag; it can never sit in `accept()` forever.
#[derive(Debug)]
pub struct DataListener {
    listener: TcpListener,
}

impl DataListener {
    pub fn bind(host: &str, port: u16) -> Result<DataListener> {
        if host.is_empty() {
            return Err(FtpError::BadArgument("empty data host".to_string()));
        }
        let listener = TcpListener::bind((host, port)).map_err(FtpError::Transport)?;
        listener.set_nonblocking(true).map_err(FtpError::Transport)?;
        Ok(DataListener { listener })
    }

    /// The bound endpoint, for the PORT/EPRT announcement.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(FtpError::Transport)
    }

    /// Accepts exactly one inbound connection within `timeout`. Raising
    /// `cancel` unblocks the loop early when the transfer was abandoned.
    pub fn accept_within(&self, timeout: Duration, cancel: &AtomicBool) -> Result<Connection> {
        let deadline = Instant::now() + timeout;
        loop {
            if cancel.load(Ordering::Acquire) {
                return Err(FtpError::Transport(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "data-connection accept cancelled",
                )));
            }
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    debug!("data connection accepted from {}", addr);
                    stream.set_nonblocking(false).map_err(FtpError::Transport)?;
                    return Connection::from_tcp(stream, timeout);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(FtpError::Timeout);
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => return Err(FtpError::Transport(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_validates_arguments_before_io() {
        assert!(matches!(
            Connection::open("", 21, Duration::from_secs(1)),
            Err(FtpError::BadArgument(_))
        ));
        assert!(matches!(
            Connection::open("localhost", 0, Duration::from_secs(1)),
            Err(FtpError::BadArgument(_))
        ));
    }

    #[test]
    fn accept_times_out_when_nobody_connects() {
        let listener = DataListener::bind("127.0.0.1", 0).unwrap();
        let cancel = AtomicBool::new(false);
        let started = Instant::now();
        let result = listener.accept_within(Duration::from_millis(100), &cancel);
        assert!(matches!(result, Err(FtpError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn accept_unblocks_on_cancel() {
        let listener = DataListener::bind("127.0.0.1", 0).unwrap();
        let cancel = AtomicBool::new(true);
        let result = listener.accept_within(Duration::from_secs(30), &cancel);
        assert!(matches!(result, Err(FtpError::Transport(_))));
    }

    #[test]
    fn read_line_and_some_share_the_buffer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"200 hello\r\npayload").unwrap();
        });

        let mut conn = Connection::open("127.0.0.1", addr.port(), Duration::from_secs(5)).unwrap();
        assert_eq!(conn.read_line().unwrap(), "200 hello\r\n");
        assert_eq!(conn.read_some(64).unwrap(), b"payload");
        assert!(matches!(conn.read_some(64), Err(FtpError::EndOfStream)));
        server.join().unwrap();
    }
}
