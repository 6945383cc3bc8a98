//! The data-connection factory: passive (client connects out) and active
//! (client listens, server connects in) strategies.
//!
//! In either strategy the connection is negotiated over the control
//! channel before the transfer command is written, and the caller owns
//! the resulting stream for exactly one transfer.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::warn;

use crate::command::Command;
use crate::control::ControlChannel;
use crate::reply;
use crate::status;
use crate::stream::{Connection, DataListener};
use crate::types::{FtpError, Result};

/// Negotiates a passive-mode data connection and connects to it.
///
/// PASV for an IPv4 control peer, EPSV for IPv6. An EPSV reply names
/// only the port; the host is the control connection's peer address.
pub fn open_passive(control: &mut ControlChannel) -> Result<Connection> {
    let timeout = control.timeout();
    match control.peer_addr()?.ip() {
        IpAddr::V4(_) => {
            let reply = control.exchange(&Command::Pasv)?;
            reply.expect(&[status::PASSIVE_MODE])?;
            let (ip, port) = reply::parse_pasv(&reply.text)?;
            Connection::open(&ip.to_string(), port, timeout)
        }
        IpAddr::V6(ip) => {
            let reply = control.exchange(&Command::Epsv)?;
            reply.expect(&[status::EXTENDED_PASSIVE_MODE])?;
            let port = reply::parse_epsv(&reply.text)?;
            Connection::open(&ip.to_string(), port, timeout)
        }
    }
}

/// An active-mode accept in flight on a background thread.
///
/// Exactly one of [`join`](PendingAccept::join) or
/// [`abandon`](PendingAccept::abandon) consumes it, so the thread is
/// reaped on every path; the polled listener guarantees the thread
/// terminates by its deadline even if nobody calls either.
pub struct PendingAccept {
    handle: JoinHandle<Result<Connection>>,
    cancel: Arc<AtomicBool>,
}

impl PendingAccept {
    /// Waits for the server's inbound connection.
    pub fn join(self) -> Result<Connection> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(FtpError::Transport(io::Error::new(
                io::ErrorKind::Other,
                "data-connection accept thread panicked",
            ))),
        }
    }

    /// Unblocks and reaps the accept thread after the transfer command
    /// was refused or failed.
    pub fn abandon(self) {
        self.cancel.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("data-connection accept thread panicked during abandon");
        }
    }
}

/// Announces the already-bound listener with PORT (or EPRT for IPv6) and
/// starts the background accept.
///
/// The caller binds before the announcement goes out, so the server can
/// connect the moment it processes the transfer command.
pub fn open_active(control: &mut ControlChannel, listener: DataListener) -> Result<PendingAccept> {
    let timeout = control.timeout();
    let announce = match listener.local_addr()? {
        SocketAddr::V4(v4) => Command::Port(*v4.ip(), v4.port()),
        SocketAddr::V6(v6) => Command::Eprt(IpAddr::V6(*v6.ip()), v6.port()),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let handle = thread::spawn(move || listener.accept_within(timeout, &flag));
    let pending = PendingAccept { handle, cancel };

    match control.exchange(&announce).and_then(|reply| reply.expect(&[status::COMMAND_OK])) {
        Ok(()) => Ok(pending),
        Err(err) => {
            pending.abandon();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;
    use std::time::{Duration, Instant};

    // abandon() must come back promptly even though the accept deadline
    // is far away.
    #[test]
    fn abandon_reaps_the_accept_thread() {
        let listener = DataListener::bind("127.0.0.1", 0).unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = thread::spawn(move || listener.accept_within(Duration::from_secs(60), &flag));
        let pending = PendingAccept { handle, cancel };

        let started = Instant::now();
        pending.abandon();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn join_hands_over_the_inbound_connection() {
        let listener = DataListener::bind("127.0.0.1", 0).unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let handle = thread::spawn(move || listener.accept_within(Duration::from_secs(5), &flag));
        let pending = PendingAccept { handle, cancel };

        let _client = TcpStream::connect(addr).unwrap();
        assert!(pending.join().is_ok());
    }
}
