//! The session engine: the public FTP client.
//!
//! `FtpClient` owns the control channel for its lifetime, sequences the
//! commands behind each operation, applies the per-command acceptance
//! sets and orchestrates data-channel lifecycles. Protocol refusals
//! (`UnexpectedReply`) leave the session usable; transport failures on
//! the control or data path disconnect it, after which only [`close`]
//! is permitted.
//!
//! [`close`]: FtpClient::close

use std::io::Read;

#[cfg(feature = "secure")]
use native_tls::TlsConnector;

use crate::command::Command;
use crate::control::ControlChannel;
use crate::data::{self, PendingAccept};
use crate::reply::{self, Reply};
use crate::status;
use crate::stream::{Connection, DataListener};
#[cfg(feature = "secure")]
use crate::types::ProtectionLevel;
use crate::types::{ConnectionOptions, FileType, FtpError, Result, TransmissionMode};

// Upload chunk size; downloads drain with the same granularity.
const DATA_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disconnected,
    Connected,
    #[cfg(feature = "secure")]
    Secured,
    Authenticated,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Disconnected => "disconnected",
            State::Connected => "connected",
            #[cfg(feature = "secure")]
            State::Secured => "secured",
            State::Authenticated => "authenticated",
        }
    }

    fn ready_for_login(self) -> bool {
        #[cfg(feature = "secure")]
        {
            matches!(self, State::Connected | State::Secured)
        }
        #[cfg(not(feature = "secure"))]
        {
            matches!(self, State::Connected)
        }
    }
}

/// A synchronous FTP session.
///
/// ```no_run
/// use rsftp::{ConnectionOptions, FtpClient};
///
/// let mut client = FtpClient::new(ConnectionOptions {
///     server_host: "127.0.0.1".to_string(),
///     username: "admin".to_string(),
///     password: "admin".to_string(),
///     ..Default::default()
/// });
/// client.connect()?;
/// client.login()?;
/// let listing = client.ls(None)?;
/// println!("{}", listing);
/// client.close()?;
/// # Ok::<(), rsftp::FtpError>(())
/// ```
pub struct FtpClient {
    options: ConnectionOptions,
    control: Option<ControlChannel>,
    state: State,
    #[cfg(feature = "secure")]
    tls: Option<TlsConnector>,
}

impl FtpClient {
    /// Builds a client; no I/O happens until [`connect`](FtpClient::connect).
    pub fn new(options: ConnectionOptions) -> FtpClient {
        FtpClient {
            options,
            control: None,
            state: State::Disconnected,
            #[cfg(feature = "secure")]
            tls: None,
        }
    }

    /// Opens the control connection and consumes the greeting. With
    /// `use_tls` set, also performs the AUTH TLS / PBSZ 0 / PROT P
    /// bring-up before returning.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != State::Disconnected {
            return Err(self.usage("connect"));
        }
        let conn = Connection::open(
            &self.options.server_host,
            self.options.server_port,
            self.options.timeout,
        )?;
        self.control = Some(ControlChannel::new(conn, self.options.debug));

        if let Err(err) = self.final_reply(&[status::READY]) {
            self.teardown();
            return Err(err);
        }
        self.state = State::Connected;

        #[cfg(feature = "secure")]
        if self.options.use_tls {
            self.secure_control()?;
        }

        Ok(())
    }

    /// Logs in with the credentials from the connection options.
    pub fn login(&mut self) -> Result<()> {
        let username = self.options.username.clone();
        let password = self.options.password.clone();
        self.login_with(&username, &password)
    }

    /// Logs in with explicit credentials. PASS is only sent when USER
    /// answers 331.
    pub fn login_with(&mut self, username: &str, password: &str) -> Result<()> {
        if !self.state.ready_for_login() {
            return Err(self.usage("login"));
        }
        let logged_in = [status::LOGGED_IN, status::SECURITY_LOGGED_IN];
        let reply = self.exchange(
            Command::User(username.to_string()),
            &[status::LOGGED_IN, status::SECURITY_LOGGED_IN, status::NEED_PASSWORD],
        )?;
        if !reply.matches(&logged_in) {
            self.exchange(Command::Pass(password.to_string()), &logged_in)?;
        }
        self.state = State::Authenticated;
        Ok(())
    }

    /// Reinitializes the session (REIN), dropping authentication but
    /// keeping the control connection.
    pub fn logout(&mut self) -> Result<()> {
        self.require_authenticated("logout")?;
        self.exchange(Command::Rein, &[status::READY])?;
        self.state = State::Connected;
        Ok(())
    }

    /// Ends the session. Safe to call in any state; QUIT is only sent
    /// while the control channel is still alive.
    pub fn close(&mut self) -> Result<()> {
        if self.control.is_none() || self.state == State::Disconnected {
            self.teardown();
            return Ok(());
        }
        let result = self.exchange(Command::Quit, &[status::CLOSING]);
        self.teardown();
        result.map(|_| ())
    }

    /// Changes the remote working directory.
    pub fn cwd(&mut self, path: &str) -> Result<()> {
        self.require_authenticated("cwd")?;
        self.exchange(Command::Cwd(path.to_string()), &[status::FILE_ACTION_OK])?;
        Ok(())
    }

    /// Moves to the parent directory.
    pub fn cdup(&mut self) -> Result<()> {
        self.require_authenticated("cdup")?;
        self.exchange(Command::Cdup, &[status::COMMAND_OK, status::FILE_ACTION_OK])?;
        Ok(())
    }

    /// Mounts a different file-system data structure (SMNT). Not
    /// supported by every server.
    pub fn smnt(&mut self, mount_point: &str) -> Result<()> {
        self.require_authenticated("smnt")?;
        self.exchange(
            Command::Smnt(mount_point.to_string()),
            &[status::COMMAND_SUPERFLUOUS, status::FILE_ACTION_OK],
        )?;
        Ok(())
    }

    /// The remote working directory, unquoted from the 257 reply.
    pub fn pwd(&mut self) -> Result<String> {
        self.require_authenticated("pwd")?;
        let reply = self.exchange(Command::Pwd, &[status::PATH_CREATED])?;
        reply::parse_pwd(&reply.text)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.require_authenticated("mkdir")?;
        self.exchange(Command::Mkd(path.to_string()), &[status::PATH_CREATED])?;
        Ok(())
    }

    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.require_authenticated("rmdir")?;
        self.exchange(Command::Rmd(path.to_string()), &[status::FILE_ACTION_OK])?;
        Ok(())
    }

    /// Removes a file.
    pub fn delete(&mut self, path: &str) -> Result<()> {
        self.require_authenticated("delete")?;
        self.exchange(Command::Dele(path.to_string()), &[status::FILE_ACTION_OK])?;
        Ok(())
    }

    /// Renames `from` to `to` via the RNFR/RNTO pair. RNTO is only sent
    /// after RNFR answers 350.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.require_authenticated("rename")?;
        self.exchange(Command::Rnfr(from.to_string()), &[status::PENDING_FURTHER_INFO])?;
        self.exchange(Command::Rnto(to.to_string()), &[status::FILE_ACTION_OK])?;
        Ok(())
    }

    /// The server's system identification (SYST), without the code.
    pub fn system_info(&mut self) -> Result<String> {
        self.require_connected("system_info")?;
        let reply = self.exchange(Command::Syst, &[status::SYSTEM_NAME])?;
        reply::parse_syst(&reply.text)
    }

    /// Server or transfer status (STAT), optionally for a pathname.
    /// Returns the raw reply text.
    pub fn progress(&mut self, path: Option<&str>) -> Result<String> {
        self.require_connected("progress")?;
        let reply = self.exchange(
            Command::Stat(path.map(str::to_string)),
            &[status::SYSTEM_STATUS, status::DIRECTORY_STATUS, status::FILE_STATUS],
        )?;
        Ok(reply.text)
    }

    /// Help text from the server, optionally for one command.
    pub fn help(&mut self, topic: Option<&str>) -> Result<String> {
        self.require_connected("help")?;
        let reply = self.exchange(
            Command::Help(topic.map(str::to_string)),
            &[status::SYSTEM_STATUS, status::HELP_MESSAGE],
        )?;
        Ok(reply.text)
    }

    /// A site-specific command (SITE).
    pub fn site(&mut self, parameters: &str) -> Result<()> {
        self.require_connected("site")?;
        self.exchange(
            Command::Site(parameters.to_string()),
            &[status::COMMAND_OK, status::COMMAND_SUPERFLUOUS],
        )?;
        Ok(())
    }

    /// Keeps the connection alive.
    pub fn noop(&mut self) -> Result<()> {
        self.require_connected("noop")?;
        self.exchange(Command::Noop, &[status::COMMAND_OK])?;
        Ok(())
    }

    /// Sets the representation type for subsequent transfers (TYPE).
    pub fn transfer_type(&mut self, file_type: FileType) -> Result<()> {
        self.require_connected("transfer_type")?;
        self.exchange(Command::Type(file_type), &[status::COMMAND_OK])?;
        Ok(())
    }

    /// Name listing (NLST) of the current or given directory.
    pub fn ls(&mut self, path: Option<&str>) -> Result<String> {
        self.retrieve_listing(Command::Nlst(path.map(str::to_string)))
    }

    /// Detailed listing (LIST) of the current or given directory.
    pub fn list(&mut self, path: Option<&str>) -> Result<String> {
        self.retrieve_listing(Command::List(path.map(str::to_string)))
    }

    /// Downloads `path` into memory.
    pub fn download(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.download_to(path, |chunk| data.extend_from_slice(chunk))?;
        Ok(data)
    }

    /// Downloads `path`, pushing each chunk to `sink` as it arrives.
    pub fn download_to<F>(&mut self, path: &str, sink: F) -> Result<()>
    where
        F: FnMut(&[u8]),
    {
        self.retrieve(Command::Retr(path.to_string()), sink)
    }

    /// Uploads `source` to `path` (STOR).
    pub fn upload<R: Read>(&mut self, path: &str, source: &mut R) -> Result<()> {
        self.transmit(Command::Stor(path.to_string()), source)
    }

    /// Appends `source` to `path`, creating it if absent (APPE).
    pub fn append<R: Read>(&mut self, path: &str, source: &mut R) -> Result<()> {
        self.transmit(Command::Appe(path.to_string()), source)
    }

    // ---- transfer orchestration ----

    fn retrieve_listing(&mut self, command: Command) -> Result<String> {
        let mut buf = Vec::new();
        self.retrieve(command, |chunk| buf.extend_from_slice(chunk))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn retrieve<F>(&mut self, command: Command, mut sink: F) -> Result<()>
    where
        F: FnMut(&[u8]),
    {
        let mut data = self.start_transfer(&command)?;
        let outcome = loop {
            match data.read_some(DATA_CHUNK) {
                Ok(chunk) => sink(&chunk),
                // Stream mode: the server closing the data connection is
                // the end of the file.
                Err(FtpError::EndOfStream) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        // The data channel closes before the final reply is consumed;
        // some servers hold 226 until the client's side is down.
        let _ = data.close();
        match outcome {
            Ok(()) => {
                self.final_reply(&[status::CLOSING_DATA_CONNECTION, status::FILE_ACTION_OK])?;
                Ok(())
            }
            Err(err) => Err(self.demote(err)),
        }
    }

    fn transmit(&mut self, command: Command, source: &mut dyn Read) -> Result<()> {
        let mut data = self.start_transfer(&command)?;
        let mut buf = [0u8; DATA_CHUNK];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    // The local source died, not the session. Close the
                    // half-written file and consume the server's verdict
                    // so the dialogue stays in step.
                    let _ = data.close();
                    self.drain_final_reply();
                    return Err(FtpError::Transport(err));
                }
            };
            if let Err(err) = data.write_all(&buf[..n]) {
                return Err(self.demote(err));
            }
        }
        // Closing the data channel is the end-of-data signal in stream mode.
        let _ = data.close();
        self.final_reply(&[status::CLOSING_DATA_CONNECTION, status::FILE_ACTION_OK])?;
        Ok(())
    }

    /// Opens the data channel for `command` and sends the command itself,
    /// accepting its preliminary 125/150. On return the transfer is live.
    fn start_transfer(&mut self, command: &Command) -> Result<Connection> {
        self.require_authenticated(command.mnemonic())?;
        if self.options.mode != TransmissionMode::Stream {
            return Err(FtpError::Usage(
                "only stream transmission mode is implemented".to_string(),
            ));
        }
        let preliminary = [status::ALREADY_OPEN, status::ABOUT_TO_SEND];

        if self.options.passive_mode {
            let mut data = self.open_passive_data()?;
            match self.exchange(command.clone(), &preliminary) {
                Ok(_) => {}
                Err(err) => {
                    let _ = data.close();
                    return Err(err);
                }
            }
            self.finish_data_setup(data)
        } else {
            let listener = DataListener::bind(&self.options.data_host, self.options.data_port)?;
            let pending = self.open_active_data(listener)?;
            match self.exchange(command.clone(), &preliminary) {
                Ok(_) => {}
                Err(err) => {
                    // The server never got its cue to connect; unblock
                    // and reap the accept thread before surfacing.
                    pending.abandon();
                    return Err(err);
                }
            }
            let data = match pending.join() {
                Ok(data) => data,
                Err(err) => return Err(self.demote(err)),
            };
            self.finish_data_setup(data)
        }
    }

    #[cfg(feature = "secure")]
    fn finish_data_setup(&mut self, data: Connection) -> Result<Connection> {
        let secured = match &self.tls {
            Some(connector) => data.secure_with(connector, &self.options.server_host),
            None => return Ok(data),
        };
        match secured {
            Ok(data) => Ok(data),
            Err(err) => {
                self.drain_final_reply();
                Err(err)
            }
        }
    }

    #[cfg(not(feature = "secure"))]
    fn finish_data_setup(&mut self, data: Connection) -> Result<Connection> {
        Ok(data)
    }

    // ---- control-channel plumbing ----

    #[cfg(feature = "secure")]
    fn secure_control(&mut self) -> Result<()> {
        self.exchange(Command::Auth, &[status::AUTH_OK])?;
        let connector = TlsConnector::new()?;
        let control = match self.control.take() {
            Some(control) => control,
            None => return Err(self.usage("secure the control channel")),
        };
        match control.secure_with(&connector, &self.options.server_host) {
            Ok(secured) => self.control = Some(secured),
            Err(err) => {
                // The handshake consumed the transport.
                self.state = State::Disconnected;
                return Err(err);
            }
        }
        self.tls = Some(connector);
        self.exchange(Command::Pbsz(0), &[status::COMMAND_OK])?;
        self.exchange(Command::Prot(ProtectionLevel::Private), &[status::COMMAND_OK])?;
        self.state = State::Secured;
        Ok(())
    }

    fn exchange(&mut self, command: Command, accepted: &[u32]) -> Result<Reply> {
        let result = match self.control.as_mut() {
            Some(control) => control.exchange(&command),
            None => return Err(self.usage(command.mnemonic())),
        };
        match result {
            Ok(reply) => {
                reply.expect(accepted)?;
                Ok(reply)
            }
            Err(err) => Err(self.demote(err)),
        }
    }

    fn final_reply(&mut self, accepted: &[u32]) -> Result<Reply> {
        let result = match self.control.as_mut() {
            Some(control) => control.read_reply(),
            None => return Err(self.usage("read a reply")),
        };
        match result {
            Ok(reply) => {
                reply.expect(accepted)?;
                Ok(reply)
            }
            Err(err) => Err(self.demote(err)),
        }
    }

    // Consumes one reply without judging it, keeping the dialogue in
    // step after a locally-aborted transfer.
    fn drain_final_reply(&mut self) {
        let result = match self.control.as_mut() {
            Some(control) => control.read_reply(),
            None => return,
        };
        if let Err(err) = result {
            let _ = self.demote(err);
        }
    }

    fn open_passive_data(&mut self) -> Result<Connection> {
        let result = match self.control.as_mut() {
            Some(control) => data::open_passive(control),
            None => return Err(self.usage("open a data connection")),
        };
        result.map_err(|err| self.demote(err))
    }

    fn open_active_data(&mut self, listener: DataListener) -> Result<PendingAccept> {
        let result = match self.control.as_mut() {
            Some(control) => data::open_active(control, listener),
            None => return Err(self.usage("open a data connection")),
        };
        result.map_err(|err| self.demote(err))
    }

    /// Transport and timeout failures leave nothing to resynchronize on:
    /// drop the control channel and require a fresh `connect`.
    fn demote(&mut self, err: FtpError) -> FtpError {
        if matches!(err, FtpError::Transport(_) | FtpError::Timeout | FtpError::EndOfStream) {
            self.teardown();
        }
        err
    }

    fn teardown(&mut self) {
        if let Some(mut control) = self.control.take() {
            let _ = control.close();
        }
        self.state = State::Disconnected;
    }

    fn usage(&self, what: &str) -> FtpError {
        FtpError::Usage(format!("cannot {} while {}", what, self.state.name()))
    }

    fn require_authenticated(&self, what: &str) -> Result<()> {
        if self.state == State::Authenticated {
            Ok(())
        } else {
            Err(self.usage(what))
        }
    }

    fn require_connected(&self, what: &str) -> Result<()> {
        if self.state == State::Disconnected {
            Err(self.usage(what))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnected_client() -> FtpClient {
        FtpClient::new(ConnectionOptions::default())
    }

    #[test]
    fn operations_from_disconnected_are_usage_errors() {
        let mut client = disconnected_client();
        assert!(matches!(client.login(), Err(FtpError::Usage(_))));
        assert!(matches!(client.noop(), Err(FtpError::Usage(_))));
        assert!(matches!(client.cwd("/srv"), Err(FtpError::Usage(_))));
        assert!(matches!(client.pwd(), Err(FtpError::Usage(_))));
        assert!(matches!(client.download("a.txt"), Err(FtpError::Usage(_))));
        assert!(matches!(client.ls(None), Err(FtpError::Usage(_))));
        let mut src = std::io::Cursor::new(b"data".to_vec());
        assert!(matches!(client.upload("a.txt", &mut src), Err(FtpError::Usage(_))));
    }

    #[test]
    fn close_is_safe_while_disconnected() {
        let mut client = disconnected_client();
        assert!(client.close().is_ok());
        assert!(client.close().is_ok());
    }

    #[test]
    fn non_stream_mode_is_refused_before_io() {
        let mut client = FtpClient::new(ConnectionOptions {
            mode: TransmissionMode::Block,
            ..Default::default()
        });
        // State gate fires first from Disconnected; force the mode check
        // to be the one that matters by checking its message ordering.
        client.state = State::Authenticated;
        match client.download("a.txt") {
            Err(FtpError::Usage(msg)) => assert!(msg.contains("stream")),
            other => panic!("expected usage error, got {:?}", other),
        }
    }
}
