//! The error taxonomy, transfer-parameter tokens and connection options.

use std::fmt;
use std::io;
use std::time::Duration;

/// A shorthand for a Result whose error type is always an [`FtpError`].
pub type Result<T> = std::result::Result<T, FtpError>;

/// `FtpError` is the library-global error type. Protocol failures
/// ([`FtpError::UnexpectedReply`]) leave the session usable; transport
/// failures ([`FtpError::Transport`], [`FtpError::Timeout`] and
/// [`FtpError::EndOfStream`] on the control channel) disconnect it.
#[derive(Debug)]
pub enum FtpError {
    /// The call order violates the session state machine.
    Usage(String),
    /// An argument was rejected before any I/O took place.
    BadArgument(String),
    /// TCP establishment or byte-level I/O failed.
    Transport(io::Error),
    /// TLS configuration or handshake failed.
    #[cfg(feature = "secure")]
    Secure(String),
    /// A blocking operation exceeded the configured timeout.
    Timeout,
    /// The peer closed the connection during a read. Normal termination
    /// for a stream-mode data drain, fatal anywhere else.
    EndOfStream,
    /// A reply failed framing or structured-payload parsing.
    MalformedReply(String),
    /// A well-formed reply carried no code from the acceptance set.
    UnexpectedReply { codes: Vec<u32>, text: String },
}

impl From<io::Error> for FtpError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            // Blocking sockets report an elapsed read/write timeout as
            // WouldBlock on Unix and TimedOut on Windows.
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => FtpError::Timeout,
            io::ErrorKind::UnexpectedEof => FtpError::EndOfStream,
            _ => FtpError::Transport(err),
        }
    }
}

#[cfg(feature = "secure")]
impl From<native_tls::Error> for FtpError {
    fn from(err: native_tls::Error) -> Self {
        FtpError::Secure(err.to_string())
    }
}

#[cfg(feature = "secure")]
impl<S: fmt::Debug + 'static> From<native_tls::HandshakeError<S>> for FtpError {
    fn from(err: native_tls::HandshakeError<S>) -> Self {
        FtpError::Secure(err.to_string())
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FtpError::Usage(desc) => write!(f, "FTP usage error: {}", desc),
            FtpError::BadArgument(desc) => write!(f, "FTP bad argument: {}", desc),
            FtpError::Transport(ioerr) => write!(f, "FTP transport error: {}", ioerr),
            #[cfg(feature = "secure")]
            FtpError::Secure(desc) => write!(f, "FTP TLS error: {}", desc),
            FtpError::Timeout => write!(f, "FTP operation timed out"),
            FtpError::EndOfStream => write!(f, "FTP peer closed the connection"),
            FtpError::MalformedReply(raw) => write!(f, "FTP malformed reply: {:?}", raw),
            FtpError::UnexpectedReply { codes, text } => {
                write!(f, "FTP unexpected reply {:?}: {}", codes, text.trim_end())
            }
        }
    }
}

impl std::error::Error for FtpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FtpError::Transport(ioerr) => Some(ioerr),
            _ => None,
        }
    }
}

/// Text format control for the ASCII and EBCDIC `TYPE` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatControl {
    /// Default text format control (is NonPrint)
    Default,
    /// Non-print (not destined for printing)
    NonPrint,
    /// Telnet format control (\<CR\>, \<FF\>, etc.)
    Telnet,
    /// ASA (Fortran) carriage control
    Asa,
}

impl FormatControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatControl::Default | FormatControl::NonPrint => "N",
            FormatControl::Telnet => "T",
            FormatControl::Asa => "C",
        }
    }
}

/// Representation type used in the `TYPE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// ASCII text (the argument is the text format control)
    Ascii(FormatControl),
    /// EBCDIC text (the argument is the text format control)
    Ebcdic(FormatControl),
    /// Image (raw octets)
    Image,
    /// Binary, a synonym of Image
    Binary,
    /// Local format (the argument is the local logical byte size)
    Local(u8),
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileType::Ascii(fc) => write!(f, "A {}", fc.as_str()),
            FileType::Ebcdic(fc) => write!(f, "E {}", fc.as_str()),
            FileType::Image | FileType::Binary => write!(f, "I"),
            FileType::Local(bits) => write!(f, "L {}", bits),
        }
    }
}

/// File structure used in the `STRU` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStructure {
    File,
    Record,
    Page,
}

impl FileStructure {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStructure::File => "F",
            FileStructure::Record => "R",
            FileStructure::Page => "P",
        }
    }
}

/// Transmission mode used in the `MODE` command. Only stream mode is
/// driven by this client; the others are advertised tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionMode {
    Stream,
    Block,
    Compressed,
}

impl TransmissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionMode::Stream => "S",
            TransmissionMode::Block => "B",
            TransmissionMode::Compressed => "C",
        }
    }
}

/// Data-channel protection level for the `PROT` command (RFC 2228).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionLevel {
    Clear,
    Safe,
    Confidential,
    Private,
}

impl ProtectionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionLevel::Clear => "C",
            ProtectionLevel::Safe => "S",
            ProtectionLevel::Confidential => "E",
            ProtectionLevel::Private => "P",
        }
    }
}

/// Everything a session needs to know before `connect`.
///
/// The `Default` impl carries the conventional values; construct with
/// struct-update syntax:
///
/// ```
/// use rsftp::ConnectionOptions;
///
/// let opts = ConnectionOptions {
///     server_host: "ftp.example.com".to_string(),
///     username: "admin".to_string(),
///     password: "secret".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(opts.server_port, 21);
/// assert!(opts.passive_mode);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Login name; empty means an anonymous/unauthenticated attempt.
    pub username: String,
    pub password: String,
    /// Control-connection endpoint.
    pub server_host: String,
    pub server_port: u16,
    /// Announced endpoint for active-mode data connections. Ignored in
    /// passive mode.
    pub data_host: String,
    pub data_port: u16,
    /// `true` selects PASV/EPSV, `false` selects PORT/EPRT.
    pub passive_mode: bool,
    /// Issue AUTH TLS / PBSZ 0 / PROT P right after the greeting and wrap
    /// every data connection in TLS.
    #[cfg(feature = "secure")]
    pub use_tls: bool,
    /// Bound on every blocking control- and data-channel operation.
    pub timeout: Duration,
    /// Advertised representation type, sent by [`transfer_type`].
    ///
    /// [`transfer_type`]: crate::FtpClient::transfer_type
    pub transfer_type: FileType,
    pub structure: FileStructure,
    /// Transfers refuse to start under a non-stream mode.
    pub mode: TransmissionMode,
    /// Log the control-channel dialogue at debug level.
    pub debug: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            username: String::new(),
            password: String::new(),
            server_host: String::new(),
            server_port: 21,
            data_host: String::new(),
            data_port: 0,
            passive_mode: true,
            #[cfg(feature = "secure")]
            use_tls: false,
            timeout: Duration::from_secs(60),
            transfer_type: FileType::Ascii(FormatControl::Default),
            structure: FileStructure::File,
            mode: TransmissionMode::Stream,
            debug: false,
        }
    }
}
