//! rsftp is a synchronous FTP client library.
//!
//! It implements the client side of RFC 959 together with the
//! passive-mode additions of RFC 2428 (EPSV/EPRT) and, behind the
//! `secure` feature, the TLS security extensions of RFC 2228
//! (AUTH TLS / PBSZ / PROT).
//!
//! ### Usage
//!
//! ```no_run
//! use rsftp::{ConnectionOptions, FtpClient};
//!
//! let mut client = FtpClient::new(ConnectionOptions {
//!     server_host: "127.0.0.1".to_string(),
//!     username: "anonymous".to_string(),
//!     password: "rsftp@example.com".to_string(),
//!     ..Default::default()
//! });
//! client.connect().unwrap_or_else(|err| panic!("{}", err));
//! client.login().unwrap_or_else(|err| panic!("{}", err));
//! let bytes = client.download("hello.txt").unwrap_or_else(|err| panic!("{}", err));
//! println!("{} bytes", bytes.len());
//! let _ = client.close();
//! ```

pub mod command;
pub mod reply;
pub mod status;
pub mod types;

mod control;
mod data;
mod ftp;
mod stream;

pub use crate::ftp::FtpClient;
pub use crate::types::{
    ConnectionOptions, FileStructure, FileType, FormatControl, FtpError, ProtectionLevel, Result,
    TransmissionMode,
};
