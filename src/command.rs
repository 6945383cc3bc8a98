//! Typed FTP commands and their wire rendering.
//!
//! Every command the client may put on the control channel is a variant
//! here; [`Command::encode`] produces the `MNEMONIC[ SP argument] CRLF`
//! line. Arguments are sent unquoted, as is conventional for FTP, but a
//! CR or LF inside an argument would smuggle a second command onto the
//! channel, so encoding refuses those outright.

use std::net::{IpAddr, Ipv4Addr};

use crate::types::{
    FileStructure, FileType, FtpError, ProtectionLevel, Result, TransmissionMode,
};

/// A control-channel command from RFC 959, RFC 2228 or RFC 2428.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Access control
    User(String),
    Pass(String),
    Acct(String),
    Cwd(String),
    Cdup,
    Smnt(String),
    Quit,
    Rein,
    // Transfer parameters
    Port(Ipv4Addr, u16),
    Pasv,
    Eprt(IpAddr, u16),
    Epsv,
    Type(FileType),
    Stru(FileStructure),
    Mode(TransmissionMode),
    // Service
    Retr(String),
    Stor(String),
    Stou,
    Appe(String),
    Allo(u64, Option<u64>),
    Rest(u64),
    Rnfr(String),
    Rnto(String),
    Abor,
    Dele(String),
    Rmd(String),
    Mkd(String),
    Pwd,
    List(Option<String>),
    Nlst(Option<String>),
    Site(String),
    Syst,
    Stat(Option<String>),
    Help(Option<String>),
    Noop,
    // RFC 2228 security
    Auth,
    Adat(String),
    Pbsz(u32),
    Ccc,
    Prot(ProtectionLevel),
    Mic(String),
    Conf(String),
    Enc(String),
}

impl Command {
    /// The four-letter (or shorter) wire mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Acct(_) => "ACCT",
            Command::Cwd(_) => "CWD",
            Command::Cdup => "CDUP",
            Command::Smnt(_) => "SMNT",
            Command::Quit => "QUIT",
            Command::Rein => "REIN",
            Command::Port(_, _) => "PORT",
            Command::Pasv => "PASV",
            Command::Eprt(_, _) => "EPRT",
            Command::Epsv => "EPSV",
            Command::Type(_) => "TYPE",
            Command::Stru(_) => "STRU",
            Command::Mode(_) => "MODE",
            Command::Retr(_) => "RETR",
            Command::Stor(_) => "STOR",
            Command::Stou => "STOU",
            Command::Appe(_) => "APPE",
            Command::Allo(_, _) => "ALLO",
            Command::Rest(_) => "REST",
            Command::Rnfr(_) => "RNFR",
            Command::Rnto(_) => "RNTO",
            Command::Abor => "ABOR",
            Command::Dele(_) => "DELE",
            Command::Rmd(_) => "RMD",
            Command::Mkd(_) => "MKD",
            Command::Pwd => "PWD",
            Command::List(_) => "LIST",
            Command::Nlst(_) => "NLST",
            Command::Site(_) => "SITE",
            Command::Syst => "SYST",
            Command::Stat(_) => "STAT",
            Command::Help(_) => "HELP",
            Command::Noop => "NOOP",
            Command::Auth => "AUTH",
            Command::Adat(_) => "ADAT",
            Command::Pbsz(_) => "PBSZ",
            Command::Ccc => "CCC",
            Command::Prot(_) => "PROT",
            Command::Mic(_) => "MIC",
            Command::Conf(_) => "CONF",
            Command::Enc(_) => "ENC",
        }
    }

    fn argument(&self) -> Option<String> {
        match self {
            Command::User(name)
            | Command::Pass(name)
            | Command::Acct(name)
            | Command::Cwd(name)
            | Command::Smnt(name)
            | Command::Retr(name)
            | Command::Stor(name)
            | Command::Appe(name)
            | Command::Rnfr(name)
            | Command::Rnto(name)
            | Command::Dele(name)
            | Command::Rmd(name)
            | Command::Mkd(name)
            | Command::Site(name)
            | Command::Adat(name)
            | Command::Mic(name)
            | Command::Conf(name)
            | Command::Enc(name) => Some(name.clone()),
            Command::List(path) | Command::Nlst(path) | Command::Stat(path) | Command::Help(path) => {
                path.clone()
            }
            Command::Port(ip, port) => {
                let [h1, h2, h3, h4] = ip.octets();
                Some(format!("{},{},{},{},{},{}", h1, h2, h3, h4, port >> 8, port & 0xff))
            }
            Command::Eprt(ip, port) => {
                let family = match ip {
                    IpAddr::V4(_) => 1,
                    IpAddr::V6(_) => 2,
                };
                Some(format!("|{}|{}|{}|", family, ip, port))
            }
            Command::Type(t) => Some(t.to_string()),
            Command::Stru(s) => Some(s.as_str().to_string()),
            Command::Mode(m) => Some(m.as_str().to_string()),
            Command::Allo(bytes, None) => Some(bytes.to_string()),
            Command::Allo(bytes, Some(record)) => Some(format!("{} R {}", bytes, record)),
            Command::Rest(marker) => Some(marker.to_string()),
            Command::Pbsz(size) => Some(size.to_string()),
            Command::Prot(level) => Some(level.as_str().to_string()),
            Command::Auth => Some("TLS".to_string()),
            Command::Cdup
            | Command::Quit
            | Command::Rein
            | Command::Pasv
            | Command::Epsv
            | Command::Stou
            | Command::Abor
            | Command::Pwd
            | Command::Syst
            | Command::Noop
            | Command::Ccc => None,
        }
    }

    /// Renders the CRLF-terminated command line. Refuses arguments that
    /// contain CR or LF.
    pub fn encode(&self) -> Result<String> {
        match self.argument() {
            Some(arg) => {
                if arg.contains('\r') || arg.contains('\n') {
                    return Err(FtpError::BadArgument(format!(
                        "{} argument contains a line terminator",
                        self.mnemonic()
                    )));
                }
                Ok(format!("{} {}\r\n", self.mnemonic(), arg))
            }
            None => Ok(format!("{}\r\n", self.mnemonic())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormatControl;
    use std::net::Ipv6Addr;

    #[test]
    fn bare_commands_render_without_argument() {
        assert_eq!(Command::Pasv.encode().unwrap(), "PASV\r\n");
        assert_eq!(Command::Epsv.encode().unwrap(), "EPSV\r\n");
        assert_eq!(Command::Quit.encode().unwrap(), "QUIT\r\n");
        assert_eq!(Command::Noop.encode().unwrap(), "NOOP\r\n");
    }

    #[test]
    fn argument_commands_render_with_a_single_space() {
        assert_eq!(Command::User("admin".into()).encode().unwrap(), "USER admin\r\n");
        assert_eq!(Command::Pass("secret".into()).encode().unwrap(), "PASS secret\r\n");
        assert_eq!(Command::Cwd("/srv/pub".into()).encode().unwrap(), "CWD /srv/pub\r\n");
        assert_eq!(
            Command::Retr("image.jpeg".into()).encode().unwrap(),
            "RETR image.jpeg\r\n"
        );
    }

    #[test]
    fn port_encodes_the_address_and_split_port() {
        let cmd = Command::Port(Ipv4Addr::new(192, 168, 1, 7), 50000);
        // 50000 = 195 * 256 + 80
        assert_eq!(cmd.encode().unwrap(), "PORT 192,168,1,7,195,80\r\n");
    }

    #[test]
    fn eprt_encodes_family_address_and_port() {
        let v4 = Command::Eprt(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 50000);
        assert_eq!(v4.encode().unwrap(), "EPRT |1|127.0.0.1|50000|\r\n");

        let v6 = Command::Eprt(IpAddr::V6(Ipv6Addr::LOCALHOST), 50000);
        assert_eq!(v6.encode().unwrap(), "EPRT |2|::1|50000|\r\n");
    }

    #[test]
    fn parameter_tokens_render() {
        assert_eq!(Command::Type(FileType::Image).encode().unwrap(), "TYPE I\r\n");
        assert_eq!(
            Command::Type(FileType::Ascii(FormatControl::Default)).encode().unwrap(),
            "TYPE A N\r\n"
        );
        assert_eq!(Command::Stru(FileStructure::File).encode().unwrap(), "STRU F\r\n");
        assert_eq!(Command::Mode(TransmissionMode::Stream).encode().unwrap(), "MODE S\r\n");
        assert_eq!(Command::Prot(ProtectionLevel::Private).encode().unwrap(), "PROT P\r\n");
        assert_eq!(Command::Pbsz(0).encode().unwrap(), "PBSZ 0\r\n");
        assert_eq!(Command::Auth.encode().unwrap(), "AUTH TLS\r\n");
    }

    #[test]
    fn optional_path_commands_render_both_ways() {
        assert_eq!(Command::Nlst(None).encode().unwrap(), "NLST\r\n");
        assert_eq!(
            Command::Nlst(Some("pub".into())).encode().unwrap(),
            "NLST pub\r\n"
        );
        assert_eq!(Command::List(None).encode().unwrap(), "LIST\r\n");
        assert_eq!(Command::Stat(None).encode().unwrap(), "STAT\r\n");
        assert_eq!(Command::Help(Some("RETR".into())).encode().unwrap(), "HELP RETR\r\n");
    }

    #[test]
    fn line_terminators_in_arguments_are_refused() {
        for arg in ["evil\r\nDELE /", "trailing\r", "trailing\n"] {
            let err = Command::Retr(arg.into()).encode().unwrap_err();
            assert!(matches!(err, FtpError::BadArgument(_)), "accepted {:?}", arg);
        }
        // Spaces in pathnames pass through untouched.
        assert_eq!(
            Command::Retr("with space.txt".into()).encode().unwrap(),
            "RETR with space.txt\r\n"
        );
    }
}
