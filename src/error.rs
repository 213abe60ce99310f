//! Error types for the mail engine

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MailError>;

#[derive(Error, Debug)]
pub enum MailError {
    /// The protocol selector cannot be turned into a session mapping.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An attachment or include file named by the message is not readable.
    #[error("Resource missing: {}", .0.display())]
    ResourceMissing(PathBuf),

    #[error("Unreadable message: {0}")]
    PartialRead(String),

    #[error("Message has no TO recipients")]
    NoRecipients,

    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Invalid content type: {0}")]
    ContentType(String),

    #[error("Message build error: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("Submission rejected: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    #[error("POP3 error: {0}")]
    Pop3(String),

    #[error("MIME parse error: {0}")]
    Parse(#[from] mailparse::MailParseError),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl MailError {
    /// Failures that belong to the network or the peer rather than to one message.
    ///
    /// A server refusing a single command (POP3 `-ERR`, IMAP `NO`/`BAD`) is not
    /// connection-level.
    pub fn is_connection_level(&self) -> bool {
        match self {
            MailError::Connection(_)
            | MailError::Authentication(_)
            | MailError::Tls(_)
            | MailError::Io(_)
            | MailError::Timeout(_) => true,
            MailError::Imap(e) => matches!(
                e,
                async_imap::error::Error::Io(_) | async_imap::error::Error::ConnectionLost
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_imap::error::Error as ImapError;

    #[test]
    fn test_command_refusals_are_not_connection_level() {
        assert!(!MailError::Imap(ImapError::No("expunged".into())).is_connection_level());
        assert!(!MailError::Imap(ImapError::Bad("Invalid uidset".into())).is_connection_level());
        assert!(!MailError::Pop3("no such message".into()).is_connection_level());
        assert!(!MailError::PartialRead("garbled".into()).is_connection_level());
    }

    #[test]
    fn test_transport_failures_are_connection_level() {
        assert!(MailError::Imap(ImapError::ConnectionLost).is_connection_level());
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(MailError::Io(reset).is_connection_level());
        assert!(MailError::Timeout("RETR".into()).is_connection_level());
        assert!(MailError::Authentication("rejected".into()).is_connection_level());
    }
}
