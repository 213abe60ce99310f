//! Protocol-neutral view of an opened mailbox.
//!
//! A `MailSession` is one authenticated store connection with at most one open
//! folder (the inbox). Everything above this module works on `MessageHandle`s
//! and never on IMAP or POP3 types.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{MailServerConfig, ProtocolOption};
use crate::error::{MailError, Result};

pub mod imap;
pub mod net;
pub mod pop3;

pub const INBOX: &str = "INBOX";

/// Native message identifier, tagged with the addressing model it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Uid {
    /// POP3 UIDL value, only meaningful inside the session that listed it.
    Session(String),
    /// IMAP UID, stable for the life of the mailbox.
    Persistent(u64),
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uid::Session(uid) => f.write_str(uid),
            Uid::Persistent(uid) => write!(f, "{}", uid),
        }
    }
}

/// A message located in the currently open folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    /// Position in the folder, 1-based.
    pub sequence: u32,
    pub uid: Uid,
    /// Server-side arrival time, when the listing carries one.
    pub received: Option<DateTime<Utc>>,
}

impl MessageHandle {
    pub fn new(sequence: u32, uid: Uid) -> Self {
        MessageHandle {
            sequence,
            uid,
            received: None,
        }
    }

    pub fn received_at(mut self, received: Option<DateTime<Utc>>) -> Self {
        self.received = received;
        self
    }
}

/// How much of a message to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Full,
}

/// Raw message as delivered by the store.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub handle: MessageHandle,
    pub raw: Vec<u8>,
    /// Server-side arrival time, when the protocol tracks one.
    pub received: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
}

impl Flag {
    /// IMAP system flag name.
    pub fn imap_name(self) -> &'static str {
        match self {
            Flag::Seen => "\\Seen",
            Flag::Answered => "\\Answered",
            Flag::Flagged => "\\Flagged",
            Flag::Deleted => "\\Deleted",
        }
    }
}

#[async_trait]
pub trait MailSession: Send {
    /// Opens the inbox. `Ok(false)` when it does not exist or refuses to open.
    async fn open_inbox(&mut self, read_only: bool) -> Result<bool>;

    /// Every message of the open folder, in folder order.
    async fn messages(&mut self) -> Result<Vec<MessageHandle>>;

    /// Messages with the given persistent UIDs, in one round trip.
    async fn messages_by_uid(&mut self, uids: &[u64]) -> Result<Vec<MessageHandle>>;

    async fn fetch(&mut self, handle: &MessageHandle, section: Section) -> Result<FetchedMessage>;

    async fn set_flag(&mut self, handle: &MessageHandle, flag: Flag, value: bool) -> Result<()>;

    /// Closes the folder and the store. Pending mutations are committed here.
    async fn close(&mut self) -> Result<()>;
}

/// Opens store sessions for the receive side of a `MailServerConfig`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        config: &MailServerConfig,
        user_name: &str,
        password: &str,
    ) -> Result<Box<dyn MailSession>>;
}

/// Connects over the network using the receive-side session properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnector;

#[async_trait]
impl Connector for NetworkConnector {
    async fn connect(
        &self,
        config: &MailServerConfig,
        user_name: &str,
        password: &str,
    ) -> Result<Box<dyn MailSession>> {
        let properties = config.receive_config_info(user_name);
        if properties.is_empty() {
            return Err(MailError::Configuration(format!(
                "no session mapping for protocol {}",
                config.receive.protocol_option
            )));
        }

        let session: Box<dyn MailSession> = match config.receive.protocol_option {
            ProtocolOption::Imap => {
                Box::new(imap::ImapSession::connect(&properties, user_name, password).await?)
            }
            ProtocolOption::Pop3 => {
                Box::new(pop3::Pop3Session::connect(&properties, user_name, password).await?)
            }
            ref other => {
                return Err(MailError::Configuration(format!(
                    "{} is not a retrieval protocol",
                    other
                )))
            }
        };
        info!("-- {} session opened for {}", config.receive.protocol_option, user_name);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_uid_display_is_the_logical_identifier() {
        assert_eq!(Uid::Session("AAB-12".into()).to_string(), "AAB-12");
        assert_eq!(Uid::Persistent(4_294_967_296).to_string(), "4294967296");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_protocol_before_dialing() {
        let config = MailServerConfig::new(
            ServerConfig::new("smtp.example.com", ProtocolOption::Smtp),
            ServerConfig::new("mail.example.com", ProtocolOption::Unknown("nntp".into())),
        );
        let result = NetworkConnector.connect(&config, "alice", "secret").await;
        assert!(matches!(result, Err(MailError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_submission_protocol_as_store() {
        let config = MailServerConfig::new(
            ServerConfig::new("smtp.example.com", ProtocolOption::Smtp),
            ServerConfig::new("smtp.example.com", ProtocolOption::Smtp),
        );
        let result = NetworkConnector.connect(&config, "alice", "secret").await;
        assert!(matches!(result, Err(MailError::Configuration(_))));
    }
}
