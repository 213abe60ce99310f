//! Send, read and flag mail over SMTP, IMAP and POP3 through one API.
//!
//! [`MailClient`] is the entry point: every call opens its own session,
//! works on the inbox and closes the session before returning. Message
//! identifiers are plain strings whose meaning depends on the retrieval
//! protocol (see [`MailObject::uid`]).

pub mod client;
pub mod composer;
pub mod config;
pub mod credentials;
pub mod display;
pub mod error;
pub mod files;
pub mod identity;
pub mod logging;
pub mod mail_object;
pub mod mail_reader;
pub mod session;
pub mod settings;
pub mod status;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use client::MailClient;
pub use config::{MailServerConfig, ProtocolOption, ServerConfig};
pub use error::{MailError, Result};
pub use mail_object::MailObject;
pub use session::{build_config, SessionProperties};
pub use store::{Flag, Uid};
