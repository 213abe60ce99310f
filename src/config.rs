use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::session::{self, SessionProperties};

/// Wire protocol a server entry speaks.
///
/// Selectors are read case-insensitively. Anything else is kept verbatim in
/// `Unknown` so that session building can report it instead of the config
/// loader rejecting the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProtocolOption {
    Smtp,
    Imap,
    Pop3,
    Unknown(String),
}

impl ProtocolOption {
    /// Lower-case name used in session property keys.
    pub fn key(&self) -> &str {
        match self {
            ProtocolOption::Smtp => "smtp",
            ProtocolOption::Imap => "imap",
            ProtocolOption::Pop3 => "pop3",
            ProtocolOption::Unknown(name) => name,
        }
    }
}

impl FromStr for ProtocolOption {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "SMTP" => ProtocolOption::Smtp,
            "IMAP" => ProtocolOption::Imap,
            "POP3" => ProtocolOption::Pop3,
            _ => ProtocolOption::Unknown(s.to_string()),
        })
    }
}

impl From<String> for ProtocolOption {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(option) => option,
            Err(never) => match never {},
        }
    }
}

impl From<ProtocolOption> for String {
    fn from(value: ProtocolOption) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ProtocolOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolOption::Unknown(name) => f.write_str(name),
            other => f.write_str(&other.key().to_ascii_uppercase()),
        }
    }
}

/// One mail server endpoint. A `host_port` of 0 means the protocol default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host_name: String,
    #[serde(default)]
    pub host_port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub auth_login: bool,
    pub protocol_option: ProtocolOption,
    #[serde(default)]
    pub connection_timeout_seconds: u32,
    #[serde(default)]
    pub process_timeout_seconds: u32,
}

impl ServerConfig {
    pub fn new(host_name: impl Into<String>, protocol_option: ProtocolOption) -> Self {
        ServerConfig {
            host_name: host_name.into(),
            host_port: 0,
            ssl: false,
            auth_login: false,
            protocol_option,
            connection_timeout_seconds: 0,
            process_timeout_seconds: 0,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.host_port = port;
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn with_auth_login(mut self, auth_login: bool) -> Self {
        self.auth_login = auth_login;
        self
    }

    pub fn with_timeouts(mut self, connection_seconds: u32, process_seconds: u32) -> Self {
        self.connection_timeout_seconds = connection_seconds;
        self.process_timeout_seconds = process_seconds;
        self
    }
}

/// The submission server paired with the retrieval server of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailServerConfig {
    pub send: ServerConfig,
    pub receive: ServerConfig,
}

impl MailServerConfig {
    pub fn new(send: ServerConfig, receive: ServerConfig) -> Self {
        MailServerConfig { send, receive }
    }

    pub fn send_config_info(&self, user_name: &str) -> SessionProperties {
        session::build_config(
            &self.send,
            self.send.connection_timeout_seconds,
            self.send.process_timeout_seconds,
            user_name,
        )
    }

    pub fn receive_config_info(&self, user_name: &str) -> SessionProperties {
        session::build_config(
            &self.receive,
            self.receive.connection_timeout_seconds,
            self.receive.process_timeout_seconds,
            user_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_selector_is_case_insensitive() {
        assert_eq!("imap".parse::<ProtocolOption>().unwrap(), ProtocolOption::Imap);
        assert_eq!("Pop3".parse::<ProtocolOption>().unwrap(), ProtocolOption::Pop3);
        assert_eq!(
            "nntp".parse::<ProtocolOption>().unwrap(),
            ProtocolOption::Unknown("nntp".to_string())
        );
    }

    #[test]
    fn test_server_config_from_yaml() {
        let yaml =
            "host_name: imap.example.com\nhost_port: 993\nssl: true\nprotocol_option: imap\n";
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.protocol_option, ProtocolOption::Imap);
        assert_eq!(config.host_port, 993);
        assert!(config.ssl);
        assert!(!config.auth_login);
        assert_eq!(config.connection_timeout_seconds, 0);
    }
}
