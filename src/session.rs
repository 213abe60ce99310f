//! Session property mappings for the three supported protocols.
//!
//! The mapping uses the familiar `mail.<protocol>.*` key vocabulary so that a
//! configuration written for other mail stacks reads the same here. Store and
//! transport backends read their endpoint, timeouts and security switches from
//! this mapping rather than from `ServerConfig` directly.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use log::{debug, warn};

use crate::config::{ProtocolOption, ServerConfig};
use crate::error::Result;

pub const STORE_PROTOCOL: &str = "mail.store.protocol";
pub const TRANSPORT_PROTOCOL: &str = "mail.transport.protocol";

/// Value of the `socketFactory.class` keys: the TLS implementation the backends use.
pub const TLS_SOCKET_FACTORY: &str = "native-tls";

static TLS_CONNECTOR: OnceLock<native_tls::TlsConnector> = OnceLock::new();

/// Registers the process-wide TLS connector. Safe to call any number of times.
pub fn register_tls_provider() -> Result<()> {
    tls_connector().map(|_| ())
}

/// Shared TLS connector, built on first use.
pub fn tls_connector() -> Result<native_tls::TlsConnector> {
    if let Some(connector) = TLS_CONNECTOR.get() {
        return Ok(connector.clone());
    }
    let connector = native_tls::TlsConnector::new()?;
    // A concurrent caller may have won the race; either connector is fine.
    let _ = TLS_CONNECTOR.set(connector.clone());
    debug!("TLS provider registered");
    Ok(connector)
}

/// Flat key/value mapping describing how to open one store or transport session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionProperties {
    entries: BTreeMap<String, String>,
}

impl SessionProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// An empty mapping means the protocol selector was not recognised.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    pub fn store_protocol(&self) -> Option<&str> {
        self.get(STORE_PROTOCOL)
    }

    pub fn transport_protocol(&self) -> Option<&str> {
        self.get(TRANSPORT_PROTOCOL)
    }

    pub fn host(&self, protocol: &str) -> Option<&str> {
        self.get(&format!("mail.{protocol}.host"))
    }

    pub fn port(&self, protocol: &str) -> Option<u16> {
        self.get(&format!("mail.{protocol}.port"))
            .and_then(|port| port.parse().ok())
    }

    pub fn connection_timeout(&self, protocol: &str) -> Option<Duration> {
        self.millis(&format!("mail.{protocol}.connectiontimeout"))
    }

    pub fn process_timeout(&self, protocol: &str) -> Option<Duration> {
        self.millis(&format!("mail.{protocol}.timeout"))
    }

    fn millis(&self, key: &str) -> Option<Duration> {
        self.get(key)
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis)
    }
}

/// Builds the session mapping for `server_config`.
///
/// Timeouts are given in seconds and stored in milliseconds; zero leaves them
/// unset. An unrecognised protocol selector yields an empty mapping, which
/// callers must treat as a configuration error.
pub fn build_config(
    server_config: &ServerConfig,
    connection_timeout: u32,
    process_timeout: u32,
    user_name: &str,
) -> SessionProperties {
    let mut properties = SessionProperties::new();

    let protocol = match &server_config.protocol_option {
        ProtocolOption::Unknown(name) => {
            warn!("Cannot build a session for unknown protocol {:?}", name);
            return properties;
        }
        known => known.key().to_string(),
    };

    if server_config.ssl {
        if let Err(e) = register_tls_provider() {
            warn!("TLS provider registration failed: {}", e);
        }
    }

    if !server_config.host_name.trim().is_empty() {
        properties.set(format!("mail.{protocol}.host"), server_config.host_name.as_str());
    }
    let port = server_config.host_port;
    if port != 0 {
        properties.set(format!("mail.{protocol}.port"), port.to_string());
    }
    if connection_timeout > 0 {
        properties.set(
            format!("mail.{protocol}.connectiontimeout"),
            (u64::from(connection_timeout) * 1000).to_string(),
        );
    }
    if process_timeout > 0 {
        properties.set(
            format!("mail.{protocol}.timeout"),
            (u64::from(process_timeout) * 1000).to_string(),
        );
    }

    match server_config.protocol_option {
        ProtocolOption::Imap => {
            properties.set(STORE_PROTOCOL, "imap");
            if server_config.auth_login {
                properties.set("mail.imap.auth.plain.disable", "true");
                properties.set("mail.imap.auth.login.disable", "true");
            }
            if server_config.ssl {
                properties.set(STORE_PROTOCOL, "imaps");
                properties.set("mail.imap.socketFactory.class", TLS_SOCKET_FACTORY);
                if port != 0 {
                    properties.set("mail.imap.socketFactory.port", port.to_string());
                }
                properties.set("mail.imap.starttls.enable", "true");
            }
        }
        ProtocolOption::Smtp => {
            properties.set(STORE_PROTOCOL, "smtp");
            properties.set(TRANSPORT_PROTOCOL, "smtp");
            if server_config.auth_login {
                properties.set("mail.smtp.auth", "true");
                if !user_name.trim().is_empty() {
                    properties.set("mail.smtp.from", user_name);
                }
            }
            if server_config.ssl {
                properties.set(STORE_PROTOCOL, "smtps");
                properties.set(TRANSPORT_PROTOCOL, "smtps");
                properties.set("mail.smtp.ssl.enable", "true");
                properties.set("mail.smtp.socketFactory.class", TLS_SOCKET_FACTORY);
                properties.set("mail.smtp.socketFactory.fallback", "false");
                if port != 0 {
                    properties.set("mail.smtp.socketFactory.port", port.to_string());
                }
                properties.set("mail.smtp.starttls.enable", "true");
            }
        }
        ProtocolOption::Pop3 => {
            properties.set(STORE_PROTOCOL, "pop3");
            properties.set(TRANSPORT_PROTOCOL, "pop3");
            if server_config.ssl {
                properties.set(STORE_PROTOCOL, "pop3s");
                properties.set(TRANSPORT_PROTOCOL, "pop3s");
                properties.set("mail.pop3.socketFactory.class", TLS_SOCKET_FACTORY);
                if port != 0 {
                    properties.set("mail.pop3.socketFactory.port", port.to_string());
                }
                properties.set("mail.pop3.disabletop", "true");
                properties.set("mail.pop3.ssl.enable", "true");
                properties.set("mail.pop3.useStartTLS", "true");
            }
        }
        ProtocolOption::Unknown(_) => {}
    }

    properties
}
