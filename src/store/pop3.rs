//! Minimal POP3 client: enough of RFC 1939 to list, retrieve and delete.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{MailError, Result};
use crate::session::SessionProperties;
use crate::store::net::{self, within, BoxedStream};
use crate::store::{FetchedMessage, Flag, MailSession, MessageHandle, Section, Uid};

const DEFAULT_PORT: u16 = 110;
const DEFAULT_TLS_PORT: u16 = 995;

pub struct Pop3Session {
    stream: Option<BufReader<BoxedStream>>,
    command_timeout: Option<Duration>,
    read_only: bool,
    top_disabled: bool,
}

fn strip_line_ending(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
        line.pop();
    }
}

fn parse_uidl_line(line: &str) -> Option<MessageHandle> {
    let mut fields = line.split_whitespace();
    let sequence = fields.next()?.parse().ok()?;
    let uid = fields.next()?;
    Some(MessageHandle::new(sequence, Uid::Session(uid.to_string())))
}

impl Pop3Session {
    pub async fn connect(
        properties: &SessionProperties,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let host = properties
            .host("pop3")
            .ok_or_else(|| MailError::Configuration("missing mail.pop3.host".to_string()))?;
        let tls = properties.store_protocol() == Some("pop3s");
        let port = properties
            .port("pop3")
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        let stream =
            net::connect_to_server(host, port, tls, properties.connection_timeout("pop3")).await?;
        let mut session = Pop3Session::from_stream(stream, properties.process_timeout("pop3"));
        session.top_disabled = properties.flag("mail.pop3.disabletop");
        session.handshake(username, password).await?;
        Ok(session)
    }

    /// Wraps an already connected stream. The greeting has not been read yet.
    pub fn from_stream(stream: BoxedStream, command_timeout: Option<Duration>) -> Self {
        Pop3Session {
            stream: Some(BufReader::new(stream)),
            command_timeout,
            read_only: true,
            top_disabled: false,
        }
    }

    /// Reads the greeting and authenticates with USER/PASS.
    pub async fn handshake(&mut self, username: &str, password: &str) -> Result<()> {
        let greeting = within(self.command_timeout, "POP3 greeting", self.status_line()).await?;
        debug!("POP3 greeting: {}", greeting);

        self.command(&format!("USER {}", username))
            .await
            .map_err(|e| MailError::Authentication(e.to_string()))?;
        self.command(&format!("PASS {}", password))
            .await
            .map_err(|e| MailError::Authentication(e.to_string()))?;

        info!("-- logged in as {}", username);
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut BufReader<BoxedStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| MailError::Connection("POP3 session already closed".to_string()))
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream()?;
        let mut line = Vec::new();
        if stream.read_until(b'\n', &mut line).await? == 0 {
            return Err(MailError::Connection("POP3 server closed the connection".to_string()));
        }
        strip_line_ending(&mut line);
        Ok(line)
    }

    async fn status_line(&mut self) -> Result<String> {
        let line = String::from_utf8_lossy(&self.read_line().await?).into_owned();
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim().to_string())
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Err(MailError::Pop3(rest.trim().to_string()))
        } else {
            Err(MailError::Pop3(format!("unexpected reply: {}", line)))
        }
    }

    async fn send_command(&mut self, command: &str) -> Result<String> {
        let stream = self.stream()?;
        stream.write_all(command.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await?;
        self.status_line().await
    }

    async fn command(&mut self, command: &str) -> Result<String> {
        let verb = command.split(' ').next().unwrap_or_default().to_string();
        within(self.command_timeout, &verb, self.send_command(command)).await
    }

    async fn read_multiline(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == b"." {
                return Ok(lines);
            }
            // Byte-stuffed lines start with an extra dot.
            if line.starts_with(b"..") {
                lines.push(line[1..].to_vec());
            } else {
                lines.push(line);
            }
        }
    }

    async fn multiline_command(&mut self, command: &str) -> Result<Vec<Vec<u8>>> {
        let verb = command.split(' ').next().unwrap_or_default().to_string();
        within(self.command_timeout, &verb, async {
            self.send_command(command).await?;
            self.read_multiline().await
        })
        .await
    }
}

#[async_trait]
impl MailSession for Pop3Session {
    // A POP3 maildrop is a single inbox that is open as soon as we are logged in.
    async fn open_inbox(&mut self, read_only: bool) -> Result<bool> {
        self.stream()?;
        self.read_only = read_only;
        Ok(true)
    }

    async fn messages(&mut self) -> Result<Vec<MessageHandle>> {
        let lines = self.multiline_command("UIDL").await?;
        Ok(lines
            .iter()
            .filter_map(|line| parse_uidl_line(&String::from_utf8_lossy(line)))
            .collect())
    }

    async fn messages_by_uid(&mut self, _uids: &[u64]) -> Result<Vec<MessageHandle>> {
        Err(MailError::Unsupported(
            "POP3 has no persistent UID index".to_string(),
        ))
    }

    async fn fetch(&mut self, handle: &MessageHandle, section: Section) -> Result<FetchedMessage> {
        let command = match section {
            Section::Header if !self.top_disabled => format!("TOP {} 0", handle.sequence),
            _ => format!("RETR {}", handle.sequence),
        };
        let lines = self.multiline_command(&command).await.map_err(|e| match e {
            MailError::Pop3(reason) => {
                MailError::PartialRead(format!("{} ({}): {}", command, handle.uid, reason))
            }
            e => e,
        })?;
        let mut raw = Vec::new();
        for line in lines {
            raw.extend_from_slice(&line);
            raw.extend_from_slice(b"\r\n");
        }
        Ok(FetchedMessage {
            handle: handle.clone(),
            raw,
            received: None,
        })
    }

    async fn set_flag(&mut self, handle: &MessageHandle, flag: Flag, value: bool) -> Result<()> {
        match (flag, value) {
            (Flag::Deleted, true) => {
                if self.read_only {
                    return Err(MailError::Unsupported(
                        "cannot delete from a read-only POP3 session".to_string(),
                    ));
                }
                self.command(&format!("DELE {}", handle.sequence)).await?;
                Ok(())
            }
            // Nothing is marked for deletion yet in a fresh session, and POP3
            // keeps no other flags on the server.
            (flag, value) => {
                debug!(
                    "POP3 keeps {:?}={} for message {} local to the session",
                    flag, value, handle.uid
                );
                Ok(())
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        // QUIT commits every DELE issued in this session.
        let quit = self.command("QUIT").await.map(|_| ());
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.get_mut().shutdown().await;
        }
        debug!("-- POP3 session closed");
        quit
    }
}
