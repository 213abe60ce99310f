use std::time::Duration;

use async_imap::types::Fetch;
use async_imap::{Client, Session};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use itertools::Itertools;
use log::{debug, info, warn};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::error::{MailError, Result};
use crate::session::SessionProperties;
use crate::store::net::{self, within, BoxedStream};
use crate::store::{FetchedMessage, Flag, MailSession, MessageHandle, Section, Uid, INBOX};

type ImapConnection = Session<Compat<BoxedStream>>;

const DEFAULT_PORT: u16 = 143;
const DEFAULT_TLS_PORT: u16 = 993;

pub struct ImapSession {
    session: Option<ImapConnection>,
    command_timeout: Option<Duration>,
    selected: bool,
    exists: u32,
}

// Login to the IMAP server and return an authenticated session
async fn login_to_server(
    client: Client<Compat<BoxedStream>>,
    username: &str,
    password: &str,
) -> Result<ImapConnection> {
    let imap_session = client
        .login(username, password)
        .await
        .map_err(|(e, _)| MailError::Authentication(e.to_string()))?;

    info!("-- logged in as {}", username);
    Ok(imap_session)
}

fn persistent_uid(handle: &MessageHandle) -> Result<u64> {
    match handle.uid {
        Uid::Persistent(uid) => Ok(uid),
        Uid::Session(ref uid) => Err(MailError::Unsupported(format!(
            "session UID {} on an IMAP folder",
            uid
        ))),
    }
}

/// UIDs are non-zero 32-bit numbers on the wire.
fn is_valid_uid(uid: u64) -> bool {
    uid != 0 && uid <= u64::from(u32::MAX)
}

fn to_handle(fetch: &Fetch) -> Option<MessageHandle> {
    fetch.uid.map(|uid| {
        MessageHandle::new(fetch.message, Uid::Persistent(u64::from(uid)))
            .received_at(fetch.internal_date().map(|date| date.with_timezone(&Utc)))
    })
}

// A NO or BAD answer concerns the one message, not the connection.
fn refused_message(uid: u64, e: MailError) -> MailError {
    match e {
        MailError::Imap(async_imap::error::Error::No(reason))
        | MailError::Imap(async_imap::error::Error::Bad(reason)) => {
            MailError::PartialRead(format!("UID {}: {}", uid, reason))
        }
        e => e,
    }
}

impl ImapSession {
    pub async fn connect(
        properties: &SessionProperties,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let host = properties
            .host("imap")
            .ok_or_else(|| MailError::Configuration("missing mail.imap.host".to_string()))?;
        if properties.flag("mail.imap.auth.login.disable") {
            // Only the AUTHENTICATE mechanisms are off; the LOGIN command stays
            // available unless the server advertises LOGINDISABLED.
            debug!("SASL PLAIN and LOGIN disabled, using the LOGIN command");
        }
        let tls = properties.store_protocol() == Some("imaps");
        let port = properties
            .port("imap")
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        let stream =
            net::connect_to_server(host, port, tls, properties.connection_timeout("imap")).await?;
        Self::login(stream, username, password, properties.process_timeout("imap")).await
    }

    /// Authenticates over an already connected stream.
    pub async fn login(
        stream: BoxedStream,
        username: &str,
        password: &str,
        command_timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::new(stream.compat());
        let session = within(
            command_timeout,
            "IMAP login",
            login_to_server(client, username, password),
        )
        .await?;

        Ok(ImapSession {
            session: Some(session),
            command_timeout,
            selected: false,
            exists: 0,
        })
    }

    fn connection(&mut self) -> Result<&mut ImapConnection> {
        self.session
            .as_mut()
            .ok_or_else(|| MailError::Connection("IMAP session already closed".to_string()))
    }

    async fn uid_fetch(&mut self, uid_set: &str, query: &str) -> Result<Vec<Fetch>> {
        let timeout = self.command_timeout;
        let session = self.connection()?;
        within(timeout, "UID FETCH", async {
            let messages_stream = session.uid_fetch(uid_set, query).await?;
            let messages: Vec<Fetch> = messages_stream.try_collect().await?;
            Ok::<_, MailError>(messages)
        })
        .await
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn open_inbox(&mut self, read_only: bool) -> Result<bool> {
        let timeout = self.command_timeout;
        let session = self.connection()?;
        let opened = within(timeout, "IMAP select", async {
            let mailbox = if read_only {
                session.examine(INBOX).await
            } else {
                session.select(INBOX).await
            };
            Ok::<_, MailError>(mailbox)
        })
        .await?;

        match opened {
            Ok(mailbox) => {
                info!("-- {} selected ({} messages)", INBOX, mailbox.exists);
                self.exists = mailbox.exists;
                self.selected = true;
                Ok(true)
            }
            Err(async_imap::error::Error::No(reason)) => {
                warn!("{} cannot be opened: {}", INBOX, reason);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn messages(&mut self) -> Result<Vec<MessageHandle>> {
        if self.exists == 0 {
            return Ok(Vec::new());
        }
        let fetches = self.uid_fetch("1:*", "(UID INTERNALDATE)").await?;
        let handles = fetches
            .iter()
            .filter_map(to_handle)
            .sorted_by_key(|handle| handle.sequence)
            .collect();
        Ok(handles)
    }

    async fn messages_by_uid(&mut self, uids: &[u64]) -> Result<Vec<MessageHandle>> {
        let uid_set = uids.iter().filter(|uid| is_valid_uid(**uid)).join(",");
        if uid_set.is_empty() {
            return Ok(Vec::new());
        }
        debug!("UID FETCH {}", uid_set);
        let fetches = self.uid_fetch(&uid_set, "(UID INTERNALDATE)").await?;
        Ok(fetches.iter().filter_map(to_handle).collect())
    }

    async fn fetch(&mut self, handle: &MessageHandle, section: Section) -> Result<FetchedMessage> {
        let uid = persistent_uid(handle)?;
        let query = match section {
            Section::Header => "(UID INTERNALDATE BODY.PEEK[HEADER])",
            Section::Full => "(UID INTERNALDATE BODY.PEEK[])",
        };
        let fetches = self
            .uid_fetch(&uid.to_string(), query)
            .await
            .map_err(|e| refused_message(uid, e))?;
        let (fetch, raw) = fetches
            .iter()
            .find_map(|fetch| {
                let data = match section {
                    Section::Header => fetch.header(),
                    Section::Full => fetch.body(),
                };
                data.map(|data| (fetch, data.to_vec()))
            })
            .ok_or_else(|| MailError::PartialRead(format!("UID {} has no body", uid)))?;

        Ok(FetchedMessage {
            handle: handle.clone(),
            raw,
            received: fetch.internal_date().map(|date| date.with_timezone(&Utc)),
        })
    }

    async fn set_flag(&mut self, handle: &MessageHandle, flag: Flag, value: bool) -> Result<()> {
        let uid = persistent_uid(handle)?;
        let query = format!(
            "{}FLAGS.SILENT ({})",
            if value { "+" } else { "-" },
            flag.imap_name()
        );
        let timeout = self.command_timeout;
        let session = self.connection()?;
        within(timeout, "UID STORE", async {
            let updates = session.uid_store(uid.to_string(), &query).await?;
            let _: Vec<Fetch> = updates.try_collect().await?;
            Ok::<_, MailError>(())
        })
        .await
        .map_err(|e| refused_message(uid, e))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        // CLOSE expunges \Deleted messages of a read-write selection.
        let closed = if self.selected {
            session.close().await.map_err(MailError::from)
        } else {
            Ok(())
        };
        let logged_out = session.logout().await.map_err(MailError::from);
        self.selected = false;
        debug!("-- IMAP session closed");
        closed.and(logged_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProtocolOption, ServerConfig};
    use chrono::TimeZone;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    const MESSAGE: &str = "Subject: hi\r\nTo: alice@example.com\r\n\r\nbody\r\n";
    const HEADER: &str = "Subject: hi\r\nTo: alice@example.com\r\n\r\n";

    /// Greets, then answers every tagged command with `respond(tag, command)`.
    /// Returns the commands received, without their tags.
    async fn scripted_server<S, F>(stream: S, respond: F) -> Vec<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: Fn(&str, &str) -> String,
    {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        write.write_all(b"* OK IMAP4rev1 ready\r\n").await.unwrap();

        let mut commands = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            let (tag, command) = line.split_once(' ').unwrap();
            commands.push(command.to_string());
            write.write_all(respond(tag, command).as_bytes()).await.unwrap();
            if command == "LOGOUT" {
                break;
            }
        }
        commands
    }

    fn mailbox(tag: &str, command: &str) -> String {
        match command {
            c if c.starts_with("LOGIN") => format!("{} OK LOGIN completed\r\n", tag),
            c if c.starts_with("EXAMINE") => {
                format!("* 2 EXISTS\r\n{} OK [READ-ONLY] EXAMINE completed\r\n", tag)
            }
            c if c.starts_with("SELECT") => {
                format!("* 2 EXISTS\r\n{} OK [READ-WRITE] SELECT completed\r\n", tag)
            }
            "UID FETCH 1:* (UID INTERNALDATE)" => format!(
                "* 2 FETCH (UID 20 INTERNALDATE \"02-Jul-2025 09:00:00 +0000\")\r\n\
                 * 1 FETCH (UID 10 INTERNALDATE \"01-Jul-2025 09:00:00 +0000\")\r\n\
                 {} OK FETCH completed\r\n",
                tag
            ),
            "UID FETCH 20 (UID INTERNALDATE)" => format!(
                "* 2 FETCH (UID 20 INTERNALDATE \"02-Jul-2025 09:00:00 +0000\")\r\n\
                 {} OK FETCH completed\r\n",
                tag
            ),
            "UID FETCH 20 (UID INTERNALDATE BODY.PEEK[])" => format!(
                "* 2 FETCH (UID 20 INTERNALDATE \"02-Jul-2025 09:00:00 +0000\" \
                 BODY[] {{{}}}\r\n{})\r\n\
                 {} OK FETCH completed\r\n",
                MESSAGE.len(),
                MESSAGE,
                tag
            ),
            "UID FETCH 20 (UID INTERNALDATE BODY.PEEK[HEADER])" => format!(
                "* 2 FETCH (UID 20 INTERNALDATE \"02-Jul-2025 09:00:00 +0000\" \
                 BODY[HEADER] {{{}}}\r\n{})\r\n\
                 {} OK FETCH completed\r\n",
                HEADER.len(),
                HEADER,
                tag
            ),
            c if c.starts_with("UID FETCH 10 ") => {
                format!("{} NO message is being expunged\r\n", tag)
            }
            c if c.starts_with("UID STORE") => format!("{} OK STORE completed\r\n", tag),
            "CLOSE" => format!("{} OK CLOSE completed\r\n", tag),
            "LOGOUT" => format!("* BYE logging out\r\n{} OK LOGOUT completed\r\n", tag),
            _ => format!("{} BAD unexpected command\r\n", tag),
        }
    }

    #[tokio::test]
    async fn test_read_only_listing_and_fetch() {
        let (client, server) = duplex(16 * 1024);
        let server = tokio::spawn(scripted_server(server, mailbox));

        let mut session = ImapSession::login(Box::new(client), "alice", "secret", None)
            .await
            .unwrap();
        assert!(session.open_inbox(true).await.unwrap());

        let handles = session.messages().await.unwrap();
        assert_eq!(
            handles.iter().map(|h| (h.sequence, h.uid.clone())).collect::<Vec<_>>(),
            vec![(1, Uid::Persistent(10)), (2, Uid::Persistent(20))]
        );
        assert_eq!(
            handles[0].received,
            Some(Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap())
        );

        let full = session.fetch(&handles[1], Section::Full).await.unwrap();
        assert_eq!(full.raw, MESSAGE.as_bytes());
        let header = session.fetch(&handles[1], Section::Header).await.unwrap();
        assert_eq!(header.raw, HEADER.as_bytes());
        assert_eq!(header.received, handles[1].received);

        session.close().await.unwrap();
        let commands = server.await.unwrap();
        assert_eq!(
            commands,
            vec![
                "LOGIN \"alice\" \"secret\"",
                "EXAMINE \"INBOX\"",
                "UID FETCH 1:* (UID INTERNALDATE)",
                "UID FETCH 20 (UID INTERNALDATE BODY.PEEK[])",
                "UID FETCH 20 (UID INTERNALDATE BODY.PEEK[HEADER])",
                "CLOSE",
                "LOGOUT",
            ]
        );
    }

    #[tokio::test]
    async fn test_flag_changes_and_uid_filtering() {
        let (client, server) = duplex(16 * 1024);
        let server = tokio::spawn(scripted_server(server, mailbox));

        let mut session = ImapSession::login(Box::new(client), "alice", "secret", None)
            .await
            .unwrap();
        assert!(session.open_inbox(false).await.unwrap());

        let found = session
            .messages_by_uid(&[0, 20, u64::from(u32::MAX) + 1])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(session.messages_by_uid(&[0]).await.unwrap().is_empty());

        session.set_flag(&found[0], Flag::Seen, true).await.unwrap();
        session.set_flag(&found[0], Flag::Flagged, false).await.unwrap();
        session.close().await.unwrap();

        let commands = server.await.unwrap();
        assert_eq!(
            commands[1..],
            [
                "SELECT \"INBOX\"",
                "UID FETCH 20 (UID INTERNALDATE)",
                "UID STORE 20 +FLAGS.SILENT (\\Seen)",
                "UID STORE 20 -FLAGS.SILENT (\\Flagged)",
                "CLOSE",
                "LOGOUT",
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_message_is_a_partial_read() {
        let (client, server) = duplex(16 * 1024);
        let _server = tokio::spawn(scripted_server(server, mailbox));

        let mut session = ImapSession::login(Box::new(client), "alice", "secret", None)
            .await
            .unwrap();
        session.open_inbox(true).await.unwrap();

        let handle = MessageHandle::new(1, Uid::Persistent(10));
        let result = session.fetch(&handle, Section::Full).await;
        assert!(matches!(result, Err(MailError::PartialRead(_))));
        assert!(!result.unwrap_err().is_connection_level());
    }

    #[tokio::test]
    async fn test_empty_inbox_skips_the_listing() {
        let (client, server) = duplex(16 * 1024);
        let server = tokio::spawn(scripted_server(server, |tag: &str, command: &str| {
            match command {
                c if c.starts_with("EXAMINE") => {
                    format!("* 0 EXISTS\r\n{} OK [READ-ONLY] EXAMINE completed\r\n", tag)
                }
                c => mailbox(tag, c),
            }
        }));

        let mut session = ImapSession::login(Box::new(client), "alice", "secret", None)
            .await
            .unwrap();
        session.open_inbox(true).await.unwrap();
        assert!(session.messages().await.unwrap().is_empty());
        session.close().await.unwrap();

        let commands = server.await.unwrap();
        assert!(!commands.iter().any(|c| c.starts_with("UID FETCH")));
    }

    async fn listen() -> (TcpListener, ServerConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = ServerConfig::new("127.0.0.1", ProtocolOption::Imap)
            .with_port(port)
            .with_auth_login(true);
        (listener, server)
    }

    #[tokio::test]
    async fn test_disabled_sasl_still_logs_in_with_login_command() {
        let (listener, server) = listen().await;
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            scripted_server(stream, mailbox).await
        });

        let properties = crate::session::build_config(&server, 0, 0, "alice");
        assert!(properties.flag("mail.imap.auth.login.disable"));
        let mut session = ImapSession::connect(&properties, "alice", "secret")
            .await
            .unwrap();
        session.close().await.unwrap();

        let commands = server_task.await.unwrap();
        assert_eq!(commands[0], "LOGIN \"alice\" \"secret\"");
    }

    #[tokio::test]
    async fn test_login_refused_by_server_is_an_authentication_error() {
        let (listener, server) = listen().await;
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            scripted_server(stream, |tag: &str, _: &str| {
                format!("{} NO [PRIVACYREQUIRED] LOGIN is disabled\r\n", tag)
            })
            .await
        });

        let properties = crate::session::build_config(&server, 0, 0, "alice");
        let result = ImapSession::connect(&properties, "alice", "secret").await;
        assert!(matches!(result, Err(MailError::Authentication(_))));
    }
}
