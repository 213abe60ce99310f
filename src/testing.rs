//! In-memory store and transport doubles for unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::composer::Submitter;
use crate::config::{MailServerConfig, ProtocolOption};
use crate::error::{MailError, Result};
use crate::store::{Connector, FetchedMessage, Flag, MailSession, MessageHandle, Section, Uid};

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub uid: Uid,
    pub raw: Vec<u8>,
    pub received: Option<DateTime<Utc>>,
    pub flags: HashSet<Flag>,
}

impl FakeMessage {
    pub fn pop3(uid: &str, raw: &str) -> Self {
        FakeMessage {
            uid: Uid::Session(uid.to_string()),
            raw: raw.as_bytes().to_vec(),
            received: None,
            flags: HashSet::new(),
        }
    }

    pub fn imap(uid: u64, raw: &str) -> Self {
        FakeMessage {
            uid: Uid::Persistent(uid),
            ..FakeMessage::pop3("", raw)
        }
    }

    pub fn received_at(mut self, received: DateTime<Utc>) -> Self {
        self.received = Some(received);
        self
    }

    pub fn with_flag(mut self, flag: Flag) -> Self {
        self.flags.insert(flag);
        self
    }
}

/// Protocol calls observed by a `FakeSession`.
#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub opened: Option<bool>,
    pub listings: usize,
    pub bulk_fetches: usize,
    pub fetches: usize,
    pub header_fetches: usize,
    /// UID sets passed to `messages_by_uid`.
    pub uid_sets: Vec<Vec<u64>>,
    pub flag_writes: Vec<(Uid, Flag, bool)>,
    pub closes: usize,
}

#[derive(Debug, Default)]
struct Mailbox {
    messages: Vec<FakeMessage>,
    calls: Calls,
}

#[derive(Clone)]
pub struct FakeSession {
    protocol: ProtocolOption,
    mailbox: Arc<Mutex<Mailbox>>,
    inbox_exists: bool,
    connection_lost: bool,
}

impl FakeSession {
    pub fn new(protocol: ProtocolOption, messages: Vec<FakeMessage>) -> Self {
        FakeSession {
            protocol,
            mailbox: Arc::new(Mutex::new(Mailbox {
                messages,
                calls: Calls::default(),
            })),
            inbox_exists: true,
            connection_lost: false,
        }
    }

    pub fn without_inbox(mut self) -> Self {
        self.inbox_exists = false;
        self
    }

    pub fn fail_fetches_with_connection_loss(&mut self) {
        self.connection_lost = true;
    }

    pub fn calls(&self) -> Calls {
        self.mailbox.lock().unwrap().calls.clone()
    }

    pub fn flags(&self, uid: &Uid) -> HashSet<Flag> {
        let mailbox = self.mailbox.lock().unwrap();
        mailbox
            .messages
            .iter()
            .find(|message| &message.uid == uid)
            .map(|message| message.flags.clone())
            .unwrap_or_default()
    }

    fn handles(mailbox: &Mailbox) -> Vec<MessageHandle> {
        mailbox
            .messages
            .iter()
            .enumerate()
            .map(|(index, message)| {
                MessageHandle::new(index as u32 + 1, message.uid.clone())
                    .received_at(message.received)
            })
            .collect()
    }
}

#[async_trait]
impl MailSession for FakeSession {
    async fn open_inbox(&mut self, read_only: bool) -> Result<bool> {
        self.mailbox.lock().unwrap().calls.opened = Some(read_only);
        Ok(self.inbox_exists)
    }

    async fn messages(&mut self) -> Result<Vec<MessageHandle>> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.listings += 1;
        Ok(Self::handles(&mailbox))
    }

    async fn messages_by_uid(&mut self, uids: &[u64]) -> Result<Vec<MessageHandle>> {
        if self.protocol != ProtocolOption::Imap {
            return Err(MailError::Unsupported("no UID index".to_string()));
        }
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.bulk_fetches += 1;
        mailbox.calls.uid_sets.push(uids.to_vec());
        Ok(Self::handles(&mailbox)
            .into_iter()
            .filter(|handle| matches!(handle.uid, Uid::Persistent(uid) if uids.contains(&uid)))
            .collect())
    }

    async fn fetch(&mut self, handle: &MessageHandle, section: Section) -> Result<FetchedMessage> {
        if self.connection_lost {
            return Err(MailError::Connection("connection reset".to_string()));
        }
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.fetches += 1;
        if section == Section::Header {
            mailbox.calls.header_fetches += 1;
        }
        let message = mailbox
            .messages
            .iter()
            .find(|message| message.uid == handle.uid)
            .ok_or_else(|| MailError::PartialRead(format!("{} vanished", handle.uid)))?;
        let raw = match section {
            Section::Full => message.raw.clone(),
            Section::Header => {
                let end = message
                    .raw
                    .windows(4)
                    .position(|window| window == b"\r\n\r\n")
                    .map_or(message.raw.len(), |at| at + 4);
                message.raw[..end].to_vec()
            }
        };
        Ok(FetchedMessage {
            handle: handle.clone(),
            raw,
            received: message.received,
        })
    }

    async fn set_flag(&mut self, handle: &MessageHandle, flag: Flag, value: bool) -> Result<()> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.flag_writes.push((handle.uid.clone(), flag, value));
        if let Some(message) = mailbox
            .messages
            .iter_mut()
            .find(|message| message.uid == handle.uid)
        {
            if value {
                message.flags.insert(flag);
            } else {
                message.flags.remove(&flag);
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.mailbox.lock().unwrap().calls.closes += 1;
        Ok(())
    }
}

/// Hands out clones of one `FakeSession`, or refuses to connect.
pub struct FakeConnector {
    session: FakeSession,
    refuse: bool,
}

impl FakeConnector {
    pub fn new(session: FakeSession) -> Self {
        FakeConnector {
            session,
            refuse: false,
        }
    }

    pub fn refusing(session: FakeSession) -> Self {
        FakeConnector {
            session,
            refuse: true,
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _config: &MailServerConfig,
        user_name: &str,
        _password: &str,
    ) -> Result<Box<dyn MailSession>> {
        if self.refuse {
            return Err(MailError::Authentication(format!("{} rejected", user_name)));
        }
        Ok(Box::new(self.session.clone()))
    }
}

/// Records every submitted message in wire form.
#[derive(Clone, Default)]
pub struct RecordingSubmitter {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSubmitter {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Submitter for RecordingSubmitter {
    async fn submit(
        &self,
        _config: &MailServerConfig,
        _user_name: &str,
        _password: &str,
        message: lettre::Message,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(message.formatted());
        Ok(())
    }
}
