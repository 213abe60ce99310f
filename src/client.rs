//! One-shot mail operations.
//!
//! Each operation opens its own store session, does its work and closes the
//! session again before returning, whatever the outcome. Nothing is kept
//! between calls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::composer::{self, SmtpSubmitter, Submitter};
use crate::config::{MailServerConfig, ProtocolOption};
use crate::error::Result;
use crate::mail_object::MailObject;
use crate::mail_reader::{self, Selection};
use crate::status;
use crate::store::{Connector, Flag, MailSession, NetworkConnector};

#[derive(Clone)]
pub struct MailClient {
    config: MailServerConfig,
    connector: Arc<dyn Connector>,
    submitter: Arc<dyn Submitter>,
}

impl MailClient {
    pub fn new(config: MailServerConfig) -> Self {
        Self::with_backends(config, Arc::new(NetworkConnector), Arc::new(SmtpSubmitter))
    }

    pub fn with_backends(
        config: MailServerConfig,
        connector: Arc<dyn Connector>,
        submitter: Arc<dyn Submitter>,
    ) -> Self {
        MailClient {
            config,
            connector,
            submitter,
        }
    }

    pub fn config(&self) -> &MailServerConfig {
        &self.config
    }

    fn protocol(&self) -> &ProtocolOption {
        &self.config.receive.protocol_option
    }

    /// Connects and opens the inbox. The flag is false when the inbox is
    /// missing; the session still has to be released.
    async fn acquire(
        &self,
        user_name: &str,
        password: &str,
        read_only: bool,
    ) -> Result<(Box<dyn MailSession>, bool)> {
        let mut session = self.connector.connect(&self.config, user_name, password).await?;
        let opened = match session.open_inbox(read_only).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Opening the inbox failed: {}", e);
                false
            }
        };
        Ok((session, opened))
    }

    async fn release(mut session: Box<dyn MailSession>) {
        if let Err(e) = session.close().await {
            warn!("Closing the mail session failed: {}", e);
        }
    }

    /// Sends `mail_object` through the submission server.
    pub async fn send(
        &self,
        mail_object: &MailObject,
        user_name: &str,
        password: &str,
    ) -> Result<bool> {
        composer::send(
            self.submitter.as_ref(),
            &self.config,
            mail_object,
            user_name,
            password,
        )
        .await
    }

    /// Reads one message addressed to `user_name`, with body and attachments.
    pub async fn read_one(
        &self,
        user_name: &str,
        password: &str,
        uid: &str,
        save_attach_path: &str,
    ) -> Result<Option<MailObject>> {
        let (mut session, opened) = self.acquire(user_name, password, true).await?;
        let result = if opened {
            mail_reader::read_one(
                session.as_mut(),
                self.protocol(),
                uid,
                user_name,
                save_attach_path,
            )
            .await
        } else {
            Ok(None)
        };
        Self::release(session).await;
        result
    }

    /// Reads the listed messages addressed to `user_name`, in detail.
    pub async fn read_many<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
        save_attach_path: &str,
    ) -> Result<Vec<MailObject>> {
        self.read_batch(user_name, password, Selection::Uids(uids), None, save_attach_path)
            .await
    }

    /// Reads every inbox message addressed to `user_name`, in detail.
    pub async fn read_all(
        &self,
        user_name: &str,
        password: &str,
        save_attach_path: &str,
    ) -> Result<Vec<MailObject>> {
        self.read_batch(
            user_name,
            password,
            Selection::<String>::All,
            None,
            save_attach_path,
        )
        .await
    }

    /// Header fields of the messages received strictly after `since`.
    pub async fn read_since(
        &self,
        user_name: &str,
        password: &str,
        since: DateTime<Utc>,
        save_attach_path: &str,
    ) -> Result<Vec<MailObject>> {
        self.read_batch(
            user_name,
            password,
            Selection::<String>::All,
            Some(since),
            save_attach_path,
        )
        .await
    }

    async fn read_batch<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        selection: Selection<'_, S>,
        since: Option<DateTime<Utc>>,
        save_attach_path: &str,
    ) -> Result<Vec<MailObject>> {
        let (mut session, opened) = self.acquire(user_name, password, true).await?;
        let result = if opened {
            mail_reader::read_many(
                session.as_mut(),
                self.protocol(),
                selection,
                user_name,
                since,
                save_attach_path,
            )
            .await
        } else {
            Ok(Vec::new())
        };
        Self::release(session).await;
        result
    }

    /// Sets `flag` to `value` on every listed message in one read-write session.
    pub async fn set_status<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
        flag: Flag,
        value: bool,
    ) -> Result<usize> {
        let (mut session, opened) = self.acquire(user_name, password, false).await?;
        let result = if opened {
            status::set_status(session.as_mut(), self.protocol(), uids, flag, value).await
        } else {
            Ok(0)
        };
        Self::release(session).await;
        debug!("{:?}={} applied to {:?} messages", flag, value, result.as_ref().ok());
        result
    }

    pub async fn remove_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Deleted, true).await
    }

    pub async fn remove_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Deleted, true).await
    }

    pub async fn recover_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Deleted, false).await
    }

    pub async fn recover_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Deleted, false).await
    }

    pub async fn read_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Seen, true).await
    }

    pub async fn read_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Seen, true).await
    }

    pub async fn unread_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Seen, false).await
    }

    pub async fn unread_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Seen, false).await
    }

    pub async fn answer_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Answered, true).await
    }

    pub async fn answer_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Answered, true).await
    }

    pub async fn flag_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Flagged, true).await
    }

    pub async fn flag_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Flagged, true).await
    }

    pub async fn unflag_mail(&self, user_name: &str, password: &str, uid: &str) -> Result<usize> {
        self.set_status(user_name, password, &[uid], Flag::Flagged, false).await
    }

    pub async fn unflag_mails<S: AsRef<str>>(
        &self,
        user_name: &str,
        password: &str,
        uids: &[S],
    ) -> Result<usize> {
        self.set_status(user_name, password, uids, Flag::Flagged, false).await
    }
}
