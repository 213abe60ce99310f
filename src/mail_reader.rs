//! Reads messages out of an opened inbox.
//!
//! Every function here works on a session whose inbox is already open and
//! leaves closing it to the caller.

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::config::ProtocolOption;
use crate::error::{MailError, Result};
use crate::identity;
use crate::mail_object::MailObject;
use crate::store::{MailSession, MessageHandle, Section};

pub mod message;
pub mod mime;

/// Which messages a batch read covers.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a, S: AsRef<str> = String> {
    All,
    Uids(&'a [S]),
}

/// Reads one handle. Malformed messages come back as `Ok(None)`; only
/// connection-level failures are returned as errors.
async fn read_handle(
    session: &mut dyn MailSession,
    handle: &MessageHandle,
    receive_address: &str,
    detail: bool,
    since: Option<DateTime<Utc>>,
    save_attach_path: &str,
) -> Result<Option<MailObject>> {
    // Listings that carry the arrival time let old messages be skipped unread.
    if let (Some(since), Some(received)) = (since, handle.received) {
        if received <= since {
            debug!("Message {} received {}, not after {}", handle.uid, received, since);
            return Ok(None);
        }
    }

    let section = if detail { Section::Full } else { Section::Header };
    let fetched = match session.fetch(handle, section).await {
        Ok(fetched) => fetched,
        Err(e) if e.is_connection_level() => return Err(e),
        Err(e) => {
            warn!("Skipping message {}: {}", handle.uid, e);
            return Ok(None);
        }
    };

    if let Some(since) = since {
        match message::received_date(&fetched) {
            Some(received) if received > since => {}
            received => {
                debug!("Message {} received {:?}, not after {}", handle.uid, received, since);
                return Ok(None);
            }
        }
    }

    match message::receive_message(&fetched, receive_address, detail, save_attach_path) {
        Ok(mail_object) => Ok(mail_object),
        Err(e) => {
            let e = MailError::PartialRead(format!("message {}: {}", handle.uid, e));
            warn!("Skipping {}", e);
            Ok(None)
        }
    }
}

/// Reads the message identified by `uid`, with body and attachments.
pub async fn read_one(
    session: &mut dyn MailSession,
    protocol: &ProtocolOption,
    uid: &str,
    receive_address: &str,
    save_attach_path: &str,
) -> Result<Option<MailObject>> {
    let Some(handle) = identity::resolve_identifier(protocol, session, uid).await? else {
        debug!("No message with uid {}", uid);
        return Ok(None);
    };
    read_handle(session, &handle, receive_address, true, None, save_attach_path).await
}

/// Reads a batch of messages addressed to `receive_address`.
///
/// Without `since` every selected message is read in detail. With `since`
/// only messages received strictly after it are returned, and only their
/// header fields are filled in.
pub async fn read_many<S: AsRef<str>>(
    session: &mut dyn MailSession,
    protocol: &ProtocolOption,
    selection: Selection<'_, S>,
    receive_address: &str,
    since: Option<DateTime<Utc>>,
    save_attach_path: &str,
) -> Result<Vec<MailObject>> {
    let handles = match selection {
        Selection::All => session.messages().await?,
        Selection::Uids(uids) => identity::resolve_identifiers(protocol, session, uids).await?,
    };
    let detail = since.is_none();

    let mut mail_list = Vec::with_capacity(handles.len());
    for handle in &handles {
        if let Some(mail_object) = read_handle(
            session,
            handle,
            receive_address,
            detail,
            since,
            save_attach_path,
        )
        .await?
        {
            mail_list.push(mail_object);
        }
    }
    debug!("{} of {} messages read", mail_list.len(), handles.len());
    Ok(mail_list)
}
