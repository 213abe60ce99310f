//! Maps caller-visible uid strings onto handles of the open folder.
//!
//! POP3 exposes no index, so every resolution lists the whole maildrop and
//! scans it. IMAP resolves the whole request in one UID FETCH.

use log::{debug, warn};

use crate::config::ProtocolOption;
use crate::error::Result;
use crate::store::{MailSession, MessageHandle, Uid};

/// Resolves `uids` in the open folder of `session`.
///
/// Identifiers that match nothing are dropped. POP3 results come back in
/// folder order; IMAP results follow the order of `uids`.
pub async fn resolve_identifiers<S: AsRef<str>>(
    protocol: &ProtocolOption,
    session: &mut dyn MailSession,
    uids: &[S],
) -> Result<Vec<MessageHandle>> {
    if uids.is_empty() {
        return Ok(Vec::new());
    }

    match protocol {
        ProtocolOption::Pop3 => {
            let handles = session.messages().await?;
            Ok(handles
                .into_iter()
                .filter(|handle| match &handle.uid {
                    Uid::Session(uid) => uids.iter().any(|wanted| wanted.as_ref() == uid),
                    Uid::Persistent(_) => false,
                })
                .collect())
        }
        ProtocolOption::Imap => {
            let requested: Vec<u64> = uids
                .iter()
                .filter_map(|uid| match uid.as_ref().trim().parse::<u64>() {
                    Ok(value) if value != 0 => Some(value),
                    _ => {
                        warn!("Ignoring uid {:?}: not an IMAP UID", uid.as_ref());
                        None
                    }
                })
                .collect();
            if requested.is_empty() {
                return Ok(Vec::new());
            }

            let mut found = session.messages_by_uid(&requested).await?;
            let mut ordered = Vec::with_capacity(found.len());
            for uid in requested {
                if let Some(index) = found.iter().position(|h| h.uid == Uid::Persistent(uid)) {
                    ordered.push(found.swap_remove(index));
                }
            }
            Ok(ordered)
        }
        other => {
            debug!("{} has no message identities to resolve", other);
            Ok(Vec::new())
        }
    }
}

/// Single-identifier form of [`resolve_identifiers`].
pub async fn resolve_identifier(
    protocol: &ProtocolOption,
    session: &mut dyn MailSession,
    uid: &str,
) -> Result<Option<MessageHandle>> {
    let mut handles = resolve_identifiers(protocol, session, &[uid]).await?;
    Ok(if handles.is_empty() {
        None
    } else {
        Some(handles.swap_remove(0))
    })
}
