use log::{debug, warn};

use crate::config::ProtocolOption;
use crate::error::Result;
use crate::identity;
use crate::store::{Flag, MailSession};

/// Sets `flag` to `value` on every message of `uids` found in the open folder.
///
/// Unknown uids are skipped. Returns how many messages were updated.
pub async fn set_status<S: AsRef<str>>(
    session: &mut dyn MailSession,
    protocol: &ProtocolOption,
    uids: &[S],
    flag: Flag,
    value: bool,
) -> Result<usize> {
    let handles = identity::resolve_identifiers(protocol, session, uids).await?;
    if handles.len() < uids.len() {
        debug!("{} of {} uids resolved", handles.len(), uids.len());
    }

    let mut updated = 0;
    for handle in &handles {
        match session.set_flag(handle, flag, value).await {
            Ok(()) => updated += 1,
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => warn!("Cannot set {:?}={} on {}: {}", flag, value, handle.uid, e),
        }
    }
    Ok(updated)
}
