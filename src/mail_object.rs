use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHARSET: &str = "UTF-8";
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// One mail message, either composed for sending or read back from a store.
///
/// `uid` is only set on messages read from a store. Its value is the POP3
/// UIDL for POP3 inboxes and the decimal IMAP UID for IMAP inboxes; the two
/// are not comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailObject {
    pub subject: String,
    pub charset: String,
    pub content_type: String,
    pub content: Option<String>,
    /// `###key###` tokens in `content` are replaced by the value before sending.
    pub content_map: BTreeMap<String, String>,
    pub send_address: Option<String>,
    pub receive_address: Vec<String>,
    pub cc_address: Option<Vec<String>>,
    pub bcc_address: Option<Vec<String>>,
    pub reply_address: Option<Vec<String>>,
    pub send_date: Option<DateTime<Utc>>,
    pub uid: Option<String>,
    /// Files attached by path. On read messages, the paths attachments were saved to.
    pub attach_files: Vec<String>,
    /// Files sent as raw byte parts with a Content-ID equal to the file name.
    pub include_files: Vec<String>,
}

impl Default for MailObject {
    fn default() -> Self {
        MailObject {
            subject: String::new(),
            charset: DEFAULT_CHARSET.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            content: None,
            content_map: BTreeMap::new(),
            send_address: None,
            receive_address: Vec::new(),
            cc_address: None,
            bcc_address: None,
            reply_address: None,
            send_date: None,
            uid: None,
            attach_files: Vec::new(),
            include_files: Vec::new(),
        }
    }
}

impl MailObject {
    /// Content with every `###key###` placeholder substituted.
    pub fn rendered_content(&self) -> Option<String> {
        self.content.as_ref().map(|content| {
            self.content_map
                .iter()
                .fold(content.clone(), |text, (key, value)| {
                    text.replace(&format!("###{}###", key), value)
                })
        })
    }
}
