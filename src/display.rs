use crate::mail_object::MailObject;
use log::{info, error};

pub fn display_messages(messages: &[MailObject]) {
    messages
        .iter()
        .for_each(|message| {
            match serde_json::to_string_pretty(message) {
                Ok(json) => info!("{}", json),
                Err(e) => error!("Error converting to JSON: {}", e),
            }
            info!("---");
        });
    info!("{} message(s)", messages.len());
}
