use chrono::{DateTime, Utc};
use log::debug;
use mailparse::{addrparse_header, parse_headers, parse_mail, MailAddr, MailHeaderMap};

use crate::error::Result;
use crate::mail_object::MailObject;
use crate::mail_reader::mime;
use crate::store::FetchedMessage;

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    mailparse::dateparse(value)
        .ok()
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
}

fn address_list(headers: &[mailparse::MailHeader], name: &str) -> Result<Option<Vec<String>>> {
    let Some(header) = headers.get_first_header(name) else {
        return Ok(None);
    };
    let addresses = addrparse_header(header)?
        .iter()
        .flat_map(|address| match address {
            MailAddr::Single(single) => vec![single.addr.clone()],
            MailAddr::Group(group) => {
                group.addrs.iter().map(|single| single.addr.clone()).collect()
            }
        })
        .collect();
    Ok(Some(addresses))
}

/// When the message reached the mailbox: the store's arrival time if it keeps
/// one, the Date header otherwise.
pub fn received_date(message: &FetchedMessage) -> Option<DateTime<Utc>> {
    message.received.or_else(|| {
        let (headers, _) = parse_headers(&message.raw).ok()?;
        headers.get_first_value("Date").as_deref().and_then(parse_date)
    })
}

/// Builds a `MailObject` from a fetched message addressed to `receive_address`.
///
/// Returns `None` when `receive_address` is not among the TO recipients. In
/// detail mode the CC/BCC lists, the body text and the attachments are read
/// too; attachments are written under `save_attach_path`.
pub fn receive_message(
    message: &FetchedMessage,
    receive_address: &str,
    detail: bool,
    save_attach_path: &str,
) -> Result<Option<MailObject>> {
    let parsed_mail = parse_mail(&message.raw)?;
    let headers = &parsed_mail.headers;

    let receive_list = address_list(headers, "To")?.unwrap_or_default();
    if !receive_list
        .iter()
        .any(|address| address.eq_ignore_ascii_case(receive_address))
    {
        debug!(
            "Message {} is not addressed to {}",
            message.handle.uid, receive_address
        );
        return Ok(None);
    }

    let mut mail_object = MailObject {
        uid: Some(message.handle.uid.to_string()),
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        send_date: headers.get_first_value("Date").as_deref().and_then(parse_date),
        send_address: headers.get_first_value("From").map(|from| mime::decode_text(&from)),
        receive_address: receive_list,
        content_type: parsed_mail.ctype.mimetype.clone(),
        charset: parsed_mail.ctype.charset.clone(),
        ..Default::default()
    };

    if detail {
        mail_object.cc_address = address_list(headers, "Cc")?;
        mail_object.bcc_address = address_list(headers, "Bcc")?;

        let mut content = String::new();
        mime::extract_content(&parsed_mail, &mut content)?;
        mail_object.content = Some(content);

        let mut attach_files = Vec::new();
        mime::extract_attachments(&parsed_mail, save_attach_path, &mut attach_files);
        mail_object.attach_files = attach_files;
    }

    Ok(Some(mail_object))
}
