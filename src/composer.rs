//! Builds outgoing messages and hands them to the submission server.

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use itertools::Itertools;
use lettre::address::Envelope;
use lettre::message::header::{ContentDisposition, ContentId, ContentType};
use lettre::message::{Attachment, Body, Mailbox, Mailboxes, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{debug, info, warn};

use crate::config::MailServerConfig;
use crate::error::{MailError, Result};
use crate::files;
use crate::mail_object::MailObject;
use crate::session::SessionProperties;

const OCTET_STREAM: &str = "application/octet-stream";
const DEFAULT_PORT: u16 = 25;
const DEFAULT_TLS_PORT: u16 = 465;

/// Delivers one fully built message.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(
        &self,
        config: &MailServerConfig,
        user_name: &str,
        password: &str,
        message: Message,
    ) -> Result<()>;
}

/// Submits over SMTP using the send-side session properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpSubmitter;

#[async_trait]
impl Submitter for SmtpSubmitter {
    async fn submit(
        &self,
        config: &MailServerConfig,
        user_name: &str,
        password: &str,
        message: Message,
    ) -> Result<()> {
        let properties = config.send_config_info(user_name);
        let tls = match properties.transport_protocol() {
            Some("smtp") => false,
            Some("smtps") => true,
            other => {
                return Err(MailError::Configuration(format!(
                    "cannot submit over {:?}",
                    other.unwrap_or(config.send.protocol_option.key())
                )))
            }
        };
        let host = properties
            .host("smtp")
            .ok_or_else(|| MailError::Configuration("missing mail.smtp.host".to_string()))?;
        let port = properties
            .port("smtp")
            .unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port);
        if tls {
            builder = builder.tls(Tls::Wrapper(TlsParameters::new(host.to_string())?));
        }
        if properties.flag("mail.smtp.auth") {
            builder = builder.credentials(Credentials::new(
                user_name.to_string(),
                password.to_string(),
            ));
        }
        if let Some(timeout) = properties
            .process_timeout("smtp")
            .or_else(|| properties.connection_timeout("smtp"))
        {
            builder = builder.timeout(Some(timeout));
        }
        let mailer = builder.build();

        let envelope = smtp_envelope(&properties, &message)?;
        mailer.send_raw(&envelope, &message.formatted()).await?;
        info!("-- message submitted to {}:{}", host, port);
        Ok(())
    }
}

/// SMTP envelope for `message`. `mail.smtp.from` overrides the sender;
/// recipients always come from To, Cc and Bcc.
fn smtp_envelope(properties: &SessionProperties, message: &Message) -> Result<Envelope> {
    match properties.get("mail.smtp.from") {
        Some(from) => Ok(Envelope::new(
            Some(from.parse::<Address>()?),
            message.envelope().to().to_vec(),
        )?),
        None => Ok(message.envelope().clone()),
    }
}

fn content_type(value: &str) -> Result<ContentType> {
    ContentType::parse(value).map_err(|e| MailError::ContentType(format!("{}: {}", value, e)))
}

fn mailboxes(addresses: &[String]) -> Result<Mailboxes> {
    Ok(addresses.iter().join(",").parse::<Mailboxes>()?)
}

fn attach_file(path: &str) -> Result<SinglePart> {
    let content = files::read_file(path)?;
    let name = files::file_name(path).unwrap_or_else(|| path.to_string());
    let media_type = mime_guess::from_path(&name).first_or_octet_stream();
    Ok(Attachment::new(name).body(content, content_type(media_type.essence_str())?))
}

fn include_file(path: &str) -> Result<SinglePart> {
    let content = files::read_file(path)?;
    let name = files::file_name(path).unwrap_or_else(|| path.to_string());
    Ok(SinglePart::builder()
        .header(content_type(OCTET_STREAM)?)
        .header(ContentDisposition::inline_with_name(&name))
        .header(ContentId::from(format!("<{}>", name)))
        .body(content))
}

/// Encodes body text in `charset` so the bytes match the declared Content-Type.
fn body_text(content: String, charset: &str) -> Result<Body> {
    let encoding = Encoding::for_label_no_replacement(charset.trim().as_bytes())
        .ok_or_else(|| MailError::ContentType(format!("unknown charset {}", charset)))?;
    if encoding == UTF_8 {
        return Ok(Body::new(content));
    }
    let (bytes, used, unmappable) = encoding.encode(&content);
    if unmappable || used != encoding {
        return Err(MailError::ContentType(format!(
            "body text cannot be encoded as {}",
            charset
        )));
    }
    Ok(Body::new(bytes.into_owned()))
}

/// Builds the wire message for `mail_object`.
///
/// Parts are added in a fixed order: attach files, include files, then the
/// body text. Fails with `NoRecipients` when there is no TO address and with
/// `ResourceMissing` when a listed file cannot be read.
pub fn compose(mail_object: &MailObject, user_name: &str) -> Result<Message> {
    if mail_object.receive_address.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let mut multipart = MultiPart::mixed().build();
    for path in &mail_object.attach_files {
        multipart = multipart.singlepart(attach_file(path)?);
    }
    for path in &mail_object.include_files {
        multipart = multipart.singlepart(include_file(path)?);
    }
    if let Some(content) = mail_object.rendered_content() {
        let body_type = content_type(&format!(
            "{}; charset={}",
            mail_object.content_type, mail_object.charset
        ))?;
        let body = body_text(content, &mail_object.charset)?;
        multipart = multipart.singlepart(SinglePart::builder().header(body_type).body(body));
    }

    let sender = mail_object.send_address.as_deref().unwrap_or(user_name);
    let mut builder = Message::builder()
        .from(sender.parse::<Mailbox>()?)
        .subject(mail_object.subject.as_str());

    for to in mailboxes(&mail_object.receive_address)? {
        builder = builder.to(to);
    }
    if let Some(cc) = mail_object.cc_address.as_ref().filter(|cc| !cc.is_empty()) {
        for cc in mailboxes(cc)? {
            builder = builder.cc(cc);
        }
    }
    if let Some(bcc) = mail_object.bcc_address.as_ref().filter(|bcc| !bcc.is_empty()) {
        for bcc in mailboxes(bcc)? {
            builder = builder.bcc(bcc);
        }
    }
    match mail_object.reply_address.as_ref().filter(|reply| !reply.is_empty()) {
        Some(reply) => {
            for reply_to in mailboxes(reply)? {
                builder = builder.reply_to(reply_to);
            }
        }
        None => builder = builder.reply_to(sender.parse::<Mailbox>()?),
    }
    builder = match mail_object.send_date {
        Some(send_date) => builder.date(send_date.into()),
        None => builder.date_now(),
    };

    Ok(builder.multipart(multipart)?)
}

/// Composes `mail_object` and makes exactly one submission attempt.
///
/// `Ok(false)` means an attach or include file was missing and nothing was
/// sent. Transport rejections are returned as errors.
pub async fn send(
    submitter: &dyn Submitter,
    config: &MailServerConfig,
    mail_object: &MailObject,
    user_name: &str,
    password: &str,
) -> Result<bool> {
    let message = match compose(mail_object, user_name) {
        Ok(message) => message,
        Err(MailError::ResourceMissing(path)) => {
            warn!("Not sending {:?}: {} is missing", mail_object.subject, path.display());
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    debug!(
        "Submitting {:?} to {}",
        mail_object.subject,
        mail_object.receive_address.join(",")
    );
    submitter.submit(config, user_name, password, message).await?;
    Ok(true)
}
