//! Depth-first walks over a parsed MIME tree.

use log::{debug, warn};
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};

use crate::error::Result;
use crate::files::{self, PATH_SEPARATOR};

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";
pub const MULTIPART: &str = "multipart/";
pub const MESSAGE_RFC822: &str = "message/rfc822";

/// Containers nested deeper than this are not descended into.
pub const MAX_NESTING: usize = 32;

/// Decodes RFC 2047 encoded words in free text.
pub fn decode_text(text: &str) -> String {
    let line = format!("X: {}", text);
    match mailparse::parse_header(line.as_bytes()) {
        Ok((header, _)) => header.get_value(),
        Err(_) => text.to_string(),
    }
}

fn is_multipart(part: &ParsedMail) -> bool {
    part.ctype.mimetype.starts_with(MULTIPART)
}

/// Appends the text of every unnamed text/plain and text/html part under
/// `part` to `buffer`, in document order.
pub fn extract_content(part: &ParsedMail, buffer: &mut String) -> Result<()> {
    collect_content(part, buffer, 0)
}

fn collect_content(part: &ParsedMail, buffer: &mut String, depth: usize) -> Result<()> {
    if depth > MAX_NESTING {
        warn!("MIME tree nested deeper than {} levels, ignoring the rest", MAX_NESTING);
        return Ok(());
    }

    let mimetype = part.ctype.mimetype.as_str();
    let named = part.ctype.params.contains_key("name");

    if (mimetype == TEXT_PLAIN || mimetype == TEXT_HTML) && !named {
        buffer.push_str(&part.get_body()?);
    } else if is_multipart(part) {
        for subpart in &part.subparts {
            collect_content(subpart, buffer, depth + 1)?;
        }
    } else if mimetype == MESSAGE_RFC822 {
        let enclosed = part.get_body_raw()?;
        collect_content(&parse_mail(&enclosed)?, buffer, depth + 1)?;
    }
    Ok(())
}

/// File name from Content-Disposition, falling back to the Content-Type `name`.
pub fn attachment_name(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| decode_text(name))
        .filter(|name| !name.trim().is_empty())
}

// An absent Content-Disposition header does not count as inline here.
fn is_saveable(part: &ParsedMail) -> bool {
    if part.headers.get_first_value("Content-Disposition").is_none() {
        return false;
    }
    matches!(
        part.get_content_disposition().disposition,
        DispositionType::Attachment | DispositionType::Inline
    )
}

/// Saves every named attachment or inline part under `part` into
/// `save_attach_path` and records the saved paths.
///
/// Only multipart containers are descended. A part that cannot be decoded or
/// written is skipped.
pub fn extract_attachments(part: &ParsedMail, save_attach_path: &str, saved: &mut Vec<String>) {
    collect_attachments(part, save_attach_path, saved, 0)
}

fn collect_attachments(
    part: &ParsedMail,
    save_attach_path: &str,
    saved: &mut Vec<String>,
    depth: usize,
) {
    if !is_multipart(part) || depth > MAX_NESTING {
        return;
    }

    for child in &part.subparts {
        if is_multipart(child) {
            collect_attachments(child, save_attach_path, saved, depth + 1);
            continue;
        }
        let Some(name) = attachment_name(child) else {
            continue;
        };
        if !is_saveable(child) {
            debug!("Part {} is neither attachment nor inline", name);
            continue;
        }
        // Never let a sender-chosen name escape the attachment directory.
        let Some(name) = files::file_name(&name) else {
            continue;
        };
        let destination = unique_destination(save_attach_path, &name, saved);
        match child.get_body_raw() {
            Ok(content) => {
                if files::save_file(&content, &destination) {
                    saved.push(destination);
                }
            }
            Err(e) => warn!("Cannot decode attachment {}: {}", name, e),
        }
    }
}

/// Save path for `name`, suffixed `-1`, `-2`, ... when an earlier part of the
/// same message already took it.
fn unique_destination(save_attach_path: &str, name: &str, saved: &[String]) -> String {
    let destination = format!("{}{}{}", save_attach_path, PATH_SEPARATOR, name);
    if !saved.contains(&destination) {
        return destination;
    }
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, format!(".{}", extension)),
        _ => (name, String::new()),
    };
    (1..)
        .map(|n| format!("{}{}{}-{}{}", save_attach_path, PATH_SEPARATOR, stem, n, extension))
        .find(|candidate| !saved.contains(candidate))
        .unwrap_or(destination)
}
