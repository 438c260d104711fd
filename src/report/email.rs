// SPDX-License-Identifier: MPL-2.0
//! Raw multipart email composition.
//!
//! The document is assembled by a small builder that collects typed parts
//! (the text body, then attachments) and renders them in one pass:
//!
//! ```text
//! From: "JuneBug" <donotreply@junebugreports.com>
//! To: <recipient>
//! Subject: <subject>
//! MIME-Version: 1.0
//! Content-Type: multipart/mixed; boundary="<boundary>"
//!
//! --<boundary>
//! Content-Type: text/plain; charset="UTF-8"
//! Content-Transfer-Encoding: 7bit
//!
//! <message>[<user info block>]
//! [screenshot part][log part][custom fields part]
//! --<boundary>--
//! ```
//!
//! Attachment parts are always emitted in the order screenshot, captured
//! logs, custom fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::ReportPayload;
use crate::config::defaults::{
    BASE64_LINE_LENGTH, BOUNDARY_RANDOM_LEN, FILENAME_SUFFIX_LEN, FROM_EMAIL, FROM_NAME,
    SCREENSHOT_FILENAME,
};
use crate::diagnostics::{format_all, INTERNAL_TARGET};

const USER_INFO_HEADER: &str = "----User Info Block----";
const FILENAME_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The non-deterministic inputs of a composed email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTokens {
    pub boundary: String,
    pub filename_suffix: String,
    pub created_at: DateTime<Local>,
}

impl MimeTokens {
    /// Fresh tokens: `Boundary_<unix millis>_<8 alphanumerics>`, a 4
    /// character base-36 filename suffix and the current local time.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let random: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(BOUNDARY_RANDOM_LEN)
            .map(char::from)
            .collect();
        let filename_suffix: String = (0..FILENAME_SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();

        Self {
            boundary: format!("Boundary_{}_{random}", Utc::now().timestamp_millis()),
            filename_suffix,
            created_at: Local::now(),
        }
    }
}

/// Name and media type of one attachment part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    pub filename: String,
    pub content_type: String,
}

/// A composed raw email, ready to be handed to a mail relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEmailDocument {
    raw: String,
    boundary: String,
    subject: String,
    attachments: Vec<AttachmentInfo>,
}

impl RawEmailDocument {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Attachment parts in document order.
    #[must_use]
    pub fn attachments(&self) -> &[AttachmentInfo] {
        &self.attachments
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.raw
    }
}

impl std::fmt::Display for RawEmailDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Builds [`RawEmailDocument`]s from report payloads. Composition never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailComposer;

impl EmailComposer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Composes with freshly generated tokens.
    #[must_use]
    pub fn compose(&self, payload: &ReportPayload) -> RawEmailDocument {
        self.compose_with(payload, &MimeTokens::generate())
    }

    /// Composes with the given boundary, filename suffix and timestamp.
    #[must_use]
    pub fn compose_with(&self, payload: &ReportPayload, tokens: &MimeTokens) -> RawEmailDocument {
        let timestamp = tokens.created_at.format(FILENAME_TIMESTAMP_FORMAT);
        let mut builder = MimeBuilder::new(&tokens.boundary, body_text(payload));

        if let Some(screenshot) = payload.screenshot_data() {
            builder.attach(SCREENSHOT_FILENAME, "image/png", screenshot_base64(screenshot));
        }

        let entries = payload.log_entries();
        if !entries.is_empty() {
            let filename = format!("console-logs-{timestamp}-{}.txt", tokens.filename_suffix);
            builder.attach(&filename, "text/plain", encode(format_all(entries).as_bytes()));
        }

        let custom = payload.custom_fields();
        if !custom.is_empty() {
            let filename = format!("custom-logs-{timestamp}-{}.txt", tokens.filename_suffix);
            builder.attach(&filename, "text/plain", encode(custom.raw_lines().as_bytes()));
        }

        let subject = payload.subject();
        let document = builder.render(payload.recipient().unwrap_or_default(), &subject);
        tracing::debug!(
            target: INTERNAL_TARGET,
            boundary = %document.boundary,
            attachments = document.attachments.len(),
            bytes = document.raw.len(),
            "composed raw email"
        );
        document
    }
}

fn body_text(payload: &ReportPayload) -> String {
    let mut body = payload.message().to_string();
    if let Some(reporter) = payload.reporter() {
        body.push_str("\n\n");
        body.push_str(USER_INFO_HEADER);
        body.push('\n');
        body.push_str(&reporter.title_lines());
    }
    body
}

/// Strips a data URI prefix and whitespace, then normalizes the base64.
/// Input that does not decode is kept as cleaned text.
fn screenshot_base64(data: &str) -> String {
    let data = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, payload)| payload),
        None => data,
    };
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();

    match STANDARD.decode(&cleaned) {
        Ok(bytes) => encode(&bytes),
        Err(err) => {
            tracing::debug!(
                target: INTERNAL_TARGET,
                error = %err,
                "screenshot is not valid base64; attaching as is"
            );
            cleaned
        }
    }
}

fn encode(bytes: &[u8]) -> String {
    wrap_lines(&STANDARD.encode(bytes))
}

fn wrap_lines(encoded: &str) -> String {
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH);
    for (i, ch) in encoded.chars().enumerate() {
        if i > 0 && i % BASE64_LINE_LENGTH == 0 {
            wrapped.push('\n');
        }
        wrapped.push(ch);
    }
    wrapped
}

/// Header values must stay on one line.
fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

struct AttachmentPart {
    info: AttachmentInfo,
    content: String,
}

struct MimeBuilder<'a> {
    boundary: &'a str,
    body: String,
    attachments: Vec<AttachmentPart>,
}

impl<'a> MimeBuilder<'a> {
    fn new(boundary: &'a str, body: String) -> Self {
        Self {
            boundary,
            body,
            attachments: Vec::new(),
        }
    }

    fn attach(&mut self, filename: &str, content_type: &str, content: String) {
        self.attachments.push(AttachmentPart {
            info: AttachmentInfo {
                filename: filename.to_string(),
                content_type: content_type.to_string(),
            },
            content,
        });
    }

    fn render(self, recipient: &str, subject: &str) -> RawEmailDocument {
        let boundary = self.boundary;
        let mut raw = format!(
            "From: \"{FROM_NAME}\" <{FROM_EMAIL}>\n\
             To: {}\n\
             Subject: {}\n\
             MIME-Version: 1.0\n\
             Content-Type: multipart/mixed; boundary=\"{boundary}\"\n\
             \n\
             --{boundary}\n\
             Content-Type: text/plain; charset=\"UTF-8\"\n\
             Content-Transfer-Encoding: 7bit\n\
             \n\
             {}\n",
            header_value(recipient),
            header_value(subject),
            self.body,
        );

        for part in &self.attachments {
            let AttachmentInfo {
                filename,
                content_type,
            } = &part.info;
            raw.push_str(&format!(
                "\n--{boundary}\n\
                 Content-Type: {content_type}; name=\"{filename}\"\n\
                 Content-Transfer-Encoding: base64\n\
                 Content-Disposition: attachment; filename=\"{filename}\"\n\
                 \n\
                 {}",
                part.content
            ));
        }
        raw.push_str(&format!("\n--{boundary}--"));

        RawEmailDocument {
            raw,
            boundary: boundary.to_string(),
            subject: subject.to_string(),
            attachments: self.attachments.into_iter().map(|part| part.info).collect(),
        }
    }
}
