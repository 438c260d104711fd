// SPDX-License-Identifier: MPL-2.0
//! Bug report payload and the documents built from it.
//!
//! A [`ReportPayload`] is composed into two independent documents: a raw
//! multipart email ([`EmailComposer`]) and an Adaptive Card for chat
//! ([`ChatCardComposer`]). The email is then delivered by
//! [`ReportDispatcher`].

mod card;
mod dispatch;
mod email;

pub use card::{
    CardAction, CardElement, ChatCard, ChatCardComposer, Container, ContainerStyle, TextBlock,
};
pub use dispatch::{
    BoxError, DispatchError, RawEmailSender, ReportDispatcher, SkipReason, Submission,
    SubmitOutcome,
};
pub use email::{AttachmentInfo, EmailComposer, MimeTokens, RawEmailDocument};

use serde_json::{Map, Value};

use crate::config::defaults::DEFAULT_SUBJECT_PREFIX;
use crate::diagnostics::{serialize_inline, CapturedLogs, CapturedValue, LogEntry};

/// Ordered key/value pairs, as supplied by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct Fields(Vec<(String, CapturedValue)>);

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair, keeping insertion order.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<CapturedValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<CapturedValue>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CapturedValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `"<key>: <value>"` lines with the keys as given.
    #[must_use]
    pub fn raw_lines(&self) -> String {
        self.lines(|key| key.to_string())
    }

    /// `"<Key>: <value>"` lines with keys converted by [`title_case`].
    #[must_use]
    pub fn title_lines(&self) -> String {
        self.lines(title_case)
    }

    fn lines(&self, format_key: impl Fn(&str) -> String) -> String {
        self.iter()
            .map(|(key, value)| format!("{}: {}", format_key(key), serialize_inline(value)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<CapturedValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<Map<String, Value>> for Fields {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

/// Converts `camelCase` or `snake_case` keys to `Title Case With Spaces`.
///
/// ```
/// use junebug::report::title_case;
///
/// assert_eq!(title_case("fullName"), "Full Name");
/// assert_eq!(title_case("short_name"), "Short Name");
/// ```
#[must_use]
pub fn title_case(key: &str) -> String {
    let mut spaced = String::with_capacity(key.len() + 4);
    let mut previous: Option<char> = None;
    for ch in key.chars() {
        if ch.is_ascii_uppercase()
            && previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            spaced.push(' ');
        }
        spaced.push(if ch == '_' { ' ' } else { ch });
        previous = Some(ch);
    }

    let mut titled = String::with_capacity(spaced.len());
    let mut at_word_start = true;
    for ch in spaced.chars() {
        titled.push(if at_word_start { ch.to_ascii_uppercase() } else { ch });
        at_word_start = !ch.is_ascii_alphanumeric();
    }
    titled
}

/// Switches that remove parts of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportFlags {
    pub disable_logs: bool,
    pub disable_screenshot: bool,
    pub disable_emailer: bool,
}

/// Everything a report is built from.
#[derive(Debug, Clone, Default)]
pub struct ReportPayload {
    recipient: Option<String>,
    message: String,
    reporter_info: Option<Fields>,
    screenshot: Option<String>,
    custom_log_fields: Fields,
    app_name: Option<String>,
    subject_prefix: Option<String>,
    logs: CapturedLogs,
    flags: ReportFlags,
}

impl ReportPayload {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    #[must_use]
    pub fn reporter_info(mut self, info: impl Into<Fields>) -> Self {
        self.reporter_info = Some(info.into());
        self
    }

    /// Base64 PNG data, with or without a `data:` URI prefix.
    #[must_use]
    pub fn screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot.into());
        self
    }

    #[must_use]
    pub fn custom_log_fields(mut self, fields: impl Into<Fields>) -> Self {
        self.custom_log_fields = fields.into();
        self
    }

    #[must_use]
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    #[must_use]
    pub fn subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn logs(mut self, logs: impl Into<CapturedLogs>) -> Self {
        self.logs = logs.into();
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: ReportFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Recipient, if one is set and not blank.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref().filter(|to| !to.trim().is_empty())
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn reporter(&self) -> Option<&Fields> {
        self.reporter_info.as_ref()
    }

    /// Screenshot to include, unless screenshots are disabled.
    #[must_use]
    pub fn screenshot_data(&self) -> Option<&str> {
        if self.flags.disable_screenshot {
            return None;
        }
        self.screenshot.as_deref().filter(|data| !data.is_empty())
    }

    #[must_use]
    pub fn custom_fields(&self) -> &Fields {
        &self.custom_log_fields
    }

    /// Captured entries to include, unless logs are disabled.
    #[must_use]
    pub fn log_entries(&self) -> &[LogEntry] {
        if self.flags.disable_logs {
            &[]
        } else {
            self.logs.entries()
        }
    }

    #[must_use]
    pub fn report_flags(&self) -> ReportFlags {
        self.flags
    }

    /// `<prefix>[ - <app name>]`, the prefix defaulting to `JuneBug Report`.
    #[must_use]
    pub fn subject(&self) -> String {
        let prefix = self
            .subject_prefix
            .as_deref()
            .unwrap_or(DEFAULT_SUBJECT_PREFIX);
        match self.app_name.as_deref() {
            Some(app) => format!("{prefix} - {app}"),
            None => prefix.to_string(),
        }
    }
}
