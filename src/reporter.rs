// SPDX-License-Identifier: MPL-2.0
//! The submit path of the bug reporter widget.
//!
//! [`BugReporter`] turns a user's message (and an optional screenshot) into
//! a report built from the configured settings and a snapshot of the captured
//! logs, then hands it to the [`ReportDispatcher`]. Each call is independent:
//! overlapping submissions are allowed and share nothing but the buffer.

use std::sync::Arc;

use crate::config::ReporterConfig;
use crate::diagnostics::{CaptureBuffer, CapturedLogs};
use crate::error::Result;
use crate::report::{
    ChatCard, ChatCardComposer, EmailComposer, Fields, RawEmailDocument, RawEmailSender,
    ReportDispatcher, ReportFlags, ReportPayload, Submission, SubmitOutcome,
};

type Notifier = Arc<dyn Fn(&Submission<'_>) + Send + Sync>;

#[derive(Clone)]
pub struct BugReporter {
    config: ReporterConfig,
    buffer: CaptureBuffer,
    dispatcher: ReportDispatcher,
    sender: Option<Arc<dyn RawEmailSender>>,
    on_submit: Option<Notifier>,
}

impl std::fmt::Debug for BugReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BugReporter")
            .field("config", &self.config)
            .field("endpoint", &self.dispatcher.endpoint())
            .field("custom_sender", &self.sender.is_some())
            .finish_non_exhaustive()
    }
}

impl BugReporter {
    /// Creates a reporter reading from the process-wide capture buffer.
    pub fn new(config: ReporterConfig) -> Result<Self> {
        let mut dispatcher = ReportDispatcher::new()?;
        if let Some(endpoint) = &config.endpoint {
            dispatcher = dispatcher.with_endpoint(endpoint.clone());
        }
        Ok(Self {
            config,
            buffer: CaptureBuffer::global().clone(),
            dispatcher,
            sender: None,
            on_submit: None,
        })
    }

    /// Reads logs from `buffer` instead of the process-wide one.
    #[must_use]
    pub fn with_buffer(mut self, buffer: CaptureBuffer) -> Self {
        self.buffer = buffer;
        self
    }

    /// Delivers reports through `sender` instead of the mail relay.
    #[must_use]
    pub fn with_sender_override(mut self, sender: impl RawEmailSender + 'static) -> Self {
        self.sender = Some(Arc::new(sender));
        self
    }

    /// Called once after every submission, whatever its outcome.
    #[must_use]
    pub fn on_submit(mut self, notify: impl Fn(&Submission<'_>) + Send + Sync + 'static) -> Self {
        self.on_submit = Some(Arc::new(notify));
        self
    }

    #[must_use]
    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    #[must_use]
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    fn flags(&self) -> ReportFlags {
        ReportFlags {
            disable_logs: self.config.disable_console_logs,
            disable_screenshot: self.config.disable_screenshot,
            disable_emailer: self.config.disable_emailer,
        }
    }

    /// Builds the payload for `message` from the settings and a fresh
    /// snapshot of the captured logs.
    #[must_use]
    pub fn payload(&self, message: &str, screenshot: Option<String>) -> ReportPayload {
        let config = &self.config;
        let flags = self.flags();
        let logs = if flags.disable_logs {
            CapturedLogs::default()
        } else {
            self.buffer.snapshot()
        };

        let mut payload = ReportPayload::new(message)
            .custom_log_fields(Fields::from(config.custom_log_fields.clone()))
            .logs(logs)
            .flags(flags);
        if let Some(to) = &config.support_inbox {
            payload = payload.to(to.clone());
        }
        if let Some(info) = &config.reporter_info {
            payload = payload.reporter_info(Fields::from(info.clone()));
        }
        if let Some(app) = &config.app_name {
            payload = payload.app_name(app.clone());
        }
        if let Some(prefix) = &config.subject_prefix {
            payload = payload.subject_prefix(prefix.clone());
        }
        if let Some(screenshot) = screenshot.filter(|_| !flags.disable_screenshot) {
            payload = payload.screenshot(screenshot);
        }
        payload
    }

    /// Composes the raw email that [`submit`](Self::submit) would send.
    #[must_use]
    pub fn compose_email(&self, message: &str, screenshot: Option<String>) -> RawEmailDocument {
        EmailComposer::new().compose(&self.payload(message, screenshot))
    }

    /// Builds the chat card for `message`.
    #[must_use]
    pub fn chat_card(&self, message: &str, screenshot_url: Option<&str>) -> ChatCard {
        let mut composer = ChatCardComposer::new();
        if let Some(text) = &self.config.chat_message {
            composer = composer.chat_message(text.clone());
        }
        composer.compose(&self.payload(message, None), screenshot_url)
    }

    /// Sends a report and runs the completion callback exactly once.
    pub async fn submit(&self, message: &str, screenshot: Option<String>) -> SubmitOutcome {
        let payload = self.payload(message, screenshot);
        let sender = self.sender.as_deref();
        let on_submit = self.on_submit.clone();

        self.dispatcher
            .submit(&payload, sender, |submission| {
                if let Some(notify) = on_submit {
                    notify(submission);
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use futures_util::FutureExt;
    use serde_json::{json, Value};

    use super::*;
    use crate::diagnostics::{LogEntry, Severity};
    use crate::report::{BoxError, SkipReason};

    fn config() -> ReporterConfig {
        let Value::Object(info) = json!({ "fullName": "Jane Doe", "email": "jane@example.com" })
        else {
            unreachable!()
        };
        ReporterConfig {
            support_inbox: Some("support@example.com".to_string()),
            app_name: Some("Dashboard".to_string()),
            reporter_info: Some(info),
            chat_message: Some("Hello".to_string()),
            ..ReporterConfig::default()
        }
    }

    fn reporter(config: ReporterConfig, buffer: &CaptureBuffer) -> BugReporter {
        BugReporter::new(config)
            .expect("reporter builds")
            .with_buffer(buffer.clone())
    }

    fn buffer_with_logs() -> CaptureBuffer {
        let buffer = CaptureBuffer::new();
        buffer.append(LogEntry::new(Severity::Warn, vec!["slow request".into()]));
        buffer.append(LogEntry::new(Severity::Error, vec!["request failed".into()]));
        buffer
    }

    #[test]
    fn payload_snapshots_buffer_and_settings() {
        let buffer = buffer_with_logs();
        let payload = reporter(config(), &buffer).payload("Broken", Some("aGk=".into()));
        buffer.clear();

        assert_eq!(payload.log_entries().len(), 2);
        assert_eq!(payload.recipient(), Some("support@example.com"));
        assert_eq!(payload.subject(), "JuneBug Report - Dashboard");
        assert_eq!(payload.screenshot_data(), Some("aGk="));
    }

    #[test]
    fn disabled_logs_and_screenshot_are_left_out() {
        let buffer = buffer_with_logs();
        let config = ReporterConfig {
            disable_console_logs: true,
            disable_screenshot: true,
            ..config()
        };
        let document = reporter(config, &buffer).compose_email("Broken", Some("aGk=".into()));
        assert!(document.attachments().is_empty());
    }

    #[test]
    fn chat_card_uses_reporter_and_logs() {
        let buffer = buffer_with_logs();
        let card = reporter(config(), &buffer).chat_card("Broken", None);
        let json: Value = serde_json::from_str(&card.to_pretty_json().unwrap()).unwrap();

        assert_eq!(card.container_ids().len(), 2);
        assert_eq!(json["body"][2]["actions"][0]["title"], "💬 Chat with Jane Doe");
        assert!(json["body"][2]["actions"][0]["url"]
            .as_str()
            .unwrap()
            .ends_with("&message=Hello"));
    }

    #[tokio::test]
    async fn submit_uses_override_and_notifies() {
        let buffer = buffer_with_logs();
        let sent = Arc::new(Mutex::new(Vec::<String>::new()));
        let notified = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&sent);
        let counter = Arc::clone(&notified);
        let reporter = reporter(config(), &buffer)
            .with_sender_override(move |raw: String| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(raw);
                    Ok::<(), BoxError>(())
                }
                .boxed()
            })
            .on_submit(move |submission| {
                assert!(submission.outcome.is_delivered());
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let outcome = reporter.submit("Broken", None).await;

        assert!(outcome.is_delivered());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Full Name: Jane Doe"));
        assert!(sent[0].contains("console-logs-"));
    }

    #[tokio::test]
    async fn submit_without_inbox_is_skipped() {
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let config = ReporterConfig {
            support_inbox: None,
            ..config()
        };
        let reporter = reporter(config, &CaptureBuffer::new()).on_submit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = reporter.submit("Broken", None).await;

        assert!(matches!(
            outcome,
            SubmitOutcome::Skipped(SkipReason::MissingRecipient)
        ));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_submissions_are_independent() {
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sent);
        let reporter = reporter(config(), &buffer_with_logs()).with_sender_override(
            move |_raw: String| {
                let counter = Arc::clone(&counter);
                async move {
                    tokio::task::yield_now().await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                }
                .boxed()
            },
        );

        let (a, b) = tokio::join!(reporter.submit("first", None), reporter.submit("second", None));

        assert!(a.is_delivered() && b.is_delivered());
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }
}
