// SPDX-License-Identifier: MPL-2.0
//! Delivery of composed reports.
//!
//! The default path posts `{"rawEmail": "<document>"}` to a mail relay. A
//! [`RawEmailSender`] override replaces that path entirely, e.g. to route
//! reports through the host application's own backend.

use std::panic::{catch_unwind, AssertUnwindSafe};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;

use super::{EmailComposer, RawEmailDocument, ReportPayload};
use crate::config::defaults::DEFAULT_ENDPOINT;
use crate::diagnostics::payload_message;

/// Error type returned by [`RawEmailSender`] overrides.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Replacement for the default network delivery.
///
/// Closures of the shape `Fn(String) -> BoxFuture<'static, Result<(), BoxError>>`
/// implement this trait:
///
/// ```
/// use futures_util::FutureExt;
/// use junebug::report::{BoxError, RawEmailSender};
///
/// let sender = |raw: String| async move {
///     println!("{} bytes", raw.len());
///     Ok::<(), BoxError>(())
/// }
/// .boxed();
/// fn accepts(_: &dyn RawEmailSender) {}
/// accepts(&sender);
/// ```
pub trait RawEmailSender: Send + Sync {
    fn send_raw<'a>(&'a self, raw_email: &'a str) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<F> RawEmailSender for F
where
    F: Fn(String) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync,
{
    fn send_raw<'a>(&'a self, raw_email: &'a str) -> BoxFuture<'a, Result<(), BoxError>> {
        self(raw_email.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The relay answered with a non-2xx status.
    #[error("failed to send bug report: {status} {body}")]
    Delivery { status: u16, body: String },
    /// The caller-supplied sender failed or panicked.
    #[error("custom sender failed: {0}")]
    Override(#[source] BoxError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Why a submission made no send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingRecipient,
    EmailerDisabled,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Delivered,
    Skipped(SkipReason),
    Failed(DispatchError),
}

impl SubmitOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// What the completion notifier is told about a finished submission.
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub payload: &'a ReportPayload,
    pub outcome: &'a SubmitOutcome,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest<'a> {
    raw_email: &'a str,
}

/// Sends composed reports to the mail relay or a caller override.
#[derive(Debug, Clone)]
pub struct ReportDispatcher {
    client: reqwest::Client,
    endpoint: String,
    composer: EmailComposer,
}

impl ReportDispatcher {
    /// Creates a dispatcher targeting the default relay.
    pub fn new() -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("JuneBug/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Creates a dispatcher around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            composer: EmailComposer::new(),
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Composes the payload and delivers it once.
    pub async fn send(
        &self,
        payload: &ReportPayload,
        sender: Option<&dyn RawEmailSender>,
    ) -> Result<(), DispatchError> {
        let document = self.composer.compose(payload);
        self.send_document(&document, sender).await
    }

    /// Delivers an already composed document once.
    ///
    /// A panic inside an override sender is caught and returned as
    /// [`DispatchError::Override`].
    pub async fn send_document(
        &self,
        document: &RawEmailDocument,
        sender: Option<&dyn RawEmailSender>,
    ) -> Result<(), DispatchError> {
        if let Some(sender) = sender {
            let raw_email = document.as_str();
            return match AssertUnwindSafe(async move { sender.send_raw(raw_email).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result.map_err(DispatchError::Override),
                Err(panic) => {
                    let message = payload_message(panic.as_ref())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    Err(DispatchError::Override(
                        format!("sender panicked: {message}").into(),
                    ))
                }
            };
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMailRequest {
                raw_email: document.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Delivery {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Sends a report unless there is no recipient or the emailer is
    /// disabled, then calls `notify` exactly once.
    ///
    /// Failures are logged and returned, never propagated as panics or
    /// errors. A panicking notifier is caught and logged.
    pub async fn submit<N>(
        &self,
        payload: &ReportPayload,
        sender: Option<&dyn RawEmailSender>,
        notify: N,
    ) -> SubmitOutcome
    where
        N: FnOnce(&Submission<'_>),
    {
        let outcome = if payload.report_flags().disable_emailer {
            tracing::warn!("bug report not sent: emailer disabled");
            SubmitOutcome::Skipped(SkipReason::EmailerDisabled)
        } else if payload.recipient().is_none() {
            tracing::warn!("bug report not sent: no recipient configured");
            SubmitOutcome::Skipped(SkipReason::MissingRecipient)
        } else {
            match self.send(payload, sender).await {
                Ok(()) => {
                    tracing::info!(
                        recipient = payload.recipient().unwrap_or_default(),
                        custom_sender = sender.is_some(),
                        "bug report sent"
                    );
                    SubmitOutcome::Delivered
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to send bug report");
                    SubmitOutcome::Failed(err)
                }
            }
        };

        let submission = Submission {
            payload,
            outcome: &outcome,
        };
        if catch_unwind(AssertUnwindSafe(|| notify(&submission))).is_err() {
            tracing::error!("bug report completion callback panicked");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use futures_util::FutureExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn dispatcher(server: &MockServer) -> ReportDispatcher {
        ReportDispatcher::new()
            .expect("client builds")
            .with_endpoint(format!("{}/v1/email/send-mail-post", server.uri()))
    }

    fn recording_sender(seen: Arc<Mutex<Vec<String>>>) -> impl RawEmailSender {
        move |raw: String| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(raw);
                Ok::<(), BoxError>(())
            }
            .boxed()
        }
    }

    #[test]
    fn default_endpoint_is_the_relay() {
        let dispatcher = ReportDispatcher::new().unwrap();
        assert_eq!(
            dispatcher.endpoint(),
            "https://tesseract-api.com/v1/email/send-mail-post"
        );
    }

    #[tokio::test]
    async fn send_posts_raw_email_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/email/send-mail-post"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let payload = ReportPayload::new("Hi").to("qa@example.com");
        dispatcher(&server).send(&payload, None).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let raw = body["rawEmail"].as_str().unwrap();
        assert!(raw.starts_with("From: \"JuneBug\" <donotreply@junebugreports.com>\nTo: qa@example.com\n"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("relay down"))
            .mount(&server)
            .await;

        let payload = ReportPayload::new("Hi").to("qa@example.com");
        let err = dispatcher(&server).send(&payload, None).await.unwrap_err();

        match err {
            DispatchError::Delivery { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "relay down");
            }
            other => panic!("expected delivery failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn override_replaces_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sender = recording_sender(Arc::clone(&seen));
        let payload = ReportPayload::new("Hi").to("qa@example.com");

        dispatcher(&server).send(&payload, Some(&sender)).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("\nHi\n"));
    }

    #[tokio::test]
    async fn failing_override_is_reported() {
        let sender = |_raw: String| async { Err::<(), BoxError>("backend offline".into()) }.boxed();
        let payload = ReportPayload::new("Hi").to("qa@example.com");

        let outcome = ReportDispatcher::new()
            .unwrap()
            .submit(&payload, Some(&sender), |_| {})
            .await;

        match outcome {
            SubmitOutcome::Failed(DispatchError::Override(err)) => {
                assert_eq!(err.to_string(), "backend offline")
            }
            other => panic!("expected override failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_override_is_a_failure_and_still_notifies() {
        let sender = |_raw: String| -> BoxFuture<'static, Result<(), BoxError>> {
            panic!("override bug")
        };
        let payload = ReportPayload::new("Hi").to("qa@example.com");
        let calls = AtomicUsize::new(0);

        let outcome = ReportDispatcher::new()
            .unwrap()
            .submit(&payload, Some(&sender), |submission| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert!(matches!(
                    submission.outcome,
                    SubmitOutcome::Failed(DispatchError::Override(_))
                ));
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match outcome {
            SubmitOutcome::Failed(DispatchError::Override(err)) => {
                assert_eq!(err.to_string(), "sender panicked: override bug")
            }
            other => panic!("expected override failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn override_panicking_while_polled_is_caught() {
        let sender = |raw: String| {
            async move {
                tokio::task::yield_now().await;
                if raw.is_empty() {
                    return Ok::<(), BoxError>(());
                }
                panic!("late override bug")
            }
            .boxed()
        };
        let payload = ReportPayload::new("Hi").to("qa@example.com");

        let outcome = ReportDispatcher::new()
            .unwrap()
            .submit(&payload, Some(&sender), |_| {})
            .await;

        assert!(matches!(
            outcome,
            SubmitOutcome::Failed(DispatchError::Override(_))
        ));
    }

    #[tokio::test]
    async fn submit_notifies_once_on_delivery_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let calls = AtomicUsize::new(0);
        let payload = ReportPayload::new("Hi").to("qa@example.com");
        let outcome = dispatcher(&server)
            .submit(&payload, None, |submission| {
                calls.fetch_add(1, Ordering::SeqCst);
                assert!(matches!(
                    submission.outcome,
                    SubmitOutcome::Failed(DispatchError::Delivery { status: 500, .. })
                ));
            })
            .await;

        assert!(matches!(outcome, SubmitOutcome::Failed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_skips_without_recipient_but_still_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let calls = AtomicUsize::new(0);
        let outcome = dispatcher(&server)
            .submit(&ReportPayload::new("Hi"), None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(
            outcome,
            SubmitOutcome::Skipped(SkipReason::MissingRecipient)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_skips_when_emailer_disabled() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sender = recording_sender(Arc::clone(&seen));
        let payload = ReportPayload::new("Hi")
            .to("qa@example.com")
            .flags(crate::report::ReportFlags {
                disable_emailer: true,
                ..Default::default()
            });

        let outcome = ReportDispatcher::new()
            .unwrap()
            .submit(&payload, Some(&sender), |_| {})
            .await;

        assert!(matches!(
            outcome,
            SubmitOutcome::Skipped(SkipReason::EmailerDisabled)
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_notifier_does_not_escape() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sender = recording_sender(Arc::clone(&seen));
        let payload = ReportPayload::new("Hi").to("qa@example.com");

        let outcome = ReportDispatcher::new()
            .unwrap()
            .submit(&payload, Some(&sender), |_| panic!("callback bug"))
            .await;

        assert!(outcome.is_delivered());
    }
}
