// SPDX-License-Identifier: MPL-2.0
//! Interception of the process's diagnostic output.
//!
//! The four diagnostic channels are the `tracing` levels. [`CaptureLayer`]
//! sits next to whatever layers actually print events and copies each event
//! into a [`CaptureBuffer`] without filtering or altering it, so host output
//! is unchanged. Panics and failed background tasks are turned into
//! synthesized `Error` entries.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use std::sync::{Once, OnceLock, PoisonError, RwLock};

use tokio::task::{JoinError, JoinHandle};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::buffer::CaptureBuffer;
use super::events::{LogEntry, Severity};
use super::serializer::{coerce, serialize_value};
use super::value::{CapturedValue, ErrorLike};
use crate::config::defaults::DEFAULT_LOG_FILTER;

/// Target used when [`DiagnosticHook::record`] forwards an entry to
/// `tracing`. The capture layer ignores it so the entry is stored once.
pub const FORWARDED_TARGET: &str = "junebug::forwarded";

/// Target of this crate's own bookkeeping events, which are never captured.
pub const INTERNAL_TARGET: &str = "junebug::internal";

/// HTTP stack crates whose events are only captured from `INFO` up.
const TRANSPORT_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls"];

static PANIC_HOOK: Once = Once::new();
static PANIC_TARGET: RwLock<Option<CaptureBuffer>> = RwLock::new(None);
static GLOBAL_HOOK: OnceLock<DiagnosticHook> = OnceLock::new();

/// Feeds a [`CaptureBuffer`] from diagnostic calls, panics and task failures.
#[derive(Debug, Clone)]
pub struct DiagnosticHook {
    buffer: CaptureBuffer,
}

impl DiagnosticHook {
    #[must_use]
    pub fn new(buffer: CaptureBuffer) -> Self {
        Self { buffer }
    }

    /// Performs the one-time process setup and returns the process-wide hook.
    ///
    /// The first call installs a global subscriber (formatted output filtered
    /// by `RUST_LOG`, plus the capture layer) and the panic hook, all feeding
    /// [`CaptureBuffer::global`]; panics are redirected there even if a local
    /// hook installed the panic hook earlier. Later calls return the same
    /// hook and change nothing. If another global subscriber already exists
    /// it is left in place; only explicit [`record`](Self::record) calls and
    /// panics are captured in that case.
    pub fn install_global() -> &'static DiagnosticHook {
        GLOBAL_HOOK.get_or_init(|| {
            let hook = DiagnosticHook::new(CaptureBuffer::global().clone());
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

            let installed = tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(filter))
                .with(hook.layer())
                .try_init();
            if let Err(err) = installed {
                tracing::debug!(
                    target: INTERNAL_TARGET,
                    error = %err,
                    "global subscriber already set; capture layer not installed"
                );
            }

            hook.install_panic_hook();
            hook
        })
    }

    /// Returns the buffer this hook appends to.
    #[must_use]
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Builds a `tracing` layer that copies events into this hook's buffer.
    #[must_use]
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.buffer.clone())
    }

    /// Records a diagnostic call with typed arguments and forwards it to the
    /// matching `tracing` level.
    pub fn record(&self, severity: Severity, values: Vec<CapturedValue>) {
        let text = values
            .iter()
            .map(serialize_value)
            .collect::<Vec<_>>()
            .join(" ");
        self.buffer.append(LogEntry::new(severity, values));

        match severity {
            Severity::Log => tracing::debug!(target: FORWARDED_TARGET, "{text}"),
            Severity::Info => tracing::info!(target: FORWARDED_TARGET, "{text}"),
            Severity::Warn => tracing::warn!(target: FORWARDED_TARGET, "{text}"),
            Severity::Error => tracing::error!(target: FORWARDED_TARGET, "{text}"),
        }
    }

    pub fn log(&self, values: Vec<CapturedValue>) {
        self.record(Severity::Log, values);
    }

    pub fn info(&self, values: Vec<CapturedValue>) {
        self.record(Severity::Info, values);
    }

    pub fn warn(&self, values: Vec<CapturedValue>) {
        self.record(Severity::Warn, values);
    }

    pub fn error(&self, values: Vec<CapturedValue>) {
        self.record(Severity::Error, values);
    }

    /// Records an unhandled asynchronous failure as one `Error` entry.
    ///
    /// Error-like reasons are kept as they are; anything else is wrapped in
    /// an `UnhandledRejection` error describing the reason.
    pub fn record_rejection(&self, reason: impl Into<CapturedValue>) {
        let error = match reason.into() {
            CapturedValue::Error(error) => error,
            other => ErrorLike::new("UnhandledRejection", coerce(&other)),
        };
        self.record(Severity::Error, vec![CapturedValue::Error(error)]);
    }

    /// Awaits a spawned task and records its failure, if any.
    ///
    /// An `Err` result or a cancellation becomes a rejection entry. A panic
    /// is recorded here unless the panic hook already captured it into this
    /// hook's buffer.
    pub async fn watch<T, E>(&self, handle: JoinHandle<Result<T, E>>) -> Option<T>
    where
        E: StdError,
    {
        match handle.await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.record_rejection(ErrorLike::from_error(&err));
                None
            }
            Err(join_err) => {
                if !(join_err.is_panic() && self.is_panic_target()) {
                    self.record_rejection(join_error(join_err));
                }
                None
            }
        }
    }

    /// Installs the process-wide panic hook and points it at this hook's
    /// buffer.
    ///
    /// Each panic appends one `Error` entry to the buffer of the hook that
    /// called this most recently, then runs the previously installed hook.
    /// The process hook itself is set once; returns `true` when this call
    /// set it.
    pub fn install_panic_hook(&self) -> bool {
        *PANIC_TARGET.write().unwrap_or_else(PoisonError::into_inner) = Some(self.buffer.clone());

        let mut installed_now = false;
        PANIC_HOOK.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                if let Some(buffer) = panic_target() {
                    let error = panic_error(info.payload(), info.location());
                    buffer.append(LogEntry::new(Severity::Error, vec![error.into()]));
                }
                previous(info);
            }));
            installed_now = true;
        });
        installed_now
    }

    /// Returns true if panics are currently captured into this hook's buffer.
    #[must_use]
    pub fn is_panic_target(&self) -> bool {
        panic_target().is_some_and(|target| target.same_as(&self.buffer))
    }
}

/// Returns true once any [`DiagnosticHook`] has installed the panic hook.
#[must_use]
pub fn panic_hook_installed() -> bool {
    PANIC_HOOK.is_completed()
}

fn panic_target() -> Option<CaptureBuffer> {
    PANIC_TARGET
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}

fn panic_error(payload: &(dyn Any + Send), location: Option<&Location<'_>>) -> ErrorLike {
    let message = match (payload_message(payload), location) {
        (Some(msg), Some(loc)) => format!("{msg} @ {}:{}:{}", loc.file(), loc.line(), loc.column()),
        (Some(msg), None) => msg,
        (None, _) => "Unknown runtime error".to_string(),
    };

    let backtrace = Backtrace::capture();
    let error = ErrorLike::new("panic", message);
    if backtrace.status() == BacktraceStatus::Captured {
        error.with_stack(backtrace.to_string())
    } else {
        error
    }
}

fn join_error(err: JoinError) -> ErrorLike {
    if err.is_cancelled() {
        return ErrorLike::new("UnhandledRejection", "task was cancelled");
    }
    match err.try_into_panic() {
        Ok(payload) => ErrorLike::new(
            "panic",
            payload_message(payload.as_ref()).unwrap_or_else(|| "Unknown runtime error".to_string()),
        ),
        Err(err) => ErrorLike::new("UnhandledRejection", err.to_string()),
    }
}

/// `tracing` layer that stores observed events in a [`CaptureBuffer`].
///
/// Events on [`FORWARDED_TARGET`] and [`INTERNAL_TARGET`] are skipped, as
/// are `DEBUG` and `TRACE` events from the HTTP stack. The layer never
/// filters what other layers see.
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    buffer: CaptureBuffer,
    max_level: Level,
}

impl CaptureLayer {
    /// Captures events up to `DEBUG` verbosity.
    #[must_use]
    pub fn new(buffer: CaptureBuffer) -> Self {
        Self {
            buffer,
            max_level: Level::DEBUG,
        }
    }

    /// Sets the most verbose level that is still captured.
    #[must_use]
    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl CaptureLayer {
    fn captures(&self, target: &str, level: Level) -> bool {
        if level > self.max_level || target == FORWARDED_TARGET || target == INTERNAL_TARGET {
            return false;
        }
        level <= Level::INFO
            || !TRANSPORT_TARGETS
                .iter()
                .any(|crate_name| is_within(target, crate_name))
    }
}

fn is_within(target: &str, crate_name: &str) -> bool {
    target
        .strip_prefix(crate_name)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.captures(metadata.target(), *metadata.level()) {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);
        self.buffer.append(LogEntry::new(
            Severity::from_level(*metadata.level()),
            fields.into_values(),
        ));
    }
}

/// Turns an event's fields into call arguments: the message first, then any
/// recorded errors, then the remaining fields as one keyed value.
#[derive(Default)]
struct FieldCollector {
    message: Option<CapturedValue>,
    errors: Vec<CapturedValue>,
    fields: Vec<(String, CapturedValue)>,
}

impl FieldCollector {
    fn push(&mut self, field: &Field, value: CapturedValue) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }

    fn into_values(self) -> Vec<CapturedValue> {
        let mut values: Vec<CapturedValue> = self.message.into_iter().collect();
        values.extend(self.errors);
        if !self.fields.is_empty() {
            values.push(CapturedValue::Map(self.fields));
        }
        values
    }
}

impl Visit for FieldCollector {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.into());
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn StdError + 'static)) {
        self.errors.push(ErrorLike::from_dyn(value).into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, CapturedValue::Text(format!("{value:?}")));
    }
}
