// SPDX-License-Identifier: MPL-2.0
//! Capture of the process's diagnostic output.
//!
//! This module records diagnostic events for the whole process lifetime in a
//! memory-bounded circular buffer, so they can be attached to a bug report.
//!
//! # Architecture
//!
//! - [`DiagnosticHook`]: feeds the buffer from `tracing` events (through
//!   [`CaptureLayer`]), explicit calls, panics and failed tasks
//! - [`CaptureBuffer`]: shared handle over a [`CircularBuffer`] of
//!   [`LogEntry`] values, with copy-on-read [`CapturedLogs`] snapshots
//! - [`CapturedValue`]: the typed arguments of a diagnostic call
//! - [`serializer`]: total rendering of values and entries as text

mod buffer;
mod events;
mod hook;
pub mod serializer;
mod value;

pub use buffer::{CaptureBuffer, CapturedLogs, CircularBuffer};
pub use events::{LogEntry, Severity};
pub use hook::{
    panic_hook_installed, CaptureLayer, DiagnosticHook, FORWARDED_TARGET, INTERNAL_TARGET,
};
pub(crate) use hook::payload_message;
pub use serializer::{
    format_all, format_entry, serialize_inline, serialize_value, SerializationFallback, MAX_DEPTH,
};
pub use value::{CapturedValue, ErrorLike, SharedValue, ValueShape};
