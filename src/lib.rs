// SPDX-License-Identifier: MPL-2.0
//! `junebug` is the diagnostics and report core of an embeddable bug reporter.
//!
//! It keeps a bounded log of the process's diagnostic events, and turns a
//! user's report (message, reporter details, screenshot, captured logs) into
//! a raw multipart email and an Adaptive Card for chat.
//!
//! ```no_run
//! use junebug::{BugReporter, DiagnosticHook};
//!
//! # async fn run() -> junebug::Result<()> {
//! DiagnosticHook::install_global();
//! tracing::warn!("cache miss");
//!
//! let config = junebug::config::load()?;
//! let outcome = BugReporter::new(config)?.submit("The export button does nothing", None).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/junebug/0.1.0")]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod report;
pub mod reporter;

pub use config::ReporterConfig;
pub use diagnostics::{CaptureBuffer, CapturedValue, DiagnosticHook, LogEntry, Severity};
pub use error::{Error, Result};
pub use report::{ReportDispatcher, ReportPayload, SubmitOutcome};
pub use reporter::BugReporter;
