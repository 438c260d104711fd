// SPDX-License-Identifier: MPL-2.0
//! Captured diagnostic event types.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::Level;

use super::CapturedValue;

/// The four diagnostic channels an entry can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Log,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Upper-case label used in formatted entries (`LOG`, `INFO`, ...).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Log => "LOG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Colored square shown in front of the label.
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Log => "⬜",
            Self::Info => "🟦",
            Self::Warn => "🟨",
            Self::Error => "🟥",
        }
    }

    /// Maps a `tracing` level onto a channel. `TRACE` and `DEBUG` both land
    /// on the plain log channel.
    #[must_use]
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO => Self::Info,
            _ => Self::Log,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One captured diagnostic call: its channel, its arguments in call order and
/// the moment it was captured. Entries are never modified after creation;
/// shared nodes among the arguments are frozen when the entry is built.
#[derive(Debug, Clone)]
pub struct LogEntry {
    severity: Severity,
    values: Vec<CapturedValue>,
    captured_at: DateTime<Utc>,
}

impl LogEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(severity: Severity, values: Vec<CapturedValue>) -> Self {
        Self::at(severity, values, Utc::now())
    }

    /// Creates an entry with an explicit capture time.
    #[must_use]
    pub fn at(severity: Severity, values: Vec<CapturedValue>, captured_at: DateTime<Utc>) -> Self {
        Self {
            severity,
            values: CapturedValue::freeze_all(values),
            captured_at,
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn values(&self) -> &[CapturedValue] {
        &self.values
    }

    #[must_use]
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// ISO-8601 capture time with millisecond precision, e.g.
    /// `2024-01-02T03:04:05.678Z`.
    #[must_use]
    pub fn timestamp(&self) -> String {
        self.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn severity_labels_and_glyphs() {
        assert_eq!(Severity::Log.label(), "LOG");
        assert_eq!(Severity::Info.glyph(), "🟦");
        assert_eq!(Severity::Warn.to_string(), "WARN");
        assert_eq!(Severity::Error.glyph(), "🟥");
    }

    #[test]
    fn severity_from_tracing_level() {
        assert_eq!(Severity::from_level(Level::TRACE), Severity::Log);
        assert_eq!(Severity::from_level(Level::DEBUG), Severity::Log);
        assert_eq!(Severity::from_level(Level::INFO), Severity::Info);
        assert_eq!(Severity::from_level(Level::WARN), Severity::Warn);
        assert_eq!(Severity::from_level(Level::ERROR), Severity::Error);
    }

    #[test]
    fn severity_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&Severity::Warn).unwrap(),
            "\"warn\""
        );
    }

    #[test]
    fn timestamp_uses_millisecond_utc_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(678);
        let entry = LogEntry::at(Severity::Info, vec![], at);
        assert_eq!(entry.timestamp(), "2024-01-02T03:04:05.678Z");
    }
}
