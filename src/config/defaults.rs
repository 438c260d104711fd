// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! used across the crate. Constants are organized by category.
//!
//! # Categories
//!
//! - **Capture**: Diagnostic buffer sizing and log filtering
//! - **Email**: Sender identity and subject line
//! - **Delivery**: Mail relay endpoint
//! - **Chat card**: Placeholder texts and deep-link base URL

// ==========================================================================
// Capture Defaults
// ==========================================================================

/// Number of diagnostic entries kept in memory. Older entries are evicted.
pub const CAPTURE_BUFFER_CAPACITY: usize = 100;

/// `EnvFilter` directive used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info";

// ==========================================================================
// Email Defaults
// ==========================================================================

/// Display name of the fixed report sender.
pub const FROM_NAME: &str = "JuneBug";

/// Address of the fixed report sender.
pub const FROM_EMAIL: &str = "donotreply@junebugreports.com";

/// Subject used when no prefix is configured.
pub const DEFAULT_SUBJECT_PREFIX: &str = "JuneBug Report";

/// Filename of the screenshot attachment.
pub const SCREENSHOT_FILENAME: &str = "screenshot.png";

/// Maximum length of a base64 line in attachment parts.
pub const BASE64_LINE_LENGTH: usize = 76;

/// Length of the random suffix appended to log attachment filenames.
pub const FILENAME_SUFFIX_LEN: usize = 4;

/// Length of the random part of the MIME boundary.
pub const BOUNDARY_RANDOM_LEN: usize = 8;

// ==========================================================================
// Delivery Defaults
// ==========================================================================

/// Mail relay accepting `{"rawEmail": ...}` documents.
pub const DEFAULT_ENDPOINT: &str = "https://tesseract-api.com/v1/email/send-mail-post";

// ==========================================================================
// Chat Card Defaults
// ==========================================================================

/// Base URL of the Teams one-to-one chat deep link.
pub const TEAMS_CHAT_BASE_URL: &str = "https://teams.microsoft.com/l/chat/0/0";

/// Adaptive Card schema and version emitted by the chat card composer.
pub const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";
pub const ADAPTIVE_CARD_VERSION: &str = "1.4";

pub const NO_SCREENSHOT_TEXT: &str = "No screenshot provided.";
pub const NO_USER_INFO_TEXT: &str = "No user info provided.";
pub const NO_STACK_TRACE_TEXT: &str = "No stack trace provided.";

// ==========================================================================
// Compile-time Validation
// ==========================================================================

const _: () = {
    // Capture validation
    assert!(CAPTURE_BUFFER_CAPACITY > 0);

    // MIME validation: RFC 2045 caps encoded lines at 76 characters
    assert!(BASE64_LINE_LENGTH > 0);
    assert!(BASE64_LINE_LENGTH <= 76);
    assert!(BASE64_LINE_LENGTH % 4 == 0);
    assert!(FILENAME_SUFFIX_LEN > 0);
    assert!(BOUNDARY_RANDOM_LEN > 0);

    // Non-empty identities
    assert!(!FROM_NAME.is_empty());
    assert!(!FROM_EMAIL.is_empty());
    assert!(!DEFAULT_SUBJECT_PREFIX.is_empty());
};
