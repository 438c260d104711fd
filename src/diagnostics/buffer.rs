// SPDX-License-Identifier: MPL-2.0
//! Bounded storage for captured log entries.
//!
//! [`CircularBuffer`] is the plain ring buffer. [`CaptureBuffer`] wraps one
//! in a shared, lockable handle so every diagnostic source in the process can
//! append to the same log, and hands out [`CapturedLogs`] snapshots that are
//! copies, never views, of the live contents.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use super::events::LogEntry;
use super::serializer::format_all;
use crate::config::defaults::CAPTURE_BUFFER_CAPACITY;

/// A generic circular buffer with fixed capacity.
///
/// When the buffer is full, pushing a new element evicts the oldest one.
/// Elements are stored in chronological order (oldest first).
///
/// # Example
///
/// ```
/// use junebug::diagnostics::CircularBuffer;
///
/// let mut buffer: CircularBuffer<i32> = CircularBuffer::with_capacity(2);
///
/// buffer.push(1);
/// buffer.push(2);
/// buffer.push(3);
///
/// let items: Vec<_> = buffer.iter().copied().collect();
/// assert_eq!(items, vec![2, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct CircularBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    /// Creates a new circular buffer holding at most `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1); // Ensure at least 1
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Pushes an element to the buffer, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Returns an iterator over the elements in chronological order (oldest first).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    /// Returns the number of elements in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the maximum capacity of the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clears all elements from the buffer.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl<T> Default for CircularBuffer<T> {
    fn default() -> Self {
        Self::with_capacity(CAPTURE_BUFFER_CAPACITY)
    }
}

/// Shared handle to the captured diagnostic log.
///
/// Cloning the handle shares the underlying buffer. Each operation holds the
/// lock only for the duration of a push, copy or clear.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<CircularBuffer<LogEntry>>>,
}

static GLOBAL_BUFFER: OnceLock<CaptureBuffer> = OnceLock::new();

impl CaptureBuffer {
    /// Creates an empty buffer with the standard capacity of 100 entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with a custom capacity.
    ///
    /// Mostly useful for tests; the process-wide buffer always uses the
    /// standard capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CircularBuffer::with_capacity(capacity))),
        }
    }

    /// Returns the process-wide buffer fed by [`DiagnosticHook::install_global`].
    ///
    /// [`DiagnosticHook::install_global`]: super::DiagnosticHook::install_global
    pub fn global() -> &'static CaptureBuffer {
        GLOBAL_BUFFER.get_or_init(CaptureBuffer::new)
    }

    fn lock(&self) -> MutexGuard<'_, CircularBuffer<LogEntry>> {
        // A panic while holding the lock cannot leave the ring buffer in a
        // torn state, so the poison flag carries no information here.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an entry, silently evicting the oldest one on overflow.
    pub fn append(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    /// Copies the current contents into an independent snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CapturedLogs {
        let entries: Vec<LogEntry> = self.lock().iter().cloned().collect();
        CapturedLogs::new(entries)
    }

    /// Removes every captured entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been captured (or everything was cleared).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the maximum number of entries kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Returns true if both handles point at the same storage.
    #[must_use]
    pub fn same_as(&self, other: &CaptureBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Immutable copy of the capture buffer taken at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    entries: Arc<[LogEntry]>,
}

impl CapturedLogs {
    /// Wraps an already collected list of entries.
    #[must_use]
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    /// Returns the entries in chronological order.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Renders every entry, separated by blank lines.
    #[must_use]
    pub fn pretty_print(&self) -> String {
        format_all(&self.entries)
    }

    /// Returns an owned copy of the entries.
    #[must_use]
    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.to_vec()
    }
}

impl From<Vec<LogEntry>> for CapturedLogs {
    fn from(entries: Vec<LogEntry>) -> Self {
        Self::new(entries)
    }
}
