// SPDX-License-Identifier: MPL-2.0
//! Values captured from diagnostic calls.
//!
//! A diagnostic call can carry anything: plain text, numbers, errors, nested
//! records or whole object graphs. [`CapturedValue`] keeps that shape so the
//! serializer can decide how to render each argument later, when a report
//! is composed.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::Serialize;

/// How a value is rendered by the serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Plain text, emitted verbatim.
    Textual,
    /// Something with a name, a message and possibly a trace.
    ErrorLike,
    /// Scalars and composite data, pretty-printed as JSON.
    Structured,
    /// A pre-rendered value that cannot be introspected.
    Opaque,
}

/// An error captured by name, message and stack-like trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLike {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorLike {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Captures a Rust error. The name is the error's type name without its
    /// module path; the stack lists the `source()` chain, if any.
    #[must_use]
    pub fn from_error<E: StdError + ?Sized>(error: &E) -> Self {
        let mut captured = Self::new(short_type_name::<E>(), error.to_string());
        captured.stack = source_chain(error.source());
        captured
    }

    /// Captures a type-erased error, as handed out by `tracing` field visitors.
    #[must_use]
    pub fn from_dyn(error: &(dyn StdError + 'static)) -> Self {
        let mut captured = Self::new("Error", error.to_string());
        captured.stack = source_chain(error.source());
        captured
    }
}

impl fmt::Display for ErrorLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim_start_matches("dyn ")
        .to_string()
}

fn source_chain(mut source: Option<&(dyn StdError + 'static)>) -> Option<String> {
    let mut lines = Vec::new();
    while let Some(cause) = source {
        lines.push(format!("    caused by: {cause}"));
        source = cause.source();
    }
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// A shared node in a captured object graph.
///
/// Clones point at the same node, so a node can (directly or through other
/// nodes) contain itself. Such cycles are never freed; they are meant for
/// short-lived diagnostic values.
///
/// Nodes start out live and can be rewritten with [`set`](Self::set). When a
/// value is stored in a [`LogEntry`](super::LogEntry) every live node it
/// reaches is replaced by a frozen copy, which keeps the graph's shape
/// (cycles included) but can no longer change.
#[derive(Clone)]
pub struct SharedValue(Arc<Node>);

enum Node {
    Live(RwLock<CapturedValue>),
    /// Filled exactly once while the copy is built.
    Frozen(OnceLock<CapturedValue>),
}

impl SharedValue {
    #[must_use]
    pub fn new(value: CapturedValue) -> Self {
        Self(Arc::new(Node::Live(RwLock::new(value))))
    }

    /// Replaces the node's content. Frozen nodes are left untouched and
    /// return `false`.
    pub fn set(&self, value: CapturedValue) -> bool {
        match &*self.0 {
            Node::Live(lock) => {
                *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
                true
            }
            Node::Frozen(_) => false,
        }
    }

    /// Runs `f` against the node's current content.
    pub fn with<R>(&self, f: impl FnOnce(&CapturedValue) -> R) -> R {
        match &*self.0 {
            Node::Live(lock) => {
                let guard = lock.read().unwrap_or_else(PoisonError::into_inner);
                f(&guard)
            }
            Node::Frozen(cell) => match cell.get() {
                Some(value) => f(value),
                None => f(&CapturedValue::Null),
            },
        }
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        matches!(&*self.0, Node::Frozen(_))
    }

    /// Identity of the node, stable for its lifetime.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Frozen copy of this node. `copies` maps live node ids to the copies
    /// already made, so shared and cyclic references keep pointing at one
    /// copy.
    fn frozen_copy(&self, copies: &mut HashMap<usize, SharedValue>) -> SharedValue {
        if self.is_frozen() {
            return self.clone();
        }
        if let Some(copy) = copies.get(&self.id()) {
            return copy.clone();
        }

        let copy = SharedValue(Arc::new(Node::Frozen(OnceLock::new())));
        copies.insert(self.id(), copy.clone());
        let content = self.with(|inner| inner.clone().freeze_with(copies));
        if let Node::Frozen(cell) = &*copy.0 {
            let _ = cell.set(content);
        }
        copy
    }
}

impl fmt::Debug for SharedValue {
    // Never descend: the node may be part of a cycle.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedValue({:#x})", self.id())
    }
}

/// One argument of a diagnostic call.
#[derive(Debug, Clone)]
pub enum CapturedValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<CapturedValue>),
    /// Keyed data; keys keep their insertion order.
    Map(Vec<(String, CapturedValue)>),
    Error(ErrorLike),
    Shared(SharedValue),
    Opaque(String),
}

impl CapturedValue {
    /// Classifies the value before serialization.
    #[must_use]
    pub fn shape(&self) -> ValueShape {
        match self {
            Self::Text(_) => ValueShape::Textual,
            Self::Error(_) => ValueShape::ErrorLike,
            Self::Opaque(_) => ValueShape::Opaque,
            Self::Null
            | Self::Bool(_)
            | Self::Number(_)
            | Self::List(_)
            | Self::Map(_)
            | Self::Shared(_) => ValueShape::Structured,
        }
    }

    /// Captures any serializable value as structured data.
    ///
    /// Values that serde refuses to serialize are kept as an opaque note so
    /// capture itself never fails.
    pub fn serialized<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::from(json),
            Err(err) => Self::Opaque(format!("<unserializable value: {err}>")),
        }
    }

    /// Captures a value through its `Debug` rendering.
    pub fn debug<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Self::Opaque(format!("{value:?}"))
    }

    /// Captures an error value.
    pub fn error<E: StdError + ?Sized>(error: &E) -> Self {
        Self::Error(ErrorLike::from_error(error))
    }

    /// Builds a map value from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<CapturedValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Replaces every live shared node reachable from `values` with a
    /// frozen copy. A node referenced from several values, or from itself,
    /// is copied once.
    #[must_use]
    pub fn freeze_all(values: Vec<CapturedValue>) -> Vec<CapturedValue> {
        let mut copies = HashMap::new();
        values
            .into_iter()
            .map(|value| value.freeze_with(&mut copies))
            .collect()
    }

    fn freeze_with(self, copies: &mut HashMap<usize, SharedValue>) -> Self {
        match self {
            Self::List(items) => Self::List(
                items
                    .into_iter()
                    .map(|item| item.freeze_with(copies))
                    .collect(),
            ),
            Self::Map(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, item.freeze_with(copies)))
                    .collect(),
            ),
            Self::Shared(node) => Self::Shared(node.frozen_copy(copies)),
            other => other,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for CapturedValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CapturedValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for CapturedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CapturedValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for CapturedValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for CapturedValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for CapturedValue {
    /// Non-finite numbers have no JSON form and become `Null`.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<ErrorLike> for CapturedValue {
    fn from(value: ErrorLike) -> Self {
        Self::Error(value)
    }
}

impl From<SharedValue> for CapturedValue {
    fn from(value: SharedValue) -> Self {
        Self::Shared(value)
    }
}

impl<T: Into<CapturedValue>> From<Option<T>> for CapturedValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<CapturedValue>> From<Vec<T>> for CapturedValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for CapturedValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}
