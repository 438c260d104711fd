// SPDX-License-Identifier: MPL-2.0
//! Total string rendering of captured values and log entries.
//!
//! Every function here returns a string for any input. Structured data goes
//! through a JSON conversion that tracks the shared nodes on the current path
//! and the nesting depth; a cycle or runaway depth abandons the conversion
//! and the value is coerced to a generic string instead.

use serde_json::{Map, Value};
use thiserror::Error;

use super::events::LogEntry;
use super::hook::INTERNAL_TARGET;
use super::value::{CapturedValue, ErrorLike, ValueShape};

/// Nesting limit for structured values.
pub const MAX_DEPTH: usize = 64;

/// Placeholder used when a composite value cannot be rendered structurally.
const OBJECT_PLACEHOLDER: &str = "[object Object]";

/// Why a structured rendering was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SerializationFallback {
    #[error("value contains a circular reference")]
    Circular,
    #[error("value is nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
    #[error("JSON rendering failed")]
    Render,
}

/// Renders one captured value.
///
/// - errors: `"<name>: <message>\n<stack>"`
/// - text: verbatim
/// - structured data: JSON with 2-space indentation
/// - opaque values: their stored rendering
///
/// A shared node is rendered by the shape of its content.
#[must_use]
pub fn serialize_value(value: &CapturedValue) -> String {
    match (value.shape(), value) {
        (ValueShape::Textual, CapturedValue::Text(text)) => text.clone(),
        (ValueShape::ErrorLike, CapturedValue::Error(error)) => render_error(error),
        (ValueShape::Opaque, CapturedValue::Opaque(rendered)) => rendered.clone(),
        (_, CapturedValue::Shared(node)) => node.with(|inner| match inner {
            CapturedValue::Text(_) | CapturedValue::Error(_) | CapturedValue::Opaque(_) => {
                serialize_value(inner)
            }
            _ => structured_node(node.id(), inner, true)
                .unwrap_or_else(|reason| fallback(value, reason)),
        }),
        _ => structured(value, true).unwrap_or_else(|reason| fallback(value, reason)),
    }
}

/// Single-line rendering used for `Key: value` lines.
///
/// Text stays verbatim, errors collapse to `"<name>: <message>"` and
/// structured data is emitted as compact JSON.
#[must_use]
pub fn serialize_inline(value: &CapturedValue) -> String {
    match value {
        CapturedValue::Text(text) | CapturedValue::Opaque(text) => text.clone(),
        CapturedValue::Error(error) => error.to_string(),
        CapturedValue::Shared(node) => node.with(|inner| match inner {
            CapturedValue::Text(_) | CapturedValue::Error(_) | CapturedValue::Opaque(_) => {
                serialize_inline(inner)
            }
            _ => structured_node(node.id(), inner, false)
                .unwrap_or_else(|reason| fallback(value, reason)),
        }),
        _ => structured(value, false).unwrap_or_else(|reason| fallback(value, reason)),
    }
}

/// Renders an entry as `"[<timestamp>] <glyph> <LABEL> <values>"`, with the
/// serialized values joined by newlines.
#[must_use]
pub fn format_entry(entry: &LogEntry) -> String {
    let severity = entry.severity();
    let mut line = format!(
        "[{}] {} {}",
        entry.timestamp(),
        severity.glyph(),
        severity.label()
    );
    if !entry.values().is_empty() {
        let values: Vec<String> = entry.values().iter().map(serialize_value).collect();
        line.push(' ');
        line.push_str(&values.join("\n"));
    }
    line
}

/// Renders entries in chronological order, separated by a blank line.
#[must_use]
pub fn format_all(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_error(error: &ErrorLike) -> String {
    match &error.stack {
        Some(stack) => format!("{}: {}\n{stack}", error.name, error.message),
        None => error.to_string(),
    }
}

fn structured(value: &CapturedValue, pretty: bool) -> Result<String, SerializationFallback> {
    render_json(&JsonConverter::default().convert(value, 0)?, pretty)
}

/// Structured rendering of a shared node's content, with the node itself
/// already on the path.
fn structured_node(
    id: usize,
    content: &CapturedValue,
    pretty: bool,
) -> Result<String, SerializationFallback> {
    let mut converter = JsonConverter { path: vec![id] };
    render_json(&converter.convert(content, 1)?, pretty)
}

fn render_json(json: &Value, pretty: bool) -> Result<String, SerializationFallback> {
    let rendered = if pretty {
        serde_json::to_string_pretty(json)
    } else {
        serde_json::to_string(json)
    };
    rendered.map_err(|_| SerializationFallback::Render)
}

fn fallback(value: &CapturedValue, reason: SerializationFallback) -> String {
    tracing::debug!(target: INTERNAL_TARGET, %reason, "falling back to string coercion");
    coerce(value)
}

/// Generic, non-recursive string coercion.
#[must_use]
pub fn coerce(value: &CapturedValue) -> String {
    match value {
        CapturedValue::Null => "null".to_string(),
        CapturedValue::Bool(b) => b.to_string(),
        CapturedValue::Number(n) => n.to_string(),
        CapturedValue::Text(text) | CapturedValue::Opaque(text) => text.clone(),
        CapturedValue::Error(error) => error.to_string(),
        CapturedValue::List(_) | CapturedValue::Map(_) | CapturedValue::Shared(_) => {
            OBJECT_PLACEHOLDER.to_string()
        }
    }
}

/// Converts captured values to JSON, tracking the shared nodes currently
/// being visited. The same node may appear twice in a value as long as it
/// is not its own ancestor.
#[derive(Default)]
struct JsonConverter {
    path: Vec<usize>,
}

impl JsonConverter {
    fn convert(&mut self, value: &CapturedValue, depth: usize) -> Result<Value, SerializationFallback> {
        if depth > MAX_DEPTH {
            return Err(SerializationFallback::TooDeep);
        }

        let json = match value {
            CapturedValue::Null => Value::Null,
            CapturedValue::Bool(b) => Value::Bool(*b),
            CapturedValue::Number(n) => Value::Number(n.clone()),
            CapturedValue::Text(text) | CapturedValue::Opaque(text) => Value::String(text.clone()),
            CapturedValue::Error(error) => Value::String(error.to_string()),
            CapturedValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.convert(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            CapturedValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    map.insert(key.clone(), self.convert(item, depth + 1)?);
                }
                Value::Object(map)
            }
            CapturedValue::Shared(node) => {
                let id = node.id();
                if self.path.contains(&id) {
                    return Err(SerializationFallback::Circular);
                }
                self.path.push(id);
                let converted = node.with(|inner| self.convert(inner, depth + 1));
                self.path.pop();
                converted?
            }
        };
        Ok(json)
    }
}
