//! Formatting utilities for CLI output.

use zbus::zvariant::Value;

use crate::object_manager::ObjectEvent;

/// ANSI color codes for terminal output
pub struct Colors;

impl Colors {
    /// Reset all formatting
    pub const RESET: &'static str = "\x1b[0m";
    /// Bold text
    pub const BOLD: &'static str = "\x1b[1m";
    /// Dim text
    pub const DIM: &'static str = "\x1b[2m";
    /// Red color
    pub const RED: &'static str = "\x1b[31m";
    /// Green color
    pub const GREEN: &'static str = "\x1b[32m";
    /// Yellow color
    pub const YELLOW: &'static str = "\x1b[33m";
    /// Cyan color
    pub const CYAN: &'static str = "\x1b[36m";
}

/// Formats section headers with styling
pub fn format_header(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::CYAN, text, Colors::RESET)
}

/// Formats error messages with red styling
pub fn format_error(text: &str) -> String {
    format!("{}{}{}{}", Colors::BOLD, Colors::RED, text, Colors::RESET)
}

/// Formats one `name = value` line.
pub fn format_property(name: &str, value: &Value<'_>) -> String {
    format!(
        "  {}{}{} = {}",
        Colors::BOLD,
        name,
        Colors::RESET,
        format_value(value)
    )
}

/// Formats an invalidated property.
pub fn format_invalidated(name: &str) -> String {
    format!("  {}{name} (invalidated){}", Colors::DIM, Colors::RESET)
}

/// Formats an object-manager event as `+ path [interfaces]` or
/// `- path [interfaces]`.
pub fn format_object_event(event: &ObjectEvent) -> String {
    match event {
        ObjectEvent::Added { path, interfaces } => {
            let mut names: Vec<_> = interfaces.keys().map(String::as_str).collect();
            names.sort_unstable();
            format!(
                "{}+{} {} [{}]",
                Colors::GREEN,
                Colors::RESET,
                path.as_str(),
                names.join(", ")
            )
        }
        ObjectEvent::Removed { path, interfaces } => format!(
            "{}-{} {} [{}]",
            Colors::YELLOW,
            Colors::RESET,
            path.as_str(),
            interfaces.join(", ")
        ),
    }
}

/// Formats a D-Bus value for human-readable CLI output.
///
/// Scalars and arrays are printed in full; dictionaries, structures and
/// other containers show their signature only.
///
/// # Examples
///
/// ```
/// use bluez_props::cli::formatting::format_value;
/// use zbus::zvariant::Value;
///
/// assert_eq!(format_value(&Value::from("hello")), "\"hello\"");
/// assert_eq!(format_value(&Value::from(42u8)), "42");
/// ```
pub fn format_value(value: &Value<'_>) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::U8(n) => n.to_string(),
        Value::I16(n) => n.to_string(),
        Value::U16(n) => n.to_string(),
        Value::I32(n) => n.to_string(),
        Value::U32(n) => n.to_string(),
        Value::I64(n) => n.to_string(),
        Value::U64(n) => n.to_string(),
        Value::F64(n) => n.to_string(),
        Value::Str(s) => format!("\"{}\"", s.as_str()),
        Value::ObjectPath(path) => path.as_str().to_string(),
        Value::Array(array) => {
            let items: Vec<_> = array.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Value(inner) => format_value(inner),
        other => format!("<{}>", other.value_signature()),
    }
}
