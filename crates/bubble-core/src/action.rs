//! Parser for inline action directives.
//!
//! The bot can ask the widget to open a follow-up form by embedding a JSON
//! block between `<ACTION>` tags anywhere in its free-text reply:
//!
//! ```text
//! Happy to help!<ACTION>{"type":"lead_capture","fields":["name","email"],"reason":"quote"}</ACTION>
//! ```
//!
//! Only the first complete block of a reply is considered. The tag match is
//! case-insensitive and non-greedy, so a stray second block never widens the
//! captured JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static ACTION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<ACTION>(.*?)</ACTION>").expect("Invalid action block regex")
});

/// Kind of follow-up UI requested by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LeadCapture,
    Appointment,
}

impl ActionKind {
    /// Maps the wire discriminator to a kind. Unknown values yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "lead_capture" => Some(Self::LeadCapture),
            "appointment" => Some(Self::Appointment),
            _ => None,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::LeadCapture => "lead_capture",
            Self::Appointment => "appointment",
        }
    }
}

/// HTML input kind used when rendering a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Email,
    Tel,
    Textarea,
    Date,
    Number,
}

impl InputKind {
    fn from_wire(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "email" => Self::Email,
            "tel" | "phone" => Self::Tel,
            "textarea" => Self::Textarea,
            "date" => Self::Date,
            "number" => Self::Number,
            _ => Self::Text,
        }
    }
}

/// One field of a lead or appointment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub input_kind: InputKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        input_kind: InputKind,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            input_kind,
            required,
        }
    }

    /// Builds a field from a bare name using the standard lead field table.
    ///
    /// Bare-name fields are always required.
    pub fn from_name(name: &str) -> Self {
        let (label, input_kind) = match name {
            "name" => ("Name", InputKind::Text),
            "email" => ("Email", InputKind::Email),
            "phone" => ("Phone", InputKind::Tel),
            "company" => ("Company", InputKind::Text),
            "message" => ("Message", InputKind::Textarea),
            other => (other, InputKind::Text),
        };
        Self::new(name, label, input_kind, true)
    }

    /// Default fields for an appointment request that did not list any.
    pub fn default_appointment_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("name", "Name", InputKind::Text, true),
            FieldSpec::new("email", "Email", InputKind::Email, true),
            FieldSpec::new("phone", "Phone", InputKind::Tel, true),
        ]
    }
}

/// A structured follow-up request extracted from a finished reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDirective {
    pub kind: ActionKind,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Why an action block was not turned into a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionParseError {
    /// The block interior is not valid JSON (or not an object).
    InvalidJson(String),
    /// The `type` discriminator is missing or not one we act on.
    UnknownType(Option<String>),
}

impl std::fmt::Display for ActionParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(err) => write!(f, "invalid action JSON: {err}"),
            Self::UnknownType(Some(kind)) => write!(f, "unknown action type '{kind}'"),
            Self::UnknownType(None) => write!(f, "action block has no type"),
        }
    }
}

impl std::error::Error for ActionParseError {}

/// Returns the interior of the first complete action block, if any.
pub fn find_action_block(content: &str) -> Option<&str> {
    ACTION_BLOCK
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parses the interior of an action block into a directive.
///
/// # Errors
/// Returns `InvalidJson` for malformed JSON and `UnknownType` when the
/// discriminator is absent or unrecognized.
pub fn parse_action_json(body: &str) -> Result<ActionDirective, ActionParseError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|err| ActionParseError::InvalidJson(err.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ActionParseError::InvalidJson(
            "expected a JSON object".to_string(),
        ));
    };

    let type_name = object.get("type").and_then(Value::as_str);
    let kind = type_name
        .and_then(ActionKind::from_wire)
        .ok_or_else(|| ActionParseError::UnknownType(type_name.map(str::to_string)))?;

    let fields = match object.get("fields") {
        Some(Value::Array(items)) => items.iter().filter_map(parse_field).collect(),
        // Absent or null field list: appointments fall back to contact details.
        _ => match kind {
            ActionKind::Appointment => FieldSpec::default_appointment_fields(),
            ActionKind::LeadCapture => Vec::new(),
        },
    };

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);

    Ok(ActionDirective {
        kind,
        fields,
        reason,
    })
}

/// Extracts the first action directive from a finished reply.
///
/// Returns `Ok(None)` when the reply has no complete action block.
///
/// # Errors
/// Returns an `ActionParseError` when a block exists but cannot be used.
pub fn extract_directive(content: &str) -> Result<Option<ActionDirective>, ActionParseError> {
    find_action_block(content)
        .map(parse_action_json)
        .transpose()
}

fn parse_field(item: &Value) -> Option<FieldSpec> {
    match item {
        Value::String(name) => {
            let name = name.trim();
            (!name.is_empty()).then(|| FieldSpec::from_name(name))
        }
        Value::Object(object) => {
            let name = object.get("name").and_then(Value::as_str)?.trim();
            if name.is_empty() {
                return None;
            }
            let label = object
                .get("label")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .unwrap_or(name);
            let input_kind = object
                .get("type")
                .and_then(Value::as_str)
                .map_or(InputKind::Text, InputKind::from_wire);
            let required = object
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Some(FieldSpec::new(name, label, input_kind, required))
        }
        _ => None,
    }
}
