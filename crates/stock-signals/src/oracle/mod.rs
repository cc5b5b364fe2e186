//! Analysis oracle: prompt in, structured verdict out
//!
//! Backends differ only in transport. All of them hand their raw text to
//! [`parse_reply`] so that extraction behaves the same everywhere.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::OracleError;

pub mod anthropic;
pub mod command;
pub mod parse;

pub use anthropic::AnthropicOracle;
pub use command::{CommandOracle, CommandPreset};
pub use parse::{extract_agent_message, parse_reply};

/// Parsed oracle answer
///
/// `unparsed` is set when no JSON object could be found; `fields` then holds
/// the whole answer under `narrative`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleReply {
    pub fields: Map<String, Value>,
    pub unparsed: bool,
}

impl OracleReply {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields, unparsed: false }
    }

    /// Narrative-only reply for text that held no JSON
    pub fn narrative_only(text: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("narrative".to_string(), Value::String(text.into()));
        fields.insert("parse_error".to_string(), Value::Bool(true));
        Self { fields, unparsed: true }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Numeric field, accepting numbers written as strings
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Non-empty string field
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// List of displayable items; a scalar becomes a one-item list
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(display_value).collect(),
            Some(value) => display_value(value).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.number("score")
    }

    pub fn confidence(&self) -> Option<&str> {
        self.text("confidence")
    }

    pub fn narrative(&self) -> Option<&str> {
        self.text("narrative")
    }
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// Scoring and narrative capability
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, prompt: &str) -> Result<OracleReply, OracleError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn reply(value: Value) -> OracleReply {
        OracleReply::from_fields(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_typed_accessors() {
        let reply = reply(json!({
            "score": "6.5",
            "confidence": " High ",
            "narrative": "",
            "support_levels": [101.5, "99"],
            "stop_loss": 95,
        }));
        assert_eq!(reply.score(), Some(6.5));
        assert_eq!(reply.confidence(), Some("High"));
        assert_eq!(reply.narrative(), None);
        assert_eq!(reply.string_list("support_levels"), vec!["101.5", "99"]);
        assert_eq!(reply.string_list("stop_loss"), vec!["95"]);
        assert!(reply.string_list("missing").is_empty());
    }

    #[test]
    fn test_narrative_only() {
        let reply = OracleReply::narrative_only("plain words");
        assert!(reply.unparsed);
        assert_eq!(reply.narrative(), Some("plain words"));
        assert_eq!(reply.score(), None);
    }
}
