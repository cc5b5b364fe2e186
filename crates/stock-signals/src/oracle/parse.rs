//! Extraction of JSON verdicts from free-form oracle output

use serde_json::{Map, Value};

use super::OracleReply;

fn as_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Body of the first fenced block, optionally requiring a language tag
fn fenced_block<'a>(text: &'a str, language: Option<&str>) -> Option<&'a str> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        // A fence closed on its opening line has no tag
        let (tag, body) = match (after.find('\n'), after.find("```")) {
            (Some(line_end), Some(close)) if line_end < close => (after[..line_end].trim(), &after[line_end + 1..]),
            _ => ("", after),
        };
        let close = body.find("```")?;
        if language.is_none_or(|lang| tag.eq_ignore_ascii_case(lang)) {
            return Some(&body[..close]);
        }
        rest = &body[close + 3..];
    }
    None
}

/// Outermost `{ ... }` span
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Turn raw oracle text into a reply
///
/// Tries, in order: the whole text, a ```json block, any fenced block, the
/// outermost brace span. Text without a JSON object becomes a narrative-only
/// reply.
pub fn parse_reply(text: &str) -> OracleReply {
    let candidates = [
        Some(text),
        fenced_block(text, Some("json")),
        fenced_block(text, None),
        brace_span(text),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(as_object)
        .map_or_else(|| OracleReply::narrative_only(text.trim()), OracleReply::from_fields)
}

/// Final agent message from a JSON-lines event transcript
///
/// Returns `None` when the text is not a transcript or holds no agent message.
pub fn extract_agent_message(transcript: &str) -> Option<String> {
    let mut last = None;
    for line in transcript.lines() {
        let Ok(event) = serde_json::from_str::<Value>(line.trim()) else {
            continue;
        };
        let text = match event.get("type").and_then(Value::as_str) {
            Some("item.completed") => event
                .get("item")
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("agent_message"))
                .and_then(|item| item.get("text")),
            // opencode --format json
            Some("text") => event.get("part").and_then(|part| part.get("text")),
            _ => None,
        };
        if let Some(text) = text.and_then(Value::as_str) {
            last = Some(text.trim().to_string());
        }
    }
    last
}
