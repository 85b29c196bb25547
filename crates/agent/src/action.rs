//! Turning a model reply into the next step of the loop.
//!
//! Backends with native tool calling put requests in `tool_calls`. Smaller
//! local models often write the call into the text instead, either as a bare
//! JSON object or inside a ```json fence. Both are accepted; anything that
//! looks like an attempted call but cannot be read is an [`ActionParseError`].

use serde_json::Value;
use slothtop_core::message::Message;

/// One requested tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Plain text for the user; the turn is over.
    Final(String),
    /// One or more tool calls, in the order given.
    Calls(Vec<ParsedCall>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionParseError {
    #[error("arguments for '{tool}' are not valid JSON: {reason}")]
    Arguments { tool: String, reason: String },

    #[error("tool call has no name")]
    MissingName,

    #[error("expected a JSON object with \"name\" and \"arguments\": {0}")]
    Malformed(String),
}

/// Classify a reply. `round` keeps generated call ids unique within a turn.
pub fn parse_reply(message: &Message, round: u32) -> Result<Action, ActionParseError> {
    if !message.tool_calls.is_empty() {
        return message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(i, tc)| {
                if tc.name.trim().is_empty() {
                    return Err(ActionParseError::MissingName);
                }
                let arguments = parse_arguments(&tc.name, &tc.arguments)?;
                let id = if tc.id.is_empty() {
                    format!("call_{round}_{i}")
                } else {
                    tc.id.clone()
                };
                Ok(ParsedCall {
                    id,
                    name: tc.name.trim().to_string(),
                    arguments,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Action::Calls);
    }

    let text = message.content.trim();
    match embedded_json(text) {
        Some(json) => parse_inline_call(json, round).map(|call| Action::Calls(vec![call])),
        None => Ok(Action::Final(message.content.trim().to_string())),
    }
}

fn parse_arguments(tool: &str, raw: &str) -> Result<Value, ActionParseError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| ActionParseError::Arguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        // some models double-encode the arguments
        Value::String(inner) => parse_arguments(tool, &inner),
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(value),
        other => Err(ActionParseError::Arguments {
            tool: tool.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
    }
}

/// The JSON text of a reply that is an attempted call, if it is one.
fn embedded_json(text: &str) -> Option<&str> {
    if text.starts_with('{') {
        return Some(text);
    }
    let body = text.strip_prefix("```json").or_else(|| text.strip_prefix("```JSON"))?;
    Some(body.trim_end().strip_suffix("```").unwrap_or(body).trim())
}

fn parse_inline_call(json: &str, round: u32) -> Result<ParsedCall, ActionParseError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ActionParseError::Malformed(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ActionParseError::Malformed("not an object".into()))?;

    let name = obj
        .get("name")
        .or_else(|| obj.get("tool"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ActionParseError::MissingName)?;

    let arguments = match obj.get("arguments").or_else(|| obj.get("parameters")) {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(raw)) => parse_arguments(name, raw)?,
        Some(v @ Value::Object(_)) => v.clone(),
        Some(other) => {
            return Err(ActionParseError::Arguments {
                tool: name.to_string(),
                reason: format!("expected an object, got {other}"),
            });
        }
    };

    Ok(ParsedCall {
        id: format!("call_{round}_0"),
        name: name.to_string(),
        arguments,
    })
}
