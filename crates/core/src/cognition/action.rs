//! Parsing and validation of the decision client's structured output.
//!
//! A response must be one JSON object `{"thought": .., "action": ..}` where
//! `action` is a single descriptor or a non-empty list of them. Shape errors
//! on the envelope reject the whole response; shape errors inside a single
//! descriptor only fault that action.

use serde_json::Value;

use crate::capability::{type_name, Capability, CapabilityTable, Params};

pub const DEFAULT_THOUGHT: &str = "No thought provided.";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{reason}")]
    Malformed { reason: String, raw: String },
}

impl ProtocolError {
    fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::Malformed {
            reason: reason.into(),
            raw: raw.to_owned(),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Malformed { reason, .. } => reason,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::Malformed { raw, .. } => raw,
        }
    }
}

/// Why a single action could not be run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionFault {
    #[error("action must be an object with 'name' and 'parameters', got {0}")]
    NotAnObject(&'static str),
    #[error("action is missing 'name'")]
    MissingName,
    #[error("action 'name' must be a string, got {0}")]
    NameNotString(&'static str),
    #[error("unknown capability '{name}'. Available: {available}")]
    UnknownCapability { name: String, available: String },
    #[error("'parameters' must be an object, got {0}")]
    ParametersNotObject(&'static str),
}

/// One descriptor exactly as the decision client sent it. Validated lazily
/// by [`Action::resolve`] so faults stay per-action.
#[derive(Debug, Clone, PartialEq)]
pub struct Action(Value);

impl Action {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Name for feedback lines; faulty descriptors still need a label.
    pub fn label(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }

    pub fn resolve<'t>(
        &self,
        table: &'t CapabilityTable,
    ) -> Result<(&'t dyn Capability, Params), ActionFault> {
        let obj = match &self.0 {
            Value::Object(obj) => obj,
            other => return Err(ActionFault::NotAnObject(type_name(other))),
        };
        let name = match obj.get("name") {
            None | Some(Value::Null) => return Err(ActionFault::MissingName),
            Some(Value::String(s)) => s.as_str(),
            Some(other) => return Err(ActionFault::NameNotString(type_name(other))),
        };
        let cap = table
            .get(name)
            .ok_or_else(|| ActionFault::UnknownCapability {
                name: name.to_owned(),
                available: table.names().join(", "),
            })?;
        let params = match obj.get("parameters") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(p)) => p.clone(),
            Some(other) => return Err(ActionFault::ParametersNotObject(type_name(other))),
        };
        Ok((cap, params))
    }
}

/// A parsed response: the reasoning text plus at least one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub thought: String,
    pub actions: Vec<Action>,
}

pub fn parse(raw: &str) -> Result<Decision, ProtocolError> {
    let candidate = extract_object(raw).ok_or_else(|| {
        if raw.trim().is_empty() {
            ProtocolError::malformed("response is empty", raw)
        } else {
            ProtocolError::malformed("response contains no JSON object", raw)
        }
    })?;

    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| ProtocolError::malformed(format!("invalid JSON: {e}"), raw))?;
    let Value::Object(mut envelope) = value else {
        return Err(ProtocolError::malformed("response is not a JSON object", raw));
    };

    let thought = match envelope.remove("thought") {
        None | Some(Value::Null) => DEFAULT_THOUGHT.to_owned(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };

    let actions = match envelope.remove("action") {
        None | Some(Value::Null) => {
            return Err(ProtocolError::malformed("response has no 'action' field", raw));
        }
        Some(obj @ Value::Object(_)) => vec![Action(obj)],
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(ProtocolError::malformed("'action' list is empty", raw));
        }
        Some(Value::Array(items)) => items.into_iter().map(Action).collect(),
        Some(other) => {
            return Err(ProtocolError::malformed(
                format!(
                    "'action' must be an object or a list of objects, got {}",
                    type_name(&other)
                ),
                raw,
            ));
        }
    };

    Ok(Decision { thought, actions })
}

/// Strip an optional Markdown fence and surrounding prose, leaving the span
/// from the first `{` to the last `}`.
fn extract_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

pub(crate) fn preview(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}
