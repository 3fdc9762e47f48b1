//! Named operations the decision client may invoke.
//!
//! Every capability takes a JSON parameter mapping and answers with either a
//! result string or a descriptive error string. Failures never propagate as
//! Rust errors past this boundary; the dispatcher records them per action.

pub mod builtin;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::AgentCfg;
use crate::io::mailbox::MailboxSender;
use crate::task::TaskRegistry;
use crate::types::AgentMessage;

pub use builtin::{Capability, CapabilityTable};

pub type Params = Map<String, Value>;

/// Shared state handed to every capability invocation.
#[derive(Clone)]
pub struct ActionContext {
    pub registry: Arc<TaskRegistry>,
    pub outbound: MailboxSender<AgentMessage>,
    pub cfg: Arc<AgentCfg>,
    pub shutdown: CancellationToken,
}

/// Required string parameter.
pub fn str_param<'a>(params: &'a Params, key: &str) -> Result<&'a str, String> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!(
            "parameter '{key}' must be a string, got {}",
            type_name(other)
        )),
        None => Err(format!("missing required parameter '{key}'")),
    }
}

/// Required numeric parameter. Numeric strings ("1.5") are accepted too.
pub fn f64_param(params: &Params, key: &str) -> Result<f64, String> {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| format!("parameter '{key}' is not representable as a number")),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| format!("parameter '{key}' must be a number, got \"{s}\"")),
        Some(other) => Err(format!(
            "parameter '{key}' must be a number, got {}",
            type_name(other)
        )),
        None => Err(format!("missing required parameter '{key}'")),
    }
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::io::mailbox::{self, MailboxReceiver};
    use crate::task::RegistryLimits;
    use std::time::Duration;

    pub(crate) fn fast_cfg() -> AgentCfg {
        AgentCfg {
            await_poll_ms: 20,
            max_sleep_secs: 5,
            ..AgentCfg::default()
        }
    }

    /// Context over a fresh registry; the receiver sees what capabilities post.
    pub(crate) fn context() -> (ActionContext, MailboxReceiver<AgentMessage>) {
        let cfg = fast_cfg();
        let shutdown = CancellationToken::new();
        let limits = RegistryLimits {
            await_poll: Duration::from_millis(20),
            ..RegistryLimits::from(&cfg)
        };
        let (outbound, rx) = mailbox::channel(16);
        let ctx = ActionContext {
            registry: Arc::new(TaskRegistry::new(limits, shutdown.clone())),
            outbound,
            cfg: Arc::new(cfg),
            shutdown,
        };
        (ctx, rx)
    }

    pub(crate) fn params(v: Value) -> Params {
        match v {
            Value::Object(m) => m,
            other => panic!("test params must be an object, got {other}"),
        }
    }
}
