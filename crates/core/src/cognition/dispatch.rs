use std::time::Instant;

use uuid::Uuid;

use super::action::Action;
use crate::capability::{ActionContext, CapabilityTable};

/// Outcome of one action within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    /// 1-based position in the batch.
    pub index: usize,
    pub action: String,
    pub outcome: Result<String, String>,
}

impl ResultRecord {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Feedback text the decision client sees on its next turn.
    pub fn render(&self) -> String {
        match &self.outcome {
            Ok(output) => format!("TOOL_RESULT for '{}':\n{output}", self.action),
            Err(error) => format!(
                "TOOL_ERROR for '{}' (action #{}):\n{error}",
                self.action, self.index
            ),
        }
    }
}

/// Run every action in order. Faults and capability errors become records;
/// nothing here aborts the batch.
pub async fn dispatch(
    actions: &[Action],
    table: &CapabilityTable,
    ctx: &ActionContext,
) -> Vec<ResultRecord> {
    let mut records = Vec::with_capacity(actions.len());
    for (i, action) in actions.iter().enumerate() {
        let index = i + 1;
        let call_id = Uuid::new_v4();
        let outcome = match action.resolve(table) {
            Ok((cap, params)) => {
                tracing::debug!(%call_id, index, capability = cap.name(), params = %serde_json::Value::Object(params.clone()), "dispatching action");
                let started = Instant::now();
                let outcome = cap.execute(&params, ctx).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &outcome {
                    Ok(_) => tracing::info!(%call_id, index, capability = cap.name(), elapsed_ms, "action succeeded"),
                    Err(e) => tracing::warn!(%call_id, index, capability = cap.name(), elapsed_ms, error = %e, "action failed"),
                }
                outcome
            }
            Err(fault) => {
                tracing::warn!(%call_id, index, action = %action.raw(), error = %fault, "action rejected");
                Err(fault.to_string())
            }
        };
        records.push(ResultRecord {
            index,
            action: action.label().to_owned(),
            outcome,
        });
    }
    records
}

/// Join rendered records with a blank line between them.
pub fn render_feedback(records: &[ResultRecord]) -> String {
    records
        .iter()
        .map(ResultRecord::render)
        .collect::<Vec<_>>()
        .join("\n\n")
}
