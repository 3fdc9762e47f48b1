use super::Capability;
use crate::capability::{str_param, ActionContext, Params};
use crate::types::AgentMessage;

pub struct SendUserMessage;
pub struct FinishTask;

#[async_trait::async_trait]
impl Capability for SendUserMessage {
    fn name(&self) -> &'static str {
        "send-user-message"
    }

    fn description(&self) -> &'static str {
        "Show a message to the human operator watching the terminal."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("message", "Text to show")]
    }

    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let message = str_param(params, "message")?;
        if ctx.outbound.post(AgentMessage::reply(message)) {
            Ok("Message delivered to the user.".to_owned())
        } else {
            Err("the user message queue is full or closed; message dropped".to_owned())
        }
    }
}

/// Advisory only: acknowledges the objective and lets the loop keep going.
#[async_trait::async_trait]
impl Capability for FinishTask {
    fn name(&self) -> &'static str {
        "finish-task"
    }

    fn description(&self) -> &'static str {
        "Call when a self-defined objective has been completed. The loop continues afterwards."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("final_summary", "What was accomplished")]
    }

    async fn execute(&self, params: &Params, _ctx: &ActionContext) -> Result<String, String> {
        let summary = str_param(params, "final_summary")?;
        tracing::info!(summary = %summary, "objective reported complete");
        Ok(format!(
            "OBJECTIVE COMPLETED. Summary: {summary}. You may now formulate a new goal."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{context, params};
    use crate::types::MessageKind;
    use serde_json::json;

    #[tokio::test]
    async fn message_reaches_outbound_queue() {
        let (ctx, mut rx) = context();
        SendUserMessage
            .execute(&params(json!({"message": "hello operator"})), &ctx)
            .await
            .unwrap();
        let msgs = rx.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind, MessageKind::Reply);
        assert_eq!(msgs[0].content, "hello operator");
    }

    #[tokio::test]
    async fn closed_queue_is_reported() {
        let (ctx, rx) = context();
        drop(rx);
        assert!(SendUserMessage
            .execute(&params(json!({"message": "anyone?"})), &ctx)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn finish_task_acknowledges() {
        let (ctx, _rx) = context();
        let out = FinishTask
            .execute(&params(json!({"final_summary": "site is up"})), &ctx)
            .await
            .unwrap();
        assert_eq!(
            out,
            "OBJECTIVE COMPLETED. Summary: site is up. You may now formulate a new goal."
        );
    }
}
