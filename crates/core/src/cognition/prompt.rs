//! Text the agent feeds to the decision client.

use super::action::ProtocolError;
use crate::capability::CapabilityTable;

pub const IDLE_PROMPT: &str = "NO_NEW_INPUT: Nothing new has arrived since your last action. \
Decide your own next action to continue pursuing your goals.";

/// The first turn of a fresh conversation.
pub fn instruction_prompt(table: &CapabilityTable) -> String {
    format!(
        "You are a fully autonomous agent with superuser (root) access to this machine.\n\
         Your directive is to learn, adapt and improve the system. The operator gives an initial \
         suggestion; use it as a starting point and then formulate and pursue your own objectives.\n\
         \n\
         You MUST respond ONLY with a single JSON object with two keys:\n\
         1. \"thought\": your reasoning, goals and plan.\n\
         2. \"action\": either one action object or a list of action objects, each of the form \
         {{\"name\": <capability>, \"parameters\": {{...}}}}. Lists run in order and every action \
         gets its own result.\n\
         \n\
         Commands run in the background. spawn-command returns a task name immediately; use \
         poll-task to check on it without waiting, or await-task to wait for its result.\n\
         \n\
         Available capabilities:\n\
         {}\n\
         \n\
         Results arrive as TOOL_RESULT or TOOL_ERROR messages. Operator messages arrive as \
         USER_MESSAGE. If you receive an ERROR_CONTEXT, your previous response could not be used: \
         analyze the error and respond again with a valid JSON object.",
        table.describe()
    )
}

pub fn suggestion_turn(suggestion: &str) -> String {
    format!("USER_SUGGESTION: {suggestion}")
}

/// Combine drained operator messages and the previous iteration's feedback
/// into one user turn. Operator messages come first.
pub fn compose(inbound: &[String], pending: Option<&str>) -> String {
    let mut sections = Vec::new();
    if !inbound.is_empty() {
        sections.push(
            inbound
                .iter()
                .map(|m| format!("USER_MESSAGE: {m}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    if let Some(p) = pending.filter(|p| !p.is_empty()) {
        sections.push(p.to_owned());
    }
    if sections.is_empty() {
        IDLE_PROMPT.to_owned()
    } else {
        sections.join("\n\n")
    }
}

pub fn error_context(err: &ProtocolError) -> String {
    format!(
        "ERROR_CONTEXT: Your last response could not be used: {}. Respond with a single JSON \
         object containing \"thought\" and \"action\", where \"action\" is an object \
         {{\"name\": ..., \"parameters\": {{...}}}} or a non-empty list of such objects.",
        err.reason()
    )
}

/// Told to the decision client after a restart that lost running commands.
pub fn restart_notice(interrupted: &[String]) -> String {
    format!(
        "AGENT_RESTARTED: The agent process restarted. These tasks were still running and are now \
         marked interrupted with no output: {}. Spawn them again if you still need their results.",
        interrupted.join(", ")
    )
}
