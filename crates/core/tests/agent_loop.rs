//! End-to-end tests of the agent loop against a scripted decision client.
//!
//! Each test drives `Agent::step` directly: collect → decide → dispatch →
//! persist, with real `bash` commands behind the task registry.

use std::path::Path;
use std::sync::Arc;

use steward_core::capability::CapabilityTable;
use steward_core::config::AgentCfg;
use steward_core::io::mailbox::{self, MailboxReceiver, MailboxSender};
use steward_core::io::state_store::StateStore;
use steward_core::runtime::{Agent, AgentParts, StepOutcome};
use steward_core::task::{RegistryLimits, TaskRegistry};
use steward_core::types::{AgentMessage, MessageKind, TurnRole};
use steward_llm::provider::{LlmError, MockProvider};
use tokio_util::sync::CancellationToken;

const IDLE: &str = r#"{"thought":"idle","action":{"name":"list-tasks","parameters":{}}}"#;

fn fast_cfg() -> AgentCfg {
    AgentCfg {
        cooldown_secs: 0,
        retry_attempts: 3,
        retry_base_ms: 1,
        failure_cooldown_secs: 0,
        await_poll_ms: 20,
        ..AgentCfg::default()
    }
}

struct Harness {
    agent: Agent,
    provider: Arc<MockProvider>,
    inbound: MailboxSender<String>,
    outbound: MailboxReceiver<AgentMessage>,
}

fn harness(provider: MockProvider, dir: &Path) -> Harness {
    let cfg = fast_cfg();
    let shutdown = CancellationToken::new();
    let provider = Arc::new(provider);
    let (inbound, inbound_rx) = mailbox::channel(16);
    let (outbound_tx, outbound) = mailbox::channel(64);
    let (agent, _status) = Agent::new(AgentParts {
        registry: Arc::new(TaskRegistry::new(RegistryLimits::from(&cfg), shutdown.clone())),
        cfg: Arc::new(cfg),
        provider: provider.clone(),
        store: StateStore::new(dir),
        capabilities: CapabilityTable::new(),
        conversation: None,
        interrupted: vec![],
        inbound: inbound_rx,
        outbound: outbound_tx,
        shutdown,
    });
    Harness {
        agent,
        provider,
        inbound,
        outbound,
    }
}

async fn turn_count(agent: &Agent) -> usize {
    agent.conversation().lock().await.len()
}

#[tokio::test]
async fn echo_hi_spawn_then_await() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        MockProvider::scripted(
            [
                Ok(r#"{"thought":"run it","action":{"name":"spawn-command","parameters":{"command":"echo hi"}}}"#.to_string()),
                Ok(r#"{"thought":"wait","action":{"name":"await-task","parameters":{"task_name":"task_1"}}}"#.to_string()),
            ],
            IDLE,
        ),
        dir.path(),
    );

    let StepOutcome::Dispatched(first) = h.agent.step().await else {
        panic!("first step should dispatch");
    };
    assert_eq!(first[0].outcome.as_ref().unwrap().split('\'').nth(1), Some("task_1"));

    let StepOutcome::Dispatched(second) = h.agent.step().await else {
        panic!("second step should dispatch");
    };
    let output = second[0].outcome.as_ref().unwrap();
    assert!(output.contains("hi"));
    assert!(!output.contains("COMMAND FAILED"));

    // the spawn result was fed into the second request
    let requests = h.provider.requests();
    let fed_back = &requests[1].messages.last().unwrap().content;
    assert!(fed_back.starts_with("TOOL_RESULT for 'spawn-command':"));
}

#[tokio::test]
async fn malformed_response_yields_exactly_one_error_context() {
    let dir = tempfile::tempdir().unwrap();
    for bad in [
        "not json at all",
        r#"{"thought":"forgot the action"}"#,
        r#"{"action":"spawn-command"}"#,
        r#"{"action":[]}"#,
    ] {
        let mut h = harness(MockProvider::scripted([Ok(bad.to_string())], IDLE), dir.path());
        assert!(matches!(h.agent.step().await, StepOutcome::Malformed(_)), "{bad}");
        assert!(h.agent.pending().unwrap().starts_with("ERROR_CONTEXT: "));

        h.agent.step().await;
        let requests = h.provider.requests();
        let next_prompt = &requests[1].messages.last().unwrap().content;
        assert_eq!(next_prompt.matches("ERROR_CONTEXT").count(), 1);

        let turns = h.agent.conversation().lock().await.clone();
        let contexts = turns
            .iter()
            .filter(|t| t.role == TurnRole::User && t.text().starts_with("ERROR_CONTEXT"))
            .count();
        assert_eq!(contexts, 1);

        let notices: Vec<_> = h
            .outbound
            .drain()
            .into_iter()
            .filter(|m| m.kind == MessageKind::Notice)
            .collect();
        assert_eq!(notices.len(), 1);
    }
}

#[tokio::test]
async fn sleep_and_bogus_give_two_ordered_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        MockProvider::new(
            r#"{"thought":"t","action":[
                {"name":"sleep-seconds","parameters":{"seconds":1}},
                {"name":"bogus","parameters":{}}
            ]}"#,
        ),
        dir.path(),
    );
    let StepOutcome::Dispatched(records) = h.agent.step().await else {
        panic!("expected dispatch");
    };
    assert_eq!(records.len(), 2);
    assert!(records[0].is_ok());
    assert!(records[1].outcome.as_ref().unwrap_err().contains("unknown capability 'bogus'"));
    let pending = h.agent.pending().unwrap();
    assert!(pending.find("TOOL_RESULT for 'sleep-seconds'") < pending.find("TOOL_ERROR for 'bogus'"));
}

#[tokio::test]
async fn k_valid_plus_one_invalid_yields_k_plus_one_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        MockProvider::new(
            r#"{"action":[
                {"name":"spawn-command","parameters":{"command":"true"}},
                {"name":"write-file","parameters":"not a mapping"},
                {"name":"spawn-command","parameters":{"command":"true"}},
                {"name":"list-tasks","parameters":{}}
            ]}"#,
        ),
        dir.path(),
    );
    let StepOutcome::Dispatched(records) = h.agent.step().await else {
        panic!("expected dispatch");
    };
    assert_eq!(records.len(), 4);
    let failed: Vec<usize> = records.iter().filter(|r| !r.is_ok()).map(|r| r.index).collect();
    assert_eq!(failed, [2]);
    assert!(records[2].outcome.as_ref().unwrap().contains("'task_2'"));
    let listing = records[3].outcome.as_ref().unwrap();
    assert!(listing.contains("task_1") && listing.contains("task_2"));
}

#[tokio::test]
async fn transport_failure_records_no_turn_and_replays_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        MockProvider::scripted(
            [
                Err(LlmError::Unavailable("503".into())),
                Err(LlmError::RateLimited),
                Err(LlmError::RequestFailed("connection reset".into())),
            ],
            IDLE,
        ),
        dir.path(),
    );
    let before = turn_count(&h.agent).await;
    h.inbound.post("are you there?".into());

    assert!(matches!(h.agent.step().await, StepOutcome::DecideFailed(LlmError::RequestFailed(_))));
    assert_eq!(h.provider.call_count(), 3);
    assert_eq!(turn_count(&h.agent).await, before);
    assert_eq!(h.agent.status().consecutive_failures, 1);

    // next iteration replays the operator message and succeeds
    assert!(matches!(h.agent.step().await, StepOutcome::Dispatched(_)));
    let turns = h.agent.conversation().lock().await.clone();
    assert_eq!(turns.len(), before + 2);
    assert_eq!(turns[before].text(), "USER_MESSAGE: are you there?");
    assert_eq!(h.agent.status().consecutive_failures, 0);
}

#[tokio::test]
async fn idle_iteration_uses_synthetic_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(MockProvider::new(IDLE), dir.path());
    h.agent.step().await;
    let requests = h.provider.requests();
    let first = &requests[0].messages;
    // bootstrap turns plus the idle prompt
    assert_eq!(first.len(), 3);
    assert!(first[1].content.starts_with("USER_SUGGESTION: "));
    assert!(first[2].content.starts_with("NO_NEW_INPUT"));
    assert!(requests[0].json_response);
}

#[tokio::test]
async fn finish_task_does_not_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        MockProvider::scripted(
            [Ok(r#"{"thought":"done","action":{"name":"finish-task","parameters":{"final_summary":"built site"}}}"#.to_string())],
            IDLE,
        ),
        dir.path(),
    );
    h.agent.step().await;
    assert!(h.agent.pending().unwrap().contains("OBJECTIVE COMPLETED"));
    assert!(matches!(h.agent.step().await, StepOutcome::Dispatched(_)));
    assert_eq!(h.provider.call_count(), 2);
}
