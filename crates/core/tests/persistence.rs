//! Restart behaviour: snapshot from one agent, restore into the next.

use std::sync::Arc;

use steward_core::capability::CapabilityTable;
use steward_core::config::AgentCfg;
use steward_core::io::mailbox;
use steward_core::io::state_store::StateStore;
use steward_core::runtime::{Agent, AgentParts};
use steward_core::task::{PollStatus, RegistryLimits, TaskRegistry};
use steward_core::types::{TaskStatus, INTERRUPTED_RESULT};
use steward_llm::provider::MockProvider;
use tokio_util::sync::CancellationToken;

fn cfg() -> AgentCfg {
    AgentCfg {
        cooldown_secs: 0,
        retry_base_ms: 1,
        await_poll_ms: 20,
        ..AgentCfg::default()
    }
}

fn agent(
    reply: &str,
    store: StateStore,
    registry: Arc<TaskRegistry>,
    conversation: Option<Vec<steward_core::types::Turn>>,
    interrupted: Vec<String>,
    shutdown: CancellationToken,
) -> (Agent, Arc<MockProvider>) {
    let provider = Arc::new(MockProvider::new(reply));
    let (_inbound_tx, inbound) = mailbox::channel(4);
    let (outbound, _outbound_rx) = mailbox::channel(16);
    let (agent, _status) = Agent::new(AgentParts {
        cfg: Arc::new(cfg()),
        provider: provider.clone(),
        store,
        registry,
        capabilities: CapabilityTable::new(),
        conversation,
        interrupted,
        inbound,
        outbound,
        shutdown,
    });
    (agent, provider)
}

#[tokio::test]
async fn restart_interrupts_running_tasks_and_keeps_history() {
    let dir = tempfile::tempdir().unwrap();
    let limits = RegistryLimits::from(&cfg());

    // first life: one quick task, one long-running task
    let shutdown = CancellationToken::new();
    let registry = Arc::new(TaskRegistry::new(limits.clone(), shutdown.clone()));
    let (mut first, _) = agent(
        r#"{"thought":"start","action":[
            {"name":"spawn-command","parameters":{"command":"echo done"}},
            {"name":"spawn-command","parameters":{"command":"sleep 30"}}
        ]}"#,
        StateStore::new(dir.path()),
        Arc::clone(&registry),
        None,
        vec![],
        shutdown.clone(),
    );
    first.step().await;
    registry.await_completion("task_1").await.unwrap();
    first.persist().await;
    let history = first.conversation().lock().await.clone();
    registry.terminate_all().await;

    // second life
    let restored = StateStore::new(dir.path()).restore().unwrap();
    assert_eq!(restored.conversation.as_deref(), Some(history.as_slice()));
    assert_eq!(restored.interrupted, vec!["task_2".to_string()]);
    assert_eq!(restored.tasks["task_1"].status, TaskStatus::Finished);
    assert_eq!(restored.tasks["task_2"].status, TaskStatus::Interrupted);

    let shutdown = CancellationToken::new();
    let registry = Arc::new(TaskRegistry::restore(restored.tasks, limits, shutdown.clone()));
    assert_eq!(
        registry.poll("task_2").await.unwrap(),
        PollStatus::Done(INTERRUPTED_RESULT.to_owned())
    );
    match registry.poll("task_1").await.unwrap() {
        PollStatus::Done(result) => assert!(result.contains("done")),
        PollStatus::Running => panic!("finished task came back running"),
    }

    let (mut second, provider) = agent(
        r#"{"thought":"again","action":{"name":"spawn-command","parameters":{"command":"true"}}}"#,
        StateStore::new(dir.path()),
        Arc::clone(&registry),
        restored.conversation,
        restored.interrupted,
        shutdown,
    );
    second.step().await;

    // no bootstrap on restore; the restart notice goes out first
    let sent = provider.requests();
    assert_eq!(sent[0].messages.len(), history.len() + 1);
    assert!(sent[0].messages.last().unwrap().content.contains("task_2"));
    // fresh names never collide with restored ones
    assert!(registry.snapshot().await.contains_key("task_3"));
}
