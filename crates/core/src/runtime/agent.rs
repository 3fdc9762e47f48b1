use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::loop_control::{backoff_delay, pause};
use crate::capability::{ActionContext, CapabilityTable};
use crate::cognition::action::{self, preview, ProtocolError};
use crate::cognition::dispatch::{dispatch, render_feedback, ResultRecord};
use crate::cognition::prompt;
use crate::config::AgentCfg;
use crate::io::mailbox::{MailboxReceiver, MailboxSender};
use crate::io::state_store::StateStore;
use crate::task::TaskRegistry;
use crate::types::{AgentMessage, AgentStatus, Phase, Turn, TurnRole};
use steward_llm::provider::{ChatMessage, CompletionRequest, LlmError, LlmProvider, Role};

/// Everything the agent loop needs, assembled by the caller.
pub struct AgentParts {
    pub cfg: Arc<AgentCfg>,
    pub provider: Arc<dyn LlmProvider>,
    pub store: StateStore,
    pub registry: Arc<TaskRegistry>,
    pub capabilities: CapabilityTable,
    /// `None` seeds a fresh bootstrap conversation.
    pub conversation: Option<Vec<Turn>>,
    /// Tasks found running in persisted state; reported on the first turn.
    pub interrupted: Vec<String>,
    pub inbound: MailboxReceiver<String>,
    pub outbound: MailboxSender<AgentMessage>,
    pub shutdown: CancellationToken,
}

/// What one iteration did.
#[derive(Debug)]
pub enum StepOutcome {
    Dispatched(Vec<ResultRecord>),
    Malformed(ProtocolError),
    /// Every attempt failed; nothing was recorded and the input is carried over.
    DecideFailed(LlmError),
    Cancelled,
}

enum DecideFailure {
    Llm(LlmError),
    Cancelled,
}

pub struct Agent {
    cfg: Arc<AgentCfg>,
    provider: Arc<dyn LlmProvider>,
    store: StateStore,
    registry: Arc<TaskRegistry>,
    capabilities: CapabilityTable,
    ctx: ActionContext,
    /// Guarded only around the decide call and snapshotting.
    conversation: Arc<Mutex<Vec<Turn>>>,
    inbound: MailboxReceiver<String>,
    outbound: MailboxSender<AgentMessage>,
    /// Operator messages drained before a failed decide, replayed next time.
    carried_inbound: Vec<String>,
    /// Feedback from the previous iteration, sent with the next prompt.
    pending: Option<String>,
    iteration: u64,
    consecutive_failures: u32,
    status_tx: watch::Sender<AgentStatus>,
    shutdown: CancellationToken,
}

impl Agent {
    pub fn new(parts: AgentParts) -> (Self, watch::Receiver<AgentStatus>) {
        let AgentParts {
            cfg,
            provider,
            store,
            registry,
            capabilities,
            conversation,
            interrupted,
            inbound,
            outbound,
            shutdown,
        } = parts;

        let conversation = conversation.unwrap_or_else(|| {
            tracing::info!("no saved conversation, seeding bootstrap turns");
            vec![
                Turn::user(prompt::instruction_prompt(&capabilities)),
                Turn::user(prompt::suggestion_turn(&cfg.suggestion)),
            ]
        });
        let pending = (!interrupted.is_empty()).then(|| prompt::restart_notice(&interrupted));

        let ctx = ActionContext {
            registry: Arc::clone(&registry),
            outbound: outbound.clone(),
            cfg: Arc::clone(&cfg),
            shutdown: shutdown.clone(),
        };
        let (status_tx, status_rx) = watch::channel(AgentStatus::default());

        let agent = Self {
            cfg,
            provider,
            store,
            registry,
            capabilities,
            ctx,
            conversation: Arc::new(Mutex::new(conversation)),
            inbound,
            outbound,
            carried_inbound: Vec::new(),
            pending,
            iteration: 0,
            consecutive_failures: 0,
            status_tx,
            shutdown,
        };
        (agent, status_rx)
    }

    pub fn conversation(&self) -> Arc<Mutex<Vec<Turn>>> {
        Arc::clone(&self.conversation)
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn status(&self) -> AgentStatus {
        *self.status_tx.borrow()
    }

    /// Run iterations until shutdown, then write a final snapshot and kill
    /// whatever is still running.
    pub async fn run(&mut self) {
        tracing::info!(provider = self.provider.name(), "agent loop started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let pause_for = match self.step().await {
                StepOutcome::Cancelled => break,
                StepOutcome::DecideFailed(_) => self.cfg.failure_cooldown(),
                StepOutcome::Dispatched(_) | StepOutcome::Malformed(_) => self.cfg.cooldown(),
            };
            self.set_phase(Phase::CoolingDown);
            if !pause(pause_for, &self.shutdown).await {
                break;
            }
        }
        self.finish().await;
    }

    /// One collect → decide → dispatch → persist pass. No cooldown.
    pub async fn step(&mut self) -> StepOutcome {
        self.iteration += 1;
        self.status_tx.send_modify(|s| s.iteration = self.iteration);
        self.set_phase(Phase::Collecting);

        let mut inbound = std::mem::take(&mut self.carried_inbound);
        inbound.extend(self.inbound.drain());
        let pending = self.pending.take();
        if !inbound.is_empty() {
            tracing::info!(count = inbound.len(), "operator messages collected");
        }
        let user_text = prompt::compose(&inbound, pending.as_deref());

        self.set_phase(Phase::Deciding);
        let raw = match self.decide(&user_text).await {
            Ok(raw) => raw,
            Err(failure) => {
                // nothing was recorded; replay the same input next time
                self.carried_inbound = inbound;
                self.pending = pending;
                return match failure {
                    DecideFailure::Cancelled => StepOutcome::Cancelled,
                    DecideFailure::Llm(e) => {
                        self.consecutive_failures += 1;
                        self.status_tx
                            .send_modify(|s| s.consecutive_failures = self.consecutive_failures);
                        tracing::error!(
                            error = %e,
                            consecutive_failures = self.consecutive_failures,
                            cooldown_secs = self.cfg.failure_cooldown_secs,
                            "decision failed, entering failure cooldown"
                        );
                        self.outbound.post(AgentMessage::notice(format!(
                            "decision client failed: {e}; retrying after {}s",
                            self.cfg.failure_cooldown_secs
                        )));
                        StepOutcome::DecideFailed(e)
                    }
                };
            }
        };
        self.consecutive_failures = 0;
        self.status_tx.send_modify(|s| s.consecutive_failures = 0);

        self.set_phase(Phase::Dispatching);
        let outcome = match action::parse(&raw) {
            Ok(decision) => {
                tracing::info!(
                    iteration = self.iteration,
                    actions = decision.actions.len(),
                    thought = %preview(&decision.thought, 160),
                    "decision received"
                );
                self.outbound.post(AgentMessage::thought(decision.thought.clone()));
                let records = dispatch(&decision.actions, &self.capabilities, &self.ctx).await;
                self.pending = Some(render_feedback(&records));
                StepOutcome::Dispatched(records)
            }
            Err(err) => {
                tracing::warn!(
                    iteration = self.iteration,
                    reason = %err.reason(),
                    raw = %preview(err.raw(), 240),
                    "malformed decision"
                );
                self.outbound
                    .post(AgentMessage::notice(format!("unusable response: {}", err.reason())));
                self.pending = Some(prompt::error_context(&err));
                StepOutcome::Malformed(err)
            }
        };

        if self.iteration % self.cfg.snapshot_every.max(1) == 0 {
            self.persist().await;
        }
        let running = self.registry.running_count().await;
        self.status_tx.send_modify(|s| s.running_tasks = running);
        outcome
    }

    /// Ask the decision client, retrying transient failures with backoff.
    /// On success the user turn and the model turn are appended together.
    async fn decide(&mut self, user_text: &str) -> Result<String, DecideFailure> {
        let attempts = self.cfg.retry_attempts.max(1);
        let mut last_error = LlmError::EmptyResponse;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.cfg.retry_base(), attempt - 1);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                self.set_phase(Phase::BackingOff);
                if !pause(delay, &self.shutdown).await {
                    return Err(DecideFailure::Cancelled);
                }
                self.set_phase(Phase::Deciding);
            }

            let mut conversation = self.conversation.lock().await;
            let request = build_request(&conversation, user_text, &self.cfg);
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(DecideFailure::Cancelled),
                r = self.provider.complete(request) => r,
            };

            match result {
                Ok(response) => {
                    tracing::debug!(
                        input_tokens = response.input_tokens,
                        output_tokens = response.output_tokens,
                        "decision client responded"
                    );
                    conversation.push(Turn::user(user_text));
                    conversation.push(Turn::model(response.content.clone()));
                    return Ok(response.content);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(error = %e, "decision request rejected, not retrying");
                    return Err(DecideFailure::Llm(e));
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, attempts, error = %e, "decision request failed");
                    last_error = e;
                }
            }
        }
        Err(DecideFailure::Llm(last_error))
    }

    /// Write conversation and task views. Failures are logged, never fatal.
    pub async fn persist(&self) {
        let conversation = self.conversation.lock().await.clone();
        let tasks = self.registry.snapshot().await;
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.snapshot(&conversation, &tasks)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "state snapshot failed"),
            Err(e) => tracing::warn!(error = %e, "state snapshot task failed"),
        }
    }

    async fn finish(&mut self) {
        tracing::info!(iteration = self.iteration, "agent loop stopping");
        self.persist().await;
        self.registry.terminate_all().await;
        self.status_tx.send_modify(|s| {
            s.phase = Phase::Stopped;
            s.running_tasks = 0;
        });
    }

    fn set_phase(&self, phase: Phase) {
        self.status_tx.send_modify(|s| s.phase = phase);
    }
}

/// Whole conversation plus the new user turn, mapped to chat messages.
fn build_request(conversation: &[Turn], user_text: &str, cfg: &AgentCfg) -> CompletionRequest {
    let mut messages: Vec<ChatMessage> = conversation
        .iter()
        .map(|turn| {
            let role = match turn.role {
                TurnRole::User => Role::User,
                TurnRole::Model => Role::Assistant,
            };
            ChatMessage::new(role, turn.text())
        })
        .collect();
    messages.push(ChatMessage::user(user_text));
    CompletionRequest {
        messages,
        max_tokens: cfg.max_tokens,
        temperature: cfg.temperature,
        json_response: true,
    }
}
