mod event;
mod tui;
mod widgets;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use steward_core::capability::CapabilityTable;
use steward_core::config::AgentCfg;
use steward_core::io::diagnostics::DiagnosticLog;
use steward_core::io::mailbox;
use steward_core::io::state_store::{Restored, StateStore, StoreError};
use steward_core::runtime::{Agent, AgentParts, ShutdownGuard};
use steward_core::task::{RegistryLimits, TaskRegistry};
use steward_llm::http;
use steward_llm::provider::LlmProvider;

/// How long to wait for the agent's final snapshot after the UI exits.
const SHUTDOWN_GRACE_SECS: u64 = 10;
const LOG_FILE: &str = "steward.log";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Panic hook: restore terminal even on panic in raw mode
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen);
        default_hook(info);
    }));

    let cfg = Arc::new(AgentCfg::from_env());

    // Missing credential is fatal before the terminal is touched
    let Some(provider) = http::from_env() else {
        anyhow::bail!(
            "{var} is not set. Run 'export {var}=\"YOUR_API_KEY\"' and start steward again.",
            var = http::API_KEY_VAR
        );
    };

    std::fs::create_dir_all(&cfg.state_dir)
        .with_context(|| format!("creating state directory {}", cfg.state_dir.display()))?;
    let log = DiagnosticLog::new(cfg.log_capacity);
    init_tracing(&cfg, log.clone())?;

    for (key, value, desc) in cfg.to_entries() {
        tracing::debug!(key, value = %value, "{desc}");
    }
    tracing::info!(provider = provider.name(), model = provider.model(), "decision client configured");

    let store = StateStore::new(&cfg.state_dir);
    let restored = restore_state(&store)?;

    let guard = ShutdownGuard::new();
    guard.spawn_signal_listener();
    let token = guard.token();

    let registry = Arc::new(TaskRegistry::restore(
        restored.tasks,
        RegistryLimits::from(cfg.as_ref()),
        token.clone(),
    ));
    let (inbound_tx, inbound_rx) = mailbox::channel(cfg.inbound_capacity);
    let (outbound_tx, outbound_rx) = mailbox::channel(cfg.outbound_capacity);

    let (mut agent, status_rx) = Agent::new(AgentParts {
        cfg: Arc::clone(&cfg),
        provider: Arc::new(provider),
        store,
        registry,
        capabilities: CapabilityTable::new(),
        conversation: restored.conversation,
        interrupted: restored.interrupted,
        inbound: inbound_rx,
        outbound: outbound_tx,
        shutdown: token.clone(),
    });
    let agent_handle = tokio::spawn(async move { agent.run().await });

    let wiring = tui::Wiring {
        inbound: inbound_tx,
        outbound: outbound_rx,
        status: status_rx,
        log,
        display_capacity: cfg.display_capacity,
    };
    let tui_result = tui::run_app(wiring, token.clone()).await;

    // UI gone (Ctrl+C or signal): stop the agent and let it snapshot
    guard.trigger();
    match tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), agent_handle).await {
        Ok(Ok(())) => tracing::info!("agent stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "agent task failed"),
        Err(_) => tracing::warn!(grace_secs = SHUTDOWN_GRACE_SECS, "agent did not stop in time"),
    }

    tui_result
}

/// Diagnostic pane always; a JSON file under the state dir when RUST_LOG is set
/// (raw mode makes stderr unusable).
fn init_tracing(cfg: &AgentCfg, log: DiagnosticLog) -> anyhow::Result<()> {
    let file_layer = if std::env::var("RUST_LOG").is_ok() {
        let path = cfg.state_dir.join(LOG_FILE);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        Some(fmt::layer().json().with_target(true).with_writer(file))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .compact()
                .with_writer(log),
        )
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

/// Load persisted state; unreadable files are moved aside and the agent
/// starts fresh.
fn restore_state(store: &StateStore) -> anyhow::Result<Restored> {
    match store.restore() {
        Ok(restored) => Ok(restored),
        Err(e @ StoreError::Corrupt { .. }) => {
            tracing::warn!(error = %e, "persisted state unreadable, starting fresh");
            store.quarantine()?;
            Ok(store.restore()?)
        }
        Err(e) => Err(e.into()),
    }
}
