use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment prefix for every config key (`STEWARD_COOLDOWN_SECS` → `cooldown_secs`).
pub const ENV_PREFIX: &str = "STEWARD_";

const DEFAULT_SUGGESTION: &str = "This is a Debian-based system and you have full privileges. \
Explore your environment, then set your own goals. For example, build and host a small \
website on localhost:6969, or improve the tooling on this machine.";

/// All steward agent parameters. Read from `STEWARD_*` environment variables at startup;
/// anything missing or unparseable keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCfg {
    // loop pacing
    pub cooldown_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub failure_cooldown_secs: u64,

    // task registry
    pub await_poll_ms: u64,
    /// 0 disables the timeout: commands run until they exit or are killed.
    pub command_timeout_secs: u64,
    pub max_output_bytes: usize,
    pub max_sleep_secs: u64,

    // front end
    pub display_capacity: usize,
    pub log_capacity: usize,

    // mailboxes
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,

    // persistence
    pub snapshot_every: u64,
    pub state_dir: PathBuf,

    // decision request
    pub max_tokens: u32,
    pub temperature: f32,

    /// Initial operator goal seeded into a fresh conversation.
    pub suggestion: String,
}

impl Default for AgentCfg {
    fn default() -> Self {
        Self {
            cooldown_secs: 5,
            retry_attempts: 3,
            retry_base_ms: 5000,
            failure_cooldown_secs: 60,
            await_poll_ms: 2000,
            command_timeout_secs: 0,
            max_output_bytes: 64 * 1024,
            max_sleep_secs: 600,
            display_capacity: 500,
            log_capacity: 1000,
            inbound_capacity: 256,
            outbound_capacity: 256,
            snapshot_every: 1,
            state_dir: PathBuf::from(".steward"),
            max_tokens: 4096,
            temperature: 0.7,
            suggestion: DEFAULT_SUGGESTION.to_owned(),
        }
    }
}

impl AgentCfg {
    /// Load config from the process environment.
    pub fn from_env() -> Self {
        let map: HashMap<String, String> = std::env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX).map(|key| (key.to_ascii_lowercase(), v))
            })
            .collect();
        Self::from_map(&map)
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            cooldown_secs: get_or(m, "cooldown_secs", d.cooldown_secs),
            retry_attempts: get_or(m, "retry_attempts", d.retry_attempts).max(1),
            retry_base_ms: get_or(m, "retry_base_ms", d.retry_base_ms),
            failure_cooldown_secs: get_or(m, "failure_cooldown_secs", d.failure_cooldown_secs),
            await_poll_ms: get_or(m, "await_poll_ms", d.await_poll_ms).max(1),
            command_timeout_secs: get_or(m, "command_timeout_secs", d.command_timeout_secs),
            max_output_bytes: get_or(m, "max_output_bytes", d.max_output_bytes),
            max_sleep_secs: get_or(m, "max_sleep_secs", d.max_sleep_secs),
            display_capacity: get_or(m, "display_capacity", d.display_capacity).max(1),
            log_capacity: get_or(m, "log_capacity", d.log_capacity).max(1),
            inbound_capacity: get_or(m, "inbound_capacity", d.inbound_capacity).max(1),
            outbound_capacity: get_or(m, "outbound_capacity", d.outbound_capacity).max(1),
            snapshot_every: get_or(m, "snapshot_every", d.snapshot_every).max(1),
            state_dir: get_or(m, "state_dir", d.state_dir),
            max_tokens: get_or(m, "max_tokens", d.max_tokens),
            temperature: get_or(m, "temperature", d.temperature),
            suggestion: m
                .get("suggestion")
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .unwrap_or(d.suggestion),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    pub fn await_poll(&self) -> Duration {
        Duration::from_millis(self.await_poll_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    /// (key, value, description) triples, used to log the effective config at startup.
    pub fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("cooldown_secs", self.cooldown_secs.to_string(), "Sleep after every iteration"),
            ("retry_attempts", self.retry_attempts.to_string(), "Decision attempts per iteration"),
            ("retry_base_ms", self.retry_base_ms.to_string(), "First retry backoff ms, doubles per attempt"),
            ("failure_cooldown_secs", self.failure_cooldown_secs.to_string(), "Cooldown after all attempts fail"),
            ("await_poll_ms", self.await_poll_ms.to_string(), "await-task poll interval ms"),
            ("command_timeout_secs", self.command_timeout_secs.to_string(), "Command timeout, 0 = none"),
            ("max_output_bytes", self.max_output_bytes.to_string(), "Per-stream capture limit"),
            ("max_sleep_secs", self.max_sleep_secs.to_string(), "sleep-seconds upper bound"),
            ("display_capacity", self.display_capacity.to_string(), "Conversation pane message cap"),
            ("log_capacity", self.log_capacity.to_string(), "Diagnostic log lines retained"),
            ("inbound_capacity", self.inbound_capacity.to_string(), "Inbound mailbox bound"),
            ("outbound_capacity", self.outbound_capacity.to_string(), "Outbound mailbox bound"),
            ("snapshot_every", self.snapshot_every.to_string(), "Persist every N iterations"),
            ("state_dir", self.state_dir.display().to_string(), "Persistence directory"),
            ("max_tokens", self.max_tokens.to_string(), "Decision request token limit"),
            ("temperature", self.temperature.to_string(), "Decision request temperature"),
        ]
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_map_yields_defaults() {
        let cfg = AgentCfg::from_map(&HashMap::new());
        let d = AgentCfg::default();
        assert_eq!(cfg.cooldown_secs, d.cooldown_secs);
        assert_eq!(cfg.state_dir, d.state_dir);
        assert_eq!(cfg.command_timeout(), None);
        assert_eq!(cfg.suggestion, d.suggestion);
    }

    #[test]
    fn values_override_defaults() {
        let cfg = AgentCfg::from_map(&map(&[
            ("cooldown_secs", "1"),
            ("command_timeout_secs", "90"),
            ("state_dir", "/var/lib/steward"),
            ("temperature", "0.2"),
        ]));
        assert_eq!(cfg.cooldown(), Duration::from_secs(1));
        assert_eq!(cfg.command_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/steward"));
        assert!((cfg.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn unparseable_values_fall_back() {
        let cfg = AgentCfg::from_map(&map(&[("cooldown_secs", "soon"), ("retry_attempts", "0")]));
        assert_eq!(cfg.cooldown_secs, 5);
        // at least one attempt is always made
        assert_eq!(cfg.retry_attempts, 1);
    }

    #[test]
    fn entries_cover_tunables() {
        let cfg = AgentCfg::default();
        let keys: Vec<&str> = cfg.to_entries().iter().map(|(k, _, _)| *k).collect();
        assert!(keys.contains(&"command_timeout_secs"));
        assert!(keys.contains(&"state_dir"));
    }
}
