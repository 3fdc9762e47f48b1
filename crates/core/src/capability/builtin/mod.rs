pub mod messaging;
pub mod read_file;
pub mod sleep;
pub mod system_info;
pub mod task_control;
pub mod write_file;

use std::collections::BTreeMap;

use super::{ActionContext, Params};

#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    /// Name the decision client uses, e.g. `spawn-command`.
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// (parameter, description) pairs, rendered into the instruction prompt.
    fn parameters(&self) -> &'static [(&'static str, &'static str)];
    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String>;
}

/// The fixed set of capabilities, built once at startup and keyed by name.
pub struct CapabilityTable {
    caps: BTreeMap<&'static str, Box<dyn Capability>>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityTable {
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.register(Box::new(task_control::SpawnCommand));
        table.register(Box::new(task_control::PollTask));
        table.register(Box::new(task_control::AwaitTask));
        table.register(Box::new(task_control::KillTask));
        table.register(Box::new(task_control::ListTasks));
        table.register(Box::new(sleep::SleepSeconds));
        table.register(Box::new(read_file::ReadFile));
        table.register(Box::new(write_file::WriteFile));
        table.register(Box::new(messaging::SendUserMessage));
        table.register(Box::new(messaging::FinishTask));
        table.register(Box::new(system_info::SystemInfo));
        table
    }

    pub fn empty() -> Self {
        Self { caps: BTreeMap::new() }
    }

    pub fn register(&mut self, cap: Box<dyn Capability>) {
        self.caps.insert(cap.name(), cap);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.caps.get(name).map(|b| b.as_ref())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.caps.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// One block per capability for the instruction prompt:
    /// `- name(param, ...): description` followed by indented parameter notes.
    pub fn describe(&self) -> String {
        self.caps
            .values()
            .map(|cap| {
                let params = cap.parameters();
                let signature: Vec<&str> = params.iter().map(|(p, _)| *p).collect();
                let mut block = format!("- {}({}): {}", cap.name(), signature.join(", "), cap.description());
                for (p, desc) in params {
                    block.push_str(&format!("\n    {p}: {desc}"));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
