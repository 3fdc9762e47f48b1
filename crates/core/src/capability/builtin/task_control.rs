use super::Capability;
use crate::capability::{str_param, ActionContext, Params};
use crate::task::PollStatus;

pub struct SpawnCommand;
pub struct PollTask;
pub struct AwaitTask;
pub struct KillTask;
pub struct ListTasks;

const TASK_NAME: &[(&str, &str)] = &[("task_name", "Name returned by spawn-command, e.g. task_1")];

#[async_trait::async_trait]
impl Capability for SpawnCommand {
    fn name(&self) -> &'static str {
        "spawn-command"
    }

    fn description(&self) -> &'static str {
        "Start a shell command in the background and return its task name immediately. \
         You are root, so you do not need sudo."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("command", "The bash command line to run")]
    }

    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let command = str_param(params, "command")?;
        let name = ctx.registry.spawn(command).await.map_err(|e| e.to_string())?;
        Ok(format!(
            "Task '{name}' started. Use poll-task or await-task with task_name '{name}' to get its result."
        ))
    }
}

#[async_trait::async_trait]
impl Capability for PollTask {
    fn name(&self) -> &'static str {
        "poll-task"
    }

    fn description(&self) -> &'static str {
        "Check a background task without waiting. Returns its result once it has finished."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        TASK_NAME
    }

    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let name = str_param(params, "task_name")?;
        match ctx.registry.poll(name).await.map_err(|e| e.to_string())? {
            PollStatus::Running => Ok(format!("Task '{name}' is still running.")),
            PollStatus::Done(result) => Ok(result),
        }
    }
}

#[async_trait::async_trait]
impl Capability for AwaitTask {
    fn name(&self) -> &'static str {
        "await-task"
    }

    fn description(&self) -> &'static str {
        "Wait until a background task finishes and return its result."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        TASK_NAME
    }

    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let name = str_param(params, "task_name")?;
        ctx.registry
            .await_completion(name)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl Capability for KillTask {
    fn name(&self) -> &'static str {
        "kill-task"
    }

    fn description(&self) -> &'static str {
        "Forcefully stop a background task and forget it."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        TASK_NAME
    }

    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let name = str_param(params, "task_name")?;
        ctx.registry.kill(name).await.map_err(|e| e.to_string())?;
        Ok(format!("Task '{name}' was killed and removed."))
    }
}

#[async_trait::async_trait]
impl Capability for ListTasks {
    fn name(&self) -> &'static str {
        "list-tasks"
    }

    fn description(&self) -> &'static str {
        "List every known task with its status and command."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    async fn execute(&self, _params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let tasks = ctx.registry.list().await;
        if tasks.is_empty() {
            return Ok("No tasks.".to_owned());
        }
        let lines: Vec<String> = tasks
            .iter()
            .map(|(name, view)| format!("{name} [{}] {}", view.status, view.command))
            .collect();
        Ok(lines.join("\n"))
    }
}
