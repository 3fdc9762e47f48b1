use super::Capability;
use crate::capability::{ActionContext, Params};

pub struct SystemInfo;

const PROBES: &[(&str, &str)] = &[
    ("System", "uname -a"),
    ("Uptime", "uptime"),
    ("Disk Usage", "df -h"),
    ("Memory Usage", "free -h"),
];

#[async_trait::async_trait]
impl Capability for SystemInfo {
    fn name(&self) -> &'static str {
        "system-info"
    }

    fn description(&self) -> &'static str {
        "Report this agent's own process (pid, working directory, executable) and host facts \
         (kernel, uptime, disk, memory)."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    async fn execute(&self, _params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|e| format!("unavailable ({e})"));
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|e| format!("unavailable ({e})"));

        let mut report = format!(
            "--- Agent Process ---\nExecutable: {exe}\nProcess ID: {}\nWorking Directory: {cwd}\n",
            std::process::id()
        );
        for (title, command) in PROBES {
            let name = ctx.registry.spawn(command).await.map_err(|e| e.to_string())?;
            let output = ctx
                .registry
                .await_completion(&name)
                .await
                .map_err(|e| e.to_string())?;
            report.push_str(&format!("\n--- {title} ---\n{output}\n"));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::context;

    #[tokio::test]
    async fn reports_process_and_probes() {
        let (ctx, _rx) = context();
        let out = SystemInfo.execute(&Params::new(), &ctx).await.unwrap();
        assert!(out.contains(&format!("Process ID: {}", std::process::id())));
        assert!(out.contains("--- System ---"));
        assert!(out.contains("--- Memory Usage ---"));
        assert_eq!(ctx.registry.len().await, PROBES.len());
    }
}
