use super::Capability;
use crate::capability::{str_param, ActionContext, Params};

pub struct ReadFile;

/// Single-quote `s` for bash: `it's` becomes `'it'\''s'`.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait::async_trait]
impl Capability for ReadFile {
    fn name(&self) -> &'static str {
        "read-file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a file."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[("file_path", "Path of the file to read")]
    }

    // Runs through the task registry like any other command, so the read shows
    // up in list-tasks and honours the configured output limit.
    async fn execute(&self, params: &Params, ctx: &ActionContext) -> Result<String, String> {
        let path = str_param(params, "file_path")?;
        if path.trim().is_empty() {
            return Err("parameter 'file_path' is empty".to_owned());
        }
        let name = ctx
            .registry
            .spawn(&format!("cat -- {}", shell_quote(path)))
            .await
            .map_err(|e| format!("error reading file '{path}': {e}"))?;
        ctx.registry
            .await_completion(&name)
            .await
            .map_err(|e| format!("error reading file '{path}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{context, params};
    use serde_json::json;

    #[test]
    fn quotes_embedded_single_quotes() {
        assert_eq!(shell_quote("plain.txt"), "'plain.txt'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn reads_file_with_awkward_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("it's a file.txt");
        std::fs::write(&path, "contents here\n").unwrap();

        let (ctx, _rx) = context();
        let out = ReadFile
            .execute(&params(json!({"file_path": path.to_str().unwrap()})), &ctx)
            .await
            .unwrap();
        assert!(out.contains("contents here"));
        assert!(!out.contains("COMMAND FAILED"));
    }

    #[tokio::test]
    async fn missing_file_reports_failure() {
        let (ctx, _rx) = context();
        let out = ReadFile
            .execute(&params(json!({"file_path": "/nonexistent/steward-test"})), &ctx)
            .await
            .unwrap();
        assert!(out.starts_with("COMMAND FAILED with exit code 1"));
    }
}
