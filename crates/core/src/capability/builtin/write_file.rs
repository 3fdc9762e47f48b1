use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::Capability;
use crate::capability::{str_param, ActionContext, Params};

pub struct WriteFile;

/// Write via a temp file in the target directory, then rename over the target.
fn write_replace(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait::async_trait]
impl Capability for WriteFile {
    fn name(&self) -> &'static str {
        "write-file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file, creating it and its parent directories or replacing it."
    }

    fn parameters(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("file_path", "Destination path"),
            ("content", "Full text to write"),
        ]
    }

    async fn execute(&self, params: &Params, _ctx: &ActionContext) -> Result<String, String> {
        let path = str_param(params, "file_path")?.to_owned();
        let content = str_param(params, "content")?.to_owned();
        if path.trim().is_empty() {
            return Err("parameter 'file_path' is empty".to_owned());
        }

        let bytes = content.len();
        let target = PathBuf::from(&path);
        let written = tokio::task::spawn_blocking(move || write_replace(&target, &content))
            .await
            .map_err(|e| format!("error writing to file '{path}': {e}"))?;
        match written {
            Ok(()) => {
                tracing::info!(path = %path, bytes, "file written");
                Ok(format!("Wrote {bytes} bytes to '{path}'."))
            }
            Err(e) => Err(format!("error writing to file '{path}': {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::testing::{context, params};
    use serde_json::json;

    #[tokio::test]
    async fn writes_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site/index.html");
        let (ctx, _rx) = context();

        let out = WriteFile
            .execute(
                &params(json!({"file_path": path.to_str().unwrap(), "content": "<h1>hi</h1>"})),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.starts_with("Wrote 11 bytes"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<h1>hi</h1>");
    }

    #[tokio::test]
    async fn replaces_existing_file_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "old").unwrap();
        let (ctx, _rx) = context();

        WriteFile
            .execute(&params(json!({"file_path": path.to_str().unwrap(), "content": "new"})), &ctx)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let (ctx, _rx) = context();
        let err = WriteFile
            .execute(&params(json!({"file_path": "/tmp/x"})), &ctx)
            .await
            .unwrap_err();
        assert!(err.contains("'content'"));
    }

    #[tokio::test]
    async fn directory_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _rx) = context();
        let err = WriteFile
            .execute(
                &params(json!({"file_path": dir.path().to_str().unwrap(), "content": "x"})),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.starts_with("error writing to file"));
    }
}
