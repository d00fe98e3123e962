//! Write file tool - creates or overwrites a file inside the project

use crate::tool::{parameters_schema, Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// File path, relative to the project root
    #[serde(alias = "filePath", alias = "file_path")]
    path: String,
    /// Full new contents of the file. Non-string values are written as JSON.
    content: Value,
}

pub struct WriteFileTool {
    working_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }

    /// Resolve `path` without touching the filesystem; the file and its
    /// parents may not exist yet.
    fn resolve_path(&self, path: &str) -> Result<PathBuf, String> {
        let requested = Path::new(path);
        let root = normalize(&self.working_dir);
        let full = if requested.is_absolute() {
            normalize(requested)
        } else {
            normalize(&self.working_dir.join(requested))
        };

        if !full.starts_with(&root) || full == root {
            return Err(format!("Path is outside the project: {}", path));
        }
        Ok(full)
    }
}

/// Lexically collapse `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn content_text(content: Value) -> String {
    match content {
        Value::String(s) => s,
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".to_string(),
            description: r#"Write a file in the project, replacing it if it already exists.

Usage:
- Paths are relative to the project root; missing parent directories are created.
- Always send the complete file contents, not a diff.
- Read an existing file before overwriting it so unrelated code is preserved."#
                .to_string(),
            parameters: parameters_schema::<Args>(),
        }
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult {
        if ctx.is_cancelled() {
            return ToolResult::error("Cancelled");
        }

        let args: Args = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        let path = match self.resolve_path(&args.path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if path.is_dir() {
            return ToolResult::error(format!("Path is a directory: {}", args.path));
        }

        let existed = path.exists();
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories: {}", e));
            }
        }

        let content = content_text(args.content);
        if let Err(e) = tokio::fs::write(&path, &content).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        tracing::debug!(path = %path.display(), bytes = content.len(), "wrote file");
        let verb = if existed { "Updated" } else { "Created" };
        ToolResult::success(format!("{} {} ({} bytes)", verb, args.path, content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &TempDir) -> ToolContext {
        ToolContext::new(dir.path().to_path_buf(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_creates_then_updates() {
        let temp = TempDir::new().unwrap();
        let tool = WriteFileTool::new(temp.path().to_path_buf());

        let created = tool
            .execute(json!({"path": "auth/config.py", "content": "DOMAIN = ''\n"}), &ctx(&temp))
            .await;
        assert!(!created.is_error, "{}", created.output);
        assert!(created.output.starts_with("Created auth/config.py"));

        let updated = tool
            .execute(json!({"filePath": "auth/config.py", "content": "DOMAIN = 'x'\n"}), &ctx(&temp))
            .await;
        assert!(updated.output.starts_with("Updated"));
        let written = std::fs::read_to_string(temp.path().join("auth/config.py")).unwrap();
        assert_eq!(written, "DOMAIN = 'x'\n");
    }

    #[tokio::test]
    async fn test_json_content_is_stringified() {
        let temp = TempDir::new().unwrap();
        let tool = WriteFileTool::new(temp.path().to_path_buf());

        let result = tool
            .execute(json!({"path": "settings.json", "content": {"audience": "api"}}), &ctx(&temp))
            .await;
        assert!(!result.is_error);
        let written = std::fs::read_to_string(temp.path().join("settings.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["audience"], "api");
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("project");
        std::fs::create_dir_all(&inner).unwrap();
        let tool = WriteFileTool::new(inner);

        let result = tool
            .execute(json!({"path": "../../etc/evil", "content": "x"}), &ctx(&temp))
            .await;
        assert!(result.is_error);
        assert!(result.output.contains("outside"));
        assert!(!temp.path().join("etc").exists());
    }
}
