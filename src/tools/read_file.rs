//! Read file tool - reads file contents with line numbering

use crate::tool::{parameters_schema, Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;
const BINARY_CHECK_SIZE: usize = 8192;

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// File path, relative to the project root or absolute inside it
    #[serde(alias = "filePath", alias = "file_path")]
    path: String,
    /// First line to return (1-indexed)
    #[serde(default, alias = "start_line")]
    offset: Option<usize>,
    /// Maximum number of lines to return
    #[serde(default)]
    limit: Option<usize>,
}

pub struct ReadFileTool {
    working_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }

    fn resolve_path(&self, path: &str) -> Result<PathBuf, String> {
        let requested = PathBuf::from(path);
        let full_path = if requested.is_absolute() {
            requested
        } else {
            self.working_dir.join(&requested)
        };

        let canonical = full_path.canonicalize().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                format!("File not found: {}", path)
            } else {
                format!("IO error: {}", e)
            }
        })?;

        let working_canonical = self
            .working_dir
            .canonicalize()
            .map_err(|e| format!("Cannot resolve project root: {}", e))?;

        if !canonical.starts_with(&working_canonical) {
            return Err(format!("Path is outside the project: {}", path));
        }

        Ok(canonical)
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_CHECK_SIZE)].contains(&0)
}

/// Render `content` like `cat -n`, honoring a 1-indexed offset and a limit
fn number_lines(content: &str, offset: usize, limit: usize) -> String {
    let start = offset.saturating_sub(1);
    content
        .lines()
        .enumerate()
        .skip(start)
        .take(limit)
        .map(|(idx, line)| {
            let line = match line.char_indices().nth(MAX_LINE_LENGTH) {
                Some((cut, _)) => &line[..cut],
                None => line,
            };
            format!("{:6}\t{}", idx + 1, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a text file from the project. Lines are numbered from 1; use offset and limit for long files. Reading a file that does not exist returns an error.".to_string(),
            parameters: parameters_schema::<Args>(),
        }
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        let args: Args = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        if ctx.is_cancelled() {
            return ToolResult::error("Cancelled");
        }

        let path = match self.resolve_path(&args.path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if !path.is_file() {
            return ToolResult::error(format!("Not a file: {}", args.path));
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Failed to read file: {}", e)),
        };

        if looks_binary(&bytes) {
            return ToolResult::error(format!("Binary file cannot be read as text: {}", args.path));
        }

        let content = String::from_utf8_lossy(&bytes);
        if content.is_empty() {
            return ToolResult::success("Warning: File exists but has empty contents");
        }

        ToolResult::success(number_lines(
            &content,
            args.offset.unwrap_or(1),
            args.limit.unwrap_or(DEFAULT_LINE_LIMIT),
        ))
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
    async fn test_reads_with_line_numbers() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("server.py"), "import os\nprint(1)\nprint(2)\n").unwrap();
        let tool = ReadFileTool::new(temp.path().to_path_buf());

        let result = tool
            .execute(json!({"filePath": "server.py", "offset": 2, "limit": 1}), &ctx(&temp))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.output, "     2\tprint(1)");
    }

    #[tokio::test]
    async fn test_missing_file_is_error_value() {
        let temp = TempDir::new().unwrap();
        let tool = ReadFileTool::new(temp.path().to_path_buf());

        let result = tool.execute(json!({"path": "missing.py"}), &ctx(&temp)).await;
        assert!(result.is_error);
        assert_eq!(result.output, "File not found: missing.py");
    }

    #[tokio::test]
    async fn test_binary_and_outside_rejected() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("project");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("blob.bin"), [0u8, 1, 2]).unwrap();
        std::fs::write(temp.path().join("secret.txt"), "nope").unwrap();
        let tool = ReadFileTool::new(inner.clone());

        let binary = tool.execute(json!({"path": "blob.bin"}), &ctx(&temp)).await;
        assert!(binary.output.starts_with("Binary file"));

        let outside = tool.execute(json!({"path": "../secret.txt"}), &ctx(&temp)).await;
        assert!(outside.is_error);
        assert!(outside.output.contains("outside"));
    }
}
