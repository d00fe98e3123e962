//! List directory tool - project-relative paths under a directory

use crate::tool::{parameters_schema, Tool, ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const MAX_RECURSIVE_DEPTH: usize = 10;
const MAX_ENTRIES: usize = 2000;

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// Directory to list, relative to the project root (defaults to the root)
    #[serde(default, alias = "directory")]
    path: Option<String>,
    /// Optional glob applied to file names (e.g. "*.py")
    #[serde(default)]
    pattern: Option<String>,
    /// Descend into subdirectories
    #[serde(default)]
    recursive: bool,
}

pub struct ListDirectoryTool {
    working_dir: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }

    fn resolve_dir(&self, path: Option<&str>) -> Result<(PathBuf, PathBuf), String> {
        let root = self
            .working_dir
            .canonicalize()
            .map_err(|e| format!("Cannot resolve project root: {}", e))?;

        let requested = match path {
            None | Some("") | Some(".") => root.clone(),
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => root.join(p),
        };

        let dir = requested
            .canonicalize()
            .map_err(|e| format!("Path not found: {} ({})", requested.display(), e))?;

        if !dir.starts_with(&root) {
            return Err("Path outside project root".to_string());
        }
        if !dir.is_dir() {
            return Err(format!("Not a directory: {}", dir.display()));
        }
        Ok((root, dir))
    }
}

/// List entries of `dir` as paths relative to `root`.
///
/// Hidden entries are skipped; directories carry a trailing `/` and are never
/// filtered by `pattern`.
pub fn list_relative(
    root: &Path,
    dir: &Path,
    recursive: bool,
    pattern: Option<&glob::Pattern>,
) -> Vec<String> {
    let max_depth = if recursive { MAX_RECURSIVE_DEPTH } else { 1 };

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_dir()
                || pattern.map_or(true, |p| p.matches(&e.file_name().to_string_lossy()))
        })
        .take(MAX_ENTRIES)
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap_or(e.path());
            let suffix = if e.file_type().is_dir() { "/" } else { "" };
            format!("{}{}", relative.display(), suffix)
        })
        .collect()
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_directory".to_string(),
            description: "List files and directories inside the project. Paths are returned relative to the project root, one per line; directories end with '/'.".to_string(),
            parameters: parameters_schema::<Args>(),
        }
    }

    async fn execute(&self, args_value: serde_json::Value, ctx: &ToolContext) -> ToolResult {
        if ctx.is_cancelled() {
            return ToolResult::error("Cancelled");
        }

        let args: Args = match serde_json::from_value(args_value) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid arguments: {}", e)),
        };

        let (root, dir) = match self.resolve_dir(args.path.as_deref()) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        let pattern = match args.pattern.as_deref().map(glob::Pattern::new) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return ToolResult::error(format!("Invalid pattern: {}", e)),
            None => None,
        };

        let entries = list_relative(&root, &dir, args.recursive, pattern.as_ref());
        if entries.is_empty() {
            return ToolResult::success("(empty directory)");
        }
        ToolResult::success(entries.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("app/templates")).unwrap();
        std::fs::write(temp.path().join("server.py"), "print('hi')").unwrap();
        std::fs::write(temp.path().join("requirements.txt"), "flask").unwrap();
        std::fs::write(temp.path().join("app/views.py"), "").unwrap();
        std::fs::write(temp.path().join("app/templates/home.html"), "").unwrap();
        std::fs::write(temp.path().join(".env"), "SECRET=1").unwrap();
        temp
    }

    fn ctx(dir: &Path) -> ToolContext {
        ToolContext::new(dir.to_path_buf(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_lists_top_level_relative() {
        let temp = project();
        let tool = ListDirectoryTool::new(temp.path().to_path_buf());
        let result = tool.execute(json!({}), &ctx(temp.path())).await;

        assert!(!result.is_error, "{}", result.output);
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines, vec!["app/", "requirements.txt", "server.py"]);
    }

    #[tokio::test]
    async fn test_recursive_with_pattern() {
        let temp = project();
        let tool = ListDirectoryTool::new(temp.path().to_path_buf());
        let result = tool
            .execute(json!({"path": "app", "recursive": true, "pattern": "*.py"}), &ctx(temp.path()))
            .await;

        assert!(!result.is_error, "{}", result.output);
        assert!(result.output.contains("app/views.py"));
        assert!(result.output.contains("app/templates/"));
        assert!(!result.output.contains("home.html"));
    }

    #[tokio::test]
    async fn test_rejects_escape_and_missing() {
        let temp = project();
        let tool = ListDirectoryTool::new(temp.path().join("app"));

        let outside = tool.execute(json!({"path": ".."}), &ctx(temp.path())).await;
        assert!(outside.is_error);

        let missing = tool.execute(json!({"path": "nope"}), &ctx(temp.path())).await;
        assert!(missing.is_error);
        assert!(missing.output.contains("Path not found"));
    }
}
