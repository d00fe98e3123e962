//! Capability implementations
//!
//! Each tool implements `crate::tool::Tool`. Agents receive a subset of the
//! standard registry selected by name from their definition.

mod fetch;
mod list_directory;
mod read_file;
mod web_search;
mod write_file;

pub use fetch::{html_to_text, FetchTool};
pub use list_directory::{list_relative, ListDirectoryTool};
pub use read_file::ReadFileTool;
pub use web_search::{WebSearchTool, DEFAULT_SEARCH_URL};
pub use write_file::WriteFileTool;

use crate::tool::ToolRegistry;
use std::path::Path;

/// Every capability an agent definition may request, rooted at `project_root`
pub fn standard_registry(project_root: &Path, search_url: &str) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(ListDirectoryTool::new(project_root.to_path_buf()));
    registry.register(ReadFileTool::new(project_root.to_path_buf()));
    registry.register(WriteFileTool::new(project_root.to_path_buf()));
    registry.register(FetchTool::new());
    registry.register(WebSearchTool::with_url(search_url));

    registry
}
