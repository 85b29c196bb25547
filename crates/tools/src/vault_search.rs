//! Full-text search over a directory of markdown notes.

use async_trait::async_trait;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAX_MATCHES: usize = 5;
const SNIPPET_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NoteMatch {
    /// Path relative to the vault root.
    pub note: String,
    pub line: usize,
    pub snippet: String,
}

pub struct VaultSearchTool {
    root: PathBuf,
}

impl VaultSearchTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

fn markdown_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable vault directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if hidden {
                continue;
            }
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("md")) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn snippet(line: &str) -> String {
    let line = line.trim();
    if line.chars().count() <= SNIPPET_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(SNIPPET_CHARS).collect();
        format!("{cut}…")
    }
}

/// Case-insensitive search; at most one match per note, notes in path order.
pub fn search_vault(root: &Path, query: &str, limit: usize) -> Vec<NoteMatch> {
    let needle = query.to_lowercase();
    let mut matches = Vec::new();
    for file in markdown_files(root) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let note = file.strip_prefix(root).unwrap_or(&file).to_string_lossy().replace('\\', "/");
        let title_hit = note.to_lowercase().contains(&needle);
        let hit = content
            .lines()
            .enumerate()
            .find(|(_, l)| l.to_lowercase().contains(&needle));
        match hit {
            Some((i, l)) => matches.push(NoteMatch {
                note,
                line: i + 1,
                snippet: snippet(l),
            }),
            None if title_hit => matches.push(NoteMatch {
                note,
                line: 1,
                snippet: content.lines().next().map(snippet).unwrap_or_default(),
            }),
            None => {}
        }
        if matches.len() >= limit {
            break;
        }
    }
    matches
}

#[async_trait]
impl Tool for VaultSearchTool {
    fn name(&self) -> &str {
        "vault_search"
    }

    fn description(&self) -> &str {
        "Search the user's markdown notes vault for a word or phrase. Returns matching notes with the matching line."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![ToolParam::required("query", ParamType::String, "Text to look for in the notes")]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"].as_str().unwrap_or_default().trim().to_string();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        if !self.root.is_dir() {
            return Err(ToolError::failed(
                "vault_search",
                format!("vault not found at {}", self.root.display()),
            ));
        }

        debug!(vault = %self.root.display(), query = %query, "Searching vault");
        let root = self.root.clone();
        let q = query.clone();
        let matches = tokio::task::spawn_blocking(move || search_vault(&root, &q, MAX_MATCHES))
            .await
            .map_err(|e| ToolError::failed("vault_search", e))?;

        if matches.is_empty() {
            return Ok(ToolResult::ok(format!("No notes mention '{query}'.")));
        }
        let data = serde_json::to_value(&matches).unwrap_or_default();
        Ok(ToolResult::ok(serde_json::to_string_pretty(&data).unwrap_or_default()).with_data(data))
    }
}
