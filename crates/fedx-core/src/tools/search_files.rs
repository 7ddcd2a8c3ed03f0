//! Search files tool.
//!
//! Matches workspace-relative file paths against a glob pattern. `*` does
//! not cross directory separators; use `**` to recurse.

use globset::GlobBuilder;
use ignore::WalkBuilder;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{SEARCH_FILES, ToolContext, ToolDefinition, ToolOutput, resolve_in_root};

/// Maximum number of matches returned.
const MAX_RESULTS: usize = 200;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_FILES.to_string(),
        description: "Find files in the workspace whose relative path matches a glob pattern (e.g. '*.md', '**/*.rs')."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern relative to the workspace root"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        }),
    }
}

#[derive(Debug, Deserialize)]
struct SearchFilesInput {
    pattern: String,
}

pub fn execute(input: &Value, ctx: &ToolContext) -> ToolOutput {
    let input: SearchFilesInput = match serde_json::from_value(input.clone()) {
        Ok(i) => i,
        Err(e) => {
            return ToolOutput::failure(
                "invalid_input",
                format!("Invalid input for search_files: {e}"),
            );
        }
    };

    let pattern = input.pattern.trim();
    if pattern.starts_with('/') || pattern.split(['/', '\\']).any(|part| part == "..") {
        return ToolOutput::path_rejected(pattern);
    }

    let root = match resolve_in_root("", &ctx.root) {
        Ok(root) => root,
        Err(failure) => return failure,
    };

    let matcher = match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            return ToolOutput::failure("invalid_pattern", format!("Invalid glob pattern: {e}"));
        }
    };

    let walker = WalkBuilder::new(&root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut matches = Vec::new();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.is_match(&rel) {
            matches.push(rel);
        }
    }

    if matches.is_empty() {
        return ToolOutput::success("No files found matching pattern.");
    }

    matches.sort();
    let total = matches.len();
    matches.truncate(MAX_RESULTS);

    let mut text = format!("Found files:\n{}", matches.join("\n"));
    if total > MAX_RESULTS {
        text.push_str(&format!("\n... ({} more not shown)", total - MAX_RESULTS));
    }
    ToolOutput::success(text)
}
