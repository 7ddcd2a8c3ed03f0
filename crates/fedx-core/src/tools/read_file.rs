//! Read file tool.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{READ_FILE, ToolContext, ToolDefinition, ToolOutput, resolve_in_root};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: READ_FILE.to_string(),
        description: "Read the contents of a file in the workspace. Returns the file content as text."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace root"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
}

pub fn execute(input: &Value, ctx: &ToolContext) -> ToolOutput {
    let input: ReadFileInput = match serde_json::from_value(input.clone()) {
        Ok(i) => i,
        Err(e) => {
            return ToolOutput::failure("invalid_input", format!("Invalid input for read_file: {e}"));
        }
    };

    let path = match resolve_in_root(&input.path, &ctx.root) {
        Ok(p) => p,
        Err(rejected) => return rejected,
    };

    if !path.is_file() {
        return ToolOutput::failure("not_found", format!("File not found: {}", input.path));
    }

    match std::fs::read(&path) {
        Ok(bytes) => ToolOutput::success(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => ToolOutput::failure(
            "read_error",
            format!("Failed to read '{}': {e}", input.path),
        ),
    }
}
