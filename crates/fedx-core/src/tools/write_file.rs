//! Write file tool.
//!
//! Creates or overwrites a file under the workspace root, creating parent
//! directories as needed.

use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolContext, ToolDefinition, ToolOutput, WRITE_FILE, resolve_in_root};

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: WRITE_FILE.to_string(),
        description: "Write content to a file in the workspace. Creates parent directories if needed and overwrites existing files."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "Full content to write"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        }),
    }
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

pub fn execute(input: &Value, ctx: &ToolContext) -> ToolOutput {
    let input: WriteFileInput = match serde_json::from_value(input.clone()) {
        Ok(i) => i,
        Err(e) => {
            return ToolOutput::failure(
                "invalid_input",
                format!("Invalid input for write_file: {e}"),
            );
        }
    };

    let path = match resolve_in_root(&input.path, &ctx.root) {
        Ok(p) => p,
        Err(rejected) => return rejected,
    };

    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        return ToolOutput::failure(
            "mkdir_error",
            format!("Failed to create directory '{}': {e}", parent.display()),
        );
    }

    match std::fs::write(&path, input.content.as_bytes()) {
        Ok(()) => ToolOutput::success(format!(
            "Successfully wrote {} bytes to {}",
            input.content.len(),
            input.path
        )),
        Err(e) => ToolOutput::failure(
            "write_error",
            format!("Failed to write '{}': {e}", input.path),
        ),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn ctx(temp: &TempDir) -> ToolContext {
        ToolContext::new(temp.path().to_path_buf(), None)
    }

    #[test]
    fn test_writes_and_creates_parents() {
        let temp = TempDir::new().unwrap();
        let output = execute(
            &json!({"path": "poems/haiku.txt", "content": "old pond\nfrog\n"}),
            &ctx(&temp),
        );

        assert_eq!(
            output,
            ToolOutput::success("Successfully wrote 14 bytes to poems/haiku.txt")
        );
        let written = std::fs::read_to_string(temp.path().join("poems/haiku.txt")).unwrap();
        assert_eq!(written, "old pond\nfrog\n");
    }

    #[test]
    fn test_overwrites_existing_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "old content").unwrap();

        let output = execute(&json!({"path": "a.txt", "content": "new"}), &ctx(&temp));
        assert!(output.is_ok());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("a.txt")).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_missing_content_is_invalid_input() {
        let temp = TempDir::new().unwrap();
        let output = execute(&json!({"path": "a.txt"}), &ctx(&temp));
        assert_eq!(output.error_code(), Some("invalid_input"));
        assert!(!temp.path().join("a.txt").exists());
    }

    #[test]
    fn test_escape_is_rejected_and_nothing_written() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("ws");
        std::fs::create_dir_all(&root).unwrap();
        let ctx = ToolContext::new(root, None);

        let output = execute(&json!({"path": "sub/../../x.txt", "content": "x"}), &ctx);
        assert_eq!(output.error_code(), Some("path_rejected"));
        assert!(!temp.path().join("x.txt").exists());
    }
}
