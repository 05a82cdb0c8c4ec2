//! Morph Fast Apply: merge an abbreviated code edit into a file through the
//! Morph apply model.
//!
//! The model receives the original file and an edit snippet using
//! `// ... existing code ...` markers and returns the complete merged file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_core::tool::ToolResult;
use tracing::{debug, warn};

pub const MORPH_BASE_URL: &str = "https://api.morphllm.com/v1";
pub const MORPH_MODEL: &str = "morph-v3-large";

pub struct MorphEditorTool {
    cwd: PathBuf,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl MorphEditorTool {
    /// Returns `None` when the HTTP client cannot be built.
    pub fn new(cwd: impl Into<PathBuf>, api_key: impl Into<String>) -> Option<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| warn!(error = %e, "Failed to create Morph HTTP client"))
            .ok()?;
        Some(Self {
            cwd: cwd.into(),
            api_key: api_key.into(),
            base_url: MORPH_BASE_URL.into(),
            client,
        })
    }

    /// Point at a different OpenAI-compatible apply endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }

    pub async fn edit_file(&self, target: &str, instructions: &str, code_edit: &str) -> ToolResult {
        let full = self.resolve(target);
        let original = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(_) => return ToolResult::fail(format!("File not found: {target}")),
        };

        let merged = match self.apply(instructions, &original, code_edit).await {
            Ok(m) => m,
            Err(e) => return ToolResult::fail(e),
        };

        match tokio::fs::write(&full, merged).await {
            Ok(()) => ToolResult::ok(format!("Updated {target} with Morph Fast Apply")),
            Err(e) => ToolResult::fail(format!("Error writing {target}: {e}")),
        }
    }

    async fn apply(&self, instructions: &str, original: &str, update: &str) -> Result<String, String> {
        debug!(model = MORPH_MODEL, "Calling Morph apply");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&build_request_body(instructions, original, update))
            .send()
            .await
            .map_err(|e| format!("Network error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!(
                "Morph API error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| "Invalid response from Morph API".to_string())?;
        extract_merged(&body).ok_or_else(|| "Invalid response from Morph API".to_string())
    }
}

pub fn build_request_body(instructions: &str, original: &str, update: &str) -> serde_json::Value {
    serde_json::json!({
        "model": MORPH_MODEL,
        "messages": [{
            "role": "user",
            "content": format!(
                "<instruction>{instructions}</instruction>\n<code>{original}</code>\n<update>{update}</update>"
            ),
        }],
    })
}

/// The merged file from `choices[0].message.content`.
pub fn extract_merged(body: &serde_json::Value) -> Option<String> {
    body.pointer("/choices/0/message/content")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_wraps_sections() {
        let body = build_request_body("rename x", "let x = 1;", "let y = 1;");
        assert_eq!(body["model"], "morph-v3-large");
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert_eq!(
            content,
            "<instruction>rename x</instruction>\n<code>let x = 1;</code>\n<update>let y = 1;</update>"
        );
    }

    #[test]
    fn extract_merged_content() {
        let ok = serde_json::json!({"choices": [{"message": {"content": "merged"}}]});
        assert_eq!(extract_merged(&ok).as_deref(), Some("merged"));

        let empty = serde_json::json!({"choices": []});
        assert!(extract_merged(&empty).is_none());
    }

    #[tokio::test]
    async fn missing_target_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let tool = MorphEditorTool::new(dir.path(), "key")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let result = tool.edit_file("absent.rs", "do it", "code").await;
        assert_eq!(result.error(), Some("File not found: absent.rs"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let tool = MorphEditorTool::new(dir.path(), "key")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let result = tool.edit_file("a.rs", "add a comment", "// hi").await;
        assert!(result.error().unwrap().starts_with("Network error"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.rs")).unwrap(), "fn main() {}");
    }
}
