use crate::http::truncate;
use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// LLM failure with enough context to see what the model actually said.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    pub fn http(provider: Provider, status: reqwest::StatusCode, body: String) -> Self {
        Self {
            provider,
            stage: "http",
            detail: format!("status={status}"),
            raw_response_json: serde_json::from_str(&body).ok(),
            raw_output: Some(body),
        }
    }

    pub fn blocked(provider: Provider, reason: &str, raw_response_json: Value) -> Self {
        Self {
            provider,
            stage: "blocked",
            detail: format!("no candidate text (reason={reason})"),
            raw_output: None,
            raw_response_json: Some(raw_response_json),
        }
    }

    /// First few hundred chars of the raw model output, for logs.
    pub fn raw_excerpt(&self) -> Option<&str> {
        self.raw_output.as_deref().map(|s| truncate(s, 300))
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} failed: {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}
