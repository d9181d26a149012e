use crate::config::{non_empty_var, var_or, Settings};
use crate::domain::analysis::AiAnalysis;
use crate::http::HttpClient;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{AnalyzeInput, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const REPAIR_ATTEMPTS: u32 = 1;
const MAX_DESCRIPTION_CHARS: usize = 3000;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings, http: &HttpClient) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url =
            non_empty_var("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = non_empty_var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_output_tokens = var_or("GEMINI_MAX_OUTPUT_TOKENS", DEFAULT_MAX_OUTPUT_TOKENS);
        let timeout_secs = var_or("GEMINI_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        // Generation is slower than the data APIs; same retries, longer timeout.
        let http = http
            .with_timeout(Duration::from_secs(timeout_secs))
            .context("failed to build Gemini http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_output_tokens,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn generate_content(
        &self,
        req: &GenerateContentRequest,
    ) -> anyhow::Result<(serde_json::Value, GenerateContentResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let (status, text) = self
            .http
            .post_json("gemini generateContent", &url, headers, req)
            .await?;

        if !status.is_success() {
            return Err(LlmDiagnosticsError::http(Provider::Gemini, status, text).into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Gemini response JSON: {text}"))?;
        let parsed = serde_json::from_value::<GenerateContentResponse>(raw_json.clone())
            .context("failed to decode Gemini response into GenerateContentResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, user_text: String, max_output_tokens: u32) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: user_text }],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: Self::system_prompt(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: 0.4,
                max_output_tokens,
                response_mime_type: "application/json",
            },
        }
    }

    fn system_prompt() -> String {
        [
            "你是台灣財經節目的重點整理助理。",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "Output schema:",
            "{",
            "  \"summary\": [\"重點1\", \"重點2\", \"重點3\"],",
            "  \"stocks\": [",
            "    {\"code\": \"2330\", \"name\": \"台積電\", \"reason\": \"一句話理由\"}",
            "  ]",
            "}",
            "Rules:",
            "- summary: 3 to 5 short lines in Traditional Chinese",
            "- stocks: up to 3 Taiwan-listed stocks mentioned or implied by the episode",
            "- code is the TWSE/TPEx numeric ticker as a string",
        ]
        .join("\n")
    }

    fn user_prompt(input: &AnalyzeInput) -> String {
        let description: String = input.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
        format!(
            "Summarize this episode and pick stocks.\n\nTitle: {}\nLink: {}\n\nDescription:\n{}",
            input.title, input.link, description
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON for the required schema.\n\n\
TASK: Output ONLY a single JSON object with keys \"summary\" (array of strings) and \
\"stocks\" (array of objects with \"code\", \"name\", \"reason\").\n\
- Do NOT include any markdown, prose, or code fences.\n\
- summary MUST contain at least one non-empty string.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &GenerateContentResponse) -> Option<String> {
        let candidate = res.candidates.first()?;
        let parts = &candidate.content.as_ref()?.parts;

        let mut out = String::new();
        for part in parts {
            if part.thought.unwrap_or(false) {
                continue;
            }
            if let Some(text) = part.text.as_deref() {
                out.push_str(text);
            }
        }
        (!out.trim().is_empty()).then_some(out)
    }

    fn finish_reason(res: &GenerateContentResponse) -> Option<&str> {
        res.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }

    fn blocked_error(res: &GenerateContentResponse, raw_json: serde_json::Value) -> anyhow::Error {
        let reason = res
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .or_else(|| Self::finish_reason(res))
            .unwrap_or("unknown");
        LlmDiagnosticsError::blocked(Provider::Gemini, reason, raw_json).into()
    }

    async fn try_parse_with_repairs(
        &self,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<AiAnalysis> {
        let first_err = match json::parse_analysis(&initial_text) {
            Ok(analysis) => return Ok(analysis),
            Err(err) => err,
        };

        let mut last_err = first_err;
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            tracing::warn!(attempt, error = %last_err, "Gemini output invalid; sending repair prompt");

            let req = self.request(Self::repair_prompt(&last_text), self.max_output_tokens);
            let (raw_json, res) = self.generate_content(&req).await?;
            let Some(text) = Self::response_text(&res) else {
                return Err(Self::blocked_error(&res, raw_json));
            };

            match json::parse_analysis(&text) {
                Ok(analysis) => return Ok(analysis),
                Err(err) => {
                    last_err = err;
                    last_text = text;
                    last_raw_json = raw_json;
                }
            }
        }

        Err(LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage: "parse_after_repair",
            detail: format!("final_error={last_err}"),
            raw_output: Some(last_text),
            raw_response_json: Some(last_raw_json),
        }
        .into())
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn analyze(&self, input: AnalyzeInput) -> anyhow::Result<AiAnalysis> {
        let user_text = Self::user_prompt(&input);
        let (mut raw_json, mut res) = self
            .generate_content(&self.request(user_text.clone(), self.max_output_tokens))
            .await?;

        // Truncated JSON never parses; retry once with a higher ceiling.
        if Self::finish_reason(&res) == Some("MAX_TOKENS") {
            let bumped = self.max_output_tokens.saturating_mul(2).max(2048);
            tracing::warn!(
                from = self.max_output_tokens,
                to = bumped,
                "Gemini finishReason=MAX_TOKENS; retrying once with higher maxOutputTokens"
            );
            let (rj, r) = self.generate_content(&self.request(user_text, bumped)).await?;
            raw_json = rj;
            res = r;
        }

        let Some(text) = Self::response_text(&res) else {
            return Err(Self::blocked_error(&res, raw_json));
        };
        self.try_parse_with_repairs(text, raw_json).await
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
