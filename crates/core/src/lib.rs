pub mod domain;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    const DEFAULT_OUTPUT_PATH: &str = "index.html";
    const DEFAULT_HTTP_RETRIES: u32 = 3;
    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub gemini_api_key: Option<String>,
        pub youtube_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub output_path: PathBuf,
        pub http_retries: u32,
        pub http_timeout_secs: u64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                gemini_api_key: non_empty_var("GEMINI_API_KEY"),
                youtube_api_key: non_empty_var("YOUTUBE_API_KEY"),
                sentry_dsn: sentry_dsn(),
                output_path: non_empty_var("OUTPUT_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
                http_retries: parse_var("HTTP_RETRIES")?.unwrap_or(DEFAULT_HTTP_RETRIES),
                http_timeout_secs: parse_var("HTTP_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            })
        }

        pub fn require_gemini_api_key(&self) -> anyhow::Result<&str> {
            self.gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required")
        }

        pub fn require_youtube_api_key(&self) -> anyhow::Result<&str> {
            self.youtube_api_key
                .as_deref()
                .context("YOUTUBE_API_KEY is required")
        }
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                gemini_api_key: None,
                youtube_api_key: None,
                sentry_dsn: None,
                output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
                http_retries: DEFAULT_HTTP_RETRIES,
                http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            }
        }
    }

    /// Read on its own so error reporting still comes up when other settings are invalid.
    pub fn sentry_dsn() -> Option<String> {
        non_empty_var("SENTRY_DSN")
    }

    pub(crate) fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Optional numeric override read by a provider client. A malformed value is logged
    /// and the default is used, so one bad knob does not take a step offline.
    pub(crate) fn var_or<T>(key: &str, default: T) -> T
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match parse_var::<T>(key) {
            Ok(value) => value.unwrap_or(default),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring malformed override");
                default
            }
        }
    }

    fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        non_empty_var(key)
            .map(|s| {
                s.parse::<T>()
                    .with_context(|| format!("{key} has an invalid value: {s}"))
            })
            .transpose()
    }

}
