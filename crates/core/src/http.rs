use crate::config::Settings;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) jasontv/0.1";

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << shift)
    }
}

/// Shared HTTP client: one timeout and one retry policy for every provider.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: build_reqwest(timeout)?,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            Duration::from_secs(settings.http_timeout_secs),
            RetryPolicy {
                max_attempts: settings.http_retries,
                ..RetryPolicy::default()
            },
        )
    }

    /// Same retry policy, different request timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_reqwest(timeout)?,
            retry: self.retry,
        })
    }

    /// GET `url` and decode a successful JSON body into `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        what: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let (status, text) = self
            .send_with_retry(what, || self.http.get(url).query(query))
            .await?;

        if !status.is_success() {
            anyhow::bail!("{what} HTTP {status}: {}", truncate(&text, 512));
        }

        serde_json::from_str::<T>(&text).with_context(|| {
            format!("failed to decode {what} response: {}", truncate(&text, 512))
        })
    }

    /// POST a JSON body. Returns the final status and body text; callers decide what a
    /// non-success status means.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        what: &'static str,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> Result<(StatusCode, String)> {
        self.send_with_retry(what, || {
            self.http.post(url).headers(headers.clone()).json(body)
        })
        .await
    }

    async fn send_with_retry<F>(&self, what: &'static str, make: F) -> Result<(StatusCode, String)>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.retry.max_attempts;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            // A body cut off mid-read is as transient as a failed send.
            let outcome = match make().send().await {
                Ok(res) => {
                    let status = res.status();
                    res.text().await.map(|text| (status, text))
                }
                Err(err) => Err(err),
            };

            let (status, text) = match outcome {
                Ok(ok) => ok,
                Err(err) => {
                    if attempt >= max_attempts {
                        return Err(err).with_context(|| format!("{what} request failed"));
                    }
                    let backoff = self.retry.backoff(attempt);
                    tracing::warn!(attempt, ?backoff, what, error = %err, "request failed; retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            if is_retryable(status) && attempt < max_attempts {
                let backoff = self.retry.backoff(attempt);
                tracing::warn!(attempt, ?backoff, what, http_status = %status, "HTTP error; retrying");
                tokio::time::sleep(backoff).await;
                continue;
            }

            return Ok((status, text));
        }
    }
}

fn build_reqwest(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("failed to build reqwest client")
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
pub(crate) fn test_client(max_attempts: u32) -> HttpClient {
    HttpClient::new(
        Duration::from_secs(5),
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        },
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Ping {
        ok: bool,
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("台積電2330", 3), "台積電");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn get_json_decodes_success_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/ping").query_param("q", "1");
                then.status(200).json_body(json!({"ok": true}));
            })
            .await;

        let client = test_client(3);
        let ping: Ping = client
            .get_json("ping", &server.url("/ping"), &[("q", "1".to_string())])
            .await
            .unwrap();

        assert!(ping.ok);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limits_are_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/limited");
                then.status(429).body("slow down");
            })
            .await;

        let client = test_client(2);
        let err = client
            .get_json::<Ping>("limited", &server.url("/limited"), &[])
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("429"));
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn transport_errors_fail_after_all_attempts() {
        // Bind then drop a listener so the port is known to refuse connections.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let client = test_client(3);
        let err = client
            .get_json::<Ping>("refused", &format!("http://127.0.0.1:{port}/ping"), &[])
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("refused request failed"));
    }

    #[tokio::test]
    async fn truncated_bodies_are_retried() {
        use std::io::{Read, Write};

        // First connection promises 100 bytes and hangs up early; the second is well formed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let replies = [
                "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n{\"ok\"",
                "HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"ok\":true}",
            ];
            for reply in replies {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });

        let ping: Ping = test_client(2)
            .get_json("short", &format!("http://{addr}/ping"), &[])
            .await
            .unwrap();

        assert!(ping.ok);
        server.join().unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/html");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let err = test_client(1)
            .get_json::<Ping>("html", &server.url("/html"), &[])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to decode html response"));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_attempts_run_out() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/flaky");
                then.status(503).body("unavailable");
            })
            .await;

        let client = test_client(3);
        let err = client
            .get_json::<Ping>("flaky", &server.url("/flaky"), &[])
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("503"));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404).body("nope");
            })
            .await;

        let client = test_client(3);
        assert!(client
            .get_json::<Ping>("missing", &server.url("/missing"), &[])
            .await
            .is_err());
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn post_json_returns_final_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/echo").json_body(json!({"a": 1}));
                then.status(400).body("bad request");
            })
            .await;

        let client = test_client(2);
        let (status, body) = client
            .post_json("echo", &server.url("/echo"), HeaderMap::new(), &json!({"a": 1}))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "bad request");
    }
}
