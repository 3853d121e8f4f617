//! REST key-value client speaking the Upstash command-over-HTTP protocol.
//!
//! Each command is one request against `{base}/{command}/{key}` with bearer
//! authentication. Responses carry a JSON envelope with either a `result` or
//! an `error` member.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheKey, KvError, KvResult, KvStore};
use crate::config::KvSettings;

use super::error::InfraError;

/// Tracing target for key-value client operations.
pub const TRACING_TARGET: &str = "inkpost::kv";

const USER_AGENT: &str = concat!("inkpost/", env!("CARGO_PKG_VERSION"));

struct Endpoint {
    http: Client,
    base: Url,
    token: String,
}

/// [`KvStore`] backed by a remote REST key-value service.
///
/// Without an endpoint or token the client stays usable: every command
/// reports [`KvError::NotConfigured`] and no request is made.
pub struct RestKvClient {
    endpoint: Option<Endpoint>,
}

impl std::fmt::Debug for RestKvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestKvClient")
            .field("base", &self.endpoint.as_ref().map(|e| e.base.as_str()))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

impl RestKvClient {
    pub fn new(settings: &KvSettings) -> Result<Self, InfraError> {
        match (settings.url.clone(), settings.token.clone()) {
            (Some(url), Some(token)) => Self::from_parts(url, token, settings.request_timeout),
            _ => {
                warn!(
                    target: TRACING_TARGET,
                    "Key-value REST url or token missing; comment cache disabled"
                );
                Ok(Self::unconfigured())
            }
        }
    }

    pub fn from_parts(
        base: Url,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        if base.cannot_be_a_base() {
            return Err(InfraError::configuration(format!(
                "key-value url `{base}` cannot carry a path"
            )));
        }

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| InfraError::http(err.to_string()))?;

        debug!(
            target: TRACING_TARGET,
            base = %base,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Key-value client created"
        );

        Ok(Self {
            endpoint: Some(Endpoint {
                http,
                base,
                token: token.into(),
            }),
        })
    }

    pub fn unconfigured() -> Self {
        Self { endpoint: None }
    }

    fn endpoint(&self) -> KvResult<&Endpoint> {
        self.endpoint.as_ref().ok_or(KvError::NotConfigured)
    }

    async fn execute(&self, command: &'static str, request: RequestBuilder) -> KvResult<Value> {
        let endpoint = self.endpoint()?;
        let response = request
            .bearer_auth(&endpoint.token)
            .send()
            .await
            .map_err(|err| transport_error(command, &err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| transport_error(command, &err))?;

        if !status.is_success() {
            return Err(KvError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|err| KvError::Malformed(format!("{command} response: {err}")))?;

        if let Some(detail) = envelope.error {
            return Err(KvError::Rejected { command, detail });
        }

        Ok(envelope.result)
    }
}

impl Endpoint {
    fn command_url(&self, command: &str, key: Option<&CacheKey>) -> KvResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| KvError::Transport("endpoint cannot carry a path".to_string()))?;
            segments.pop_if_empty().push(command);
            if let Some(key) = key {
                segments.push(key.as_str());
            }
        }
        Ok(url)
    }
}

fn transport_error(command: &str, err: &reqwest::Error) -> KvError {
    if err.is_timeout() {
        KvError::Transport(format!("{command} timed out"))
    } else {
        KvError::Transport(format!("{command}: {err}"))
    }
}

fn is_pong(result: &Value) -> bool {
    match result {
        Value::String(text) => text.eq_ignore_ascii_case("pong"),
        Value::Number(number) => number.as_u64() == Some(1),
        Value::Bool(flag) => *flag,
        _ => false,
    }
}

#[async_trait]
impl KvStore for RestKvClient {
    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn ping(&self) -> KvResult<()> {
        let endpoint = self.endpoint()?;
        let url = endpoint.command_url("ping", None)?;
        let result = self.execute("ping", endpoint.http.get(url)).await?;
        if is_pong(&result) {
            Ok(())
        } else {
            Err(KvError::Rejected {
                command: "ping",
                detail: format!("unexpected reply {result}"),
            })
        }
    }

    async fn get(&self, key: &CacheKey) -> KvResult<Option<CacheEntry>> {
        let endpoint = self.endpoint()?;
        let url = endpoint.command_url("get", Some(key))?;
        match self.execute("get", endpoint.http.get(url)).await? {
            Value::Null => Ok(None),
            Value::String(raw) => CacheEntry::decode(&raw)
                .map(Some)
                .map_err(|err| KvError::Malformed(err.to_string())),
            other => Err(KvError::Malformed(format!(
                "get returned a non-string value: {other}"
            ))),
        }
    }

    async fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> KvResult<()> {
        let endpoint = self.endpoint()?;
        let raw = entry
            .encode()
            .map_err(|err| KvError::Malformed(err.to_string()))?;
        let mut url = endpoint.command_url("set", Some(key))?;
        url.query_pairs_mut()
            .append_pair("EX", &ttl.as_secs().max(1).to_string());

        match self.execute("set", endpoint.http.post(url).body(raw)).await? {
            Value::String(reply) if reply == "OK" => Ok(()),
            other => Err(KvError::Rejected {
                command: "set",
                detail: format!("unexpected reply {other}"),
            }),
        }
    }

    async fn delete(&self, key: &CacheKey) -> KvResult<()> {
        let endpoint = self.endpoint()?;
        let url = endpoint.command_url("del", Some(key))?;
        match self.execute("del", endpoint.http.post(url)).await? {
            Value::Number(removed) if removed.as_u64().is_some() => Ok(()),
            other => Err(KvError::Rejected {
                command: "del",
                detail: format!("unexpected reply {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::domain::comments::Comment;

    fn client(server: &MockServer) -> RestKvClient {
        let base = Url::parse(&format!("{}/", server.base_url())).expect("base url");
        RestKvClient::from_parts(base, "secret", Duration::from_secs(5)).expect("client")
    }

    fn sample_entry() -> CacheEntry {
        CacheEntry::new(vec![Comment {
            id: "c1".to_string(),
            post_id: "post-1".to_string(),
            content: "first".to_string(),
            author_id: "u1".to_string(),
            author_name: "Ada".to_string(),
            created_at: datetime!(2024-05-01 12:00:00 UTC),
        }])
    }

    #[tokio::test]
    async fn ping_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET")
                    .path("/ping")
                    .header("authorization", "Bearer secret");
                then.status(200).json_body(json!({ "result": "PONG" }));
            })
            .await;

        client(&server).ping().await.expect("ping");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn ping_accepts_numeric_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/ping");
                then.status(200).json_body(json!({ "result": 1 }));
            })
            .await;

        assert_eq!(client(&server).ping().await, Ok(()));
    }

    #[tokio::test]
    async fn ping_rejects_unexpected_reply() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/ping");
                then.status(200).json_body(json!({ "result": "NOPE" }));
            })
            .await;

        assert!(matches!(
            client(&server).ping().await,
            Err(KvError::Rejected { command: "ping", .. })
        ));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/ping");
                then.status(401).body("unauthorized");
            })
            .await;

        assert_eq!(
            client(&server).ping().await,
            Err(KvError::Status {
                status: 401,
                body: "unauthorized".to_string()
            })
        );
    }

    #[tokio::test]
    async fn error_envelope_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/get/comments:post-1");
                then.status(200)
                    .json_body(json!({ "error": "WRONGTYPE Operation against a key" }));
            })
            .await;

        let result = client(&server).get(&CacheKey::comments("post-1")).await;
        assert!(matches!(
            result,
            Err(KvError::Rejected { command: "get", .. })
        ));
    }

    #[tokio::test]
    async fn get_decodes_stored_entry() {
        let server = MockServer::start_async().await;
        let entry = sample_entry();
        let raw = entry.encode().expect("encode");
        server
            .mock_async(move |when, then| {
                when.method("GET").path("/get/comments:post-1");
                then.status(200).json_body(json!({ "result": raw }));
            })
            .await;

        let fetched = client(&server)
            .get(&CacheKey::comments("post-1"))
            .await
            .expect("get");
        assert_eq!(fetched, Some(entry));
    }

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/get/comments:post-2");
                then.status(200).json_body(json!({ "result": null }));
            })
            .await;

        let fetched = client(&server)
            .get(&CacheKey::comments("post-2"))
            .await
            .expect("get");
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn get_unreadable_value_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/get/comments:post-3");
                then.status(200).json_body(json!({ "result": "[1,2,3]" }));
            })
            .await;

        let result = client(&server).get(&CacheKey::comments("post-3")).await;
        assert!(matches!(result, Err(KvError::Malformed(_))));
    }

    #[tokio::test]
    async fn set_posts_value_with_expiry() {
        let server = MockServer::start_async().await;
        let entry = sample_entry();
        let raw = entry.encode().expect("encode");
        let mock = server
            .mock_async(move |when, then| {
                when.method("POST")
                    .path("/set/comments:post-1")
                    .query_param("EX", "120")
                    .body(raw);
                then.status(200).json_body(json!({ "result": "OK" }));
            })
            .await;

        client(&server)
            .set(
                &CacheKey::comments("post-1"),
                &entry,
                Duration::from_secs(120),
            )
            .await
            .expect("set");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_accepts_zero_removed() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("POST").path("/del/comments:post-1");
                then.status(200).json_body(json!({ "result": 0 }));
            })
            .await;

        client(&server)
            .delete(&CacheKey::comments("post-1"))
            .await
            .expect("delete");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn base_path_is_preserved_without_double_slash() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method("GET").path("/redis/ping");
                then.status(200).json_body(json!({ "result": "PONG" }));
            })
            .await;

        let base = Url::parse(&format!("{}/redis/", server.base_url())).expect("base url");
        let client =
            RestKvClient::from_parts(base, "secret", Duration::from_secs(5)).expect("client");
        client.ping().await.expect("ping");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unconfigured_client_never_calls_out() {
        let client = RestKvClient::unconfigured();

        assert!(!client.is_configured());
        assert_eq!(client.ping().await, Err(KvError::NotConfigured));
        assert_eq!(
            client.get(&CacheKey::comments("post-1")).await,
            Err(KvError::NotConfigured)
        );
    }

    #[test]
    fn missing_token_leaves_client_unconfigured() {
        let settings = KvSettings {
            url: Url::parse("https://kv.example.com").ok(),
            token: None,
            default_ttl_seconds: std::num::NonZeroU64::MIN,
            health_check_cooldown: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        };

        let client = RestKvClient::new(&settings).expect("client");
        assert!(!client.is_configured());
    }
}
