//! REST client for the upstream pattern service.
//!
//! One client per bridge process; connection pooling and keep-alive are
//! reqwest's job. Every call reflects current upstream state — the client
//! performs no caching and no automatic retries, so a failure is reported
//! to the caller exactly once.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use pb_config::ServerConfig;
use pb_types::{
    BridgeError, BridgeResult, ModelInventory, PatternDescriptor, RunRequest, RunResult, Strategy,
};

/// Header carrying the upstream credential, attached only when configured.
pub const API_KEY_HEADER: &str = "x-api-key";

pub struct UpstreamClient {
    client: Client,
    base_url: Url,
}

#[derive(Serialize)]
struct RunBody<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl UpstreamClient {
    pub fn new(config: &ServerConfig) -> BridgeResult<Self> {
        let mut headers = HeaderMap::new();
        let agent = format!("pattern-bridge/{}", env!("CARGO_PKG_VERSION"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent)
                .map_err(|e| BridgeError::Config(format!("invalid user agent: {e}")))?,
        );
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(key).map_err(|e| {
                BridgeError::Config(format!("credential is not a valid header value: {e}"))
            })?;
            // Keeps the credential out of Debug output and logs.
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;

        // A directory-style base makes joins behave under path prefixes.
        let mut base_url = config.upstream_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        debug!(
            upstream = %base_url,
            authenticated = config.api_key.is_some(),
            "upstream client ready"
        );

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> BridgeResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| BridgeError::Config(format!("invalid endpoint path '{path}': {e}")))
    }

    /// `GET /patterns/names` — the ordered list of pattern names.
    pub async fn list_pattern_names(&self) -> BridgeResult<Vec<String>> {
        let url = self.endpoint("/patterns/names")?;
        debug!(%url, "listing pattern names");
        let response = self.get(url).await?;
        let response = check_status(response, None).await?;
        decode_json(response, "pattern name list").await
    }

    /// `GET /patterns/{name}` — full descriptor for one pattern.
    pub async fn get_pattern(&self, name: &str) -> BridgeResult<PatternDescriptor> {
        let url = self.endpoint(&format!("/patterns/{name}"))?;
        debug!(%url, "fetching pattern detail");
        let response = self.get(url).await?;
        let response = check_status(response, Some(name)).await?;
        decode_json(response, "pattern detail").await
    }

    /// `POST /patterns/{name}/run` without streaming; suspends until the
    /// full result is parsed.
    pub async fn run_pattern(&self, request: &RunRequest) -> BridgeResult<RunResult> {
        let response = self.send_run(request, false).await?;
        let response = check_status(response, Some(&request.pattern_name)).await?;
        decode_json(response, "run result").await
    }

    /// `POST /patterns/{name}/run` with `stream: true`; returns as soon as
    /// response headers arrive. The caller owns the response body and
    /// feeds it to the stream translator; dropping it releases the
    /// upstream connection.
    pub async fn run_pattern_stream(&self, request: &RunRequest) -> BridgeResult<reqwest::Response> {
        let response = self.send_run(request, true).await?;
        check_status(response, Some(&request.pattern_name)).await
    }

    /// `GET /models/names` — configured models, flat and grouped by vendor.
    pub async fn list_models(&self) -> BridgeResult<ModelInventory> {
        let url = self.endpoint("/models/names")?;
        debug!(%url, "listing models");
        let response = self.get(url).await?;
        let response = check_status(response, None).await?;
        decode_json(response, "model inventory").await
    }

    /// `GET /strategies` — available strategies. Entries without a usable
    /// name or description are skipped, matching the upstream's lenient
    /// listing behavior.
    pub async fn list_strategies(&self) -> BridgeResult<Vec<Strategy>> {
        let url = self.endpoint("/strategies")?;
        debug!(%url, "listing strategies");
        let response = self.get(url).await?;
        let response = check_status(response, None).await?;
        let entries: Vec<Value> = decode_json(response, "strategy list").await?;

        let mut strategies = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<Strategy>(entry.clone()) {
                Ok(strategy)
                    if !strategy.name.trim().is_empty()
                        && !strategy.description.trim().is_empty() =>
                {
                    strategies.push(strategy);
                }
                _ => warn!(?entry, "skipping strategy entry with missing fields"),
            }
        }
        Ok(strategies)
    }

    /// `GET /config` — raw upstream configuration. Redaction of sensitive
    /// values is the dispatcher's responsibility, not the client's.
    pub async fn raw_configuration(&self) -> BridgeResult<Map<String, Value>> {
        let url = self.endpoint("/config")?;
        debug!(%url, "fetching upstream configuration");
        let response = self.get(url).await?;
        let response = check_status(response, None).await?;
        decode_json(response, "configuration").await
    }

    async fn get(&self, url: Url) -> BridgeResult<reqwest::Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(e, url.as_str()))
    }

    async fn send_run(&self, request: &RunRequest, stream: bool) -> BridgeResult<reqwest::Response> {
        let url = self.endpoint(&format!("/patterns/{}/run", request.pattern_name))?;
        let body = RunBody {
            input: &request.input_text,
            model: request.model_name.as_deref(),
            stream,
        };
        debug!(%url, pattern = %request.pattern_name, stream, "running pattern");
        self.client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, url.as_str()))
    }
}

/// Connection-establishment failures are `UpstreamUnreachable`; a
/// non-responsive established connection is `UpstreamTimeout`. A connect
/// that times out counts as establishment failure, so the connect check
/// comes first.
fn transport_error(error: reqwest::Error, url: &str) -> BridgeError {
    if error.is_connect() {
        BridgeError::UpstreamUnreachable(format!("{url}: {error}"))
    } else if error.is_timeout() {
        BridgeError::UpstreamTimeout(format!("{url}: {error}"))
    } else {
        BridgeError::UpstreamUnreachable(format!("{url}: {error}"))
    }
}

async fn check_status(
    response: reqwest::Response,
    pattern_name: Option<&str>,
) -> BridgeResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        if let Some(name) = pattern_name {
            return Err(BridgeError::NotFound(name.to_string()));
        }
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BridgeError::UpstreamAuth {
            status: status.as_u16(),
            body,
        }),
        _ => Err(BridgeError::UpstreamError {
            status: status.as_u16(),
            body,
        }),
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> BridgeResult<T> {
    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            BridgeError::UpstreamTimeout(format!("reading {what}: {e}"))
        } else {
            BridgeError::StreamInterrupted(format!("reading {what}: {e}"))
        }
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| BridgeError::MalformedResponse(format!("decoding {what}: {e}")))
}
