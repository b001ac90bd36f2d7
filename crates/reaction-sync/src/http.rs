//! HTTP gateway against the hosted backend's REST surface.
//!
//! The backend exposes a PostgREST-style API: one RPC endpoint for the
//! toggle mutation and filtered reads over the `reactions` table. Counts
//! use the exact-count preference header so the backend answers from the
//! planner instead of shipping rows.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode, header};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::{ReactionError, Result};
use crate::gateway::{ReactionGateway, ToggleResponse, map_reaction_rows};
use crate::store::ReactionEntry;

const REACTIONS_TABLE: &str = "reactions";
const TOGGLE_RPC: &str = "toggle_reaction";
const LIST_SELECT: &str = "id,subject_id,actor_id,created_at,profiles(display_name)";

/// Coarse failure class derived from an HTTP status, for logs and error
/// text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorClass {
    Auth,
    RateLimited,
    Validation,
    Network,
    Unknown,
}

impl GatewayErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

#[must_use]
pub fn classify_status(status: StatusCode) -> GatewayErrorClass {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayErrorClass::Auth,
        StatusCode::TOO_MANY_REQUESTS => GatewayErrorClass::RateLimited,
        StatusCode::BAD_REQUEST
        | StatusCode::UNPROCESSABLE_ENTITY
        | StatusCode::CONFLICT
        | StatusCode::NOT_FOUND => GatewayErrorClass::Validation,
        status if status.is_server_error() => GatewayErrorClass::Network,
        _ => GatewayErrorClass::Unknown,
    }
}

/// Reqwest-backed [`ReactionGateway`].
#[derive(Clone)]
pub struct HttpReactionGateway {
    client: HttpClient,
    config: GatewayConfig,
}

impl HttpReactionGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = HttpClient::builder()
            .build()
            .map_err(|error| ReactionError::Remote(format!("http client init failed: {error}")))?;
        Ok(Self { client, config })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{REACTIONS_TABLE}", self.config.base_url)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{TOGGLE_RPC}", self.config.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header(header::ACCEPT, "application/json")
            .timeout(self.config.call_timeout);
        match self.config.api_key.as_deref() {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<Response> {
        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                ReactionError::Timeout(self.config.call_timeout)
            } else {
                ReactionError::Remote(format!("{context} request failed: {error}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let class = classify_status(status);
        let body = response.text().await.unwrap_or_default();
        debug!(
            "{context} failed class={} status={} body={}",
            class.as_str(),
            status.as_u16(),
            body
        );
        Err(ReactionError::Remote(format!(
            "{context} failed ({}) status={}",
            class.as_str(),
            status.as_u16()
        )))
    }

    async fn json_body(response: Response, context: &str) -> Result<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|error| ReactionError::Remote(format!("{context} parse failed: {error}")))
    }
}

#[async_trait]
impl ReactionGateway for HttpReactionGateway {
    async fn toggle_reaction(&self, subject_id: &str, actor_id: &str) -> Result<ToggleResponse> {
        let request = self.authorized(self.client.post(self.rpc_url())).json(&json!({
            "p_subject_id": subject_id,
            "p_actor_id": actor_id,
        }));
        let response = self.send(request, "toggle").await?;
        let body = Self::json_body(response, "toggle").await?;
        parse_toggle_body(&body)
    }

    async fn reaction_count(&self, subject_id: &str) -> Result<u64> {
        let subject_filter = format!("eq.{subject_id}");
        let request = self
            .authorized(self.client.get(self.table_url()))
            .header("Prefer", "count=exact")
            .header(header::RANGE, "0-0")
            .query(&[("select", "id"), ("subject_id", subject_filter.as_str())]);
        let response = self.send(request, "count").await?;
        parse_content_range_total(&response)
    }

    async fn my_reaction_status(&self, subject_id: &str, actor_id: &str) -> Result<bool> {
        let subject_filter = format!("eq.{subject_id}");
        let actor_filter = format!("eq.{actor_id}");
        let request = self.authorized(self.client.get(self.table_url())).query(&[
            ("select", "id"),
            ("subject_id", subject_filter.as_str()),
            ("actor_id", actor_filter.as_str()),
            ("limit", "1"),
        ]);
        let response = self.send(request, "status").await?;
        let body = Self::json_body(response, "status").await?;
        Ok(body.as_array().is_some_and(|rows| !rows.is_empty()))
    }

    async fn list_reactions(&self, subject_id: &str) -> Result<Vec<ReactionEntry>> {
        let subject_filter = format!("eq.{subject_id}");
        let request = self.authorized(self.client.get(self.table_url())).query(&[
            ("select", LIST_SELECT),
            ("subject_id", subject_filter.as_str()),
            ("order", "created_at.desc"),
        ]);
        let response = self.send(request, "list").await?;
        let body = Self::json_body(response, "list").await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ReactionError::Remote("list returned a non-array body".to_string()))?;
        Ok(map_reaction_rows(rows))
    }
}

/// Parses the RPC toggle response, accepting the object and single-element
/// array shapes the backend is known to produce.
fn parse_toggle_body(body: &Value) -> Result<ToggleResponse> {
    let record = match body {
        Value::Array(rows) => rows
            .first()
            .ok_or_else(|| ReactionError::Remote("toggle returned an empty array".to_string()))?,
        other => other,
    };
    let liked_by_me = record
        .get("liked")
        .or_else(|| record.get("liked_by_me"))
        .and_then(Value::as_bool)
        .ok_or_else(|| ReactionError::Remote("toggle response missing liked flag".to_string()))?;
    let count = record
        .get("count")
        .or_else(|| record.get("reaction_count"))
        .and_then(Value::as_u64)
        .ok_or_else(|| ReactionError::Remote("toggle response missing count".to_string()))?;
    let success = record
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    Ok(ToggleResponse {
        success,
        liked_by_me,
        count,
    })
}

/// Extracts the total from a `Content-Range: 0-0/N` header.
fn parse_content_range_total(response: &Response) -> Result<u64> {
    let raw = response
        .headers()
        .get(header::CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ReactionError::Remote("count response missing content-range".to_string()))?;
    let total = raw
        .rsplit('/')
        .next()
        .and_then(|total| total.parse::<u64>().ok())
        .ok_or_else(|| {
            ReactionError::Remote(format!("count response has malformed content-range: {raw}"))
        })?;
    Ok(total)
}
