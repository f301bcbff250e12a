//! Record Gateway Module
//!
//! Thin REST client for the valuation records store: CRUD plus the manager
//! workflow (approve, reject, request rework). Reads go through a process-wide
//! response cache; every write invalidates the cached entries of the record
//! type right after it completes. Reads never invalidate.

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Path segment and cache namespace of the record type.
pub const RESOURCE: &str = "bom-flat";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server answered with a failure; `message` is its own when given.
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
    #[error("invalid response from records service: {0}")]
    InvalidResponse(String),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Human-readable message for display.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

pub type GatewayResult = Result<Value, GatewayError>;

/// Who performs an operation; the server checks access with it.
#[derive(Debug, Clone)]
pub struct Actor {
    pub username: String,
    pub role: String,
    pub client_id: Option<String>,
}

impl Actor {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("username", self.username.clone()), ("userRole", self.role.clone())];
        if let Some(client_id) = &self.client_id {
            params.push(("clientId", client_id.clone()));
        }
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecisionBody<'a> {
    action: Decision,
    feedback: &'a str,
    username: &'a str,
    user_role: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReworkBody<'a> {
    rework_comments: &'a str,
    username: &'a str,
    user_role: &'a str,
}

/// Operations offered by the records store.
pub trait RecordGateway {
    fn create(&self, record: &Value) -> GatewayResult;
    fn list(&self, filters: &[(&str, &str)]) -> GatewayResult;
    fn get_by_id(&self, id: &str, actor: &Actor) -> GatewayResult;
    fn update(&self, id: &str, record: &Value, actor: &Actor) -> GatewayResult;
    fn delete(&self, id: &str) -> GatewayResult;
    fn bulk_delete(&self, ids: &[String]) -> GatewayResult;
    fn manager_decision(&self, id: &str, decision: Decision, feedback: &str, actor: &Actor) -> GatewayResult;
    fn request_rework(&self, id: &str, comments: &str, actor: &Actor) -> GatewayResult;
}

/// Time-limited cache of decoded responses, keyed by request.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cache shared by every gateway in the process.
    pub fn global() -> Arc<ResponseCache> {
        static GLOBAL: OnceLock<Arc<ResponseCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ResponseCache::new(DEFAULT_CACHE_TTL))))
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, Value)>> {
        // A panic while holding the lock cannot leave a map half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: Value) {
        self.entries().insert(key.to_string(), (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Drops every entry whose key starts with `prefix`; returns how many.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// `RecordGateway` over HTTP + JSON.
pub struct HttpRecordGateway {
    base_url: String,
    agent: ureq::Agent,
    cache: Arc<ResponseCache>,
}

fn with_query<B>(mut request: ureq::RequestBuilder<B>, query: &[(&str, String)]) -> ureq::RequestBuilder<B> {
    for (key, value) in query {
        request = request.query(*key, value.as_str());
    }
    request
}

fn cache_key(path: &str, query: &[(&str, String)]) -> String {
    let mut key = path.to_string();
    for (i, (k, v)) in query.iter().enumerate() {
        key.push(if i == 0 { '?' } else { '&' });
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

/// Unwraps the `{ success, data, message }` envelope of a response body.
fn interpret(status: u16, body: &str) -> GatewayResult {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string);

    if !(200..300).contains(&status) {
        return Err(GatewayError::Server {
            status,
            message: message.unwrap_or_else(|| format!("Request failed with status code {status}")),
        });
    }

    let parsed = match parsed {
        Some(value) => value,
        None if body.trim().is_empty() => return Ok(Value::Null),
        None => return Err(GatewayError::InvalidResponse("body is not JSON".to_string())),
    };

    if parsed.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(GatewayError::Server {
            status,
            message: message.unwrap_or_else(|| "Request was not successful".to_string()),
        });
    }

    Ok(match parsed.get("data") {
        Some(data) => data.clone(),
        None => parsed,
    })
}

impl HttpRecordGateway {
    pub fn new(base_url: &str) -> Self {
        Self::with_cache(base_url, ResponseCache::global())
    }

    pub fn with_cache(base_url: &str, cache: Arc<ResponseCache>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: config.into(),
            cache,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn execute(&self, method: Method, path: &str, query: &[(&str, String)], body: Option<&Value>) -> GatewayResult {
        let url = self.url(path);
        let payload = body.map(Value::to_string).unwrap_or_default();
        debug!("{:?} {}", method, url);

        let sent = match method {
            Method::Get => with_query(self.agent.get(&url), query).call(),
            Method::Delete => with_query(self.agent.delete(&url), query).call(),
            Method::Post => with_query(self.agent.post(&url), query)
                .header("Content-Type", "application/json")
                .send(payload.as_bytes()),
            Method::Put => with_query(self.agent.put(&url), query)
                .header("Content-Type", "application/json")
                .send(payload.as_bytes()),
            Method::Patch => with_query(self.agent.patch(&url), query)
                .header("Content-Type", "application/json")
                .send(payload.as_bytes()),
        };

        let response = sent.map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .into_body()
            .read_to_string()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let result = interpret(status, &text);
        if let Err(e) = &result {
            warn!("{:?} {} failed: {}", method, url, e);
        }
        result
    }

    fn cached_get(&self, path: &str, query: &[(&str, String)]) -> GatewayResult {
        let key = cache_key(path, query);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }
        let value = self.execute(Method::Get, path, query, None)?;
        self.cache.put(&key, value.clone());
        Ok(value)
    }

    fn mutate(&self, method: Method, path: &str, query: &[(&str, String)], body: Option<&Value>) -> GatewayResult {
        let result = self.execute(method, path, query, body);
        let dropped = self.cache.invalidate_prefix(RESOURCE);
        debug!("Invalidated {} cached {} responses.", dropped, RESOURCE);
        result
    }
}

impl RecordGateway for HttpRecordGateway {
    fn create(&self, record: &Value) -> GatewayResult {
        self.mutate(Method::Post, RESOURCE, &[], Some(record))
    }

    fn list(&self, filters: &[(&str, &str)]) -> GatewayResult {
        let mut query: Vec<(&str, String)> = filters.iter().map(|(k, v)| (*k, v.to_string())).collect();
        query.sort();
        self.cached_get(RESOURCE, &query)
    }

    fn get_by_id(&self, id: &str, actor: &Actor) -> GatewayResult {
        self.cached_get(&format!("{RESOURCE}/{id}"), &actor.query())
    }

    fn update(&self, id: &str, record: &Value, actor: &Actor) -> GatewayResult {
        self.mutate(Method::Put, &format!("{RESOURCE}/{id}"), &actor.query(), Some(record))
    }

    fn delete(&self, id: &str) -> GatewayResult {
        self.mutate(Method::Delete, &format!("{RESOURCE}/{id}"), &[], None)
    }

    fn bulk_delete(&self, ids: &[String]) -> GatewayResult {
        self.mutate(Method::Post, &format!("{RESOURCE}/bulk-delete"), &[], Some(&json!({ "ids": ids })))
    }

    fn manager_decision(&self, id: &str, decision: Decision, feedback: &str, actor: &Actor) -> GatewayResult {
        debug!("Recording {} decision on {}", decision.as_str(), id);
        let body = serde_json::to_value(DecisionBody {
            action: decision,
            feedback,
            username: &actor.username,
            user_role: &actor.role,
        })?;
        self.mutate(Method::Patch, &format!("{RESOURCE}/{id}/approve"), &[], Some(&body))
    }

    fn request_rework(&self, id: &str, comments: &str, actor: &Actor) -> GatewayResult {
        let body = serde_json::to_value(ReworkBody {
            rework_comments: comments,
            username: &actor.username,
            user_role: &actor.role,
        })?;
        self.mutate(Method::Post, &format!("{RESOURCE}/{id}/request-rework"), &[], Some(&body))
    }
}
