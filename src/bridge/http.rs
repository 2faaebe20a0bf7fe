//! HTTP script body executor
//!
//! Turns a resolved script `request` into a single reqwest call:
//!
//! ```yaml
//! request:
//!   method: POST
//!   url: /users            # absolute, or relative to http.base_url
//!   headers: { Authorization: "Bearer ${token}" }
//!   query: { verbose: true }
//!   body: { name: "${user_name}" }
//!   expect_status: [200, 201]
//!   extract:
//!     user_id: /id         # JSON pointer into the response body
//! ```
//!
//! Transport errors are returned as [`BridgeError`]; an unexpected status or
//! a missing extraction is a failed [`BodyOutcome`]. There are no
//! transport-level retries here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{BodyOutcome, BridgeError, ScriptBodyExecutor, ScriptInvocation};
use crate::context::resolver::value_to_string;
use crate::definition::ParamMap;

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ExpectStatus {
    One(u16),
    Many(Vec<u16>),
}

impl ExpectStatus {
    fn matches(&self, status: u16) -> bool {
        match self {
            ExpectStatus::One(code) => *code == status,
            ExpectStatus::Many(codes) => codes.contains(&status),
        }
    }
}

/// The request shape accepted by [`HttpScriptExecutor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    #[serde(default = "default_method")]
    pub method: String,

    pub url: String,

    #[serde(default)]
    pub headers: HashMap<String, Value>,

    #[serde(default)]
    pub query: HashMap<String, Value>,

    #[serde(default)]
    pub body: Option<Value>,

    /// Accepted status codes (any 2xx when absent)
    #[serde(default)]
    pub expect_status: Option<ExpectStatus>,

    /// Output variable name → JSON pointer into the response body
    #[serde(default)]
    pub extract: HashMap<String, String>,
}

impl HttpRequest {
    pub fn from_value(request: &Value) -> Result<Self, BridgeError> {
        if request.is_null() {
            return Err(BridgeError::InvalidRequest(
                "script has no request".to_string(),
            ));
        }
        serde_json::from_value(request.clone())
            .map_err(|e| BridgeError::InvalidRequest(e.to_string()))
    }

    pub fn status_accepted(&self, status: u16) -> bool {
        match &self.expect_status {
            Some(expected) => expected.matches(status),
            None => (200..300).contains(&status),
        }
    }
}

/// Pull output variables out of a response body
///
/// Pointers may be written as JSON pointers (`/data/id`) or dotted paths
/// (`data.id`).
pub fn extract_outputs(
    body: &Value,
    extract: &HashMap<String, String>,
) -> Result<ParamMap, String> {
    let mut outputs = ParamMap::new();
    for (name, pointer) in extract {
        let pointer = if pointer.starts_with('/') || pointer.is_empty() {
            pointer.clone()
        } else {
            format!("/{}", pointer.replace('.', "/"))
        };
        let value = body
            .pointer(&pointer)
            .ok_or_else(|| format!("extract '{}': no value at {}", name, pointer))?;
        outputs.insert(name.clone(), value.clone());
    }
    Ok(outputs)
}

#[derive(Debug)]
pub struct HttpScriptExecutor {
    config: HttpConfig,
    client: reqwest::Client,
}

impl HttpScriptExecutor {
    pub fn new(config: HttpConfig) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn build_url(&self, url: &str) -> Result<String, BridgeError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(url.to_string());
        }
        let base = self.config.base_url.as_deref().ok_or_else(|| {
            BridgeError::InvalidRequest(format!(
                "relative url '{}' requires http.base_url",
                url
            ))
        })?;
        let base = base.trim_end_matches('/');
        let path = if url.starts_with('/') {
            url.to_string()
        } else {
            format!("/{}", url)
        };
        Ok(format!("{}{}", base, path))
    }

    fn build_request(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder, BridgeError> {
        let url = self.build_url(&request.url)?;
        let mut builder = match request.method.to_uppercase().as_str() {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "PATCH" => self.client.patch(&url),
            "DELETE" => self.client.delete(&url),
            "HEAD" => self.client.head(&url),
            other => return Err(BridgeError::UnsupportedMethod(other.to_string())),
        };

        for (key, value) in &self.config.headers {
            builder = builder.header(key, value);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value_to_string(value));
        }

        if !request.query.is_empty() {
            let query: Vec<(&str, String)> = request
                .query
                .iter()
                .map(|(k, v)| (k.as_str(), value_to_string(v)))
                .collect();
            builder = builder.query(&query);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder)
    }
}

#[async_trait]
impl ScriptBodyExecutor for HttpScriptExecutor {
    async fn execute(&self, invocation: &ScriptInvocation) -> Result<BodyOutcome, BridgeError> {
        let request = HttpRequest::from_value(&invocation.request)?;
        let builder = self.build_request(&request)?;

        debug!(
            script = %invocation.script_id,
            attempt = invocation.attempt,
            "Executing {} {}",
            request.method,
            request.url
        );

        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| BridgeError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| BridgeError::Http(e.to_string()))?;
        let elapsed = start.elapsed();

        let body: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        info!(
            "{} {} -> {} ({}ms)",
            request.method,
            request.url,
            status,
            elapsed.as_millis()
        );

        let output = json!({ "status": status, "headers": headers, "body": body });

        if !request.status_accepted(status) {
            return Ok(BodyOutcome::failure(format!("unexpected status {}", status))
                .with_output(output)
                .with_duration(elapsed));
        }

        match extract_outputs(&body, &request.extract) {
            Ok(outputs) => Ok(BodyOutcome::success(output)
                .with_duration(elapsed)
                .with_output_variables(outputs)),
            Err(message) => Ok(BodyOutcome::failure(message)
                .with_output(output)
                .with_duration(elapsed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(base_url: Option<&str>) -> HttpScriptExecutor {
        HttpScriptExecutor::new(HttpConfig {
            base_url: base_url.map(String::from),
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_build_url() {
        let exec = executor(Some("https://api.example.com/"));
        assert_eq!(
            exec.build_url("/users").unwrap(),
            "https://api.example.com/users"
        );
        assert_eq!(
            exec.build_url("users").unwrap(),
            "https://api.example.com/users"
        );
        assert_eq!(
            exec.build_url("http://other.local/x").unwrap(),
            "http://other.local/x"
        );
    }

    #[test]
    fn test_relative_url_without_base_is_rejected() {
        let exec = executor(None);
        assert!(matches!(
            exec.build_url("/users"),
            Err(BridgeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_parsing_and_defaults() {
        let request = HttpRequest::from_value(&json!({
            "url": "/health",
            "expect_status": [200, 204]
        }))
        .unwrap();
        assert_eq!(request.method, "GET");
        assert!(request.status_accepted(204));
        assert!(!request.status_accepted(201));

        let request = HttpRequest::from_value(&json!({ "url": "/x" })).unwrap();
        assert!(request.status_accepted(201));
        assert!(!request.status_accepted(404));

        assert!(HttpRequest::from_value(&Value::Null).is_err());
        assert!(HttpRequest::from_value(&json!({ "method": "GET" })).is_err());
    }

    #[test]
    fn test_unsupported_method() {
        let exec = executor(Some("http://localhost"));
        let request = HttpRequest::from_value(&json!({ "method": "BREW", "url": "/pot" })).unwrap();
        assert!(matches!(
            exec.build_request(&request),
            Err(BridgeError::UnsupportedMethod(m)) if m == "BREW"
        ));
    }

    #[test]
    fn test_extract_outputs() {
        let body = json!({ "data": { "id": 42, "tags": ["a"] } });
        let extract: HashMap<String, String> = [
            ("user_id".to_string(), "/data/id".to_string()),
            ("first_tag".to_string(), "data.tags.0".to_string()),
        ]
        .into_iter()
        .collect();

        let outputs = extract_outputs(&body, &extract).unwrap();
        assert_eq!(outputs.get("user_id"), Some(&json!(42)));
        assert_eq!(outputs.get("first_tag"), Some(&json!("a")));

        let missing: HashMap<String, String> =
            [("x".to_string(), "/nope".to_string())].into_iter().collect();
        assert!(extract_outputs(&body, &missing).is_err());
    }
}
