//! Default-safe accessors over the raw API Gateway HTTP API (v2) event.
//!
//! The event is kept as an untyped `serde_json::Value` so that a missing,
//! null or oddly shaped field never fails the invocation: every accessor
//! falls back to a documented default instead.

use serde_json::{Map, Value};
use std::collections::HashMap;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Clone, Default)]
pub struct EventParser {
    event: Value,
}

impl EventParser {
    /// Wraps an event; `None` and JSON `null` both behave like an empty object.
    pub fn new(event: Option<Value>) -> Self {
        let event = match event {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(event) => event,
        };
        Self { event }
    }

    pub fn route_key(&self) -> &str {
        self.str_at(&["routeKey"]).unwrap_or("")
    }

    pub fn http_method(&self) -> &str {
        self.str_at(&["requestContext", "http", "method"])
            .unwrap_or("GET")
    }

    pub fn path(&self) -> &str {
        self.str_at(&["rawPath"]).unwrap_or("/")
    }

    pub fn request_id(&self) -> Option<&str> {
        self.str_at(&["requestContext", "requestId"])
    }

    pub fn headers(&self) -> HashMap<String, String> {
        self.string_map("headers")
    }

    pub fn query_params(&self) -> HashMap<String, String> {
        self.string_map("queryStringParameters")
    }

    pub fn path_params(&self) -> HashMap<String, String> {
        self.string_map("pathParameters")
    }

    /// The `authorization` (or `Authorization`) header with any `Bearer ` prefix removed.
    pub fn authorization_token(&self) -> Option<String> {
        let headers = self.headers();
        let token = headers
            .get("authorization")
            .filter(|v| !v.is_empty())
            .or_else(|| headers.get("Authorization"))?;

        Some(
            token
                .strip_prefix(BEARER_PREFIX)
                .unwrap_or(token)
                .to_string(),
        )
    }

    /// The request body parsed as JSON, or an empty object when it is absent,
    /// empty or not valid JSON.
    pub fn body_json(&self) -> Value {
        self.event
            .get("body")
            .and_then(Value::as_str)
            .filter(|body| !body.is_empty())
            .and_then(|body| serde_json::from_str(body).ok())
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        path.iter()
            .try_fold(&self.event, |value, key| value.get(*key))
            .and_then(Value::as_str)
    }

    fn string_map(&self, key: &str) -> HashMap<String, String> {
        self.event
            .get(key)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}
