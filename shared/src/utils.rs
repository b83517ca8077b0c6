use crate::error::ItemsError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

const INTERNAL_SERVER_ERROR_BODY: &str = r#"{"error":"Internal Server Error"}"#;

/// The `{ statusCode, headers, body }` envelope API Gateway expects back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

pub fn respond<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> ApiResponse {
    match serde_json::to_string(body) {
        Ok(body) => json_envelope(status, body),
        Err(e) => {
            tracing::error!("Failed to serialize response body: {:?}", e);
            json_envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_SERVER_ERROR_BODY.to_string(),
            )
        }
    }
}

pub fn error_response(err: &ItemsError) -> ApiResponse {
    respond(err.status(), &json!({ "error": err.client_message() }))
}

fn json_envelope(status: StatusCode, body: String) -> ApiResponse {
    ApiResponse {
        status_code: status.as_u16(),
        headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
        body,
    }
}
