use serde_json::{json, Value};
use shared::core::{Connector, ItemService, TokenProvider};
use shared::error::ItemsError;
use shared::event::EventParser;
use shared::utils::{respond, ApiResponse};
use shared::StatusCode;

pub(crate) fn health() -> ApiResponse {
    respond(StatusCode::OK, &json!({ "status": "ok" }))
}

pub(crate) async fn list_items<T: TokenProvider, C: Connector>(
    items: &ItemService<T, C>,
) -> Result<ApiResponse, ItemsError> {
    let latest = items.list_items().await.inspect_err(|e| {
        tracing::error!(errno = ?e.errno(), error = %e, "Failed to fetch items");
    })?;

    Ok(respond(StatusCode::OK, &latest))
}

pub(crate) async fn add_item<T: TokenProvider, C: Connector>(
    items: &ItemService<T, C>,
    event: &EventParser,
) -> Result<ApiResponse, ItemsError> {
    let body = event.body_json();
    // `name` is a VARCHAR column: a number or bool is rejected as missing rather
    // than stored as its text
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default();

    items.add_item(name).await.inspect_err(|e| {
        if !matches!(e, ItemsError::Validation(_)) {
            tracing::error!(errno = ?e.errno(), error = %e, "Failed to add item");
        }
    })?;

    Ok(respond(StatusCode::CREATED, &json!({ "message": "Item added" })))
}
