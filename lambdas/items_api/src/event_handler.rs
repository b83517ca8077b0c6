use crate::routes;
use futures::FutureExt;
use lambda_runtime::{Error, LambdaEvent};
use serde_json::{json, Value};
use shared::core::{Connector, ItemService, TokenProvider};
use shared::event::EventParser;
use shared::utils::{error_response, respond, ApiResponse};
use shared::StatusCode;
use std::panic::AssertUnwindSafe;

const HEALTH_ROUTE: &str = "GET /api/health";
const LIST_ITEMS_ROUTE: &str = "GET /api/items";
const ADD_ITEM_ROUTE: &str = "POST /api/items";

pub(crate) struct HandlerDeps<T: TokenProvider, C: Connector> {
    pub items: ItemService<T, C>,
}

/// Entry point for every invocation. Never returns `Err`: failures, including
/// panics, become a JSON error envelope.
#[tracing::instrument(skip(deps, event), fields(
    request_id = tracing::field::Empty,
    route_key = tracing::field::Empty,
))]
pub(crate) async fn function_handler<T: TokenProvider, C: Connector>(
    deps: &HandlerDeps<T, C>,
    event: LambdaEvent<Value>,
) -> Result<ApiResponse, Error> {
    let (payload, context) = event.into_parts();
    let event = EventParser::new(Some(payload));

    let span = tracing::Span::current();
    span.record(
        "request_id",
        event.request_id().unwrap_or(context.request_id.as_str()),
    );
    span.record("route_key", event.route_key());
    tracing::info!("Event received");

    let response = AssertUnwindSafe(dispatch(deps, &event))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!("Unhandled panic in function_handler");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "error": "Internal Server Error" }),
            )
        });

    Ok(response)
}

async fn dispatch<T: TokenProvider, C: Connector>(
    deps: &HandlerDeps<T, C>,
    event: &EventParser,
) -> ApiResponse {
    tracing::info!(
        http_method = event.http_method(),
        path = event.path(),
        "Handling request"
    );
    // the bearer token is read but not checked against anything
    tracing::debug!(
        has_bearer_token = event.authorization_token().is_some(),
        "Inspected authorization header"
    );

    let result = match event.route_key() {
        HEALTH_ROUTE => Ok(routes::health()),
        LIST_ITEMS_ROUTE => routes::list_items(&deps.items).await,
        ADD_ITEM_ROUTE => routes::add_item(&deps.items, event).await,
        _ => Ok(respond(StatusCode::NOT_FOUND, &json!({ "error": "Not Found" }))),
    };

    result.unwrap_or_else(|err| error_response(&err))
}
