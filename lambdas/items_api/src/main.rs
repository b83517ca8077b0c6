use crate::event_handler::{function_handler, HandlerDeps};
use lambda_runtime::{run, service_fn, tracing, Error};
use shared::adapters::{MySqlConnector, RdsTokenProvider};
use shared::configuration::Configuration;
use shared::core::{ConnectionManager, ItemService};

mod event_handler;
mod routes;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Configuration::load()?;
    shared::observability::init_tracing(&config.log_level)?;
    tracing::info!("{}", config);

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let token_provider = RdsTokenProvider::new(aws_config);
    let connections = ConnectionManager::new(config, token_provider, MySqlConnector::default());
    let deps = HandlerDeps {
        items: ItemService::new(connections),
    };

    run(service_fn(|event| function_handler(&deps, event))).await
}
