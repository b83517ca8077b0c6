use crate::configuration::Configuration;
use crate::error::{BoxError, DbError, ItemsError, OpenError};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

#[cfg(any(test, feature = "mocks"))]
use mockall::automock;

/// Upper bound on a single connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of items returned by a listing, newest first.
pub const LATEST_ITEMS_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

impl Item {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A short-lived IAM database credential. Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Where and as whom to connect. Built from a validated `Configuration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    pub region: Option<String>,
}

impl DbEndpoint {
    pub fn from_configuration(config: &Configuration) -> Result<Self, ItemsError> {
        let missing = config.missing_database_settings();
        if !missing.is_empty() {
            return Err(ItemsError::Configuration { missing });
        }

        Ok(Self {
            host: config.db_proxy_endpoint.clone().unwrap_or_default(),
            port: config.db_port,
            user: config.db_user.clone().unwrap_or_default(),
            database: config.db_name.clone().unwrap_or_default(),
            region: config.region().map(str::to_string),
        })
    }
}

#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait TokenProvider: Debug {
    async fn generate_token(&self, endpoint: &DbEndpoint) -> Result<AuthToken, BoxError>;
}

#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait Connector: Debug {
    async fn open(
        &self,
        endpoint: &DbEndpoint,
        token: &AuthToken,
    ) -> Result<Box<dyn ItemConnection>, OpenError>;
}

/// A live database session over the `items` table.
#[cfg_attr(any(test, feature = "mocks"), automock)]
#[async_trait]
pub trait ItemConnection: Debug + Send {
    async fn ensure_items_table(&mut self) -> Result<(), DbError>;
    async fn latest_items(&mut self, limit: u32) -> Result<Vec<Item>, DbError>;
    async fn insert_item(&mut self, name: &str) -> Result<(), DbError>;
    async fn close(&mut self) -> Result<(), DbError>;
}

/// Opens IAM-authenticated connections, retrying transient failures with
/// exponential backoff and giving up at once on authentication failures.
#[derive(Debug)]
pub struct ConnectionManager<T: TokenProvider, C: Connector> {
    config: Configuration,
    token_provider: T,
    connector: C,
}

impl<T: TokenProvider, C: Connector> ConnectionManager<T, C> {
    pub fn new(config: Configuration, token_provider: T, connector: C) -> Self {
        Self {
            config,
            token_provider,
            connector,
        }
    }

    pub async fn connect(&self) -> Result<Box<dyn ItemConnection>, ItemsError> {
        let endpoint = DbEndpoint::from_configuration(&self.config).inspect_err(|e| {
            tracing::error!("{}", e);
        })?;
        let retries = self.config.db_connect_retries;
        let mut last_err: Option<DbError> = None;

        for attempt in 1..=retries.saturating_add(1) {
            tracing::info!(
                db_host = %endpoint.host,
                db_user = %endpoint.user,
                db_port = endpoint.port,
                db_name = %endpoint.database,
                attempt,
                "Attempting DB connection"
            );

            let token = self.fresh_token(&endpoint).await?;
            let opened =
                match tokio::time::timeout(CONNECT_TIMEOUT, self.connector.open(&endpoint, &token))
                    .await
                {
                    Ok(opened) => opened,
                    Err(_) => Err(OpenError::Database(DbError::new(
                        None,
                        format!(
                            "connection attempt timed out after {}s",
                            CONNECT_TIMEOUT.as_secs()
                        ),
                    ))),
                };
            drop(token);

            match opened {
                Ok(conn) => {
                    tracing::info!(attempt, "DB connection established");
                    return Ok(conn);
                }
                Err(OpenError::Database(err)) => {
                    tracing::warn!(attempt, errno = ?err.code, error = %err, "MySQL connection attempt failed");
                    if err.is_auth_failure() {
                        tracing::error!(
                            errno = ?err.code,
                            "Authentication failed (invalid token / user). Not retrying."
                        );
                        return Err(ItemsError::Authentication(err));
                    }
                    last_err = Some(err);

                    if attempt <= retries {
                        let delay = backoff_delay(self.config.db_connect_backoff, attempt);
                        tracing::info!(
                            sleep_seconds = delay.as_secs_f64(),
                            "Retrying DB connection after backoff"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(OpenError::Other(err)) => {
                    tracing::error!(error = %err, "Unexpected error during DB connection");
                    return Err(ItemsError::Unexpected(err));
                }
            }
        }

        tracing::error!(
            last_error = ?last_err.as_ref().map(ToString::to_string),
            "All DB connection attempts failed"
        );
        Err(match last_err {
            Some(err) => ItemsError::TransientConnection(err),
            None => ItemsError::ConnectionExhausted,
        })
    }

    async fn fresh_token(&self, endpoint: &DbEndpoint) -> Result<AuthToken, ItemsError> {
        match self.token_provider.generate_token(endpoint).await {
            Ok(token) => {
                tracing::debug!(
                    db_host = %endpoint.host,
                    db_user = %endpoint.user,
                    "Generated IAM auth token (not logged for security)"
                );
                Ok(token)
            }
            Err(err) => {
                tracing::error!(
                    region = ?endpoint.region,
                    db_host = %endpoint.host,
                    db_user = %endpoint.user,
                    error = %err,
                    "Failed to generate IAM DB auth token"
                );
                Err(ItemsError::TokenGeneration(err))
            }
        }
    }
}

/// `base * 2^(attempt - 1)` seconds; a negative or non-finite base means no wait.
pub fn backoff_delay(base_seconds: f64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    Duration::try_from_secs_f64(base_seconds * 2f64.powi(exponent)).unwrap_or_default()
}

/// Closes a connection, logging rather than surfacing a failure to close.
///
/// `ItemService` calls this on every exit path, including a panic in the query,
/// which is re-raised once the connection is closed.
pub async fn release(mut conn: Box<dyn ItemConnection>) {
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Error closing DB connection");
    }
}

#[derive(Debug)]
pub struct ItemService<T: TokenProvider, C: Connector> {
    connections: ConnectionManager<T, C>,
}

impl<T: TokenProvider, C: Connector> ItemService<T, C> {
    pub fn new(connections: ConnectionManager<T, C>) -> Self {
        Self { connections }
    }

    /// The most recent items, newest id first.
    pub async fn list_items(&self) -> Result<Vec<Item>, ItemsError> {
        let mut conn = self.connections.connect().await?;
        let outcome = AssertUnwindSafe(Self::fetch_latest(conn.as_mut()))
            .catch_unwind()
            .await;
        release(conn).await;
        outcome.unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    pub async fn add_item(&self, name: &str) -> Result<(), ItemsError> {
        if name.is_empty() {
            tracing::info!("Validation failed: missing 'name' in request body");
            return Err(ItemsError::Validation("Missing 'name'".to_string()));
        }

        let mut conn = self.connections.connect().await?;
        let outcome = AssertUnwindSafe(Self::store(conn.as_mut(), name))
            .catch_unwind()
            .await;
        release(conn).await;
        outcome.unwrap_or_else(|payload| panic::resume_unwind(payload))
    }

    async fn fetch_latest(conn: &mut dyn ItemConnection) -> Result<Vec<Item>, ItemsError> {
        conn.ensure_items_table().await.map_err(ItemsError::Query)?;
        conn.latest_items(LATEST_ITEMS_LIMIT)
            .await
            .map_err(ItemsError::Query)
    }

    async fn store(conn: &mut dyn ItemConnection, name: &str) -> Result<(), ItemsError> {
        conn.ensure_items_table().await.map_err(ItemsError::Query)?;
        conn.insert_item(name).await.map_err(ItemsError::Query)
    }
}
