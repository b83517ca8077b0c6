use crate::{
    core::{AuthToken, Connector, DbEndpoint, Item, ItemConnection, TokenProvider},
    error::{BoxError, DbError, OpenError},
};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config as AuthTokenConfig};
use aws_sdk_rds::config::Region;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlSslMode};
use sqlx::Connection;
use std::path::{Path, PathBuf};

/// RDS CA bundle shipped inside the Lambda deployment package.
pub const CA_BUNDLE_PATH: &str = "/var/task/rds-combined-ca-bundle.pem";

const CREATE_ITEMS_TABLE: &str = "CREATE TABLE IF NOT EXISTS items (
    id INT AUTO_INCREMENT PRIMARY KEY,
    name VARCHAR(255)
)";
const SELECT_LATEST_ITEMS: &str = "SELECT id, name FROM items ORDER BY id DESC LIMIT ?";
const INSERT_ITEM: &str = "INSERT INTO items (name) VALUES (?)";

#[derive(Debug)]
pub struct RdsTokenProvider {
    sdk_config: SdkConfig,
}

impl RdsTokenProvider {
    pub fn new(sdk_config: SdkConfig) -> Self {
        Self { sdk_config }
    }
}

#[async_trait]
impl TokenProvider for RdsTokenProvider {
    async fn generate_token(&self, endpoint: &DbEndpoint) -> Result<AuthToken, BoxError> {
        let mut config = AuthTokenConfig::builder()
            .hostname(endpoint.host.as_str())
            .port(u64::from(endpoint.port))
            .username(endpoint.user.as_str());
        if let Some(region) = &endpoint.region {
            config = config.region(Region::new(region.clone()));
        }

        let generator = AuthTokenGenerator::new(config.build()?);
        let token = generator.auth_token(&self.sdk_config).await?;

        Ok(AuthToken::new(token.as_str()))
    }
}

#[derive(Debug)]
pub struct MySqlConnector {
    ca_bundle: PathBuf,
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new(CA_BUNDLE_PATH)
    }
}

impl MySqlConnector {
    pub fn new(ca_bundle: impl Into<PathBuf>) -> Self {
        Self {
            ca_bundle: ca_bundle.into(),
        }
    }

    /// The bundled CA file when it is present; `None` means the default trust roots.
    fn trust_store(&self) -> Option<&Path> {
        if self.ca_bundle.exists() {
            Some(self.ca_bundle.as_path())
        } else {
            tracing::debug!(
                "CA bundle not found at {}; falling back to default trust roots",
                self.ca_bundle.display()
            );
            None
        }
    }

    fn connect_options(&self, endpoint: &DbEndpoint, token: &AuthToken) -> MySqlConnectOptions {
        // IAM tokens go over the cleartext auth plugin, so certificate checks are mandatory
        let options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&endpoint.user)
            .password(token.expose())
            .database(&endpoint.database)
            .enable_cleartext_plugin(true)
            .ssl_mode(MySqlSslMode::VerifyCa);

        match self.trust_store() {
            Some(ca_bundle) => options.ssl_ca(ca_bundle),
            None => options,
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn open(
        &self,
        endpoint: &DbEndpoint,
        token: &AuthToken,
    ) -> Result<Box<dyn ItemConnection>, OpenError> {
        let options = self.connect_options(endpoint, token);
        let conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(classify_open_error)?;

        Ok(Box::new(MySqlItemConnection { conn: Some(conn) }))
    }
}

#[derive(Debug)]
pub struct MySqlItemConnection {
    conn: Option<MySqlConnection>,
}

impl MySqlItemConnection {
    fn live(&mut self) -> Result<&mut MySqlConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::new(None, "connection already closed"))
    }
}

#[async_trait]
impl ItemConnection for MySqlItemConnection {
    async fn ensure_items_table(&mut self) -> Result<(), DbError> {
        let conn = self.live()?;
        sqlx::query(CREATE_ITEMS_TABLE)
            .execute(&mut *conn)
            .await
            .map_err(to_db_error)?;
        Ok(())
    }

    async fn latest_items(&mut self, limit: u32) -> Result<Vec<Item>, DbError> {
        let conn = self.live()?;
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(SELECT_LATEST_ITEMS)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await
            .map_err(to_db_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Item::new(id, name.unwrap_or_default()))
            .collect())
    }

    async fn insert_item(&mut self, name: &str) -> Result<(), DbError> {
        let conn = self.live()?;
        let mut tx = conn.begin().await.map_err(to_db_error)?;
        sqlx::query(INSERT_ITEM)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(to_db_error)?;
        tx.commit().await.map_err(to_db_error)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        match self.conn.take() {
            Some(conn) => conn.close().await.map_err(to_db_error),
            None => Ok(()),
        }
    }
}

/// Server errors and transport failures are database errors (and may be retried);
/// anything else, such as bad connect options, is not.
fn classify_open_error(err: sqlx::Error) -> OpenError {
    match err {
        sqlx::Error::Database(_)
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_) => OpenError::Database(to_db_error(err)),
        other => OpenError::Other(Box::new(other)),
    }
}

fn to_db_error(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) => DbError::new(
            db_err
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number),
            db_err.message(),
        ),
        _ => DbError::new(None, err.to_string()),
    }
}
