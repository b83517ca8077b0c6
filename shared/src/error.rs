use http::StatusCode;
use thiserror::Error;

/// MySQL `ER_ACCESS_DENIED_ERROR`: the server rejected the user or IAM token.
pub const ER_ACCESS_DENIED: u16 = 1045;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A database failure independent of the driver that produced it.
///
/// `code` carries the MySQL error number when the server sent one; driver-level
/// failures such as I/O, TLS or timeouts have no number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DbError {
    pub code: Option<u16>,
    pub message: String,
}

impl DbError {
    pub fn new(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.code == Some(ER_ACCESS_DENIED)
    }
}

/// Why opening a connection failed, as reported by a `Connector`.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Other(BoxError),
}

#[derive(Debug, Error)]
pub enum ItemsError {
    #[error("Missing required database environment variables: {}", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },
    #[error("Failed to generate IAM DB auth token: {0}")]
    TokenGeneration(#[source] BoxError),
    #[error("Database authentication failed: {0}")]
    Authentication(#[source] DbError),
    #[error("Database connection failed: {0}")]
    TransientConnection(#[source] DbError),
    #[error("Failed to connect to the database")]
    ConnectionExhausted,
    #[error("Database query failed: {0}")]
    Query(#[source] DbError),
    #[error("{0}")]
    Validation(String),
    #[error("Unexpected error: {0}")]
    Unexpected(#[source] BoxError),
}

impl ItemsError {
    /// The MySQL error number behind this failure, if any.
    pub fn errno(&self) -> Option<u16> {
        match self {
            ItemsError::Authentication(e)
            | ItemsError::TransientConnection(e)
            | ItemsError::Query(e) => e.code,
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ItemsError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message returned to the caller. Server-side detail stays in the logs.
    pub fn client_message(&self) -> &str {
        match self {
            ItemsError::Validation(message) => message.as_str(),
            _ if self.errno() == Some(ER_ACCESS_DENIED) => "Database authentication failed",
            ItemsError::TransientConnection(_) | ItemsError::Query(_) => "Database error",
            _ => "Internal Server Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_query_fails_with_access_denied_should_report_auth_failure() {
        let err = ItemsError::Query(DbError::new(Some(ER_ACCESS_DENIED), "Access denied"));

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "Database authentication failed");
    }

    #[test]
    fn should_map_each_kind_to_its_client_message() {
        let cases = [
            (
                ItemsError::Authentication(DbError::new(Some(ER_ACCESS_DENIED), "denied")),
                "Database authentication failed",
            ),
            (
                ItemsError::TransientConnection(DbError::new(Some(2003), "can't connect")),
                "Database error",
            ),
            (
                ItemsError::Query(DbError::new(Some(1146), "no such table")),
                "Database error",
            ),
            (
                ItemsError::Configuration {
                    missing: vec!["DB_USER"],
                },
                "Internal Server Error",
            ),
            (
                ItemsError::TokenGeneration("no credentials".into()),
                "Internal Server Error",
            ),
            (ItemsError::ConnectionExhausted, "Internal Server Error"),
            (
                ItemsError::Unexpected("boom".into()),
                "Internal Server Error",
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(err.client_message(), expected, "{err}");
        }
    }

    #[test]
    fn when_validation_fails_should_return_400_with_message() {
        let err = ItemsError::Validation("Missing 'name'".to_string());

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "Missing 'name'");
    }

    #[test]
    fn configuration_error_should_list_missing_fields() {
        let err = ItemsError::Configuration {
            missing: vec!["DB_PROXY_ENDPOINT", "DB_NAME"],
        };

        assert_eq!(
            err.to_string(),
            "Missing required database environment variables: DB_PROXY_ENDPOINT, DB_NAME"
        );
    }
}
