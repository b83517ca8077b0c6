use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

const ENV_KEYS: [&str; 9] = [
    "LOG_LEVEL",
    "DB_PROXY_ENDPOINT",
    "DB_PORT",
    "DB_USER",
    "DB_NAME",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "DB_CONNECT_RETRIES",
    "DB_CONNECT_BACKOFF",
];

/// Process-level settings read from the Lambda environment once at cold start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(deserialize_with = "scalar_string")]
    pub log_level: String,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub db_proxy_endpoint: Option<String>,
    pub db_port: u16,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub db_user: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub db_name: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub aws_region: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub aws_default_region: Option<String>,
    /// Negative values are clamped to zero retries.
    #[serde(deserialize_with = "clamped_count")]
    pub db_connect_retries: u32,
    /// Base of the exponential backoff between connection attempts, in seconds.
    pub db_connect_backoff: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            db_proxy_endpoint: None,
            db_port: 3306,
            db_user: None,
            db_name: None,
            aws_region: None,
            aws_default_region: None,
            db_connect_retries: 2,
            db_connect_backoff: 0.5,
        }
    }
}

impl Configuration {
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            // .merge fills in any values present in the environment
            .merge(Env::raw().only(&ENV_KEYS))
    }

    /// `AWS_REGION` wins over `AWS_DEFAULT_REGION`; blank values are ignored.
    pub fn region(&self) -> Option<&str> {
        non_empty(&self.aws_region).or_else(|| non_empty(&self.aws_default_region))
    }

    /// Names of the required database settings that are absent or blank.
    pub fn missing_database_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if non_empty(&self.db_proxy_endpoint).is_none() {
            missing.push("DB_PROXY_ENDPOINT");
        }
        if non_empty(&self.db_user).is_none() {
            missing.push("DB_USER");
        }
        if non_empty(&self.db_name).is_none() {
            missing.push("DB_NAME");
        }
        if self.db_port == 0 {
            missing.push("DB_PORT");
        }
        missing
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// `Env::raw()` parses `DB_NAME=2024` as a number and `DB_USER=true` as a bool;
/// string settings take any scalar back in its textual form.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(text) => text,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Signed(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(String::from)
}

fn optional_scalar_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Option::<Scalar>::deserialize(deserializer).map(|value| value.map(String::from))
}

fn clamped_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let count = i64::deserialize(deserializer)?;
    Ok(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Configuration {{ log_level: {}, db_host: {:?}, db_port: {}, db_user: {:?}, db_name: {:?}, region: {:?}, retries: {}, backoff: {} }}",
            self.log_level,
            self.db_proxy_endpoint,
            self.db_port,
            self.db_user,
            self.db_name,
            self.region(),
            self.db_connect_retries,
            self.db_connect_backoff
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::configuration::Configuration;

    #[test]
    fn when_environment_is_empty_should_use_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();

            let config = Configuration::load().unwrap();

            assert_eq!(config, Configuration::default());
            assert_eq!(config.db_port, 3306);
            assert_eq!(config.db_connect_retries, 2);
            assert_eq!(config.db_connect_backoff, 0.5);
            assert_eq!(config.log_level, "INFO");

            Ok(())
        });
    }

    #[test]
    fn when_valid_environment_should_load() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DB_PROXY_ENDPOINT", "items-proxy.proxy-abc.eu-west-1.rds.amazonaws.com");
            jail.set_env("DB_PORT", "3307");
            jail.set_env("DB_USER", "lambda_iam");
            jail.set_env("DB_NAME", "appdb");
            jail.set_env("DB_CONNECT_RETRIES", "4");
            jail.set_env("DB_CONNECT_BACKOFF", "0.25");
            jail.set_env("LOG_LEVEL", "debug");

            let config = Configuration::load().unwrap();

            assert_eq!(
                config.db_proxy_endpoint.as_deref(),
                Some("items-proxy.proxy-abc.eu-west-1.rds.amazonaws.com")
            );
            assert_eq!(config.db_port, 3307);
            assert_eq!(config.db_user.as_deref(), Some("lambda_iam"));
            assert_eq!(config.db_name.as_deref(), Some("appdb"));
            assert_eq!(config.db_connect_retries, 4);
            assert_eq!(config.db_connect_backoff, 0.25);
            assert_eq!(config.log_level, "debug");
            assert!(config.missing_database_settings().is_empty());

            Ok(())
        });
    }

    #[test]
    fn when_unrelated_variables_are_set_should_ignore_them() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TABLE_NAME", "not-ours");
            jail.set_env("DB_USER", "lambda_iam");

            let config = Configuration::load().unwrap();

            assert_eq!(config.db_user.as_deref(), Some("lambda_iam"));

            Ok(())
        });
    }

    #[test]
    fn when_port_is_not_a_number_should_fail() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("DB_PORT", "not-a-port");

            assert!(Configuration::load().is_err());

            Ok(())
        });
    }

    #[test]
    fn when_string_settings_look_like_numbers_should_keep_them_as_text() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DB_PROXY_ENDPOINT", "10");
            jail.set_env("DB_USER", "12345");
            jail.set_env("DB_NAME", "2024");
            jail.set_env("LOG_LEVEL", "10");
            jail.set_env("AWS_REGION", "true");

            let config = Configuration::load().unwrap();

            assert_eq!(config.db_proxy_endpoint.as_deref(), Some("10"));
            assert_eq!(config.db_user.as_deref(), Some("12345"));
            assert_eq!(config.db_name.as_deref(), Some("2024"));
            assert_eq!(config.log_level, "10");
            assert_eq!(config.region(), Some("true"));
            assert!(config.missing_database_settings().is_empty());

            Ok(())
        });
    }

    #[test]
    fn when_retries_are_negative_should_clamp_to_zero() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("DB_CONNECT_RETRIES", "-1");

            let config = Configuration::load().unwrap();

            assert_eq!(config.db_connect_retries, 0);

            Ok(())
        });
    }

    #[test]
    fn should_prefer_aws_region_over_default_region() {
        let mut config = Configuration {
            aws_default_region: Some("us-west-2".to_string()),
            ..Configuration::default()
        };
        assert_eq!(config.region(), Some("us-west-2"));

        config.aws_region = Some("eu-central-1".to_string());
        assert_eq!(config.region(), Some("eu-central-1"));

        config.aws_region = Some(String::new());
        assert_eq!(config.region(), Some("us-west-2"));
    }

    #[test]
    fn should_list_every_missing_database_setting() {
        let config = Configuration {
            db_user: Some(String::new()),
            db_port: 0,
            ..Configuration::default()
        };

        assert_eq!(
            config.missing_database_settings(),
            vec!["DB_PROXY_ENDPOINT", "DB_USER", "DB_NAME", "DB_PORT"]
        );
    }
}
