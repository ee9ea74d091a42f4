//! Async driver on top of `tokio-postgres`
//!
//! The core keys (`host`, `port`, `user`, `password`, `database`) are applied to the
//! client configuration directly. Every other key travels as a query parameter of a
//! synthetic `postgres:///?...` connection string, so the client validates it exactly
//! as it would a URL option.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, Connection, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;

use super::{
    connect_async, quote_identifier, reject_connection_string, AsyncBackend, ADMIN_DATABASE,
};
use crate::build::{BuiltParams, ConnectArgsBuilder};
use crate::error::{RdsIamError, Result};
use crate::params::ConnectionParams;
use crate::tls::TlsSettings;
use crate::token::TokenProvider;

/// Keys applied to the client configuration directly
pub const CORE_KEYS: [&str; 5] = ["host", "port", "user", "password", "database"];

/// Async driver authenticating with IAM tokens
///
/// Connections are driven by a task spawned on the caller's runtime.
#[derive(Debug, Clone, Default)]
pub struct AsyncDriver {
    builder: ConnectArgsBuilder,
}

impl AsyncDriver {
    /// Driver minting tokens through `tokens`
    #[must_use]
    pub fn new(tokens: TokenProvider) -> Self {
        Self { builder: ConnectArgsBuilder::new(tokens) }
    }

    /// Driver using an existing builder
    #[must_use]
    pub fn with_builder(builder: ConnectArgsBuilder) -> Self {
        Self { builder }
    }

    /// Open a connection
    ///
    /// # Errors
    /// Returns `Usage` if `dsn` is a non-empty connection string, the token backend's
    /// error if minting fails, and the client's error (unchanged) if connecting fails.
    pub async fn connect(&self, dsn: Option<&str>, params: ConnectionParams) -> Result<Client> {
        reject_connection_string(dsn)?;
        connect_async(&TokioPostgresBackend, &self.builder, &params).await
    }
}

/// Open a connection with the process-wide token provider
///
/// # Errors
/// See [`AsyncDriver::connect`].
pub async fn connect(dsn: Option<&str>, params: ConnectionParams) -> Result<Client> {
    AsyncDriver::default().connect(dsn, params).await
}

struct TokioPostgresBackend;

impl AsyncBackend for TokioPostgresBackend {
    type Connection = Client;

    async fn connect(&self, params: &BuiltParams) -> Result<Client> {
        let (config, tls) = client_config(params, None)?;
        open(&config, tls).await
    }

    async fn create_database(&self, params: &BuiltParams, name: &str) -> Result<()> {
        let (config, tls) = client_config(params, Some(ADMIN_DATABASE))?;
        let client = open(&config, tls).await?;
        client.batch_execute(&format!("CREATE DATABASE {}", quote_identifier(name))).await?;
        Ok(())
    }

    fn is_missing_database(&self, error: &RdsIamError) -> bool {
        error.as_postgres().and_then(tokio_postgres::Error::code)
            == Some(&SqlState::INVALID_CATALOG_NAME)
    }
}

/// Percent-encoded query string carrying every non-core key
pub(crate) fn extra_params_query(params: &ConnectionParams) -> String {
    params
        .iter()
        .filter(|(key, _)| !CORE_KEYS.contains(key))
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, NON_ALPHANUMERIC),
                utf8_percent_encode(&value.to_string(), NON_ALPHANUMERIC)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Client configuration for the built parameters, `database` replaced when given
pub(crate) fn client_config(
    built: &BuiltParams,
    database: Option<&str>,
) -> Result<(Config, Option<MakeRustlsConnect>)> {
    let mut params = built.params().clone();
    let tls = TlsSettings::take_from(&mut params)?;

    let query = extra_params_query(&params);
    let mut config = if query.is_empty() {
        Config::new()
    } else {
        format!("postgres:///?{query}").parse::<Config>()?
    };

    config
        .host(&built.host())
        .port(built.port()?)
        .user(&built.user())
        .password(built.password());

    if let Some(database) = database.map(str::to_string).or_else(|| params.get_string("database")) {
        config.dbname(&database);
    }

    Ok((config, tls.connector()?))
}

async fn open(config: &Config, tls: Option<MakeRustlsConnect>) -> Result<Client> {
    match tls {
        Some(connector) => {
            let (client, connection) = config.connect(connector).await?;
            spawn_connection(connection);
            Ok(client)
        }
        None => {
            let (client, connection) = config.connect(NoTls).await?;
            spawn_connection(connection);
            Ok(client)
        }
    }
}

fn spawn_connection<S, T>(connection: Connection<S, T>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "PostgreSQL connection closed with error");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::FixedTokenFactory;
    use tokio_postgres::config::{Host, SslMode};

    async fn built_params(params: ConnectionParams) -> BuiltParams {
        ConnectArgsBuilder::new(TokenProvider::new(FixedTokenFactory::new("tok")))
            .build(&params)
            .await
            .unwrap()
    }

    #[test]
    fn test_extra_params_query() {
        let params = ConnectionParams::new()
            .with("host", "db.example.com")
            .with("user", "app")
            .with("application_name", "billing job")
            .with("options", "-c search_path=app,public");

        assert_eq!(
            extra_params_query(&params),
            "application%5Fname=billing%20job&options=%2Dc%20search%5Fpath%3Dapp%2Cpublic"
        );
        assert_eq!(extra_params_query(&ConnectionParams::new().with("user", "app")), "");
    }

    #[tokio::test]
    async fn test_client_config_core_and_extra_keys() {
        let built = built_params(
            ConnectionParams::new()
                .with("host", "db.example.com")
                .with("port", "5433")
                .with("user", "app")
                .with("database", "orders")
                .with("application_name", "billing job")
                .with("sslmode", "verify-full")
                .with("sslrootcert", "/nonexistent/global-bundle.pem"),
        )
        .await;

        // The root certificate is read when the connector is built
        let err = client_config(&built, None).err().unwrap();
        assert!(matches!(err, RdsIamError::Io(_)));

        let mut params = built.into_params();
        params.remove("sslrootcert");
        params.insert("sslmode", "allow");
        let built = built_params(params).await;

        let (config, tls) = client_config(&built, None).unwrap();
        assert_eq!(config.get_hosts(), &[Host::Tcp("db.example.com".to_string())]);
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_user(), Some("app"));
        assert_eq!(config.get_password(), Some(&b"tok"[..]));
        assert_eq!(config.get_dbname(), Some("orders"));
        assert_eq!(config.get_application_name(), Some("billing job"));
        assert_eq!(config.get_ssl_mode(), SslMode::Prefer);
        assert!(tls.is_none());
    }

    #[tokio::test]
    async fn test_client_config_defaults_and_admin_database() {
        let built = built_params(ConnectionParams::new().with("database", "orders")).await;

        let (config, tls) = client_config(&built, Some(ADMIN_DATABASE)).unwrap();
        assert_eq!(config.get_hosts(), &[Host::Tcp("localhost".to_string())]);
        assert_eq!(config.get_ports(), &[5432]);
        assert_eq!(config.get_user(), Some("postgres"));
        assert_eq!(config.get_dbname(), Some("postgres"));
        assert!(tls.is_none());
    }

    #[tokio::test]
    async fn test_unknown_keys_rejected_by_client() {
        let built = built_params(ConnectionParams::new().with("no_such_option", "1")).await;
        let err = client_config(&built, None).err().unwrap();
        assert!(err.as_postgres().is_some());
    }

    #[tokio::test]
    async fn test_dsn_rejected_before_minting() {
        let factory = FixedTokenFactory::new("tok");
        let driver = AsyncDriver::new(TokenProvider::new(factory.clone()));

        let err = driver
            .connect(Some("postgres://app@db/orders"), ConnectionParams::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, RdsIamError::Usage(_)));
        assert!(factory.requests().is_empty());
    }

    #[test]
    fn test_missing_database_detection_requires_sqlstate() {
        let err = RdsIamError::config_error("database \"orders\" does not exist");
        assert!(!TokioPostgresBackend.is_missing_database(&err));
    }
}
