//! Live PostgreSQL Tests
//!
//! These tests drive both adapters end to end against a local PostgreSQL server. The
//! `test-util` token factory stands in for the AWS SDK and hands out `PGPASSWORD` as the
//! token, so URL parsing, argument building, client configuration and database creation
//! all run as they would against RDS.
//!
//! Run with `cargo test --features test-util -- --ignored` and a server reachable through
//! `PGHOST`, `PGPORT`, `PGUSER` and `PGPASSWORD` (defaults: `localhost`, `5432`,
//! `postgres`, `postgres`).

use std::time::{SystemTime, UNIX_EPOCH};

use rdsiam::{
    ConnectArgsBuilder, ConnectionParams, DbApi, Dialect, FixedTokenFactory, RdsIamError,
    TokenProvider,
};
use tokio_postgres::error::SqlState;

struct Server {
    host: String,
    port: String,
    user: String,
    password: String,
}

fn server() -> Server {
    let var =
        |name: &str, default: &str| std::env::var(name).unwrap_or_else(|_| default.to_string());
    Server {
        host: var("PGHOST", "localhost"),
        port: var("PGPORT", "5432"),
        user: var("PGUSER", "postgres"),
        password: var("PGPASSWORD", "postgres"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn unique_database(prefix: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos();
    format!("{prefix}_{}_{nanos}", std::process::id())
}

fn url(scheme: &str, database: &str, query: &str) -> String {
    let server = server();
    format!("{scheme}://{}@{}:{}/{database}?{query}", server.user, server.host, server.port)
}

fn builder() -> (ConnectArgsBuilder, FixedTokenFactory) {
    let factory = FixedTokenFactory::new(server().password);
    (ConnectArgsBuilder::new(TokenProvider::new(factory.clone())), factory)
}

fn dbapi(url: &str, builder: ConnectArgsBuilder) -> (DbApi, ConnectionParams) {
    let (dialect, params) = Dialect::from_url(url).expect("Failed to parse URL");
    (dialect.dbapi_with(builder).expect("Driver not available"), params)
}

#[cfg(feature = "async")]
mod async_driver {
    use super::*;

    async fn drop_database(name: &str) {
        let (builder, _) = builder();
        let (DbApi::Async(driver), params) =
            dbapi(&url(rdsiam::ASYNC_DRIVER_NAME, "postgres", ""), builder)
        else {
            panic!("expected async driver");
        };
        let client = driver.connect(None, params).await.expect("Failed to connect");
        let quoted = rdsiam::driver::quote_identifier(name);
        client
            .batch_execute(&format!("DROP DATABASE IF EXISTS {quoted}"))
            .await
            .expect("Failed to drop database");
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_connect_with_region() {
        init_tracing();
        let (builder, factory) = builder();
        let query = "aws_region_name=eu-west-1&application_name=rdsiam-test";
        let (DbApi::Async(driver), params) =
            dbapi(&url(rdsiam::ASYNC_DRIVER_NAME, "postgres", query), builder)
        else {
            panic!("expected async driver");
        };

        let client = driver.connect(None, params).await.expect("Failed to connect");
        let row = client
            .query_one("SELECT current_setting('application_name')", &[])
            .await
            .unwrap();
        let application_name: String = row.get(0);

        assert_eq!(application_name, "rdsiam-test");
        assert_eq!(factory.created_regions(), vec![Some("eu-west-1".to_string())]);
        assert_eq!(factory.requests().len(), 1);
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_create_db_if_not_exists() {
        init_tracing();
        let name = unique_database("rdsiam_async");
        let (builder, factory) = builder();
        let (DbApi::Async(driver), params) =
            dbapi(&url(rdsiam::ASYNC_DRIVER_NAME, &name, "create_db_if_not_exists=true"), builder)
        else {
            panic!("expected async driver");
        };

        let client = driver.connect(None, params).await.expect("Failed to connect");
        let row = client.query_one("SELECT current_database()", &[]).await.unwrap();
        let current: String = row.get(0);
        drop(client);

        assert_eq!(current, name);
        assert_eq!(factory.requests().len(), 2);

        drop_database(&name).await;
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_missing_database_without_creation() {
        let name = unique_database("rdsiam_absent");
        let (builder, _) = builder();
        let (DbApi::Async(driver), params) =
            dbapi(&url(rdsiam::ASYNC_DRIVER_NAME, &name, ""), builder)
        else {
            panic!("expected async driver");
        };

        let err = driver.connect(None, params).await.err().expect("connect should fail");
        let code = err.as_postgres().and_then(tokio_postgres::Error::code);

        assert!(matches!(err, RdsIamError::Postgres(_)));
        assert_eq!(code, Some(&SqlState::INVALID_CATALOG_NAME));
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_rds_sslrootcert_with_tls_disabled() {
        let (builder, _) = builder();
        let (DbApi::Async(driver), params) = dbapi(
            &url(rdsiam::ASYNC_DRIVER_NAME, "postgres", "rds_sslrootcert=true&sslmode=disable"),
            builder,
        ) else {
            panic!("expected async driver");
        };

        let client = driver.connect(None, params).await.expect("Failed to connect");
        client.simple_query("SELECT 1").await.unwrap();
    }
}

#[cfg(feature = "sync")]
mod sync_driver {
    use super::*;

    fn connect(
        database: &str,
        query: &str,
    ) -> (rdsiam::Result<postgres::Client>, FixedTokenFactory) {
        let (builder, factory) = builder();
        let (DbApi::Sync(driver), params) =
            dbapi(&url(rdsiam::SYNC_DRIVER_NAME, database, query), builder)
        else {
            panic!("expected sync driver");
        };
        (driver.connect(None, params), factory)
    }

    #[test]
    #[ignore = "Requires running PostgreSQL instance"]
    fn test_connect_with_region() {
        init_tracing();
        let (client, factory) = connect("postgres", "aws_region_name=us-east-2");
        let mut client = client.expect("Failed to connect");

        let row = client.query_one("SELECT current_user::text", &[]).unwrap();
        let user: String = row.get(0);

        assert_eq!(user, server().user);
        assert_eq!(factory.created_regions(), vec![Some("us-east-2".to_string())]);
    }

    #[test]
    #[ignore = "Requires running PostgreSQL instance"]
    fn test_create_db_if_not_exists() {
        init_tracing();
        let name = unique_database("rdsiam_sync");

        let (client, factory) = connect(&name, "create_db_if_not_exists=true");
        let mut client = client.expect("Failed to connect");
        let row = client.query_one("SELECT current_database()::text", &[]).unwrap();
        let current: String = row.get(0);
        client.close().unwrap();

        assert_eq!(current, name);
        assert_eq!(factory.requests().len(), 2);

        let (admin, _) = connect("postgres", "");
        let quoted = rdsiam::driver::quote_identifier(&name);
        admin
            .expect("Failed to connect")
            .batch_execute(&format!("DROP DATABASE IF EXISTS {quoted}"))
            .unwrap();
    }

    #[test]
    #[ignore = "Requires running PostgreSQL instance"]
    fn test_missing_database_without_creation() {
        let name = unique_database("rdsiam_absent");
        let (client, factory) = connect(&name, "");

        let err = client.err().expect("connect should fail");

        let code = err.as_postgres().and_then(tokio_postgres::Error::code);
        assert!(
            rdsiam::driver::is_missing_database_message(&err.to_string())
                || code == Some(&SqlState::INVALID_CATALOG_NAME)
        );
        assert_eq!(factory.requests().len(), 1);
    }

    #[test]
    #[ignore = "Requires running PostgreSQL instance"]
    fn test_unknown_parameter_rejected_by_client() {
        let (client, _) = connect("postgres", "no_such_option=1");
        assert!(matches!(client.err(), Some(RdsIamError::Postgres(_))));
    }
}
