//! Driver adapters
//!
//! Both adapters share the same connection flow, written once here against a small
//! backend seam:
//! 1. Build parameters (mints a token)
//! 2. Connect
//! 3. If the target database is missing and `create_db_if_not_exists` is set, connect to
//!    the `postgres` database with the same credentials, create the target, then build
//!    again (fresh token) and connect once more
//!
//! Any other failure, or a failure of the retried connect, reaches the caller unchanged.

#[cfg(feature = "async")]
pub mod async_pg;
#[cfg(feature = "sync")]
pub mod sync_pg;

#[cfg(feature = "sync")]
use std::error::Error as StdError;
#[cfg(feature = "async")]
use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;

#[cfg(any(feature = "sync", feature = "async"))]
use crate::build::{create_db_requested, BuiltParams, ConnectArgsBuilder};
use crate::error::{RdsIamError, Result};
#[cfg(any(feature = "sync", feature = "async"))]
use crate::params::ConnectionParams;

/// Database used for the administrative connection that creates a missing database
pub const ADMIN_DATABASE: &str = "postgres";

static MISSING_DATABASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"database "[^"]+" does not exist"#).expect("missing-database pattern is valid")
});

/// Quote `name` as a PostgreSQL identifier
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether a server message reports a missing database
///
/// Matches the English server text, so a server running with a translated
/// `lc_messages` is not recognized.
#[must_use]
pub fn is_missing_database_message(message: &str) -> bool {
    MISSING_DATABASE.is_match(message)
}

/// Render an error with its whole source chain
#[cfg(feature = "sync")]
pub(crate) fn error_chain_text(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Fail with a usage error when a connection string is supplied
///
/// # Errors
/// Returns `Usage` for any non-empty `dsn`.
pub fn reject_connection_string(dsn: Option<&str>) -> Result<()> {
    match dsn {
        Some(dsn) if !dsn.is_empty() => Err(RdsIamError::usage(
            "Arguments should be passed as connection parameters: \
             connection strings are not supported",
        )),
        _ => Ok(()),
    }
}

/// Blocking PostgreSQL client operations used by the connection flow
#[cfg(feature = "sync")]
pub(crate) trait BlockingBackend {
    type Connection;

    /// Open a connection with the built parameters
    fn connect(&mut self, params: &BuiltParams) -> Result<Self::Connection>;

    /// Create `name` through a connection to [`ADMIN_DATABASE`] and close it
    fn create_database(&mut self, params: &BuiltParams, name: &str) -> Result<()>;

    /// Whether a connect error means the target database does not exist
    fn is_missing_database(&self, error: &RdsIamError) -> bool;
}

/// Async PostgreSQL client operations used by the connection flow
#[cfg(feature = "async")]
pub(crate) trait AsyncBackend: Sync {
    type Connection: Send;

    /// Open a connection with the built parameters
    fn connect(&self, params: &BuiltParams)
        -> impl Future<Output = Result<Self::Connection>> + Send;

    /// Create `name` through a connection to [`ADMIN_DATABASE`] and close it
    fn create_database(&self, params: &BuiltParams, name: &str)
        -> impl Future<Output = Result<()>> + Send;

    /// Whether a connect error means the target database does not exist
    fn is_missing_database(&self, error: &RdsIamError) -> bool;
}

#[cfg(any(feature = "sync", feature = "async"))]
fn log_creation(params: &BuiltParams, name: &str) {
    tracing::info!(
        database = %name,
        host = %params.host(),
        port = params.port().ok(),
        "Database does not exist, creating it"
    );
}

/// Connect through a blocking backend, minting on the private runtime
#[cfg(feature = "sync")]
pub(crate) fn connect_blocking<B: BlockingBackend>(
    backend: &mut B,
    builder: &ConnectArgsBuilder,
    params: &ConnectionParams,
) -> Result<B::Connection> {
    let create_db = create_db_requested(params);
    let built = crate::runtime::block_on(builder.build(params))??;

    match backend.connect(&built) {
        Ok(connection) => Ok(connection),
        Err(e) if create_db && backend.is_missing_database(&e) => {
            let name = built.database_or_user();
            log_creation(&built, &name);
            backend.create_database(&built, &name)?;

            let built = crate::runtime::block_on(builder.build(params))??;
            backend.connect(&built)
        }
        Err(e) => Err(e),
    }
}

/// Connect through an async backend
#[cfg(feature = "async")]
pub(crate) async fn connect_async<B: AsyncBackend>(
    backend: &B,
    builder: &ConnectArgsBuilder,
    params: &ConnectionParams,
) -> Result<B::Connection> {
    let create_db = create_db_requested(params);
    let built = builder.build(params).await?;

    match backend.connect(&built).await {
        Ok(connection) => Ok(connection),
        Err(e) if create_db && backend.is_missing_database(&e) => {
            let name = built.database_or_user();
            log_creation(&built, &name);
            backend.create_database(&built, &name).await?;

            let built = builder.build(params).await?;
            backend.connect(&built).await
        }
        Err(e) => Err(e),
    }
}
