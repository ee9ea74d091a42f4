//! pg-rdsiam - IAM-Authenticated PostgreSQL Connections for Amazon RDS
//!
//! Connects to PostgreSQL on RDS using short-lived IAM authentication tokens instead of
//! static passwords. Every connection attempt mints a fresh token through the AWS SDK
//! and passes it as the password; everything else is handed to the PostgreSQL client
//! unchanged.
//!
//! # Core Principles
//! - A token is minted per connection attempt and never cached
//! - Authentication clients are cached per region for the life of the process
//! - Client errors reach the caller with their native type and message
//! - Optional creation of a missing target database, then a single retry
//! - Optional TLS verification against the bundled RDS certificate authorities
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`params`] - Connection parameter sets and URL parsing
//! - [`token`] - Authentication clients and token minting
//! - [`ca_bundle`] - The embedded RDS CA bundle
//! - [`build`] - Connection argument builder
//! - [`tls`] - TLS settings for the PostgreSQL clients
//! - [`driver`] - Blocking and async driver adapters
//! - [`dialect`] - Driver names and availability
//! - [`config`] - Named connection profiles
//!
//! # Example
//! ```no_run
//! # async fn run() -> rdsiam::Result<()> {
//! use rdsiam::{DbApi, Dialect};
//!
//! let (dialect, params) = Dialect::from_url(
//!     "postgresql+tokiopgrdsiam://app@orders.abc123.eu-west-1.rds.amazonaws.com/orders\
//!      ?aws_region_name=eu-west-1&rds_sslrootcert=true&sslmode=verify-full",
//! )?;
//! if let DbApi::Async(driver) = dialect.dbapi()? {
//!     let client = driver.connect(None, params).await?;
//!     client.simple_query("SELECT 1").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod ca_bundle;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod params;
#[cfg(feature = "sync")]
mod runtime;
pub mod tls;
pub mod token;

// Re-export commonly used types for convenience
pub use build::{build_connect_params, BuiltParams, ConnectArgsBuilder, CONTROL_KEYS};
pub use ca_bundle::{bundle_path, bundle_pem};
pub use config::{resolve_profile, save_profile, ConfigLocation, ProfileRegistry};
pub use dialect::{
    registered, Capabilities, DbApi, Dialect, ASYNC_DRIVER_NAME, SYNC_DRIVER_NAME,
};
#[cfg(feature = "async")]
pub use driver::async_pg::AsyncDriver;
#[cfg(feature = "sync")]
pub use driver::sync_pg::SyncDriver;
pub use error::{RdsIamError, Result};
pub use params::{ConnectionParams, ParamValue};
pub use tls::SslMode;
pub use token::{AuthClient, AuthToken, ClientFactory, TokenProvider};
#[cfg(any(test, feature = "test-util"))]
pub use token::{FixedTokenFactory, TokenRequest};
