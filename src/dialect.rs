//! Driver registration
//!
//! Each adapter is registered under a driver name that a connection URL selects through
//! its scheme. Whether an adapter is usable depends on the crate features it was built
//! with; asking for an adapter that was compiled out fails with a clear
//! `MissingDependency` error instead of a missing symbol.

use std::fmt;

use tokio_postgres::error::SqlState;

use crate::build::ConnectArgsBuilder;
#[cfg(feature = "async")]
use crate::driver::async_pg::AsyncDriver;
#[cfg(feature = "sync")]
use crate::driver::sync_pg::SyncDriver;
use crate::error::{RdsIamError, Result};
use crate::params::ConnectionParams;

/// Driver name of the blocking adapter
pub const SYNC_DRIVER_NAME: &str = "postgresql+postgresrdsiam";

/// Driver name of the async adapter
pub const ASYNC_DRIVER_NAME: &str = "postgresql+tokiopgrdsiam";

/// Adapters compiled into this build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// The blocking adapter (`sync` feature)
    pub sync_available: bool,
    /// The async adapter (`async` feature)
    pub async_available: bool,
}

impl Capabilities {
    /// Capabilities of the current build
    #[must_use]
    pub const fn current() -> Self {
        Self { sync_available: cfg!(feature = "sync"), async_available: cfg!(feature = "async") }
    }
}

/// A registered driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Blocking adapter on the `postgres` crate
    SyncRdsIam,
    /// Async adapter on `tokio-postgres`
    AsyncRdsIam,
}

impl Dialect {
    /// Every driver this crate knows about, available or not
    pub const ALL: [Self; 2] = [Self::SyncRdsIam, Self::AsyncRdsIam];

    /// Registered driver name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SyncRdsIam => SYNC_DRIVER_NAME,
            Self::AsyncRdsIam => ASYNC_DRIVER_NAME,
        }
    }

    /// Client crate the adapter is built on
    #[must_use]
    pub const fn client_crate(&self) -> &'static str {
        match self {
            Self::SyncRdsIam => "postgres",
            Self::AsyncRdsIam => "tokio-postgres",
        }
    }

    /// Crate feature enabling the adapter
    #[must_use]
    pub const fn feature(&self) -> &'static str {
        match self {
            Self::SyncRdsIam => "sync",
            Self::AsyncRdsIam => "async",
        }
    }

    /// Look up a driver by name
    ///
    /// # Errors
    /// Returns `Config` for an unknown name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name).ok_or_else(|| {
            RdsIamError::config_error(format!(
                "Unknown driver '{name}': expected '{SYNC_DRIVER_NAME}' or '{ASYNC_DRIVER_NAME}'"
            ))
        })
    }

    /// Whether the adapter was compiled into this build
    #[must_use]
    pub const fn is_available(&self) -> bool {
        let capabilities = Capabilities::current();
        match self {
            Self::SyncRdsIam => capabilities.sync_available,
            Self::AsyncRdsIam => capabilities.async_available,
        }
    }

    /// The adapter, minting tokens with the process-wide provider
    ///
    /// # Errors
    /// Returns `MissingDependency` if the adapter was compiled out.
    pub fn dbapi(&self) -> Result<DbApi> {
        self.dbapi_with(ConnectArgsBuilder::default())
    }

    /// The adapter, minting tokens through `builder`
    ///
    /// # Errors
    /// Returns `MissingDependency` if the adapter was compiled out.
    #[allow(unused_variables)]
    pub fn dbapi_with(&self, builder: ConnectArgsBuilder) -> Result<DbApi> {
        match self {
            #[cfg(feature = "sync")]
            Self::SyncRdsIam => Ok(DbApi::Sync(SyncDriver::with_builder(builder))),
            #[cfg(feature = "async")]
            Self::AsyncRdsIam => Ok(DbApi::Async(AsyncDriver::with_builder(builder))),
            #[allow(unreachable_patterns)]
            _ => Err(RdsIamError::missing_dependency(format!(
                "`{}` is required to use `{}` (enable the `{}` feature)",
                self.client_crate(),
                self.name(),
                self.feature()
            ))),
        }
    }

    /// Split a connection URL into its driver and parameters
    ///
    /// # Errors
    /// Returns `Config` for a malformed URL or an unknown scheme.
    pub fn from_url(url: &str) -> Result<(Self, ConnectionParams)> {
        let (scheme, params) = ConnectionParams::from_url(url)?;
        Ok((Self::from_name(&scheme)?, params))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drivers available in this build
#[must_use]
pub fn registered() -> Vec<Dialect> {
    Dialect::ALL.into_iter().filter(Dialect::is_available).collect()
}

/// A usable adapter
#[derive(Debug, Clone)]
pub enum DbApi {
    /// Blocking adapter
    #[cfg(feature = "sync")]
    Sync(SyncDriver),
    /// Async adapter
    #[cfg(feature = "async")]
    Async(AsyncDriver),
}

impl DbApi {
    /// Driver this adapter is registered as
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match *self {
            #[cfg(feature = "sync")]
            Self::Sync(_) => Dialect::SyncRdsIam,
            #[cfg(feature = "async")]
            Self::Async(_) => Dialect::AsyncRdsIam,
        }
    }

    /// SQLSTATE the server reports for a missing database
    #[must_use]
    pub fn missing_database_sqlstate(&self) -> SqlState {
        SqlState::INVALID_CATALOG_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for dialect in Dialect::ALL {
            assert_eq!(Dialect::from_name(dialect.name()).unwrap(), dialect);
            assert_eq!(dialect.to_string(), dialect.name());
        }
        assert!(matches!(Dialect::from_name("postgresql+psycopg2"), Err(RdsIamError::Config(_))));
    }

    #[test]
    fn test_capabilities_follow_features() {
        let capabilities = Capabilities::current();
        assert_eq!(capabilities.sync_available, cfg!(feature = "sync"));
        assert_eq!(capabilities.async_available, cfg!(feature = "async"));
        assert_eq!(Dialect::SyncRdsIam.is_available(), capabilities.sync_available);
        assert_eq!(registered().len(), Dialect::ALL.iter().filter(|d| d.is_available()).count());
    }

    #[test]
    fn test_from_url() {
        let (dialect, params) = Dialect::from_url(
            "postgresql+tokiopgrdsiam://app@db.example.com:5433/orders?aws_region_name=eu-west-1",
        )
        .unwrap();

        assert_eq!(dialect, Dialect::AsyncRdsIam);
        assert_eq!(params.host(), "db.example.com");
        assert_eq!(params.port().unwrap(), 5433);
        assert_eq!(params.database().as_deref(), Some("orders"));
        assert_eq!(params.get_string("aws_region_name").as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_from_url_unknown_scheme() {
        assert!(Dialect::from_url("mysql://app@db/orders").is_err());
    }

    #[cfg(feature = "sync")]
    #[test]
    fn test_sync_dbapi() {
        let dbapi = Dialect::SyncRdsIam.dbapi().unwrap();
        assert_eq!(dbapi.dialect(), Dialect::SyncRdsIam);
        assert_eq!(dbapi.missing_database_sqlstate().code(), "3D000");
    }

    #[cfg(not(feature = "sync"))]
    #[test]
    fn test_sync_dbapi_missing() {
        let err = Dialect::SyncRdsIam.dbapi().unwrap_err();
        assert!(matches!(err, RdsIamError::MissingDependency(_)));
        assert!(err
            .to_string()
            .contains("`postgres` is required to use `postgresql+postgresrdsiam`"));
    }

    #[cfg(feature = "async")]
    #[test]
    fn test_async_dbapi() {
        let dbapi = Dialect::AsyncRdsIam.dbapi().unwrap();
        assert_eq!(dbapi.dialect(), Dialect::AsyncRdsIam);
    }
}
