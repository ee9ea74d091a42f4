//! Blocking driver on top of the `postgres` crate

use postgres::{Client, Config, NoTls};

use super::{
    connect_blocking, error_chain_text, is_missing_database_message, quote_identifier,
    reject_connection_string, BlockingBackend, ADMIN_DATABASE,
};
use crate::build::{BuiltParams, ConnectArgsBuilder};
use crate::error::{RdsIamError, Result};
use crate::params::{ConnectionParams, DEFAULT_HOST, DEFAULT_USER};
use crate::tls::TlsSettings;
use crate::token::TokenProvider;

/// Blocking driver authenticating with IAM tokens
///
/// Must not be used from within an async runtime, like [`postgres::Client`] itself.
#[derive(Debug, Clone, Default)]
pub struct SyncDriver {
    builder: ConnectArgsBuilder,
}

impl SyncDriver {
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
    pub fn connect(&self, dsn: Option<&str>, params: ConnectionParams) -> Result<Client> {
        reject_connection_string(dsn)?;
        connect_blocking(&mut PostgresBackend, &self.builder, &params)
    }
}

/// Open a connection with the process-wide token provider
///
/// # Errors
/// See [`SyncDriver::connect`].
pub fn connect(dsn: Option<&str>, params: ConnectionParams) -> Result<Client> {
    SyncDriver::default().connect(dsn, params)
}

struct PostgresBackend;

impl BlockingBackend for PostgresBackend {
    type Connection = Client;

    fn connect(&mut self, params: &BuiltParams) -> Result<Client> {
        open(client_params(params))
    }

    fn create_database(&mut self, params: &BuiltParams, name: &str) -> Result<()> {
        let mut admin = client_params(params);
        admin.insert("dbname", ADMIN_DATABASE);

        let mut client = open(admin)?;
        let created = client.batch_execute(&format!("CREATE DATABASE {}", quote_identifier(name)));
        let closed = client.close();
        created?;
        closed?;
        Ok(())
    }

    fn is_missing_database(&self, error: &RdsIamError) -> bool {
        error.as_postgres().is_some_and(|e| is_missing_database_message(&error_chain_text(e)))
    }
}

/// Parameters in the form the `postgres` crate reads them
///
/// `database` is renamed to `dbname`. Host and user fall back to the values the token
/// was minted for.
pub(crate) fn client_params(built: &BuiltParams) -> ConnectionParams {
    let mut params = built.params().clone();
    if let Some(database) = params.remove("database") {
        params.insert("dbname", database);
    }
    if !params.contains_key("host") {
        params.insert("host", DEFAULT_HOST);
    }
    if !params.contains_key("user") {
        params.insert("user", DEFAULT_USER);
    }
    params
}

fn open(mut params: ConnectionParams) -> Result<Client> {
    let tls = TlsSettings::take_from(&mut params)?;
    let config: Config = key_value_string(&params).parse()?;

    let client = match tls.connector()? {
        Some(connector) => config.connect(connector)?,
        None => config.connect(NoTls)?,
    };
    Ok(client)
}

/// Render parameters as a libpq key/value connection string
pub(crate) fn key_value_string(params: &ConnectionParams) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", quote_value(&value.to_string())))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
