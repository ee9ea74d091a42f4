//! Connection Argument Builder
//!
//! Turns a caller-supplied [`ConnectionParams`] into the parameter set handed to a
//! PostgreSQL client:
//! 1. Resolve `host`, `port` and `user` (with defaults)
//! 2. Attach `sslrootcert` pointing at the RDS CA bundle when `rds_sslrootcert=true`
//! 3. Mint a token with the client for `aws_region_name` (or the backend default region)
//! 4. Strip the control keys, keep everything else verbatim
//! 5. Merge: original < SSL parameters < `password`
//!
//! The minted token always wins: a caller-supplied password is never forwarded.

use std::fmt;

use crate::ca_bundle::bundle_path;
use crate::error::Result;
use crate::params::{ConnectionParams, ParamValue};
use crate::token::TokenProvider;

/// Region override for the authentication client
pub const AWS_REGION_NAME: &str = "aws_region_name";

/// Create the target database when it does not exist
pub const CREATE_DB_IF_NOT_EXISTS: &str = "create_db_if_not_exists";

/// Point `sslrootcert` at the bundled RDS CA certificates
pub const RDS_SSLROOTCERT: &str = "rds_sslrootcert";

/// Parameters consumed by this crate and never forwarded to a client
pub const CONTROL_KEYS: [&str; 3] = [AWS_REGION_NAME, CREATE_DB_IF_NOT_EXISTS, RDS_SSLROOTCERT];

/// Whether the caller asked for the target database to be created when missing
#[must_use]
pub fn create_db_requested(params: &ConnectionParams) -> bool {
    params.flag(CREATE_DB_IF_NOT_EXISTS)
}

/// Output of [`ConnectArgsBuilder::build`]
///
/// Never contains a control key; always contains a freshly minted `password`.
#[derive(Clone, PartialEq, Eq)]
pub struct BuiltParams {
    params: ConnectionParams,
}

impl BuiltParams {
    /// Borrow the parameters
    #[must_use]
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Consume into the parameter set
    #[must_use]
    pub fn into_params(self) -> ConnectionParams {
        self.params
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// The minted token
    #[must_use]
    pub fn password(&self) -> &str {
        self.params.get("password").and_then(ParamValue::as_str).unwrap_or_default()
    }

    /// Host, defaulting to `localhost`
    #[must_use]
    pub fn host(&self) -> String {
        self.params.host()
    }

    /// Port, defaulting to `5432`
    pub fn port(&self) -> Result<u16> {
        self.params.port()
    }

    /// User, defaulting to `postgres`
    #[must_use]
    pub fn user(&self) -> String {
        self.params.user()
    }

    /// Target database, falling back to the user name like the server does
    #[must_use]
    pub fn database_or_user(&self) -> String {
        self.params.database().unwrap_or_else(|| self.user())
    }
}

impl fmt::Debug for BuiltParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in self.params.iter() {
            if key == "password" {
                map.entry(&key, &"<redacted>");
            } else {
                map.entry(&key, value);
            }
        }
        map.finish()
    }
}

/// Builds client parameters with an IAM token as password
#[derive(Debug, Clone)]
pub struct ConnectArgsBuilder {
    tokens: TokenProvider,
}

impl Default for ConnectArgsBuilder {
    fn default() -> Self {
        Self::new(TokenProvider::global().clone())
    }
}

impl ConnectArgsBuilder {
    /// Builder minting tokens through `tokens`
    #[must_use]
    pub fn new(tokens: TokenProvider) -> Self {
        Self { tokens }
    }

    /// The token provider in use
    #[must_use]
    pub fn token_provider(&self) -> &TokenProvider {
        &self.tokens
    }

    /// Build the parameters for one connection attempt
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an unusable `port`, or the authentication backend's
    /// error if no token could be minted.
    pub async fn build(&self, params: &ConnectionParams) -> Result<BuiltParams> {
        let host = params.host();
        let port = params.port()?;
        let user = params.user();

        let sslrootcert = params
            .flag(RDS_SSLROOTCERT)
            .then(|| bundle_path().to_string_lossy().into_owned());

        // No region, or an empty one, means the backend resolves one from its environment
        let region = params.get_string(AWS_REGION_NAME).filter(|r| !r.is_empty());

        let client = self.tokens.get_or_create_client(region.as_deref()).await?;
        let token = self.tokens.mint_token(client.as_ref(), &host, port, &user).await?;

        let mut built = params.without(&CONTROL_KEYS);
        if let Some(path) = sslrootcert {
            built.insert("sslrootcert", path);
        }
        built.insert("password", token.into_string());

        Ok(BuiltParams { params: built })
    }
}

/// Build parameters with the process-wide token provider
pub async fn build_connect_params(params: &ConnectionParams) -> Result<BuiltParams> {
    ConnectArgsBuilder::default().build(params).await
}
