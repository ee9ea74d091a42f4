//! Authentication Token Provider
//!
//! Mints short-lived RDS IAM authentication tokens that replace static passwords.
//!
//! # Client Cache
//! Building an authentication client resolves the AWS credential chain and region, which is
//! comparatively expensive. Clients are therefore memoized per distinct region value ("no
//! region" is its own key) for the lifetime of the [`TokenProvider`]. The global provider
//! lives as long as the process; [`TokenProvider::clear`] drops every cached client.
//!
//! # Tokens
//! Tokens expire within minutes, so a token is minted by a live call on every connection
//! attempt and never cached. [`AuthToken`] never prints its value.
//!
//! # Testing
//! The `test-util` feature adds `FixedTokenFactory`, whose clients hand out a fixed token
//! and record every request. It is absent from normal builds:
#![cfg_attr(
    not(feature = "test-util"),
    doc = "```compile_fail\nlet _ = rdsiam::token::FixedTokenFactory::new(\"token\");\n```"
)]

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config as AuthTokenConfig};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::sync::OnceCell;

use crate::error::{RdsIamError, Result};

/// An RDS IAM authentication token
///
/// WARNING: Sensitive data, do not log or include in error messages
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token value
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token value
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Client able to mint authentication tokens, bound to an optional region
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Region override this client was built with (`None` = backend default resolution)
    fn region(&self) -> Option<&str>;

    /// Mint a fresh token for `user` on `host:port`
    async fn generate_token(&self, host: &str, port: u16, user: &str) -> Result<AuthToken>;
}

/// Constructs [`AuthClient`]s for a region
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build a client; `None` lets the backend pick the region from its environment
    async fn create(&self, region: Option<&str>) -> Result<Arc<dyn AuthClient>>;
}

/// [`AuthClient`] backed by the AWS SDK
pub struct RdsAuthClient {
    region: Option<String>,
    sdk_config: SdkConfig,
}

impl RdsAuthClient {
    /// Load the AWS configuration (credential chain, region) for the given region override
    pub async fn load(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }

        Self { region: region.map(str::to_string), sdk_config: loader.load().await }
    }
}

#[async_trait]
impl AuthClient for RdsAuthClient {
    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn generate_token(&self, host: &str, port: u16, user: &str) -> Result<AuthToken> {
        let mut builder =
            AuthTokenConfig::builder().hostname(host).port(u64::from(port)).username(user);

        if let Some(region) = self.sdk_config.region() {
            builder = builder.region(region.clone());
        }

        let config = builder.build().map_err(RdsIamError::token)?;
        let token = AuthTokenGenerator::new(config)
            .auth_token(&self.sdk_config)
            .await
            .map_err(RdsIamError::token)?;

        Ok(AuthToken::new(token.to_string()))
    }
}

/// [`ClientFactory`] producing [`RdsAuthClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsClientFactory;

#[async_trait]
impl ClientFactory for AwsClientFactory {
    async fn create(&self, region: Option<&str>) -> Result<Arc<dyn AuthClient>> {
        Ok(Arc::new(RdsAuthClient::load(region).await))
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use fixed::{FixedTokenFactory, TokenRequest};

#[cfg(any(test, feature = "test-util"))]
mod fixed {
    use super::*;

    /// A request made to a [`FixedTokenFactory`] client
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TokenRequest {
        /// Region of the client that served the request
        pub region: Option<String>,
        /// Host the token was minted for
        pub host: String,
        /// Port the token was minted for
        pub port: u16,
        /// User the token was minted for
        pub user: String,
    }

    #[derive(Default)]
    struct FixedTokenLog {
        created: Vec<Option<String>>,
        requests: Vec<TokenRequest>,
    }

    /// [`ClientFactory`] whose clients return a fixed token and record every call
    ///
    /// Only built for this crate's tests and with the `test-util` feature.
    #[derive(Clone)]
    pub struct FixedTokenFactory {
        token: String,
        log: Arc<Mutex<FixedTokenLog>>,
    }

    impl FixedTokenFactory {
        /// Factory whose clients always mint `token`
        pub fn new(token: impl Into<String>) -> Self {
            Self { token: token.into(), log: Arc::default() }
        }

        /// Region of every client constructed so far, in construction order
        #[must_use]
        pub fn created_regions(&self) -> Vec<Option<String>> {
            self.log.lock().unwrap_or_else(PoisonError::into_inner).created.clone()
        }

        /// Every token request served so far, in order
        #[must_use]
        pub fn requests(&self) -> Vec<TokenRequest> {
            self.log.lock().unwrap_or_else(PoisonError::into_inner).requests.clone()
        }
    }

    struct FixedTokenClient {
        region: Option<String>,
        token: String,
        log: Arc<Mutex<FixedTokenLog>>,
    }

    #[async_trait]
    impl AuthClient for FixedTokenClient {
        fn region(&self) -> Option<&str> {
            self.region.as_deref()
        }

        async fn generate_token(&self, host: &str, port: u16, user: &str) -> Result<AuthToken> {
            self.log.lock().unwrap_or_else(PoisonError::into_inner).requests.push(TokenRequest {
                region: self.region.clone(),
                host: host.to_string(),
                port,
                user: user.to_string(),
            });
            Ok(AuthToken::new(self.token.clone()))
        }
    }

    #[async_trait]
    impl ClientFactory for FixedTokenFactory {
        async fn create(&self, region: Option<&str>) -> Result<Arc<dyn AuthClient>> {
            let region = region.map(str::to_string);
            self.log.lock().unwrap_or_else(PoisonError::into_inner).created.push(region.clone());
            Ok(Arc::new(FixedTokenClient {
                region,
                token: self.token.clone(),
                log: Arc::clone(&self.log),
            }))
        }
    }
}

type ClientCell = Arc<OnceCell<Arc<dyn AuthClient>>>;

static GLOBAL: LazyLock<TokenProvider> = LazyLock::new(|| TokenProvider::new(AwsClientFactory));

/// Memoizing token provider
///
/// Cloning is cheap and clones share the same client cache.
#[derive(Clone)]
pub struct TokenProvider {
    factory: Arc<dyn ClientFactory>,
    clients: Arc<Mutex<HashMap<Option<String>, ClientCell>>>,
}

impl TokenProvider {
    /// Provider backed by the given factory, with an empty cache
    pub fn new(factory: impl ClientFactory + 'static) -> Self {
        Self { factory: Arc::new(factory), clients: Arc::default() }
    }

    /// Process-wide provider backed by the AWS SDK
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Return the cached client for `region`, constructing it on first use
    ///
    /// Concurrent first callers for the same region wait on the same initialization; a
    /// failed construction is not cached.
    pub async fn get_or_create_client(&self, region: Option<&str>) -> Result<Arc<dyn AuthClient>> {
        let cell = {
            let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(clients.entry(region.map(str::to_string)).or_default())
        };

        let client = cell
            .get_or_try_init(|| async {
                tracing::debug!(region = ?region, "creating RDS authentication client");
                self.factory.create(region).await
            })
            .await?;

        Ok(Arc::clone(client))
    }

    /// Mint a fresh token through `client`
    pub async fn mint_token(
        &self,
        client: &dyn AuthClient,
        host: &str,
        port: u16,
        user: &str,
    ) -> Result<AuthToken> {
        let token = client.generate_token(host, port, user).await?;
        tracing::debug!(
            host,
            port,
            user,
            region = ?client.region(),
            "minted RDS IAM authentication token"
        );
        Ok(token)
    }

    /// Number of regions with a cached client
    #[must_use]
    pub fn cached_clients(&self) -> usize {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.values().filter(|cell| cell.initialized()).count()
    }

    /// Drop every cached client
    pub fn clear(&self) {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider").field("cached_clients", &self.cached_clients()).finish()
    }
}
