//! TLS configuration for connections to RDS.
//!
//! The Rust PostgreSQL client does not read libpq's `sslrootcert` key and only understands
//! the `disable`, `prefer` and `require` SSL modes. The drivers therefore take the TLS keys
//! out of the built parameters before handing them over, and translate them into a rustls
//! connector.

use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::error::{RdsIamError, Result};
use crate::params::ConnectionParams;

/// SSL/TLS connection mode matching the libpq `sslmode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// No TLS
    Disable,
    /// Treated as `prefer`
    Allow,
    /// TLS when the server supports it
    Prefer,
    /// TLS required
    Require,
    /// TLS required, server certificate must chain to a trusted CA
    VerifyCa,
    /// TLS required, trusted CA and matching hostname
    VerifyFull,
}

impl SslMode {
    /// Whether this mode requires certificate verification (CA or full)
    #[must_use]
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::VerifyCa | Self::VerifyFull)
    }

    /// Closest mode understood by `tokio-postgres`
    #[must_use]
    pub fn backend_mode(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Allow | Self::Prefer => "prefer",
            Self::Require | Self::VerifyCa | Self::VerifyFull => "require",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disable => write!(f, "disable"),
            Self::Allow => write!(f, "allow"),
            Self::Prefer => write!(f, "prefer"),
            Self::Require => write!(f, "require"),
            Self::VerifyCa => write!(f, "verify-ca"),
            Self::VerifyFull => write!(f, "verify-full"),
        }
    }
}

impl std::str::FromStr for SslMode {
    type Err = RdsIamError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(RdsIamError::invalid_parameter(format!(
                "invalid sslmode '{s}': expected disable, allow, prefer, require, \
                 verify-ca, or verify-full"
            ))),
        }
    }
}

/// TLS keys taken out of a parameter set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    mode: Option<SslMode>,
    root_cert: Option<PathBuf>,
}

impl TlsSettings {
    /// Remove `sslmode` and `sslrootcert` from `params`
    ///
    /// When `sslmode` was given, it is written back in the form the client understands.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an unknown `sslmode`.
    pub fn take_from(params: &mut ConnectionParams) -> Result<Self> {
        let mode = params.remove("sslmode").map(|v| v.to_string().parse::<SslMode>()).transpose()?;
        let root_cert = params.remove("sslrootcert").map(|v| PathBuf::from(v.to_string()));

        if let Some(mode) = mode {
            params.insert("sslmode", mode.backend_mode());
        }

        Ok(Self { mode, root_cert })
    }

    /// Requested mode, if any
    #[must_use]
    pub fn mode(&self) -> Option<SslMode> {
        self.mode
    }

    /// Root certificate file, if any
    #[must_use]
    pub fn root_cert(&self) -> Option<&Path> {
        self.root_cert.as_deref()
    }

    /// Build the connector to hand to the client, `None` meaning plaintext
    ///
    /// - `disable`: no TLS
    /// - a root certificate file: trust exactly the certificates in that file
    /// - `require`, `verify-ca`, `verify-full` without a file: trust the platform roots
    /// - otherwise: no TLS
    ///
    /// # Errors
    /// Fails if the certificate file cannot be read or holds no certificate, or if no
    /// platform root could be loaded.
    pub fn connector(&self) -> Result<Option<MakeRustlsConnect>> {
        if self.mode == Some(SslMode::Disable) {
            return Ok(None);
        }

        let roots = if let Some(path) = &self.root_cert {
            load_root_store(path)?
        } else if matches!(
            self.mode,
            Some(SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull)
        ) {
            native_root_store()?
        } else {
            return Ok(None);
        };

        Ok(Some(MakeRustlsConnect::new(client_config(roots)?)))
    }
}

/// Load every certificate of a PEM bundle into a root store
///
/// # Errors
/// Returns `Io` if the file cannot be read, `Config` if it is not valid PEM or holds no
/// certificate, and `Tls` if rustls rejects a certificate.
pub fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let pem = fs::read(path)?;
    let mut store = RootCertStore::empty();

    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        let cert = cert.map_err(|e| {
            RdsIamError::config_error(format!(
                "Failed to parse CA certificate from '{}': {e}",
                path.display()
            ))
        })?;
        store.add(cert)?;
    }

    if store.is_empty() {
        return Err(RdsIamError::config_error(format!(
            "No valid certificates found in '{}'",
            path.display()
        )));
    }

    Ok(store)
}

fn native_root_store() -> Result<RootCertStore> {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    store.add_parsable_certificates(result.certs);

    if store.is_empty() {
        return Err(RdsIamError::config_error("Failed to load any system root certificates"));
    }

    Ok(store)
}

fn client_config(roots: RootCertStore) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth())
}
