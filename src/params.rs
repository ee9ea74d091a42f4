//! Connection Parameter Sets
//!
//! A connection parameter set is a mapping from parameter name to value, supplied by the
//! caller either directly or by parsing a connection URL. Parameter sets are never mutated
//! in place by the drivers: every transformation produces a new set.
//!
//! # Recognized Keys
//! - `host` (default `localhost`), `port` (default `5432`), `user` (default `postgres`)
//! - `database` / `dbname`
//! - Control keys consumed by this crate: `aws_region_name`, `create_db_if_not_exists`,
//!   `rds_sslrootcert`
//! - Anything else is forwarded to the underlying client untouched

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::{Host, Url};

use crate::error::{RdsIamError, Result};

/// Default host when `host` is absent
pub const DEFAULT_HOST: &str = "localhost";

/// Default port when `port` is absent
pub const DEFAULT_PORT: u16 = 5432;

/// Default user when `user` is absent
pub const DEFAULT_USER: &str = "postgres";

/// A single parameter value (string or typed scalar)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar (e.g. `port`)
    Int(i64),
    /// String value
    Str(String),
}

impl ParamValue {
    /// Boolean-like interpretation: `"true"` in any letter case enables, anything else disables
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(_) => false,
            Self::Str(s) => s.eq_ignore_ascii_case("true"),
        }
    }

    /// Borrow the value as a string slice, if it is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Connection parameter set
///
/// Keys are kept in a sorted map so that rendering (key/value strings, query strings)
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(BTreeMap<String, ParamValue>);

impl ConnectionParams {
    /// Create an empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a value, returning the previous one
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    /// Copy of this set without the given keys
    #[must_use]
    pub fn without(&self, keys: &[&str]) -> Self {
        self.0
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Look up a value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Look up a value rendered as a string
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.0.get(key).map(ToString::to_string)
    }

    /// Boolean-like flag; absent keys are false
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(ParamValue::is_truthy)
    }

    /// Whether the key is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over parameter names in key order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Host, defaulting to `localhost`
    #[must_use]
    pub fn host(&self) -> String {
        self.get_string("host").unwrap_or_else(|| DEFAULT_HOST.to_string())
    }

    /// Port, defaulting to `5432`
    ///
    /// # Errors
    /// Returns `InvalidParameter` if the value is not a valid TCP port.
    pub fn port(&self) -> Result<u16> {
        let Some(value) = self.get("port") else {
            return Ok(DEFAULT_PORT);
        };

        let parsed = match value {
            ParamValue::Int(i) => u16::try_from(*i).ok(),
            ParamValue::Str(s) => s.trim().parse::<u16>().ok(),
            ParamValue::Bool(_) => None,
        };

        parsed.ok_or_else(|| {
            RdsIamError::invalid_parameter(format!("port '{value}' is not a valid TCP port"))
        })
    }

    /// User, defaulting to `postgres`
    #[must_use]
    pub fn user(&self) -> String {
        self.get_string("user").unwrap_or_else(|| DEFAULT_USER.to_string())
    }

    /// Target database name (`database`, or the libpq spelling `dbname`)
    #[must_use]
    pub fn database(&self) -> Option<String> {
        self.get_string("database").or_else(|| self.get_string("dbname"))
    }

    /// Parse a connection URL into its scheme and a parameter set
    ///
    /// Format: `scheme://[user[:password]@][host][:port][/database][?key=value&...]`
    ///
    /// Every component is percent-decoded. Query pairs become parameters as-is, so control
    /// keys such as `aws_region_name=eu-west-1` can be passed in the URL.
    ///
    /// # Errors
    /// Returns `Config` if the URL cannot be parsed or contains invalid UTF-8 escapes.
    pub fn from_url(url: &str) -> Result<(String, Self)> {
        let url = Url::parse(url)
            .map_err(|e| RdsIamError::config_error(format!("Invalid connection URL: {e}")))?;

        let mut params = Self::new();

        match url.host() {
            Some(Host::Domain(host)) if !host.is_empty() => {
                params.insert("host", decode(host)?);
            }
            Some(Host::Ipv4(addr)) => {
                params.insert("host", addr.to_string());
            }
            Some(Host::Ipv6(addr)) => {
                params.insert("host", addr.to_string());
            }
            _ => {}
        }

        if let Some(port) = url.port() {
            params.insert("port", port);
        }

        if !url.username().is_empty() {
            params.insert("user", decode(url.username())?);
        }

        if let Some(password) = url.password() {
            params.insert("password", decode(password)?);
        }

        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            params.insert("database", decode(path)?);
        }

        for (key, value) in url.query_pairs() {
            params.insert(key.into_owned(), value.into_owned());
        }

        Ok((url.scheme().to_string(), params))
    }
}

fn decode(component: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| RdsIamError::config_error(format!("Invalid UTF-8 in connection URL: {e}")))
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ConnectionParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<ParamValue>> Extend<(K, V)> for ConnectionParams {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for ConnectionParams {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
