//! Configuration Management
//!
//! Named connection profiles, so applications can refer to a connection by name instead
//! of repeating its parameters.
//!
//! # Configuration Locations
//! - Local: `.rdsiam/config.json` (team-shareable, per-project)
//! - Global: `~/.config/rdsiam/profiles.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Local config file (`.rdsiam/config.json`)
//! 2. Global config file (`~/.config/rdsiam/profiles.json`)
//!
//! # Format
//! ```json
//! {
//!   "profiles": {
//!     "orders": {
//!       "host": "orders.abc123.eu-west-1.rds.amazonaws.com",
//!       "user": "app",
//!       "database": "orders",
//!       "aws_region_name": "eu-west-1",
//!       "rds_sslrootcert": "true"
//!     }
//!   },
//!   "default": "orders"
//! }
//! ```
//!
//! Profiles never hold a password: the password of every connection is a freshly minted
//! token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RdsIamError, Result};
use crate::params::ConnectionParams;

/// Profiles stored in one config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRegistry {
    /// Named parameter sets
    #[serde(default)]
    pub profiles: BTreeMap<String, ConnectionParams>,

    /// Name of the default profile (must exist in `profiles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ProfileRegistry {
    /// Layer `other` on top of `self`: its profiles replace same-named ones and its
    /// default pointer wins when set
    #[must_use]
    pub fn merged_with(mut self, other: Self) -> Self {
        self.profiles.extend(other.profiles);
        if other.default.is_some() {
            self.default = other.default;
        }
        self
    }

    /// Look up a profile, `None` meaning the default one
    ///
    /// # Errors
    /// Returns `Config` if the profile does not exist or no default is set.
    pub fn resolve(&self, name: Option<&str>) -> Result<ConnectionParams> {
        let available: Vec<&str> = self.profiles.keys().map(String::as_str).collect();

        let name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                RdsIamError::config_error(format!(
                    "No default profile set. Available profiles: {available:?}"
                ))
            })?,
        };

        self.profiles.get(name).cloned().ok_or_else(|| {
            let default_info = match &self.default {
                Some(d) => format!(" (default: '{d}')"),
                None => String::new(),
            };
            RdsIamError::config_error(format!(
                "Profile '{name}' not found. Available profiles: {available:?}{default_info}"
            ))
        })
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.rdsiam/config.json` (team-shareable)
    Local,
    /// Global config: `~/.config/rdsiam/profiles.json` (per-user)
    Global,
}

impl ConfigLocation {
    /// Path of the config file for this location
    pub fn path(&self) -> Result<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.rdsiam/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        RdsIamError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".rdsiam").join("config.json"))
}

/// Get path to global config file (`~/.config/rdsiam/profiles.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| RdsIamError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("rdsiam").join("profiles.json"))
}

/// Load profiles from a config file, an absent file meaning no profiles
pub fn load_profiles(path: &Path) -> Result<ProfileRegistry> {
    if !path.exists() {
        return Ok(ProfileRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| RdsIamError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        RdsIamError::config_error(format!(
            "Invalid config file format in '{}': {e}",
            path.display()
        ))
    })
}

/// Write profiles to a config file, creating its directory
pub fn save_profiles(path: &Path, registry: &ProfileRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            RdsIamError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| RdsIamError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| RdsIamError::config_error(format!("Could not write config file: {e}")))?;

    Ok(())
}

/// Save a profile to the config file at `location`
///
/// The first profile saved to a file becomes its default.
///
/// # Errors
/// Returns `Config` if `params` holds a `password` (it would never be used) or the file
/// cannot be read or written.
pub fn save_profile(location: ConfigLocation, name: &str, params: ConnectionParams) -> Result<()> {
    save_profile_at(&location.path()?, name, params)
}

/// Save a profile to the config file at `path`
///
/// # Errors
/// See [`save_profile`].
pub fn save_profile_at(path: &Path, name: &str, params: ConnectionParams) -> Result<()> {
    if params.contains_key("password") {
        return Err(RdsIamError::config_error(format!(
            "Profile '{name}' must not store a password: \
             every connection authenticates with a generated token"
        )));
    }

    let mut registry = load_profiles(path)?;
    let is_first_profile = registry.profiles.is_empty();

    registry.profiles.insert(name.to_string(), params);

    if is_first_profile {
        registry.default = Some(name.to_string());
    }

    save_profiles(path, &registry)
}

/// Load the global and local files, local taking precedence
pub fn load_with_precedence() -> Result<ProfileRegistry> {
    load_layered(&global_config_path()?, &local_config_path()?)
}

/// Load `global` then layer `local` on top
pub fn load_layered(global: &Path, local: &Path) -> Result<ProfileRegistry> {
    Ok(load_profiles(global)?.merged_with(load_profiles(local)?))
}

/// Resolve a profile by name across local and global config, `None` meaning the default
///
/// # Errors
/// Returns `Config` if the profile does not exist or no default is set.
pub fn resolve_profile(name: Option<&str>) -> Result<ConnectionParams> {
    load_with_precedence()?.resolve(name)
}

/// Names of every profile visible from the current directory
pub fn list_profiles() -> Result<Vec<String>> {
    Ok(load_with_precedence()?.profiles.into_keys().collect())
}
