//! The bundled RDS root certificate authorities.
//!
//! The bundle is a PEM file holding the root CA of every RDS region. It ships with the
//! package as `rds-ca-bundle/global-bundle.pem` and is embedded into the library at build
//! time, so installed binaries do not depend on the source tree. Drivers that want a file
//! path get a copy written once to the user cache directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use sha2::{Digest, Sha256};

/// Where the global bundle is published
pub const BUNDLE_URL: &str = "https://truststore.pki.rds.amazonaws.com/global/global-bundle.pem";

static BUNDLE_PEM: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/global-bundle.pem"));

static BUNDLE_PATH: LazyLock<PathBuf> = LazyLock::new(|| {
    let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("rdsiam");
    materialize(&base, BUNDLE_PEM)
});

/// PEM contents of the global certificate bundle for all RDS regions
///
/// Empty when the crate was built without access to the bundle.
#[must_use]
pub fn bundle_pem() -> &'static [u8] {
    BUNDLE_PEM
}

/// Path of the global certificate bundle for all RDS regions
///
/// The file is named after a digest of its contents, so every build of the crate gets its
/// own copy and an existing copy is only rewritten when it was damaged.
#[must_use]
pub fn bundle_path() -> &'static Path {
    &BUNDLE_PATH
}

fn bundle_file_name(pem: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(pem));
    format!("global-bundle-{}.pem", &digest[..16])
}

/// Write `pem` under `dir` unless an identical copy is already there
fn materialize(dir: &Path, pem: &[u8]) -> PathBuf {
    let path = dir.join(bundle_file_name(pem));

    if fs::read(&path).is_ok_and(|existing| existing == pem) {
        return path;
    }

    if let Err(e) = write_atomically(&path, pem) {
        tracing::warn!("Failed to write RDS CA bundle to {}: {}", path.display(), e);
    }

    path
}

fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension(format!("pem.{}.tmp", std::process::id()));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundle_path_is_stable() {
        assert_eq!(bundle_path(), bundle_path());
        assert!(bundle_path().is_absolute());
        assert_eq!(bundle_path().extension().and_then(|e| e.to_str()), Some("pem"));
    }

    #[test]
    fn test_bundle_path_holds_embedded_bundle() {
        let written = fs::read(bundle_path()).expect("Bundle was not written");
        assert_eq!(written, bundle_pem());
    }

    #[test]
    fn test_bundle_path_outside_source_tree() {
        assert!(!bundle_path().starts_with(env!("CARGO_MANIFEST_DIR")));
    }

    #[test]
    fn test_materialize_writes_once() {
        let dir = TempDir::new().unwrap();
        let pem = b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";

        let path = materialize(dir.path(), pem);
        assert_eq!(fs::read(&path).unwrap(), pem);

        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(materialize(dir.path(), pem), path);
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[test]
    fn test_materialize_repairs_damaged_copy() {
        let dir = TempDir::new().unwrap();
        let pem = b"-----BEGIN CERTIFICATE-----\nBBBB\n-----END CERTIFICATE-----\n";
        let path = dir.path().join(bundle_file_name(pem));
        fs::write(&path, b"truncated").unwrap();

        assert_eq!(materialize(dir.path(), pem), path);
        assert_eq!(fs::read(&path).unwrap(), pem);
    }

    #[test]
    fn test_file_name_depends_on_contents() {
        assert_ne!(bundle_file_name(b"one"), bundle_file_name(b"two"));
        assert_eq!(bundle_file_name(b"one"), bundle_file_name(b"one"));
    }

    #[test]
    fn test_materialize_reports_path_when_unwritable() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let path = materialize(&blocker, b"pem");
        assert!(path.starts_with(&blocker));
        assert!(!path.exists());
    }
}
