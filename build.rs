//! Embeds the RDS certificate bundle into the library.
//!
//! Sources, first match wins:
//! 1. The file named by `RDSIAM_CA_BUNDLE_PATH`
//! 2. `rds-ca-bundle/global-bundle.pem`, shipped with the package
//! 3. A download of the published bundle (skipped when `RDSIAM_CA_BUNDLE_OFFLINE` or
//!    `DOCS_RS` is set)
//!
//! Without any of them the embedded bundle is empty and `rds_sslrootcert=true` fails at
//! connect time with "No valid certificates".

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

const BUNDLE_URL: &str = "https://truststore.pki.rds.amazonaws.com/global/global-bundle.pem";
const SHIPPED_BUNDLE: &str = "rds-ca-bundle/global-bundle.pem";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=rds-ca-bundle");
    println!("cargo:rerun-if-env-changed=RDSIAM_CA_BUNDLE_PATH");
    println!("cargo:rerun-if-env-changed=RDSIAM_CA_BUNDLE_OFFLINE");

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    let pem = bundle();

    fs::write(out_dir.join("global-bundle.pem"), pem).expect("failed to write embedded bundle");
}

fn bundle() -> Vec<u8> {
    if let Some(path) = env::var_os("RDSIAM_CA_BUNDLE_PATH") {
        let pem = fs::read(&path).unwrap_or_else(|e| {
            panic!("RDSIAM_CA_BUNDLE_PATH={}: {e}", PathBuf::from(&path).display())
        });
        assert!(is_pem(&pem), "RDSIAM_CA_BUNDLE_PATH does not name a PEM bundle");
        return pem;
    }

    let manifest_dir =
        PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").expect("cargo sets CARGO_MANIFEST_DIR"));
    if let Ok(pem) = fs::read(manifest_dir.join(SHIPPED_BUNDLE)) {
        if is_pem(&pem) {
            return pem;
        }
        println!("cargo:warning={SHIPPED_BUNDLE} is not a PEM bundle, ignoring it");
    }

    if let Some(pem) = download() {
        return pem;
    }

    println!(
        "cargo:warning=RDS CA bundle unavailable: rds_sslrootcert=true will fail. \
         Run scripts/fetch-rds-ca-bundle.sh or set RDSIAM_CA_BUNDLE_PATH"
    );
    Vec::new()
}

fn download() -> Option<Vec<u8>> {
    if env::var_os("RDSIAM_CA_BUNDLE_OFFLINE").is_some() || env::var_os("DOCS_RS").is_some() {
        return None;
    }

    let output = Command::new("curl")
        .args(["--fail", "--silent", "--show-error", "--location"])
        .args(["--max-time", "30", BUNDLE_URL])
        .output()
        .ok()?;

    (output.status.success() && is_pem(&output.stdout)).then_some(output.stdout)
}

fn is_pem(contents: &[u8]) -> bool {
    contents.windows(27).any(|w| w == b"-----BEGIN CERTIFICATE-----")
}
