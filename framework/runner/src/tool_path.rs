use std::env;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;

use crate::types::SiegeResult;

/// Environment variable to override the path to the k6 binary that generates load.
pub const SIEGE_K6_PATH_ENV: &str = "SIEGE_K6_PATH";

/// Get the path to the load generator binary.
///
/// If [`SIEGE_K6_PATH_ENV`] is set to a path, that path is used and must exist. If it is unset, or
/// set to the bare name `k6`, the binary is looked up in the user's `PATH`.
pub fn k6_path() -> SiegeResult<PathBuf> {
    match env::var(SIEGE_K6_PATH_ENV).ok().as_deref() {
        Some("") => {
            bail!("'{SIEGE_K6_PATH_ENV}' set to empty string");
        }
        Some("k6") | None => {
            log::debug!("'{SIEGE_K6_PATH_ENV}' is not a path so looking in user's 'PATH'");
            which::which("k6").with_context(|| {
                format!(
                    "k6 binary not found in PATH. Install a k6 build with the LDAP extension or set '{SIEGE_K6_PATH_ENV}' to its path."
                )
            })
        }
        Some(path) => {
            let k6_path = PathBuf::from(path);
            if !k6_path.exists() {
                bail!(
                    "Path to k6 overridden with '{SIEGE_K6_PATH_ENV}={path}' but that path doesn't exist",
                    path = k6_path.display()
                );
            }
            Ok(k6_path)
        }
    }
}
