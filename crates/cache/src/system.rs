//! System package discovery through pkg-config

use dop_types::Version;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Set once pkg-config failed to spawn; no further probes are attempted
/// for the rest of the process
static SYSTEM_DISABLED: AtomicBool = AtomicBool::new(false);

const PKG_CONFIG_TIMEOUT: Duration = Duration::from_secs(5);

/// Ask `pkg-config --modversion` for an installed package's version
///
/// Returns `None` when the package is unknown to pkg-config, the reported
/// version is unparseable, or pkg-config is unusable on this machine.
pub async fn pkg_config_version(name: &str) -> Option<Version> {
    if SYSTEM_DISABLED.load(Ordering::Relaxed) {
        return None;
    }

    let child = tokio::process::Command::new("pkg-config")
        .arg("--modversion")
        .arg(name)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(PKG_CONFIG_TIMEOUT, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            if !SYSTEM_DISABLED.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    error = %e,
                    "pkg-config could not be spawned; system packages are disabled"
                );
            }
            return None;
        }
        Err(_) => {
            tracing::debug!(name, "pkg-config timed out");
            return None;
        }
    };

    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_lenient(&raw)
}

/// pkg-config reports versions like `1.2` or `3.0.9a`; pad and trim them
/// into semver shape
fn parse_lenient(raw: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let mut parts = [0u64; 3];
    for (i, piece) in raw.split('.').take(3).enumerate() {
        let digits: String = piece.chars().take_while(char::is_ascii_digit).collect();
        parts[i] = digits.parse().ok()?;
    }
    Some(Version::new(parts[0], parts[1], parts[2]))
}
