//! Common utilities for integration tests

use assert_cmd::Command;
use std::path::PathBuf;

/// Get the path to the `locator-bridge` binary
///
/// Prefers `CARGO_BIN_EXE_locator-bridge` (set by cargo, including custom
/// target directories) and falls back to `cargo_bin()`.
#[allow(deprecated)] // cargo_bin() is deprecated but needed for fallback
pub fn bridge_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_locator-bridge")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("locator-bridge"))
}

/// Create a Command for `locator-bridge` isolated from the caller's
/// environment: no home directory and no `LOCATOR_*` overrides.
#[allow(dead_code)]
pub fn bridge_command() -> Command {
    let mut cmd = Command::new(bridge_binary());
    cmd.env("HOME", "/nonexistent").env("USERPROFILE", "/nonexistent");
    for (key, _) in std::env::vars() {
        if key.starts_with("LOCATOR_") {
            cmd.env_remove(key);
        }
    }
    cmd
}
