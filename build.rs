//! Embeds a human-readable version in `BUILD_INFO_HUMAN` for `--version`.
//!
//! Uses `git describe --tags --always --dirty` when a tag is reachable.
//! Otherwise builds `v{CARGO_PKG_VERSION}-{timestamp}-{commit}[+dirty]`,
//! taking the commit time for clean trees and the build time for dirty
//! ones or when git is unavailable.

use std::process::Command;

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn main() {
    ["src", "build.rs", "Cargo.toml", "Cargo.lock"]
        .iter()
        .for_each(|path| println!("cargo:rerun-if-changed={path}"));

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", human_version());
}

fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn rustc_version() -> Option<String> {
    Command::new("rustc")
        .arg("--version")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
}

/// `None` outside a git checkout. `.cargo-ok` comes from `cargo install
/// --git` and does not count.
fn is_dirty() -> Option<bool> {
    git(&["status", "--porcelain"]).map(|status| {
        status
            .lines()
            .any(|line| line.get(3..).is_some_and(|path| path != ".cargo-ok"))
    })
}

fn pseudo_version() -> String {
    let commit = git(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let dirty = is_dirty();

    let commit_time = || {
        git(&["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    };
    let timestamp = match dirty {
        Some(false) => commit_time(),
        Some(true) | None => None,
    }
    .unwrap_or_else(Utc::now)
    .format(TIMESTAMP_FORMAT);

    let suffix = if dirty == Some(true) { "+dirty" } else { "" };
    format!(
        "v{}-{timestamp}-{commit}{suffix}",
        env!("CARGO_PKG_VERSION")
    )
}

fn git_version() -> String {
    match git(&["describe", "--tags", "--always", "--dirty"]) {
        Some(desc) if desc.contains('v') || desc.contains("-g") => desc,
        _ => pseudo_version(),
    }
}

fn human_version() -> String {
    [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        Some(format!("({})", git_version())),
        rustc_version(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
}
