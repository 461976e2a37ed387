//! Build script for the EventSub overlay
//!
//! Embeds git revision, build time, target and rustc version so that
//! `eventsub-overlay version` can report exactly what is running.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = match Command::new("git").args(["status", "--porcelain"]).output() {
        Ok(out) if out.status.success() => (!out.stdout.is_empty()).to_string(),
        _ => "unknown".to_string(),
    };
    let rustc_version = command_output("rustc", &["--version"]);
    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let cargo_var = |name: &str| env::var(name).unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=OVERLAY_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=OVERLAY_GIT_DIRTY={}", git_dirty);
    println!("cargo:rustc-env=OVERLAY_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=OVERLAY_TARGET={}", cargo_var("TARGET"));
    println!("cargo:rustc-env=OVERLAY_PROFILE={}", cargo_var("PROFILE"));
    println!("cargo:rustc-env=OVERLAY_RUSTC_VERSION={}", rustc_version);
}

/// Trimmed stdout of a command, or "unknown" if it fails
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
