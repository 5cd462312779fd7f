//! Build script that stamps the git commit into the binary.
//!
//! `/health`, `switchboard health` and the startup log report it so an
//! operator can tell which build is fronting a cluster. Falls back to
//! `"unknown"` when git is unavailable (e.g. Docker builds without `.git`).

use std::process::Command;

fn git_commit() -> String {
    std::env::var("SWITCHBOARD_GIT_SHORT_OVERRIDE")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".into())
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
    println!("cargo:rerun-if-env-changed=SWITCHBOARD_GIT_SHORT_OVERRIDE");
    println!("cargo:rustc-env=SWITCHBOARD_GIT_SHORT={}", git_commit());
}
