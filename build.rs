use std::process::Command;

const HASH_VAR: &str = "SENTIENT_RACE_GIT_HASH";
const DATE_VAR: &str = "SENTIENT_RACE_BUILD_DATE";

fn main() {
    // Container builds have no .git; CI passes the values in instead.
    let git_hash = preset(HASH_VAR)
        .or_else(|| stdout_of("git", &["rev-parse", "--short", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());
    let build_date = preset(DATE_VAR)
        .or_else(|| stdout_of("date", &["-u", "+%Y-%m-%d"]))
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env={HASH_VAR}={git_hash}");
    println!("cargo:rustc-env={DATE_VAR}={build_date}");

    println!("cargo:rerun-if-env-changed={HASH_VAR}");
    println!("cargo:rerun-if-env-changed={DATE_VAR}");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

fn preset(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Trimmed stdout of a successful command.
fn stdout_of(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
