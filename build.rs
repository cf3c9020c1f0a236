use std::env;
use std::process::Command;

const SHA_VAR: &str = "TCGA_CLASSIFY_GIT_SHA";

/// Short commit hash, from the environment when packaged outside a checkout.
fn resolve_sha() -> Option<String> {
    if let Ok(sha) = env::var(SHA_VAR) {
        let sha = sha.trim().to_string();
        return if sha.is_empty() { None } else { Some(sha) };
    }

    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}

fn main() {
    println!("cargo:rerun-if-env-changed={}", SHA_VAR);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");

    if let Some(sha) = resolve_sha() {
        println!("cargo:rustc-env={}={}", SHA_VAR, sha);
    }
}
