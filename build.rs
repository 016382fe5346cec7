// build.rs

fn main() {
    let version = std::env::var("CARGO_PKG_VERSION").unwrap();
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    let local_hash = std::process::Command::new("git")
        .args(&["rev-parse", "HEAD"])
        .output()
        .map(|output| {
            let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if hash.len() >= 8 {
                hash[..8].to_string()
            } else {
                hash
            }
        })
        .unwrap_or_else(|_| "unknown".to_string());

    let local_dirty = std::process::Command::new("git")
        .args(&["diff", "--quiet"])
        .status()
        .map(|status| if status.success() { "" } else { "-dirty" })
        .unwrap_or("");

    let full_version = format!("{} {}{}-{}", version, local_hash, local_dirty, profile);
    println!("cargo:rustc-env=MCINV_PARAM_VERSION={}", full_version);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
