use std::{
    process::Command,
    time::{SystemTime, UNIX_EPOCH},
};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    println!("cargo:rerun-if-env-changed=MESA_LOADER_BUILD_VERSION");

    let package_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();

    // An explicit override wins (used by release pipelines)
    if let Ok(version) = std::env::var("MESA_LOADER_BUILD_VERSION")
        && !version.trim().is_empty()
    {
        println!("cargo:rustc-env=MESA_LOADER_VERSION={}", version.trim());
        return;
    }

    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match", "--dirty"])
        .output();

    let version = match output {
        Ok(o) if o.status.success() => {
            let git_output = String::from_utf8(o.stdout)
                .unwrap_or_default()
                .trim()
                .to_string();

            // Strip 'v' prefix if present (e.g., "v25.2.1" -> "25.2.1")
            let tag = git_output.strip_prefix('v').unwrap_or(&git_output);

            if tag.ends_with("-dirty") || tag.is_empty() {
                format!("{}-SNAPSHOT-{}", package_version, timestamp())
            } else {
                tag.to_string()
            }
        }
        // Not on a release tag: mark the build as a snapshot of the package version
        _ => format!("{}-SNAPSHOT", package_version),
    };

    println!("cargo:rustc-env=MESA_LOADER_VERSION={}", version);
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}
