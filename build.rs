use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output();

    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let version = match output {
        Ok(o) if o.status.success() => {
            let described = String::from_utf8(o.stdout).unwrap_or_default();
            let described = described.trim();
            // Tags are "v1.2.3"; untagged checkouts only yield a commit hash.
            match described.strip_prefix('v') {
                Some(tagged) => tagged.to_string(),
                None if described.is_empty() => pkg_version,
                None => format!("{}+{}", pkg_version, described),
            }
        }
        _ => pkg_version,
    };

    println!("cargo:rustc-env=WELLNESS_VERSION={}", version);
}
