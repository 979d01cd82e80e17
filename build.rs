use std::process::Command;

// Bakes the current git revision into the build as LOADSTONE_REVISION, unless
// the environment already provides one (e.g. when building from a source
// archive that has no git history).
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");

    if std::env::var_os("LOADSTONE_REVISION").is_some() {
        return;
    }

    let revision = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|stdout| stdout.trim().to_owned())
        .filter(|revision| !revision.is_empty());

    match revision {
        Some(revision) => println!("cargo:rustc-env=LOADSTONE_REVISION={revision}"),
        None => println!(
            "cargo:warning=Could not read the git revision, LOADSTONE_REVISION will be unset"
        ),
    }
}
