//! Build-time version information.

/// The library version, in "major.minor.patch" form.
pub const LOADSTONE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The ID of the source control revision that the library was built from, or
/// "unknown" when it was built outside version control.
pub const LOADSTONE_REVISION: &str = match option_env!("LOADSTONE_REVISION") {
    Some(revision) => revision,
    None => "unknown",
};

/// Split [LOADSTONE_VERSION] into its numeric components.
pub fn version_components() -> (u32, u32, u32) {
    // Cargo guarantees that the version components are valid integers, so
    // the fallbacks are unreachable.
    let component = |value: &str| value.parse::<u32>().unwrap_or(0);

    (
        component(env!("CARGO_PKG_VERSION_MAJOR")),
        component(env!("CARGO_PKG_VERSION_MINOR")),
        component(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    mod version_components {
        use super::*;

        #[test]
        fn should_match_the_version_string() {
            let (major, minor, patch) = version_components();

            assert_eq!(LOADSTONE_VERSION, format!("{major}.{minor}.{patch}"));
        }
    }

    mod loadstone_revision {
        use super::*;

        #[test]
        fn should_not_be_empty() {
            assert!(!LOADSTONE_REVISION.is_empty());
        }
    }
}
