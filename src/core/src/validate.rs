//! Package name and version validation.
//!
//! Names are lowercase alphanumeric runs joined by single dots, starting with a letter.
//! Versions are `MAJOR.MINOR.REVISION` without leading zeros and strictly
//! greater than `0.0.0`. Wildcard-qualified versions (`*`, `1.*`, `1.2.*`)
//! are accepted only when the caller asks for them.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{KpmError, Result};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z](\.?[a-z0-9])*$").expect("name pattern compiles"));

const SEGMENT: &str = r"(0|[1-9][0-9]*)";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{SEGMENT}\.{SEGMENT}\.{SEGMENT}$")).expect("version pattern compiles")
});

static WILDCARD_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(\*(\.\*){{0,2}}|{SEGMENT}(\.\*){{1,2}}|{SEGMENT}\.{SEGMENT}\.\*)$"
    ))
    .expect("wildcard version pattern compiles")
});

/// Check that `name` is a valid package name.
pub fn validate_name(name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(KpmError::ValidationError(format!(
            "invalid package name '{}': expected lowercase alphanumerics joined by single dots, starting with a letter",
            name
        )))
    }
}

/// Check that `version` is a valid package version.
///
/// With `allow_wildcards`, trailing segments may be replaced by `*`.
pub fn validate_version(version: &str, allow_wildcards: bool) -> Result<()> {
    if VERSION_RE.is_match(version) {
        if version == "0.0.0" {
            return Err(KpmError::ValidationError(
                "invalid version '0.0.0': must be greater than 0.0.0".to_string(),
            ));
        }
        return Ok(());
    }

    if allow_wildcards && WILDCARD_VERSION_RE.is_match(version) {
        return Ok(());
    }

    let expected = if allow_wildcards {
        "MAJOR.MINOR.REVISION (optionally ending in '*') without leading zeros"
    } else {
        "MAJOR.MINOR.REVISION without leading zeros"
    };
    Err(KpmError::ValidationError(format!(
        "invalid version '{}': expected {}",
        version, expected
    )))
}

/// Canonical `name-version` string used as the archive's top-level directory.
pub fn full_name(name: &str, version: &str) -> String {
    format!("{}-{}", name, version)
}
