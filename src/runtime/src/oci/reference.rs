//! Image tag construction for packages.
//!
//! A package `(name, version)` published under an optional repository is
//! addressed as `[repository/]name:version`. Inputs come from a validated
//! [`PackageId`]; no further normalization happens here.

use std::fmt;

use kpm_core::PackageId;

/// Build the tag `[repo/]name:version`.
pub fn tag_of(repo: Option<&str>, name: &str, version: &str) -> String {
    match repo {
        Some(repo) => format!("{}/{}:{}", repo, name, version),
        None => format!("{}:{}", name, version),
    }
}

/// Image address of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag {
    repository: Option<String>,
    package: PackageId,
}

impl ImageTag {
    pub fn new(repository: Option<String>, package: PackageId) -> Self {
        // An empty repository would produce a leading slash.
        let repository = repository.filter(|r| !r.is_empty());
        Self {
            repository,
            package,
        }
    }

    pub fn package(&self) -> &PackageId {
        &self.package
    }

    /// `[repo/]name` without the version.
    pub fn image_name(&self) -> String {
        match &self.repository {
            Some(repo) => format!("{}/{}", repo, self.package.name()),
            None => self.package.name().to_string(),
        }
    }

    /// The version part of the tag.
    pub fn version(&self) -> &str {
        self.package.version()
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&tag_of(
            self.repository.as_deref(),
            self.package.name(),
            self.package.version(),
        ))
    }
}
