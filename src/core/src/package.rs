//! Validated package identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validate::{full_name, validate_name, validate_version};

/// A package `(name, version)` pair that has passed validation.
///
/// The only way to obtain one is [`PackageId::new`], so every identity used
/// to build a tag has already been checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPackageId", into = "RawPackageId")]
pub struct PackageId {
    name: String,
    version: String,
}

impl PackageId {
    /// Validate and build a package identity. Wildcard versions are rejected.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        validate_name(&name)?;
        validate_version(&version, false)?;
        Ok(Self { name, version })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `name-version`
    pub fn full_name(&self) -> String {
        full_name(&self.name, &self.version)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[derive(Serialize, Deserialize)]
struct RawPackageId {
    name: String,
    version: String,
}

impl TryFrom<RawPackageId> for PackageId {
    type Error = crate::error::KpmError;

    fn try_from(raw: RawPackageId) -> Result<Self> {
        PackageId::new(raw.name, raw.version)
    }
}

impl From<PackageId> for RawPackageId {
    fn from(id: PackageId) -> Self {
        RawPackageId {
            name: id.name,
            version: id.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KpmError;

    #[test]
    fn test_new_valid() {
        let id = PackageId::new("foo.bar2", "1.2.3").unwrap();
        assert_eq!(id.name(), "foo.bar2");
        assert_eq!(id.version(), "1.2.3");
        assert_eq!(id.full_name(), "foo.bar2-1.2.3");
        assert_eq!(id.to_string(), "foo.bar2-1.2.3");
    }

    #[test]
    fn test_new_rejects_invalid() {
        assert!(matches!(
            PackageId::new("Foo", "1.2.3"),
            Err(KpmError::ValidationError(_))
        ));
        assert!(matches!(
            PackageId::new("foo", "1.*"),
            Err(KpmError::ValidationError(_))
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PackageId = serde_yaml::from_str("name: nginx\nversion: 1.0.0\n").unwrap();
        assert_eq!(ok.full_name(), "nginx-1.0.0");

        let bad: std::result::Result<PackageId, _> =
            serde_yaml::from_str("name: nginx\nversion: 0.0.0\n");
        assert!(bad.is_err());
    }
}
