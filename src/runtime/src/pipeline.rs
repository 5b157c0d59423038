//! Package publish and fetch.
//!
//! Glues the pieces together: a source directory becomes a build context with
//! a synthesized manifest, the daemon builds and tags it, and the image is
//! pushed with credentials resolved for the configured registry. Fetching
//! runs the other way round.

use std::path::{Path, PathBuf};

use kpm_core::error::{KpmError, Result};
use kpm_core::{path, KpmConfig, PackageId};

use crate::daemon::{DaemonClient, DeleteOutcome, ProgressSink};
use crate::oci::archive::ArchiveBuilder;
use crate::oci::config::ConfigStore;
use crate::oci::credentials::{CredentialResolver, EncodedAuth};
use crate::oci::dockerfile::{package_dockerfile, MANIFEST_NAME};
use crate::oci::helpers::HelperRegistry;
use crate::oci::reference::ImageTag;

/// Publishes and fetches packages through one daemon client.
#[derive(Debug)]
pub struct Publisher {
    client: DaemonClient,
    resolver: CredentialResolver,
    repository: Option<String>,
}

impl Publisher {
    pub fn new(
        client: DaemonClient,
        resolver: CredentialResolver,
        repository: Option<String>,
    ) -> Self {
        Self {
            client,
            resolver,
            repository,
        }
    }

    /// Publisher using the credential location and repository from `config`.
    pub fn from_config(client: DaemonClient, config: &KpmConfig) -> Result<Self> {
        let dir = config
            .docker_config
            .as_deref()
            .map(path::resolve)
            .transpose()?;
        let resolver = CredentialResolver::new(ConfigStore::from_dir(dir)?, HelperRegistry::platform());
        Ok(Self::new(client, resolver, config.repository.clone()))
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    /// Image tag a package is published under.
    pub fn tag(&self, id: &PackageId) -> ImageTag {
        ImageTag::new(self.repository.clone(), id.clone())
    }

    /// Build and tag the package image from `source_dir`.
    ///
    /// The directory is packed under `<name>-<version>/` whatever its own
    /// base name is.
    pub async fn build(
        &self,
        source_dir: &Path,
        id: &PackageId,
        sink: &mut ProgressSink,
    ) -> Result<ImageTag> {
        let source = path::resolve(source_dir)?;
        if !source.is_dir() {
            return Err(KpmError::PathError(format!(
                "Package source is not a directory: {}",
                source.display()
            )));
        }

        let tag = self.tag(id);
        let manifest = package_dockerfile(id);
        let prefix = id.full_name();
        tracing::debug!(source = %source.display(), prefix = %prefix, "Assembling build context");

        let context = tokio::task::spawn_blocking(move || {
            ArchiveBuilder::new(MANIFEST_NAME, manifest).build_as(&source, &prefix)
        })
        .await
        .map_err(|e| KpmError::IoError(std::io::Error::other(e)))??;

        self.client.build(&tag, context, sink).await?;
        Ok(tag)
    }

    /// Build the package image and push it to the registry.
    pub async fn publish(
        &self,
        source_dir: &Path,
        id: &PackageId,
        sink: &mut ProgressSink,
    ) -> Result<ImageTag> {
        let tag = self.build(source_dir, id, sink).await?;
        let auth = self.credentials().await?;
        self.client.push(&tag, &auth, sink).await?;
        tracing::info!(tag = %tag, "Published package");
        Ok(tag)
    }

    /// Pull the package image and unpack its files under `dest`.
    ///
    /// `dest` defaults to the working directory. Returns the directory the
    /// package landed in, `<dest>/<name>-<version>`.
    pub async fn fetch(
        &self,
        id: &PackageId,
        dest: Option<&Path>,
        sink: &mut ProgressSink,
    ) -> Result<PathBuf> {
        let dest = path::resolve_or_default(dest, ".")?;
        let tag = self.tag(id);

        // Public packages pull fine without any credentials on file.
        let auth = match self.credentials().await {
            Ok(auth) => Some(auth),
            Err(
                e @ (KpmError::NoCredentials
                | KpmError::NoCredentialsForRegistry(_)
                | KpmError::ConfigMissing { .. }),
            ) => {
                tracing::debug!(registry = %self.client.registry(), reason = %e, "Pulling anonymously");
                None
            }
            Err(e) => return Err(e),
        };

        self.client.pull(&tag, auth.as_ref(), sink).await?;
        let path_in_image = format!("/{}", id.full_name());
        let fetched = self.client.extract(&tag, &path_in_image, &dest, sink).await?;
        tracing::info!(tag = %tag, path = %fetched.display(), "Fetched package");
        Ok(fetched)
    }

    /// Remove the local package image.
    pub async fn remove(
        &self,
        id: &PackageId,
        sink: &mut ProgressSink,
    ) -> Result<Vec<DeleteOutcome>> {
        self.client.delete(&self.tag(id), sink).await
    }

    /// Credentials for the client's registry. Helpers may block, so this runs
    /// off the async workers.
    async fn credentials(&self) -> Result<EncodedAuth> {
        let resolver = self.resolver.clone();
        let registry = self.client.registry().to_string();
        tokio::task::spawn_blocking(move || resolver.credentials_for(&registry))
            .await
            .map_err(|e| KpmError::IoError(std::io::Error::other(e)))?
    }
}
