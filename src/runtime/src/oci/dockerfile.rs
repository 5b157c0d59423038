//! Synthesized build manifest for package images.

use kpm_core::PackageId;

/// Archive path of the synthesized manifest.
pub const MANIFEST_NAME: &str = "Dockerfile";

/// Base image for package images. Packages carry files only.
pub const BASE_IMAGE: &str = "scratch";

/// Label keys stamped on every package image.
pub const LABEL_NAME: &str = "io.kpm.package.name";
pub const LABEL_VERSION: &str = "io.kpm.package.version";

/// Manifest that copies `<full>/` into `/<full>` of an empty image.
pub fn package_dockerfile(id: &PackageId) -> String {
    let full = id.full_name();
    format!(
        "FROM {base}\n\
         LABEL {ln}=\"{name}\" {lv}=\"{version}\"\n\
         COPY {full}/ /{full}\n",
        base = BASE_IMAGE,
        ln = LABEL_NAME,
        name = id.name(),
        lv = LABEL_VERSION,
        version = id.version(),
        full = full,
    )
}
