//! Package archive assembly.
//!
//! Builds the tar stream sent to the image daemon as a build context: one
//! synthesized manifest at the archive root, followed by every regular file of
//! the package directory under a single top-level directory. Entries are
//! written in sorted pre-order so identical trees give identical archives.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use kpm_core::error::{KpmError, Result};

/// Read-only for everyone.
const MANIFEST_MODE: u32 = 0o444;

/// An archive entry that has no backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEntry {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mtime: u64,
}

impl VirtualEntry {
    /// Tar header describing this entry. The path and checksum are filled in
    /// when the entry is appended.
    fn header(&self) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(self.size);
        header.set_mode(self.mode);
        header.set_mtime(self.mtime);
        header.set_uid(0);
        header.set_gid(0);
        header
    }
}

/// Assembles package archives around a synthesized manifest.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    manifest: VirtualEntry,
    body: Vec<u8>,
}

impl ArchiveBuilder {
    /// Builder whose manifest is stamped with the current time.
    pub fn new(manifest_name: impl Into<String>, manifest_body: impl Into<Vec<u8>>) -> Self {
        let body = manifest_body.into();
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            manifest: VirtualEntry {
                name: manifest_name.into(),
                size: body.len() as u64,
                mode: MANIFEST_MODE,
                mtime,
            },
            body,
        }
    }

    /// Pin the manifest mtime for reproducible output.
    pub fn manifest_mtime(mut self, mtime: u64) -> Self {
        self.manifest.mtime = mtime;
        self
    }

    pub fn manifest(&self) -> &VirtualEntry {
        &self.manifest
    }

    /// Archive `source_dir` under its own base name.
    pub fn build(&self, source_dir: &Path) -> Result<Cursor<Vec<u8>>> {
        let prefix = source_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| KpmError::ArchiveReadError {
                path: source_dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "source directory has no base name",
                ),
            })?;
        self.build_as(source_dir, &prefix)
    }

    /// Archive `source_dir` with its files placed under `prefix/`.
    pub fn build_as(&self, source_dir: &Path, prefix: &str) -> Result<Cursor<Vec<u8>>> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = self.manifest.header();
        builder
            .append_data(&mut header, &self.manifest.name, self.body.as_slice())
            .map_err(|e| archive_error(Path::new(&self.manifest.name), e))?;

        let mut count = 0usize;
        append_tree(&mut builder, source_dir, source_dir, prefix, &mut count)?;

        let data = builder
            .into_inner()
            .map_err(|e| archive_error(source_dir, e))?;

        tracing::debug!(
            source = %source_dir.display(),
            prefix = %prefix,
            files = count,
            bytes = data.len(),
            "Built package archive"
        );

        Ok(Cursor::new(data))
    }
}

/// Archive `source_dir` under its base name with a manifest stamped now.
pub fn build_tar(
    manifest_name: &str,
    manifest_body: &[u8],
    source_dir: &Path,
) -> Result<Cursor<Vec<u8>>> {
    ArchiveBuilder::new(manifest_name, manifest_body).build(source_dir)
}

/// Recursively append regular files below `current`, sorted by name.
fn append_tree(
    builder: &mut tar::Builder<Vec<u8>>,
    root: &Path,
    current: &Path,
    prefix: &str,
    count: &mut usize,
) -> Result<()> {
    let read_dir = std::fs::read_dir(current).map_err(|e| archive_error(current, e))?;

    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| archive_error(current, e))?;
        entries.push(entry.path());
    }
    entries.sort();

    for path in entries {
        // Never follow links: a link to a directory must not pull in its target.
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| archive_error(&path, e))?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            append_tree(builder, root, &path, prefix, count)?;
        } else if file_type.is_file() {
            let name = archive_name(root, &path, prefix)?;
            let file = File::open(&path).map_err(|e| archive_error(&path, e))?;

            let mut header = tar::Header::new_gnu();
            header.set_metadata(&metadata);
            builder
                .append_data(&mut header, &name, file)
                .map_err(|e| archive_error(&path, e))?;
            *count += 1;
        } else {
            tracing::trace!(path = %path.display(), "Skipping non-regular file");
        }
    }

    Ok(())
}

/// `prefix/relative/path`, keeping the file name bytes as they are on disk.
///
/// `tar` writes `/` separators whatever the host separator is.
fn archive_name(root: &Path, path: &Path, prefix: &str) -> Result<PathBuf> {
    let relative = path.strip_prefix(root).map_err(|e| {
        archive_error(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        )
    })?;
    Ok(Path::new(prefix).join(relative))
}

fn archive_error(path: &Path, source: std::io::Error) -> KpmError {
    KpmError::ArchiveReadError {
        path: path.to_path_buf(),
        source,
    }
}
