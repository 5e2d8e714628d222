//! Resource resolution
//!
//! Opens the target of a normalized request path below the served root and
//! turns it into a cache-ready descriptor: the file itself, a directory's
//! `index.html`, or a generated listing of the directory.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::errors::FsError;
use super::listing::{self, LISTING_CONTENT_TYPE};
use crate::cache::ResourceDescriptor;

/// File served in place of a directory when present
pub const INDEX_FILE: &str = "index.html";

/// Outcome of opening a path
enum Opened {
    File(ResourceDescriptor),
    Directory,
}

/// Content type for `path` derived from its extension, empty when unknown
pub fn content_type_for(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| mime_guess::from_ext(ext).first())
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_default()
}

/// Resolves normalized request paths below a root directory
#[derive(Clone, Debug)]
pub struct ResourceResolver {
    root: PathBuf,
}

impl ResourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of a normalized path
    pub fn target_path(&self, normalized: &str) -> PathBuf {
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }

    /// Resolve `normalized` into a descriptor
    ///
    /// `request_uri` is only used to title a generated listing and to build
    /// its links.
    pub fn resolve(
        &self,
        normalized: &str,
        request_uri: &str,
    ) -> Result<ResourceDescriptor, FsError> {
        if let Some(n) = normalized.find('\0') {
            return Err(FsError::invalid_path(
                normalized.as_bytes(),
                format!("nil byte at position {}", n),
            ));
        }

        let path = self.target_path(normalized);
        match open_entry(&path)? {
            Opened::File(desc) => Ok(desc),
            Opened::Directory => match open_index(&path) {
                Ok(desc) => Ok(desc),
                Err(e) if e.is_not_found() => {
                    debug!(path = %path.display(), "No index file, generating listing");
                    let content = listing::render(&path, request_uri)?;
                    Ok(ResourceDescriptor::generated(content, LISTING_CONTENT_TYPE))
                }
                Err(e) => Err(e),
            },
        }
    }
}

/// Open `dir/index.html`; a directory named `index.html` counts as absent
fn open_index(dir: &Path) -> Result<ResourceDescriptor, FsError> {
    let index = dir.join(INDEX_FILE);
    match open_entry(&index)? {
        Opened::File(desc) => Ok(desc),
        Opened::Directory => Err(FsError::NotFound(index)),
    }
}

fn open_entry(path: &Path) -> Result<Opened, FsError> {
    let file = File::open(path).map_err(|e| FsError::from_io(path.to_path_buf(), e))?;
    let metadata = file
        .metadata()
        .map_err(|e| FsError::from_io(path.to_path_buf(), e))?;

    if metadata.is_dir() {
        return Ok(Opened::Directory);
    }

    let size = metadata.len();
    let content_length = usize::try_from(size).map_err(|_| FsError::TooLarge {
        path: path.to_path_buf(),
        size,
    })?;

    let content_type = content_type_for(path);
    debug!(
        path = %path.display(),
        size = size,
        content_type = %content_type,
        "Opened file"
    );
    Ok(Opened::File(ResourceDescriptor::file(
        file,
        content_type,
        content_length,
    )))
}
