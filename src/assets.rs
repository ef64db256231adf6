//! Asset sources for descriptors, shaders and material files.
//!
//! All file reads of the rendering core go through an injected
//! [`AssetSource`], so the same catalog works against the native filesystem,
//! an in-memory map in tests, or a packed archive.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::error::{RenderError, RenderResult};

/// Read access to engine assets by slash-separated path.
pub trait AssetSource: Send + Sync {
    /// Read the whole file.
    fn read(&self, path: &str) -> RenderResult<Vec<u8>>;

    /// Check whether a file exists.
    fn exists(&self, path: &str) -> bool;

    /// Read the whole file as UTF-8 text.
    fn read_to_string(&self, path: &str) -> RenderResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| RenderError::InvalidText {
            path: path.to_string(),
        })
    }
}

/// Normalize an asset path.
///
/// - Replaces backslashes with forward slashes
/// - Collapses redundant separators and `.` segments
/// - Resolves `..` against the preceding segment; leading `..` segments are kept
pub fn normalize(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in replaced.split('/') {
        match segment {
            "" | "." => continue,
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    segments.join("/")
}

/// Directory part of a path including the trailing slash, or an empty string.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(pos) => &path[..=pos],
        None => "",
    }
}

/// Native filesystem source rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    root: PathBuf,
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(normalize(path))
    }
}

impl AssetSource for FileSystemSource {
    fn read(&self, path: &str) -> RenderResult<Vec<u8>> {
        let full = self.resolve(path);
        std::fs::read(&full).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RenderError::AssetNotFound {
                    path: path.to_string(),
                }
            } else {
                RenderError::Io {
                    path: path.to_string(),
                    source,
                }
            }
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }
}

/// In-memory source for tests and embedded assets.
#[derive(Default)]
pub struct MemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, overwriting any existing file at the same path.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.files.write().insert(normalize(path), data.into());
    }

    /// Remove a file, returning its data if it existed.
    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.files.write().remove(&normalize(path))
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> RenderResult<Vec<u8>> {
        self.files
            .read()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| RenderError::AssetNotFound {
                path: path.to_string(),
            })
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(&normalize(path))
    }
}
