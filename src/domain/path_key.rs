//! Normalized path identity.
//!
//! Dedup in the queue and membership in the processed history both compare
//! paths. All normalization rules (separators, `.`/`..` resolution) live in
//! this one value type so they stay consistent and testable. Normalization
//! is purely lexical; symlinks are not resolved and case is preserved.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A lexically normalized path used as a job/history identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    /// Normalize a path into its canonical string form.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut absolute = false;
        let mut prefix = String::new();
        let mut parts: Vec<String> = Vec::new();

        for component in path.components() {
            match component {
                Component::Prefix(p) => {
                    prefix = p.as_os_str().to_string_lossy().replace('\\', "/");
                }
                Component::RootDir => absolute = true,
                Component::CurDir => {}
                Component::ParentDir => {
                    let last_is_parent = matches!(parts.last().map(String::as_str), Some(".."));
                    if !absolute && (parts.is_empty() || last_is_parent) {
                        parts.push("..".to_string());
                    } else {
                        // ".." at an absolute root stays at the root
                        parts.pop();
                    }
                }
                Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            }
        }

        let mut normalized = prefix;
        if absolute {
            normalized.push('/');
        }
        normalized.push_str(&parts.join("/"));

        if normalized.is_empty() {
            normalized.push('.');
        }

        Self(normalized)
    }

    /// The normalized form as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The normalized form as an owned path.
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// File name portion, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Path> for PathKey {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}
