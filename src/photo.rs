use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::LOADING_PLACEHOLDER;
use crate::metadata::VrcMetadata;

/// A screenshot on disk together with what was read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub path: PathBuf,
    pub metadata: Option<VrcMetadata>,
    /// Path currently shown for this photo: a placeholder until the derivative is ready.
    pub thumbnail: PathBuf,
}

impl Photo {
    pub fn new(path: impl Into<PathBuf>, metadata: Option<VrcMetadata>) -> Self {
        Self {
            path: path.into(),
            metadata,
            thumbnail: PathBuf::from(LOADING_PLACEHOLDER),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn world(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.world.as_deref())
    }

    /// User names in recorded order. Photos without metadata yield nothing.
    pub fn user_names(&self) -> impl Iterator<Item = &str> {
        self.metadata
            .iter()
            .flat_map(|m| m.users.iter())
            .map(|u| u.name.as_str())
    }

    pub fn has_user_with_prefix(&self, prefix: &str) -> bool {
        self.user_names().any(|name| name.starts_with(prefix))
    }
}

impl fmt::Display for Photo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
