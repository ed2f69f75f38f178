//! Embedded VRChat screenshot metadata.
//!
//! The codec is kept behind [`MetadataReader`] / [`MetadataWriter`] so the rest
//! of the crate only sees [`VrcMetadata`].

pub mod png_chunks;

use chrono::NaiveDateTime;
use std::path::Path;
use thiserror::Error;

pub use png_chunks::PngChunkCodec;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub twitter: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            twitter: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VrcMetadata {
    pub world: Option<String>,
    pub photographer: Option<String>,
    pub taken_at: Option<NaiveDateTime>,
    /// Users in the order they were recorded.
    pub users: Vec<User>,
}

impl VrcMetadata {
    pub fn with_users<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: names.into_iter().map(User::new).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.world.is_none()
            && self.photographer.is_none()
            && self.taken_at.is_none()
            && self.users.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a PNG file")]
    NotPng,
    #[error("truncated PNG chunk at offset {0}")]
    Truncated(usize),
    #[error("PNG decode error: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("PNG encode error: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("invalid metadata text: {0}")]
    Text(String),
}

/// Reads metadata embedded in an image file.
pub trait MetadataReader: Send + Sync {
    /// `Ok(None)` when the file carries no metadata.
    fn read(&self, path: &Path) -> Result<Option<VrcMetadata>, MetadataError>;
}

/// Embeds metadata into an encoded image buffer.
pub trait MetadataWriter: Send + Sync {
    fn write(&self, image: &[u8], metadata: &VrcMetadata) -> Result<Vec<u8>, MetadataError>;
}
