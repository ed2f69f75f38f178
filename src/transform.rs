//! In-place rotate/flip of a screenshot, keeping its embedded metadata.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::metadata::{MetadataWriter, VrcMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    RotateLeft,
    RotateRight,
    FlipHorizontal,
}

impl Transform {
    pub fn apply(self, image: &DynamicImage) -> DynamicImage {
        match self {
            Transform::RotateLeft => image.rotate270(),
            Transform::RotateRight => image.rotate90(),
            Transform::FlipHorizontal => image.fliph(),
        }
    }
}

/// Rewrite `path` as a transformed PNG. When `metadata` is given it is embedded again.
pub fn apply_in_place(
    path: &Path,
    transform: Transform,
    metadata: Option<&VrcMetadata>,
    writer: &dyn MetadataWriter,
) -> Result<()> {
    let original = image::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let transformed = transform.apply(&original);
    drop(original);

    let mut buffer = Vec::new();
    transformed
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .with_context(|| format!("Failed to encode {}", path.display()))?;

    if let Some(metadata) = metadata {
        buffer = writer
            .write(&buffer, metadata)
            .with_context(|| format!("Failed to embed metadata into {}", path.display()))?;
    }

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(&buffer)?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    tracing::info!(path = ?path, ?transform, "Transformed photo");
    Ok(())
}
