pub mod discovery;

use anyhow::{bail, Result};
use rayon::prelude::*;
use std::path::Path;

use crate::metadata::MetadataReader;
use crate::photo::Photo;

pub use discovery::discover_images;

/// Load every screenshot under `directory` with its embedded metadata.
///
/// Metadata is read in parallel; the result keeps path order. Files whose
/// metadata cannot be read are kept without metadata.
pub fn load_photos(
    directory: &Path,
    extensions: &[String],
    reader: &dyn MetadataReader,
) -> Result<Vec<Photo>> {
    if !directory.is_dir() {
        bail!("Photo folder {} does not exist", directory.display());
    }

    let paths = discover_images(directory, extensions)?;
    tracing::info!(folder = ?directory, files = paths.len(), "Loading photos");

    let photos: Vec<Photo> = paths
        .into_par_iter()
        .map(|path| {
            let metadata = match reader.read(&path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(error = %e, path = ?path, "Failed to read photo metadata");
                    None
                }
            };
            Photo::new(path, metadata)
        })
        .collect();

    let tagged = photos.iter().filter(|p| p.metadata.is_some()).count();
    tracing::info!(photos = photos.len(), tagged, "Photos loaded");

    Ok(photos)
}
