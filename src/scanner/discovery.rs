use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively collect files under `directory` whose extension is in `extensions`.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if entry.file_type().is_file() && has_extension(path, extensions) {
            images.push(path.to_path_buf());
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    Ok(images)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy();
            extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_discover_screenshots() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("VRChat_1.png")).unwrap();
        File::create(dir.path().join("VRChat_2.PNG")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join("photo.jpg")).unwrap();

        fs::create_dir(dir.path().join("2021-05")).unwrap();
        File::create(dir.path().join("2021-05/VRChat_3.png")).unwrap();

        let images = discover_images(dir.path(), &["png".to_string()]).unwrap();

        assert_eq!(images.len(), 3);
        assert!(images.windows(2).all(|w| w[0] <= w[1]));
    }
}
