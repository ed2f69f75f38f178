//! One browsing session over a photo folder.
//!
//! Owns the full photo list (loaded once), the currently displayed subset, the
//! user index built from the full list, and the thumbnail requests that the
//! display has issued but not yet applied.

use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::metadata::{MetadataReader, MetadataWriter};
use crate::photo::Photo;
use crate::scanner;
use crate::search;
use crate::thumbnails::{ThumbnailResult, ThumbnailService, ThumbnailTask};
use crate::transform::{self, Transform};
use crate::users::UserIndex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailSummary {
    pub resolved: usize,
    pub failed: usize,
}

pub struct Gallery {
    photos: Vec<Photo>,
    by_path: HashMap<PathBuf, usize>,
    displayed: Vec<usize>,
    search_text: String,
    users: UserIndex,
    thumbnails: ThumbnailService,
    pending: HashMap<PathBuf, ThumbnailTask>,
}

impl Gallery {
    /// Load the configured folder and index its users.
    pub fn open(
        config: &Config,
        reader: &dyn MetadataReader,
        thumbnails: ThumbnailService,
    ) -> Result<Self> {
        let photos = scanner::load_photos(
            &config.folder_path,
            &config.scanner.image_extensions,
            reader,
        )?;
        Ok(Self::from_photos(photos, thumbnails))
    }

    pub fn from_photos(mut photos: Vec<Photo>, thumbnails: ThumbnailService) -> Self {
        let loading = thumbnails.cache().loading_placeholder().to_path_buf();
        for photo in &mut photos {
            photo.thumbnail = loading.clone();
        }

        let mut users = UserIndex::new();
        users.add_batch(&photos);

        let by_path = photos
            .iter()
            .enumerate()
            .map(|(i, p)| (p.path.clone(), i))
            .collect();
        let displayed = (0..photos.len()).collect();

        Self {
            photos,
            by_path,
            displayed,
            search_text: String::new(),
            users,
            thumbnails,
            pending: HashMap::new(),
        }
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn photo(&self, path: &Path) -> Option<&Photo> {
        self.by_path.get(path).map(|&i| &self.photos[i])
    }

    pub fn displayed(&self) -> impl Iterator<Item = &Photo> {
        self.displayed.iter().map(|&i| &self.photos[i])
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed.len()
    }

    pub fn users(&self) -> &UserIndex {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut UserIndex {
        &mut self.users
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    /// Show only photos with a user starting with `prefix`. Returns the number shown.
    pub fn search(&mut self, prefix: &str) -> usize {
        let matched: HashSet<&Path> = search::filter_by_user_prefix(&self.photos, prefix)
            .into_iter()
            .map(Photo::path)
            .collect();

        self.displayed = self
            .photos
            .iter()
            .enumerate()
            .filter(|(_, p)| matched.contains(p.path()))
            .map(|(i, _)| i)
            .collect();
        self.search_text = prefix.to_string();

        tracing::debug!(prefix, shown = self.displayed.len(), "Search applied");
        self.displayed.len()
    }

    /// Start (or join) thumbnail generation for a photo entering the view.
    pub fn request_thumbnail(&mut self, path: &Path) -> bool {
        if !self.by_path.contains_key(path) {
            return false;
        }
        if !self.pending.contains_key(path) {
            let task = self.thumbnails.request(path);
            self.pending.insert(path.to_path_buf(), task);
        }
        true
    }

    /// The photo left the view: a result arriving later is not applied.
    pub fn forget_thumbnail(&mut self, path: &Path) -> bool {
        self.pending.remove(path).is_some()
    }

    pub fn pending_thumbnails(&self) -> usize {
        self.pending.len()
    }

    /// Apply every finished request to its photo. Returns how many were applied.
    pub fn apply_finished_thumbnails(&mut self) -> usize {
        let finished: Vec<(PathBuf, ThumbnailResult)> = self
            .pending
            .iter()
            .filter_map(|(path, task)| task.try_result().map(|r| (path.clone(), r)))
            .collect();

        let applied = finished.len();
        for (path, result) in finished {
            self.pending.remove(&path);
            self.apply_thumbnail(&path, result);
        }
        applied
    }

    /// Request thumbnails for every displayed photo and wait for all of them.
    pub async fn load_displayed_thumbnails(&mut self) -> ThumbnailSummary {
        let tasks: Vec<ThumbnailTask> = self
            .displayed
            .iter()
            .map(|&i| self.thumbnails.request(&self.photos[i].path))
            .collect();

        let mut summary = ThumbnailSummary::default();
        for task in tasks {
            let path = task.source().to_path_buf();
            let result = task.join().await;
            match result {
                Ok(_) => summary.resolved += 1,
                Err(_) => summary.failed += 1,
            }
            self.pending.remove(&path);
            self.apply_thumbnail(&path, result);
        }
        summary
    }

    /// Rotate or flip a photo on disk, keeping its metadata, and drop its stale thumbnail.
    pub fn transform(
        &mut self,
        path: &Path,
        transform: Transform,
        writer: &dyn MetadataWriter,
    ) -> Result<()> {
        let Some(&index) = self.by_path.get(path) else {
            bail!("{} is not part of this gallery", path.display());
        };

        let photo = &self.photos[index];
        transform::apply_in_place(&photo.path, transform, photo.metadata.as_ref(), writer)?;

        let cache = self.thumbnails.cache();
        cache
            .invalidate(path)
            .with_context(|| format!("Failed to invalidate thumbnail of {}", path.display()))?;

        self.pending.remove(path);
        self.photos[index].thumbnail = cache.loading_placeholder().to_path_buf();
        Ok(())
    }

    fn apply_thumbnail(&mut self, path: &Path, result: ThumbnailResult) {
        let Some(&index) = self.by_path.get(path) else {
            return;
        };

        self.photos[index].thumbnail = match result {
            Ok(derivative) => derivative,
            Err(e) => {
                tracing::warn!(error = %e, path = ?path, "Showing failed thumbnail placeholder");
                self.thumbnails.cache().failed_placeholder().to_path_buf()
            }
        };
    }
}
