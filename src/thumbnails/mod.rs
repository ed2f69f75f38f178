//! Thumbnail cache: downscaled JPEG derivatives stored flat in a cache directory.
//!
//! A derivative lives at `<cache_dir>/<source stem>.jpg` and is considered valid
//! as long as that file exists (optionally: as long as it is not older than its
//! source). Misses decode the source, shrink it by the configured divisor and
//! write the JPEG through a temp file so readers never observe a partial file.

pub mod service;

use image::codecs::jpeg::JpegEncoder;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::ThumbnailConfig;

pub use service::{ThumbnailService, ThumbnailTask};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThumbnailError {
    #[error("source image not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to decode {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },
    #[error("failed to write thumbnail for {}: {message}", .path.display())]
    Encode { path: PathBuf, message: String },
    #[error("thumbnail worker for {} stopped: {message}", .path.display())]
    Worker { path: PathBuf, message: String },
}

impl ThumbnailError {
    fn decode(path: &Path, err: impl std::fmt::Display) -> Self {
        ThumbnailError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn encode(path: &Path, err: impl std::fmt::Display) -> Self {
        ThumbnailError::Encode {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

pub type ThumbnailResult = Result<PathBuf, ThumbnailError>;

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub generated: u64,
}

pub struct ThumbnailCache {
    cache_dir: PathBuf,
    scale_divisor: u32,
    jpeg_quality: u8,
    invalidate_on_source_change: bool,
    loading_placeholder: PathBuf,
    failed_placeholder: PathBuf,
    /// One lock per destination file; the directory itself is read without locking.
    write_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    generated: AtomicU64,
}

impl ThumbnailCache {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
            scale_divisor: config.scale_divisor.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            invalidate_on_source_change: config.invalidate_on_source_change,
            loading_placeholder: config.loading_placeholder.clone(),
            failed_placeholder: config.failed_placeholder.clone(),
            write_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            generated: AtomicU64::new(0),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn loading_placeholder(&self) -> &Path {
        &self.loading_placeholder
    }

    pub fn failed_placeholder(&self) -> &Path {
        &self.failed_placeholder
    }

    /// Where the derivative of `source` lives, whether or not it exists yet.
    ///
    /// `None` for paths without a file stem (`/`, `foo/..`), which cannot name an image.
    pub fn thumbnail_path(&self, source: &Path) -> Option<PathBuf> {
        let mut name = source.file_stem()?.to_os_string();
        name.push(".jpg");
        Some(self.cache_dir.join(name))
    }

    /// Return the derivative if it is already valid. Counts as a hit.
    pub fn lookup(&self, source: &Path) -> Option<PathBuf> {
        let derivative = self.thumbnail_path(source)?;
        if self.is_fresh(source, &derivative) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path = ?source, "thumbnail cache hit");
            Some(derivative)
        } else {
            None
        }
    }

    /// Blocking variant: return the cached derivative or generate it now.
    pub fn get_or_create(&self, source: &Path) -> ThumbnailResult {
        if let Some(path) = self.lookup(source) {
            return Ok(path);
        }

        let derivative = self
            .thumbnail_path(source)
            .ok_or_else(|| ThumbnailError::NotFound(source.to_path_buf()))?;

        self.with_write_lock(&derivative, || {
            // Someone holding the lock before us may have produced it already
            if let Some(path) = self.lookup(source) {
                return Ok(path);
            }

            let bytes = self.generate_bytes(source)?;
            self.ensure_cache_dir()?;
            self.write_atomically(&derivative, &bytes)?;
            self.generated.fetch_add(1, Ordering::Relaxed);

            tracing::debug!(source = ?source, derivative = ?derivative, bytes = bytes.len(), "Generated thumbnail");
            Ok(derivative.clone())
        })
    }

    /// Like [`get_or_create`](Self::get_or_create), but falls back to the failed placeholder.
    pub fn resolve_or_placeholder(&self, source: &Path) -> PathBuf {
        match self.get_or_create(source) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, path = ?source, "Using placeholder thumbnail");
                self.failed_placeholder.clone()
            }
        }
    }

    /// Decode `source` and encode its thumbnail as JPEG bytes without touching the cache.
    pub fn generate_bytes(&self, source: &Path) -> Result<Vec<u8>, ThumbnailError> {
        let reader = image::ImageReader::open(source).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ThumbnailError::NotFound(source.to_path_buf())
            } else {
                ThumbnailError::decode(source, e)
            }
        })?;

        let original = reader
            .with_guessed_format()
            .map_err(|e| ThumbnailError::decode(source, e))?
            .decode()
            .map_err(|e| ThumbnailError::decode(source, e))?;

        let (width, height) =
            scaled_dimensions(original.width(), original.height(), self.scale_divisor);
        let thumbnail = original.thumbnail_exact(width, height).to_rgb8();
        drop(original);

        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.jpeg_quality);
        encoder
            .encode_image(&thumbnail)
            .map_err(|e| ThumbnailError::encode(source, e))?;

        Ok(bytes)
    }

    /// Remove the derivative of `source`. Returns whether a file was removed.
    pub fn invalidate(&self, source: &Path) -> std::io::Result<bool> {
        let Some(derivative) = self.thumbnail_path(source) else {
            return Ok(false);
        };

        self.with_write_lock(&derivative, || match fs::remove_file(&derivative) {
            Ok(()) => {
                tracing::debug!(derivative = ?derivative, "Invalidated thumbnail");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
        }
    }

    fn is_fresh(&self, source: &Path, derivative: &Path) -> bool {
        if !derivative.exists() {
            return false;
        }
        if !self.invalidate_on_source_change {
            return true;
        }

        let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified());
        match (modified(source), modified(derivative)) {
            (Ok(source_time), Ok(derivative_time)) => source_time <= derivative_time,
            // Source gone: the derivative is all we have
            (Err(_), _) => true,
            (Ok(_), Err(_)) => false,
        }
    }

    fn ensure_cache_dir(&self) -> Result<(), ThumbnailError> {
        if !self.cache_dir.is_dir() {
            fs::create_dir_all(&self.cache_dir)
                .map_err(|e| ThumbnailError::encode(&self.cache_dir, e))?;
        }
        Ok(())
    }

    fn write_atomically(&self, derivative: &Path, bytes: &[u8]) -> Result<(), ThumbnailError> {
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| ThumbnailError::encode(derivative, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| ThumbnailError::encode(derivative, e))?;
        tmp.persist(derivative)
            .map_err(|e| ThumbnailError::encode(derivative, e.error))?;
        Ok(())
    }

    /// Run `f` holding the lock for `derivative`, then drop the lock entry if nobody else wants it.
    fn with_write_lock<T>(&self, derivative: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(derivative.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);

        // Clones are only handed out under the map lock, so a count of one means no waiters
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(derivative)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(derivative);
        }
        result
    }

    #[cfg(test)]
    fn write_lock_count(&self) -> usize {
        self.write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Divide each side by `divisor`, never going below one pixel.
pub fn scaled_dimensions(width: u32, height: u32, divisor: u32) -> (u32, u32) {
    let divisor = divisor.max(1);
    ((width / divisor).max(1), (height / divisor).max(1))
}
