//! Media origin collaborator
//!
//! The origin owns the bytes: it copies upstream files into the cache
//! directory, deletes them on eviction and knows how to stream a track
//! that is not cached. [`FolderOrigin`] serves a mounted library folder.

use crate::error::{Error, Result};
use ambi_common::{Track, TrackId};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of asking the origin to cache a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File copied, `size` bytes on disk
    Stored { size: u64 },
    /// File was already present
    AlreadyCached { size: u64 },
    /// The origin refuses to grow the cache any further
    LimitReached,
}

impl DownloadOutcome {
    pub fn size(&self) -> Option<u64> {
        match self {
            DownloadOutcome::Stored { size } | DownloadOutcome::AlreadyCached { size } => {
                Some(*size)
            }
            DownloadOutcome::LimitReached => None,
        }
    }
}

#[async_trait]
pub trait MediaOrigin: Send + Sync {
    async fn download_to_cache(&self, track: &Track) -> Result<DownloadOutcome>;

    /// Delete the cached file; an already missing file counts as success
    async fn evict_from_cache(&self, track_id: &TrackId) -> Result<()>;

    /// Local path a cached copy of `track_id` lives at
    fn cached_path(&self, track_id: &TrackId) -> PathBuf;

    /// Remote locator for streaming `track` without the cache
    fn stream_locator(&self, track: &Track) -> String;
}

/// Origin backed by a library folder on a (possibly network) mount
pub struct FolderOrigin {
    library_root: PathBuf,
    cache_dir: PathBuf,
    stream_base_url: String,
    budget_bytes: u64,
}

impl FolderOrigin {
    pub fn new(
        library_root: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        stream_base_url: impl Into<String>,
        budget_bytes: u64,
    ) -> Self {
        Self {
            library_root: library_root.into(),
            cache_dir: cache_dir.into(),
            stream_base_url: stream_base_url.into(),
            budget_bytes,
        }
    }

    /// Create the cache directory if missing
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        info!("🎵 Cache directory ready: {}", self.cache_dir.display());
        Ok(())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Bytes currently held by `*.cache` files
    pub async fn usage(&self) -> Result<u64> {
        let mut total = 0;
        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "cache") {
                total += entry.metadata().await?.len();
            }
        }
        Ok(total)
    }

    fn source_path(&self, track: &Track) -> Result<PathBuf> {
        let locator = Path::new(&track.locator);
        let escapes = locator
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || track.locator.is_empty() {
            return Err(Error::InvalidInput(format!(
                "locator '{}' is not inside the library",
                track.locator
            )));
        }
        Ok(self.library_root.join(locator))
    }
}

/// File-system safe form of a track id, distinct for distinct ids
fn file_stem(track_id: &TrackId) -> String {
    urlencoding::encode(track_id.as_str()).into_owned()
}

#[async_trait]
impl MediaOrigin for FolderOrigin {
    async fn download_to_cache(&self, track: &Track) -> Result<DownloadOutcome> {
        let dest = self.cached_path(&track.id);
        if let Ok(meta) = tokio::fs::metadata(&dest).await {
            return Ok(DownloadOutcome::AlreadyCached { size: meta.len() });
        }

        let source = self.source_path(track)?;
        let size = tokio::fs::metadata(&source)
            .await
            .map_err(|e| Error::MediaLoad(format!("{}: {}", source.display(), e)))?
            .len();

        let usage = self.usage().await?;
        if usage + size > self.budget_bytes {
            warn!(
                "⚠️ Cache limit reached. Total: {:.2}MB. Cannot add {} ({:.2}MB)",
                usage as f64 / 1024.0 / 1024.0,
                track.id,
                size as f64 / 1024.0 / 1024.0
            );
            return Ok(DownloadOutcome::LimitReached);
        }

        // Partial copies never carry the .cache extension
        let partial = dest.with_extension("part");
        if let Err(e) = tokio::fs::copy(&source, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(Error::StorageQuota(format!(
                "copy of {} failed: {}",
                track.id, e
            )));
        }
        tokio::fs::rename(&partial, &dest).await?;

        info!(
            "📥 Cached track {} ({:.2}MB)",
            track.id,
            size as f64 / 1024.0 / 1024.0
        );
        Ok(DownloadOutcome::Stored { size })
    }

    async fn evict_from_cache(&self, track_id: &TrackId) -> Result<()> {
        match tokio::fs::remove_file(self.cached_path(track_id)).await {
            Ok(()) => {
                debug!("🗑️ Removed cached file for {}", track_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn cached_path(&self, track_id: &TrackId) -> PathBuf {
        self.cache_dir.join(format!("{}.cache", file_stem(track_id)))
    }

    fn stream_locator(&self, track: &Track) -> String {
        format!(
            "{}?path={}&id={}",
            self.stream_base_url.trim_end_matches('/'),
            urlencoding::encode(&track.locator),
            urlencoding::encode(track.id.as_str())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(root: &Path, cache: &Path, budget: u64) -> FolderOrigin {
        FolderOrigin::new(root, cache, "http://origin:3001/music/stream", budget)
    }

    #[tokio::test]
    async fn test_download_then_already_cached() {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join("song.mp3"), vec![7u8; 1000]).unwrap();

        let origin = origin(library.path(), cache.path(), 10_000);
        let track = Track::new("s1", "Song", 60.0).with_locator("song.mp3");

        assert_eq!(
            origin.download_to_cache(&track).await.unwrap(),
            DownloadOutcome::Stored { size: 1000 }
        );
        assert_eq!(
            origin.download_to_cache(&track).await.unwrap(),
            DownloadOutcome::AlreadyCached { size: 1000 }
        );
        assert_eq!(origin.usage().await.unwrap(), 1000);
        assert!(origin.cached_path(&track.id).exists());
    }

    #[tokio::test]
    async fn test_limit_reached() {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join("a.mp3"), vec![0u8; 600]).unwrap();
        std::fs::write(library.path().join("b.mp3"), vec![0u8; 600]).unwrap();

        let origin = origin(library.path(), cache.path(), 1000);
        let a = Track::new("a", "A", 60.0).with_locator("a.mp3");
        let b = Track::new("b", "B", 60.0).with_locator("b.mp3");

        assert!(matches!(
            origin.download_to_cache(&a).await.unwrap(),
            DownloadOutcome::Stored { .. }
        ));
        assert_eq!(
            origin.download_to_cache(&b).await.unwrap(),
            DownloadOutcome::LimitReached
        );
    }

    #[tokio::test]
    async fn test_missing_source_is_media_error() {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let origin = origin(library.path(), cache.path(), 1000);
        let track = Track::new("gone", "Gone", 60.0).with_locator("gone.mp3");

        assert!(matches!(
            origin.download_to_cache(&track).await,
            Err(Error::MediaLoad(_))
        ));
    }

    #[tokio::test]
    async fn test_locator_cannot_escape_library() {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let origin = origin(library.path(), cache.path(), 1000);
        let track = Track::new("x", "X", 60.0).with_locator("../etc/passwd");

        assert!(matches!(
            origin.download_to_cache(&track).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_evict_missing_file_succeeds() {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join("a.mp3"), vec![0u8; 10]).unwrap();
        let origin = origin(library.path(), cache.path(), 1000);
        let track = Track::new("a", "A", 60.0).with_locator("a.mp3");

        origin.download_to_cache(&track).await.unwrap();
        origin.evict_from_cache(&track.id).await.unwrap();
        assert!(!origin.cached_path(&track.id).exists());
        origin.evict_from_cache(&track.id).await.unwrap();
    }

    #[test]
    fn test_stream_locator_encodes_query() {
        let origin = origin(Path::new("/lib"), Path::new("/cache"), 1);
        let track = Track::new("id 1", "T", 60.0).with_locator("Jazz/Blue & Green.mp3");
        assert_eq!(
            origin.stream_locator(&track),
            "http://origin:3001/music/stream?path=Jazz%2FBlue%20%26%20Green.mp3&id=id%201"
        );
    }

    #[test]
    fn test_cached_path_encodes_id() {
        let origin = origin(Path::new("/lib"), Path::new("/cache"), 1);
        assert_eq!(
            origin.cached_path(&TrackId::from("a/b")),
            PathBuf::from("/cache/a%2Fb.cache")
        );
        assert_eq!(
            origin.cached_path(&TrackId::from("../up")),
            PathBuf::from("/cache/..%2Fup.cache")
        );
    }

    #[tokio::test]
    async fn test_similar_ids_get_separate_files() {
        let library = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::fs::write(library.path().join("small.mp3"), vec![1u8; 100]).unwrap();
        std::fs::write(library.path().join("large.mp3"), vec![2u8; 200]).unwrap();

        let origin = origin(library.path(), cache.path(), 10_000);
        let underscore = Track::new("x_y", "Underscore", 60.0).with_locator("small.mp3");
        let dotted = Track::new("x.y", "Dotted", 60.0).with_locator("large.mp3");

        assert_eq!(
            origin.download_to_cache(&underscore).await.unwrap(),
            DownloadOutcome::Stored { size: 100 }
        );
        assert_eq!(
            origin.download_to_cache(&dotted).await.unwrap(),
            DownloadOutcome::Stored { size: 200 }
        );
        assert_ne!(
            origin.cached_path(&underscore.id),
            origin.cached_path(&dotted.id)
        );
        assert_eq!(origin.usage().await.unwrap(), 300);

        origin.evict_from_cache(&underscore.id).await.unwrap();
        assert!(origin.cached_path(&dotted.id).exists());
        assert_eq!(origin.usage().await.unwrap(), 200);
    }
}
