//! Library directory discovery
//!
//! Walks a library root on the blocking pool and returns every non-empty file
//! whose extension is configured as media, together with the directories the
//! walk could not enter. Fingerprints hash the file size plus a leading sample
//! of the content.

use crate::error::{Result, SyncError};
use core_runtime::config::SyncSettings;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A media file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
}

impl ScannedFile {
    /// Path as stored in file records
    pub fn file_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Result of walking one library root
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: Vec<ScannedFile>,
    /// Paths below the root that could not be read
    pub unreadable: Vec<PathBuf>,
}

impl Discovery {
    /// True when `file_path` lies under a path the walk could not read.
    pub fn is_unverified(&self, file_path: &str) -> bool {
        let path = Path::new(file_path);
        self.unreadable.iter().any(|dir| path.starts_with(dir))
    }
}

#[derive(Debug, Clone)]
pub struct LibraryScanner {
    extensions: HashSet<String>,
    sample_bytes: usize,
}

impl LibraryScanner {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            extensions: settings
                .media_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            sample_bytes: settings.fingerprint_sample_bytes,
        }
    }

    pub fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Lists media files below `root`, sorted by path. Empty files are left
    /// out, downloads claim their destination with one.
    ///
    /// # Errors
    ///
    /// `LibraryUnreachable` when the root is missing, not a directory or
    /// cannot be listed. Unreadable entries below the root are reported in
    /// [`Discovery::unreadable`].
    pub async fn discover(&self, root: &Path) -> Result<Discovery> {
        let scanner = self.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || scanner.discover_blocking(&root))
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?
    }

    fn discover_blocking(&self, root: &Path) -> Result<Discovery> {
        let unreachable = |reason: String| SyncError::LibraryUnreachable {
            path: root.display().to_string(),
            reason,
        };

        if !root.is_dir() {
            return Err(unreachable("not a directory".to_string()));
        }
        std::fs::read_dir(root).map_err(|e| unreachable(e.to_string()))?;

        let mut discovery = Discovery::default();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    warn!(path = %path.display(), error = %e, "Cannot read library entry");
                    discovery.unreadable.push(path);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_media_file(entry.path()) {
                continue;
            }
            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Cannot stat media file");
                    discovery.unreadable.push(entry.into_path());
                    continue;
                }
            };
            if size == 0 {
                continue;
            }
            discovery.files.push(ScannedFile {
                path: entry.into_path(),
                size,
            });
        }

        discovery.files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            root = %root.display(),
            count = discovery.files.len(),
            unreadable = discovery.unreadable.len(),
            "Discovered media files"
        );
        Ok(discovery)
    }

    /// SHA-256 over the little-endian file size followed by the first
    /// `fingerprint_sample_bytes` of content, as lowercase hex.
    pub async fn fingerprint(&self, file: &ScannedFile) -> Result<String> {
        let path = file.path.clone();
        let size = file.size;
        let sample_bytes = self.sample_bytes;

        tokio::task::spawn_blocking(move || {
            let handle = std::fs::File::open(&path).map_err(|e| SyncError::io(&path, e))?;
            let mut sample = Vec::with_capacity(sample_bytes);
            handle
                .take(sample_bytes as u64)
                .read_to_end(&mut sample)
                .map_err(|e| SyncError::io(&path, e))?;

            let mut hasher = Sha256::new();
            hasher.update(size.to_le_bytes());
            hasher.update(&sample);
            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
        .map_err(|e| SyncError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner() -> LibraryScanner {
        LibraryScanner::new(&SyncSettings::default())
    }

    #[tokio::test]
    async fn test_discover_filters_extensions_recursively() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("Show").join("Season 01");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("Movie.2020.mkv"), b"abc").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore").unwrap();
        std::fs::write(nested.join("Show.S01E01.MP4"), b"abcdef").unwrap();

        let discovery = scanner().discover(dir.path()).await.unwrap();
        let files = discovery.files;

        assert!(discovery.unreadable.is_empty());
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.path.ends_with("Movie.2020.mkv") && f.size == 3));
        assert!(files.iter().any(|f| f.path.ends_with("Show.S01E01.MP4") && f.size == 6));
    }

    #[tokio::test]
    async fn test_empty_media_files_are_not_listed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Heat.1995.mkv"), b"").unwrap();
        std::fs::write(dir.path().join("Heat.1995.mkv.part"), b"abc").unwrap();

        let discovery = scanner().discover(dir.path()).await.unwrap();
        assert!(discovery.files.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_link_is_reported_unreadable() {
        let dir = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        std::fs::write(target.path().join("Movie.2020.mkv"), b"abc").unwrap();
        let link = dir.path().join("nas");
        std::os::unix::fs::symlink(target.path(), &link).unwrap();
        std::fs::write(dir.path().join("Local.2021.mkv"), b"abc").unwrap();

        let before = scanner().discover(dir.path()).await.unwrap();
        assert_eq!(before.files.len(), 2);
        assert!(before.unreadable.is_empty());

        drop(target);
        let after = scanner().discover(dir.path()).await.unwrap();
        assert_eq!(after.files.len(), 1);
        assert_eq!(after.unreadable, vec![link.clone()]);
        assert!(after.is_unverified(&link.join("Movie.2020.mkv").to_string_lossy()));
        assert!(!after.is_unverified(&dir.path().join("Local.2021.mkv").to_string_lossy()));
    }

    #[tokio::test]
    async fn test_missing_root_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let result = scanner().discover(&dir.path().join("unmounted")).await;
        assert!(matches!(result, Err(SyncError::LibraryUnreachable { .. })));
    }

    #[tokio::test]
    async fn test_fingerprint_covers_size_and_sample() {
        let dir = TempDir::new().unwrap();
        let settings = SyncSettings {
            fingerprint_sample_bytes: 4,
            ..SyncSettings::default()
        };
        let scanner = LibraryScanner::new(&settings);

        let a = dir.path().join("a.mkv");
        let b = dir.path().join("b.mkv");
        let c = dir.path().join("c.mkv");
        std::fs::write(&a, b"abcdXXXX").unwrap();
        std::fs::write(&b, b"abcdYYYY").unwrap();
        std::fs::write(&c, b"abcdYYYYZ").unwrap();

        let hash = |path: &Path, size| {
            let file = ScannedFile {
                path: path.to_path_buf(),
                size,
            };
            let scanner = scanner.clone();
            async move { scanner.fingerprint(&file).await.unwrap() }
        };

        let ha = hash(&a, 8).await;
        assert_eq!(ha.len(), 64);
        // Same size and same leading sample
        assert_eq!(ha, hash(&b, 8).await);
        assert_ne!(ha, hash(&c, 9).await);
    }
}
