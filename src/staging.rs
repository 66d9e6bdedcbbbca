//! Working directories for recognizer input and output files.
//!
//! Each request gets its own `image_<token>` file pair. Tokens are random
//! UUIDs, so concurrent requests never share files. The pair is owned by a
//! [`StagedGuard`], which deletes it when dropped, so a cancelled or panicking
//! request cannot leave files behind.

use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extensions the recognizer may write next to an output base.
const OUTPUT_EXTENSIONS: &[&str] = &["txt", "tsv"];

/// Paths owned by one request.
#[derive(Debug, Clone)]
pub struct StagedFiles {
    pub image_path: PathBuf,
    /// Output path without extension; the recognizer appends `.txt` / `.tsv`.
    pub output_base: PathBuf,
}

impl StagedFiles {
    pub fn output_file(&self, extension: &str) -> PathBuf {
        let mut name = self.output_base.as_os_str().to_owned();
        name.push(".");
        name.push(extension);
        PathBuf::from(name)
    }

    fn all_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.image_path.clone()];
        paths.extend(OUTPUT_EXTENSIONS.iter().map(|ext| self.output_file(ext)));
        paths
    }

    /// Remove the image and any outputs. Never fails; safe to repeat.
    pub async fn remove_all(&self) {
        for path in self.all_paths() {
            remove_quietly(&path).await;
        }
    }
}

/// Owns a staged file pair for the length of one request.
#[derive(Debug)]
pub struct StagedGuard {
    files: StagedFiles,
    cleaned: bool,
}

impl StagedGuard {
    /// Delete the files now. Consumes the guard so its drop does no more work.
    pub async fn cleanup(mut self) {
        self.files.remove_all().await;
        self.cleaned = true;
    }
}

impl Deref for StagedGuard {
    type Target = StagedFiles;

    fn deref(&self) -> &StagedFiles {
        &self.files
    }
}

impl Drop for StagedGuard {
    // Reached when the owning future is dropped or unwinds before `cleanup`.
    // May run during a panic or outside the runtime, so removal is blocking.
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        warn!("Request ended early, removing {:?}", self.files.image_path);
        for path in self.files.all_paths() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Deleted {:?}", path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete {:?}: {}", path, e),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl StagingArea {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create both directories (recursively) if they are missing.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// Allocate a fresh file pair without touching the disk.
    pub fn allocate(&self) -> StagedFiles {
        let token = Uuid::new_v4().simple();
        StagedFiles {
            image_path: self.upload_dir.join(format!("image_{}.png", token)),
            output_base: self.output_dir.join(format!("image_{}", token)),
        }
    }

    /// Write `image` to a fresh input path. The write has completed when this
    /// returns. On error the guard is dropped, removing any partial file.
    pub async fn stage(&self, image: &[u8]) -> io::Result<StagedGuard> {
        let staged = StagedGuard {
            files: self.allocate(),
            cleaned: false,
        };
        tokio::fs::write(&staged.image_path, image).await?;
        debug!("Staged {} bytes at {:?}", image.len(), staged.image_path);
        Ok(staged)
    }

    /// Delete every file in both directories regardless of owner.
    ///
    /// Only call while no request is in flight (startup, or after the server
    /// has drained). Returns the number of files removed.
    pub async fn sweep(&self) -> usize {
        let mut removed = 0;
        for dir in [&self.upload_dir, &self.output_dir] {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Cannot list {:?} for sweep: {}", dir, e);
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Sweep of {:?} stopped early: {}", dir, e);
                        break;
                    }
                };
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("Failed to delete {:?}: {}", path, e),
                }
            }
        }

        if removed > 0 {
            info!("Swept {} leftover file(s) from staging directories", removed);
        }
        removed
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Deleted {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn area(root: &TempDir) -> StagingArea {
        StagingArea::new(root.path().join("uploads"), root.path().join("output"))
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_ensure_dirs_creates_nested() {
        let root = TempDir::new().unwrap();
        let staging = StagingArea::new(root.path().join("a/b/uploads"), root.path().join("c/output"));
        staging.ensure_dirs().await.unwrap();
        assert!(staging.upload_dir().is_dir());
        assert!(staging.output_dir().is_dir());
        // Second call is a no-op.
        staging.ensure_dirs().await.unwrap();
    }

    #[tokio::test]
    async fn test_stage_writes_image_with_expected_names() {
        let root = TempDir::new().unwrap();
        let staging = area(&root);
        staging.ensure_dirs().await.unwrap();

        let staged = staging.stage(b"\x89PNG").await.unwrap();
        assert_eq!(std::fs::read(&staged.image_path).unwrap(), b"\x89PNG");

        let image_name = staged.image_path.file_name().unwrap().to_str().unwrap();
        let base_name = staged.output_base.file_name().unwrap().to_str().unwrap();
        assert!(image_name.starts_with("image_") && image_name.ends_with(".png"));
        assert_eq!(image_name.trim_end_matches(".png"), base_name);
        assert_eq!(staged.image_path.parent().unwrap(), staging.upload_dir());
        assert_eq!(staged.output_base.parent().unwrap(), staging.output_dir());
        assert!(staged.output_file("tsv").to_str().unwrap().ends_with(".tsv"));
    }

    #[test]
    fn test_allocations_are_unique() {
        let staging = StagingArea::new("uploads", "output");
        let names: std::collections::HashSet<_> =
            (0..1000).map(|_| staging.allocate().image_path).collect();
        assert_eq!(names.len(), 1000);
    }

    #[tokio::test]
    async fn test_stage_fails_when_dir_missing() {
        let root = TempDir::new().unwrap();
        let staging = area(&root);
        assert!(staging.stage(b"\xff\xd8").await.is_err());
        assert_eq!(count_files(staging.upload_dir()), 0);
    }

    #[tokio::test]
    async fn test_cleanup_removes_all_and_is_idempotent() {
        let root = TempDir::new().unwrap();
        let staging = area(&root);
        staging.ensure_dirs().await.unwrap();

        let staged = staging.stage(b"GIF89a").await.unwrap();
        std::fs::write(staged.output_file("txt"), "text").unwrap();
        std::fs::write(staged.output_file("tsv"), "tsv").unwrap();

        staged.remove_all().await;
        assert_eq!(count_files(staging.upload_dir()), 0);
        assert_eq!(count_files(staging.output_dir()), 0);

        staged.remove_all().await;
        staged.cleanup().await;
    }

    #[tokio::test]
    async fn test_dropped_guard_removes_files() {
        let root = TempDir::new().unwrap();
        let staging = area(&root);
        staging.ensure_dirs().await.unwrap();

        let staged = staging.stage(b"\xff\xd8").await.unwrap();
        std::fs::write(staged.output_file("txt"), "partial").unwrap();
        assert_eq!(count_files(staging.upload_dir()), 1);

        drop(staged);
        assert_eq!(count_files(staging.upload_dir()), 0);
        assert_eq!(count_files(staging.output_dir()), 0);
    }

    #[tokio::test]
    async fn test_guard_removes_files_when_task_is_aborted() {
        let root = TempDir::new().unwrap();
        let staging = area(&root);
        staging.ensure_dirs().await.unwrap();

        let (staged_tx, staged_rx) = tokio::sync::oneshot::channel();
        let task_staging = staging.clone();
        let task = tokio::spawn(async move {
            let _staged = task_staging.stage(b"\x89PNG").await.unwrap();
            staged_tx.send(()).unwrap();
            std::future::pending::<()>().await;
        });

        staged_rx.await.unwrap();
        assert_eq!(count_files(staging.upload_dir()), 1);
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(count_files(staging.upload_dir()), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_everything() {
        let root = TempDir::new().unwrap();
        let staging = area(&root);
        staging.ensure_dirs().await.unwrap();

        let _first = staging.stage(b"\xff\xd8").await.unwrap();
        let _second = staging.stage(b"\xff\xd8").await.unwrap();
        std::fs::write(staging.output_dir().join("orphan.txt"), "x").unwrap();

        assert_eq!(staging.sweep().await, 3);
        assert_eq!(count_files(staging.upload_dir()), 0);
        assert_eq!(count_files(staging.output_dir()), 0);
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_dirs() {
        let root = TempDir::new().unwrap();
        assert_eq!(area(&root).sweep().await, 0);
    }
}
