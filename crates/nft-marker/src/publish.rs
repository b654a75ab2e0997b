//! All-or-nothing replacement of a marker's artifact directory.
//!
//! New artifacts are written into a hidden staging directory and promoted
//! with a rename; an existing marker is parked under a hidden backup name
//! until the promotion succeeded, and renamed back if it did not.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory under the storage root that holds one sub-directory per marker.
pub const MARKERS_DIR_NAME: &str = "nft_markers";

const STAGING_PREFIX: &str = ".staging-";
const BACKUP_PREFIX: &str = ".backup-";

/// Filesystem operations used while publishing.
pub trait PublishFs: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// [`PublishFs`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFs;

impl PublishFs for StdFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("failed to write staged artifact {path}")]
    Stage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move existing marker {path} aside")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to promote staged marker to {path}")]
    Promote {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The previous artifacts are still intact under `backup`.
    #[error("failed to restore previous marker from {backup}")]
    Rollback {
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to recover interrupted publish in {path}")]
    Recover {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove marker {path}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Paths of one published marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerArtifact {
    pub dir: PathBuf,
    pub feature_set_path: PathBuf,
    pub multiscale_feature_set_path: PathBuf,
    pub image_metadata_set_path: PathBuf,
}

impl MarkerArtifact {
    /// Layout of marker `id` inside `markers_dir`.
    pub fn locate(markers_dir: &Path, id: &str) -> Self {
        let dir = markers_dir.join(id);
        Self {
            feature_set_path: dir.join(format!("{id}.fset")),
            multiscale_feature_set_path: dir.join(format!("{id}.fset3")),
            image_metadata_set_path: dir.join(format!("{id}.iset")),
            dir,
        }
    }

    /// Paths in write order: `.fset`, `.fset3`, `.iset`.
    pub fn paths(&self) -> [&Path; 3] {
        [
            &self.feature_set_path,
            &self.multiscale_feature_set_path,
            &self.image_metadata_set_path,
        ]
    }

    /// `true` when all three files are present.
    pub fn is_complete(&self) -> bool {
        self.paths().iter().all(|p| p.is_file())
    }
}

/// Encoded bytes of the three artifacts, ready to publish.
#[derive(Clone, Debug, Default)]
pub struct ArtifactBytes {
    pub feature_set: Vec<u8>,
    pub multiscale_feature_set: Vec<u8>,
    pub image_metadata_set: Vec<u8>,
}

/// Writes marker directories under `{storage_root}/nft_markers`.
#[derive(Clone)]
pub struct Publisher {
    markers_dir: PathBuf,
    fs: Arc<dyn PublishFs>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("markers_dir", &self.markers_dir)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(storage_root: impl AsRef<Path>, fs: Arc<dyn PublishFs>) -> Self {
        Self {
            markers_dir: storage_root.as_ref().join(MARKERS_DIR_NAME),
            fs,
        }
    }

    pub fn markers_dir(&self) -> &Path {
        &self.markers_dir
    }

    pub fn locate(&self, id: &str) -> MarkerArtifact {
        MarkerArtifact::locate(&self.markers_dir, id)
    }

    fn staging_dir(&self, id: &str) -> PathBuf {
        self.markers_dir.join(format!("{STAGING_PREFIX}{id}"))
    }

    fn backup_dir(&self, id: &str) -> PathBuf {
        self.markers_dir.join(format!("{BACKUP_PREFIX}{id}"))
    }

    /// Clean up after a publish that was interrupted mid-way.
    ///
    /// A leftover backup is restored when the live directory is missing and
    /// dropped otherwise. Leftover staging is always dropped.
    pub fn recover(&self, id: &str) -> Result<(), PublishError> {
        let live = self.markers_dir.join(id);
        let backup = self.backup_dir(id);
        if self.fs.exists(&backup) {
            if self.fs.exists(&live) {
                log::warn!("discarding stale backup {}", backup.display());
                self.fs
                    .remove_dir_all(&backup)
                    .map_err(|source| PublishError::Recover {
                        path: backup.clone(),
                        source,
                    })?;
            } else {
                log::warn!("restoring interrupted marker from {}", backup.display());
                self.fs
                    .rename(&backup, &live)
                    .map_err(|source| PublishError::Recover {
                        path: backup.clone(),
                        source,
                    })?;
            }
        }

        let staging = self.staging_dir(id);
        if self.fs.exists(&staging) {
            log::debug!("removing stale staging {}", staging.display());
            self.fs
                .remove_dir_all(&staging)
                .map_err(|source| PublishError::Recover {
                    path: staging,
                    source,
                })?;
        }
        Ok(())
    }

    /// Replace marker `id` with `bytes`. On error the previous artifacts
    /// (or their absence) are left as they were.
    pub fn publish(&self, id: &str, bytes: &ArtifactBytes) -> Result<MarkerArtifact, PublishError> {
        self.recover(id)?;

        let staging = self.staging_dir(id);
        if let Err(e) = self.stage(&staging, id, bytes) {
            self.discard(&staging);
            return Err(e);
        }

        let live = self.markers_dir.join(id);
        let backup = self.backup_dir(id);
        let replacing = self.fs.exists(&live);
        if replacing {
            if let Err(source) = self.fs.rename(&live, &backup) {
                self.discard(&staging);
                return Err(PublishError::Backup { path: live, source });
            }
        }

        if let Err(source) = self.fs.rename(&staging, &live) {
            self.discard(&staging);
            if replacing {
                log::warn!("rolling back marker {id}");
                self.fs
                    .rename(&backup, &live)
                    .map_err(|source| PublishError::Rollback {
                        backup: backup.clone(),
                        source,
                    })?;
            }
            return Err(PublishError::Promote { path: live, source });
        }

        if replacing {
            if let Err(e) = self.fs.remove_dir_all(&backup) {
                log::warn!("failed to remove backup {}: {e}", backup.display());
            }
        }
        Ok(self.locate(id))
    }

    fn stage(&self, staging: &Path, id: &str, bytes: &ArtifactBytes) -> Result<(), PublishError> {
        let target = MarkerArtifact::locate(self.markers_dir(), id);
        self.fs
            .create_dir_all(staging)
            .map_err(|source| PublishError::Stage {
                path: staging.to_path_buf(),
                source,
            })?;
        let contents = [
            &bytes.feature_set,
            &bytes.multiscale_feature_set,
            &bytes.image_metadata_set,
        ];
        for (path, data) in target.paths().into_iter().zip(contents) {
            let Some(name) = path.file_name() else {
                continue;
            };
            let staged = staging.join(name);
            self.fs
                .write(&staged, data)
                .map_err(|source| PublishError::Stage {
                    path: staged,
                    source,
                })?;
        }
        Ok(())
    }

    fn discard(&self, staging: &Path) {
        if self.fs.exists(staging) {
            if let Err(e) = self.fs.remove_dir_all(staging) {
                log::warn!("failed to remove staging {}: {e}", staging.display());
            }
        }
    }

    /// Delete marker `id`. Returns `false` when it did not exist.
    pub fn remove(&self, id: &str) -> Result<bool, PublishError> {
        self.recover(id)?;
        let live = self.markers_dir.join(id);
        if !self.fs.exists(&live) {
            return Ok(false);
        }
        self.fs
            .remove_dir_all(&live)
            .map_err(|source| PublishError::Remove { path: live, source })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Fails writes of one extension, or the staging promotion.
    #[derive(Default)]
    struct FaultyFs {
        fail_write_ext: Option<&'static str>,
        fail_promote: AtomicBool,
    }

    impl PublishFs for FaultyFs {
        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            StdFs.create_dir_all(path)
        }

        fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            if let Some(ext) = self.fail_write_ext {
                if path.extension().is_some_and(|e| e == ext) {
                    return Err(io::Error::other("disk full"));
                }
            }
            StdFs.write(path, data)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            let promoting = from
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if promoting && self.fail_promote.load(Ordering::SeqCst) {
                return Err(io::Error::other("rename refused"));
            }
            StdFs.rename(from, to)
        }

        fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
            StdFs.remove_dir_all(path)
        }

        fn exists(&self, path: &Path) -> bool {
            StdFs.exists(path)
        }
    }

    fn bytes(tag: u8) -> ArtifactBytes {
        ArtifactBytes {
            feature_set: vec![tag; 4],
            multiscale_feature_set: vec![tag; 5],
            image_metadata_set: vec![tag; 6],
        }
    }

    fn hidden_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect()
    }

    #[test]
    fn fresh_publish_writes_three_files() {
        let root = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(root.path(), Arc::new(StdFs));
        let artifact = publisher.publish("poster", &bytes(1)).unwrap();

        assert!(artifact.is_complete());
        assert_eq!(
            artifact.feature_set_path,
            root.path().join("nft_markers/poster/poster.fset")
        );
        assert_eq!(std::fs::read(&artifact.image_metadata_set_path).unwrap(), vec![1; 6]);
        assert!(hidden_entries(publisher.markers_dir()).is_empty());
    }

    #[test]
    fn regeneration_replaces_and_drops_backup() {
        let root = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(root.path(), Arc::new(StdFs));
        publisher.publish("poster", &bytes(1)).unwrap();
        let artifact = publisher.publish("poster", &bytes(2)).unwrap();

        assert_eq!(std::fs::read(&artifact.feature_set_path).unwrap(), vec![2; 4]);
        assert!(hidden_entries(publisher.markers_dir()).is_empty());
    }

    #[test]
    fn failed_staging_leaves_old_marker_untouched() {
        let root = tempfile::tempdir().unwrap();
        seed(root.path());

        let fs = FaultyFs {
            fail_write_ext: Some("iset"),
            ..FaultyFs::default()
        };
        let publisher = Publisher::new(root.path(), Arc::new(fs));
        let err = publisher.publish("poster", &bytes(2)).unwrap_err();
        assert!(matches!(err, PublishError::Stage { .. }));

        let artifact = publisher.locate("poster");
        assert_eq!(std::fs::read(&artifact.feature_set_path).unwrap(), vec![1; 4]);
        assert!(hidden_entries(publisher.markers_dir()).is_empty());
    }

    #[test]
    fn failed_promotion_restores_backup() {
        let root = tempfile::tempdir().unwrap();
        seed(root.path());

        let fs = FaultyFs::default();
        fs.fail_promote.store(true, Ordering::SeqCst);
        let publisher = Publisher::new(root.path(), Arc::new(fs));
        let err = publisher.publish("poster", &bytes(2)).unwrap_err();
        assert!(matches!(err, PublishError::Promote { .. }));

        let artifact = publisher.locate("poster");
        for (path, len) in artifact.paths().into_iter().zip([4, 5, 6]) {
            assert_eq!(std::fs::read(path).unwrap(), vec![1; len]);
        }
        assert!(hidden_entries(publisher.markers_dir()).is_empty());
    }

    #[test]
    fn failed_fresh_publish_leaves_nothing() {
        let root = tempfile::tempdir().unwrap();
        let fs = FaultyFs::default();
        fs.fail_promote.store(true, Ordering::SeqCst);
        let publisher = Publisher::new(root.path(), Arc::new(fs));
        assert!(publisher.publish("poster", &bytes(2)).is_err());
        assert!(!publisher.locate("poster").dir.exists());
        assert!(hidden_entries(publisher.markers_dir()).is_empty());
    }

    #[test]
    fn recovers_interrupted_regeneration() {
        let root = tempfile::tempdir().unwrap();
        let publisher = seed(root.path());
        let markers = publisher.markers_dir().to_path_buf();

        // Crash after the live dir was parked and before promotion.
        std::fs::rename(markers.join("poster"), markers.join(".backup-poster")).unwrap();
        std::fs::create_dir_all(markers.join(".staging-poster")).unwrap();

        publisher.recover("poster").unwrap();
        assert!(publisher.locate("poster").is_complete());
        assert!(hidden_entries(&markers).is_empty());
    }

    #[test]
    fn stale_backup_next_to_live_marker_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        let publisher = seed(root.path());
        let markers = publisher.markers_dir().to_path_buf();
        std::fs::create_dir_all(markers.join(".backup-poster")).unwrap();

        publisher.recover("poster").unwrap();
        assert!(publisher.locate("poster").is_complete());
        assert!(hidden_entries(&markers).is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let root = tempfile::tempdir().unwrap();
        let publisher = seed(root.path());
        assert!(publisher.remove("poster").unwrap());
        assert!(!publisher.locate("poster").dir.exists());
        assert!(!publisher.remove("poster").unwrap());
    }

    /// Publish generation `1` of marker `poster` with the real filesystem.
    fn seed(root: &Path) -> Publisher {
        let publisher = Publisher::new(root, Arc::new(StdFs));
        publisher.publish("poster", &bytes(1)).unwrap();
        publisher
    }
}
