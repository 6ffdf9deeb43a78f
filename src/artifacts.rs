//! Artifact Store: the run's output directory.
//!
//! Lifecycle per run:
//! 1. [`ArtifactStore::prepare`] takes the workspace lock, creates the output
//!    directory and removes the well-known stage artifacts left over from a
//!    previous run.
//! 2. The stages write into the directory.
//! 3. [`ArtifactStore::reorganize`] moves tree working files into a subdirectory.
//! 4. [`ArtifactStore::package`] archives the whole directory.

use crate::errors::ArtifactError;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const LOCK_FILE_NAME: &str = ".subtyper.lock";

/// Layout of the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Absolute path of the output directory.
    pub output_dir: PathBuf,
    /// Subdirectory that receives tree working files.
    pub subdir: String,
    /// A file whose name contains any of these is a tree working file.
    pub markers: Vec<String>,
    /// Absolute path of the archive to produce.
    pub archive_path: PathBuf,
    /// Artifacts the stages write; removed before each run.
    pub stale_artifacts: Vec<PathBuf>,
}

/// Result of packaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Member names in archive order.
    pub members: Vec<String>,
    pub size_bytes: u64,
}

/// Exclusive hold on the workspace; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release workspace lock"
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    layout: OutputLayout,
    lock_path: PathBuf,
}

impl ArtifactStore {
    pub fn new(layout: OutputLayout, workspace_dir: &Path) -> Self {
        Self {
            layout,
            lock_path: workspace_dir.join(LOCK_FILE_NAME),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.layout.output_dir
    }

    /// Lock the workspace, create the output directory and clear stale
    /// stage artifacts and the previous archive. Other files in the
    /// directory are left alone.
    pub fn prepare(&self) -> Result<RunLock, ArtifactError> {
        let lock = self.lock()?;

        let dir = &self.layout.output_dir;
        fs::create_dir_all(dir).map_err(|source| ArtifactError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let stale = self
            .layout
            .stale_artifacts
            .iter()
            .chain([&self.layout.archive_path]);
        for path in stale {
            match fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ArtifactError::RemoveStale {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        Ok(lock)
    }

    fn lock(&self) -> Result<RunLock, ArtifactError> {
        let path = self.lock_path.clone();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ArtifactError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| ArtifactError::Lock {
                path: path.clone(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(RunLock { file, path }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(ArtifactError::LockContended { path })
            }
            Err(source) => Err(ArtifactError::Lock { path, source }),
        }
    }

    /// Move every top-level regular file whose name contains a marker into
    /// the subdirectory. Returns the new paths.
    pub fn reorganize(&self) -> Result<Vec<PathBuf>, ArtifactError> {
        let dir = &self.layout.output_dir;
        let target_dir = dir.join(&self.layout.subdir);
        fs::create_dir_all(&target_dir).map_err(|source| ArtifactError::CreateDir {
            path: target_dir.clone(),
            source,
        })?;

        let entries = fs::read_dir(dir).map_err(|source| ArtifactError::ReadDir {
            path: dir.clone(),
            source,
        })?;

        let mut to_move = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ArtifactError::ReadDir {
                path: dir.clone(),
                source,
            })?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.layout.markers.iter().any(|m| name.contains(m.as_str())) {
                to_move.push(entry.path());
            }
        }
        to_move.sort();

        let mut moved = Vec::with_capacity(to_move.len());
        for from in to_move {
            let Some(name) = from.file_name() else {
                continue;
            };
            let to = target_dir.join(name);
            fs::rename(&from, &to).map_err(|source| ArtifactError::Move {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
            tracing::debug!(from = %from.display(), to = %to.display(), "moved tree working file");
            moved.push(to);
        }

        Ok(moved)
    }

    /// Write every regular file under the output directory into a deflated
    /// zip. Member names are relative to the output directory's parent, so
    /// the top-level entry is the output directory itself.
    pub fn package(&self) -> Result<ArchiveSummary, ArtifactError> {
        let dir = &self.layout.output_dir;
        let archive = &self.layout.archive_path;

        if archive.starts_with(dir) {
            return Err(ArtifactError::ArchiveInsideOutput {
                archive: archive.clone(),
                output_dir: dir.clone(),
            });
        }
        let base = dir.parent().ok_or_else(|| ArtifactError::NoParent {
            path: dir.clone(),
        })?;
        let archive_dir = archive.parent().ok_or_else(|| ArtifactError::NoParent {
            path: archive.clone(),
        })?;

        let files = collect_files(dir)?;

        let io_err = |source| ArtifactError::ArchiveIo {
            path: archive.clone(),
            source,
        };
        let zip_err = |source| ArtifactError::Archive {
            path: archive.clone(),
            source,
        };

        // Build next to the destination, then rename into place.
        let tmp = tempfile::Builder::new()
            .prefix(".subtyper-archive-")
            .tempfile_in(archive_dir)
            .map_err(io_err)?;
        let mut writer = zip::ZipWriter::new(tmp);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut members = Vec::with_capacity(files.len());
        for path in &files {
            let name = member_name(base, path);
            writer.start_file(name.as_str(), options).map_err(zip_err)?;
            let mut source = File::open(path).map_err(io_err)?;
            io::copy(&mut source, &mut writer).map_err(io_err)?;
            members.push(name);
        }

        let mut tmp = writer.finish().map_err(zip_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(archive).map_err(|e| io_err(e.error))?;

        let size_bytes = fs::metadata(archive).map_err(io_err)?.len();
        tracing::info!(
            archive = %archive.display(),
            members = members.len(),
            size_bytes,
            "packaged output directory"
        );

        Ok(ArchiveSummary {
            path: archive.clone(),
            members,
            size_bytes,
        })
    }
}

/// All regular files under `dir`, in a stable order.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, ArtifactError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| ArtifactError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Archive member name: `path` relative to `base`, `/`-separated.
fn member_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
