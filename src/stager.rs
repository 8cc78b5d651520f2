//! Per-job file staging.
//!
//! Every job owns the tree `{root}/{job_id}/` with `images/`, `audio/` and
//! `output/` below it. Images are renamed to `image_NNN.<ext>` after their
//! order index so the engine reads them in the sequence the user chose,
//! whatever order the multipart parts arrived in.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::StagingError;
use crate::job::JobId;

const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
/// Name given to an audio upload whose filename is empty or unusable.
pub const DEFAULT_AUDIO_FILENAME: &str = "audio";

type RemoveFn = fn(&Path, bool) -> std::io::Result<()>;

/// One uploaded image and the position it should take in the video.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub order: usize,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// The uploads a job continuation carries from admission to staging.
#[derive(Debug, Clone, Default)]
pub struct Uploads {
    pub images: Vec<ImageUpload>,
    pub audio: Option<AudioUpload>,
}

/// Directories (and the audio file, if any) staged for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAssets {
    pub root: PathBuf,
    pub images_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub output_dir: PathBuf,
    pub audio_file: Option<PathBuf>,
}

/// A path the purge could not remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of [`FileStager::purge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub existed: bool,
    pub removed: usize,
    pub failures: Vec<PurgeFailure>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FileStager {
    root: PathBuf,
    remove: RemoveFn,
}

impl FileStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remove: remove_entry,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_remover(root: impl Into<PathBuf>, remove: RemoveFn) -> Self {
        Self {
            root: root.into(),
            remove,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_root(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// The staged layout for `job_id`, without touching the filesystem.
    pub fn layout(&self, job_id: JobId, audio_filename: Option<&str>) -> StagedAssets {
        let root = self.job_root(job_id);
        let audio_dir = root.join("audio");
        StagedAssets {
            images_dir: root.join("images"),
            output_dir: root.join("output"),
            audio_file: audio_filename.map(|name| audio_dir.join(sanitize_filename(name))),
            audio_dir,
            root,
        }
    }

    /// Writes a job's uploads to disk and returns where they landed.
    ///
    /// Directory creation is idempotent. A failed write aborts staging but
    /// leaves whatever was already written; callers purge on failure.
    pub async fn stage(&self, job_id: JobId, uploads: &Uploads) -> Result<StagedAssets, StagingError> {
        if uploads.images.is_empty() {
            return Err(StagingError::NoImages);
        }

        let assets = self.layout(
            job_id,
            uploads.audio.as_ref().map(|a| a.filename.as_str()),
        );

        for dir in [&assets.images_dir, &assets.audio_dir, &assets.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StagingError::io(dir, e))?;
        }
        debug!(job_id, root = %assets.root.display(), "created staging directories");

        let mut images: Vec<&ImageUpload> = uploads.images.iter().collect();
        images.sort_by_key(|image| image.order);

        for image in images {
            let path = assets.images_dir.join(image_filename(image));
            tokio::fs::write(&path, &image.data)
                .await
                .map_err(|e| StagingError::io(&path, e))?;
            debug!(job_id, order = image.order, path = %path.display(), "staged image");
        }

        if let (Some(audio), Some(path)) = (&uploads.audio, &assets.audio_file) {
            tokio::fs::write(path, &audio.data)
                .await
                .map_err(|e| StagingError::io(path, e))?;
            debug!(job_id, path = %path.display(), "staged audio");
        }

        info!(
            job_id,
            images = uploads.images.len(),
            has_audio = uploads.audio.is_some(),
            "staged job assets"
        );
        Ok(assets)
    }

    /// Recursively deletes `{root}/{job_id}`, children before parents.
    ///
    /// A missing directory is not an error. Paths that cannot be removed are
    /// logged and reported, and the remaining deletions still run.
    pub async fn purge(&self, job_id: JobId) -> PurgeReport {
        let root = self.job_root(job_id);
        let remove = self.remove;
        let report = match tokio::task::spawn_blocking({
            let root = root.clone();
            move || purge_tree(&root, remove)
        })
        .await
        {
            Ok(report) => report,
            Err(e) => PurgeReport {
                existed: true,
                removed: 0,
                failures: vec![PurgeFailure {
                    path: root.clone(),
                    error: e.to_string(),
                }],
            },
        };

        if !report.existed {
            warn!(job_id, path = %root.display(), "no staging directory to purge");
        }
        for failure in &report.failures {
            warn!(job_id, path = %failure.path.display(), error = %failure.error, "could not delete");
        }
        info!(job_id, removed = report.removed, failed = report.failures.len(), "purged job assets");
        report
    }

    pub async fn exists(&self, job_id: JobId) -> bool {
        tokio::fs::try_exists(self.job_root(job_id))
            .await
            .unwrap_or(false)
    }
}

fn image_filename(image: &ImageUpload) -> String {
    let ext = image
        .filename
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string());
    format!("image_{:03}.{ext}", image.order)
}

// Keeps only the final path component so an upload cannot escape its directory.
fn sanitize_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_AUDIO_FILENAME.to_string())
}

fn remove_entry(path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn purge_tree(root: &Path, remove: RemoveFn) -> PurgeReport {
    let mut report = PurgeReport::default();
    match std::fs::symlink_metadata(root) {
        Ok(_) => report.existed = true,
        // NotADirectory: some ancestor is a plain file, so the tree cannot exist.
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
            ) =>
        {
            return report;
        }
        Err(e) => {
            report.existed = true;
            report.failures.push(PurgeFailure {
                path: root.to_path_buf(),
                error: e.to_string(),
            });
            return report;
        }
    }

    let mut ordered = Vec::new();
    collect_post_order(root, &mut ordered, &mut report.failures);

    for (path, is_dir) in ordered {
        match remove(&path, is_dir) {
            Ok(()) => report.removed += 1,
            Err(e) => report.failures.push(PurgeFailure {
                path,
                error: e.to_string(),
            }),
        }
    }
    report
}

// Pushes every entry below `dir` before `dir` itself.
fn collect_post_order(dir: &Path, out: &mut Vec<(PathBuf, bool)>, failures: &mut Vec<PurgeFailure>) {
    match std::fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                        if is_dir {
                            collect_post_order(&path, out, failures);
                        } else {
                            out.push((path, false));
                        }
                    }
                    Err(e) => failures.push(PurgeFailure {
                        path: dir.to_path_buf(),
                        error: e.to_string(),
                    }),
                }
            }
            out.push((dir.to_path_buf(), true));
        }
        // A plain file where the job root should be.
        Err(_) if !dir.is_dir() => out.push((dir.to_path_buf(), false)),
        Err(e) => failures.push(PurgeFailure {
            path: dir.to_path_buf(),
            error: e.to_string(),
        }),
    }
}
