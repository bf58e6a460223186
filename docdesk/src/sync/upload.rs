use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docdesk_core::{ApiErrorClass, DeskError, DocumentRecord, UploadRequest};
use futures_util::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

use super::cache::Location;
use super::coordinator::FolderError;
use super::engine::SyncEngine;
use super::paths::{PathError, folder_segments, relative_segments};

pub const SUPPORTED_MIME_TYPES: &[&str] =
    &["application/pdf", "image/jpeg", "image/jpg", "image/png"];
pub const FALLBACK_ROOT_NAME: &str = "Uploaded files";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("an identical upload batch is still running")]
    BatchInProgress,
    #[error("folder error: {0}")]
    Folder(#[from] FolderError),
    #[error("api error: {0}")]
    Api(#[from] DeskError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            UploadError::Folder(err) => Some(err.classification()),
            UploadError::Api(err) => Some(err.classification()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    Path(PathBuf),
    Memory(Vec<u8>),
}

/// One file of a batch, with the relative path it was picked with ("A/B/file.pdf").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub relative_path: Option<String>,
    pub mime_type: Option<String>,
    pub size: u64,
    pub source: UploadSource,
}

impl UploadFile {
    pub fn from_bytes(name: &str, relative_path: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            relative_path: relative_path.map(str::to_string),
            mime_type: None,
            size: bytes.len() as u64,
            source: UploadSource::Memory(bytes),
        }
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_string());
        self
    }

    /// Declared type, or one guessed from the file name.
    pub fn resolved_mime_type(&self) -> String {
        match &self.mime_type {
            Some(mime) if !mime.trim().is_empty() => mime.trim().to_ascii_lowercase(),
            _ => mime_guess::from_path(&self.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        }
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_MIME_TYPES.contains(&self.resolved_mime_type().as_str())
    }

    pub fn display_path(&self) -> &str {
        self.relative_path.as_deref().unwrap_or(&self.name)
    }

    async fn read_bytes(&self) -> Result<Vec<u8>, std::io::Error> {
        match &self.source {
            UploadSource::Path(path) => tokio::fs::read(path).await,
            UploadSource::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    pub concurrency: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(Option<DocumentRecord>),
    /// The server already had the file.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub file: String,
    pub message: String,
    pub class: Option<ApiErrorClass>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub root: Option<Location>,
    pub root_name: Option<String>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub unsupported: usize,
    pub failures: Vec<UploadFailure>,
}

impl UploadSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped, {} failed",
            self.succeeded, self.skipped, self.failed
        )?;
        if self.unsupported > 0 {
            write!(f, ", {} unsupported", self.unsupported)?;
        }
        Ok(())
    }
}

/// State shared by every file notification of one batch. The root folder is resolved at
/// most once per session no matter how many files arrive concurrently.
pub struct UploadSession {
    engine: SyncEngine,
    target: Location,
    root_name: String,
    root: OnceCell<Location>,
    touched: Mutex<BTreeSet<Location>>,
}

impl UploadSession {
    pub fn new(engine: SyncEngine, target: Location, root_name: impl Into<String>) -> Self {
        Self {
            engine,
            target,
            root_name: root_name.into(),
            root: OnceCell::new(),
            touched: Mutex::new(BTreeSet::from([target])),
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub async fn root(&self) -> Result<Location, FolderError> {
        let root = self
            .root
            .get_or_try_init(|| async {
                let record = self.engine.ensure_folder(self.target, &self.root_name).await?;
                Ok::<_, FolderError>(Location::Folder(record.id))
            })
            .await?;
        Ok(*root)
    }

    pub async fn upload_file(&self, file: &UploadFile) -> Result<UploadOutcome, UploadError> {
        let root = self.root().await?;
        let segments = match &file.relative_path {
            Some(relative_path) => folder_segments(relative_path, &self.root_name)?,
            None => Vec::new(),
        };
        self.touched.lock().insert(root);
        let mut folder = root;
        for segment in &segments {
            let record = self.engine.ensure_folder(folder, segment).await?;
            folder = Location::Folder(record.id);
            self.touched.lock().insert(folder);
        }

        let request = UploadRequest {
            file_name: file.name.clone(),
            mime_type: file.resolved_mime_type(),
            bytes: file.read_bytes().await?,
            folder_id: folder.folder_id(),
        };
        match self.engine.client().upload_document(request).await {
            Ok(receipt) if receipt.is_duplicate() => {
                debug!(file = file.display_path(), "file already exists, skipped");
                Ok(UploadOutcome::Skipped)
            }
            Ok(receipt) => {
                debug!(file = file.display_path(), %folder, "file uploaded");
                Ok(UploadOutcome::Uploaded(receipt.document))
            }
            Err(err) if err.is_duplicate_file() => {
                debug!(file = file.display_path(), "file already exists, skipped");
                Ok(UploadOutcome::Skipped)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Re-lists every folder the batch wrote into. Refresh failures are logged only.
    pub async fn finish(self) -> BTreeSet<Location> {
        let touched = self.touched.into_inner();
        for location in &touched {
            if let Err(err) = self.engine.refresh_children(*location).await {
                warn!(%location, error = %err, "failed to refresh folder after upload");
            }
        }
        touched
    }
}

struct ActiveBatch {
    active: Arc<Mutex<HashSet<String>>>,
    fingerprint: String,
}

impl Drop for ActiveBatch {
    fn drop(&mut self) {
        self.active.lock().remove(&self.fingerprint);
    }
}

/// Turns a flat file list into folders and uploads with partial-failure semantics.
#[derive(Clone)]
pub struct UploadPipeline {
    engine: SyncEngine,
    limit: Arc<Semaphore>,
    active: Arc<Mutex<HashSet<String>>>,
}

impl UploadPipeline {
    pub fn new(engine: SyncEngine, settings: UploadSettings) -> Self {
        Self {
            engine,
            limit: Arc::new(Semaphore::new(settings.concurrency.max(1))),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub async fn upload_batch(
        &self,
        target: Location,
        files: Vec<UploadFile>,
    ) -> Result<UploadSummary, UploadError> {
        let (supported, unsupported): (Vec<_>, Vec<_>) =
            files.into_iter().partition(UploadFile::is_supported);
        for file in &unsupported {
            debug!(file = file.display_path(), mime = %file.resolved_mime_type(), "unsupported file type");
        }
        if supported.is_empty() {
            warn!(unsupported = unsupported.len(), "no supported files in upload batch");
            return Ok(UploadSummary {
                unsupported: unsupported.len(),
                ..UploadSummary::default()
            });
        }

        let _batch = self.begin_batch(batch_fingerprint(&supported))?;
        let root_name = upload_root_name(&supported);
        let session = UploadSession::new(self.engine.clone(), target, root_name.clone());
        let root = session.root().await?;
        info!(%target, root = %root, root_name = %root_name, files = supported.len(), "upload batch started");

        let uploads = supported.iter().map(|file| {
            let session = &session;
            async move {
                let _permit = self.limit.acquire().await.ok();
                (file, session.upload_file(file).await)
            }
        });
        let results = join_all(uploads).await;

        let mut summary = UploadSummary {
            root: Some(root),
            root_name: Some(root_name),
            unsupported: unsupported.len(),
            ..UploadSummary::default()
        };
        for (file, result) in results {
            match result {
                Ok(UploadOutcome::Uploaded(_)) => summary.succeeded += 1,
                Ok(UploadOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    warn!(file = file.display_path(), error = %err, "file upload failed");
                    summary.failed += 1;
                    summary.failures.push(UploadFailure {
                        file: file.display_path().to_string(),
                        message: err.to_string(),
                        class: err.classification(),
                    });
                }
            }
        }

        session.finish().await;
        info!(%summary, "upload batch finished");
        Ok(summary)
    }

    fn begin_batch(&self, fingerprint: String) -> Result<ActiveBatch, UploadError> {
        let mut active = self.active.lock();
        if !active.insert(fingerprint.clone()) {
            return Err(UploadError::BatchInProgress);
        }
        Ok(ActiveBatch {
            active: self.active.clone(),
            fingerprint,
        })
    }
}

/// First segment of the first nested relative path, else the stem of a lone file.
pub fn upload_root_name(files: &[UploadFile]) -> String {
    let nested_root = files
        .iter()
        .filter_map(|file| file.relative_path.as_deref())
        .filter(|path| path.contains('/'))
        .find_map(|path| {
            relative_segments(path)
                .ok()
                .filter(|segments| segments.len() > 1)
                .and_then(|segments| segments.into_iter().next())
        });
    if let Some(root) = nested_root {
        return root;
    }
    if let [single] = files
        && let Some(stem) = Path::new(&single.name).file_stem()
    {
        return stem.to_string_lossy().into_owned();
    }
    FALLBACK_ROOT_NAME.to_string()
}

fn batch_fingerprint(files: &[UploadFile]) -> String {
    let mut parts: Vec<String> = files
        .iter()
        .map(|file| format!("{}-{}", file.display_path(), file.size))
        .collect();
    parts.sort();
    parts.join(",")
}
