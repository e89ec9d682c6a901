//! Download Orchestrator
//!
//! Turns the file nodes of a resolved material tree into download tasks and
//! runs them on a bounded pool of concurrent fetches.
//!
//! - a destination that already exists with a non-zero size is reused, not fetched
//! - bytes are streamed into `<name>.part` and renamed into place when complete
//! - transient failures are retried with exponential backoff
//! - a rejected session poisons the run: queued tasks are not started
//! - cancellation stops new tasks; in-flight ones finish or fail

use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::core::client::ContentFetcher;
use crate::core::material::MaterialNode;
use crate::core::CancelFlag;
use crate::error::{AuthFailure, FetchError, UforaError};

pub const DOWNLOAD_CONCURRENCY: usize = 4;
/// Attempts per file, including the first one
pub const MAX_ATTEMPTS: u32 = 2;
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed(String),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "PENDING"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Done => write!(f, "DONE"),
            TaskStatus::Failed(reason) => write!(f, "FAILED ({})", reason),
        }
    }
}

/// One file to materialise on disk
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub source: MaterialNode,
    /// Path relative to the destination root, used in reports
    pub relative: PathBuf,
    pub destination: PathBuf,
    pub status: TaskStatus,
    pub attempts: u32,
    /// True when an existing file was kept instead of fetching
    pub reused: bool,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: DOWNLOAD_CONCURRENCY,
            max_attempts: MAX_ATTEMPTS,
            initial_backoff: INITIAL_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    SessionInvalidated,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub path: PathBuf,
    pub status: TaskStatus,
    pub attempts: u32,
    pub reused: bool,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// No files were selected
    Nothing,
    Complete,
    Partial,
    Failed,
}

/// Per-file results of one orchestrator run, ordered by path
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub entries: Vec<ReportEntry>,
    pub aborted: Option<AbortReason>,
    /// Network fetch attempts issued, retries included
    pub fetches: usize,
}

impl DownloadReport {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn done(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.status == TaskStatus::Done)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, TaskStatus::Failed(_)))
    }

    pub fn reused_count(&self) -> usize {
        self.done().filter(|e| e.reused).count()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.done().map(|e| e.bytes).sum()
    }

    pub fn outcome(&self) -> DownloadOutcome {
        let failed = self.failed().count();
        match (self.total(), failed) {
            (0, _) => DownloadOutcome::Nothing,
            (_, 0) => DownloadOutcome::Complete,
            (total, failed) if failed == total => DownloadOutcome::Failed,
            _ => DownloadOutcome::Partial,
        }
    }

    /// Map the report onto the crate error used for exit codes
    pub fn ensure_success(&self) -> crate::Result<()> {
        if self.aborted == Some(AbortReason::SessionInvalidated) {
            return Err(UforaError::Auth(AuthFailure::SessionInvalid));
        }

        let failed = self.failed().count();
        match self.outcome() {
            DownloadOutcome::Nothing | DownloadOutcome::Complete => Ok(()),
            DownloadOutcome::Partial => Err(UforaError::PartialDownload {
                failed,
                total: self.total(),
            }),
            DownloadOutcome::Failed => Err(UforaError::DownloadFailed { total: self.total() }),
        }
    }
}

type ProgressFn<'a> = Box<dyn Fn(usize, usize) + Send + Sync + 'a>;

pub struct DownloadOrchestrator<'a> {
    fetcher: &'a dyn ContentFetcher,
    options: DownloadOptions,
    cancel_flag: CancelFlag,
    on_progress: Option<ProgressFn<'a>>,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(fetcher: &'a dyn ContentFetcher) -> Self {
        Self {
            fetcher,
            options: DownloadOptions::default(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Share an externally owned cancel flag (e.g. set from a Ctrl+C handler)
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel_flag = flag;
        self
    }

    /// Called with `(finished, total)` after each task settles
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'a,
    {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Download the files under `nodes` into `destination_root`.
    ///
    /// `selector` holds 1-based positions in `nodes`; `None` selects everything.
    pub async fn download(
        &self,
        nodes: &[MaterialNode],
        destination_root: &Path,
        selector: Option<&[usize]>,
    ) -> crate::Result<DownloadReport> {
        let tasks = plan_tasks(nodes, destination_root, selector)?;
        let total = tasks.len();
        log::info!(
            "Downloading {} files into {:?} ({} at a time)",
            total,
            destination_root,
            self.options.concurrency
        );

        let table = Mutex::new(tasks);
        let finished = AtomicUsize::new(0);
        let fetches = AtomicUsize::new(0);

        stream::iter(0..total)
            .map(|index| self.run_task(index, &table, &fetches, &finished, total))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect::<Vec<()>>()
            .await;

        let session_lost = !self.fetcher.session().is_valid();
        let aborted = if session_lost {
            Some(AbortReason::SessionInvalidated)
        } else if self.is_cancelled() {
            Some(AbortReason::Cancelled)
        } else {
            None
        };

        let mut entries: Vec<ReportEntry> = table
            .into_inner()
            .into_iter()
            .map(|task| {
                let status = match task.status {
                    TaskStatus::Pending | TaskStatus::InProgress => TaskStatus::Failed(match aborted {
                        Some(AbortReason::SessionInvalidated) => "not started: session was rejected".to_string(),
                        _ => "not started: download cancelled".to_string(),
                    }),
                    other => other,
                };
                ReportEntry {
                    path: task.relative,
                    status,
                    attempts: task.attempts,
                    reused: task.reused,
                    bytes: task.bytes,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(DownloadReport {
            entries,
            aborted,
            fetches: fetches.into_inner(),
        })
    }

    async fn run_task(
        &self,
        index: usize,
        table: &Mutex<Vec<DownloadTask>>,
        fetches: &AtomicUsize,
        finished: &AtomicUsize,
        total: usize,
    ) {
        if self.is_cancelled() || !self.fetcher.session().is_valid() {
            return;
        }

        let (url, destination) = {
            let mut tasks = table.lock();
            let task = &mut tasks[index];
            task.status = TaskStatus::InProgress;
            (task.source.remote.clone(), task.destination.clone())
        };

        let result = self.materialise(&url, &destination, fetches).await;

        {
            let mut tasks = table.lock();
            let task = &mut tasks[index];
            match result {
                Settled::Reused => {
                    task.status = TaskStatus::Done;
                    task.reused = true;
                }
                Settled::Fetched { bytes, attempts } => {
                    task.status = TaskStatus::Done;
                    task.bytes = bytes;
                    task.attempts = attempts;
                }
                Settled::Failed { reason, attempts } => {
                    log::warn!("Download of {:?} failed: {}", task.relative, reason);
                    task.status = TaskStatus::Failed(reason);
                    task.attempts = attempts;
                }
            }
        }

        let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.on_progress {
            progress(done, total);
        }
    }

    async fn materialise(&self, url: &str, destination: &Path, fetches: &AtomicUsize) -> Settled {
        if let Ok(meta) = tokio::fs::metadata(destination).await {
            if meta.is_file() && meta.len() > 0 {
                log::debug!("Keeping existing {:?}", destination);
                return Settled::Reused;
            }
        }

        let url = match Url::parse(url) {
            Ok(url) => url,
            Err(e) => {
                return Settled::Failed {
                    reason: format!("invalid download URL '{}': {}", url, e),
                    attempts: 0,
                }
            }
        };

        if let Some(parent) = destination.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Settled::Failed {
                    reason: format!("cannot create {:?}: {}", parent, e),
                    attempts: 0,
                };
            }
        }

        let part = part_path(destination);
        let mut attempt = 0;
        loop {
            attempt += 1;
            fetches.fetch_add(1, Ordering::SeqCst);

            let error = match self.fetcher.fetch_to_file(&url, &part).await {
                Ok(bytes) => match tokio::fs::rename(&part, destination).await {
                    Ok(()) => return Settled::Fetched { bytes, attempts: attempt },
                    Err(source) => FetchError::Io {
                        path: destination.to_path_buf(),
                        source,
                    },
                },
                Err(e) => e,
            };

            // Never leave a half-written file behind
            let _ = tokio::fs::remove_file(&part).await;

            if error.is_auth() {
                self.fetcher.session().invalidate();
                return Settled::Failed {
                    reason: "session was rejected by the portal".to_string(),
                    attempts: attempt,
                };
            }

            let can_retry = error.is_transient()
                && attempt < self.options.max_attempts
                && !self.is_cancelled()
                && self.fetcher.session().is_valid();
            if !can_retry {
                return Settled::Failed {
                    reason: error.to_string(),
                    attempts: attempt,
                };
            }

            let delay = self.options.initial_backoff * 2u32.saturating_pow(attempt - 1);
            log::debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                self.options.max_attempts,
                url,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

enum Settled {
    Reused,
    Fetched { bytes: u64, attempts: u32 },
    Failed { reason: String, attempts: u32 },
}

/// Create one task per file node under the selected top-level nodes
pub fn plan_tasks(
    nodes: &[MaterialNode],
    destination_root: &Path,
    selector: Option<&[usize]>,
) -> crate::Result<Vec<DownloadTask>> {
    let selected: Vec<&MaterialNode> = match selector {
        None => nodes.iter().collect(),
        Some(ids) => {
            let mut picked = Vec::with_capacity(ids.len());
            for &id in ids {
                let node = id
                    .checked_sub(1)
                    .and_then(|i| nodes.get(i))
                    .ok_or_else(|| {
                        UforaError::invalid_input(format!(
                            "no entry with id {} (valid ids: 1-{})",
                            id,
                            nodes.len()
                        ))
                    })?;
                if !picked.iter().any(|p: &&MaterialNode| std::ptr::eq(*p, node)) {
                    picked.push(node);
                }
            }
            picked
        }
    };

    let files: Vec<&MaterialNode> = selected.iter().copied().flat_map(|node| node.files()).collect();

    // Directories the mirror will create; a file may not take one of these paths
    let mut seen: HashSet<PathBuf> = files
        .iter()
        .copied()
        .flat_map(|file| file.target.ancestors().skip(1))
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();

    let mut tasks = Vec::new();
    for file in files {
        let relative = unique_path(&mut seen, &file.target);
        tasks.push(DownloadTask {
            source: file.clone(),
            destination: destination_root.join(&relative),
            relative,
            status: TaskStatus::Pending,
            attempts: 0,
            reused: false,
            bytes: 0,
        });
    }

    Ok(tasks)
}

/// Disambiguate files that sanitise to the same path: `a.pdf`, `a (2).pdf`, ...
fn unique_path(seen: &mut HashSet<PathBuf>, path: &Path) -> PathBuf {
    if seen.insert(path.to_path_buf()) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (2..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            path.with_file_name(name)
        })
        .find(|candidate| seen.insert(candidate.clone()))
        .unwrap_or_else(|| path.to_path_buf())
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    destination.with_file_name(name)
}
