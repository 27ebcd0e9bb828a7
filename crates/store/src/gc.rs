//! Size-bounded garbage collection for the local cache.
//!
//! The collector measures the cumulative size of a filtered file set under a
//! root and evicts oldest files first until the set fits the byte budget.
//! Two safety rules are load-bearing and deliberately literal:
//!
//! - The single most-recently-modified file is never a candidate, even if
//!   the budget is still exceeded afterwards (an asset mid-use must survive
//!   a sweep).
//! - A candidate is only evicted while doing so still leaves the set *over*
//!   budget; the sweep stops before the deletion that would drop it under.
//!
//! Only the local cache is ever swept. The shared tier's lifecycle is
//! externally managed.

use crate::error::Result;
use crate::tier::disk::map_io_error;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::instrument;

/// Which files under the root count towards the budget (and may be evicted).
#[derive(Clone, Debug, Default)]
pub enum GcFilter {
    /// Every file.
    #[default]
    All,
    /// Only files whose extension matches one of these (case-insensitive,
    /// no leading dot).
    Extensions(Vec<String>),
}

impl GcFilter {
    fn matches(&self, path: &Path) -> bool {
        match self {
            GcFilter::All => true,
            GcFilter::Extensions(extensions) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))),
        }
    }
}

/// Byte budget and file-selection predicate, configured once and re-evaluated
/// on each invocation.
#[derive(Clone, Debug)]
pub struct GcBudget {
    pub max_bytes: u64,
    pub filter: GcFilter,
}

impl GcBudget {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes, filter: GcFilter::All }
    }

    pub fn with_filter(mut self, filter: GcFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// What a sweep actually freed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcReport {
    pub files_removed: u64,
    pub bytes_freed: u64,
}

struct Candidate {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// Run one sweep under `root`.
///
/// Per-file deletion failures are logged and skipped; a stuck file must not
/// abort the rest of the sweep.
#[instrument(skip_all, fields(root = %root.as_ref().display(), max_bytes = budget.max_bytes))]
pub async fn collect_garbage(root: impl AsRef<Path>, budget: &GcBudget) -> Result<GcReport> {
    let mut files = walk(root.as_ref(), &budget.filter).await?;
    let mut total: u64 = files.iter().map(|f| f.size).sum();
    let mut report = GcReport::default();
    if total <= budget.max_bytes {
        return Ok(report);
    }

    // Oldest first; path as tiebreak so equal timestamps stay deterministic.
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    // The newest file is off the table entirely.
    files.pop();

    for candidate in files {
        if total.saturating_sub(candidate.size) <= budget.max_bytes {
            break;
        }
        match fs::remove_file(&candidate.path).await {
            Ok(()) => {
                total -= candidate.size;
                report.files_removed += 1;
                report.bytes_freed += candidate.size;
                tracing::debug!(path = %candidate.path.display(), size = candidate.size, "Evicted from cache");
            },
            Err(e) => {
                tracing::warn!(path = %candidate.path.display(), error = %e, "Could not evict file; skipping");
            },
        }
    }
    tracing::info!(files = report.files_removed, bytes = report.bytes_freed, remaining = total, "Cache sweep finished");
    Ok(report)
}

async fn walk(root: &Path, filter: &GcFilter) -> Result<Vec<Candidate>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            // A root that doesn't exist yet is just an empty cache.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => Err(map_io_error(e, &current))?,
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io_error(e, &current))? {
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| map_io_error(e, &path))?;
            if metadata.is_dir() {
                stack.push(path);
            } else if metadata.is_file() && filter.matches(&path) {
                let modified = metadata.modified().map_err(|e| map_io_error(e, &path))?;
                files.push(Candidate { path, size: metadata.len(), modified });
            }
        }
    }
    Ok(files)
}
