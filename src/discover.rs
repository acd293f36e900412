//! Session discovery: find transcripts under `{agents_dir}/*/sessions/`
//! modified within the lookback window.
//!
//! Both plain `.jsonl` transcripts and zstd-archived `.jsonl.zst` ones are
//! picked up.

use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

const TRANSCRIPT_EXTENSIONS: &[&str] = &["jsonl", "jsonl.zst"];

/// Transcripts modified at or after `now - days_back`, sorted by path.
///
/// Files whose metadata cannot be read are skipped with a debug log.
pub fn find_sessions(
    agents_dir: &Path,
    days_back: u32,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>, DiscoverError> {
    let cutoff = Duration::try_days(i64::from(days_back))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(DiscoverError::WindowOutOfRange(days_back))?;
    let base = agents_dir
        .to_str()
        .ok_or_else(|| DiscoverError::NonUtf8Path(agents_dir.to_path_buf()))?;
    let base = glob::Pattern::escape(base);

    let mut sessions = Vec::new();
    for ext in TRANSCRIPT_EXTENSIONS {
        let pattern = format!("{base}/*/sessions/*.{ext}");
        for entry in glob::glob(&pattern)? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable session path");
                    continue;
                }
            };
            let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => DateTime::<Utc>::from(t),
                Err(e) => {
                    tracing::debug!(error = %e, file = %path.display(), "skipping session without mtime");
                    continue;
                }
            };
            if modified >= cutoff {
                sessions.push(path);
            }
        }
    }

    sessions.sort();
    tracing::debug!(
        agents_dir = %agents_dir.display(),
        days_back,
        found = sessions.len(),
        "discovered session transcripts"
    );
    Ok(sessions)
}

/// Errors from session discovery.
#[derive(Debug)]
pub enum DiscoverError {
    Pattern(glob::PatternError),
    NonUtf8Path(PathBuf),
    /// `now - days_back` falls outside the representable date range.
    WindowOutOfRange(u32),
}

impl std::fmt::Display for DiscoverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoverError::Pattern(e) => write!(f, "invalid session glob: {e}"),
            DiscoverError::NonUtf8Path(p) => {
                write!(f, "agents directory is not valid UTF-8: {}", p.display())
            }
            DiscoverError::WindowOutOfRange(days) => {
                write!(f, "lookback window of {days} days is out of range")
            }
        }
    }
}

impl std::error::Error for DiscoverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoverError::Pattern(e) => Some(e),
            DiscoverError::NonUtf8Path(_) | DiscoverError::WindowOutOfRange(_) => None,
        }
    }
}

impl From<glob::PatternError> for DiscoverError {
    fn from(e: glob::PatternError) -> Self {
        DiscoverError::Pattern(e)
    }
}
