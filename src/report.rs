/// Report output: one JSONL row per scored session plus a reduced CSV.
///
/// Uses the atomic write pattern: write a temp file in the destination
/// directory, then rename over the target.
use crate::score::ScoredSession;
use serde::Serialize;
use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One scored session as written to the JSONL report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub session_id: Option<String>,
    pub agent_id: String,
    pub timestamp: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub thinking_level: Option<String>,
    pub trigger_type: Option<String>,
    pub task_type: String,
    pub quality_score: f64,
    pub quality_label: String,
    pub score_completion: f64,
    pub score_execution: f64,
    pub score_efficiency: f64,
    pub score_outcome: f64,
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_read: u64,
    pub tool_calls_total: u64,
    pub tool_calls_success: u64,
    pub tool_calls_error: u64,
    pub tool_calls_first_attempt: u64,
    pub assistant_turns: u64,
    pub user_turns: u64,
    pub artifacts_produced: u64,
    pub user_corrections: u64,
    pub has_compaction: bool,
    pub compaction_count: u64,
    pub spawn_count: u64,
    pub spawn_success: u64,
    pub final_stop_reason: String,
    pub alert: bool,
    pub parse_error: Option<String>,
    /// Not tracked yet; always null.
    pub parent_session_id: Option<String>,
    pub roi: Option<f64>,
}

impl ReportRow {
    pub fn from_scored(scored: &ScoredSession) -> Self {
        let s = &scored.signals;
        Self {
            session_id: s.session_id.clone(),
            agent_id: s.agent_id.clone().unwrap_or_else(|| "unknown".to_string()),
            timestamp: s.timestamp.clone(),
            model: s.model.clone(),
            provider: s.provider.clone(),
            thinking_level: s.thinking_level.clone(),
            trigger_type: s.trigger_type.clone(),
            task_type: scored.task_type.to_string(),
            quality_score: scored.quality_score,
            quality_label: scored.quality_label.to_string(),
            score_completion: scored.scores.completion,
            score_execution: scored.scores.execution,
            score_efficiency: scored.scores.efficiency,
            score_outcome: scored.scores.outcome,
            total_cost: s.total_cost,
            total_input_tokens: s.input_tokens,
            total_output_tokens: s.output_tokens,
            total_cache_read: s.cache_read_tokens,
            tool_calls_total: s.tool_calls_total,
            tool_calls_success: s.tool_calls_success,
            tool_calls_error: s.tool_calls_error,
            tool_calls_first_attempt: s.tool_calls_first_attempt,
            assistant_turns: s.assistant_turns,
            user_turns: s.user_turns,
            artifacts_produced: s.artifacts_produced,
            user_corrections: s.user_corrections,
            has_compaction: s.has_compaction,
            compaction_count: s.compaction_count,
            spawn_count: s.spawn_count,
            spawn_success: s.spawn_success,
            final_stop_reason: s.final_stop_reason.clone(),
            alert: scored.alert,
            parse_error: s.parse_error.clone(),
            parent_session_id: None,
            roi: scored.roi(),
        }
    }
}

/// Sort worst sessions first. Stable, so ties keep discovery order.
pub fn sort_worst_first(sessions: &mut [ScoredSession]) {
    sessions.sort_by(|a, b| a.quality_score.total_cmp(&b.quality_score));
}

const CSV_COLUMNS: &[&str] = &[
    "session_id",
    "agent_id",
    "timestamp",
    "model",
    "provider",
    "task_type",
    "quality_score",
    "quality_label",
    "score_completion",
    "score_execution",
    "score_efficiency",
    "score_outcome",
    "total_cost",
    "roi",
    "total_input_tokens",
    "total_output_tokens",
    "tool_calls_total",
    "tool_calls_success",
    "tool_calls_error",
    "assistant_turns",
    "artifacts_produced",
    "alert",
];

fn csv_record(r: &ReportRow) -> Vec<String> {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        opt(&r.session_id),
        r.agent_id.clone(),
        opt(&r.timestamp),
        opt(&r.model),
        opt(&r.provider),
        r.task_type.clone(),
        r.quality_score.to_string(),
        r.quality_label.clone(),
        r.score_completion.to_string(),
        r.score_execution.to_string(),
        r.score_efficiency.to_string(),
        r.score_outcome.to_string(),
        r.total_cost.to_string(),
        r.roi.map(|v| v.to_string()).unwrap_or_default(),
        r.total_input_tokens.to_string(),
        r.total_output_tokens.to_string(),
        r.tool_calls_total.to_string(),
        r.tool_calls_success.to_string(),
        r.tool_calls_error.to_string(),
        r.assistant_turns.to_string(),
        r.artifacts_produced.to_string(),
        r.alert.to_string(),
    ]
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn csv_line(fields: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    let mut line = fields
        .into_iter()
        .map(|f| csv_field(f.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

/// Render the reduced CSV report, header included.
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = csv_line(CSV_COLUMNS);
    for row in rows {
        out.push_str(&csv_line(csv_record(row)));
    }
    out
}

/// Render the JSONL report: one serialized `ReportRow` per line.
pub fn render_jsonl(rows: &[ReportRow]) -> Result<String, ReportError> {
    let mut out = String::new();
    for row in rows {
        let line = serde_json::to_string(row).map_err(|e| ReportError::Serialize { source: e })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

pub fn write_jsonl(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    write_atomic(path, render_jsonl(rows)?.as_bytes())
}

pub fn write_csv(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    write_atomic(path, render_csv(rows).as_bytes())
}

/// Write `contents` to a temp file beside `path`, then rename it into place
/// so readers never see a partial report.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| ReportError::CreateDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let write_err = |e: std::io::Error| ReportError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote report");
    Ok(())
}

/// Errors from report output.
#[derive(Debug)]
pub enum ReportError {
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize {
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::CreateDir { path, source } => {
                write!(f, "failed to create output directory {}: {}", path.display(), source)
            }
            ReportError::Write { path, source } => {
                write!(f, "failed to write report {}: {}", path.display(), source)
            }
            ReportError::Serialize { source } => {
                write!(f, "failed to serialize report row: {}", source)
            }
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::CreateDir { source, .. } => Some(source),
            ReportError::Write { source, .. } => Some(source),
            ReportError::Serialize { source } => Some(source),
        }
    }
}
