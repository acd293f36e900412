mod classify;
mod config;
mod discover;
mod ingest;
mod report;
mod score;
mod signals;
mod summary;

use clap::Parser;
use config::{ConfigError, QualityConfig, ScoringConfig};
use discover::DiscoverError;
use report::{ReportError, ReportRow};
use score::ScoredSession;
use std::path::PathBuf;
use std::process::ExitCode;
use summary::Summary;
use tracing_subscriber::EnvFilter;

/// Retroactively score recorded agent-session transcripts for quality and
/// flag low-quality, cost-incurring sessions for review.
#[derive(Parser, Debug)]
#[command(name = "session-quality", version, about)]
pub struct Cli {
    /// Transcript files to score (skips discovery)
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "quality.toml")]
    config: PathBuf,

    /// Agents directory to scan (overrides config)
    #[arg(long)]
    agents_dir: Option<PathBuf>,

    /// Output directory for reports (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Lookback window in days (overrides config)
    #[arg(long)]
    days: Option<u32>,

    /// Validate config and print resolved settings, don't score
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-session scores, skipped files)
    #[arg(short, long)]
    verbose: bool,

    /// Only errors; no console summary
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "session-quality failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn run(cli: &Cli) -> Result<(), RunError> {
    let mut config = QualityConfig::load(&cli.config)?;
    apply_overrides(&mut config, cli);
    config.validate()?;

    if cli.dry_run {
        print_settings(&config);
        return Ok(());
    }

    let paths = if cli.files.is_empty() {
        let agents_dir = config.agents_dir();
        tracing::info!(
            agents_dir = %agents_dir.display(),
            days_back = config.discovery.days_back,
            "scanning for session transcripts"
        );
        discover::find_sessions(&agents_dir, config.discovery.days_back, chrono::Utc::now())?
    } else {
        cli.files.clone()
    };
    tracing::info!(count = paths.len(), "found session transcripts");

    let mut sessions = score_all(&paths, &config.scoring);
    report::sort_worst_first(&mut sessions);
    let rows: Vec<ReportRow> = sessions.iter().map(ReportRow::from_scored).collect();

    let jsonl_path = config.jsonl_path();
    let csv_path = config.csv_path();
    report::write_jsonl(&jsonl_path, &rows)?;
    if !rows.is_empty() {
        report::write_csv(&csv_path, &rows)?;
    }

    let summary = Summary::build(&sessions, &config);
    tracing::info!(
        sessions = summary.sessions,
        parse_errors = summary.parse_errors,
        alerts = summary.alerts,
        "scoring complete"
    );

    if !cli.quiet {
        print!("{summary}");
        println!("Output files:");
        println!("  JSONL: {}", jsonl_path.display());
        if !rows.is_empty() {
            println!("  CSV:   {}", csv_path.display());
        }
    }
    Ok(())
}

/// Parse and score each transcript independently. A transcript that cannot
/// be read still yields a (partial) scored session carrying its parse error.
fn score_all(paths: &[PathBuf], scoring: &ScoringConfig) -> Vec<ScoredSession> {
    paths
        .iter()
        .map(|path| score::score_session(ingest::parse_session_file(path), scoring))
        .collect()
}

fn apply_overrides(config: &mut QualityConfig, cli: &Cli) {
    if let Some(dir) = &cli.agents_dir {
        config.discovery.agents_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(days) = cli.days {
        config.discovery.days_back = days;
    }
}

fn print_settings(config: &QualityConfig) {
    println!("session-quality v{}", env!("CARGO_PKG_VERSION"));
    println!("Agents dir:   {}", config.agents_dir().display());
    println!("Lookback:     {} days", config.discovery.days_back);
    println!("JSONL report: {}", config.jsonl_path().display());
    println!("CSV report:   {}", config.csv_path().display());
    println!(
        "Alert:        Q < {} and cost > ${}",
        config.scoring.alert.quality_threshold, config.scoring.alert.cost_threshold
    );
    println!("Weights (completion, execution, efficiency, outcome):");
    for (task_type, w) in config.scoring.weights.iter() {
        println!(
            "  {:12} {:.2} {:.2} {:.2} {:.2}",
            task_type.as_str(),
            w.completion,
            w.execution,
            w.efficiency,
            w.outcome
        );
    }
    println!("Dry run mode - config validated, not scoring.");
}

/// Errors that abort a scoring run.
#[derive(Debug)]
enum RunError {
    Config(ConfigError),
    Discover(DiscoverError),
    Report(ReportError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{e}"),
            RunError::Discover(e) => write!(f, "{e}"),
            RunError::Report(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::Discover(e) => Some(e),
            RunError::Report(e) => Some(e),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Config(e)
    }
}

impl From<DiscoverError> for RunError {
    fn from(e: DiscoverError) -> Self {
        RunError::Discover(e)
    }
}

impl From<ReportError> for RunError {
    fn from(e: ReportError) -> Self {
        RunError::Report(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TaskType;
    use crate::score::QualityLabel;
    use serde_json::Value;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_session(root: &Path, agent: &str, name: &str, lines: &[&str]) -> PathBuf {
        let dir = root.join("agents").join(agent).join("sessions");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("session-quality").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_overrides_config() {
        let cli = cli(&["--agents-dir", "/srv/agents", "-o", "/tmp/q", "--days", "3", "-v"]);
        let mut config = QualityConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.discovery.agents_dir, PathBuf::from("/srv/agents"));
        assert_eq!(config.output.dir, PathBuf::from("/tmp/q"));
        assert_eq!(config.discovery.days_back, 3);
        assert!(cli.verbose);
        assert!(cli.files.is_empty());
    }

    #[test]
    fn cli_accepts_explicit_files() {
        let cli = cli(&["a.jsonl", "b.jsonl.zst", "--dry-run"]);
        assert_eq!(cli.files.len(), 2);
        assert!(cli.dry_run);
        assert_eq!(cli.config, PathBuf::from("quality.toml"));
    }

    #[test]
    fn coding_session_end_to_end() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            dir.path(),
            "dev",
            "s1.jsonl",
            &[
                r#"{"type":"session","id":"sess-coding-1","timestamp":"2026-02-20T09:00:00Z"}"#,
                r#"{"type":"model_change","modelId":"claude-sonnet-4-5","provider":"anthropic"}"#,
                r#"{"type":"message","message":{"role":"user","content":"Please fix the failing test in parser.rs"}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"toolUse","content":[{"type":"text","text":"Looking."},{"type":"toolCall","name":"read","id":"c1"}],"usage":{"input":2000,"output":300,"cacheRead":0,"cost":{"total":0.02}}}}"#,
                r#"{"type":"message","message":{"role":"toolResult","toolCallId":"c1","content":[{"type":"text","text":"fn parse() {}"}]}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"toolUse","content":[{"type":"toolCall","name":"edit","id":"c2"}],"usage":{"input":2500,"output":200,"cost":0.01}}}"#,
                r#"{"type":"message","message":{"role":"toolResult","toolCallId":"c2","content":"ok"}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"stop","content":[{"type":"text","text":"Fixed the off-by-one in parse()."}],"usage":{"input":2600,"output":100,"cost":{"breakdown":true}}}}"#,
            ],
        );

        let sessions = score_all(&[path], &ScoringConfig::default());
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.task_type, TaskType::Coding);
        assert_eq!(s.signals.agent_id.as_deref(), Some("dev"));
        assert_eq!(s.signals.tool_calls_total, 2);
        assert_eq!(s.signals.tool_calls_success, 2);
        assert_eq!(s.signals.artifacts_produced, 1);
        assert!((s.signals.total_cost - 0.03).abs() < 1e-9);
        assert!((s.scores.execution - 1.0).abs() < 1e-9);
        assert_eq!(s.scores.outcome, 0.6);
        assert!(s.quality_score > 0.75);
        assert!(!s.alert);
    }

    #[test]
    fn failing_session_raises_alert() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            dir.path(),
            "ops",
            "s2.jsonl",
            &[
                r#"{"type":"session","id":"sess-ops-failure"}"#,
                r#"{"type":"model_change","modelId":"claude-opus-4-6","provider":"anthropic"}"#,
                r#"{"type":"message","message":{"role":"user","content":"Restart the web service"}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"toolUse","content":[{"type":"toolCall","name":"exec","id":"a"}],"usage":{"input":50000,"output":100,"cost":0.3}}}"#,
                r#"{"type":"message","message":{"role":"toolResult","toolCallId":"a","isError":true,"content":"permission denied"}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"toolUse","content":[{"type":"toolCall","name":"exec","id":"b"}],"usage":{"input":60000,"output":100,"cost":0.3}}}"#,
                r#"{"type":"message","message":{"role":"toolResult","toolCallId":"b","content":"{\"status\": \"error\"}"}}"#,
                r#"{"type":"message","message":{"role":"user","content":"No, that's not right"}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"error","content":""}}"#,
            ],
        );

        let sessions = score_all(&[path], &ScoringConfig::default());
        let s = &sessions[0];
        assert_eq!(s.task_type, TaskType::Operations);
        assert_eq!(s.signals.tool_calls_error, 2);
        assert_eq!(s.signals.user_corrections, 1);
        assert!(s.quality_score < 0.40, "score {}", s.quality_score);
        assert_eq!(s.quality_label, QualityLabel::Failed);
        assert!(s.alert);
    }

    #[test]
    fn unreadable_session_does_not_stop_batch() {
        let dir = TempDir::new().unwrap();
        let good = write_session(
            dir.path(),
            "main",
            "ok.jsonl",
            &[r#"{"type":"message","message":{"role":"assistant","stopReason":"stop","content":"HEARTBEAT_OK"}}"#],
        );
        let missing = dir.path().join("agents/main/sessions/gone.jsonl");

        let sessions = score_all(&[missing, good], &ScoringConfig::default());
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].signals.parse_error.is_some());
        assert!(sessions[1].signals.parse_error.is_none());
        assert_eq!(sessions[1].task_type, TaskType::Heartbeat);
        assert_eq!(sessions[1].scores.outcome, 0.8);
    }

    #[test]
    fn run_writes_reports_worst_first() {
        let dir = TempDir::new().unwrap();
        write_session(
            dir.path(),
            "main",
            "good.jsonl",
            &[
                r#"{"type":"session","id":"good"}"#,
                r#"{"type":"message","message":{"role":"user","content":"tell me a story"}}"#,
                &format!(
                    r#"{{"type":"message","message":{{"role":"assistant","stopReason":"stop","content":"{}","usage":{{"cost":0.05}}}}}}"#,
                    "once upon a time ".repeat(20)
                ),
            ],
        );
        write_session(
            dir.path(),
            "main",
            "bad.jsonl",
            &[
                r#"{"type":"session","id":"bad"}"#,
                r#"{"type":"message","message":{"role":"user","content":"tell me a story"}}"#,
                r#"{"type":"message","message":{"role":"assistant","stopReason":"aborted","content":"","usage":{"cost":0.2}}}"#,
            ],
        );

        let out = dir.path().join("out");
        let cli = cli(&[
            "--config",
            dir.path().join("missing.toml").to_str().unwrap(),
            "--agents-dir",
            dir.path().join("agents").to_str().unwrap(),
            "--output-dir",
            out.to_str().unwrap(),
            "--quiet",
        ]);
        run(&cli).unwrap();

        let jsonl = std::fs::read_to_string(out.join("quality-scores-7d.jsonl")).unwrap();
        let rows: Vec<Value> = jsonl.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["session_id"], "bad");
        assert_eq!(rows[1]["session_id"], "good");
        assert!(rows[0]["quality_score"].as_f64() <= rows[1]["quality_score"].as_f64());

        let csv = std::fs::read_to_string(out.join("quality-scores-7d.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn run_with_invalid_config_fails() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("quality.toml");
        std::fs::write(&config_path, "[scoring.alert]\nquality_threshold = -2.0\n").unwrap();
        let cli = cli(&["--config", config_path.to_str().unwrap(), "--dry-run"]);
        assert!(matches!(run(&cli), Err(RunError::Config(_))));
    }
}
