use crate::classify::TaskType;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Tolerance when checking that a weight profile sums to 1.0.
const WEIGHT_SUM_TOLERANCE: f64 = 0.001;

/// Longest accepted lookback window (about a century).
pub const MAX_DAYS_BACK: u32 = 36_500;

/// Top-level configuration loaded from `quality.toml`.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    pub discovery: DiscoveryConfig,
    pub output: OutputConfig,
    pub scoring: ScoringConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub agents_dir: PathBuf,
    pub days_back: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

/// Everything the scoring engine reads. Passed explicitly to `score_session`.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub alert: AlertConfig,
    pub weights: WeightTable,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    /// Composite score below which a session is low quality.
    pub quality_threshold: f64,
    /// Accumulated cost (USD) above which a low-quality session is worth review.
    pub cost_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummaryConfig {
    pub top_agents: usize,
    pub worst_alerts: usize,
}

/// Sub-score weights for one task type.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct WeightProfile {
    pub completion: f64,
    pub execution: f64,
    pub efficiency: f64,
    pub outcome: f64,
}

impl WeightProfile {
    pub const fn new(completion: f64, execution: f64, efficiency: f64, outcome: f64) -> Self {
        Self {
            completion,
            execution,
            efficiency,
            outcome,
        }
    }

    pub fn sum(&self) -> f64 {
        self.completion + self.execution + self.efficiency + self.outcome
    }

    fn weights(&self) -> [f64; 4] {
        [self.completion, self.execution, self.efficiency, self.outcome]
    }
}

const CHAT_PROFILE: WeightProfile = WeightProfile::new(0.40, 0.20, 0.25, 0.15);

/// Per-task-type weight profiles.
///
/// A table loaded from config may leave task types out; those fall back to
/// the table's `chat` profile, then to the built-in chat profile.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeightTable(BTreeMap<TaskType, WeightProfile>);

impl WeightTable {
    pub fn new(profiles: impl IntoIterator<Item = (TaskType, WeightProfile)>) -> Self {
        Self(profiles.into_iter().collect())
    }

    pub fn profile(&self, task_type: TaskType) -> WeightProfile {
        self.0
            .get(&task_type)
            .or_else(|| self.0.get(&TaskType::Chat))
            .copied()
            .unwrap_or(CHAT_PROFILE)
    }

    /// Profile for a task-type name; unknown names use the chat profile.
    #[cfg(test)]
    pub fn profile_for_name(&self, name: &str) -> WeightProfile {
        self.profile(TaskType::from_name(name).unwrap_or(TaskType::Chat))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskType, WeightProfile)> + '_ {
        self.0.iter().map(|(t, p)| (*t, *p))
    }
}

// --- Default implementations ---

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            agents_dir: PathBuf::from("~/.openclaw/agents"),
            days_back: 7,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("quality-scores"),
            prefix: "quality-scores".to_string(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.40,
            cost_threshold: 0.10,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_agents: 15,
            worst_alerts: 10,
        }
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::new([
            (TaskType::Coding, WeightProfile::new(0.15, 0.20, 0.15, 0.50)),
            (TaskType::Operations, WeightProfile::new(0.20, 0.30, 0.30, 0.20)),
            (TaskType::Research, WeightProfile::new(0.25, 0.15, 0.20, 0.40)),
            (TaskType::Chat, CHAT_PROFILE),
            (TaskType::Discovery, WeightProfile::new(0.30, 0.15, 0.20, 0.35)),
            (TaskType::Heartbeat, WeightProfile::new(0.30, 0.25, 0.35, 0.10)),
        ])
    }
}

// --- Loading ---

impl QualityConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let config = Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.days_back == 0 {
            return Err(ConfigError::Invalid(
                "discovery.days_back must be at least 1".to_string(),
            ));
        }
        if self.discovery.days_back > MAX_DAYS_BACK {
            return Err(ConfigError::Invalid(format!(
                "discovery.days_back must be at most {MAX_DAYS_BACK}, got {}",
                self.discovery.days_back
            )));
        }
        self.scoring.validate()
    }

    /// Agents directory with a leading `~/` expanded.
    pub fn agents_dir(&self) -> PathBuf {
        expand_home(&self.discovery.agents_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output.dir)
    }

    /// `{dir}/{prefix}-{days}d.jsonl`
    pub fn jsonl_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}-{}d.jsonl", self.output.prefix, self.discovery.days_back))
    }

    /// `{dir}/{prefix}-{days}d.csv`
    pub fn csv_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}-{}d.csv", self.output.prefix, self.discovery.days_back))
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let alert = &self.alert;
        for (name, value) in [
            ("quality_threshold", alert.quality_threshold),
            ("cost_threshold", alert.cost_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "scoring.alert.{name} must be a non-negative number, got {value}"
                )));
            }
        }

        for (task_type, profile) in self.weights.iter() {
            if profile.weights().iter().any(|w| !(0.0..=1.0).contains(w)) {
                return Err(ConfigError::InvalidWeights {
                    task_type,
                    sum: profile.sum(),
                });
            }
            if (profile.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(ConfigError::InvalidWeights {
                    task_type,
                    sum: profile.sum(),
                });
            }
        }
        Ok(())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidWeights {
        task_type: TaskType,
        sum: f64,
    },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::InvalidWeights { task_type, sum } => write!(
                f,
                "weights for {task_type} must each be within [0, 1] and sum to 1.0 (sum is {sum:.4})"
            ),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidWeights { .. } | ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_weight_profiles_sum_to_one() {
        let table = WeightTable::default();
        for task_type in TaskType::ALL {
            let sum = table.profile(task_type).sum();
            assert!((sum - 1.0).abs() < 0.001, "{task_type} sums to {sum}");
        }
        assert!(QualityConfig::default().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let cfg = QualityConfig::default();
        assert_eq!(cfg.discovery.days_back, 7);
        assert_eq!(cfg.scoring.alert.quality_threshold, 0.40);
        assert_eq!(cfg.scoring.alert.cost_threshold, 0.10);
        assert_eq!(cfg.summary.top_agents, 15);
        assert_eq!(cfg.summary.worst_alerts, 10);
        assert_eq!(
            cfg.scoring.weights.profile(TaskType::Coding),
            WeightProfile::new(0.15, 0.20, 0.15, 0.50)
        );
    }

    #[test]
    fn unknown_name_uses_chat_profile() {
        let table = WeightTable::default();
        assert_eq!(table.profile_for_name("gardening"), CHAT_PROFILE);
        assert_eq!(
            table.profile_for_name("heartbeat"),
            WeightProfile::new(0.30, 0.25, 0.35, 0.10)
        );
    }

    #[test]
    fn partial_table_falls_back_to_its_chat_profile() {
        let chat = WeightProfile::new(0.25, 0.25, 0.25, 0.25);
        let table = WeightTable::new([(TaskType::Chat, chat)]);
        assert_eq!(table.profile(TaskType::Coding), chat);

        let empty = WeightTable::new([]);
        assert_eq!(empty.profile(TaskType::Research), CHAT_PROFILE);
    }

    #[test]
    fn parse_partial_toml() {
        let cfg = QualityConfig::from_toml(
            r#"
[discovery]
days_back = 30

[scoring.alert]
cost_threshold = 0.5
"#,
        )
        .unwrap();
        assert_eq!(cfg.discovery.days_back, 30);
        assert_eq!(cfg.scoring.alert.cost_threshold, 0.5);
        assert_eq!(cfg.scoring.alert.quality_threshold, 0.40);
        assert_eq!(cfg.scoring.weights, WeightTable::default());
        assert_eq!(cfg.output.prefix, "quality-scores");
    }

    #[test]
    fn parse_weight_override() {
        let cfg = QualityConfig::from_toml(
            r#"
[scoring.weights.chat]
completion = 0.25
execution = 0.25
efficiency = 0.25
outcome = 0.25

[scoring.weights.coding]
completion = 0.1
execution = 0.1
efficiency = 0.1
outcome = 0.7
"#,
        )
        .unwrap();
        let w = &cfg.scoring.weights;
        assert_eq!(w.profile(TaskType::Coding).outcome, 0.7);
        // Omitted task types use the configured chat profile
        assert_eq!(w.profile(TaskType::Heartbeat), w.profile(TaskType::Chat));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = QualityConfig::from_toml(
            r#"
[scoring.weights.research]
completion = 0.5
execution = 0.5
efficiency = 0.5
outcome = 0.5
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidWeights {
                task_type: TaskType::Research,
                ..
            }
        ));
    }

    #[test]
    fn negative_weight_rejected() {
        let err = QualityConfig::from_toml(
            r#"
[scoring.weights.chat]
completion = 1.2
execution = -0.2
efficiency = 0.0
outcome = 0.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeights { .. }));
    }

    #[test]
    fn unknown_task_type_in_table_is_a_parse_error() {
        let err = QualityConfig::from_toml(
            r#"
[scoring.weights.gardening]
completion = 0.25
execution = 0.25
efficiency = 0.25
outcome = 0.25
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn invalid_thresholds_rejected() {
        let err = QualityConfig::from_toml("[scoring.alert]\ncost_threshold = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = QualityConfig::from_toml("[discovery]\ndays_back = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn lookback_window_is_bounded() {
        let cfg = QualityConfig::from_toml("[discovery]\ndays_back = 36500\n").unwrap();
        assert_eq!(cfg.discovery.days_back, MAX_DAYS_BACK);

        let err = QualityConfig::from_toml("[discovery]\ndays_back = 4000000000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("at most")));

        // CLI overrides go through the same check
        let mut cfg = QualityConfig::default();
        cfg.discovery.days_back = 36501;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let cfg = QualityConfig::load(&dir.path().join("quality.toml")).unwrap();
        assert_eq!(cfg, QualityConfig::default());
    }

    #[test]
    fn load_malformed_file_errors_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quality.toml");
        std::fs::write(&path, "[discovery\ndays_back = ").unwrap();
        let err = QualityConfig::load(&path).unwrap_err();
        match err {
            ConfigError::Parse { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn output_paths_include_window() {
        let mut cfg = QualityConfig::default();
        cfg.output.dir = PathBuf::from("/tmp/out");
        cfg.discovery.days_back = 3;
        assert_eq!(cfg.jsonl_path(), PathBuf::from("/tmp/out/quality-scores-3d.jsonl"));
        assert_eq!(cfg.csv_path(), PathBuf::from("/tmp/out/quality-scores-3d.csv"));
    }

    #[test]
    fn expand_home_only_touches_tilde_prefix() {
        assert_eq!(expand_home(Path::new("/abs/path")), PathBuf::from("/abs/path"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/agents")),
                PathBuf::from(home).join("agents")
            );
        }
    }
}
