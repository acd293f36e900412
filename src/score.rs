//! Quality scoring: four independent sub-scores and the task-weighted composite.
//!
//! Every sub-score is a pure function of the signal record (efficiency and
//! outcome also take the task type) and lies in [0.0, 1.0]. The composite is
//! the weighted sum under the task type's profile, rounded to 4 places.

use crate::classify::{classify_task_type, TaskType};
use crate::config::ScoringConfig;
use crate::signals::{SessionSignals, StopReason};
use serde::Serialize;
use std::fmt;

/// Minimal but valid final responses (the agent correctly chose not to act).
const NO_OP_RESPONSES: &[&str] = &["HEARTBEAT_OK", "NO_REPLY", "REPLY_SKIP", "ANNOUNCE_SKIP"];

/// Acknowledgments that count as a successful heartbeat with nothing to do.
const HEARTBEAT_ACKS: &[&str] = &["HEARTBEAT_OK", "NO_REPLY"];

/// Largest-tier model markers penalized on heartbeat tasks.
const HEAVYWEIGHT_MARKERS: &[&str] = &["opus", "gpt-5"];

/// Largest-tier model markers penalized on chat tasks.
const HEAVYWEIGHT_CHAT_MARKERS: &[&str] = &["opus"];

/// Execution score when no tools were called.
const NEUTRAL_EXECUTION: f64 = 0.75;

/// Heartbeat outcome when the agent correctly acknowledged and did nothing.
const HEARTBEAT_NO_OP_OUTCOME: f64 = 0.80;

/// Four independent quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub completion: f64,
    pub execution: f64,
    pub efficiency: f64,
    pub outcome: f64,
}

/// Discrete label for a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Failed,
}

impl QualityLabel {
    /// Labels from best to worst.
    pub const ALL: [QualityLabel; 5] = [
        QualityLabel::Excellent,
        QualityLabel::Good,
        QualityLabel::Acceptable,
        QualityLabel::Poor,
        QualityLabel::Failed,
    ];

    pub fn from_score(q: f64) -> Self {
        if q >= 0.90 {
            QualityLabel::Excellent
        } else if q >= 0.75 {
            QualityLabel::Good
        } else if q >= 0.60 {
            QualityLabel::Acceptable
        } else if q >= 0.40 {
            QualityLabel::Poor
        } else {
            QualityLabel::Failed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLabel::Excellent => "excellent",
            QualityLabel::Good => "good",
            QualityLabel::Acceptable => "acceptable",
            QualityLabel::Poor => "poor",
            QualityLabel::Failed => "failed",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session after classification and scoring. Only `score_session` builds
/// one, so derived values never exist without their inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSession {
    pub signals: SessionSignals,
    pub task_type: TaskType,
    /// Sub-scores rounded to 4 decimal places.
    pub scores: SubScores,
    pub quality_score: f64,
    pub quality_label: QualityLabel,
    pub alert: bool,
}

impl ScoredSession {
    /// Quality per dollar, rounded to 2 places. `None` when nothing was spent.
    pub fn roi(&self) -> Option<f64> {
        let cost = self.signals.total_cost;
        if cost > 0.0 {
            Some(round_to(self.quality_score / cost, 2))
        } else {
            None
        }
    }
}

/// Classify, score, label and alert-check one session.
pub fn score_session(signals: SessionSignals, config: &ScoringConfig) -> ScoredSession {
    let task_type = classify_task_type(&signals);

    let scores = SubScores {
        completion: score_completion(&signals),
        execution: score_execution(&signals),
        efficiency: score_efficiency(&signals, task_type),
        outcome: score_outcome(&signals, task_type),
    };

    let w = config.weights.profile(task_type);
    let q = w.completion * scores.completion
        + w.execution * scores.execution
        + w.efficiency * scores.efficiency
        + w.outcome * scores.outcome;
    let quality_score = round_to(q.clamp(0.0, 1.0), 4);

    let alert = quality_score < config.alert.quality_threshold
        && signals.total_cost > config.alert.cost_threshold;

    tracing::debug!(
        path = %signals.source_path.display(),
        task_type = %task_type,
        quality_score,
        alert,
        "scored session"
    );

    ScoredSession {
        task_type,
        scores: SubScores {
            completion: round_to(scores.completion, 4),
            execution: round_to(scores.execution, 4),
            efficiency: round_to(scores.efficiency, 4),
            outcome: round_to(scores.outcome, 4),
        },
        quality_score,
        quality_label: QualityLabel::from_score(quality_score),
        alert,
        signals,
    }
}

/// Did the session finish its job? Mean of termination, substance and
/// correction signals.
pub fn score_completion(s: &SessionSignals) -> f64 {
    let termination = match StopReason::parse(&s.final_stop_reason) {
        StopReason::Stop | StopReason::ToolUse => 1.0,
        StopReason::Missing => 0.3,
        StopReason::Abnormal => 0.0,
    };

    let substance = if s.assistant_turns == 0 {
        0.0
    } else if is_one_of(&s.final_assistant_text, NO_OP_RESPONSES) {
        0.5
    } else if s.final_assistant_text.chars().count() > 100 || s.tool_calls_total > 0 {
        1.0
    } else {
        0.6
    };

    let corrections = match s.user_corrections {
        0 => 1.0,
        1 => 0.5,
        _ => 0.2,
    };

    mean(&[termination, substance, corrections])
}

/// How cleanly were tools used? Neutral when no tools were called.
pub fn score_execution(s: &SessionSignals) -> f64 {
    let total = s.tool_calls_total;
    if total == 0 {
        return NEUTRAL_EXECUTION;
    }
    let total = total as f64;

    let success_rate = s.tool_calls_success as f64 / total;
    let first_attempt_rate = s.tool_calls_first_attempt as f64 / total;

    let error_rate = s.tool_calls_error as f64 / total;
    let recovery = if s.tool_calls_error == 0 {
        1.0
    } else if error_rate < 0.2 {
        0.7
    } else if error_rate < 0.5 {
        0.4
    } else {
        0.2
    };

    let spawn = if s.spawn_count == 0 {
        1.0
    } else {
        s.spawn_success as f64 / s.spawn_count as f64
    };

    let score = 0.5 * success_rate + 0.25 * first_attempt_rate + 0.15 * recovery + 0.10 * spawn;
    score.clamp(0.0, 1.0)
}

/// Was the session resource-appropriate for its task?
pub fn score_efficiency(s: &SessionSignals, task_type: TaskType) -> f64 {
    let tokens_in = s.input_tokens + s.cache_read_tokens;
    let token_ratio = if tokens_in == 0 {
        0.5
    } else {
        let ratio = s.output_tokens as f64 / tokens_in as f64;
        if ratio >= 0.15 {
            1.0
        } else if ratio >= 0.05 {
            0.7
        } else if ratio >= 0.01 {
            0.4
        } else {
            0.2
        }
    };

    let turns = match s.assistant_turns {
        0..=2 => 1.0,
        3..=5 => 0.8,
        6..=10 => 0.6,
        _ => 0.4,
    };

    let compaction = match s.compaction_count {
        0 => 1.0,
        1 => 0.8,
        _ => 0.5,
    };

    let model = s.model_lower();
    let model_fit = match task_type {
        TaskType::Heartbeat if contains_any(&model, HEAVYWEIGHT_MARKERS) => 0.4,
        TaskType::Chat if contains_any(&model, HEAVYWEIGHT_CHAT_MARKERS) => 0.6,
        _ => 1.0,
    };

    mean(&[token_ratio, turns, compaction, model_fit])
}

/// Did the work produce something? Interpretation depends on the task type.
pub fn score_outcome(s: &SessionSignals, task_type: TaskType) -> f64 {
    let artifacts = (s.artifacts_produced as f64 * 0.25).min(1.0);

    match task_type {
        TaskType::Heartbeat if is_one_of(&s.final_assistant_text, HEARTBEAT_ACKS) => {
            HEARTBEAT_NO_OP_OUTCOME
        }
        TaskType::Chat => {
            let len = s.final_assistant_text.chars().count();
            let floor = if len > 200 {
                0.7
            } else if len > 50 {
                0.5
            } else {
                0.2
            };
            artifacts.max(floor)
        }
        _ if s.tool_calls_total > 0 && s.tool_calls_success > 0 => artifacts.max(0.6),
        _ => artifacts,
    }
}

fn is_one_of(text: &str, candidates: &[&str]) -> bool {
    let normalized = text.trim().to_uppercase();
    candidates.iter().any(|c| normalized == *c)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
