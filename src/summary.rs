//! Batch summary: score distribution and per-label, per-task-type, per-model
//! and per-agent breakdowns, rendered for the console.

use crate::config::QualityConfig;
use crate::score::{QualityLabel, ScoredSession};
use std::collections::BTreeMap;
use std::fmt;

/// Characters of the session id shown in the alert listing.
const SHORT_ID_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelCount {
    pub label: QualityLabel,
    pub count: usize,
    pub percent: f64,
}

/// Aggregates over a group of sessions sharing a task type, model or agent.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub name: String,
    pub count: usize,
    pub avg_score: f64,
    pub avg_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertLine {
    pub agent_id: String,
    pub session_id: String,
    pub model: String,
    pub task_type: String,
    pub quality_score: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub days_back: u32,
    pub quality_threshold: f64,
    pub cost_threshold: f64,
    pub sessions: usize,
    pub parse_errors: usize,
    pub alerts: usize,
    /// `None` when no sessions were scored.
    pub distribution: Option<Distribution>,
    pub labels: Vec<LabelCount>,
    pub task_types: Vec<GroupStats>,
    pub models: Vec<GroupStats>,
    /// Top agents by session count.
    pub agents: Vec<GroupStats>,
    /// Alerted sessions in report order, capped at `summary.worst_alerts`.
    pub worst_alerts: Vec<AlertLine>,
}

impl Summary {
    /// Summarize sessions already sorted worst-first.
    pub fn build(sessions: &[ScoredSession], config: &QualityConfig) -> Self {
        let alerted: Vec<&ScoredSession> = sessions.iter().filter(|s| s.alert).collect();

        let mut agents = group_by(sessions, |s| {
            s.signals.agent_id.clone().unwrap_or_else(|| "unknown".to_string())
        });
        agents.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        agents.truncate(config.summary.top_agents);

        Summary {
            days_back: config.discovery.days_back,
            quality_threshold: config.scoring.alert.quality_threshold,
            cost_threshold: config.scoring.alert.cost_threshold,
            sessions: sessions.len(),
            parse_errors: sessions
                .iter()
                .filter(|s| s.signals.parse_error.is_some())
                .count(),
            alerts: alerted.len(),
            distribution: distribution(sessions),
            labels: label_counts(sessions),
            task_types: group_by(sessions, |s| s.task_type.to_string()),
            models: group_by(sessions, |s| {
                s.signals.model.clone().unwrap_or_else(|| "unknown".to_string())
            }),
            agents,
            worst_alerts: alerted
                .iter()
                .take(config.summary.worst_alerts)
                .map(|s| AlertLine {
                    agent_id: s.signals.agent_id.clone().unwrap_or_else(|| "unknown".to_string()),
                    session_id: s
                        .signals
                        .session_id
                        .as_deref()
                        .unwrap_or("unknown")
                        .chars()
                        .take(SHORT_ID_CHARS)
                        .collect(),
                    model: s.signals.model.clone().unwrap_or_else(|| "unknown".to_string()),
                    task_type: s.task_type.to_string(),
                    quality_score: s.quality_score,
                    total_cost: s.signals.total_cost,
                })
                .collect(),
        }
    }
}

/// Console rendering of the summary.
impl fmt::Display for Summary {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(out, "{rule}")?;
        writeln!(out, "QUALITY SCORE SUMMARY - Last {} Days", self.days_back)?;
        writeln!(out, "{rule}")?;
        writeln!(out, "Sessions scored: {}", self.sessions)?;
        writeln!(out, "Parse errors: {}", self.parse_errors)?;
        writeln!(
            out,
            "Alerts (Q<{} & Cost>${}): {}",
            self.quality_threshold, self.cost_threshold, self.alerts
        )?;
        writeln!(out)?;

        let dist = match &self.distribution {
            Some(d) => d,
            None => return Ok(()),
        };

        writeln!(out, "Score distribution:")?;
        writeln!(out, "  Mean:   {:.3}", dist.mean)?;
        writeln!(out, "  Median: {:.3}", dist.median)?;
        writeln!(out, "  Min:    {:.3}", dist.min)?;
        writeln!(out, "  Max:    {:.3}", dist.max)?;
        writeln!(out)?;

        writeln!(out, "Quality tiers:")?;
        for l in &self.labels {
            writeln!(
                out,
                "  {:12}: {:4} ({:5.1}%)",
                l.label.as_str(),
                l.count,
                l.percent
            )?;
        }
        writeln!(out)?;

        writeln!(out, "By task type:")?;
        for g in &self.task_types {
            writeln!(out, "  {:12}: n={:3}, avg_Q={:.3}", g.name, g.count, g.avg_score)?;
        }
        writeln!(out)?;

        writeln!(out, "By model:")?;
        for g in &self.models {
            writeln!(
                out,
                "  {:25}: n={:3}, avg_Q={:.3}, avg_cost=${:.4}",
                g.name, g.count, g.avg_score, g.avg_cost
            )?;
        }
        writeln!(out)?;

        writeln!(out, "By agent (top {} by volume):", self.agents.len())?;
        for g in &self.agents {
            writeln!(
                out,
                "  {:12}: n={:3}, avg_Q={:.3}, total_cost=${:.4}",
                g.name, g.count, g.avg_score, g.total_cost
            )?;
        }
        writeln!(out)?;

        if !self.worst_alerts.is_empty() {
            writeln!(out, "ALERTS ({} sessions):", self.alerts)?;
            for a in &self.worst_alerts {
                writeln!(
                    out,
                    "  [{}] Q={:.3} cost=${:.4} model={} type={} session={}",
                    a.agent_id, a.quality_score, a.total_cost, a.model, a.task_type, a.session_id
                )?;
            }
            writeln!(out)?;
        }

        Ok(())
    }
}

fn distribution(sessions: &[ScoredSession]) -> Option<Distribution> {
    if sessions.is_empty() {
        return None;
    }
    let mut scores: Vec<f64> = sessions.iter().map(|s| s.quality_score).collect();
    scores.sort_by(f64::total_cmp);
    let n = scores.len();
    Some(Distribution {
        mean: scores.iter().sum::<f64>() / n as f64,
        median: scores[n / 2],
        min: scores[0],
        max: scores[n - 1],
    })
}

fn label_counts(sessions: &[ScoredSession]) -> Vec<LabelCount> {
    QualityLabel::ALL
        .into_iter()
        .map(|label| {
            let count = sessions.iter().filter(|s| s.quality_label == label).count();
            let percent = if sessions.is_empty() {
                0.0
            } else {
                count as f64 / sessions.len() as f64 * 100.0
            };
            LabelCount {
                label,
                count,
                percent,
            }
        })
        .collect()
}

/// Group sessions by key, sorted by key.
fn group_by(sessions: &[ScoredSession], key: impl Fn(&ScoredSession) -> String) -> Vec<GroupStats> {
    let mut groups: BTreeMap<String, Vec<&ScoredSession>> = BTreeMap::new();
    for s in sessions {
        groups.entry(key(s)).or_default().push(s);
    }
    groups
        .into_iter()
        .map(|(name, members)| {
            let count = members.len();
            let total_score: f64 = members.iter().map(|s| s.quality_score).sum();
            let total_cost: f64 = members.iter().map(|s| s.signals.total_cost).sum();
            GroupStats {
                name,
                count,
                avg_score: total_score / count as f64,
                avg_cost: total_cost / count as f64,
                total_cost,
            }
        })
        .collect()
}
