/// Task-type classification from transcript signals.
///
/// Rules are checked in a fixed priority order and the first match wins.
/// All keyword tests are plain case-insensitive substring matches.
use crate::signals::SessionSignals;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse category of what a session was for. Drives weight selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Heartbeat,
    Coding,
    Operations,
    Research,
    Discovery,
    Chat,
}

impl TaskType {
    #[cfg(test)]
    pub const ALL: [TaskType; 6] = [
        TaskType::Heartbeat,
        TaskType::Coding,
        TaskType::Operations,
        TaskType::Research,
        TaskType::Discovery,
        TaskType::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Heartbeat => "heartbeat",
            TaskType::Coding => "coding",
            TaskType::Operations => "operations",
            TaskType::Research => "research",
            TaskType::Discovery => "discovery",
            TaskType::Chat => "chat",
        }
    }

    /// Parse a task-type name; `None` for anything unrecognized.
    #[cfg(test)]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const HEARTBEAT_PROMPT_MARKER: &str = "heartbeat";
const HEARTBEAT_REPLY_MARKER: &str = "heartbeat_ok";

const CODE_TOOLS: &[&str] = &["exec", "write", "edit", "read"];

const CODING_KEYWORDS: &[&str] = &[
    "pr ",
    "pull request",
    "implement",
    "fix",
    "bug",
    "code",
    "branch",
    "commit",
    "merge",
    "refactor",
    "build",
    "test",
];

const OPERATIONS_KEYWORDS: &[&str] = &[
    "cron", "monitor", "check", "status", "deploy", "restart", "health", "log", "alert", "config",
];

const RESEARCH_KEYWORDS: &[&str] = &[
    "research",
    "analyze",
    "investigate",
    "evaluate",
    "compare",
    "review",
    "spec",
    "design",
    "brainstorm",
    "proposal",
    "strategy",
];

const DISCOVERY_KEYWORDS: &[&str] = &[
    "discover",
    "explore",
    "prototype",
    "experiment",
    "creative",
    "idea",
    "innovation",
];

/// Distinct tools at or above which an unclassified session counts as operations.
const BUSY_TOOL_COUNT: usize = 3;

/// Classify a session. Pure: depends only on the signal record.
pub fn classify_task_type(signals: &SessionSignals) -> TaskType {
    let prompt = signals.first_user_message.to_lowercase();
    let final_text = signals.final_assistant_text.to_lowercase();

    if prompt.contains(HEARTBEAT_PROMPT_MARKER) || final_text.contains(HEARTBEAT_REPLY_MARKER) {
        return TaskType::Heartbeat;
    }

    let used_code_tool = CODE_TOOLS.iter().any(|t| signals.tools_used.contains(*t));
    if used_code_tool && contains_any(&prompt, CODING_KEYWORDS) {
        return TaskType::Coding;
    }

    if contains_any(&prompt, OPERATIONS_KEYWORDS) {
        return TaskType::Operations;
    }
    if contains_any(&prompt, RESEARCH_KEYWORDS) {
        return TaskType::Research;
    }
    if contains_any(&prompt, DISCOVERY_KEYWORDS) {
        return TaskType::Discovery;
    }

    if signals.tools_used.len() >= BUSY_TOOL_COUNT {
        TaskType::Operations
    } else {
        TaskType::Chat
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(prompt: &str, tools: &[&str]) -> SessionSignals {
        SessionSignals {
            first_user_message: prompt.to_string(),
            tools_used: tools.iter().map(|t| t.to_string()).collect(),
            tool_calls_total: tools.len() as u64,
            ..Default::default()
        }
    }

    #[test]
    fn heartbeat_from_prompt() {
        let s = signals("Read HEARTBEAT.md and follow it", &["read", "exec", "write"]);
        assert_eq!(classify_task_type(&s), TaskType::Heartbeat);
    }

    #[test]
    fn heartbeat_from_reply() {
        let mut s = signals("anything new?", &[]);
        s.final_assistant_text = "HEARTBEAT_OK".to_string();
        assert_eq!(classify_task_type(&s), TaskType::Heartbeat);
    }

    #[test]
    fn coding_beats_research() {
        let s = signals("Research the options then implement the fix", &["edit"]);
        assert_eq!(classify_task_type(&s), TaskType::Coding);
    }

    #[test]
    fn coding_needs_code_tool() {
        // Coding keyword without a code tool falls through to later rules
        let s = signals("please review this commit", &["web_search"]);
        assert_eq!(classify_task_type(&s), TaskType::Research);
    }

    #[test]
    fn operations_keywords() {
        let s = signals("Check disk usage on the box", &[]);
        assert_eq!(classify_task_type(&s), TaskType::Operations);
    }

    #[test]
    fn research_keywords() {
        let s = signals("Analyze last quarter's churn", &[]);
        assert_eq!(classify_task_type(&s), TaskType::Research);
    }

    #[test]
    fn discovery_keywords() {
        let s = signals("Explore a new landing page concept", &[]);
        assert_eq!(classify_task_type(&s), TaskType::Discovery);
    }

    #[test]
    fn busy_fallback_is_operations() {
        let s = signals("hello", &["a", "b", "c"]);
        assert_eq!(classify_task_type(&s), TaskType::Operations);
    }

    #[test]
    fn default_is_chat() {
        let s = signals("hello", &["a", "b"]);
        assert_eq!(classify_task_type(&s), TaskType::Chat);
        assert_eq!(classify_task_type(&SessionSignals::default()), TaskType::Chat);
    }

    #[test]
    fn names_round_trip() {
        for t in TaskType::ALL {
            assert_eq!(TaskType::from_name(t.as_str()), Some(t));
            assert_eq!(t.to_string(), t.as_str());
        }
        assert_eq!(TaskType::from_name("gardening"), None);
    }
}
