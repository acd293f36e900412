/// Signal record extracted from one session transcript, plus the closed
/// discriminator enums the parser dispatches on.
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Per-session features consumed by the classifier and the scorers.
///
/// Built in a single pass by `ingest::TranscriptParser`. Every field has a
/// zero-equivalent default so scoring tolerates fully-absent input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSignals {
    // Identity
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub source_path: PathBuf,
    pub timestamp: Option<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub thinking_level: Option<String>,
    pub trigger_type: Option<String>,

    // Conversation
    pub assistant_turns: u64,
    pub user_turns: u64,
    pub first_user_message: String,
    pub final_assistant_text: String,
    pub final_stop_reason: String,

    // Tool use
    pub tools_used: BTreeSet<String>,
    pub tool_calls_total: u64,
    pub tool_calls_success: u64,
    pub tool_calls_error: u64,
    pub tool_calls_first_attempt: u64,

    // Resources
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_cost: f64,

    // Behavior
    pub user_corrections: u64,
    pub has_compaction: bool,
    pub compaction_count: u64,
    pub spawn_count: u64,
    pub spawn_success: u64,
    pub artifacts_produced: u64,

    /// Set when the transcript could not be read to the end.
    pub parse_error: Option<String>,
}

impl SessionSignals {
    /// Empty record for the transcript at `path`.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: path.into(),
            ..Default::default()
        }
    }

    /// Model name lowercased, empty when no model change was recorded.
    pub fn model_lower(&self) -> String {
        self.model.as_deref().unwrap_or_default().to_lowercase()
    }
}

/// Top-level `type` discriminator of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Session,
    ModelChange,
    ThinkingLevelChange,
    Message,
    Custom,
    Other,
}

impl RecordKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "session" => RecordKind::Session,
            "model_change" => RecordKind::ModelChange,
            "thinking_level_change" => RecordKind::ThinkingLevelChange,
            "message" => RecordKind::Message,
            "custom" => RecordKind::Custom,
            _ => RecordKind::Other,
        }
    }
}

/// Author of a `message` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    ToolResult,
    Other,
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "toolResult" => Role::ToolResult,
            _ => Role::Other,
        }
    }
}

/// Tool name as far as scoring cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Write,
    Edit,
    /// Outbound message to a human or channel.
    Message,
    /// Sub-agent spawn.
    Spawn,
    Other,
}

impl ToolKind {
    pub const SPAWN_TOOL: &'static str = "sessions_spawn";

    pub fn parse(name: &str) -> Self {
        match name {
            "write" => ToolKind::Write,
            "edit" => ToolKind::Edit,
            "message" => ToolKind::Message,
            Self::SPAWN_TOOL => ToolKind::Spawn,
            _ => ToolKind::Other,
        }
    }

    /// Whether an invocation of this tool produces an artifact.
    pub fn is_artifact(self) -> bool {
        match self {
            ToolKind::Write | ToolKind::Edit | ToolKind::Message => true,
            ToolKind::Spawn | ToolKind::Other => false,
        }
    }
}

/// Final termination reason of the last assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Model finished its turn (`stop`, `end_turn`).
    Stop,
    /// Model stopped to call a tool (`toolUse`, `tool_use`).
    ToolUse,
    /// No reason recorded.
    Missing,
    /// Anything else: length limits, errors, aborts.
    Abnormal,
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" => StopReason::Stop,
            "toolUse" | "tool_use" => StopReason::ToolUse,
            "" => StopReason::Missing,
            _ => StopReason::Abnormal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_unknown_is_other() {
        assert_eq!(RecordKind::parse("message"), RecordKind::Message);
        assert_eq!(RecordKind::parse("thinking_level_change"), RecordKind::ThinkingLevelChange);
        assert_eq!(RecordKind::parse("branch_summary"), RecordKind::Other);
        assert_eq!(RecordKind::parse(""), RecordKind::Other);
    }

    #[test]
    fn role_is_case_sensitive() {
        assert_eq!(Role::parse("toolResult"), Role::ToolResult);
        assert_eq!(Role::parse("toolresult"), Role::Other);
        assert_eq!(Role::parse("system"), Role::Other);
    }

    #[test]
    fn tool_kind_artifacts() {
        assert!(ToolKind::parse("write").is_artifact());
        assert!(ToolKind::parse("edit").is_artifact());
        assert!(ToolKind::parse("message").is_artifact());
        assert!(!ToolKind::parse("sessions_spawn").is_artifact());
        assert!(!ToolKind::parse("exec").is_artifact());
        assert_eq!(ToolKind::parse("sessions_spawn"), ToolKind::Spawn);
    }

    #[test]
    fn stop_reason_variants() {
        assert_eq!(StopReason::parse("stop"), StopReason::Stop);
        assert_eq!(StopReason::parse("end_turn"), StopReason::Stop);
        assert_eq!(StopReason::parse("toolUse"), StopReason::ToolUse);
        assert_eq!(StopReason::parse("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::parse(""), StopReason::Missing);
        assert_eq!(StopReason::parse("error"), StopReason::Abnormal);
        assert_eq!(StopReason::parse("length"), StopReason::Abnormal);
        assert_eq!(StopReason::parse("Stop"), StopReason::Abnormal);
    }

    #[test]
    fn default_record_is_empty() {
        let s = SessionSignals::for_path("/tmp/a.jsonl");
        assert_eq!(s.source_path, PathBuf::from("/tmp/a.jsonl"));
        assert_eq!(s.tool_calls_total, 0);
        assert!(s.tools_used.is_empty());
        assert_eq!(s.model_lower(), "");
        assert!(s.parse_error.is_none());
    }
}
