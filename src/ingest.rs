/// Transcript parsing: turn a session's JSONL log into one `SessionSignals`
/// record in a single linear pass.
use crate::signals::{RecordKind, Role, SessionSignals, ToolKind};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum characters kept from the first user message and the final
/// assistant message.
pub const TEXT_CAPTURE_CHARS: usize = 500;

/// Phrases in a user turn that indicate the agent got something wrong.
const CORRECTION_PHRASES: &[&str] = &[
    "no, ",
    "that's wrong",
    "i meant",
    "actually,",
    "not what i asked",
    "try again",
    "that's not right",
];

static ERROR_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"status"\s*:\s*"error""#).unwrap());

static OK_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""status"\s*:\s*"ok""#).unwrap());

/// Single-pass transcript parser.
///
/// Owns the per-session scratch tables (pending tool calls keyed by call id,
/// consecutive failures keyed by tool name). They are dropped by `finish`,
/// so nothing leaks from one session into the next.
pub struct TranscriptParser {
    signals: SessionSignals,
    pending_calls: HashMap<String, String>,
    consecutive_failures: HashMap<String, u32>,
}

impl TranscriptParser {
    /// Start a record for the transcript at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut signals = SessionSignals::for_path(&path);
        signals.agent_id = agent_id_from_path(&path);
        Self {
            signals,
            pending_calls: HashMap::new(),
            consecutive_failures: HashMap::new(),
        }
    }

    /// Consume one raw log line. Blank and malformed lines are skipped.
    pub fn feed_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let v: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return, // skip malformed lines
        };

        match RecordKind::parse(str_field(&v, "type").unwrap_or_default()) {
            RecordKind::Session => self.on_session(&v),
            RecordKind::ModelChange => {
                self.signals.model = string_field(&v, "modelId");
                self.signals.provider = string_field(&v, "provider");
            }
            RecordKind::ThinkingLevelChange => {
                self.signals.thinking_level = string_field(&v, "thinkingLevel");
            }
            RecordKind::Message => self.on_message(&v),
            RecordKind::Custom => self.on_custom(&v),
            RecordKind::Other => {}
        }
    }

    /// Attach a parse-error marker; accumulated data is kept.
    pub fn mark_error(&mut self, error: impl Into<String>) {
        self.signals.parse_error = Some(error.into());
    }

    /// Finish the pass and hand back the record.
    pub fn finish(self) -> SessionSignals {
        if !self.pending_calls.is_empty() {
            tracing::debug!(
                path = %self.signals.source_path.display(),
                pending = self.pending_calls.len(),
                "tool calls without results"
            );
        }
        self.signals
    }

    fn on_session(&mut self, v: &Value) {
        if self.signals.session_id.is_none() {
            self.signals.session_id = string_field(v, "id");
        }
        if let Some(ts) = string_field(v, "timestamp") {
            self.signals.timestamp = Some(ts);
        }
        if let Some(trigger) = string_field(v, "trigger") {
            self.signals.trigger_type = Some(trigger);
        }
    }

    fn on_message(&mut self, v: &Value) {
        let msg = match v.get("message") {
            Some(m) => m,
            None => return,
        };

        if let Some(usage) = msg.get("usage") {
            self.add_usage(usage);
        }

        let content = msg.get("content").unwrap_or(&Value::Null);
        match Role::parse(str_field(msg, "role").unwrap_or_default()) {
            Role::User => self.on_user(content),
            Role::Assistant => self.on_assistant(msg, content),
            Role::ToolResult => self.on_tool_result(msg, content),
            Role::Other => {}
        }
    }

    fn add_usage(&mut self, usage: &Value) {
        let s = &mut self.signals;
        s.input_tokens += u64_field(usage, "input");
        s.output_tokens += u64_field(usage, "output");
        s.cache_read_tokens += u64_field(usage, "cacheRead");
        if let Some(cost) = usage.get("cost") {
            s.total_cost += cost_total(cost);
        }
    }

    fn on_user(&mut self, content: &Value) {
        self.signals.user_turns += 1;
        let text = extract_text(content);
        if self.signals.user_turns == 1 {
            self.signals.first_user_message = first_chars(&text, TEXT_CAPTURE_CHARS);
        }

        let lower = text.to_lowercase();
        if CORRECTION_PHRASES.iter().any(|p| lower.contains(p)) {
            self.signals.user_corrections += 1;
        }
    }

    fn on_assistant(&mut self, msg: &Value, content: &Value) {
        let s = &mut self.signals;
        s.assistant_turns += 1;
        s.final_stop_reason = str_field(msg, "stopReason").unwrap_or_default().to_string();
        s.final_assistant_text = last_chars(&extract_text(content), TEXT_CAPTURE_CHARS);

        let blocks = match content.as_array() {
            Some(arr) => arr,
            None => return,
        };

        for block in blocks {
            if !matches!(str_field(block, "type"), Some("toolCall" | "tool_use")) {
                continue;
            }
            let name = str_field(block, "name")
                .or_else(|| str_field(block, "toolName"))
                .unwrap_or("unknown")
                .to_string();
            let call_id = str_field(block, "id")
                .or_else(|| str_field(block, "toolCallId"))
                .unwrap_or_default()
                .to_string();

            let kind = ToolKind::parse(&name);
            let s = &mut self.signals;
            s.tool_calls_total += 1;
            if kind.is_artifact() {
                s.artifacts_produced += 1;
            }
            if kind == ToolKind::Spawn {
                s.spawn_count += 1;
            }
            s.tools_used.insert(name.clone());
            self.pending_calls.insert(call_id, name);
        }
    }

    fn on_tool_result(&mut self, msg: &Value, content: &Value) {
        let call_id = str_field(msg, "toolCallId").unwrap_or_default();
        let result_name = str_field(msg, "toolName");
        let tool_name = match self.resolve_call(call_id, result_name) {
            Some(name) => name,
            None => {
                tracing::debug!(
                    path = %self.signals.source_path.display(),
                    tool = result_name.unwrap_or("unknown"),
                    call_id,
                    "tool result without a matching call"
                );
                return;
            }
        };

        let s = &mut self.signals;
        let text = extract_text(content);
        let is_error = msg.get("isError").is_some_and(is_truthy) || ERROR_STATUS.is_match(&text);

        if is_error {
            s.tool_calls_error += 1;
            *self.consecutive_failures.entry(tool_name).or_insert(0) += 1;
            return;
        }

        s.tool_calls_success += 1;
        let prior_failures = self
            .consecutive_failures
            .insert(tool_name.clone(), 0)
            .unwrap_or(0);
        if prior_failures == 0 {
            s.tool_calls_first_attempt += 1;
        }
        if ToolKind::parse(&tool_name) == ToolKind::Spawn && OK_STATUS.is_match(&text) {
            s.spawn_success += 1;
        }
    }

    /// Take the pending call a result answers: by call id, or failing that
    /// any pending call of the result's tool name. Each call is resolved at
    /// most once.
    fn resolve_call(&mut self, call_id: &str, result_name: Option<&str>) -> Option<String> {
        if let Some(name) = self.pending_calls.remove(call_id) {
            return Some(result_name.map(str::to_string).unwrap_or(name));
        }
        let name = result_name?;
        let key = self
            .pending_calls
            .iter()
            .find(|(_, pending)| pending.as_str() == name)
            .map(|(id, _)| id.clone())?;
        self.pending_calls.remove(&key)
    }

    fn on_custom(&mut self, v: &Value) {
        let custom_type = str_field(v, "customType").unwrap_or_default();
        if custom_type.to_lowercase().contains("compaction") {
            self.signals.has_compaction = true;
            self.signals.compaction_count += 1;
        }
    }
}

/// Parse an in-memory sequence of log lines.
#[cfg(test)]
pub fn parse_lines<I, S>(path: impl Into<PathBuf>, lines: I) -> SessionSignals
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = TranscriptParser::new(path);
    for line in lines {
        parser.feed_line(line.as_ref());
    }
    parser.finish()
}

/// Parse a transcript file (`.jsonl`, or zstd-compressed `.jsonl.zst`).
///
/// Never fails: if the file cannot be opened or read to the end, the record
/// carries a `parse_error` and whatever was accumulated before the failure.
pub fn parse_session_file(path: &Path) -> SessionSignals {
    let mut parser = TranscriptParser::new(path);
    if let Err(e) = feed_file(&mut parser, path) {
        tracing::warn!(error = %e, path = %path.display(), "failed to read transcript");
        parser.mark_error(e.to_string());
    }
    parser.finish()
}

fn feed_file(parser: &mut TranscriptParser, path: &Path) -> std::io::Result<()> {
    let reader = open_transcript(path)?;
    for line in reader.split(b'\n') {
        let bytes = line?;
        match std::str::from_utf8(&bytes) {
            Ok(text) => parser.feed_line(text),
            Err(_) => continue, // skip lines that are not valid UTF-8
        }
    }
    Ok(())
}

fn open_transcript(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = std::fs::File::open(path)?;
    let compressed = path.extension().and_then(|e| e.to_str()) == Some("zst");
    if compressed {
        let decoder = zstd::Decoder::new(file)?;
        Ok(Box::new(std::io::BufReader::new(decoder)))
    } else {
        Ok(Box::new(std::io::BufReader::new(file)))
    }
}

/// Plain text of a message `content` field.
///
/// A string is returned as-is; an array contributes the `text` of each
/// `{"type":"text"}` block, joined with single spaces. Anything else is empty.
pub fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| str_field(b, "type") == Some("text"))
            .map(|b| str_field(b, "text").unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Agent id from a `.../agents/<agent>/sessions/<file>` layout.
pub fn agent_id_from_path(path: &Path) -> Option<String> {
    let mut components = path.components().map(|c| c.as_os_str());
    components.find(|c| *c == "agents")?;
    components.next().and_then(|c| c.to_str()).map(String::from)
}

/// Monetary total of a usage `cost` field: a bare number or `{ "total": n }`.
/// Unrecognized shapes and negative or non-finite values contribute zero.
fn cost_total(cost: &Value) -> f64 {
    let total = match cost {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("total").and_then(Value::as_f64),
        _ => None,
    };
    match total {
        Some(t) if t.is_finite() && t > 0.0 => t,
        _ => 0.0,
    }
}

/// Loose truthiness for flags written by different producers: `true`, a
/// non-zero number, a non-empty string, array or object.
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    str_field(v, key).map(String::from)
}

fn u64_field(v: &Value, key: &str) -> u64 {
    v.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn first_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn last_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}
