//! Structured metrics extracted from agent logs.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogMetrics {
    pub token_usage: u64,
    pub estimated_cost: f64,
    pub turns: u32,
    pub tool_calls: u32,
    pub errors: u32,
    pub warnings: u32,
}

#[allow(clippy::expect_used)]
static TOKENS_USED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tokens used:?\s*([0-9][0-9,]*)").expect("valid tokens regex"));

#[allow(clippy::expect_used)]
static TOKEN_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:total )?tokens?(?: used)?\s*[:=]\s*([0-9][0-9,]*)")
        .expect("valid token regex")
});

#[allow(clippy::expect_used)]
static CODEX_TOOL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[[^\]]*\]\s*)?(?:tool\s+\S+\(|exec\s)").expect("valid tool call regex")
});

/// Stream-JSON logs (one JSON object per line) as written by Claude and Gemini.
pub fn parse_stream_json_log(log: &str) -> LogMetrics {
    let mut metrics = LogMetrics::default();
    for line in log.lines() {
        let trimmed = line.trim();
        let Ok(event) = serde_json::from_str::<JsonValue>(trimmed) else {
            count_severity(trimmed, &mut metrics);
            continue;
        };
        match event.get("type").and_then(JsonValue::as_str) {
            Some("result") => apply_result_event(&event, &mut metrics),
            Some("assistant") => {
                let tool_uses = event
                    .pointer("/message/content")
                    .and_then(JsonValue::as_array)
                    .map_or(0, |content| {
                        content
                            .iter()
                            .filter(|item| {
                                item.get("type").and_then(JsonValue::as_str) == Some("tool_use")
                            })
                            .count()
                    });
                metrics.tool_calls += u32::try_from(tool_uses).unwrap_or(u32::MAX);
            }
            Some("tool_use") => metrics.tool_calls += 1,
            Some("error") => metrics.errors += 1,
            _ => {}
        }
    }
    metrics
}

fn apply_result_event(event: &JsonValue, metrics: &mut LogMetrics) {
    let usage = event.get("usage");
    let tokens = ["input_tokens", "output_tokens"]
        .iter()
        .filter_map(|key| usage.and_then(|usage| usage.get(*key)).and_then(JsonValue::as_u64))
        .sum::<u64>();
    let stats_tokens = event
        .pointer("/stats/total_tokens")
        .and_then(JsonValue::as_u64)
        .unwrap_or(0);
    metrics.token_usage += tokens.max(stats_tokens);

    if let Some(cost) = event.get("total_cost_usd").and_then(JsonValue::as_f64) {
        metrics.estimated_cost += cost;
    }
    if let Some(turns) = event.get("num_turns").and_then(JsonValue::as_u64) {
        metrics.turns = u32::try_from(turns).unwrap_or(u32::MAX);
    }
    if let Some(calls) = event.pointer("/stats/tool_calls").and_then(JsonValue::as_u64) {
        metrics.tool_calls = metrics
            .tool_calls
            .max(u32::try_from(calls).unwrap_or(u32::MAX));
    }
    if event.get("is_error").and_then(JsonValue::as_bool) == Some(true) {
        metrics.errors += 1;
    }
}

/// Codex exec logs: `tokens used` lines (value possibly on the next line) and
/// tool/exec markers.
pub fn parse_codex_log(log: &str) -> LogMetrics {
    let mut metrics = LogMetrics::default();
    let mut awaiting_tokens = false;
    for line in log.lines() {
        let trimmed = line.trim();
        if awaiting_tokens {
            awaiting_tokens = false;
            if let Some(tokens) = parse_count(trimmed) {
                metrics.token_usage += tokens;
                continue;
            }
        }
        if let Some(captures) = TOKENS_USED.captures(trimmed) {
            if let Some(tokens) = captures.get(1).and_then(|m| parse_count(m.as_str())) {
                metrics.token_usage += tokens;
            }
            continue;
        }
        if trimmed.eq_ignore_ascii_case("tokens used") {
            awaiting_tokens = true;
            continue;
        }
        if CODEX_TOOL_CALL.is_match(trimmed) {
            metrics.tool_calls += 1;
        }
        if trimmed.starts_with("[") && trimmed.contains("] codex") {
            metrics.turns += 1;
        }
        count_severity(trimmed, &mut metrics);
    }
    metrics
}

/// Plain-text logs: error/warning lines and token annotations.
pub fn parse_plain_log(log: &str) -> LogMetrics {
    let mut metrics = LogMetrics::default();
    for line in log.lines() {
        let trimmed = line.trim();
        if let Some(tokens) = TOKEN_ANNOTATION
            .captures(trimmed)
            .and_then(|captures| captures.get(1))
            .and_then(|m| parse_count(m.as_str()))
        {
            metrics.token_usage += tokens;
        }
        if trimmed.contains("tool_call") || trimmed.starts_with("● ") {
            metrics.tool_calls += 1;
        }
        count_severity(trimmed, &mut metrics);
    }
    metrics
}

fn parse_count(text: &str) -> Option<u64> {
    text.replace(',', "").parse().ok()
}

fn count_severity(line: &str, metrics: &mut LogMetrics) {
    let lower = line.to_ascii_lowercase();
    if lower.starts_with("error") || lower.contains("[error]") || lower.contains(" error:") {
        metrics.errors += 1;
    } else if lower.starts_with("warn") || lower.contains("[warn") || lower.contains(" warning:") {
        metrics.warnings += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stream_json_result_line() {
        let log = r#"{"type":"system","subtype":"init"}
{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Bash"},{"type":"text","text":"hi"}]}}
not json at all
{"type":"result","num_turns":3,"total_cost_usd":0.25,"usage":{"input_tokens":100,"output_tokens":50}}
"#;
        let metrics = parse_stream_json_log(log);
        assert_eq!(metrics.turns, 3);
        assert_eq!(metrics.token_usage, 150);
        assert_eq!(metrics.tool_calls, 1);
        assert!((metrics.estimated_cost - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn gemini_stats_tokens() {
        let log = r#"{"type":"result","stats":{"total_tokens":900,"tool_calls":4}}"#;
        let metrics = parse_stream_json_log(log);
        assert_eq!(metrics.token_usage, 900);
        assert_eq!(metrics.tool_calls, 4);
    }

    #[test]
    fn codex_tokens_on_same_or_next_line() {
        let log = "[2025-01-01T00:00:00] tokens used: 1,234\ntokens used\n66\ntool github.get_issue({})\nexec bash -lc ls\nERROR: boom\nWARN retry\n";
        let metrics = parse_codex_log(log);
        assert_eq!(metrics.token_usage, 1_300);
        assert_eq!(metrics.tool_calls, 2);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.warnings, 1);
    }

    #[test]
    fn plain_log_counts_severity() {
        let log = "Total tokens: 42\nerror: something failed\nwarning: careful\nfine\n";
        let metrics = parse_plain_log(log);
        assert_eq!(metrics.token_usage, 42);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.warnings, 1);
    }
}
