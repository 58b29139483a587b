//! Artifact inspection report
//!
//! Reads a previously written run artifact and prints a sectioned digest:
//! transcript, tool events, errors, and meta. The reader is deliberately
//! tolerant: artifacts from older runs may miss fields, so everything is
//! read as loose JSON rather than the current artifact struct.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Loads an artifact file and prints its report to stdout.
pub fn print_report(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Artifact not found: {}", path.display()))?;
    let artifact: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse JSON from {}", path.display()))?;
    print!("{}", render_report(&artifact, path));
    Ok(())
}

fn render_report(artifact: &Value, path: &Path) -> String {
    let structured = artifact.get("structured").cloned().unwrap_or(Value::Null);
    let transcripts = as_array(structured.get("transcripts"));
    let events = as_array(structured.get("events"));
    let console_logs = as_array(artifact.get("consoleLogs"));

    let mut out = String::new();
    out.push_str(&format!("Harness artifact: {}\n", path.display()));
    out.push_str(&format!(
        "Timestamp: {}\n",
        format_timestamp(artifact.get("timestamp").and_then(Value::as_str))
    ));
    if let Some(prompt) = artifact.get("prompt").and_then(Value::as_str) {
        out.push_str(&format!("Prompt: {}\n", prompt));
    }
    if let Some(url) = artifact.get("url").and_then(Value::as_str) {
        out.push_str(&format!("URL: {}\n", url));
    }

    out.push_str(&section("Transcript"));
    if transcripts.is_empty() {
        out.push_str("[no transcript items]\n");
    } else {
        render_transcript(&mut out, &transcripts);
    }

    out.push_str(&section("Tool & MCP Events"));
    if events.is_empty() {
        out.push_str("[no events]\n");
    } else {
        render_tool_events(&mut out, &events);
    }

    out.push_str(&section("Errors & Warnings"));
    let error_logs: Vec<&Value> = console_logs
        .iter()
        .filter(|log| {
            matches!(
                log.get("type").and_then(Value::as_str),
                Some("error") | Some("warning") | Some("pageerror")
            )
        })
        .collect();
    let error_events: Vec<&Value> = events
        .iter()
        .filter(|ev| event_name(ev).to_lowercase().contains("error"))
        .collect();
    if error_logs.is_empty() && error_events.is_empty() {
        out.push_str("[none]\n");
    } else {
        for log in &error_logs {
            out.push_str(&format!(
                "- console.{}: {}\n",
                log.get("type").and_then(Value::as_str).unwrap_or(""),
                log.get("text").and_then(Value::as_str).unwrap_or("")
            ));
        }
        for ev in &error_events {
            out.push_str(&format!(
                "- event {}\n    {}\n",
                event_name(ev),
                indented_json(ev.get("eventData"))
            ));
        }
    }

    out.push_str(&section("Meta"));
    let meta = artifact.get("meta").cloned().unwrap_or(Value::Null);
    if let Some(map) = meta.as_object() {
        for (key, value) in map {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            out.push_str(&format!("- {}: {}\n", key, rendered));
        }
    }
    let duration = meta
        .get("waitElapsedMs")
        .and_then(Value::as_u64)
        .map(|ms| format!("{} ms", ms))
        .unwrap_or_else(|| "—".to_string());
    out.push_str(&format!("- Duration: {}\n", duration));
    let timed_out = meta
        .get("timedOut")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    out.push_str(&format!(
        "- Timed out: {}\n",
        if timed_out { "yes" } else { "no" }
    ));

    out
}

/// Transcript items sorted by `createdAtMs`; items without one sort first.
fn render_transcript(out: &mut String, transcripts: &[Value]) {
    let mut sorted: Vec<&Value> = transcripts.iter().collect();
    sorted.sort_by_key(|item| item.get("createdAtMs").and_then(Value::as_i64).unwrap_or(0));

    for item in sorted {
        let ts = item
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                item.get("createdAtMs")
                    .and_then(Value::as_i64)
                    .map(|ms| ms.to_string())
                    .unwrap_or_else(|| "—".to_string())
            });
        let title = item.get("title").and_then(Value::as_str).unwrap_or("");
        match item.get("type").and_then(Value::as_str) {
            Some("MESSAGE") => {
                let role = match item.get("role").and_then(Value::as_str) {
                    Some("user") => "USER",
                    _ => "ASSISTANT",
                };
                let hidden = if item
                    .get("isHidden")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    " (hidden)"
                } else {
                    ""
                };
                out.push_str(&format!("- [{}] {}{}: {}\n", ts, role, hidden, title));
            }
            Some("TOOL_NOTE") => {
                out.push_str(&format!("- [{}] TOOL {}", ts, title));
                match item.get("data") {
                    Some(data) if !data.is_null() => {
                        out.push_str(&format!("\n    {}\n", indented_json(Some(data))));
                    }
                    _ => out.push('\n'),
                }
            }
            Some("BREADCRUMB") => {
                out.push_str(&format!("- [{}] NOTE: {}\n", ts, title));
            }
            _ => {}
        }
    }
}

fn render_tool_events(out: &mut String, events: &[Value]) {
    for ev in events {
        let name = event_name(ev);
        let is_tool = name.contains("mcp_tool_call")
            || name.contains("function_call")
            || name.contains("mcp_call");
        if !is_tool {
            continue;
        }
        let direction = ev
            .get("direction")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_uppercase();
        out.push_str(&format!(
            "- {} {}\n    {}\n",
            direction,
            name,
            indented_json(ev.get("eventData"))
        ));
    }
}

fn section(title: &str) -> String {
    format!("\n=== {} ===\n", title)
}

fn event_name(event: &Value) -> &str {
    event.get("eventName").and_then(Value::as_str).unwrap_or("")
}

fn as_array(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Pretty JSON with continuation lines indented to sit under the bullet.
fn indented_json(value: Option<&Value>) -> String {
    let value = value.unwrap_or(&Value::Null);
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    pretty.replace('\n', "\n    ")
}

/// Normalizes a parseable timestamp to UTC RFC 3339; anything else passes
/// through, and absence renders as a dash.
fn format_timestamp(ts: Option<&str>) -> String {
    match ts {
        None | Some("") => "—".to_string(),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(parsed) => parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            Err(_) => raw.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn timestamp_normalizes_or_passes_through() {
        assert_eq!(format_timestamp(None), "—");
        assert_eq!(format_timestamp(Some("")), "—");
        assert_eq!(
            format_timestamp(Some("2026-08-30T12:00:00+02:00")),
            "2026-08-30T10:00:00.000Z"
        );
        assert_eq!(format_timestamp(Some("not a date")), "not a date");
    }

    #[test]
    fn empty_artifact_renders_placeholders() {
        let rendered = render_report(&json!({}), &PathBuf::from("run.json"));
        assert!(rendered.contains("[no transcript items]"));
        assert!(rendered.contains("[no events]"));
        assert!(rendered.contains("[none]"));
        assert!(rendered.contains("- Duration: —"));
        assert!(rendered.contains("- Timed out: no"));
    }

    #[test]
    fn transcript_sorts_by_creation_time() {
        let artifact = json!({
            "structured": {
                "transcripts": [
                    { "type": "MESSAGE", "role": "assistant", "title": "second", "createdAtMs": 2000 },
                    { "type": "MESSAGE", "role": "user", "title": "first", "createdAtMs": 1000 }
                ],
                "events": []
            }
        });
        let rendered = render_report(&artifact, &PathBuf::from("run.json"));
        let first = rendered.find("first").unwrap();
        let second = rendered.find("second").unwrap();
        assert!(first < second);
        assert!(rendered.contains("USER: first"));
        assert!(rendered.contains("ASSISTANT: second"));
    }

    #[test]
    fn tool_events_and_errors_are_sectioned() {
        let artifact = json!({
            "consoleLogs": [
                { "type": "error", "text": "boom" },
                { "type": "log", "text": "fine" }
            ],
            "structured": {
                "transcripts": [],
                "events": [
                    {
                        "eventName": "response.mcp_call.started",
                        "direction": "outbound",
                        "eventData": { "name": "resolve_wallet" }
                    },
                    { "eventName": "session.error", "eventData": { "code": 500 } }
                ]
            },
            "meta": { "waitElapsedMs": 1234, "timedOut": true }
        });
        let rendered = render_report(&artifact, &PathBuf::from("run.json"));
        assert!(rendered.contains("- OUTBOUND response.mcp_call.started"));
        assert!(rendered.contains("- console.error: boom"));
        assert!(!rendered.contains("console.log: fine"));
        assert!(rendered.contains("- event session.error"));
        assert!(rendered.contains("- Duration: 1234 ms"));
        assert!(rendered.contains("- Timed out: yes"));
    }

    #[test]
    fn hidden_messages_and_tool_notes_render() {
        let artifact = json!({
            "structured": {
                "transcripts": [
                    {
                        "type": "MESSAGE", "role": "user", "title": "hi",
                        "isHidden": true, "createdAtMs": 1, "timestamp": "12:00:00"
                    },
                    {
                        "type": "TOOL_NOTE", "title": "lookup",
                        "data": { "ok": true }, "createdAtMs": 2
                    },
                    { "type": "BREADCRUMB", "title": "agent switched", "createdAtMs": 3 }
                ],
                "events": []
            }
        });
        let rendered = render_report(&artifact, &PathBuf::from("run.json"));
        assert!(rendered.contains("USER (hidden): hi"));
        assert!(rendered.contains("TOOL lookup"));
        assert!(rendered.contains("NOTE: agent switched"));
    }
}
