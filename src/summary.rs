//! Two-column conversation summary
//!
//! Renders the structured event log as a side-by-side transcript:
//! assistant turns and tool calls on the left, user turns on the right.
//! Built from `structured.events` rather than the DOM bubbles, because
//! the events carry roles and timestamps the DOM does not.

use serde_json::Value;

use crate::harness::artifact::Artifact;

const COLUMN_WIDTH: usize = 60;
const TOOL_TRUNCATE_LEN: usize = 140;

#[derive(Debug)]
enum Row {
    Message {
        role: Role,
        text: String,
        timestamp: String,
    },
    Tool {
        name: String,
        args: String,
        output: Option<String>,
        timestamp: String,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
    Other,
}

/// Renders the artifact's structured events as a two-column transcript.
pub fn render_summary(artifact: &Artifact) -> String {
    let events = match artifact.structured.events.as_array() {
        Some(events) if !events.is_empty() => events,
        _ => return "No structured events captured.\n".to_string(),
    };

    let transcripts = artifact
        .structured
        .transcripts
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let rows = collect_rows(events, transcripts);
    if rows.is_empty() {
        return "No conversation items recorded.\n".to_string();
    }

    let mut lines = Vec::new();
    lines.push(format!(
        "{}│ User (right)",
        pad_right("Assistant (left)", COLUMN_WIDTH)
    ));
    lines.push(format!(
        "{}┼{}",
        "─".repeat(COLUMN_WIDTH),
        "─".repeat(COLUMN_WIDTH)
    ));

    for row in &rows {
        let (left, right): (Vec<String>, Vec<String>) = match row {
            Row::Message {
                role,
                text,
                timestamp,
            } => match role {
                Role::Assistant => (column_lines(text, timestamp), Vec::new()),
                Role::User => (Vec::new(), column_lines(text, timestamp)),
                Role::Other => (Vec::new(), Vec::new()),
            },
            Row::Tool {
                name,
                args,
                output,
                timestamp,
            } => {
                let mut segments = vec![format!("↳ tool {}", name)];
                if !args.is_empty() {
                    segments.push(format!("  args: {}", truncate(args, TOOL_TRUNCATE_LEN)));
                }
                if let Some(output) = output {
                    segments.push(format!("  result: {}", truncate(output, TOOL_TRUNCATE_LEN)));
                }
                (column_lines(&segments.join("\n"), timestamp), Vec::new())
            }
        };

        let height = left.len().max(right.len()).max(1);
        for i in 0..height {
            let left_cell = left.get(i).map(String::as_str).unwrap_or("");
            let right_cell = right.get(i).map(String::as_str).unwrap_or("");
            lines.push(format!(
                "{}│ {}",
                pad_right(left_cell, COLUMN_WIDTH),
                right_cell
            ));
        }
    }

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

fn collect_rows(events: &[Value], transcripts: &[Value]) -> Vec<Row> {
    let rows_from = |event: &Value| -> Option<Row> {
        if event.get("eventName")?.as_str()? != "conversation.item.created" {
            return None;
        }
        let item = event.get("eventData")?.get("item")?;
        let timestamp = event
            .get("timestamp")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        match item.get("type").and_then(Value::as_str) {
            Some("message") => {
                let role = match item.get("role").and_then(Value::as_str) {
                    Some("user") => Role::User,
                    Some("assistant") => Role::Assistant,
                    _ => Role::Other,
                };
                let item_id = first_string(item, &["id", "item_id", "itemId"]);
                let mut text = extract_message_text(item);
                if text.is_empty() {
                    if let Some(id) = item_id {
                        text = transcript_title(transcripts, &id).unwrap_or_default();
                    }
                }
                if text.is_empty() {
                    text = "[no text captured]".to_string();
                }
                Some(Row::Message {
                    role,
                    text,
                    timestamp,
                })
            }
            Some("mcp_call") => {
                let item_id = first_string(item, &["id", "item_id"]);
                let output = item_id.and_then(|id| tool_output(events, &id));
                Some(Row::Tool {
                    name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("mcp_call")
                        .to_string(),
                    args: item
                        .get("arguments")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .unwrap_or("")
                        .to_string(),
                    output,
                    timestamp,
                })
            }
            _ => None,
        }
    };
    events.iter().filter_map(rows_from).collect()
}

/// Output of a completed tool call, keyed by the call item's id and found in
/// the matching `response.output_item.done` event.
fn tool_output(events: &[Value], item_id: &str) -> Option<String> {
    events.iter().find_map(|event| {
        if event.get("eventName")?.as_str()? != "response.output_item.done" {
            return None;
        }
        let data = event.get("eventData")?;
        let item = data.get("item")?;
        if item.get("type")?.as_str()? != "mcp_call" {
            return None;
        }
        let done_id = item
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| data.get("item_id").and_then(Value::as_str))?;
        if done_id != item_id {
            return None;
        }
        match item.get("output") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    })
}

fn transcript_title(transcripts: &[Value], item_id: &str) -> Option<String> {
    transcripts.iter().find_map(|item| {
        if item.get("itemId")?.as_str()? != item_id {
            return None;
        }
        let title = item.get("title")?.as_str()?.trim();
        if title.is_empty() {
            None
        } else {
            Some(title.to_string())
        }
    })
}

fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        item.get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

/// Joins the text and transcript parts of a message item's content array.
fn extract_message_text(item: &Value) -> String {
    let parts = match item.get("content").and_then(Value::as_array) {
        Some(parts) => parts,
        None => return String::new(),
    };
    let joined: Vec<&str> = parts
        .iter()
        .filter_map(|part| {
            part.get("text")
                .and_then(Value::as_str)
                .or_else(|| part.get("transcript").and_then(Value::as_str))
        })
        .filter(|text| !text.is_empty())
        .collect();
    joined.join(" ").trim().to_string()
}

/// Wraps text at word boundaries, timestamping the first line and indenting
/// continuations to match.
fn column_lines(text: &str, timestamp: &str) -> Vec<String> {
    let reserved = if timestamp.is_empty() {
        0
    } else {
        timestamp.chars().count() + 2
    };
    let width = COLUMN_WIDTH.saturating_sub(reserved).max(1);
    wrap_text(text, width)
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            if timestamp.is_empty() {
                line
            } else if index == 0 {
                format!("{}  {}", timestamp, line)
            } else {
                format!("{}{}", " ".repeat(reserved), line)
            }
        })
        .collect()
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return vec![String::new()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in trimmed.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else if candidate_len > width {
            // A single word longer than the column goes out on its own line.
            lines.push(word.to_string());
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn pad_right(value: &str, width: usize) -> String {
    let len = value.chars().count();
    if len >= width {
        value.to_string()
    } else {
        format!("{}{}", value, " ".repeat(width - len))
    }
}

fn truncate(value: &str, length: usize) -> String {
    if value.chars().count() > length {
        let head: String = value.chars().take(length.saturating_sub(1)).collect();
        format!("{}…", head)
    } else {
        value.to_string()
    }
}
