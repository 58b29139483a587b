//! Passive page telemetry
//!
//! Console, page-error and response listeners attach before navigation so
//! no early output is lost. Console and page-error events feed the run log
//! and refresh the shared activity timestamp; failing responses go to the
//! operator stream only, with query strings stripped from the URL.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use futures::StreamExt;
use playwright::api::page::Event;
use playwright::api::Page;

use crate::harness::artifact::{ConsoleLogEntry, StructuredState, TranscriptBubble};
use crate::harness::quiescence::{ActivityTracker, TRANSCRIPT_SELECTOR};

/// In-page snapshot of the collaborator's structured log globals. The clone
/// is bounded and cycle-safe: functions become `"[Function]"`, `Error`
/// instances become `{name, message, stack}`, and any object seen twice in
/// one traversal becomes `"[Circular]"` instead of being re-traversed, so
/// the result always terminates and round-trips through JSON.
const STRUCTURED_SNAPSHOT_SCRIPT: &str = r#"() => {
  const cloneSerializable = (value) => {
    const seen = new WeakSet();
    return JSON.parse(
      JSON.stringify(value, (_key, val) => {
        if (typeof val === 'function') {
          return '[Function]';
        }
        if (typeof val === 'object' && val !== null) {
          if (seen.has(val)) {
            return '[Circular]';
          }
          seen.add(val);
        }
        if (val instanceof Error) {
          return { name: val.name, message: val.message, stack: val.stack };
        }
        return val;
      }),
    );
  };

  return {
    events: typeof window !== 'undefined'
      ? cloneSerializable(window.__DEXTER_EVENT_LOGS__ ?? [])
      : [],
    transcripts: typeof window !== 'undefined'
      ? cloneSerializable(window.__DEXTER_TRANSCRIPT_ITEMS__ ?? [])
      : [],
  };
}"#;

/// Collects console/page-error events for the lifetime of a page session.
pub struct TelemetryCollector {
    logs: Arc<Mutex<Vec<ConsoleLogEntry>>>,
}

impl TelemetryCollector {
    /// Subscribes to the page's event stream. Must be called before
    /// navigation so load-time telemetry is captured.
    pub fn attach(page: &Page, activity: ActivityTracker) -> Self {
        let logs: Arc<Mutex<Vec<ConsoleLogEntry>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = logs.clone();
        let events = match page.subscribe_event() {
            Ok(events) => events,
            Err(_) => return Self { logs },
        };

        tokio::spawn(async move {
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                // A lagged receiver drops events; the stream stays live.
                let event = match event {
                    Ok(event) => event,
                    Err(_) => continue,
                };
                match event {
                    Event::Console(message) => {
                        let entry = console_entry(
                            message.r#type().unwrap_or_default(),
                            message.text().unwrap_or_default(),
                        );
                        // Relay in real time so the operator sees progress.
                        println!("[console:{}] {}", entry.kind, entry.text);
                        record(&sink, &activity, entry);
                    }
                    Event::PageError => {
                        // The wire layer carries no error payload, only the
                        // fact that one fired.
                        let entry = page_error_entry();
                        eprintln!("[pageerror] {}", entry.text);
                        record(&sink, &activity, entry);
                    }
                    Event::Response(response) => {
                        let Ok(status) = response.status() else {
                            continue;
                        };
                        if status >= 400 {
                            // Operator stream only; never persisted, and the
                            // URL is reduced so query-string secrets stay out
                            // of terminal scrollback.
                            let url = response.url().unwrap_or_default();
                            eprintln!("[response:{}] {}", status, reduce_url(&url));
                        }
                    }
                    _ => {}
                }
            }
        });

        Self { logs }
    }

    /// The run-scoped console log in arrival order.
    pub fn console_logs(&self) -> Vec<ConsoleLogEntry> {
        match self.logs.lock() {
            Ok(logs) => logs.clone(),
            Err(_) => Vec::new(),
        }
    }
}

fn console_entry(kind: String, text: String) -> ConsoleLogEntry {
    ConsoleLogEntry { kind, text }
}

fn page_error_entry() -> ConsoleLogEntry {
    ConsoleLogEntry {
        kind: "pageerror".to_string(),
        text: "uncaught page error (no detail exposed by the driver)".to_string(),
    }
}

/// Appends to the run log and refreshes the shared activity timestamp; log
/// output is itself liveness evidence.
fn record(
    sink: &Arc<Mutex<Vec<ConsoleLogEntry>>>,
    activity: &ActivityTracker,
    entry: ConsoleLogEntry,
) {
    if let Ok(mut logs) = sink.lock() {
        logs.push(entry);
    }
    activity.touch();
}

/// Strips query string and fragment, keeping origin + path.
pub(crate) fn reduce_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => format!("{}{}", parsed.origin().ascii_serialization(), parsed.path()),
        Err(_) => raw.to_string(),
    }
}

/// One-shot read of the page's structured event and transcript logs.
pub async fn structured_snapshot(page: &Page) -> Result<StructuredState> {
    let value: serde_json::Value = page
        .evaluate(STRUCTURED_SNAPSHOT_SCRIPT, ())
        .await
        .context("failed to snapshot structured page state")?;
    serde_json::from_value(value).context("structured snapshot had an unexpected shape")
}

/// Visible transcript bubbles with their class lists, for the artifact.
pub async fn transcript_bubbles(page: &Page) -> Result<Vec<TranscriptBubble>> {
    let script = format!(
        r#"() => Array.from(document.querySelectorAll('{selector}'))
            .map((el) => ({{ text: el.innerText, classes: el.className }}))
            .filter((item) => item.text && item.text.trim().length > 0)"#,
        selector = TRANSCRIPT_SELECTOR
    );
    page.evaluate(&script, ())
        .await
        .context("failed to read transcript bubbles")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_entries_keep_arrival_order() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let tracker = ActivityTracker::new();
        record(
            &sink,
            &tracker,
            console_entry("log".to_string(), "booting".to_string()),
        );
        record(&sink, &tracker, page_error_entry());

        let logs = sink.lock().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].kind, "log");
        assert_eq!(logs[0].text, "booting");
        // Page errors arrive without a payload; the entry still lands in
        // the run log under its own kind.
        assert_eq!(logs[1].kind, "pageerror");
        assert!(!logs[1].text.is_empty());
    }

    #[test]
    fn reduce_url_drops_query_and_fragment() {
        assert_eq!(
            reduce_url("https://api.dexter.cash/realtime/sessions?token=secret#frag"),
            "https://api.dexter.cash/realtime/sessions"
        );
    }

    #[test]
    fn reduce_url_keeps_unparseable_input() {
        assert_eq!(reduce_url("not a url"), "not a url");
    }

    #[test]
    fn snapshot_script_handles_cycles_and_functions() {
        // The replacer must cover every non-serializable shape the page can
        // produce; these markers are the artifact's contract.
        assert!(STRUCTURED_SNAPSHOT_SCRIPT.contains("'[Circular]'"));
        assert!(STRUCTURED_SNAPSHOT_SCRIPT.contains("'[Function]'"));
        assert!(STRUCTURED_SNAPSHOT_SCRIPT.contains("val instanceof Error"));
        assert!(STRUCTURED_SNAPSHOT_SCRIPT.contains("__DEXTER_EVENT_LOGS__"));
        assert!(STRUCTURED_SNAPSHOT_SCRIPT.contains("__DEXTER_TRANSCRIPT_ITEMS__"));
    }

    #[test]
    fn snapshot_shape_deserializes_into_structured_state() {
        let value = serde_json::json!({
            "events": [{ "eventName": "session.created" }],
            "transcripts": [],
        });
        let state: StructuredState = serde_json::from_value(value).unwrap();
        assert!(state.events.is_array());
        assert!(state.transcripts.is_array());
    }
}
