//! Run artifact schema and persistence
//!
//! One JSON artifact per run, written exactly once and never updated. The
//! filename derives from the run's ISO timestamp with `:` and `.` replaced,
//! so lexicographic order equals chronological order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use playwright::api::BrowserContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_OUTPUT_DIR: &str = "harness-results";

/// One captured console or page-error event, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleLogEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// A visible transcript bubble at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptBubble {
    pub text: String,
    pub classes: String,
}

/// Read-only snapshot of the collaborator UI's structured logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredState {
    pub events: Value,
    pub transcripts: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    pub assistant_message_count: usize,
    pub wait_elapsed_ms: u64,
    pub timed_out: bool,
    pub console_error_count: usize,
}

/// The single persisted record summarizing one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub timestamp: String,
    pub prompt: String,
    pub url: String,
    pub wait_ms: u64,
    pub console_logs: Vec<ConsoleLogEntry>,
    pub transcript_bubbles: Vec<TranscriptBubble>,
    pub structured: StructuredState,
    pub meta: ArtifactMeta,
}

/// Resolves the artifact directory. The caller value is used verbatim,
/// except paths beginning with `~`: shell expansion never ran for values
/// arriving via an API, so a literal `~` directory would be created. Those
/// are rejected with a warning and replaced by the library default.
pub fn resolve_output_dir(raw: Option<&str>) -> PathBuf {
    let fallback = PathBuf::from(DEFAULT_OUTPUT_DIR);
    let Some(raw) = raw else {
        return fallback;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return fallback;
    }
    if trimmed == "~" || trimmed.starts_with("~/") || trimmed.starts_with("~\\") {
        log::warn!(
            "Ignoring unsafe output directory {:?} - using {}/ instead",
            trimmed,
            DEFAULT_OUTPUT_DIR
        );
        return fallback;
    }
    PathBuf::from(trimmed)
}

/// `run-<timestamp>.json` with `:` and `.` replaced so the name is
/// filesystem-safe and sorts chronologically.
pub fn artifact_filename(timestamp: &str) -> String {
    format!("run-{}.json", timestamp.replace([':', '.'], "-"))
}

pub fn count_console_errors(logs: &[ConsoleLogEntry]) -> usize {
    logs.iter().filter(|log| log.kind == "error").count()
}

/// Writes the artifact, creating parent directories as needed.
pub fn write_artifact(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    let path = dir.join(artifact_filename(&artifact.timestamp));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create artifact directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(artifact)?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write artifact {}", path.display()))?;
    Ok(path)
}

/// Saves the context's storage state. Independent of the artifact write: a
/// failure here is logged and never invalidates an already-written artifact.
pub async fn save_storage_state(context: &BrowserContext, path: &Path) -> Option<PathBuf> {
    match save_storage_state_inner(context, path).await {
        Ok(saved) => {
            println!("Storage state written to {}", saved.display());
            Some(saved)
        }
        Err(err) => {
            log::warn!("Failed to write storage state: {:#}", err);
            None
        }
    }
}

async fn save_storage_state_inner(context: &BrowserContext, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let state = context.storage_state().await?;
    std::fs::write(path, serde_json::to_string_pretty(&state)?)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_artifact() -> Artifact {
        Artifact {
            timestamp: "2024-05-01T12:30:45.123Z".to_string(),
            prompt: "Check my wallet".to_string(),
            url: "https://beta.dexter.cash/".to_string(),
            wait_ms: 45000,
            console_logs: vec![
                ConsoleLogEntry {
                    kind: "log".to_string(),
                    text: "booting".to_string(),
                },
                ConsoleLogEntry {
                    kind: "error".to_string(),
                    text: "boom".to_string(),
                },
            ],
            transcript_bubbles: vec![TranscriptBubble {
                text: "hello".to_string(),
                classes: "whitespace-pre-wrap".to_string(),
            }],
            structured: StructuredState {
                events: json!([{ "eventName": "session.created" }]),
                transcripts: json!([]),
            },
            meta: ArtifactMeta {
                assistant_message_count: 1,
                wait_elapsed_ms: 6200,
                timed_out: false,
                console_error_count: 1,
            },
        }
    }

    #[test]
    fn tilde_paths_fall_back_to_the_default_dir() {
        // "~/results" must not create a literal ~ directory.
        assert_eq!(
            resolve_output_dir(Some("~/results")),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
        assert_eq!(
            resolve_output_dir(Some("~")),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
        assert_eq!(
            resolve_output_dir(Some("~\\results")),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
    }

    #[test]
    fn explicit_dirs_are_used_verbatim() {
        assert_eq!(
            resolve_output_dir(Some("  runs/today  ")),
            PathBuf::from("runs/today")
        );
        assert_eq!(
            resolve_output_dir(None),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
        assert_eq!(
            resolve_output_dir(Some("   ")),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
    }

    #[test]
    fn filenames_sort_chronologically() {
        let earlier = artifact_filename("2024-05-01T12:30:45.123Z");
        let later = artifact_filename("2024-05-01T12:31:02.004Z");
        assert_eq!(earlier, "run-2024-05-01T12-30-45-123Z.json");
        assert!(earlier < later);
    }

    #[test]
    fn console_error_count_matches_error_entries() {
        let artifact = sample_artifact();
        assert_eq!(count_console_errors(&artifact.console_logs), 1);
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let artifact = sample_artifact();
        let json = serde_json::to_string_pretty(&artifact).unwrap();
        // Wire names follow the artifact schema, not Rust field names.
        assert!(json.contains("\"waitMs\""));
        assert!(json.contains("\"consoleLogs\""));
        assert!(json.contains("\"transcriptBubbles\""));
        assert!(json.contains("\"assistantMessageCount\""));
        let parsed: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.meta.wait_elapsed_ms, 6200);
        assert_eq!(parsed.console_logs[1].kind, "error");
    }

    #[test]
    fn serializing_twice_yields_equal_trees() {
        let artifact = sample_artifact();
        let first = serde_json::to_value(&artifact).unwrap();
        let second = serde_json::to_value(&artifact).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn write_artifact_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep/run-output");
        let artifact = sample_artifact();
        let path = write_artifact(&nested, &artifact).unwrap();
        assert!(path.exists());
        let parsed: Artifact =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.prompt, "Check my wallet");
    }
}
