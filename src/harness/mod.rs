//! Harness orchestration
//!
//! `run_harness` is the single entry point: it validates configuration
//! before any resource exists, boots the session, drives the conversation,
//! and persists the artifact. The browser is closed exactly once on both
//! the success and failure paths; teardown failure after an error is
//! swallowed so the original error propagates unchanged.

pub mod artifact;
pub mod conversation;
pub mod navigation;
pub mod quiescence;
pub mod session;
pub mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use colored::Colorize;

use crate::config::HarnessConfig;
use artifact::{Artifact, ArtifactMeta};
use quiescence::ActivityTracker;
use session::Session;
use telemetry::TelemetryCollector;

/// What a completed run hands back to the caller.
pub struct HarnessRun {
    pub artifact: Artifact,
    pub artifact_path: Option<PathBuf>,
    pub storage_state_path: Option<PathBuf>,
}

/// Runs one scripted conversation and returns its artifact.
pub async fn run_harness(config: HarnessConfig) -> Result<HarnessRun> {
    config.validate()?;
    let artifact_dir = artifact::resolve_output_dir(config.output_dir.as_deref());

    let session = session::launch(&config).await?;
    let outcome = drive(&session, &config, &artifact_dir).await;
    match outcome {
        Ok(run) => {
            session
                .browser
                .close()
                .await
                .context("failed to close browser")?;
            Ok(run)
        }
        Err(err) => {
            // Best-effort teardown; the original error is what matters.
            let _ = session.browser.close().await;
            Err(err)
        }
    }
}

async fn drive(session: &Session, config: &HarnessConfig, artifact_dir: &Path) -> Result<HarnessRun> {
    let activity = ActivityTracker::new();

    // Listeners attach strictly before navigation so no early telemetry
    // is lost.
    let telemetry = TelemetryCollector::attach(&session.page, activity.clone());

    navigation::open(&session.page, &config.target_url).await?;
    conversation::perform_handshake(&session.page).await?;
    conversation::send_message(&session.page, &config.prompt).await?;

    let follow_ups = config.follow_ups();
    conversation::send_follow_ups(&session.page, &follow_ups, config.follow_up_delay_ms).await?;

    let outcome = quiescence::watch_transcript(
        &session.page,
        config.expected_assistant_messages(),
        config.wait_ms,
        activity,
    )
    .await?;

    let structured = telemetry::structured_snapshot(&session.page).await?;
    let transcript_bubbles = telemetry::transcript_bubbles(&session.page).await?;
    let console_logs = telemetry.console_logs();
    let console_error_count = artifact::count_console_errors(&console_logs);

    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let artifact = Artifact {
        timestamp,
        prompt: config.prompt.clone(),
        url: config.target_url.clone(),
        wait_ms: config.wait_ms,
        console_logs,
        transcript_bubbles,
        structured,
        meta: ArtifactMeta {
            assistant_message_count: outcome.assistant_count,
            wait_elapsed_ms: outcome.wait_elapsed_ms,
            timed_out: outcome.timed_out,
            console_error_count,
        },
    };

    let artifact_path = if config.save_artifact {
        let path = artifact::write_artifact(artifact_dir, &artifact)?;
        println!(
            "{} Harness artifact written to {}",
            "📄".green(),
            path.display()
        );
        Some(path)
    } else {
        None
    };

    let storage_state_path = match &config.storage_state_path {
        Some(path) => artifact::save_storage_state(&session.context, path).await,
        None => None,
    };

    Ok(HarnessRun {
        artifact,
        artifact_path,
        storage_state_path,
    })
}
