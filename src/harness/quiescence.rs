//! Turn-completion inference
//!
//! The chat UI never announces that the agent finished a turn, so
//! completion is inferred from DOM text stability: the run is done once the
//! expected number of assistant-attributed lines has rendered AND nothing
//! has changed for a quiet window. Neither condition is safe alone: a
//! counted turn may still be streaming tokens, and a quiet page may simply
//! be one turn short, so the detector requires both. An independent
//! absolute deadline bounds the whole wait and exits as timed-out.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use playwright::api::Page;

/// Transcript lines carrying this prefix are ephemeral/system output and do
/// not count as assistant turns.
pub const EPHEMERAL_PREFIX: char = '▶';

/// CSS class the collaborator UI renders visible turn text into.
pub const TRANSCRIPT_SELECTOR: &str = ".whitespace-pre-wrap";

pub const POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const QUIET_WINDOW: Duration = Duration::from_millis(5000);

/// Shared last-activity timestamp.
///
/// Written by both the transcript poll and the telemetry listeners (log
/// output is itself liveness evidence); reads observe the latest write.
/// Updates are monotonic so out-of-order producers can never move the
/// timestamp backwards.
#[derive(Clone)]
pub struct ActivityTracker {
    last: Arc<Mutex<Instant>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, now: Instant) {
        if let Ok(mut last) = self.last.lock() {
            if now > *last {
                *last = now;
            }
        }
    }

    /// Time elapsed since the most recent activity, as seen at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        match self.last.lock() {
            Ok(last) => now.saturating_duration_since(*last),
            Err(_) => Duration::ZERO,
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The two-part exit predicate, kept as one cohesive type so it can be
/// exercised without a browser. All methods take `now` explicitly.
pub struct QuiescenceDetector {
    expected_assistant_messages: usize,
    quiet_window: Duration,
    previous_texts: Vec<String>,
    assistant_count: usize,
    activity: ActivityTracker,
}

impl QuiescenceDetector {
    /// Seeds the detector with the transcript state observed before the
    /// wait starts, so pre-existing lines do not register as activity.
    pub fn new(
        expected_assistant_messages: usize,
        quiet_window: Duration,
        initial_texts: Vec<String>,
        activity: ActivityTracker,
    ) -> Self {
        let assistant_count = assistant_visible_count(&initial_texts);
        Self {
            expected_assistant_messages,
            quiet_window,
            previous_texts: initial_texts,
            assistant_count,
            activity,
        }
    }

    /// Feeds one poll-tick snapshot of the ordered transcript texts.
    pub fn observe(&mut self, texts: Vec<String>, now: Instant) {
        let changed = texts.len() != self.previous_texts.len()
            || texts
                .iter()
                .zip(self.previous_texts.iter())
                .any(|(current, previous)| current != previous);
        if changed {
            self.activity.touch_at(now);
        }

        // A new assistant message always counts as activity, even when the
        // generic diff happened to miss it.
        let assistant = assistant_visible_count(&texts);
        if assistant > self.assistant_count {
            self.assistant_count = assistant;
            self.activity.touch_at(now);
        }

        self.previous_texts = texts;
    }

    /// True once enough assistant turns rendered and the quiet window has
    /// elapsed since the last observed activity.
    pub fn is_satisfied(&self, now: Instant) -> bool {
        self.assistant_count >= self.expected_assistant_messages
            && self.activity.idle_for(now) > self.quiet_window
    }

    pub fn assistant_count(&self) -> usize {
        self.assistant_count
    }
}

fn assistant_visible_count(texts: &[String]) -> usize {
    texts
        .iter()
        .filter(|text| !text.starts_with(EPHEMERAL_PREFIX))
        .count()
}

/// Result of one completed wait.
#[derive(Debug, Clone)]
pub struct QuiescenceOutcome {
    pub assistant_count: usize,
    pub wait_elapsed_ms: u64,
    pub timed_out: bool,
}

/// Polls the rendered transcript until the detector is satisfied or the
/// absolute deadline expires. Deadline expiry is a soft timeout: the
/// outcome records it, the run continues to the snapshot phase.
pub async fn watch_transcript(
    page: &Page,
    expected_assistant_messages: usize,
    wait_ms: u64,
    activity: ActivityTracker,
) -> Result<QuiescenceOutcome> {
    let start = Instant::now();
    let deadline = start + Duration::from_millis(wait_ms);

    let initial = read_transcript_texts(page).await?;
    let mut detector = QuiescenceDetector::new(
        expected_assistant_messages,
        QUIET_WINDOW,
        initial,
        activity,
    );

    while Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
        let texts = read_transcript_texts(page).await?;
        let now = Instant::now();
        detector.observe(texts, now);
        if detector.is_satisfied(now) {
            break;
        }
    }

    let timed_out = Instant::now() >= deadline;
    Ok(QuiescenceOutcome {
        assistant_count: detector.assistant_count(),
        wait_elapsed_ms: start.elapsed().as_millis() as u64,
        timed_out,
    })
}

/// Snapshot of the ordered, whitespace-normalized transcript texts.
pub(crate) async fn read_transcript_texts(page: &Page) -> Result<Vec<String>> {
    let script = format!(
        r#"() => Array.from(document.querySelectorAll('{selector}'))
            .map((el) => el.innerText.replace(/\s+/g, ' ').trim())
            .filter(Boolean)"#,
        selector = TRANSCRIPT_SELECTOR
    );
    page.evaluate(&script, ())
        .await
        .context("failed to read transcript texts")
}
