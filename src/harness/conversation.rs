//! Driving the chat UI like a user
//!
//! The realtime handshake controls are best-effort: a missing "Connect"
//! button just means the session is already live. Message submission is
//! not: the send control may stay disabled while the realtime connection
//! establishes, with no push notification of readiness, so its enabled
//! state is polled and expiry is a hard, named failure.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use playwright::api::{ElementHandle, Page};

use crate::error::HarnessError;

/// Known chat-input placeholders, tried in priority order; the first match
/// wins. Multiple UI skins are in circulation.
pub const INPUT_PLACEHOLDERS: [&str; 3] = [
    "Ask Dexter anything",
    "Type a question or directive",
    "Type a message...",
];

pub const SEND_BUTTON_SELECTOR: &str = r#"button:has(img[alt="Send"])"#;

const CONNECT_SELECTOR: &str = r#"button:text("Connect")"#;
const DISCONNECT_SELECTOR: &str = r#"button:text("Disconnect")"#;
const START_CONVERSATION_SELECTOR: &str = r#"button:text("Start Conversation")"#;

const HANDSHAKE_TIMEOUT_MS: f64 = 30_000.0;
const INPUT_LOCATE_TIMEOUT: Duration = Duration::from_secs(30);
const INPUT_LOCATE_INTERVAL: Duration = Duration::from_millis(250);
const SEND_POLL_ATTEMPTS: u32 = 60;
const SEND_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Optional realtime handshake: click an enabled "Connect", wait (bounded,
/// failure swallowed) for "Disconnect" as a readiness signal, then click
/// "Start Conversation" if present.
pub async fn perform_handshake(page: &Page) -> Result<()> {
    if let Some(connect) = page.query_selector(CONNECT_SELECTOR).await? {
        if connect.get_attribute("disabled").await?.is_none() {
            connect
                .click_builder()
                .click()
                .await
                .context("failed to click Connect")?;
        }
    }

    let _ = page
        .wait_for_selector_builder(DISCONNECT_SELECTOR)
        .timeout(HANDSHAKE_TIMEOUT_MS)
        .wait_for_selector()
        .await;

    if let Some(start) = page.query_selector(START_CONVERSATION_SELECTOR).await? {
        let _ = start.click_builder().click().await;
    }
    Ok(())
}

/// Fills the chat input and clicks send on its first enabled observation.
pub async fn send_message(page: &Page, text: &str) -> Result<()> {
    let input = locate_chat_input(page).await?;
    input
        .fill_builder(text)
        .fill()
        .await
        .context("failed to fill chat input")?;

    page.wait_for_selector_builder(SEND_BUTTON_SELECTOR)
        .timeout(HANDSHAKE_TIMEOUT_MS)
        .wait_for_selector()
        .await
        .map_err(|_| {
            HarnessError::InteractionTimeout("send button never became visible".to_string())
        })?;

    for _ in 0..SEND_POLL_ATTEMPTS {
        if let Some(button) = page.query_selector(SEND_BUTTON_SELECTOR).await? {
            if button.is_enabled().await? {
                button
                    .click_builder()
                    .click()
                    .await
                    .context("failed to click send")?;
                return Ok(());
            }
        }
        tokio::time::sleep(SEND_POLL_INTERVAL).await;
    }
    Err(HarnessError::InteractionTimeout(
        "Send button was not enabled before timeout".to_string(),
    )
    .into())
}

/// Sends follow-up prompts sequentially, each preceded by the configured
/// delay; zero means back-to-back.
pub async fn send_follow_ups(page: &Page, prompts: &[String], delay_ms: u64) -> Result<()> {
    for message in prompts {
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        send_message(page, message).await?;
    }
    Ok(())
}

async fn locate_chat_input(page: &Page) -> Result<ElementHandle> {
    let deadline = Instant::now() + INPUT_LOCATE_TIMEOUT;
    loop {
        for placeholder in INPUT_PLACEHOLDERS {
            let selector = placeholder_selector(placeholder);
            if let Some(input) = page.query_selector(&selector).await? {
                return Ok(input);
            }
        }
        if Instant::now() >= deadline {
            return Err(HarnessError::InteractionTimeout(
                "chat input not found for any known placeholder".to_string(),
            )
            .into());
        }
        tokio::time::sleep(INPUT_LOCATE_INTERVAL).await;
    }
}

fn placeholder_selector(placeholder: &str) -> String {
    format!(r#"input[placeholder="{}"]"#, placeholder)
}
