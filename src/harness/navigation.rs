//! Target navigation and the auth-denied gate
//!
//! Waits for DOM parse only: the target is a streaming app that may never
//! reach network-idle. A body matching the auth-denied marker aborts the
//! run immediately rather than burning the full wait budget on a page the
//! harness can never converse with.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use playwright::api::{DocumentLoadState, Page};
use regex::Regex;

use crate::error::HarnessError;

/// Literal body text the reverse proxy renders on a rejected session.
pub const AUTH_DENIED_MARKER: &str = "401 Authorization Required";

fn auth_denied_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)401 Authorization Required").expect("auth marker pattern is valid")
    })
}

pub async fn open(page: &Page, target_url: &str) -> Result<()> {
    page.goto_builder(target_url)
        .wait_until(DocumentLoadState::DomContentLoaded)
        .goto()
        .await
        .with_context(|| format!("Failed to navigate to {}", target_url))?;

    let body: Option<String> = page
        .evaluate("() => document.body && document.body.innerText", ())
        .await
        .context("failed to read page body")?;

    if let Some(text) = body {
        if auth_denied_pattern().is_match(&text) {
            return Err(HarnessError::Navigation(format!(
                "Failed to load {}: received 401 Authorization Required.",
                target_url
            ))
            .into());
        }
    }
    Ok(())
}
