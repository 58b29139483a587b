//! Harness run configuration
//!
//! Everything the orchestrator needs is carried explicitly in
//! [`HarnessConfig`]; the only implicit inputs are the documented
//! `HARNESS_*` environment fallbacks resolved by the CLI layer and the two
//! browser-override variables read by the session launcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use playwright::api::Cookie;

use crate::error::HarnessError;

pub const DEFAULT_TARGET_URL: &str = "https://beta.dexter.cash/";
pub const DEFAULT_WAIT_MS: u64 = 45000;
pub const DEFAULT_FOLLOW_UP_DELAY_MS: u64 = 3000;

/// Configuration for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Message sent to the agent. Required; validated before launch.
    pub prompt: String,
    /// URL loaded before the conversation starts.
    pub target_url: String,
    /// Overall response-completion deadline (ms). Soft: expiry marks the
    /// artifact as timed out instead of failing the run.
    pub wait_ms: u64,
    /// Artifact directory; `None` selects the library default.
    pub output_dir: Option<String>,
    pub headless: bool,
    pub save_artifact: bool,
    /// Storage-state file loaded into the new context (resumes auth).
    pub storage_state: Option<PathBuf>,
    /// Path the run's storage state is written to afterwards.
    pub storage_state_path: Option<PathBuf>,
    pub extra_http_headers: HashMap<String, String>,
    /// Cookies injected into the context; failures are non-fatal.
    pub cookies: Vec<Cookie>,
    /// Follow-up messages sent in order after the initial prompt.
    pub follow_up_prompts: Vec<String>,
    /// Delay before each follow-up (0 sends back-to-back).
    pub follow_up_delay_ms: u64,
    /// Suppress the app's synthetic greeting via an init script.
    pub skip_synthetic_greeting: bool,
    /// Extra environment passed to the browser process at launch.
    pub extra_env: HashMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            target_url: DEFAULT_TARGET_URL.to_string(),
            wait_ms: DEFAULT_WAIT_MS,
            output_dir: None,
            headless: true,
            save_artifact: true,
            storage_state: None,
            storage_state_path: None,
            extra_http_headers: HashMap::new(),
            cookies: Vec::new(),
            follow_up_prompts: Vec::new(),
            follow_up_delay_ms: DEFAULT_FOLLOW_UP_DELAY_MS,
            skip_synthetic_greeting: false,
            extra_env: HashMap::new(),
        }
    }
}

impl HarnessConfig {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Checked before any browser resource is allocated.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.prompt.trim().is_empty() {
            return Err(HarnessError::Configuration(
                "a non-empty prompt is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Follow-up queue with blank entries dropped and the rest trimmed.
    pub fn follow_ups(&self) -> Vec<String> {
        self.follow_up_prompts
            .iter()
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// How many assistant-attributed turns the quiescence detector waits
    /// for: the initial prompt plus one per non-blank follow-up.
    pub fn expected_assistant_messages(&self) -> usize {
        std::cmp::max(1, 1 + self.follow_ups().len())
    }
}

/// Normalizes a raw `Authorization` header value from the environment.
pub fn parse_authorization_header(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Normalizes a raw cookie header from the environment. Values are often
/// URL-encoded when they arrive via shell plumbing; the decoded form is
/// preferred when it exposes a Supabase (`sb-`) cookie pair.
pub fn parse_cookie_header(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(decoded) = percent_decode(value) {
        if looks_like_supabase_cookie(&decoded) {
            return Some(decoded);
        }
    }
    Some(value.to_string())
}

fn looks_like_supabase_cookie(header: &str) -> bool {
    header.split(';').any(|segment| {
        let segment = segment.trim();
        segment.starts_with("sb-") && segment.contains('=')
    })
}

/// Minimal percent-decoding for cookie header plumbing. Returns `None` when
/// the input contains a malformed escape.
fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Loads a Playwright cookie array from a JSON file. Parse failures are
/// logged and yield an empty list; a missing cookie file never fails a run.
pub fn load_cookies_file(path: &Path) -> Vec<Cookie> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => {
            log::warn!("Failed to read cookies file {}: {}", path.display(), err);
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<Cookie>>(&data) {
        Ok(cookies) => cookies,
        Err(err) => {
            log::warn!("Failed to parse cookies file {}: {}", path.display(), err);
            Vec::new()
        }
    }
}

/// Reads a boolean-ish environment flag ("true"/"1" enable, "false"/"0"
/// disable); anything else falls back to the default.
pub fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => match value.trim() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Reads a trimmed, non-empty environment string.
pub fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prompt_is_rejected_before_launch() {
        let config = HarnessConfig::new("   \t  ");
        assert!(matches!(
            config.validate(),
            Err(HarnessError::Configuration(_))
        ));
    }

    #[test]
    fn non_empty_prompt_passes_validation() {
        let config = HarnessConfig::new("Check my wallet");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn single_prompt_expects_one_assistant_message() {
        let config = HarnessConfig::new("Check my wallet");
        assert_eq!(config.expected_assistant_messages(), 1);
    }

    #[test]
    fn follow_ups_raise_the_expected_turn_count() {
        // One follow-up means two assistant turns.
        let mut config = HarnessConfig::new("Hi");
        config.follow_up_prompts = vec!["Tell me more".to_string()];
        assert_eq!(config.expected_assistant_messages(), 2);
    }

    #[test]
    fn blank_follow_ups_are_dropped() {
        let mut config = HarnessConfig::new("Hi");
        config.follow_up_prompts = vec![
            "  ".to_string(),
            "Tell me more  ".to_string(),
            String::new(),
        ];
        assert_eq!(config.follow_ups(), vec!["Tell me more".to_string()]);
        assert_eq!(config.expected_assistant_messages(), 2);
    }

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = HarnessConfig::default();
        assert_eq!(config.target_url, DEFAULT_TARGET_URL);
        assert_eq!(config.wait_ms, 45000);
        assert_eq!(config.follow_up_delay_ms, 3000);
        assert!(config.headless);
        assert!(config.save_artifact);
        assert!(!config.skip_synthetic_greeting);
    }

    #[test]
    fn cookie_header_prefers_decoded_supabase_form() {
        let raw = "sb-abc-auth-token%3D%5B%22jwt%22%5D";
        let parsed = parse_cookie_header(Some(raw)).unwrap();
        assert_eq!(parsed, "sb-abc-auth-token=[\"jwt\"]");
    }

    #[test]
    fn cookie_header_keeps_raw_value_when_not_supabase() {
        let parsed = parse_cookie_header(Some("session=plain")).unwrap();
        assert_eq!(parsed, "session=plain");
        assert!(parse_cookie_header(Some("   ")).is_none());
        assert!(parse_cookie_header(None).is_none());
    }

    #[test]
    fn authorization_header_is_trimmed() {
        assert_eq!(
            parse_authorization_header(Some("  Bearer tok  ")),
            Some("Bearer tok".to_string())
        );
        assert!(parse_authorization_header(Some("")).is_none());
    }

    #[test]
    fn percent_decode_rejects_malformed_escapes() {
        assert!(percent_decode("bad%2").is_none());
        assert!(percent_decode("bad%zz").is_none());
        assert_eq!(percent_decode("a%20b").as_deref(), Some("a b"));
    }
}
