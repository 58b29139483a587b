//! Browser session boot
//!
//! Launches Chromium with the requested identity and device capabilities:
//! fake media devices (the target UI requests the microphone), storage
//! state or cookie-header auth, and an optional init script that disables
//! the app's synthetic greeting before any page script runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use playwright::api::{Browser, BrowserContext, Page, StorageState};
use playwright::Playwright;

use crate::config::HarnessConfig;

/// Browser channel override, e.g. `HARNESS_BROWSER=chrome` to run the
/// system Chrome instead of the bundled Chromium (some auth challenges
/// only pass on a branded build).
pub const BROWSER_CHANNEL_ENV: &str = "HARNESS_BROWSER";

/// Explicit executable override; first non-empty wins and takes precedence
/// over the channel.
pub const EXECUTABLE_ENVS: [&str; 2] = ["HARNESS_EXECUTABLE", "HARNESS_CHROME_PATH"];

/// Runs before the page bundle, so both flags are set regardless of which
/// one the app reads first. The driver evaluates this source verbatim as a
/// statement, so it must invoke itself; a bare function expression would be
/// created and discarded without running.
const DISABLE_GREETING_SCRIPT: &str = r#"(() => {
  window.__DEXTER_DISABLE_SYNTHETIC_GREETING = true;
  try {
    window.localStorage?.setItem('dexter:disableSyntheticGreeting', 'true');
  } catch (storageError) {
    // The in-memory flag is sufficient when storage is unavailable.
  }
})();"#;

/// The browser/context/page triple owned by one run.
pub struct Session {
    pub playwright: Playwright,
    pub browser: Browser,
    pub context: BrowserContext,
    pub page: Page,
}

/// Resolved launch parameters, computed before any browser process exists
/// so the override precedence is observable and testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub headless: bool,
    pub channel: Option<String>,
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn resolve(headless: bool, channel: Option<&str>, executable: Option<&str>) -> Self {
        let mut channel = channel
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let executable = executable
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        if executable.is_some() {
            // An explicit executable wins; the channel is dropped entirely.
            channel = None;
        }
        Self {
            headless,
            channel,
            executable,
            args: vec![
                "--use-fake-ui-for-media-stream".to_string(),
                "--use-fake-device-for-media-stream".to_string(),
                "--autoplay-policy=no-user-gesture-required".to_string(),
            ],
        }
    }

    pub fn from_env(headless: bool) -> Self {
        let channel = std::env::var(BROWSER_CHANNEL_ENV).ok();
        let executable = EXECUTABLE_ENVS
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()));
        Self::resolve(headless, channel.as_deref(), executable.as_deref())
    }

    /// The executable actually passed to the launcher: the explicit path,
    /// or the channel resolved against well-known install locations.
    pub fn launch_executable(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.executable {
            return Some(path.clone());
        }
        let channel = self.channel.as_deref()?;
        let found = find_channel_executable(channel);
        if found.is_none() {
            log::warn!(
                "No installed browser found for channel {:?}; launching bundled Chromium",
                channel
            );
        }
        found
    }
}

/// Probes well-known install paths for a named browser channel.
fn find_channel_executable(channel: &str) -> Option<PathBuf> {
    let candidates: &[&str] = match channel.to_ascii_lowercase().as_str() {
        "chrome" | "chrome-stable" => &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
        ],
        "chromium" => &[
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ],
        "msedge" | "edge" => &[
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
            "/usr/bin/microsoft-edge",
            "/usr/bin/microsoft-edge-stable",
        ],
        "brave" => &[
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/usr/bin/brave-browser",
        ],
        _ => {
            log::warn!("Unknown browser channel {:?}", channel);
            &[]
        }
    };
    candidates
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
}

/// Extra environment scoped to the launched browser process; the harness
/// process environment is left untouched.
fn browser_env(extra: &HashMap<String, String>) -> serde_json::Map<String, serde_json::Value> {
    extra
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
        .collect()
}

/// Boots a browser/context/page reflecting the requested identity.
pub async fn launch(config: &HarnessConfig) -> Result<Session> {
    let playwright = Playwright::initialize()
        .await
        .context("Failed to initialize Playwright")?;
    let chromium = playwright.chromium();

    let spec = LaunchSpec::from_env(config.headless);
    let mut launcher = chromium
        .launcher()
        .headless(spec.headless)
        .args(&spec.args);
    if !config.extra_env.is_empty() {
        launcher = launcher.env(browser_env(&config.extra_env));
    }
    match spec.launch_executable() {
        Some(path) => {
            println!(
                "{} Launching browser executable: {}",
                "🌐".blue(),
                path.display()
            );
            launcher = launcher.executable(&path);
            let browser = launcher.launch().await.context("Failed to launch browser")?;
            build_session(playwright, browser, config).await
        }
        None => {
            println!(
                "{} Launching bundled Chromium (no channel/executable override)",
                "🌐".blue()
            );
            let browser = launcher.launch().await.context("Failed to launch browser")?;
            build_session(playwright, browser, config).await
        }
    }
}

async fn build_session(
    playwright: Playwright,
    browser: Browser,
    config: &HarnessConfig,
) -> Result<Session> {
    let mut builder = browser.context_builder();
    if let Some(ref path) = config.storage_state {
        builder = builder.storage_state(load_storage_state(path)?);
    }
    if !config.extra_http_headers.is_empty() {
        builder = builder.extra_http_headers(config.extra_http_headers.clone());
    }
    let context = builder
        .build()
        .await
        .context("Failed to create browser context")?;

    // The target UI requests the microphone on load.
    context
        .grant_permissions(&["microphone".to_string()], None)
        .await
        .context("Failed to grant microphone permission")?;

    if config.skip_synthetic_greeting {
        context
            .add_init_script(DISABLE_GREETING_SCRIPT)
            .await
            .context("Failed to install greeting-suppression init script")?;
    }

    if !config.cookies.is_empty() {
        if let Err(err) = context.add_cookies(&config.cookies).await {
            log::warn!("Failed adding cookies: {:?}", err);
        }
    }

    let page = context.new_page().await.context("Failed to open page")?;

    Ok(Session {
        playwright,
        browser,
        context,
        page,
    })
}

fn load_storage_state(path: &Path) -> Result<StorageState> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read storage state {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse storage state {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_override_drops_the_channel() {
        // Both overrides set: the executable wins and the channel is
        // omitted entirely.
        let spec = LaunchSpec::resolve(true, Some("chrome"), Some("/opt/google/chrome/chrome"));
        assert_eq!(
            spec.executable,
            Some(PathBuf::from("/opt/google/chrome/chrome"))
        );
        assert_eq!(spec.channel, None);
        assert_eq!(
            spec.launch_executable(),
            Some(PathBuf::from("/opt/google/chrome/chrome"))
        );
    }

    #[test]
    fn channel_only_is_preserved() {
        let spec = LaunchSpec::resolve(true, Some(" chrome "), None);
        assert_eq!(spec.channel.as_deref(), Some("chrome"));
        assert_eq!(spec.executable, None);
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let spec = LaunchSpec::resolve(false, Some("  "), Some(""));
        assert_eq!(spec.channel, None);
        assert_eq!(spec.executable, None);
        assert!(!spec.headless);
    }

    #[test]
    fn launch_args_request_fake_media_devices() {
        let spec = LaunchSpec::resolve(true, None, None);
        assert!(spec
            .args
            .iter()
            .any(|arg| arg == "--use-fake-device-for-media-stream"));
    }

    #[test]
    fn greeting_script_sets_both_flags() {
        assert!(DISABLE_GREETING_SCRIPT.contains("__DEXTER_DISABLE_SYNTHETIC_GREETING"));
        assert!(DISABLE_GREETING_SCRIPT.contains("dexter:disableSyntheticGreeting"));
    }

    #[test]
    fn greeting_script_invokes_itself() {
        // The source is evaluated verbatim as a statement, so a bare arrow
        // function would be created and never run.
        assert!(DISABLE_GREETING_SCRIPT.trim_start().starts_with("(() => {"));
        assert!(DISABLE_GREETING_SCRIPT.trim_end().ends_with("})();"));
    }

    #[test]
    fn storage_state_document_parses_back_after_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage-state.json");
        let document = serde_json::json!({
            "cookies": [{
                "name": "sb-dexter-auth-token",
                "value": "jwt",
                "domain": ".dexter.cash",
                "path": "/",
                "expires": -1.0,
                "httpOnly": true,
                "secure": true,
                "sameSite": "Lax"
            }],
            "origins": [{
                "origin": "https://beta.dexter.cash",
                "localStorage": [
                    { "name": "dexter:disableSyntheticGreeting", "value": "true" }
                ]
            }]
        });
        std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

        let state = load_storage_state(&path).unwrap();
        // What the save path writes must load again on the next run.
        let rewritten = serde_json::to_string_pretty(&state).unwrap();
        let reparsed: Result<StorageState> =
            serde_json::from_str(&rewritten).map_err(Into::into);
        assert!(reparsed.is_ok());
    }

    #[test]
    fn browser_env_entries_become_string_values() {
        let mut extra = HashMap::new();
        extra.insert(
            "PLAYWRIGHT_FFMPEG_PATH".to_string(),
            "/usr/bin/ffmpeg".to_string(),
        );
        let env = browser_env(&extra);
        assert_eq!(
            env.get("PLAYWRIGHT_FFMPEG_PATH"),
            Some(&serde_json::Value::String("/usr/bin/ffmpeg".to_string()))
        );
    }
}
