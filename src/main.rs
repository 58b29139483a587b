use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use dexchat_harness::{config, report, summary, HarnessConfig};

#[derive(Parser)]
#[command(name = "dexchat")]
#[command(version = "0.1.0")]
#[command(about = "Run a scripted chat against the Dexter realtime agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a readable digest of a saved run artifact
    Report {
        /// Path to the artifact JSON
        artifact: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Message to send to the agent (falls back to HARNESS_PROMPT)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Target URL to load before running the conversation
    #[arg(short, long)]
    url: Option<String>,

    /// Response-completion deadline in milliseconds
    #[arg(short, long)]
    wait: Option<u64>,

    /// Directory where run artifacts are stored
    #[arg(short, long)]
    output: Option<String>,

    /// Skip writing the JSON artifact to disk
    #[arg(long)]
    no_artifact: bool,

    /// Follow-up message(s) sent after the initial prompt (repeatable)
    #[arg(long = "follow-up")]
    follow_up: Vec<String>,

    /// Delay (ms) before each follow-up message
    #[arg(long)]
    follow_up_delay: Option<u64>,

    /// Suppress the app's synthetic greeting
    #[arg(long)]
    skip_greeting: bool,

    /// Print a left/right transcript summary after the run completes
    #[arg(long)]
    summary: bool,

    /// Run the browser in headed mode (visible window)
    #[arg(long)]
    headful: bool,

    /// Print the artifact JSON to stdout when the run completes
    #[arg(long)]
    json: bool,

    /// Write browser storage state to this path after the run
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Load browser storage state from this path before the run
    #[arg(long)]
    storage_state: Option<PathBuf>,

    /// Ignore stored auth and run as a guest
    #[arg(long)]
    guest: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Report { artifact }) => report::print_report(&artifact),
        None => run_conversation(cli.run).await,
    };

    if let Err(err) = result {
        eprintln!("{} dexchat failed: {:#}", "✗".red(), err);
        std::process::exit(1);
    }
}

async fn run_conversation(args: RunArgs) -> anyhow::Result<()> {
    let json_output = args.json || config::env_trimmed("HARNESS_JSON").as_deref() == Some("1");
    let show_summary = args.summary || config::env_flag("HARNESS_SUMMARY", false);

    let config = build_config(args)?;
    let save_artifact = config.save_artifact;

    println!("{} dexchat harness", "🚀".green());
    println!("   Prompt: {}", config.prompt.cyan());
    println!("   URL:    {}", config.target_url.cyan());
    println!("   Wait:   {} ms", config.wait_ms);

    let run = dexchat_harness::run_harness(config).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&run.artifact)?);
    }

    match &run.artifact_path {
        Some(path) => println!("Saved artifact: {}", path.display()),
        None if save_artifact => println!("Run completed, but no artifact was written."),
        None => {}
    }

    if let Some(path) = &run.storage_state_path {
        println!("Saved storage state: {}", path.display());
    }

    if show_summary {
        println!();
        print!("{}", summary::render_summary(&run.artifact));
    }

    Ok(())
}

fn build_config(args: RunArgs) -> anyhow::Result<HarnessConfig> {
    let prompt = args
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| config::env_trimmed("HARNESS_PROMPT"))
        .unwrap_or_default();
    if prompt.is_empty() {
        anyhow::bail!("Prompt is required (pass --prompt or set HARNESS_PROMPT).");
    }

    let mut config = HarnessConfig::new(prompt);

    if let Some(url) = args
        .url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| config::env_trimmed("HARNESS_TARGET_URL"))
    {
        config.target_url = url;
    }

    let env_wait = config::env_trimmed("HARNESS_WAIT_MS").and_then(|raw| raw.parse::<u64>().ok());
    if let Some(wait) = [args.wait, env_wait]
        .into_iter()
        .flatten()
        .find(|value| *value > 0)
    {
        config.wait_ms = wait;
    }

    config.output_dir = args
        .output
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| config::env_trimmed("HARNESS_OUTPUT_DIR"));

    config.headless = if args.headful {
        false
    } else {
        config::env_flag("HARNESS_HEADLESS", true)
    };

    config.save_artifact = !args.no_artifact && config::env_flag("HARNESS_SAVE_ARTIFACT", true);

    config.storage_state_path = args.storage;
    config.storage_state = args
        .storage_state
        .or_else(|| config::env_trimmed("HARNESS_STORAGE_STATE").map(PathBuf::from));

    config.skip_synthetic_greeting =
        args.skip_greeting || config::env_flag("HARNESS_SKIP_GREETING", false);

    config.follow_up_prompts = args.follow_up;
    if let Some(delay) = args.follow_up_delay {
        config.follow_up_delay_ms = delay;
    }

    // Auth plumbing from the environment: a raw cookie header, a bearer
    // token, or a Playwright cookie array on disk.
    if let Some(cookie) =
        config::parse_cookie_header(config::env_trimmed("HARNESS_COOKIE").as_deref())
    {
        config
            .extra_http_headers
            .insert("cookie".to_string(), cookie);
    }
    if let Some(authorization) =
        config::parse_authorization_header(config::env_trimmed("HARNESS_AUTHORIZATION").as_deref())
    {
        config
            .extra_http_headers
            .insert("authorization".to_string(), authorization);
    }
    if let Some(path) = config::env_trimmed("HARNESS_COOKIES_JSON") {
        config.cookies = config::load_cookies_file(PathBuf::from(path).as_path());
    }

    if args.guest {
        println!("Guest mode enabled, skipping stored authentication.");
        config.storage_state = None;
        config.extra_http_headers.clear();
        config.cookies.clear();
    }

    Ok(config)
}
