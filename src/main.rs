use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kvtrace::session::{Playback, SimulationHistory};
use kvtrace::{util, Config, SimulationResult, SimulatorClient, View};

#[derive(Debug, Parser)]
#[command(
    name = "kvtrace",
    version,
    about = "Replay and inspect paged KV cache simulation traces"
)]
struct Cli {
    /// Data directory for config, logs and saved traces (default: ~/.kvtrace)
    #[arg(long, global = true, env = "KVTRACE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Simulator base URL, overriding the config file
    #[arg(long, global = true, env = "KVTRACE_SIMULATOR_URL")]
    simulator_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the reconstructed cache state at one step of a trace
    Inspect {
        trace: PathBuf,
        /// Step to reconstruct (default: last)
        #[arg(long)]
        step: Option<usize>,
        /// Previous run, used to mark the shared prompt prefix
        #[arg(long)]
        prev: Option<PathBuf>,
    },
    /// Step through a trace from the beginning
    Play {
        trace: PathBuf,
        /// Delay between frames (default from config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Run a prompt through the simulator and save the trace
    Simulate {
        prompt: String,
        /// Where to write the trace (default: a new file in the traces directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check whether the simulator is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Log to ~/.kvtrace/logs/kvtrace.log; stdout belongs to the views
    util::ensure_data_dirs()?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let mut config = Config::load();
    if let Some(url) = cli.simulator_url {
        config = config.with_simulator_url(url);
    }

    match cli.command {
        Command::Inspect { trace, step, prev } => inspect(&config, &trace, step, prev.as_deref()),
        Command::Play { trace, interval_ms } => {
            let interval = interval_ms.map_or(config.playback_interval, Duration::from_millis);
            play(&config, &trace, interval).await
        }
        Command::Simulate { prompt, out } => simulate(&config, &prompt, out).await,
        Command::Health => health(&config).await,
    }
}

fn inspect(
    config: &Config,
    trace: &Path,
    step: Option<usize>,
    prev: Option<&Path>,
) -> Result<()> {
    let mut history = SimulationHistory::new();
    if let Some(prev) = prev {
        let result = SimulationResult::load(prev)?;
        history.push(prev.display().to_string(), result);
    }
    let idx = history.push(trace.display().to_string(), SimulationResult::load(trace)?);

    let mut loaded = history
        .select(idx, config.default_page_size)
        .context("Trace missing from history")?;
    let step = step.unwrap_or_else(|| loaded.reconstructor.max_step());
    tracing::info!(trace = %trace.display(), step, "Inspecting trace");

    let snapshot = loaded.reconstructor.snapshot(step);
    let result = &loaded.entry.result;
    let view = View::new(result, &snapshot)
        .with_prefix(&loaded.prefix_token_indices)
        .with_recent_events(config.recent_events);

    print!("{}", view.frame());
    print!("\n-- Model --\n{}", view.model_info());
    print!("\n-- Summary --\n{}", view.summary());
    Ok(())
}

async fn play(config: &Config, trace: &Path, interval: Duration) -> Result<()> {
    let result = SimulationResult::load(trace)?;
    let mut replay = result.reconstructor(config.default_page_size);
    let mut playback = Playback::new(replay.len());
    tracing::info!(trace = %trace.display(), steps = replay.len(), "Starting playback");

    let mut render = |step: usize, playback: &Playback| {
        let snapshot = replay.snapshot(step);
        let view = View::new(&result, &snapshot).with_recent_events(config.recent_events);
        println!("[{}]", playback.label());
        print!("{}", view.frame());
        println!();
    };

    render(playback.step(), &playback);
    playback.toggle();

    // tokio intervals reject a zero period
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.tick().await;
    while playback.is_playing() {
        ticker.tick().await;
        if let Some(step) = playback.tick() {
            render(step, &playback);
        }
    }
    Ok(())
}

async fn simulate(config: &Config, prompt: &str, out: Option<PathBuf>) -> Result<()> {
    let client = SimulatorClient::new(&config.simulator_url);
    let result = client.simulate(prompt, config.max_tokens).await?;

    let path = match out {
        Some(path) => path,
        None => {
            let secs = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
            util::trace_file_path(secs)
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    result.save(&path)?;
    tracing::info!(path = %path.display(), events = result.events.len(), "Saved trace");

    println!("Saved {} events to {}", result.events.len(), path.display());
    println!("Total requests: {}", result.summary.num_requests);
    Ok(())
}

async fn health(config: &Config) -> Result<()> {
    let client = SimulatorClient::new(&config.simulator_url);
    if !client.health().await {
        bail!("Simulator at {} is not reachable", client.base_url());
    }
    println!("Simulator at {} is healthy", client.base_url());
    Ok(())
}
