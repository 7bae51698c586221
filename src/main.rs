use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colored::{ColoredString, Colorize};
use log::{info, warn};
use speedgauge::echo::{client::DEFAULT_BASE_URL, EchoClient};
use speedgauge::errors::{format_error_for_display, ErrorKind};
use speedgauge::gauge::FRAME_INTERVAL;
use speedgauge::history::{FileStore, History, KeyValueStore, MemoryStore};
use speedgauge::labels::Labels;
use speedgauge::measure::TestConfig;
use speedgauge::rating::QualityScore;
use speedgauge::results::{ResultReport, SpeedTestResult};
use speedgauge::share::{
    ClipboardShare, CommandShare, ShareOutcome, ShareTarget, Sharer,
};
use speedgauge::tui::{DisplayMode, KeyAction, TuiController};
use speedgauge::{SpeedTestError, SpeedTestSession};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (rev ",
    env!("SPEEDGAUGE_BUILD_GIT_HASH"),
    ")"
);

#[derive(Parser)]
#[command(author, version = VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Base URL of the echo service
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    server: String,

    /// Print machine-readable JSON instead of the interactive display
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the result history
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// JSON file overriding display strings
    #[arg(long, global = true, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Program that receives shared summaries on stdin, e.g. "wl-copy"
    #[arg(long, global = true, value_name = "COMMAND")]
    share_command: Option<String>,

    /// Length of the download phase
    #[arg(long, value_name = "SECONDS")]
    download_duration: Option<u64>,

    /// Length of the upload phase
    #[arg(long, value_name = "SECONDS")]
    upload_duration: Option<u64>,

    /// Concurrent download streams
    #[arg(long, value_name = "N")]
    download_streams: Option<usize>,

    /// Concurrent upload workers
    #[arg(long, value_name = "N")]
    upload_streams: Option<usize>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run a speed test (the default)
    Run,
    /// Show recent results, newest first
    History,
    /// Forget all recorded results
    ClearHistory,
    /// Share the latest result
    Share,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    if let Err(e) = run(cli).await {
        if !e.is_cancelled() {
            eprintln!("{}", format_error_for_display(&e).red());
        }
        std::process::exit(e.exit_code());
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<(), SpeedTestError> {
    let labels = match cli.labels {
        Some(ref path) => Labels::load(path)?,
        None => Labels::default(),
    };
    let history = History::load(history_store(cli.data_dir.clone()));

    match cli.command.unwrap_or(Command::Run) {
        Command::History => print_history(&history, &labels, cli.json),
        Command::ClearHistory => {
            let mut history = history;
            history.clear();
            println!("{}", "History cleared.".green());
            Ok(())
        }
        Command::Share => {
            let session = build_session(&cli, history, labels)?;
            let outcome = session.share().await?;
            let confirmation = match outcome {
                ShareOutcome::Shared => &session.labels().shared,
                ShareOutcome::Copied => &session.labels().copied,
            };
            // The clipboard sequence has no newline of its own
            println!();
            println!("{}", confirmation.green());
            Ok(())
        }
        Command::Run => {
            let mode = DisplayMode::for_stdout(cli.json);
            let controller = TuiController::new(mode, labels.clone());
            let session = build_session(&cli, history, labels)?
                .with_observer(controller.progress_callback());

            if mode.is_interactive() {
                return run_interactive(&session, controller).await;
            }

            let result = run_once(&session).await?;
            if mode == DisplayMode::Json {
                print_json(&result)
            } else {
                print_summary(&result, session.labels());
                Ok(())
            }
        }
    }
}

fn history_store(data_dir: Option<PathBuf>) -> Box<dyn KeyValueStore> {
    match data_dir.or_else(FileStore::default_dir) {
        Some(dir) => {
            let store = FileStore::new(dir);
            info!("Keeping history in {}", store.dir().display());
            Box::new(store)
        }
        None => {
            warn!("No data directory available; history is not persisted");
            Box::new(MemoryStore::new())
        }
    }
}

fn test_config(cli: &Cli) -> Result<TestConfig, SpeedTestError> {
    let mut config = TestConfig::default();

    if let Some(seconds) = cli.download_duration {
        config.download_duration = Duration::from_secs(seconds);
    }
    if let Some(seconds) = cli.upload_duration {
        config.upload_duration = Duration::from_secs(seconds);
    }
    if let Some(streams) = cli.download_streams {
        config.download_streams = streams;
    }
    if let Some(workers) = cli.upload_streams {
        config.upload_workers = workers;
    }

    if config.download_streams == 0 || config.upload_workers == 0 {
        return Err(SpeedTestError::config(
            "stream counts must be at least 1",
        ));
    }
    if config.download_duration.is_zero() || config.upload_duration.is_zero()
    {
        return Err(SpeedTestError::config(
            "phase durations must be at least 1 second",
        ));
    }

    Ok(config)
}

fn build_session(
    cli: &Cli,
    history: History,
    labels: Labels,
) -> Result<SpeedTestSession<EchoClient>, SpeedTestError> {
    let client = EchoClient::from_base(&cli.server)?;
    info!("Testing against {}", client.base_url());
    let preferred = cli
        .share_command
        .as_deref()
        .and_then(CommandShare::parse)
        .map(|command| Box::new(command) as Box<dyn ShareTarget>);
    let sharer = Sharer::new(preferred, Box::new(ClipboardShare::stdout()));

    Ok(SpeedTestSession::new(client, test_config(cli)?, history)
        .with_labels(labels)
        .with_sharer(sharer))
}

/// One run that Ctrl+C stops.
async fn run_once(
    session: &SpeedTestSession<EchoClient>,
) -> Result<SpeedTestResult, SpeedTestError> {
    let run = session.start();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            session.stop();
        }
    }

    run.await
}

async fn run_interactive(
    session: &SpeedTestSession<EchoClient>,
    mut controller: TuiController,
) -> Result<(), SpeedTestError> {
    controller.init()?;
    let outcome = drive(session, &mut controller).await;
    controller.cleanup()?;

    if let Some(result) = session.latest_result() {
        print_summary(&result, session.labels());
    }

    outcome
}

/// Runs until the user quits: a test first, then another one per `r`.
async fn drive(
    session: &SpeedTestSession<EchoClient>,
    controller: &mut TuiController,
) -> Result<(), SpeedTestError> {
    let mut frames = interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let run = session.start();
        let Some(outcome) =
            while_rendering(run, session, controller, &mut frames).await?
        else {
            return Ok(());
        };

        match outcome {
            Err(e) if e.is_cancelled() => {}
            Err(e) => controller.set_error(&e),
            Ok(_) => {}
        }

        loop {
            frames.tick().await;
            controller.refresh(session);
            controller.render()?;

            match controller.poll_key()? {
                Some(KeyAction::Quit) => return Ok(()),
                Some(KeyAction::Run) => break,
                Some(KeyAction::Share) => {
                    if !share(session, controller, &mut frames).await? {
                        return Ok(());
                    }
                }
                Some(KeyAction::ClearHistory) => session.clear_history(),
                Some(KeyAction::Stop) | None => {}
            }
        }
    }
}

/// Share the latest result while the display keeps running. `false` when
/// the user quit meanwhile.
async fn share(
    session: &SpeedTestSession<EchoClient>,
    controller: &mut TuiController,
    frames: &mut Interval,
) -> Result<bool, SpeedTestError> {
    let sharing = session.share();
    let Some(outcome) =
        while_rendering(sharing, session, controller, frames).await?
    else {
        return Ok(false);
    };

    match outcome {
        Ok(outcome) => controller.set_share_outcome(outcome),
        // Nothing to share yet
        Err(e) if e.kind == ErrorKind::InvalidState => {}
        Err(e) => controller.set_error(&e),
    }

    Ok(true)
}

/// Keep drawing and reading keys until `work` finishes. `None` when the
/// user quit first; `work` is dropped then.
async fn while_rendering<F: Future>(
    work: F,
    session: &SpeedTestSession<EchoClient>,
    controller: &mut TuiController,
    frames: &mut Interval,
) -> Result<Option<F::Output>, SpeedTestError> {
    tokio::pin!(work);

    loop {
        tokio::select! {
            output = &mut work => return Ok(Some(output)),
            _ = frames.tick() => {
                controller.refresh(session);
                controller.render()?;

                match controller.poll_key()? {
                    Some(KeyAction::Quit) => {
                        session.stop();
                        return Ok(None);
                    }
                    Some(KeyAction::Stop) => session.stop(),
                    _ => {}
                }
            }
        }
    }
}

fn score(score: QualityScore, labels: &Labels) -> ColoredString {
    let text = labels.score(score);
    match score {
        QualityScore::Poor => text.red(),
        QualityScore::Average => text.yellow(),
        QualityScore::Good => text.cyan(),
        QualityScore::Great => text.green(),
    }
}

fn label(name: &str) -> ColoredString {
    format!("{}:", name).bold().white()
}

fn print_summary(result: &SpeedTestResult, labels: &Labels) {
    println!(
        "{} {} {}",
        label(&labels.download),
        format!("{:.1}", result.download_speed_mbps).bright_blue(),
        labels.speed_unit
    );
    println!(
        "{} {} {}",
        label(&labels.upload),
        format!("{:.1}", result.upload_speed_mbps).bright_blue(),
        labels.speed_unit
    );
    println!(
        "{} {} {}",
        label(&labels.ping),
        format!("{:.0}", result.ping_ms).bright_blue(),
        labels.latency_unit
    );
    println!(
        "{} {} {}",
        label(&labels.jitter),
        format!("{:.1}", result.jitter_ms).bright_blue(),
        labels.latency_unit
    );

    let rating = result.rating();
    println!(
        "{} {} ({} {}, {} {}, {} {})",
        label(&labels.rating),
        score(rating.overall, labels),
        labels.streaming,
        score(rating.streaming, labels),
        labels.gaming,
        score(rating.gaming, labels),
        labels.video_conferencing,
        score(rating.video_conferencing, labels),
    );
}

fn print_json(result: &SpeedTestResult) -> Result<(), SpeedTestError> {
    let json = serde_json::to_string_pretty(&ResultReport::new(result))
        .map_err(|e| SpeedTestError::new(ErrorKind::Unknown, e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn print_history(
    history: &History,
    labels: &Labels,
    json: bool,
) -> Result<(), SpeedTestError> {
    if json {
        let reports: Vec<_> =
            history.entries().iter().map(ResultReport::new).collect();
        let json = serde_json::to_string_pretty(&reports).map_err(|e| {
            SpeedTestError::new(ErrorKind::Unknown, e.to_string())
        })?;
        println!("{}", json);
        return Ok(());
    }

    if history.is_empty() {
        println!("{}", "No results yet.".dimmed());
        return Ok(());
    }

    println!("{}", labels.history.bold().white());
    for result in history.entries() {
        println!(
            "{}  ↓ {} {}  ↑ {} {}  {} {} {}  {}",
            result
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .dimmed(),
            format!("{:>7.1}", result.download_speed_mbps).bright_blue(),
            labels.speed_unit,
            format!("{:>7.1}", result.upload_speed_mbps).bright_blue(),
            labels.speed_unit,
            labels.ping,
            format!("{:.0}", result.ping_ms).bright_blue(),
            labels.latency_unit,
            score(result.rating().overall, labels),
        );
    }

    Ok(())
}
