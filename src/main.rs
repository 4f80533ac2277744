//! Click Latency CLI
//!
//! Measures how long an application takes to visibly respond to a click.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use click_latency::{
    capture::{screen_available, Region, ScreenFrameSource},
    collector::{check_permission, Collector, CollectorConfig, HookClickSource},
    config::Config,
    core::{
        prompt_mode, ConsoleSink, DetectorSettings, DiffEngine, Mode, Outcome, ResponseDetector,
        Session, SessionError, SessionSummary, StopSignal, SystemClock,
    },
    select::DragSelector,
    stats::{LatencyStats, LatencySummary},
    PERMISSIONS_NOTICE, VERSION,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "click-latency")]
#[command(version = VERSION)]
#[command(about = "Measure click-to-visual-response latency", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure click latency in a screen region
    Measure {
        /// Region as left,top,width,height (drag to select if omitted)
        #[arg(long)]
        region: Option<String>,

        /// once or continuous (prompted if omitted)
        #[arg(long)]
        mode: Option<String>,

        /// Seconds to wait for a response after each click
        #[arg(long)]
        timeout: Option<f64>,

        /// Changed-pixel ratio that counts as a response
        #[arg(long)]
        strong_ratio: Option<f64>,

        /// Lowest ratio reported as a fallback at timeout
        #[arg(long)]
        weak_ratio: Option<f64>,

        /// Per-pixel change threshold (0-254)
        #[arg(long)]
        threshold: Option<u8>,

        /// Sampling rate in frames per second
        #[arg(long)]
        fps: Option<f64>,

        /// Write all outcomes of the session to this JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Show permissions, screen access and configuration
    Status,

    /// Show configuration
    Config {
        /// Overwrite the config file with defaults
        #[arg(long)]
        reset: bool,
    },

    /// Display the permissions notice
    Permissions,
}

/// Overrides from `measure` flags.
struct MeasureArgs {
    region: Option<String>,
    mode: Option<String>,
    timeout: Option<f64>,
    strong_ratio: Option<f64>,
    weak_ratio: Option<f64>,
    threshold: Option<u8>,
    fps: Option<f64>,
    export: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Measure {
            region,
            mode,
            timeout,
            strong_ratio,
            weak_ratio,
            threshold,
            fps,
            export,
        } => {
            cmd_measure(MeasureArgs {
                region,
                mode,
                timeout,
                strong_ratio,
                weak_ratio,
                threshold,
                fps,
                export,
            });
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config { reset } => {
            cmd_config(reset);
        }
        Commands::Permissions => {
            cmd_permissions();
        }
    }
}

/// Diagnostics go to stderr so stdout carries only report lines.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_measure(args: MeasureArgs) {
    println!("Click Latency v{VERSION}");
    println!();

    if !check_permission() {
        eprintln!("Error: Input Monitoring permission not granted.");
        eprintln!();
        eprintln!("To grant permission:");
        eprintln!("1. Open System Settings > Privacy & Security");
        eprintln!("2. Select 'Input Monitoring' and 'Screen Recording'");
        eprintln!("3. Add this application to both lists");
        eprintln!("4. Restart the application");
        std::process::exit(1);
    }

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config ({e}), using defaults");
            Config::default()
        }
    };
    if let Err(e) = apply_overrides(&mut config, &args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let settings = match DetectorSettings::from_config(&config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stop = StopSignal::new();
    let session_started = Arc::new(AtomicBool::new(false));
    ctrlc_handler(stop.clone(), session_started.clone());

    let region = match args.region.as_deref() {
        Some(text) => match text.parse::<Region>() {
            Ok(region) => region,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => select_region(&config, &stop),
    };
    println!("Region: {region}");

    let mode = match args.mode.as_deref() {
        Some(text) => text.parse::<Mode>(),
        None => prompt_mode(&mut std::io::stdin().lock(), &mut std::io::stdout(), &stop),
    };
    let mode = match mode {
        Ok(mode) => mode,
        Err(SessionError::Cancelled) => {
            println!("Cancelled.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("Mode: {mode}");
    println!(
        "  Thresholds: strong {:.3}, weak {:.3}, pixel {}",
        settings.strong_ratio(),
        settings.weak_ratio(),
        config.change_threshold
    );
    println!(
        "  Timeout: {}s, sampling every {}ms, {} capture retries",
        settings.timeout().as_secs_f64(),
        settings.poll_interval().as_millis(),
        settings.capture_retries()
    );
    match mode {
        Mode::Once => println!("Click once inside the target to measure it."),
        Mode::Continuous => println!(
            "Click as often as you like; press {} or Ctrl+C to stop.",
            config.stop_key
        ),
    }
    println!();

    let detector = ResponseDetector::new(settings, DiffEngine::new(config.change_threshold));
    let mut sink = ConsoleSink::stdout(detector.settings().timeout());
    let mut session = Session::new(
        mode,
        region,
        detector,
        ScreenFrameSource::new(),
        HookClickSource::new(CollectorConfig::default()),
        SystemClock,
    )
    .with_stop_key(config.stop_key)
    .with_stop_signal(stop);

    session_started.store(true, Ordering::SeqCst);
    let summary = match session.run(&mut sink) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stats = LatencyStats::from_summary(&summary);
    println!();
    println!("{}", stats.summary());

    if let Some(path) = args.export {
        match export_session(&path, &config, &summary, &stats) {
            Ok(id) => println!("\nExported session {id} to {path:?}"),
            Err(e) => {
                eprintln!("Error exporting session: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn apply_overrides(config: &mut Config, args: &MeasureArgs) -> Result<(), String> {
    if let Some(secs) = args.timeout {
        config.timeout = std::time::Duration::try_from_secs_f64(secs)
            .map_err(|e| format!("invalid --timeout {secs}: {e}"))?;
    }
    if let Some(ratio) = args.strong_ratio {
        config.strong_ratio = ratio;
    }
    if let Some(ratio) = args.weak_ratio {
        config.weak_ratio = ratio;
    }
    if let Some(threshold) = args.threshold {
        config.change_threshold = threshold;
    }
    if let Some(fps) = args.fps {
        config.set_poll_rate_hz(fps).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Let the operator drag out the region on screen.
fn select_region(config: &Config, stop: &StopSignal) -> Region {
    let mut collector = Collector::new(CollectorConfig::default());
    if let Err(e) = collector.start() {
        eprintln!("Error starting input hook: {e}");
        std::process::exit(1);
    }

    println!(
        "Press {} to arm, then drag with the left mouse button to select the region ({}s).",
        config.selection_arm_key,
        config.selection_timeout.as_secs()
    );
    println!("The drag is also delivered to the window underneath; start it on an idle area.");
    let result = DragSelector::new(collector.receiver(), stop.clone(), config.selection_timeout)
        .with_arm_key(config.selection_arm_key)
        .select();
    collector.stop();

    match result {
        Ok(region) => region,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Session export format.
#[derive(Serialize)]
struct ExportDocument<'a> {
    session_id: Uuid,
    version: &'a str,
    mode: Mode,
    region: Region,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    change_threshold: u8,
    strong_ratio: f64,
    weak_ratio: f64,
    timeout_secs: f64,
    poll_interval_secs: f64,
    failed_cycles: u32,
    superseded_clicks: u64,
    latency: Option<LatencySummary>,
    outcomes: &'a [Outcome],
}

fn export_session(
    path: &Path,
    config: &Config,
    summary: &SessionSummary,
    stats: &LatencyStats,
) -> Result<Uuid, std::io::Error> {
    let session_id = Uuid::new_v4();
    let document = ExportDocument {
        session_id,
        version: VERSION,
        mode: summary.mode,
        region: summary.region,
        started_at: summary.started_at,
        ended_at: summary.ended_at,
        change_threshold: config.change_threshold,
        strong_ratio: config.strong_ratio,
        weak_ratio: config.weak_ratio,
        timeout_secs: config.timeout.as_secs_f64(),
        poll_interval_secs: config.poll_interval.as_secs_f64(),
        failed_cycles: summary.failed_cycles,
        superseded_clicks: summary.superseded_clicks,
        latency: stats.strong_summary(),
        outcomes: &summary.outcomes,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&document).map_err(std::io::Error::other)?;
    std::fs::write(path, json)?;
    Ok(session_id)
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Click Latency Status");
    println!("====================");
    println!();

    let has_permission = check_permission();
    println!(
        "Input Monitoring Permission: {}",
        if has_permission {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!(
        "Screen Capture: {}",
        if screen_available() {
            "Available ✓"
        } else {
            "Unavailable ✗"
        }
    );
    println!();

    println!("Configuration:");
    println!("  Strong ratio: {}", config.strong_ratio);
    println!("  Weak ratio: {}", config.weak_ratio);
    println!("  Pixel threshold: {}", config.change_threshold);
    println!("  Timeout: {}s", config.timeout.as_secs_f64());
    println!("  Sampling: {:.0} fps", config.poll_rate_hz());
    println!("  Stop key: {}", config.stop_key);
    if let Err(e) = config.validate() {
        println!("  Warning: {e}");
    }
}

fn cmd_config(reset: bool) {
    let config = if reset {
        let config = Config::default();
        if let Err(e) = config.save() {
            eprintln!("Error saving config: {e}");
            std::process::exit(1);
        }
        println!("Configuration reset to defaults.");
        println!();
        config
    } else {
        Config::load().unwrap_or_default()
    };

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_permissions() {
    println!("{PERMISSIONS_NOTICE}");
}

/// Set up Ctrl+C handler.
///
/// Before the session starts the process exits at once, since a blocked
/// prompt read would otherwise swallow the interrupt. Afterwards it stops
/// the session so the summary is still printed.
fn ctrlc_handler(stop: StopSignal, session_started: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        stop.trigger();
        if !session_started.load(Ordering::SeqCst) {
            println!("\nCancelled.");
            std::process::exit(130);
        }
    })
    .expect("Error setting Ctrl+C handler");
}
