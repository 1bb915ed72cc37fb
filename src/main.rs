//! Night Wander CLI
//!
//! Night-time wandering detector for binary motion and door sensors.

use chrono::{NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use night_wander::{
    core::window::BOUNDARY_FORMAT,
    Config, Detector, EventSource, JsonLinesSink, OutboundSink, RollupCounter, RollupStore,
    Settings, VERSION,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use night_wander::{BlockingGatewayClient, GatewayConfig};

/// Longest the loop sleeps before re-checking signals and config.
const MAX_WAIT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "night-wander")]
#[command(version = VERSION)]
#[command(about = "Night-time wandering detector for motion and door sensors", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Configuration file (default: <config dir>/night-wander/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detector
    Start(StartArgs),

    /// Show configuration summary and pending rollup state
    Status,

    /// Show configuration
    Config,

    /// Check whether a time of day today falls inside the night window
    Check {
        /// Time of day, HH:MM
        time: String,
    },

    /// Merge a partial JSON object into the configuration and save it
    Update {
        /// JSON object, e.g. '{"night_start": "22:30"}'
        json: String,
    },
}

#[derive(Args)]
struct StartArgs {
    /// Read adaptor messages as JSON lines from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Append outgoing messages as JSON lines to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Deliver outgoing messages to a collector at this base URL
    #[cfg(feature = "gateway")]
    #[arg(long)]
    gateway_url: Option<String>,

    /// Accept adaptor messages over HTTP on this loopback port
    #[cfg(feature = "server")]
    #[arg(long)]
    listen: Option<u16>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Start(args) => {
            cmd_start(&config_path, args);
        }
        Commands::Status => {
            cmd_status(&config_path);
        }
        Commands::Config => {
            cmd_config(&config_path);
        }
        Commands::Check { time } => {
            cmd_check(&config_path, &time);
        }
        Commands::Update { json } => {
            cmd_update(&config_path, &json);
        }
    }
}

/// Logs go to stderr; stdout may carry outgoing messages.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn load_config(path: &Path) -> Config {
    match Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load {path:?}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    }
}

fn cmd_start(config_path: &Path, args: StartArgs) {
    eprintln!("Night Wander v{VERSION}");
    eprintln!();

    let mut config = load_config(config_path);
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let settings = Arc::new(Settings::from_config(&config));
    match &settings.window {
        Some(window) => eprintln!("  Night window: {window}"),
        None => eprintln!("  Night window: invalid, events will be dropped"),
    }
    eprintln!("  Policy: {}", settings.policy);
    eprintln!("  Debounce: {}s", settings.debounce_secs);
    eprintln!("  Sensors: {}", settings.registry.len());

    let sink = match build_sink(&args) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stats = night_wander::create_shared_stats();
    let store = RollupStore::for_instance(&settings.data_path, &settings.instance_id);
    let mut detector =
        Detector::new(settings, RollupCounter::new(store), sink).with_stats(stats.clone());
    detector.start(now_secs());

    let reader: Box<dyn BufRead + Send> = match &args.input {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                eprintln!("Error: Could not open {path:?}: {e}");
                std::process::exit(1);
            }
        },
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut source = EventSource::new();
    let reader_handle = match source.start(reader) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting event reader: {e}");
            std::process::exit(1);
        }
    };

    #[cfg(feature = "server")]
    let server = match args.listen {
        Some(port) => match start_server(port, &source, &stats) {
            Ok(server) => Some(server),
            Err(e) => {
                eprintln!("Error starting HTTP ingest: {e}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    eprintln!();
    eprintln!("Press Ctrl+C to stop");
    eprintln!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let receiver = source.receiver().clone();
    let mut last_config_check = Instant::now();
    let mut input_closed = false;

    while running.load(Ordering::SeqCst) {
        // Poll the config file so `night-wander update` reaches a running agent.
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            reload_config(config_path, &mut config, &mut detector);
            last_config_check = Instant::now();
        }

        let wait = detector
            .next_deadline()
            .map(|due| Duration::from_secs_f64((due - now_secs()).max(0.0)).min(MAX_WAIT))
            .unwrap_or(MAX_WAIT);

        match receiver.recv_timeout(wait) {
            Ok(message) => detector.handle_message(&message, now_secs()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                eprintln!("Event channel disconnected unexpectedly");
                break;
            }
        }

        detector.run_due(now_secs());

        if !input_closed && reader_handle.is_finished() {
            input_closed = true;
            tracing::info!("Input closed; still running until Ctrl+C");
        }
    }

    eprintln!();
    eprintln!("Stopping...");
    source.stop();

    #[cfg(feature = "server")]
    if let Some((runtime, shutdown_tx)) = server {
        let _ = shutdown_tx.send(());
        runtime.shutdown_timeout(Duration::from_secs(1));
    }

    // Drain whatever already arrived.
    while let Some(message) = source.try_recv() {
        detector.handle_message(&message, now_secs());
    }
    detector.shutdown();

    eprintln!();
    eprintln!("{}", stats.summary());
}

/// Pick the outbound sink: gateway, then output file, then stdout.
fn build_sink(args: &StartArgs) -> Result<Box<dyn OutboundSink>, Box<dyn std::error::Error>> {
    #[cfg(feature = "gateway")]
    if let Some(url) = &args.gateway_url {
        let client = BlockingGatewayClient::new(GatewayConfig::new(url.as_str()))?;
        match client.test_connection() {
            Ok(true) => eprintln!("  Gateway: {} (connected)", client.config().base_url),
            Ok(false) => eprintln!("Warning: Gateway health check failed"),
            Err(e) => eprintln!("Warning: Could not connect to gateway: {e}"),
        }
        return Ok(Box::new(client));
    }

    match &args.output {
        Some(path) => {
            eprintln!("  Output: {path:?}");
            Ok(Box::new(JsonLinesSink::append(path)?))
        }
        None => Ok(Box::new(JsonLinesSink::stdout())),
    }
}

#[cfg(feature = "server")]
fn start_server(
    port: u16,
    source: &EventSource,
    stats: &night_wander::SharedStats,
) -> anyhow::Result<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    let runtime = tokio::runtime::Runtime::new()?;
    let (addr, shutdown_tx) =
        runtime.block_on(night_wander::server::run(port, source.sender(), stats.clone()))?;
    eprintln!("  HTTP ingest: http://{addr}/events");
    Ok((runtime, shutdown_tx))
}

/// Swap in a new settings snapshot when the config file changed.
fn reload_config(path: &Path, current: &mut Config, detector: &mut Detector) {
    match Config::load_from(path) {
        Ok(config) if config != *current => {
            if config.data_path != current.data_path || config.instance_id != current.instance_id {
                tracing::warn!("Rollup location changes take effect on restart");
            }
            detector.apply_settings(Arc::new(Settings::from_config(&config)));
            *current = config;
            tracing::info!("Configuration reloaded");
        }
        Ok(_) => {}
        Err(e) => tracing::debug!("Keeping current configuration: {e}"),
    }
}

fn cmd_status(config_path: &Path) {
    let config = load_config(config_path);
    let settings = Settings::from_config(&config);

    println!("Night Wander Status");
    println!("===================");
    println!();
    println!("Config file: {config_path:?}");
    println!("Bridge: {}", settings.bridge_id);
    match &settings.window {
        Some(window) => println!("Night window: {window}"),
        None => println!("Night window: invalid"),
    }
    println!(
        "Timezone: {}",
        config.timezone.as_deref().unwrap_or("host local time")
    );
    println!("Policy: {}", settings.policy);
    println!("Debounce: {}s", settings.debounce_secs);
    println!("Sensors: {}", settings.registry.len());
    for (id, sensor) in &config.sensors {
        let inverted = if sensor.inverted { " (inverted)" } else { "" };
        println!("  {id}: {}{inverted}", sensor.name);
    }

    let now = now_secs();
    if let Some(window) = &settings.window {
        let state = if settings.clock.contains(window, now) {
            "inside"
        } else {
            "outside"
        };
        println!("Now: {} ({state} the night window)", settings.clock.format(now));
    }

    println!();
    let store = RollupStore::for_instance(&settings.data_path, &settings.instance_id);
    match store.peek() {
        Ok(Some(count)) => println!(
            "Pending rollup: {count} wandering episode(s) saved in {:?}",
            store.path()
        ),
        Ok(None) => println!("No pending rollup."),
        Err(e) => println!("Rollup file {:?} is unreadable: {e}", store.path()),
    }
}

fn cmd_config(config_path: &Path) {
    let config = load_config(config_path);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_check(config_path: &Path, time: &str) {
    let settings = Settings::from_config(&load_config(config_path));

    let Some(window) = settings.window else {
        eprintln!("Error: The configured night window is invalid");
        std::process::exit(1);
    };
    let time = match NaiveTime::parse_from_str(time.trim(), BOUNDARY_FORMAT) {
        Ok(time) => time,
        Err(_) => {
            eprintln!("Error: Time must be HH:MM, got {time:?}");
            std::process::exit(1);
        }
    };
    let Some(ts) = settings.clock.same_day_at(now_secs(), time) else {
        eprintln!("Error: {time} does not exist today in the configured zone");
        std::process::exit(1);
    };

    let verdict = if settings.clock.contains(&window, ts) {
        "inside"
    } else {
        "outside"
    };
    println!("{} is {verdict} the night window {window}", settings.clock.format(ts));
}

fn cmd_update(config_path: &Path, json: &str) {
    let update: serde_json::Value = match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error: Invalid JSON: {e}");
            std::process::exit(1);
        }
    };

    let mut config = load_config(config_path);
    match config.apply_update(&update, config_path) {
        Ok(true) => println!("Configuration saved to {config_path:?}"),
        Ok(false) => println!("Configuration unchanged."),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }
}
