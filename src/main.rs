use balloon_tracker::config::{Config, SourceConfig};
use balloon_tracker::geodesy;
use balloon_tracker::session::Session;
use balloon_tracker::store::LiveDataStore;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "balloon-tracker")]
#[command(about = "Live APRS balloon tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate { config: String },
    /// Run a tracking session until interrupted
    Run {
        config: String,
        /// Stop once a replayed frame log has been read to the end
        #[arg(long)]
        exit_on_eof: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Run {
            config,
            exit_on_eof,
        } => run(&config, exit_on_eof).await,
    }
}

fn validate(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Configuration is valid");
    println!("  source:   {}", describe_source(&config.source));
    println!("  callsign: {}", config.callsign);
    println!("  interval: {:?}", config.poll_interval);
    match config.gps.active() {
        Some(gps) => println!("  gps:      {} @ {} baud", gps.port, gps.baud),
        None => println!("  gps:      disabled"),
    }
    println!(
        "  simulate: {}",
        if config.simulation.simulate { "yes" } else { "no" }
    );
    ExitCode::SUCCESS
}

async fn run(path: &str, exit_on_eof: bool) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let interval = config.poll_interval;

    let updated = Arc::new(Notify::new());
    let hook = updated.clone();
    let mut session = Session::new(config).with_notify(Arc::new(move || hook.notify_one()));

    let store = match session.start().await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted");
                break;
            }
            _ = updated.notified() => report(&store),
            _ = tokio::time::sleep(interval) => {
                if exit_on_eof && session.source_exhausted() {
                    // Let the supervisor observe the final samples.
                    tokio::time::sleep(interval * 2).await;
                    break;
                }
            }
        }
    }

    if let Some(store) = session.stop().await {
        println!("Collected {} samples", store.len());
    }
    ExitCode::SUCCESS
}

fn report(store: &LiveDataStore) {
    let snapshot = store.snapshot();
    let Some(last) = snapshot.last else {
        return;
    };
    let fix = snapshot.fix;

    log::info!(
        "#{}: {:.0} m, climbing {:.1} m/s, drifting {:.1} m/s, {:.1} km away bearing {:.0}°",
        snapshot.len,
        last.altitude_m,
        last.vertical_speed_mps,
        last.horizontal_speed_mps,
        geodesy::distance(fix.latitude, fix.longitude, last.latitude, last.longitude),
        geodesy::bearing(fix.latitude, fix.longitude, last.latitude, last.longitude),
    );
}

fn describe_source(source: &SourceConfig) -> String {
    match source {
        SourceConfig::Sdr(sdr) => format!(
            "sdr {} (rate {}, gain {})",
            sdr.frequency, sdr.sample_rate, sdr.gain
        ),
        SourceConfig::Serial(serial) => format!("serial {} @ {} baud", serial.port, serial.baud),
        SourceConfig::File { aprs_file } => format!("file {}", aprs_file.display()),
    }
}
