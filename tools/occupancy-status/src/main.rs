// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Occupancy Status CLI
//!
//! Read-only view of what the bridge has written to Firestore.
//!
//! # Usage
//!
//! ```bash
//! # Current room state
//! occupancy-status --project my-project live
//!
//! # Last 10 history entries, newest first
//! occupancy-status --project my-project history
//!
//! # Watch mode (continuous updates)
//! occupancy-status --emulator localhost:8080 --project demo watch --interval 2
//! ```

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use occupancy_bridge::config::{BridgeConfig, EMULATOR_HOST_ENV};
use occupancy_bridge::sink::DocumentId;
use occupancy_bridge::{DocumentPaths, Event, FirestoreStore, Payload, StoreError};
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};

/// Occupancy Status CLI
#[derive(Parser, Debug)]
#[command(name = "occupancy-status")]
#[command(about = "Show the live occupancy record and recent history")]
#[command(version)]
struct Args {
    /// Bridge YAML configuration file (Firestore section is used)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Google Cloud project id
    #[arg(long)]
    project: Option<String>,

    /// Application id used in document paths
    #[arg(long)]
    app_id: Option<String>,

    /// Firestore emulator host:port (also read from FIRESTORE_EMULATOR_HOST)
    #[arg(long)]
    emulator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current live record
    Live,

    /// Show the most recent history entries
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Watch mode (continuous updates)
    Watch {
        /// Update interval in seconds
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "People")]
    count: u64,
    #[tabled(rename = "Light")]
    light: String,
    #[tabled(rename = "Usage")]
    usage: String,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    let args = Args::parse();

    let result = connect(&args).and_then(|(store, paths)| match args.command {
        Commands::Live => cmd_live(&store, &paths),
        Commands::History { limit } => cmd_history(&store, &paths, limit),
        Commands::Watch { interval } => cmd_watch(&store, &paths, interval),
    });

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn connect(args: &Args) -> CliResult<(FirestoreStore, DocumentPaths)> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(project) = &args.project {
        config.firestore.project_id = Some(project.clone());
    }
    if let Some(app_id) = &args.app_id {
        config.firestore.app_id = app_id.clone();
    }
    if let Some(host) = args
        .emulator
        .clone()
        .or_else(|| std::env::var(EMULATOR_HOST_ENV).ok())
    {
        config.firestore.emulator_host = Some(host);
    }

    let token = std::env::var(&config.firestore.token_env).ok();
    let store = FirestoreStore::new(config.store_config(token)?)?;
    Ok((store, config.paths()))
}

fn cmd_live(store: &FirestoreStore, paths: &DocumentPaths) -> CliResult<()> {
    println!("{}", "Live Occupancy".cyan().bold());

    match store.get_document(&paths.live_document)? {
        Some(payload) => {
            println!("  Event:   {}", event_colored(payload.event));
            println!("  People:  {}", payload.count);
            println!("  Light:   {}", payload.light);
            println!("  Usage:   {}", format_usage(payload.usage_s));
            println!("  Updated: {}", format_local(&payload.timestamp));
        }
        None => println!("  {}", "No live record yet. Is the bridge running?".yellow()),
    }

    Ok(())
}

fn cmd_history(store: &FirestoreStore, paths: &DocumentPaths, limit: u32) -> CliResult<()> {
    let entries = store.recent(&paths.history_collection, limit)?;

    println!("{}", "Occupancy History".cyan().bold());
    println!("  Count: {}", entries.len());
    println!();

    if entries.is_empty() {
        println!("  {}", "No events logged yet".yellow());
    } else {
        let rows: Vec<HistoryRow> = entries.iter().map(|(_, p)| history_row(p)).collect();
        println!("{}", Table::new(rows));
    }

    Ok(())
}

fn cmd_watch(store: &FirestoreStore, paths: &DocumentPaths, interval: u64) -> CliResult<()> {
    println!(
        "{} (interval: {}s, Ctrl+C to stop)",
        "Watch Mode".cyan().bold(),
        interval
    );

    loop {
        // Clear screen
        print!("\x1B[2J\x1B[1;1H");

        println!(
            "{} - {}",
            "Occupancy Watch".cyan().bold(),
            Local::now().format("%H:%M:%S")
        );
        println!("{}", "=".repeat(50));

        match store.get_document(&paths.live_document) {
            Ok(Some(p)) => println!(
                "{} | {} people | light {} | usage {}",
                event_colored(p.event),
                p.count,
                p.light,
                format_usage(p.usage_s)
            ),
            Ok(None) => println!("{}", "No live record yet".yellow()),
            Err(e) => println!("{} {}", "Live read failed:".red(), e),
        }

        println!();
        for line in watch_history_lines(store.recent(&paths.history_collection, 5)) {
            println!("{}", line);
        }

        std::thread::sleep(Duration::from_secs(interval.max(1)));
    }
}

fn watch_history_lines(recent: Result<Vec<(DocumentId, Payload)>, StoreError>) -> Vec<String> {
    match recent {
        Ok(entries) => entries
            .iter()
            .map(|(_, p)| {
                format!(
                    "  {}  {:<8} {}",
                    format_local(&p.timestamp),
                    p.event.as_str(),
                    p.count
                )
            })
            .collect(),
        Err(e) => vec![format!("{} {}", "History read failed:".red(), e)],
    }
}

fn history_row(p: &Payload) -> HistoryRow {
    let local = p.timestamp.with_timezone(&Local);
    HistoryRow {
        date: local.format("%Y-%m-%d").to_string(),
        time: local.format("%H:%M:%S").to_string(),
        event: event_colored(p.event).to_string(),
        count: p.count,
        light: p.light.clone(),
        usage: format_usage(p.usage_s),
    }
}

fn event_colored(event: Event) -> ColoredString {
    match event {
        Event::Occupied => event.as_str().green().bold(),
        Event::Empty => event.as_str().red().bold(),
    }
}

fn format_local(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Seconds as `HH:MM:SS`; hours are not wrapped at 24.
fn format_usage(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
