use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use reconx::event::EventKind;
use reconx::module::registry::builtin_registry;
use reconx::persist::MemoryStore;
use reconx::scan::manager::ScanManager;
use reconx::scan::ScanStatus;
use reconx::CoreConfig;

#[derive(Parser)]
#[command(name = "reconx", version, about = "Modular reconnaissance engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available probe modules and their options
    Modules {
        /// Only show modules in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Run one probe module against a target
    Scan {
        /// Module name, e.g. port_scan
        #[arg(short, long)]
        module: String,

        /// Target host, domain or IP address
        #[arg(short, long)]
        target: String,

        /// Module option as key=value; repeatable
        #[arg(short, long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Session identifier grouping related scans
        #[arg(long, default_value = "cli")]
        session: String,

        /// Print the final result as raw JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = CoreConfig::load_default_config();
    config.validate()?;

    match cli.command {
        Commands::Modules { category } => list_modules(&config, category.as_deref()),
        Commands::Scan {
            module,
            target,
            options,
            session,
            json,
        } => run_scan(config, &module, &target, &options, &session, json).await,
    }
}

fn list_modules(config: &CoreConfig, category: Option<&str>) -> anyhow::Result<()> {
    let registry = builtin_registry(config);
    let mut descriptors: Vec<_> = registry.descriptors().into_values().collect();
    descriptors.sort_by(|a, b| a.name.cmp(&b.name));

    for info in descriptors {
        if let Some(category) = category {
            if info.category != category {
                continue;
            }
        }

        println!(
            "{} {} {}",
            info.name.bright_cyan().bold(),
            format!("[{}]", info.category).bright_black(),
            info.description
        );
        for option in &info.options {
            println!(
                "    {} ({:?}, default {}) {}",
                option.name.bright_yellow(),
                option.kind,
                option.default,
                option.description.bright_black()
            );
        }
    }
    Ok(())
}

/// Parse repeated `key=value` flags, coercing bools and integers so typed
/// options validate against the module schema
fn parse_options(pairs: &[String]) -> anyhow::Result<HashMap<String, Value>> {
    let mut options = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("option '{}' is not key=value", pair))?;

        let value = if let Ok(b) = value.parse::<bool>() {
            Value::Bool(b)
        } else if let Ok(n) = value.parse::<i64>() {
            Value::from(n)
        } else {
            Value::String(value.to_string())
        };
        options.insert(key.to_string(), value);
    }
    Ok(options)
}

async fn run_scan(
    config: CoreConfig,
    module: &str,
    target: &str,
    option_pairs: &[String],
    session: &str,
    json: bool,
) -> anyhow::Result<()> {
    let options = parse_options(option_pairs)?;

    let registry = builtin_registry(&config);
    let store = Arc::new(MemoryStore::new());
    let manager = ScanManager::new(config, registry, store.clone(), store);

    let record = manager
        .start_scan(session, module, target, options)
        .await
        .context("failed to start scan")?;
    // Two subscriptions: one drained for advisory events, one parked on the
    // guaranteed terminal slot.
    let mut events = manager
        .subscribe(record.id)
        .ok_or_else(|| anyhow!("scan {} vanished before subscription", record.id))?;
    let mut done = manager
        .subscribe(record.id)
        .ok_or_else(|| anyhow!("scan {} vanished before subscription", record.id))?;

    println!(
        "{} {} on {} (scan {})",
        "[~]".bright_blue(),
        module.bright_cyan().bold(),
        target.bright_white(),
        record.id
    );

    let bar = ProgressBar::new(1000);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let terminal = loop {
        tokio::select! {
            event = events.next_advisory() => {
                let Some(event) = event else { break None };
                match event.kind {
                    EventKind::Progress => {
                        let fraction = event.payload["progress"].as_f64().unwrap_or(0.0);
                        let message = event.payload["message"].as_str().unwrap_or_default();
                        bar.set_position((fraction * 1000.0) as u64);
                        bar.set_message(message.to_string());
                    }
                    EventKind::Data => {
                        if !json {
                            bar.println(format!(
                                "{} {}",
                                "[+]".bright_green(),
                                summarize_data(&event.payload)
                            ));
                        }
                    }
                    _ => {}
                }
            }
            terminal = done.terminal() => break terminal,
            _ = tokio::signal::ctrl_c() => {
                bar.println(format!("{} cancelling scan...", "[!]".bright_yellow()));
                manager.cancel_scan(record.id).await?;
            }
        }
    };
    bar.finish_and_clear();

    // The manager record is the final source of truth; the terminal event
    // can arrive a beat before the record transition lands.
    let record = {
        let id = record.id;
        let mut snapshot = manager.get_scan(id).ok_or_else(|| anyhow!("scan record lost"))?;
        for _ in 0..50 {
            if snapshot.status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            snapshot = manager.get_scan(id).ok_or_else(|| anyhow!("scan record lost"))?;
        }
        snapshot
    };

    match record.status {
        ScanStatus::Completed => {
            println!("{} scan completed", "[✓]".bright_green())
        }
        ScanStatus::Cancelled => {
            println!("{} scan cancelled, partial results below", "[!]".bright_yellow())
        }
        ScanStatus::Failed => {
            let message = record
                .error
                .clone()
                .or_else(|| terminal.map(|e| e.payload.to_string()))
                .unwrap_or_else(|| "unknown error".to_string());
            println!("{} scan failed: {}", "[✗]".bright_red(), message);
            std::process::exit(1);
        }
        _ => {}
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&record.results)?);
    } else if !record.results.is_null() {
        print_summary(&record.results);
    }

    Ok(())
}

/// One-line rendering of an advisory data payload
fn summarize_data(payload: &Value) -> String {
    match payload["type"].as_str() {
        Some("open_port") => format!(
            "open port {} ({})",
            payload["port"]["port"],
            payload["port"]["service"].as_str().unwrap_or("unknown")
        ),
        Some("subdomain") => format!(
            "subdomain {}",
            payload["subdomain"]["host"].as_str().unwrap_or("?")
        ),
        Some("found_path") => format!(
            "path {} [{}]",
            payload["path"]["path"].as_str().unwrap_or("?"),
            payload["path"]["status_code"]
        ),
        Some("emails") => format!(
            "{} emails from {}",
            payload["count"],
            payload["source"].as_str().unwrap_or("?")
        ),
        Some("ip_intel") => format!(
            "located in {} ({})",
            payload["intel"]["country"].as_str().unwrap_or("?"),
            payload["intel"]["org"].as_str().unwrap_or("?")
        ),
        _ => payload.to_string(),
    }
}

/// Compact human rendering of a full result payload
fn print_summary(results: &Value) {
    let count = |key: &str| results[key].as_array().map(|a| a.len()).unwrap_or(0);

    let lines = [
        ("open ports", count("open_ports")),
        ("subdomains", count("subdomains")),
        ("paths", count("found_paths")),
        ("emails", count("emails")),
    ];
    for (label, n) in lines {
        if n > 0 {
            println!("  {} {}", n.to_string().bright_cyan().bold(), label);
        }
    }

    if let Some(ms) = results["scan_time_ms"].as_u64() {
        println!("  finished in {} ms", ms.to_string().bright_black());
    }
}
