use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fullfeed::{Config, EnrichRequest, FeedEnricher};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Config file location: `~/.config/fullfeed/config.toml`, or
/// `fullfeed.toml` in the working directory when HOME is unset.
fn default_config_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".config")
            .join("fullfeed")
            .join("config.toml"),
        None => PathBuf::from("fullfeed.toml"),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "fullfeed",
    version,
    about = "Turn truncated RSS/Atom feeds into full-content feeds"
)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich a feed and write the resulting RSS document
    Enrich {
        /// URL of the source feed
        url: String,

        /// Only use this fetch strategy (readability, http, browser)
        #[arg(long, value_name = "NAME")]
        method: Option<String>,

        /// Process at most this many entries
        #[arg(long, value_name = "N")]
        max_entries: Option<usize>,

        /// Number of entries processed in parallel
        #[arg(long, short, value_name = "N")]
        workers: Option<usize>,

        /// Write the feed here instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the feed
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fullfeed=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;

    match args.command {
        Command::ShowConfig => {
            let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
            println!("{json}");
        }
        Command::Enrich {
            url,
            method,
            max_entries,
            workers,
            output,
        } => {
            let enricher = FeedEnricher::new(config).context("Failed to set up enricher")?;
            let request = EnrichRequest {
                url,
                preferred_method: method,
                max_entries,
                workers,
            };

            let document = match enricher.enrich(&request).await {
                Ok(document) => document,
                Err(e) => anyhow::bail!("{e} (status {})", e.status_code()),
            };

            if let Some(stats) = &document.stats {
                eprintln!(
                    "{} of {} entries: {} full, {} summary, {} unavailable, {} failed ({:.1}s)",
                    stats.processed(),
                    stats.submitted,
                    stats.cascade,
                    stats.rss_summary,
                    stats.unavailable,
                    stats.failed,
                    stats.elapsed.as_secs_f64()
                );
            } else {
                eprintln!("Served from cache");
            }

            match output {
                Some(path) => std::fs::write(&path, &document.xml)
                    .with_context(|| format!("Failed to write feed to '{}'", path.display()))?,
                None => std::io::stdout()
                    .lock()
                    .write_all(&document.xml)
                    .context("Failed to write feed to stdout")?,
            }
        }
    }

    Ok(())
}
