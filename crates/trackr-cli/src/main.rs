//! 🚀 trackr: the front door. Loads config, sets up logging, then feeds stdin to a Client.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//!
//! ```text
//! echo '{"type":"track","distinct_id":"abc123","event":"Login"}' | trackr --config trackr.toml
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use trackr::{Client, Properties};

mod commands;
mod progress;

use commands::Command;
use progress::{Progress, Tally};

/// 📊 Validate analytics events from stdin (one JSON command per line) and deliver them.
#[derive(Debug, Parser)]
#[command(name = "trackr", version)]
struct Args {
    /// TOML config file. Missing file means TRACKR_* environment variables only.
    #[arg(short, long, default_value = "trackr.toml")]
    config: PathBuf,

    /// JSON object registered as super properties before the first command.
    #[arg(long)]
    super_properties: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("connection failure")
                || cause_str.contains("error sending request")
                || cause_str.contains("Connection refused")
                || cause_str.contains("connection refused")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: the ingestion endpoint isn't reachable. Double-check server_url \
                and that the collector behind it is actually running. ☕"
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    // 🔒 a missing file is fine, env vars may carry everything
    let config_file = args.config.as_path();
    let config_file = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether the config file exists. Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => {
            warn!(path = %config_file.display(), "⚠️ Config file not found, using TRACKR_* environment only");
            None
        }
    };

    let app_config = trackr::load_config(config_file)
        .context("💀 Couldn't load the config. Make sure you didn't forget something obvious, like server_url")?;

    let mut client = Client::from_config(&app_config)
        .await
        .context("💀 Couldn't build the client from the config")?;

    if let Some(raw) = args.super_properties.as_deref() {
        let properties: Properties =
            serde_json::from_str(raw).context("💀 --super-properties must be a JSON object")?;
        client.register_super_properties(properties);
    }

    let mut tally = Tally::default();
    let progress = Progress::start();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("💀 Failed reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let command: Command = match serde_json::from_str(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "🚫 Skipping unparseable line");
                tally.rejected += 1;
                progress.update(&tally);
                continue;
            }
        };
        match command.apply(&mut client).await {
            Ok(()) => tally.accepted += 1,
            Err(e) if e.is_illegal_data() => {
                warn!(error = %e, "🚫 Rejected");
                tally.rejected += 1;
            }
            Err(e) => {
                error!(error = %e, "💀 Delivery failed");
                tally.failed += 1;
            }
        }
        progress.update(&tally);
    }

    // 🏁 close drains whatever the sink is still holding; its failure is the run's failure
    let closed = client.close().await;
    println!("{}", progress.finish(&tally));
    closed.context("💀 Closing the client failed, buffered records may not have been delivered")?;
    Ok(())
}
