mod commands;
mod render;

use std::sync::Arc;

use anyhow::Result;
use calcache_core::date_range::DateRange;
use calcache_core::{CalCacheConfig, EventCache, FsVault, Vault};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calcache")]
#[command(about = "Browse, create and watch the events in your notes and calendar feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured calendars
    Calendars,
    /// Show an agenda of events, grouped by day
    Events {
        /// Only show this calendar (by id)
        #[arg(short, long)]
        calendar: Option<String>,

        /// Show events from this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Show events until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print the display form of every event as JSON instead of an agenda
        #[arg(long)]
        json: bool,
    },
    /// Add an event to an editable calendar
    New {
        title: String,

        /// Day of the event (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Start time (HH:MM). Without it the event is all-day.
        #[arg(short, long)]
        start: Option<String>,

        /// End time (HH:MM)
        #[arg(short, long, conflicts_with = "duration")]
        end: Option<String>,

        /// Length of the event (e.g. "45m", "2h", "3days")
        #[arg(long)]
        duration: Option<String>,

        /// Calendar to add the event to (by id)
        #[arg(short, long)]
        calendar: Option<String>,

        /// Create the event as an open task
        #[arg(long)]
        task: bool,
    },
    /// Watch the vault and print every change to the cache
    Watch {
        /// How often to re-fetch read-only calendars (e.g. "15m")
        #[arg(long)]
        refresh: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = CalCacheConfig::load()?;
    let vault_root = config.vault_path();

    match cli.command {
        Commands::Calendars => {
            let cache = load_cache(config).await?;
            commands::calendars::run(&cache)
        }
        Commands::Events {
            calendar,
            from,
            to,
            json,
        } => {
            let cache = load_cache(config).await?;
            if let Some(id) = calendar.as_deref() {
                require_calendar(&cache, id)?;
            }
            if json {
                return commands::events::print_json(&cache, calendar.as_deref());
            }
            let range = DateRange::from_args(from.as_deref(), to.as_deref())
                .map_err(|e| anyhow::anyhow!(e))?;
            commands::events::run(&cache, calendar.as_deref(), range)
        }
        Commands::New {
            title,
            date,
            start,
            end,
            duration,
            calendar,
            task,
        } => {
            let mut cache = load_cache(config).await?;
            let args = commands::new::NewArgs {
                title,
                date,
                start,
                end,
                duration,
                task,
            };
            commands::new::run(&mut cache, args, calendar.as_deref()).await
        }
        Commands::Watch { refresh } => {
            let refresh = refresh
                .as_deref()
                .map(humantime::parse_duration)
                .transpose()
                .map_err(|e| anyhow::anyhow!("Could not parse refresh interval: {}", e))?;
            let cache = load_cache(config).await?;
            commands::watch::run(cache, vault_root, refresh).await
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (warnings only by default).
fn init_tracing() {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::new("warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn load_cache(config: CalCacheConfig) -> Result<EventCache> {
    if config.calendars.is_empty() {
        let config_path = CalCacheConfig::config_path()?;
        anyhow::bail!(
            "No calendars configured.\n\n\
            Add one to {} with:\n  \
            [[calendars]]\n  \
            type = \"local\"\n  \
            directory = \"events\"",
            config_path.display()
        );
    }

    let vault: Arc<dyn Vault> = Arc::new(FsVault::new(config.vault_path()));
    let mut cache = EventCache::new(config, vault);
    cache.initialize();
    cache.populate().await;

    Ok(cache)
}

fn require_calendar(cache: &EventCache, id: &str) -> Result<()> {
    if cache.calendars().iter().any(|c| c.id() == id) {
        return Ok(());
    }

    let available: Vec<_> = cache.calendars().iter().map(|c| c.id()).collect();
    anyhow::bail!(
        "Calendar '{}' not found. Available: {}",
        id,
        available.join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn every_subcommand_has_help_text() {
        let cli = Cli::command();
        cli.clone().debug_assert();

        for sub in cli.get_subcommands() {
            assert!(sub.get_about().is_some(), "{} has no help", sub.get_name());
        }
    }
}
