use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use linkstash::config::Config;
use linkstash::models::CreateUrlRequest;
use linkstash::shortener::ShortenService;
use linkstash::storage::{open_storage, RecordStore};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "linkstash-admin")]
#[command(about = "Linkstash record store management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shorten a single URL
    Shorten {
        /// Long URL (http or https)
        url: String,
        /// Validity in minutes (defaults to DEFAULT_VALIDITY_MINUTES)
        #[arg(long)]
        minutes: Option<i64>,
        /// Custom shortcode instead of a generated one
        #[arg(long)]
        code: Option<String>,
    },
    /// List all stored URLs
    List,
    /// Show click events of a shortcode
    Clicks {
        /// Shortcode
        code: String,
    },
    /// Drop click events of expired shortcodes
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // The server may hold a read cache; admin writes go straight to the medium
    let mut cache = config.cache.clone();
    cache.enabled = false;

    let medium = open_storage(&config.database, &cache).await?;
    let store = Arc::new(RecordStore::new(
        medium,
        config.database.namespace.clone(),
        config.database.timeout(),
    ));
    let base_url = config.redirect_base_url.trim_end_matches('/');

    match cli.command {
        Commands::Shorten { url, minutes, code } => {
            let service = ShortenService::new(Arc::clone(&store), config.shortener.clone());

            let mut request = CreateUrlRequest::new(url);
            if let Some(minutes) = minutes {
                request = request.with_minutes(minutes);
            }
            if let Some(code) = code {
                request = request.with_custom_code(code);
            }

            let records = service.shorten(vec![request]).await?;
            for record in records {
                println!("✓ {}/{} -> {}", base_url, record.code, record.long_url);
                if let Some(expires_at) = record.expires_at.as_datetime() {
                    println!("  expires at {}", expires_at.to_rfc3339());
                }
            }
        }
        Commands::List => {
            let urls = store.get_all().await;
            if urls.is_empty() {
                println!("No URLs stored");
            } else {
                let now = Utc::now();
                println!("{:<22} {:<8} {:<27} LONG URL", "CODE", "STATUS", "EXPIRES");
                println!("{}", "-".repeat(90));
                for url in urls {
                    let status = if url.is_active_at(now) { "active" } else { "expired" };
                    let expires = url
                        .expires_at
                        .as_datetime()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{:<22} {:<8} {:<27} {}", url.code, status, expires, url.long_url);
                }
            }
        }
        Commands::Clicks { code } => {
            if store.get_by_code(&code).await.is_none() {
                bail!("Shortcode '{}' not found", code);
            }
            let clicks = store.get_clicks_by_code(&code).await;
            println!("{} click(s) for '{}'", clicks.len(), code);
            for click in clicks {
                let at = click
                    .timestamp
                    .as_datetime()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:<25} {:<12} {}",
                    at,
                    click.source,
                    click.location.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Prune => {
            let report = store.prune_expired(Utc::now()).await?;
            println!(
                "✓ Removed {} click(s), kept {} across {} active shortcode(s)",
                report.removed_clicks, report.retained_clicks, report.active_codes
            );
        }
    }

    Ok(())
}
