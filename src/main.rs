use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use linkstash::api::{self, AppState};
use linkstash::config::Config;
use linkstash::location;
use linkstash::redirect::{self, RedirectState};
use linkstash::resolver::Resolver;
use linkstash::shortener::ShortenService;
use linkstash::storage::{self, RecordStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let medium = storage::open_storage(&config.database, &config.cache).await?;
    let store = Arc::new(RecordStore::new(
        medium,
        config.database.namespace.clone(),
        config.database.timeout(),
    ));
    info!(
        namespace = store.namespace(),
        urls = store.get_all().await.len(),
        "Record store ready"
    );

    let shortener = Arc::new(ShortenService::new(
        Arc::clone(&store),
        config.shortener.clone(),
    ));

    let locator = location::from_config(&config.location)?;
    if locator.is_none() {
        info!("Location lookups disabled");
    }
    let resolver = Arc::new(Resolver::new(
        Arc::clone(&store),
        locator,
        config.location.timeout(),
    ));

    // Create routers
    let api_router = api::create_api_router(Arc::new(AppState {
        store: Arc::clone(&store),
        shortener,
        redirect_base_url: config.redirect_base_url.clone(),
    }));
    let redirect_router = redirect::create_redirect_router(Arc::new(RedirectState {
        resolver,
        trusted_proxy_mode: config.location.trusted_proxy_mode,
        trusted_hops: config.location.trusted_hops,
    }));

    // Start API server
    let api_addr = config.api_server.addr();
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("API server listening on http://{}", api_addr);
    info!("   - API endpoints available at http://{}/api/...", api_addr);

    // Start redirect server
    let redirect_addr = config.redirect_server.addr();
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!("Redirect server listening on http://{}", redirect_addr);
    info!("   - Short links served as {}/<code>", config.redirect_base_url);

    // Run both servers concurrently
    tokio::try_join!(
        axum::serve(api_listener, api_router),
        axum::serve(
            redirect_listener,
            redirect_router.into_make_service_with_connect_info::<SocketAddr>(),
        ),
    )?;

    Ok(())
}
