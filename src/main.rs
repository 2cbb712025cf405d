use autour::fetcher::{ExternalFetcher, GooglePlacesFetcher, OverpassFetcher};
use autour::geocode::GeocodeClient;
use autour::receipts::ReceiptVerifier;
use autour::{config, countries, db, router, store, AppState};
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("autour=debug".parse()?))
        .init();

    info!("Starting autour backend");

    let database_url = config::database_url();
    let pools = db::init_pool(&database_url).await?;
    db::run_migrations(&pools).await?;

    store::bootstrap_zones(pools.write())
        .await
        .map_err(|e| anyhow::anyhow!("zone bootstrap failed: {e:?}"))?;
    countries::seed(pools.write()).await?;

    let timeout = config::upstream_timeout();
    let fetcher: Arc<dyn ExternalFetcher> = match config::provider() {
        config::Provider::GooglePlaces => {
            Arc::new(GooglePlacesFetcher::new(config::google_places_api_key(), timeout))
        }
        config::Provider::Overpass => Arc::new(OverpassFetcher::new(timeout)),
    };

    let state = AppState {
        pools,
        fetcher,
        geocode: Arc::new(GeocodeClient::new(config::geocode_api_key(), timeout)),
        receipts: Arc::new(ReceiptVerifier::new(config::apple_shared_secret(), timeout)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_: tower::BoxError| async {
                    StatusCode::REQUEST_TIMEOUT
                }))
                .timeout(timeout),
        );

    let port = config::parse_port()?;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
