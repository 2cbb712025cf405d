pub mod api_constants;
pub mod categories;
pub mod config;
pub mod countries;
pub mod coverage;
pub mod credits;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod geocode;
pub mod grid;
pub mod handlers;
pub mod receipts;
pub mod store;

use crate::db::DbPools;
use crate::fetcher::ExternalFetcher;
use crate::geocode::GeocodeClient;
use crate::receipts::ReceiptVerifier;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pools: DbPools,
    pub fetcher: Arc<dyn ExternalFetcher>,
    pub geocode: Arc<GeocodeClient>,
    pub receipts: Arc<ReceiptVerifier>,
}

/// Assembles the routed application, shared between `main.rs`'s
/// production server and benches/tests that need the full surface
/// without the outer CORS/trace/panic-catch middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(api_constants::HEALTH_ROUTE, get(handlers::health))
        .route(api_constants::GET_PLACES_ROUTE, post(handlers::get_places))
        .route(
            api_constants::REVERSE_GEOCODE_ROUTE,
            post(handlers::reverse_geocode),
        )
        .route(api_constants::GET_CREDITS_ROUTE, post(handlers::get_credits))
        .route(
            api_constants::GET_TRIAL_CREDITS_ROUTE,
            post(handlers::get_trial_credits),
        )
        .route(
            api_constants::VERIFY_PURCHASE_ROUTE,
            post(handlers::verify_purchase),
        )
        .with_state(state)
}
