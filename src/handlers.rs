//! HTTP handlers wiring CoverageEngine, CreditLedger, the geocode
//! pass-through and receipt verification to the routes.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::categories::Category;
use crate::config;
use crate::coverage;
use crate::credits;
use crate::error::{ApiError, CoreError};
use crate::store::Place;
use crate::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "ping ok" }))
}

#[derive(Debug, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct Circle {
    pub center: LatLng,
    pub radius: f64,
}

#[derive(Debug, Deserialize)]
pub struct LocationRestriction {
    pub circle: Circle,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPlacesRequest {
    pub included_types: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub rank_preference: String,
    pub location_restriction: LocationRestriction,
    pub places_type: String,
    pub user_id: String,
}

pub async fn get_places(
    State(state): State<AppState>,
    Json(req): Json<GetPlacesRequest>,
) -> Result<Json<Vec<Place>>, ApiError> {
    match credits::guard(state.pools.read(), &req.user_id).await {
        Ok(()) => {}
        Err(CoreError::CreditExhausted) => return Ok(Json(Vec::new())),
        Err(e) => return Err(e.into()),
    }

    let category: Category = req.places_type.parse().map_err(|_| {
        ApiError::bad_request(format!("unknown placesType '{}'", req.places_type))
    })?;

    let circle = &req.location_restriction.circle;
    let expansion_level = coverage::expansion_level_for_radius(
        circle.center.latitude,
        circle.center.longitude,
        circle.radius,
    )?;

    let fetch_types: Vec<String> = match config::provider() {
        config::Provider::GooglePlaces => category.google_included_types(),
        config::Provider::Overpass => category.osm_amenity_types(),
    }
    .iter()
    .map(|t| t.to_string())
    .collect();

    let places = coverage::get_places(
        state.pools.write(),
        state.fetcher.as_ref(),
        circle.center.latitude,
        circle.center.longitude,
        expansion_level,
        category.bit_index(),
        &fetch_types,
        &req.included_types,
        config::MAX_QUADRANT_SPLIT_DEPTH,
    )
    .await?;

    credits::spend(state.pools.write(), &req.user_id).await;

    Ok(Json(places))
}

#[derive(Debug, Deserialize)]
pub struct ReverseGeocodeRequest {
    pub latitude: f64,
    pub longitude: f64,
}

pub async fn reverse_geocode(
    State(state): State<AppState>,
    Json(req): Json<ReverseGeocodeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let body = state.geocode.reverse(req.latitude, req.longitude).await?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct CreditsResponse {
    pub credits: i64,
}

pub async fn get_credits(
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = credits::balance(state.pools.read(), &req.user_id).await?;
    Ok(Json(CreditsResponse { credits }))
}

pub async fn get_trial_credits(
    State(state): State<AppState>,
    Json(req): Json<UserIdRequest>,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = credits::grant_trial(state.pools.write(), &req.user_id).await?;
    Ok(Json(CreditsResponse { credits }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPurchaseRequest {
    pub verification_data: String,
    #[allow(dead_code)]
    pub platform: String,
    pub product_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct VerifyPurchaseResponse {
    pub status: String,
    pub credits_available: i64,
}

pub async fn verify_purchase(
    State(state): State<AppState>,
    Json(req): Json<VerifyPurchaseRequest>,
) -> Result<Json<VerifyPurchaseResponse>, ApiError> {
    let expected_credits = credits::credits_for_product(&req.product_id).ok_or_else(|| {
        ApiError::bad_request(format!("unknown product id '{}'", req.product_id))
    })?;

    let verified = state.receipts.verify(&req.verification_data).await?;
    if verified.product_id != req.product_id {
        return Err(ApiError::bad_request(
            "receipt product does not match the requested product",
        ));
    }

    credits::record_purchase(
        state.pools.write(),
        &req.user_id,
        expected_credits,
        &verified.transaction_id,
    )
    .await?;
    let credits_available = credits::balance(state.pools.read(), &req.user_id).await?;

    Ok(Json(VerifyPurchaseResponse {
        status: "success".to_string(),
        credits_available,
    }))
}
