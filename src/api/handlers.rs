use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::{extract_bearer_from_headers, AccessPolicy, Rejection};
use crate::cache::{ClosePriceCache, LivePriceCache};
use crate::news::{NewsArticle, NewsCache};

#[derive(Clone)]
pub struct ApiState {
    pub policy: Arc<AccessPolicy>,
    pub live: Arc<LivePriceCache>,
    pub closes: Arc<ClosePriceCache>,
    pub news: Arc<NewsCache>,
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub prices: Vec<Option<f64>>,
    pub closes: Vec<Option<f64>>,
    pub news: Vec<NewsArticle>,
}

type ApiError = (StatusCode, Json<Value>);

fn error_body(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

// Every route shares the subscriber token
fn authenticate_request(headers: &HeaderMap, policy: &AccessPolicy) -> Result<(), ApiError> {
    let token = extract_bearer_from_headers(headers);
    policy.check_token(token.as_deref()).map_err(|rejection| {
        warn!("API request rejected: {}", rejection.message());
        error_body(StatusCode::UNAUTHORIZED, &Rejection::InvalidToken.message())
    })
}

// GET /api/init - Current prices, closes and news in one payload
pub async fn init(State(state): State<ApiState>, headers: HeaderMap) -> Result<Json<InitResponse>, ApiError> {
    authenticate_request(&headers, &state.policy)?;

    if !state.live.is_ready() || !state.closes.is_ready() {
        warn!("Init requested before caches were ready");
        return Err(error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch prices"));
    }

    let response = InitResponse {
        prices: state.live.snapshot(),
        closes: state.closes.snapshot(),
        news: state.news.snapshot(),
    };
    info!(
        "Served init: {} prices, {} news articles",
        response.prices.len(),
        response.news.len()
    );
    Ok(Json(response))
}

// GET /api/ping
pub async fn ping(State(state): State<ApiState>, headers: HeaderMap) -> Result<&'static str, ApiError> {
    authenticate_request(&headers, &state.policy)?;
    Ok("pong")
}

pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/init", get(init))
        .route("/ping", get(ping))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}
