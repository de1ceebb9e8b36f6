use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Server;

mod error;
mod http;

pub use error::ApiError;

pub const USER_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct Api {
    server: Arc<Server>,
}

#[derive(Clone)]
struct OriginConfig {
    allowed_origins: Arc<HashSet<String>>,
    allow_any_origin: bool,
    allow_no_origin: bool,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

fn governor_config(period: Duration, burst_size: u32, what: &str) -> Option<Arc<IpGovernorConfig>> {
    GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .or_else(|| {
            tracing::warn!(limit = what, "invalid rate-limit config; falling back to defaults");
            default_governor_config()
        })
        .map(Arc::new)
}

impl Api {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    pub fn router(&self) -> Router {
        let config = &self.server.config;
        let allowed_origins: HashSet<String> = config
            .allowed_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        let allow_any_origin = allowed_origins.contains("*");
        if allowed_origins.is_empty() {
            tracing::warn!("no allowed origins configured; all browser origins will be rejected");
        }
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("invalid allowed origin: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();
        let origin_config = OriginConfig {
            allowed_origins: Arc::new(allowed_origins),
            allow_any_origin,
            allow_no_origin: config.allow_no_origin,
        };

        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(USER_HEADER),
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([header::HeaderName::from_static(REQUEST_ID_HEADER)]);

        // Environment variables override config
        let http_rate_per_sec =
            parse_env_u64("RATE_LIMIT_HTTP_PER_SEC").or(config.http_rate_limit_per_second);
        let http_rate_burst =
            parse_env_u32("RATE_LIMIT_HTTP_BURST").or(config.http_rate_limit_burst);
        let upload_rate_per_min =
            parse_env_u64("RATE_LIMIT_UPLOAD_PER_MIN").or(config.upload_rate_limit_per_minute);
        let upload_rate_burst =
            parse_env_u32("RATE_LIMIT_UPLOAD_BURST").or(config.upload_rate_limit_burst);

        let governor_conf = match (http_rate_per_sec, http_rate_burst) {
            (Some(rate_per_second), Some(burst_size)) if rate_per_second > 0 && burst_size > 0 => {
                let period = Duration::from_nanos((1_000_000_000u64 / rate_per_second).max(1));
                governor_config(period, burst_size, "http")
            }
            _ => None,
        };

        let upload_governor_conf = match (upload_rate_per_min, upload_rate_burst) {
            (Some(rate_per_minute), Some(burst_size)) if rate_per_minute > 0 && burst_size > 0 => {
                let period = Duration::from_nanos((60_000_000_000u64 / rate_per_minute).max(1));
                tracing::info!(
                    rate_per_minute,
                    burst_size,
                    period_ms = period.as_millis() as u64,
                    "proof upload rate limit configured"
                );
                governor_config(period, burst_size, "upload")
            }
            _ => None,
        };

        // Proof uploads get their own body limit and rate limiter
        let upload_route = Router::new()
            .route(
                "/bets/:bet_id/stakes/:stake_id/proof",
                post(http::submit_proof),
            )
            .layer(DefaultBodyLimit::max(config.proof_max_bytes));
        let upload_route = match upload_governor_conf {
            Some(config) => upload_route.layer(GovernorLayer { config }),
            None => upload_route,
        };

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/readyz", get(http::readyz))
            .route("/config", get(http::config))
            .route("/metrics/http", get(http::http_metrics))
            .route("/metrics/lifecycle", get(http::lifecycle_metrics))
            .route("/bets", post(http::create_bet).get(http::list_bets))
            .route("/bets/feed", get(http::feed))
            .route("/bets/explore", get(http::explore))
            .route("/bets/mine", get(http::participations))
            .route("/bets/:bet_id", get(http::get_bet).patch(http::update_bet))
            .route("/bets/:bet_id/pick", patch(http::record_pick))
            .route("/bets/:bet_id/lock", post(http::lock_bet))
            .route("/bets/:bet_id/resolve", post(http::resolve))
            .route("/circles/:circle_id/bets", get(http::circle_bets))
            .route("/stakes/pending", get(http::pending_stakes))
            .route("/users/me/stats", get(http::stats));
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };

        let router = router
            .merge(upload_route)
            .nest_service("/proofs", ServeDir::new(self.server.blobs().root()));

        let router = router.layer(cors);
        let router = router.layer(middleware::from_fn_with_state(
            (origin_config, self.server.clone()),
            enforce_origin,
        ));
        let router = router.layer(middleware::from_fn_with_state(
            self.server.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.server.clone())
    }
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

async fn enforce_origin(
    AxumState((config, server)): AxumState<(OriginConfig, Arc<Server>)>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    let rejection = match origin {
        Some(origin) if !config.allow_any_origin && !config.allowed_origins.contains(origin) => {
            Some("origin not allowed")
        }
        None if !config.allow_no_origin => Some("origin required"),
        _ => None,
    };
    if let Some(message) = rejection {
        server.http_metrics().inc_reject_origin();
        return ApiError::forbidden(message).into_response();
    }
    next.run(req).await
}

async fn request_id_middleware(
    AxumState(server): AxumState<Arc<Server>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static(REQUEST_ID_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    match response.status() {
        StatusCode::UNAUTHORIZED => server.http_metrics().inc_reject_unauthenticated(),
        StatusCode::PAYLOAD_TOO_LARGE => server.http_metrics().inc_reject_body_limit(),
        StatusCode::TOO_MANY_REQUESTS => server.http_metrics().inc_reject_rate_limit(),
        _ => {}
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
