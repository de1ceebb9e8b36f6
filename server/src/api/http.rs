use axum::{
    async_trait,
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Multipart, Path, Query, State as AxumState,
    },
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use stake_execution::ProofFile;
use stake_types::{
    api::{BetFilter, CreateBetRequest, ExploreSort, PickRequest, ResolveRequest, UpdateBetRequest},
    ProofType,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::{ApiError, USER_HEADER};
use crate::{HttpMetrics, RouteFamily, Server};

/// Caller identity taken from the header set by the authenticating gateway.
pub(super) struct Actor(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Actor(value.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

/// Records the handler latency under its route family when dropped.
struct Timed<'a> {
    metrics: &'a HttpMetrics,
    family: RouteFamily,
    start: Instant,
}

impl<'a> Timed<'a> {
    fn start(server: &'a Server, family: RouteFamily) -> Self {
        Self {
            metrics: server.http_metrics(),
            family,
            start: Instant::now(),
        }
    }
}

impl Drop for Timed<'_> {
    fn drop(&mut self) {
        self.metrics.record(self.family, self.start.elapsed());
    }
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExploreQuery {
    sort_by: Option<String>,
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn readyz(AxumState(server): AxumState<Arc<Server>>) -> Response {
    if server.is_ready() {
        (StatusCode::OK, Json(ReadyResponse { ready: true, reason: None })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                reason: Some("store_unavailable"),
            }),
        )
            .into_response()
    }
}

pub(super) async fn config(AxumState(server): AxumState<Arc<Server>>) -> Response {
    Json(&server.config).into_response()
}

pub(super) async fn http_metrics(
    headers: HeaderMap,
    AxumState(server): AxumState<Arc<Server>>,
) -> Response {
    if let Some(err) = metrics_auth_error(&server, &headers) {
        return err.into_response();
    }
    Json(server.http_metrics_snapshot()).into_response()
}

pub(super) async fn lifecycle_metrics(
    headers: HeaderMap,
    AxumState(server): AxumState<Arc<Server>>,
) -> Response {
    if let Some(err) = metrics_auth_error(&server, &headers) {
        return err.into_response();
    }
    Json(server.lifecycle_metrics_snapshot()).into_response()
}

fn metrics_auth_error(server: &Server, headers: &HeaderMap) -> Option<ApiError> {
    let token = server
        .config
        .metrics_auth_token
        .as_deref()
        .filter(|token| !token.is_empty())?;
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let header_token = headers
        .get("x-metrics-token")
        .and_then(|value| value.to_str().ok());
    if bearer == Some(token) || header_token == Some(token) {
        None
    } else {
        Some(ApiError::unauthorized("metrics token required"))
    }
}

pub(super) async fn create_bet(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    body: Result<Json<CreateBetRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Write);
    let Json(request) = body?;
    let bet = server.engine().create_bet(&actor, &request)?;
    Ok((StatusCode::CREATED, Json(bet)).into_response())
}

pub(super) async fn list_bets(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    query: Result<Query<BetFilter>, QueryRejection>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    let Query(filter) = query?;
    let bets = server.engine().list_bets(&actor, &filter)?;
    debug!(actor = %actor, count = bets.len(), "listed bets");
    Ok(Json(bets).into_response())
}

pub(super) async fn feed(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    Ok(Json(server.engine().feed(&actor)?).into_response())
}

pub(super) async fn explore(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    query: Result<Query<ExploreQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    let Query(query) = query?;
    let sort = match query.sort_by.as_deref() {
        None => ExploreSort::default(),
        Some(value) => value
            .parse::<ExploreSort>()
            .map_err(|message| ApiError::invalid("sortBy", message))?,
    };
    Ok(Json(server.engine().explore(&actor, sort)?).into_response())
}

pub(super) async fn participations(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    Ok(Json(server.engine().participations(&actor)?).into_response())
}

pub(super) async fn get_bet(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path(bet_id): Path<String>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    Ok(Json(server.engine().fetch_bet(&actor, &bet_id)?).into_response())
}

pub(super) async fn update_bet(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path(bet_id): Path<String>,
    body: Result<Json<UpdateBetRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Write);
    let Json(patch) = body?;
    let bet = server.engine().update_bet(&actor, &bet_id, &patch).await?;
    Ok(Json(bet).into_response())
}

pub(super) async fn record_pick(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path(bet_id): Path<String>,
    body: Result<Json<PickRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Write);
    let Json(pick) = body?;
    let detail = server
        .engine()
        .record_pick(&actor, &bet_id, &pick.option_id)
        .await?;
    Ok(Json(detail).into_response())
}

pub(super) async fn lock_bet(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path(bet_id): Path<String>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Write);
    Ok(Json(server.engine().lock_bet(&actor, &bet_id).await?).into_response())
}

pub(super) async fn resolve(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path(bet_id): Path<String>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Write);
    let Json(request) = body?;
    let detail = server
        .engine()
        .resolve(&actor, &bet_id, &request.winning_option_id)
        .await?;
    Ok(Json(detail).into_response())
}

pub(super) async fn circle_bets(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path(circle_id): Path<String>,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    Ok(Json(server.engine().circle_bets(&actor, &circle_id)?).into_response())
}

pub(super) async fn pending_stakes(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    Ok(Json(server.engine().pending_stakes(&actor)?).into_response())
}

pub(super) async fn stats(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Read);
    Ok(Json(server.engine().stats(&actor)?).into_response())
}

/// Multipart upload with a `file` part and a `proofType` text part.
pub(super) async fn submit_proof(
    AxumState(server): AxumState<Arc<Server>>,
    Actor(actor): Actor,
    Path((bet_id, stake_id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let _timed = Timed::start(&server, RouteFamily::Proof);
    let mut proof_type = None;
    let mut upload: Option<(ProofFile, Bytes)> = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("proofType") => {
                let value = field.text().await?;
                proof_type = Some(
                    value
                        .trim()
                        .parse::<ProofType>()
                        .map_err(|err| ApiError::invalid("proofType", err.to_string()))?,
                );
            }
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await?;
                let file = ProofFile {
                    file_name,
                    content_type,
                    size: body.len() as u64,
                };
                upload = Some((file, body));
            }
            _ => {}
        }
    }
    let proof_type = proof_type.ok_or_else(|| ApiError::invalid("proofType", "missing proofType"))?;
    let (file, body) = upload.ok_or_else(|| ApiError::invalid("file", "missing file"))?;

    let stake = server
        .engine()
        .submit_proof(
            server.blobs(),
            &actor,
            &bet_id,
            &stake_id,
            proof_type,
            file,
            body,
        )
        .await?;
    Ok(Json(stake).into_response())
}
