use reqwest::{multipart, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use stake_types::{
    api::{
        BetDetail, BetFilter, CreateBetRequest, ErrorResponse, ExploreSort, Participation,
        PendingStake, PickRequest, ResolveRequest, UpdateBetRequest, UserStats,
    },
    Bet, ProofType, StakeInstance,
};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::{Error, ErrorKind, Result};

const USER_HEADER: &str = "x-user-id";

/// Backoff for idempotent reads that hit a transient failure.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// A file attached as proof of a completed stake.
#[derive(Clone, Debug)]
pub struct ProofAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// HTTP client acting on behalf of one user.
///
/// The user id is sent in the `x-user-id` header the server expects from its
/// authenticating gateway.
#[derive(Clone)]
pub struct Client {
    base: Url,
    user_id: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(base_url: &str, user_id: impl Into<String>) -> Result<Self> {
        let base = Url::parse(base_url)?;
        match base.scheme() {
            "http" | "https" => {}
            other => return Err(Error::InvalidScheme(other.to_string())),
        }
        if base.cannot_be_a_base() {
            return Err(Error::InvalidScheme(base.scheme().to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base,
            user_id: user_id.into(),
            http,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Same connection pool, acting as another user.
    pub fn as_user(&self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..self.clone()
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http
            .request(method, self.url(segments))
            .header(USER_HEADER, &self.user_id)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: Option<&(dyn ErasedQuery + Sync)>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.request(Method::GET, segments);
            if let Some(query) = query {
                request = query.apply(request);
            }
            let outcome = match request.send().await {
                Ok(response) => decode(response).await,
                Err(err) => Err(Error::Reqwest(err)),
            };
            match outcome {
                Err(err) if attempt < self.retry.max_attempts && is_transient(&err) => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        path = %segments.join("/"),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying read"
                    );
                    tokio::time::sleep(backoff).await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.request(method, segments);
        if let Some(body) = body {
            request = request.json(body);
        }
        decode(request.send().await?).await
    }

    pub async fn healthz(&self) -> Result<bool> {
        let response = self.http.get(self.url(&["healthz"])).send().await?;
        Ok(response.status().is_success())
    }

    pub async fn create_bet(&self, request: &CreateBetRequest) -> Result<Bet> {
        self.send(Method::POST, &["bets"], Some(request)).await
    }

    pub async fn list_bets(&self, filter: &BetFilter) -> Result<Vec<Bet>> {
        self.get(&["bets"], Some(&Query(filter))).await
    }

    pub async fn circle_bets(&self, circle_id: &str) -> Result<Vec<Bet>> {
        self.get(&["circles", circle_id, "bets"], None).await
    }

    pub async fn feed(&self) -> Result<Vec<Bet>> {
        self.get(&["bets", "feed"], None).await
    }

    pub async fn explore(&self, sort: ExploreSort) -> Result<Vec<Bet>> {
        let query = [("sortBy", sort)];
        self.get(&["bets", "explore"], Some(&Query(&query))).await
    }

    pub async fn participations(&self) -> Result<Vec<Participation>> {
        self.get(&["bets", "mine"], None).await
    }

    pub async fn pending_stakes(&self) -> Result<Vec<PendingStake>> {
        self.get(&["stakes", "pending"], None).await
    }

    pub async fn stats(&self) -> Result<UserStats> {
        self.get(&["users", "me", "stats"], None).await
    }

    pub async fn get_bet(&self, bet_id: &str) -> Result<BetDetail> {
        self.get(&["bets", bet_id], None).await
    }

    pub async fn update_bet(&self, bet_id: &str, patch: &UpdateBetRequest) -> Result<Bet> {
        self.send(Method::PATCH, &["bets", bet_id], Some(patch)).await
    }

    pub async fn pick(&self, bet_id: &str, option_id: &str) -> Result<BetDetail> {
        let body = PickRequest {
            option_id: option_id.to_string(),
        };
        self.send(Method::PATCH, &["bets", bet_id, "pick"], Some(&body))
            .await
    }

    pub async fn lock_bet(&self, bet_id: &str) -> Result<Bet> {
        self.send::<(), _>(Method::POST, &["bets", bet_id, "lock"], None)
            .await
    }

    pub async fn resolve(&self, bet_id: &str, winning_option_id: &str) -> Result<BetDetail> {
        let body = ResolveRequest {
            winning_option_id: winning_option_id.to_string(),
        };
        self.send(Method::POST, &["bets", bet_id, "resolve"], Some(&body))
            .await
    }

    pub async fn submit_proof(
        &self,
        bet_id: &str,
        stake_id: &str,
        proof_type: ProofType,
        attachment: ProofAttachment,
    ) -> Result<StakeInstance> {
        let file = multipart::Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.content_type)?;
        let form = multipart::Form::new()
            .text("proofType", proof_type.as_str())
            .part("file", file);
        let response = self
            .request(Method::POST, &["bets", bet_id, "stakes", stake_id, "proof"])
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }
}

/// Query string attached to a retried read.
trait ErasedQuery {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

struct Query<'a, T: ?Sized>(&'a T);

impl<T: Serialize + ?Sized> ErasedQuery for Query<'_, T> {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.query(self.0)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.text().await?;
    debug!(status = status.as_u16(), body = %body, "request rejected");
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => Err(Error::Api {
            status,
            kind: ErrorKind::from(error.kind.as_str()),
            message: error.message,
            field: error.field,
        }),
        Err(_) => Err(Error::FailedWithBody { status, body }),
    }
}

fn is_transient(err: &Error) -> bool {
    match err {
        Error::Reqwest(err) => err.is_connect() || err.is_timeout(),
        Error::Api { status, .. } | Error::FailedWithBody { status, .. } => matches!(
            *status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ),
        _ => false,
    }
}
