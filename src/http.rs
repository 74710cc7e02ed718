//! HTTP transport - exposes the gateway and engine over JSON.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! Writes (credential required, `Authorization: Bearer <secret>` or `x-sync-secret`):
//!
//! - `POST /register` - register or rename a player
//! - `POST /submit-score` - record one game result
//! - `DELETE /player/:identity` - remove a player and their scores
//!
//! Reads:
//!
//! - `GET /leaderboard?limit=N`
//! - `GET /player-rank/:identity` - rank, or `null` if unregistered
//! - `GET /players`, `GET /player/:identity`
//! - `GET /scores/recent?limit=N`
//! - `GET /scores/game/:game_type?limit=N`
//! - `GET /scores/highscores/:game_type?limit=N`
//! - `GET /stats`, `GET /games`, `GET /health`
//!
//! Every response is an envelope: `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": {"kind": "...", "message": "..."}}`.
//!
//! The core is synchronous. Handlers run it on the blocking pool, so a
//! client that disconnects mid-request cannot cut a write in half.
//!
//! ## Example
//!
//! ```ignore
//! let config = IndexConfig::default();
//! let store = config.backend.open()?;
//! let app = http::router(http::AppState::new(config, store));
//! ```

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::IndexConfig;
use crate::directory::PlayerDirectory;
use crate::engine::{AggregationEngine, GlobalStats, HighScoreEntry, LeaderboardEntry};
use crate::error::{ErrorKind, IndexError};
use crate::game::{catalogue, GameInfo, GameType};
use crate::gateway::{Registration, ScoreSubmission, SyncGateway};
use crate::identity::IdentityKey;
use crate::mirror::ScoreMirror;
use crate::store::{PlayerRecord, ScoreRecord, SharedStore};

pub const SECRET_HEADER: &str = "x-sync-secret";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<SyncGateway>,
    engine: AggregationEngine,
    config: Arc<IndexConfig>,
}

impl AppState {
    /// Wire up directory, mirror, engine and a default gateway over `store`.
    pub fn new(config: IndexConfig, store: SharedStore) -> Self {
        let gateway = SyncGateway::new(store.clone());
        Self::with_gateway(config, store, gateway)
    }

    pub fn with_gateway(config: IndexConfig, store: SharedStore, gateway: SyncGateway) -> Self {
        let engine = AggregationEngine::new(
            store.clone(),
            PlayerDirectory::new(store.clone()),
            ScoreMirror::with_max_page(store, config.max_page_size),
        );
        AppState {
            gateway: Arc::new(gateway),
            engine,
            config: Arc::new(config),
        }
    }

    fn engine_backend(&self) -> &'static str {
        self.gateway.store().backend_name()
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), IndexError> {
        let Some(expected) = self.config.write_secret.as_deref() else {
            warn!("write refused: no write secret configured");
            return Err(IndexError::Unauthorized("writes are disabled".into()));
        };
        let Some(provided) = credential(headers) else {
            warn!("write refused: missing credential");
            return Err(IndexError::Unauthorized("missing credential".into()));
        };
        if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            Ok(())
        } else {
            warn!("write refused: credential mismatch");
            Err(IndexError::Unauthorized("invalid credential".into()))
        }
    }
}

/// Build an axum `Router` over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/games", get(games))
        .route("/register", post(register))
        .route("/submit-score", post(submit_score))
        .route("/leaderboard", get(leaderboard))
        .route("/player-rank/:identity", get(player_rank))
        .route("/players", get(players))
        .route("/player/:identity", get(player).delete(remove_player))
        .route("/scores/recent", get(recent_scores))
        .route("/scores/game/:game_type", get(game_scores))
        .route("/scores/highscores/:game_type", get(high_scores))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the index over HTTP at `config.bind` until ctrl-c.
pub async fn serve(state: AppState) -> Result<(), std::io::Error> {
    let addr = state.config.bind;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %listener.local_addr()?,
        backend = state.engine_backend(),
        "arcade index listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: ErrorBody,
}

/// An `IndexError` on its way out as an error envelope.
#[derive(Debug)]
pub struct ApiError(IndexError);

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if let IndexError::Internal(detail) = &err {
            error!(%detail, "request failed");
        }
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorEnvelope {
            ok: false,
            error: ErrorBody {
                kind: err.kind(),
                message: err.public_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope { ok: true, data }))
}

/// Run synchronous core work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, IndexError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| IndexError::Internal(format!("worker task failed: {}", err)))?
        .map_err(ApiError)
}

fn credential(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    bearer.or_else(|| {
        headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError(IndexError::InvalidInput(rejection.body_text()))
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    ApiError(IndexError::InvalidInput(rejection.body_text()))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
}

fn page_limit(query: Result<Query<PageQuery>, QueryRejection>) -> Result<Option<usize>, ApiError> {
    let Query(query) = query.map_err(bad_query)?;
    Ok(query.limit)
}

// =============================================================================
// Writes
// =============================================================================

/// Score plus the outcome of the commit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Submitted {
    #[serde(flatten)]
    score: ScoreRecord,
    replayed: bool,
    player: PlayerRecord,
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Registration>, JsonRejection>,
) -> ApiResult<PlayerRecord> {
    state.authorize(&headers)?;
    let Json(input) = body.map_err(bad_body)?;
    let gateway = state.gateway.clone();
    ok(blocking(move || gateway.register_player(&input)).await?)
}

async fn submit_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ScoreSubmission>, JsonRejection>,
) -> ApiResult<Submitted> {
    state.authorize(&headers)?;
    let Json(input) = body.map_err(bad_body)?;
    let gateway = state.gateway.clone();
    let recorded = blocking(move || gateway.submit_score(&input)).await?;
    ok(Submitted {
        score: recorded.score,
        replayed: recorded.replayed,
        player: recorded.player,
    })
}

#[derive(Debug, Serialize)]
struct Removed {
    removed: String,
}

async fn remove_player(
    State(state): State<AppState>,
    Path(identity): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Removed> {
    state.authorize(&headers)?;
    let gateway = state.gateway.clone();
    let removed = blocking(move || {
        let key = IdentityKey::parse(&identity)?;
        gateway.remove_player(key.as_str())?;
        Ok(key.to_string())
    })
    .await?;
    ok(Removed { removed })
}

// =============================================================================
// Reads
// =============================================================================

async fn leaderboard(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let limit = state
        .config
        .page(page_limit(query)?, state.config.default_leaderboard_limit);
    let engine = state.engine.clone();
    ok(blocking(move || engine.global_leaderboard(limit)).await?)
}

async fn player_rank(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<Option<u64>> {
    let engine = state.engine.clone();
    let rank = blocking(move || {
        let key = IdentityKey::parse(&identity)?;
        match engine.player_rank(&key) {
            Ok(rank) => Ok(Some(rank)),
            Err(IndexError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    })
    .await?;
    ok(rank)
}

async fn players(State(state): State<AppState>) -> ApiResult<Vec<PlayerRecord>> {
    let engine = state.engine.clone();
    ok(blocking(move || engine.directory().list_all()).await?)
}

async fn player(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> ApiResult<PlayerRecord> {
    let engine = state.engine.clone();
    ok(blocking(move || {
        let key = IdentityKey::parse(&identity)?;
        engine.directory().get_player(&key)
    })
    .await?)
}

async fn recent_scores(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<ScoreRecord>> {
    let limit = state
        .config
        .page(page_limit(query)?, state.config.default_scores_limit);
    let engine = state.engine.clone();
    ok(blocking(move || engine.mirror().recent_scores(limit)).await?)
}

async fn game_scores(
    State(state): State<AppState>,
    Path(game_type): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<ScoreRecord>> {
    let game_type: GameType = game_type.parse()?;
    let limit = state
        .config
        .page(page_limit(query)?, state.config.default_scores_limit);
    let engine = state.engine.clone();
    ok(blocking(move || engine.mirror().scores_for_game(game_type, limit)).await?)
}

async fn high_scores(
    State(state): State<AppState>,
    Path(game_type): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Vec<HighScoreEntry>> {
    let game_type: GameType = game_type.parse()?;
    let limit = state
        .config
        .page(page_limit(query)?, state.config.default_scores_limit);
    let engine = state.engine.clone();
    ok(blocking(move || engine.game_high_scores(game_type, limit)).await?)
}

async fn stats(State(state): State<AppState>) -> ApiResult<GlobalStats> {
    let engine = state.engine.clone();
    ok(blocking(move || engine.global_stats()).await?)
}

async fn games() -> ApiResult<Vec<GameInfo>> {
    ok(catalogue())
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    backend: &'static str,
}

async fn health(State(state): State<AppState>) -> ApiResult<Health> {
    ok(Health {
        status: "ok",
        backend: state.engine_backend(),
    })
}
