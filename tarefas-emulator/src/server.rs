//! HTTP surface of the emulator.
//!
//! Data requests follow the hosted store's REST conventions: every path
//! ends in `.json`, `GET`/`PUT`/`POST`/`PATCH`/`DELETE` map to read,
//! replace, push, merge and delete, and a `GET` with
//! `Accept: text/event-stream` opens a live stream. Nodes under
//! `users/{uid}` are only reachable with an `auth` token issued to that
//! uid. The password endpoints live under
//! `/identitytoolkit.googleapis.com/v1/` and token refresh under
//! `/securetoken.googleapis.com/v1/token`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::{Value, json};
use tarefas_proto::path::{DataPath, USERS_NODE};
use tarefas_proto::session::Uid;
use tarefas_proto::stream::{PathData, StreamEvent};
use tarefas_proto::task::PushReply;
use tarefas_proto::tree;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::accounts::{AccountRegistry, DEFAULT_TOKEN_TTL, PasswordRequest, RefreshRequest};
use crate::database::{Change, ChangeKind, Database};

/// Default interval between keep-alive events.
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Shared emulator state.
pub struct EmulatorState {
    /// The document tree.
    pub database: Database,
    /// Registered accounts.
    pub accounts: AccountRegistry,
    keep_alive: Duration,
}

impl Default for EmulatorState {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorState {
    /// Empty database and account registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_keep_alive(DEFAULT_KEEP_ALIVE)
    }

    /// Empty state with a custom keep-alive interval for live streams.
    #[must_use]
    pub fn with_keep_alive(keep_alive: Duration) -> Self {
        Self::with_limits(keep_alive, DEFAULT_TOKEN_TTL)
    }

    /// Empty state whose id tokens expire after `token_ttl`. Live streams
    /// opened with such a token end with `auth_revoked` when it lapses.
    #[must_use]
    pub fn with_token_ttl(token_ttl: Duration) -> Self {
        Self::with_limits(DEFAULT_KEEP_ALIVE, token_ttl)
    }

    /// Empty state with both stream keep-alive and token lifetime set.
    #[must_use]
    pub fn with_limits(keep_alive: Duration, token_ttl: Duration) -> Self {
        Self {
            database: Database::new(),
            accounts: AccountRegistry::with_token_ttl(token_ttl),
            keep_alive,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DataQuery {
    auth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// Data request failures, rendered as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Not found")]
    NotFound,
    #[error("{0}")]
    InvalidData(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::PermissionDenied => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidData(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Whether `uid` may read and write `path`.
fn may_access(path: &DataPath, uid: Option<&Uid>) -> bool {
    match path.segments() {
        [] => false,
        [users] if users == USERS_NODE => false,
        [users, owner, ..] if users == USERS_NODE => uid.is_some_and(|u| u.as_str() == owner),
        _ => true,
    }
}

/// Logs the request, then resolves its path and checks access.
async fn authorize(
    state: &EmulatorState,
    method: &str,
    raw: &str,
    query: &DataQuery,
) -> Result<DataPath, ApiError> {
    let Some(trimmed) = raw.strip_suffix(".json") else {
        return Err(ApiError::NotFound);
    };
    let path = DataPath::parse(trimmed);
    let uid = match query.auth.as_deref() {
        Some(token) => state.accounts.uid_for_token(token).await,
        None => None,
    };
    state.database.record(method, &path, uid.clone());

    if !may_access(&path, uid.as_ref()) {
        tracing::debug!(%method, path = %path, "permission denied");
        return Err(ApiError::PermissionDenied);
    }
    tracing::debug!(%method, path = %path, "data request");
    Ok(path)
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        ApiError::InvalidData(format!(
            "Invalid data; couldn't parse JSON object, array, or value. {e}"
        ))
    })
}

async fn read(
    State(state): State<Arc<EmulatorState>>,
    Path(raw): Path<String>,
    Query(query): Query<DataQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let path = authorize(&state, "GET", &raw, &query).await?;

    let streaming = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));
    if !streaming {
        return Ok(Json(state.database.get(&path).await).into_response());
    }

    let deadline = match query.auth.as_deref() {
        Some(token) if path.owner().is_some() => state.accounts.token_expiry(token).await,
        _ => None,
    };
    let (initial, changes) = state.database.watch(&path).await;
    tracing::info!(path = %path, "live stream opened");
    let keep_alive = KeepAlive::new()
        .interval(state.keep_alive)
        .event(to_sse(&StreamEvent::KeepAlive));
    let events = event_stream(Arc::clone(&state), path, initial, changes, deadline);
    Ok(Sse::new(events).keep_alive(keep_alive).into_response())
}

async fn write(
    State(state): State<Arc<EmulatorState>>,
    Path(raw): Path<String>,
    Query(query): Query<DataQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let path = authorize(&state, "PUT", &raw, &query).await?;
    let value = parse_body(&body)?;
    state.database.put(&path, value.clone()).await;
    Ok(Json(value))
}

async fn push(
    State(state): State<Arc<EmulatorState>>,
    Path(raw): Path<String>,
    Query(query): Query<DataQuery>,
    body: Bytes,
) -> Result<Json<PushReply>, ApiError> {
    let path = authorize(&state, "POST", &raw, &query).await?;
    let value = parse_body(&body)?;
    let name = state.database.push(&path, value).await;
    tracing::debug!(path = %path, key = %name, "child pushed");
    Ok(Json(PushReply { name }))
}

async fn update(
    State(state): State<Arc<EmulatorState>>,
    Path(raw): Path<String>,
    Query(query): Query<DataQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let path = authorize(&state, "PATCH", &raw, &query).await?;
    let Value::Object(children) = parse_body(&body)? else {
        return Err(ApiError::InvalidData(
            "Invalid data; PATCH requires a JSON object".to_string(),
        ));
    };
    state.database.patch(&path, children.clone()).await;
    Ok(Json(Value::Object(children)))
}

async fn remove(
    State(state): State<Arc<EmulatorState>>,
    Path(raw): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Json<Value>, ApiError> {
    let path = authorize(&state, "DELETE", &raw, &query).await?;
    state.database.delete(&path).await;
    Ok(Json(Value::Null))
}

async fn identity(
    State(state): State<Arc<EmulatorState>>,
    Path(action): Path<String>,
    Query(query): Query<KeyQuery>,
    body: Bytes,
) -> Response {
    if query.key.as_deref().is_none_or(str::is_empty) {
        return identity_error("API key not valid. Please pass a valid API key.");
    }
    let request: PasswordRequest = serde_json::from_slice(&body).unwrap_or_default();
    let result = match action.as_str() {
        "accounts:signUp" => state.accounts.sign_up(&request).await,
        "accounts:signInWithPassword" => state.accounts.sign_in(&request).await,
        _ => return ApiError::NotFound.into_response(),
    };
    match result {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            tracing::debug!(%action, error = %e, "identity request rejected");
            identity_error(&e.to_string())
        }
    }
}

async fn token(
    State(state): State<Arc<EmulatorState>>,
    Query(query): Query<KeyQuery>,
    body: Bytes,
) -> Response {
    if query.key.as_deref().is_none_or(str::is_empty) {
        return identity_error("API key not valid. Please pass a valid API key.");
    }
    let request: RefreshRequest = serde_json::from_slice(&body).unwrap_or_default();
    match state.accounts.refresh(&request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "token refresh rejected");
            identity_error(&e.to_string())
        }
    }
}

fn identity_error(message: &str) -> Response {
    let body = json!({
        "error": {
            "code": 400,
            "message": message,
            "errors": [{ "message": message, "domain": "global", "reason": "invalid" }],
        }
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default().event(event.name()).data(event.data_json())
}

/// Initial full `put`, then one event per change that touches `watched`.
///
/// With a `deadline` (the expiry of the token that opened the stream) the
/// stream ends with `auth_revoked` once the token lapses.
fn event_stream(
    state: Arc<EmulatorState>,
    watched: DataPath,
    initial: Value,
    changes: broadcast::Receiver<Change>,
    deadline: Option<Instant>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let first = to_sse(&StreamEvent::Put(PathData::new(&DataPath::root(), initial)));
    let rest = stream::unfold(
        (state, watched, changes, deadline, false),
        |(state, watched, mut changes, deadline, revoked)| async move {
            if revoked {
                return None;
            }
            loop {
                let received = match deadline {
                    Some(at) => tokio::select! {
                        received = changes.recv() => Some(received),
                        () = tokio::time::sleep_until(at) => None,
                    },
                    None => Some(changes.recv().await),
                };
                let Some(received) = received else {
                    tracing::info!(path = %watched, "token expired, revoking stream");
                    let event = to_sse(&StreamEvent::AuthRevoked);
                    return Some((
                        Ok::<_, Infallible>(event),
                        (state, watched, changes, deadline, true),
                    ));
                };
                let event = match received {
                    Ok(change) => relative_event(&watched, &change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, path = %watched, "stream lagged, resending node");
                        let value = state.database.get(&watched).await;
                        Some(StreamEvent::Put(PathData::new(&DataPath::root(), value)))
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                };
                if let Some(event) = event {
                    return Some((
                        Ok::<_, Infallible>(to_sse(&event)),
                        (state, watched, changes, deadline, false),
                    ));
                }
            }
        },
    );
    stream::once(async move { Ok::<_, Infallible>(first) }).chain(rest)
}

/// Translates an absolute change into an event relative to `watched`.
///
/// Changes at or below `watched` keep their kind. A change above it is
/// sent as a full `put` of the watched node, or dropped when a `patch`
/// leaves that branch untouched.
fn relative_event(watched: &DataPath, change: &Change) -> Option<StreamEvent> {
    if let Some(rel) = change.path.strip_prefix(watched) {
        let payload = PathData::new(&rel, change.data.clone());
        return Some(match change.kind {
            ChangeKind::Put => StreamEvent::Put(payload),
            ChangeKind::Patch => StreamEvent::Patch(payload),
        });
    }

    let below = watched.strip_prefix(&change.path)?;
    let value = match change.kind {
        ChangeKind::Put => tree::get_at(&change.data, &below).cloned(),
        ChangeKind::Patch => {
            let (first, rest) = below.segments().split_first()?;
            let child = change.data.get(first)?;
            tree::get_at(child, &DataPath::from_segments(rest.iter().cloned())).cloned()
        }
    };
    Some(StreamEvent::Put(PathData::new(
        &DataPath::root(),
        value.unwrap_or(Value::Null),
    )))
}

/// Starts the emulator on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(EmulatorState::new())).await
}

/// Starts the emulator with a pre-built [`EmulatorState`], so callers can
/// inspect the database and request log while it runs.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<EmulatorState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = Router::new()
        .route(
            "/identitytoolkit.googleapis.com/v1/{action}",
            post(identity),
        )
        .route("/securetoken.googleapis.com/v1/token", post(token))
        .route(
            "/{*path}",
            get(read).put(write).post(push).patch(update).delete(remove),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "emulator server error");
        }
    });

    Ok((bound_addr, handle))
}
