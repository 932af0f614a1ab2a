pub mod auth;
mod config;

use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, patch, post},
};
use choreboard_shared::api;
use choreboard_shared::auth::Role;
pub use config::{AppConfig, ConfigError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

use crate::domain::chores::{ChoreDetail, ChoreWithAssignees};
use crate::domain::error::DomainError;
use crate::domain::rewards::RedemptionDetail;
use crate::domain::users::UserPatch;
use crate::server::auth::AuthCtx;
use crate::storage::models::{LedgerEntry, Reward, User};
use crate::storage::{StorageError, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self {
            config,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/v1/auth/logout", post(api_auth_logout))
        .route("/api/v1/me", get(api_me))
        .route("/api/v1/me/password", post(api_change_password))
        .route("/api/v1/users", get(api_list_users).post(api_create_user))
        .route("/api/v1/users/{id}", patch(api_patch_user))
        .route("/api/v1/users/{id}/password", post(api_reset_password))
        .route("/api/v1/chores", get(api_list_chores).post(api_create_chore))
        .route("/api/v1/chores/{id}", get(api_get_chore))
        .route("/api/v1/chores/{id}/done", post(api_chore_done))
        .route("/api/v1/chores/{id}/approve", post(api_chore_approve))
        .route("/api/v1/chores/{id}/reject", post(api_chore_reject))
        .route("/api/v1/approvals", get(api_approvals))
        .route(
            "/api/v1/rewards",
            get(api_list_rewards).post(api_create_reward),
        )
        .route("/api/v1/rewards/{id}/redeem", post(api_redeem_reward))
        .route("/api/v1/redemptions", get(api_list_redemptions))
        .route(
            "/api/v1/redemptions/{id}/approve",
            post(api_redemption_approve),
        )
        .route("/api/v1/redemptions/{id}/deny", post(api_redemption_deny))
        .route("/api/v1/ledger", get(api_ledger))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(middleware::from_fn(set_auth_span_fields));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.user.username));
        span.record("role", tracing::field::debug(auth.actor.role));
    }
    Ok(next.run(req).await)
}

// Auth

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state.store.authenticate(&body.username, &body.password).await?;
    let token = auth::issue_jwt_for_user(&state, &user).await?;
    Ok(Json(api::AuthResp {
        token,
        user: user_dto(user)?,
    }))
}

async fn api_auth_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<StatusCode, AppError> {
    state.store.delete_session(&auth.claims.jti).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_me(Extension(auth): Extension<AuthCtx>) -> Result<Json<api::UserDto>, AppError> {
    Ok(Json(user_dto(auth.user)?))
}

async fn api_change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::ChangePasswordReq>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .change_password(auth.actor.id, &body.old_password, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Users

async fn api_list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::UserDto>>, AppError> {
    let rows = state.store.list_users(auth.actor).await?;
    let items = rows.into_iter().map(user_dto).collect::<Result<_, _>>()?;
    Ok(Json(items))
}

async fn api_create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateUserReq>,
) -> Result<(StatusCode, Json<api::UserDto>), AppError> {
    let user = state.store.create_user(auth.actor, body).await?;
    Ok((StatusCode::CREATED, Json(user_dto(user)?)))
}

async fn api_patch_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::PatchUserReq>,
) -> Result<Json<api::UserDto>, AppError> {
    let patch = UserPatch {
        display_name: body.display_name,
        role: body.role,
        avatar: body.avatar,
        is_active: body.is_active,
        must_change_password: body.must_change_password,
    };
    let user = state.store.patch_user(auth.actor, id, patch).await?;
    Ok(Json(user_dto(user)?))
}

async fn api_reset_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::ResetPasswordReq>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .reset_password(auth.actor, id, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Chores

#[derive(Debug, Deserialize)]
struct ChoresQuery {
    status: Option<String>,
}

async fn api_list_chores(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(q): Query<ChoresQuery>,
) -> Result<Json<Vec<api::ChoreDto>>, AppError> {
    let rows = state.store.list_chores(auth.actor, q.status).await?;
    let items = rows.into_iter().map(chore_dto).collect::<Result<_, _>>()?;
    Ok(Json(items))
}

async fn api_create_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateChoreReq>,
) -> Result<(StatusCode, Json<api::ChoreDetailDto>), AppError> {
    let detail = state.store.create_chore(auth.actor, body).await?;
    Ok((StatusCode::CREATED, Json(chore_detail_dto(detail)?)))
}

async fn api_get_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::ChoreDetailDto>, AppError> {
    let detail = state.store.get_chore(auth.actor, id).await?;
    Ok(Json(chore_detail_dto(detail)?))
}

async fn api_chore_done(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::ChoreDetailDto>, AppError> {
    let detail = state.store.mark_chore_done(auth.actor, id).await?;
    Ok(Json(chore_detail_dto(detail)?))
}

async fn api_chore_approve(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::NoteReq>,
) -> Result<Json<api::ChoreDetailDto>, AppError> {
    let detail = state.store.approve_chore(auth.actor, id, body.note).await?;
    Ok(Json(chore_detail_dto(detail)?))
}

async fn api_chore_reject(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::NoteReq>,
) -> Result<Json<api::ChoreDetailDto>, AppError> {
    let detail = state.store.reject_chore(auth.actor, id, body.note).await?;
    Ok(Json(chore_detail_dto(detail)?))
}

async fn api_approvals(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ChoreDto>>, AppError> {
    let rows = state.store.approvals_queue(auth.actor).await?;
    let items = rows.into_iter().map(chore_dto).collect::<Result<_, _>>()?;
    Ok(Json(items))
}

// Rewards & redemptions

async fn api_list_rewards(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let rows = state.store.list_rewards(auth.actor).await?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

async fn api_create_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateRewardReq>,
) -> Result<(StatusCode, Json<api::RewardDto>), AppError> {
    let reward = state.store.create_reward(auth.actor, body).await?;
    Ok((StatusCode::CREATED, Json(reward_dto(reward))))
}

async fn api_redeem_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::NoteReq>,
) -> Result<(StatusCode, Json<api::RedemptionDto>), AppError> {
    let detail = state
        .store
        .request_redemption(auth.actor, id, body.note)
        .await?;
    Ok((StatusCode::CREATED, Json(redemption_dto(detail)?)))
}

async fn api_list_redemptions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::RedemptionDto>>, AppError> {
    let rows = state.store.list_redemptions(auth.actor).await?;
    let items = rows
        .into_iter()
        .map(redemption_dto)
        .collect::<Result<_, _>>()?;
    Ok(Json(items))
}

async fn api_redemption_approve(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::NoteReq>,
) -> Result<Json<api::RedemptionDto>, AppError> {
    let detail = state
        .store
        .approve_redemption(auth.actor, id, body.note)
        .await?;
    Ok(Json(redemption_dto(detail)?))
}

async fn api_redemption_deny(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::NoteReq>,
) -> Result<Json<api::RedemptionDto>, AppError> {
    let detail = state
        .store
        .deny_redemption(auth.actor, id, body.note)
        .await?;
    Ok(Json(redemption_dto(detail)?))
}

// Ledger

#[derive(Debug, Deserialize)]
struct LedgerQuery {
    user_id: Option<i32>,
}

async fn api_ledger(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(q): Query<LedgerQuery>,
) -> Result<Json<api::LedgerResp>, AppError> {
    let target = match (auth.actor.role, q.user_id) {
        (Role::Child, None) => auth.actor.id,
        (Role::Child, Some(id)) if id == auth.actor.id => id,
        (Role::Child, Some(_)) => return Err(AppError::forbidden()),
        (_, Some(id)) => id,
        (_, None) => return Err(AppError::bad_request("user_id is required")),
    };
    if auth.actor.role != Role::Child {
        let user = state.store.get_user(target).await?;
        if user.role != Role::Child.as_str() {
            return Err(AppError::bad_request("user_id must reference a CHILD user"));
        }
    }
    let (total, entries) = state.store.ledger_of(target).await?;
    Ok(Json(api::LedgerResp {
        user_id: target,
        total,
        entries: entries
            .into_iter()
            .map(ledger_entry_dto)
            .collect::<Result<_, _>>()?,
    }))
}

// DTO mapping. Status/role columns hold validated text; a parse failure
// here means the database was edited out-of-band, so it surfaces as 500.

fn rfc3339(ts: chrono::NaiveDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(ts, chrono::Utc).to_rfc3339()
}

fn user_dto(u: User) -> Result<api::UserDto, AppError> {
    Ok(api::UserDto {
        id: u.id,
        username: u.username,
        display_name: u.display_name,
        role: u.role.parse().map_err(AppError::internal)?,
        avatar: u.avatar,
        is_active: u.is_active,
        must_change_password: u.must_change_password,
        created_at: rfc3339(u.created_at),
    })
}

fn chore_dto(row: ChoreWithAssignees) -> Result<api::ChoreDto, AppError> {
    let c = row.chore;
    Ok(api::ChoreDto {
        id: c.id,
        title: c.title,
        description: c.description,
        points: c.points,
        recurrence: c.recurrence.parse().map_err(AppError::internal)?,
        due_date: c.due_date,
        status: c.status.parse().map_err(AppError::internal)?,
        created_by: c.created_by,
        created_at: rfc3339(c.created_at),
        assignee_ids: row.assignee_ids,
    })
}

fn chore_detail_dto(d: ChoreDetail) -> Result<api::ChoreDetailDto, AppError> {
    let assignee_ids = d.assignees.iter().map(|u| u.id).collect();
    let assignees = d
        .assignees
        .into_iter()
        .map(|u| api::AssigneeDto {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            avatar: u.avatar,
        })
        .collect();
    let events = d
        .events
        .into_iter()
        .map(|(e, actor_name)| {
            Ok(api::ChoreEventDto {
                id: e.id,
                from_status: e
                    .from_status
                    .map(|s| s.parse().map_err(AppError::internal))
                    .transpose()?,
                to_status: e.to_status.parse().map_err(AppError::internal)?,
                actor_id: e.actor_id,
                actor_name,
                note: e.note,
                created_at: rfc3339(e.created_at),
            })
        })
        .collect::<Result<_, AppError>>()?;
    Ok(api::ChoreDetailDto {
        chore: chore_dto(ChoreWithAssignees {
            chore: d.chore,
            assignee_ids,
        })?,
        assignees,
        events,
    })
}

fn reward_dto(r: Reward) -> api::RewardDto {
    api::RewardDto {
        id: r.id,
        name: r.name,
        cost: r.cost,
        is_active: r.is_active,
        limit_per_week: r.limit_per_week,
        created_by: r.created_by,
        created_at: rfc3339(r.created_at),
    }
}

fn redemption_dto(d: RedemptionDetail) -> Result<api::RedemptionDto, AppError> {
    let r = d.redemption;
    Ok(api::RedemptionDto {
        id: r.id,
        reward_id: r.reward_id,
        reward_name: d.reward_name,
        reward_cost: d.reward_cost,
        user_id: r.user_id,
        user_name: d.user_name,
        status: r.status.parse().map_err(AppError::internal)?,
        note: r.note,
        handled_by: r.handled_by,
        created_at: rfc3339(r.created_at),
        updated_at: rfc3339(r.updated_at),
    })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn ledger_entry_dto(e: LedgerEntry) -> Result<api::LedgerEntryDto, AppError> {
    Ok(api::LedgerEntryDto {
        id: e.id,
        user_id: e.user_id,
        delta: e.delta,
        reason: e.reason,
        ref_type: e.ref_type.parse().map_err(AppError::internal)?,
        ref_id: e.ref_id,
        created_at: rfc3339(e.created_at),
    })
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Domain(d) => match d {
                DomainError::Validation(m) | DomainError::InvalidState(m) => Self::BadRequest(m),
                DomainError::InsufficientFunds | DomainError::LimitExceeded => {
                    Self::BadRequest(d.to_string())
                }
                DomainError::Unauthorized => Self::Unauthorized,
                DomainError::Forbidden => Self::Forbidden,
                DomainError::NotFound(m) => Self::NotFound(m),
                DomainError::Conflict(m) => Self::Conflict(m),
                DomainError::Inconsistency(_) | DomainError::Database(_) | DomainError::Hash(_) => {
                    Self::Internal(d.to_string())
                }
            },
            StorageError::Pool(_) | StorageError::Task(_) | StorageError::Migration(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}
