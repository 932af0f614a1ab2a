use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use choreboard_shared::jwt::{self, JwtClaims};
use chrono::{Duration, Utc};
use tracing::{error, warn};

use super::{AppError, AppState};
use crate::domain::Actor;
use crate::storage::models::User;

/// How many days of inactivity before a session is considered expired.
const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub user: User,
    pub actor: Actor,
    pub claims: JwtClaims,
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let prefix = "Bearer ";
    if !header_str.starts_with(prefix) {
        return unauthorized();
    }
    let token = &header_str[prefix.len()..];

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    // The idle-window check and last_used_at bump are one atomic UPDATE in
    // the store. A deleted session (logout) fails the same way.
    let cutoff = (Utc::now() - Duration::days(SESSION_IDLE_DAYS)).naive_utc();
    match state.store.touch_session_with_cutoff(&claims.jti, cutoff).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(jti = %claims.jti, username = %claims.sub, "auth: session missing or expired");
            return unauthorized();
        }
        Err(e) => {
            error!(jti = %claims.jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }

    // Role and active flag come from the database, not the token, so
    // demotions and deactivations apply to already-issued tokens.
    let user = match state.store.get_user(claims.uid).await {
        Ok(u) => u,
        Err(e) => {
            warn!(uid = claims.uid, error=%e, "auth: user lookup failed");
            return unauthorized();
        }
    };
    if !user.is_active {
        warn!(username = %user.username, "auth: user deactivated");
        return unauthorized();
    }
    let role = user.role.parse().map_err(|_| {
        error!(username = %user.username, role = %user.role, "auth: bad role in database");
        AppError::internal("bad role")
    })?;

    let auth = AuthCtx {
        actor: Actor { id: user.id, role },
        user,
        claims,
    };
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

pub async fn issue_jwt_for_user(state: &AppState, user: &User) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let role = user.role.parse().map_err(|_| {
        error!(username = %user.username, role = %user.role, "login: bad role in database");
        AppError::internal("bad role")
    })?;
    let claims = JwtClaims {
        sub: user.username.clone(),
        uid: user.id,
        jti: jti.clone(),
        exp,
        role,
    };

    state.store.create_session(&jti, user.id).await.map_err(|e| {
        error!(username = %user.username, error=%e, "login: create_session failed");
        AppError::internal(e)
    })?;
    let token = jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username = %user.username, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })?;
    Ok(token)
}
