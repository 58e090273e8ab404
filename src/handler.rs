//! HTTP request handlers
//!
//! This module implements the request/response glue for:
//! - Creating short links with requested or pool-drawn codes
//! - Following a short code to its destination
//! - Listing, editing, and deleting links with ownership checks
//! - Login (password + one-time code), logout, and account creation

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::json;

use crate::auth;
use crate::database::AppState;
use crate::error::ServiceError;
use crate::middleware::Identity;
use crate::model::{
    CreateAccountRequest, CreateAccountResponse, CreateLinkRequest, CreateLinkResponse,
    ListParams, LoginRequest, LoginResponse, RequestMetadata, UpdateLinkRequest,
};
use crate::resolver::Outcome;

/// Creates a new short link
///
/// # Request Body
///
/// ```json
/// {
///   "link": "https://example.com/long",
///   "requested_code": "promo",     // optional
///   "max_visits": 10,              // optional
///   "expires_at": "2027-01-01T00:00:00Z"  // optional
/// }
/// ```
///
/// # Response
///
/// - **201 Created** - link created, body carries the short URL
/// - **400 Bad Request** - missing destination, zero quota, past expiry
/// - **401 Unauthorized** - login required but no session presented
/// - **409 Conflict** - requested code malformed or already taken
/// - **503 Service Unavailable** - code pool exhausted
pub async fn create_link(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<Response, ServiceError> {
    if state.config.require_login && identity.0.is_none() {
        return Err(ServiceError::Unauthorized);
    }
    let creator = identity.subject_or_anonymous();

    let destination = payload
        .link
        .as_deref()
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing destination link".to_string()))?;

    if payload.max_visits == Some(0) {
        return Err(ServiceError::BadRequest(
            "max_visits must be at least 1".to_string(),
        ));
    }
    if let Some(expires_at) = payload.expires_at {
        if expires_at <= Utc::now() {
            return Err(ServiceError::BadRequest(
                "expires_at must be a timestamp in the future".to_string(),
            ));
        }
    }

    let requested = payload
        .requested_code
        .as_deref()
        .filter(|code| !code.is_empty());

    let record = loop {
        let code = state.allocator.allocate(requested)?;
        match state.store.reserve(
            &code,
            destination,
            creator,
            payload.max_visits,
            payload.expires_at,
        ) {
            Ok(record) => break record,
            // Lost a race on a pool-drawn code; draw the next one.
            Err(ServiceError::CodeTaken) if requested.is_none() => continue,
            Err(err) => return Err(err),
        }
    };

    let response = CreateLinkResponse {
        short_url: format!("{}/{}", state.config.public_url, record.code),
        code: record.code,
        link: record.destination,
        created_at: record.created_at,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Follows a short code to its destination
///
/// # Response
///
/// - **302 Found** - `Location` carries the destination URL
/// - **410 Gone** - the link existed but its visit quota or expiry was
///   exceeded; it has now been deleted
/// - **404 Not Found** - no such code (never created, or evicted)
pub async fn follow_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let metadata = request_metadata(&headers);

    match state.resolver.resolve(&code, &metadata)? {
        Outcome::Redirect(destination) => {
            Ok((StatusCode::FOUND, [(header::LOCATION, destination)]).into_response())
        }
        Outcome::Gone => Ok(StatusCode::GONE.into_response()),
        Outcome::NotFound => Ok((StatusCode::NOT_FOUND, "short link not found").into_response()),
    }
}

/// Lists links, newest first
///
/// Administrators see every link; everyone else sees only their own.
///
/// # Query Parameters
///
/// - `page` - zero-indexed page number (default: 0)
/// - `limit` - items per page (default: 10, maximum: 100)
pub async fn list_links(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let subject = identity.0.ok_or(ServiceError::Unauthorized)?;

    let page = params.page.unwrap_or(0);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);

    let (records, total) = if state.users.is_admin(&subject)? {
        (
            state.store.list_all(page, limit)?,
            state.store.count_all()?,
        )
    } else {
        (
            state.store.list_for_owner(&subject, page, limit)?,
            state.store.count_for_owner(&subject)?,
        )
    };

    Ok(Json(json!({
        "page": page,
        "limit": limit,
        "total": total,
        "data": records
    }))
    .into_response())
}

/// Changes the destination of an existing link
///
/// Only the creator or an administrator may edit a link.
pub async fn update_link(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
    Json(payload): Json<UpdateLinkRequest>,
) -> Result<Response, ServiceError> {
    let subject = identity.0.ok_or(ServiceError::Unauthorized)?;

    let destination = payload
        .link
        .as_deref()
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing new destination link".to_string()))?;

    let record = state.store.get(&code)?.ok_or(ServiceError::NotFound)?;
    if record.creator != subject && !state.users.is_admin(&subject)? {
        return Err(ServiceError::Forbidden);
    }

    let updated = state.store.update_destination(&code, destination)?;
    Ok(Json(updated).into_response())
}

/// Deletes a link
///
/// Only the creator or an administrator may delete a link.
pub async fn delete_link(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(code): Path<String>,
) -> Result<Response, ServiceError> {
    let subject = identity.0.ok_or(ServiceError::Unauthorized)?;

    let record = state.store.get(&code)?.ok_or(ServiceError::NotFound)?;
    if record.creator != subject && !state.users.is_admin(&subject)? {
        return Err(ServiceError::Forbidden);
    }

    state.store.delete(&code)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "short link deleted",
            "deleted_code": code
        })),
    )
        .into_response())
}

/// Logs an operator in
///
/// Verifies password and one-time code, then issues a session token
/// returned both in the body and as an HttpOnly cookie.
///
/// # Response
///
/// - **200 OK** - `{token, expires_in}` plus `Set-Cookie: token=…`
/// - **400 Bad Request** - missing username, password, or otp
/// - **401 Unauthorized** - any credential wrong (which one is not
///   disclosed)
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ServiceError> {
    if payload.username.is_empty() || payload.password.is_empty() || payload.otp.is_empty() {
        return Err(ServiceError::BadRequest(
            "missing username, password, or otp".to_string(),
        ));
    }

    let Some(user) =
        auth::verify_login(&state.users, &payload.username, &payload.password, &payload.otp)?
    else {
        return Err(ServiceError::Unauthorized);
    };

    let lifetime = state.config.session_lifetime;
    let token = state.sessions.issue(&user.name, lifetime);
    let cookie = format!(
        "token={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        token, lifetime
    );

    tracing::info!(account = %user.name, "login succeeded");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            expires_in: lifetime,
        }),
    )
        .into_response())
}

/// Logs the current operator out by revoking every session token for
/// the subject, and clears the cookie.
pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, ServiceError> {
    let subject = identity.0.ok_or(ServiceError::Unauthorized)?;
    state.sessions.revoke_all(&subject);

    let cookie = "token=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0";
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({"message": "logged out"})),
    )
        .into_response())
}

/// Creates an operator account (administrators only)
///
/// # Response
///
/// - **201 Created** - body carries the otpauth enrollment URI, shown
///   exactly once
/// - **403 Forbidden** - requester is not an administrator
/// - **409 Conflict** - account name already exists
pub async fn create_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<Response, ServiceError> {
    let subject = identity.0.ok_or(ServiceError::Unauthorized)?;
    if !state.users.is_admin(&subject)? {
        return Err(ServiceError::Forbidden);
    }

    let otpauth_uri = auth::create_user(
        &state.users,
        &payload.username,
        &payload.password,
        payload.admin,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            username: payload.username,
            otpauth_uri,
        }),
    )
        .into_response())
}

/// Pulls the analytics-relevant attributes out of the request headers.
/// Proxy and Cloudflare headers are trusted as-is; the service is meant
/// to sit behind one.
fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    RequestMetadata {
        ip: get("x-forwarded-for").or_else(|| get("x-real-ip")),
        user_agent: get("user-agent"),
        referer: get("referer"),
        geo_country: get("cf-ipcountry"),
        geo_city: get("cf-ipcity"),
    }
}
