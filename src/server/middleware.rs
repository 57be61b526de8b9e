//! The request pipeline, outermost first: CORS, per-client rate limiting,
//! bearer-token authentication, then the per-route authorization gates.
//! Each stage either rejects with an `AppError` or hands the request on.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::{debug, warn};

use super::telemetry::endpoint_label;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{
    authorizer, validate_token_plaintext, CredentialStore, Fingerprint, PermissionStore, Principal, RequestContext, TokenScope,
};
use crate::storage::StoreError;
use crate::validator::Validator;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn enable_cors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()).map(str::to_string);
    let preflight = req.method() == Method::OPTIONS && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
    let trusted = origin.filter(|o| state.config.trusted_origins.iter().any(|t| t == o));

    let mut response = match (&trusted, preflight) {
        (Some(_), true) => StatusCode::OK.into_response(),
        _ => next.run(req).await,
    };
    let headers = response.headers_mut();
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    headers.append(header::VARY, HeaderValue::from_static("Access-Control-Request-Method"));
    if let Some(origin) = trusted.and_then(|o| HeaderValue::from_str(&o).ok()) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if preflight {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("OPTIONS, PUT, PATCH, DELETE"));
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Authorization, Content-Type"));
        }
    }
    response
}

/// Admission control. A request without a peer address is an internal error,
/// never silently admitted.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.limiter.config().enabled {
        return next.run(req).await;
    }
    let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied() else {
        return AppError::server_error("peer address missing from request").into_response();
    };
    if !state.limiter.admit(peer.ip()) {
        debug!(target: "ratelimit", client = %peer.ip(), "rate limit exceeded");
        state.metrics.rate_limit_hit(&endpoint_label(&req));
        return AppError::rate_limit_exceeded().into_response();
    }
    next.run(req).await
}

/// Resolve the `Authorization` header to a principal. No header, or an empty
/// one, means anonymous; anything malformed fails before the credential store
/// is consulted.
pub fn resolve_principal(credentials: &dyn CredentialStore, headers: &HeaderMap) -> AppResult<Principal> {
    let Some(raw) = headers.get(header::AUTHORIZATION).filter(|v| !v.is_empty()) else {
        return Ok(Principal::Anonymous);
    };
    let value = raw.to_str().map_err(|_| AppError::invalid_authentication_token())?;
    let parts: Vec<&str> = value.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(AppError::invalid_authentication_token());
    }
    let plaintext = parts[1];
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, plaintext);
    if !v.valid() {
        return Err(AppError::invalid_authentication_token());
    }
    match credentials.resolve(TokenScope::Authentication, &Fingerprint::of(plaintext), Utc::now()) {
        Ok(user) => Ok(Principal::User(user)),
        Err(StoreError::RecordNotFound) => Err(AppError::invalid_authentication_token()),
        Err(e) => Err(AppError::server_error(e)),
    }
}

fn vary_authorization(response: &mut Response) {
    response.headers_mut().append(header::VARY, HeaderValue::from_static("Authorization"));
}

pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let principal = match resolve_principal(state.credentials.as_ref(), req.headers()) {
        Ok(p) => p,
        Err(e) => {
            if e.http_status() == 401 {
                debug!(target: "auth", "rejected bearer credential");
            }
            let mut response = e.into_response();
            vary_authorization(&mut response);
            return response;
        }
    };
    let ctx = RequestContext::new(principal);
    let request_id = HeaderValue::from_str(&ctx.request_id).ok();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    vary_authorization(&mut response);
    if let Some(id) = request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    response
}

pub async fn require_authenticated_user(req: Request, next: Next) -> Response {
    let verdict = authorizer::require_authenticated(&RequestContext::from_extensions(req.extensions()).principal).map(|_| ());
    match verdict {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

pub async fn require_activated_user(req: Request, next: Next) -> Response {
    let verdict = authorizer::require_activated(&RequestContext::from_extensions(req.extensions()).principal).map(|_| ());
    match verdict {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// State for the permission gate: which store to ask and which code to demand.
#[derive(Clone)]
pub struct PermissionGate {
    pub permissions: Arc<dyn PermissionStore>,
    pub code: &'static str,
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn PermissionStore>, code: &'static str) -> Self { Self { permissions, code } }
}

pub async fn require_permission(State(gate): State<PermissionGate>, req: Request, next: Next) -> Response {
    let verdict = authorizer::require_permission(gate.permissions.as_ref(), &RequestContext::from_extensions(req.extensions()).principal, gate.code);
    match verdict {
        Ok(()) => next.run(req).await,
        Err(e) => {
            if e.http_status() == 500 {
                warn!(target: "auth", code = gate.code, "permission lookup failed");
            }
            e.into_response()
        }
    }
}
