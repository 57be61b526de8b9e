//!
//! marquee HTTP server
//! -------------------
//! Axum router for the movies API and the request pipeline wrapped around it.
//!
//! Every request passes, outermost to innermost: request metrics, CORS, the
//! per-client rate limiter, the bearer-token authenticator, and (for catalog
//! routes) the activation and permission gates. Handlers can therefore assume a
//! `RequestContext` is present and never parse credentials themselves.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tracing::info;

use crate::config::Config;
use crate::identity::{CredentialStore, PermissionStore};
use crate::mailer::{LogMailer, Mailer};
use crate::rate_limit::ClientRateLimiter;
use crate::storage::SharedStore;

pub mod background;
pub mod healthcheck;
pub mod helpers;
pub mod middleware;
pub mod movies;
pub mod telemetry;
pub mod tokens;
pub mod users;

use background::BackgroundTasks;
use telemetry::Metrics;
use middleware::PermissionGate;

/// Shared server state injected into all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    /// Token lookups for the authenticator. Defaults to `store`.
    pub credentials: Arc<dyn CredentialStore>,
    /// Permission lookups for the gates. Defaults to `store`.
    pub permissions: Arc<dyn PermissionStore>,
    pub limiter: Arc<ClientRateLimiter>,
    pub mailer: Arc<dyn Mailer>,
    pub background: BackgroundTasks,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, store: SharedStore, mailer: Arc<dyn Mailer>) -> Self {
        let credentials: Arc<dyn CredentialStore> = Arc::new(store.clone());
        let permissions: Arc<dyn PermissionStore> = Arc::new(store.clone());
        Self::with_collaborators(config, store, credentials, permissions, mailer)
    }

    pub fn with_collaborators(
        config: Config,
        store: SharedStore,
        credentials: Arc<dyn CredentialStore>,
        permissions: Arc<dyn PermissionStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let limiter = ClientRateLimiter::new(config.limiter.clone());
        Self {
            config: Arc::new(config),
            store,
            credentials,
            permissions,
            limiter,
            mailer,
            background: BackgroundTasks::new(),
            metrics: Arc::new(Metrics::new()),
        }
    }
}

/// Build the full application router with the pipeline applied.
pub fn routes(state: AppState) -> Router {
    let read = from_fn_with_state(PermissionGate::new(state.permissions.clone(), "movies:read"), middleware::require_permission);
    let write = from_fn_with_state(PermissionGate::new(state.permissions.clone(), "movies:write"), middleware::require_permission);

    let router = Router::new()
        .route("/v1/healthcheck", get(healthcheck::healthcheck))
        .route(
            "/v1/movies",
            get(movies::list_movies).route_layer(read.clone()).merge(post(movies::create_movie).route_layer(write.clone())),
        )
        .route(
            "/v1/movies/{id}",
            get(movies::show_movie).route_layer(read).merge(patch(movies::update_movie).delete(movies::delete_movie).route_layer(write)),
        )
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route("/v1/tokens/authentication", post(tokens::create_authentication_token))
        .route("/debug/vars", get(telemetry::debug_vars))
        .route("/metrics", get(telemetry::serve_metrics));

    compose(router, state)
}

/// Wrap `router` in the fixed pipeline. Layers added later run first, so the
/// list below reads innermost to outermost.
pub fn compose(router: Router<AppState>, state: AppState) -> Router {
    router
        .fallback(helpers::not_found)
        .method_not_allowed_fallback(helpers::method_not_allowed)
        .layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::enable_cors))
        .layer(from_fn_with_state(state.clone(), telemetry::track))
        .with_state(state)
}

/// Start the HTTP server and block until a shutdown signal, then drain
/// background work and stop the limiter sweeper.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(config.smtp_sender.clone()));
    let state = AppState::new(config, SharedStore::new(), mailer);
    state.limiter.start_sweeper();

    let app = routes(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {}", addr))?;
    info!(
        target: "startup",
        %addr,
        env = %state.config.env,
        limiter_enabled = state.config.limiter.enabled,
        rps = state.config.limiter.rps,
        burst = state.config.limiter.burst,
        "starting server"
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!(target: "startup", "completing background tasks");
    state.background.shutdown(state.config.shutdown_timeout).await;
    state.limiter.shutdown();
    info!(target: "startup", %addr, "stopped server");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "startup", error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                tracing::error!(target: "startup", error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target: "startup", "shutting down server");
}
