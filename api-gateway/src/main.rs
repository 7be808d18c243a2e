// api-gateway/src/main.rs

//! API gateway binary.
//!
//! This binary exposes the voting service HTTP API on top of the
//! `ledger` crate:
//!
//! - public reads (polls, results, ledger inspection) on the generous
//!   rate tier,
//! - registration and logins on the strict tier,
//! - authenticated mutations and admin operations on the moderate tier.
//!
//! It embeds the voting state machine, seeds the admin account, optionally
//! connects the Postgres and Redis sinks (rehydrating state from Postgres
//! at boot), and runs the persistence reconciler plus the rate-limit
//! sweeper as background tasks with a cooperative shutdown signal.

mod config;
mod error;
mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use axum::response::IntoResponse;
use tokio::signal;
use tokio::sync::watch;
use tower_http::catch_panic::CatchPanicLayer;

use ledger::{
    rehydrate, spawn_sweeper, AdminStore, CacheStore, NodeConfig, PgStore, Reconciler,
    TokenService, VotingMachine,
};

use config::ApiConfig;
use error::ApiError;
use state::{unix_now, AppState, SharedState};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "api_gateway=info,ledger=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let api_cfg = ApiConfig::from_env();
    let node_cfg = NodeConfig::from_env();

    // ---------------------------
    // State machine + identity
    // ---------------------------

    let machine = Arc::new(VotingMachine::new(
        node_cfg.mining.difficulty,
        node_cfg.mining.mining_threshold,
        unix_now(),
    ));

    let admins = AdminStore::new();
    admins
        .create_admin(
            &node_cfg.auth.admin_username,
            &node_cfg.auth.admin_email,
            &node_cfg.auth.admin_password,
            unix_now(),
        )
        .map_err(|e| format!("failed to seed admin account: {e}"))?;
    tracing::info!(username = %node_cfg.auth.admin_username, "seeded admin account");

    let tokens = TokenService::new(
        node_cfg.auth.jwt_secret.as_bytes(),
        node_cfg.auth.token_lifetime_secs,
    );

    // ---------------------------
    // Persistence sinks + rehydration
    // ---------------------------

    let database = match &node_cfg.persist.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .map_err(|e| format!("failed to connect to Postgres: {e}"))?;
            // Fail closed: a chain that does not verify aborts boot
            // rather than starting with guessed history.
            let summary = rehydrate(&machine, &store, unix_now())
                .await
                .map_err(|e| format!("rehydration failed: {e}"))?;
            tracing::info!(
                voters = summary.voters,
                polls = summary.polls,
                blocks = summary.blocks,
                "rehydrated state from relational store"
            );
            Some(store)
        }
        None => {
            tracing::info!("DATABASE_URL unset; relational mirror disabled");
            None
        }
    };

    let cache = match &node_cfg.persist.redis_url {
        Some(url) => {
            let store = CacheStore::connect(url)
                .await
                .map_err(|e| format!("failed to connect to Redis: {e}"))?;
            Some(store)
        }
        None => {
            tracing::info!("REDIS_URL unset; cache mirror disabled");
            None
        }
    };

    // ---------------------------
    // Background tasks
    // ---------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tiers = node_cfg.rate_limits.tiers();
    let sweeper = spawn_sweeper(
        tiers.clone(),
        node_cfg.rate_limits.sweep_interval,
        shutdown_rx.clone(),
    );

    let reconciler = if database.is_some() || cache.is_some() {
        let task = Reconciler::new(machine.clone(), database, cache, &node_cfg.persist)
            .spawn(shutdown_rx.clone());
        Some(task)
    } else {
        None
    };

    // ---------------------------
    // Shared state
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState {
        machine,
        tokens,
        admins,
        tiers,
    });

    // ---------------------------
    // HTTP router
    // ---------------------------

    // Anonymous read-only endpoints: generous tier.
    let public = Router::new()
        .route("/", get(routes::health::summary))
        .route("/health", get(routes::health::health))
        .route("/polls", get(routes::polls::list))
        .route("/polls/{id}", get(routes::polls::get_poll))
        .route("/results/{id}", get(routes::polls::results))
        .route("/blockchain/verify", get(routes::blockchain::verify))
        .route("/blockchain/blocks", get(routes::blockchain::blocks))
        .route("/blockchain/stats", get(routes::blockchain::stats))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::generous_rate_limit,
        ));

    // Registration and logins: strict tier against brute force.
    let strict = Router::new()
        .route("/register", post(routes::register::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/voter-login", post(routes::auth::voter_login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::strict_rate_limit,
        ));

    // Authenticated and admin operations: moderate tier.
    let moderate = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .route("/voter/{id}/history", get(routes::voter::history))
        .route("/vote", post(routes::vote::cast))
        .route("/admin/polls", post(routes::admin::create_poll))
        .route("/admin/blockchain/mine", post(routes::admin::mine))
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::moderate_rate_limit,
        ));

    // Layer order: the request-id layer is outermost, so even a panic
    // response carries an `X-Request-ID` header.
    let app = Router::new()
        .merge(public)
        .merge(strict)
        .merge(moderate)
        .fallback(unknown_route)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn(middleware::request_id))
        .with_state(app_state);

    // ---------------------------
    // axum 0.8 server (graceful shutdown)
    // ---------------------------

    tracing::info!("voting API listening on http://{}", api_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| format!("API server error: {e}"))?;

    // Stop background tasks cooperatively; the reconciler closes its
    // sinks on the way out.
    let _ = shutdown_tx.send(true);
    sweeper.await.map_err(|e| format!("sweeper task panicked: {e}"))?;
    if let Some(task) = reconciler {
        task.await
            .map_err(|e| format!("reconciler task panicked: {e}"))?;
    }

    Ok(())
}

/// Recovery wrapper: a panicking handler is logged and surfaced as a
/// generic internal error instead of tearing down the connection.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %detail, "handler panicked");
    ApiError::internal().into_response()
}

/// Fallback for unknown routes.
async fn unknown_route() -> ApiError {
    ApiError::not_found("route not found")
}

/// Fallback for known routes hit with the wrong verb.
async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
