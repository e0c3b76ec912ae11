//! HTTP surface: axum router over the repositories.

pub mod error;
pub mod system;
pub mod tasks;
pub mod users;

use std::time::Instant;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::{get, patch};
use axum::Router;
use rusqlite::Connection;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::TaskhubError;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub started: Instant,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            started: Instant::now(),
        }
    }

    /// Run storage work on the blocking pool, holding the connection lock.
    pub async fn run<F, T>(&self, f: F) -> Result<T, TaskhubError>
    where
        F: FnOnce(&Connection) -> Result<T, TaskhubError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| TaskhubError::database(format!("storage task failed: {e}")))?
    }
}

/// Build the application router. Fixed paths such as `/stats` are declared
/// ahead of `/{id}` so they are never read as ids.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let task_routes = Router::new()
        .route("/", get(tasks::list).post(tasks::create))
        .route("/stats", get(tasks::stats))
        .route("/search", get(tasks::search))
        .route("/batch-update", patch(tasks::batch_update))
        .route(
            "/{id}",
            get(tasks::show)
                .put(tasks::replace)
                .patch(tasks::update)
                .delete(tasks::destroy),
        );

    let user_routes = Router::new()
        .route("/", get(users::list).post(users::create))
        .route("/stats", get(users::stats))
        .route(
            "/{id}",
            get(users::show)
                .put(users::update)
                .patch(users::update)
                .delete(users::destroy),
        )
        .route("/{id}/tasks", get(users::tasks));

    let api = Router::new()
        .route("/", get(system::index))
        .nest("/tasks", task_routes)
        .nest("/users", user_routes);

    Router::new()
        .route("/health", get(system::health))
        .nest("/api", api)
        .fallback(system::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Open the database and serve until SIGINT/SIGTERM.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path.display()))?;
    let app = router(AppState::new(db), &config.cors_origins);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    match listener.local_addr() {
        Ok(local) => tracing::info!(%local, "listening"),
        Err(error) => tracing::warn!(%error, "could not determine local address"),
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
