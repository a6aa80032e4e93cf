//! Trivia session server entrypoint wiring REST, WebSocket, and storage layers.

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trivia_live_back::auth::{AuthProvider, LocalAuth};
use trivia_live_back::config::AppConfig;
use trivia_live_back::dao::memory::{MemoryStore, sample_quiz};
use trivia_live_back::dao::store::QuizStore;
use trivia_live_back::services::room_registry;
use trivia_live_back::state::{AppState, SharedState};
use trivia_live_back::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store();
    let auth = Arc::new(LocalAuth::new()) as Arc<dyn AuthProvider>;
    let state = AppState::new(config, store, auth);

    room_registry::spawn_sweeper(state.clone());

    let app = build_router(state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Assemble the quiz store, seeding it from the optional JSON library.
fn build_store() -> Arc<dyn QuizStore> {
    let store = MemoryStore::new();

    if let Some(path) = env::var_os("QUIZ_LIBRARY_PATH").map(PathBuf::from) {
        if let Err(err) = store.load_library(&path) {
            warn!(path = %path.display(), error = %err, "failed to load quiz library");
        }
    }

    let demo = sample_quiz();
    info!(quiz_id = %demo.id, title = %demo.title, "registered built-in demo quiz");
    store.insert_quiz(demo);

    Arc::new(store)
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
