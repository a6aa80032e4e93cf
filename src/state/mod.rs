//! Shared application state and in-memory session primitives.

pub mod leaderboard;
pub mod lifecycle;
pub mod room;
pub mod scoring;
pub mod timer;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::config::AppConfig;
use crate::dao::store::QuizStore;
use crate::dto::ws::ServerEvent;
use crate::services::room_actor::RoomHandle;

/// Outbound half of one websocket client, fed by room broadcasts.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// One attached websocket connection.
///
/// The id distinguishes an old socket from the one a rejoin attached, so a
/// late close on the old socket cannot disconnect the fresh one.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique id of this socket attachment.
    pub id: Uuid,
    /// Channel delivering events to the socket's writer task.
    pub tx: ClientSender,
}

impl Connection {
    /// Wrap an outbound channel in a freshly identified connection.
    pub fn new(tx: ClientSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }
}

/// Process-wide shared state handed to every route and service.
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn QuizStore>,
    auth: Arc<dyn AuthProvider>,
    rooms: DashMap<String, RoomHandle>,
}

/// Cheaply clonable handle on [`AppState`].
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble the shared state from its backing services.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn QuizStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            auth,
            rooms: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Quiz content and result persistence backend.
    pub fn store(&self) -> &Arc<dyn QuizStore> {
        &self.store
    }

    /// Token resolution backend.
    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    /// Registry of live rooms keyed by room code.
    pub fn rooms(&self) -> &DashMap<String, RoomHandle> {
        &self.rooms
    }
}
