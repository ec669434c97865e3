use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use vanished_shared::password::{generate_salt, PasswordHasher};
use vanished_shared::ServerFrame;
use vanished_store::{Database, PurgeStats, StoreError};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::admission::Gate;
use crate::registry::SessionRegistry;

/// Everything a connection task needs, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub gate: Gate,
    store: Arc<Mutex<Database>>,
    hasher: Arc<dyn PasswordHasher>,
    /// Held across a room change in the store and the matching registry
    /// update, so the cached membership never lags behind a concurrent one.
    transitions: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(config: ServerConfig, db: Database, hasher: Arc<dyn PasswordHasher>) -> Self {
        let gate = Gate::new(&config);
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            gate,
            store: Arc::new(Mutex::new(db)),
            hasher,
            transitions: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Run `f` against the store on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || -> Result<T, ServerError> {
            let mut db = store
                .lock()
                .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))?;
            f(&mut *db).map_err(ServerError::from)
        })
        .await?
    }

    /// Serialize a room change. Send frames after dropping the guard.
    pub async fn room_transition(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.transitions.lock().await
    }

    pub fn hasher(&self) -> Arc<dyn PasswordHasher> {
        self.hasher.clone()
    }

    /// Hash `password` under a fresh salt. Returns `(digest, salt)`.
    pub async fn hash_password(&self, password: String) -> Result<(Vec<u8>, Vec<u8>), ServerError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, Vec<u8>), ServerError> {
            let salt = generate_salt();
            let digest = hasher.hash(&password, &salt)?;
            Ok((digest, salt.to_vec()))
        })
        .await?
    }

    /// Delete every user, room and participant row.
    pub async fn purge(&self) -> Result<PurgeStats, ServerError> {
        let stats = self.with_store(|db| db.purge_ephemeral()).await?;
        info!(
            users = stats.users,
            rooms = stats.rooms,
            participants = stats.participants,
            "Purged ephemeral state"
        );
        Ok(stats)
    }

    /// Tell every live session the server is going away and close it.
    /// Returns the number of sessions notified.
    pub async fn shutdown_sessions(&self, notice: &str) -> usize {
        let frame = ServerFrame::info(notice);
        let sessions = self.registry.all().await;
        for session in &sessions {
            if let Err(e) = session.send(&frame).await {
                warn!(user = %session.username, error = %e, "shutdown notice not delivered");
            }
            let _ = session.close("server shutting down").await;
        }
        sessions.len()
    }
}
