//! Persisted player identity.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// The server-issued token identifying this player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque id returned by `POST /api/register`.
    pub player_id: String,
    /// Company name used at registration.
    #[serde(default)]
    pub name: String,
    /// When the identity was issued.
    pub registered_at: DateTime<Utc>,
}

impl Identity {
    /// Stamp a freshly issued id.
    pub fn new(player_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            name: name.into(),
            registered_at: Utc::now(),
        }
    }

    /// Load an identity from `path`, returning `None` if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read identity {}", path.display()))?;
        let identity = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse identity {}", path.display()))?;
        Ok(Some(identity))
    }

    /// Persist the identity, creating parent directories if needed.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create identity directory {}", parent.display())
            })?;
        }

        let serialized =
            serde_json::to_string_pretty(self).context("failed to serialize identity")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write identity {}", path.display()))
    }
}

/// Shared handle to the current identity and its backing file.
///
/// Cloned into poll tasks so every request reads the latest id. The lock only
/// guards the in-memory copy; file I/O happens outside it.
#[derive(Clone)]
pub struct IdentityStore {
    path: Arc<PathBuf>,
    current: Arc<RwLock<Option<Identity>>>,
}

impl IdentityStore {
    /// Open the store at `path`. An unreadable file is treated as absent so the
    /// player can register again.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match Identity::load(&path) {
            Ok(identity) => identity,
            Err(err) => {
                warn!("discarding unreadable identity: {err:#}");
                None
            }
        };
        Self {
            path: Arc::new(path),
            current: Arc::new(RwLock::new(current)),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current identity, if registered.
    pub fn current(&self) -> Option<Identity> {
        self.current.read().clone()
    }

    /// Current player id, if registered.
    pub fn player_id(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .map(|identity| identity.player_id.clone())
    }

    /// Whether an identity is held.
    pub fn is_registered(&self) -> bool {
        self.current.read().is_some()
    }

    /// Persist and adopt a new identity. A failed write keeps the previous one.
    pub fn set(&self, identity: Identity) -> Result<()> {
        identity.persist(self.path.as_path())?;
        info!(player_id = %identity.player_id, "stored player identity");
        *self.current.write() = Some(identity);
        Ok(())
    }

    /// Forget the identity and delete the backing file.
    pub fn clear(&self) -> Result<()> {
        self.current.write().take();
        if self.path.exists() {
            fs::remove_file(self.path.as_path()).with_context(|| {
                format!("failed to remove identity {}", self.path.display())
            })?;
        }
        Ok(())
    }
}
