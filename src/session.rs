use crate::types::UserSnapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Persisted key-value entries of a signed-in session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionData {
    pub token: Option<String>,
    pub user: Option<UserSnapshot>,
    pub chat_open: bool,
}

/// Injected session handle shared by the backend and the stores.
#[derive(Debug, Clone)]
pub struct SessionContext {
    path: Option<PathBuf>,
    data: Arc<RwLock<SessionData>>,
}

impl SessionContext {
    /// Session that is never written to disk.
    pub fn in_memory(data: SessionData) -> Self {
        Self {
            path: None,
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = fs::read(&path)
            .ok()
            .and_then(|bytes| match serde_json::from_slice::<SessionData>(&bytes) {
                Ok(data) => Some(data),
                Err(err) => {
                    tracing::warn!("discarding unreadable session {}: {err}", path.display());
                    None
                }
            })
            .unwrap_or_default();
        Self {
            path: Some(path),
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(&*self.read())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, raw)
    }

    /// Signs out: drops credential and user, keeps UI flags.
    pub fn clear(&self) -> std::io::Result<()> {
        {
            let mut data = self.write();
            data.token = None;
            data.user = None;
        }
        self.save()
    }

    pub fn snapshot(&self) -> SessionData {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        self.write().token = token.filter(|t| !t.trim().is_empty());
    }

    pub fn user(&self) -> Option<UserSnapshot> {
        self.read().user.clone()
    }

    pub fn set_user(&self, user: Option<UserSnapshot>) {
        self.write().user = user;
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    pub fn chat_open(&self) -> bool {
        self.read().chat_open
    }

    pub fn set_chat_open(&self, open: bool) {
        self.write().chat_open = open;
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionData> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionData> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}
