use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{domain::UserId, session::state::StateMap, utils::iso_timestamp_utc, Result};

/// What the backing store hands back for a chat session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub external_user_id: UserId,
    #[serde(default)]
    pub context: StateMap,
    #[serde(default)]
    pub preferences: StateMap,
}

impl SessionRecord {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            external_user_id: user_id,
            ..Self::default()
        }
    }
}

/// Backing store port consumed by [`CachedSession`](crate::session::CachedSession).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Idempotent; creates a default record on the first call for a user.
    async fn create_or_get_chat_session(&self, user_id: UserId) -> Result<SessionRecord>;

    /// Full overwrite of both maps.
    async fn set_chat_context(
        &self,
        user_id: UserId,
        context: &StateMap,
        preferences: &StateMap,
    ) -> Result<()>;
}

/// Process-local store. State is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<UserId, SessionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, user_id: UserId) -> Option<SessionRecord> {
        self.records.lock().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_or_get_chat_session(&self, user_id: UserId) -> Result<SessionRecord> {
        let mut records = self.records.lock().await;
        Ok(records
            .entry(user_id)
            .or_insert_with(|| SessionRecord::empty(user_id))
            .clone())
    }

    async fn set_chat_context(
        &self,
        user_id: UserId,
        context: &StateMap,
        preferences: &StateMap,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        let record = records
            .entry(user_id)
            .or_insert_with(|| SessionRecord::empty(user_id));
        record.context = context.clone();
        record.preferences = preferences.clone();
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    saved_at: Option<String>,
    #[serde(default)]
    sessions: BTreeMap<String, SessionRecord>,
}

/// Single JSON document on disk, rewritten on every write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreFile>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = load_store_file(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `next` to disk, then make it the live state. On error the live
    /// state is left as it was.
    async fn commit(&self, state: &mut StoreFile, mut next: StoreFile) -> Result<()> {
        next.saved_at = Some(iso_timestamp_utc());
        self.flush(&next).await?;
        *state = next;
        Ok(())
    }

    async fn flush(&self, file: &StoreFile) -> Result<()> {
        let txt = serde_json::to_string_pretty(file)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, txt).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileStore {
    async fn create_or_get_chat_session(&self, user_id: UserId) -> Result<SessionRecord> {
        let mut state = self.state.lock().await;
        let key = user_id.0.to_string();
        if let Some(record) = state.sessions.get(&key) {
            return Ok(record.clone());
        }

        let record = SessionRecord::empty(user_id);
        let mut next = state.clone();
        next.sessions.insert(key, record.clone());
        self.commit(&mut state, next).await?;
        Ok(record)
    }

    async fn set_chat_context(
        &self,
        user_id: UserId,
        context: &StateMap,
        preferences: &StateMap,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let record = next
            .sessions
            .entry(user_id.0.to_string())
            .or_insert_with(|| SessionRecord::empty(user_id));
        record.context = context.clone();
        record.preferences = preferences.clone();
        self.commit(&mut state, next).await
    }
}

fn load_store_file(path: &Path) -> Result<Option<StoreFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&txt)?))
}
