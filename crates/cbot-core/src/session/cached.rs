use std::ops::Deref;

use serde_json::Value;

use crate::{
    domain::{ChatId, UserId},
    session::{
        state::{ClearScope, Session},
        store::{SessionRecord, SessionStore},
    },
    Result,
};

/// A [`Session`] loaded from a store that only writes back what changed.
///
/// Reads go through `Deref`. Every mutation compares old and new state first
/// and raises `dirty` only on an actual change. `persist` is a no-op while
/// clean.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedSession {
    session: Session,
    dirty: bool,
}

impl CachedSession {
    pub fn from_record(record: SessionRecord, chat_id: ChatId) -> Self {
        Self {
            session: Session::new(
                record.external_user_id,
                chat_id,
                record.context,
                record.preferences,
            ),
            dirty: false,
        }
    }

    pub async fn from_cache(
        store: &dyn SessionStore,
        user_id: UserId,
        chat_id: ChatId,
    ) -> Result<Self> {
        let record = store.create_or_get_chat_session(user_id).await?;
        Ok(Self::from_record(record, chat_id))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if self.session.context().get(&key) != Some(&value) {
            self.dirty = true;
        }
        self.session.set(key, value);
    }

    pub fn set_preference(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if self.session.preference(&key) != Some(&value) {
            self.dirty = true;
        }
        self.session.set_preference(key, value);
    }

    pub fn pop(&mut self, key: &str) -> Option<Value> {
        let popped = self.session.pop(key);
        if popped.is_some() {
            self.dirty = true;
        }
        popped
    }

    pub fn clear(&mut self, scope: ClearScope) {
        let before = self.session.context().len();
        self.session.clear(scope);
        if self.session.context().len() != before {
            self.dirty = true;
        }
    }

    /// Write `(context, preferences)` back if anything changed.
    ///
    /// Returns whether a write happened. On failure `dirty` stays set so the
    /// caller can retry.
    pub async fn persist(&mut self, store: &dyn SessionStore) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        store
            .set_chat_context(
                self.session.user_id(),
                self.session.context(),
                self.session.preferences(),
            )
            .await?;
        self.dirty = false;
        tracing::debug!(
            user_id = self.session.user_id().0,
            chat_id = self.session.chat_id().0,
            "session persisted"
        );
        Ok(true)
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

impl Deref for CachedSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}
