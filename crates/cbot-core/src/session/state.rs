use serde_json::Value;

use crate::domain::{ChatId, UserId};

/// JSON object used for both context and preferences.
pub type StateMap = serde_json::Map<String, Value>;

pub const IMAGE_SUFFIX: &str = "_image";
pub const AUDIO_SUFFIX: &str = "_audio";

/// Context key excluded from [`Session::to_map`].
pub const BUFFER_KEY: &str = "buffer";

/// Media slots kept by a conversation-scoped clear.
pub const TRANSIENT_MEDIA_KEYS: [&str; 3] = ["temp_image", "temp_audio", "temp_video"];

/// A value that counts as absent when falling back from context to preferences.
///
/// Null, `false`, numeric zero, and empty strings, arrays and objects are blank.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// How much of the context a clear removes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClearScope {
    /// Drop the conversation but keep pending media slots.
    #[default]
    Conversation,
    /// Drop everything in the context.
    User,
}

/// Per-conversation state.
///
/// `context` is short-term memory scoped to the current thread and is cleared
/// on demand. `preferences` is long-term memory scoped to the user and
/// survives clears.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    user_id: UserId,
    chat_id: ChatId,
    context: StateMap,
    preferences: StateMap,
}

impl Session {
    pub fn new(user_id: UserId, chat_id: ChatId, context: StateMap, preferences: StateMap) -> Self {
        Self {
            user_id,
            chat_id,
            context,
            preferences,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn context(&self) -> &StateMap {
        &self.context
    }

    pub fn preferences(&self) -> &StateMap {
        &self.preferences
    }

    /// First non-blank value from context, then preferences.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.lookup(key, true)
    }

    pub fn lookup(&self, key: &str, include_preferences: bool) -> Option<&Value> {
        if let Some(v) = self.context.get(key).filter(|v| !is_blank(v)) {
            return Some(v);
        }
        if !include_preferences {
            return None;
        }
        self.preferences.get(key).filter(|v| !is_blank(v))
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).cloned().unwrap_or(default)
    }

    pub fn preference(&self, key: &str) -> Option<&Value> {
        self.preferences.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn pop(&mut self, key: &str) -> Option<Value> {
        self.context.remove(key)
    }

    pub fn clear(&mut self, scope: ClearScope) {
        match scope {
            ClearScope::User => self.context.clear(),
            ClearScope::Conversation => self
                .context
                .retain(|k, _| TRANSIENT_MEDIA_KEYS.contains(&k.as_str())),
        }
    }

    pub fn set_preference(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.preferences.insert(key.into(), value.into());
    }

    /// Preferences overlaid with context (context wins), minus the buffer key.
    pub fn to_map(&self, include_preferences: bool) -> StateMap {
        let mut out = if include_preferences {
            self.preferences.clone()
        } else {
            StateMap::new()
        };
        for (k, v) in &self.context {
            if k != BUFFER_KEY {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    pub fn images(&self) -> Vec<(&str, &Value)> {
        self.media(IMAGE_SUFFIX)
    }

    pub fn audios(&self) -> Vec<(&str, &Value)> {
        self.media(AUDIO_SUFFIX)
    }

    fn media(&self, suffix: &str) -> Vec<(&str, &Value)> {
        self.context
            .iter()
            .filter(|(k, v)| k.ends_with(suffix) && !is_blank(v))
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }
}
