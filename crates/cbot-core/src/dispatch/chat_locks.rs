use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::ChatId;

type LockMap = HashMap<ChatId, Arc<Mutex<()>>>;

/// One async mutex per chat, shared by every worker thread.
///
/// Holding the guard from session load to persist serializes updates for the
/// same chat while other chats proceed in parallel. An entry lives only while
/// some update holds or waits for it.
#[derive(Debug, Default)]
pub struct ChatLocks {
    inner: Arc<StdMutex<LockMap>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: ChatId) -> ChatGuard {
        // Cloned under the map lock, so a waiter always keeps the entry alive.
        let lock = lock_map(&self.inner)
            .entry(chat_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ChatGuard {
            chat_id,
            map: self.inner.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        lock_map(&self.inner).len()
    }
}

/// Exclusive access to one chat. Dropping it releases the chat and forgets the
/// entry when nobody else is queued on it.
#[derive(Debug)]
pub struct ChatGuard {
    chat_id: ChatId,
    map: Arc<StdMutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChatGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = lock_map(&self.map);
        if map
            .get(&self.chat_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.chat_id);
        }
    }
}

// The map is never left half-updated, so a poisoned lock is still usable.
fn lock_map(map: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}
