use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::chat::model::Message;

/// Short-lived read-through cache for message lists, keyed by conversation.
/// Entries are replaced wholesale on fetch and expire only by TTL; a write
/// inside the window can therefore be followed by a stale read, which the
/// durable store's next fetch corrects.
#[derive(Debug)]
pub(crate) struct MessageCache {
    ttl: Duration,
    entries: Mutex<HashMap<Uuid, CacheEntry>>,
}

#[derive(Debug)]
struct CacheEntry {
    fetched_at: Instant,
    messages: Vec<Message>,
}

impl MessageCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        MessageCache { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub(crate) fn get(&self, conversation_id: Uuid) -> Option<Vec<Message>> {
        let mut entries = self.lock();
        match entries.get(&conversation_id) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.messages.clone()),
            Some(_) => {
                entries.remove(&conversation_id);
                None
            }
            None => None,
        }
    }

    pub(crate) fn put(&self, conversation_id: Uuid, messages: Vec<Message>) {
        self.lock().insert(conversation_id, CacheEntry {
            fetched_at: Instant::now(),
            messages,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::model::Role;

    fn message(conversation: Uuid) -> Message {
        Message {
            id: Uuid::now_v7(),
            conversation,
            sender: "u1".into(),
            sender_type: Role::User,
            text: "cached".into(),
            timestamp: 0,
            read: false,
        }
    }

    #[test]
    fn fresh_entry_is_served() {
        let cache = MessageCache::new(Duration::from_secs(5));
        let convo = Uuid::now_v7();
        cache.put(convo, vec![message(convo)]);

        let hit = cache.get(convo).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].text, "cached");
    }

    #[test]
    fn expired_entry_misses_and_is_evicted() {
        let cache = MessageCache::new(Duration::ZERO);
        let convo = Uuid::now_v7();
        cache.put(convo, vec![message(convo)]);

        assert!(cache.get(convo).is_none());
        assert!(cache.lock().is_empty());
    }

    #[test]
    fn unknown_conversation_misses() {
        let cache = MessageCache::new(Duration::from_secs(5));
        assert!(cache.get(Uuid::now_v7()).is_none());
    }

    #[test]
    fn put_replaces_the_entry() {
        let cache = MessageCache::new(Duration::from_secs(5));
        let convo = Uuid::now_v7();
        cache.put(convo, vec![message(convo)]);
        cache.put(convo, vec![message(convo), message(convo)]);

        assert_eq!(cache.get(convo).unwrap().len(), 2);
    }
}
