use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::time::Instant;

use super::ResolvedIdentity;

struct Entry {
    identity: ResolvedIdentity,
    inserted_at: Instant,
    aliases: Vec<String>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u64, Entry>,
    aliases: HashMap<String, u64>,
    next_id: u64,
}

impl Inner {
    fn remove_entry(&mut self, id: u64) {
        if let Some(entry) = self.entries.remove(&id) {
            for alias in entry.aliases {
                if self.aliases.get(&alias) == Some(&id) {
                    self.aliases.remove(&alias);
                }
            }
        }
    }

    fn remove_expired(&mut self, ttl: Duration) {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            self.remove_entry(id);
        }
    }

    fn oldest(&self) -> Option<u64> {
        self.entries
            .iter()
            .min_by_key(|(id, entry)| (entry.inserted_at, **id))
            .map(|(id, _)| *id)
    }
}

fn alias_key(alias: &str) -> String {
    alias.trim().to_lowercase()
}

/// Identity cache keyed by every alias of an identity, case-insensitively.
///
/// Capacity bounds the number of alias keys. Entries expire `ttl` after
/// insertion; when full, the oldest identity is evicted with all its aliases.
pub struct IdentityCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl IdentityCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, alias: &str) -> Option<ResolvedIdentity> {
        let key = alias_key(alias);
        let mut inner = self.lock();
        let id = *inner.aliases.get(&key)?;

        let fresh = inner
            .entries
            .get(&id)
            .is_some_and(|entry| entry.inserted_at.elapsed() < self.ttl);
        if !fresh {
            inner.remove_entry(id);
            return None;
        }
        inner.entries.get(&id).map(|entry| entry.identity.clone())
    }

    /// Store `identity` under `query` and each of its own names.
    pub fn insert(&self, identity: ResolvedIdentity, query: &str) {
        let mut aliases: Vec<String> = Vec::new();
        let candidates = [
            Some(query),
            Some(identity.canonical_key.as_str()),
            identity.handle.as_deref(),
            Some(identity.display_name.as_str()),
            identity.email.as_deref(),
        ];
        for alias in candidates.into_iter().flatten().map(alias_key) {
            if !alias.is_empty() && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        if self.capacity == 0 || aliases.is_empty() {
            return;
        }
        aliases.truncate(self.capacity);

        let mut inner = self.lock();

        let replaced: Vec<u64> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.identity.canonical_key == identity.canonical_key)
            .map(|(id, _)| *id)
            .collect();
        for id in replaced {
            inner.remove_entry(id);
        }

        // an alias points at a single identity
        for alias in &aliases {
            if let Some(other) = inner.aliases.remove(alias) {
                let orphaned = inner.entries.get_mut(&other).is_some_and(|entry| {
                    entry.aliases.retain(|a| a != alias);
                    entry.aliases.is_empty()
                });
                if orphaned {
                    inner.entries.remove(&other);
                }
            }
        }

        if inner.aliases.len() + aliases.len() > self.capacity {
            inner.remove_expired(self.ttl);
        }
        while inner.aliases.len() + aliases.len() > self.capacity {
            let Some(oldest) = inner.oldest() else {
                break;
            };
            log::debug!("Evicting cached identity {oldest} to make room");
            inner.remove_entry(oldest);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        for alias in &aliases {
            inner.aliases.insert(alias.clone(), id);
        }
        inner.entries.insert(
            id,
            Entry {
                identity,
                inserted_at: Instant::now(),
                aliases,
            },
        );
    }

    /// Number of alias keys held
    pub fn len(&self) -> usize {
        self.lock().aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn identity_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn clear(&self) {
        *self.lock() = Inner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(key: &str, handle: &str, display_name: &str) -> ResolvedIdentity {
        ResolvedIdentity {
            canonical_key: key.to_string(),
            handle: Some(handle.to_string()),
            display_name: display_name.to_string(),
            email: None,
            active: true,
            locale: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_alias_hits() {
        let cache = IdentityCache::new(Duration::from_secs(300), 100);
        let mut alice = identity("u1", "alice", "Alice Smith");
        alice.email = Some("alice@example.com".to_string());
        cache.insert(alice.clone(), "alice");

        for alias in ["alice", "ALICE", "u1", "alice smith", "Alice@Example.com"] {
            assert_eq!(cache.get(alias), Some(alice.clone()), "{alias}");
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.identity_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = IdentityCache::new(Duration::from_secs(300), 100);
        cache.insert(identity("u1", "alice", "Alice"), "alice");

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("u1").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("alice").is_none());
        // the whole identity went with it
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_oldest_identity_with_all_aliases() {
        let cache = IdentityCache::new(Duration::from_secs(300), 8);
        // 2 aliases, oldest
        cache.insert(identity("a1", "ann", "Ann"), "ann");
        tokio::time::advance(Duration::from_secs(1)).await;
        // 5 aliases
        let mut bob = identity("b1", "bob", "Bob Jones");
        bob.email = Some("bob@example.com".to_string());
        cache.insert(bob, "Bobby");
        tokio::time::advance(Duration::from_secs(1)).await;
        // 3 aliases, needs room
        cache.insert(identity("c1", "cat", "Cat Lee"), "cat");

        assert!(cache.get("ann").is_none());
        assert!(cache.get("a1").is_none());
        assert!(cache.get("bobby").is_some());
        assert!(cache.get("cat lee").is_some());
        assert_eq!(cache.len(), 8);
        assert_eq!(cache.identity_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinsert_replaces_and_alias_moves() {
        let cache = IdentityCache::new(Duration::from_secs(300), 100);
        cache.insert(identity("u1", "alice", "Alice"), "alice");
        cache.insert(identity("u1", "alice", "Alice Smith"), "alice");
        assert_eq!(cache.identity_count(), 1);
        assert_eq!(cache.get("u1").unwrap().display_name, "Alice Smith");
        assert!(cache.get("alice smith").is_some());

        // a handle taken over by another identity
        cache.insert(identity("u2", "alice", "Alice Two"), "alice");
        assert_eq!(cache.get("alice").unwrap().canonical_key, "u2");
        assert_eq!(cache.get("u1").unwrap().canonical_key, "u1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let cache = IdentityCache::new(Duration::from_secs(300), 100);
        cache.insert(identity("u1", "alice", "Alice"), "alice");
        cache.clear();
        assert!(cache.get("alice").is_none());
        assert!(cache.is_empty());
    }
}
