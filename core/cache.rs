use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: Arc<str>,
    pub stored_at: Instant,
}

/// Time-bounded memo of fetched subscription text.
///
/// Expired entries are never purged; they stop matching on lookup and are
/// replaced by the next `put` for the same key.
#[derive(Debug)]
pub struct SubscriptionCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for SubscriptionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl SubscriptionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<Arc<str>> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.stored_at) < self.ttl {
            Some(Arc::clone(&entry.content))
        } else {
            None
        }
    }

    pub fn put(&self, key: &str, content: &str) {
        self.put_at(key, content, Instant::now());
    }

    pub fn put_at(&self, key: &str, content: &str, now: Instant) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                CacheEntry {
                    content: Arc::from(content),
                    stored_at: now,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Digest of the trimmed subscription URL, used as the cache key.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.trim().as_bytes()))
}
