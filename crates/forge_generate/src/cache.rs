//! Prompt result cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Completed generations keyed by the SHA-256 of their prompt.
#[derive(Debug)]
pub struct PromptCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl PromptCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Hex digest used as the cache key.
    pub fn key(prompt: &str) -> String {
        hex::encode(Sha256::digest(prompt.as_bytes()))
    }

    /// Cached content for the prompt, if present and fresh.
    pub fn get(&self, prompt: &str) -> Option<String> {
        let key = Self::key(prompt);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some((stored, content)) if stored.elapsed() < self.ttl => Some(content.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store content for the prompt. Empty content is not cached.
    pub fn put(&self, prompt: &str, content: &str) {
        if content.is_empty() {
            return;
        }
        self.entries
            .lock()
            .insert(Self::key(prompt), (Instant::now(), content.to_string()));
    }

    /// Drop expired entries and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
