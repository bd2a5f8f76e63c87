//! In-process key-value store.
//!
//! Expired entries are dropped lazily on access. Only suitable for a single
//! process: nothing here is visible to other instances.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use regex::Regex;

use super::{KeyValueStore, WindowCount};
use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// `DashMap`-backed key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns `true` if no live keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            return None;
        }
        Some(entry.value.clone())
    }
}

/// Translates a Redis glob (`*`, `?`, `[...]`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> CacheResult<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => out.push('['),
            ']' => out.push(']'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| CacheError::key_value(format!("bad pattern '{pattern}': {e}")))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live(key))
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        Ok(keys.iter().map(|key| self.live(key)).collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        for (key, value) in entries {
            self.entries
                .insert(key.clone(), StoredValue::new(value.as_str(), ttl));
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, v)| !v.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.is_expired(now) && matcher.is_match(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().is_expired(now) {
                    held.insert(StoredValue::new(value, Some(lease)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredValue::new(value, Some(lease)));
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, held| !held.is_expired(now) && held.value == value)
            .is_some())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> CacheResult<WindowCount> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::new("0", Some(window)));

        if entry.is_expired(now) {
            *entry = StoredValue::new("0", Some(window));
        }

        let count = entry
            .value
            .parse::<u64>()
            .map_err(|_| CacheError::key_value(format!("value at '{key}' is not an integer")))?
            + 1;
        entry.value = count.to_string();
        let expires_at = *entry.expires_at.get_or_insert(now + window);

        Ok(WindowCount {
            count,
            reset_in: expires_at.saturating_duration_since(now),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
