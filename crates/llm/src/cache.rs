//! In-memory TTL cache for generated SQL.
//!
//! Only SQL-generation responses are cached; synthesized answers never are.
//! Keys are derived from the question plus the schema context that went into
//! the prompt, so a schema change invalidates naturally.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use masset_core::config::CacheConfig;

struct CacheEntry {
    sql: String,
    inserted_at: Instant,
}

/// TTL-bounded, size-bounded cache of generated SQL statements.
pub struct SqlCache {
    enabled: bool,
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl SqlCache {
    pub fn new(config: &CacheConfig) -> Self {
        if config.enabled {
            tracing::info!(
                ttl_secs = config.ttl.as_secs(),
                max_entries = config.max_entries,
                "SQL cache enabled",
            );
        }
        Self {
            enabled: config.enabled,
            ttl: config.ttl,
            max_entries: config.max_entries,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that never stores or returns anything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ttl: Duration::ZERO,
            max_entries: 0,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(question: &str, context: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(question.as_bytes());
        hasher.update(b"::::");
        hasher.update(context.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a previously generated statement for this question/context.
    pub fn get(&self, question: &str, context: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = Self::key(question, context);
        let entries = self.entries.read().expect("cache lock poisoned");
        let entry = entries.get(&key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            return None;
        }
        tracing::info!("SQL cache hit");
        Some(entry.sql.clone())
    }

    /// Store a generated statement. Expired entries are pruned on insert;
    /// when the cache is full the new entry is still admitted after pruning
    /// only if a slot is free.
    pub fn put(&self, question: &str, context: &str, sql: &str) {
        if !self.enabled || sql.is_empty() {
            return;
        }
        let key = Self::key(question, context);
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            return;
        }
        entries.insert(
            key,
            CacheEntry {
                sql: sql.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: Duration, max_entries: usize) -> SqlCache {
        SqlCache::new(&CacheConfig {
            enabled: true,
            ttl,
            max_entries,
        })
    }

    #[test]
    fn hit_after_put() {
        let cache = cache(Duration::from_secs(60), 16);
        cache.put("top 5 stocks", "schema-a", "SELECT 1;");
        assert_eq!(cache.get("top 5 stocks", "schema-a").as_deref(), Some("SELECT 1;"));
    }

    #[test]
    fn context_is_part_of_the_key() {
        let cache = cache(Duration::from_secs(60), 16);
        cache.put("top 5 stocks", "schema-a", "SELECT 1;");
        assert_eq!(cache.get("top 5 stocks", "schema-b"), None);
    }

    #[test]
    fn entries_expire() {
        let cache = cache(Duration::from_millis(10), 16);
        cache.put("q", "ctx", "SELECT 1;");
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("q", "ctx"), None);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = SqlCache::disabled();
        cache.put("q", "ctx", "SELECT 1;");
        assert_eq!(cache.get("q", "ctx"), None);
    }

    #[test]
    fn full_cache_rejects_new_keys() {
        let cache = cache(Duration::from_secs(60), 1);
        cache.put("first", "ctx", "SELECT 1;");
        cache.put("second", "ctx", "SELECT 2;");
        assert_eq!(cache.get("first", "ctx").as_deref(), Some("SELECT 1;"));
        assert_eq!(cache.get("second", "ctx"), None);
    }

    #[test]
    fn empty_sql_is_never_cached() {
        let cache = cache(Duration::from_secs(60), 16);
        cache.put("q", "ctx", "");
        assert_eq!(cache.get("q", "ctx"), None);
    }
}
