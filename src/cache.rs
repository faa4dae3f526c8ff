use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{cache_key, CACHE_INDEX_KEY};
use crate::core::store::KvStore;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    expires_at: String,
}

/// Cache key -> RFC 3339 expiry.
type CacheIndex = BTreeMap<String, String>;

fn is_past(expires_at: &str, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(expires_at)
        .map(|at| now >= at.with_timezone(&Utc))
        .unwrap_or(true)
}

/// Returns the cached page under `key` unless it is missing or expired.
pub fn get_page<S: KvStore>(store: &S, key: &str) -> anyhow::Result<Option<String>> {
    let entry_key = cache_key(key);
    let entry = match store.get_json::<CacheEntry>(&entry_key)? {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let now = Utc::now();
    if is_past(&entry.expires_at, now) {
        tracing::debug!(key, "cached page expired");
        store.delete(&entry_key)?;
        store.update_json(CACHE_INDEX_KEY, |index: &mut CacheIndex| {
            if index.get(key).is_some_and(|at| is_past(at, now)) {
                index.remove(key);
            }
        })?;
        return Ok(None);
    }

    Ok(Some(entry.body))
}

/// Stores a page and evicts every other page that has expired.
pub fn set_page<S: KvStore>(store: &S, key: &str, body: &str, ttl_seconds: i64) -> anyhow::Result<()> {
    let now = Utc::now();
    let expires_at = (now + Duration::seconds(ttl_seconds)).to_rfc3339();
    let entry = CacheEntry {
        body: body.to_string(),
        expires_at: expires_at.clone(),
    };
    store.set_json(&cache_key(key), &entry)?;

    let stale = store.update_json(CACHE_INDEX_KEY, |index: &mut CacheIndex| {
        let stale: Vec<String> = index
            .iter()
            .filter(|(k, at)| k.as_str() != key && is_past(at, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &stale {
            index.remove(k);
        }
        index.insert(key.to_string(), expires_at);
        stale
    })?;
    for k in &stale {
        store.delete(&cache_key(k))?;
    }
    if !stale.is_empty() {
        tracing::debug!(evicted = stale.len(), "expired pages evicted");
    }
    Ok(())
}

/// Serves `key` from the cache, rendering and storing it on a miss.
pub fn cached_page<S, F>(store: &S, key: &str, ttl_seconds: i64, render: F) -> anyhow::Result<String>
where
    S: KvStore,
    F: FnOnce() -> anyhow::Result<String>,
{
    if let Some(body) = get_page(store, key)? {
        tracing::debug!(key, "page cache hit");
        return Ok(body);
    }

    tracing::debug!(key, "page cache miss");
    let body = render()?;
    set_page(store, key, &body, ttl_seconds)?;
    Ok(body)
}

/// Drops every cached page.
pub fn clear<S: KvStore>(store: &S) -> anyhow::Result<()> {
    let index = store.update_json(CACHE_INDEX_KEY, |index: &mut CacheIndex| std::mem::take(index))?;
    for key in index.keys() {
        store.delete(&cache_key(key))?;
    }
    store.delete(CACHE_INDEX_KEY)?;
    tracing::info!(entries = index.len(), "page cache cleared");
    Ok(())
}

/// Number of pages the cache currently tracks.
pub fn len<S: KvStore>(store: &S) -> anyhow::Result<usize> {
    Ok(store.get_json::<CacheIndex>(CACHE_INDEX_KEY)?.map(|i| i.len()).unwrap_or(0))
}
