//! Two-layer TTL result cache
//!
//! Layer 1 memoizes analyst verdicts per (profile, program) fingerprint;
//! layer 2 memoizes whole search outputs per profile id. Both share the
//! same cache interface, so an external shared cache can substitute the
//! in-process implementation.
//!
//! The in-process implementation is a map behind a read/write lock with a
//! single background sweeper thread that removes expired entries every
//! five minutes. Readers proceed concurrently; writers and the sweeper's
//! delete batch take the write lock.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::models::profile::CompanyProfile;
use crate::models::program::Program;

/// Interval between sweeper passes.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Cache interface: byte values with per-entry TTL.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Returns the stored bytes, or None on miss or expiry.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete(&self, key: &str);
}

// ============================================================================
// In-process implementation
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

struct Shared {
    map: RwLock<HashMap<String, Entry>>,
    closed: Mutex<bool>,
    close_signal: Condvar,
}

pub struct MemoryCache {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            map: RwLock::new(HashMap::new()),
            closed: Mutex::new(false),
            close_signal: Condvar::new(),
        });

        let sweeper_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("cache-sweeper".to_string())
            .spawn(move || sweeper_loop(sweeper_shared))
            .expect("Failed to spawn cache sweeper");

        Self { shared, sweeper: Mutex::new(Some(handle)) }
    }

    /// Stop the sweeper and wait for it to finish.
    pub fn close(&self) {
        if let Ok(mut closed) = self.shared.closed.lock() {
            *closed = true;
            self.shared.close_signal.notify_all();
        }
        if let Ok(mut handle) = self.sweeper.lock()
            && let Some(handle) = handle.take()
        {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.shared.map.read().map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.close();
    }
}

fn sweeper_loop(shared: Arc<Shared>) {
    let mut closed = match shared.closed.lock() {
        Ok(guard) => guard,
        Err(_) => return,
    };
    loop {
        if *closed {
            return;
        }
        closed = match shared.close_signal.wait_timeout(closed, SWEEP_INTERVAL) {
            Ok((guard, _)) => guard,
            Err(_) => return,
        };
        if *closed {
            return;
        }
        drop(closed);
        sweep(&shared);
        closed = match shared.closed.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
    }
}

/// Collect expired keys under the read lock, then delete the batch under
/// the write lock so readers are blocked only for the removal itself.
fn sweep(shared: &Shared) {
    let now = Instant::now();
    let expired: Vec<String> = match shared.map.read() {
        Ok(map) => map
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect(),
        Err(_) => return,
    };

    if expired.is_empty() {
        return;
    }

    if let Ok(mut map) = shared.map.write() {
        for key in &expired {
            map.remove(key);
        }
    }
    tracing::debug!("Cache sweeper removed {} expired entries", expired.len());
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.shared.map.read().ok()?;
        let entry = map.get(key)?;
        if entry.expires_at <= Instant::now() {
            // Expired entries are left for the sweeper.
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if let Ok(mut map) = self.shared.map.write() {
            map.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
        }
    }

    async fn delete(&self, key: &str) {
        if let Ok(mut map) = self.shared.map.write() {
            map.remove(key);
        }
    }
}

// ============================================================================
// Statistics wrapper
// ============================================================================

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Counts hits and misses around any [`ResultCache`].
pub struct StatsCache {
    inner: Arc<dyn ResultCache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatsCache {
    pub fn new(inner: Arc<dyn ResultCache>) -> Self {
        Self { inner, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl ResultCache for StatsCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = self.inner.get(key).await;
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.inner.set(key, value, ttl).await;
    }

    async fn delete(&self, key: &str) {
        self.inner.delete(key).await;
    }
}

// ============================================================================
// Cache keys and bundle
// ============================================================================

/// Fingerprint for the per-verdict cache: SHA-256 over the identity tuple,
/// first 16 bytes as hex. `program.updated_at` is the natural invalidation
/// key; no other monotonic timestamp enters the tuple so verdicts are
/// reusable across searches on the same catalog snapshot.
pub fn verdict_cache_key(profile: &CompanyProfile, program: &Program) -> String {
    let tuple = serde_json::json!([
        program.id,
        program.updated_at.to_rfc3339(),
        profile.name,
        profile.state,
        profile.industry,
        profile.employees,
        profile.annual_revenue,
        profile.project_topics,
        profile.is_startup,
        profile.founded_year,
    ]);

    let digest = Sha256::digest(tuple.to_string().as_bytes());
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Key for the per-search cache: the profile identity.
pub fn search_cache_key(profile_id: &str) -> String {
    format!("search:{}", profile_id)
}

/// The two cache layers as wired into the orchestrator.
pub struct ResultCaches {
    pub verdict: StatsCache,
    pub search: StatsCache,
}

impl ResultCaches {
    pub fn in_process() -> Self {
        Self {
            verdict: StatsCache::new(Arc::new(MemoryCache::new())),
            search: StatsCache::new(Arc::new(MemoryCache::new())),
        }
    }

    /// Invalidate the whole-search layer for one profile, e.g. after a
    /// profile update.
    pub async fn invalidate_search(&self, profile_id: &str) {
        self.search.delete(&search_cache_key(profile_id)).await;
    }
}

impl Default for ResultCaches {
    fn default() -> Self {
        Self::in_process()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn test_round_trip_within_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", b"wert".to_vec(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some(b"wert".to_vec()));
        cache.close();
    }

    #[tokio::test]
    async fn test_miss_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", b"wert".to_vec(), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
        cache.close();
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set("k", b"wert".to_vec(), Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.len(), 0);
        cache.close();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cache = MemoryCache::new();
        cache.close();
        cache.close();
    }

    #[tokio::test]
    async fn test_stats_wrapper_counts() {
        let stats_cache = StatsCache::new(Arc::new(MemoryCache::new()));
        stats_cache.set("a", vec![1], Duration::from_secs(60)).await;

        assert!(stats_cache.get("a").await.is_some());
        assert!(stats_cache.get("fehlt").await.is_none());
        assert!(stats_cache.get("a").await.is_some());

        let stats = stats_cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    fn fixture_profile() -> CompanyProfile {
        CompanyProfile {
            id: "p".into(),
            tenant_id: 1,
            name: "Firma".into(),
            legal_form: None,
            founded_year: Some(2019),
            state: Some("wien".into()),
            employees: Some(12),
            annual_revenue: Some(900_000),
            balance_total: None,
            industry: Some("IT".into()),
            industry_codes: vec![],
            is_startup: true,
            project_description: String::new(),
            investment_amount: None,
            project_topics: vec!["ki".into()],
            last_search_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fixture_program() -> Program {
        use crate::models::program::*;
        Program {
            id: "prog".into(),
            name: "Programm".into(),
            provider: "FFG".into(),
            funding_type: FundingType::Grant,
            funding_rate_min: 0.0,
            funding_rate_max: 0.5,
            min_amount: None,
            max_amount: None,
            target_sizes: vec![],
            target_group: TargetGroup::All,
            min_company_age: None,
            max_company_age: None,
            legal_forms: vec![],
            industries: vec![],
            excluded_industries: vec![],
            target_states: vec![],
            topics: vec![],
            requirements: String::new(),
            deadline: None,
            deadline_type: DeadlineType::Rolling,
            call_start: None,
            call_end: None,
            url: String::new(),
            guidelines_url: None,
            combinable_with: vec![],
            not_combinable_with: vec![],
            status: ProgramStatus::Active,
            is_highlight: false,
            source: String::new(),
            source_id: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let profile = fixture_profile();
        let program = fixture_program();
        let key = verdict_cache_key(&profile, &program);
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, verdict_cache_key(&profile, &program));
    }

    #[test]
    fn test_fingerprint_tracks_catalog_updates() {
        let profile = fixture_profile();
        let mut program = fixture_program();
        let before = verdict_cache_key(&profile, &program);
        program.updated_at += ChronoDuration::seconds(1);
        assert_ne!(before, verdict_cache_key(&profile, &program));
    }

    #[test]
    fn test_fingerprint_ignores_profile_timestamps() {
        let mut profile = fixture_profile();
        let program = fixture_program();
        let before = verdict_cache_key(&profile, &program);
        profile.last_search_at = Some(Utc::now());
        profile.updated_at += ChronoDuration::seconds(5);
        assert_eq!(before, verdict_cache_key(&profile, &program));
    }
}
