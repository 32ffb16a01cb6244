//! Per-request access orchestration.
//!
//! The gate loads an entry, decides on a snapshot of it, and then applies
//! the resulting change (new training rules or a counter bump) under a
//! per-entry lock. The change is applied to a fresh copy read inside the
//! lock, so concurrent requests to the same entry never lose updates.

use super::error::{AccessControlError, AccessControlResult};
use super::evaluator::{Decision, Evaluator};
use super::geofence::Geofence;
use super::lookup::LookupContext;
use super::rule::Rule;
use crate::modules::entry_store::{Entry, EntryStore};
use chrono::Utc;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result type for gate operations.
pub type GateResult<T> = AccessControlResult<T>;

/// Statistics for the access gate.
#[derive(Debug, Default)]
pub struct GateStats {
    /// Total requests checked.
    pub requests_checked: AtomicU64,
    /// Requests granted.
    pub requests_granted: AtomicU64,
    /// Requests denied by rules or expiration.
    pub requests_denied: AtomicU64,
    /// Requests absorbed by training.
    pub training_captures: AtomicU64,
    /// Requests to expired entries.
    pub expired_hits: AtomicU64,
    /// Requests for unknown entries.
    pub not_found: AtomicU64,
    /// Updates the store refused.
    pub commit_failures: AtomicU64,
}

impl GateStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Train { .. } => {
                self.training_captures.fetch_add(1, Ordering::Relaxed);
            },
            Outcome::Expired => {
                self.expired_hits.fetch_add(1, Ordering::Relaxed);
                self.requests_denied.fetch_add(1, Ordering::Relaxed);
            },
            Outcome::Denied => {
                self.requests_denied.fetch_add(1, Ordering::Relaxed);
            },
            Outcome::Granted => {
                self.requests_granted.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

/// What a request does to its entry.
#[derive(Debug, Clone, Copy)]
enum Outcome {
    Train { location: Option<Geofence> },
    Expired,
    Denied,
    Granted,
}

/// Decides requests for entries and records the outcome on them.
#[derive(Clone)]
pub struct AccessGate {
    store: Arc<dyn EntryStore>,
    lookups: Arc<LookupContext>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    stats: Arc<GateStats>,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("lookups", &self.lookups)
            .field("locked_entries", &self.locks.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl AccessGate {
    /// Create a gate over `store` using `lookups` for rule evaluation.
    pub fn new(store: Arc<dyn EntryStore>, lookups: LookupContext) -> Self {
        Self {
            store,
            lookups: Arc::new(lookups),
            locks: Arc::new(DashMap::new()),
            stats: Arc::new(GateStats::new()),
        }
    }

    /// Gate statistics.
    #[must_use]
    pub fn stats(&self) -> &GateStats {
        &self.stats
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EntryStore> {
        &self.store
    }

    /// Decide whether `ip` may access the entry `name`.
    ///
    /// Returns the entry, with its access counted, when access is granted.
    /// Every denial, including an unknown name, is `Ok(None)`. Store errors
    /// are returned as `Err` and must be treated as a denial.
    pub async fn access(&self, name: &str, ip: IpAddr) -> GateResult<Option<Entry>> {
        self.stats.requests_checked.fetch_add(1, Ordering::Relaxed);

        let Some(snapshot) = self.store.get(name).await? else {
            debug!(name, %ip, "Unknown entry");
            self.stats.not_found.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let outcome = self.decide(&snapshot, ip).await;

        // Applied in its own task so a dropped connection cannot abandon it.
        let gate = self.clone();
        let name = name.to_string();
        tokio::spawn(async move { gate.apply(&name, ip, outcome).await })
            .await
            .map_err(|e| AccessControlError::Task(e.to_string()))?
    }

    async fn training_location(&self, name: &str, ip: IpAddr) -> Option<Geofence> {
        match self.lookups.resolve_geo(ip).await {
            Ok(location) => Some(location),
            Err(e) => {
                debug!(name, %ip, "No location for training: {e}");
                None
            },
        }
    }

    async fn decide(&self, entry: &Entry, ip: IpAddr) -> Outcome {
        if entry.training {
            return Outcome::Train {
                location: self.training_location(&entry.name, ip).await,
            };
        }

        if entry.is_expired() {
            return Outcome::Expired;
        }

        match Evaluator::new(&self.lookups, ip)
            .evaluate_detailed(&entry.rules)
            .await
        {
            Decision::Allow { .. } => Outcome::Granted,
            Decision::Deny { rule_index } => {
                debug!(name = %entry.name, %ip, rule = rule_index, "Denied by rule");
                Outcome::Denied
            },
            Decision::FailClosed { rule_index, reason } => {
                debug!(name = %entry.name, %ip, rule = rule_index, %reason, "Denied by unavailable data");
                Outcome::Denied
            },
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn apply(&self, name: &str, ip: IpAddr, outcome: Outcome) -> GateResult<Option<Entry>> {
        let lock = self.lock_for(name);
        let result = {
            let _guard = lock.lock().await;
            self.apply_locked(name, ip, outcome).await
        };
        drop(lock);

        // Drop the slot once no other request holds or waits on it.
        self.locks
            .remove_if(name, |_, slot| Arc::strong_count(slot) == 1);

        result
    }

    async fn apply_locked(
        &self,
        name: &str,
        ip: IpAddr,
        outcome: Outcome,
    ) -> GateResult<Option<Entry>> {
        let Some(mut entry) = self.store.get(name).await? else {
            self.stats.not_found.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        // The entry may have changed since the snapshot was taken.
        let outcome = match outcome {
            Outcome::Train { .. } if !entry.training => Outcome::Denied,
            Outcome::Granted if entry.training => Outcome::Train {
                location: self.training_location(name, ip).await,
            },
            Outcome::Granted if entry.is_expired() => Outcome::Expired,
            other => other,
        };

        match outcome {
            Outcome::Train { location } => {
                let comment = format!(
                    "Automatically added by training on {}",
                    Utc::now().to_rfc2822()
                );
                entry
                    .rules
                    .push(Rule::address(ip).with_comment(comment.clone()));
                if let Some(location) = location {
                    entry
                        .rules
                        .push(Rule::geofence(location).with_comment(comment));
                }
            },
            Outcome::Expired | Outcome::Denied => entry.denied_count += 1,
            Outcome::Granted => entry.access_count += 1,
        }

        if let Err(e) = self.store.commit(&entry).await {
            error!(name, %ip, "Failed to update entry: {e}");
            self.stats.commit_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        self.stats.record(&outcome);

        match outcome {
            Outcome::Granted => {
                info!(name, %ip, access_count = entry.access_count, "Granted access");
                Ok(Some(entry))
            },
            Outcome::Train { .. } => {
                info!(name, %ip, rules = entry.rules.len(), "Captured request for training");
                Ok(None)
            },
            Outcome::Expired => {
                warn!(name, %ip, "Access restricted to expired entry");
                Ok(None)
            },
            Outcome::Denied => {
                warn!(name, %ip, "Access restricted by rules");
                Ok(None)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::access_control::error::LookupError;
    use crate::modules::access_control::lookup::GeoResolver;
    use crate::modules::access_control::rule::RuleKind;
    use crate::modules::access_control::RuleSet;
    use crate::modules::entry_store::{
        EntryTarget, MemoryStore, StoreError, StoreResult,
    };
    use async_trait::async_trait;
    use chrono::Duration;

    struct FixedGeo(Geofence);

    #[async_trait]
    impl GeoResolver for FixedGeo {
        async fn locate(&self, _ip: IpAddr) -> Result<Geofence, LookupError> {
            Ok(self.0)
        }
    }

    /// Reads work, commits always fail.
    #[derive(Default)]
    struct ReadOnlyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl EntryStore for ReadOnlyStore {
        async fn get(&self, name: &str) -> StoreResult<Option<Entry>> {
            self.inner.get(name).await
        }

        async fn commit(&self, _entry: &Entry) -> StoreResult<()> {
            Err(StoreError::Backend("read-only".to_string()))
        }

        async fn insert(&self, entry: Entry) -> StoreResult<()> {
            self.inner.insert(entry).await
        }

        async fn remove(&self, name: &str) -> StoreResult<Option<Entry>> {
            self.inner.remove(name).await
        }

        async fn list(&self) -> StoreResult<Vec<String>> {
            self.inner.list().await
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn entry(name: &str) -> Entry {
        Entry::new(
            name,
            EntryTarget::Redirect {
                url: "https://example.com/".to_string(),
            },
        )
    }

    async fn gate_with(entries: Vec<Entry>, lookups: LookupContext) -> AccessGate {
        let store = MemoryStore::new();
        for entry in entries {
            store.insert(entry).await.unwrap();
        }
        AccessGate::new(Arc::new(store), lookups)
    }

    async fn stored(gate: &AccessGate, name: &str) -> Entry {
        gate.store().get(name).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_entry_denied() {
        let gate = gate_with(vec![], LookupContext::new()).await;
        assert!(gate.access("nope", ip("1.2.3.4")).await.unwrap().is_none());
        assert_eq!(gate.stats().not_found.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_granted_counts_access() {
        let gate = gate_with(vec![entry("doc")], LookupContext::new()).await;

        let granted = gate.access("doc", ip("1.2.3.4")).await.unwrap().unwrap();
        assert_eq!(granted.access_count, 1);
        assert_eq!(stored(&gate, "doc").await.access_count, 1);
        assert_eq!(gate.stats().requests_granted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_denied_counts_denial() {
        let doc = entry("doc").with_rules(RuleSet::parse("!*\n10.0.0.0/8"));
        let gate = gate_with(vec![doc], LookupContext::new()).await;

        assert!(gate.access("doc", ip("10.1.2.3")).await.unwrap().is_none());
        assert!(gate.access("doc", ip("8.8.8.8")).await.unwrap().is_some());

        let doc = stored(&gate, "doc").await;
        assert_eq!(doc.denied_count, 1);
        assert_eq!(doc.access_count, 1);
    }

    #[tokio::test]
    async fn test_training_adds_address_rules() {
        let gate = gate_with(vec![entry("doc").with_training(true)], LookupContext::new()).await;

        for addr in ["1.1.1.1", "2.2.2.2", "3.3.3.3"] {
            assert!(gate.access("doc", ip(addr)).await.unwrap().is_none());
        }

        let doc = stored(&gate, "doc").await;
        assert_eq!(doc.rules.len(), 3);
        assert_eq!(doc.access_count, 0);
        assert_eq!(doc.denied_count, 0);
        for (rule, addr) in doc.rules.iter().zip(["1.1.1.1", "2.2.2.2", "3.3.3.3"]) {
            assert!(matches!(rule.kind, RuleKind::Address(a) if a == ip(addr)));
            assert!(rule
                .comment
                .as_deref()
                .unwrap()
                .starts_with("Automatically added by training on "));
        }
        assert_eq!(gate.stats().training_captures.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_training_adds_geofence_when_located() {
        let fence = Geofence::new(52.52, 13.405, 20_000.0);
        let lookups = LookupContext::new().with_geo(Arc::new(FixedGeo(fence)));
        let gate = gate_with(vec![entry("doc").with_training(true)], lookups).await;

        gate.access("doc", ip("1.1.1.1")).await.unwrap();
        gate.access("doc", ip("2.2.2.2")).await.unwrap();

        let doc = stored(&gate, "doc").await;
        assert_eq!(doc.rules.len(), 4);
        assert!(matches!(doc.rules.rules()[1].kind, RuleKind::Geofence(g) if g == fence));

        // Trained rules deny the trained addresses once training stops.
        let mut doc = doc;
        doc.training = false;
        gate.store().commit(&doc).await.unwrap();
        assert!(gate.access("doc", ip("1.1.1.1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_by_limit() {
        let gate = gate_with(vec![entry("doc").with_access_limit(2)], LookupContext::new()).await;

        assert!(gate.access("doc", ip("1.1.1.1")).await.unwrap().is_some());
        assert!(gate.access("doc", ip("1.1.1.1")).await.unwrap().is_some());
        assert!(gate.access("doc", ip("1.1.1.1")).await.unwrap().is_none());

        let doc = stored(&gate, "doc").await;
        assert_eq!(doc.access_count, 2);
        assert_eq!(doc.denied_count, 1);
        assert_eq!(gate.stats().expired_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_expired_by_date() {
        let doc = entry("doc").with_expiry(Utc::now() - Duration::minutes(1));
        let gate = gate_with(vec![doc], LookupContext::new()).await;

        assert!(gate.access("doc", ip("1.1.1.1")).await.unwrap().is_none());
        assert_eq!(stored(&gate, "doc").await.denied_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_lose_no_updates() {
        let gate = gate_with(vec![entry("doc")], LookupContext::new()).await;

        let mut handles = Vec::new();
        for i in 0..50u8 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.access("doc", IpAddr::from([10, 0, 0, i])).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        assert_eq!(stored(&gate, "doc").await.access_count, 50);
    }

    #[tokio::test]
    async fn test_concurrent_limit_is_respected() {
        let gate = gate_with(vec![entry("doc").with_access_limit(5)], LookupContext::new()).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.access("doc", ip("1.1.1.1")).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                granted += 1;
            }
        }

        assert_eq!(granted, 5);
        let doc = stored(&gate, "doc").await;
        assert_eq!(doc.access_count, 5);
        assert_eq!(doc.denied_count, 15);
    }

    #[tokio::test]
    async fn test_commit_failure_is_an_error() {
        let store = ReadOnlyStore::default();
        store.insert(entry("doc")).await.unwrap();
        let gate = AccessGate::new(Arc::new(store), LookupContext::new());

        let result = gate.access("doc", ip("1.1.1.1")).await;
        assert!(matches!(result, Err(AccessControlError::Store(_))));
        assert_eq!(gate.stats().commit_failures.load(Ordering::Relaxed), 1);
        assert_eq!(gate.stats().requests_granted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_training_enabled_after_snapshot_still_locates() {
        let fence = Geofence::new(48.85, 2.35, 5_000.0);
        let lookups = LookupContext::new().with_geo(Arc::new(FixedGeo(fence)));
        let gate = gate_with(vec![entry("doc")], lookups).await;

        // Decided as granted, then switched to training before the update.
        let outcome = gate.decide(&stored(&gate, "doc").await, ip("1.1.1.1")).await;
        assert!(matches!(outcome, Outcome::Granted));
        let mut doc = stored(&gate, "doc").await;
        doc.training = true;
        gate.store().commit(&doc).await.unwrap();

        assert!(gate.apply("doc", ip("1.1.1.1"), outcome).await.unwrap().is_none());

        let doc = stored(&gate, "doc").await;
        assert_eq!(doc.access_count, 0);
        assert_eq!(doc.rules.len(), 2);
        assert!(matches!(doc.rules.rules()[0].kind, RuleKind::Address(a) if a == ip("1.1.1.1")));
        assert!(matches!(doc.rules.rules()[1].kind, RuleKind::Geofence(g) if g == fence));
    }

    #[tokio::test]
    async fn test_lock_slots_are_released() {
        let gate = gate_with(vec![entry("a"), entry("b")], LookupContext::new()).await;

        gate.access("a", ip("1.1.1.1")).await.unwrap();
        gate.access("b", ip("1.1.1.1")).await.unwrap();
        gate.access("gone", ip("1.1.1.1")).await.unwrap();
        assert!(gate.locks.is_empty());

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.access("a", IpAddr::from([10, 0, 0, i])).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(gate.locks.is_empty());
        assert_eq!(stored(&gate, "a").await.access_count, 21);
    }
}
