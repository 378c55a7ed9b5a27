//! Lazily refreshed group membership cache.
//!
//! Each group key moves through `Absent → Loading → Populated`; explicit
//! invalidation sends it back to `Absent`. Snapshots are only ever replaced
//! whole, never patched.
//!
//! Lookups that miss trigger exactly one forced refresh and one retry. This
//! covers the common race of a just-joined member against a stale snapshot
//! without ever looping.
//!
//! Concurrent fetches for the same group are single-flight: every caller that
//! arrives while a fetch is in flight awaits the same shared future instead of
//! issuing another host call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use ntbridge_core::{BridgeError, BridgeResult};

use crate::model::GroupMember;

// =============================================================================
// MemberSnapshot
// =============================================================================

/// A point-in-time member list, ordered as the host returned it and keyed by
/// uid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberSnapshot {
    members: Vec<GroupMember>,
    by_uid: HashMap<String, usize>,
}

impl MemberSnapshot {
    /// Builds a snapshot from members in host order.
    ///
    /// A later record with a repeated uid replaces the earlier one in place.
    pub fn from_members(members: impl IntoIterator<Item = GroupMember>) -> Self {
        let mut snapshot = Self::default();
        for member in members {
            match snapshot.by_uid.get(&member.uid) {
                Some(&index) => snapshot.members[index] = member,
                None => {
                    snapshot
                        .by_uid
                        .insert(member.uid.clone(), snapshot.members.len());
                    snapshot.members.push(member);
                }
            }
        }
        snapshot
    }

    /// Parses the host's `infos` value: either an object keyed by uid or an
    /// array of member records.
    pub fn from_infos(infos: &Value) -> BridgeResult<Self> {
        let members = match infos {
            Value::Object(map) => map
                .values()
                .map(|v| serde_json::from_value(v.clone()))
                .collect::<Result<Vec<GroupMember>, _>>()?,
            Value::Array(items) => items
                .iter()
                .map(|v| serde_json::from_value(v.clone()))
                .collect::<Result<Vec<GroupMember>, _>>()?,
            Value::Null => Vec::new(),
            other => {
                return Err(BridgeError::Serialization(format!(
                    "unexpected member infos: {other}"
                )));
            }
        };
        Ok(Self::from_members(members))
    }

    /// Finds a member by identity.
    ///
    /// A purely numeric key is matched against members' numeric `uin`; any
    /// other key is matched against the uid.
    pub fn find(&self, key: &str) -> Option<&GroupMember> {
        if is_numeric(key) {
            self.members.iter().find(|m| m.uin == key)
        } else {
            self.by_uid.get(key).map(|&index| &self.members[index])
        }
    }

    /// Members in host order.
    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn is_numeric(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// MemberFetcher
// =============================================================================

/// Source of full member snapshots.
#[async_trait]
pub trait MemberFetcher: Send + Sync {
    /// Fetches the complete current member list of `group`.
    async fn fetch_members(&self, group: &str) -> BridgeResult<MemberSnapshot>;
}

// =============================================================================
// Cache state
// =============================================================================

/// Lifecycle of one group key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing cached and nothing in flight.
    Absent,
    /// First fetch in flight.
    Loading,
    /// A snapshot is cached.
    Populated,
}

/// Status of one group key, separate from lookup results.
///
/// Lookups fold fetch failures into "not found"; this is where a caller sees
/// whether the group was never loaded or the host failed.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub state: CacheState,
    /// A forced refresh is in flight over a cached snapshot.
    pub refreshing: bool,
    /// The most recent fetch failure, cleared by the next success.
    pub last_error: Option<BridgeError>,
}

type FetchFuture = Shared<BoxFuture<'static, Result<Arc<MemberSnapshot>, BridgeError>>>;

#[derive(Default)]
struct Slot {
    snapshot: Option<Arc<MemberSnapshot>>,
    inflight: Option<(u64, FetchFuture)>,
    last_error: Option<BridgeError>,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

// =============================================================================
// MemberCache
// =============================================================================

/// Per-group member cache with single-retry refresh.
///
/// Owned explicitly by whoever needs it; nothing here is process-global.
pub struct MemberCache {
    fetcher: Arc<dyn MemberFetcher>,
    slots: Slots,
    generation: AtomicU64,
}

impl MemberCache {
    /// Creates an empty cache over `fetcher`.
    pub fn new(fetcher: Arc<dyn MemberFetcher>) -> Self {
        Self {
            fetcher,
            slots: Arc::default(),
            generation: AtomicU64::new(1),
        }
    }

    /// Looks up `member` (uin or uid) in `group`.
    ///
    /// Returns `None` if the group cannot be fetched, or if the member is
    /// still missing after one forced refresh.
    pub async fn get(&self, group: &str, member: &str) -> Option<GroupMember> {
        let snapshot = self.load(group).await?;
        if let Some(found) = snapshot.find(member) {
            return Some(found.clone());
        }

        debug!(group = %group, member = %member, "Member not cached, refreshing group");
        let snapshot = self.refresh(group).await.ok()?;
        snapshot.find(member).cloned()
    }

    /// The cached snapshot for `group`, fetching it if absent.
    pub async fn load(&self, group: &str) -> Option<Arc<MemberSnapshot>> {
        let fetch = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(group.to_string()).or_default();
            if let Some(snapshot) = &slot.snapshot {
                return Some(Arc::clone(snapshot));
            }
            self.join_or_start(group, slot)
        };
        fetch.await.ok()
    }

    /// Re-fetches the full snapshot of `group`, joining a fetch that is
    /// already in flight.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self, group: &str) -> BridgeResult<Arc<MemberSnapshot>> {
        let fetch = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(group.to_string()).or_default();
            self.join_or_start(group, slot)
        };
        fetch.await
    }

    /// Replaces the snapshot of `group` wholesale.
    ///
    /// The only write path for membership data learned from other sources.
    /// A fetch in flight still answers its callers but no longer overwrites
    /// this snapshot.
    pub fn replace(&self, group: &str, snapshot: MemberSnapshot) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(group.to_string()).or_default();
        slot.snapshot = Some(Arc::new(snapshot));
        slot.inflight = None;
        slot.last_error = None;
    }

    /// The cached snapshot, without fetching.
    pub fn snapshot(&self, group: &str) -> Option<Arc<MemberSnapshot>> {
        self.slots
            .lock()
            .get(group)
            .and_then(|slot| slot.snapshot.clone())
    }

    /// Drops everything cached for `group`.
    pub fn invalidate(&self, group: &str) {
        if self.slots.lock().remove(group).is_some() {
            debug!(group = %group, "Invalidated member cache");
        }
    }

    /// Drops every group.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    /// The state of `group`.
    pub fn status(&self, group: &str) -> CacheStatus {
        let slots = self.slots.lock();
        let Some(slot) = slots.get(group) else {
            return CacheStatus {
                state: CacheState::Absent,
                refreshing: false,
                last_error: None,
            };
        };

        let state = match (&slot.snapshot, &slot.inflight) {
            (Some(_), _) => CacheState::Populated,
            (None, Some(_)) => CacheState::Loading,
            (None, None) => CacheState::Absent,
        };
        CacheStatus {
            state,
            refreshing: slot.snapshot.is_some() && slot.inflight.is_some(),
            last_error: slot.last_error.clone(),
        }
    }

    fn join_or_start(&self, group: &str, slot: &mut Slot) -> FetchFuture {
        if let Some((_, fetch)) = &slot.inflight {
            return fetch.clone();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let fetcher = Arc::clone(&self.fetcher);
        let slots = Arc::clone(&self.slots);
        let group = group.to_string();

        debug!(group = %group, "Fetching group members");
        let fetch = async move {
            let result = fetcher.fetch_members(&group).await.map(Arc::new);

            let mut slots = slots.lock();
            if let Some(slot) = slots.get_mut(&group)
                && slot.inflight.as_ref().is_some_and(|(g, _)| *g == generation)
            {
                slot.inflight = None;
                match &result {
                    Ok(snapshot) => {
                        slot.snapshot = Some(Arc::clone(snapshot));
                        slot.last_error = None;
                    }
                    Err(e) => {
                        warn!(group = %group, error = %e, "Failed to fetch group members");
                        slot.last_error = Some(e.clone());
                    }
                }
            }
            result
        }
        .boxed()
        .shared();

        slot.inflight = Some((generation, fetch.clone()));
        fetch
    }
}

impl std::fmt::Debug for MemberCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberCache")
            .field("groups", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Serves a scripted sequence of snapshots, one per fetch; the last one
    /// repeats.
    struct ScriptedFetcher {
        fetches: AtomicUsize,
        script: Vec<BridgeResult<Vec<GroupMember>>>,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<BridgeResult<Vec<GroupMember>>>) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                script,
                delay: Duration::ZERO,
            })
        }

        fn delayed(script: Vec<BridgeResult<Vec<GroupMember>>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                script,
                delay,
            })
        }

        fn count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MemberFetcher for ScriptedFetcher {
        async fn fetch_members(&self, _group: &str) -> BridgeResult<MemberSnapshot> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let step = &self.script[n.min(self.script.len() - 1)];
            step.clone().map(MemberSnapshot::from_members)
        }
    }

    fn ab() -> Vec<GroupMember> {
        vec![GroupMember::new("u_a", "1001"), GroupMember::new("u_b", "1002")]
    }

    fn cache(fetcher: &Arc<ScriptedFetcher>) -> MemberCache {
        MemberCache::new(Arc::clone(fetcher) as Arc<dyn MemberFetcher>)
    }

    #[tokio::test]
    async fn test_second_hit_does_not_fetch() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ab())]);
        let cache = cache(&fetcher);

        assert_eq!(cache.get("g1", "u_a").await.unwrap().uin, "1001");
        assert_eq!(cache.get("g1", "u_a").await.unwrap().uin, "1001");
        assert_eq!(fetcher.count(), 1);
        assert_eq!(cache.status("g1").state, CacheState::Populated);
    }

    #[tokio::test]
    async fn test_missing_member_refreshes_exactly_once() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ab())]);
        let cache = cache(&fetcher);

        assert!(cache.get("g1", "u_x").await.is_none());
        assert_eq!(fetcher.count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_finds_just_joined_member() {
        let mut joined = ab();
        joined.push(GroupMember::new("u_c", "1003"));
        let fetcher = ScriptedFetcher::new(vec![Ok(ab()), Ok(joined)]);
        let cache = cache(&fetcher);

        assert!(cache.get("g1", "u_a").await.is_some());
        assert_eq!(cache.get("g1", "1003").await.unwrap().uid, "u_c");
        assert_eq!(fetcher.count(), 2);
        assert_eq!(cache.snapshot("g1").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_numeric_key_matches_uin_other_keys_match_uid() {
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![
            GroupMember::new("u_abc", "123"),
            GroupMember::new("456", "789"),
        ])]);
        let cache = cache(&fetcher);

        assert_eq!(cache.get("g1", "123").await.unwrap().uid, "u_abc");
        assert_eq!(cache.get("g1", "u_abc").await.unwrap().uin, "123");
        // "456" is numeric, so it is compared with uins, not map keys.
        assert!(cache.get("g1", "456").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_first_fetch_stays_absent() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(BridgeError::transport(1, "group not found")),
            Ok(ab()),
        ]);
        let cache = cache(&fetcher);

        assert!(cache.get("g1", "u_a").await.is_none());
        let status = cache.status("g1");
        assert_eq!(status.state, CacheState::Absent);
        assert!(matches!(status.last_error, Some(BridgeError::Transport { code: 1, .. })));

        assert!(cache.get("g1", "u_a").await.is_some());
        assert!(cache.status("g1").last_error.is_none());
        assert_eq!(fetcher.count(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ab()), Err(BridgeError::NotConnected)]);
        let cache = cache(&fetcher);

        assert!(cache.get("g1", "u_x").await.is_none());
        assert_eq!(cache.snapshot("g1").unwrap().len(), 2);
        assert!(cache.status("g1").last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_fetch() {
        let fetcher = ScriptedFetcher::delayed(vec![Ok(ab())], Duration::from_millis(50));
        let cache = Arc::new(cache(&fetcher));

        let lookups: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let key = if i % 2 == 0 { "u_a" } else { "1002" };
                tokio::spawn(async move { cache.get("g1", key).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.status("g1").state, CacheState::Loading);

        for lookup in lookups {
            assert!(lookup.await.unwrap().is_some());
        }
        assert_eq!(fetcher.count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_returns_to_absent() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ab())]);
        let cache = cache(&fetcher);

        cache.get("g1", "u_a").await.unwrap();
        cache.invalidate("g1");
        assert_eq!(cache.status("g1").state, CacheState::Absent);

        cache.get("g1", "u_a").await.unwrap();
        assert_eq!(fetcher.count(), 2);
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_snapshot() {
        let fetcher = ScriptedFetcher::new(vec![Ok(ab())]);
        let cache = cache(&fetcher);

        cache.replace(
            "g1",
            MemberSnapshot::from_members(vec![GroupMember::new("u_z", "9")]),
        );
        assert_eq!(cache.get("g1", "9").await.unwrap().uid, "u_z");
        assert_eq!(fetcher.count(), 0);
        assert!(cache.snapshot("g1").unwrap().find("u_a").is_none());
    }

    #[test]
    fn test_snapshot_from_infos_object_and_array() {
        let object = serde_json::json!({
            "u_a": { "uid": "u_a", "uin": "1" },
            "u_b": { "uid": "u_b", "uin": "2" }
        });
        let array = serde_json::json!([{ "uid": "u_a", "uin": "1" }]);

        assert_eq!(MemberSnapshot::from_infos(&object).unwrap().len(), 2);
        assert_eq!(MemberSnapshot::from_infos(&array).unwrap().len(), 1);
        assert!(MemberSnapshot::from_infos(&Value::Null).unwrap().is_empty());
        assert!(MemberSnapshot::from_infos(&serde_json::json!("x")).is_err());
    }
}
