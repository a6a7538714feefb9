//! Pawn eligibility caching.
//!
//! Eligibility splits into two phases. Volatile flags (drafted, downed,
//! mental state, ...) are re-read from the host on every call and never
//! cached. The stable half (capabilities, faction, age gate) is expensive
//! to derive, so its verdict is snapshotted and revalidated on a fixed
//! window or on an explicit invalidation from the host.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{CacheCounters, CacheStats, KernelConfig, PawnId, PawnProfile, PawnState, Tick};

use crate::eviction;

// ---------------------------------------------------------------------------
// Restricted groups
// ---------------------------------------------------------------------------

/// Secondary index over membership in groups whose members never
/// auto-equip. Membership is pushed by the host on join/leave, not polled.
///
/// Groups are matched against a known-name set and, for group types this
/// kernel has never heard of, against lowercase substring patterns.
#[derive(Debug, Clone, Default)]
pub struct RestrictedGroups {
    exact: BTreeSet<String>,
    patterns: Vec<String>,
    members: BTreeMap<PawnId, BTreeSet<String>>,
}

impl RestrictedGroups {
    pub fn new(names: &[String], patterns: &[String]) -> Self {
        Self {
            exact: names.iter().map(|name| name.to_lowercase()).collect(),
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
            members: BTreeMap::new(),
        }
    }

    /// Whether a group name marks its members as restricted.
    pub fn group_is_restricted(&self, group: &str) -> bool {
        let lowered = group.to_lowercase();
        if self.exact.contains(&lowered) {
            return true;
        }
        self.patterns.iter().any(|p| lowered.contains(p.as_str()))
    }

    /// Record a join. Non-restricted groups are ignored entirely.
    pub fn note_join(&mut self, pawn: PawnId, group: &str) {
        if !self.group_is_restricted(group) {
            return;
        }
        self.members
            .entry(pawn)
            .or_default()
            .insert(group.to_lowercase());
    }

    /// Record a leave, pruning the pawn's row once it empties.
    pub fn note_leave(&mut self, pawn: PawnId, group: &str) {
        if let Some(groups) = self.members.get_mut(&pawn) {
            groups.remove(&group.to_lowercase());
            if groups.is_empty() {
                self.members.remove(&pawn);
            }
        }
    }

    pub fn is_restricted(&self, pawn: PawnId) -> bool {
        self.members.contains_key(&pawn)
    }

    pub fn remove_pawn(&mut self, pawn: PawnId) {
        self.members.remove(&pawn);
    }

    pub fn clear_memberships(&mut self) {
        self.members.clear();
    }
}

// ---------------------------------------------------------------------------
// Validation records
// ---------------------------------------------------------------------------

/// Snapshot of the slow-changing half of a pawn's eligibility verdict.
///
/// The stable checks short-circuit: once one fails, the later flags keep
/// their permissive defaults and only the verdict matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRecord {
    pub can_manipulate: bool,
    pub violence_capable: bool,
    pub humanlike: bool,
    pub faction_ok: bool,
    pub age_ok: bool,
    pub verdict: bool,
    pub validated_tick: Tick,
    last_access: u64,
}

impl ValidationRecord {
    fn capture(profile: &PawnProfile, min_age_years: i64, now: Tick, stamp: u64) -> Self {
        let mut record = Self {
            can_manipulate: true,
            violence_capable: true,
            humanlike: true,
            faction_ok: true,
            age_ok: true,
            verdict: false,
            validated_tick: now,
            last_access: stamp,
        };

        record.can_manipulate = profile.can_manipulate;
        if !record.can_manipulate {
            return record;
        }
        record.violence_capable = profile.violence_capable;
        if !record.violence_capable {
            return record;
        }
        record.humanlike = profile.humanlike;
        if !record.humanlike {
            return record;
        }
        // Guests carry their own gear; only settled colonists auto-equip.
        record.faction_ok = profile.is_colonist && !profile.is_guest;
        if !record.faction_ok {
            return record;
        }
        record.age_ok = profile.age_years >= min_age_years;
        if !record.age_ok {
            return record;
        }
        record.verdict = true;
        record
    }
}

// ---------------------------------------------------------------------------
// Validation cache
// ---------------------------------------------------------------------------

/// Two-phase eligibility check with a bounded stable-verdict table.
#[derive(Debug, Clone)]
pub struct ValidationCache {
    records: BTreeMap<PawnId, ValidationRecord>,
    restricted: RestrictedGroups,
    revalidation_window: Tick,
    max_entries: usize,
    min_age_years: i64,
    access_counter: u64,
    counters: CacheCounters,
}

impl ValidationCache {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            records: BTreeMap::new(),
            restricted: RestrictedGroups::new(
                &config.restricted_group_names,
                &config.restricted_group_patterns,
            ),
            revalidation_window: config.revalidation_window.max(1),
            max_entries: config.validation_max_entries.max(1),
            min_age_years: config.min_equip_age_years,
            access_counter: 0,
            counters: CacheCounters::default(),
        }
    }

    /// Full eligibility check: the dynamic chain first, each failure
    /// returning false without touching the table, then the cached stable
    /// verdict.
    pub fn is_eligible(&mut self, state: &PawnState, profile: &PawnProfile, now: Tick) -> bool {
        if !state.spawned
            || state.dead
            || state.downed
            || state.drafted
            || state.in_mental_state
            || state.busy_with_critical_job
        {
            return false;
        }
        if self.restricted.is_restricted(profile.pawn_id) {
            return false;
        }
        self.stable_verdict(profile, now)
    }

    fn stable_verdict(&mut self, profile: &PawnProfile, now: Tick) -> bool {
        if let Some(record) = self.records.get(&profile.pawn_id) {
            if now.saturating_sub(record.validated_tick) < self.revalidation_window {
                self.access_counter += 1;
                let stamp = self.access_counter;
                let record = self
                    .records
                    .get_mut(&profile.pawn_id)
                    .expect("record checked above");
                record.last_access = stamp;
                self.counters.record_hit();
                return record.verdict;
            }
        }

        self.counters.record_miss();
        self.access_counter += 1;
        let record =
            ValidationRecord::capture(profile, self.min_age_years, now, self.access_counter);
        let verdict = record.verdict;
        self.records.insert(profile.pawn_id, record);
        self.evict_if_over_capacity();
        verdict
    }

    fn evict_if_over_capacity(&mut self) {
        if self.records.len() <= self.max_entries {
            return;
        }
        let batch = (self.max_entries / 4).max(1);
        let evictees = eviction::oldest_in_sample(
            self.records
                .iter()
                .map(|(pawn, record)| (*pawn, record.last_access)),
            batch,
        );
        for pawn in evictees {
            self.records.remove(&pawn);
        }
    }

    /// Host-driven invalidation for out-of-band stable changes (faction
    /// swap, capability loss, birthday crossing the age gate, ...).
    pub fn invalidate(&mut self, pawn: PawnId) -> bool {
        self.records.remove(&pawn).is_some()
    }

    /// Forget a pawn entirely: verdict and group memberships.
    pub fn remove(&mut self, pawn: PawnId) {
        self.records.remove(&pawn);
        self.restricted.remove_pawn(pawn);
    }

    pub fn record(&self, pawn: PawnId) -> Option<&ValidationRecord> {
        self.records.get(&pawn)
    }

    pub fn restricted_groups(&self) -> &RestrictedGroups {
        &self.restricted
    }

    pub fn restricted_groups_mut(&mut self) -> &mut RestrictedGroups {
        &mut self.restricted
    }

    /// Drop records past the revalidation window, returning how many went.
    pub fn cleanup_expired(&mut self, now: Tick) -> usize {
        let window = self.revalidation_window;
        let before = self.records.len();
        self.records
            .retain(|_, record| now.saturating_sub(record.validated_tick) < window);
        before - self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.restricted.clear_memberships();
        self.access_counter = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.records.len(),
            capacity: self.max_entries,
            hits: self.counters.hits,
            misses: self.counters.misses,
        }
    }
}
