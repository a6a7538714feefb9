//! Weapon score caching with three-way freshness.
//!
//! A cached score is trusted only while all three hold: it is inside its
//! TTL window, the weapon has not been modified since it was computed, and
//! the pawn's scoring-relevant attributes have not changed since. The
//! latter two are table-level stamp maps rather than per-entry fields, so
//! one change notification is O(1) regardless of how many rows it kills.
//!
//! The table sits behind a mutex solely so an inspection path may read it
//! while the simulation thread works; the simulation thread is the only
//! writer.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{CacheCounters, CacheStats, KernelConfig, PawnId, Tick, WeaponId};

/// Cached outcome for one (pawn, weapon) pair. `Blocked` is the
/// "cannot use" verdict from the external equip probe and carries its own
/// shorter TTL, since permission can change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Blocked,
    Scored(f32),
}

impl ScoreOutcome {
    pub fn score(self) -> Option<f32> {
        match self {
            ScoreOutcome::Blocked => None,
            ScoreOutcome::Scored(score) => Some(score),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoreEntry {
    outcome: ScoreOutcome,
    cached_tick: Tick,
}

#[derive(Debug, Default)]
struct SubjectRow {
    entries: BTreeMap<WeaponId, ScoreEntry>,
    last_access: u64,
}

#[derive(Debug, Default)]
struct ScoreTable {
    subjects: BTreeMap<PawnId, SubjectRow>,
    /// Last tick each pawn's scoring-relevant attributes changed.
    subject_changed: BTreeMap<PawnId, Tick>,
    /// Last tick each weapon was modified.
    weapon_modified: BTreeMap<WeaponId, Tick>,
    total: usize,
    access_counter: u64,
    counters: CacheCounters,
}

/// Bounded score table keyed by (pawn, weapon).
#[derive(Debug)]
pub struct ScoreCache {
    table: Mutex<ScoreTable>,
    score_ttl: Tick,
    blocked_ttl: Tick,
    cap: usize,
    soft_cap: usize,
    hard_cap: usize,
}

impl ScoreCache {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            table: Mutex::new(ScoreTable::default()),
            score_ttl: config.score_ttl.max(1),
            blocked_ttl: config.blocked_score_ttl.max(1),
            cap: config.score_cap.max(1),
            soft_cap: config.score_soft_cap.min(config.score_cap).max(1),
            hard_cap: config.score_hard_cap.max(config.score_cap),
        }
    }

    /// The inspection path must stay readable even if a poisoned lock is
    /// ever observed, so poisoning is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, ScoreTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl_for(&self, outcome: ScoreOutcome) -> Tick {
        match outcome {
            ScoreOutcome::Blocked => self.blocked_ttl,
            ScoreOutcome::Scored(_) => self.score_ttl,
        }
    }

    fn entry_is_fresh(&self, table: &ScoreTable, pawn: PawnId, entry: &ScoreEntry, weapon: WeaponId, now: Tick) -> bool {
        if now.saturating_sub(entry.cached_tick) >= self.ttl_for(entry.outcome) {
            return false;
        }
        if table
            .weapon_modified
            .get(&weapon)
            .is_some_and(|modified| *modified > entry.cached_tick)
        {
            return false;
        }
        !table
            .subject_changed
            .get(&pawn)
            .is_some_and(|changed| *changed > entry.cached_tick)
    }

    /// Cached score lookup. `compute` runs only when no fresh entry exists;
    /// it returns `None` for a pawn that cannot use the weapon at all, and
    /// that verdict is cached too (with the shorter blocked TTL).
    ///
    /// The lock is not held across `compute`; the simulation thread is
    /// the only caller that mutates, so the check-then-store is race-free.
    pub fn score_for(
        &self,
        pawn: PawnId,
        weapon: WeaponId,
        now: Tick,
        compute: impl FnOnce() -> Option<f32>,
    ) -> Option<f32> {
        {
            let mut table = self.lock();
            let fresh = table
                .subjects
                .get(&pawn)
                .and_then(|row| row.entries.get(&weapon))
                .copied()
                .filter(|entry| self.entry_is_fresh(&table, pawn, entry, weapon, now));
            if let Some(entry) = fresh {
                table.access_counter += 1;
                let stamp = table.access_counter;
                if let Some(row) = table.subjects.get_mut(&pawn) {
                    row.last_access = stamp;
                }
                table.counters.record_hit();
                return entry.outcome.score();
            }
            table.counters.record_miss();
        }

        let outcome = match compute() {
            Some(score) => ScoreOutcome::Scored(score),
            None => ScoreOutcome::Blocked,
        };

        let mut table = self.lock();
        table.access_counter += 1;
        let stamp = table.access_counter;
        let row = table.subjects.entry(pawn).or_default();
        row.last_access = stamp;
        let replaced = row.entries.insert(
            weapon,
            ScoreEntry {
                outcome,
                cached_tick: now,
            },
        );
        if replaced.is_none() {
            table.total += 1;
        }
        outcome.score()
    }

    /// Read the cached outcome without freshness checks or recency bumps.
    pub fn peek(&self, pawn: PawnId, weapon: WeaponId) -> Option<ScoreOutcome> {
        let table = self.lock();
        table
            .subjects
            .get(&pawn)
            .and_then(|row| row.entries.get(&weapon))
            .map(|entry| entry.outcome)
    }

    /// The pawn's scoring-relevant attributes changed; every one of its
    /// cached scores is stale from `now` on.
    pub fn note_subject_changed(&self, pawn: PawnId, now: Tick) {
        self.lock().subject_changed.insert(pawn, now);
    }

    /// The weapon was modified; its cached score is stale for every pawn.
    pub fn note_weapon_modified(&self, weapon: WeaponId, now: Tick) {
        self.lock().weapon_modified.insert(weapon, now);
    }

    /// Drop a pawn's row and stamps outright (pawn destroyed).
    pub fn purge_subject(&self, pawn: PawnId) -> usize {
        let mut table = self.lock();
        table.subject_changed.remove(&pawn);
        match table.subjects.remove(&pawn) {
            Some(row) => {
                table.total -= row.entries.len();
                row.entries.len()
            }
            None => 0,
        }
    }

    /// Drop a weapon's entry from every row and its stamp (weapon gone).
    pub fn purge_weapon(&self, weapon: WeaponId) -> usize {
        let mut table = self.lock();
        table.weapon_modified.remove(&weapon);
        let mut removed = 0;
        table.subjects.retain(|_, row| {
            if row.entries.remove(&weapon).is_some() {
                removed += 1;
            }
            !row.entries.is_empty()
        });
        table.total -= removed;
        removed
    }

    /// Drop every entry that fails the three-way freshness test.
    pub fn cleanup_expired(&self, now: Tick) -> usize {
        let mut table = self.lock();
        self.retain_fresh(&mut table, now)
    }

    fn retain_fresh(&self, table: &mut ScoreTable, now: Tick) -> usize {
        let mut removed = 0;
        let weapon_modified = std::mem::take(&mut table.weapon_modified);
        let subject_changed = std::mem::take(&mut table.subject_changed);
        table.subjects.retain(|pawn, row| {
            row.entries.retain(|weapon, entry| {
                let ttl = self.ttl_for(entry.outcome);
                let fresh = now.saturating_sub(entry.cached_tick) < ttl
                    && !weapon_modified
                        .get(weapon)
                        .is_some_and(|modified| *modified > entry.cached_tick)
                    && !subject_changed
                        .get(pawn)
                        .is_some_and(|changed| *changed > entry.cached_tick);
                if !fresh {
                    removed += 1;
                }
                fresh
            });
            !row.entries.is_empty()
        });
        table.weapon_modified = weapon_modified;
        table.subject_changed = subject_changed;
        table.total -= removed;
        removed
    }

    /// Cap enforcement, staged from cheapest to most drastic:
    /// dead-subject rows, then expired entries, then least-recently-used
    /// subjects wholesale until under the soft cap. At the hard cap the
    /// table is beyond repair and is rebuilt from empty.
    pub fn enforce_caps(&self, now: Tick, is_live: impl Fn(PawnId) -> bool) -> usize {
        let mut table = self.lock();
        if table.total <= self.cap {
            return 0;
        }
        if table.total >= self.hard_cap {
            let removed = table.total;
            tracing::warn!(
                entries = removed,
                hard_cap = self.hard_cap,
                "score table blew through its hard cap; rebuilding from empty"
            );
            table.subjects.clear();
            table.subject_changed.clear();
            table.weapon_modified.clear();
            table.total = 0;
            return removed;
        }

        let mut removed = 0;

        // Stage 1: rows for pawns the host no longer knows.
        let dead: Vec<PawnId> = table
            .subjects
            .keys()
            .copied()
            .filter(|pawn| !is_live(*pawn))
            .collect();
        for pawn in dead {
            if let Some(row) = table.subjects.remove(&pawn) {
                removed += row.entries.len();
                table.total -= row.entries.len();
            }
            table.subject_changed.remove(&pawn);
        }

        // Stage 2: expired entries.
        removed += self.retain_fresh(&mut table, now);

        // Stage 3: least-recently-used subjects, whole rows at a time.
        if table.total > self.soft_cap {
            let mut ranked: Vec<(u64, PawnId)> = table
                .subjects
                .iter()
                .map(|(pawn, row)| (row.last_access, *pawn))
                .collect();
            ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
            for (_, pawn) in ranked {
                if table.total <= self.soft_cap {
                    break;
                }
                if let Some(row) = table.subjects.remove(&pawn) {
                    removed += row.entries.len();
                    table.total -= row.entries.len();
                }
            }
        }

        removed
    }

    pub fn clear(&self) {
        let mut table = self.lock();
        table.subjects.clear();
        table.subject_changed.clear();
        table.weapon_modified.clear();
        table.total = 0;
        table.access_counter = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subject_entry_count(&self, pawn: PawnId) -> usize {
        self.lock()
            .subjects
            .get(&pawn)
            .map_or(0, |row| row.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        let table = self.lock();
        CacheStats {
            entries: table.total,
            capacity: self.cap,
            hits: table.counters.hits,
            misses: table.counters.misses,
        }
    }
}
