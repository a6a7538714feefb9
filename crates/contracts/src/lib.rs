//! Cross-boundary contracts for the armory caching kernel: identifiers,
//! tick conventions, tuning knobs, and the pawn/weapon snapshots the host
//! simulation feeds into the caches.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod serde_u64_string;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Simulation ticks per in-game second.
pub const TICKS_PER_SECOND: u64 = 60;

/// Monotonic simulation tick. Host-advanced; never wall clock.
pub type Tick = u64;

/// Stable identifier for a pawn instance. Never reused within a run.
pub type PawnId = u64;

/// Stable identifier for a weapon instance. Never reused within a run.
pub type WeaponId = u64;

/// Identifier for a map. All per-map state is dropped when the map goes away.
pub type MapId = u32;

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Integer map position in cell coordinates.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct MapCell {
    pub x: i32,
    pub z: i32,
}

impl MapCell {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Squared euclidean distance, kept in integer space to avoid float drift.
    pub fn distance_squared_to(self, other: MapCell) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dz = i64::from(self.z) - i64::from(other.z);
        dx * dx + dz * dz
    }
}

impl fmt::Display for MapCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

// ---------------------------------------------------------------------------
// Weapon classification
// ---------------------------------------------------------------------------

/// Weapon category, fixed at spawn from the weapon's static definition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WeaponClass {
    MeleeBasic,
    MeleeAdvanced,
    RangedShort,
    RangedMedium,
    RangedLong,
}

impl WeaponClass {
    pub fn is_melee(self) -> bool {
        matches!(self, WeaponClass::MeleeBasic | WeaponClass::MeleeAdvanced)
    }

    pub fn is_ranged(self) -> bool {
        !self.is_melee()
    }
}

// ---------------------------------------------------------------------------
// Pawn snapshots
// ---------------------------------------------------------------------------

/// Volatile pawn flags. Re-read from the host on every eligibility call and
/// never cached; they flip far too often to be worth a table entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PawnState {
    pub spawned: bool,
    pub dead: bool,
    pub downed: bool,
    pub drafted: bool,
    pub in_mental_state: bool,
    pub busy_with_critical_job: bool,
}

/// Slow-changing pawn attributes, sampled when the stable eligibility
/// verdict is rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PawnProfile {
    #[serde(with = "serde_u64_string")]
    pub pawn_id: PawnId,
    pub map_id: MapId,
    pub can_manipulate: bool,
    pub violence_capable: bool,
    pub humanlike: bool,
    pub is_colonist: bool,
    pub is_guest: bool,
    pub age_years: i64,
}

/// Which slow-changing pawn attribute changed out of band. Drives targeted
/// cache invalidation instead of waiting for the revalidation window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PawnAttribute {
    Faction,
    Capability,
    AgeThreshold,
    GuestStatus,
    CombatSkill,
    HealthState,
}

impl PawnAttribute {
    /// Whether this change invalidates the cached stable eligibility verdict.
    /// Skill and health changes only move scores, not eligibility.
    pub fn affects_eligibility(self) -> bool {
        matches!(
            self,
            PawnAttribute::Faction
                | PawnAttribute::Capability
                | PawnAttribute::AgeThreshold
                | PawnAttribute::GuestStatus
        )
    }
}

// ---------------------------------------------------------------------------
// Weapon snapshots
// ---------------------------------------------------------------------------

/// Static weapon attributes sampled at spawn. The category never changes for
/// a given instance, so it is computed once and bucketed at insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeaponProfile {
    #[serde(with = "serde_u64_string")]
    pub weapon_id: WeaponId,
    pub map_id: MapId,
    pub class: WeaponClass,
    pub position: MapCell,
    /// Position of the container holding the weapon, when stored rather
    /// than lying loose. Stored weapons index at the container's cell.
    pub container_position: Option<MapCell>,
}

impl WeaponProfile {
    /// The position the spatial index files this weapon under.
    pub fn index_position(&self) -> MapCell {
        self.container_position.unwrap_or(self.position)
    }
}

// ---------------------------------------------------------------------------
// Tuning configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for every cache table. All windows are in ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KernelConfig {
    pub schema_version: String,
    /// Stable eligibility verdicts older than this are recomputed.
    #[serde(default = "default_revalidation_window")]
    pub revalidation_window: Tick,
    #[serde(default = "default_validation_max_entries")]
    pub validation_max_entries: usize,
    /// TTL for normal numeric scores.
    #[serde(default = "default_score_ttl")]
    pub score_ttl: Tick,
    /// Shorter TTL for "cannot use" outcomes, since eligibility can change.
    #[serde(default = "default_blocked_score_ttl")]
    pub blocked_score_ttl: Tick,
    /// Entry count that triggers staged score-table cleanup.
    #[serde(default = "default_score_cap")]
    pub score_cap: usize,
    /// Staged cleanup evicts least-recently-used subjects down to this.
    #[serde(default = "default_score_soft_cap")]
    pub score_soft_cap: usize,
    /// Last-resort safety valve: at this size the score table is cleared.
    #[serde(default = "default_score_hard_cap")]
    pub score_hard_cap: usize,
    #[serde(default = "default_equip_check_ttl")]
    pub equip_check_ttl: Tick,
    #[serde(default = "default_equip_check_max_entries")]
    pub equip_check_max_entries: usize,
    /// Side length of one spatial bucket, in map cells.
    #[serde(default = "default_cell_size")]
    pub cell_size: i32,
    /// Progressive search radii, tried inner-first.
    #[serde(default = "default_search_radii")]
    pub search_radii: Vec<i32>,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: Tick,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: Tick,
    /// Pawns younger than this fail the stable age gate.
    #[serde(default = "default_min_equip_age_years")]
    pub min_equip_age_years: i64,
    /// Group names whose members never auto-equip. Matched exactly,
    /// case-insensitive.
    #[serde(default)]
    pub restricted_group_names: Vec<String>,
    /// Lowercase substrings that mark a group as restricted, for groups
    /// added by systems this kernel has never heard of.
    #[serde(default)]
    pub restricted_group_patterns: Vec<String>,
}

fn default_revalidation_window() -> Tick {
    41 * TICKS_PER_SECOND
}
fn default_validation_max_entries() -> usize {
    2_048
}
fn default_score_ttl() -> Tick {
    2_500
}
fn default_blocked_score_ttl() -> Tick {
    600
}
fn default_score_cap() -> usize {
    5_000
}
fn default_score_soft_cap() -> usize {
    4_000
}
fn default_score_hard_cap() -> usize {
    10_000
}
fn default_equip_check_ttl() -> Tick {
    300
}
fn default_equip_check_max_entries() -> usize {
    1_024
}
fn default_cell_size() -> i32 {
    20
}
fn default_search_radii() -> Vec<i32> {
    vec![12, 25, 40]
}
fn default_reconcile_interval() -> Tick {
    2_000
}
fn default_cleanup_interval() -> Tick {
    600
}
fn default_min_equip_age_years() -> i64 {
    13
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            revalidation_window: default_revalidation_window(),
            validation_max_entries: default_validation_max_entries(),
            score_ttl: default_score_ttl(),
            blocked_score_ttl: default_blocked_score_ttl(),
            score_cap: default_score_cap(),
            score_soft_cap: default_score_soft_cap(),
            score_hard_cap: default_score_hard_cap(),
            equip_check_ttl: default_equip_check_ttl(),
            equip_check_max_entries: default_equip_check_max_entries(),
            cell_size: default_cell_size(),
            search_radii: default_search_radii(),
            reconcile_interval: default_reconcile_interval(),
            cleanup_interval: default_cleanup_interval(),
            min_equip_age_years: default_min_equip_age_years(),
            restricted_group_names: vec![
                "prisoners".to_string(),
                "slaves".to_string(),
                "visitors".to_string(),
            ],
            restricted_group_patterns: vec![
                "noweapon".to_string(),
                "pacifist".to_string(),
                "unarmed".to_string(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Running hit/miss counters for one cache table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
}

impl CacheCounters {
    pub fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub fn record_miss(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Point-in-time statistics for one cache table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        CacheCounters {
            hits: self.hits,
            misses: self.misses,
        }
        .hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entries={}/{} hits={} misses={} hit_rate={:.2}",
            self.entries,
            self.capacity,
            self.hits,
            self.misses,
            self.hit_rate()
        )
    }
}

/// Aggregate statistics across every table the kernel owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct KernelStats {
    pub validation: CacheStats,
    pub scores: CacheStats,
    pub equip_checks: CacheStats,
    pub tracked_weapons: usize,
    pub active_reservations: usize,
}
