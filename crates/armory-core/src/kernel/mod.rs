//! The coordinator. One `ArmoryKernel` owns every table (there are no
//! process-level statics), so tests and multi-run hosts can hold
//! independent instances. All reads of the simulation clock go through
//! the injected `TickSource`.

mod inspect;
mod lifecycle;
mod maintenance;

use std::collections::BTreeMap;
use std::rc::Rc;

use contracts::{KernelConfig, MapCell, MapId, PawnId, Tick, WeaponClass, WeaponId};

use crate::cache::TtlCache;
use crate::clock::TickSource;
use crate::host::{ScoreAdjuster, WorldBridge};
use crate::reservation::ReservationBook;
use crate::score::ScoreCache;
use crate::spatial::WeaponGrid;
use crate::validation::ValidationCache;

pub struct ArmoryKernel {
    config: KernelConfig,
    clock: Rc<dyn TickSource>,
    bridge: Box<dyn WorldBridge>,
    adjusters: Vec<Box<dyn ScoreAdjuster>>,
    validation: ValidationCache,
    scores: ScoreCache,
    equip_checks: TtlCache<(PawnId, WeaponId), bool>,
    grids: BTreeMap<MapId, WeaponGrid>,
    reservations: ReservationBook,
    last_cleanup_tick: Tick,
    last_reconcile_tick: Tick,
}

impl ArmoryKernel {
    pub fn new(config: KernelConfig, clock: Rc<dyn TickSource>, bridge: Box<dyn WorldBridge>) -> Self {
        let validation = ValidationCache::new(&config);
        let scores = ScoreCache::new(&config);
        let equip_checks = TtlCache::new(config.equip_check_max_entries);
        Self {
            config,
            clock,
            bridge,
            adjusters: Vec::new(),
            validation,
            scores,
            equip_checks,
            grids: BTreeMap::new(),
            reservations: ReservationBook::new(),
            last_cleanup_tick: 0,
            last_reconcile_tick: 0,
        }
    }

    /// Register a companion-system score hook. Adjusters run in
    /// registration order.
    pub fn register_adjuster(&mut self, adjuster: Box<dyn ScoreAdjuster>) {
        self.adjusters.push(adjuster);
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn now(&self) -> Tick {
        self.clock.current_tick()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether a pawn may auto-equip at all right now. Unknown pawns are
    /// simply ineligible; this runs on hot paths and must not throw.
    pub fn is_eligible(&mut self, pawn: PawnId) -> bool {
        let now = self.now();
        let Some(state) = self.bridge.pawn_state(pawn) else {
            return false;
        };
        let Some(profile) = self.bridge.pawn_profile(pawn) else {
            return false;
        };
        self.validation.is_eligible(&state, &profile, now)
    }

    /// Cached external equip-permission probe. A probe failure resolves
    /// to an explicit permissive fallback, logged at debug level.
    pub fn can_equip_cached(&mut self, pawn: PawnId, weapon: WeaponId) -> bool {
        let now = self.now();
        let ttl = self.config.equip_check_ttl;
        let bridge = &self.bridge;
        self.equip_checks
            .get_or_compute((pawn, weapon), now, ttl, || {
                probe_allowing_on_error(bridge.as_ref(), pawn, weapon)
            })
    }

    /// Cached score for a (pawn, weapon) pairing. `None` means the pawn
    /// cannot use the weapon. Unknown entities score `None` without
    /// polluting the table.
    pub fn score_for(&mut self, pawn: PawnId, weapon: WeaponId) -> Option<f32> {
        let now = self.now();
        if self.bridge.pawn_profile(pawn).is_none() || self.bridge.weapon_profile(weapon).is_none()
        {
            return None;
        }

        let ttl = self.config.equip_check_ttl;
        let bridge = &self.bridge;
        let equip_checks = &mut self.equip_checks;
        let adjusters = &self.adjusters;
        let score = self.scores.score_for(pawn, weapon, now, || {
            let allowed = equip_checks.get_or_compute((pawn, weapon), now, ttl, || {
                probe_allowing_on_error(bridge.as_ref(), pawn, weapon)
            });
            if !allowed {
                return None;
            }
            let base = bridge.base_score(pawn, weapon);
            Some(
                adjusters
                    .iter()
                    .fold(base, |score, adjuster| adjuster.adjust(pawn, weapon, score)),
            )
        });

        let bridge = &self.bridge;
        self.scores.enforce_caps(now, |subject| bridge.is_pawn_live(subject));
        score
    }

    /// Nearest weapons on a map, closest first. Unknown maps yield an
    /// empty list.
    pub fn weapons_near(
        &self,
        map: MapId,
        origin: MapCell,
        max_radius: i32,
        want: usize,
    ) -> Vec<WeaponId> {
        self.grids
            .get(&map)
            .map_or_else(Vec::new, |grid| grid.query_near(origin, max_radius, want))
    }

    /// Nearest weapons of one category.
    pub fn weapons_near_class(
        &self,
        map: MapId,
        origin: MapCell,
        max_radius: i32,
        want: usize,
        class: WeaponClass,
    ) -> Vec<WeaponId> {
        self.grids.get(&map).map_or_else(Vec::new, |grid| {
            grid.query_near_class(origin, max_radius, want, class)
        })
    }

    pub fn try_reserve_weapon(&mut self, weapon: WeaponId, claimant: PawnId, duration: Tick) -> bool {
        let now = self.now();
        self.reservations.try_reserve(weapon, claimant, duration, now)
    }

    pub fn is_weapon_reserved(&self, weapon: WeaponId, asking: PawnId) -> bool {
        self.reservations.is_reserved(weapon, asking, self.now())
    }

    pub fn release_weapon_reservation(&mut self, weapon: WeaponId, claimant: PawnId) -> bool {
        self.reservations.release(weapon, claimant)
    }
}

fn probe_allowing_on_error(bridge: &dyn WorldBridge, pawn: PawnId, weapon: WeaponId) -> bool {
    match bridge.can_equip(pawn, weapon) {
        Ok(allowed) => allowed,
        Err(error) => {
            tracing::debug!(%error, pawn, weapon, "equip probe failed; treating as allowed");
            true
        }
    }
}
