use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use armory_core::kernel::ArmoryKernel;
use armory_core::{ManualClock, ProbeError, ReservationBook, ScoreAdjuster, WeaponGrid, WorldBridge};
use contracts::{
    KernelConfig, MapCell, PawnAttribute, PawnId, PawnProfile, PawnState, WeaponClass, WeaponId,
    WeaponProfile,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Stub host
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StubState {
    pawns: BTreeMap<PawnId, (PawnState, PawnProfile)>,
    weapons: BTreeMap<WeaponId, WeaponProfile>,
    blocked_pairs: BTreeSet<(PawnId, WeaponId)>,
    probe_error_pairs: BTreeSet<(PawnId, WeaponId)>,
    base_scores: BTreeMap<(PawnId, WeaponId), f32>,
    score_calls: usize,
    probe_calls: usize,
}

#[derive(Debug, Clone, Default)]
struct StubWorld {
    state: Rc<RefCell<StubState>>,
}

impl StubWorld {
    fn add_colonist(&self, pawn: PawnId) {
        let state = PawnState {
            spawned: true,
            ..PawnState::default()
        };
        let profile = PawnProfile {
            pawn_id: pawn,
            map_id: 0,
            can_manipulate: true,
            violence_capable: true,
            humanlike: true,
            is_colonist: true,
            is_guest: false,
            age_years: 30,
        };
        self.state.borrow_mut().pawns.insert(pawn, (state, profile));
    }

    fn add_weapon(&self, weapon: WeaponId, map_id: u32, position: MapCell) -> WeaponProfile {
        let profile = WeaponProfile {
            weapon_id: weapon,
            map_id,
            class: WeaponClass::RangedShort,
            position,
            container_position: None,
        };
        self.state
            .borrow_mut()
            .weapons
            .insert(weapon, profile.clone());
        profile
    }

    fn remove_weapon(&self, weapon: WeaponId) {
        self.state.borrow_mut().weapons.remove(&weapon);
    }

    fn block_pair(&self, pawn: PawnId, weapon: WeaponId) {
        self.state.borrow_mut().blocked_pairs.insert((pawn, weapon));
    }

    fn break_probe_for(&self, pawn: PawnId, weapon: WeaponId) {
        self.state
            .borrow_mut()
            .probe_error_pairs
            .insert((pawn, weapon));
    }

    fn score_calls(&self) -> usize {
        self.state.borrow().score_calls
    }

    fn probe_calls(&self) -> usize {
        self.state.borrow().probe_calls
    }
}

impl WorldBridge for StubWorld {
    fn pawn_state(&self, pawn: PawnId) -> Option<PawnState> {
        self.state.borrow().pawns.get(&pawn).map(|(state, _)| *state)
    }

    fn pawn_profile(&self, pawn: PawnId) -> Option<PawnProfile> {
        self.state
            .borrow()
            .pawns
            .get(&pawn)
            .map(|(_, profile)| profile.clone())
    }

    fn weapon_profile(&self, weapon: WeaponId) -> Option<WeaponProfile> {
        self.state.borrow().weapons.get(&weapon).cloned()
    }

    fn is_pawn_live(&self, pawn: PawnId) -> bool {
        self.state.borrow().pawns.contains_key(&pawn)
    }

    fn is_weapon_live(&self, weapon: WeaponId) -> bool {
        self.state.borrow().weapons.contains_key(&weapon)
    }

    fn can_equip(&self, pawn: PawnId, weapon: WeaponId) -> Result<bool, ProbeError> {
        let mut state = self.state.borrow_mut();
        state.probe_calls += 1;
        if state.probe_error_pairs.contains(&(pawn, weapon)) {
            return Err(ProbeError::Unavailable);
        }
        Ok(!state.blocked_pairs.contains(&(pawn, weapon)))
    }

    fn base_score(&self, pawn: PawnId, weapon: WeaponId) -> f32 {
        let mut state = self.state.borrow_mut();
        state.score_calls += 1;
        state
            .base_scores
            .get(&(pawn, weapon))
            .copied()
            .unwrap_or(1.0)
    }
}

fn kernel_with(config: KernelConfig) -> (ArmoryKernel, StubWorld, ManualClock) {
    let world = StubWorld::default();
    let clock = ManualClock::new(0);
    let kernel = ArmoryKernel::new(
        config,
        Rc::new(clock.clone()),
        Box::new(world.clone()),
    );
    (kernel, world, clock)
}

fn default_kernel() -> (ArmoryKernel, StubWorld, ManualClock) {
    kernel_with(KernelConfig::default())
}

// ---------------------------------------------------------------------------
// End-to-end properties
// ---------------------------------------------------------------------------

#[test]
fn property_1_score_is_computed_once_within_ttl() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_weapon(10, 0, MapCell::new(5, 5));

    clock.set(100);
    assert_eq!(kernel.score_for(1, 10), Some(1.0));
    clock.set(200);
    assert_eq!(kernel.score_for(1, 10), Some(1.0));
    assert_eq!(world.score_calls(), 1);

    // Past the score TTL the pairing is rescored.
    clock.set(100 + kernel.config().score_ttl);
    kernel.score_for(1, 10);
    assert_eq!(world.score_calls(), 2);
}

#[test]
fn property_2_revalidation_window_forces_recompute() {
    let mut config = KernelConfig::default();
    config.revalidation_window = 2_500;
    let (mut kernel, world, clock) = kernel_with(config);
    world.add_colonist(1);

    clock.set(100);
    assert!(kernel.is_eligible(1));
    let misses_after_first = kernel.stats().validation.misses;

    clock.set(2_000);
    assert!(kernel.is_eligible(1));
    assert_eq!(kernel.stats().validation.misses, misses_after_first);

    clock.set(2_600);
    assert!(kernel.is_eligible(1));
    assert_eq!(kernel.stats().validation.misses, misses_after_first + 1);
}

#[test]
fn property_3_weapon_modification_invalidates_only_that_weapon() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_colonist(2);
    world.add_weapon(10, 0, MapCell::new(0, 0));
    world.add_weapon(11, 0, MapCell::new(1, 1));

    clock.set(100);
    kernel.score_for(1, 10);
    kernel.score_for(2, 10);
    kernel.score_for(1, 11);
    assert_eq!(world.score_calls(), 3);

    clock.set(150);
    kernel.on_weapon_modified(10);

    clock.set(200);
    kernel.score_for(1, 10);
    kernel.score_for(2, 10);
    kernel.score_for(1, 11);
    // Both rows for weapon 10 rescored; weapon 11 still cached.
    assert_eq!(world.score_calls(), 5);
}

#[test]
fn property_4_subject_change_invalidates_all_of_their_scores() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_colonist(2);
    world.add_weapon(10, 0, MapCell::new(0, 0));
    world.add_weapon(11, 0, MapCell::new(1, 1));

    clock.set(100);
    kernel.score_for(1, 10);
    kernel.score_for(1, 11);
    kernel.score_for(2, 10);
    assert_eq!(world.score_calls(), 3);

    clock.set(150);
    kernel.on_pawn_changed(1, PawnAttribute::CombatSkill);

    clock.set(200);
    kernel.score_for(1, 10);
    kernel.score_for(1, 11);
    kernel.score_for(2, 10);
    assert_eq!(world.score_calls(), 5);

    // A skill change never touches the validation cache.
    assert_eq!(kernel.stats().validation.misses, 0);
}

#[test]
fn property_5_spawned_weapons_are_found_and_moved_weapons_disappear() {
    let (mut kernel, world, _clock) = default_kernel();
    let profile = world.add_weapon(10, 0, MapCell::new(10, 10));
    kernel.on_weapon_spawn(&profile);

    assert_eq!(
        kernel.weapons_near(0, MapCell::new(12, 10), 5, usize::MAX),
        vec![10]
    );

    kernel.on_weapon_moved(0, 10, MapCell::new(300, 300));
    assert!(kernel
        .weapons_near(0, MapCell::new(12, 10), 5, usize::MAX)
        .is_empty());
    assert_eq!(
        kernel.weapons_near(0, MapCell::new(299, 300), 5, usize::MAX),
        vec![10]
    );

    // Unknown maps answer with an empty list, never a panic.
    assert!(kernel.weapons_near(9, MapCell::new(0, 0), 50, 8).is_empty());
}

#[test]
fn property_6_reservation_blocks_until_expiry() {
    let (mut kernel, _world, clock) = default_kernel();

    assert!(kernel.try_reserve_weapon(10, 1, 60));
    clock.set(30);
    assert!(!kernel.try_reserve_weapon(10, 2, 60));
    assert!(kernel.is_weapon_reserved(10, 2));
    assert!(!kernel.is_weapon_reserved(10, 1));

    clock.set(61);
    assert!(kernel.try_reserve_weapon(10, 2, 60));
}

#[test]
fn property_7_destroyed_pawn_leaves_no_rows_behind() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_weapon(10, 0, MapCell::new(0, 0));

    clock.set(10);
    assert!(kernel.is_eligible(1));
    kernel.score_for(1, 10);
    kernel.try_reserve_weapon(10, 1, 500);

    kernel.on_pawn_destroyed(1);

    assert_eq!(kernel.stats().scores.entries, 0);
    assert!(!kernel.is_weapon_reserved(10, 2));
}

#[test]
fn property_8_destroyed_map_takes_its_rows_with_it() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    let on_doomed_map = world.add_weapon(10, 3, MapCell::new(0, 0));
    let elsewhere = world.add_weapon(11, 0, MapCell::new(0, 0));
    kernel.on_weapon_spawn(&on_doomed_map);
    kernel.on_weapon_spawn(&elsewhere);

    clock.set(10);
    kernel.score_for(1, 10);
    kernel.score_for(1, 11);
    kernel.try_reserve_weapon(10, 1, 500);

    kernel.on_map_destroyed(3);

    assert!(kernel.weapons_near(3, MapCell::new(0, 0), 50, 8).is_empty());
    assert!(!kernel.is_weapon_reserved(10, 2));
    assert_eq!(kernel.stats().scores.entries, 1);
    assert_eq!(kernel.stats().tracked_weapons, 1);
}

#[test]
fn property_9_probe_failure_fails_open() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_weapon(10, 0, MapCell::new(0, 0));
    world.break_probe_for(1, 10);

    clock.set(10);
    assert!(kernel.can_equip_cached(1, 10));
    // The permissive verdict is cached like any other.
    assert!(kernel.can_equip_cached(1, 10));
    assert_eq!(world.probe_calls(), 1);

    // Scoring proceeds despite the broken probe.
    assert_eq!(kernel.score_for(1, 10), Some(1.0));
}

#[test]
fn property_10_blocked_pairings_cache_the_refusal_briefly() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_weapon(10, 0, MapCell::new(0, 0));
    world.block_pair(1, 10);

    clock.set(100);
    assert_eq!(kernel.score_for(1, 10), None);
    assert_eq!(kernel.score_for(1, 10), None);
    assert_eq!(world.score_calls(), 0, "blocked pairs are never base-scored");
    let probes_so_far = world.probe_calls();

    // The refusal expires on the shorter blocked TTL and is re-probed.
    clock.set(100 + kernel.config().blocked_score_ttl + kernel.config().equip_check_ttl);
    assert_eq!(kernel.score_for(1, 10), None);
    assert!(world.probe_calls() > probes_so_far);
}

#[test]
fn property_11_reconciliation_repairs_missed_removals() {
    let (mut kernel, world, clock) = default_kernel();
    let profile = world.add_weapon(10, 0, MapCell::new(5, 5));
    kernel.on_weapon_spawn(&profile);

    // The weapon vanishes without a destroy notification.
    world.remove_weapon(10);
    assert_eq!(
        kernel.weapons_near(0, MapCell::new(5, 5), 10, usize::MAX),
        vec![10],
        "drift exists before the sweep"
    );

    clock.set(kernel.config().reconcile_interval);
    kernel.maintenance();
    assert!(kernel
        .weapons_near(0, MapCell::new(5, 5), 10, usize::MAX)
        .is_empty());
}

#[test]
fn property_12_unknown_entities_yield_safe_defaults() {
    let (mut kernel, _world, _clock) = default_kernel();

    assert!(!kernel.is_eligible(404));
    assert_eq!(kernel.score_for(404, 404), None);
    assert!(kernel.weapons_near(0, MapCell::new(0, 0), 50, 8).is_empty());
    assert!(!kernel.is_weapon_reserved(404, 1));
    assert_eq!(kernel.stats().scores.entries, 0);
}

#[test]
fn property_13_clear_all_resets_every_table() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    let profile = world.add_weapon(10, 0, MapCell::new(0, 0));
    kernel.on_weapon_spawn(&profile);

    clock.set(10);
    kernel.is_eligible(1);
    kernel.score_for(1, 10);
    kernel.try_reserve_weapon(10, 1, 500);

    kernel.clear_all();

    let stats = kernel.stats();
    assert_eq!(stats.validation.entries, 0);
    assert_eq!(stats.scores.entries, 0);
    assert_eq!(stats.equip_checks.entries, 0);
    assert_eq!(stats.tracked_weapons, 0);
    assert_eq!(stats.active_reservations, 0);
}

#[test]
fn property_14_cleanup_expired_reports_what_it_removed() {
    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_weapon(10, 0, MapCell::new(0, 0));

    clock.set(10);
    kernel.is_eligible(1);
    kernel.score_for(1, 10);

    // Far enough that every window has lapsed.
    clock.set(10 + kernel.config().revalidation_window + kernel.config().score_ttl);
    let removed = kernel.cleanup_expired();
    assert!(removed >= 2);
    assert_eq!(kernel.stats().validation.entries, 0);
    assert_eq!(kernel.stats().scores.entries, 0);
}

#[test]
fn property_15_adjusters_layer_in_registration_order() {
    struct Bonus(f32);
    impl ScoreAdjuster for Bonus {
        fn adjust(&self, _pawn: PawnId, _weapon: WeaponId, score: f32) -> f32 {
            score + self.0
        }
        fn name(&self) -> &str {
            "bonus"
        }
    }
    struct Doubler;
    impl ScoreAdjuster for Doubler {
        fn adjust(&self, _pawn: PawnId, _weapon: WeaponId, score: f32) -> f32 {
            score * 2.0
        }
        fn name(&self) -> &str {
            "doubler"
        }
    }

    let (mut kernel, world, clock) = default_kernel();
    world.add_colonist(1);
    world.add_weapon(10, 0, MapCell::new(0, 0));
    kernel.register_adjuster(Box::new(Bonus(3.0)));
    kernel.register_adjuster(Box::new(Doubler));

    clock.set(10);
    // (1.0 + 3.0) * 2.0, not 1.0 * 2.0 + 3.0.
    assert_eq!(kernel.score_for(1, 10), Some(8.0));
}

// ---------------------------------------------------------------------------
// Generative properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn property_16_spatial_queries_are_complete(
        positions in proptest::collection::vec((-120i32..120, -120i32..120), 1..40),
        origin in (-120i32..120, -120i32..120),
        radius in 0i32..60,
    ) {
        let mut grid = WeaponGrid::new(20, &[12, 25, 40]);
        for (index, (x, z)) in positions.iter().enumerate() {
            grid.add(index as WeaponId, MapCell::new(*x, *z), WeaponClass::MeleeBasic);
        }

        let origin = MapCell::new(origin.0, origin.1);
        let found: BTreeSet<WeaponId> =
            grid.query_near(origin, radius, usize::MAX).into_iter().collect();

        let radius_squared = i64::from(radius) * i64::from(radius);
        let expected: BTreeSet<WeaponId> = positions
            .iter()
            .enumerate()
            .filter(|(_, (x, z))| {
                origin.distance_squared_to(MapCell::new(*x, *z)) <= radius_squared
            })
            .map(|(index, _)| index as WeaponId)
            .collect();

        prop_assert_eq!(found, expected);
    }

    #[test]
    fn property_17_reservations_never_have_two_live_holders(
        operations in proptest::collection::vec(
            (0u64..4, 0u64..4, 1u64..80, 0u64..40),
            1..60,
        ),
    ) {
        let mut book = ReservationBook::new();
        let mut now = 0u64;

        for (weapon, claimant, duration, advance) in operations {
            now += advance;
            let before_holder = book.holder(weapon, now);
            let granted = book.try_reserve(weapon, claimant, duration, now);

            match before_holder {
                Some(holder) if holder != claimant => prop_assert!(!granted),
                _ => prop_assert!(granted),
            }
            if granted {
                prop_assert_eq!(book.holder(weapon, now), Some(claimant));
                // Every other claimant is blocked for the full duration.
                let other = (claimant + 1) % 4;
                prop_assert!(book.is_reserved(weapon, other, now));
            }
        }
    }

    #[test]
    fn property_18_removal_never_corrupts_the_grid(
        operations in proptest::collection::vec(
            (0u64..8, -50i32..50, -50i32..50, prop::bool::ANY),
            1..80,
        ),
    ) {
        let mut grid = WeaponGrid::new(20, &[12, 25, 40]);
        let mut alive: BTreeSet<WeaponId> = BTreeSet::new();

        for (weapon, x, z, remove) in operations {
            if remove {
                grid.remove(weapon);
                alive.remove(&weapon);
            } else {
                grid.add(weapon, MapCell::new(x, z), WeaponClass::MeleeBasic);
                alive.insert(weapon);
            }
            prop_assert_eq!(grid.len(), alive.len());
        }

        // A consistent grid reconciles to zero repairs.
        prop_assert_eq!(grid.reconcile(0, |weapon| alive.contains(&weapon)), 0);
    }
}
