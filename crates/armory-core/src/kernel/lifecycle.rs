//! Host -> kernel lifecycle notifications. Each handler is a cheap,
//! synchronous index update; the host calls these from its own event
//! hooks as entities come and go.

use contracts::{MapCell, MapId, PawnAttribute, PawnId, WeaponId, WeaponProfile};

use crate::spatial::WeaponGrid;

use super::ArmoryKernel;

impl ArmoryKernel {
    /// A weapon appeared on a map (spawned, dropped, or unforbidden).
    /// Stored weapons index at their container's position.
    pub fn on_weapon_spawn(&mut self, profile: &WeaponProfile) {
        let cell_size = self.config.cell_size;
        let radii = self.config.search_radii.clone();
        self.grids
            .entry(profile.map_id)
            .or_insert_with(|| WeaponGrid::new(cell_size, &radii))
            .add(profile.weapon_id, profile.index_position(), profile.class);
    }

    /// A weapon left a map without being destroyed (picked up, stored in
    /// an untracked container, ...). Only the spatial index forgets it.
    pub fn on_weapon_despawn(&mut self, map: MapId, weapon: WeaponId) {
        if let Some(grid) = self.grids.get_mut(&map) {
            grid.remove(weapon);
        }
    }

    /// A weapon is gone for good. Every table forgets it.
    pub fn on_weapon_destroyed(&mut self, map: MapId, weapon: WeaponId) {
        if let Some(grid) = self.grids.get_mut(&map) {
            grid.remove(weapon);
        }
        self.scores.purge_weapon(weapon);
        self.equip_checks.invalidate_matching(|key| key.1 == weapon);
        self.reservations.forget_weapon(weapon);
    }

    /// A tracked weapon moved. `position` is the effective position (the
    /// container's when the weapon is stored). Weapons the index has never
    /// seen are added on the spot (a spawn notification went missing).
    pub fn on_weapon_moved(&mut self, map: MapId, weapon: WeaponId, position: MapCell) {
        let Some(grid) = self.grids.get_mut(&map) else {
            return;
        };
        if grid.contains(weapon) {
            grid.relocate(weapon, position);
        } else if let Some(profile) = self.bridge.weapon_profile(weapon) {
            grid.add(weapon, position, profile.class);
        }
    }

    /// A weapon's quality, hit points, or attachments changed; cached
    /// scores and permission checks for it are stale.
    pub fn on_weapon_modified(&mut self, weapon: WeaponId) {
        let now = self.now();
        self.scores.note_weapon_modified(weapon, now);
        self.equip_checks.invalidate_matching(|key| key.1 == weapon);
    }

    /// A pawn's slow-changing attributes moved out of band. Eligibility
    /// verdicts only care about a subset; scores care about all of them.
    pub fn on_pawn_changed(&mut self, pawn: PawnId, attribute: PawnAttribute) {
        let now = self.now();
        if attribute.affects_eligibility() {
            self.validation.invalidate(pawn);
            self.equip_checks.invalidate_matching(|key| key.0 == pawn);
        }
        self.scores.note_subject_changed(pawn, now);
    }

    pub fn on_restricted_group_joined(&mut self, pawn: PawnId, group: &str) {
        self.validation.restricted_groups_mut().note_join(pawn, group);
    }

    pub fn on_restricted_group_left(&mut self, pawn: PawnId, group: &str) {
        self.validation.restricted_groups_mut().note_leave(pawn, group);
    }

    /// A pawn is gone for good. Every table forgets it, including any
    /// reservations it was holding.
    pub fn on_pawn_destroyed(&mut self, pawn: PawnId) {
        self.validation.remove(pawn);
        self.scores.purge_subject(pawn);
        self.reservations.release_all_for(pawn);
        self.equip_checks.invalidate_matching(|key| key.0 == pawn);
    }

    /// A whole map went away. Its grid is dropped wholesale, and rows the
    /// grid was the only witness for go with it.
    pub fn on_map_destroyed(&mut self, map: MapId) {
        let Some(grid) = self.grids.remove(&map) else {
            return;
        };
        for weapon in grid.tracked() {
            self.scores.purge_weapon(weapon);
            self.reservations.forget_weapon(weapon);
            self.equip_checks.invalidate_matching(|key| key.1 == weapon);
        }
    }
}
