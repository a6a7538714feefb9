//! In-process inspection: JSON views over the kernel's tables for debug
//! overlays and dev tooling. Read-only; safe to call at any time.

use contracts::{KernelStats, MapId, PawnId, WeaponId, SCHEMA_VERSION_V1};
use serde_json::{json, Value};

use super::ArmoryKernel;

impl ArmoryKernel {
    pub fn stats(&self) -> KernelStats {
        let now = self.now();
        KernelStats {
            validation: self.validation.stats(),
            scores: self.scores.stats(),
            equip_checks: self.equip_checks.stats(),
            tracked_weapons: self.grids.values().map(|grid| grid.len()).sum(),
            active_reservations: self.reservations.active_len(now),
        }
    }

    pub fn inspect_pawn(&self, pawn: PawnId) -> Option<Value> {
        let now = self.now();
        let record = self.validation.record(pawn)?;
        Some(json!({
            "pawn_id": pawn.to_string(),
            "tick": now,
            "verdict": record.verdict,
            "validated_tick": record.validated_tick,
            "checks": {
                "can_manipulate": record.can_manipulate,
                "violence_capable": record.violence_capable,
                "humanlike": record.humanlike,
                "faction_ok": record.faction_ok,
                "age_ok": record.age_ok,
            },
            "restricted": self.validation.restricted_groups().is_restricted(pawn),
            "cached_scores": self.scores.subject_entry_count(pawn),
            "reservations_held": self
                .reservations
                .held_by(pawn, now)
                .iter()
                .map(|weapon| weapon.to_string())
                .collect::<Vec<_>>(),
        }))
    }

    pub fn inspect_weapon(&self, map: MapId, weapon: WeaponId) -> Option<Value> {
        let now = self.now();
        let grid = self.grids.get(&map)?;
        let position = grid.position_of(weapon)?;
        Some(json!({
            "weapon_id": weapon.to_string(),
            "map_id": map,
            "tick": now,
            "position": { "x": position.x, "z": position.z },
            "class": grid.class_of(weapon).map(|class| format!("{class:?}")),
            "reserved_by": self
                .reservations
                .holder(weapon, now)
                .map(|holder| holder.to_string()),
        }))
    }

    /// One JSON blob describing the whole kernel, in the shape dev
    /// overlays expect.
    pub fn snapshot(&self) -> Value {
        let stats = self.stats();
        json!({
            "schema_version": SCHEMA_VERSION_V1,
            "tick": self.now(),
            "validation": {
                "entries": stats.validation.entries,
                "capacity": stats.validation.capacity,
                "hit_rate": stats.validation.hit_rate(),
            },
            "scores": {
                "entries": stats.scores.entries,
                "capacity": stats.scores.capacity,
                "hit_rate": stats.scores.hit_rate(),
            },
            "equip_checks": {
                "entries": stats.equip_checks.entries,
                "capacity": stats.equip_checks.capacity,
                "hit_rate": stats.equip_checks.hit_rate(),
            },
            "maps": self
                .grids
                .iter()
                .map(|(map, grid)| {
                    json!({
                        "map_id": map,
                        "tracked_weapons": grid.len(),
                        "occupied_buckets": grid.bucket_count(),
                    })
                })
                .collect::<Vec<_>>(),
            "active_reservations": stats.active_reservations,
        })
    }
}
