//! Advisory, self-expiring claims on weapons.
//!
//! A reservation blocks every claimant except its holder until its expiry
//! tick, then becomes inert. It is a politeness protocol against two
//! pawns walking to the same weapon, not a lock. Expiry is checked lazily
//! on every read, and an expiry-tick-indexed schedule lets the periodic
//! sweep clear due entries without touching the rest of the table.

use std::collections::BTreeMap;

use contracts::{PawnId, Tick, WeaponId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    claimant: PawnId,
    expires_tick: Tick,
}

#[derive(Debug, Clone, Default)]
pub struct ReservationBook {
    claims: BTreeMap<WeaponId, Claim>,
    /// Expiry tick -> weapons whose claim was scheduled to die then.
    /// Entries may be stale if a claim was renewed; the sweep re-checks.
    expiry_schedule: BTreeMap<Tick, Vec<WeaponId>>,
}

impl ReservationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a weapon for `duration` ticks. Succeeds when the weapon is
    /// unclaimed, its claim has expired, or the claimant already holds it
    /// (renewal). A zero duration is refused outright.
    pub fn try_reserve(
        &mut self,
        weapon: WeaponId,
        claimant: PawnId,
        duration: Tick,
        now: Tick,
    ) -> bool {
        if duration == 0 {
            return false;
        }
        if let Some(claim) = self.claims.get(&weapon) {
            if claim.expires_tick > now && claim.claimant != claimant {
                return false;
            }
        }
        let expires_tick = now.saturating_add(duration);
        self.claims.insert(
            weapon,
            Claim {
                claimant,
                expires_tick,
            },
        );
        self.expiry_schedule
            .entry(expires_tick)
            .or_default()
            .push(weapon);
        true
    }

    /// Whether the weapon is blocked for `asking`. A holder is never
    /// blocked by their own claim.
    pub fn is_reserved(&self, weapon: WeaponId, asking: PawnId, now: Tick) -> bool {
        self.claims
            .get(&weapon)
            .is_some_and(|claim| claim.expires_tick > now && claim.claimant != asking)
    }

    /// The live holder, if any.
    pub fn holder(&self, weapon: WeaponId, now: Tick) -> Option<PawnId> {
        self.claims
            .get(&weapon)
            .filter(|claim| claim.expires_tick > now)
            .map(|claim| claim.claimant)
    }

    /// Drop a claim early. Only the holder may release; anyone else is a
    /// no-op.
    pub fn release(&mut self, weapon: WeaponId, claimant: PawnId) -> bool {
        match self.claims.get(&weapon) {
            Some(claim) if claim.claimant == claimant => {
                self.claims.remove(&weapon);
                true
            }
            _ => false,
        }
    }

    /// Drop the weapon's claim no matter who holds it (weapon destroyed).
    pub fn forget_weapon(&mut self, weapon: WeaponId) -> bool {
        self.claims.remove(&weapon).is_some()
    }

    /// Drop every claim held by `claimant` (pawn destroyed).
    pub fn release_all_for(&mut self, claimant: PawnId) -> usize {
        let before = self.claims.len();
        self.claims.retain(|_, claim| claim.claimant != claimant);
        before - self.claims.len()
    }

    /// Batch-clear claims that are due, walking only the schedule buckets
    /// at or before `now`. Renewed claims survive: the stale schedule
    /// entry finds a later expiry and leaves the claim alone.
    pub fn prune_expired(&mut self, now: Tick) -> usize {
        let still_future = self.expiry_schedule.split_off(&(now.saturating_add(1)));
        let due = std::mem::replace(&mut self.expiry_schedule, still_future);

        let mut removed = 0;
        for (_, weapons) in due {
            for weapon in weapons {
                if let Some(claim) = self.claims.get(&weapon) {
                    if claim.expires_tick <= now {
                        self.claims.remove(&weapon);
                        removed += 1;
                    }
                }
            }
        }
        removed
    }

    /// Weapons a claimant currently holds.
    pub fn held_by(&self, claimant: PawnId, now: Tick) -> Vec<WeaponId> {
        self.claims
            .iter()
            .filter(|(_, claim)| claim.claimant == claimant && claim.expires_tick > now)
            .map(|(weapon, _)| *weapon)
            .collect()
    }

    /// Claims that would still block someone at `now`.
    pub fn active_len(&self, now: Tick) -> usize {
        self.claims
            .values()
            .filter(|claim| claim.expires_tick > now)
            .count()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn clear(&mut self) {
        self.claims.clear();
        self.expiry_schedule.clear();
    }
}
