//! Periodic upkeep. `maintenance` is cheap enough to call every tick from
//! the host's tick loop; the heavier sweeps gate themselves on their own
//! intervals.

use contracts::Tick;

use super::ArmoryKernel;

impl ArmoryKernel {
    /// Per-tick upkeep entry point. Reservation expiry runs every call
    /// (the schedule makes it near-free); expired-entry sweeps and grid
    /// reconciliation run on their configured intervals.
    pub fn maintenance(&mut self) {
        let now = self.now();
        self.reservations.prune_expired(now);

        if now.saturating_sub(self.last_cleanup_tick) >= self.config.cleanup_interval {
            self.last_cleanup_tick = now;
            let removed = self.sweep_expired(now);
            if removed > 0 {
                tracing::debug!(removed, tick = now, "expired cache entries swept");
            }
        }

        if now.saturating_sub(self.last_reconcile_tick) >= self.config.reconcile_interval {
            self.last_reconcile_tick = now;
            let bridge = &self.bridge;
            for grid in self.grids.values_mut() {
                grid.reconcile(now, |weapon| bridge.is_weapon_live(weapon));
            }
        }
    }

    /// Drop every expired entry across every table, returning how many
    /// went. Safe to call at any time.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.now();
        self.last_cleanup_tick = now;
        self.sweep_expired(now)
    }

    fn sweep_expired(&mut self, now: Tick) -> usize {
        let mut removed = self.validation.cleanup_expired(now);
        removed += self.scores.cleanup_expired(now);
        removed += self
            .equip_checks
            .cleanup_expired(now, self.config.equip_check_ttl);
        removed += self.reservations.prune_expired(now);
        removed
    }

    /// Wipe every table. The nuclear option for host-driven resets
    /// (game load, mod reconfiguration).
    pub fn clear_all(&mut self) {
        self.validation.clear();
        self.scores.clear();
        self.equip_checks.clear();
        self.grids.clear();
        self.reservations.clear();
    }
}
