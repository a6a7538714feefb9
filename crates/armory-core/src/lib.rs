//! Tick-scoped caching kernel for automatic weapon handling.
//!
//! The host simulation owns the pawns, the weapons, and the clock; this
//! crate owns the tables that make per-tick decisions affordable: a
//! generic TTL cache, a two-phase pawn validation cache, a score cache
//! with three-way freshness, a uniform-grid spatial index per map, and a
//! self-expiring reservation book. The `ArmoryKernel` coordinator wires
//! them to the host through the `WorldBridge` seam.

pub mod cache;
pub mod clock;
pub mod eviction;
pub mod host;
pub mod kernel;
pub mod reservation;
pub mod score;
pub mod spatial;
pub mod validation;

pub use cache::TtlCache;
pub use clock::{ManualClock, TickSource};
pub use host::{NoAdjustment, ProbeError, ScoreAdjuster, WorldBridge};
pub use kernel::ArmoryKernel;
pub use reservation::ReservationBook;
pub use score::{ScoreCache, ScoreOutcome};
pub use spatial::WeaponGrid;
pub use validation::{RestrictedGroups, ValidationCache, ValidationRecord};
