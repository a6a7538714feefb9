//! Uniform-grid spatial index over the weapons spawned on one map.
//!
//! Positions divide by a fixed cell size into bucket coordinates; each
//! bucket holds the weapons inside it, and an inverse map keeps removal
//! and relocation O(1). Weapons are also partitioned into category
//! buckets at insertion; the category comes from static properties, so
//! it never needs recomputing.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{MapCell, Tick, WeaponClass, WeaponId};

type CellCoord = (i32, i32);

#[derive(Debug, Clone, Copy)]
struct Placement {
    cell: CellCoord,
    position: MapCell,
    class: WeaponClass,
}

/// Grid index with progressive-radius nearest queries.
#[derive(Debug, Clone)]
pub struct WeaponGrid {
    cell_size: i32,
    search_radii: Vec<i32>,
    cells: BTreeMap<CellCoord, Vec<WeaponId>>,
    placements: BTreeMap<WeaponId, Placement>,
    by_class: BTreeMap<WeaponClass, BTreeSet<WeaponId>>,
}

impl WeaponGrid {
    pub fn new(cell_size: i32, search_radii: &[i32]) -> Self {
        Self {
            cell_size: cell_size.max(1),
            search_radii: search_radii.to_vec(),
            cells: BTreeMap::new(),
            placements: BTreeMap::new(),
            by_class: BTreeMap::new(),
        }
    }

    fn cell_of(&self, position: MapCell) -> CellCoord {
        (
            position.x.div_euclid(self.cell_size),
            position.z.div_euclid(self.cell_size),
        )
    }

    /// Track a weapon at `position` (the container's position for stored
    /// weapons). Re-adding a tracked weapon relocates it instead of
    /// duplicating.
    pub fn add(&mut self, weapon: WeaponId, position: MapCell, class: WeaponClass) {
        if self.placements.contains_key(&weapon) {
            self.relocate(weapon, position);
            return;
        }
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push(weapon);
        self.by_class.entry(class).or_default().insert(weapon);
        self.placements.insert(
            weapon,
            Placement {
                cell,
                position,
                class,
            },
        );
    }

    /// Stop tracking a weapon. Untracked weapons are a no-op.
    pub fn remove(&mut self, weapon: WeaponId) -> bool {
        let Some(placement) = self.placements.remove(&weapon) else {
            return false;
        };
        if let Some(bucket) = self.cells.get_mut(&placement.cell) {
            bucket.retain(|id| *id != weapon);
            if bucket.is_empty() {
                self.cells.remove(&placement.cell);
            }
        }
        if let Some(class_bucket) = self.by_class.get_mut(&placement.class) {
            class_bucket.remove(&weapon);
            if class_bucket.is_empty() {
                self.by_class.remove(&placement.class);
            }
        }
        true
    }

    /// Move a tracked weapon. Movement within one bucket only updates the
    /// stored position; crossing a bucket boundary rehomes the weapon.
    pub fn relocate(&mut self, weapon: WeaponId, new_position: MapCell) {
        let Some(placement) = self.placements.get(&weapon).copied() else {
            return;
        };
        let new_cell = self.cell_of(new_position);
        if new_cell == placement.cell {
            if let Some(placement) = self.placements.get_mut(&weapon) {
                placement.position = new_position;
            }
            return;
        }

        if let Some(bucket) = self.cells.get_mut(&placement.cell) {
            bucket.retain(|id| *id != weapon);
            if bucket.is_empty() {
                self.cells.remove(&placement.cell);
            }
        }
        self.cells.entry(new_cell).or_default().push(weapon);
        if let Some(placement) = self.placements.get_mut(&weapon) {
            placement.cell = new_cell;
            placement.position = new_position;
        }
    }

    /// Nearest weapons to `origin`, closest first, at most `want`.
    ///
    /// Radii expand progressively: the inner radius usually suffices, and
    /// the scan stops as soon as it has enough results, bounding query
    /// cost on big maps.
    pub fn query_near(&self, origin: MapCell, max_radius: i32, want: usize) -> Vec<WeaponId> {
        self.query_filtered(origin, max_radius, want, |_| true)
    }

    /// Nearest weapons of one category.
    pub fn query_near_class(
        &self,
        origin: MapCell,
        max_radius: i32,
        want: usize,
        class: WeaponClass,
    ) -> Vec<WeaponId> {
        self.query_filtered(origin, max_radius, want, |placement| {
            placement.class == class
        })
    }

    fn query_filtered(
        &self,
        origin: MapCell,
        max_radius: i32,
        want: usize,
        accept: impl Fn(&Placement) -> bool,
    ) -> Vec<WeaponId> {
        if want == 0 || max_radius < 0 {
            return Vec::new();
        }

        let mut pass_radii: Vec<i32> = self
            .search_radii
            .iter()
            .copied()
            .filter(|step| *step < max_radius)
            .collect();
        pass_radii.sort_unstable();
        pass_radii.push(max_radius);

        for radius in pass_radii {
            let found = self.scan_radius(origin, radius, &accept);
            if found.len() >= want || radius == max_radius {
                let mut found = found;
                found.truncate(want);
                return found.into_iter().map(|(_, id)| id).collect();
            }
        }
        Vec::new()
    }

    fn scan_radius(
        &self,
        origin: MapCell,
        radius: i32,
        accept: &impl Fn(&Placement) -> bool,
    ) -> Vec<(i64, WeaponId)> {
        let radius_squared = i64::from(radius) * i64::from(radius);
        let min_cell = self.cell_of(MapCell::new(
            origin.x.saturating_sub(radius),
            origin.z.saturating_sub(radius),
        ));
        let max_cell = self.cell_of(MapCell::new(
            origin.x.saturating_add(radius),
            origin.z.saturating_add(radius),
        ));

        let mut found = Vec::new();
        for cell_x in min_cell.0..=max_cell.0 {
            for cell_z in min_cell.1..=max_cell.1 {
                let Some(bucket) = self.cells.get(&(cell_x, cell_z)) else {
                    continue;
                };
                for weapon in bucket {
                    let Some(placement) = self.placements.get(weapon) else {
                        continue;
                    };
                    if !accept(placement) {
                        continue;
                    }
                    let distance = origin.distance_squared_to(placement.position);
                    if distance <= radius_squared {
                        found.push((distance, *weapon));
                    }
                }
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        found
    }

    pub fn contains(&self, weapon: WeaponId) -> bool {
        self.placements.contains_key(&weapon)
    }

    pub fn position_of(&self, weapon: WeaponId) -> Option<MapCell> {
        self.placements.get(&weapon).map(|p| p.position)
    }

    pub fn class_of(&self, weapon: WeaponId) -> Option<WeaponClass> {
        self.placements.get(&weapon).map(|p| p.class)
    }

    pub fn tracked(&self) -> impl Iterator<Item = WeaponId> + '_ {
        self.placements.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.cells.len()
    }

    pub fn class_count(&self, class: WeaponClass) -> usize {
        self.by_class.get(&class).map_or(0, BTreeSet::len)
    }

    /// Repair drift between the index and the host's world: weapons the
    /// host no longer recognizes, and forward/inverse disagreement from a
    /// missed notification. Every repair is logged; the index never
    /// escalates drift as an error.
    pub fn reconcile(&mut self, tick: Tick, is_live: impl Fn(WeaponId) -> bool) -> usize {
        let mut repaired = 0;

        let dead: Vec<WeaponId> = self
            .placements
            .keys()
            .copied()
            .filter(|weapon| !is_live(*weapon))
            .collect();
        for weapon in dead {
            tracing::warn!(weapon, tick, "spatial index held a dead weapon; removing");
            self.remove(weapon);
            repaired += 1;
        }

        // Forward entries whose inverse is missing or points elsewhere.
        let mut orphans: Vec<(CellCoord, WeaponId)> = Vec::new();
        for (cell, bucket) in &self.cells {
            for weapon in bucket {
                match self.placements.get(weapon) {
                    Some(placement) if placement.cell == *cell => {}
                    _ => orphans.push((*cell, *weapon)),
                }
            }
        }
        for (cell, weapon) in orphans {
            tracing::warn!(
                weapon,
                ?cell,
                tick,
                "spatial bucket disagreed with placement; dropping stale entry"
            );
            if let Some(bucket) = self.cells.get_mut(&cell) {
                bucket.retain(|id| *id != weapon);
                if bucket.is_empty() {
                    self.cells.remove(&cell);
                }
            }
            repaired += 1;
        }

        repaired
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.placements.clear();
        self.by_class.clear();
    }
}
