//! Uniform-grid broad phase over unit positions.
//!
//! The grid is rebuilt from scratch every tick. Queries return unit
//! indices (into [`crate::state::Arena::as_slice`]) from the cells around
//! a point; they over-approximate and callers filter by real distance.

use std::collections::HashMap;

use crate::components::Unit;
use crate::math::{cos_deg, ratio, Fixed, GeoBounds, GeoPoint, KM_PER_DEG_LAT, KM_PER_DEG_LNG};

type Cell = (i32, i32);

/// Broad-phase index.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_km: Fixed,
    cell_lat_deg: Fixed,
    cell_lng_deg: Fixed,
    origin: GeoPoint,
    cells: HashMap<Cell, Vec<usize>>,
}

impl SpatialGrid {
    /// Create a grid whose cells are at least `cell_km` wide everywhere
    /// inside `bounds`.
    #[must_use]
    pub fn new(cell_km: Fixed, bounds: &GeoBounds) -> Self {
        let cell_km = cell_km.max(ratio(1, 1000));
        let narrowest = cos_deg(bounds.max_abs_lat()).max(ratio(1, 100));
        Self {
            cell_km,
            cell_lat_deg: cell_km / KM_PER_DEG_LAT,
            cell_lng_deg: cell_km / (KM_PER_DEG_LNG * narrowest),
            origin: GeoPoint::new(bounds.min_lat, bounds.min_lng),
            cells: HashMap::new(),
        }
    }

    /// Cell edge in km.
    #[must_use]
    pub fn cell_km(&self) -> Fixed {
        self.cell_km
    }

    fn cell_of(&self, point: GeoPoint) -> Cell {
        let row = ((point.lat - self.origin.lat) / self.cell_lat_deg)
            .floor()
            .to_num::<i32>();
        let col = ((point.lng - self.origin.lng) / self.cell_lng_deg)
            .floor()
            .to_num::<i32>();
        (row, col)
    }

    /// Reinsert every living unit. Buckets of cells that stay occupied
    /// keep their allocations; cells left empty are dropped.
    pub fn rebuild(&mut self, units: &[Unit]) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        for (index, unit) in units.iter().enumerate() {
            if unit.is_alive() {
                let cell = self.cell_of(unit.position);
                self.cells.entry(cell).or_default().push(index);
            }
        }
        self.cells.retain(|_, bucket| !bucket.is_empty());
    }

    /// Cells holding at least one unit.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Units in the 3×3 neighborhood of `point`.
    #[must_use]
    pub fn query(&self, point: GeoPoint) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect(point, 1, &mut out);
        out
    }

    /// Units in enough rings of cells around `point` to cover `radius_km`.
    #[must_use]
    pub fn query_radius(&self, point: GeoPoint, radius_km: Fixed) -> Vec<usize> {
        let rings = (radius_km / self.cell_km).ceil().to_num::<i32>().max(1);
        let mut out = Vec::new();
        self.collect(point, rings, &mut out);
        out
    }

    fn collect(&self, point: GeoPoint, rings: i32, out: &mut Vec<usize>) {
        let (row, col) = self.cell_of(point);
        for dr in -rings..=rings {
            for dc in -rings..=rings {
                if let Some(bucket) = self.cells.get(&(row + dr, col + dc)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        out.sort_unstable();
    }

    /// Number of indexed units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Check if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
