//! Quadtree-style spatial index over a bounding universe.
//!
//! Territories are bucketed into hierarchical cells addressed by base-4
//! digit strings: at each level the current rectangle is bisected at its
//! midpoint, the digit accumulating `+1` when the point's latitude exceeds
//! the mid-latitude and `+2` when its longitude exceeds the mid-longitude.
//! Every prefix of a cell id is itself a valid cell covering a superset of
//! the addressed region, which makes prefix matching a cheap candidate
//! lookup.
//!
//! The index holds a snapshot of root bounds taken once at construction;
//! it is not recomputed per insert. Geometries that later fall outside the
//! root degrade gracefully to edge cells.

use crate::error::{Result, TerritoryError};
use crate::types::{BBox, EngineConfig};

/// Resolution assigned to territories spanning more than [`COARSE_SPAN_DEGREES`].
pub const COARSE_LEVEL: u8 = 2;

/// Resolution assigned to territories spanning more than [`MEDIUM_SPAN_DEGREES`].
pub const MEDIUM_LEVEL: u8 = 4;

/// Span above which a territory is indexed at [`COARSE_LEVEL`].
pub const COARSE_SPAN_DEGREES: f64 = 1.0;

/// Span above which a territory is indexed at [`MEDIUM_LEVEL`].
pub const MEDIUM_SPAN_DEGREES: f64 = 0.1;

/// Explicit spatial index handle.
///
/// Constructed once per process from the full current dataset and passed by
/// reference to the inference routines; there is no hidden global state.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    root: BBox,
}

impl SpatialIndex {
    /// Create an index over an explicit root region.
    pub fn new(root: BBox) -> Self {
        Self { root }
    }

    /// Snapshot root bounds from the union of all known territory bounds,
    /// buffered by the configured margin. Falls back to the configured
    /// default region when the dataset is empty; construction never fails.
    pub fn from_bounds<I>(all_bounds: I, config: &EngineConfig) -> Self
    where
        I: IntoIterator<Item = BBox>,
    {
        let mut iter = all_bounds.into_iter();
        let root = match iter.next() {
            Some(first) => {
                let union = iter.fold(first, |acc, b| acc.union(&b));
                union.buffered(config.root_buffer_degrees)
            }
            None => config.default_region,
        };
        Self { root }
    }

    /// The snapshot root bounds.
    pub fn root_bounds(&self) -> BBox {
        self.root
    }

    /// Hierarchical cell id for a coordinate at the given resolution.
    ///
    /// Points outside the root bounds still get an id: the bisection walk
    /// simply keeps choosing the nearest edge quadrant, so distant
    /// geometries land in (imprecise) edge cells rather than failing.
    pub fn cell_id_for(&self, lat: f64, lng: f64, level: u8) -> String {
        let mut cell_id = String::with_capacity(level as usize);
        let mut min_lat = self.root.min_lat;
        let mut max_lat = self.root.max_lat;
        let mut min_lng = self.root.min_lng;
        let mut max_lng = self.root.max_lng;

        for _ in 0..level {
            let mid_lat = (min_lat + max_lat) / 2.0;
            let mid_lng = (min_lng + max_lng) / 2.0;

            let mut quadrant = 0u8;
            if lat > mid_lat {
                quadrant += 1;
                min_lat = mid_lat;
            } else {
                max_lat = mid_lat;
            }
            if lng > mid_lng {
                quadrant += 2;
                min_lng = mid_lng;
            } else {
                max_lng = mid_lng;
            }

            cell_id.push(char::from(b'0' + quadrant));
        }

        cell_id
    }

    /// The exact rectangle a cell id denotes; true inverse of
    /// [`cell_id_for`](Self::cell_id_for).
    pub fn cell_bounds(&self, cell_id: &str) -> Result<BBox> {
        let mut bounds = self.root;

        for digit in cell_id.chars() {
            let quadrant = digit.to_digit(10).filter(|d| *d < 4).ok_or_else(|| {
                TerritoryError::InvalidInput(format!("invalid cell id digit '{}'", digit))
            })?;

            let mid_lat = (bounds.min_lat + bounds.max_lat) / 2.0;
            let mid_lng = (bounds.min_lng + bounds.max_lng) / 2.0;

            if quadrant & 1 == 1 {
                bounds.min_lat = mid_lat;
            } else {
                bounds.max_lat = mid_lat;
            }
            if quadrant & 2 == 2 {
                bounds.min_lng = mid_lng;
            } else {
                bounds.max_lng = mid_lng;
            }
        }

        Ok(bounds)
    }

    /// Smallest cell guaranteed to cover the whole bounding box: the longest
    /// common leading-digit prefix of the low-corner and high-corner ids at
    /// `max_level`. When the corners diverge at the first digit the
    /// low-corner's full-length id is returned, so the result is never an
    /// empty key.
    pub fn covering_cell(&self, bounds: &BBox, max_level: u8) -> String {
        let low = self.cell_id_for(bounds.min_lat, bounds.min_lng, max_level);
        let high = self.cell_id_for(bounds.max_lat, bounds.max_lng, max_level);

        let common: String = low
            .chars()
            .zip(high.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();

        if common.is_empty() { low } else { common }
    }

    /// Resolution policy: larger spans get coarser (shorter) cell ids, which
    /// broadens candidate lookups for large regions on purpose.
    pub fn level_for_bounds(bounds: &BBox, max_level: u8) -> u8 {
        let span = bounds.max_span();
        if span > COARSE_SPAN_DEGREES {
            COARSE_LEVEL
        } else if span > MEDIUM_SPAN_DEGREES {
            MEDIUM_LEVEL
        } else {
            max_level
        }
    }

    /// Cell assignment for a territory: size-appropriate level plus the
    /// covering cell at that level.
    pub fn assign(&self, bounds: &BBox, max_level: u8) -> (String, u8) {
        let level = Self::level_for_bounds(bounds, max_level);
        (self.covering_cell(bounds, level), level)
    }

    /// Prefix used for candidate-neighbor lookup: the cell id with its last
    /// digit stripped, searching one level coarser than the territory's own
    /// assignment to catch neighbors indexed at a different resolution.
    pub fn candidate_prefix(cell_id: &str) -> &str {
        match cell_id.char_indices().next_back() {
            Some((idx, _)) => &cell_id[..idx],
            None => "",
        }
    }
}
