//! Core types and configuration for territoria.
//!
//! This module provides the territory record type, bounding boxes, and the
//! serializable engine configuration.

use crate::error::{Result, TerritoryError};
use crate::geometry::Geometry;
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Stable unique identifier for a territory, assigned on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerritoryId(Uuid);

impl TerritoryId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TerritoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TerritoryId {
    type Err = TerritoryError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TerritoryError::InvalidInput(format!("invalid territory id '{}': {}", s, e)))
    }
}

/// A latitude/longitude bounding box.
///
/// # Examples
///
/// ```rust
/// use territoria::BBox;
///
/// let a = BBox::new(40.70, 40.80, -74.02, -73.93).unwrap();
/// let b = BBox::new(40.75, 40.85, -73.95, -73.85).unwrap();
/// assert!(a.intersects(&b));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BBox {
    /// Create a bounding box, validating coordinate order.
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Result<Self> {
        if min_lat > max_lat {
            return Err(TerritoryError::InvalidInput(format!(
                "min_lat ({}) must be <= max_lat ({})",
                min_lat, max_lat
            )));
        }
        if min_lng > max_lng {
            return Err(TerritoryError::InvalidInput(format!(
                "min_lng ({}) must be <= max_lng ({})",
                min_lng, max_lng
            )));
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Latitude extent in degrees.
    #[inline]
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude extent in degrees.
    #[inline]
    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// The larger of the two extents; drives quadtree level selection.
    #[inline]
    pub fn max_span(&self) -> f64 {
        self.lat_span().max(self.lng_span())
    }

    /// Exact bbox-overlap test on both axes.
    #[inline]
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
    }

    /// Check whether a coordinate falls inside (inclusive on all edges).
    #[inline]
    pub fn contains_point(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    /// Smallest box covering both operands.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    /// Expand the box by `degrees` on every side.
    pub fn buffered(&self, degrees: f64) -> BBox {
        BBox {
            min_lat: self.min_lat - degrees,
            max_lat: self.max_lat + degrees,
            min_lng: self.min_lng - degrees,
            max_lng: self.max_lng + degrees,
        }
    }
}

/// Ephemeral per-candidate comparison value produced by the overlap engine.
#[derive(Debug, Clone)]
pub struct OverlapResult {
    /// The candidate territory compared against.
    pub other: TerritoryId,
    /// Directional overlap percentage in `[0, 100]`.
    pub percentage: f64,
    /// Planar area (degrees squared) of the candidate's geometry.
    pub area: f64,
}

/// A staged suggestion that an existing project is really a phase of another.
///
/// Serialized into the suggestion cache; applied only through
/// [`crate::hierarchy::HierarchyEngine::convert_to_phases`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSuggestion {
    pub id: String,
    pub name: String,
}

/// A named geographic region with an inferred place in a containment
/// hierarchy.
///
/// Fields are fixed and typed; sourced metadata outside the known set lands
/// in `extra_tags` rather than being bound dynamically.
#[derive(Debug, Clone)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub name_localized: String,
    pub geometry: Geometry,
    /// Always the bounding box of `geometry`; recomputed on geometry change.
    pub bounds: BBox,
    /// Hierarchical quadtree cell address (base-4 digit string).
    pub spatial_cell: String,
    /// Resolution the cell was assigned at; larger spans get coarser levels.
    pub quadtree_level: u8,
    pub parent: Option<TerritoryId>,
    pub is_project: bool,
    pub is_phase: bool,
    pub is_custom: bool,
    /// Administrative level tag from the boundary source ("" when absent).
    pub admin_level: String,
    /// Boundary classification tag from the source ("" when absent).
    pub boundary_kind: String,
    /// Upstream element reference (e.g. "R12345"), if sourced externally.
    pub source_ref: Option<String>,
    /// Sourced tags outside the fixed field set.
    pub extra_tags: BTreeMap<String, String>,
}

impl Territory {
    /// Create a territory from a name and geometry.
    ///
    /// Bounds are derived from the geometry; degenerate geometry (no
    /// vertices) is rejected up front so no record exists without a valid
    /// bounding box.
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Result<Self> {
        let name = name.into();
        let bounds = geometry.bounding_box().ok_or_else(|| {
            TerritoryError::GeometryAssembly(format!("territory '{}' has empty geometry", name))
        })?;

        Ok(Self {
            id: TerritoryId::new(),
            name_localized: name.clone(),
            name,
            geometry,
            bounds,
            spatial_cell: String::new(),
            quadtree_level: 0,
            parent: None,
            is_project: false,
            is_phase: false,
            is_custom: false,
            admin_level: String::new(),
            boundary_kind: String::new(),
            source_ref: None,
            extra_tags: BTreeMap::new(),
        })
    }

    /// Flag this territory as a development project.
    pub fn mark_project(mut self) -> Self {
        self.is_project = true;
        self
    }

    /// Flag this territory as user-drawn rather than sourced.
    pub fn mark_custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    /// Replace the geometry, recomputing bounds to keep the invariant.
    pub fn set_geometry(&mut self, geometry: Geometry) -> Result<()> {
        let bounds = geometry.bounding_box().ok_or_else(|| {
            TerritoryError::GeometryAssembly(format!(
                "replacement geometry for '{}' is empty",
                self.name
            ))
        })?;
        self.geometry = geometry;
        self.bounds = bounds;
        Ok(())
    }

    /// Arithmetic-mean centroid of the geometry, if it has vertices.
    pub fn centroid(&self) -> Option<geo::Point<f64>> {
        self.geometry.centroid()
    }
}

/// Engine configuration.
///
/// Serializable so deployments can load thresholds from JSON.
///
/// # Example
///
/// ```rust
/// use territoria::EngineConfig;
///
/// let json = r#"{
///     "containment_threshold": 85.0,
///     "suggestion_ttl_seconds": 3600
/// }"#;
/// let config = EngineConfig::from_json(json).unwrap();
/// assert_eq!(config.containment_threshold, 85.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Overlap percentage at or above which a candidate counts as
    /// contained for hierarchy purposes.
    #[serde(default = "EngineConfig::default_containment_threshold")]
    pub containment_threshold: f64,

    /// Overlap percentage at or above which a contained project is staged
    /// as a phase suggestion.
    #[serde(default = "EngineConfig::default_phase_threshold")]
    pub phase_threshold: f64,

    /// Buffer added around the dataset's bounds union when snapshotting
    /// the spatial index root.
    #[serde(default = "EngineConfig::default_root_buffer_degrees")]
    pub root_buffer_degrees: f64,

    /// Index root used when no territories exist yet.
    #[serde(default = "EngineConfig::default_region")]
    pub default_region: BBox,

    /// TTL for staged phase suggestions.
    #[serde(default = "EngineConfig::default_suggestion_ttl_seconds")]
    pub suggestion_ttl_seconds: u64,

    /// Finest quadtree resolution assigned to small territories.
    #[serde(default = "EngineConfig::default_max_cell_level")]
    pub max_cell_level: u8,
}

impl EngineConfig {
    const fn default_containment_threshold() -> f64 {
        80.0
    }

    const fn default_phase_threshold() -> f64 {
        95.0
    }

    const fn default_root_buffer_degrees() -> f64 {
        5.0
    }

    const fn default_suggestion_ttl_seconds() -> u64 {
        86_400
    }

    const fn default_max_cell_level() -> u8 {
        6
    }

    const fn default_region() -> BBox {
        // Middle East; matches the original deployment's dataset.
        BBox {
            min_lat: 12.0,
            max_lat: 32.0,
            min_lng: 35.0,
            max_lng: 60.0,
        }
    }

    pub fn with_containment_threshold(mut self, threshold: f64) -> Self {
        self.containment_threshold = threshold;
        self
    }

    pub fn with_phase_threshold(mut self, threshold: f64) -> Self {
        self.phase_threshold = threshold;
        self
    }

    pub fn with_default_region(mut self, region: BBox) -> Self {
        self.default_region = region;
        self
    }

    pub fn with_suggestion_ttl_seconds(mut self, seconds: u64) -> Self {
        self.suggestion_ttl_seconds = seconds;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=100.0).contains(&self.containment_threshold) {
            return Err("Containment threshold must be within 0-100".to_string());
        }
        if !(0.0..=100.0).contains(&self.phase_threshold) {
            return Err("Phase threshold must be within 0-100".to_string());
        }
        if self.root_buffer_degrees < 0.0 || !self.root_buffer_degrees.is_finite() {
            return Err("Root buffer must be a non-negative finite number".to_string());
        }
        if self.default_region.min_lat > self.default_region.max_lat
            || self.default_region.min_lng > self.default_region.max_lng
        {
            return Err("Default region has inverted bounds".to_string());
        }
        if self.max_cell_level == 0 || self.max_cell_level > 16 {
            return Err("Max cell level must be between 1 and 16".to_string());
        }
        Ok(())
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            containment_threshold: Self::default_containment_threshold(),
            phase_threshold: Self::default_phase_threshold(),
            root_buffer_degrees: Self::default_root_buffer_degrees(),
            default_region: Self::default_region(),
            suggestion_ttl_seconds: Self::default_suggestion_ttl_seconds(),
            max_cell_level: Self::default_max_cell_level(),
        }
    }
}
