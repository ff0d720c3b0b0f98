//! # Territoria
//!
//! An embedded spatial engine for territory management: it models named
//! geographic regions, buckets them into a quadtree index, measures
//! geometric overlap between neighbors, and infers a containment hierarchy
//! (which territory is a district of which city, which project is really a
//! phase of another) from geometry alone.
//!
//! ## Features
//!
//! - **Canonical geometry model**: points, lines, polygons and
//!   multi-polygons with centroid, bounds, area and GeoJSON round-tripping
//! - **OSM-style ingestion**: assemble node/way/relation graphs into
//!   canonical geometry plus tag metadata
//! - **Quadtree spatial index**: hierarchical base-4 cell addresses with
//!   prefix-based candidate lookup
//! - **Robust overlap engine**: directional containment percentages with
//!   self-union repair of invalid polygons
//! - **Hierarchy inference**: smallest-containing-parent selection,
//!   cycle-safe link writes, phase detection and conversion
//!
//! ## Quick Start
//!
//! ```rust
//! use territoria::{
//!     EngineConfig, Geometry, HierarchyEngine, MemoryCache, MemoryStore, Territory,
//! };
//!
//! fn main() -> territoria::Result<()> {
//!     let engine = HierarchyEngine::new(
//!         MemoryStore::new(),
//!         MemoryCache::new(),
//!         EngineConfig::default(),
//!     )?;
//!
//!     let city = Territory::new("City", Geometry::rect_polygon(15.0, 25.0, 40.0, 50.0))?;
//!     let district = Territory::new("District", Geometry::rect_polygon(18.0, 20.0, 44.0, 46.0))?;
//!
//!     let city_id = engine.insert_territory(city)?;
//!     let district_id = engine.insert_territory(district)?;
//!
//!     // The district is fully inside the city, so it gets parented there.
//!     let district = engine.get(&district_id)?.unwrap();
//!     assert_eq!(district.parent, Some(city_id));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod osm;
pub mod overlap;
pub mod spatial_index;
pub mod store;
pub mod types;

pub use cache::{MemoryCache, SuggestionCache};
pub use error::{Result, TerritoryError};
pub use geometry::Geometry;
pub use hierarchy::HierarchyEngine;
pub use osm::{
    AddressLevel, BoundaryGraph, BoundaryMeta, BoundarySource, ElementKind, RawNode, RawRelation,
    RawWay, RelationMember, RingRole, assemble,
};
pub use overlap::{OverlapOutcome, overlap_percentage};
pub use spatial_index::SpatialIndex;
pub use store::{Filter, MemoryStore, TerritoryStore};
pub use types::{BBox, EngineConfig, OverlapResult, PhaseSuggestion, Territory, TerritoryId};

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::cache::{MemoryCache, SuggestionCache};
    pub use crate::error::{Result, TerritoryError};
    pub use crate::geometry::Geometry;
    pub use crate::hierarchy::HierarchyEngine;
    pub use crate::overlap::{OverlapOutcome, overlap_percentage};
    pub use crate::spatial_index::SpatialIndex;
    pub use crate::store::{Filter, MemoryStore, TerritoryStore};
    pub use crate::types::{BBox, EngineConfig, PhaseSuggestion, Territory, TerritoryId};
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
