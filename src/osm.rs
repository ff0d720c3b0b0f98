//! Ingestion adapter for OSM-style boundary graphs.
//!
//! Converts a raw node/way/relation graph fetched from an external boundary
//! source into a canonical [`Geometry`] plus tag metadata. The adapter is a
//! pure transform: diagnostic logging only, no storage access, no network.

use crate::error::{Result, TerritoryError};
use crate::geometry::Geometry;
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Kind of the primary element a boundary graph describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// Split a prefixed source reference ("R12345", "W99", "N7") into its
    /// kind and bare id. Unprefixed references default to relations, the
    /// common case for administrative boundaries.
    pub fn parse_ref(source_ref: &str) -> (Self, &str) {
        match source_ref.chars().next() {
            Some('R' | 'r') => (Self::Relation, &source_ref[1..]),
            Some('W' | 'w') => (Self::Way, &source_ref[1..]),
            Some('N' | 'n') => (Self::Node, &source_ref[1..]),
            _ => (Self::Relation, source_ref),
        }
    }
}

/// A raw coordinate node.
#[derive(Debug, Clone)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
}

/// An ordered sequence of node references, possibly closed.
#[derive(Debug, Clone)]
pub struct RawWay {
    pub id: i64,
    pub node_refs: Vec<i64>,
}

impl RawWay {
    fn is_closed(&self) -> bool {
        match (self.node_refs.first(), self.node_refs.last()) {
            (Some(first), Some(last)) => first == last,
            _ => false,
        }
    }
}

/// Role of a way inside a boundary relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RingRole {
    #[default]
    Outer,
    Inner,
}

/// One member way of a boundary relation.
#[derive(Debug, Clone)]
pub struct RelationMember {
    pub way_ref: i64,
    pub role: RingRole,
}

/// A boundary relation: ways tagged outer/inner.
#[derive(Debug, Clone)]
pub struct RawRelation {
    pub id: i64,
    pub members: Vec<RelationMember>,
}

/// A raw boundary graph as returned by the external boundary source.
#[derive(Debug, Clone)]
pub struct BoundaryGraph {
    pub kind: ElementKind,
    /// Id of the element the graph was fetched for.
    pub primary_id: i64,
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
    pub relation: Option<RawRelation>,
    /// Free-form tag metadata of the primary element.
    pub tags: BTreeMap<String, String>,
}

/// Metadata extracted from a boundary graph's tags.
///
/// Missing tags default to the empty string; tags outside the fixed field
/// set are preserved in `extra_tags`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryMeta {
    pub name: String,
    pub name_localized: String,
    pub wikidata: String,
    pub admin_level: String,
    pub boundary_kind: String,
    pub border_type: String,
    pub place: String,
    pub landuse: String,
    pub extra_tags: BTreeMap<String, String>,
}

/// One level of a reverse-geocoded address hierarchy, coarse to fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressLevel {
    pub name: String,
    /// Territory kind label ("Country", "City", "Neighborhood", ...).
    pub kind: String,
}

/// External boundary source.
///
/// Fetching is outside the core's concurrency domain; implementations do
/// whatever I/O they need and hand back a plain graph or address chain.
pub trait BoundarySource {
    /// Fetch the raw graph for a source reference, or `None` if unknown.
    fn fetch_boundary(&self, source_ref: &str) -> Result<Option<BoundaryGraph>>;

    /// Reverse-geocode a coordinate into an address hierarchy, coarse to
    /// fine, or `None` when the location cannot be resolved.
    fn locate(&self, lat: f64, lng: f64) -> Result<Option<Vec<AddressLevel>>>;
}

/// Assemble a boundary graph into a canonical geometry plus metadata.
///
/// - A node becomes a Point.
/// - A way becomes a Polygon when its node sequence is closed with at
///   least 4 points after closing, otherwise a LineString.
/// - A relation becomes a MultiPolygon from its outer-role ways; inner
///   rings are attached to every outer ring (exact hole-to-ring
///   association is not computed). A relation with zero usable outer
///   rings fails with [`TerritoryError::GeometryAssembly`].
pub fn assemble(graph: &BoundaryGraph) -> Result<(Geometry, BoundaryMeta)> {
    let meta = extract_meta(&graph.tags);
    let geometry = match graph.kind {
        ElementKind::Node => assemble_node(graph)?,
        ElementKind::Way => assemble_way(graph)?,
        ElementKind::Relation => assemble_relation(graph)?,
    };
    Ok((geometry, meta))
}

fn extract_meta(tags: &BTreeMap<String, String>) -> BoundaryMeta {
    let tag = |key: &str| tags.get(key).cloned().unwrap_or_default();
    let name = tag("name");

    let known = [
        "name",
        "name:en",
        "wikidata",
        "admin_level",
        "boundary",
        "border_type",
        "place",
        "landuse",
    ];
    let extra_tags: BTreeMap<String, String> = tags
        .iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    BoundaryMeta {
        name_localized: tags.get("name:en").cloned().unwrap_or_else(|| name.clone()),
        name,
        wikidata: tag("wikidata"),
        admin_level: tag("admin_level"),
        boundary_kind: tag("boundary"),
        border_type: tag("border_type"),
        place: tag("place"),
        landuse: tag("landuse"),
        extra_tags,
    }
}

fn node_map(graph: &BoundaryGraph) -> BTreeMap<i64, &RawNode> {
    graph.nodes.iter().map(|n| (n.id, n)).collect()
}

fn assemble_node(graph: &BoundaryGraph) -> Result<Geometry> {
    let node = graph
        .nodes
        .iter()
        .find(|n| n.id == graph.primary_id)
        .or_else(|| graph.nodes.first())
        .ok_or_else(|| {
            TerritoryError::GeometryAssembly(format!(
                "node {} has no coordinates",
                graph.primary_id
            ))
        })?;
    Ok(Geometry::Point(Point::new(node.lng, node.lat)))
}

fn assemble_way(graph: &BoundaryGraph) -> Result<Geometry> {
    let way = graph
        .ways
        .iter()
        .find(|w| w.id == graph.primary_id)
        .or_else(|| graph.ways.first())
        .ok_or_else(|| {
            TerritoryError::GeometryAssembly(format!("way {} not present", graph.primary_id))
        })?;

    let nodes = node_map(graph);
    let coords = resolve_coords(way, &nodes);
    if coords.is_empty() {
        return Err(TerritoryError::GeometryAssembly(format!(
            "way {} resolved to no coordinates",
            way.id
        )));
    }

    if way.is_closed() && coords.len() >= 4 {
        Ok(Geometry::Polygon(Polygon::new(
            LineString::from(coords),
            vec![],
        )))
    } else {
        Ok(Geometry::LineString(LineString::from(coords)))
    }
}

fn assemble_relation(graph: &BoundaryGraph) -> Result<Geometry> {
    let relation = graph.relation.as_ref().ok_or_else(|| {
        TerritoryError::GeometryAssembly(format!(
            "relation {} has no member data",
            graph.primary_id
        ))
    })?;

    let nodes = node_map(graph);
    let ways: BTreeMap<i64, &RawWay> = graph.ways.iter().map(|w| (w.id, w)).collect();

    debug!(
        "assembling relation {}: {} nodes, {} ways, {} members",
        relation.id,
        graph.nodes.len(),
        graph.ways.len(),
        relation.members.len()
    );

    let mut outer_rings: Vec<LineString<f64>> = Vec::new();
    let mut inner_rings: Vec<LineString<f64>> = Vec::new();

    for member in &relation.members {
        let Some(way) = ways.get(&member.way_ref) else {
            continue;
        };

        let mut coords = resolve_coords(way, &nodes);

        // Close the loop when the way is closed by reference but a missing
        // node left the coordinate list open.
        if let (Some(first), Some(last)) = (coords.first().copied(), coords.last()) {
            if first != *last && way.is_closed() {
                coords.push(first);
            }
        }

        if coords.len() >= 4 {
            let ring = LineString::from(coords);
            match member.role {
                RingRole::Inner => inner_rings.push(ring),
                RingRole::Outer => outer_rings.push(ring),
            }
        }
    }

    if outer_rings.is_empty() {
        warn!("no valid outer rings for relation {}", relation.id);
        return Err(TerritoryError::GeometryAssembly(format!(
            "relation {} has no usable outer rings",
            relation.id
        )));
    }

    let polygons: Vec<Polygon<f64>> = outer_rings
        .into_iter()
        .map(|outer| Polygon::new(outer, inner_rings.clone()))
        .collect();

    debug!("assembled MultiPolygon with {} outer rings", polygons.len());
    Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
}

fn resolve_coords(way: &RawWay, nodes: &BTreeMap<i64, &RawNode>) -> Vec<Coord<f64>> {
    way.node_refs
        .iter()
        .filter_map(|node_ref| nodes.get(node_ref))
        .map(|node| Coord {
            x: node.lng,
            y: node.lat,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn square_nodes(base: i64, min_lat: f64, min_lng: f64, side: f64) -> Vec<RawNode> {
        vec![
            RawNode {
                id: base,
                lat: min_lat,
                lng: min_lng,
            },
            RawNode {
                id: base + 1,
                lat: min_lat,
                lng: min_lng + side,
            },
            RawNode {
                id: base + 2,
                lat: min_lat + side,
                lng: min_lng + side,
            },
            RawNode {
                id: base + 3,
                lat: min_lat + side,
                lng: min_lng,
            },
        ]
    }

    #[test]
    fn test_parse_ref() {
        assert_eq!(ElementKind::parse_ref("R12345"), (ElementKind::Relation, "12345"));
        assert_eq!(ElementKind::parse_ref("w99"), (ElementKind::Way, "99"));
        assert_eq!(ElementKind::parse_ref("N7"), (ElementKind::Node, "7"));
        assert_eq!(ElementKind::parse_ref("12345"), (ElementKind::Relation, "12345"));
    }

    #[test]
    fn test_node_becomes_point() {
        let graph = BoundaryGraph {
            kind: ElementKind::Node,
            primary_id: 1,
            nodes: vec![RawNode {
                id: 1,
                lat: 25.2,
                lng: 55.3,
            }],
            ways: vec![],
            relation: None,
            tags: tags(&[("name", "Landmark")]),
        };

        let (geometry, meta) = assemble(&graph).unwrap();
        assert_eq!(geometry, Geometry::Point(Point::new(55.3, 25.2)));
        assert_eq!(meta.name, "Landmark");
    }

    #[test]
    fn test_closed_way_becomes_polygon() {
        let graph = BoundaryGraph {
            kind: ElementKind::Way,
            primary_id: 10,
            nodes: square_nodes(1, 25.0, 55.0, 0.1),
            ways: vec![RawWay {
                id: 10,
                node_refs: vec![1, 2, 3, 4, 1],
            }],
            relation: None,
            tags: tags(&[("name", "Block")]),
        };

        let (geometry, _) = assemble(&graph).unwrap();
        assert!(matches!(geometry, Geometry::Polygon(_)));
        assert!(geometry.area() > 0.0);
    }

    #[test]
    fn test_open_way_becomes_linestring() {
        let graph = BoundaryGraph {
            kind: ElementKind::Way,
            primary_id: 10,
            nodes: square_nodes(1, 25.0, 55.0, 0.1),
            ways: vec![RawWay {
                id: 10,
                node_refs: vec![1, 2, 3, 4],
            }],
            relation: None,
            tags: BTreeMap::new(),
        };

        let (geometry, _) = assemble(&graph).unwrap();
        assert!(matches!(geometry, Geometry::LineString(_)));
        assert_eq!(geometry.area(), 0.0);
    }

    #[test]
    fn test_short_closed_way_stays_linestring() {
        // Closed by reference but only 3 coordinates: not enough for a ring.
        let graph = BoundaryGraph {
            kind: ElementKind::Way,
            primary_id: 10,
            nodes: square_nodes(1, 25.0, 55.0, 0.1),
            ways: vec![RawWay {
                id: 10,
                node_refs: vec![1, 2, 1],
            }],
            relation: None,
            tags: BTreeMap::new(),
        };

        let (geometry, _) = assemble(&graph).unwrap();
        assert!(matches!(geometry, Geometry::LineString(_)));
    }

    #[test]
    fn test_relation_becomes_multipolygon_with_holes() {
        let mut nodes = square_nodes(1, 25.0, 55.0, 1.0);
        nodes.extend(square_nodes(11, 25.3, 55.3, 0.2));

        let graph = BoundaryGraph {
            kind: ElementKind::Relation,
            primary_id: 100,
            nodes,
            ways: vec![
                RawWay {
                    id: 20,
                    node_refs: vec![1, 2, 3, 4, 1],
                },
                RawWay {
                    id: 21,
                    node_refs: vec![11, 12, 13, 14, 11],
                },
            ],
            relation: Some(RawRelation {
                id: 100,
                members: vec![
                    RelationMember {
                        way_ref: 20,
                        role: RingRole::Outer,
                    },
                    RelationMember {
                        way_ref: 21,
                        role: RingRole::Inner,
                    },
                ],
            }),
            tags: tags(&[("name", "District"), ("admin_level", "9")]),
        };

        let (geometry, meta) = assemble(&graph).unwrap();
        let Geometry::MultiPolygon(mp) = &geometry else {
            panic!("expected MultiPolygon");
        };
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert_eq!(meta.admin_level, "9");

        // Hole area is subtracted: 1.0 - 0.04.
        assert!((geometry.area() - 0.96).abs() < 1e-9);
    }

    #[test]
    fn test_relation_without_outer_rings_fails() {
        let graph = BoundaryGraph {
            kind: ElementKind::Relation,
            primary_id: 100,
            nodes: square_nodes(1, 25.0, 55.0, 0.2),
            ways: vec![RawWay {
                id: 20,
                node_refs: vec![1, 2, 3, 4, 1],
            }],
            relation: Some(RawRelation {
                id: 100,
                members: vec![RelationMember {
                    way_ref: 20,
                    role: RingRole::Inner,
                }],
            }),
            tags: BTreeMap::new(),
        };

        assert!(matches!(
            assemble(&graph),
            Err(TerritoryError::GeometryAssembly(_))
        ));
    }

    #[test]
    fn test_missing_relation_member_ways_are_skipped() {
        let graph = BoundaryGraph {
            kind: ElementKind::Relation,
            primary_id: 100,
            nodes: square_nodes(1, 25.0, 55.0, 1.0),
            ways: vec![RawWay {
                id: 20,
                node_refs: vec![1, 2, 3, 4, 1],
            }],
            relation: Some(RawRelation {
                id: 100,
                members: vec![
                    RelationMember {
                        way_ref: 20,
                        role: RingRole::Outer,
                    },
                    RelationMember {
                        way_ref: 999,
                        role: RingRole::Outer,
                    },
                ],
            }),
            tags: BTreeMap::new(),
        };

        let (geometry, _) = assemble(&graph).unwrap();
        let Geometry::MultiPolygon(mp) = &geometry else {
            panic!("expected MultiPolygon");
        };
        assert_eq!(mp.0.len(), 1);
    }

    #[test]
    fn test_meta_defaults_and_extra_tags() {
        let graph_tags = tags(&[
            ("name", "Marina"),
            ("name:en", "The Marina"),
            ("boundary", "administrative"),
            ("unknown:tag", "kept"),
        ]);
        let meta = extract_meta(&graph_tags);

        assert_eq!(meta.name, "Marina");
        assert_eq!(meta.name_localized, "The Marina");
        assert_eq!(meta.boundary_kind, "administrative");
        assert_eq!(meta.admin_level, "");
        assert_eq!(meta.place, "");
        assert_eq!(meta.extra_tags.get("unknown:tag").unwrap(), "kept");
        assert!(!meta.extra_tags.contains_key("name"));
    }

    #[test]
    fn test_localized_name_falls_back_to_name() {
        let meta = extract_meta(&tags(&[("name", "Marina")]));
        assert_eq!(meta.name_localized, "Marina");
    }
}
