//! Canonical geometry model wrapping the `geo` crate.
//!
//! Territories carry one [`Geometry`] value. This module provides the
//! centroid, bounding box, and area/intersection operations the spatial index
//! and overlap engine build on, plus exact GeoJSON round-tripping for the
//! storage wire format.
//!
//! Degenerate geometry (empty coordinate lists, zero-length rings) yields
//! `None`/`0.0` rather than failing; callers check before use.

use crate::error::{Result, TerritoryError};
use crate::types::BBox;
use geo::{Area, BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Point, Polygon, Relate};
use geojson::Value;

/// Canonical representation of a territory boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    LineString(LineString<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Geometry {
    /// Build an axis-aligned rectangular polygon (closed 5-point ring).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use territoria::Geometry;
    ///
    /// let square = Geometry::rect_polygon(15.0, 25.0, 40.0, 50.0);
    /// assert_eq!(square.area(), 100.0);
    /// ```
    pub fn rect_polygon(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        let ring = LineString::from(vec![
            Coord {
                x: min_lng,
                y: min_lat,
            },
            Coord {
                x: max_lng,
                y: min_lat,
            },
            Coord {
                x: max_lng,
                y: max_lat,
            },
            Coord {
                x: min_lng,
                y: max_lat,
            },
            Coord {
                x: min_lng,
                y: min_lat,
            },
        ]);
        Self::Polygon(Polygon::new(ring, vec![]))
    }

    /// Arithmetic-mean centroid.
    ///
    /// A Point is its own centroid. For a Polygon this is the mean of the
    /// outer-ring vertices, not the area-weighted centroid; the
    /// approximation is intentional for speed. For a MultiPolygon the mean
    /// is taken over the constituent with the most outer-ring vertices,
    /// a proxy for the largest part.
    pub fn centroid(&self) -> Option<Point<f64>> {
        match self {
            Self::Point(p) => Some(*p),
            Self::LineString(line) => mean_of_ring(line),
            Self::Polygon(poly) => mean_of_ring(poly.exterior()),
            Self::MultiPolygon(mp) => {
                let largest = mp
                    .0
                    .iter()
                    .max_by_key(|poly| poly.exterior().0.len())?;
                mean_of_ring(largest.exterior())
            }
        }
    }

    /// Exact min/max bounding box over all vertices of all rings/parts.
    pub fn bounding_box(&self) -> Option<BBox> {
        let rect = match self {
            Self::Point(p) => Some(p.bounding_rect()),
            Self::LineString(line) => line.bounding_rect(),
            Self::Polygon(poly) => poly.bounding_rect(),
            Self::MultiPolygon(mp) => mp.bounding_rect(),
        }?;

        Some(BBox {
            min_lat: rect.min().y,
            max_lat: rect.max().y,
            min_lng: rect.min().x,
            max_lng: rect.max().x,
        })
    }

    /// Planar unsigned area in degrees squared.
    ///
    /// Point and LineString geometries have zero area.
    pub fn area(&self) -> f64 {
        match self {
            Self::Point(_) | Self::LineString(_) => 0.0,
            Self::Polygon(poly) => poly.unsigned_area(),
            Self::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }

    /// Planar area of the intersection of two geometries.
    ///
    /// Non-areal operands contribute nothing.
    pub fn intersection_area(&self, other: &Geometry) -> f64 {
        match (self.to_multi_polygon(), other.to_multi_polygon()) {
            (Some(a), Some(b)) => a.intersection(&b).unsigned_area(),
            _ => 0.0,
        }
    }

    /// Topological containment test: does `self` contain `inner`?
    pub fn contains(&self, inner: &Geometry) -> bool {
        match (self.to_multi_polygon(), inner.to_multi_polygon()) {
            (Some(outer), Some(inner)) => outer.relate(&inner).is_contains(),
            _ => false,
        }
    }

    /// Normalize areal geometry to a MultiPolygon for set operations.
    ///
    /// Returns `None` for Point/LineString and for polygons without a
    /// usable outer ring.
    pub fn to_multi_polygon(&self) -> Option<MultiPolygon<f64>> {
        match self {
            Self::Point(_) | Self::LineString(_) => None,
            Self::Polygon(poly) => {
                if poly.exterior().0.len() < 4 {
                    return None;
                }
                Some(MultiPolygon::new(vec![poly.clone()]))
            }
            Self::MultiPolygon(mp) => {
                let usable: Vec<Polygon<f64>> = mp
                    .0
                    .iter()
                    .filter(|poly| poly.exterior().0.len() >= 4)
                    .cloned()
                    .collect();
                if usable.is_empty() {
                    None
                } else {
                    Some(MultiPolygon::new(usable))
                }
            }
        }
    }

    /// Serialize as a GeoJSON geometry string (`[lng, lat]` positions).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use territoria::Geometry;
    ///
    /// let square = Geometry::rect_polygon(15.0, 25.0, 40.0, 50.0);
    /// let json = square.to_geojson().unwrap();
    /// assert!(json.contains("Polygon"));
    /// ```
    pub fn to_geojson(&self) -> Result<String> {
        let value = match self {
            Self::Point(p) => Value::Point(vec![p.x(), p.y()]),
            Self::LineString(line) => Value::LineString(ring_positions(line)),
            Self::Polygon(poly) => Value::Polygon(polygon_positions(poly)),
            Self::MultiPolygon(mp) => {
                Value::MultiPolygon(mp.0.iter().map(polygon_positions).collect())
            }
        };

        let geom = geojson::Geometry::new(value);
        Ok(serde_json::to_string(&geom)?)
    }

    /// Parse from a GeoJSON geometry string.
    ///
    /// Outer rings that fail to repeat their first point are closed during
    /// parsing (a best-effort repair, not a validity guarantee). Round-trips
    /// exactly for well-formed input.
    pub fn from_geojson(geojson_str: &str) -> Result<Self> {
        let geom: geojson::Geometry = serde_json::from_str(geojson_str)?;

        match geom.value {
            Value::Point(coords) => {
                let (x, y) = position(&coords)?;
                Ok(Self::Point(Point::new(x, y)))
            }
            Value::LineString(positions) => {
                if positions.is_empty() {
                    return Err(TerritoryError::GeometryAssembly(
                        "LineString has no coordinates".to_string(),
                    ));
                }
                Ok(Self::LineString(positions_to_ring(&positions, false)?))
            }
            Value::Polygon(rings) => Ok(Self::Polygon(rings_to_polygon(&rings)?)),
            Value::MultiPolygon(parts) => {
                if parts.is_empty() {
                    return Err(TerritoryError::GeometryAssembly(
                        "MultiPolygon has no parts".to_string(),
                    ));
                }
                let polygons: Result<Vec<Polygon<f64>>> =
                    parts.iter().map(|rings| rings_to_polygon(rings)).collect();
                Ok(Self::MultiPolygon(MultiPolygon::new(polygons?)))
            }
            other => Err(TerritoryError::GeometryAssembly(format!(
                "unsupported GeoJSON geometry: {}",
                other.type_name()
            ))),
        }
    }
}

fn mean_of_ring(ring: &LineString<f64>) -> Option<Point<f64>> {
    if ring.0.is_empty() {
        return None;
    }
    let n = ring.0.len() as f64;
    let (sx, sy) = ring
        .0
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(Point::new(sx / n, sy / n))
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_positions(poly: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    let mut rings = Vec::with_capacity(1 + poly.interiors().len());
    rings.push(ring_positions(poly.exterior()));
    for interior in poly.interiors() {
        rings.push(ring_positions(interior));
    }
    rings
}

fn position(coords: &[f64]) -> Result<(f64, f64)> {
    if coords.len() < 2 {
        return Err(TerritoryError::GeometryAssembly(
            "position must have at least 2 values".to_string(),
        ));
    }
    Ok((coords[0], coords[1]))
}

fn positions_to_ring(positions: &[Vec<f64>], close: bool) -> Result<LineString<f64>> {
    let coords: Result<Vec<Coord<f64>>> = positions
        .iter()
        .map(|pos| {
            let (x, y) = position(pos)?;
            Ok(Coord { x, y })
        })
        .collect();
    let mut ring = LineString::from(coords?);
    if close {
        ring.close();
    }
    Ok(ring)
}

fn rings_to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    if rings.is_empty() {
        return Err(TerritoryError::GeometryAssembly(
            "Polygon must have at least one ring".to_string(),
        ));
    }

    let exterior = positions_to_ring(&rings[0], true)?;
    let interiors: Result<Vec<LineString<f64>>> = rings[1..]
        .iter()
        .map(|ring| positions_to_ring(ring, true))
        .collect();

    Ok(Polygon::new(exterior, interiors?))
}
