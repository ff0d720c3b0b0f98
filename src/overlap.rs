//! Robust containment-percentage computation between territory geometries.
//!
//! Overlap is directional: `overlap_percentage(a, b)` measures how much of
//! `a` falls inside `b`. Callers test both directions by swapping operands.
//!
//! Invalid polygons get a self-union repair (the boolean-ops analogue of a
//! zero-distance buffer) before measuring. Repair failure is not an error:
//! it degrades to an explicit [`OverlapOutcome::Degraded`] so callers can
//! tell "measured as zero" apart from "candidate unusable".

use crate::geometry::Geometry;
use geo::{Area, BooleanOps, MultiPolygon, Validation};
use log::{debug, warn};

/// Outcome of one directional overlap measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlapOutcome {
    /// Overlap percentage in `[0, 100]`.
    Measured(f64),
    /// Geometry could not be made usable; treat as excluded, not as zero.
    Degraded(&'static str),
}

impl OverlapOutcome {
    /// The measured percentage, or `0.0` when degraded.
    pub fn value(&self) -> f64 {
        match self {
            Self::Measured(pct) => *pct,
            Self::Degraded(_) => 0.0,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Percentage of `subject`'s area covered by its intersection with
/// `reference`.
///
/// Non-areal subjects (points, lines) and zero-area subjects measure as
/// `0.0`. Not symmetric.
///
/// # Examples
///
/// ```rust
/// use territoria::{Geometry, overlap_percentage};
///
/// let outer = Geometry::rect_polygon(15.0, 25.0, 40.0, 50.0);
/// let inner = Geometry::rect_polygon(18.0, 20.0, 44.0, 46.0);
///
/// assert_eq!(overlap_percentage(&inner, &outer).value(), 100.0);
/// assert_eq!(overlap_percentage(&outer, &inner).value(), 4.0);
/// ```
pub fn overlap_percentage(subject: &Geometry, reference: &Geometry) -> OverlapOutcome {
    let Some(mut subj) = subject.to_multi_polygon() else {
        return OverlapOutcome::Measured(0.0);
    };
    let Some(mut refr) = reference.to_multi_polygon() else {
        return OverlapOutcome::Measured(0.0);
    };

    if !subj.is_valid() || !refr.is_valid() {
        debug!("repairing invalid geometry before overlap measurement");
        subj = repair(&subj);
        refr = repair(&refr);

        if subj.0.is_empty() || refr.0.is_empty() || !subj.is_valid() || !refr.is_valid() {
            warn!("geometry repair failed; excluding candidate from overlap scoring");
            return OverlapOutcome::Degraded("geometry repair failed");
        }
    }

    let subject_area = subj.unsigned_area();
    if subject_area == 0.0 {
        return OverlapOutcome::Measured(0.0);
    }

    let intersection_area = subj.intersection(&refr).unsigned_area();
    OverlapOutcome::Measured((100.0 * intersection_area / subject_area).clamp(0.0, 100.0))
}

/// Self-union normalization: heals self-intersections and ring-order issues
/// the same way a zero-distance buffer does.
fn repair(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.union(&MultiPolygon::new(vec![]))
}
