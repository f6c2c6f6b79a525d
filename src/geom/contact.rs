//! Exposed surface areas and inter-segment contact areas.
//!
//! Adjacent segments touch along an axis-aligned plane declared by the
//! caller. The contact area of a pair is the total area of the lower
//! segment's triangles lying entirely on that plane. Each segment's exposed
//! area is its raw triangle area minus all of its contacts.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::Point;
use crate::error::{Error, Result};
use crate::geom::mesh::SegmentedMesh;

/// Coordinate axis used to describe a boundary plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn coordinate(&self, p: &Point) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
            Axis::Z => p.z,
        }
    }
}

/// Declared boundary between two segments: the plane `axis == level`.
///
/// Triangles of `lower` lying on the plane make up the contact area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPlane {
    pub lower: usize,
    pub upper: usize,
    pub axis: Axis,
    pub level: f64,
}

impl ContactPlane {
    pub fn new(lower: usize, upper: usize, axis: Axis, level: f64) -> Self {
        Self {
            lower,
            upper,
            axis,
            level,
        }
    }

    /// Builds the linear chain `0-1, 1-2, ...` with one level per junction.
    pub fn chain(axis: Axis, levels: &[f64]) -> Vec<Self> {
        levels
            .iter()
            .enumerate()
            .map(|(i, &level)| Self::new(i, i + 1, axis, level))
            .collect()
    }
}

/// Describes every declared plane that does not fit a mesh of `n` segments.
pub fn plane_problems(planes: &[ContactPlane], n: usize) -> Vec<String> {
    let mut problems = Vec::new();
    for (k, plane) in planes.iter().enumerate() {
        if plane.lower >= n || plane.upper >= n {
            problems.push(format!(
                "contacts[{k}]: segment pair ({}, {}) out of range for {n} segments",
                plane.lower, plane.upper
            ));
        } else if plane.lower == plane.upper {
            problems.push(format!("contacts[{k}]: segment {} touches itself", plane.lower));
        }
        if !plane.level.is_finite() {
            problems.push(format!("contacts[{k}]: level must be finite"));
        }
    }
    problems
}

/// Returns the total area of the triangles of segment `segment` whose three
/// vertices lie on the plane `axis == level`.
///
/// With `tolerance == 0.0` the comparison is exact equality. `segment` must
/// already be checked by [`plane_problems`].
fn plane_contact_area(
    mesh: &SegmentedMesh,
    segment: usize,
    axis: Axis,
    level: f64,
    tolerance: f64,
) -> f64 {
    let vertices = mesh.vertices();
    let on_plane = |p: &Point| (axis.coordinate(p) - level).abs() <= tolerance;
    mesh.segments()[segment]
        .faces
        .iter()
        .filter(|face| face.points(vertices).iter().all(on_plane))
        .map(|face| face.area(vertices))
        .sum()
}

/// Geometric quantities derived from a [`SegmentedMesh`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContactAreas {
    /// Exposed area per segment (raw area minus all contacts).
    pub segment_areas: Vec<f64>,
    /// Symmetric, zero-diagonal contact area matrix.
    pub contact_matrix: Vec<Vec<f64>>,
    /// Sum of triangle areas per segment.
    pub raw_areas: Vec<f64>,
}

impl ContactAreas {
    /// Computes segment and contact areas for the declared planes.
    ///
    /// Several planes may be declared for the same pair; their areas add up.
    pub fn compute(mesh: &SegmentedMesh, planes: &[ContactPlane], tolerance: f64) -> Result<Self> {
        let n = mesh.segment_count();
        let mut problems = Vec::new();
        if !(tolerance >= 0.0 && tolerance.is_finite()) {
            problems.push(format!("contact_tolerance: must be finite and >= 0, got {tolerance}"));
        }
        problems.extend(plane_problems(planes, n));
        if !problems.is_empty() {
            return Err(Error::ConfigValidation { problems });
        }

        let mut contact_matrix = vec![vec![0.0; n]; n];
        for plane in planes {
            let area = plane_contact_area(mesh, plane.lower, plane.axis, plane.level, tolerance);
            if area == 0.0 {
                warn!(
                    "No faces of segment {} lie on {:?} = {}; contact with segment {} is zero",
                    plane.lower, plane.axis, plane.level, plane.upper
                );
            }
            contact_matrix[plane.lower][plane.upper] += area;
            contact_matrix[plane.upper][plane.lower] += area;
        }

        let vertices = mesh.vertices();
        let raw_areas: Vec<f64> = mesh
            .segments()
            .iter()
            .map(|s| s.triangle_area_sum(vertices))
            .collect();

        let mut segment_areas = Vec::with_capacity(n);
        for (i, raw) in raw_areas.iter().enumerate() {
            let contact: f64 = contact_matrix[i].iter().sum();
            let mut area = raw - contact;
            if area < 0.0 {
                // Rounding noise from subtracting nearly equal sums
                if area > -1e-9 * raw.max(1.0) {
                    area = 0.0;
                } else {
                    return Err(Error::NegativeArea { segment: i, area });
                }
            }
            segment_areas.push(area);
        }

        debug!("Segment areas: {segment_areas:?}");
        debug!("Contact matrix: {contact_matrix:?}");

        Ok(Self {
            segment_areas,
            contact_matrix,
            raw_areas,
        })
    }

    pub fn segment_count(&self) -> usize {
        self.segment_areas.len()
    }

    /// Contact area between segments `i` and `j`, `None` if either index is
    /// out of range.
    pub fn contact(&self, i: usize, j: usize) -> Option<f64> {
        self.contact_matrix.get(i)?.get(j).copied()
    }
}
