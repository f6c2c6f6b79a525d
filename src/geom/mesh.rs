//! Triangle meshes partitioned into labelled segments.

use crate::Point;
use crate::TriangleIndex;
use crate::error::{Error, Result};

/// One labelled region of a mesh.
///
/// A segment owns no vertices, only triangles indexing into the vertex list
/// of the [`SegmentedMesh`] it belongs to. Triangles keep the order in which
/// they were read.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub faces: Vec<TriangleIndex>,
}

impl Segment {
    pub fn new(name: &str, faces: Vec<TriangleIndex>) -> Self {
        Self {
            name: name.to_string(),
            faces,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Sum of the areas of all triangles of this segment.
    pub fn triangle_area_sum(&self, vertices: &[Point]) -> f64 {
        self.faces.iter().map(|f| f.area(vertices)).sum()
    }
}

/// Shared vertex list plus the ordered segments referencing it.
///
/// Immutable once built: derived quantities (areas, contacts) are computed
/// by [`crate::ContactAreas`] and kept outside of the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedMesh {
    vertices: Vec<Point>,
    segments: Vec<Segment>,
}

impl SegmentedMesh {
    /// Creates a mesh, checking that every face references an existing vertex.
    pub fn new(vertices: Vec<Point>, segments: Vec<Segment>) -> Result<Self> {
        let num_vertices = vertices.len();
        for (si, seg) in segments.iter().enumerate() {
            for (fi, face) in seg.faces.iter().enumerate() {
                if face.max_index() >= num_vertices {
                    return Err(Error::malformed(
                        0,
                        &format!("{} {} {}", face.0, face.1, face.2),
                        format!(
                            "face {fi} of segment {si} ({}) references a vertex beyond {num_vertices}",
                            seg.name
                        ),
                    ));
                }
            }
        }
        Ok(Self { vertices, segments })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Total number of triangles over all segments.
    pub fn face_count(&self) -> usize {
        self.segments.iter().map(|s| s.faces.len()).sum()
    }

    /// Returns the index of the first segment called `name`.
    pub fn segment_index(&self, name: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.name == name)
    }

    pub fn segment_names(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Vec<Point> {
        vec![
            Point::new(0., 0., 0.),
            Point::new(1., 0., 0.),
            Point::new(1., 1., 0.),
            Point::new(0., 1., 0.),
        ]
    }

    #[test]
    fn test_new_rejects_dangling_index() {
        let seg = Segment::new("a", vec![TriangleIndex(0, 1, 4)]);
        let res = SegmentedMesh::new(unit_square(), vec![seg]);
        assert!(matches!(res, Err(Error::MalformedMesh { .. })));
    }

    #[test]
    fn test_counts_and_lookup() -> anyhow::Result<()> {
        let a = Segment::new("a", vec![TriangleIndex(0, 1, 2)]);
        let b = Segment::new("b", vec![TriangleIndex(0, 2, 3), TriangleIndex(0, 1, 3)]);
        let mesh = SegmentedMesh::new(unit_square(), vec![a, b])?;
        assert_eq!(mesh.segment_count(), 2);
        assert_eq!(mesh.face_count(), 3);
        assert_eq!(mesh.segment_index("b"), Some(1));
        assert_eq!(mesh.segment_index("c"), None);
        assert_eq!(mesh.segment_names(), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_triangle_area_sum() {
        let seg = Segment::new("sq", vec![TriangleIndex(0, 1, 2), TriangleIndex(0, 2, 3)]);
        assert_relative_eq!(seg.triangle_area_sum(&unit_square()), 1.0);
        assert!(!seg.is_empty());
        assert_eq!(Segment::new("e", vec![]).triangle_area_sum(&unit_square()), 0.);
    }
}
