use crate::Point;
use crate::geom::vector::Vector;

/// Vertex indices of one triangle, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriangleIndex(pub usize, pub usize, pub usize);

impl TriangleIndex {
    /// Largest vertex index referenced by this triangle.
    pub fn max_index(&self) -> usize {
        self.0.max(self.1).max(self.2)
    }

    /// Resolves the indices against a vertex list.
    ///
    /// # Panics
    /// Panics if any index is out of bounds. Meshes built through
    /// [`crate::SegmentedMesh::new`] or the OBJ reader are validated.
    pub fn points(&self, vertices: &[Point]) -> [Point; 3] {
        [vertices[self.0], vertices[self.1], vertices[self.2]]
    }

    /// Area of the triangle resolved against `vertices`.
    pub fn area(&self, vertices: &[Point]) -> f64 {
        let [p0, p1, p2] = self.points(vertices);
        triangle_area(p0, p1, p2)
    }
}

/// Area of the triangle `(p0, p1, p2)`.
///
/// Half of the length of `(p1 - p0) x (p2 - p0)`. Collinear points give 0.
pub fn triangle_area(p0: Point, p1: Point, p2: Point) -> f64 {
    let v1 = Vector::from_points(p0, p1);
    let v2 = Vector::from_points(p0, p2);
    v1.cross(v2).length() / 2.
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_right_triangle_area() {
        let p0 = Point::new(0., 0., 0.);
        let p1 = Point::new(3., 0., 0.);
        let p2 = Point::new(0., 4., 0.);
        assert_relative_eq!(triangle_area(p0, p1, p2), 6.0);
    }

    #[test]
    fn test_area_does_not_depend_on_orientation() {
        let p0 = Point::new(1., 1., 1.);
        let p1 = Point::new(2., 1., 3.);
        let p2 = Point::new(0., 5., 1.);
        let a = triangle_area(p0, p1, p2);
        assert_relative_eq!(a, triangle_area(p0, p2, p1));
        assert_relative_eq!(a, triangle_area(p1, p2, p0));
    }

    #[test]
    fn test_degenerate_triangle_has_zero_area() {
        let p0 = Point::new(0., 0., 0.);
        let p1 = Point::new(1., 1., 1.);
        let p2 = Point::new(3., 3., 3.);
        assert_eq!(triangle_area(p0, p1, p2), 0.);
        // Repeated vertex
        assert_eq!(triangle_area(p0, p0, p1), 0.);
    }

    #[test]
    fn test_triangle_index_area() {
        let vertices = vec![
            Point::new(0., 0., 0.),
            Point::new(2., 0., 0.),
            Point::new(2., 0., 2.),
            Point::new(0., 0., 2.),
        ];
        let tri = TriangleIndex(0, 2, 3);
        assert_relative_eq!(tri.area(&vertices), 2.0);
        assert_eq!(tri.max_index(), 3);
    }
}
