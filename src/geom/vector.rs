use crate::Point;

/// Displacement between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Vector {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    /// Vector pointing from `beg` to `end`.
    pub fn from_points(beg: Point, end: Point) -> Self {
        Self::new(end.x - beg.x, end.y - beg.y, end.z - beg.z)
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.dy * other.dz - self.dz * other.dy,
            self.dz * other.dx - self.dx * other.dz,
            self.dx * other.dy - self.dy * other.dx,
        )
    }

    pub fn length(&self) -> f64 {
        self.dx.hypot(self.dy).hypot(self.dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_is_directed() {
        let a = Point::new(1., 2., 3.);
        let b = Point::new(4., 6., 3.);
        assert_eq!(Vector::from_points(a, b), Vector::new(3., 4., 0.));
        assert_eq!(Vector::from_points(b, a), Vector::new(-3., -4., 0.));
        assert_eq!(Vector::from_points(a, b).length(), 5.);
    }

    #[test]
    fn test_cross_of_axes() {
        let x = Vector::new(1., 0., 0.);
        let y = Vector::new(0., 1., 0.);
        assert_eq!(x.cross(y), Vector::new(0., 0., 1.));
        assert_eq!(y.cross(x), Vector::new(0., 0., -1.));
        assert_eq!(x.cross(x).length(), 0.);
    }
}
