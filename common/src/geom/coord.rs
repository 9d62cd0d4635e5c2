use super::dir::{Axis, Dir};

/// Quantized grid position. `y` grows downward, matching diagram space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline(always)]
    pub fn step(self, dir: Dir, n: i32) -> Self {
        let (dx, dy) = dir.delta();
        Self::new(self.x + dx * n, self.y + dy * n)
    }

    #[inline(always)]
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    #[inline(always)]
    pub fn manhattan(self, other: CellCoord) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Coordinate along `axis`.
    #[inline(always)]
    pub fn along(self, axis: Axis) -> i32 {
        match axis {
            Axis::Horizontal => self.x,
            Axis::Vertical => self.y,
        }
    }

    /// Copy with the coordinate along `axis` replaced.
    pub fn with_along(self, axis: Axis, v: i32) -> Self {
        match axis {
            Axis::Horizontal => Self { x: v, ..self },
            Axis::Vertical => Self { y: v, ..self },
        }
    }

    /// Direction of a straight orthogonal step from `self` to `other`, if any.
    pub fn dir_to(self, other: CellCoord) -> Option<Dir> {
        Dir::from_delta(other.x - self.x, other.y - self.y)
    }

    pub fn neighbors(self) -> [CellCoord; 4] {
        Dir::ALL.map(|d| self.step(d, 1))
    }
}
