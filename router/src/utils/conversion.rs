use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::point::Point;
use gridwire_common::geom::rect::{CellRect, Rect};

/// Maps world coordinates onto the routing lattice. Cell `(i, j)` is the
/// lattice point `offset + (i, j) * cell_size`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantizer {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Quantizer {
    pub fn new(cell_size: f64) -> Self {
        Self::from_step(cell_size, 0.0, 0.0)
    }

    pub fn from_step(cell_size: f64, off_x: f64, off_y: f64) -> Self {
        Self {
            scale: 1.0 / cell_size.max(f64::EPSILON),
            offset_x: off_x,
            offset_y: off_y,
        }
    }

    pub fn to_cell(&self, p: Point<f64>) -> CellCoord {
        let x = ((p.x - self.offset_x) * self.scale).round() as i32;
        let y = ((p.y - self.offset_y) * self.scale).round() as i32;
        CellCoord::new(x, y)
    }

    pub fn to_world(&self, c: CellCoord) -> Point<f64> {
        Point::new(
            (c.x as f64 / self.scale) + self.offset_x,
            (c.y as f64 / self.scale) + self.offset_y,
        )
    }

    /// Lattice points covered by `r`, boundary included.
    pub fn footprint(&self, r: &Rect) -> CellRect {
        CellRect::new(self.to_cell(r.min), self.to_cell(r.max))
    }

    pub fn path_to_world(&self, points: &[CellCoord]) -> Vec<Point<f64>> {
        points.iter().map(|c| self.to_world(*c)).collect()
    }
}
