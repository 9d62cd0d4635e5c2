use super::coord::CellCoord;
use super::point::Point;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Point<f64>,
    pub max: Point<f64>,
}

impl Rect {
    pub fn new(min: Point<f64>, max: Point<f64>) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn contains(&self, p: Point<f64>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        )
    }
}

/// Inclusive rectangle in cell space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRect {
    pub min: CellCoord,
    pub max: CellCoord,
}

impl CellRect {
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        Self {
            min: CellCoord::new(a.x.min(b.x), a.y.min(b.y)),
            max: CellCoord::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn contains(&self, c: CellCoord) -> bool {
        c.x >= self.min.x && c.x <= self.max.x && c.y >= self.min.y && c.y <= self.max.y
    }

    pub fn translate(&self, dx: i32, dy: i32) -> CellRect {
        CellRect {
            min: self.min.offset(dx, dy),
            max: self.max.offset(dx, dy),
        }
    }

    pub fn expand(&self, margin: i32) -> CellRect {
        CellRect {
            min: self.min.offset(-margin, -margin),
            max: self.max.offset(margin, margin),
        }
    }

    pub fn include(&mut self, c: CellCoord) {
        self.min.x = self.min.x.min(c.x);
        self.min.y = self.min.y.min(c.y);
        self.max.x = self.max.x.max(c.x);
        self.max.y = self.max.y.max(c.y);
    }

    pub fn cells(self) -> impl Iterator<Item = CellCoord> {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| CellCoord::new(x, y)))
    }
}
