use super::TravelResult;
use crate::grid::{BlockCause, GridStore, LinkCtx, Pass};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;
use gridwire_common::geom::rect::CellRect;

/// Cells reachable along one straight run.
#[derive(Clone, Debug)]
pub struct RunScan {
    pub cells: Vec<(CellCoord, Pass)>,
    pub hits_target: bool,
    pub block: Option<BlockCause>,
}

impl RunScan {
    /// Crossings accumulated up to and including cell `i`.
    pub fn crossings_to(&self, i: usize) -> u32 {
        self.cells[..=i].iter().map(|(_, p)| p.crossings()).sum()
    }
}

/// Read-only straight-line queries against the grid for one link.
pub struct Prober<'a> {
    grid: &'a GridStore,
    ctx: &'a LinkCtx,
    bounds: CellRect,
    target: CellCoord,
}

impl<'a> Prober<'a> {
    pub fn new(grid: &'a GridStore, ctx: &'a LinkCtx, bounds: CellRect, target: CellCoord) -> Self {
        Self {
            grid,
            ctx,
            bounds,
            target,
        }
    }

    /// Walks from `from` (exclusive) along `dir` until blocked, out of
    /// bounds, `limit` cells, or the target.
    pub fn scan(&self, from: CellCoord, dir: Dir, limit: Option<i32>) -> RunScan {
        let mut cells = Vec::new();
        let mut k = 1;
        loop {
            if limit.is_some_and(|l| k > l) {
                return RunScan {
                    cells,
                    hits_target: false,
                    block: None,
                };
            }
            let c = from.step(dir, k);
            if c == self.target {
                return RunScan {
                    cells,
                    hits_target: true,
                    block: None,
                };
            }
            if !self.bounds.contains(c) {
                return RunScan {
                    cells,
                    hits_target: false,
                    block: Some(BlockCause::OutOfBounds),
                };
            }
            match self.grid.passability(c, self.ctx, dir) {
                Pass::Blocked(cause) => {
                    return RunScan {
                        cells,
                        hits_target: false,
                        block: Some(cause),
                    };
                }
                pass => cells.push((c, pass)),
            }
            k += 1;
        }
    }

    /// How close travelling from `from` along `dir` gets to the target.
    pub fn probe(&self, from: CellCoord, dir: Dir) -> TravelResult {
        let scan = self.scan(from, dir, None);
        if scan.hits_target {
            return TravelResult {
                dir,
                reach: scan.cells.len() as i32 + 1,
                closest: self.target,
                remaining: 0,
                crossings: scan.cells.iter().map(|(_, p)| p.crossings()).sum(),
                block: None,
                hits_target: true,
            };
        }
        let mut best = (from.manhattan(self.target), from, 0u32);
        let mut crossings = 0;
        for (c, pass) in &scan.cells {
            crossings += pass.crossings();
            let d = c.manhattan(self.target);
            if d < best.0 {
                best = (d, *c, crossings);
            }
        }
        TravelResult {
            dir,
            reach: scan.cells.len() as i32,
            closest: best.1,
            remaining: best.0,
            crossings: best.2,
            block: scan.block,
            hits_target: false,
        }
    }

    /// Direct mode: the target lies straight ahead and the run reaches it.
    pub fn direct(&self, from: CellCoord, dir: Dir) -> bool {
        let ahead = from.dir_to(self.target) == Some(dir);
        ahead && self.scan(from, dir, Some(from.manhattan(self.target))).hits_target
    }
}
