//! Heuristic forward ("jump") search for a brand-new orthogonal route.
//!
//! Each recursion frame walks the current run, scores every cell where a
//! perpendicular turn is possible, stages the best run+corner and recurses.
//! A failed frame rolls its staging back and tries the next candidate. The
//! call stack is the backtracking stack.

use super::probe::{Prober, RunScan};
use super::{GaussianTable, TravelPlan, TravelTurn, normalize};
use crate::error::{Result, RouteError};
use crate::grid::{CellEntry, DirSet, GridStore, LinkCtx, Staging};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;
use gridwire_common::geom::rect::CellRect;
use gridwire_common::util::config::SearchConfig;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;

const SCORE_SCALE: f64 = 1e9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpRequest {
    pub start: CellCoord,
    pub start_dir: Dir,
    pub end: CellCoord,
    pub end_dir: Dir,
}

pub struct JumpSearch<'a> {
    cfg: &'a SearchConfig,
    gauss: &'a GaussianTable,
    ctx: &'a LinkCtx,
    bounds: CellRect,
    req: JumpRequest,
    max_steps: usize,
    max_depth: usize,
    steps: usize,
}

impl<'a> JumpSearch<'a> {
    pub fn new(
        cfg: &'a SearchConfig,
        gauss: &'a GaussianTable,
        ctx: &'a LinkCtx,
        bounds: CellRect,
        req: JumpRequest,
    ) -> Self {
        Self {
            cfg,
            gauss,
            ctx,
            bounds,
            req,
            max_steps: cfg.max_steps,
            max_depth: cfg.max_depth,
            steps: 0,
        }
    }

    pub fn with_step_limit(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Relaxed limits for a retry after non-convergence.
    pub fn forced(mut self, multiplier: usize) -> Self {
        self.max_steps *= multiplier.max(1);
        self.max_depth *= multiplier.max(1);
        self
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Searches for a corner sequence from the start pad to the end pad.
    /// The grid is left exactly as it was found, whatever the outcome.
    pub fn run(&mut self, grid: &mut GridStore) -> Result<Option<Vec<CellCoord>>> {
        let JumpRequest {
            start,
            start_dir,
            end,
            ..
        } = self.req;
        if start == end {
            return Ok(None);
        }
        let mut stage = Staging::new(grid);
        // The start cell blocks our own route from looping back through it.
        stage.install(
            start,
            CellEntry::pad(self.ctx.link, DirSet::empty(), DirSet::of(start_dir)),
        );
        let mut points = vec![start];
        let found = self.frame(&mut stage, start, start_dir, 0, &mut points)?;
        log::trace!(
            "jump search {:?}: {} after {} steps",
            self.ctx.link,
            if found { "found" } else { "exhausted" },
            self.steps
        );
        Ok(found.then(|| normalize(&points)))
    }

    /// Same as `run` but on a grid already under staging; used for embedded
    /// detours whose surroundings are tentative.
    pub fn run_staged(&mut self, stage: &mut Staging<'_>) -> Result<Option<Vec<CellCoord>>> {
        let mut inner = Staging::new(stage);
        let JumpRequest {
            start, start_dir, ..
        } = self.req;
        let mut points = vec![start];
        let found = self.frame(&mut inner, start, start_dir, 0, &mut points)?;
        Ok(found.then(|| normalize(&points)))
    }

    fn frame(
        &mut self,
        stage: &mut Staging<'_>,
        at: CellCoord,
        dir: Dir,
        depth: usize,
        points: &mut Vec<CellCoord>,
    ) -> Result<bool> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(RouteError::NonConvergence { steps: self.steps });
        }
        if depth > self.max_depth {
            return Ok(false);
        }

        let plans = {
            let prober = Prober::new(stage, self.ctx, self.bounds, self.req.end);
            let turn = TravelTurn::new(at, dir, self.req.end);
            if dir == self.req.end_dir && turn.is_direct(self.req.end) && prober.direct(at, dir) {
                points.push(self.req.end);
                return Ok(true);
            }
            let scan = prober.scan(at, dir, None);
            self.rank(&prober, &turn, &scan)
        };

        for plan in plans.into_iter().take(self.cfg.max_candidates) {
            let mut child = Staging::new(stage);
            for k in 1..plan.run_len {
                child.install(at.step(dir, k), CellEntry::run(self.ctx.link, dir));
            }
            child.install(plan.corner, CellEntry::corner(self.ctx.link, dir, plan.turn));
            points.push(plan.corner);
            if self.frame(&mut child, plan.corner, plan.turn, depth + 1, points)? {
                child.keep();
                return Ok(true);
            }
            points.pop();
        }
        Ok(false)
    }

    /// Run length at which turning is preferred.
    fn preferred_run(&self, at: CellCoord, dir: Dir, turn: &TravelTurn) -> i32 {
        let JumpRequest { end, end_dir, .. } = self.req;
        let axis = dir.axis();
        let ahead = (end.along(axis) - at.along(axis)) * dir.sign();
        if end_dir.axis() != axis {
            if turn.primary == end_dir { ahead } else { ahead + 2 }
        } else if end_dir == dir {
            ahead / 2
        } else {
            ahead + 2
        }
    }

    /// Scores every turn-capable cell of the run, best first.
    fn rank(&self, prober: &Prober<'_>, turn: &TravelTurn, scan: &RunScan) -> Vec<TravelPlan> {
        let JumpRequest { end, end_dir, .. } = self.req;
        let d0 = turn.at.manhattan(end).max(1) as f64;
        let run_max = scan.cells.len() as i32;
        let pref = self.preferred_run(turn.at, turn.dir, turn).clamp(1, run_max.max(1));

        let mut plans = Vec::new();
        let mut queue = PriorityQueue::new();
        for (i, (cell, pass)) in scan.cells.iter().enumerate() {
            if !pass.is_turnable() {
                continue;
            }
            let run_len = i as i32 + 1;
            let run_crossings = scan.crossings_to(i);
            for (order, turn_dir) in [turn.primary, turn.secondary].into_iter().enumerate() {
                let result = prober.probe(*cell, turn_dir);
                if result.reach == 0 {
                    continue;
                }
                // Reaching the pad sideways only gets us next to it.
                let remaining = if result.hits_target && turn_dir != end_dir {
                    1
                } else {
                    result.remaining
                };
                let progress = (d0 - remaining as f64) / d0;
                let offset = (run_len - pref).abs();
                let crossings = run_crossings + result.crossings;
                let score = progress * self.cfg.progress_weight
                    + self.gauss.get(offset) * self.cfg.offset_weight
                    + self.cfg.crossing_weight
                        / (1.0 + crossings as f64 * self.cfg.crossing_coeff);
                plans.push(TravelPlan {
                    corner: *cell,
                    run_len,
                    turn: turn_dir,
                    score,
                    offset,
                    crossings,
                });
                queue.push(
                    plans.len() - 1,
                    (
                        (score * SCORE_SCALE).round() as i64,
                        Reverse(offset),
                        Reverse(crossings),
                        Reverse(order),
                        Reverse(run_len),
                    ),
                );
            }
        }

        let mut ranked = Vec::with_capacity(plans.len());
        while let Some((idx, _)) = queue.pop() {
            ranked.push(plans[idx]);
        }
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::validate_route;
    use gridwire_common::db::indices::{LinkId, NodeId};

    fn c(x: i32, y: i32) -> CellCoord {
        CellCoord::new(x, y)
    }

    fn ctx() -> LinkCtx {
        LinkCtx::new(LinkId::new(0), NodeId::new(0), NodeId::new(1))
    }

    fn bounds() -> CellRect {
        CellRect::new(c(-30, -30), c(30, 30))
    }

    fn search(
        grid: &mut GridStore,
        cfg: &SearchConfig,
        req: JumpRequest,
    ) -> Result<Option<Vec<CellCoord>>> {
        let gauss = GaussianTable::new(cfg.offset_sigma, cfg.gaussian_table_size);
        let ctx = ctx();
        JumpSearch::new(cfg, &gauss, &ctx, bounds(), req).run(grid)
    }

    fn block(grid: &mut GridStore, node: usize, min: CellCoord, max: CellCoord) {
        for cell in CellRect::new(min, max).cells() {
            grid.install(cell, CellEntry::node(NodeId::new(node)))
                .expect("install");
        }
    }

    #[test]
    fn straight_line_in_direct_mode() {
        let mut grid = GridStore::new();
        let cfg = SearchConfig::default();
        let req = JumpRequest {
            start: c(0, 0),
            start_dir: Dir::East,
            end: c(5, 0),
            end_dir: Dir::East,
        };
        let path = search(&mut grid, &cfg, req).expect("converges").expect("found");
        assert_eq!(path, vec![c(0, 0), c(5, 0)]);
        assert!(grid.is_empty());
    }

    #[test]
    fn detours_around_a_blocking_node() {
        let mut grid = GridStore::new();
        block(&mut grid, 5, c(4, -1), c(6, 1));
        let before = grid.snapshot();
        let cfg = SearchConfig::default();
        let req = JumpRequest {
            start: c(0, 0),
            start_dir: Dir::East,
            end: c(10, 0),
            end_dir: Dir::East,
        };
        let path = search(&mut grid, &cfg, req).expect("converges").expect("found");
        assert_eq!(grid.snapshot(), before);
        assert!(validate_route(&grid, &ctx(), &path, Dir::East, Dir::East));
        assert_eq!(path.len(), 6, "four corners expected: {:?}", path);
        let same_side = path.iter().all(|p| p.y >= 0) || path.iter().all(|p| p.y <= 0);
        assert!(same_side, "detour switches sides: {:?}", path);
    }

    #[test]
    fn l_shaped_route_for_perpendicular_arrival() {
        let mut grid = GridStore::new();
        let cfg = SearchConfig::default();
        let req = JumpRequest {
            start: c(0, 0),
            start_dir: Dir::East,
            end: c(6, 4),
            end_dir: Dir::South,
        };
        let path = search(&mut grid, &cfg, req).expect("converges").expect("found");
        assert_eq!(path, vec![c(0, 0), c(6, 0), c(6, 4)]);
    }

    #[test]
    fn enclosed_target_fails_without_leaking_state() {
        let mut grid = GridStore::new();
        // A ring of foreign node cells around the target.
        block(&mut grid, 7, c(8, -3), c(14, -3));
        block(&mut grid, 7, c(8, 3), c(14, 3));
        block(&mut grid, 7, c(8, -2), c(8, 2));
        block(&mut grid, 7, c(14, -2), c(14, 2));
        let before = grid.snapshot();
        let cfg = SearchConfig::default();
        let req = JumpRequest {
            start: c(0, 0),
            start_dir: Dir::East,
            end: c(11, 0),
            end_dir: Dir::East,
        };
        let outcome = search(&mut grid, &cfg, req);
        assert!(matches!(
            outcome,
            Ok(None) | Err(RouteError::NonConvergence { .. })
        ));
        assert_eq!(grid.snapshot(), before);
    }

    #[test]
    fn step_bound_raises_non_convergence() {
        let mut grid = GridStore::new();
        block(&mut grid, 5, c(4, -1), c(6, 1));
        let cfg = SearchConfig {
            max_steps: 1,
            ..SearchConfig::default()
        };
        let req = JumpRequest {
            start: c(0, 0),
            start_dir: Dir::East,
            end: c(10, 0),
            end_dir: Dir::East,
        };
        let err = search(&mut grid, &cfg, req).unwrap_err();
        assert!(err.is_recoverable());
        assert!(grid.is_empty() || !grid.has_tentative());
    }
}
