//! Post-search simplification of a raw corner sequence.
//!
//! Every rewrite is re-validated against the grid before it is accepted, so
//! the output is never worse than the input.

use super::{normalize, path_length, segment_cells, validate_route};
use crate::grid::{EntryKind, GridStore, LinkCtx, Owner};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::{Axis, Dir};
use gridwire_common::util::config::CleanupConfig;

pub struct Cleanup<'a> {
    cfg: &'a CleanupConfig,
    ctx: &'a LinkCtx,
    start_dir: Dir,
    end_dir: Dir,
}

impl<'a> Cleanup<'a> {
    pub fn new(cfg: &'a CleanupConfig, ctx: &'a LinkCtx, start_dir: Dir, end_dir: Dir) -> Self {
        Self {
            cfg,
            ctx,
            start_dir,
            end_dir,
        }
    }

    pub fn run(&self, grid: &GridStore, points: &[CellCoord]) -> Vec<CellCoord> {
        let mut pts = self.chop_loops(grid, normalize(points));
        for _ in 0..self.cfg.max_passes {
            let before = pts.clone();
            pts = self.chop_to_shorter_forward(grid, pts);
            pts = self.chop_to_shorter_backward(grid, pts);
            if pts == before {
                break;
            }
        }
        if self.cfg.alternate_launch {
            pts = self.look_for_alternate_launch(grid, pts);
        }
        pts
    }

    fn accept(&self, grid: &GridStore, candidate: &[CellCoord]) -> bool {
        validate_route(grid, self.ctx, candidate, self.start_dir, self.end_dir)
    }

    /// Cuts out the loop between two non-adjacent segments that meet.
    pub fn chop_loops(&self, grid: &GridStore, mut pts: Vec<CellCoord>) -> Vec<CellCoord> {
        let mut passes = 0;
        'restart: while passes < self.cfg.max_passes {
            passes += 1;
            let n = pts.len();
            for i in 0..n.saturating_sub(1) {
                for j in (i + 2)..n.saturating_sub(1) {
                    let Some(x) = meet((pts[i], pts[i + 1]), (pts[j], pts[j + 1])) else {
                        continue;
                    };
                    let mut candidate: Vec<CellCoord> = pts[..=i].to_vec();
                    candidate.push(x);
                    candidate.extend_from_slice(&pts[j + 1..]);
                    let candidate = normalize(&candidate);
                    if self.accept(grid, &candidate) {
                        log::trace!("loop removed between segments {} and {}", i, j);
                        pts = candidate;
                        continue 'restart;
                    }
                }
            }
            break;
        }
        pts
    }

    /// Shortcuts from each point to the farthest later point that can be
    /// reached by a straight or L-shaped connection.
    pub fn chop_to_shorter_forward(
        &self,
        grid: &GridStore,
        mut pts: Vec<CellCoord>,
    ) -> Vec<CellCoord> {
        let mut i = 0;
        while i + 2 < pts.len() {
            let found = (i + 2..pts.len())
                .rev()
                .find_map(|j| self.shortcut(grid, &pts, i, j));
            match found {
                Some(shorter) => pts = shorter,
                None => i += 1,
            }
        }
        pts
    }

    /// Same as the forward pass, anchored at the far end.
    pub fn chop_to_shorter_backward(
        &self,
        grid: &GridStore,
        mut pts: Vec<CellCoord>,
    ) -> Vec<CellCoord> {
        let mut j = pts.len().saturating_sub(1);
        while j >= 2 {
            let found = (0..=j - 2).find_map(|i| self.shortcut(grid, &pts, i, j));
            match found {
                Some(shorter) => {
                    pts = shorter;
                    j = j.min(pts.len().saturating_sub(1));
                }
                None => j -= 1,
            }
        }
        pts
    }

    fn shortcut(
        &self,
        grid: &GridStore,
        pts: &[CellCoord],
        i: usize,
        j: usize,
    ) -> Option<Vec<CellCoord>> {
        let (a, b) = (pts[i], pts[j]);
        let current = (path_length(pts), pts.len());
        let bridges: Vec<Vec<CellCoord>> = if a.dir_to(b).is_some() {
            vec![vec![]]
        } else {
            vec![
                vec![CellCoord::new(b.x, a.y)],
                vec![CellCoord::new(a.x, b.y)],
            ]
        };
        bridges.into_iter().find_map(|bridge| {
            let mut candidate: Vec<CellCoord> = pts[..=i].to_vec();
            candidate.extend(bridge);
            candidate.extend_from_slice(&pts[j..]);
            let candidate = normalize(&candidate);
            let better = (path_length(&candidate), candidate.len()) < current;
            (better && self.accept(grid, &candidate)).then_some(candidate)
        })
    }

    /// Moves the first jog earlier when the launch run hugs foreign wires
    /// running alongside it.
    pub fn look_for_alternate_launch(
        &self,
        grid: &GridStore,
        pts: Vec<CellCoord>,
    ) -> Vec<CellCoord> {
        if pts.len() < 4 {
            return pts;
        }
        let (p0, p1, p2, p3) = (pts[0], pts[1], pts[2], pts[3]);
        let (Some(d0), Some(d2)) = (p0.dir_to(p1), p2.dir_to(p3)) else {
            return pts;
        };
        if d0 != d2 {
            return pts;
        }
        let baseline = self.hugging(grid, &pts);
        if baseline == 0 {
            return pts;
        }
        let mut best = (baseline, pts.clone());
        for k in 1..p0.manhattan(p1) {
            let mut candidate = pts.clone();
            candidate[1] = p1.step(d0.opposite(), k);
            candidate[2] = p2.step(d0.opposite(), k);
            let candidate = normalize(&candidate);
            if !self.accept(grid, &candidate) {
                continue;
            }
            let hug = self.hugging(grid, &candidate);
            if hug < best.0 {
                best = (hug, candidate);
            }
        }
        if best.0 < baseline {
            log::trace!("alternate launch for {:?}: hugging {} -> {}", self.ctx.link, baseline, best.0);
        }
        best.1
    }

    /// Run cells with a foreign parallel run right beside them.
    fn hugging(&self, grid: &GridStore, pts: &[CellCoord]) -> usize {
        let mut count = 0;
        for w in pts.windows(2) {
            let Some(d) = w[0].dir_to(w[1]) else {
                continue;
            };
            let cells = segment_cells(w[0], w[1]);
            for c in &cells[..cells.len().saturating_sub(1)] {
                for side in d.perpendiculars() {
                    let beside = grid.get(c.step(side, 1), false);
                    let hugs = beside.entries().iter().any(|e| {
                        e.kind == EntryKind::Run
                            && e.owner != Owner::Link(self.ctx.link)
                            && e.run_axis() == Some(d.axis())
                    });
                    if hugs {
                        count += 1;
                    }
                }
            }
        }
        count
    }
}

fn on_segment(p: CellCoord, (a, b): (CellCoord, CellCoord)) -> bool {
    let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
    let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
    (a.x == b.x || a.y == b.y) && (x0..=x1).contains(&p.x) && (y0..=y1).contains(&p.y)
}

/// A point shared by two orthogonal segments, if any.
fn meet(s: (CellCoord, CellCoord), t: (CellCoord, CellCoord)) -> Option<CellCoord> {
    let (Some(ds), Some(dt)) = (s.0.dir_to(s.1), t.0.dir_to(t.1)) else {
        return None;
    };
    if ds.axis() != dt.axis() {
        let x = if ds.axis() == Axis::Horizontal {
            CellCoord::new(t.0.x, s.0.y)
        } else {
            CellCoord::new(s.0.x, t.0.y)
        };
        return (on_segment(x, s) && on_segment(x, t)).then_some(x);
    }
    [t.1, t.0].into_iter().find(|p| on_segment(*p, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellEntry;
    use gridwire_common::db::indices::{LinkId, NodeId};
    use rstest::rstest;

    fn c(x: i32, y: i32) -> CellCoord {
        CellCoord::new(x, y)
    }

    fn ctx() -> LinkCtx {
        LinkCtx::new(LinkId::new(0), NodeId::new(0), NodeId::new(1))
    }

    #[test]
    fn crossing_segments_lose_their_loop() {
        let grid = GridStore::new();
        let (cfg, ctx) = (CleanupConfig::default(), ctx());
        let cleanup = Cleanup::new(&cfg, &ctx, Dir::East, Dir::South);
        let looped = vec![c(0, 0), c(6, 0), c(6, 3), c(3, 3), c(3, -3), c(10, -3), c(10, 0)];
        let out = cleanup.chop_loops(&grid, looped);
        assert_eq!(out, vec![c(0, 0), c(3, 0), c(3, -3), c(10, -3), c(10, 0)]);
    }

    #[rstest]
    #[case(vec![c(0, 0), c(3, 0), c(3, 5), c(7, 5), c(7, 0), c(10, 0)], vec![c(0, 0), c(10, 0)])]
    #[case(vec![c(0, 0), c(2, 0), c(2, -3), c(5, -3), c(5, 4), c(9, 4)], vec![c(0, 0), c(5, 0), c(5, 4), c(9, 4)])]
    fn detours_shorten_on_an_empty_grid(#[case] raw: Vec<CellCoord>, #[case] expected: Vec<CellCoord>) {
        let grid = GridStore::new();
        let (cfg, ctx) = (CleanupConfig::default(), ctx());
        let cleanup = Cleanup::new(&cfg, &ctx, Dir::East, Dir::East);
        assert_eq!(cleanup.run(&grid, &raw), expected);
    }

    #[test]
    fn shortcut_through_a_node_is_rejected() {
        let mut grid = GridStore::new();
        grid.install(c(5, 0), CellEntry::node(NodeId::new(4)))
            .expect("install");
        let (cfg, ctx) = (CleanupConfig::default(), ctx());
        let cleanup = Cleanup::new(&cfg, &ctx, Dir::East, Dir::East);
        let raw = vec![c(0, 0), c(3, 0), c(3, 2), c(7, 2), c(7, 0), c(10, 0)];
        let out = cleanup.run(&grid, &raw);
        assert!(!crate::algo::route_cells(&out).contains(&c(5, 0)));
        assert!(path_length(&out) <= path_length(&raw));
    }

    #[test]
    fn launch_moves_away_from_a_parallel_wire() {
        let mut grid = GridStore::new();
        for x in 0..=10 {
            grid.install(c(x, 1), CellEntry::run(LinkId::new(7), Dir::East))
                .expect("install");
        }
        let (cfg, ctx) = (CleanupConfig::default(), ctx());
        let cleanup = Cleanup::new(&cfg, &ctx, Dir::East, Dir::East);
        let raw = vec![c(0, 0), c(8, 0), c(8, -4), c(15, -4)];
        let out = cleanup.look_for_alternate_launch(&grid, raw);
        assert_eq!(out, vec![c(0, 0), c(1, 0), c(1, -4), c(15, -4)]);
    }
}
