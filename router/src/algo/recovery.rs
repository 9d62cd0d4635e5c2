//! Route recovery after incremental edits.
//!
//! The previous corners of a link are replayed against the current grid.
//! Corners that still work are reused as they are; a broken one is first
//! shifted along its degree of freedom, then bypassed with a small bounded
//! jump search to a later recorded corner, and as a last resort spliced with
//! a diagonal segment.

use super::jump::{JumpRequest, JumpSearch};
use super::probe::Prober;
use super::{
    GaussianTable, Route, TravelPlan, normalize, segment_cells, stage_route, validate_route,
};
use crate::error::{Result, RouteError};
use crate::grid::{CellEntry, DirSet, GridStore, LinkCtx, Staging};
use gridwire_common::db::indices::LinkId;
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::{Axis, Dir};
use gridwire_common::geom::rect::CellRect;
use gridwire_common::util::config::{RecoveryConfig, SearchConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CornerState {
    Pending,
    Committed,
    Unreachable,
    /// Moved during the attempt with the given revision.
    Pushed(u32),
}

/// How far a corner may slide, and along which axis, without rebuilding
/// its neighbours.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Freedom {
    pub axis: Option<Axis>,
    pub max_shift: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryCorner {
    pub at: CellCoord,
    /// Vector of the run arriving at this corner.
    pub inbound: (i32, i32),
    pub orthogonal: bool,
    pub freedom: Freedom,
    pub state: CornerState,
}

/// Geometry remembered for one link between edits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryRecord {
    pub link: LinkId,
    pub start_dir: Dir,
    pub end_dir: Dir,
    pub corners: Vec<RecoveryCorner>,
    pub revision: u32,
}

impl RecoveryRecord {
    pub fn from_route(route: &Route, max_shift: i32) -> Self {
        let pts = &route.points;
        let last = pts.len().saturating_sub(1);
        let corners = pts
            .iter()
            .enumerate()
            .map(|(i, &at)| {
                let prev = if i == 0 { at } else { pts[i - 1] };
                let axis = if i == 0 || i == last {
                    None
                } else {
                    at.dir_to(pts[i + 1]).map(Dir::axis)
                };
                RecoveryCorner {
                    at,
                    inbound: (at.x - prev.x, at.y - prev.y),
                    orthogonal: i == 0 || prev.dir_to(at).is_some(),
                    freedom: Freedom { axis, max_shift },
                    state: CornerState::Pending,
                }
            })
            .collect();
        Self {
            link: route.link,
            start_dir: route.start_dir,
            end_dir: route.end_dir,
            corners,
            revision: 0,
        }
    }

    pub fn points(&self) -> Vec<CellCoord> {
        self.corners.iter().map(|c| c.at).collect()
    }
}

/// A successful step: new points after the current one, the index of the
/// next recorded corner to aim for, and the heading on leaving the last
/// new point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advance {
    pub path: Vec<CellCoord>,
    pub resume: usize,
    pub heading: Dir,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecoverStep {
    Ok(Advance),
    /// The run reaches the corner but cannot turn there.
    NoTurn(TravelPlan),
    EmbeddedJumpFailed,
    Failed,
}

pub struct Recovery<'a> {
    cfg: &'a RecoveryConfig,
    search: &'a SearchConfig,
    gauss: &'a GaussianTable,
    ctx: &'a LinkCtx,
    bounds: CellRect,
    steps: usize,
}

impl<'a> Recovery<'a> {
    pub fn new(
        cfg: &'a RecoveryConfig,
        search: &'a SearchConfig,
        gauss: &'a GaussianTable,
        ctx: &'a LinkCtx,
        bounds: CellRect,
    ) -> Self {
        Self {
            cfg,
            search,
            gauss,
            ctx,
            bounds,
            steps: 0,
        }
    }

    /// Rebuilds the link from `record` between the current pad cells.
    /// `masks` are other pending links of the same source; they occupy the
    /// grid only for the duration of this call. The link itself must not be
    /// drawn on `grid`.
    pub fn recover(
        &mut self,
        grid: &mut GridStore,
        record: &mut RecoveryRecord,
        start: CellCoord,
        end: CellCoord,
        masks: &[Route],
    ) -> Result<Option<Vec<CellCoord>>> {
        if record.corners.len() < 2 || start == end {
            return Ok(None);
        }
        record.revision += 1;
        self.steps = 0;

        let mut masked = Staging::new(grid);
        for m in masks {
            stage_route(&mut masked, m);
        }
        self.prune(&masked, record);

        let walked = {
            let mut walk = Staging::new(&mut masked);
            walk.install(
                start,
                CellEntry::pad(record.link, DirSet::empty(), DirSet::of(record.start_dir)),
            );
            self.walk(&mut walk, record, start, end)?
        };
        let Some(points) = walked else {
            log::debug!("recovery of {:?} failed after {} steps", record.link, self.steps);
            return Ok(None);
        };
        let points = normalize(&points);
        if !validate_route(&masked, self.ctx, &points, record.start_dir, record.end_dir) {
            log::debug!("recovered path of {:?} failed validation", record.link);
            return Ok(None);
        }
        Ok(Some(points))
    }

    /// Marks interior corners that can no longer host a turn.
    fn prune(&self, grid: &GridStore, record: &mut RecoveryRecord) {
        let last = record.corners.len() - 1;
        for corner in record.corners[1..last].iter_mut().rev() {
            let dead = !grid.passability(corner.at, self.ctx, Dir::East).is_turnable()
                || grid.open_neighbors(corner.at, self.ctx) < self.cfg.min_open_neighbors;
            corner.state = if dead {
                CornerState::Unreachable
            } else {
                CornerState::Pending
            };
        }
    }

    fn walk(
        &mut self,
        stage: &mut Staging<'_>,
        record: &mut RecoveryRecord,
        start: CellCoord,
        end: CellCoord,
    ) -> Result<Option<Vec<CellCoord>>> {
        let recorded = record.points();
        let last = recorded.len() - 1;
        let mut points = vec![start];
        let (mut at, mut dir) = (start, record.start_dir);
        let mut i = 1;
        while i <= last {
            self.steps += 1;
            if self.steps > self.cfg.max_steps {
                return Err(RouteError::NonConvergence { steps: self.steps });
            }
            if i < last && record.corners[i].state == CornerState::Unreachable {
                i += 1;
                continue;
            }
            let at_start = points.len() == 1;
            match self.attempt(stage, record, &recorded, at, dir, i, end, at_start)? {
                RecoverStep::Ok(adv) => {
                    let mut prev = at;
                    for &p in &adv.path {
                        for c in segment_cells(prev, p) {
                            if c != end {
                                stage.install(c, CellEntry::degenerate(record.link));
                            }
                        }
                        prev = p;
                    }
                    for corner in &mut record.corners[i..adv.resume.min(last)] {
                        if corner.state == CornerState::Pending {
                            corner.state = CornerState::Committed;
                        }
                    }
                    points.extend(adv.path);
                    at = prev;
                    dir = adv.heading;
                    i = adv.resume;
                }
                RecoverStep::NoTurn(plan) => {
                    log::trace!("no turn at {:?} heading {:?}", plan.corner, plan.turn);
                    return Ok(None);
                }
                RecoverStep::EmbeddedJumpFailed | RecoverStep::Failed => return Ok(None),
            }
        }
        Ok((at == end).then_some(points))
    }

    #[allow(clippy::too_many_arguments)]
    fn attempt(
        &mut self,
        stage: &mut Staging<'_>,
        record: &mut RecoveryRecord,
        recorded: &[CellCoord],
        at: CellCoord,
        dir: Dir,
        i: usize,
        end: CellCoord,
        at_start: bool,
    ) -> Result<RecoverStep> {
        let last = recorded.len() - 1;
        let target = if i == last { end } else { record.corners[i].at };
        let out = recorded.get(i + 1).and_then(|n| recorded[i].dir_to(*n));

        let first = self.simple(stage, at, dir, target, i, last, out, record.end_dir, end);
        if matches!(first, RecoverStep::Ok(_)) {
            return Ok(first);
        }
        if i < last {
            if let Some(adv) = self.shift(stage, record, at, dir, i, last, out, end) {
                return Ok(RecoverStep::Ok(adv));
            }
        }
        let (detour, attempted) = self.detour(stage, record, recorded, at, dir, i, end)?;
        if let Some(adv) = detour {
            return Ok(RecoverStep::Ok(adv));
        }
        if self.cfg.allow_diagonal && i < last && !at_start {
            if let Some(adv) = self.splice(stage, record, at, dir, i, out, end) {
                return Ok(RecoverStep::Ok(adv));
            }
        }
        Ok(match first {
            RecoverStep::NoTurn(plan) => RecoverStep::NoTurn(plan),
            _ if attempted => RecoverStep::EmbeddedJumpFailed,
            _ => RecoverStep::Failed,
        })
    }

    /// Straight run to the recorded point, then a turn onto the recorded
    /// outbound heading.
    #[allow(clippy::too_many_arguments)]
    fn simple(
        &self,
        grid: &GridStore,
        at: CellCoord,
        dir: Dir,
        target: CellCoord,
        i: usize,
        last: usize,
        out: Option<Dir>,
        end_dir: Dir,
        end: CellCoord,
    ) -> RecoverStep {
        if at.dir_to(target) != Some(dir) {
            return RecoverStep::Failed;
        }
        let dist = at.manhattan(target);
        let scan = Prober::new(grid, self.ctx, self.bounds, target).scan(at, dir, Some(dist));
        if !scan.hits_target {
            return RecoverStep::Failed;
        }
        if i == last {
            return if dir == end_dir {
                RecoverStep::Ok(Advance {
                    path: vec![target],
                    resume: i + 1,
                    heading: dir,
                })
            } else {
                RecoverStep::Failed
            };
        }
        let heading = out.unwrap_or(dir);
        let next = target.step(heading, 1);
        let turnable = grid.passability(target, self.ctx, dir).is_turnable();
        let leads_on = next == end || grid.passability(next, self.ctx, heading).is_open();
        if turnable && leads_on {
            RecoverStep::Ok(Advance {
                path: vec![target],
                resume: i + 1,
                heading,
            })
        } else {
            RecoverStep::NoTurn(TravelPlan {
                corner: target,
                run_len: dist,
                turn: heading,
                score: 0.0,
                offset: 0,
                crossings: scan.cells.iter().map(|(_, p)| p.crossings()).sum(),
            })
        }
    }

    /// Slides corner `i` sideways into line with `at`, or along the current
    /// run to a cell where it can turn.
    #[allow(clippy::too_many_arguments)]
    fn shift(
        &self,
        grid: &GridStore,
        record: &mut RecoveryRecord,
        at: CellCoord,
        dir: Dir,
        i: usize,
        last: usize,
        out: Option<Dir>,
        end: CellCoord,
    ) -> Option<Advance> {
        let corner = &record.corners[i];
        let freedom = corner.freedom;
        let lateral = dir.axis().other();
        let off = at.along(lateral) - corner.at.along(lateral);
        let base = if off == 0 {
            corner.at
        } else if freedom.axis == Some(lateral) && off.abs() <= freedom.max_shift {
            corner.at.with_along(lateral, at.along(lateral))
        } else {
            return None;
        };

        let mut candidates = Vec::new();
        if off != 0 {
            candidates.push(base);
        }
        for k in 1..=freedom.max_shift {
            candidates.push(base.step(dir, k));
            candidates.push(base.step(dir.opposite(), k));
        }
        for c in candidates {
            if at.dir_to(c) != Some(dir) {
                continue;
            }
            if let RecoverStep::Ok(adv) =
                self.simple(grid, at, dir, c, i, last, out, record.end_dir, end)
            {
                let corner = &mut record.corners[i];
                corner.at = c;
                corner.state = CornerState::Pushed(record.revision);
                return Some(adv);
            }
        }
        None
    }

    /// Bounded jump search from `at` to one of the next few recorded points.
    #[allow(clippy::too_many_arguments)]
    fn detour(
        &mut self,
        stage: &mut Staging<'_>,
        record: &RecoveryRecord,
        recorded: &[CellCoord],
        at: CellCoord,
        dir: Dir,
        i: usize,
        end: CellCoord,
    ) -> Result<(Option<Advance>, bool)> {
        let last = recorded.len() - 1;
        let horizon = (i + self.cfg.lookahead.max(1) - 1).min(last);
        let mut attempted = false;
        for j in i..=horizon {
            let (target, arrive) = if j == last {
                (end, record.end_dir)
            } else {
                match recorded[j - 1].dir_to(recorded[j]) {
                    Some(d) => (recorded[j], d),
                    None => continue,
                }
            };
            if target == at || (j < last && record.corners[j].state == CornerState::Unreachable)
            {
                continue;
            }
            attempted = true;
            let req = JumpRequest {
                start: at,
                start_dir: dir,
                end: target,
                end_dir: arrive,
            };
            let mut search = JumpSearch::new(self.search, self.gauss, self.ctx, self.bounds, req)
                .with_step_limit(self.cfg.jump_steps);
            let outcome = search.run_staged(stage);
            self.steps += search.steps();
            let pts = match outcome {
                Ok(Some(pts)) => pts,
                Ok(None) | Err(RouteError::NonConvergence { .. }) => continue,
                Err(e) => return Err(e),
            };
            let heading = if j == last {
                arrive
            } else {
                recorded[j].dir_to(recorded[j + 1]).unwrap_or(arrive)
            };
            if j < last {
                let next = target.step(heading, 1);
                let turnable = stage.passability(target, self.ctx, arrive).is_turnable();
                if !turnable
                    || (next != end && !stage.passability(next, self.ctx, heading).is_open())
                {
                    continue;
                }
            }
            log::trace!("recovery detour {:?} -> {:?} ({} points)", at, target, pts.len());
            return Ok((
                Some(Advance {
                    path: pts[1..].to_vec(),
                    resume: j + 1,
                    heading,
                }),
                true,
            ));
        }
        Ok((None, attempted))
    }

    /// Diagonal splice straight to corner `i`.
    #[allow(clippy::too_many_arguments)]
    fn splice(
        &self,
        grid: &GridStore,
        record: &RecoveryRecord,
        at: CellCoord,
        dir: Dir,
        i: usize,
        out: Option<Dir>,
        end: CellCoord,
    ) -> Option<Advance> {
        let target = record.corners[i].at;
        if at.dir_to(target).is_some() || target == at {
            return None;
        }
        let clear = segment_cells(at, target)
            .into_iter()
            .all(|c| grid.passability(c, self.ctx, dir).is_turnable());
        let heading = out.unwrap_or(dir);
        let next = target.step(heading, 1);
        if !clear || (next != end && !grid.passability(next, self.ctx, heading).is_open()) {
            return None;
        }
        log::debug!("diagonal splice for {:?} at {:?}", record.link, target);
        Some(Advance {
            path: vec![target],
            resume: i + 1,
            heading,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwire_common::db::indices::NodeId;

    fn c(x: i32, y: i32) -> CellCoord {
        CellCoord::new(x, y)
    }

    struct Fixture {
        cfg: RecoveryConfig,
        search: SearchConfig,
        gauss: GaussianTable,
        ctx: LinkCtx,
    }

    impl Fixture {
        fn new() -> Self {
            let search = SearchConfig::default();
            let gauss = GaussianTable::new(search.offset_sigma, search.gaussian_table_size);
            Self {
                cfg: RecoveryConfig::default(),
                search,
                gauss,
                ctx: LinkCtx::new(LinkId::new(0), NodeId::new(0), NodeId::new(1)),
            }
        }

        fn recovery(&self) -> Recovery<'_> {
            let bounds = CellRect::new(c(-30, -30), c(30, 30));
            Recovery::new(&self.cfg, &self.search, &self.gauss, &self.ctx, bounds)
        }
    }

    fn route(points: Vec<CellCoord>) -> Route {
        Route {
            link: LinkId::new(0),
            points,
            start_dir: Dir::East,
            end_dir: Dir::East,
        }
    }

    #[test]
    fn unchanged_grid_keeps_the_path() {
        let fx = Fixture::new();
        let mut grid = GridStore::new();
        let pts = vec![c(0, 0), c(5, 0), c(5, 8), c(10, 8)];
        let mut record = RecoveryRecord::from_route(&route(pts.clone()), 3);
        let out = fx
            .recovery()
            .recover(&mut grid, &mut record, c(0, 0), c(10, 8), &[])
            .expect("no error");
        assert_eq!(out, Some(pts));
        assert!(grid.is_empty());
    }

    #[test]
    fn moved_source_pushes_the_first_corner() {
        let fx = Fixture::new();
        let mut grid = GridStore::new();
        let pts = vec![c(0, 0), c(5, 0), c(5, 8), c(10, 8)];
        let mut record = RecoveryRecord::from_route(&route(pts), 3);
        let out = fx
            .recovery()
            .recover(&mut grid, &mut record, c(0, 2), c(10, 8), &[])
            .expect("no error");
        assert_eq!(out, Some(vec![c(0, 2), c(5, 2), c(5, 8), c(10, 8)]));
        assert_eq!(record.corners[1].state, CornerState::Pushed(record.revision));
    }

    #[test]
    fn blocked_segment_is_bypassed_locally() {
        let fx = Fixture::new();
        let mut grid = GridStore::new();
        grid.install(c(5, 4), CellEntry::node(NodeId::new(9)))
            .expect("install");
        let pts = vec![c(0, 0), c(5, 0), c(5, 8), c(10, 8)];
        let mut record = RecoveryRecord::from_route(&route(pts), 3);
        let before = grid.snapshot();
        let out = fx
            .recovery()
            .recover(&mut grid, &mut record, c(0, 0), c(10, 8), &[])
            .expect("no error")
            .expect("recovered");
        assert_eq!(grid.snapshot(), before);
        assert!(!out.contains(&c(5, 4)));
        assert!(validate_route(&grid, &fx.ctx, &out, Dir::East, Dir::East));
        assert_eq!(out.first(), Some(&c(0, 0)));
        assert_eq!(out.last(), Some(&c(10, 8)));
    }

    #[test]
    fn masks_are_cleared_after_the_attempt() {
        let fx = Fixture::new();
        let mut grid = GridStore::new();
        let mask = Route {
            link: LinkId::new(3),
            points: vec![c(0, 4), c(20, 4)],
            start_dir: Dir::East,
            end_dir: Dir::East,
        };
        let pts = vec![c(0, 0), c(5, 0), c(5, 8), c(10, 8)];
        let mut record = RecoveryRecord::from_route(&route(pts), 3);
        let out = fx
            .recovery()
            .recover(&mut grid, &mut record, c(0, 0), c(10, 8), &[mask])
            .expect("no error");
        // The vertical run crosses the mask, which is allowed.
        assert!(out.is_some());
        assert!(grid.is_empty());
    }
}
