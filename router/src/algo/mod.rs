pub mod cleanup;
pub mod jump;
pub mod probe;
pub mod recovery;

use crate::grid::{CellEntry, DirSet, GridStore, LinkCtx, Staging};
use gridwire_common::db::indices::LinkId;
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;
use rustc_hash::FxHashSet;

/// A routed polyline: start pad, corners, target pad.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub link: LinkId,
    pub points: Vec<CellCoord>,
    pub start_dir: Dir,
    pub end_dir: Dir,
}

impl Route {
    pub fn corners(&self) -> usize {
        self.points.len().saturating_sub(2)
    }

    pub fn len(&self) -> i32 {
        path_length(&self.points)
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 2
    }

    pub fn is_orthogonal(&self) -> bool {
        self.points.windows(2).all(|w| w[0].dir_to(w[1]).is_some())
    }

    pub fn cells(&self) -> Vec<CellCoord> {
        route_cells(&self.points)
    }
}

/// Straight run candidate: travel `run_len` cells, put a corner, turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TravelPlan {
    pub corner: CellCoord,
    pub run_len: i32,
    pub turn: Dir,
    pub score: f64,
    pub offset: i32,
    pub crossings: u32,
}

/// Turn options at a point: `primary` heads toward the target laterally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TravelTurn {
    pub at: CellCoord,
    pub dir: Dir,
    pub primary: Dir,
    pub secondary: Dir,
}

impl TravelTurn {
    pub fn new(at: CellCoord, dir: Dir, target: CellCoord) -> Self {
        let lateral_axis = dir.axis().other();
        let lateral = target.along(lateral_axis) - at.along(lateral_axis);
        let [a, b] = dir.perpendiculars();
        let (primary, secondary) = if lateral != 0 && b.sign() == lateral.signum() {
            (b, a)
        } else {
            (a, b)
        };
        Self {
            at,
            dir,
            primary,
            secondary,
        }
    }

    /// Target exactly ahead or behind.
    pub fn is_direct(&self, target: CellCoord) -> bool {
        let lateral_axis = self.dir.axis().other();
        target.along(lateral_axis) == self.at.along(lateral_axis)
    }
}

/// How far travelling in `dir` gets toward the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TravelResult {
    pub dir: Dir,
    /// Cells travelled before stopping.
    pub reach: i32,
    /// Cell of closest approach.
    pub closest: CellCoord,
    /// Manhattan distance left at `closest`.
    pub remaining: i32,
    /// Foreign wires crossed up to `closest`.
    pub crossings: u32,
    pub block: Option<crate::grid::BlockCause>,
    pub hits_target: bool,
}

/// Gaussian penalty values for integer offsets, computed once up to a fixed
/// bound and evaluated directly beyond it.
#[derive(Clone, Debug)]
pub struct GaussianTable {
    sigma: f64,
    values: Vec<f64>,
}

impl GaussianTable {
    pub fn new(sigma: f64, size: usize) -> Self {
        let sigma = sigma.max(f64::EPSILON);
        let values = (0..size).map(|i| gaussian(i as f64, sigma)).collect();
        Self { sigma, values }
    }

    pub fn get(&self, offset: i32) -> f64 {
        let idx = offset.unsigned_abs() as usize;
        match self.values.get(idx) {
            Some(v) => *v,
            None => gaussian(idx as f64, self.sigma),
        }
    }
}

fn gaussian(x: f64, sigma: f64) -> f64 {
    (-(x * x) / (2.0 * sigma * sigma)).exp()
}

pub fn path_length(points: &[CellCoord]) -> i32 {
    points.windows(2).map(|w| w[0].manhattan(w[1])).sum()
}

/// Cells from `a` (exclusive) to `b` (inclusive). Non-orthogonal segments
/// step diagonally first, then straight.
pub fn segment_cells(a: CellCoord, b: CellCoord) -> Vec<CellCoord> {
    let mut out = Vec::new();
    let mut c = a;
    while c != b {
        c = c.offset((b.x - c.x).signum(), (b.y - c.y).signum());
        out.push(c);
    }
    out
}

pub fn route_cells(points: &[CellCoord]) -> Vec<CellCoord> {
    let mut out: Vec<CellCoord> = points.first().copied().into_iter().collect();
    for w in points.windows(2) {
        out.extend(segment_cells(w[0], w[1]));
    }
    out
}

/// Drops repeated points and straight-through corners.
pub fn normalize(points: &[CellCoord]) -> Vec<CellCoord> {
    let mut out: Vec<CellCoord> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last() == Some(&p) {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            if let (Some(d1), Some(d2)) = (a.dir_to(b), b.dir_to(p)) {
                if d1 == d2 {
                    out.pop();
                }
            }
        }
        out.push(p);
    }
    out
}

fn dirset_between(a: CellCoord, b: CellCoord) -> DirSet {
    a.dir_to(b).map(DirSet::of).unwrap_or(DirSet::DIAGONAL)
}

/// Grid entries a route occupies, excluding its two pad cells.
pub fn route_entries(link: LinkId, points: &[CellCoord]) -> Vec<(CellCoord, CellEntry)> {
    let mut out = Vec::new();
    for (i, w) in points.windows(2).enumerate() {
        let (a, b) = (w[0], w[1]);
        let cells = segment_cells(a, b);
        let interior = &cells[..cells.len().saturating_sub(1)];
        for &c in interior {
            let entry = match a.dir_to(b) {
                Some(d) => CellEntry::run(link, d),
                None => CellEntry::degenerate(link),
            };
            out.push((c, entry));
        }
        if i + 2 < points.len() {
            let next = points[i + 2];
            out.push((
                b,
                CellEntry::corner_set(link, dirset_between(a, b), dirset_between(b, next)),
            ));
        }
    }
    out
}

/// Stages a route's interior occupancy plus both pads.
pub fn stage_route(stage: &mut Staging<'_>, route: &Route) {
    for (c, e) in route_entries(route.link, &route.points) {
        stage.install(c, e);
    }
    if let (Some(&first), Some(&last)) = (route.points.first(), route.points.last()) {
        stage.install(
            first,
            CellEntry::pad(route.link, DirSet::empty(), DirSet::of(route.start_dir)),
        );
        stage.install(
            last,
            CellEntry::pad(route.link, DirSet::of(route.end_dir), DirSet::empty()),
        );
    }
}

/// Checks a candidate polyline against the grid: departure and arrival
/// headings, passable cells, corners on turnable cells, no self overlap.
/// The pad cells themselves are not checked.
pub fn validate_route(
    grid: &GridStore,
    ctx: &LinkCtx,
    points: &[CellCoord],
    start_dir: Dir,
    end_dir: Dir,
) -> bool {
    if points.len() < 2 {
        return false;
    }
    let first_dir = points[0].dir_to(points[1]);
    let last_dir = points[points.len() - 2].dir_to(points[points.len() - 1]);
    if first_dir != Some(start_dir) || last_dir != Some(end_dir) {
        return false;
    }
    let end = points[points.len() - 1];
    let mut seen: FxHashSet<CellCoord> = FxHashSet::default();
    seen.insert(points[0]);
    for (i, w) in points.windows(2).enumerate() {
        let dir = w[0].dir_to(w[1]);
        if let (Some(d), Some(prev)) = (dir, i.checked_sub(1).map(|k| points[k])) {
            // Reversal onto the incoming segment.
            if prev.dir_to(w[0]) == Some(d.opposite()) {
                return false;
            }
        }
        for c in segment_cells(w[0], w[1]) {
            if c == end {
                break;
            }
            if !seen.insert(c) {
                return false;
            }
            let pass = match dir {
                Some(d) => grid.passability(c, ctx, d),
                // Diagonal cells may not share space with anything foreign.
                None => grid.passability(c, ctx, Dir::East),
            };
            let is_corner = c == w[1];
            let ok = if is_corner || dir.is_none() {
                pass.is_turnable()
            } else {
                pass.is_open()
            };
            if !ok {
                return false;
            }
        }
    }
    seen.len() + 1 == route_cells(points).len()
}
