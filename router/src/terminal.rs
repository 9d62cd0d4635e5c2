//! Departure and arrival slot runs next to pads.
//!
//! A region is the contiguous prefix of cells a link may use to leave its
//! source pad (or to reach its target pad) in the pad's direction. Regions
//! are reserved before a search so competing links cannot claim them, then
//! either converted into pad occupancy or dropped.

use crate::error::Result;
use crate::grid::{CellEntry, DirSet, EntryKind, GridStore, LinkCtx, Owner};
use gridwire_common::db::indices::LinkId;
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalKind {
    Departure,
    Arrival,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalRegion {
    pub owner: LinkId,
    /// The pad cell.
    pub start: CellCoord,
    /// Travel direction: away from a departure pad, into an arrival pad.
    pub dir: Dir,
    pub slots: Vec<bool>,
    pub kind: TerminalKind,
    reserved: Vec<(CellCoord, EntryKind)>,
}

impl TerminalRegion {
    fn walk(
        grid: &GridStore,
        ctx: &LinkCtx,
        start: CellCoord,
        dir: Dir,
        kind: TerminalKind,
        max_slots: usize,
    ) -> Self {
        let outward = match kind {
            TerminalKind::Departure => dir,
            TerminalKind::Arrival => dir.opposite(),
        };
        let mut open = true;
        let slots = (1..=max_slots as i32)
            .map(|i| {
                let c = start.step(outward, i);
                open = open && grid.passability(c, ctx, dir).is_open();
                open
            })
            .collect();
        Self {
            owner: ctx.link,
            start,
            dir,
            slots,
            kind,
            reserved: Vec::new(),
        }
    }

    pub fn valid_len(&self) -> usize {
        self.slots.iter().take_while(|v| **v).count()
    }

    pub fn is_usable(&self) -> bool {
        self.valid_len() > 0
    }

    /// Cell of slot `i` (0 is adjacent to the pad).
    pub fn slot_cell(&self, i: usize) -> CellCoord {
        let outward = match self.kind {
            TerminalKind::Departure => self.dir,
            TerminalKind::Arrival => self.dir.opposite(),
        };
        self.start.step(outward, i as i32 + 1)
    }

    pub fn valid_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (0..self.valid_len()).map(|i| self.slot_cell(i))
    }

    pub fn is_reserved(&self) -> bool {
        !self.reserved.is_empty()
    }

    /// Claims the valid slots so other links treat them as blocked.
    pub fn reserve(&mut self, grid: &mut GridStore) -> Result<()> {
        let kind = match self.kind {
            TerminalKind::Departure => EntryKind::ReservedDepartureRun,
            TerminalKind::Arrival => {
                let fan_in = grid.get(self.start, false).entries().iter().any(|e| {
                    e.kind == EntryKind::Pad && e.owner != Owner::Link(self.owner)
                });
                if fan_in {
                    EntryKind::ReservedMultiArrivalRun
                } else {
                    EntryKind::ReservedArrivalRun
                }
            }
        };
        let cells: Vec<CellCoord> = self.valid_cells().collect();
        for c in cells {
            grid.install(c, CellEntry::reserved(self.owner, kind, self.dir))?;
            self.reserved.push((c, kind));
        }
        Ok(())
    }

    /// Releases the reservation without drawing anything.
    pub fn drop_reservation(&mut self, grid: &mut GridStore) {
        for (c, kind) in self.reserved.drain(..).rev() {
            grid.remove_entries(c, Owner::Link(self.owner), Some(kind));
        }
    }

    /// Replaces the reservation with the pad occupancy of a drawn route.
    pub fn convert(mut self, grid: &mut GridStore) -> Result<()> {
        self.drop_reservation(grid);
        let pad = match self.kind {
            TerminalKind::Departure => {
                CellEntry::pad(self.owner, DirSet::empty(), DirSet::of(self.dir))
            }
            TerminalKind::Arrival => {
                CellEntry::pad(self.owner, DirSet::of(self.dir), DirSet::empty())
            }
        };
        grid.install(self.start, pad)
    }
}

pub fn departure_region(
    grid: &GridStore,
    ctx: &LinkCtx,
    dir: Dir,
    start: CellCoord,
    max_slots: usize,
) -> TerminalRegion {
    TerminalRegion::walk(grid, ctx, start, dir, TerminalKind::Departure, max_slots)
}

/// `dir` is the travel direction into `target`; slots are walked backward.
pub fn arrival_region(
    grid: &GridStore,
    ctx: &LinkCtx,
    dir: Dir,
    target: CellCoord,
    max_slots: usize,
) -> TerminalRegion {
    TerminalRegion::walk(grid, ctx, target, dir, TerminalKind::Arrival, max_slots)
}

/// Single free cell next to `target`, used once ordinary budgets are spent.
/// `preferred` is tried first, then the other directions.
pub fn emergency_arrival_region(
    grid: &GridStore,
    ctx: &LinkCtx,
    target: CellCoord,
    preferred: Dir,
) -> Option<TerminalRegion> {
    let order = std::iter::once(preferred).chain(Dir::ALL.into_iter().filter(|d| *d != preferred));
    for dir in order {
        let from = target.step(dir.opposite(), 1);
        if !grid.passability(from, ctx, dir).is_turnable() {
            continue;
        }
        // The approach cell must lead somewhere.
        if grid.open_neighbors(from, ctx) < 2 {
            continue;
        }
        log::debug!(
            "Emergency arrival for {:?} at {:?} heading {:?}",
            ctx.link,
            target,
            dir
        );
        return Some(TerminalRegion {
            owner: ctx.link,
            start: target,
            dir,
            slots: vec![true],
            kind: TerminalKind::Arrival,
            reserved: Vec::new(),
        });
    }
    None
}
