use super::cell::{CellContents, CellEntry, EntryKind, Owner};
use super::{BlockCause, LinkCtx, Pass};
use crate::error::{Result, RouteError};
use gridwire_common::db::indices::{GroupId, NodeId};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;
use gridwire_common::geom::rect::CellRect;
use gridwire_common::geom::rtree::SpatialIndex;
use rustc_hash::FxHashMap;

/// Stored state of one cell. A tentative slot remembers the permanent
/// contents it was staged over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Permanent(CellContents),
    Tentative {
        live: CellContents,
        prior: CellContents,
    },
}

impl Slot {
    pub fn live(&self) -> &CellContents {
        match self {
            Slot::Permanent(c) => c,
            Slot::Tentative { live, .. } => live,
        }
    }

    fn permanent(&self) -> &CellContents {
        match self {
            Slot::Permanent(c) => c,
            Slot::Tentative { prior, .. } => prior,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRegion {
    pub id: GroupId,
    pub rect: CellRect,
    pub z: i32,
    pub members: Vec<NodeId>,
}

/// Sparse quantized occupancy grid.
#[derive(Default)]
pub struct GridStore {
    cells: FxHashMap<CellCoord, Slot>,
    journal: Vec<(CellCoord, Option<Slot>)>,
    groups: FxHashMap<GroupId, GroupRegion>,
    group_index: SpatialIndex,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Live contents, optionally with the group overlays covering `coord`.
    pub fn get(&self, coord: CellCoord, fold_groups: bool) -> CellContents {
        let base = self
            .cells
            .get(&coord)
            .map(|s| s.live().clone())
            .unwrap_or_default();
        if !fold_groups {
            return base;
        }
        self.groups_at(coord)
            .into_iter()
            .fold(base, |acc, g| acc.with(CellEntry::group(g.id)))
    }

    pub fn contents(&self, coord: CellCoord) -> Option<&CellContents> {
        self.cells.get(&coord).map(|s| s.live())
    }

    pub fn slot(&self, coord: CellCoord) -> Option<&Slot> {
        self.cells.get(&coord)
    }

    /// Groups covering `coord`, lowest z first.
    pub fn groups_at(&self, coord: CellCoord) -> Vec<&GroupRegion> {
        let mut out: Vec<&GroupRegion> = self
            .group_index
            .query_point(coord)
            .into_iter()
            .filter_map(|id| self.groups.get(&GroupId::new(id)))
            .collect();
        out.sort_by_key(|g| (g.z, g.id));
        out
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupRegion> {
        self.groups.get(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupRegion> {
        self.groups.values()
    }

    pub fn add_group(&mut self, region: GroupRegion) {
        self.remove_group(region.id);
        self.group_index.insert(region.rect, region.id.index());
        self.groups.insert(region.id, region);
    }

    pub fn remove_group(&mut self, id: GroupId) -> Option<GroupRegion> {
        let region = self.groups.remove(&id)?;
        self.group_index.remove(region.rect, id.index());
        Some(region)
    }

    /// Permanent install. Refused while tentative state is outstanding, since
    /// a rollback would silently discard it.
    pub fn install(&mut self, coord: CellCoord, entry: CellEntry) -> Result<()> {
        if !self.journal.is_empty() {
            return Err(RouteError::InvariantViolation(format!(
                "permanent install at {:?} during staging",
                coord
            )));
        }
        let current = self.get(coord, false);
        self.write_back(coord, current.with(entry));
        Ok(())
    }

    /// Journaled tentative install; undone by `rollback_to`.
    pub fn install_temp(&mut self, coord: CellCoord, entry: CellEntry) {
        let old = self.cells.get(&coord).cloned();
        let prior = old
            .as_ref()
            .map(|s| s.permanent().clone())
            .unwrap_or_default();
        let live = old
            .as_ref()
            .map(|s| s.live().clone())
            .unwrap_or_default()
            .with(entry.temporary());
        self.journal.push((coord, old));
        self.cells.insert(coord, Slot::Tentative { live, prior });
    }

    /// Stores `contents` permanently; a cell left with nothing but group
    /// overlays is pruned.
    pub fn write_back(&mut self, coord: CellCoord, contents: CellContents) {
        let contents = contents.strip_groups();
        if contents.is_empty() {
            self.cells.remove(&coord);
        } else {
            self.cells.insert(coord, Slot::Permanent(contents));
        }
    }

    pub fn remove(&mut self, coord: CellCoord) -> Option<CellContents> {
        self.cells.remove(&coord).map(|s| s.live().clone())
    }

    /// Removes entries of `owner` (of `kind`, if given). Returns whether any
    /// entry was removed.
    pub fn remove_entries(
        &mut self,
        coord: CellCoord,
        owner: Owner,
        kind: Option<EntryKind>,
    ) -> bool {
        let Some(current) = self.cells.get(&coord).map(|s| s.live().clone()) else {
            return false;
        };
        let before = current.len();
        let after = current.without(|e| e.owner == owner && kind.is_none_or(|k| e.kind == k));
        let removed = after.len() != before;
        if removed {
            self.write_back(coord, after);
        }
        removed
    }

    pub fn mark(&self) -> usize {
        self.journal.len()
    }

    pub fn has_tentative(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Restores every cell touched since `mark`, newest first.
    pub fn rollback_to(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some((coord, old)) = self.journal.pop() else {
                break;
            };
            match old {
                Some(slot) => {
                    self.cells.insert(coord, slot);
                }
                None => {
                    self.cells.remove(&coord);
                }
            }
        }
    }

    /// Turns all tentative slots permanent and clears the journal.
    pub fn commit_all(&mut self) {
        let coords: Vec<CellCoord> = self.journal.drain(..).map(|(c, _)| c).collect();
        for coord in coords {
            if let Some(Slot::Tentative { live, .. }) = self.cells.get(&coord).cloned() {
                self.write_back(coord, live.clear_temporary());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &CellContents)> {
        self.cells.iter().map(|(c, s)| (*c, s.live()))
    }

    /// Sorted copy of all stored cells; used for scans and state comparison.
    pub fn snapshot(&self) -> Vec<(CellCoord, Slot)> {
        let mut out: Vec<(CellCoord, Slot)> =
            self.cells.iter().map(|(c, s)| (*c, s.clone())).collect();
        out.sort_by_key(|(c, _)| *c);
        out
    }

    /// Bounding box of occupied cells and group rectangles.
    pub fn extent(&self) -> Option<CellRect> {
        let mut coords = self
            .cells
            .keys()
            .copied()
            .chain(self.groups.values().flat_map(|g| [g.rect.min, g.rect.max]));
        let first = coords.next()?;
        let mut rect = CellRect::new(first, first);
        for c in coords {
            rect.include(c);
        }
        Some(rect)
    }

    /// Decides whether `ctx`'s link may travel through `coord` heading `dir`.
    pub fn passability(&self, coord: CellCoord, ctx: &LinkCtx, dir: Dir) -> Pass {
        let mut crossings = 0;
        if let Some(contents) = self.contents(coord) {
            let entries = contents.entries();
            let inbound_ok = entries.iter().any(|e| {
                e.kind == EntryKind::NodeInboundOk && e.owner == Owner::Node(ctx.target)
            });
            for e in entries {
                match (e.kind, e.owner) {
                    (EntryKind::Node, Owner::Node(n)) => {
                        let departing = n == ctx.source && ctx.on_departure_ray(coord, dir);
                        let arriving = n == ctx.target && inbound_ok;
                        if !departing && !arriving {
                            return Pass::Blocked(BlockCause::Node(n));
                        }
                    }
                    (EntryKind::NodeInboundOk, _) | (EntryKind::Group, _) => {}
                    (_, Owner::Link(l)) if ctx.shares_with(l) => {}
                    (kind, Owner::Link(l)) if kind.is_reserved() => {
                        if l != ctx.link {
                            return Pass::Blocked(BlockCause::Reserved(l));
                        }
                    }
                    (EntryKind::Run, Owner::Link(l)) => {
                        if l == ctx.link {
                            return Pass::Blocked(BlockCause::SelfOverlap);
                        }
                        match e.run_axis() {
                            Some(axis) if axis != dir.axis() => crossings += 1,
                            _ => return Pass::Blocked(BlockCause::Wire(l)),
                        }
                    }
                    (_, Owner::Link(l)) => {
                        if l == ctx.link {
                            return Pass::Blocked(BlockCause::SelfOverlap);
                        }
                        return Pass::Blocked(BlockCause::Wire(l));
                    }
                    _ => {}
                }
            }
        }
        for g in self.groups_at(coord) {
            if !ctx.allowed_groups.contains(&g.id) {
                return Pass::Blocked(BlockCause::Group(g.id));
            }
        }
        Pass::Open { crossings }
    }

    /// Number of orthogonal neighbours `ctx` could step into.
    pub fn open_neighbors(&self, coord: CellCoord, ctx: &LinkCtx) -> usize {
        Dir::ALL
            .iter()
            .filter(|d| self.passability(coord.step(**d, 1), ctx, **d).is_open())
            .count()
    }
}
