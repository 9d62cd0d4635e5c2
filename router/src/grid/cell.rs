use bitflags::bitflags;
use gridwire_common::db::indices::{GroupId, LinkId, NodeId};
use gridwire_common::geom::dir::{Axis, Dir};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirSet: u8 {
        const NORTH = 1;
        const EAST = 2;
        const SOUTH = 4;
        const WEST = 8;
        const DIAGONAL = 16;
    }
}

impl DirSet {
    pub fn of(dir: Dir) -> DirSet {
        match dir {
            Dir::North => DirSet::NORTH,
            Dir::East => DirSet::EAST,
            Dir::South => DirSet::SOUTH,
            Dir::West => DirSet::WEST,
        }
    }

    pub fn has_horizontal(self) -> bool {
        self.intersects(DirSet::EAST | DirSet::WEST)
    }

    pub fn has_vertical(self) -> bool {
        self.intersects(DirSet::NORTH | DirSet::SOUTH)
    }

    pub fn dirs(self) -> impl Iterator<Item = Dir> {
        Dir::ALL.into_iter().filter(move |d| self.contains(DirSet::of(*d)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Owner {
    Node(NodeId),
    Link(LinkId),
    Group(GroupId),
}

impl Owner {
    pub fn link(self) -> Option<LinkId> {
        match self {
            Owner::Link(l) => Some(l),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Node,
    NodeInboundOk,
    Corner,
    Pad,
    Run,
    Degenerate,
    ReservedDepartureRun,
    ReservedArrivalRun,
    ReservedMultiArrivalRun,
    Group,
}

impl EntryKind {
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            EntryKind::ReservedDepartureRun
                | EntryKind::ReservedArrivalRun
                | EntryKind::ReservedMultiArrivalRun
        )
    }

    /// Kinds drawn by a committed link route.
    pub fn is_wire(self) -> bool {
        matches!(
            self,
            EntryKind::Corner | EntryKind::Pad | EntryKind::Run | EntryKind::Degenerate
        )
    }
}

/// One occupant of a cell. `entry` holds the travel directions with which the
/// owner enters the cell, `exit` those with which it leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellEntry {
    pub owner: Owner,
    pub kind: EntryKind,
    pub entry: DirSet,
    pub exit: DirSet,
    pub count: u32,
    pub temporary: bool,
}

impl CellEntry {
    fn bare(owner: Owner, kind: EntryKind) -> Self {
        Self {
            owner,
            kind,
            entry: DirSet::empty(),
            exit: DirSet::empty(),
            count: 1,
            temporary: false,
        }
    }

    pub fn node(node: NodeId) -> Self {
        Self::bare(Owner::Node(node), EntryKind::Node)
    }

    pub fn inbound_ok(node: NodeId) -> Self {
        Self::bare(Owner::Node(node), EntryKind::NodeInboundOk)
    }

    pub fn group(group: GroupId) -> Self {
        Self::bare(Owner::Group(group), EntryKind::Group)
    }

    pub fn run(link: LinkId, dir: Dir) -> Self {
        let d = DirSet::of(dir);
        Self {
            entry: d,
            exit: d,
            ..Self::bare(Owner::Link(link), EntryKind::Run)
        }
    }

    pub fn corner(link: LinkId, inbound: Dir, outbound: Dir) -> Self {
        Self {
            entry: DirSet::of(inbound),
            exit: DirSet::of(outbound),
            ..Self::bare(Owner::Link(link), EntryKind::Corner)
        }
    }

    pub fn corner_set(link: LinkId, entry: DirSet, exit: DirSet) -> Self {
        Self {
            entry,
            exit,
            ..Self::bare(Owner::Link(link), EntryKind::Corner)
        }
    }

    /// A pad is entered (`arrival`) or left (`departure`) in one direction.
    pub fn pad(link: LinkId, entry: DirSet, exit: DirSet) -> Self {
        Self {
            entry,
            exit,
            ..Self::bare(Owner::Link(link), EntryKind::Pad)
        }
    }

    /// Cell on a diagonal splice; never merged, never crossable.
    pub fn degenerate(link: LinkId) -> Self {
        Self {
            entry: DirSet::DIAGONAL,
            exit: DirSet::DIAGONAL,
            ..Self::bare(Owner::Link(link), EntryKind::Degenerate)
        }
    }

    pub fn reserved(link: LinkId, kind: EntryKind, dir: Dir) -> Self {
        debug_assert!(kind.is_reserved());
        let d = DirSet::of(dir);
        Self {
            entry: d,
            exit: d,
            ..Self::bare(Owner::Link(link), kind)
        }
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Axis a run occupies, `None` for anything but a well-formed run.
    pub fn run_axis(&self) -> Option<Axis> {
        if self.kind != EntryKind::Run {
            return None;
        }
        let all = self.entry | self.exit;
        match (all.has_horizontal(), all.has_vertical()) {
            (true, false) => Some(Axis::Horizontal),
            (false, true) => Some(Axis::Vertical),
            _ => None,
        }
    }

    /// A run stays on one axis and never reverses within the cell.
    pub fn is_well_formed_run(&self) -> bool {
        if self.kind != EntryKind::Run || self.run_axis().is_none() {
            return false;
        }
        let all = self.entry | self.exit;
        !(all.contains(DirSet::EAST | DirSet::WEST) || all.contains(DirSet::NORTH | DirSet::SOUTH))
    }

    fn mergeable_with(&self, other: &CellEntry) -> bool {
        if self.owner != other.owner || self.kind != other.kind {
            return false;
        }
        match self.kind {
            EntryKind::Corner => true,
            EntryKind::Run => self.run_axis().is_some() && self.run_axis() == other.run_axis(),
            _ => false,
        }
    }

    fn absorb(&mut self, other: &CellEntry) {
        self.entry |= other.entry;
        self.exit |= other.exit;
        self.count += other.count;
        self.temporary |= other.temporary;
    }
}

/// Contents of a cell. A sum type: a cell is empty, holds one entry, or holds
/// an ordered list of two or more.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CellContents {
    #[default]
    Empty,
    Single(CellEntry),
    Multi(Vec<CellEntry>),
}

impl CellContents {
    pub fn entries(&self) -> &[CellEntry] {
        match self {
            CellContents::Empty => &[],
            CellContents::Single(e) => std::slice::from_ref(e),
            CellContents::Multi(v) => v,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellContents::Empty)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn from_entries(mut entries: Vec<CellEntry>) -> CellContents {
        match entries.len() {
            0 => CellContents::Empty,
            1 => CellContents::Single(entries.remove(0)),
            _ => CellContents::Multi(entries),
        }
    }

    pub fn into_entries(self) -> Vec<CellEntry> {
        match self {
            CellContents::Empty => Vec::new(),
            CellContents::Single(e) => vec![e],
            CellContents::Multi(v) => v,
        }
    }

    /// Applies the merge rule: a same-owner corner (or same-axis run) absorbs
    /// the new entry, anything else is appended.
    pub fn with(self, entry: CellEntry) -> CellContents {
        let mut entries = self.into_entries();
        match entries.iter_mut().find(|e| e.mergeable_with(&entry)) {
            Some(existing) => existing.absorb(&entry),
            None => entries.push(entry),
        }
        CellContents::from_entries(entries)
    }

    pub fn without(self, pred: impl Fn(&CellEntry) -> bool) -> CellContents {
        let mut entries = self.into_entries();
        entries.retain(|e| !pred(e));
        CellContents::from_entries(entries)
    }

    /// Drops computed group overlays.
    pub fn strip_groups(self) -> CellContents {
        self.without(|e| e.kind == EntryKind::Group)
    }

    pub fn clear_temporary(self) -> CellContents {
        let entries = self
            .into_entries()
            .into_iter()
            .map(|mut e| {
                e.temporary = false;
                e
            })
            .collect();
        CellContents::from_entries(entries)
    }

    pub fn has_temporary(&self) -> bool {
        self.entries().iter().any(|e| e.temporary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(i: usize) -> LinkId {
        LinkId::new(i)
    }

    #[test]
    fn same_owner_corners_merge() {
        let c = CellContents::Empty
            .with(CellEntry::corner(l(0), Dir::East, Dir::North))
            .with(CellEntry::corner(l(0), Dir::East, Dir::South));
        let CellContents::Single(e) = c else {
            panic!("expected merged corner, got {:?}", c);
        };
        assert_eq!(e.count, 2);
        assert_eq!(e.exit, DirSet::NORTH | DirSet::SOUTH);
    }

    #[test]
    fn foreign_entries_promote_to_multi_and_demote_back() {
        let a = CellEntry::run(l(0), Dir::East);
        let b = CellEntry::run(l(1), Dir::North);
        let c = CellContents::Single(a).with(b);
        assert!(matches!(c, CellContents::Multi(ref v) if v.len() == 2));
        let back = c.without(|e| e.owner == Owner::Link(l(1)));
        assert_eq!(back, CellContents::Single(a));
    }

    #[test]
    fn perpendicular_runs_of_one_owner_do_not_merge() {
        let c = CellContents::Empty
            .with(CellEntry::run(l(0), Dir::East))
            .with(CellEntry::run(l(0), Dir::South));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn reversing_run_is_malformed() {
        let mut e = CellEntry::run(l(0), Dir::East);
        assert!(e.is_well_formed_run());
        e.exit |= DirSet::WEST;
        assert!(!e.is_well_formed_run());
    }
}
