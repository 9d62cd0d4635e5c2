pub mod cell;
pub mod store;
pub mod txn;

pub use cell::{CellContents, CellEntry, DirSet, EntryKind, Owner};
pub use store::{GridStore, GroupRegion, Slot};
pub use txn::Staging;

use gridwire_common::db::indices::{GroupId, LinkId, NodeId};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;

/// Identity of the link being routed: decides which node, group, wire and
/// reservation cells it may enter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkCtx {
    pub link: LinkId,
    pub source: NodeId,
    pub target: NodeId,
    pub allowed_groups: Vec<GroupId>,
    /// Links leaving the same pad or entering the same pad. Their wires and
    /// reservations form one tree with ours and may be shared.
    pub siblings: Vec<LinkId>,
    /// Source pad and heading. Source node cells are only passable on the
    /// straight ray leaving this pad.
    pub departure: Option<(CellCoord, Dir)>,
}

impl LinkCtx {
    pub fn new(link: LinkId, source: NodeId, target: NodeId) -> Self {
        Self {
            link,
            source,
            target,
            allowed_groups: Vec::new(),
            siblings: Vec::new(),
            departure: None,
        }
    }

    pub fn with_groups(mut self, groups: Vec<GroupId>) -> Self {
        self.allowed_groups = groups;
        self
    }

    pub fn with_siblings(mut self, siblings: Vec<LinkId>) -> Self {
        self.siblings = siblings;
        self
    }

    pub fn with_departure(mut self, pad: CellCoord, dir: Dir) -> Self {
        self.departure = Some((pad, dir));
        self
    }

    pub fn shares_with(&self, other: LinkId) -> bool {
        other != self.link && self.siblings.contains(&other)
    }

    /// Whether `coord`, entered heading `dir`, is the source pad or lies on
    /// the straight ray leaving it.
    pub fn on_departure_ray(&self, coord: CellCoord, dir: Dir) -> bool {
        let Some((pad, heading)) = self.departure else {
            return false;
        };
        coord == pad || (heading == dir && pad.dir_to(coord) == Some(heading))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockCause {
    Node(NodeId),
    Wire(LinkId),
    Reserved(LinkId),
    Group(GroupId),
    SelfOverlap,
    OutOfBounds,
}

/// Whether a link may travel through a cell in a given direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Open { crossings: u32 },
    Blocked(BlockCause),
}

impl Pass {
    pub fn is_open(&self) -> bool {
        matches!(self, Pass::Open { .. })
    }

    pub fn crossings(&self) -> u32 {
        match self {
            Pass::Open { crossings } => *crossings,
            Pass::Blocked(_) => 0,
        }
    }

    /// A corner may only sit on a cell it does not share with foreign wires.
    pub fn is_turnable(&self) -> bool {
        matches!(self, Pass::Open { crossings: 0 })
    }
}
