//! Read-only diagnostics over committed grid state: malformed link drawing,
//! nodes intruding into foreign groups, node overlaps and wire crossings.
//!
//! Scans take a snapshot of the live cells and fan out over the rayon pool.
//! Results are sorted so repeated runs agree.

use crate::grid::{CellContents, CellEntry, EntryKind, GridStore, Owner};
use gridwire_common::db::indices::{GroupId, LinkId, NodeId};
use gridwire_common::geom::coord::CellCoord;
use petgraph::graphmap::UnGraphMap;
use rayon::prelude::*;
use std::collections::BTreeSet;

fn live_cells(grid: &GridStore) -> Vec<(CellCoord, CellContents)> {
    grid.iter().map(|(c, v)| (c, v.clone())).collect()
}

/// Link owners with at least one malformed cell.
pub fn find_bad_runs(grid: &GridStore) -> BTreeSet<Owner> {
    let cells = live_cells(grid);
    cells
        .par_iter()
        .flat_map_iter(|(_, contents)| malformed_owners(contents))
        .collect()
}

fn malformed_owners(contents: &CellContents) -> Vec<Owner> {
    let entries = contents.entries();
    let owners: BTreeSet<Owner> = entries
        .iter()
        .filter(|e| e.owner.link().is_some())
        .map(|e| e.owner)
        .collect();
    owners
        .into_iter()
        .filter(|o| is_malformed(entries.iter().filter(|e| e.owner == *o)))
        .collect()
}

fn is_malformed<'a>(mine: impl Iterator<Item = &'a CellEntry>) -> bool {
    let mut corners = 0;
    let mut runs = 0;
    for e in mine {
        match e.kind {
            EntryKind::Corner => {
                corners += 1;
                if e.count >= 3 {
                    return true;
                }
            }
            EntryKind::Run => {
                runs += 1;
                if e.count > 1 || !e.is_well_formed_run() {
                    return true;
                }
            }
            _ => {}
        }
    }
    corners > 1 || (corners > 0 && runs > 0)
}

/// A cell where an owner sits inside a group it does not belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleViolation {
    pub at: CellCoord,
    pub owner: Owner,
    pub group: GroupId,
}

/// Node cells inside groups the node is not a member of, and link wires
/// inside groups `link_allowed` refuses.
pub fn find_bad_module_cells<F>(grid: &GridStore, link_allowed: F) -> Vec<ModuleViolation>
where
    F: Fn(LinkId, GroupId) -> bool + Sync,
{
    let cells = live_cells(grid);
    let mut out: Vec<ModuleViolation> = cells
        .par_iter()
        .flat_map_iter(|(at, contents)| {
            let groups = grid.groups_at(*at);
            let mut found = Vec::new();
            for e in contents.entries() {
                for g in &groups {
                    let bad = match (e.kind, e.owner) {
                        (EntryKind::Node, Owner::Node(n)) => !g.members.contains(&n),
                        (kind, Owner::Link(l)) if kind.is_wire() => !link_allowed(l, g.id),
                        _ => false,
                    };
                    if bad {
                        found.push(ModuleViolation {
                            at: *at,
                            owner: e.owner,
                            group: g.id,
                        });
                    }
                }
            }
            found
        })
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Cells claimed by more than one node, with each distinct pair once.
pub fn get_node_overlaps(grid: &GridStore) -> Vec<(CellCoord, NodeId, NodeId)> {
    let cells = live_cells(grid);
    let mut out: Vec<(CellCoord, NodeId, NodeId)> = cells
        .par_iter()
        .flat_map_iter(|(at, contents)| {
            let nodes: BTreeSet<NodeId> = contents
                .entries()
                .iter()
                .filter_map(|e| match (e.kind, e.owner) {
                    (EntryKind::Node, Owner::Node(n)) => Some(n),
                    _ => None,
                })
                .collect();
            let nodes: Vec<NodeId> = nodes.into_iter().collect();
            let mut pairs = Vec::new();
            for (i, a) in nodes.iter().enumerate() {
                for b in &nodes[i + 1..] {
                    pairs.push((*at, *a, *b));
                }
            }
            pairs
        })
        .collect();
    out.sort();
    out
}

fn crossing_pairs(contents: &CellContents) -> Vec<(LinkId, LinkId)> {
    let links: BTreeSet<LinkId> = contents
        .entries()
        .iter()
        .filter_map(|e| e.owner.link())
        .collect();
    let links: Vec<LinkId> = links.into_iter().collect();
    let mut out = Vec::new();
    for (i, a) in links.iter().enumerate() {
        for b in &links[i + 1..] {
            out.push((*a, *b));
        }
    }
    out
}

/// Undirected graph of links sharing cells; edge weights count shared
/// cells.
pub fn build_crossing_graph(grid: &GridStore) -> UnGraphMap<LinkId, u32> {
    let cells = live_cells(grid);
    let mut pairs: Vec<(LinkId, LinkId)> = cells
        .par_iter()
        .flat_map_iter(|(_, contents)| crossing_pairs(contents))
        .collect();
    pairs.sort();

    let mut graph = UnGraphMap::new();
    for (a, b) in pairs {
        match graph.edge_weight_mut(a, b) {
            Some(w) => *w += 1,
            None => {
                graph.add_edge(a, b, 1);
            }
        }
    }
    graph
}

/// Every crossing pair in both orientations, sorted.
pub fn get_all_crossings(grid: &GridStore) -> Vec<(LinkId, LinkId)> {
    let graph = build_crossing_graph(grid);
    let mut out: Vec<(LinkId, LinkId)> = graph
        .all_edges()
        .flat_map(|(a, b, _)| [(a, b), (b, a)])
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{DirSet, GroupRegion};
    use gridwire_common::geom::dir::Dir;
    use gridwire_common::geom::rect::CellRect;

    fn c(x: i32, y: i32) -> CellCoord {
        CellCoord::new(x, y)
    }

    fn link(i: usize) -> LinkId {
        LinkId::new(i)
    }

    #[test]
    fn crossings_are_symmetric() {
        let mut grid = GridStore::new();
        for x in 0..6 {
            grid.install(c(x, 2), CellEntry::run(link(0), Dir::East))
                .expect("install");
        }
        for y in 0..6 {
            grid.install(c(2, y), CellEntry::run(link(1), Dir::South))
                .expect("install");
            grid.install(c(4, y), CellEntry::run(link(2), Dir::North))
                .expect("install");
        }
        let all = get_all_crossings(&grid);
        for (a, b) in &all {
            assert!(all.contains(&(*b, *a)));
        }
        assert_eq!(
            all,
            vec![
                (link(0), link(1)),
                (link(0), link(2)),
                (link(1), link(0)),
                (link(2), link(0)),
            ]
        );
        let graph = build_crossing_graph(&grid);
        assert_eq!(graph.edge_weight(link(1), link(0)), Some(&1));
        assert!(!graph.contains_edge(link(1), link(2)));
    }

    #[test]
    fn stacked_runs_are_bad_but_one_run_per_axis_is_not() {
        let mut grid = GridStore::new();
        // Link 0 runs both ways through one cell, once per axis.
        grid.install(c(0, 0), CellEntry::run(link(0), Dir::East))
            .expect("install");
        grid.install(c(0, 0), CellEntry::run(link(0), Dir::North))
            .expect("install");
        // Link 1 passes the same cell twice on one axis.
        grid.install(c(5, 5), CellEntry::run(link(1), Dir::East))
            .expect("install");
        grid.install(c(5, 5), CellEntry::run(link(1), Dir::East))
            .expect("install");
        // Link 2 is fine.
        grid.install(c(9, 9), CellEntry::run(link(2), Dir::East))
            .expect("install");
        grid.install(
            c(9, 8),
            CellEntry::corner_set(link(2), DirSet::EAST, DirSet::NORTH),
        )
        .expect("install");
        let bad = find_bad_runs(&grid);
        assert_eq!(bad.into_iter().collect::<Vec<_>>(), vec![Owner::Link(link(1))]);
    }

    #[test]
    fn every_pair_sharing_a_cell_is_an_edge() {
        let mut grid = GridStore::new();
        // Two arrivals into one pad, and a corner laid on a foreign run.
        let pad = c(10, 0);
        grid.install(pad, CellEntry::pad(link(0), DirSet::EAST, DirSet::empty()))
            .expect("install");
        grid.install(pad, CellEntry::pad(link(1), DirSet::EAST, DirSet::empty()))
            .expect("install");
        grid.install(c(3, 3), CellEntry::run(link(2), Dir::East))
            .expect("install");
        grid.install(
            c(3, 3),
            CellEntry::corner_set(link(3), DirSet::WEST, DirSet::SOUTH),
        )
        .expect("install");

        let all = get_all_crossings(&grid);
        assert_eq!(
            all,
            vec![
                (link(0), link(1)),
                (link(1), link(0)),
                (link(2), link(3)),
                (link(3), link(2)),
            ]
        );
    }

    #[test]
    fn foreign_nodes_inside_groups_are_reported() {
        let mut grid = GridStore::new();
        grid.add_group(GroupRegion {
            id: GroupId::new(0),
            rect: CellRect::new(c(0, 0), c(9, 9)),
            z: 0,
            members: vec![NodeId::new(1)],
        });
        grid.install(c(1, 1), CellEntry::node(NodeId::new(1)))
            .expect("install");
        grid.install(c(2, 2), CellEntry::node(NodeId::new(2)))
            .expect("install");
        grid.install(c(3, 3), CellEntry::run(link(4), Dir::East))
            .expect("install");
        let bad = find_bad_module_cells(&grid, |l, _| l == link(4));
        assert_eq!(
            bad,
            vec![ModuleViolation {
                at: c(2, 2),
                owner: Owner::Node(NodeId::new(2)),
                group: GroupId::new(0),
            }]
        );
    }

    #[test]
    fn overlapping_nodes_are_paired_once() {
        let mut grid = GridStore::new();
        for n in [3, 1, 2] {
            grid.install(c(0, 0), CellEntry::node(NodeId::new(n)))
                .expect("install");
        }
        let overlaps = get_node_overlaps(&grid);
        assert_eq!(overlaps.len(), 3);
        assert_eq!(overlaps[0], (c(0, 0), NodeId::new(1), NodeId::new(2)));
    }
}
