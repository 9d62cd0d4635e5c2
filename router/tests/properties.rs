use gridwire_common::db::indices::{LinkId, NodeId};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;
use gridwire_common::geom::rect::CellRect;
use gridwire_common::util::config::Config;
use gridwire_router::{Engine, LinkRequest, Pad, PadRef, Route};
use rstest::{fixture, rstest};

fn c(x: i32, y: i32) -> CellCoord {
    CellCoord::new(x, y)
}

const PITCH: i32 = 14;
const SIZE: i32 = 4;

fn footprint(slot: (i32, i32)) -> CellRect {
    let min = c(slot.0 * PITCH, slot.1 * PITCH);
    CellRect::new(min, min.offset(SIZE, SIZE))
}

/// Six nodes on a 3x2 lattice. Every node carries three east pads and three
/// west pads; pad `k` sits `k + 1` cells below the top edge.
#[fixture]
fn lattice() -> Engine {
    gridwire_common::util::logger::init_test();
    let mut engine = Engine::new(Config::default());
    for (i, slot) in [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        .into_iter()
        .enumerate()
    {
        let rect = footprint(slot);
        let mut pads = Vec::new();
        for k in 0..3 {
            pads.push(Pad {
                cell: c(rect.max.x, rect.min.y + k + 1),
                side: Dir::East,
            });
        }
        for k in 0..3 {
            pads.push(Pad {
                cell: c(rect.min.x, rect.min.y + k + 1),
                side: Dir::West,
            });
        }
        engine
            .add_node(NodeId::new(i), rect, vec![], pads)
            .expect("node installs");
    }
    engine
}

fn east(node: usize, k: usize) -> PadRef {
    PadRef {
        node: NodeId::new(node),
        pad: k,
    }
}

fn west(node: usize, k: usize) -> PadRef {
    PadRef {
        node: NodeId::new(node),
        pad: 3 + k,
    }
}

fn requests() -> Vec<LinkRequest> {
    [
        (east(0, 0), west(2, 0)),
        (east(3, 0), west(1, 0)),
        (east(0, 1), west(4, 0)),
        (east(4, 0), west(2, 1)),
        (east(3, 1), west(5, 0)),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (source, target))| LinkRequest {
        link: LinkId::new(i),
        source,
        target,
    })
    .collect()
}

fn assert_connected_and_legal(req: &LinkRequest, route: &Route) {
    let cells = route.cells();
    for w in cells.windows(2) {
        assert_eq!(w[0].manhattan(w[1]), 1, "{:?} has a gap at {:?}", req.link, w);
    }
    let slots = [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)];
    let inner = &cells[1..cells.len() - 1];
    for (i, slot) in slots.into_iter().enumerate() {
        let node = NodeId::new(i);
        let rect = footprint(slot);
        assert!(
            inner.iter().all(|cell| !rect.contains(*cell)),
            "{:?} enters {:?}",
            req.link,
            node
        );
    }
}

#[rstest]
fn routed_links_are_connected_and_avoid_foreign_nodes(mut lattice: Engine) {
    for req in requests() {
        lattice.add_link(req).expect("pads exist");
    }
    lattice.route_all().expect("no error");

    let mut routed = 0;
    for req in requests() {
        if let Some(route) = lattice.route(req.link) {
            assert_connected_and_legal(&req, route);
            routed += 1;
        }
    }
    assert!(routed >= 3, "only {} links routed", routed);

    let diag = lattice.diagnose();
    assert!(diag.bad_runs.is_empty(), "{:?}", diag.bad_runs);
    for (a, b) in &diag.crossings {
        assert!(diag.crossings.contains(&(*b, *a)));
    }
}

#[rstest]
fn failed_placement_leaves_the_grid_untouched(mut lattice: Engine) {
    // Wall off node 2's west face, leaving only a short arrival pocket.
    let ring = CellRect::new(c(24, -2), c(34, 6));
    let mut walls = Vec::new();
    for cell in ring.cells() {
        let on_edge = cell.x == ring.min.x
            || cell.x == ring.max.x
            || cell.y == ring.min.y
            || cell.y == ring.max.y;
        if on_edge {
            walls.push(cell);
        }
    }
    for (i, cell) in walls.into_iter().enumerate() {
        lattice
            .add_node(NodeId::new(100 + i), CellRect::new(cell, cell), vec![], vec![])
            .expect("wall installs");
    }
    let before = lattice.grid().snapshot();

    let outcome = lattice
        .place_link(LinkRequest {
            link: LinkId::new(0),
            source: east(0, 0),
            target: west(2, 0),
        })
        .expect("no error");

    assert!(outcome.is_none());
    assert!(lattice.route(LinkId::new(0)).is_none());
    assert_eq!(lattice.grid().snapshot(), before);
    assert!(!lattice.grid().has_tentative());
}

#[rstest]
fn reroute_of_an_untouched_link_keeps_its_geometry(mut lattice: Engine) {
    let req = requests()[2];
    let placed = lattice
        .place_link(req)
        .expect("no error")
        .expect("routed");
    let again = lattice
        .reroute_link(req.link)
        .expect("no error")
        .expect("rerouted");
    assert_eq!(again.points, placed.points);
}

#[rstest]
fn moved_source_is_recovered(mut lattice: Engine) {
    let req = requests()[2];
    lattice
        .place_link(req)
        .expect("no error")
        .expect("routed");
    lattice
        .move_node(req.source.node, 0, 2)
        .expect("node exists");

    let results = lattice.reroute_source(req.source.node).expect("no error");
    assert_eq!(results.len(), 1);
    let (id, route) = &results[0];
    assert_eq!(*id, req.link);
    let route = route.as_ref().expect("rerouted");
    // Pad 1 of node 0 is now at (4, 4).
    assert_eq!(route.points.first(), Some(&c(SIZE, 4)));
    assert_connected_and_legal(&req, route);
}
