use gridwire_common::db::indices::{LinkId, NodeId};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::Dir;
use gridwire_common::geom::rect::CellRect;
use gridwire_common::util::config::Config;
use gridwire_router::analysis;
use gridwire_router::grid::{CellEntry, DirSet, GridStore, Owner};
use gridwire_router::{Engine, LinkRequest, Pad, PadRef};
use rstest::{fixture, rstest};

fn c(x: i32, y: i32) -> CellCoord {
    CellCoord::new(x, y)
}

fn add_node(engine: &mut Engine, id: usize, min: CellCoord, max: CellCoord, pads: Vec<Pad>) {
    engine
        .add_node(NodeId::new(id), CellRect::new(min, max), vec![], pads)
        .expect("node installs");
}

fn pad(cell: CellCoord, side: Dir) -> Pad {
    Pad { cell, side }
}

fn link(id: usize, source: usize, target: usize) -> LinkRequest {
    LinkRequest {
        link: LinkId::new(id),
        source: PadRef {
            node: NodeId::new(source),
            pad: 0,
        },
        target: PadRef {
            node: NodeId::new(target),
            pad: 0,
        },
    }
}

#[fixture]
fn engine() -> Engine {
    gridwire_common::util::logger::init_test();
    Engine::new(Config::default())
}

#[rstest]
fn straight_run_between_facing_pads(mut engine: Engine) {
    add_node(&mut engine, 0, c(-4, -2), c(0, 2), vec![pad(c(0, 0), Dir::East)]);
    add_node(&mut engine, 1, c(5, -2), c(9, 2), vec![pad(c(5, 0), Dir::West)]);

    let route = engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");

    assert_eq!(route.points, vec![c(0, 0), c(5, 0)]);
    assert_eq!(route.corners(), 0);
    assert!(engine.diagnose().crossings.is_empty());
}

#[rstest]
fn blocking_node_forces_a_single_sided_detour(mut engine: Engine) {
    add_node(&mut engine, 0, c(-4, -2), c(0, 2), vec![pad(c(0, 0), Dir::East)]);
    add_node(&mut engine, 1, c(10, -2), c(14, 2), vec![pad(c(10, 0), Dir::West)]);
    let blocker = CellRect::new(c(4, -1), c(6, 1));
    add_node(&mut engine, 2, blocker.min, blocker.max, vec![]);

    let route = engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");

    assert_eq!(route.corners(), 4, "{:?}", route.points);
    let south = route.points.iter().all(|p| p.y >= 0);
    let north = route.points.iter().all(|p| p.y <= 0);
    assert!(south ^ north, "detour switches sides: {:?}", route.points);
    assert!(route.cells().iter().all(|cell| !blocker.contains(*cell)));
    assert!(engine.diagnose().is_clean());
}

#[test]
fn crossing_owners_are_not_bad_but_stacked_corners_are() {
    let mut grid = GridStore::new();
    grid.install(c(3, 3), CellEntry::run(LinkId::new(0), Dir::East))
        .expect("install");
    grid.install(c(3, 3), CellEntry::run(LinkId::new(1), Dir::South))
        .expect("install");
    assert!(analysis::find_bad_runs(&grid).is_empty());

    for _ in 0..3 {
        grid.install(
            c(8, 8),
            CellEntry::corner_set(LinkId::new(5), DirSet::EAST, DirSet::SOUTH),
        )
        .expect("install");
    }
    let bad = analysis::find_bad_runs(&grid);
    assert_eq!(bad.into_iter().collect::<Vec<_>>(), vec![Owner::Link(LinkId::new(5))]);
}

#[rstest]
fn occupied_arrival_cell_is_never_reused(mut engine: Engine) {
    add_node(&mut engine, 0, c(-4, -5), c(0, -1), vec![pad(c(0, -3), Dir::East)]);
    engine
        .add_node(
            NodeId::new(1),
            CellRect::new(c(10, -2), c(14, 2)),
            vec![c(10, -2), c(10, -1)],
            vec![pad(c(10, 0), Dir::West)],
        )
        .expect("node installs");

    let first = engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");
    assert_eq!(first.end_dir, Dir::East);
    assert!(first.cells().contains(&c(9, 0)));

    add_node(&mut engine, 7, c(9, 0), c(9, 0), vec![]);
    let rerouted = engine
        .reroute_link(LinkId::new(0))
        .expect("no error")
        .expect("rerouted");

    assert!(!rerouted.cells().contains(&c(9, 0)));
    assert_eq!(rerouted.points.last(), Some(&c(10, 0)));
    assert_eq!(rerouted.end_dir, Dir::South);
    assert!(engine.diagnose().node_overlaps.is_empty());
}

#[rstest]
fn links_from_one_pad_fan_out(mut engine: Engine) {
    add_node(&mut engine, 0, c(-4, -2), c(0, 2), vec![pad(c(0, 0), Dir::East)]);
    add_node(&mut engine, 1, c(10, -2), c(14, 2), vec![pad(c(10, 0), Dir::West)]);
    add_node(&mut engine, 2, c(10, 8), c(14, 12), vec![pad(c(10, 10), Dir::West)]);

    let trunk = engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");
    assert_eq!(trunk.points, vec![c(0, 0), c(10, 0)]);

    let branch = engine
        .place_link(link(1, 0, 2))
        .expect("no error")
        .expect("branch shares the trunk");
    assert_eq!(branch.points.first(), Some(&c(0, 0)));
    assert_eq!(branch.points.last(), Some(&c(10, 10)));
    assert_eq!(branch.start_dir, Dir::East);

    let diag = engine.diagnose();
    assert!(diag.is_clean(), "{:?}", diag);
    assert!(!engine.grid().has_tentative());
}

#[rstest]
fn links_into_one_pad_fan_in(mut engine: Engine) {
    add_node(&mut engine, 0, c(-4, -2), c(0, 2), vec![pad(c(0, 0), Dir::East)]);
    add_node(&mut engine, 1, c(10, -2), c(14, 2), vec![pad(c(10, 0), Dir::West)]);
    add_node(&mut engine, 2, c(-4, 8), c(0, 12), vec![pad(c(0, 10), Dir::East)]);

    engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");
    let second = engine
        .place_link(link(1, 2, 1))
        .expect("no error")
        .expect("second arrival shares the pad");
    assert_eq!(second.points.first(), Some(&c(0, 10)));
    assert_eq!(second.points.last(), Some(&c(10, 0)));
    assert_eq!(second.end_dir, Dir::East);

    let diag = engine.diagnose();
    assert!(diag.bad_runs.is_empty(), "{:?}", diag.bad_runs);
    assert!(diag.crossings.contains(&(LinkId::new(0), LinkId::new(1))));
    assert!(diag.crossings.contains(&(LinkId::new(1), LinkId::new(0))));
}

#[rstest]
fn route_never_doubles_back_through_its_source(mut engine: Engine) {
    let source = CellRect::new(c(-4, -2), c(0, 2));
    add_node(&mut engine, 0, source.min, source.max, vec![pad(c(0, 0), Dir::East)]);
    add_node(&mut engine, 1, c(-16, -2), c(-12, 2), vec![pad(c(-12, 0), Dir::East)]);

    let route = engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed around the source");

    assert_eq!(route.points.first(), Some(&c(0, 0)));
    assert_eq!(route.points.last(), Some(&c(-12, 0)));
    let inside: Vec<CellCoord> = route
        .cells()
        .into_iter()
        .skip(1)
        .filter(|cell| source.contains(*cell))
        .collect();
    assert!(inside.is_empty(), "{:?} cuts through the source", inside);
}

#[rstest]
fn moving_a_target_reroutes_its_incoming_link(mut engine: Engine) {
    add_node(&mut engine, 0, c(-4, -2), c(0, 2), vec![pad(c(0, 0), Dir::East)]);
    add_node(&mut engine, 1, c(10, -2), c(14, 2), vec![pad(c(10, 0), Dir::West)]);
    engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");

    engine.move_node(NodeId::new(1), 0, 3).expect("node exists");
    let results = engine.reroute_node(NodeId::new(1)).expect("no error");

    assert_eq!(results.len(), 1);
    let (id, route) = &results[0];
    assert_eq!(*id, LinkId::new(0));
    let route = route.as_ref().expect("rerouted");
    assert_eq!(route.points.first(), Some(&c(0, 0)));
    assert_eq!(route.points.last(), Some(&c(10, 3)));
    assert_eq!(engine.route(LinkId::new(0)), Some(route));
    assert!(engine.diagnose().is_clean());
}

fn facing_pair(engine: &mut Engine) {
    add_node(engine, 0, c(-4, -2), c(0, 2), vec![pad(c(0, 0), Dir::East)]);
    add_node(engine, 1, c(10, -2), c(14, 2), vec![pad(c(10, 0), Dir::West)]);
}

/// Rings node 1 so only one arrival cell stays free.
fn fence(engine: &mut Engine) {
    add_node(engine, 10, c(8, -4), c(8, 4), vec![]);
    add_node(engine, 11, c(16, -4), c(16, 4), vec![]);
    add_node(engine, 12, c(9, -4), c(15, -4), vec![]);
    add_node(engine, 13, c(9, 4), c(15, 4), vec![]);
}

#[rstest]
fn failed_reroute_leaves_the_link_erased(mut engine: Engine) {
    facing_pair(&mut engine);
    engine
        .place_link(link(0, 0, 1))
        .expect("no error")
        .expect("routed");
    fence(&mut engine);

    let outcome = engine.reroute_link(LinkId::new(0)).expect("no error");
    assert!(outcome.is_none());
    assert!(engine.route(LinkId::new(0)).is_none());
    assert!(!engine.grid().has_tentative());

    let mut erased = Engine::new(Config::default());
    facing_pair(&mut erased);
    fence(&mut erased);
    erased.add_link(link(0, 0, 1)).expect("pads exist");
    assert_eq!(engine.grid().snapshot(), erased.grid().snapshot());
}
