//! The routing context: owns the grid, the node and group registries, the
//! drawn routes and the recovery records, and sequences placement, reroute
//! and repair on top of the search, recovery and cleanup passes.

use crate::algo::cleanup::Cleanup;
use crate::algo::jump::{JumpRequest, JumpSearch};
use crate::algo::recovery::{Recovery, RecoveryRecord};
use crate::algo::{GaussianTable, Route, route_entries};
use crate::analysis::{self, ModuleViolation};
use crate::error::{Result, RouteError};
use crate::grid::{CellEntry, DirSet, GridStore, GroupRegion, LinkCtx, Owner};
use crate::terminal::{
    TerminalRegion, arrival_region, departure_region, emergency_arrival_region,
};
use gridwire_common::db::indices::{GroupId, LinkId, NodeId};
use gridwire_common::geom::coord::CellCoord;
use gridwire_common::geom::dir::{Axis, Dir};
use gridwire_common::geom::rect::CellRect;
use gridwire_common::util::config::Config;
use gridwire_common::util::profiler::ScopedTimer;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};

/// A pad in cell space. `side` is the direction a departing link leaves in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pad {
    pub cell: CellCoord,
    pub side: Dir,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadRef {
    pub node: NodeId,
    pub pad: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkRequest {
    pub link: LinkId,
    pub source: PadRef,
    pub target: PadRef,
}

#[derive(Clone, Debug)]
struct NodeEntry {
    footprint: CellRect,
    inbound: Vec<CellCoord>,
    pads: Vec<Pad>,
}

#[derive(Clone, Debug)]
struct LinkState {
    req: LinkRequest,
    route: Option<Route>,
    record: Option<RecoveryRecord>,
}

/// Polled between rows/columns of long scans; returning `false` cancels.
pub trait ProgressPoll {
    fn poll(&mut self, done: usize, total: usize) -> bool;
}

impl<F: FnMut(usize, usize) -> bool> ProgressPoll for F {
    fn poll(&mut self, done: usize, total: usize) -> bool {
        self(done, total)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub bad_runs: BTreeSet<Owner>,
    pub bad_module_cells: Vec<ModuleViolation>,
    pub node_overlaps: Vec<(CellCoord, NodeId, NodeId)>,
    pub crossings: Vec<(LinkId, LinkId)>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.bad_runs.is_empty() && self.bad_module_cells.is_empty() && self.node_overlaps.is_empty()
    }
}

pub struct Engine {
    config: Config,
    gauss: GaussianTable,
    grid: GridStore,
    nodes: FxHashMap<NodeId, NodeEntry>,
    links: BTreeMap<LinkId, LinkState>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let gauss = GaussianTable::new(
            config.search.offset_sigma,
            config.search.gaussian_table_size,
        );
        Self {
            config,
            gauss,
            grid: GridStore::new(),
            nodes: FxHashMap::default(),
            links: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &GridStore {
        &self.grid
    }

    // ---- nodes and groups ----

    pub fn add_node(
        &mut self,
        id: NodeId,
        footprint: CellRect,
        inbound: Vec<CellCoord>,
        pads: Vec<Pad>,
    ) -> Result<()> {
        if let Some(old) = self.nodes.remove(&id) {
            self.uninstall_node(id, &old);
        }
        let entry = NodeEntry {
            footprint,
            inbound,
            pads,
        };
        self.install_node(id, &entry)?;
        self.nodes.insert(id, entry);
        Ok(())
    }

    fn install_node(&mut self, id: NodeId, node: &NodeEntry) -> Result<()> {
        for c in node.footprint.cells() {
            self.grid.install(c, CellEntry::node(id))?;
        }
        for c in &node.inbound {
            self.grid.install(*c, CellEntry::inbound_ok(id))?;
        }
        Ok(())
    }

    fn uninstall_node(&mut self, id: NodeId, node: &NodeEntry) {
        let cells = node.footprint.cells().chain(node.inbound.iter().copied());
        for c in cells {
            self.grid.remove_entries(c, Owner::Node(id), None);
        }
    }

    /// Removes a node and every link attached to it. Returns the removed
    /// links.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<LinkId>> {
        let node = self.nodes.remove(&id).ok_or(RouteError::UnknownNode(id))?;
        self.uninstall_node(id, &node);
        let attached: Vec<LinkId> = self
            .links
            .values()
            .filter(|s| s.req.source.node == id || s.req.target.node == id)
            .map(|s| s.req.link)
            .collect();
        for link in &attached {
            self.remove_link(*link)?;
        }
        log::debug!("removed {} with {} attached links", id, attached.len());
        Ok(attached)
    }

    /// Shifts a node's footprint, inbound cells and pads. Attached links
    /// keep their old drawing until rerouted.
    pub fn move_node(&mut self, id: NodeId, dx: i32, dy: i32) -> Result<()> {
        let node = self.nodes.remove(&id).ok_or(RouteError::UnknownNode(id))?;
        self.uninstall_node(id, &node);
        let moved = NodeEntry {
            footprint: node.footprint.translate(dx, dy),
            inbound: node.inbound.iter().map(|c| c.offset(dx, dy)).collect(),
            pads: node
                .pads
                .iter()
                .map(|p| Pad {
                    cell: p.cell.offset(dx, dy),
                    side: p.side,
                })
                .collect(),
        };
        self.install_node(id, &moved)?;
        self.nodes.insert(id, moved);
        Ok(())
    }

    pub fn add_group(&mut self, id: GroupId, rect: CellRect, z: i32, members: Vec<NodeId>) {
        self.grid.add_group(GroupRegion {
            id,
            rect,
            z,
            members,
        });
    }

    pub fn remove_group(&mut self, id: GroupId) -> Option<GroupRegion> {
        self.grid.remove_group(id)
    }

    // ---- links ----

    pub fn route(&self, id: LinkId) -> Option<&Route> {
        self.links.get(&id).and_then(|s| s.route.as_ref())
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.links.values().filter_map(|s| s.route.as_ref())
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        self.links.keys().copied().collect()
    }

    /// Registers a link without routing it.
    pub fn add_link(&mut self, req: LinkRequest) -> Result<()> {
        self.endpoints(&req)?;
        if self.links.contains_key(&req.link) {
            self.erase(req.link);
        }
        self.links.insert(
            req.link,
            LinkState {
                req,
                route: None,
                record: None,
            },
        );
        Ok(())
    }

    /// Registers and routes a link from scratch. `Ok(None)` leaves the link
    /// registered but unrouted, with the grid exactly as before.
    pub fn place_link(&mut self, req: LinkRequest) -> Result<Option<Route>> {
        self.add_link(req)?;
        self.place(req.link)
    }

    pub fn remove_link(&mut self, id: LinkId) -> Result<()> {
        self.erase(id);
        self.links
            .remove(&id)
            .map(|_| ())
            .ok_or(RouteError::UnknownLink(id))
    }

    /// Routes every registered link that has no drawing yet, in id order.
    /// Returns the number of links left unrouted.
    pub fn route_all(&mut self) -> Result<usize> {
        let pending: Vec<LinkId> = self
            .links
            .values()
            .filter(|s| s.route.is_none())
            .map(|s| s.req.link)
            .collect();
        let _timer = ScopedTimer::new("route_all").with_items(pending.len());
        log::info!("Routing {} links...", pending.len());
        let mut failed = 0;
        for id in pending {
            if self.place(id)?.is_none() {
                log::warn!("{} could not be routed", id);
                failed += 1;
            }
        }
        log::info!("Routing done: {} unrouted", failed);
        Ok(failed)
    }

    /// Redraws one link, reusing its previous geometry where possible.
    pub fn reroute_link(&mut self, id: LinkId) -> Result<Option<Route>> {
        if !self.links.contains_key(&id) {
            return Err(RouteError::UnknownLink(id));
        }
        self.erase(id);
        self.reroute_erased(id, &[])
    }

    /// Redraws every link leaving `node`. While one link is recovered, the
    /// old geometry of the others still waiting is masked into the grid.
    pub fn reroute_source(&mut self, node: NodeId) -> Result<Vec<(LinkId, Option<Route>)>> {
        if !self.nodes.contains_key(&node) {
            return Err(RouteError::UnknownNode(node));
        }
        let mut timer = ScopedTimer::new("reroute_source");
        let ids: Vec<LinkId> = self
            .links
            .values()
            .filter(|s| s.req.source.node == node)
            .map(|s| s.req.link)
            .collect();
        timer.set_items(ids.len());
        for id in &ids {
            self.erase(*id);
        }
        let mut out = Vec::with_capacity(ids.len());
        for (k, id) in ids.iter().enumerate() {
            let masks: Vec<Route> = ids[k + 1..]
                .iter()
                .filter_map(|other| {
                    let record = self.links.get(other)?.record.as_ref()?;
                    Some(Route {
                        link: *other,
                        points: record.points(),
                        start_dir: record.start_dir,
                        end_dir: record.end_dir,
                    })
                })
                .collect();
            let route = self.reroute_erased(*id, &masks)?;
            out.push((*id, route));
        }
        Ok(out)
    }

    /// Redraws every link attached to `node`: the outgoing links through
    /// `reroute_source`, then each incoming link in id order. Used after
    /// `move_node`.
    pub fn reroute_node(&mut self, node: NodeId) -> Result<Vec<(LinkId, Option<Route>)>> {
        let mut out = self.reroute_source(node)?;
        let incoming: Vec<LinkId> = self
            .links
            .values()
            .filter(|s| s.req.target.node == node && s.req.source.node != node)
            .map(|s| s.req.link)
            .collect();
        for id in incoming {
            let route = self.reroute_link(id)?;
            out.push((id, route));
        }
        Ok(out)
    }

    /// Re-places the links among `owners` from scratch, typically the output
    /// of `find_bad_runs`. Returns the links that were redrawn.
    pub fn repair(&mut self, owners: &BTreeSet<Owner>) -> Result<Vec<LinkId>> {
        let mut fixed = Vec::new();
        for id in owners.iter().filter_map(|o| o.link()) {
            let Some(state) = self.links.get_mut(&id) else {
                log::warn!("repair: {} is not registered", id);
                continue;
            };
            state.record = None;
            self.erase(id);
            if self.place(id)?.is_some() {
                fixed.push(id);
            }
        }
        log::info!("repaired {}/{} links", fixed.len(), owners.len());
        Ok(fixed)
    }

    // ---- diagnostics and compaction ----

    pub fn diagnose(&self) -> Diagnostics {
        let _timer = ScopedTimer::new("diagnose").at(log::Level::Debug);
        Diagnostics {
            bad_runs: analysis::find_bad_runs(&self.grid),
            bad_module_cells: analysis::find_bad_module_cells(&self.grid, |l, g| {
                self.links
                    .get(&l)
                    .is_some_and(|s| self.ctx(&s.req).allowed_groups.contains(&g))
            }),
            node_overlaps: analysis::get_node_overlaps(&self.grid),
            crossings: analysis::get_all_crossings(&self.grid),
        }
    }

    /// Rows (y) inside the occupied extent that hold nothing. `None` when
    /// cancelled through `poll`.
    pub fn find_empty_rows(&self, poll: &mut dyn ProgressPoll) -> Option<Vec<i32>> {
        self.find_empty_lines(Axis::Vertical, poll)
    }

    /// Columns (x) inside the occupied extent that hold nothing.
    pub fn find_empty_columns(&self, poll: &mut dyn ProgressPoll) -> Option<Vec<i32>> {
        self.find_empty_lines(Axis::Horizontal, poll)
    }

    fn find_empty_lines(&self, axis: Axis, poll: &mut dyn ProgressPoll) -> Option<Vec<i32>> {
        let Some(extent) = self.grid.extent() else {
            return Some(Vec::new());
        };
        let mut used: FxHashSet<i32> = self.grid.iter().map(|(c, _)| c.along(axis)).collect();
        for g in self.grid.groups() {
            used.insert(g.rect.min.along(axis));
            used.insert(g.rect.max.along(axis));
        }
        let (lo, hi) = (extent.min.along(axis), extent.max.along(axis));
        let total = (hi - lo + 1) as usize;
        let mut out = Vec::new();
        for (done, v) in (lo..=hi).enumerate() {
            if !poll.poll(done, total) {
                log::debug!("empty line scan cancelled at {}/{}", done, total);
                return None;
            }
            if !used.contains(&v) {
                out.push(v);
            }
        }
        Some(out)
    }

    /// Whether space can be inserted between rows `y` and `y + 1` without
    /// splitting a node.
    pub fn row_expandable(&self, y: i32) -> bool {
        self.nodes
            .values()
            .all(|n| !(n.footprint.min.y <= y && y < n.footprint.max.y))
    }

    /// Whether space can be inserted between columns `x` and `x + 1`.
    pub fn column_expandable(&self, x: i32) -> bool {
        self.nodes
            .values()
            .all(|n| !(n.footprint.min.x <= x && x < n.footprint.max.x))
    }

    // ---- internals ----

    fn pad(&self, r: PadRef) -> Result<Pad> {
        let node = self.nodes.get(&r.node).ok_or(RouteError::UnknownNode(r.node))?;
        node.pads.get(r.pad).copied().ok_or(RouteError::UnknownPad {
            node: r.node,
            pad: r.pad,
        })
    }

    /// Start pad and departure heading, end pad and arrival heading.
    fn endpoints(&self, req: &LinkRequest) -> Result<((CellCoord, Dir), (CellCoord, Dir))> {
        let src = self.pad(req.source)?;
        let dst = self.pad(req.target)?;
        Ok(((src.cell, src.side), (dst.cell, dst.side.opposite())))
    }

    /// A link may enter the groups its endpoints belong to.
    fn ctx(&self, req: &LinkRequest) -> LinkCtx {
        let (source, target) = (req.source.node, req.target.node);
        let mut allowed: Vec<GroupId> = self
            .grid
            .groups()
            .filter(|g| g.members.contains(&source) || g.members.contains(&target))
            .map(|g| g.id)
            .collect();
        allowed.sort();
        let siblings = self
            .links
            .values()
            .filter(|s| s.req.link != req.link)
            .filter(|s| s.req.source == req.source || s.req.target == req.target)
            .map(|s| s.req.link)
            .collect();
        let ctx = LinkCtx::new(req.link, source, target)
            .with_groups(allowed)
            .with_siblings(siblings);
        match self.pad(req.source) {
            Ok(pad) => ctx.with_departure(pad.cell, pad.side),
            Err(_) => ctx,
        }
    }

    fn bounds(&self, start: CellCoord, end: CellCoord, margin: i32) -> CellRect {
        let mut r = self
            .grid
            .extent()
            .unwrap_or_else(|| CellRect::new(start, start));
        r.include(start);
        r.include(end);
        r.expand(margin)
    }

    fn erase(&mut self, id: LinkId) {
        let Some(route) = self.links.get_mut(&id).and_then(|s| s.route.take()) else {
            return;
        };
        for c in route.cells() {
            self.grid.remove_entries(c, Owner::Link(id), None);
        }
    }

    fn draw(&mut self, route: &Route) -> Result<()> {
        if self.grid.has_tentative() {
            return Err(RouteError::InvariantViolation(format!(
                "drawing {:?} over staged state",
                route.link
            )));
        }
        for (c, e) in route_entries(route.link, &route.points) {
            self.grid.install(c, e)?;
        }
        Ok(())
    }

    fn finish(&mut self, route: &Route) {
        let max_shift = self.config.recovery.max_dof_shift;
        if let Some(state) = self.links.get_mut(&route.link) {
            state.route = Some(route.clone());
            state.record = Some(RecoveryRecord::from_route(route, max_shift));
        }
    }

    fn reroute_erased(&mut self, id: LinkId, masks: &[Route]) -> Result<Option<Route>> {
        let Some(state) = self.links.get(&id) else {
            return Err(RouteError::UnknownLink(id));
        };
        let req = state.req;
        if let Some(mut record) = state.record.clone() {
            let ctx = self.ctx(&req);
            let ((start, start_dir), (end, end_dir)) = self.endpoints(&req)?;
            let arrival = arrival_region(
                &self.grid,
                &ctx,
                end_dir,
                end,
                self.config.terminal.max_arrival_slots,
            );
            if record.start_dir == start_dir && record.end_dir == end_dir && arrival.is_usable() {
                let bounds = self.bounds(start, end, self.config.search.margin);
                let mut recovery = Recovery::new(
                    &self.config.recovery,
                    &self.config.search,
                    &self.gauss,
                    &ctx,
                    bounds,
                );
                match recovery.recover(&mut self.grid, &mut record, start, end, masks) {
                    Ok(Some(points)) => {
                        let route = Route {
                            link: id,
                            points,
                            start_dir,
                            end_dir,
                        };
                        self.grid.install(
                            start,
                            CellEntry::pad(id, DirSet::empty(), DirSet::of(start_dir)),
                        )?;
                        self.grid
                            .install(end, CellEntry::pad(id, DirSet::of(end_dir), DirSet::empty()))?;
                        self.draw(&route)?;
                        self.finish(&route);
                        log::debug!("{} recovered with {} corners", id, route.corners());
                        return Ok(Some(route));
                    }
                    Ok(None) => log::debug!("{}: recovery failed, placing afresh", id),
                    Err(e) if e.is_recoverable() => log::debug!("{}: {}", id, e),
                    Err(e) => {
                        log::error!("{}: recovery aborted: {}", id, e);
                        return Err(e);
                    }
                }
            } else {
                log::debug!("{}: recorded geometry unusable, placing afresh", id);
            }
        }
        self.place(id)
    }

    /// Fresh placement: ordinary search, then a forced search with relaxed
    /// limits, then an emergency arrival.
    fn place(&mut self, id: LinkId) -> Result<Option<Route>> {
        let req = self
            .links
            .get(&id)
            .map(|s| s.req)
            .ok_or(RouteError::UnknownLink(id))?;
        let ctx = self.ctx(&req);
        let ((start, start_dir), (end, end_dir)) = self.endpoints(&req)?;
        let terminal = &self.config.terminal;
        let departure =
            departure_region(&self.grid, &ctx, start_dir, start, terminal.max_departure_slots);
        if !departure.is_usable() {
            log::debug!("{}: departure from {:?} is blocked", id, start);
            return Ok(None);
        }
        let arrival = arrival_region(&self.grid, &ctx, end_dir, end, terminal.max_arrival_slots);

        if arrival.is_usable() {
            for forced in [false, true] {
                if let Some(route) =
                    self.search_between(&ctx, departure.clone(), arrival.clone(), forced)?
                {
                    return Ok(Some(route));
                }
            }
        }
        match emergency_arrival_region(&self.grid, &ctx, end, end_dir) {
            Some(emergency) if !arrival.is_usable() || emergency.dir != end_dir => {
                self.search_between(&ctx, departure, emergency, true)
            }
            _ => {
                log::debug!("{}: no arrival into {:?}", id, end);
                Ok(None)
            }
        }
    }

    fn search_between(
        &mut self,
        ctx: &LinkCtx,
        mut departure: TerminalRegion,
        mut arrival: TerminalRegion,
        forced: bool,
    ) -> Result<Option<Route>> {
        departure.reserve(&mut self.grid)?;
        if let Err(e) = arrival.reserve(&mut self.grid) {
            departure.drop_reservation(&mut self.grid);
            return Err(e);
        }

        let cfg = &self.config.search;
        let margin = if forced {
            cfg.margin * cfg.force_multiplier.max(1) as i32
        } else {
            cfg.margin
        };
        let bounds = self.bounds(departure.start, arrival.start, margin);
        let req = JumpRequest {
            start: departure.start,
            start_dir: departure.dir,
            end: arrival.start,
            end_dir: arrival.dir,
        };
        let mut search = JumpSearch::new(&self.config.search, &self.gauss, ctx, bounds, req);
        if forced {
            search = search.forced(self.config.search.force_multiplier);
        }
        let outcome = match search.run(&mut self.grid) {
            Ok(Some(points)) => {
                let cleanup =
                    Cleanup::new(&self.config.cleanup, ctx, departure.dir, arrival.dir);
                Ok(Some(cleanup.run(&self.grid, &points)))
            }
            Err(RouteError::NonConvergence { steps }) => {
                log::debug!(
                    "{:?}: search gave up after {} steps{}",
                    ctx.link,
                    steps,
                    if forced { " (forced)" } else { "" }
                );
                Ok(None)
            }
            other => other,
        };

        match outcome {
            Ok(Some(points)) => {
                let route = Route {
                    link: ctx.link,
                    points,
                    start_dir: departure.dir,
                    end_dir: arrival.dir,
                };
                departure.convert(&mut self.grid)?;
                arrival.convert(&mut self.grid)?;
                self.draw(&route)?;
                self.finish(&route);
                log::debug!(
                    "{:?} placed: {} corners, length {}",
                    ctx.link,
                    route.corners(),
                    route.len()
                );
                Ok(Some(route))
            }
            other => {
                departure.drop_reservation(&mut self.grid);
                arrival.drop_reservation(&mut self.grid);
                other.map(|_| None)
            }
        }
    }
}
