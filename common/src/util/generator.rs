use crate::db::core::{DiagramDB, LinkData, NodeData, PadData};
use crate::geom::dir::Dir;
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::Write;

const NODE_SIZE: f64 = 40.0;
const PITCH: f64 = 140.0;
const PAD_SLOTS: [f64; 3] = [10.0, 20.0, 30.0];

/// Builds a random lattice of nodes joined by links. Every link gets its own
/// pad pair, so the number of links is capped by the free pads.
pub fn random_scenario(num_nodes: usize, num_links: usize, seed: u64) -> DiagramDB {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut db = DiagramDB::new();
    let cols = (num_nodes as f64).sqrt().ceil().max(1.0) as usize;

    for i in 0..num_nodes {
        let col = (i % cols) as f64;
        let row = (i / cols) as f64;
        // Jitter stays on the 10-unit lattice so pads quantize exactly.
        let jx = rng.gen_range(0..4) as f64 * 10.0;
        let jy = rng.gen_range(0..4) as f64 * 10.0;
        let min = Point::new(col * PITCH + jx, row * PITCH + jy);
        db.add_node(NodeData {
            name: format!("n{}", i),
            rect: Rect::new(min, Point::new(min.x + NODE_SIZE, min.y + NODE_SIZE)),
            pads: Vec::new(),
            inbound: Vec::new(),
        });
    }

    let mut out_used = vec![0usize; num_nodes];
    let mut in_used = vec![0usize; num_nodes];
    let mut attempts = 0;
    while db.num_links() < num_links && num_nodes > 1 && attempts < num_links * 20 {
        attempts += 1;
        let src = rng.gen_range(0..num_nodes);
        let dst = rng.gen_range(0..num_nodes);
        if src == dst || out_used[src] >= PAD_SLOTS.len() || in_used[dst] >= PAD_SLOTS.len() {
            continue;
        }
        let out_name = format!("o{}", out_used[src]);
        db.nodes[src].pads.push(PadData {
            name: out_name.clone(),
            offset: Point::new(NODE_SIZE, PAD_SLOTS[out_used[src]]),
            side: Dir::East,
        });
        out_used[src] += 1;

        let in_name = format!("i{}", in_used[dst]);
        db.nodes[dst].pads.push(PadData {
            name: in_name.clone(),
            offset: Point::new(0.0, PAD_SLOTS[in_used[dst]]),
            side: Dir::West,
        });
        in_used[dst] += 1;

        let link_idx = db.num_links();
        db.add_link(LinkData {
            name: format!("l{}", link_idx),
            source: format!("n{}.{}", src, out_name),
            target: format!("n{}.{}", dst, in_name),
            route: Vec::new(),
        });
    }

    log::info!(
        "Generated scenario: {} nodes, {} links (requested {})",
        db.num_nodes(),
        db.num_links(),
        num_links
    );
    db
}

pub fn generate_random_scenario(
    filename: &str,
    num_nodes: usize,
    num_links: usize,
    seed: u64,
) -> anyhow::Result<()> {
    let db = random_scenario(num_nodes, num_links, seed);
    let mut file = File::create(filename)?;
    file.write_all(db.to_toml_string()?.as_bytes())?;
    Ok(())
}
