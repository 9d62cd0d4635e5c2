use anyhow::Context;
use clap::{Parser, Subcommand};
use gridwire_common::db::core::DiagramDB;
use gridwire_common::db::indices::{GroupId, LinkId, NodeId};
use gridwire_common::util::config::Config;
use gridwire_common::util::{check, generator, logger, visualization};
use gridwire_router::{Diagnostics, Engine, LinkRequest, Pad, PadRef, Quantizer};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    /// Overrides `input.scenario_file`.
    #[arg(short, long, value_name = "FILE")]
    scenario: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route every link and write the drawn scenario.
    Route {
        #[arg(long, default_value = "output/routed.toml")]
        output: String,
    },
    /// Route, move one node by a world offset, then recover its attached links.
    Reroute {
        #[arg(long)]
        node: String,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        dx: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        dy: f64,
        #[arg(long, default_value = "output/rerouted.toml")]
        output: String,
    },
    /// Route and report malformed cells, node overlaps and crossings.
    Diagnose,
    Generate {
        #[arg(long, default_value_t = 40)]
        nodes: usize,
        #[arg(long, default_value_t = 60)]
        links: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value = "inputs/random.toml")]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .with_context(|| format!("Failed to read config file {:?}", args.config))?;
        Config::from_toml_str(&config_str).context("Failed to parse config TOML")?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };
    if let Some(path) = &args.scenario {
        config.input.scenario_file = path.to_string_lossy().into_owned();
    }

    let command = args.command.unwrap_or(Commands::Diagnose);

    match command {
        Commands::Generate {
            nodes,
            links,
            seed,
            output,
        } => {
            prepare_output_dir(&output)?;
            log::info!(
                "Generating random scenario (Nodes: {}, Links: {}, Seed: {})...",
                nodes,
                links,
                seed
            );
            generator::generate_random_scenario(&output, nodes, links, seed)?;
            log::info!("Generated: {}", output);
        }
        Commands::Route { output } => {
            let mut db = load_scenario(&config)?;
            let quantizer = Quantizer::new(config.search.cell_size);
            let mut engine = build_engine(&config, &db, &quantizer)?;
            engine.route_all()?;
            finish(&config, &mut db, &engine, &quantizer, &output)?;
        }
        Commands::Reroute {
            node,
            dx,
            dy,
            output,
        } => {
            let mut db = load_scenario(&config)?;
            let quantizer = Quantizer::new(config.search.cell_size);
            let mut engine = build_engine(&config, &db, &quantizer)?;
            engine.route_all()?;

            let id = *db
                .node_name_map
                .get(&node)
                .with_context(|| format!("Unknown node '{}'", node))?;
            let cx = (dx / config.search.cell_size).round() as i32;
            let cy = (dy / config.search.cell_size).round() as i32;
            let (wx, wy) = (
                cx as f64 * config.search.cell_size,
                cy as f64 * config.search.cell_size,
            );
            log::info!("Moving '{}' by ({:.1}, {:.1})", node, wx, wy);
            db.move_node(id, wx, wy);
            engine.move_node(id, cx, cy)?;

            let results = engine.reroute_node(id)?;
            let lost = results.iter().filter(|(_, r)| r.is_none()).count();
            log::info!(
                "Recovered {}/{} links attached to '{}'",
                results.len() - lost,
                results.len(),
                node
            );
            finish(&config, &mut db, &engine, &quantizer, &output)?;
        }
        Commands::Diagnose => {
            let db = load_scenario(&config)?;
            let quantizer = Quantizer::new(config.search.cell_size);
            let mut engine = build_engine(&config, &db, &quantizer)?;
            let failed = engine.route_all()?;
            report(&engine.diagnose());
            if failed > 0 {
                log::warn!("{} links left unrouted", failed);
            }
        }
    }

    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent()
        && !parent.exists()
        && !parent.as_os_str().is_empty()
    {
        log::info!("Creating output directory: {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn load_scenario(config: &Config) -> anyhow::Result<DiagramDB> {
    let path = &config.input.scenario_file;
    log::info!("Loading scenario: {}", path);
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Scenario file missing: '{}'", path))?;
    DiagramDB::from_toml_str(&text).with_context(|| format!("Invalid scenario in '{}'", path))
}

/// Quantizes the scenario and registers its nodes, groups and links.
fn build_engine(config: &Config, db: &DiagramDB, quantizer: &Quantizer) -> anyhow::Result<Engine> {
    let mut engine = Engine::new(config.clone());

    for (i, node) in db.nodes.iter().enumerate() {
        let id = NodeId::new(i);
        let footprint = quantizer.footprint(&node.rect);
        let inbound = node
            .inbound
            .iter()
            .flat_map(|r| quantizer.footprint(r).cells())
            .collect();
        let pads = (0..node.pads.len())
            .map(|p| Pad {
                cell: quantizer.to_cell(db.pad_position(id, p)),
                side: node.pads[p].side,
            })
            .collect();
        engine
            .add_node(id, footprint, inbound, pads)
            .with_context(|| format!("Failed to install node '{}'", node.name))?;
    }

    for (i, group) in db.groups.iter().enumerate() {
        let members = group
            .members
            .iter()
            .filter_map(|m| db.node_name_map.get(m).copied())
            .collect();
        engine.add_group(GroupId::new(i), quantizer.footprint(&group.rect), group.z, members);
    }

    for (i, link) in db.links.iter().enumerate() {
        let (Some(source), Some(target)) =
            (db.resolve_pad(&link.source), db.resolve_pad(&link.target))
        else {
            anyhow::bail!("Link '{}' has an unresolved pad", link.name);
        };
        let req = LinkRequest {
            link: LinkId::new(i),
            source: PadRef {
                node: source.0,
                pad: source.1,
            },
            target: PadRef {
                node: target.0,
                pad: target.1,
            },
        };
        engine
            .add_link(req)
            .with_context(|| format!("Failed to register link '{}'", link.name))?;
    }

    log::info!(
        "Engine ready: {} nodes, {} groups, {} links",
        db.num_nodes(),
        db.groups.len(),
        db.num_links()
    );
    Ok(engine)
}

/// Copies drawn routes back into world space, verifies and writes them.
fn finish(
    config: &Config,
    db: &mut DiagramDB,
    engine: &Engine,
    quantizer: &Quantizer,
    output: &str,
) -> anyhow::Result<()> {
    for (i, link) in db.links.iter_mut().enumerate() {
        link.route = engine
            .route(LinkId::new(i))
            .map(|r| quantizer.path_to_world(&r.points))
            .unwrap_or_default();
    }

    report(&engine.diagnose());
    if let Err(e) = check::run(db) {
        log::error!("Verification Failed: {}", e);
    }

    if let Some(png) = &config.input.output_png {
        prepare_output_dir(png)?;
        log::info!("Generating routed visualization...");
        visualization::draw_routed_diagram(db, png, 1600, 1200);
    }

    prepare_output_dir(output)?;
    log::info!("Writing routed scenario to {}", output);
    std::fs::write(output, db.to_toml_string()?)
        .with_context(|| format!("Failed to write '{}'", output))?;
    Ok(())
}

fn report(diag: &Diagnostics) {
    if diag.is_clean() {
        log::info!("\x1b[32mPASS\x1b[0m: grid is well formed");
    }
    for owner in &diag.bad_runs {
        log::warn!("Malformed cells owned by {:?}", owner);
    }
    for v in &diag.bad_module_cells {
        log::warn!("{:?} enters {:?} at {:?}", v.owner, v.group, v.at);
    }
    for (at, a, b) in &diag.node_overlaps {
        log::warn!("{:?} and {:?} overlap at {:?}", a, b, at);
    }
    log::info!("{} crossing pairs", diag.crossings.len() / 2);
}
