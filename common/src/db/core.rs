use crate::db::indices::*;
use crate::geom::dir::Dir;
use crate::geom::point::Point;
use crate::geom::rect::Rect;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attachment point on a node's boundary; `side` is the direction a link
/// leaves (or, for a target, the reverse of the direction it arrives).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PadData {
    pub name: String,
    pub offset: Point<f64>,
    pub side: Dir,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeData {
    pub name: String,
    pub rect: Rect,
    #[serde(default)]
    pub pads: Vec<PadData>,
    /// Sub-rectangles links targeting this node may enter.
    #[serde(default)]
    pub inbound: Vec<Rect>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupData {
    pub name: String,
    pub rect: Rect,
    #[serde(default)]
    pub z: i32,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkData {
    pub name: String,
    /// `node.pad`
    pub source: String,
    /// `node.pad`
    pub target: String,
    #[serde(default)]
    pub route: Vec<Point<f64>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiagramDB {
    #[serde(default)]
    pub nodes: Vec<NodeData>,
    #[serde(default)]
    pub groups: Vec<GroupData>,
    #[serde(default)]
    pub links: Vec<LinkData>,

    #[serde(skip)]
    pub node_name_map: HashMap<String, NodeId>,
    #[serde(skip)]
    pub link_name_map: HashMap<String, LinkId>,
}

impl DiagramDB {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let mut db: DiagramDB = toml::from_str(text)?;
        db.rebuild_maps();
        db.validate()?;
        Ok(db)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn rebuild_maps(&mut self) {
        self.node_name_map = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), NodeId::new(i)))
            .collect();
        self.link_name_map = self
            .links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), LinkId::new(i)))
            .collect();
    }

    fn validate(&self) -> anyhow::Result<()> {
        for link in &self.links {
            for end in [&link.source, &link.target] {
                if self.resolve_pad(end).is_none() {
                    anyhow::bail!("link '{}' references unknown pad '{}'", link.name, end);
                }
            }
        }
        for group in &self.groups {
            for member in &group.members {
                if !self.node_name_map.contains_key(member) {
                    anyhow::bail!("group '{}' lists unknown node '{}'", group.name, member);
                }
            }
        }
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn add_node(&mut self, node: NodeData) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.node_name_map.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn add_link(&mut self, link: LinkData) -> LinkId {
        let id = LinkId::new(self.links.len());
        self.link_name_map.insert(link.name.clone(), id);
        self.links.push(link);
        id
    }

    /// Resolves `node.pad` to the node and pad index.
    pub fn resolve_pad(&self, pad_ref: &str) -> Option<(NodeId, usize)> {
        let (node, pad) = pad_ref.split_once('.')?;
        let id = *self.node_name_map.get(node)?;
        let pad_idx = self.nodes[id.index()]
            .pads
            .iter()
            .position(|p| p.name == pad)?;
        Some((id, pad_idx))
    }

    pub fn pad_position(&self, node: NodeId, pad: usize) -> Point<f64> {
        let n = &self.nodes[node.index()];
        let off = n.pads[pad].offset;
        Point::new(n.rect.min.x + off.x, n.rect.min.y + off.y)
    }

    pub fn move_node(&mut self, node: NodeId, dx: f64, dy: f64) {
        let n = &mut self.nodes[node.index()];
        n.rect.min.x += dx;
        n.rect.max.x += dx;
        n.rect.min.y += dy;
        n.rect.max.y += dy;
        for r in &mut n.inbound {
            r.min.x += dx;
            r.max.x += dx;
            r.min.y += dy;
            r.max.y += dy;
        }
    }

    pub fn groups_of(&self, node: NodeId) -> Vec<GroupId> {
        let name = &self.nodes[node.index()].name;
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.members.iter().any(|m| m == name))
            .map(|(i, _)| GroupId::new(i))
            .collect()
    }

    pub fn bounds(&self) -> Rect {
        let mut rects = self
            .nodes
            .iter()
            .map(|n| n.rect)
            .chain(self.groups.iter().map(|g| g.rect));
        let Some(first) = rects.next() else {
            return Rect::default();
        };
        let mut out = rects.fold(first, |acc, r| acc.union(&r));
        for p in self.links.iter().flat_map(|l| l.route.iter()) {
            out = out.union(&Rect::new(*p, *p));
        }
        out
    }
}
