use super::coord::CellCoord;
use super::rect::CellRect;
use rstar::{AABB, RTree};

/// R-tree over cell rectangles. Point membership is answered on demand so
/// moving or resizing a region never touches per-cell state.
pub struct SpatialIndex {
    tree: RTree<IndexedRect>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
struct IndexedRect {
    rect: CellRect,
    id: usize,
}

impl rstar::RTreeObject for IndexedRect {
    type Envelope = AABB<[i32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.rect.min.x, self.rect.min.y],
            [self.rect.max.x, self.rect.max.y],
        )
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn insert(&mut self, rect: CellRect, id: usize) {
        self.tree.insert(IndexedRect { rect, id });
    }

    pub fn remove(&mut self, rect: CellRect, id: usize) -> bool {
        self.tree.remove(&IndexedRect { rect, id }).is_some()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn query(&self, rect: CellRect) -> Vec<usize> {
        let aabb = AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y]);
        self.tree
            .locate_in_envelope_intersecting(&aabb)
            .map(|item| item.id)
            .collect()
    }

    pub fn query_point(&self, c: CellCoord) -> Vec<usize> {
        let aabb = AABB::from_point([c.x, c.y]);
        let mut ids: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&aabb)
            .map(|item| item.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
