pub mod coord;
pub mod dir;
pub mod point;
pub mod rect;
pub mod rtree;
