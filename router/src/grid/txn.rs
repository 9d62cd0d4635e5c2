use super::cell::CellEntry;
use super::store::GridStore;
use gridwire_common::geom::coord::CellCoord;
use std::ops::{Deref, DerefMut};

/// Scope guard over tentative grid mutations. Everything installed through
/// the guard (or through nested guards) is rolled back when it drops, unless
/// `keep` was called. Early returns and `?` therefore cannot leak state.
pub struct Staging<'g> {
    grid: &'g mut GridStore,
    mark: usize,
    keep: bool,
}

impl<'g> Staging<'g> {
    pub fn new(grid: &'g mut GridStore) -> Self {
        let mark = grid.mark();
        Self {
            grid,
            mark,
            keep: false,
        }
    }

    pub fn install(&mut self, coord: CellCoord, entry: CellEntry) {
        self.grid.install_temp(coord, entry);
    }

    /// Number of journaled mutations made under this guard.
    pub fn staged(&self) -> usize {
        self.grid.mark() - self.mark
    }

    /// Leaves this frame's mutations in place for the enclosing frame to
    /// commit or roll back.
    pub fn keep(mut self) {
        self.keep = true;
    }
}

impl Deref for Staging<'_> {
    type Target = GridStore;

    fn deref(&self) -> &GridStore {
        self.grid
    }
}

impl DerefMut for Staging<'_> {
    fn deref_mut(&mut self) -> &mut GridStore {
        self.grid
    }
}

impl Drop for Staging<'_> {
    fn drop(&mut self) {
        if !self.keep {
            self.grid.rollback_to(self.mark);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridwire_common::db::indices::LinkId;
    use gridwire_common::geom::dir::Dir;

    #[test]
    fn nested_guards_roll_back_in_layers() {
        let mut grid = GridStore::new();
        let before = grid.snapshot();
        {
            let mut outer = Staging::new(&mut grid);
            outer.install(CellCoord::new(0, 0), CellEntry::run(LinkId::new(0), Dir::East));
            {
                let mut inner = Staging::new(&mut outer);
                inner.install(CellCoord::new(1, 0), CellEntry::run(LinkId::new(0), Dir::East));
                assert_eq!(inner.staged(), 1);
            }
            assert!(outer.contents(CellCoord::new(1, 0)).is_none());
            assert!(outer.contents(CellCoord::new(0, 0)).is_some());
            {
                let mut inner = Staging::new(&mut outer);
                inner.install(CellCoord::new(0, 1), CellEntry::run(LinkId::new(0), Dir::South));
                inner.keep();
            }
            assert_eq!(outer.staged(), 2);
        }
        assert_eq!(grid.snapshot(), before);
    }
}
