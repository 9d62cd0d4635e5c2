use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dir {
    North,
    East,
    South,
    West,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub fn other(self) -> Axis {
        match self {
            Axis::Horizontal => Axis::Vertical,
            Axis::Vertical => Axis::Horizontal,
        }
    }
}

impl Dir {
    pub const ALL: [Dir; 4] = [Dir::North, Dir::East, Dir::South, Dir::West];

    #[inline(always)]
    pub fn delta(self) -> (i32, i32) {
        match self {
            Dir::North => (0, -1),
            Dir::East => (1, 0),
            Dir::South => (0, 1),
            Dir::West => (-1, 0),
        }
    }

    pub fn axis(self) -> Axis {
        match self {
            Dir::East | Dir::West => Axis::Horizontal,
            Dir::North | Dir::South => Axis::Vertical,
        }
    }

    pub fn opposite(self) -> Dir {
        match self {
            Dir::North => Dir::South,
            Dir::East => Dir::West,
            Dir::South => Dir::North,
            Dir::West => Dir::East,
        }
    }

    /// The two directions perpendicular to `self`, clockwise first.
    pub fn perpendiculars(self) -> [Dir; 2] {
        match self {
            Dir::North => [Dir::East, Dir::West],
            Dir::East => [Dir::South, Dir::North],
            Dir::South => [Dir::West, Dir::East],
            Dir::West => [Dir::North, Dir::South],
        }
    }

    /// Sign of travel along the axis: +1 for East/South, -1 for West/North.
    pub fn sign(self) -> i32 {
        match self {
            Dir::East | Dir::South => 1,
            Dir::West | Dir::North => -1,
        }
    }

    /// Direction of a non-zero delta lying on one axis.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Dir> {
        match (dx.signum(), dy.signum()) {
            (1, 0) => Some(Dir::East),
            (-1, 0) => Some(Dir::West),
            (0, 1) => Some(Dir::South),
            (0, -1) => Some(Dir::North),
            _ => None,
        }
    }

    pub fn from_axis(axis: Axis, sign: i32) -> Dir {
        match (axis, sign >= 0) {
            (Axis::Horizontal, true) => Dir::East,
            (Axis::Horizontal, false) => Dir::West,
            (Axis::Vertical, true) => Dir::South,
            (Axis::Vertical, false) => Dir::North,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn perpendiculars_share_no_axis() {
        for d in Dir::ALL {
            for p in d.perpendiculars() {
                assert_ne!(p.axis(), d.axis());
            }
            assert_eq!(d.opposite().opposite(), d);
        }
    }

    #[rstest]
    #[case(5, 0, Some(Dir::East))]
    #[case(0, -2, Some(Dir::North))]
    #[case(1, 1, None)]
    #[case(0, 0, None)]
    fn from_delta_only_accepts_axis_aligned(
        #[case] dx: i32,
        #[case] dy: i32,
        #[case] expected: Option<Dir>,
    ) {
        assert_eq!(Dir::from_delta(dx, dy), expected);
    }
}
