//! D8 flow directions
//!
//! Flow direction encoding:
//! ```text
//!   4  3  2
//!   5  0  1
//!   6  7  8
//! ```
//! 0 = no outflow (outlet, sink or nodata), 1-8 = direction to the receiving
//! neighbor.

/// Code for "no downstream neighbor"
pub const NONE: u8 = 0;

/// Direction offsets: (row_offset, col_offset), indexed by code - 1
pub const OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (-1, 1),  // 2: NE
    (-1, 0),  // 3: N
    (-1, -1), // 4: NW
    (0, -1),  // 5: W
    (1, -1),  // 6: SW
    (1, 0),   // 7: S
    (1, 1),   // 8: SE
];

/// Distance multipliers, indexed by code - 1
pub const DISTANCES: [f64; 8] = [
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
];

/// Neighbor of (row, col) in direction `dir`, or None if it leaves the grid
/// or `dir` is not a valid code.
#[inline]
pub fn step(row: usize, col: usize, dir: u8, rows: usize, cols: usize) -> Option<(usize, usize)> {
    if dir == NONE || dir > 8 {
        return None;
    }
    let (dr, dc) = OFFSETS[(dir - 1) as usize];
    let nr = row as isize + dr;
    let nc = col as isize + dc;
    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
        return None;
    }
    Some((nr as usize, nc as usize))
}

/// In-grid neighbors of (row, col) as (code, row, col), in code order
pub fn neighbors(row: usize, col: usize, rows: usize, cols: usize) -> impl Iterator<Item = (u8, usize, usize)> {
    (1..=8u8).filter_map(move |dir| step(row, col, dir, rows, cols).map(|(r, c)| (dir, r, c)))
}

/// Code pointing from `from` to an adjacent cell `to`, if they are adjacent
pub fn code_between(from: (usize, usize), to: (usize, usize)) -> Option<u8> {
    let dr = to.0 as isize - from.0 as isize;
    let dc = to.1 as isize - from.1 as isize;
    OFFSETS
        .iter()
        .position(|&o| o == (dr, dc))
        .map(|i| (i + 1) as u8)
}
