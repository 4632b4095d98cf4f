// Copyright 2026 Tobin Edwards
//
//    Licensed under the Apache License, Version 2.0 (the "License");
//    you may not use this file except in compliance with the License.
//    You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
//    Unless required by applicable law or agreed to in writing, software
//    distributed under the License is distributed on an "AS IS" BASIS,
//    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//    See the License for the specific language governing permissions and
//    limitations under the License.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;
use strum_macros::EnumIter;

use super::piece::Color;

use Color::*;

/// Maximum board width (files `a` through `z`).
pub const MAX_FILES: usize = 26;
/// Maximum board height (ranks `1` through `99`).
pub const MAX_RANKS: usize = 99;

/// A square coordinate on a board of arbitrary size.
///
/// Files run left-to-right from White's perspective, ranks bottom-to-top
/// from White's side. Both are 0-indexed; `(0, 0)` is `a1`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    file: usize,
    rank: usize,
}

impl Position {
    #[inline]
    pub const fn new(file: usize, rank: usize) -> Self {
        Self { file, rank }
    }

    #[inline]
    pub const fn file(&self) -> usize {
        self.file
    }
    #[inline]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn from_string(name: &str) -> Self {
        Self::try_from_string(name).expect("Position::from_string: invalid format")
    }

    /// Parse algebraic notation: a file letter followed by a 1- or 2-digit
    /// rank, e.g. `e4` or `b12`. Rank `0` is rejected.
    pub fn try_from_string(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let f = chars.next()?;
        if !f.is_ascii_lowercase() {
            return None;
        }
        let file = (f as usize) - ('a' as usize);
        let digits: String = chars.collect();
        if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let rank: usize = digits.parse().ok()?;
        if rank < 1 || rank > MAX_RANKS {
            return None;
        }
        Some(Self::new(file, rank - 1))
    }

    pub fn to_algebraic(&self) -> String {
        format!(
            "{}{}",
            (b'a' + self.file as u8) as char,
            self.rank + 1 // output 1-indexed
        )
    }

    /// Mirror vertically on a board of the given height.
    #[inline]
    pub const fn flip_vertical(&self, height: usize) -> Self {
        Self::new(self.file, height - 1 - self.rank)
    }

    /// Mirror horizontally on a board of the given width.
    #[inline]
    pub const fn flip_horizontal(&self, width: usize) -> Self {
        Self::new(width - 1 - self.file, self.rank)
    }

    /// Chebyshev distance: the number of king moves between two squares.
    #[inline]
    pub fn distance(&self, other: &Self) -> usize {
        self.file
            .abs_diff(other.file)
            .max(self.rank.abs_diff(other.rank))
    }

    #[inline]
    pub fn manhattan_distance(&self, other: &Self) -> usize {
        self.file.abs_diff(other.file) + self.rank.abs_diff(other.rank)
    }

    #[inline]
    pub fn is_adjacent(&self, other: &Self) -> bool {
        self != other && self.distance(other) <= 1
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_algebraic())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from_string(s.trim()).ok_or_else(|| format!("invalid square: {s:?}"))
    }
}

/// A displacement between squares. `x` is along files, `y` along ranks;
/// positive `y` points toward Black (away from White's side).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset {
    pub x: isize,
    pub y: isize,
}

impl Offset {
    #[inline]
    pub const fn new(x: isize, y: isize) -> Self {
        Self { x, y }
    }

    /// Reduce to a unit step along a rank, file or diagonal. Returns `None`
    /// for offsets that are not straight lines.
    pub fn to_unit(self) -> Option<Self> {
        let (x, y) = match (self.x, self.y) {
            (0, 0) => return None,
            (x, y) if x == 0 || y == 0 || x.abs() == y.abs() => (x.signum(), y.signum()),
            _ => return None,
        };
        Some(Self { x, y })
    }

    /// The 8-fold symmetric family of a leap offset: sign swaps of
    /// `(x, y)` and `(y, x)`, deduplicated (e.g. `(1, 1)` yields 4).
    pub fn symmetries(self) -> Vec<Self> {
        let (dx, dy) = (self.x.abs(), self.y.abs());
        let mut out = Vec::with_capacity(8);
        for (x, y) in [(dx, dy), (dy, dx)] {
            for sx in [1isize, -1] {
                for sy in [1isize, -1] {
                    let candidate = Self::new(x * sx, y * sy);
                    if !out.contains(&candidate) {
                        out.push(candidate);
                    }
                }
            }
        }
        out
    }
}

impl Add<Offset> for Position {
    type Output = Option<Position>;
    fn add(self, rhs: Offset) -> Self::Output {
        let file = self.file.checked_add_signed(rhs.x)?;
        let rank = self.rank.checked_add_signed(rhs.y)?;
        if file >= MAX_FILES || rank >= MAX_RANKS {
            return None;
        }
        Some(Position::new(file, rank))
    }
}

impl Sub for Position {
    type Output = Offset;
    fn sub(self, rhs: Self) -> Self::Output {
        Offset::new(
            self.file as isize - rhs.file as isize,
            self.rank as isize - rhs.rank as isize,
        )
    }
}

/// A movement direction in a pattern. The first eight are absolute; the
/// rest are families (`Orthogonal`, `Diagonal`, `Any`) or owner-relative
/// (`Forward`, `Backward`, `Left`, `Right`), resolved against the moving
/// piece's owner at evaluation time.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Dir {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
    Orthogonal,
    Diagonal,
    Any,
    Forward,
    Backward,
    Left,
    Right,
}

use Dir::*;

impl Dir {
    #[inline]
    pub fn is_relative(&self) -> bool {
        matches!(*self, Forward | Backward | Left | Right)
    }

    /// Resolve to concrete unit offsets for a piece owned by `owner`.
    /// White's forward is north; Black's is south. Left and right follow
    /// the owner's point of view.
    pub fn units(&self, owner: Color) -> Vec<Offset> {
        let fwd: isize = match owner {
            White => 1,
            Black => -1,
        };
        match *self {
            North => vec![Offset::new(0, 1)],
            South => vec![Offset::new(0, -1)],
            East => vec![Offset::new(1, 0)],
            West => vec![Offset::new(-1, 0)],
            NorthEast => vec![Offset::new(1, 1)],
            NorthWest => vec![Offset::new(-1, 1)],
            SouthEast => vec![Offset::new(1, -1)],
            SouthWest => vec![Offset::new(-1, -1)],
            Orthogonal => vec![
                Offset::new(0, 1),
                Offset::new(0, -1),
                Offset::new(1, 0),
                Offset::new(-1, 0),
            ],
            Diagonal => vec![
                Offset::new(1, 1),
                Offset::new(-1, 1),
                Offset::new(1, -1),
                Offset::new(-1, -1),
            ],
            Any => {
                let mut all = Self::Orthogonal.units(owner);
                all.extend(Self::Diagonal.units(owner));
                all
            }
            Forward => vec![Offset::new(0, fwd)],
            Backward => vec![Offset::new(0, -fwd)],
            Left => vec![Offset::new(-fwd, 0)],
            Right => vec![Offset::new(fwd, 0)],
        }
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            North => "north",
            South => "south",
            East => "east",
            West => "west",
            NorthEast => "northeast",
            NorthWest => "northwest",
            SouthEast => "southeast",
            SouthWest => "southwest",
            Orthogonal => "orthogonal",
            Diagonal => "diagonal",
            Any => "any",
            Forward => "forward",
            Backward => "backward",
            Left => "left",
            Right => "right",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Dir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dir = match s {
            "north" | "n" => North,
            "south" | "s" => South,
            "east" | "e" => East,
            "west" | "w" => West,
            "northeast" | "ne" => NorthEast,
            "northwest" | "nw" => NorthWest,
            "southeast" | "se" => SouthEast,
            "southwest" | "sw" => SouthWest,
            "orthogonal" => Orthogonal,
            "diagonal" => Diagonal,
            "any" => Any,
            "forward" => Forward,
            "backward" => Backward,
            "left" => Left,
            "right" => Right,
            _ => return Err(format!("unknown direction: {s:?}")),
        };
        Ok(dir)
    }
}
