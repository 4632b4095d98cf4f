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
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use super::effect::{Effect, EffectId};
use super::piece::{Color, Piece, PieceId};
use super::position::{Position, MAX_FILES, MAX_RANKS};

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Board size {0}x{1} out of range (width 1..=26, height 1..=99)")]
    InvalidSize(usize, usize),
    #[error("Square {0} is off the board")]
    OutOfBounds(Position),
    #[error("Zone {0:?} references square off the board")]
    ZoneOutOfBounds(String),
    #[error("Malformed FEN: {0}")]
    BadFen(String),
    #[error("FEN serialization requires a standard 8x8 board")]
    NotStandardSize,
    #[error("No piece with that id")]
    UnknownPieceId,
}

use BoardError::*;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
struct SquareCell {
    piece: Option<PieceId>,
    effects: Vec<EffectId>,
}

/// The playing surface: a `width` x `height` grid of squares, a slab of
/// pieces and a slab of effects, both indexed by opaque id. The square
/// cells hold ids only, so cloning a board for hypothetical-move analysis
/// copies flat maps rather than a reference graph.
///
/// Exactly one piece occupies a square; placing onto an occupied square
/// replaces (and returns) the previous occupant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Board {
    width: usize,
    height: usize,
    squares: Vec<SquareCell>,
    pieces: BTreeMap<PieceId, Piece>,
    effects: BTreeMap<EffectId, Effect>,
    effect_squares: BTreeMap<EffectId, Position>,
    zones: BTreeMap<String, BTreeSet<Position>>,
}

impl Board {
    pub fn new(width: usize, height: usize) -> Result<Self, BoardError> {
        if width < 1 || width > MAX_FILES || height < 1 || height > MAX_RANKS {
            return Err(InvalidSize(width, height));
        }
        Ok(Self {
            width,
            height,
            squares: vec![SquareCell::default(); width * height],
            pieces: BTreeMap::new(),
            effects: BTreeMap::new(),
            effect_squares: BTreeMap::new(),
            zones: BTreeMap::new(),
        })
    }

    pub fn standard() -> Self {
        Self::new(8, 8).expect("8x8 is always valid")
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.file() < self.width && pos.rank() < self.height
    }

    #[inline]
    fn index(&self, pos: Position) -> usize {
        debug_assert!(self.contains(pos));
        pos.rank() * self.width + pos.file()
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.height)
            .flat_map(move |rank| (0..self.width).map(move |file| Position::new(file, rank)))
    }

    pub fn empty_squares(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions().filter(|pos| self.is_empty(*pos))
    }

    // ---- pieces ----

    #[inline]
    pub fn is_empty(&self, pos: Position) -> bool {
        self.piece_id_at(pos).is_none()
    }

    pub fn piece_id_at(&self, pos: Position) -> Option<PieceId> {
        if !self.contains(pos) {
            return None;
        }
        self.squares[self.index(pos)].piece
    }

    pub fn piece_at(&self, pos: Position) -> Option<&Piece> {
        self.piece_id_at(pos).and_then(|id| self.pieces.get(&id))
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(&id)
    }

    pub fn piece_mut(&mut self, id: PieceId) -> Option<&mut Piece> {
        self.pieces.get_mut(&id)
    }

    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    pub fn pieces_of(&self, owner: Color) -> impl Iterator<Item = &Piece> {
        self.pieces.values().filter(move |p| p.owner() == owner)
    }

    pub fn royal_pieces(&self, owner: Color) -> impl Iterator<Item = &Piece> {
        self.pieces_of(owner).filter(|p| p.is_royal())
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Place a piece on its square. Returns the replaced occupant, if any.
    pub fn place(&mut self, piece: Piece) -> Result<Option<Piece>, BoardError> {
        let pos = piece.pos();
        if !self.contains(pos) {
            return Err(OutOfBounds(pos));
        }
        let index = self.index(pos);
        let replaced = self.squares[index]
            .piece
            .take()
            .and_then(|id| self.pieces.remove(&id));
        self.squares[index].piece = Some(piece.id());
        self.pieces.insert(piece.id(), piece);
        debug_assert!(self.is_consistent());
        Ok(replaced)
    }

    pub fn remove_at(&mut self, pos: Position) -> Option<Piece> {
        let id = self.piece_id_at(pos)?;
        self.remove(id)
    }

    pub fn remove(&mut self, id: PieceId) -> Option<Piece> {
        let piece = self.pieces.remove(&id)?;
        let index = self.index(piece.pos());
        debug_assert_eq!(self.squares[index].piece, Some(id));
        self.squares[index].piece = None;
        debug_assert!(self.is_consistent());
        Some(piece)
    }

    /// Relocate a piece. Returns the occupant displaced from `to`, if any.
    /// Does not touch the piece's `moved` state; that is turn bookkeeping.
    pub fn relocate(&mut self, id: PieceId, to: Position) -> Result<Option<Piece>, BoardError> {
        if !self.contains(to) {
            return Err(OutOfBounds(to));
        }
        let from = self.pieces.get(&id).map(|p| p.pos()).ok_or(UnknownPieceId)?;
        let to_idx_pre = self.index(to);
        let displaced = self.squares[to_idx_pre]
            .piece
            .take()
            .and_then(|victim| self.pieces.remove(&victim));
        let from_index = self.index(from);
        self.squares[from_index].piece = None;
        let to_index = self.index(to);
        self.squares[to_index].piece = Some(id);
        if let Some(piece) = self.pieces.get_mut(&id) {
            piece.set_pos(to);
        }
        debug_assert!(self.is_consistent());
        Ok(displaced)
    }

    // ---- effects ----

    pub fn add_effect(&mut self, pos: Position, effect: Effect) -> Result<EffectId, BoardError> {
        if !self.contains(pos) {
            return Err(OutOfBounds(pos));
        }
        let id = effect.id();
        let index = self.index(pos);
        self.squares[index].effects.push(id);
        self.effects.insert(id, effect);
        self.effect_squares.insert(id, pos);
        Ok(id)
    }

    pub fn remove_effect(&mut self, id: EffectId) -> Option<Effect> {
        let effect = self.effects.remove(&id)?;
        if let Some(pos) = self.effect_squares.remove(&id) {
            let index = self.index(pos);
            self.squares[index].effects.retain(|e| *e != id);
        }
        Some(effect)
    }

    pub fn effects_at(&self, pos: Position) -> Vec<&Effect> {
        if !self.contains(pos) {
            return Vec::new();
        }
        self.squares[self.index(pos)]
            .effects
            .iter()
            .filter_map(|id| self.effects.get(id))
            .collect()
    }

    pub fn effects(&self) -> impl Iterator<Item = (&Effect, Position)> {
        self.effects.iter().filter_map(|(id, effect)| {
            self.effect_squares.get(id).map(|pos| (effect, *pos))
        })
    }

    pub fn effect_mut(&mut self, id: EffectId) -> Option<&mut Effect> {
        self.effects.get_mut(&id)
    }

    pub fn effect_ids(&self) -> Vec<EffectId> {
        self.effects.keys().copied().collect()
    }

    /// Whether a mover is kept off `pos` by any effect there.
    pub fn is_blocked_for(&self, pos: Position, mover: Color) -> bool {
        self.effects_at(pos)
            .iter()
            .any(|effect| effect.blocks_mover(mover))
    }

    // ---- zones ----

    pub fn add_zone<I>(&mut self, name: impl Into<String>, squares: I) -> Result<(), BoardError>
    where
        I: IntoIterator<Item = Position>,
    {
        let name = name.into();
        let squares: BTreeSet<Position> = squares.into_iter().collect();
        if squares.iter().any(|pos| !self.contains(*pos)) {
            return Err(ZoneOutOfBounds(name));
        }
        self.zones.insert(name, squares);
        Ok(())
    }

    pub fn zone(&self, name: &str) -> Option<&BTreeSet<Position>> {
        self.zones.get(name)
    }

    pub fn in_zone(&self, name: &str, pos: Position) -> bool {
        self.zones.get(name).map_or(false, |z| z.contains(&pos))
    }

    pub fn zones(&self) -> impl Iterator<Item = (&String, &BTreeSet<Position>)> {
        self.zones.iter()
    }

    // ---- serialization ----

    /// Parse the board part of a FEN string into `(symbol, square)` pairs.
    /// Standard 8x8 layout: ranks top-down, `/`-separated, digits skip
    /// empty squares.
    pub fn parse_fen(fen: &str) -> Result<Vec<(char, Position)>, BoardError> {
        let board_part = fen.split_whitespace().next().unwrap_or("");
        let ranks: Vec<&str> = board_part.split('/').collect();
        if ranks.len() != 8 {
            return Err(BadFen(format!("expected 8 ranks, got {}", ranks.len())));
        }
        let mut placements = Vec::new();
        for (i, row) in ranks.iter().enumerate() {
            let rank = 7 - i;
            let mut file = 0usize;
            for c in row.chars() {
                if let Some(skip) = c.to_digit(10) {
                    if skip == 0 {
                        return Err(BadFen("rank contains the digit 0".to_string()));
                    }
                    file += skip as usize;
                } else if c.is_ascii_alphabetic() {
                    if file >= 8 {
                        return Err(BadFen(format!("rank {} overflows", rank + 1)));
                    }
                    placements.push((c, Position::new(file, rank)));
                    file += 1;
                } else {
                    return Err(BadFen(format!("unexpected character {c:?}")));
                }
            }
            if file != 8 {
                return Err(BadFen(format!("rank {} has width {file}", rank + 1)));
            }
        }
        Ok(placements)
    }

    /// Serialize an 8x8 board back to FEN. `symbol` maps a piece to its
    /// uncolored letter; White is uppercased.
    pub fn to_fen<F>(&self, symbol: F) -> Result<String, BoardError>
    where
        F: Fn(&Piece) -> Option<char>,
    {
        if self.width != 8 || self.height != 8 {
            return Err(NotStandardSize);
        }
        let mut out = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(Position::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        let c = symbol(piece)
                            .ok_or_else(|| BadFen(format!("no symbol for {}", piece.kind())))?;
                        out.push(match piece.owner() {
                            Color::White => c.to_ascii_uppercase(),
                            Color::Black => c.to_ascii_lowercase(),
                        });
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
            }
            if rank > 0 {
                out.push('/');
            }
        }
        Ok(out)
    }

    /// ASCII diagram for debugging, ranks top-down, `.` for empty squares.
    pub fn to_diagram<F>(&self, symbol: F) -> String
    where
        F: Fn(&Piece) -> char,
    {
        let mut out = String::new();
        for rank in (0..self.height).rev() {
            for file in 0..self.width {
                match self.piece_at(Position::new(file, rank)) {
                    Some(piece) => out.push(symbol(piece)),
                    None => out.push('.'),
                }
            }
            out.push('\n');
        }
        out
    }

    /// The board's piece index must be exactly the set of occupied squares.
    fn is_consistent(&self) -> bool {
        let indexed: BTreeSet<PieceId> = self.pieces.keys().copied().collect();
        let on_squares: BTreeSet<PieceId> =
            self.squares.iter().filter_map(|cell| cell.piece).collect();
        if indexed != on_squares {
            return false;
        }
        self.pieces.iter().all(|(id, piece)| {
            self.contains(piece.pos()) && self.squares[self.index(piece.pos())].piece == Some(*id)
        })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.to_diagram(|p| {
                let c = p.kind().chars().next().unwrap_or('?');
                match p.owner() {
                    Color::White => c.to_ascii_uppercase(),
                    Color::Black => c.to_ascii_lowercase(),
                }
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(id: u64, kind: &str, owner: Color, pos: &str) -> Piece {
        Piece::new(PieceId::new(id), kind, owner, Position::from_string(pos))
    }

    #[test]
    fn test_size_limits() {
        assert!(Board::new(1, 1).is_ok());
        assert!(Board::new(26, 99).is_ok());
        assert!(Board::new(0, 8).is_err());
        assert!(Board::new(27, 8).is_err());
        assert!(Board::new(8, 100).is_err());
    }

    #[test]
    fn test_place_and_lookup() {
        let mut board = Board::standard();
        board
            .place(piece(1, "King", Color::White, "e1"))
            .unwrap();
        let found = board.piece_at(Position::from_string("e1")).unwrap();
        assert_eq!(found.kind(), "King");
        assert_eq!(board.piece_count(), 1);
    }

    #[test]
    fn test_place_replaces_occupant() {
        let mut board = Board::standard();
        board
            .place(piece(1, "Pawn", Color::White, "d4"))
            .unwrap();
        let replaced = board
            .place(piece(2, "Queen", Color::Black, "d4"))
            .unwrap();
        assert_eq!(replaced.unwrap().kind(), "Pawn");
        assert_eq!(board.piece_count(), 1);
        assert_eq!(
            board.piece_at(Position::from_string("d4")).unwrap().kind(),
            "Queen"
        );
    }

    #[test]
    fn test_relocate_captures_occupant() {
        let mut board = Board::standard();
        board
            .place(piece(1, "Rook", Color::White, "a1"))
            .unwrap();
        board
            .place(piece(2, "Knight", Color::Black, "a8"))
            .unwrap();
        let displaced = board.relocate(PieceId::new(1), Position::from_string("a8")).unwrap();
        assert_eq!(displaced.unwrap().kind(), "Knight");
        assert!(board.is_empty(Position::from_string("a1")));
        assert_eq!(
            board.piece(PieceId::new(1)).unwrap().pos(),
            Position::from_string("a8")
        );
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut board = Board::new(4, 4).unwrap();
        let result = board.place(piece(1, "King", Color::White, "e1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_minimum_board() {
        let mut board = Board::new(1, 1).unwrap();
        board
            .place(piece(1, "King", Color::White, "a1"))
            .unwrap();
        assert_eq!(board.positions().count(), 1);
        assert_eq!(board.empty_squares().count(), 0);
    }

    #[test]
    fn test_zones() {
        let mut board = Board::standard();
        board
            .add_zone(
                "hill",
                ["d4", "d5", "e4", "e5"].map(Position::from_string),
            )
            .unwrap();
        assert!(board.in_zone("hill", Position::from_string("d4")));
        assert!(!board.in_zone("hill", Position::from_string("a1")));
        assert!(!board.in_zone("summit", Position::from_string("d4")));
    }

    #[test]
    fn test_zone_out_of_bounds() {
        let mut board = Board::new(4, 4).unwrap();
        let result = board.add_zone("far", [Position::from_string("h8")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_effects() {
        use crate::board::effect::Blocks;
        let mut board = Board::standard();
        let d4 = Position::from_string("d4");
        let effect = Effect::new(EffectId::new(1), "barrier", Blocks::Enemy)
            .with_owner(Color::White);
        board.add_effect(d4, effect).unwrap();
        assert_eq!(board.effects_at(d4).len(), 1);
        assert!(board.is_blocked_for(d4, Color::Black));
        assert!(!board.is_blocked_for(d4, Color::White));
        board.remove_effect(EffectId::new(1));
        assert!(board.effects_at(d4).is_empty());
    }

    // ---- FEN ----

    const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

    #[test]
    fn test_parse_fen_startpos() {
        let placements = Board::parse_fen(STARTPOS).unwrap();
        assert_eq!(placements.len(), 32);
        assert!(placements.contains(&('K', Position::from_string("e1"))));
        assert!(placements.contains(&('r', Position::from_string("a8"))));
        assert!(placements.contains(&('P', Position::from_string("e2"))));
    }

    #[test]
    fn test_parse_fen_rejects_bad_input() {
        assert!(Board::parse_fen("8/8/8").is_err());
        assert!(Board::parse_fen("9/8/8/8/8/8/8/8").is_err());
        assert!(Board::parse_fen("rnbqkbnr/pppppppp/8/8/8/8/8/RNBQKBNRR").is_err());
    }

    #[test]
    fn test_fen_round_trip() {
        let mut board = Board::standard();
        let mut next_id = 0u64;
        for (c, pos) in Board::parse_fen(STARTPOS).unwrap() {
            next_id += 1;
            let owner = if c.is_ascii_uppercase() {
                Color::White
            } else {
                Color::Black
            };
            let kind = match c.to_ascii_uppercase() {
                'K' => "King",
                'Q' => "Queen",
                'R' => "Rook",
                'B' => "Bishop",
                'N' => "Knight",
                _ => "Pawn",
            };
            board
                .place(Piece::new(PieceId::new(next_id), kind, owner, pos))
                .unwrap();
        }
        let fen = board
            .to_fen(|p| {
                Some(match p.kind() {
                    "Knight" => 'n',
                    other => other.chars().next().unwrap(),
                })
            })
            .unwrap();
        assert_eq!(fen, STARTPOS);
    }
}
