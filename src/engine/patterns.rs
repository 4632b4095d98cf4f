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

//! The pattern interpreter: evaluates a movement or capture pattern for a
//! piece on a board and yields candidate destination squares.
//!
//! Geometry and occupancy are handled here; a final mode filter keeps
//! empty destinations for moves and enemy-occupied destinations for
//! captures, which is also what makes the interpreter double as the
//! attack scanner for check detection.

use std::collections::BTreeSet;

use super::eval::{eval_condition, EvalCtx};
use super::state::GameState;
use crate::board::{traits, Board, Color, Offset, Piece, Position};
use crate::lang::PatternExpr;
use crate::model::{CaptureRule, Game};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Move,
    Capture,
}

/// Candidate destinations for one pattern.
pub fn pattern_targets(
    game: &Game,
    board: &Board,
    state: &GameState,
    piece: &Piece,
    pattern: &PatternExpr,
    mode: Mode,
) -> BTreeSet<Position> {
    targets(game, board, state, piece, pattern, mode, false)
}

/// Destinations the piece can move to (empty squares only).
pub fn move_targets(
    game: &Game,
    board: &Board,
    state: &GameState,
    piece: &Piece,
) -> BTreeSet<Position> {
    let Some(def) = game.piece_def(piece.kind()) else {
        return BTreeSet::new();
    };
    targets(game, board, state, piece, &def.move_pattern, Mode::Move, false)
}

/// Destinations the piece can capture on (enemy-occupied squares only).
pub fn capture_targets(
    game: &Game,
    board: &Board,
    state: &GameState,
    piece: &Piece,
    attack_scan: bool,
) -> BTreeSet<Position> {
    let Some(def) = game.piece_def(piece.kind()) else {
        return BTreeSet::new();
    };
    match &def.capture {
        CaptureRule::None => BTreeSet::new(),
        CaptureRule::Same => targets(
            game,
            board,
            state,
            piece,
            &def.move_pattern,
            Mode::Capture,
            attack_scan,
        ),
        CaptureRule::Pattern(pattern) => {
            targets(game, board, state, piece, pattern, Mode::Capture, attack_scan)
        }
    }
}

fn targets(
    game: &Game,
    board: &Board,
    state: &GameState,
    piece: &Piece,
    pattern: &PatternExpr,
    mode: Mode,
    attack_scan: bool,
) -> BTreeSet<Position> {
    let mut out = geometric(game, board, state, piece, pattern, attack_scan);
    out.retain(|pos| match mode {
        Mode::Move => board.is_empty(*pos),
        Mode::Capture => board
            .piece_at(*pos)
            .map_or(false, |occupant| occupant.owner() != piece.owner()),
    });
    if !piece.has_trait(traits::PHASE) {
        out.retain(|pos| !board.is_blocked_for(*pos, piece.owner()));
    }
    out
}

/// Squares a pattern geometrically reaches, before the mode filter.
/// Occupied squares terminate rays (and are included, so the mode filter
/// can decide); the `jump` trait rides straight through them.
fn geometric(
    game: &Game,
    board: &Board,
    state: &GameState,
    piece: &Piece,
    pattern: &PatternExpr,
    attack_scan: bool,
) -> BTreeSet<Position> {
    let owner = piece.owner();
    let jump = piece.has_trait(traits::JUMP);
    let mut out = BTreeSet::new();
    match pattern {
        PatternExpr::Step { dir, dist } => {
            for unit in dir.units(owner) {
                let mut cursor = piece.pos();
                for _ in 0..*dist {
                    match cursor + unit {
                        Some(next) if board.contains(next) => {
                            out.insert(next);
                            cursor = next;
                        }
                        _ => break,
                    }
                }
            }
        }
        PatternExpr::Slide { dir } => {
            for unit in dir.units(owner) {
                walk_ray(board, piece.pos(), unit, jump, &mut out);
            }
        }
        PatternExpr::Leap { dx, dy } => {
            for offset in Offset::new(*dx as isize, *dy as isize).symmetries() {
                if let Some(next) = piece.pos() + offset {
                    if board.contains(next) {
                        out.insert(next);
                    }
                }
            }
        }
        PatternExpr::Rider { dx, dy } => {
            for offset in Offset::new(*dx as isize, *dy as isize).symmetries() {
                walk_ray(board, piece.pos(), offset, jump, &mut out);
            }
        }
        PatternExpr::Hop { dir } => {
            for unit in dir.units(owner) {
                hop_ray(board, piece.pos(), unit, &mut out);
            }
        }
        PatternExpr::Where(inner, condition) => {
            let candidates = geometric(game, board, state, piece, inner, attack_scan);
            let mut ctx = EvalCtx::new(game, board, state)
                .with_piece(piece)
                .with_check_subject(owner);
            if attack_scan {
                ctx = ctx.scanning();
            }
            for pos in candidates {
                if eval_condition(&ctx.with_target(pos), condition) {
                    out.insert(pos);
                }
            }
        }
        PatternExpr::Or(patterns) => {
            for p in patterns {
                out.extend(geometric(game, board, state, piece, p, attack_scan));
            }
        }
        PatternExpr::And(patterns) => {
            let mut sets = patterns
                .iter()
                .map(|p| geometric(game, board, state, piece, p, attack_scan));
            if let Some(first) = sets.next() {
                out = sets.fold(first, |acc, set| {
                    acc.intersection(&set).copied().collect()
                });
            }
        }
        PatternExpr::Named(name) => {
            debug_assert!(false, "unresolved pattern reference {name}");
        }
    }
    out
}

/// Walk outward along a ray. Every square up to and including the first
/// occupied one is a candidate; `jump` continues through occupants.
fn walk_ray(
    board: &Board,
    from: Position,
    step: Offset,
    jump: bool,
    out: &mut BTreeSet<Position>,
) {
    let mut cursor = from;
    loop {
        cursor = match cursor + step {
            Some(next) if board.contains(next) => next,
            _ => return,
        };
        out.insert(cursor);
        if !board.is_empty(cursor) && !jump {
            return;
        }
    }
}

/// Cannon-style hop: advance to the first occupied square (the screen),
/// then the first occupied square beyond it is the only candidate.
fn hop_ray(board: &Board, from: Position, step: Offset, out: &mut BTreeSet<Position>) {
    let mut cursor = from;
    let mut screened = false;
    loop {
        cursor = match cursor + step {
            Some(next) if board.contains(next) => next,
            _ => return,
        };
        if board.is_empty(cursor) {
            continue;
        }
        if screened {
            out.insert(cursor);
            return;
        }
        screened = true;
    }
}

/// Whether any piece of `by` attacks `pos` with its capture pattern.
/// Pre-check-filter by design: a pinned attacker still gives check.
pub fn is_attacked(
    game: &Game,
    board: &Board,
    state: &GameState,
    pos: Position,
    by: Color,
) -> bool {
    board
        .pieces_of(by)
        .any(|piece| capture_targets(game, board, state, piece, true).contains(&pos))
}

/// A side is in check when any of its royal pieces stands attacked.
pub fn is_in_check(game: &Game, board: &Board, state: &GameState, color: Color) -> bool {
    board
        .royal_pieces(color)
        .any(|royal| is_attacked(game, board, state, royal.pos(), !color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PieceId;
    use crate::lang::ConditionExpr;
    use crate::model::standard_chess;

    fn board_with(pieces: &[(u64, &str, Color, &str)]) -> Board {
        let mut board = Board::standard();
        for (id, kind, owner, pos) in pieces {
            board
                .place(Piece::new(
                    PieceId::new(*id),
                    *kind,
                    *owner,
                    Position::from_string(pos),
                ))
                .unwrap();
        }
        board
    }

    fn positions(set: &BTreeSet<Position>) -> Vec<String> {
        set.iter().map(|p| p.to_algebraic()).collect()
    }

    #[test]
    fn test_knight_leaps() {
        let game = standard_chess();
        let board = board_with(&[(1, "Knight", Color::White, "d4")]);
        let state = GameState::initial();
        let knight = board.piece(PieceId::new(1)).unwrap();
        let targets = move_targets(game, &board, &state, knight);
        assert_eq!(targets.len(), 8);
        assert!(targets.contains(&Position::from_string("e6")));
        assert!(targets.contains(&Position::from_string("c2")));
    }

    #[test]
    fn test_knight_corner() {
        let game = standard_chess();
        let board = board_with(&[(1, "Knight", Color::White, "a1")]);
        let state = GameState::initial();
        let knight = board.piece(PieceId::new(1)).unwrap();
        let targets = move_targets(game, &board, &state, knight);
        assert_eq!(positions(&targets), vec!["b3", "c2"]);
    }

    #[test]
    fn test_rook_slide_stops_at_blockers() {
        let game = standard_chess();
        let board = board_with(&[
            (1, "Rook", Color::White, "a1"),
            (2, "Pawn", Color::White, "a4"),
            (3, "Pawn", Color::Black, "d1"),
        ]);
        let state = GameState::initial();
        let rook = board.piece(PieceId::new(1)).unwrap();

        let moves = move_targets(game, &board, &state, rook);
        // up to a3 (friend on a4 blocks), right to c1 (enemy on d1 blocks)
        assert!(moves.contains(&Position::from_string("a3")));
        assert!(!moves.contains(&Position::from_string("a4")));
        assert!(moves.contains(&Position::from_string("c1")));
        assert!(!moves.contains(&Position::from_string("d1")));

        let captures = capture_targets(game, &board, &state, rook, false);
        assert_eq!(positions(&captures), vec!["d1"]);
    }

    #[test]
    fn test_jump_trait_slides_through() {
        let mut game = standard_chess().clone();
        if let Some(rook) = game.pieces.get_mut("Rook") {
            rook.traits.push(traits::JUMP.to_string());
        }
        let board = board_with(&[
            (1, "Rook", Color::White, "a1"),
            (2, "Pawn", Color::White, "a3"),
            (3, "Pawn", Color::Black, "a6"),
        ]);
        let state = GameState::initial();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(&game, &board, &state, rook);
        assert!(moves.contains(&Position::from_string("a5")));
        assert!(moves.contains(&Position::from_string("a8")));
        let captures = capture_targets(&game, &board, &state, rook, false);
        assert!(captures.contains(&Position::from_string("a6")));
    }

    #[test]
    fn test_hop_needs_screen() {
        let game = standard_chess();
        let state = GameState::initial();
        let pattern = PatternExpr::Hop { dir: crate::board::Dir::Orthogonal };

        // no screen: no targets
        let board = board_with(&[
            (1, "Cannon", Color::White, "a1"),
            (2, "Pawn", Color::Black, "a8"),
        ]);
        let cannon = Piece::new(
            PieceId::new(9),
            "Cannon",
            Color::White,
            Position::from_string("a1"),
        );
        let raw = pattern_targets(game, &board, &state, &cannon, &pattern, Mode::Capture);
        // a8 is the first occupied square, so it is the screen, not a target
        assert!(raw.is_empty());

        // screen on a4, victim on a8
        let board = board_with(&[
            (1, "Pawn", Color::White, "a4"),
            (2, "Pawn", Color::Black, "a8"),
        ]);
        let hits = pattern_targets(game, &board, &state, &cannon, &pattern, Mode::Capture);
        assert_eq!(positions(&hits), vec!["a8"]);
        // the screen square itself is never a move target
        let moves = pattern_targets(game, &board, &state, &cannon, &pattern, Mode::Move);
        assert!(moves.is_empty());
    }

    #[test]
    fn test_rider_repeats_leap() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = board_with(&[(1, "Pawn", Color::Black, "c6")]);
        let rider = Piece::new(
            PieceId::new(9),
            "Nightrider",
            Color::White,
            Position::from_string("a2"),
        );
        let pattern = PatternExpr::Rider { dx: 1, dy: 2 };
        let raw = pattern_targets(game, &board, &state, &rider, &pattern, Mode::Move);
        // a2 -> b4 -> c6 (occupied) -> stop; c6 excluded in move mode
        assert!(raw.contains(&Position::from_string("b4")));
        assert!(!raw.contains(&Position::from_string("c6")));
        assert!(!raw.contains(&Position::from_string("d8")));
        let captures = pattern_targets(game, &board, &state, &rider, &pattern, Mode::Capture);
        assert!(captures.contains(&Position::from_string("c6")));
    }

    #[test]
    fn test_pawn_double_needs_clear_path() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = board_with(&[
            (1, "Pawn", Color::White, "e2"),
            (2, "Knight", Color::Black, "e3"),
        ]);
        let pawn = board.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(game, &board, &state, pawn);
        assert!(moves.is_empty());

        let open = board_with(&[(1, "Pawn", Color::White, "e2")]);
        let pawn = open.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(game, &open, &state, pawn);
        assert_eq!(positions(&moves), vec!["e3", "e4"]);
    }

    #[test]
    fn test_pawn_double_only_on_first_move() {
        let game = standard_chess();
        let state = GameState::initial();
        let mut board = board_with(&[(1, "Pawn", Color::White, "e3")]);
        board.piece_mut(PieceId::new(1)).unwrap().mark_moved();
        let pawn = board.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(game, &board, &state, pawn);
        assert_eq!(positions(&moves), vec!["e4"]);
    }

    #[test]
    fn test_pawn_captures_diagonally_forward() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = board_with(&[
            (1, "Pawn", Color::White, "e4"),
            (2, "Pawn", Color::Black, "d5"),
            (3, "Pawn", Color::Black, "e5"),
            (4, "Pawn", Color::Black, "d3"),
        ]);
        let pawn = board.piece(PieceId::new(1)).unwrap();
        let captures = capture_targets(game, &board, &state, pawn, false);
        // d5 yes; e5 is straight ahead, d3 is backward
        assert_eq!(positions(&captures), vec!["d5"]);
    }

    #[test]
    fn test_black_pawn_moves_south() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = board_with(&[(1, "Pawn", Color::Black, "e7")]);
        let pawn = board.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(game, &board, &state, pawn);
        assert_eq!(positions(&moves), vec!["e5", "e6"]);
    }

    #[test]
    fn test_composite_intersection() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = Board::standard();
        let piece = Piece::new(
            PieceId::new(1),
            "X",
            Color::White,
            Position::from_string("d4"),
        );
        let pattern = PatternExpr::And(vec![
            PatternExpr::Step {
                dir: crate::board::Dir::Orthogonal,
                dist: 2,
            },
            PatternExpr::Step {
                dir: crate::board::Dir::North,
                dist: 3,
            },
        ]);
        let out = pattern_targets(game, &board, &state, &piece, &pattern, Mode::Move);
        assert_eq!(positions(&out), vec!["d5", "d6"]);
    }

    #[test]
    fn test_conditional_pattern_in_zone() {
        let game = standard_chess();
        let state = GameState::initial();
        let mut board = Board::standard();
        board
            .add_zone("hill", [Position::from_string("d5")])
            .unwrap();
        let piece = Piece::new(
            PieceId::new(1),
            "X",
            Color::White,
            Position::from_string("d4"),
        );
        let pattern = PatternExpr::Where(
            Box::new(PatternExpr::Step {
                dir: crate::board::Dir::Any,
                dist: 1,
            }),
            ConditionExpr::InZone("hill".to_string()),
        );
        let out = pattern_targets(game, &board, &state, &piece, &pattern, Mode::Move);
        assert_eq!(positions(&out), vec!["d5"]);
    }

    #[test]
    fn test_blocking_effects_filter_destinations() {
        use crate::board::{Blocks, Effect, EffectId};
        let game = standard_chess();
        let state = GameState::initial();
        let mut board = board_with(&[(1, "Rook", Color::Black, "a8")]);
        board
            .add_effect(
                Position::from_string("a5"),
                Effect::new(EffectId::new(1), "barrier", Blocks::Enemy)
                    .with_owner(Color::White),
            )
            .unwrap();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(game, &board, &state, rook);
        // the barrier keeps the enemy rook off a5 but not past it
        assert!(!moves.contains(&Position::from_string("a5")));
        assert!(moves.contains(&Position::from_string("a4")));
    }

    #[test]
    fn test_phase_ignores_blocking_effects() {
        use crate::board::{Blocks, Effect, EffectId};
        let mut game = standard_chess().clone();
        if let Some(rook) = game.pieces.get_mut("Rook") {
            rook.traits.push(traits::PHASE.to_string());
        }
        let state = GameState::initial();
        let mut board = Board::standard();
        board
            .place(
                Piece::new(
                    PieceId::new(1),
                    "Rook",
                    Color::Black,
                    Position::from_string("a8"),
                )
                .with_traits([traits::PHASE]),
            )
            .unwrap();
        board
            .add_effect(
                Position::from_string("a5"),
                Effect::new(EffectId::new(1), "barrier", Blocks::Enemy)
                    .with_owner(Color::White),
            )
            .unwrap();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let moves = move_targets(&game, &board, &state, rook);
        assert!(moves.contains(&Position::from_string("a5")));
    }

    #[test]
    fn test_is_attacked_and_check() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = board_with(&[
            (1, "King", Color::White, "e1"),
            (2, "Rook", Color::Black, "e8"),
        ]);
        assert!(is_attacked(
            game,
            &board,
            &state,
            Position::from_string("e1"),
            Color::Black
        ));
        assert!(is_in_check(game, &board, &state, Color::White));
        assert!(!is_in_check(game, &board, &state, Color::Black));
    }

    #[test]
    fn test_pawn_does_not_check_straight_ahead() {
        let game = standard_chess();
        let state = GameState::initial();
        let board = board_with(&[
            (1, "King", Color::White, "e1"),
            (2, "Pawn", Color::Black, "e2"),
            (3, "Pawn", Color::Black, "d2"),
        ]);
        // e2 pawn attacks d1/f1, not e1; d2 pawn attacks e1
        assert!(is_in_check(game, &board, &state, Color::White));
        let without_d2 = board_with(&[
            (1, "King", Color::White, "e1"),
            (2, "Pawn", Color::Black, "e2"),
        ]);
        assert!(!is_in_check(game, &without_d2, &state, Color::White));
    }
}
