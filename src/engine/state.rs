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
use std::collections::BTreeMap;
use std::fmt;

use crate::board::{Board, Color, PieceId, Position, Value};
use crate::game::GameResult;
use crate::model::EventKind;

/// Resolutions for behaviors the language leaves open. Defaults follow
/// the choices documented in DESIGN.md.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// `create` onto an occupied square replaces the occupant (vs. being
    /// skipped).
    pub create_replaces: bool,
    /// Decrement effect durations before `turn_end` triggers run instead
    /// of after.
    pub decrement_effects_before_turn_end: bool,
    /// Include the free-form custom state map in the repetition key.
    pub repetition_includes_state: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            create_replaces: true,
            decrement_effects_before_turn_end: false,
            repetition_includes_state: false,
        }
    }
}

/// Allocators for process-unique ids. Engine-owned; never shared between
/// engines and never rewound by undo, so ids stay unique for a session.
#[derive(Debug, Clone, Default)]
pub struct IdCounters {
    piece: u64,
    effect: u64,
    pending: u64,
}

impl IdCounters {
    pub fn next_piece(&mut self) -> PieceId {
        self.piece += 1;
        PieceId::new(self.piece)
    }

    pub fn next_effect(&mut self) -> crate::board::EffectId {
        self.effect += 1;
        crate::board::EffectId::new(self.effect)
    }

    pub fn next_pending(&mut self) -> u64 {
        self.pending += 1;
        self.pending
    }
}

/// How a move changes the board beyond the basic relocation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum MoveKind {
    Quiet,
    Capture,
    DoubleAdvance,
    EnPassant {
        victim: PieceId,
    },
    Castle {
        rook: PieceId,
        rook_to: Position,
    },
    Promotion {
        to_kind: String,
        capture: bool,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Move {
    pub piece: PieceId,
    pub from: Position,
    pub to: Position,
    pub kind: MoveKind,
}

impl Move {
    pub fn is_capture(&self) -> bool {
        matches!(
            self.kind,
            MoveKind::Capture | MoveKind::EnPassant { .. } | MoveKind::Promotion { capture: true, .. }
        )
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let MoveKind::Promotion { to_kind, .. } = &self.kind {
            write!(f, "={to_kind}")?;
        }
        Ok(())
    }
}

/// Bindings carried by an engine event into trigger conditions, actions
/// and scripts. The captured piece is a snapshot; it is already off the
/// board when capture triggers run.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCtx {
    pub kind: EventKind,
    pub piece: Option<PieceId>,
    pub from: Option<Position>,
    pub to: Option<Position>,
    pub captured: Option<crate::board::Piece>,
}

impl EventCtx {
    pub fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            piece: None,
            from: None,
            to: None,
            captured: None,
        }
    }
}

/// One queued unit of turn processing. The queue pauses whenever optional
/// triggers are pending, which is how `make_move` "returns early".
#[derive(Debug, Clone)]
pub enum TurnStep {
    Apply(Move),
    Event(EventCtx),
    /// Fire a `check` event if the side to move next now stands in check.
    CheckProbe,
    FinishTurn,
}

/// An optional trigger awaiting the caller's decision.
#[derive(Debug, Clone)]
pub struct PendingTrigger {
    pub id: u64,
    pub trigger_index: usize,
    pub name: String,
    pub description: Option<String>,
    pub event: EventCtx,
}

/// What `take_events` drains: a journal of everything observable that
/// happened since the last drain.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Event {
        kind: EventKind,
        piece: Option<PieceId>,
        from: Option<Position>,
        to: Option<Position>,
    },
    TriggerFired {
        name: String,
    },
    TriggerQueued {
        name: String,
        id: u64,
    },
    MoveCancelled,
    Terminal {
        result: GameResult,
    },
}

/// Mutable turn bookkeeping. The board holds the pieces; everything else
/// a variant can observe or mutate lives here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameState {
    pub current: Color,
    pub halfmove_clock: u32,
    pub fullmove: u32,
    /// Free-form game state (`state.checkCount`, ...). Conditions read
    /// missing keys as nil; `set` autovivifies.
    pub custom: BTreeMap<String, Value>,
    /// Repetition keys, pushed once per settled turn.
    pub position_history: Vec<String>,
    /// En-passant window: the skip square and the double-stepped piece.
    pub en_passant: Option<(Position, PieceId)>,
    pub result: Option<GameResult>,
}

impl GameState {
    pub fn initial() -> Self {
        Self {
            current: Color::White,
            halfmove_clock: 0,
            fullmove: 1,
            custom: BTreeMap::new(),
            position_history: Vec::new(),
            en_passant: None,
            result: None,
        }
    }

    pub fn get_custom(&self, key: &str) -> Value {
        self.custom.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn set_custom(&mut self, key: impl Into<String>, value: Value) {
        self.custom.insert(key.into(), value);
    }

    /// Occurrences of the latest position key, for repetition draws.
    pub fn repetition_count(&self) -> usize {
        match self.position_history.last() {
            Some(latest) => self
                .position_history
                .iter()
                .filter(|key| *key == latest)
                .count(),
            None => 0,
        }
    }
}

/// Everything needed to restore the pre-move world exactly. Triggers and
/// scripts can touch arbitrary state, so undo is a snapshot rather than
/// a delta.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub board: Board,
    pub state: GameState,
}

/// One played move plus the snapshot that undoes it.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    pub mv: Move,
    pub snapshot: Snapshot,
}

/// The repetition key: piece placements (sorted by square), the side to
/// move, square effects, and optionally the custom state map.
pub fn position_key(board: &Board, state: &GameState, include_custom: bool) -> String {
    let mut pieces: Vec<String> = board
        .pieces()
        .map(|p| format!("{}:{}:{}", p.pos(), p.kind(), p.owner()))
        .collect();
    pieces.sort();
    let mut effects: Vec<String> = board
        .effects()
        .map(|(effect, pos)| format!("{}:{}", pos, effect.kind()))
        .collect();
    effects.sort();
    let mut key = format!("{}|{}|{}", pieces.join(";"), state.current, effects.join(";"));
    if include_custom {
        let custom: Vec<String> = state
            .custom
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        key.push('|');
        key.push_str(&custom.join(";"));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Piece;

    #[test]
    fn test_id_counters_monotonic() {
        let mut ids = IdCounters::default();
        let a = ids.next_piece();
        let b = ids.next_piece();
        assert!(b > a);
        assert_eq!(ids.next_pending(), 1);
        assert_eq!(ids.next_pending(), 2);
    }

    #[test]
    fn test_repetition_count() {
        let mut state = GameState::initial();
        assert_eq!(state.repetition_count(), 0);
        state.position_history.push("a".to_string());
        state.position_history.push("b".to_string());
        state.position_history.push("a".to_string());
        assert_eq!(state.repetition_count(), 2);
    }

    #[test]
    fn test_position_key_tracks_turn() {
        let mut board = Board::standard();
        board
            .place(Piece::new(
                PieceId::new(1),
                "King",
                Color::White,
                Position::from_string("e1"),
            ))
            .unwrap();
        let mut state = GameState::initial();
        let white_key = position_key(&board, &state, false);
        state.current = Color::Black;
        let black_key = position_key(&board, &state, false);
        assert_ne!(white_key, black_key);
    }

    #[test]
    fn test_position_key_custom_state_toggle() {
        let board = Board::standard();
        let mut state = GameState::initial();
        let before = position_key(&board, &state, true);
        state.set_custom("checkCount", Value::Int(2));
        assert_ne!(before, position_key(&board, &state, true));
        // excluded by default
        assert_eq!(
            position_key(&board, &GameState::initial(), false),
            position_key(&board, &state, false)
        );
    }

    #[test]
    fn test_move_display() {
        let mv = Move {
            piece: PieceId::new(1),
            from: Position::from_string("e2"),
            to: Position::from_string("e4"),
            kind: MoveKind::DoubleAdvance,
        };
        assert_eq!(mv.to_string(), "e2e4");
        let promo = Move {
            piece: PieceId::new(2),
            from: Position::from_string("b7"),
            to: Position::from_string("b8"),
            kind: MoveKind::Promotion {
                to_kind: "Queen".to_string(),
                capture: false,
            },
        };
        assert_eq!(promo.to_string(), "b7b8=Queen");
    }
}
