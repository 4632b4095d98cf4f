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

//! The rules engine: a turn state machine over a compiled game.
//!
//! A turn is a queue of steps (fire `turn_start`, apply the move, fire
//! `capture`/`move`/`check`/`turn_end`, finish). Optional triggers pause
//! the queue mid-turn; `execute_optional_trigger` / `skip_optional_trigger`
//! resume it. Undo restores a pre-move snapshot, so it is exact no matter
//! what triggers and scripts touched.
//!
//! The compiled `Game` is immutable and shared; each engine owns its
//! board, state, undo stack, and id counters.

mod actions;
mod eval;
mod patterns;
pub mod script;
mod state;

pub use actions::Runtime;
pub use eval::{eval_condition, eval_expr, EvalCtx};
pub use patterns::{capture_targets, is_attacked, is_in_check, move_targets, pattern_targets, Mode};
pub use script::ScriptError;
pub use state::*;

use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

use crate::board::{traits, Board, Color, Piece, PieceId, Position};
use crate::game::{GameResult, WinReason};
use crate::model::{EventKind, Game, Trigger};
use script::ScriptEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not a legal move")]
    IllegalMove,
    #[error("It is not {0}'s turn")]
    WrongTurn(Color),
    #[error("Optional triggers are pending; resolve them before moving")]
    TriggersPending,
    #[error("The game is already over")]
    GameOver,
    #[error("Nothing to undo")]
    EmptyUndoStack,
    #[error("Unknown pending trigger id {0}")]
    UnknownPendingTrigger(u64),
    #[error("No such piece")]
    UnknownPiece,
}

use EngineError::*;

/// What a `make_move` (or optional-trigger resolution) produced.
#[derive(Debug, Clone, Default)]
pub struct MoveOutcome {
    pub result: Option<GameResult>,
    pub pending: Vec<PendingTriggerInfo>,
    pub cancelled: bool,
}

/// The caller-facing view of a queued optional trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTriggerInfo {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
}

pub struct Engine {
    game: Arc<Game>,
    board: Board,
    state: GameState,
    ids: IdCounters,
    options: EngineOptions,
    history: Vec<MoveRecord>,
    steps: VecDeque<TurnStep>,
    pending: Vec<PendingTrigger>,
    scripts: ScriptEngine,
    journal: Vec<EventRecord>,
    /// Which sides started with royal material; losing all of it ends
    /// the game even when no written condition matches.
    royals_expected: [bool; 2],
    cancelled_flag: bool,
    stamp: u64,
    move_cache: Option<(u64, Vec<Move>)>,
}

impl Engine {
    pub fn new(game: impl Into<Arc<Game>>) -> anyhow::Result<Self> {
        Self::with_options(game, EngineOptions::default())
    }

    pub fn with_options(
        game: impl Into<Arc<Game>>,
        options: EngineOptions,
    ) -> anyhow::Result<Self> {
        let game = game.into();
        let mut engine = Self {
            scripts: ScriptEngine::new(&game.scripts),
            game,
            board: Board::standard(),
            state: GameState::initial(),
            ids: IdCounters::default(),
            options,
            history: Vec::new(),
            steps: VecDeque::new(),
            pending: Vec::new(),
            journal: Vec::new(),
            royals_expected: [false, false],
            cancelled_flag: false,
            stamp: 0,
            move_cache: None,
        };
        engine.reset()?;
        Ok(engine)
    }

    // ---- accessors ----

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.state.result.as_ref()
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn is_in_check(&self, color: Color) -> bool {
        patterns::is_in_check(&self.game, &self.board, &self.state, color)
    }

    /// Drain the event journal accumulated since the last call.
    pub fn take_events(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.journal)
    }

    // ---- setup ----

    /// Rebuild the starting position from the game's setup.
    pub fn reset(&mut self) -> anyhow::Result<()> {
        let game = Arc::clone(&self.game);
        let mut board = Board::new(game.board.width, game.board.height)?;
        for (zone, squares) in &game.board.zones {
            board.add_zone(zone.clone(), squares.iter().copied())?;
        }
        self.royals_expected = [false, false];
        for placement in &game.setup {
            let def = game
                .piece_def(&placement.kind)
                .ok_or_else(|| anyhow::anyhow!("setup places unknown type {}", placement.kind))?;
            let piece = Piece::new(
                self.ids.next_piece(),
                placement.kind.clone(),
                placement.owner,
                placement.pos,
            )
            .with_traits(def.traits.iter().cloned())
            .with_state(def.initial_state.clone());
            if piece.is_royal() {
                self.royals_expected[placement.owner.to_index()] = true;
            }
            board.place(piece)?;
        }
        self.board = board;
        self.state = GameState::initial();
        self.history.clear();
        self.steps.clear();
        self.pending.clear();
        self.journal.clear();
        self.cancelled_flag = false;
        self.bump_stamp();

        let key = position_key(
            &self.board,
            &self.state,
            self.options.repetition_includes_state,
        );
        self.state.position_history.push(key);

        self.scripts.reset();
        let mut scripts = std::mem::take(&mut self.scripts);
        {
            let mut rt = self.runtime();
            scripts.initialize(&mut rt);
        }
        self.scripts = scripts;

        // a starting position can already be terminal (handed a
        // stalemate or an empty side)
        self.check_royal_extinction();
        if self.state.result.is_none() {
            self.evaluate_terminal_conditions();
        }
        Ok(())
    }

    fn runtime(&mut self) -> Runtime<'_> {
        Runtime::new(
            &self.game,
            &mut self.board,
            &mut self.state,
            &mut self.ids,
            self.options,
            &mut self.journal,
        )
    }

    fn bump_stamp(&mut self) {
        self.stamp += 1;
        self.move_cache = None;
    }

    // ---- move generation ----

    /// All legal moves for the current player. Cached until the position
    /// changes.
    pub fn legal_moves(&mut self) -> Vec<Move> {
        if self.state.result.is_some() {
            return Vec::new();
        }
        if let Some((stamp, moves)) = &self.move_cache {
            if *stamp == self.stamp {
                return moves.clone();
            }
        }
        let moves = self.compute_legal(self.state.current);
        self.move_cache = Some((self.stamp, moves.clone()));
        moves
    }

    /// Legal moves for one piece.
    pub fn legal_moves_for(&mut self, piece: PieceId) -> Vec<Move> {
        self.legal_moves()
            .into_iter()
            .filter(|mv| mv.piece == piece)
            .collect()
    }

    /// The legal move from `from` to `to`, if any. Promotions resolve to
    /// the first listed promotion type (pass the exact `Move` to choose
    /// another).
    pub fn find_move(&mut self, from: Position, to: Position) -> Option<Move> {
        self.legal_moves()
            .into_iter()
            .find(|mv| mv.from == from && mv.to == to)
    }

    fn compute_legal(&self, color: Color) -> Vec<Move> {
        let mut out = Vec::new();
        for piece in self.board.pieces_of(color) {
            self.pseudo_moves_for(piece, &mut out);
        }
        out.retain(|mv| !self.leaves_in_check(mv, color));
        out
    }

    fn pseudo_moves_for(&self, piece: &Piece, out: &mut Vec<Move>) {
        let game = &*self.game;
        let mut moves = Vec::new();
        for to in patterns::move_targets(game, &self.board, &self.state, piece) {
            moves.push(Move {
                piece: piece.id(),
                from: piece.pos(),
                to,
                kind: MoveKind::Quiet,
            });
        }
        for to in patterns::capture_targets(game, &self.board, &self.state, piece, false) {
            moves.push(Move {
                piece: piece.id(),
                from: piece.pos(),
                to,
                kind: MoveKind::Capture,
            });
        }
        self.tag_double_advances(piece, &mut moves);
        self.en_passant_moves(piece, &mut moves);
        self.castle_moves(piece, &mut moves);
        self.expand_promotions(piece, &mut moves);
        out.append(&mut moves);
    }

    /// A straight two-rank first move by an `ep` piece opens the
    /// en-passant window.
    fn tag_double_advances(&self, piece: &Piece, moves: &mut Vec<Move>) {
        if !piece.has_trait(traits::EN_PASSANT) {
            return;
        }
        for mv in moves.iter_mut() {
            if mv.kind == MoveKind::Quiet
                && mv.from.file() == mv.to.file()
                && mv.from.rank().abs_diff(mv.to.rank()) == 2
            {
                mv.kind = MoveKind::DoubleAdvance;
            }
        }
    }

    fn en_passant_moves(&self, piece: &Piece, moves: &mut Vec<Move>) {
        if !self.game.rules.en_passant || !piece.has_trait(traits::EN_PASSANT) {
            return;
        }
        let Some((target, victim)) = self.state.en_passant else {
            return;
        };
        let Some(victim_piece) = self.board.piece(victim) else {
            return;
        };
        if victim_piece.owner() == piece.owner() {
            return;
        }
        let delta = target - piece.pos();
        let forward = match piece.owner() {
            Color::White => 1,
            Color::Black => -1,
        };
        if delta.y == forward && delta.x.abs() == 1 {
            moves.push(Move {
                piece: piece.id(),
                from: piece.pos(),
                to: target,
                kind: MoveKind::EnPassant { victim },
            });
        }
    }

    /// Castling: unmoved `castle` piece, unmoved corner partner on the
    /// same rank, clear between, king not in or through check. The king
    /// moves two files toward the partner, which lands beside it.
    fn castle_moves(&self, piece: &Piece, moves: &mut Vec<Move>) {
        if !self.game.rules.castling || !piece.has_trait(traits::CASTLE) || piece.has_moved() {
            return;
        }
        if self.is_in_check(piece.owner()) {
            return;
        }
        let rank = piece.pos().rank();
        let king_file = piece.pos().file() as isize;
        for corner_file in [0, self.board.width() - 1] {
            let rook_pos = Position::new(corner_file, rank);
            let Some(rook) = self.board.piece_at(rook_pos) else {
                continue;
            };
            if rook.owner() != piece.owner() || rook.has_moved() || rook.id() == piece.id() {
                continue;
            }
            let dir: isize = if (corner_file as isize) > king_file { 1 } else { -1 };
            let king_to = king_file + 2 * dir;
            if king_to < 0 || king_to as usize >= self.board.width() {
                continue;
            }
            let rook_to = (king_to - dir) as usize;
            // everything strictly between king and rook must be empty
            let (lo, hi) = if king_file < corner_file as isize {
                (king_file as usize + 1, corner_file)
            } else {
                (corner_file + 1, king_file as usize)
            };
            if (lo..hi).any(|file| !self.board.is_empty(Position::new(file, rank))) {
                continue;
            }
            // the king may not cross an attacked square
            let crossings = [
                Position::new((king_file + dir) as usize, rank),
                Position::new(king_to as usize, rank),
            ];
            if crossings.iter().any(|pos| {
                patterns::is_attacked(&self.game, &self.board, &self.state, *pos, !piece.owner())
            }) {
                continue;
            }
            moves.push(Move {
                piece: piece.id(),
                from: piece.pos(),
                to: Position::new(king_to as usize, rank),
                kind: MoveKind::Castle {
                    rook: rook.id(),
                    rook_to: Position::new(rook_to, rank),
                },
            });
        }
    }

    fn expand_promotions(&self, piece: &Piece, moves: &mut Vec<Move>) {
        if !self.game.rules.promotion || !piece.has_trait(traits::PROMOTE) {
            return;
        }
        let Some(def) = self.game.piece_def(piece.kind()) else {
            return;
        };
        if def.promote_to.is_empty() {
            return;
        }
        let mut expanded = Vec::new();
        moves.retain(|mv| {
            if !self.is_promotion_square(piece.owner(), mv.to) {
                return true;
            }
            let capture = matches!(mv.kind, MoveKind::Capture);
            for kind in &def.promote_to {
                expanded.push(Move {
                    piece: mv.piece,
                    from: mv.from,
                    to: mv.to,
                    kind: MoveKind::Promotion {
                        to_kind: kind.clone(),
                        capture,
                    },
                });
            }
            false
        });
        moves.append(&mut expanded);
    }

    fn is_promotion_square(&self, owner: Color, pos: Position) -> bool {
        let far_rank = match owner {
            Color::White => self.board.height() - 1,
            Color::Black => 0,
        };
        if pos.rank() == far_rank {
            return true;
        }
        let zone = match owner {
            Color::White => "white_promotion",
            Color::Black => "black_promotion",
        };
        self.board.in_zone(zone, pos)
    }

    fn leaves_in_check(&self, mv: &Move, mover: Color) -> bool {
        if !self.royals_expected[mover.to_index()] {
            return false;
        }
        let mut board = self.board.clone();
        let mut state = self.state.clone();
        apply_move_raw(&self.game, &mut board, &mut state, mv);
        patterns::is_in_check(&self.game, &board, &state, mover)
    }

    // ---- playing ----

    pub fn make_move(&mut self, mv: &Move) -> Result<MoveOutcome, EngineError> {
        if self.state.result.is_some() {
            return Err(GameOver);
        }
        if !self.pending.is_empty() {
            return Err(TriggersPending);
        }
        let owner = self.board.piece(mv.piece).ok_or(UnknownPiece)?.owner();
        if owner != self.state.current {
            return Err(WrongTurn(owner));
        }
        if !self.legal_moves().contains(mv) {
            return Err(IllegalMove);
        }

        self.cancelled_flag = false;
        self.history.push(MoveRecord {
            mv: mv.clone(),
            snapshot: Snapshot {
                board: self.board.clone(),
                state: self.state.clone(),
            },
        });

        let mover = mv.piece;
        self.steps.clear();
        self.steps.push_back(TurnStep::Event(EventCtx {
            kind: EventKind::TurnStart,
            piece: Some(mover),
            from: Some(mv.from),
            to: Some(mv.to),
            captured: None,
        }));
        self.steps.push_back(TurnStep::Apply(mv.clone()));
        self.process_steps();
        Ok(self.outcome())
    }

    fn outcome(&self) -> MoveOutcome {
        MoveOutcome {
            result: self.state.result.clone(),
            pending: self.pending_infos(),
            cancelled: self.cancelled_flag,
        }
    }

    fn pending_infos(&self) -> Vec<PendingTriggerInfo> {
        self.pending
            .iter()
            .map(|p| PendingTriggerInfo {
                id: p.id,
                name: p.name.clone(),
                description: p.description.clone(),
            })
            .collect()
    }

    fn process_steps(&mut self) {
        while self.pending.is_empty() && !self.cancelled_flag && self.state.result.is_none() {
            let Some(step) = self.steps.pop_front() else {
                break;
            };
            match step {
                TurnStep::Apply(mv) => self.apply_and_enqueue(mv),
                TurnStep::Event(event) => self.fire_event(event),
                TurnStep::CheckProbe => {
                    let defender = !self.state.current;
                    if self.is_in_check(defender) {
                        if let Some(record) = self.history.last() {
                            let mv = record.mv.clone();
                            self.steps.push_front(TurnStep::Event(EventCtx {
                                kind: EventKind::Check,
                                piece: Some(mv.piece),
                                from: Some(mv.from),
                                to: Some(mv.to),
                                captured: None,
                            }));
                        }
                    }
                }
                TurnStep::FinishTurn => self.finish_turn(),
            }
        }
        if self.state.result.is_some() {
            self.steps.clear();
            self.pending.clear();
        }
    }

    fn apply_and_enqueue(&mut self, mv: Move) {
        let captured = apply_move_raw(&self.game, &mut self.board, &mut self.state, &mv);
        self.bump_stamp();

        let base = EventCtx {
            kind: EventKind::Move,
            piece: Some(mv.piece),
            from: Some(mv.from),
            to: Some(mv.to),
            captured: captured.clone(),
        };
        if captured.is_some() {
            self.steps.push_back(TurnStep::Event(EventCtx {
                kind: EventKind::Capture,
                ..base.clone()
            }));
        }
        self.steps.push_back(TurnStep::Event(base.clone()));
        self.steps.push_back(TurnStep::CheckProbe);
        if self.options.decrement_effects_before_turn_end {
            self.decrement_effects();
        }
        self.steps.push_back(TurnStep::Event(EventCtx {
            kind: EventKind::TurnEnd,
            ..base
        }));
        self.steps.push_back(TurnStep::FinishTurn);
    }

    fn fire_event(&mut self, event: EventCtx) {
        self.journal.push(EventRecord::Event {
            kind: event.kind,
            piece: event.piece,
            from: event.from,
            to: event.to,
        });

        let game = Arc::clone(&self.game);
        let mut queued: Vec<(usize, String, Option<String>)> = Vec::new();
        let mut scripts = std::mem::take(&mut self.scripts);
        let (cancelled, spawned) = {
            let mut rt = self.runtime();
            let mut cancelled = false;
            for (index, trigger) in game.triggers.iter().enumerate() {
                if trigger.on != event.kind {
                    continue;
                }
                if !trigger_applies(&rt, trigger, &event) {
                    continue;
                }
                if !rt.guard_passes(&trigger.when, &event) {
                    continue;
                }
                if trigger.optional {
                    queued.push((index, trigger.name.clone(), trigger.description.clone()));
                    continue;
                }
                rt.execute_actions(&trigger.actions, &event, &trigger.name);
                rt.journal.push(EventRecord::TriggerFired {
                    name: trigger.name.clone(),
                });
                if rt.cancelled {
                    cancelled = true;
                    break;
                }
            }
            if !cancelled {
                scripts.dispatch(&mut rt, &event);
            }
            (cancelled, std::mem::take(&mut rt.spawned))
        };
        self.scripts = scripts;
        self.bump_stamp();

        if cancelled {
            self.rollback_cancelled();
            return;
        }
        for (index, name, description) in queued {
            let id = self.ids.next_pending();
            self.journal.push(EventRecord::TriggerQueued {
                name: name.clone(),
                id,
            });
            self.pending.push(PendingTrigger {
                id,
                trigger_index: index,
                name,
                description,
                event: event.clone(),
            });
        }
        // spawned place/remove events fire right after this one
        for ev in spawned.into_iter().rev() {
            self.steps.push_front(TurnStep::Event(ev));
        }
    }

    /// A capture trigger vetoed the move: restore the pre-move snapshot
    /// and abandon the turn.
    fn rollback_cancelled(&mut self) {
        if let Some(record) = self.history.pop() {
            self.board = record.snapshot.board;
            self.state = record.snapshot.state;
        }
        self.steps.clear();
        self.pending.clear();
        self.cancelled_flag = true;
        self.journal.push(EventRecord::MoveCancelled);
        self.bump_stamp();
    }

    fn decrement_effects(&mut self) {
        let current = self.state.current;
        let mut expired = Vec::new();
        for id in self.board.effect_ids() {
            let owner = self
                .board
                .effect_mut(id)
                .map(|e| e.owner())
                .unwrap_or(None);
            if owner.is_some() && owner != Some(current) {
                continue;
            }
            if let Some(effect) = self.board.effect_mut(id) {
                if effect.decrement() {
                    expired.push(id);
                }
            }
        }
        for id in expired {
            self.board.remove_effect(id);
        }
    }

    fn finish_turn(&mut self) {
        if !self.options.decrement_effects_before_turn_end {
            self.decrement_effects();
        }

        self.state.current = !self.state.current;
        if self.state.current == Color::White {
            self.state.fullmove += 1;
        }
        let key = position_key(
            &self.board,
            &self.state,
            self.options.repetition_includes_state,
        );
        self.state.position_history.push(key);
        self.bump_stamp();

        if self.state.result.is_none() {
            self.check_royal_extinction();
        }
        if self.state.result.is_none() {
            self.evaluate_terminal_conditions();
        }
        if let Some(result) = &self.state.result {
            self.journal.push(EventRecord::Terminal {
                result: result.clone(),
            });
        }
    }

    /// A side that began with royal material and lost all of it has lost,
    /// even if no written victory condition covers it (atomic-style
    /// variants remove kings outside of capture).
    fn check_royal_extinction(&mut self) {
        for color in [Color::White, Color::Black] {
            if self.royals_expected[color.to_index()]
                && self.board.royal_pieces(color).next().is_none()
            {
                self.state.result = Some(GameResult::Win(
                    !color,
                    WinReason::Condition("royal_captured".to_string()),
                ));
                return;
            }
        }
    }

    /// Victory first, then draw; within each list entries OR-combine and
    /// the first match fires. `current` is the player now to move.
    fn evaluate_terminal_conditions(&mut self) {
        let no_moves = self.compute_legal(self.state.current).is_empty();
        let game = Arc::clone(&self.game);
        let ctx = EvalCtx::new(&game, &self.board, &self.state).with_no_moves(no_moves);

        for def in &game.victory {
            if eval_condition(&ctx, &def.condition) {
                let winner = match &def.winner {
                    None => self.state.current,
                    Some(player) => {
                        let rt_event = EventCtx::bare(EventKind::TurnEnd);
                        resolve_winner(&ctx, player, &rt_event)
                            .unwrap_or(self.state.current)
                    }
                };
                self.state.result = Some(GameResult::Win(
                    winner,
                    WinReason::Condition(def.name.clone()),
                ));
                return;
            }
        }
        for def in &game.draw {
            if eval_condition(&ctx, &def.condition) {
                self.state.result = Some(GameResult::Draw(
                    crate::game::DrawReason::Condition(def.name.clone()),
                ));
                return;
            }
        }
    }

    // ---- undo ----

    pub fn undo_move(&mut self) -> Result<(), EngineError> {
        let record = self.history.pop().ok_or(EmptyUndoStack)?;
        self.board = record.snapshot.board;
        self.state = record.snapshot.state;
        self.steps.clear();
        self.pending.clear();
        self.cancelled_flag = false;
        self.bump_stamp();
        Ok(())
    }

    pub fn history(&self) -> impl Iterator<Item = &Move> {
        self.history.iter().map(|record| &record.mv)
    }

    // ---- optional triggers ----

    pub fn pending_optional_triggers(&self) -> Vec<PendingTriggerInfo> {
        self.pending_infos()
    }

    pub fn has_pending_optional_triggers(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Run one queued optional trigger's actions, then resume the turn if
    /// the queue is drained.
    pub fn execute_optional_trigger(&mut self, id: u64) -> Result<MoveOutcome, EngineError> {
        let index = self
            .pending
            .iter()
            .position(|p| p.id == id)
            .ok_or(UnknownPendingTrigger(id))?;
        let entry = self.pending.remove(index);
        let game = Arc::clone(&self.game);
        let trigger = &game.triggers[entry.trigger_index];
        let (cancelled, spawned) = {
            let mut rt = self.runtime();
            rt.execute_actions(&trigger.actions, &entry.event, &trigger.name);
            rt.journal.push(EventRecord::TriggerFired {
                name: trigger.name.clone(),
            });
            (rt.cancelled, std::mem::take(&mut rt.spawned))
        };
        self.bump_stamp();
        if cancelled {
            self.rollback_cancelled();
            return Ok(self.outcome());
        }
        for ev in spawned.into_iter().rev() {
            self.steps.push_front(TurnStep::Event(ev));
        }
        if self.pending.is_empty() {
            self.process_steps();
        }
        Ok(self.outcome())
    }

    /// Decline one queued optional trigger, resuming the turn if the
    /// queue is drained.
    pub fn skip_optional_trigger(&mut self, id: u64) -> Result<MoveOutcome, EngineError> {
        let index = self
            .pending
            .iter()
            .position(|p| p.id == id)
            .ok_or(UnknownPendingTrigger(id))?;
        self.pending.remove(index);
        if self.pending.is_empty() {
            self.process_steps();
        }
        Ok(self.outcome())
    }
}

/// Whether a trigger's piece-type scope matches the event's piece.
fn trigger_applies(rt: &Runtime, trigger: &Trigger, event: &EventCtx) -> bool {
    let Some(required) = &trigger.piece_kind else {
        return true;
    };
    let kind = event
        .piece
        .and_then(|id| rt.board.piece(id))
        .map(|p| p.kind().to_string())
        .or_else(|| {
            event
                .captured
                .as_ref()
                .filter(|c| Some(c.id()) == event.piece)
                .map(|c| c.kind().to_string())
        });
    kind.as_deref() == Some(required.as_str())
}

fn resolve_winner(ctx: &EvalCtx, player: &crate::lang::PlayerRef, _event: &EventCtx) -> Option<Color> {
    use crate::lang::PlayerRef;
    match player {
        PlayerRef::White => Some(Color::White),
        PlayerRef::Black => Some(Color::Black),
        PlayerRef::Current => Some(ctx.state.current),
        PlayerRef::Opponent => Some(!ctx.state.current),
        PlayerRef::Expr(expr) => eval::eval_color(ctx, expr),
    }
}

/// Board-level move application, shared by real moves and the
/// hypothetical clones used for legality filtering. Returns the captured
/// piece, if any. Fires no events.
fn apply_move_raw(
    game: &Game,
    board: &mut Board,
    state: &mut GameState,
    mv: &Move,
) -> Option<Piece> {
    state.en_passant = None;
    let mut captured = None;
    match &mv.kind {
        MoveKind::Quiet | MoveKind::Capture | MoveKind::DoubleAdvance => {
            captured = board.relocate(mv.piece, mv.to).ok().flatten();
        }
        MoveKind::EnPassant { victim } => {
            let _ = board.relocate(mv.piece, mv.to);
            captured = board.remove(*victim);
        }
        MoveKind::Castle { rook, rook_to } => {
            let _ = board.relocate(mv.piece, mv.to);
            let _ = board.relocate(*rook, *rook_to);
            if let Some(partner) = board.piece_mut(*rook) {
                partner.mark_moved();
            }
        }
        MoveKind::Promotion { to_kind, .. } => {
            captured = board.relocate(mv.piece, mv.to).ok().flatten();
            // the promoted piece takes on its new definition wholesale
            match game.piece_def(to_kind) {
                Some(def) => {
                    if let Some(piece) = board.piece_mut(mv.piece) {
                        *piece = Piece::new(piece.id(), to_kind.clone(), piece.owner(), piece.pos())
                            .with_traits(def.traits.iter().cloned())
                            .with_state(def.initial_state.clone());
                    }
                }
                None => {
                    if let Some(piece) = board.piece_mut(mv.piece) {
                        piece.set_kind(to_kind.clone());
                    }
                }
            }
        }
    }

    if let Some(piece) = board.piece_mut(mv.piece) {
        piece.mark_moved();
    }
    if mv.kind == MoveKind::DoubleAdvance {
        let skipped_rank = (mv.from.rank() + mv.to.rank()) / 2;
        state.en_passant = Some((Position::new(mv.from.file(), skipped_rank), mv.piece));
    }

    let pawn_like = board
        .piece(mv.piece)
        .map(|p| p.has_trait(traits::EN_PASSANT))
        .unwrap_or(false);
    if captured.is_some() || pawn_like {
        state.halfmove_clock = 0;
    } else {
        state.halfmove_clock += 1;
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Value;
    use crate::game::DrawReason;
    use crate::model::standard_chess;

    fn standard_engine() -> Engine {
        Engine::new(standard_chess().clone()).expect("engine")
    }

    fn engine_from(source: &str) -> Engine {
        let decl = crate::lang::parse(source).expect("parse failed");
        let game = crate::model::compile(&decl).expect("compile failed");
        Engine::new(game).expect("engine failed")
    }

    fn play(engine: &mut Engine, from: &str, to: &str) -> MoveOutcome {
        let mv = engine
            .find_move(Position::from_string(from), Position::from_string(to))
            .unwrap_or_else(|| panic!("no legal move {from}{to}"));
        engine.make_move(&mv).expect("make_move failed")
    }

    fn at(engine: &Engine, pos: &str) -> Option<String> {
        engine
            .board()
            .piece_at(Position::from_string(pos))
            .map(|p| p.kind().to_string())
    }

    // ---- standard chess ----

    #[test]
    fn test_standard_opening_move_count() {
        let mut engine = standard_engine();
        assert_eq!(engine.legal_moves().len(), 20);
        play(&mut engine, "e2", "e4");
        assert_eq!(engine.state().current, Color::Black);
        assert_eq!(engine.legal_moves().len(), 20);
    }

    #[test]
    fn test_opening_sequence() {
        let mut engine = standard_engine();
        play(&mut engine, "e2", "e4");
        play(&mut engine, "e7", "e5");
        play(&mut engine, "g1", "f3");
        assert_eq!(at(&engine, "f3").as_deref(), Some("Knight"));
        assert_eq!(engine.state().current, Color::Black);
        assert_eq!(engine.state().fullmove, 2);
    }

    #[test]
    fn test_double_advance_sets_en_passant_window() {
        let mut engine = standard_engine();
        let outcome = play(&mut engine, "e2", "e4");
        assert!(outcome.result.is_none());
        let (target, _) = engine.state().en_passant.expect("ep window open");
        assert_eq!(target, Position::from_string("e3"));
    }

    #[test]
    fn test_wrong_turn_rejected() {
        let mut engine = standard_engine();
        let black_pawn = engine
            .board()
            .piece_at(Position::from_string("e7"))
            .unwrap()
            .id();
        let mv = Move {
            piece: black_pawn,
            from: Position::from_string("e7"),
            to: Position::from_string("e5"),
            kind: MoveKind::DoubleAdvance,
        };
        assert!(matches!(
            engine.make_move(&mv),
            Err(EngineError::WrongTurn(Color::Black))
        ));
    }

    #[test]
    fn test_legal_move_soundness() {
        let mut engine = standard_engine();
        let moves = engine.legal_moves();
        for mv in &moves {
            engine.make_move(mv).expect("legal move must be accepted");
            engine.undo_move().expect("undo");
        }
        // a rook cannot jump its own pawn
        let rook = engine
            .board()
            .piece_at(Position::from_string("a1"))
            .unwrap()
            .id();
        let illegal = Move {
            piece: rook,
            from: Position::from_string("a1"),
            to: Position::from_string("a5"),
            kind: MoveKind::Quiet,
        };
        assert!(matches!(
            engine.make_move(&illegal),
            Err(EngineError::IllegalMove)
        ));
    }

    #[test]
    fn test_pinned_piece_cannot_leave_file() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    white:\n        King: e1\n        Rook: e2\n    black:\n        King: a8\n        Rook: e8\n",
        );
        // the rook may slide along the e-file but never off it
        assert!(engine
            .find_move(Position::from_string("e2"), Position::from_string("d2"))
            .is_none());
        assert!(engine
            .find_move(Position::from_string("e2"), Position::from_string("e7"))
            .is_some());
        // capturing the checker along the file is fine too
        assert!(engine
            .find_move(Position::from_string("e2"), Position::from_string("e8"))
            .is_some());
    }

    #[test]
    fn test_check_safety_after_every_move() {
        let mut engine = standard_engine();
        for (from, to) in [("e2", "e4"), ("e7", "e5"), ("g1", "f3"), ("b8", "c6")] {
            let mover = engine.state().current;
            play(&mut engine, from, to);
            assert!(!engine.is_in_check(mover), "{from}{to} left mover in check");
        }
    }

    #[test]
    fn test_fools_mate() {
        let mut engine = standard_engine();
        play(&mut engine, "f2", "f3");
        play(&mut engine, "e7", "e5");
        play(&mut engine, "g2", "g4");
        let outcome = play(&mut engine, "d8", "h4");
        match outcome.result {
            Some(GameResult::Win(Color::Black, WinReason::Condition(name))) => {
                assert_eq!(name, "checkmate");
            }
            other => panic!("expected checkmate, got {other:?}"),
        }
        assert!(engine.legal_moves().is_empty());
        assert!(matches!(
            engine.make_move(&Move {
                piece: PieceId::new(1),
                from: Position::from_string("a2"),
                to: Position::from_string("a3"),
                kind: MoveKind::Quiet,
            }),
            Err(EngineError::GameOver)
        ));
    }

    #[test]
    fn test_stalemate_detected() {
        let engine = engine_from(
            "extends: standard\nsetup:\n    white:\n        King: a1\n    black:\n        King: b3\n        Queen: c2\n",
        );
        match engine.result() {
            Some(GameResult::Draw(DrawReason::Condition(name))) => {
                assert_eq!(name, "stalemate");
            }
            other => panic!("expected stalemate, got {other:?}"),
        }
    }

    #[test]
    fn test_threefold_repetition() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    white:\n        King: e1\n    black:\n        King: e8\n",
        );
        let shuffle = [
            ("e1", "d1"),
            ("e8", "d8"),
            ("d1", "e1"),
            ("d8", "e8"),
            ("e1", "d1"),
            ("e8", "d8"),
            ("d1", "e1"),
            ("d8", "e8"),
        ];
        let mut result = None;
        for (from, to) in shuffle {
            result = play(&mut engine, from, to).result;
            if result.is_some() {
                break;
            }
        }
        match result {
            Some(GameResult::Draw(DrawReason::Condition(name))) => {
                assert_eq!(name, "threefold_repetition");
            }
            other => panic!("expected repetition draw, got {other:?}"),
        }
    }

    #[test]
    fn test_undo_round_trip() {
        let mut engine = standard_engine();
        let board_before = engine.board().clone();
        let state_before = engine.state().clone();
        play(&mut engine, "e2", "e4");
        play(&mut engine, "e7", "e5");
        play(&mut engine, "g1", "f3");
        for _ in 0..3 {
            engine.undo_move().expect("undo");
        }
        assert_eq!(*engine.board(), board_before);
        assert_eq!(*engine.state(), state_before);
        assert!(matches!(
            engine.undo_move(),
            Err(EngineError::EmptyUndoStack)
        ));
        // the engine keeps working after a full rewind
        play(&mut engine, "e2", "e4");
        assert_eq!(at(&engine, "e4").as_deref(), Some("Pawn"));
    }

    // ---- standard specials ----

    #[test]
    fn test_castling_both_sides() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    fen: \"r3k2r/8/8/8/8/8/8/R3K2R\"\n",
        );
        assert!(engine
            .find_move(Position::from_string("e1"), Position::from_string("c1"))
            .is_some());
        play(&mut engine, "e1", "g1");
        assert_eq!(at(&engine, "g1").as_deref(), Some("King"));
        assert_eq!(at(&engine, "f1").as_deref(), Some("Rook"));
        assert!(at(&engine, "h1").is_none());
        // black can still castle long afterwards
        play(&mut engine, "e8", "c8");
        assert_eq!(at(&engine, "c8").as_deref(), Some("King"));
        assert_eq!(at(&engine, "d8").as_deref(), Some("Rook"));
    }

    #[test]
    fn test_castling_blocked_through_attack() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    fen: \"r3kr2/8/8/8/8/8/8/R3K2R\"\n",
        );
        // black's rook on f8 covers f1; only queenside remains
        assert!(engine
            .find_move(Position::from_string("e1"), Position::from_string("g1"))
            .is_none());
        assert!(engine
            .find_move(Position::from_string("e1"), Position::from_string("c1"))
            .is_some());
    }

    #[test]
    fn test_castling_rule_flag() {
        let mut engine = engine_from(
            "extends: standard\nrules:\n    castling: false\nsetup:\n    fen: \"r3k2r/8/8/8/8/8/8/R3K2R\"\n",
        );
        assert!(engine
            .find_move(Position::from_string("e1"), Position::from_string("g1"))
            .is_none());
    }

    #[test]
    fn test_en_passant_capture() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    white:\n        King: e1\n        Pawn: e5\n    black:\n        King: e8\n        Pawn: d7\n",
        );
        play(&mut engine, "e1", "d1");
        play(&mut engine, "d7", "d5");
        let ep = engine
            .find_move(Position::from_string("e5"), Position::from_string("d6"))
            .expect("en passant available");
        assert!(matches!(ep.kind, MoveKind::EnPassant { .. }));
        engine.make_move(&ep).unwrap();
        assert!(at(&engine, "d5").is_none());
        assert_eq!(at(&engine, "d6").as_deref(), Some("Pawn"));
    }

    #[test]
    fn test_en_passant_window_expires() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    white:\n        King: e1\n        Pawn: e5\n    black:\n        King: e8\n        Pawn: d7\n",
        );
        play(&mut engine, "e1", "d1");
        play(&mut engine, "d7", "d5");
        play(&mut engine, "d1", "e1"); // declines the capture
        play(&mut engine, "e8", "d8");
        assert!(engine
            .find_move(Position::from_string("e5"), Position::from_string("d6"))
            .is_none());
    }

    #[test]
    fn test_promotion() {
        let mut engine = engine_from(
            "extends: standard\nsetup:\n    white:\n        King: e1\n        Pawn: b7\n    black:\n        King: h1\n",
        );
        let pawn = engine
            .board()
            .piece_at(Position::from_string("b7"))
            .unwrap()
            .id();
        let choices = engine.legal_moves_for(pawn);
        let to_b8: Vec<_> = choices
            .iter()
            .filter(|mv| mv.to == Position::from_string("b8"))
            .collect();
        assert_eq!(to_b8.len(), 4); // queen, rook, bishop, knight
        let queen = to_b8
            .iter()
            .find(|mv| matches!(&mv.kind, MoveKind::Promotion { to_kind, .. } if to_kind == "Queen"))
            .cloned()
            .cloned()
            .unwrap();
        engine.make_move(&queen).unwrap();
        let promoted = engine.board().piece_at(Position::from_string("b8")).unwrap();
        assert_eq!(promoted.kind(), "Queen");
        assert_eq!(promoted.owner(), Color::White);
    }

    // ---- variants ----

    #[test]
    fn test_king_of_the_hill() {
        let source = "\
game: KingOfTheHill
extends: \"Standard Chess\"
board:
    zones:
        hill: [d4, d5, e4, e5]
trigger hill_victory {
    on: move
    when: piece.type == \"King\" and in_zone hill
    do:
        win piece.owner
}
setup:
    white:
        King: e1
    black:
        King: e8
";
        let mut engine = engine_from(source);
        play(&mut engine, "e1", "d2");
        play(&mut engine, "e8", "d8");
        play(&mut engine, "d2", "d3");
        play(&mut engine, "d8", "c8");
        let outcome = play(&mut engine, "d3", "d4");
        match outcome.result {
            Some(GameResult::Win(Color::White, WinReason::Action(name))) => {
                assert_eq!(name, "hill_victory");
            }
            other => panic!("expected hill victory, got {other:?}"),
        }
    }

    #[test]
    fn test_three_check() {
        let source = "\
game: ThreeCheck
extends: standard
trigger count_checks {
    on: turn_end
    when: check
    do:
        set state.checkCount += 1
}
victory:
    add:
        three_checks: state.checkCount >= 3 -> opponent
setup:
    white:
        King: a1
        Queen: b1
    black:
        King: h8
";
        let mut engine = engine_from(source);
        play(&mut engine, "b1", "b8");
        assert_eq!(engine.state().get_custom("checkCount"), Value::Int(1));
        play(&mut engine, "h8", "g7");
        play(&mut engine, "b8", "b7");
        assert_eq!(engine.state().get_custom("checkCount"), Value::Int(2));
        play(&mut engine, "g7", "g6");
        let outcome = play(&mut engine, "b7", "b6");
        match outcome.result {
            Some(GameResult::Win(Color::White, WinReason::Condition(name))) => {
                assert_eq!(name, "three_checks");
            }
            other => panic!("expected three-check win, got {other:?}"),
        }
    }

    #[test]
    fn test_atomic_explosion() {
        let source = "\
game: Atomic
extends: standard
trigger explosion {
    on: capture
    do: {
        remove radius(1) from to where not type in [Pawn]
        remove at to
    }
}
setup:
    white:
        King: e1
        Rook: a1
    black:
        King: h8
        Knight: a8
        Queen: b8
        Bishop: b7
";
        let mut engine = engine_from(source);
        let before = engine.board().piece_count();
        assert_eq!(before, 6);
        play(&mut engine, "a1", "a8");
        // victim, capturer, and both adjacent non-pawns are gone
        assert!(at(&engine, "a8").is_none());
        assert!(at(&engine, "b8").is_none());
        assert!(at(&engine, "b7").is_none());
        assert_eq!(engine.board().piece_count(), 2);
        assert!(engine.result().is_none());
        assert_eq!(engine.state().current, Color::Black);
    }

    #[test]
    fn test_atomic_explosion_spares_pawns() {
        let source = "\
game: Atomic
extends: standard
trigger explosion {
    on: capture
    do: {
        remove radius(1) from to where not type in [Pawn]
        remove at to
    }
}
setup:
    white:
        King: e1
        Rook: a1
    black:
        King: h8
        Knight: a8
        Pawn: b7
";
        let mut engine = engine_from(source);
        play(&mut engine, "a1", "a8");
        assert_eq!(at(&engine, "b7").as_deref(), Some("Pawn"));
    }

    #[test]
    fn test_optional_trigger_flow() {
        let source = "\
game: TrapperTest
extends: standard
piece Trapper {
    move: step(any, 1)
    capture: =move
    state: { traps: 0 }
    trigger lay_trap {
        on: move
        do: { set piece.state.traps += 1 }
        optional: true
        description: \"Lay a trap on the square left behind\"
    }
}
setup:
    white:
        King: e1
        Trapper: c1
    black:
        King: e8
";
        let mut engine = engine_from(source);
        let outcome = play(&mut engine, "c1", "c2");
        assert_eq!(outcome.pending.len(), 1);
        assert!(engine.has_pending_optional_triggers());
        assert_eq!(outcome.pending[0].name, "lay_trap");
        // the turn has not settled: still white's clock
        assert_eq!(engine.state().current, Color::White);

        // another move is rejected until the queue drains
        let err = engine.make_move(&Move {
            piece: PieceId::new(1),
            from: Position::from_string("e1"),
            to: Position::from_string("e2"),
            kind: MoveKind::Quiet,
        });
        assert!(matches!(err, Err(EngineError::TriggersPending)));

        let id = outcome.pending[0].id;
        engine.execute_optional_trigger(id).unwrap();
        assert!(!engine.has_pending_optional_triggers());
        assert_eq!(engine.state().current, Color::Black);
        let trapper = engine.board().piece_at(Position::from_string("c2")).unwrap();
        assert_eq!(trapper.get_state("traps"), Value::Int(1));
    }

    #[test]
    fn test_optional_trigger_skip() {
        let source = "\
game: TrapperTest
extends: standard
piece Trapper {
    move: step(any, 1)
    capture: =move
    state: { traps: 0 }
    trigger lay_trap {
        on: move
        do: { set piece.state.traps += 1 }
        optional: true
    }
}
setup:
    white:
        King: e1
        Trapper: c1
    black:
        King: e8
";
        let mut engine = engine_from(source);
        let outcome = play(&mut engine, "c1", "c2");
        let id = outcome.pending[0].id;
        engine.skip_optional_trigger(id).unwrap();
        assert_eq!(engine.state().current, Color::Black);
        let trapper = engine.board().piece_at(Position::from_string("c2")).unwrap();
        assert_eq!(trapper.get_state("traps"), Value::Int(0));
        assert!(matches!(
            engine.execute_optional_trigger(id),
            Err(EngineError::UnknownPendingTrigger(_))
        ));
    }

    #[test]
    fn test_super_knight_replacement() {
        let source = "\
game: Enhanced
extends: standard
piece SuperKnight {
    move: leap(1, 2) | leap(1, 3)
    capture: =move
    traits: [jump, super, enhanced]
}
setup:
    replace:
        Knight: SuperKnight
";
        let mut engine = engine_from(source);
        let supers: Vec<_> = engine
            .board()
            .pieces()
            .filter(|p| p.kind() == "SuperKnight")
            .collect();
        assert_eq!(supers.len(), 4);
        for knight in &supers {
            assert!(knight.has_trait("jump"));
            assert!(knight.has_trait("super"));
            assert!(knight.has_trait("enhanced"));
        }
        // the longer leap works: b1 to c4
        assert!(engine
            .find_move(Position::from_string("b1"), Position::from_string("c4"))
            .is_some());
    }

    #[test]
    fn test_capture_cancel_reverts_move() {
        let source = "\
game: Pacifist
extends: standard
trigger no_captures {
    on: capture
    do: { cancel }
}
setup:
    white:
        King: e1
        Rook: a1
    black:
        King: e8
        Pawn: a7
";
        let mut engine = engine_from(source);
        let mv = engine
            .find_move(Position::from_string("a1"), Position::from_string("a7"))
            .unwrap();
        let outcome = engine.make_move(&mv).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(at(&engine, "a1").as_deref(), Some("Rook"));
        assert_eq!(at(&engine, "a7").as_deref(), Some("Pawn"));
        assert_eq!(engine.state().current, Color::White);
        assert_eq!(engine.history().count(), 0);
        // quiet moves still work
        play(&mut engine, "a1", "a5");
    }

    #[test]
    fn test_mark_effects_expire_by_duration() {
        let source = "\
game: Snares
extends: standard
effect Snare {
    blocks: enemy
    duration: 2
}
trigger lay {
    on: move
    do: { mark to Snare }
}
setup:
    white:
        King: e1
    black:
        King: e8
";
        let mut engine = engine_from(source);
        play(&mut engine, "e1", "d1");
        // marked this turn, decremented once at white's own turn end
        let d1 = Position::from_string("d1");
        assert_eq!(engine.board().effects_at(d1)[0].duration(), Some(1));
        play(&mut engine, "e8", "d8"); // black's turn end leaves white's alone
        assert_eq!(engine.board().effects_at(d1).len(), 1);
        assert_eq!(
            engine
                .board()
                .effects_at(Position::from_string("d8"))
                .len(),
            1
        );
        play(&mut engine, "d1", "d2");
        // white's snare on d1 expired; the new one on d2 is fresh
        assert!(engine
            .board()
            .effects_at(d1)
            .iter()
            .all(|e| e.owner() != Some(Color::White)));
        assert_eq!(
            engine.board().effects_at(Position::from_string("d2")).len(),
            1
        );
    }

    #[test]
    fn test_script_handlers_drive_state() {
        let source = "\
game: Scripted
extends: standard
script {
    on move(e) {
        let n = game.get(\"moves\");
        if (n == nil) {
            n = 0;
        }
        game.set(\"moves\", n + 1);
    }
}
setup:
    white:
        King: e1
    black:
        King: e8
";
        let mut engine = engine_from(source);
        play(&mut engine, "e1", "d1");
        play(&mut engine, "e8", "d8");
        assert_eq!(engine.state().get_custom("moves"), Value::Int(2));
    }

    #[test]
    fn test_event_journal() {
        let mut engine = standard_engine();
        engine.take_events();
        play(&mut engine, "e2", "e4");
        let events = engine.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            EventRecord::Event {
                kind: EventKind::Move,
                ..
            }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            EventRecord::Event {
                kind: EventKind::TurnEnd,
                ..
            }
        )));
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_royal_extinction_safeguard() {
        // a trigger removes the king outside of normal capture; the game
        // must still end
        let source = "\
game: Doom
extends: standard
trigger doom {
    on: capture
    do: {
        remove radius(1) from to
    }
}
setup:
    white:
        King: e1
        Rook: a1
    black:
        King: b8
        Knight: a8
";
        let mut engine = engine_from(source);
        let outcome = play(&mut engine, "a1", "a8");
        match outcome.result {
            Some(GameResult::Win(Color::White, WinReason::Condition(name))) => {
                assert_eq!(name, "royal_captured");
            }
            other => panic!("expected royal-capture win, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_restores_start() {
        let mut engine = standard_engine();
        play(&mut engine, "e2", "e4");
        play(&mut engine, "e7", "e5");
        engine.reset().unwrap();
        assert_eq!(engine.board().piece_count(), 32);
        assert_eq!(engine.state().current, Color::White);
        assert_eq!(engine.history().count(), 0);
        assert_eq!(engine.legal_moves().len(), 20);
    }
}
