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

//! Executes declarative trigger actions against the live board and state.
//!
//! Actions run in order. Mutations that add or delete pieces spawn
//! `place`/`remove` events, which the engine queues behind the event
//! currently firing.

use super::eval::{eval_color, eval_condition, eval_expr, eval_position, EvalCtx};
use super::state::{EngineOptions, EventCtx, EventRecord, GameState, IdCounters};
use crate::board::{Board, Color, Effect, Piece, PieceId, Position, Value};
use crate::game::{DrawReason, GameResult, WinReason};
use crate::lang::{ActionDecl, ConditionExpr, Expr, FilterDecl, PlayerRef, SetOp, TargetDecl};
use crate::model::{EventKind, Game};

/// Mutable view of the engine internals an action batch runs against.
pub struct Runtime<'a> {
    pub game: &'a Game,
    pub board: &'a mut Board,
    pub state: &'a mut GameState,
    pub ids: &'a mut IdCounters,
    pub options: EngineOptions,
    pub journal: &'a mut Vec<EventRecord>,
    /// Events generated by actions, to fire after the current one.
    pub spawned: Vec<EventCtx>,
    /// Set by `cancel` in a capture trigger; the engine rolls the move back.
    pub cancelled: bool,
}

impl<'a> Runtime<'a> {
    pub fn new(
        game: &'a Game,
        board: &'a mut Board,
        state: &'a mut GameState,
        ids: &'a mut IdCounters,
        options: EngineOptions,
        journal: &'a mut Vec<EventRecord>,
    ) -> Self {
        Self {
            game,
            board,
            state,
            ids,
            options,
            journal,
            spawned: Vec::new(),
            cancelled: false,
        }
    }

    fn ctx<'b>(&'b self, event: &'b EventCtx) -> EvalCtx<'b> {
        let mut ctx = EvalCtx::new(self.game, self.board, self.state)
            .with_event(event)
            .with_check_subject(match event.kind {
                EventKind::TurnStart => self.state.current,
                _ => !self.state.current,
            });
        if let Some(piece) = event.piece.and_then(|id| self.board.piece(id)) {
            ctx = ctx.with_piece(piece);
        }
        if let Some(to) = event.to {
            ctx = ctx.with_target(to);
        }
        ctx
    }

    /// Evaluate a trigger's `when:` guard in this event's context.
    pub fn guard_passes(&self, when: &Option<ConditionExpr>, event: &EventCtx) -> bool {
        match when {
            Some(condition) => eval_condition(&self.ctx(event), condition),
            None => true,
        }
    }

    pub fn execute_actions(
        &mut self,
        actions: &[ActionDecl],
        event: &EventCtx,
        trigger_name: &str,
    ) {
        for action in actions {
            if self.cancelled {
                break;
            }
            self.execute_action(action, event, trigger_name);
        }
    }

    fn execute_action(&mut self, action: &ActionDecl, event: &EventCtx, trigger_name: &str) {
        match action {
            ActionDecl::Set { path, op, value } => self.do_set(path, *op, value, event),
            ActionDecl::Remove { target, filter } => self.do_remove(target, filter, event),
            ActionDecl::Create { kind, at, owner } => self.do_create(kind, at, owner, event),
            ActionDecl::MovePiece { piece, to } => self.do_move(piece, to, event),
            ActionDecl::Win(player) => {
                if self.state.result.is_none() {
                    if let Some(color) = self.resolve_player(player, event) {
                        self.state.result = Some(GameResult::Win(
                            color,
                            WinReason::Action(trigger_name.to_string()),
                        ));
                        self.journal.push(EventRecord::Terminal {
                            result: self.state.result.clone().expect("just set"),
                        });
                    }
                }
            }
            ActionDecl::Draw(reason) => {
                if self.state.result.is_none() {
                    self.state.result =
                        Some(GameResult::Draw(DrawReason::Action(reason.clone())));
                    self.journal.push(EventRecord::Terminal {
                        result: self.state.result.clone().expect("just set"),
                    });
                }
            }
            ActionDecl::Mark { at, effect } => self.do_mark(at, effect, event),
            ActionDecl::Cancel => {
                // only capture events permit cancellation
                if event.kind == EventKind::Capture {
                    self.cancelled = true;
                }
            }
        }
    }

    // ---- set ----

    fn do_set(&mut self, path: &[String], op: SetOp, value: &Expr, event: &EventCtx) {
        let new = eval_expr(&self.ctx(event), value);
        match path {
            [root, key] if root == "state" => {
                let old = self.state.get_custom(key);
                let merged = apply_set_op(op, old, new);
                self.state.set_custom(key.clone(), merged);
            }
            [root, mid, key] if root == "piece" && mid == "state" => {
                let Some(id) = event.piece else { return };
                let Some(piece) = self.board.piece_mut(id) else {
                    return;
                };
                let old = piece.get_state(key);
                piece.set_state(key.clone(), apply_set_op(op, old, new));
            }
            [root, sub, mid, key]
                if root == "event" && sub == "piece" && mid == "state" =>
            {
                let Some(id) = event.piece else { return };
                let Some(piece) = self.board.piece_mut(id) else {
                    return;
                };
                let old = piece.get_state(key);
                piece.set_state(key.clone(), apply_set_op(op, old, new));
            }
            _ => {
                log::debug!("set: unsupported path {path:?}");
            }
        }
    }

    // ---- remove ----

    fn do_remove(&mut self, target: &TargetDecl, filter: &Option<FilterDecl>, event: &EventCtx) {
        let squares = self.target_squares(target, event);
        let actor_owner = event
            .piece
            .and_then(|id| self.board.piece(id))
            .map(|p| p.owner())
            .unwrap_or(self.state.current);
        let mut doomed: Vec<PieceId> = Vec::new();
        for pos in squares {
            let Some(piece) = self.board.piece_at(pos) else {
                continue;
            };
            let keep = match filter {
                None => false,
                Some(FilterDecl::TypeIn(types)) => !types.iter().any(|t| t == piece.kind()),
                Some(FilterDecl::TypeNotIn(types)) => types.iter().any(|t| t == piece.kind()),
                Some(FilterDecl::Enemy) => piece.owner() == actor_owner,
                Some(FilterDecl::Friend) => piece.owner() != actor_owner,
            };
            if !keep {
                doomed.push(piece.id());
            }
        }
        for id in doomed {
            if let Some(removed) = self.board.remove(id) {
                self.spawn_removal(&removed);
            }
        }
    }

    fn target_squares(&self, target: &TargetDecl, event: &EventCtx) -> Vec<Position> {
        let ctx = self.ctx(event);
        match target {
            TargetDecl::At(expr) => eval_position(&ctx, expr).into_iter().collect(),
            TargetDecl::Radius { n, from } => {
                let Some(center) = eval_position(&ctx, from) else {
                    return Vec::new();
                };
                self.board
                    .positions()
                    .filter(|pos| pos.distance(&center) <= (*n).max(0) as usize)
                    .collect()
            }
            TargetDecl::Adjacent { to } => {
                let Some(center) = eval_position(&ctx, to) else {
                    return Vec::new();
                };
                self.board
                    .positions()
                    .filter(|pos| pos.is_adjacent(&center))
                    .collect()
            }
            TargetDecl::InZone(name) => self
                .board
                .zone(name)
                .map(|squares| squares.iter().copied().collect())
                .unwrap_or_default(),
            TargetDecl::Line { dir, from } => {
                let Some(origin) = eval_position(&ctx, from) else {
                    return Vec::new();
                };
                let owner = event
                    .piece
                    .and_then(|id| self.board.piece(id))
                    .map(|p| p.owner())
                    .unwrap_or(self.state.current);
                let mut squares = Vec::new();
                for unit in dir.units(owner) {
                    let mut cursor = origin;
                    while let Some(next) = cursor + unit {
                        if !self.board.contains(next) {
                            break;
                        }
                        squares.push(next);
                        cursor = next;
                    }
                }
                squares
            }
        }
    }

    // ---- create / move / mark ----

    fn do_create(&mut self, kind: &str, at: &Expr, owner: &PlayerRef, event: &EventCtx) {
        let Some(pos) = eval_position(&self.ctx(event), at) else {
            return;
        };
        let Some(owner) = self.resolve_player(owner, event) else {
            return;
        };
        let Some(def) = self.game.piece_def(kind) else {
            log::debug!("create: unknown piece type {kind:?}");
            return;
        };
        if !self.board.contains(pos) {
            return;
        }
        if !self.board.is_empty(pos) && !self.options.create_replaces {
            return;
        }
        let piece = Piece::new(self.ids.next_piece(), kind, owner, pos)
            .with_traits(def.traits.iter().cloned())
            .with_state(def.initial_state.clone());
        let id = piece.id();
        if let Ok(replaced) = self.board.place(piece) {
            if let Some(gone) = replaced {
                self.spawn_removal(&gone);
            }
            self.spawned.push(EventCtx {
                kind: EventKind::Place,
                piece: Some(id),
                from: None,
                to: Some(pos),
                captured: None,
            });
        }
    }

    fn do_move(&mut self, piece: &Expr, to: &Expr, event: &EventCtx) {
        let (id, to) = {
            let ctx = self.ctx(event);
            let id = self.resolve_piece(piece, event);
            let to = eval_position(&ctx, to);
            let (Some(id), Some(to)) = (id, to) else {
                return;
            };
            (id, to)
        };
        if !self.board.contains(to) {
            return;
        }
        // a teleport, not a capture: anything displaced just disappears
        if let Ok(displaced) = self.board.relocate(id, to) {
            if let Some(gone) = displaced {
                self.spawn_removal(&gone);
            }
        }
    }

    fn do_mark(&mut self, at: &Expr, effect_name: &str, event: &EventCtx) {
        let Some(pos) = eval_position(&self.ctx(event), at) else {
            return;
        };
        let Some(def) = self.game.effects.get(effect_name) else {
            log::debug!("mark: unknown effect {effect_name:?}");
            return;
        };
        let mut effect =
            Effect::new(self.ids.next_effect(), def.name.clone(), def.blocks)
                .with_owner(self.state.current);
        if let Some(duration) = def.duration {
            effect = effect.with_duration(duration);
        }
        let _ = self.board.add_effect(pos, effect);
    }

    // ---- shared resolution ----

    fn spawn_removal(&mut self, removed: &Piece) {
        self.spawned.push(EventCtx {
            kind: EventKind::Remove,
            piece: Some(removed.id()),
            from: Some(removed.pos()),
            to: None,
            captured: Some(removed.clone()),
        });
    }

    fn resolve_piece(&self, expr: &Expr, event: &EventCtx) -> Option<PieceId> {
        if let Some(path) = expr.as_path() {
            match path
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .as_slice()
            {
                ["piece"] | ["event", "piece"] => return event.piece,
                _ => {}
            }
        }
        let pos = eval_position(&self.ctx(event), expr)?;
        self.board.piece_at(pos).map(|p| p.id())
    }

    pub fn resolve_player(&self, player: &PlayerRef, event: &EventCtx) -> Option<Color> {
        match player {
            PlayerRef::White => Some(Color::White),
            PlayerRef::Black => Some(Color::Black),
            PlayerRef::Current => Some(self.state.current),
            PlayerRef::Opponent => Some(!self.state.current),
            PlayerRef::Expr(expr) => eval_color(&self.ctx(event), expr),
        }
    }
}

fn apply_set_op(op: SetOp, old: Value, new: Value) -> Value {
    match op {
        SetOp::Assign => new,
        SetOp::Inc => Value::Int(old.as_int().unwrap_or(0) + new.as_int().unwrap_or(0)),
        SetOp::Dec => Value::Int(old.as_int().unwrap_or(0) - new.as_int().unwrap_or(0)),
    }
}
