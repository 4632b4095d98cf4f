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

//! Condition and expression evaluation.
//!
//! The same evaluator serves three callers: conditional movement patterns
//! (binding `piece` and the candidate `target`), trigger `when:` guards
//! (binding the event context), and victory/draw conditions (binding the
//! turn as a whole). Unknown names evaluate to nil, and any comparison
//! touching nil is false; evaluation never fails at runtime.

use std::collections::BTreeMap;

use super::patterns;
use super::state::{EventCtx, GameState};
use crate::board::{Board, Color, Piece, Position, Value};
use crate::lang::{BinOp, CmpOp, ConditionExpr, Expr};
use crate::model::Game;

#[derive(Clone, Copy)]
pub struct EvalCtx<'a> {
    pub game: &'a Game,
    pub board: &'a Board,
    pub state: &'a GameState,
    /// The subject piece: the mover during move generation, the event's
    /// piece during trigger evaluation.
    pub piece: Option<&'a Piece>,
    /// Candidate destination square, when one exists.
    pub target: Option<Position>,
    pub event: Option<&'a EventCtx>,
    /// The side `check` refers to: whoever's turn it is (or will be).
    pub check_subject: Color,
    /// Set while computing attacks for check detection. A `check`
    /// condition inside a pattern then reads as false, cutting the
    /// self-recursion.
    pub attack_scan: bool,
    /// Precomputed "current player has no legal move", available only
    /// during terminal-condition evaluation.
    pub no_moves: Option<bool>,
}

impl<'a> EvalCtx<'a> {
    pub fn new(game: &'a Game, board: &'a Board, state: &'a GameState) -> Self {
        Self {
            game,
            board,
            state,
            piece: None,
            target: None,
            event: None,
            check_subject: state.current,
            attack_scan: false,
            no_moves: None,
        }
    }

    pub fn with_piece(mut self, piece: &'a Piece) -> Self {
        self.piece = Some(piece);
        self
    }

    pub fn with_target(mut self, target: Position) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_event(mut self, event: &'a EventCtx) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_check_subject(mut self, subject: Color) -> Self {
        self.check_subject = subject;
        self
    }

    pub fn scanning(mut self) -> Self {
        self.attack_scan = true;
        self
    }

    pub fn with_no_moves(mut self, no_moves: bool) -> Self {
        self.no_moves = Some(no_moves);
        self
    }

    /// The square a positional atom refers to: the candidate target if
    /// set, else the subject piece's square.
    fn focus(&self) -> Option<Position> {
        self.target.or_else(|| self.piece.map(|p| p.pos()))
    }
}

pub fn eval_condition(ctx: &EvalCtx, cond: &ConditionExpr) -> bool {
    match cond {
        ConditionExpr::Empty => ctx
            .target
            .map_or(false, |pos| ctx.board.is_empty(pos)),
        ConditionExpr::Enemy => occupant_relation(ctx, |mine, theirs| mine != theirs),
        ConditionExpr::Friend => occupant_relation(ctx, |mine, theirs| mine == theirs),
        ConditionExpr::Check => {
            if ctx.attack_scan {
                return false;
            }
            patterns::is_in_check(ctx.game, ctx.board, ctx.state, ctx.check_subject)
        }
        ConditionExpr::FirstMove => ctx.piece.map_or(false, |p| !p.has_moved()),
        ConditionExpr::Clear => match (ctx.piece, ctx.target) {
            (Some(piece), Some(target)) => path_clear(ctx.board, piece.pos(), target),
            _ => false,
        },
        ConditionExpr::InZone(zone) => ctx
            .focus()
            .map_or(false, |pos| ctx.board.in_zone(zone, pos)),
        ConditionExpr::Not(inner) => !eval_condition(ctx, inner),
        ConditionExpr::And(left, right) => {
            eval_condition(ctx, left) && eval_condition(ctx, right)
        }
        ConditionExpr::Or(left, right) => {
            eval_condition(ctx, left) || eval_condition(ctx, right)
        }
        ConditionExpr::Compare { op, left, right } => {
            compare(*op, &eval_expr(ctx, left), &eval_expr(ctx, right))
        }
        ConditionExpr::Expr(expr) => eval_expr(ctx, expr).truthy(),
        ConditionExpr::Custom { name, args: _ } => match name.as_str() {
            "no_moves" => ctx.no_moves.unwrap_or(false),
            // destination strictly ahead of the piece, owner-relative;
            // the pawn capture pattern leans on this
            "forward" => match (ctx.piece, ctx.target) {
                (Some(piece), Some(target)) => is_forward_of(piece, target),
                _ => false,
            },
            _ => false,
        },
    }
}

fn occupant_relation<F>(ctx: &EvalCtx, related: F) -> bool
where
    F: Fn(Color, Color) -> bool,
{
    let Some(piece) = ctx.piece else { return false };
    let Some(target) = ctx.target else { return false };
    match ctx.board.piece_at(target) {
        Some(occupant) => related(piece.owner(), occupant.owner()),
        None => false,
    }
}

fn is_forward_of(piece: &Piece, target: Position) -> bool {
    let delta = target.rank() as isize - piece.pos().rank() as isize;
    match piece.owner() {
        Color::White => delta > 0,
        Color::Black => delta < 0,
    }
}

/// True when every square strictly between `from` and `to` (which must be
/// a straight line) is empty.
pub fn path_clear(board: &Board, from: Position, to: Position) -> bool {
    let Some(unit) = (to - from).to_unit() else {
        return false;
    };
    let mut cursor = from;
    loop {
        cursor = match cursor + unit {
            Some(next) => next,
            None => return false,
        };
        if cursor == to {
            return true;
        }
        if !board.contains(cursor) || !board.is_empty(cursor) {
            return false;
        }
    }
}

pub fn eval_expr(ctx: &EvalCtx, expr: &Expr) -> Value {
    match expr {
        Expr::Int(n) => Value::Int(*n),
        Expr::Str(s) => Value::Str(s.clone()),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Square(pos) => Value::Str(pos.to_algebraic()),
        Expr::List(items) => Value::List(items.iter().map(|e| eval_expr(ctx, e)).collect()),
        Expr::Neg(inner) => match eval_expr(ctx, inner).as_int() {
            Some(n) => Value::Int(-n),
            None => Value::Nil,
        },
        Expr::Binary { op, left, right } => {
            let (Some(l), Some(r)) = (
                eval_expr(ctx, left).as_int(),
                eval_expr(ctx, right).as_int(),
            ) else {
                return Value::Nil;
            };
            match op {
                BinOp::Add => Value::Int(l + r),
                BinOp::Sub => Value::Int(l - r),
                BinOp::Mul => Value::Int(l * r),
                BinOp::Div => {
                    if r == 0 {
                        Value::Nil
                    } else {
                        Value::Int(l / r)
                    }
                }
            }
        }
        Expr::Ident(_) | Expr::Member(_, _) => match expr.as_path() {
            Some(path) => resolve_path(ctx, &path),
            None => Value::Nil,
        },
    }
}

/// Resolve a dotted access path against the evaluation bindings.
fn resolve_path(ctx: &EvalCtx, path: &[String]) -> Value {
    let mut cursor = match root_cursor(ctx, &path[0]) {
        Some(cursor) => cursor,
        None => return Value::Nil,
    };
    for segment in &path[1..] {
        cursor = step(ctx, cursor, segment);
    }
    finish(cursor)
}

enum Cursor<'a> {
    Piece(&'a Piece),
    Map(&'a BTreeMap<String, Value>),
    Event(&'a EventCtx),
    /// `zone.<name>`: membership test of the focus square.
    Zone,
    Val(Value),
}

fn root_cursor<'a>(ctx: &EvalCtx<'a>, root: &str) -> Option<Cursor<'a>> {
    match root {
        "piece" => ctx.piece.map(Cursor::Piece),
        "event" => ctx.event.map(Cursor::Event),
        "state" => Some(Cursor::Map(&ctx.state.custom)),
        "zone" => Some(Cursor::Zone),
        "target" | "destination" => Some(Cursor::Val(
            ctx.target
                .map(|pos| Value::Str(pos.to_algebraic()))
                .unwrap_or(Value::Nil),
        )),
        "to" => Some(Cursor::Val(position_value(
            ctx.event.and_then(|e| e.to),
        ))),
        "from" => Some(Cursor::Val(position_value(
            ctx.event.and_then(|e| e.from),
        ))),
        "captured" => ctx
            .event
            .and_then(|e| e.captured.as_ref())
            .map(Cursor::Piece),
        "current" => Some(Cursor::Val(color_value(ctx.state.current))),
        "opponent" => Some(Cursor::Val(color_value(!ctx.state.current))),
        "halfmove_clock" => Some(Cursor::Val(Value::Int(ctx.state.halfmove_clock as i64))),
        "fullmove" => Some(Cursor::Val(Value::Int(ctx.state.fullmove as i64))),
        "repetition_count" => Some(Cursor::Val(Value::Int(
            ctx.state.repetition_count() as i64
        ))),
        "no_moves" => Some(Cursor::Val(Value::Bool(ctx.no_moves.unwrap_or(false)))),
        _ => None,
    }
}

fn step<'a>(ctx: &EvalCtx<'a>, cursor: Cursor<'a>, field: &str) -> Cursor<'a> {
    match cursor {
        Cursor::Piece(piece) => match field {
            "type" | "kind" => Cursor::Val(Value::Str(piece.kind().to_string())),
            "owner" => Cursor::Val(color_value(piece.owner())),
            "pos" | "square" => Cursor::Val(Value::Str(piece.pos().to_algebraic())),
            "moved" => Cursor::Val(Value::Bool(piece.has_moved())),
            "traits" => Cursor::Val(Value::List(
                piece
                    .traits()
                    .iter()
                    .map(|t| Value::Str(t.clone()))
                    .collect(),
            )),
            "state" => Cursor::Map(piece.state()),
            _ => Cursor::Val(Value::Nil),
        },
        Cursor::Map(map) => Cursor::Val(map.get(field).cloned().unwrap_or(Value::Nil)),
        Cursor::Event(event) => match field {
            "kind" | "type" => Cursor::Val(Value::Str(event.kind.to_string())),
            "piece" => match event.piece.and_then(|id| ctx.board.piece(id)) {
                Some(piece) => Cursor::Piece(piece),
                None => Cursor::Val(Value::Nil),
            },
            "captured" => match event.captured.as_ref() {
                Some(piece) => Cursor::Piece(piece),
                None => Cursor::Val(Value::Nil),
            },
            "from" => Cursor::Val(position_value(event.from)),
            "to" => Cursor::Val(position_value(event.to)),
            _ => Cursor::Val(Value::Nil),
        },
        Cursor::Zone => Cursor::Val(Value::Bool(
            ctx.focus()
                .map_or(false, |pos| ctx.board.in_zone(field, pos)),
        )),
        Cursor::Val(_) => Cursor::Val(Value::Nil),
    }
}

fn finish(cursor: Cursor) -> Value {
    match cursor {
        Cursor::Val(value) => value,
        // a bare `piece` or `event.captured` reads as its type name
        Cursor::Piece(piece) => Value::Str(piece.kind().to_string()),
        Cursor::Map(_) | Cursor::Event(_) | Cursor::Zone => Value::Nil,
    }
}

fn position_value(pos: Option<Position>) -> Value {
    pos.map(|p| Value::Str(p.to_algebraic())).unwrap_or(Value::Nil)
}

fn color_value(color: Color) -> Value {
    Value::Str(match color {
        Color::White => "white".to_string(),
        Color::Black => "black".to_string(),
    })
}

/// Comparisons touching nil are false, including `!=`.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    if left.is_nil() || right.is_nil() {
        return false;
    }
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt | CmpOp::Gt | CmpOp::Le | CmpOp::Ge => {
            let (Some(l), Some(r)) = (left.as_int(), right.as_int()) else {
                return false;
            };
            match op {
                CmpOp::Lt => l < r,
                CmpOp::Gt => l > r,
                CmpOp::Le => l <= r,
                CmpOp::Ge => l >= r,
                _ => unreachable!(),
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_int(), right.as_int()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Resolve an expression to a board square. Square literals, event
/// bindings (`to`, `from`), piece references and algebraic strings all
/// work; anything else is `None`.
pub fn eval_position(ctx: &EvalCtx, expr: &Expr) -> Option<Position> {
    if let Expr::Square(pos) = expr {
        return Some(*pos);
    }
    if let Some(path) = expr.as_path() {
        match path[0].as_str() {
            "piece" if path.len() == 1 => return ctx.piece.map(|p| p.pos()),
            "to" if path.len() == 1 => return ctx.event.and_then(|e| e.to),
            "from" if path.len() == 1 => return ctx.event.and_then(|e| e.from),
            "target" | "destination" if path.len() == 1 => return ctx.target,
            _ => {}
        }
    }
    match eval_expr(ctx, expr) {
        Value::Str(s) => Position::try_from_string(&s),
        _ => None,
    }
}

/// Resolve an expression to a player (`piece.owner`, `"white"`, ...).
pub fn eval_color(ctx: &EvalCtx, expr: &Expr) -> Option<Color> {
    match eval_expr(ctx, expr) {
        Value::Str(s) => Color::try_from_string(&s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PieceId;
    use crate::model::standard_chess;

    fn setup() -> (Board, GameState) {
        let mut board = Board::standard();
        board
            .place(Piece::new(
                PieceId::new(1),
                "Rook",
                Color::White,
                Position::from_string("a1"),
            ))
            .unwrap();
        board
            .place(Piece::new(
                PieceId::new(2),
                "Pawn",
                Color::Black,
                Position::from_string("a5"),
            ))
            .unwrap();
        (board, GameState::initial())
    }

    #[test]
    fn test_empty_enemy_friend() {
        let (board, state) = setup();
        let game = standard_chess();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let ctx = EvalCtx::new(game, &board, &state).with_piece(rook);

        let at = |pos: &str| ctx.with_target(Position::from_string(pos));
        assert!(eval_condition(&at("a3"), &ConditionExpr::Empty));
        assert!(eval_condition(&at("a5"), &ConditionExpr::Enemy));
        assert!(!eval_condition(&at("a5"), &ConditionExpr::Friend));
        assert!(!eval_condition(&at("a5"), &ConditionExpr::Empty));
    }

    #[test]
    fn test_clear_path() {
        let (board, state) = setup();
        let game = standard_chess();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let ctx = EvalCtx::new(game, &board, &state).with_piece(rook);
        // a1-a4: a2, a3 empty
        assert!(eval_condition(
            &ctx.with_target(Position::from_string("a4")),
            &ConditionExpr::Clear
        ));
        // a1-a8 passes through the black pawn on a5
        assert!(!eval_condition(
            &ctx.with_target(Position::from_string("a8")),
            &ConditionExpr::Clear
        ));
        // not a straight line
        assert!(!eval_condition(
            &ctx.with_target(Position::from_string("b3")),
            &ConditionExpr::Clear
        ));
    }

    #[test]
    fn test_state_path_and_nil_comparisons() {
        let (board, mut state) = setup();
        state.set_custom("checkCount", Value::Int(2));
        let game = standard_chess();
        let ctx = EvalCtx::new(game, &board, &state);

        let reached = ConditionExpr::Compare {
            op: CmpOp::Ge,
            left: Expr::Member(
                Box::new(Expr::Ident("state".to_string())),
                "checkCount".to_string(),
            ),
            right: Expr::Int(3),
        };
        assert!(!eval_condition(&ctx, &reached));
        // unknown keys are nil and all comparisons against nil fail
        let unknown = ConditionExpr::Compare {
            op: CmpOp::Ne,
            left: Expr::Member(
                Box::new(Expr::Ident("state".to_string())),
                "missing".to_string(),
            ),
            right: Expr::Int(0),
        };
        assert!(!eval_condition(&ctx, &unknown));
    }

    #[test]
    fn test_piece_member_access() {
        let (board, state) = setup();
        let game = standard_chess();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let ctx = EvalCtx::new(game, &board, &state).with_piece(rook);
        let owner = Expr::Member(Box::new(Expr::Ident("piece".to_string())), "owner".to_string());
        assert_eq!(eval_expr(&ctx, &owner), Value::Str("white".to_string()));
        let kind = Expr::Member(Box::new(Expr::Ident("piece".to_string())), "type".to_string());
        assert_eq!(eval_expr(&ctx, &kind), Value::Str("Rook".to_string()));
    }

    #[test]
    fn test_event_captured_access() {
        let (board, state) = setup();
        let game = standard_chess();
        let victim = Piece::new(
            PieceId::new(9),
            "Queen",
            Color::Black,
            Position::from_string("d4"),
        );
        let event = EventCtx {
            kind: crate::model::EventKind::Capture,
            piece: Some(PieceId::new(1)),
            from: Some(Position::from_string("a1")),
            to: Some(Position::from_string("d4")),
            captured: Some(victim),
        };
        let ctx = EvalCtx::new(game, &board, &state).with_event(&event);
        let expr = Expr::Member(
            Box::new(Expr::Member(
                Box::new(Expr::Ident("event".to_string())),
                "captured".to_string(),
            )),
            "type".to_string(),
        );
        assert_eq!(eval_expr(&ctx, &expr), Value::Str("Queen".to_string()));
    }

    #[test]
    fn test_forward_predicate() {
        let (board, state) = setup();
        let game = standard_chess();
        let rook = board.piece(PieceId::new(1)).unwrap();
        let forward = ConditionExpr::Custom {
            name: "forward".to_string(),
            args: Vec::new(),
        };
        let ctx = EvalCtx::new(game, &board, &state).with_piece(rook);
        assert!(eval_condition(
            &ctx.with_target(Position::from_string("b2")),
            &forward
        ));
        assert!(!eval_condition(
            &ctx.with_target(Position::from_string("b1")),
            &forward
        ));
    }

    #[test]
    fn test_arithmetic() {
        let (board, state) = setup();
        let game = standard_chess();
        let ctx = EvalCtx::new(game, &board, &state);
        let expr = Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::Int(2)),
            right: Box::new(Expr::Int(3)),
        };
        assert_eq!(eval_expr(&ctx, &expr), Value::Int(5));
        let div0 = Expr::Binary {
            op: BinOp::Div,
            left: Box::new(Expr::Int(1)),
            right: Box::new(Expr::Int(0)),
        };
        assert_eq!(eval_expr(&ctx, &div0), Value::Nil);
    }

    #[test]
    fn test_eval_position() {
        let (board, state) = setup();
        let game = standard_chess();
        let event = EventCtx {
            kind: crate::model::EventKind::Move,
            piece: None,
            from: Some(Position::from_string("e2")),
            to: Some(Position::from_string("e4")),
            captured: None,
        };
        let ctx = EvalCtx::new(game, &board, &state).with_event(&event);
        assert_eq!(
            eval_position(&ctx, &Expr::Ident("to".to_string())),
            Some(Position::from_string("e4"))
        );
        assert_eq!(
            eval_position(&ctx, &Expr::Square(Position::from_string("c3"))),
            Some(Position::from_string("c3"))
        );
        assert_eq!(
            eval_position(&ctx, &Expr::Str("d5".to_string())),
            Some(Position::from_string("d5"))
        );
    }
}
