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

//! Abstract syntax for the three surface layers: configuration sections,
//! the declarative piece/trigger DSL, and verbatim script blocks. The
//! parser builds these; the compiler lowers them into a resolved
//! [`crate::model::Game`].

use serde::{Deserialize, Serialize};

use super::token::SourceLocation;
use crate::board::{Color, Dir, Position, Value};

/// One parsed source file. Section order is free; singleton sections may
/// appear at most once.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct GameDecl {
    pub name: Option<String>,
    pub extends: Option<String>,
    pub board: Option<BoardDecl>,
    /// `pieces:` section: FEN symbol -> piece type name.
    pub symbols: Vec<(String, String)>,
    pub pieces: Vec<PieceDecl>,
    pub effects: Vec<EffectDecl>,
    pub triggers: Vec<TriggerDecl>,
    pub setup: Option<SetupDecl>,
    pub victory: Vec<ConditionDecl>,
    pub draw: Vec<ConditionDecl>,
    pub rules: Vec<(String, bool)>,
    pub patterns: Vec<(String, PatternExpr)>,
    pub scripts: Vec<ScriptDecl>,
}

/// Dimensions are optional so a variant can declare zones while keeping
/// its base game's geometry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BoardDecl {
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub zones: Vec<(String, Vec<Position>)>,
    pub loc: SourceLocation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PieceDecl {
    pub name: String,
    pub move_pattern: Option<PatternExpr>,
    pub capture: Option<CaptureDecl>,
    pub traits: Vec<String>,
    pub state: Vec<(String, Value)>,
    pub promote_to: Vec<String>,
    pub value: Option<i64>,
    pub triggers: Vec<TriggerDecl>,
    pub loc: SourceLocation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum CaptureDecl {
    /// `capture: =move`
    Same,
    /// `capture: none`
    None,
    Pattern(PatternExpr),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EffectDecl {
    pub name: String,
    pub blocks: Option<String>,
    pub duration: Option<i64>,
    pub loc: SourceLocation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TriggerDecl {
    pub name: String,
    pub on: Option<String>,
    pub when: Option<ConditionExpr>,
    pub actions: Vec<ActionDecl>,
    pub optional: bool,
    pub description: Option<String>,
    pub loc: SourceLocation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SetupDecl {
    /// Direct placements (used when the variant does not inherit a setup).
    pub placements: Vec<PlacementDecl>,
    pub fen: Option<String>,
    /// `add:` placements appended to the base setup.
    pub add: Vec<PlacementDecl>,
    /// `replace:` type rewrites applied to the base setup.
    pub replace: Vec<(String, String)>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlacementDecl {
    pub owner: Color,
    pub kind: String,
    pub squares: Vec<Position>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Add,
    Replace,
    Remove,
}

/// One `name: condition` line in a `victory:` or `draw:` block. `remove`
/// entries carry no condition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConditionDecl {
    pub name: String,
    pub condition: Option<ConditionExpr>,
    pub winner: Option<PlayerRef>,
    pub action: MergeAction,
    pub loc: SourceLocation,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScriptDecl {
    pub source: String,
    pub loc: SourceLocation,
}

// ---- pattern expressions ----

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PatternExpr {
    Step { dir: Dir, dist: i64 },
    Slide { dir: Dir },
    Leap { dx: i64, dy: i64 },
    Rider { dx: i64, dy: i64 },
    Hop { dir: Dir },
    Named(String),
    Where(Box<PatternExpr>, ConditionExpr),
    Or(Vec<PatternExpr>),
    And(Vec<PatternExpr>),
}

// ---- conditions and expressions ----

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Str(String),
    Bool(bool),
    Square(Position),
    List(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
}

impl Expr {
    /// Flatten a pure access path (`piece.state.x`) to its segments.
    pub fn as_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::Ident(name) => Some(vec![name.clone()]),
            Expr::Member(base, field) => {
                let mut path = base.as_path()?;
                path.push(field.clone());
                Some(path)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ConditionExpr {
    Empty,
    Enemy,
    Friend,
    Check,
    FirstMove,
    Clear,
    InZone(String),
    Not(Box<ConditionExpr>),
    And(Box<ConditionExpr>, Box<ConditionExpr>),
    Or(Box<ConditionExpr>, Box<ConditionExpr>),
    Compare {
        op: CmpOp,
        left: Expr,
        right: Expr,
    },
    /// Truthiness of a bare expression (`piece.state.armed`).
    Expr(Expr),
    /// Builtin or engine-registered predicate (`no_moves`).
    Custom {
        name: String,
        args: Vec<Expr>,
    },
}

// ---- trigger actions ----

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Assign,
    Inc,
    Dec,
}

/// Where a removal applies: one square or a range.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum TargetDecl {
    At(Expr),
    Radius { n: i64, from: Expr },
    Adjacent { to: Expr },
    InZone(String),
    Line { dir: Dir, from: Expr },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum FilterDecl {
    TypeIn(Vec<String>),
    TypeNotIn(Vec<String>),
    Enemy,
    Friend,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PlayerRef {
    White,
    Black,
    Current,
    Opponent,
    Expr(Expr),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ActionDecl {
    Set {
        path: Vec<String>,
        op: SetOp,
        value: Expr,
    },
    Remove {
        target: TargetDecl,
        filter: Option<FilterDecl>,
    },
    Create {
        kind: String,
        at: Expr,
        owner: PlayerRef,
    },
    MovePiece {
        piece: Expr,
        to: Expr,
    },
    Win(PlayerRef),
    Draw(Option<String>),
    Mark {
        at: Expr,
        effect: String,
    },
    Cancel,
}
