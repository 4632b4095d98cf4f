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

//! The compiled game model.
//!
//! A [`Game`] is what the compiler produces from a parsed declaration:
//! piece definitions with canonical movement patterns, effect and trait
//! tables, triggers in firing order, a flattened setup, merged victory
//! and draw conditions, and rule flags. Compiled games are immutable and
//! may be shared by any number of engines.

mod compiler;
mod standard;

pub use compiler::*;
pub use standard::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::EnumIter;

use crate::board::{Blocks, Color, Position, Value};
use crate::lang::{ActionDecl, ConditionExpr, PatternExpr, PlayerRef};

/// Engine events triggers can subscribe to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum EventKind {
    Move,
    Capture,
    Check,
    TurnStart,
    TurnEnd,
    Place,
    Remove,
}

impl EventKind {
    pub fn try_from_str(name: &str) -> Option<Self> {
        use EventKind::*;
        match name {
            "move" => Some(Move),
            "capture" => Some(Capture),
            "check" => Some(Check),
            "turn_start" => Some(TurnStart),
            "turn_end" => Some(TurnEnd),
            "place" => Some(Place),
            "remove" => Some(Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use EventKind::*;
        match self {
            Move => "move",
            Capture => "capture",
            Check => "check",
            TurnStart => "turn_start",
            TurnEnd => "turn_end",
            Place => "place",
            Remove => "remove",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a piece captures, relative to its movement.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub enum CaptureRule {
    /// Use the move pattern, requiring an enemy at the destination.
    #[default]
    Same,
    /// The piece cannot capture at all.
    None,
    Pattern(PatternExpr),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PieceDef {
    pub name: String,
    pub move_pattern: PatternExpr,
    pub capture: CaptureRule,
    pub traits: Vec<String>,
    pub initial_state: BTreeMap<String, Value>,
    pub promote_to: Vec<String>,
    pub value: Option<i64>,
}

impl PieceDef {
    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.iter().any(|t| t == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EffectDef {
    pub name: String,
    pub blocks: Blocks,
    pub duration: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TraitDef {
    pub name: String,
    /// Whether the engine gives this trait built-in semantics.
    pub builtin: bool,
}

/// A trigger in firing position. Triggers declared inside a `piece` block
/// are scoped to that piece type; game-level triggers fire for any piece.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub on: EventKind,
    pub when: Option<ConditionExpr>,
    pub actions: Vec<ActionDecl>,
    pub optional: bool,
    pub description: Option<String>,
    pub piece_kind: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Placement {
    pub owner: Color,
    pub kind: String,
    pub pos: Position,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VictoryDef {
    pub name: String,
    pub condition: ConditionExpr,
    pub winner: Option<PlayerRef>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DrawDef {
    pub name: String,
    pub condition: ConditionExpr,
}

/// Standard-chess rule toggles. Variants inherit these from their base
/// unless a `rules:` section overrides them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    pub castling: bool,
    pub en_passant: bool,
    pub promotion: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            castling: true,
            en_passant: true,
            promotion: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BoardConfig {
    pub width: usize,
    pub height: usize,
    pub zones: BTreeMap<String, Vec<Position>>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
            zones: BTreeMap::new(),
        }
    }
}

/// A fully resolved game definition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Game {
    pub name: String,
    pub board: BoardConfig,
    pub pieces: BTreeMap<String, PieceDef>,
    pub effects: BTreeMap<String, EffectDef>,
    pub traits: BTreeMap<String, TraitDef>,
    pub triggers: Vec<Trigger>,
    pub setup: Vec<Placement>,
    pub victory: Vec<VictoryDef>,
    pub draw: Vec<DrawDef>,
    pub rules: Rules,
    pub scripts: Vec<String>,
    /// FEN symbol -> piece type, for setup and debugging dumps.
    pub symbols: BTreeMap<String, String>,
}

impl Game {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            board: BoardConfig::default(),
            pieces: BTreeMap::new(),
            effects: BTreeMap::new(),
            traits: BTreeMap::new(),
            triggers: Vec::new(),
            setup: Vec::new(),
            victory: Vec::new(),
            draw: Vec::new(),
            rules: Rules::default(),
            scripts: Vec::new(),
            symbols: BTreeMap::new(),
        }
    }

    pub fn piece_def(&self, kind: &str) -> Option<&PieceDef> {
        self.pieces.get(kind)
    }

    /// Reverse symbol lookup: the (uncolored) FEN letter for a type.
    pub fn symbol_for(&self, kind: &str) -> Option<char> {
        self.symbols
            .iter()
            .find(|(_, k)| k.as_str() == kind)
            .and_then(|(symbol, _)| symbol.chars().next())
    }
}
