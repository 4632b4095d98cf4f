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
use std::ops::Not;
use strum_macros::Display;
use strum_macros::EnumIter;

use super::position::Position;

/// Trait names the engine gives built-in semantics to. Variants are free
/// to declare additional traits; those are inert flags the conditions and
/// scripts can still read.
pub mod traits {
    /// Check/checkmate target.
    pub const ROYAL: &str = "royal";
    /// Skips path-clear checks when sliding.
    pub const JUMP: &str = "jump";
    /// Ignores blocking effects on the destination square.
    pub const PHASE: &str = "phase";
    /// Promotes on reaching the far rank (or a promotion zone).
    pub const PROMOTE: &str = "promote";
    /// May castle (standard chess king).
    pub const CASTLE: &str = "castle";
    /// Participates in en-passant (standard chess pawn).
    pub const EN_PASSANT: &str = "ep";
}

#[derive(Debug, Serialize, Deserialize, Display, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub const fn to_index(&self) -> usize {
        *self as usize
    }

    pub fn try_from_string(name: &str) -> Option<Self> {
        match name {
            "white" | "White" => Some(Color::White),
            "black" | "Black" => Some(Color::Black),
            _ => None,
        }
    }
}

impl Not for Color {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

/// A free-form value stored in piece or game state. Unknown keys read as
/// `Nil`, which compares false in every comparison.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    #[inline]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Process-unique piece identity. Allocated by the engine's monotonic
/// counter; never reused, even after capture.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct PieceId(u64);

impl PieceId {
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A piece on the board. The type is an open string (variants declare their
/// own); `traits` alter engine behavior and `state` is a free-form map the
/// DSL's conditions, triggers and scripts read and write.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Piece {
    id: PieceId,
    kind: String,
    owner: Color,
    pos: Position,
    traits: BTreeSet<String>,
    state: BTreeMap<String, Value>,
}

impl Piece {
    pub fn new(id: PieceId, kind: impl Into<String>, owner: Color, pos: Position) -> Self {
        Self {
            id,
            kind: kind.into(),
            owner,
            pos,
            traits: BTreeSet::new(),
            state: BTreeMap::new(),
        }
    }

    pub fn with_traits<I, S>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.traits.extend(traits.into_iter().map(Into::into));
        self
    }

    pub fn with_state<I, S>(mut self, state: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        self.state
            .extend(state.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    #[inline]
    pub fn id(&self) -> PieceId {
        self.id
    }
    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }
    #[inline]
    pub fn owner(&self) -> Color {
        self.owner
    }
    #[inline]
    pub fn pos(&self) -> Position {
        self.pos
    }
    #[inline]
    pub fn traits(&self) -> &BTreeSet<String> {
        &self.traits
    }
    #[inline]
    pub fn state(&self) -> &BTreeMap<String, Value> {
        &self.state
    }

    #[inline]
    pub fn set_pos(&mut self, pos: Position) {
        self.pos = pos;
    }

    #[inline]
    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    #[inline]
    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.contains(name)
    }

    #[inline]
    pub fn add_trait(&mut self, name: impl Into<String>) {
        self.traits.insert(name.into());
    }

    #[inline]
    pub fn is_royal(&self) -> bool {
        self.has_trait(traits::ROYAL)
    }

    /// Unknown keys read as `Nil`.
    #[inline]
    pub fn get_state(&self, key: &str) -> Value {
        self.state.get(key).cloned().unwrap_or(Value::Nil)
    }

    #[inline]
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.state
    }

    /// Whether the piece has moved yet (tracked in `state.moved`).
    #[inline]
    pub fn has_moved(&self) -> bool {
        self.get_state("moved").truthy()
    }

    pub fn mark_moved(&mut self) {
        self.state.insert("moved".to_string(), Value::Bool(true));
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} at {}", self.owner, self.kind, self.pos)
    }
}
