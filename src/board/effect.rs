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
use strum_macros::EnumIter;

use super::piece::Color;

/// Who an effect keeps off its square.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum Blocks {
    #[default]
    None,
    All,
    Enemy,
    Friend,
}

impl Blocks {
    pub fn try_from_string(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Blocks::None),
            "all" => Some(Blocks::All),
            "enemy" => Some(Blocks::Enemy),
            "friend" => Some(Blocks::Friend),
            _ => None,
        }
    }

    /// Whether a piece owned by `mover` is blocked by an effect owned by
    /// `owner` (if any).
    pub fn blocks(&self, owner: Option<Color>, mover: Color) -> bool {
        match self {
            Blocks::None => false,
            Blocks::All => true,
            Blocks::Enemy => owner.map_or(false, |o| o != mover),
            Blocks::Friend => owner.map_or(false, |o| o == mover),
        }
    }
}

impl fmt::Display for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Blocks::None => "none",
            Blocks::All => "all",
            Blocks::Enemy => "enemy",
            Blocks::Friend => "friend",
        };
        write!(f, "{name}")
    }
}

#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct EffectId(u64);

impl EffectId {
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

/// A marker attached to a square. Created by the `mark` action; ticks down
/// once per turn of its owner (if it has a duration) and disappears at zero.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Effect {
    id: EffectId,
    kind: String,
    blocks: Blocks,
    owner: Option<Color>,
    duration: Option<u32>,
}

impl Effect {
    pub fn new(id: EffectId, kind: impl Into<String>, blocks: Blocks) -> Self {
        Self {
            id,
            kind: kind.into(),
            blocks,
            owner: None,
            duration: None,
        }
    }

    pub fn with_owner(mut self, owner: Color) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_duration(mut self, turns: u32) -> Self {
        self.duration = Some(turns);
        self
    }

    #[inline]
    pub fn id(&self) -> EffectId {
        self.id
    }
    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }
    #[inline]
    pub fn blocks(&self) -> Blocks {
        self.blocks
    }
    #[inline]
    pub fn owner(&self) -> Option<Color> {
        self.owner
    }
    #[inline]
    pub fn duration(&self) -> Option<u32> {
        self.duration
    }

    #[inline]
    pub fn blocks_mover(&self, mover: Color) -> bool {
        self.blocks.blocks(self.owner, mover)
    }

    /// Tick the duration down. Returns true when the effect has expired.
    pub fn decrement(&mut self) -> bool {
        match self.duration {
            Some(0) | Some(1) => {
                self.duration = Some(0);
                true
            }
            Some(n) => {
                self.duration = Some(n - 1);
                false
            }
            None => false,
        }
    }
}
