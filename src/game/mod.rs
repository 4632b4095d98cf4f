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

use crate::board::Color;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum GameResult {
    Win(Color, WinReason),
    Draw(DrawReason),
}

impl GameResult {
    pub fn winner(&self) -> Option<Color> {
        match self {
            GameResult::Win(color, _) => Some(*color),
            GameResult::Draw(_) => None,
        }
    }
}

/// Why a side won. Variant victory conditions and `win` actions carry the
/// declared name, so UIs can say "hill_victory" instead of "checkmate".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum WinReason {
    /// A victory condition matched, by name (`checkmate`, `hill_victory`).
    Condition(String),
    /// A trigger or script executed a `win` action, by trigger name.
    Action(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum DrawReason {
    /// A draw condition matched, by name (`stalemate`, `fifty_moves`).
    Condition(String),
    /// A trigger or script executed a `draw` action, with its reason.
    Action(Option<String>),
}
