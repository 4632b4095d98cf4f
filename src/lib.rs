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

//! A language and engine for chess variants.
//!
//! A variant is written as text: board shape, piece movement patterns,
//! square effects, event triggers, victory and draw conditions, and
//! optional imperative scripts. [`compile`] turns that text into an
//! executable [`Game`]; an [`Engine`] then plays it: generating legal
//! moves, validating and applying them, firing triggers, and detecting
//! terminal conditions.
//!
//! ```no_run
//! use chesslang::{compile, Engine, Position};
//!
//! let game = compile(
//!     "game: KingOfTheHill\n\
//!      extends: \"Standard Chess\"\n\
//!      board:\n    zones:\n        hill: [d4, d5, e4, e5]\n\
//!      trigger hill_victory {\n\
//!          on: move\n\
//!          when: piece.type == \"King\" and in_zone hill\n\
//!          do:\n        win piece.owner\n\
//!      }\n",
//! )?;
//! let mut engine = Engine::new(game)?;
//! let mv = engine
//!     .find_move(Position::from_string("e2"), Position::from_string("e4"))
//!     .unwrap();
//! engine.make_move(&mv)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::Result;

pub mod board;
pub mod engine;
pub mod game;
pub mod lang;
pub mod model;

pub use board::{Blocks, Board, Color, Dir, Effect, EffectId, Offset, Piece, PieceId, Position};
pub use engine::{
    Engine, EngineError, EngineOptions, EventCtx, EventRecord, GameState, Move, MoveKind,
    MoveOutcome, PendingTriggerInfo, ScriptError,
};
pub use game::{DrawReason, GameResult, WinReason};
pub use lang::{parse, GameDecl, LexError, ParseError, SourceLocation};
pub use model::{
    compile_with_base, standard_chess, CompileError, EventKind, Game, PieceDef, Rules,
    STANDARD_CHESS_NAME,
};

/// Parse and lower a variant description in one step.
pub fn compile(source: &str) -> Result<Game> {
    let decl = lang::parse(source)?;
    let game = model::compile(&decl)?;
    Ok(game)
}
