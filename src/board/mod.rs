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

//! Board model for variant chess games.
//!
//! A _board_ is a rectangular grid of squares of arbitrary size (up to
//! 26 files by 99 ranks). Unlike a fixed 8x8 board there is no bitboard
//! representation; squares are cells holding an optional piece id and a
//! list of effect ids, with the pieces and effects themselves living in
//! id-indexed slabs on the board. That keeps hypothetical-move cloning
//! (used for check detection) a flat copy.
//!
//! Key abstractions:
//!
//! * A `Position` is a file/rank coordinate pair, 0-indexed from White's
//!   queenside corner (`a1`). Algebraic names run `a1..z99`.
//! * An `Offset` is a displacement between squares; a `Dir` is a movement
//!   direction, possibly owner-relative (`forward` flips for Black).
//! * A `Piece` has an open-ended type name, an owner, a trait set that
//!   alters engine behavior (`royal`, `jump`, `phase`, ...) and a
//!   free-form state map for variant rules to use.
//! * An `Effect` is a square-attached marker that can block movement by
//!   ownership (`none`/`all`/`enemy`/`friend`) and may expire after a
//!   number of turns.
//! * A _zone_ is a named set of squares (`hill`, `white_promotion`, ...)
//!   queried by conditions and victory rules.

mod effect;
mod grid;
mod piece;
mod position;

pub use effect::*;
pub use grid::*;
pub use piece::*;
pub use position::*;
