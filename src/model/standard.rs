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

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use super::{BoardConfig, CaptureRule, DrawDef, Game, PieceDef, Rules, TraitDef, VictoryDef};
use crate::board::{traits, Board, Color, Dir};
use crate::lang::{CmpOp, ConditionExpr, Expr, PatternExpr, PlayerRef};

pub const STANDARD_CHESS_NAME: &str = "Standard Chess";

const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

/// The built-in base game most variants extend. Constructed once;
/// `extends: "Standard Chess"` deep-copies it.
static STANDARD_CHESS: Lazy<Game> = Lazy::new(build_standard_chess);

pub fn standard_chess() -> &'static Game {
    &STANDARD_CHESS
}

/// Resolve an `extends:` reference to a built-in base game.
pub fn base_game(name: &str) -> Option<&'static Game> {
    match name {
        STANDARD_CHESS_NAME | "StandardChess" | "standard_chess" | "standard" => {
            Some(standard_chess())
        }
        _ => None,
    }
}

fn build_standard_chess() -> Game {
    let mut game = Game::empty(STANDARD_CHESS_NAME);
    game.board = BoardConfig {
        width: 8,
        height: 8,
        zones: BTreeMap::new(),
    };
    game.rules = Rules::default();

    for (symbol, kind) in [
        ("K", "King"),
        ("Q", "Queen"),
        ("R", "Rook"),
        ("B", "Bishop"),
        ("N", "Knight"),
        ("P", "Pawn"),
    ] {
        game.symbols.insert(symbol.to_string(), kind.to_string());
    }

    for name in [
        traits::ROYAL,
        traits::JUMP,
        traits::PHASE,
        traits::PROMOTE,
        traits::CASTLE,
        traits::EN_PASSANT,
    ] {
        game.traits.insert(
            name.to_string(),
            TraitDef {
                name: name.to_string(),
                builtin: true,
            },
        );
    }

    game.pieces.insert("King".to_string(), king());
    game.pieces.insert("Queen".to_string(), queen());
    game.pieces.insert("Rook".to_string(), rook());
    game.pieces.insert("Bishop".to_string(), bishop());
    game.pieces.insert("Knight".to_string(), knight());
    game.pieces.insert("Pawn".to_string(), pawn());

    game.setup = startpos_placements(&game);

    // Checkmate and stalemate are ordinary conditions here, so variant
    // conditions merge and OR-combine with them uniformly.
    game.victory.push(VictoryDef {
        name: "checkmate".to_string(),
        condition: ConditionExpr::And(
            Box::new(ConditionExpr::Check),
            Box::new(no_moves()),
        ),
        winner: Some(PlayerRef::Opponent),
    });
    game.draw.push(DrawDef {
        name: "stalemate".to_string(),
        condition: ConditionExpr::And(
            Box::new(ConditionExpr::Not(Box::new(ConditionExpr::Check))),
            Box::new(no_moves()),
        ),
    });
    game.draw.push(DrawDef {
        name: "fifty_moves".to_string(),
        condition: ConditionExpr::Compare {
            op: CmpOp::Ge,
            left: Expr::Ident("halfmove_clock".to_string()),
            right: Expr::Int(100),
        },
    });
    game.draw.push(DrawDef {
        name: "threefold_repetition".to_string(),
        condition: ConditionExpr::Compare {
            op: CmpOp::Ge,
            left: Expr::Ident("repetition_count".to_string()),
            right: Expr::Int(3),
        },
    });

    game
}

fn no_moves() -> ConditionExpr {
    ConditionExpr::Custom {
        name: "no_moves".to_string(),
        args: Vec::new(),
    }
}

fn king() -> PieceDef {
    PieceDef {
        name: "King".to_string(),
        move_pattern: PatternExpr::Step {
            dir: Dir::Any,
            dist: 1,
        },
        capture: CaptureRule::Same,
        traits: vec![traits::ROYAL.to_string(), traits::CASTLE.to_string()],
        initial_state: BTreeMap::new(),
        promote_to: Vec::new(),
        value: None,
    }
}

fn queen() -> PieceDef {
    simple_slider("Queen", Dir::Any, 9)
}

fn rook() -> PieceDef {
    simple_slider("Rook", Dir::Orthogonal, 5)
}

fn bishop() -> PieceDef {
    simple_slider("Bishop", Dir::Diagonal, 3)
}

fn simple_slider(name: &str, dir: Dir, value: i64) -> PieceDef {
    PieceDef {
        name: name.to_string(),
        move_pattern: PatternExpr::Slide { dir },
        capture: CaptureRule::Same,
        traits: Vec::new(),
        initial_state: BTreeMap::new(),
        promote_to: Vec::new(),
        value: Some(value),
    }
}

fn knight() -> PieceDef {
    PieceDef {
        name: "Knight".to_string(),
        move_pattern: PatternExpr::Leap { dx: 1, dy: 2 },
        capture: CaptureRule::Same,
        traits: vec![traits::JUMP.to_string()],
        initial_state: BTreeMap::new(),
        promote_to: Vec::new(),
        value: Some(3),
    }
}

/// Pawn movement is the one genuinely irregular piece: a forward step,
/// a first-move double step that needs a clear path, and diagonal-forward
/// captures. Double-advance bookkeeping and en passant live in the engine,
/// gated by the `ep` trait and the `en_passant` rule flag.
fn pawn() -> PieceDef {
    let single = PatternExpr::Step {
        dir: Dir::Forward,
        dist: 1,
    };
    let double = PatternExpr::Where(
        Box::new(PatternExpr::Step {
            dir: Dir::Forward,
            dist: 2,
        }),
        ConditionExpr::And(
            Box::new(ConditionExpr::FirstMove),
            Box::new(ConditionExpr::Clear),
        ),
    );
    let capture = PatternExpr::Where(
        Box::new(PatternExpr::Step {
            dir: Dir::Diagonal,
            dist: 1,
        }),
        ConditionExpr::Custom {
            name: "forward".to_string(),
            args: Vec::new(),
        },
    );
    PieceDef {
        name: "Pawn".to_string(),
        move_pattern: PatternExpr::Or(vec![single, double]),
        capture: CaptureRule::Pattern(capture),
        traits: vec![traits::PROMOTE.to_string(), traits::EN_PASSANT.to_string()],
        initial_state: BTreeMap::new(),
        promote_to: vec![
            "Queen".to_string(),
            "Rook".to_string(),
            "Bishop".to_string(),
            "Knight".to_string(),
        ],
        value: Some(1),
    }
}

fn startpos_placements(game: &Game) -> Vec<super::Placement> {
    Board::parse_fen(STARTPOS_FEN)
        .expect("startpos fen is well formed")
        .into_iter()
        .map(|(c, pos)| {
            let owner = if c.is_ascii_uppercase() {
                Color::White
            } else {
                Color::Black
            };
            let kind = game
                .symbols
                .get(&c.to_ascii_uppercase().to_string())
                .expect("startpos uses known symbols")
                .clone();
            super::Placement { owner, kind, pos }
        })
        .collect()
}
