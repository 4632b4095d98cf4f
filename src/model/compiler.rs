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

use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use super::{
    base_game, CaptureRule, EffectDef, EventKind, Game, PieceDef, Placement, Trigger, TraitDef,
    VictoryDef, DrawDef,
};
use crate::board::{Blocks, Board, Color, Position};
use crate::engine::script::parse_program;
use crate::lang::{
    CaptureDecl, ConditionDecl, GameDecl, MergeAction, PatternExpr, PieceDecl, SourceLocation,
    TriggerDecl,
};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Unknown base game {0:?}")]
    UnknownBase(String),
    #[error("Duplicate piece {name:?} at {loc}")]
    DuplicatePiece { name: String, loc: SourceLocation },
    #[error("Piece {name:?} has no move pattern ({loc})")]
    MissingMove { name: String, loc: SourceLocation },
    #[error("Unknown pattern name {name:?} referenced from {context:?}")]
    UnknownPattern { name: String, context: String },
    #[error("Pattern {0:?} is defined in terms of itself")]
    RecursivePattern(String),
    #[error("Bad leap offsets ({dx}, {dy}) in {context:?}: at least one must be non-zero")]
    BadLeap { dx: i64, dy: i64, context: String },
    #[error("Bad step distance {dist} in {context:?}")]
    BadDistance { dist: i64, context: String },
    #[error("Unknown event {event:?} in trigger {trigger:?} at {loc}")]
    UnknownEvent {
        event: String,
        trigger: String,
        loc: SourceLocation,
    },
    #[error("Trigger {0:?} has no 'on:' event ({1})")]
    MissingEvent(String, SourceLocation),
    #[error("Unknown blocks policy {policy:?} in effect {effect:?} at {loc}")]
    BadBlocks {
        policy: String,
        effect: String,
        loc: SourceLocation,
    },
    #[error("Board size {0}x{1} out of range (width 1..=26, height 1..=99)")]
    BadBoardSize(usize, usize),
    #[error("Zone {zone:?} square {pos} is off the {width}x{height} board")]
    ZoneOffBoard {
        zone: String,
        pos: Position,
        width: usize,
        height: usize,
    },
    #[error("Setup places unknown piece type {0:?}")]
    UnknownPieceType(String),
    #[error("Setup placement {pos} is off the {width}x{height} board")]
    PlacementOffBoard {
        pos: Position,
        width: usize,
        height: usize,
    },
    #[error("Unknown symbol {0:?} in setup fen")]
    UnknownFenSymbol(char),
    #[error("Malformed setup fen: {0}")]
    BadSetupFen(String),
    #[error("Unknown rule flag {0:?}")]
    UnknownRule(String),
    #[error("Invalid script: {0}")]
    BadScript(String),
}

use CompileError::*;

/// Lower a parsed declaration into a resolved game, resolving `extends:`
/// against the built-in base registry.
pub fn compile(decl: &GameDecl) -> Result<Game, CompileError> {
    let base = match &decl.extends {
        Some(name) => Some(base_game(name).ok_or_else(|| UnknownBase(name.clone()))?),
        None => None,
    };
    compile_with_base(decl, base)
}

/// Lower a parsed declaration onto an explicit base game (or none).
pub fn compile_with_base(decl: &GameDecl, base: Option<&Game>) -> Result<Game, CompileError> {
    let mut game = match base {
        Some(base) => base.clone(),
        None => Game::empty(""),
    };
    if let Some(name) = &decl.name {
        game.name = name.clone();
    }

    // Declared dimensions override the base's; declared zones replace
    // the base's zone table.
    if let Some(board) = &decl.board {
        if let Some(width) = board.width {
            game.board.width = width;
        }
        if let Some(height) = board.height {
            game.board.height = height;
        }
        if game.board.width < 1
            || game.board.width > crate::board::MAX_FILES
            || game.board.height < 1
            || game.board.height > crate::board::MAX_RANKS
        {
            return Err(BadBoardSize(game.board.width, game.board.height));
        }
        if !board.zones.is_empty() {
            game.board.zones.clear();
        }
        for (zone, squares) in &board.zones {
            for pos in squares {
                if pos.file() >= game.board.width || pos.rank() >= game.board.height {
                    return Err(ZoneOffBoard {
                        zone: zone.clone(),
                        pos: *pos,
                        width: game.board.width,
                        height: game.board.height,
                    });
                }
            }
            game.board.zones.insert(zone.clone(), squares.clone());
        }
    }

    for (symbol, kind) in &decl.symbols {
        game.symbols.insert(symbol.clone(), kind.clone());
    }

    let named: HashMap<&str, &PatternExpr> = decl
        .patterns
        .iter()
        .map(|(name, pattern)| (name.as_str(), pattern))
        .collect();

    compile_pieces(decl, &named, &mut game)?;
    compile_effects(decl, &mut game)?;

    for trigger in &decl.triggers {
        let compiled = compile_trigger(trigger, None)?;
        game.triggers.push(compiled);
    }

    compile_setup(decl, &mut game)?;
    merge_victory(&decl.victory, &mut game.victory)?;
    merge_draw(&decl.draw, &mut game.draw)?;

    for (flag, value) in &decl.rules {
        match flag.as_str() {
            "castling" => game.rules.castling = *value,
            "en_passant" => game.rules.en_passant = *value,
            "promotion" => game.rules.promotion = *value,
            other => return Err(UnknownRule(other.to_string())),
        }
    }

    for script in &decl.scripts {
        parse_program(&script.source).map_err(|e| BadScript(e.to_string()))?;
        game.scripts.push(script.source.clone());
    }

    Ok(game)
}

fn compile_pieces(
    decl: &GameDecl,
    named: &HashMap<&str, &PatternExpr>,
    game: &mut Game,
) -> Result<(), CompileError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for piece in &decl.pieces {
        if !seen.insert(piece.name.as_str()) {
            return Err(DuplicatePiece {
                name: piece.name.clone(),
                loc: piece.loc,
            });
        }
        let def = compile_piece(piece, named)?;
        // traits auto-register so conditions can enumerate them
        for name in &def.traits {
            game.traits.entry(name.clone()).or_insert_with(|| TraitDef {
                name: name.clone(),
                builtin: false,
            });
        }
        for trigger in &piece.triggers {
            let compiled = compile_trigger(trigger, Some(piece.name.clone()))?;
            game.triggers.push(compiled);
        }
        game.pieces.insert(piece.name.clone(), def);
    }
    Ok(())
}

fn compile_piece(
    piece: &PieceDecl,
    named: &HashMap<&str, &PatternExpr>,
) -> Result<PieceDef, CompileError> {
    let move_pattern = piece.move_pattern.as_ref().ok_or_else(|| MissingMove {
        name: piece.name.clone(),
        loc: piece.loc,
    })?;
    let move_pattern = resolve_pattern(move_pattern, named, &piece.name, &mut Vec::new())?;
    validate_pattern(&move_pattern, &piece.name)?;

    let capture = match &piece.capture {
        None | Some(CaptureDecl::Same) => CaptureRule::Same,
        Some(CaptureDecl::None) => CaptureRule::None,
        Some(CaptureDecl::Pattern(pattern)) => {
            let resolved = resolve_pattern(pattern, named, &piece.name, &mut Vec::new())?;
            validate_pattern(&resolved, &piece.name)?;
            CaptureRule::Pattern(resolved)
        }
    };

    let mut traits = piece.traits.clone();
    traits.dedup();
    Ok(PieceDef {
        name: piece.name.clone(),
        move_pattern,
        capture,
        traits,
        initial_state: piece.state.iter().cloned().collect(),
        promote_to: piece.promote_to.clone(),
        value: piece.value,
    })
}

/// Substitute named-pattern references until the tree is closed. The
/// stack catches definitions that reach themselves.
fn resolve_pattern(
    pattern: &PatternExpr,
    named: &HashMap<&str, &PatternExpr>,
    context: &str,
    stack: &mut Vec<String>,
) -> Result<PatternExpr, CompileError> {
    Ok(match pattern {
        PatternExpr::Named(name) => {
            if stack.iter().any(|n| n == name) {
                return Err(RecursivePattern(name.clone()));
            }
            let target = named.get(name.as_str()).ok_or_else(|| UnknownPattern {
                name: name.clone(),
                context: context.to_string(),
            })?;
            stack.push(name.clone());
            let resolved = resolve_pattern(target, named, context, stack)?;
            stack.pop();
            resolved
        }
        PatternExpr::Where(inner, condition) => PatternExpr::Where(
            Box::new(resolve_pattern(inner, named, context, stack)?),
            condition.clone(),
        ),
        PatternExpr::Or(patterns) => PatternExpr::Or(
            patterns
                .iter()
                .map(|p| resolve_pattern(p, named, context, stack))
                .collect::<Result<_, _>>()?,
        ),
        PatternExpr::And(patterns) => PatternExpr::And(
            patterns
                .iter()
                .map(|p| resolve_pattern(p, named, context, stack))
                .collect::<Result<_, _>>()?,
        ),
        leaf => leaf.clone(),
    })
}

fn validate_pattern(pattern: &PatternExpr, context: &str) -> Result<(), CompileError> {
    match pattern {
        PatternExpr::Step { dist, .. } => {
            if *dist < 1 {
                return Err(BadDistance {
                    dist: *dist,
                    context: context.to_string(),
                });
            }
        }
        PatternExpr::Leap { dx, dy } | PatternExpr::Rider { dx, dy } => {
            if (*dx == 0 && *dy == 0) || *dx < 0 || *dy < 0 {
                return Err(BadLeap {
                    dx: *dx,
                    dy: *dy,
                    context: context.to_string(),
                });
            }
        }
        PatternExpr::Where(inner, _) => validate_pattern(inner, context)?,
        PatternExpr::Or(patterns) | PatternExpr::And(patterns) => {
            for p in patterns {
                validate_pattern(p, context)?;
            }
        }
        PatternExpr::Slide { .. } | PatternExpr::Hop { .. } => {}
        PatternExpr::Named(name) => {
            // resolution runs first; a surviving reference is a bug
            unreachable!("unresolved pattern reference {name}");
        }
    }
    Ok(())
}

fn compile_effects(decl: &GameDecl, game: &mut Game) -> Result<(), CompileError> {
    for effect in &decl.effects {
        let blocks = match &effect.blocks {
            Some(policy) => Blocks::try_from_string(policy).ok_or_else(|| BadBlocks {
                policy: policy.clone(),
                effect: effect.name.clone(),
                loc: effect.loc,
            })?,
            None => Blocks::None,
        };
        game.effects.insert(
            effect.name.clone(),
            EffectDef {
                name: effect.name.clone(),
                blocks,
                duration: effect.duration.map(|d| d.max(0) as u32),
            },
        );
    }
    Ok(())
}

fn compile_trigger(
    trigger: &TriggerDecl,
    piece_kind: Option<String>,
) -> Result<Trigger, CompileError> {
    let event = trigger
        .on
        .as_ref()
        .ok_or_else(|| MissingEvent(trigger.name.clone(), trigger.loc))?;
    let on = EventKind::try_from_str(event).ok_or_else(|| UnknownEvent {
        event: event.clone(),
        trigger: trigger.name.clone(),
        loc: trigger.loc,
    })?;
    Ok(Trigger {
        name: trigger.name.clone(),
        on,
        when: trigger.when.clone(),
        actions: trigger.actions.clone(),
        optional: trigger.optional,
        description: trigger.description.clone(),
        piece_kind,
    })
}

fn compile_setup(decl: &GameDecl, game: &mut Game) -> Result<(), CompileError> {
    let Some(setup) = &decl.setup else {
        return validate_setup(game);
    };

    if setup.fen.is_some() || !setup.placements.is_empty() {
        // direct setup replaces whatever the base had
        game.setup.clear();
    }

    if let Some(fen) = &setup.fen {
        let placements = Board::parse_fen(fen).map_err(|e| BadSetupFen(e.to_string()))?;
        for (symbol, pos) in placements {
            let owner = if symbol.is_ascii_uppercase() {
                Color::White
            } else {
                Color::Black
            };
            let kind = game
                .symbols
                .get(&symbol.to_ascii_uppercase().to_string())
                .ok_or(UnknownFenSymbol(symbol))?
                .clone();
            place_overwriting(&mut game.setup, Placement { owner, kind, pos });
        }
    }

    for placement in &setup.placements {
        for pos in &placement.squares {
            place_overwriting(
                &mut game.setup,
                Placement {
                    owner: placement.owner,
                    kind: placement.kind.clone(),
                    pos: *pos,
                },
            );
        }
    }

    // additive: base placements kept, collisions overwrite by square
    for placement in &setup.add {
        for pos in &placement.squares {
            place_overwriting(
                &mut game.setup,
                Placement {
                    owner: placement.owner,
                    kind: placement.kind.clone(),
                    pos: *pos,
                },
            );
        }
    }

    // type rewrites: every base placement of the source type changes over
    let replacements: BTreeMap<&str, &str> = setup
        .replace
        .iter()
        .map(|(src, dst)| (src.as_str(), dst.as_str()))
        .collect();
    if !replacements.is_empty() {
        for placement in &mut game.setup {
            if let Some(dst) = replacements.get(placement.kind.as_str()) {
                placement.kind = dst.to_string();
            }
        }
    }

    validate_setup(game)
}

fn place_overwriting(setup: &mut Vec<Placement>, placement: Placement) {
    setup.retain(|p| p.pos != placement.pos);
    setup.push(placement);
}

fn validate_setup(game: &Game) -> Result<(), CompileError> {
    for placement in &game.setup {
        if !game.pieces.contains_key(&placement.kind) {
            return Err(UnknownPieceType(placement.kind.clone()));
        }
        if placement.pos.file() >= game.board.width || placement.pos.rank() >= game.board.height {
            return Err(PlacementOffBoard {
                pos: placement.pos,
                width: game.board.width,
                height: game.board.height,
            });
        }
    }
    Ok(())
}

fn merge_victory(
    decls: &[ConditionDecl],
    list: &mut Vec<VictoryDef>,
) -> Result<(), CompileError> {
    // precedence: remove, then replace, then add
    for decl in decls.iter().filter(|d| d.action == MergeAction::Remove) {
        list.retain(|entry| entry.name != decl.name);
    }
    for decl in decls.iter().filter(|d| d.action == MergeAction::Replace) {
        let def = VictoryDef {
            name: decl.name.clone(),
            condition: decl.condition.clone().expect("replace carries a condition"),
            winner: decl.winner.clone(),
        };
        match list.iter_mut().find(|entry| entry.name == decl.name) {
            Some(entry) => *entry = def,
            None => list.push(def),
        }
    }
    for decl in decls.iter().filter(|d| d.action == MergeAction::Add) {
        if list.iter().any(|entry| entry.name == decl.name) {
            continue; // same-name add is a no-op; use replace
        }
        list.push(VictoryDef {
            name: decl.name.clone(),
            condition: decl.condition.clone().expect("add carries a condition"),
            winner: decl.winner.clone(),
        });
    }
    Ok(())
}

fn merge_draw(decls: &[ConditionDecl], list: &mut Vec<DrawDef>) -> Result<(), CompileError> {
    for decl in decls.iter().filter(|d| d.action == MergeAction::Remove) {
        list.retain(|entry| entry.name != decl.name);
    }
    for decl in decls.iter().filter(|d| d.action == MergeAction::Replace) {
        let def = DrawDef {
            name: decl.name.clone(),
            condition: decl.condition.clone().expect("replace carries a condition"),
        };
        match list.iter_mut().find(|entry| entry.name == decl.name) {
            Some(entry) => *entry = def,
            None => list.push(def),
        }
    }
    for decl in decls.iter().filter(|d| d.action == MergeAction::Add) {
        if list.iter().any(|entry| entry.name == decl.name) {
            continue;
        }
        list.push(DrawDef {
            name: decl.name.clone(),
            condition: decl.condition.clone().expect("add carries a condition"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{parse, ConditionExpr};
    use crate::model::standard_chess;

    fn compile_source(source: &str) -> Result<Game, CompileError> {
        let decl = parse(source).expect("parse failed");
        compile(&decl)
    }

    #[test]
    fn test_empty_extension_matches_base() {
        let game = compile_source("game: Plain\nextends: \"Standard Chess\"\n").unwrap();
        let base = standard_chess();
        assert_eq!(game.pieces, base.pieces);
        assert_eq!(game.setup, base.setup);
        assert_eq!(game.victory, base.victory);
        assert_eq!(game.draw, base.draw);
        assert_eq!(game.name, "Plain");
    }

    #[test]
    fn test_unknown_base() {
        let err = compile_source("extends: Shogi\n").unwrap_err();
        assert!(matches!(err, CompileError::UnknownBase(_)));
    }

    #[test]
    fn test_piece_overwrites_base_definition() {
        let source = "\
extends: standard
piece Knight {
    move: leap(1, 2) | leap(2, 2)
    traits: [jump]
}
";
        let game = compile_source(source).unwrap();
        let knight = game.piece_def("Knight").unwrap();
        assert!(matches!(knight.move_pattern, PatternExpr::Or(_)));
    }

    #[test]
    fn test_named_pattern_resolution() {
        let source = "\
pattern cross = slide(orthogonal)
pattern star = cross | slide(diagonal)
piece Star {
    move: star
}
setup:
    white:
        Star: a1
";
        let game = compile_source(source).unwrap();
        let star = game.piece_def("Star").unwrap();
        match &star.move_pattern {
            PatternExpr::Or(terms) => {
                assert!(matches!(terms[0], PatternExpr::Slide { .. }));
            }
            other => panic!("expected resolved or-pattern, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_pattern_name() {
        let source = "piece Ghost {\n    move: ectoplasm\n}\n";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err, CompileError::UnknownPattern { .. }));
    }

    #[test]
    fn test_recursive_pattern_rejected() {
        let source = "\
pattern a = b
pattern b = a
piece Loop {
    move: a
}
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err, CompileError::RecursivePattern(_)));
    }

    #[test]
    fn test_bad_leap_arguments() {
        let err = compile_source("piece Z {\n    move: leap(0, 0)\n}\n").unwrap_err();
        assert!(matches!(err, CompileError::BadLeap { .. }));
    }

    #[test]
    fn test_duplicate_piece_in_one_file() {
        let source = "\
piece X {
    move: step(any, 1)
}
piece X {
    move: step(any, 2)
}
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err, CompileError::DuplicatePiece { .. }));
    }

    #[test]
    fn test_setup_replace_rewrites_types() {
        let source = "\
extends: standard
piece SuperKnight {
    move: leap(1, 2) | leap(1, 3)
    traits: [jump, super, enhanced]
}
setup:
    replace:
        Knight: SuperKnight
";
        let game = compile_source(source).unwrap();
        let supers: Vec<_> = game
            .setup
            .iter()
            .filter(|p| p.kind == "SuperKnight")
            .collect();
        assert_eq!(supers.len(), 4);
        assert!(game.setup.iter().all(|p| p.kind != "Knight"));
    }

    #[test]
    fn test_setup_add_overwrites_collisions() {
        let source = "\
extends: standard
piece Guard {
    move: step(any, 1)
}
setup:
    add:
        white:
            Guard: d2
";
        let game = compile_source(source).unwrap();
        assert_eq!(game.setup.len(), 32); // pawn on d2 replaced, not added
        let d2 = game
            .setup
            .iter()
            .find(|p| p.pos == Position::from_string("d2"))
            .unwrap();
        assert_eq!(d2.kind, "Guard");
    }

    #[test]
    fn test_setup_unknown_type() {
        let source = "\
setup:
    white:
        Wyvern: a1
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err, CompileError::UnknownPieceType(_)));
    }

    #[test]
    fn test_victory_merge_precedence() {
        // removals apply before additions, so a same-name add lands on a
        // clean slot rather than being dropped as a duplicate
        let source = "\
extends: standard
victory:
    remove:
        checkmate
    add:
        checkmate: check
";
        let game = compile_source(source).unwrap();
        assert_eq!(game.victory.len(), 1);
        assert_eq!(game.victory[0].name, "checkmate");
        assert_eq!(game.victory[0].condition, ConditionExpr::Check);
        assert!(game.victory[0].winner.is_none());
    }

    #[test]
    fn test_victory_replace_overwrites() {
        let source = "\
extends: standard
victory:
    replace:
        checkmate: check
";
        let game = compile_source(source).unwrap();
        assert_eq!(game.victory.len(), 1);
        assert_eq!(game.victory[0].condition, ConditionExpr::Check);
    }

    #[test]
    fn test_same_name_add_is_noop() {
        let source = "\
extends: standard
victory:
    add:
        checkmate: check
";
        let game = compile_source(source).unwrap();
        assert_eq!(game.victory, standard_chess().victory);
    }

    #[test]
    fn test_draw_remove() {
        let source = "\
extends: standard
draw:
    remove:
        fifty_moves
";
        let game = compile_source(source).unwrap();
        assert!(game.draw.iter().all(|d| d.name != "fifty_moves"));
        assert_eq!(game.draw.len(), 2);
    }

    #[test]
    fn test_rules_flags() {
        let game =
            compile_source("extends: standard\nrules:\n    castling: false\n").unwrap();
        assert!(!game.rules.castling);
        assert!(game.rules.en_passant);
        let err = compile_source("rules:\n    gravity: true\n").unwrap_err();
        assert!(matches!(err, CompileError::UnknownRule(_)));
    }

    #[test]
    fn test_zone_off_board() {
        let source = "\
board:
    size: 4x4
    zones:
        far: [h8]
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err, CompileError::ZoneOffBoard { .. }));
    }

    #[test]
    fn test_trigger_event_validation() {
        let source = "\
trigger t {
    on: teleportation
    do: { cancel }
}
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err, CompileError::UnknownEvent { .. }));
    }

    #[test]
    fn test_piece_trigger_scoped() {
        let source = "\
extends: standard
piece Trapper {
    move: step(any, 1)
    trigger lay {
        on: move
        do: { set piece.state.traps += 1 }
        optional: true
    }
}
";
        let game = compile_source(source).unwrap();
        let lay = game.triggers.iter().find(|t| t.name == "lay").unwrap();
        assert_eq!(lay.piece_kind.as_deref(), Some("Trapper"));
        assert!(lay.optional);
    }

    #[test]
    fn test_script_syntax_checked() {
        let good = "script {\n    on move(e) { console.log(\"hi\"); }\n}\n";
        assert!(compile_source(good).is_ok());
        let bad = "script {\n    on move(e) { let = ; }\n}\n";
        let err = compile_source(bad).unwrap_err();
        assert!(matches!(err, CompileError::BadScript(_)));
    }

    #[test]
    fn test_setup_fen() {
        let source = "\
extends: standard
setup:
    fen: \"4k3/8/8/8/8/8/8/4K3\"
";
        let game = compile_source(source).unwrap();
        assert_eq!(game.setup.len(), 2);
        assert!(game
            .setup
            .iter()
            .any(|p| p.kind == "King" && p.owner == Color::Black));
    }
}
