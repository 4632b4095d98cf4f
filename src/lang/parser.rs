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

use std::str::FromStr;
use thiserror::Error;

use super::ast::*;
use super::lexer::tokenize;
use super::token::{Keyword, SourceLocation, Token, TokenKind};
use crate::board::{Color, Dir, Position, Value};

use Keyword as Kw;
use TokenKind::*;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Expected {expected}, found {found} at {loc}")]
    UnexpectedToken {
        expected: String,
        found: String,
        loc: SourceLocation,
    },
    #[error("Duplicate {section} section at {loc}")]
    DuplicateSection { section: String, loc: SourceLocation },
    #[error("Unknown direction {word:?} at {loc}")]
    UnknownDirection { word: String, loc: SourceLocation },
    #[error("Malformed board size at {loc}")]
    BadBoardSize { loc: SourceLocation },
}

impl ParseError {
    pub fn location(&self) -> SourceLocation {
        use ParseError::*;
        match self {
            UnexpectedToken { loc, .. }
            | DuplicateSection { loc, .. }
            | UnknownDirection { loc, .. }
            | BadBoardSize { loc } => *loc,
        }
    }
}

type Parsed<T> = Result<T, ParseError>;

/// Lex and parse a source file into a game declaration.
pub fn parse(source: &str) -> anyhow::Result<GameDecl> {
    let tokens = tokenize(source)?;
    let decl = Parser::new(tokens).parse_game()?;
    Ok(decl)
}

/// Recursive descent with one token of lookahead (two via `peek2`).
/// Single pass; stops at the first structural error.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ---- token plumbing ----

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek2(&self) -> &TokenKind {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn loc(&self) -> SourceLocation {
        self.tokens
            .get(self.pos)
            .map(|t| t.loc)
            .unwrap_or_default()
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.peek().describe(),
            loc: self.loc(),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Parsed<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Newline) {
            self.pos += 1;
        }
    }

    /// An identifier, strictly.
    fn ident(&mut self, what: &str) -> Parsed<String> {
        match self.peek() {
            Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// An identifier or keyword, read back as its source text. Used where
    /// reserved words double as ordinary names (`move:`, `on: capture`).
    fn word(&mut self) -> Parsed<String> {
        match self.peek() {
            Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Keyword(kw) => {
                let name = kw.as_str().to_string();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn number(&mut self) -> Parsed<i64> {
        let negative = self.eat(&Minus);
        match self.peek() {
            Number(n) => {
                let n = *n;
                self.pos += 1;
                Ok(if negative { -n } else { n })
            }
            _ => Err(self.unexpected("a number")),
        }
    }

    fn string(&mut self) -> Parsed<String> {
        match self.peek() {
            Str(s) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("a string")),
        }
    }

    fn square(&mut self) -> Parsed<Position> {
        match self.peek() {
            Square(pos) => {
                let pos = *pos;
                self.pos += 1;
                Ok(pos)
            }
            _ => Err(self.unexpected("a square")),
        }
    }

    /// `: NEWLINE INDENT` — the opening of an indented section body.
    fn begin_indented(&mut self) -> Parsed<()> {
        self.expect(Colon, "':'")?;
        self.expect(Newline, "a newline")?;
        self.expect(Indent, "an indented block")?;
        Ok(())
    }

    fn end_of_line(&mut self) -> Parsed<()> {
        if matches!(self.peek(), Eof | Dedent) {
            return Ok(());
        }
        self.expect(Newline, "end of line")
    }

    // ---- top level ----

    pub fn parse_game(mut self) -> Parsed<GameDecl> {
        let mut game = GameDecl::default();
        loop {
            self.skip_newlines();
            match self.peek() {
                Eof => break,
                Keyword(Kw::Game) => {
                    self.singleton(game.name.is_some(), "game")?;
                    self.bump();
                    self.expect(Colon, "':'")?;
                    game.name = Some(self.name_or_string()?);
                    self.end_of_line()?;
                }
                Keyword(Kw::Extends) => {
                    self.singleton(game.extends.is_some(), "extends")?;
                    self.bump();
                    self.expect(Colon, "':'")?;
                    game.extends = Some(self.name_or_string()?);
                    self.end_of_line()?;
                }
                Keyword(Kw::Board) => {
                    self.singleton(game.board.is_some(), "board")?;
                    game.board = Some(self.parse_board()?);
                }
                Keyword(Kw::Pieces) => {
                    self.singleton(!game.symbols.is_empty(), "pieces")?;
                    game.symbols = self.parse_symbols()?;
                }
                Keyword(Kw::Piece) => game.pieces.push(self.parse_piece()?),
                Keyword(Kw::Effect) => game.effects.push(self.parse_effect()?),
                Keyword(Kw::Trigger) => game.triggers.push(self.parse_trigger()?),
                Keyword(Kw::Setup) => {
                    self.singleton(game.setup.is_some(), "setup")?;
                    game.setup = Some(self.parse_setup()?);
                }
                Keyword(Kw::Victory) => {
                    let mut entries = self.parse_condition_section()?;
                    game.victory.append(&mut entries);
                }
                Keyword(Kw::Draw) => {
                    let mut entries = self.parse_condition_section()?;
                    game.draw.append(&mut entries);
                }
                Keyword(Kw::Rules) => {
                    self.singleton(!game.rules.is_empty(), "rules")?;
                    game.rules = self.parse_rules()?;
                }
                Keyword(Kw::Pattern) => {
                    self.bump();
                    let name = self.ident("a pattern name")?;
                    self.expect(Assign, "'='")?;
                    let pattern = self.parse_pattern()?;
                    game.patterns.push((name, pattern));
                    self.end_of_line()?;
                }
                Keyword(Kw::Script) => game.scripts.push(self.parse_script()?),
                _ => return Err(self.unexpected("a top-level section")),
            }
        }
        Ok(game)
    }

    fn singleton(&self, already: bool, section: &str) -> Parsed<()> {
        if already {
            return Err(ParseError::DuplicateSection {
                section: section.to_string(),
                loc: self.loc(),
            });
        }
        Ok(())
    }

    fn name_or_string(&mut self) -> Parsed<String> {
        match self.peek() {
            Str(_) => self.string(),
            _ => self.ident("a name"),
        }
    }

    // ---- board ----

    fn parse_board(&mut self) -> Parsed<BoardDecl> {
        let loc = self.loc();
        self.bump(); // board
        self.begin_indented()?;
        let mut width = None;
        let mut height = None;
        let mut zones = Vec::new();
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            match self.peek() {
                Keyword(Kw::Size) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    let (w, h) = self.parse_size()?;
                    width = Some(w);
                    height = Some(h);
                    self.end_of_line()?;
                }
                Ident(key) if key == "width" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    width = Some(self.number()? as usize);
                    self.end_of_line()?;
                }
                Ident(key) if key == "height" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    height = Some(self.number()? as usize);
                    self.end_of_line()?;
                }
                Keyword(Kw::Zones) => {
                    self.bump();
                    self.begin_indented()?;
                    while !self.eat(&Dedent) {
                        self.skip_newlines();
                        if self.eat(&Dedent) {
                            break;
                        }
                        let name = self.word()?;
                        self.expect(Colon, "':'")?;
                        let squares = self.parse_square_list()?;
                        zones.push((name, squares));
                        self.end_of_line()?;
                    }
                }
                _ => return Err(self.unexpected("size, width, height or zones")),
            }
        }
        Ok(BoardDecl {
            width,
            height,
            zones,
            loc,
        })
    }

    /// `8x8`, `8 x 8`, or `8x100`. The lexer reads the tail of the first
    /// form as a square literal (`x8`) or an identifier (`x100`).
    fn parse_size(&mut self) -> Parsed<(usize, usize)> {
        let loc = self.loc();
        let width = self.number()? as usize;
        let height = match self.bump() {
            Square(pos) if pos.file() == ('x' as usize - 'a' as usize) => pos.rank() + 1,
            Ident(word) if word == "x" => self.number()? as usize,
            Ident(word) if word.starts_with('x') && word[1..].chars().all(|c| c.is_ascii_digit()) => {
                word[1..].parse().map_err(|_| ParseError::BadBoardSize { loc })?
            }
            _ => return Err(ParseError::BadBoardSize { loc }),
        };
        Ok((width, height))
    }

    fn parse_square_list(&mut self) -> Parsed<Vec<Position>> {
        self.expect(LBracket, "'['")?;
        let mut squares = Vec::new();
        if !self.eat(&RBracket) {
            loop {
                squares.push(self.square()?);
                if self.eat(&RBracket) {
                    break;
                }
                self.expect(Comma, "',' or ']'")?;
            }
        }
        Ok(squares)
    }

    // ---- pieces: symbol map ----

    fn parse_symbols(&mut self) -> Parsed<Vec<(String, String)>> {
        self.bump(); // pieces
        self.begin_indented()?;
        let mut symbols = Vec::new();
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            let symbol = self.word()?;
            self.expect(Colon, "':'")?;
            let kind = self.ident("a piece type")?;
            symbols.push((symbol, kind));
            self.end_of_line()?;
        }
        Ok(symbols)
    }

    // ---- piece declarations ----

    fn parse_piece(&mut self) -> Parsed<PieceDecl> {
        let loc = self.loc();
        self.bump(); // piece
        let name = self.ident("a piece name")?;
        self.expect(LBrace, "'{'")?;
        let mut decl = PieceDecl {
            name,
            move_pattern: None,
            capture: None,
            traits: Vec::new(),
            state: Vec::new(),
            promote_to: Vec::new(),
            value: None,
            triggers: Vec::new(),
            loc,
        };
        loop {
            if self.eat(&RBrace) {
                break;
            }
            match self.peek() {
                Keyword(Kw::Move) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.move_pattern = Some(self.parse_pattern()?);
                }
                Keyword(Kw::Capture) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.capture = Some(self.parse_capture()?);
                }
                Keyword(Kw::Traits) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.traits = self.parse_name_list()?;
                }
                Keyword(Kw::State) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.state = self.parse_state_map()?;
                }
                Ident(key) if key == "promote_to" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.promote_to = self.parse_name_list()?;
                }
                Ident(key) if key == "value" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.value = Some(self.number()?);
                }
                Keyword(Kw::Trigger) => decl.triggers.push(self.parse_trigger()?),
                _ => return Err(self.unexpected("a piece field or '}'")),
            }
        }
        Ok(decl)
    }

    fn parse_capture(&mut self) -> Parsed<CaptureDecl> {
        if self.eat(&Assign) {
            self.expect(Keyword(Kw::Move), "'move' after '='")?;
            return Ok(CaptureDecl::Same);
        }
        if matches!(self.peek(), Ident(word) if word == "none") {
            self.bump();
            return Ok(CaptureDecl::None);
        }
        Ok(CaptureDecl::Pattern(self.parse_pattern()?))
    }

    fn parse_name_list(&mut self) -> Parsed<Vec<String>> {
        self.expect(LBracket, "'['")?;
        let mut names = Vec::new();
        if !self.eat(&RBracket) {
            loop {
                names.push(self.word()?);
                if self.eat(&RBracket) {
                    break;
                }
                self.expect(Comma, "',' or ']'")?;
            }
        }
        Ok(names)
    }

    fn parse_state_map(&mut self) -> Parsed<Vec<(String, Value)>> {
        self.expect(LBrace, "'{'")?;
        let mut entries = Vec::new();
        loop {
            if self.eat(&RBrace) {
                break;
            }
            let key = self.word()?;
            self.expect(Colon, "':'")?;
            let value = self.parse_value_literal()?;
            entries.push((key, value));
            self.eat(&Comma);
        }
        Ok(entries)
    }

    fn parse_value_literal(&mut self) -> Parsed<Value> {
        match self.peek().clone() {
            Number(_) | Minus => Ok(Value::Int(self.number()?)),
            Str(s) => {
                self.pos += 1;
                Ok(Value::Str(s))
            }
            Bool(b) => {
                self.pos += 1;
                Ok(Value::Bool(b))
            }
            Square(pos) => {
                self.pos += 1;
                Ok(Value::Str(pos.to_algebraic()))
            }
            LBracket => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(&RBracket) {
                    loop {
                        items.push(self.parse_value_literal()?);
                        if self.eat(&RBracket) {
                            break;
                        }
                        self.expect(Comma, "',' or ']'")?;
                    }
                }
                Ok(Value::List(items))
            }
            _ => Err(self.unexpected("a literal value")),
        }
    }

    // ---- effect declarations ----

    fn parse_effect(&mut self) -> Parsed<EffectDecl> {
        let loc = self.loc();
        self.bump(); // effect
        let name = self.ident("an effect name")?;
        self.expect(LBrace, "'{'")?;
        let mut blocks = None;
        let mut duration = None;
        loop {
            if self.eat(&RBrace) {
                break;
            }
            match self.peek() {
                Ident(key) if key == "blocks" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    blocks = Some(self.word()?);
                }
                Ident(key) if key == "duration" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    duration = Some(self.number()?);
                }
                _ => return Err(self.unexpected("an effect field or '}'")),
            }
        }
        Ok(EffectDecl {
            name,
            blocks,
            duration,
            loc,
        })
    }

    // ---- trigger declarations ----

    fn parse_trigger(&mut self) -> Parsed<TriggerDecl> {
        let loc = self.loc();
        self.bump(); // trigger
        let name = self.ident("a trigger name")?;
        self.expect(LBrace, "'{'")?;
        let mut decl = TriggerDecl {
            name,
            on: None,
            when: None,
            actions: Vec::new(),
            optional: false,
            description: None,
            loc,
        };
        loop {
            if self.eat(&RBrace) {
                break;
            }
            match self.peek() {
                Keyword(Kw::On) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.on = Some(self.word()?);
                }
                Keyword(Kw::When) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.when = Some(self.parse_condition()?);
                }
                Keyword(Kw::Do) => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.actions = self.parse_actions()?;
                }
                Ident(key) if key == "optional" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    match self.bump() {
                        Bool(b) => decl.optional = b,
                        _ => return Err(self.unexpected("true or false")),
                    }
                }
                Ident(key) if key == "description" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    decl.description = Some(self.string()?);
                }
                _ => return Err(self.unexpected("a trigger field or '}'")),
            }
        }
        Ok(decl)
    }

    /// A `do:` clause: either a brace-delimited list or bare action lines.
    /// Either way actions are prefix-driven, so the list simply ends when
    /// the next token is not an action head.
    fn parse_actions(&mut self) -> Parsed<Vec<ActionDecl>> {
        let braced = self.eat(&LBrace);
        let mut actions = Vec::new();
        loop {
            if braced && self.eat(&RBrace) {
                break;
            }
            if self.is_action_head() {
                actions.push(self.parse_action()?);
            } else if braced {
                return Err(self.unexpected("an action or '}'"));
            } else {
                break;
            }
        }
        Ok(actions)
    }

    fn is_action_head(&self) -> bool {
        matches!(
            self.peek(),
            Keyword(Kw::Set)
                | Keyword(Kw::Remove)
                | Keyword(Kw::Create)
                | Keyword(Kw::Move)
                | Keyword(Kw::Win)
                | Keyword(Kw::Draw)
                | Keyword(Kw::Mark)
                | Keyword(Kw::Cancel)
        )
    }

    fn parse_action(&mut self) -> Parsed<ActionDecl> {
        match self.bump() {
            Keyword(Kw::Set) => {
                let path = self.parse_path()?;
                let op = match self.bump() {
                    Assign => SetOp::Assign,
                    PlusEq => SetOp::Inc,
                    MinusEq => SetOp::Dec,
                    _ => return Err(self.unexpected("'=', '+=' or '-='")),
                };
                let value = self.parse_expr()?;
                Ok(ActionDecl::Set { path, op, value })
            }
            Keyword(Kw::Remove) => {
                let target = self.parse_target()?;
                let filter = if self.eat(&Keyword(Kw::Where)) {
                    Some(self.parse_filter()?)
                } else {
                    None
                };
                Ok(ActionDecl::Remove { target, filter })
            }
            Keyword(Kw::Create) => {
                let kind = self.ident("a piece type")?;
                self.expect(Keyword(Kw::At), "'at'")?;
                let at = self.parse_expr()?;
                let owner = if matches!(self.peek(), Ident(w) if w == "owner") {
                    self.bump();
                    self.parse_player_ref()?
                } else {
                    PlayerRef::Current
                };
                Ok(ActionDecl::Create { kind, at, owner })
            }
            Keyword(Kw::Move) => {
                let piece = self.parse_expr()?;
                self.expect(Keyword(Kw::To), "'to'")?;
                let to = self.parse_expr()?;
                Ok(ActionDecl::MovePiece { piece, to })
            }
            Keyword(Kw::Win) => Ok(ActionDecl::Win(self.parse_player_ref()?)),
            Keyword(Kw::Draw) => {
                let reason = match self.peek() {
                    Str(_) => Some(self.string()?),
                    _ => None,
                };
                Ok(ActionDecl::Draw(reason))
            }
            Keyword(Kw::Mark) => {
                let at = self.parse_expr()?;
                let effect = self.ident("an effect name")?;
                Ok(ActionDecl::Mark { at, effect })
            }
            Keyword(Kw::Cancel) => Ok(ActionDecl::Cancel),
            _ => Err(self.unexpected("an action")),
        }
    }

    fn parse_target(&mut self) -> Parsed<TargetDecl> {
        match self.peek() {
            Keyword(Kw::At) => {
                self.bump();
                Ok(TargetDecl::At(self.parse_expr()?))
            }
            Keyword(Kw::Radius) => {
                self.bump();
                self.expect(LParen, "'('")?;
                let n = self.number()?;
                self.expect(RParen, "')'")?;
                self.expect(Keyword(Kw::From), "'from'")?;
                Ok(TargetDecl::Radius {
                    n,
                    from: self.parse_expr()?,
                })
            }
            Keyword(Kw::Adjacent) => {
                self.bump();
                self.expect(Keyword(Kw::To), "'to'")?;
                Ok(TargetDecl::Adjacent {
                    to: self.parse_expr()?,
                })
            }
            Keyword(Kw::In) => {
                self.bump();
                match self.peek() {
                    Ident(word) if word == "zone" => {
                        self.bump();
                        self.expect(Dot, "'.'")?;
                        Ok(TargetDecl::InZone(self.word()?))
                    }
                    _ => Err(self.unexpected("'zone.<name>'")),
                }
            }
            Keyword(Kw::Line) => {
                self.bump();
                self.expect(LParen, "'('")?;
                let dir = self.parse_direction()?;
                self.expect(RParen, "')'")?;
                self.expect(Keyword(Kw::From), "'from'")?;
                Ok(TargetDecl::Line {
                    dir,
                    from: self.parse_expr()?,
                })
            }
            _ => Ok(TargetDecl::At(self.parse_expr()?)),
        }
    }

    fn parse_filter(&mut self) -> Parsed<FilterDecl> {
        match self.peek() {
            Keyword(Kw::Not) => {
                self.bump();
                self.expect_type_in().map(FilterDecl::TypeNotIn)
            }
            Ident(word) if word == "type" => self.expect_type_in().map(FilterDecl::TypeIn),
            Ident(word) if word == "enemy" => {
                self.bump();
                Ok(FilterDecl::Enemy)
            }
            Ident(word) if word == "friend" => {
                self.bump();
                Ok(FilterDecl::Friend)
            }
            _ => Err(self.unexpected("a filter")),
        }
    }

    fn expect_type_in(&mut self) -> Parsed<Vec<String>> {
        match self.peek() {
            Ident(word) if word == "type" => {
                self.bump();
            }
            _ => return Err(self.unexpected("'type'")),
        }
        self.expect(Keyword(Kw::In), "'in'")?;
        self.parse_name_list()
    }

    fn parse_player_ref(&mut self) -> Parsed<PlayerRef> {
        match self.peek() {
            Ident(word) if word == "white" => {
                self.bump();
                Ok(PlayerRef::White)
            }
            Ident(word) if word == "black" => {
                self.bump();
                Ok(PlayerRef::Black)
            }
            Ident(word) if word == "current" => {
                self.bump();
                Ok(PlayerRef::Current)
            }
            Ident(word) if word == "opponent" => {
                self.bump();
                Ok(PlayerRef::Opponent)
            }
            _ => Ok(PlayerRef::Expr(self.parse_expr()?)),
        }
    }

    // ---- setup ----

    fn parse_setup(&mut self) -> Parsed<SetupDecl> {
        self.bump(); // setup
        self.begin_indented()?;
        let mut setup = SetupDecl::default();
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            match self.peek().clone() {
                Ident(word) if word == "white" || word == "black" => {
                    let owner = if word == "white" {
                        Color::White
                    } else {
                        Color::Black
                    };
                    self.bump();
                    let mut placements = self.parse_placement_block(owner)?;
                    setup.placements.append(&mut placements);
                }
                Ident(word) if word == "fen" => {
                    self.bump();
                    self.expect(Colon, "':'")?;
                    setup.fen = Some(self.string()?);
                    self.end_of_line()?;
                }
                Keyword(Kw::Add) => {
                    self.bump();
                    self.begin_indented()?;
                    while !self.eat(&Dedent) {
                        self.skip_newlines();
                        if self.eat(&Dedent) {
                            break;
                        }
                        let owner = match self.peek() {
                            Ident(word) if word == "white" => Color::White,
                            Ident(word) if word == "black" => Color::Black,
                            _ => return Err(self.unexpected("'white' or 'black'")),
                        };
                        self.bump();
                        let mut placements = self.parse_placement_block(owner)?;
                        setup.add.append(&mut placements);
                    }
                }
                Keyword(Kw::Replace) => {
                    self.bump();
                    self.begin_indented()?;
                    while !self.eat(&Dedent) {
                        self.skip_newlines();
                        if self.eat(&Dedent) {
                            break;
                        }
                        let src = self.ident("a piece type")?;
                        self.expect(Colon, "':'")?;
                        let dst = self.ident("a piece type")?;
                        setup.replace.push((src, dst));
                        self.end_of_line()?;
                    }
                }
                _ => return Err(self.unexpected("white, black, fen, add or replace")),
            }
        }
        Ok(setup)
    }

    fn parse_placement_block(&mut self, owner: Color) -> Parsed<Vec<PlacementDecl>> {
        self.begin_indented()?;
        let mut placements = Vec::new();
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            let kind = self.ident("a piece type")?;
            self.expect(Colon, "':'")?;
            let mut squares = vec![self.square()?];
            while self.eat(&Comma) {
                squares.push(self.square()?);
            }
            placements.push(PlacementDecl {
                owner,
                kind,
                squares,
            });
            self.end_of_line()?;
        }
        Ok(placements)
    }

    // ---- victory / draw ----

    fn parse_condition_section(&mut self) -> Parsed<Vec<ConditionDecl>> {
        self.bump(); // victory | draw
        self.begin_indented()?;
        let mut entries = Vec::new();
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            match self.peek() {
                Keyword(Kw::Add) if matches!(self.peek2(), Colon) => {
                    self.bump();
                    self.parse_condition_entries(MergeAction::Add, &mut entries)?;
                }
                Keyword(Kw::Replace) if matches!(self.peek2(), Colon) => {
                    self.bump();
                    self.parse_condition_entries(MergeAction::Replace, &mut entries)?;
                }
                Keyword(Kw::Remove) if matches!(self.peek2(), Colon) => {
                    self.bump();
                    self.begin_indented()?;
                    while !self.eat(&Dedent) {
                        self.skip_newlines();
                        if self.eat(&Dedent) {
                            break;
                        }
                        let loc = self.loc();
                        let name = self.ident("a condition name")?;
                        entries.push(ConditionDecl {
                            name,
                            condition: None,
                            winner: None,
                            action: MergeAction::Remove,
                            loc,
                        });
                        self.end_of_line()?;
                    }
                }
                _ => {
                    // bare entry defaults to `add`
                    let entry = self.parse_condition_entry(MergeAction::Add)?;
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn parse_condition_entries(
        &mut self,
        action: MergeAction,
        entries: &mut Vec<ConditionDecl>,
    ) -> Parsed<()> {
        self.begin_indented()?;
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            let entry = self.parse_condition_entry(action)?;
            entries.push(entry);
        }
        Ok(())
    }

    fn parse_condition_entry(&mut self, action: MergeAction) -> Parsed<ConditionDecl> {
        let loc = self.loc();
        let name = self.ident("a condition name")?;
        self.expect(Colon, "':'")?;
        let condition = self.parse_condition()?;
        let winner = if self.eat(&Arrow) {
            Some(self.parse_player_ref()?)
        } else {
            None
        };
        self.end_of_line()?;
        Ok(ConditionDecl {
            name,
            condition: Some(condition),
            winner,
            action,
            loc,
        })
    }

    // ---- rules ----

    fn parse_rules(&mut self) -> Parsed<Vec<(String, bool)>> {
        self.bump(); // rules
        self.begin_indented()?;
        let mut rules = Vec::new();
        while !self.eat(&Dedent) {
            self.skip_newlines();
            if self.eat(&Dedent) {
                break;
            }
            let key = self.word()?;
            self.expect(Colon, "':'")?;
            let value = match self.bump() {
                Bool(b) => b,
                _ => return Err(self.unexpected("true or false")),
            };
            rules.push((key, value));
            self.end_of_line()?;
        }
        Ok(rules)
    }

    // ---- scripts ----

    fn parse_script(&mut self) -> Parsed<ScriptDecl> {
        let loc = self.loc();
        self.bump(); // script
        self.expect(LBrace, "'{'")?;
        let source = match self.bump() {
            ScriptBody(body) => body,
            _ => return Err(self.unexpected("a script body")),
        };
        self.expect(RBrace, "'}'")?;
        Ok(ScriptDecl { source, loc })
    }

    // ---- pattern expressions ----

    /// `Term ('|' Term)*` where `Term` is `Factor ('&' Factor)*`; union
    /// binds weaker than intersection.
    pub fn parse_pattern(&mut self) -> Parsed<PatternExpr> {
        let mut terms = vec![self.parse_pattern_term()?];
        while self.eat(&Pipe) {
            terms.push(self.parse_pattern_term()?);
        }
        if terms.len() == 1 {
            Ok(terms.pop().expect("one term"))
        } else {
            Ok(PatternExpr::Or(terms))
        }
    }

    fn parse_pattern_term(&mut self) -> Parsed<PatternExpr> {
        let mut factors = vec![self.parse_pattern_factor()?];
        while self.eat(&Amp) {
            factors.push(self.parse_pattern_factor()?);
        }
        if factors.len() == 1 {
            Ok(factors.pop().expect("one factor"))
        } else {
            Ok(PatternExpr::And(factors))
        }
    }

    fn parse_pattern_factor(&mut self) -> Parsed<PatternExpr> {
        let mut pattern = self.parse_pattern_base()?;
        if self.eat(&Keyword(Kw::Where)) {
            let condition = self.parse_condition()?;
            pattern = PatternExpr::Where(Box::new(pattern), condition);
        }
        Ok(pattern)
    }

    fn parse_pattern_base(&mut self) -> Parsed<PatternExpr> {
        match self.peek().clone() {
            LParen => {
                self.bump();
                let inner = self.parse_pattern()?;
                self.expect(RParen, "')'")?;
                Ok(inner)
            }
            Keyword(Kw::Step) => {
                self.bump();
                self.expect(LParen, "'('")?;
                let dir = self.parse_direction()?;
                let dist = if self.eat(&Comma) { self.number()? } else { 1 };
                self.expect(RParen, "')'")?;
                Ok(PatternExpr::Step { dir, dist })
            }
            Keyword(Kw::Slide) => {
                self.bump();
                self.expect(LParen, "'('")?;
                let dir = self.parse_direction()?;
                self.expect(RParen, "')'")?;
                Ok(PatternExpr::Slide { dir })
            }
            Keyword(Kw::Leap) => {
                self.bump();
                let (dx, dy) = self.parse_offset_args()?;
                Ok(PatternExpr::Leap { dx, dy })
            }
            Keyword(Kw::Rider) => {
                self.bump();
                let (dx, dy) = self.parse_offset_args()?;
                Ok(PatternExpr::Rider { dx, dy })
            }
            Keyword(Kw::Hop) => {
                self.bump();
                self.expect(LParen, "'('")?;
                let dir = self.parse_direction()?;
                self.expect(RParen, "')'")?;
                Ok(PatternExpr::Hop { dir })
            }
            Ident(name) => {
                self.bump();
                Ok(PatternExpr::Named(name))
            }
            _ => Err(self.unexpected("a pattern")),
        }
    }

    fn parse_offset_args(&mut self) -> Parsed<(i64, i64)> {
        self.expect(LParen, "'('")?;
        let dx = self.number()?;
        self.expect(Comma, "','")?;
        let dy = self.number()?;
        self.expect(RParen, "')'")?;
        Ok((dx, dy))
    }

    fn parse_direction(&mut self) -> Parsed<Dir> {
        let loc = self.loc();
        let word = self.word()?;
        Dir::from_str(&word).map_err(|_| ParseError::UnknownDirection { word, loc })
    }

    // ---- condition expressions ----

    /// Boolean algebra with precedence `not > and > or`.
    pub fn parse_condition(&mut self) -> Parsed<ConditionExpr> {
        let mut left = self.parse_condition_term()?;
        while self.eat(&Keyword(Kw::Or)) {
            let right = self.parse_condition_term()?;
            left = ConditionExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_condition_term(&mut self) -> Parsed<ConditionExpr> {
        let mut left = self.parse_condition_factor()?;
        while self.eat(&Keyword(Kw::And)) {
            let right = self.parse_condition_factor()?;
            left = ConditionExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_condition_factor(&mut self) -> Parsed<ConditionExpr> {
        if self.eat(&Keyword(Kw::Not)) {
            let inner = self.parse_condition_factor()?;
            return Ok(ConditionExpr::Not(Box::new(inner)));
        }
        self.parse_condition_atom()
    }

    fn parse_condition_atom(&mut self) -> Parsed<ConditionExpr> {
        match self.peek().clone() {
            Ident(word) => match word.as_str() {
                "empty" => {
                    self.bump();
                    Ok(ConditionExpr::Empty)
                }
                "enemy" => {
                    self.bump();
                    Ok(ConditionExpr::Enemy)
                }
                "friend" => {
                    self.bump();
                    Ok(ConditionExpr::Friend)
                }
                "check" => {
                    self.bump();
                    Ok(ConditionExpr::Check)
                }
                "first_move" => {
                    self.bump();
                    Ok(ConditionExpr::FirstMove)
                }
                "clear" => {
                    self.bump();
                    Ok(ConditionExpr::Clear)
                }
                "in_zone" => {
                    self.bump();
                    Ok(ConditionExpr::InZone(self.word()?))
                }
                _ => {
                    // custom predicate call, else an expression
                    if matches!(self.peek2(), LParen) {
                        let name = word;
                        self.bump();
                        self.bump();
                        let mut args = Vec::new();
                        if !self.eat(&RParen) {
                            loop {
                                args.push(self.parse_expr()?);
                                if self.eat(&RParen) {
                                    break;
                                }
                                self.expect(Comma, "',' or ')'")?;
                            }
                        }
                        Ok(ConditionExpr::Custom { name, args })
                    } else {
                        self.parse_comparison()
                    }
                }
            },
            LParen => {
                self.bump();
                let inner = self.parse_condition()?;
                self.expect(RParen, "')'")?;
                // `(a + 1) > b`: a parenthesized expression followed by a
                // comparison operator continues as a comparison
                if let ConditionExpr::Expr(expr) = &inner {
                    if let Some(op) = self.peek_cmp_op() {
                        self.bump();
                        let right = self.parse_expr()?;
                        return Ok(ConditionExpr::Compare {
                            op,
                            left: expr.clone(),
                            right,
                        });
                    }
                }
                Ok(inner)
            }
            _ => self.parse_comparison(),
        }
    }

    fn peek_cmp_op(&self) -> Option<CmpOp> {
        match self.peek() {
            EqEq => Some(CmpOp::Eq),
            NotEq => Some(CmpOp::Ne),
            Lt => Some(CmpOp::Lt),
            Gt => Some(CmpOp::Gt),
            Le => Some(CmpOp::Le),
            Ge => Some(CmpOp::Ge),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Parsed<ConditionExpr> {
        let left = self.parse_expr()?;
        if let Some(op) = self.peek_cmp_op() {
            self.bump();
            let right = self.parse_expr()?;
            return Ok(ConditionExpr::Compare { op, left, right });
        }
        Ok(ConditionExpr::Expr(left))
    }

    // ---- value expressions ----

    pub fn parse_expr(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Plus => BinOp::Add,
                Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_mul()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Star => BinOp::Mul,
                Slash => BinOp::Div,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Parsed<Expr> {
        if self.eat(&Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Parsed<Expr> {
        match self.peek().clone() {
            Number(n) => {
                self.pos += 1;
                Ok(Expr::Int(n))
            }
            Str(s) => {
                self.pos += 1;
                Ok(Expr::Str(s))
            }
            Bool(b) => {
                self.pos += 1;
                Ok(Expr::Bool(b))
            }
            Square(pos) => {
                self.pos += 1;
                Ok(Expr::Square(pos))
            }
            LBracket => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat(&RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(&RBracket) {
                            break;
                        }
                        self.expect(Comma, "',' or ']'")?;
                    }
                }
                Ok(Expr::List(items))
            }
            LParen => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(RParen, "')'")?;
                Ok(inner)
            }
            _ => {
                let head = self.binding_name()?;
                let mut expr = Expr::Ident(head);
                while self.eat(&Dot) {
                    let field = self.word()?;
                    expr = Expr::Member(Box::new(expr), field);
                }
                Ok(expr)
            }
        }
    }

    /// Head of an access path. Several event bindings share spellings with
    /// keywords (`to`, `from`, `piece`, `state`), so those are let through.
    fn binding_name(&mut self) -> Parsed<String> {
        match self.peek() {
            Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Keyword(Kw::To) | Keyword(Kw::From) | Keyword(Kw::Piece) | Keyword(Kw::State)
            | Keyword(Kw::Move) | Keyword(Kw::Capture) => {
                let name = match self.bump() {
                    Keyword(kw) => kw.as_str().to_string(),
                    _ => unreachable!(),
                };
                Ok(name)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// A dotted access path used as an lvalue (`piece.state.traps`).
    fn parse_path(&mut self) -> Parsed<Vec<String>> {
        let mut path = vec![self.binding_name()?];
        while self.eat(&Dot) {
            path.push(self.word()?);
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> GameDecl {
        parse(source).expect("parse failed")
    }

    // ---- sections ----

    #[test]
    fn test_minimal_game() {
        let game = parse_ok("game: Tiny\n");
        assert_eq!(game.name.as_deref(), Some("Tiny"));
    }

    #[test]
    fn test_extends_string() {
        let game = parse_ok("game: KOTH\nextends: \"Standard Chess\"\n");
        assert_eq!(game.extends.as_deref(), Some("Standard Chess"));
    }

    #[test]
    fn test_duplicate_singleton_rejected() {
        let result = parse("game: A\ngame: B\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_free_section_order() {
        let source = "rules:\n    castling: false\ngame: Odd\n";
        let game = parse_ok(source);
        assert_eq!(game.name.as_deref(), Some("Odd"));
        assert_eq!(game.rules, vec![("castling".to_string(), false)]);
    }

    #[test]
    fn test_board_section() {
        let source = "board:\n    size: 10x12\n    zones:\n        hill: [d4, e4]\n";
        let game = parse_ok(source);
        let board = game.board.unwrap();
        assert_eq!((board.width, board.height), (Some(10), Some(12)));
        assert_eq!(board.zones.len(), 1);
        assert_eq!(board.zones[0].0, "hill");
        assert_eq!(board.zones[0].1.len(), 2);
    }

    #[test]
    fn test_board_size_spaced() {
        let game = parse_ok("board:\n    size: 8 x 8\n");
        let board = game.board.unwrap();
        assert_eq!((board.width, board.height), (Some(8), Some(8)));
    }

    #[test]
    fn test_board_width_height_keys() {
        let game = parse_ok("board:\n    width: 5\n    height: 5\n");
        let board = game.board.unwrap();
        assert_eq!((board.width, board.height), (Some(5), Some(5)));
    }

    #[test]
    fn test_board_zones_only() {
        // a variant can add zones without restating the base's size
        let game = parse_ok("board:\n    zones:\n        hill: [d4, d5, e4, e5]\n");
        let board = game.board.unwrap();
        assert_eq!(board.width, None);
        assert_eq!(board.zones[0].1.len(), 4);
    }

    #[test]
    fn test_symbols_section() {
        let source = "pieces:\n    K: King\n    N: Knight\n";
        let game = parse_ok(source);
        assert_eq!(game.symbols.len(), 2);
        assert_eq!(game.symbols[0], ("K".to_string(), "King".to_string()));
    }

    // ---- piece declarations ----

    #[test]
    fn test_piece_block() {
        let source = "\
piece Amazon {
    move: slide(any) | leap(1, 2)
    capture: =move
    traits: [strong]
    value: 12
}
";
        let game = parse_ok(source);
        assert_eq!(game.pieces.len(), 1);
        let piece = &game.pieces[0];
        assert_eq!(piece.name, "Amazon");
        assert_eq!(piece.capture, Some(CaptureDecl::Same));
        assert_eq!(piece.value, Some(12));
        match piece.move_pattern.as_ref().unwrap() {
            PatternExpr::Or(terms) => assert_eq!(terms.len(), 2),
            other => panic!("expected or-pattern, got {other:?}"),
        }
    }

    #[test]
    fn test_piece_capture_none_and_state() {
        let source = "\
piece Wall {
    move: step(any, 1)
    capture: none
    state: { hp: 3, label: \"wall\" }
}
";
        let game = parse_ok(source);
        let piece = &game.pieces[0];
        assert_eq!(piece.capture, Some(CaptureDecl::None));
        assert_eq!(
            piece.state,
            vec![
                ("hp".to_string(), Value::Int(3)),
                ("label".to_string(), Value::Str("wall".to_string()))
            ]
        );
    }

    #[test]
    fn test_nested_trigger_in_piece() {
        let source = "\
piece Trapper {
    move: step(any, 1)
    trigger lay_trap {
        on: move
        do: { set piece.state.traps += 1 }
        optional: true
        description: \"Lay a trap\"
    }
}
";
        let game = parse_ok(source);
        let piece = &game.pieces[0];
        assert_eq!(piece.triggers.len(), 1);
        let trigger = &piece.triggers[0];
        assert_eq!(trigger.name, "lay_trap");
        assert!(trigger.optional);
        assert_eq!(trigger.on.as_deref(), Some("move"));
        assert_eq!(trigger.actions.len(), 1);
    }

    // ---- patterns ----

    fn pattern_of(source: &str) -> PatternExpr {
        let full = format!("pattern p = {source}\n");
        let game = parse_ok(&full);
        game.patterns.into_iter().next().unwrap().1
    }

    #[test]
    fn test_pattern_precedence() {
        // A | B & C | D parses as A | (B & C) | D
        let pattern = pattern_of("step(north) | slide(east) & slide(west) | leap(1, 2)");
        match pattern {
            PatternExpr::Or(terms) => {
                assert_eq!(terms.len(), 3);
                assert!(matches!(terms[1], PatternExpr::And(_)));
            }
            other => panic!("expected or, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_where_clause() {
        let pattern = pattern_of("step(forward, 2) where first_move and clear");
        match pattern {
            PatternExpr::Where(inner, cond) => {
                assert!(matches!(*inner, PatternExpr::Step { dist: 2, .. }));
                assert!(matches!(cond, ConditionExpr::And(_, _)));
            }
            other => panic!("expected where, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_parenthesized() {
        let pattern = pattern_of("(step(north) | step(south)) & slide(east)");
        assert!(matches!(pattern, PatternExpr::And(_)));
    }

    #[test]
    fn test_pattern_named_reference() {
        let pattern = pattern_of("orthodox_queen");
        assert_eq!(pattern, PatternExpr::Named("orthodox_queen".to_string()));
    }

    #[test]
    fn test_pattern_step_default_distance() {
        let pattern = pattern_of("step(northeast)");
        assert!(matches!(pattern, PatternExpr::Step { dist: 1, .. }));
    }

    #[test]
    fn test_pattern_rider_and_hop() {
        assert!(matches!(
            pattern_of("rider(2, 1)"),
            PatternExpr::Rider { dx: 2, dy: 1 }
        ));
        assert!(matches!(
            pattern_of("hop(orthogonal)"),
            PatternExpr::Hop { .. }
        ));
    }

    #[test]
    fn test_unknown_direction() {
        let result = parse("pattern p = step(sideways)\n");
        assert!(result.is_err());
    }

    // ---- conditions ----

    fn condition_of(source: &str) -> ConditionExpr {
        let full = format!(
            "trigger t {{\n    on: move\n    when: {source}\n}}\n"
        );
        let game = parse_ok(&full);
        game.triggers.into_iter().next().unwrap().when.unwrap()
    }

    #[test]
    fn test_condition_precedence() {
        // not binds tighter than and, and tighter than or
        let cond = condition_of("not empty and enemy or check");
        match cond {
            ConditionExpr::Or(left, right) => {
                assert!(matches!(*left, ConditionExpr::And(_, _)));
                assert!(matches!(*right, ConditionExpr::Check));
            }
            other => panic!("expected or, got {other:?}"),
        }
    }

    #[test]
    fn test_condition_comparison() {
        let cond = condition_of("state.checkCount >= 3");
        match cond {
            ConditionExpr::Compare { op, left, right } => {
                assert_eq!(op, CmpOp::Ge);
                assert_eq!(
                    left.as_path(),
                    Some(vec!["state".to_string(), "checkCount".to_string()])
                );
                assert_eq!(right, Expr::Int(3));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_condition_member_access() {
        let cond = condition_of("event.captured.owner == piece.owner");
        assert!(matches!(cond, ConditionExpr::Compare { .. }));
    }

    #[test]
    fn test_condition_in_zone() {
        let cond = condition_of("in_zone hill");
        assert_eq!(cond, ConditionExpr::InZone("hill".to_string()));
    }

    #[test]
    fn test_condition_arithmetic() {
        let cond = condition_of("piece.state.x + 1 < 4 * 2");
        match cond {
            ConditionExpr::Compare { left, right, .. } => {
                assert!(matches!(left, Expr::Binary { op: BinOp::Add, .. }));
                assert!(matches!(right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    // ---- triggers and actions ----

    #[test]
    fn test_trigger_actions_brace_form() {
        let source = "\
trigger explode {
    on: capture
    do: {
        remove radius(1) from to where not type in [Pawn]
        remove at to
    }
}
";
        let game = parse_ok(source);
        let trigger = &game.triggers[0];
        assert_eq!(trigger.actions.len(), 2);
        match &trigger.actions[0] {
            ActionDecl::Remove {
                target: TargetDecl::Radius { n: 1, .. },
                filter: Some(FilterDecl::TypeNotIn(types)),
            } => assert_eq!(types, &vec!["Pawn".to_string()]),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_trigger_actions_line_form() {
        let source = "\
trigger crown {
    on: move
    when: in_zone hill
    do:
        win piece.owner
}
";
        let game = parse_ok(source);
        let trigger = &game.triggers[0];
        assert_eq!(trigger.actions.len(), 1);
        match &trigger.actions[0] {
            ActionDecl::Win(PlayerRef::Expr(expr)) => {
                assert_eq!(
                    expr.as_path(),
                    Some(vec!["piece".to_string(), "owner".to_string()])
                );
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_action_variety() {
        let source = "\
trigger spawn {
    on: turn_end
    do: {
        set state.round += 1
        create Pawn at e4 owner white
        move piece to d4
        mark d4 Trap
        draw \"agreed\"
        cancel
    }
}
";
        let game = parse_ok(source);
        let actions = &game.triggers[0].actions;
        assert_eq!(actions.len(), 6);
        assert!(matches!(actions[0], ActionDecl::Set { op: SetOp::Inc, .. }));
        assert!(matches!(
            actions[1],
            ActionDecl::Create {
                owner: PlayerRef::White,
                ..
            }
        ));
        assert!(matches!(actions[2], ActionDecl::MovePiece { .. }));
        assert!(matches!(actions[3], ActionDecl::Mark { .. }));
        assert!(matches!(actions[4], ActionDecl::Draw(Some(_))));
        assert!(matches!(actions[5], ActionDecl::Cancel));
    }

    // ---- setup ----

    #[test]
    fn test_setup_direct() {
        let source = "\
setup:
    white:
        King: e1
        Pawn: a2, b2
    black:
        King: e8
";
        let game = parse_ok(source);
        let setup = game.setup.unwrap();
        assert_eq!(setup.placements.len(), 3);
        assert_eq!(setup.placements[1].squares.len(), 2);
        assert_eq!(setup.placements[2].owner, Color::Black);
    }

    #[test]
    fn test_setup_add_replace() {
        let source = "\
setup:
    add:
        white:
            Trapper: c1
    replace:
        Knight: SuperKnight
";
        let game = parse_ok(source);
        let setup = game.setup.unwrap();
        assert_eq!(setup.add.len(), 1);
        assert_eq!(
            setup.replace,
            vec![("Knight".to_string(), "SuperKnight".to_string())]
        );
    }

    // ---- victory / draw ----

    #[test]
    fn test_victory_sub_blocks() {
        let source = "\
victory:
    add:
        hill_win: in_zone hill -> current
    remove:
        checkmate
";
        let game = parse_ok(source);
        assert_eq!(game.victory.len(), 2);
        assert_eq!(game.victory[0].action, MergeAction::Add);
        assert!(matches!(game.victory[0].winner, Some(PlayerRef::Current)));
        assert_eq!(game.victory[1].action, MergeAction::Remove);
        assert!(game.victory[1].condition.is_none());
    }

    #[test]
    fn test_victory_bare_entry_defaults_to_add() {
        let source = "victory:\n    extinction: not check\n";
        let game = parse_ok(source);
        assert_eq!(game.victory[0].action, MergeAction::Add);
    }

    #[test]
    fn test_draw_section() {
        let source = "draw:\n    exhaustion: state.round >= 200\n";
        let game = parse_ok(source);
        assert_eq!(game.draw.len(), 1);
    }

    // ---- scripts ----

    #[test]
    fn test_script_collected_verbatim() {
        let source = "script {\n    on move(e) { console.log(e); }\n}\n";
        let game = parse_ok(source);
        assert_eq!(game.scripts.len(), 1);
        assert!(game.scripts[0].source.contains("console.log(e);"));
    }

    // ---- errors ----

    #[test]
    fn test_error_carries_location() {
        let result = Parser::new(tokenize("piece {\n").unwrap()).parse_game();
        let err = result.unwrap_err();
        assert_eq!(err.location().line, 1);
        assert!(err.location().column > 1);
    }

    #[test]
    fn test_unknown_section_fails() {
        assert!(parse("conquer: everything\n").is_err());
    }

    #[test]
    fn test_first_error_halts() {
        // the bad pattern precedes a fine section; nothing is recovered
        assert!(parse("pattern p = step(\ngame: X\n").is_err());
    }
}
