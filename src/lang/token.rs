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

use crate::board::Position;

/// A half-open region of the source text, tracked on every token and
/// carried by every pipeline error for diagnostics. Line and column are
/// 1-indexed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub length: usize,
}

impl SourceLocation {
    pub const fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Reserved words. Anything else alphabetic is an identifier; the parser
/// matches contextual words (`optional`, `owner`, `width`, ...) by text.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Game,
    Extends,
    Board,
    Pieces,
    Victory,
    Draw,
    Rules,
    Trigger,
    Script,
    Piece,
    State,
    Effect,
    Setup,
    Add,
    Replace,
    Remove,
    Zones,
    Size,
    Move,
    Capture,
    Traits,
    On,
    Do,
    When,
    If,
    Then,
    Else,
    And,
    Or,
    Not,
    In,
    At,
    From,
    To,
    Where,
    Radius,
    Adjacent,
    Line,
    Pattern,
    Step,
    Slide,
    Leap,
    Hop,
    Rider,
    Set,
    Create,
    Win,
    Mark,
    Cancel,
}

impl Keyword {
    pub fn try_from_str(word: &str) -> Option<Self> {
        use Keyword::*;
        let kw = match word {
            "game" => Game,
            "extends" => Extends,
            "board" => Board,
            "pieces" => Pieces,
            "victory" => Victory,
            "draw" => Draw,
            "rules" => Rules,
            "trigger" => Trigger,
            "script" => Script,
            "piece" => Piece,
            "state" => State,
            "effect" => Effect,
            "setup" => Setup,
            "add" => Add,
            "replace" => Replace,
            "remove" => Remove,
            "zones" => Zones,
            "size" => Size,
            "move" => Move,
            "capture" => Capture,
            "traits" => Traits,
            "on" => On,
            "do" => Do,
            "when" => When,
            "if" => If,
            "then" => Then,
            "else" => Else,
            "and" => And,
            "or" => Or,
            "not" => Not,
            "in" => In,
            "at" => At,
            "from" => From,
            "to" => To,
            "where" => Where,
            "radius" => Radius,
            "adjacent" => Adjacent,
            "line" => Line,
            "pattern" => Pattern,
            "step" => Step,
            "slide" => Slide,
            "leap" => Leap,
            "hop" => Hop,
            "rider" => Rider,
            "set" => Set,
            "create" => Create,
            "win" => Win,
            "mark" => Mark,
            "cancel" => Cancel,
            _ => return None,
        };
        Some(kw)
    }

    pub fn as_str(&self) -> &'static str {
        use Keyword::*;
        match self {
            Game => "game",
            Extends => "extends",
            Board => "board",
            Pieces => "pieces",
            Victory => "victory",
            Draw => "draw",
            Rules => "rules",
            Trigger => "trigger",
            Script => "script",
            Piece => "piece",
            State => "state",
            Effect => "effect",
            Setup => "setup",
            Add => "add",
            Replace => "replace",
            Remove => "remove",
            Zones => "zones",
            Size => "size",
            Move => "move",
            Capture => "capture",
            Traits => "traits",
            On => "on",
            Do => "do",
            When => "when",
            If => "if",
            Then => "then",
            Else => "else",
            And => "and",
            Or => "or",
            Not => "not",
            In => "in",
            At => "at",
            From => "from",
            To => "to",
            Where => "where",
            Radius => "radius",
            Adjacent => "adjacent",
            Line => "line",
            Pattern => "pattern",
            Step => "step",
            Slide => "slide",
            Leap => "leap",
            Hop => "hop",
            Rider => "rider",
            Set => "set",
            Create => "create",
            Win => "win",
            Mark => "mark",
            Cancel => "cancel",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum TokenKind {
    // structure
    Newline,
    Indent,
    Dedent,
    Eof,

    // literals
    Number(i64),
    Str(String),
    Bool(bool),
    Square(Position),
    Ident(String),
    Keyword(Keyword),
    /// Verbatim script source between `script {` and its matching `}`.
    ScriptBody(String),

    // punctuation
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    Pipe,
    Amp,
    Arrow,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    PlusEq,
    MinusEq,
    Plus,
    Minus,
    Star,
    Slash,
}

impl TokenKind {
    /// Short human name used in "expected X, found Y" diagnostics.
    pub fn describe(&self) -> String {
        use TokenKind::*;
        match self {
            Newline => "newline".to_string(),
            Indent => "indent".to_string(),
            Dedent => "dedent".to_string(),
            Eof => "end of input".to_string(),
            Number(n) => format!("number {n}"),
            Str(s) => format!("string {s:?}"),
            Bool(b) => format!("{b}"),
            Square(pos) => format!("square {pos}"),
            Ident(name) => format!("identifier {name:?}"),
            Keyword(kw) => format!("keyword {:?}", kw.as_str()),
            ScriptBody(_) => "script body".to_string(),
            LBrace => "'{'".to_string(),
            RBrace => "'}'".to_string(),
            LBracket => "'['".to_string(),
            RBracket => "']'".to_string(),
            LParen => "'('".to_string(),
            RParen => "')'".to_string(),
            Comma => "','".to_string(),
            Colon => "':'".to_string(),
            Dot => "'.'".to_string(),
            Pipe => "'|'".to_string(),
            Amp => "'&'".to_string(),
            Arrow => "'->'".to_string(),
            Assign => "'='".to_string(),
            EqEq => "'=='".to_string(),
            NotEq => "'!='".to_string(),
            Lt => "'<'".to_string(),
            Gt => "'>'".to_string(),
            Le => "'<='".to_string(),
            Ge => "'>='".to_string(),
            PlusEq => "'+='".to_string(),
            MinusEq => "'-='".to_string(),
            Plus => "'+'".to_string(),
            Minus => "'-'".to_string(),
            Star => "'*'".to_string(),
            Slash => "'/'".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        for word in ["game", "extends", "slide", "cancel", "where"] {
            let kw = Keyword::try_from_str(word).unwrap();
            assert_eq!(kw.as_str(), word);
        }
    }

    #[test]
    fn test_non_keywords() {
        assert!(Keyword::try_from_str("optional").is_none());
        assert!(Keyword::try_from_str("owner").is_none());
        assert!(Keyword::try_from_str("King").is_none());
    }
}
