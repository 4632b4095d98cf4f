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

use thiserror::Error;

use super::token::{Keyword, SourceLocation, Token, TokenKind};
use crate::board::Position;

use TokenKind::*;

#[derive(Error, Debug)]
pub enum LexError {
    #[error("Unexpected character {ch:?} at {loc}")]
    UnexpectedChar { ch: char, loc: SourceLocation },
    #[error("Unterminated string literal at {loc}")]
    UnterminatedString { loc: SourceLocation },
    #[error("Newline in string literal at {loc}")]
    NewlineInString { loc: SourceLocation },
    #[error("Unknown escape sequence '\\{ch}' at {loc}")]
    BadEscape { ch: char, loc: SourceLocation },
    #[error("Unterminated block comment at {loc}")]
    UnterminatedComment { loc: SourceLocation },
    #[error("Number out of range at {loc}")]
    BadNumber { loc: SourceLocation },
    #[error("Indentation does not match any outer level at {loc}")]
    BadIndent { loc: SourceLocation },
    #[error("Ambiguous mix of tabs and spaces in indentation at {loc}")]
    AmbiguousIndent { loc: SourceLocation },
    #[error("Unterminated script block at {loc}")]
    UnterminatedScript { loc: SourceLocation },
}

impl LexError {
    pub fn location(&self) -> SourceLocation {
        use LexError::*;
        match self {
            UnexpectedChar { loc, .. }
            | UnterminatedString { loc }
            | NewlineInString { loc }
            | BadEscape { loc, .. }
            | UnterminatedComment { loc }
            | BadNumber { loc }
            | BadIndent { loc }
            | AmbiguousIndent { loc }
            | UnterminatedScript { loc } => *loc,
        }
    }
}

/// Width a tab advances the column by.
const TAB_WIDTH: usize = 4;

/// Tokenize a full source file.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

/// Indentation-sensitive tokenizer.
///
/// Layout works like Python's: the column of the first token on each line
/// is compared against a stack of indent levels, emitting INDENT/DEDENT
/// as the stack grows and shrinks. Blank and comment-only lines never
/// carry tokens, so they are invisible to layout. Inside brackets and
/// braces, INDENT/DEDENT are suppressed (brace blocks are layout-free),
/// but NEWLINE is still emitted at bracket depth zero only.
///
/// A `script` keyword followed by `{` switches the lexer into verbatim
/// mode until the matching close brace; the body comes out as a single
/// `ScriptBody` token with all whitespace preserved.
struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    line_had_tokens: bool,
    leading_space: bool,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            depth: 0,
            indents: vec![1],
            at_line_start: true,
            line_had_tokens: false,
            leading_space: false,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' => {
                    self.advance();
                    if self.depth == 0 && self.line_had_tokens {
                        self.push_at(Newline, self.here(0));
                    }
                    self.line_had_tokens = false;
                    self.at_line_start = true;
                    self.leading_space = false;
                }
                ' ' => {
                    if self.at_line_start {
                        self.leading_space = true;
                    }
                    self.advance();
                }
                '\t' => {
                    if self.at_line_start && self.leading_space && self.depth == 0 {
                        return Err(LexError::AmbiguousIndent { loc: self.here(1) });
                    }
                    self.advance();
                }
                '\r' => {
                    self.advance();
                }
                '#' => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                _ => {
                    if self.at_line_start && self.depth == 0 {
                        self.handle_indent()?;
                    }
                    self.at_line_start = false;
                    self.line_had_tokens = true;
                    self.lex_token()?;
                }
            }
        }
        if self.line_had_tokens {
            self.push_at(Newline, self.here(0));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_at(Dedent, self.here(0));
        }
        self.push_at(Eof, self.here(0));
        Ok(self.tokens)
    }

    // ---- character plumbing ----

    #[inline]
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            '\t' => self.column += TAB_WIDTH,
            _ => self.column += 1,
        }
        Some(c)
    }

    fn here(&self, length: usize) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.pos, length)
    }

    fn push_at(&mut self, kind: TokenKind, loc: SourceLocation) {
        self.tokens.push(Token::new(kind, loc));
    }

    // ---- layout ----

    fn handle_indent(&mut self) -> Result<(), LexError> {
        let col = self.column;
        let current = *self.indents.last().expect("indent stack never empty");
        if col > current {
            self.indents.push(col);
            self.push_at(Indent, self.here(0));
        } else if col < current {
            while col < *self.indents.last().expect("indent stack never empty") {
                self.indents.pop();
                self.push_at(Dedent, self.here(0));
            }
            if col != *self.indents.last().expect("indent stack never empty") {
                return Err(LexError::BadIndent { loc: self.here(0) });
            }
        }
        Ok(())
    }

    // ---- comments ----

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.here(2);
        self.advance(); // '/'
        self.advance(); // '*'
        loop {
            match self.peek() {
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return Ok(());
                }
                Some(_) => {
                    self.advance();
                }
                None => return Err(LexError::UnterminatedComment { loc: start }),
            }
        }
    }

    // ---- tokens ----

    fn lex_token(&mut self) -> Result<(), LexError> {
        let c = self.peek().expect("lex_token called at EOF");
        if c == '"' || c == '\'' {
            return self.lex_string(c);
        }
        if c.is_ascii_digit() {
            return self.lex_number();
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return self.lex_word();
        }
        self.lex_punctuation()
    }

    fn lex_string(&mut self, quote: char) -> Result<(), LexError> {
        let start = self.here(0);
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { loc: start }),
                Some('\n') => return Err(LexError::NewlineInString { loc: self.here(1) }),
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(LexError::BadEscape {
                                ch: other,
                                loc: self.here(1),
                            })
                        }
                        None => return Err(LexError::UnterminatedString { loc: start }),
                    };
                    self.advance();
                    value.push(escaped);
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }
        let length = self.pos - start.offset;
        self.push_at(
            Str(value),
            SourceLocation::new(start.line, start.column, start.offset, length),
        );
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let start = self.here(0);
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.advance();
        }
        let value: i64 = digits
            .parse()
            .map_err(|_| LexError::BadNumber { loc: start })?;
        let length = self.pos - start.offset;
        self.push_at(
            Number(value),
            SourceLocation::new(start.line, start.column, start.offset, length),
        );
        Ok(())
    }

    fn lex_word(&mut self) -> Result<(), LexError> {
        let start = self.here(0);
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            word.push(c);
            self.advance();
        }
        let length = self.pos - start.offset;
        let loc = SourceLocation::new(start.line, start.column, start.offset, length);

        if word == "script" {
            self.push_at(Keyword(Keyword::Script), loc);
            return self.try_enter_script();
        }
        let kind = if let Some(kw) = Keyword::try_from_str(&word) {
            Keyword(kw)
        } else if word == "true" {
            Bool(true)
        } else if word == "false" {
            Bool(false)
        } else if let Some(pos) = square_literal(&word) {
            Square(pos)
        } else {
            Ident(word)
        };
        self.push_at(kind, loc);
        Ok(())
    }

    /// After a `script` keyword: if the next non-space character is `{`,
    /// capture everything through the matching close brace verbatim.
    fn try_enter_script(&mut self) -> Result<(), LexError> {
        let mut ahead = 0;
        while matches!(self.peek_at(ahead), Some(' ') | Some('\t')) {
            ahead += 1;
        }
        if self.peek_at(ahead) != Some('{') {
            return Ok(()); // parser reports the malformed block
        }
        while self.peek() != Some('{') {
            self.advance();
        }
        let open = self.here(1);
        self.advance();
        self.push_at(LBrace, open);

        let body_start = self.here(0);
        let mut body = String::new();
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError::UnterminatedScript { loc: open });
            };
            match quote {
                Some(q) => {
                    if c == '\\' {
                        body.push(c);
                        self.advance();
                        if let Some(next) = self.peek() {
                            body.push(next);
                            self.advance();
                        }
                        continue;
                    }
                    if c == q || c == '\n' {
                        quote = None;
                    }
                }
                None => match c {
                    '"' | '\'' => quote = Some(c),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            let length = self.pos - body_start.offset;
                            self.push_at(
                                ScriptBody(body),
                                SourceLocation::new(
                                    body_start.line,
                                    body_start.column,
                                    body_start.offset,
                                    length,
                                ),
                            );
                            let close = self.here(1);
                            self.advance();
                            self.push_at(RBrace, close);
                            return Ok(());
                        }
                    }
                    _ => {}
                },
            }
            body.push(c);
            self.advance();
        }
    }

    fn lex_punctuation(&mut self) -> Result<(), LexError> {
        let c = self.peek().expect("lex_punctuation called at EOF");
        let two = |this: &Self, second: char| this.peek_at(1) == Some(second);

        let (kind, width) = match c {
            '{' => (LBrace, 1),
            '}' => (RBrace, 1),
            '[' => (LBracket, 1),
            ']' => (RBracket, 1),
            '(' => (LParen, 1),
            ')' => (RParen, 1),
            ',' => (Comma, 1),
            ':' => (Colon, 1),
            '.' => (Dot, 1),
            '|' => (Pipe, 1),
            '&' => (Amp, 1),
            '=' if two(self, '=') => (EqEq, 2),
            '=' => (Assign, 1),
            '!' if two(self, '=') => (NotEq, 2),
            '<' if two(self, '=') => (Le, 2),
            '<' => (Lt, 1),
            '>' if two(self, '=') => (Ge, 2),
            '>' => (Gt, 1),
            '+' if two(self, '=') => (PlusEq, 2),
            '+' => (Plus, 1),
            '-' if two(self, '=') => (MinusEq, 2),
            '-' if two(self, '>') => (Arrow, 2),
            '-' => (Minus, 1),
            '*' => (Star, 1),
            '/' => (Slash, 1),
            other => {
                return Err(LexError::UnexpectedChar {
                    ch: other,
                    loc: self.here(1),
                })
            }
        };
        let loc = self.here(width);
        for _ in 0..width {
            self.advance();
        }
        match kind {
            LBrace | LBracket | LParen => self.depth += 1,
            RBrace | RBracket | RParen => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.push_at(kind, loc);
        Ok(())
    }
}

/// Squares are `[a-z][1-9][0-9]?` with rank 1..=99; anything else keeps
/// being an identifier.
fn square_literal(word: &str) -> Option<Position> {
    let mut chars = word.chars();
    let first = chars.next()?;
    if !first.is_ascii_lowercase() {
        return None;
    }
    let rest: String = chars.collect();
    if rest.is_empty() || rest.len() > 2 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if rest.starts_with('0') {
        return None;
    }
    Position::try_from_string(word)
}
