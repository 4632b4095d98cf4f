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

//! The script runtime: a small imperative language for event handlers.
//!
//! A script block is a list of `on <event>(<param>) { ... }` handlers plus
//! optional top-level `let` bindings. The interpreter is the sandbox: the
//! only reachable environment is the curated `game`/`board` API plus a few
//! helpers, all routed through the engine's [`Runtime`]. There is no
//! filesystem, clock, or host object to escape to.
//!
//! Scripts are syntax-checked at compile time. Runtime failures are
//! logged through the `log` facade and swallowed; a step budget keeps
//! runaway loops from hanging the engine.

use std::collections::HashMap;
use thiserror::Error;

use super::actions::Runtime;
use super::state::EventCtx;
use crate::board::{Piece, Position, Value};
use crate::game::{DrawReason, GameResult, WinReason};
use crate::model::EventKind;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },
    #[error("Script runtime error: {0}")]
    Runtime(String),
    #[error("Script exceeded its step budget")]
    Budget,
}

/// Steps (statements + expression nodes) one handler invocation may take.
const STEP_BUDGET: u64 = 100_000;

// ---- syntax ----

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub globals: Vec<Stmt>,
    pub handlers: Vec<Handler>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handler {
    pub event: EventKind,
    pub param: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let(String, SExpr),
    Assign(String, SExpr),
    If(SExpr, Vec<Stmt>, Option<Vec<Stmt>>),
    While(SExpr, Vec<Stmt>),
    Expr(SExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<SExpr>),
    Ident(String),
    Member(Box<SExpr>, String),
    Index(Box<SExpr>, Box<SExpr>),
    Call(Box<SExpr>, Vec<SExpr>),
    Not(Box<SExpr>),
    Neg(Box<SExpr>),
    Binary(SOp, Box<SExpr>, Box<SExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

// ---- tokenizer ----

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    Punct(&'static str),
}

struct SToken {
    tok: Tok,
    line: usize,
    column: usize,
}

fn script_tokens(source: &str) -> Result<Vec<SToken>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = Vec::new();
    let (mut i, mut line, mut column) = (0usize, 1usize, 1usize);
    let syntax = |message: &str, line: usize, column: usize| ScriptError::Syntax {
        message: message.to_string(),
        line,
        column,
    };

    macro_rules! advance {
        () => {{
            if chars[i] == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
            i += 1;
        }};
    }

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            advance!();
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                advance!();
            }
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            let (start_line, start_col) = (line, column);
            advance!();
            advance!();
            loop {
                if i >= chars.len() {
                    return Err(syntax("unterminated comment", start_line, start_col));
                }
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    advance!();
                    advance!();
                    break;
                }
                advance!();
            }
            continue;
        }
        let (tok_line, tok_col) = (line, column);
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                digits.push(chars[i]);
                advance!();
            }
            let value = digits
                .parse()
                .map_err(|_| syntax("number out of range", tok_line, tok_col))?;
            out.push(SToken {
                tok: Tok::Int(value),
                line: tok_line,
                column: tok_col,
            });
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut word = String::new();
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                word.push(chars[i]);
                advance!();
            }
            out.push(SToken {
                tok: Tok::Ident(word),
                line: tok_line,
                column: tok_col,
            });
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            advance!();
            let mut value = String::new();
            loop {
                if i >= chars.len() || chars[i] == '\n' {
                    return Err(syntax("unterminated string", tok_line, tok_col));
                }
                if chars[i] == '\\' {
                    advance!();
                    if i >= chars.len() {
                        return Err(syntax("unterminated string", tok_line, tok_col));
                    }
                    value.push(match chars[i] {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    advance!();
                    continue;
                }
                if chars[i] == quote {
                    advance!();
                    break;
                }
                value.push(chars[i]);
                advance!();
            }
            out.push(SToken {
                tok: Tok::Str(value),
                line: tok_line,
                column: tok_col,
            });
            continue;
        }
        let two: Option<&'static str> = match (c, chars.get(i + 1)) {
            ('=', Some('=')) => Some("=="),
            ('!', Some('=')) => Some("!="),
            ('<', Some('=')) => Some("<="),
            ('>', Some('=')) => Some(">="),
            ('&', Some('&')) => Some("&&"),
            ('|', Some('|')) => Some("||"),
            _ => None,
        };
        if let Some(op) = two {
            advance!();
            advance!();
            out.push(SToken {
                tok: Tok::Punct(op),
                line: tok_line,
                column: tok_col,
            });
            continue;
        }
        let one: Option<&'static str> = match c {
            '{' => Some("{"),
            '}' => Some("}"),
            '(' => Some("("),
            ')' => Some(")"),
            '[' => Some("["),
            ']' => Some("]"),
            ',' => Some(","),
            ';' => Some(";"),
            '.' => Some("."),
            '=' => Some("="),
            '<' => Some("<"),
            '>' => Some(">"),
            '+' => Some("+"),
            '-' => Some("-"),
            '*' => Some("*"),
            '/' => Some("/"),
            '!' => Some("!"),
            _ => None,
        };
        match one {
            Some(op) => {
                advance!();
                out.push(SToken {
                    tok: Tok::Punct(op),
                    line: tok_line,
                    column: tok_col,
                });
            }
            None => return Err(syntax(&format!("unexpected character {c:?}"), line, column)),
        }
    }
    Ok(out)
}

// ---- parser ----

/// Parse (and thereby validate) a script block. The compiler calls this;
/// the engine calls it again when instantiating a game's scripts.
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let tokens = script_tokens(source)?;
    let mut parser = SParser { tokens, pos: 0 };
    parser.program()
}

struct SParser {
    tokens: Vec<SToken>,
    pos: usize,
}

impl SParser {
    fn err(&self, message: impl Into<String>) -> ScriptError {
        let (line, column) = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        ScriptError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.peek().cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_punct(&mut self, op: &str) -> bool {
        if let Some(Tok::Punct(p)) = self.peek() {
            if *p == op {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_punct(&mut self, op: &str) -> Result<(), ScriptError> {
        if self.eat_punct(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected {op:?}")))
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match self.bump() {
            Some(Tok::Ident(name)) => Ok(name),
            _ => Err(self.err("expected an identifier")),
        }
    }

    fn program(&mut self) -> Result<Program, ScriptError> {
        let mut globals = Vec::new();
        let mut handlers = Vec::new();
        while self.peek().is_some() {
            if self.peek() == Some(&Tok::Ident("on".to_string())) {
                self.pos += 1;
                handlers.push(self.handler()?);
            } else {
                globals.push(self.statement()?);
            }
        }
        Ok(Program { globals, handlers })
    }

    fn handler(&mut self) -> Result<Handler, ScriptError> {
        let event_name = self.ident()?;
        let event = EventKind::try_from_str(&event_name)
            .ok_or_else(|| self.err(format!("unknown event {event_name:?}")))?;
        self.expect_punct("(")?;
        let param = if let Some(Tok::Ident(_)) = self.peek() {
            Some(self.ident()?)
        } else {
            None
        };
        self.expect_punct(")")?;
        let body = self.block()?;
        Ok(Handler { event, param, body })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.peek().is_none() {
                return Err(self.err("unterminated block"));
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Some(Tok::Ident(word)) if word == "let" => {
                self.pos += 1;
                let name = self.ident()?;
                self.expect_punct("=")?;
                let value = self.expression()?;
                self.expect_punct(";")?;
                Ok(Stmt::Let(name, value))
            }
            Some(Tok::Ident(word)) if word == "if" => self.if_statement(),
            Some(Tok::Ident(word)) if word == "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let condition = self.expression()?;
                self.expect_punct(")")?;
                let body = self.block()?;
                Ok(Stmt::While(condition, body))
            }
            _ => {
                let expr = self.expression()?;
                if self.eat_punct("=") {
                    let SExpr::Ident(name) = expr else {
                        return Err(self.err("only plain variables can be assigned"));
                    };
                    let value = self.expression()?;
                    self.expect_punct(";")?;
                    return Ok(Stmt::Assign(name, value));
                }
                self.expect_punct(";")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.pos += 1; // if
        self.expect_punct("(")?;
        let condition = self.expression()?;
        self.expect_punct(")")?;
        let then_body = self.block()?;
        let else_body = if self.peek() == Some(&Tok::Ident("else".to_string())) {
            self.pos += 1;
            if self.peek() == Some(&Tok::Ident("if".to_string())) {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If(condition, then_body, else_body))
    }

    fn expression(&mut self) -> Result<SExpr, ScriptError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<SExpr, ScriptError> {
        let mut left = self.and_expr()?;
        while self.eat_punct("||") {
            let right = self.and_expr()?;
            left = SExpr::Binary(SOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<SExpr, ScriptError> {
        let mut left = self.cmp_expr()?;
        while self.eat_punct("&&") {
            let right = self.cmp_expr()?;
            left = SExpr::Binary(SOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn cmp_expr(&mut self) -> Result<SExpr, ScriptError> {
        let left = self.add_expr()?;
        for (punct, op) in [
            ("==", SOp::Eq),
            ("!=", SOp::Ne),
            ("<=", SOp::Le),
            (">=", SOp::Ge),
            ("<", SOp::Lt),
            (">", SOp::Gt),
        ] {
            if self.eat_punct(punct) {
                let right = self.add_expr()?;
                return Ok(SExpr::Binary(op, Box::new(left), Box::new(right)));
            }
        }
        Ok(left)
    }

    fn add_expr(&mut self) -> Result<SExpr, ScriptError> {
        let mut left = self.mul_expr()?;
        loop {
            if self.eat_punct("+") {
                let right = self.mul_expr()?;
                left = SExpr::Binary(SOp::Add, Box::new(left), Box::new(right));
            } else if self.eat_punct("-") {
                let right = self.mul_expr()?;
                left = SExpr::Binary(SOp::Sub, Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn mul_expr(&mut self) -> Result<SExpr, ScriptError> {
        let mut left = self.unary_expr()?;
        loop {
            if self.eat_punct("*") {
                let right = self.unary_expr()?;
                left = SExpr::Binary(SOp::Mul, Box::new(left), Box::new(right));
            } else if self.eat_punct("/") {
                let right = self.unary_expr()?;
                left = SExpr::Binary(SOp::Div, Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn unary_expr(&mut self) -> Result<SExpr, ScriptError> {
        if self.eat_punct("!") {
            return Ok(SExpr::Not(Box::new(self.unary_expr()?)));
        }
        if self.eat_punct("-") {
            return Ok(SExpr::Neg(Box::new(self.unary_expr()?)));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Result<SExpr, ScriptError> {
        let mut expr = self.primary_expr()?;
        loop {
            if self.eat_punct(".") {
                let field = self.ident()?;
                expr = SExpr::Member(Box::new(expr), field);
            } else if self.eat_punct("(") {
                let mut args = Vec::new();
                if !self.eat_punct(")") {
                    loop {
                        args.push(self.expression()?);
                        if self.eat_punct(")") {
                            break;
                        }
                        self.expect_punct(",")?;
                    }
                }
                expr = SExpr::Call(Box::new(expr), args);
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = SExpr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary_expr(&mut self) -> Result<SExpr, ScriptError> {
        match self.bump() {
            Some(Tok::Int(n)) => Ok(SExpr::Int(n)),
            Some(Tok::Str(s)) => Ok(SExpr::Str(s)),
            Some(Tok::Ident(word)) => match word.as_str() {
                "true" => Ok(SExpr::Bool(true)),
                "false" => Ok(SExpr::Bool(false)),
                "nil" | "null" => Ok(SExpr::Nil),
                _ => Ok(SExpr::Ident(word)),
            },
            Some(Tok::Punct("(")) => {
                let inner = self.expression()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            Some(Tok::Punct("[")) => {
                let mut items = Vec::new();
                if !self.eat_punct("]") {
                    loop {
                        items.push(self.expression()?);
                        if self.eat_punct("]") {
                            break;
                        }
                        self.expect_punct(",")?;
                    }
                }
                Ok(SExpr::Array(items))
            }
            _ => Err(self.err("expected an expression")),
        }
    }
}

// ---- interpreter ----

/// Per-game script instance: parsed handlers plus a persistent global
/// scope shared by every handler invocation.
#[derive(Debug, Default)]
pub struct ScriptEngine {
    programs: Vec<Program>,
    globals: HashMap<String, Value>,
    initialized: bool,
}

impl ScriptEngine {
    pub fn new(sources: &[String]) -> Self {
        // sources were validated at compile time; a parse failure here is
        // logged and the offending block is skipped
        let programs = sources
            .iter()
            .filter_map(|source| match parse_program(source) {
                Ok(program) => Some(program),
                Err(err) => {
                    log::warn!("script failed to parse at instantiation: {err}");
                    None
                }
            })
            .collect();
        Self {
            programs,
            globals: HashMap::new(),
            initialized: false,
        }
    }

    pub fn has_handlers(&self) -> bool {
        self.programs.iter().any(|p| !p.handlers.is_empty())
    }

    /// Run top-level `let` bindings once, at game start.
    pub fn initialize(&mut self, rt: &mut Runtime) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        let Self {
            programs, globals, ..
        } = self;
        for program in programs.iter() {
            let event = EventCtx::bare(EventKind::TurnStart);
            let mut frame = Interp {
                rt: &mut *rt,
                event: &event,
                param: None,
                locals: Vec::new(),
                globals: &mut *globals,
                budget: STEP_BUDGET,
            };
            if let Err(err) = frame.run_block(&program.globals) {
                log::warn!("script global initialization failed: {err}");
            }
        }
    }

    /// Dispatch an event to every matching handler, in declaration order.
    /// Handler failures are logged and swallowed; later handlers run.
    pub fn dispatch(&mut self, rt: &mut Runtime, event: &EventCtx) {
        let Self {
            programs, globals, ..
        } = self;
        for program in programs.iter() {
            for handler in &program.handlers {
                if handler.event != event.kind {
                    continue;
                }
                let mut frame = Interp {
                    rt: &mut *rt,
                    event,
                    param: handler.param.as_deref(),
                    locals: vec![HashMap::new()],
                    globals: &mut *globals,
                    budget: STEP_BUDGET,
                };
                if let Err(err) = frame.run_block(&handler.body) {
                    log::warn!("script handler for {} failed: {err}", event.kind);
                }
            }
        }
    }

    /// Reset per-game script state (used by `Engine::reset`).
    pub fn reset(&mut self) {
        self.globals.clear();
        self.initialized = false;
    }
}

struct Interp<'a, 'rt> {
    rt: &'a mut Runtime<'rt>,
    event: &'a EventCtx,
    param: Option<&'a str>,
    locals: Vec<HashMap<String, Value>>,
    globals: &'a mut HashMap<String, Value>,
    budget: u64,
}

impl<'a, 'rt> Interp<'a, 'rt> {
    fn tick(&mut self) -> Result<(), ScriptError> {
        if self.budget == 0 {
            return Err(ScriptError::Budget);
        }
        self.budget -= 1;
        Ok(())
    }

    fn run_block(&mut self, body: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in body {
            self.run_stmt(stmt)?;
        }
        Ok(())
    }

    fn run_stmt(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Let(name, expr) => {
                let value = self.eval(expr)?;
                match self.locals.last_mut() {
                    Some(scope) => scope.insert(name.clone(), value),
                    None => self.globals.insert(name.clone(), value),
                };
            }
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                for scope in self.locals.iter_mut().rev() {
                    if scope.contains_key(name) {
                        scope.insert(name.clone(), value);
                        return Ok(());
                    }
                }
                self.globals.insert(name.clone(), value);
            }
            Stmt::If(condition, then_body, else_body) => {
                if self.eval(condition)?.truthy() {
                    self.scoped(then_body)?;
                } else if let Some(body) = else_body {
                    self.scoped(body)?;
                }
            }
            Stmt::While(condition, body) => {
                while self.eval(condition)?.truthy() {
                    self.scoped(body)?;
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn scoped(&mut self, body: &[Stmt]) -> Result<(), ScriptError> {
        self.locals.push(HashMap::new());
        let result = self.run_block(body);
        self.locals.pop();
        result
    }

    fn eval(&mut self, expr: &SExpr) -> Result<Value, ScriptError> {
        self.tick()?;
        match expr {
            SExpr::Nil => Ok(Value::Nil),
            SExpr::Bool(b) => Ok(Value::Bool(*b)),
            SExpr::Int(n) => Ok(Value::Int(*n)),
            SExpr::Str(s) => Ok(Value::Str(s.clone())),
            SExpr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            SExpr::Ident(name) => Ok(self.lookup(name)),
            SExpr::Member(base, field) => self.eval_member(base, field),
            SExpr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                match (base, index.as_int()) {
                    (Value::List(items), Some(i)) if i >= 0 => {
                        Ok(items.get(i as usize).cloned().unwrap_or(Value::Nil))
                    }
                    _ => Ok(Value::Nil),
                }
            }
            SExpr::Call(callee, args) => self.eval_call(callee, args),
            SExpr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.truthy())),
            SExpr::Neg(inner) => Ok(match self.eval(inner)?.as_int() {
                Some(n) => Value::Int(-n),
                None => Value::Nil,
            }),
            SExpr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                // short-circuit booleans
                match op {
                    SOp::And => {
                        return if left.truthy() {
                            self.eval(right)
                        } else {
                            Ok(Value::Bool(false))
                        };
                    }
                    SOp::Or => {
                        return if left.truthy() { Ok(left) } else { self.eval(right) };
                    }
                    _ => {}
                }
                let right = self.eval(right)?;
                Ok(binary(*op, left, right))
            }
        }
    }

    fn lookup(&self, name: &str) -> Value {
        for scope in self.locals.iter().rev() {
            if let Some(value) = scope.get(name) {
                return value.clone();
            }
        }
        if let Some(value) = self.globals.get(name) {
            return value.clone();
        }
        Value::Nil
    }

    /// Member access: event-parameter fields resolve through the event
    /// context; everything else is nil.
    fn eval_member(&mut self, base: &SExpr, field: &str) -> Result<Value, ScriptError> {
        if let SExpr::Ident(name) = base {
            if Some(name.as_str()) == self.param {
                return Ok(event_field(self.rt, self.event, field));
            }
        }
        if let SExpr::Member(inner, mid) = base {
            if let SExpr::Ident(name) = inner.as_ref() {
                if Some(name.as_str()) == self.param {
                    let object = event_piece_field(self.rt, self.event, mid, field);
                    return Ok(object);
                }
            }
        }
        Ok(Value::Nil)
    }

    fn eval_call(&mut self, callee: &SExpr, args: &[SExpr]) -> Result<Value, ScriptError> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        match callee {
            SExpr::Member(base, method) => {
                let SExpr::Ident(object) = base.as_ref() else {
                    return Err(ScriptError::Runtime(format!(
                        "cannot call method {method:?} there"
                    )));
                };
                match object.as_str() {
                    "game" => self.game_call(method, &values),
                    "board" => self.board_call(method, &values),
                    "console" => {
                        log::info!(
                            "script: {}",
                            values
                                .iter()
                                .map(|v| v.to_string())
                                .collect::<Vec<_>>()
                                .join(" ")
                        );
                        Ok(Value::Nil)
                    }
                    other => Err(ScriptError::Runtime(format!(
                        "unknown api object {other:?}"
                    ))),
                }
            }
            SExpr::Ident(helper) => match helper.as_str() {
                "to_square" => {
                    let (Some(file), Some(rank)) = (
                        values.first().and_then(Value::as_int),
                        values.get(1).and_then(Value::as_int),
                    ) else {
                        return Ok(Value::Nil);
                    };
                    if file < 0 || rank < 0 {
                        return Ok(Value::Nil);
                    }
                    Ok(Value::Str(
                        Position::new(file as usize, rank as usize).to_algebraic(),
                    ))
                }
                "parse_square" => Ok(match values.first().and_then(|v| v.as_str()) {
                    Some(s) => match Position::try_from_string(s) {
                        Some(pos) => Value::Str(pos.to_algebraic()),
                        None => Value::Nil,
                    },
                    None => Value::Nil,
                }),
                "distance" => {
                    let (Some(a), Some(b)) = (
                        values.first().and_then(|v| v.as_str()).and_then(Position::try_from_string),
                        values.get(1).and_then(|v| v.as_str()).and_then(Position::try_from_string),
                    ) else {
                        return Ok(Value::Nil);
                    };
                    Ok(Value::Int(a.distance(&b) as i64))
                }
                other => Err(ScriptError::Runtime(format!("unknown function {other:?}"))),
            },
            _ => Err(ScriptError::Runtime("bad call target".to_string())),
        }
    }

    // ---- host api: game ----

    fn game_call(&mut self, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match method {
            "state" | "get" => {
                let Some(key) = args.first().and_then(|v| v.as_str()) else {
                    return Ok(Value::Nil);
                };
                Ok(self.rt.state.get_custom(key))
            }
            "set" => {
                let (Some(key), Some(value)) = (args.first().and_then(|v| v.as_str()), args.get(1))
                else {
                    return Ok(Value::Nil);
                };
                self.rt.state.set_custom(key.to_string(), value.clone());
                Ok(Value::Nil)
            }
            "piece_at" => {
                let pos = arg_square(args, 0);
                Ok(match pos.and_then(|p| self.rt.board.piece_at(p)) {
                    Some(piece) => Value::Str(piece.kind().to_string()),
                    None => Value::Nil,
                })
            }
            "create_piece" => {
                let (Some(kind), Some(pos), Some(owner)) = (
                    args.first().and_then(|v| v.as_str()).map(str::to_string),
                    arg_square(args, 1),
                    args.get(2)
                        .and_then(|v| v.as_str())
                        .and_then(crate::board::Color::try_from_string),
                ) else {
                    return Ok(Value::Bool(false));
                };
                let Some(def) = self.rt.game.piece_def(&kind) else {
                    return Ok(Value::Bool(false));
                };
                if !self.rt.board.contains(pos) {
                    return Ok(Value::Bool(false));
                }
                if !self.rt.board.is_empty(pos) && !self.rt.options.create_replaces {
                    return Ok(Value::Bool(false));
                }
                let piece = Piece::new(self.rt.ids.next_piece(), &kind, owner, pos)
                    .with_traits(def.traits.iter().cloned())
                    .with_state(def.initial_state.clone());
                let id = piece.id();
                if self.rt.board.place(piece).is_ok() {
                    self.rt.spawned.push(EventCtx {
                        kind: EventKind::Place,
                        piece: Some(id),
                        from: None,
                        to: Some(pos),
                        captured: None,
                    });
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(false))
                }
            }
            "remove_piece" => {
                let Some(pos) = arg_square(args, 0) else {
                    return Ok(Value::Bool(false));
                };
                match self.rt.board.remove_at(pos) {
                    Some(removed) => {
                        self.rt.spawned.push(EventCtx {
                            kind: EventKind::Remove,
                            piece: Some(removed.id()),
                            from: Some(removed.pos()),
                            to: None,
                            captured: Some(removed),
                        });
                        Ok(Value::Bool(true))
                    }
                    None => Ok(Value::Bool(false)),
                }
            }
            "move_piece" => {
                let (Some(from), Some(to)) = (arg_square(args, 0), arg_square(args, 1)) else {
                    return Ok(Value::Bool(false));
                };
                let Some(id) = self.rt.board.piece_at(from).map(|p| p.id()) else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(self.rt.board.relocate(id, to).is_ok()))
            }
            "mark" => {
                let (Some(pos), Some(effect)) = (
                    arg_square(args, 0),
                    args.get(1).and_then(|v| v.as_str()).map(str::to_string),
                ) else {
                    return Ok(Value::Bool(false));
                };
                let Some(def) = self.rt.game.effects.get(&effect) else {
                    return Ok(Value::Bool(false));
                };
                let mut marker = crate::board::Effect::new(
                    self.rt.ids.next_effect(),
                    def.name.clone(),
                    def.blocks,
                )
                .with_owner(self.rt.state.current);
                if let Some(duration) = def.duration {
                    marker = marker.with_duration(duration);
                }
                Ok(Value::Bool(self.rt.board.add_effect(pos, marker).is_ok()))
            }
            "win" => {
                let winner = args
                    .first()
                    .and_then(|v| v.as_str())
                    .and_then(crate::board::Color::try_from_string);
                if let Some(color) = winner {
                    if self.rt.state.result.is_none() {
                        self.rt.state.result = Some(GameResult::Win(
                            color,
                            WinReason::Action("script".to_string()),
                        ));
                    }
                }
                Ok(Value::Nil)
            }
            "draw" => {
                if self.rt.state.result.is_none() {
                    let reason = args.first().and_then(|v| v.as_str()).map(str::to_string);
                    self.rt.state.result = Some(GameResult::Draw(DrawReason::Action(reason)));
                }
                Ok(Value::Nil)
            }
            "current_player" => Ok(Value::Str(self.rt.state.current.to_string().to_lowercase())),
            other => Err(ScriptError::Runtime(format!(
                "unknown game method {other:?}"
            ))),
        }
    }

    // ---- host api: board ----

    fn board_call(&mut self, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
        match method {
            "at" => {
                let pos = arg_square(args, 0);
                Ok(match pos.and_then(|p| self.rt.board.piece_at(p)) {
                    Some(piece) => Value::Str(piece.kind().to_string()),
                    None => Value::Nil,
                })
            }
            "pieces" => {
                let owner = args
                    .first()
                    .and_then(|v| v.as_str())
                    .and_then(crate::board::Color::try_from_string);
                let squares: Vec<Value> = self
                    .rt
                    .board
                    .pieces()
                    .filter(|p| owner.map_or(true, |o| p.owner() == o))
                    .map(|p| Value::Str(p.pos().to_algebraic()))
                    .collect();
                Ok(Value::List(squares))
            }
            "empty_squares" => Ok(Value::List(
                self.rt
                    .board
                    .empty_squares()
                    .map(|p| Value::Str(p.to_algebraic()))
                    .collect(),
            )),
            "adjacent" => {
                let Some(center) = arg_square(args, 0) else {
                    return Ok(Value::List(Vec::new()));
                };
                Ok(Value::List(
                    self.rt
                        .board
                        .positions()
                        .filter(|p| p.is_adjacent(&center))
                        .map(|p| Value::Str(p.to_algebraic()))
                        .collect(),
                ))
            }
            "is_valid" => Ok(Value::Bool(
                arg_square(args, 0).map_or(false, |p| self.rt.board.contains(p)),
            )),
            "distance" => {
                let (Some(a), Some(b)) = (arg_square(args, 0), arg_square(args, 1)) else {
                    return Ok(Value::Nil);
                };
                Ok(Value::Int(a.distance(&b) as i64))
            }
            other => Err(ScriptError::Runtime(format!(
                "unknown board method {other:?}"
            ))),
        }
    }
}

fn arg_square(args: &[Value], index: usize) -> Option<Position> {
    args.get(index)
        .and_then(|v| v.as_str())
        .and_then(Position::try_from_string)
}

fn event_field(rt: &Runtime, event: &EventCtx, field: &str) -> Value {
    match field {
        "kind" | "type" => Value::Str(event.kind.to_string()),
        "from" => event
            .from
            .map(|p| Value::Str(p.to_algebraic()))
            .unwrap_or(Value::Nil),
        "to" => event
            .to
            .map(|p| Value::Str(p.to_algebraic()))
            .unwrap_or(Value::Nil),
        "piece" => match event.piece.and_then(|id| rt.board.piece(id)) {
            Some(piece) => Value::Str(piece.kind().to_string()),
            None => Value::Nil,
        },
        "captured" => match &event.captured {
            Some(piece) => Value::Str(piece.kind().to_string()),
            None => Value::Nil,
        },
        _ => Value::Nil,
    }
}

/// `e.piece.owner`, `e.captured.type`, ...
fn event_piece_field(rt: &Runtime, event: &EventCtx, object: &str, field: &str) -> Value {
    let piece: Option<&Piece> = match object {
        "piece" => event.piece.and_then(|id| rt.board.piece(id)),
        "captured" => event.captured.as_ref(),
        _ => None,
    };
    let Some(piece) = piece else {
        return Value::Nil;
    };
    match field {
        "type" | "kind" => Value::Str(piece.kind().to_string()),
        "owner" => Value::Str(piece.owner().to_string().to_lowercase()),
        "pos" | "square" => Value::Str(piece.pos().to_algebraic()),
        "moved" => Value::Bool(piece.has_moved()),
        _ => Value::Nil,
    }
}

fn binary(op: SOp, left: Value, right: Value) -> Value {
    use SOp::*;
    match op {
        Add => match (&left, &right) {
            (Value::Str(l), r) => Value::Str(format!("{l}{r}")),
            _ => int_op(left, right, |l, r| l + r),
        },
        Sub => int_op(left, right, |l, r| l - r),
        Mul => int_op(left, right, |l, r| l * r),
        Div => match (left.as_int(), right.as_int()) {
            (Some(l), Some(r)) if r != 0 => Value::Int(l / r),
            _ => Value::Nil,
        },
        Eq => Value::Bool(left == right),
        Ne => Value::Bool(left != right),
        Lt | Gt | Le | Ge => match (left.as_int(), right.as_int()) {
            (Some(l), Some(r)) => Value::Bool(match op {
                Lt => l < r,
                Gt => l > r,
                Le => l <= r,
                Ge => l >= r,
                _ => unreachable!(),
            }),
            _ => Value::Bool(false),
        },
        And | Or => unreachable!("short-circuited in eval"),
    }
}

fn int_op(left: Value, right: Value, f: impl Fn(i64, i64) -> i64) -> Value {
    match (left.as_int(), right.as_int()) {
        (Some(l), Some(r)) => Value::Int(f(l, r)),
        _ => Value::Nil,
    }
}
