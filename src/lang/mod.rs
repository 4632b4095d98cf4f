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

//! The variant description language: an indentation-sensitive surface
//! with embedded brace blocks and verbatim script regions.
//!
//! Pipeline: source text -> [`tokenize`] -> token stream -> [`parse`] ->
//! [`GameDecl`] AST. Lowering the AST into an executable game lives in
//! [`crate::model`].

mod ast;
mod lexer;
mod parser;
mod token;

pub use ast::*;
pub use lexer::{tokenize, LexError};
pub use parser::{parse, ParseError, Parser};
pub use token::{Keyword, SourceLocation, Token, TokenKind};
