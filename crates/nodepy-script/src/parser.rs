// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Recursive-descent parser.

use crate::ast::{Expr, ExprKind, Program, Stmt, StmtKind, Target};
use crate::error::{Result, ScriptError};
use crate::lexer::{tokenize, Token, TokenKind};

/// Parse a source string into a [`Program`].
pub fn parse(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.check(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.statement()?);
            if !self.check(&TokenKind::Eof) {
                self.expect_separator()?;
            }
        }
        Ok(Program { stmts })
    }

    fn statement(&mut self) -> Result<Stmt> {
        let line = self.peek().line;
        let expr = self.expression()?;

        if self.check(&TokenKind::Assign) {
            self.advance();
            let target = match expr.kind {
                ExprKind::Ident(name) => Target::Ident(name),
                ExprKind::Member { object, name } => Target::Member { object, name },
                _ => {
                    return Err(ScriptError::Syntax {
                        line,
                        message: "invalid assignment target".into(),
                    })
                }
            };
            let value = self.expression()?;
            return Ok(Stmt { line, kind: StmtKind::Assign { target, value } });
        }

        Ok(Stmt { line, kind: StmtKind::Expr(expr) })
    }

    /// expression := postfix (("==" | "!=") postfix)?
    fn expression(&mut self) -> Result<Expr> {
        let lhs = self.postfix()?;
        let line = lhs.line;
        match self.peek().kind {
            TokenKind::EqEq => {
                self.advance();
                let rhs = self.postfix()?;
                Ok(Expr {
                    line,
                    kind: ExprKind::Eq { lhs: Box::new(lhs), rhs: Box::new(rhs) },
                })
            }
            TokenKind::NotEq => {
                self.advance();
                let rhs = self.postfix()?;
                Ok(Expr {
                    line,
                    kind: ExprKind::Ne { lhs: Box::new(lhs), rhs: Box::new(rhs) },
                })
            }
            _ => Ok(lhs),
        }
    }

    /// postfix := primary ("." ident | "(" args ")")*
    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let line = self.peek().line;
                    let name = self.expect_ident()?;
                    expr = Expr {
                        line,
                        kind: ExprKind::Member { object: Box::new(expr), name },
                    };
                }
                TokenKind::LParen => {
                    let line = self.peek().line;
                    self.advance();
                    let mut args = Vec::new();
                    self.skip_newlines();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.expression()?);
                            self.skip_newlines();
                            if self.check(&TokenKind::Comma) {
                                self.advance();
                                self.skip_newlines();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr {
                        line,
                        kind: ExprKind::Call { callee: Box::new(expr), args },
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        let line = token.line;
        match token.kind {
            TokenKind::Null => {
                self.advance();
                Ok(Expr { line, kind: ExprKind::Null })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr { line, kind: ExprKind::Bool(true) })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr { line, kind: ExprKind::Bool(false) })
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr { line, kind: ExprKind::Number(n) })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr { line, kind: ExprKind::Str(s) })
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr { line, kind: ExprKind::Ident(name) })
            }
            TokenKind::LBrace => self.object_literal(),
            TokenKind::LBracket => self.array_literal(),
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let expr = self.expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            other => Err(ScriptError::Syntax {
                line,
                message: format!("unexpected token {:?}", other),
            }),
        }
    }

    /// `{key: expr, 'key': expr, ...}` — keys are identifiers or strings.
    fn object_literal(&mut self) -> Result<Expr> {
        let line = self.peek().line;
        self.expect(&TokenKind::LBrace)?;
        let mut entries = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RBrace) {
            let key = match self.peek().kind.clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    name
                }
                TokenKind::Str(s) => {
                    self.advance();
                    s
                }
                other => {
                    return Err(ScriptError::Syntax {
                        line: self.peek().line,
                        message: format!("expected object key, found {:?}", other),
                    })
                }
            };
            self.expect(&TokenKind::Colon)?;
            self.skip_newlines();
            let value = self.expression()?;
            entries.push((key, value));
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.skip_newlines();
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr { line, kind: ExprKind::Object(entries) })
    }

    fn array_literal(&mut self) -> Result<Expr> {
        let line = self.peek().line;
        self.expect(&TokenKind::LBracket)?;
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.expression()?);
            self.skip_newlines();
            if self.check(&TokenKind::Comma) {
                self.advance();
                self.skip_newlines();
            } else {
                break;
            }
        }
        self.skip_newlines();
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr { line, kind: ExprKind::Array(items) })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<()> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(ScriptError::Syntax {
                line: self.peek().line,
                message: format!("expected {:?}, found {:?}", kind, self.peek().kind),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ScriptError::Syntax {
                line: self.peek().line,
                message: format!("expected identifier, found {:?}", other),
            }),
        }
    }

    fn expect_separator(&mut self) -> Result<()> {
        match self.peek().kind {
            TokenKind::Newline | TokenKind::Semi => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            ref other => Err(ScriptError::Syntax {
                line: self.peek().line,
                message: format!("expected end of statement, found {:?}", other),
            }),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Semi) {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_and_call() {
        let program = parse("x = require('./b')\nexports = {x: x}").unwrap();
        assert_eq!(program.stmts.len(), 2);
        match &program.stmts[0].kind {
            StmtKind::Assign { target: Target::Ident(name), value } => {
                assert_eq!(name, "x");
                assert!(matches!(value.kind, ExprKind::Call { .. }));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_member_assignment() {
        let program = parse("exports.x = 1").unwrap();
        match &program.stmts[0].kind {
            StmtKind::Assign { target: Target::Member { name, .. }, .. } => {
                assert_eq!(name, "x");
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn parses_semicolon_separated_statements() {
        let program = parse("a = 1; b = 2; c = a == b").unwrap();
        assert_eq!(program.stmts.len(), 3);
        assert_eq!(program.stmts[2].line, 1);
    }

    #[test]
    fn statement_lines_survive_blank_lines() {
        let program = parse("\n\nx = 1\n\ny = 2\n").unwrap();
        assert_eq!(program.stmts[0].line, 3);
        assert_eq!(program.stmts[1].line, 5);
    }

    #[test]
    fn multiline_object_literal() {
        let program = parse("exports = {\n  a: 1,\n  b: 'two'\n}").unwrap();
        match &program.stmts[0].kind {
            StmtKind::Assign { value, .. } => match &value.kind {
                ExprKind::Object(entries) => assert_eq!(entries.len(), 2),
                other => panic!("unexpected expression {:?}", other),
            },
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        assert!(parse("1 = 2").is_err());
    }

    #[test]
    fn ast_serde_round_trip() {
        let program = parse("x = require('./b')\nexports = {x: x}").unwrap();
        let encoded = serde_json::to_string(&program).unwrap();
        let decoded: Program = serde_json::from_str(&encoded).unwrap();
        assert_eq!(program, decoded);
    }
}
