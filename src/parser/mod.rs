//! Parser for the pseudocode language
//!
//! A recursive descent parser that produces a [`ParsedProgram`] from a token
//! stream. The main module is the statement list that precedes the first
//! `funcion` or `procedimiento`.

use crate::ast::*;
use crate::common::Span;
use crate::diagnostics::CompileError;
use crate::lexer::{Token, TokenKind};
use crate::types::AtomicKind;
use indexmap::IndexMap;

/// Parse a token stream into a program tree
pub fn parse(tokens: &[Token]) -> Result<ParsedProgram, CompileError> {
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

/// Parser state
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

/// Tokens that close a statement list
const BLOCK_END: &[TokenKind] = &[
    TokenKind::Eof,
    TokenKind::Sino,
    TokenKind::FinSi,
    TokenKind::FinMientras,
    TokenKind::Hasta,
    TokenKind::FinPara,
    TokenKind::FinFuncion,
    TokenKind::FinProcedimiento,
    TokenKind::Funcion,
    TokenKind::Procedimiento,
];

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &'a Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn peek(&self) -> TokenKind {
        if self.tokens.is_empty() {
            return TokenKind::Eof;
        }
        self.current().kind
    }

    fn peek_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek())
    }

    fn span(&self) -> Span {
        if self.tokens.is_empty() {
            return Span::default();
        }
        self.current().span
    }

    fn previous_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> &'a Token {
        let tok = self.current();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let span = self.span();
        let found = if self.at(TokenKind::Ident) || self.at(TokenKind::IntLit) {
            format!("`{}`", self.current().text)
        } else {
            self.peek().describe().to_string()
        };
        CompileError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            span: span.into(),
            line: span.line,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'a Token, CompileError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn ident(&mut self) -> Result<(String, Span), CompileError> {
        let tok = self.expect(TokenKind::Ident)?;
        Ok((tok.text.clone(), tok.span))
    }

    // ==================== PROGRAM ====================

    fn parse_program(&mut self) -> Result<ParsedProgram, CompileError> {
        let start = self.span();
        let body = self.parse_block()?;
        let main = Module {
            name: MAIN_MODULE.to_string(),
            kind: ModuleKind::Main,
            params: Vec::new(),
            return_type: None,
            body,
            span: start.to(self.previous_span()),
        };

        let mut modules = IndexMap::new();
        while !self.at(TokenKind::Eof) {
            let module = match self.peek() {
                TokenKind::Funcion => self.parse_module(ModuleKind::Function)?,
                TokenKind::Procedimiento => self.parse_module(ModuleKind::Procedure)?,
                _ => return Err(self.unexpected("`funcion`, `procedimiento` or end of file")),
            };
            if module.name == MAIN_MODULE || modules.contains_key(&module.name) {
                return Err(CompileError::RepeatedModule {
                    name: module.name.clone(),
                    span: module.span.into(),
                    line: module.span.line,
                });
            }
            modules.insert(module.name.clone(), module);
        }

        Ok(ParsedProgram { main, modules })
    }

    // ==================== MODULES ====================

    fn parse_module(&mut self, kind: ModuleKind) -> Result<Module, CompileError> {
        let start = self.advance().span;
        let (name, _) = self.ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let return_type = if kind == ModuleKind::Function {
            self.expect(TokenKind::Colon)?;
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;
        let end = if kind == ModuleKind::Function {
            TokenKind::FinFuncion
        } else {
            TokenKind::FinProcedimiento
        };
        self.expect(end)?;

        Ok(Module {
            name,
            kind,
            params,
            return_type,
            body,
            span: start.to(self.previous_span()),
        })
    }

    fn parse_param(&mut self) -> Result<Param, CompileError> {
        let start = self.span();
        let kind = self.parse_type()?;
        let by_ref = self.eat(TokenKind::Ref);
        let (name, _) = self.ident()?;
        let dims = self.parse_dims()?;
        Ok(Param {
            name,
            kind,
            dims,
            by_ref,
            span: start.to(self.previous_span()),
        })
    }

    fn parse_type(&mut self) -> Result<AtomicKind, CompileError> {
        let kind = match self.peek() {
            TokenKind::Entero => AtomicKind::Integer,
            TokenKind::Real => AtomicKind::Real,
            TokenKind::Caracter => AtomicKind::Character,
            TokenKind::Logico => AtomicKind::Logical,
            _ => return Err(self.unexpected("a type")),
        };
        self.advance();
        Ok(kind)
    }

    /// Optional `[n, m, ...]` with integer literals; their sizes are
    /// validated by the declaration extractor
    fn parse_dims(&mut self) -> Result<Vec<usize>, CompileError> {
        let mut dims = Vec::new();
        if !self.eat(TokenKind::LBracket) {
            return Ok(dims);
        }
        loop {
            let tok = self.expect(TokenKind::IntLit)?;
            let dim: usize = tok.text.parse().map_err(|_| self.unexpected("a dimension"))?;
            dims.push(dim);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(dims)
    }

    // ==================== STATEMENTS ====================

    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        while !self.at_any(BLOCK_END) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        let start = self.span();
        let kind = match self.peek() {
            k if k.is_type() => self.parse_declaration()?,
            TokenKind::Si => self.parse_if()?,
            TokenKind::Mientras => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                self.expect(TokenKind::FinMientras)?;
                StmtKind::While { cond, body }
            }
            TokenKind::Repetir => {
                self.advance();
                let body = self.parse_block()?;
                let cond_span = self.expect(TokenKind::Hasta)?.span;
                self.expect(TokenKind::Que)?;
                let cond = self.parse_expr()?;
                StmtKind::Until {
                    body,
                    cond,
                    cond_span,
                }
            }
            TokenKind::Para => {
                self.advance();
                let counter = self.parse_invocation()?;
                self.expect(TokenKind::Arrow)?;
                let from = self.parse_expr()?;
                self.expect(TokenKind::Hasta)?;
                let to = self.parse_expr()?;
                let body = self.parse_block()?;
                self.expect(TokenKind::FinPara)?;
                StmtKind::For {
                    counter,
                    from,
                    to,
                    body,
                }
            }
            TokenKind::Retornar => {
                self.advance();
                StmtKind::Return(self.parse_expr()?)
            }
            TokenKind::Ident if self.peek_n(1) == TokenKind::LParen => {
                StmtKind::Call(self.parse_call()?)
            }
            TokenKind::Ident => {
                let target = self.parse_invocation()?;
                self.expect(TokenKind::Arrow)?;
                let value = self.parse_expr()?;
                StmtKind::Assign { target, value }
            }
            _ => return Err(self.unexpected("a statement")),
        };
        // statements keep only their first line for breakpoints
        let mut span = start.to(self.previous_span());
        span.line = start.line;
        Ok(Stmt { kind, span })
    }

    fn parse_declaration(&mut self) -> Result<StmtKind, CompileError> {
        let kind = self.parse_type()?;
        let mut declarators = Vec::new();
        loop {
            let (name, name_span) = self.ident()?;
            let dims = self.parse_dims()?;
            declarators.push(Declarator {
                name,
                kind,
                dims,
                span: name_span.to(self.previous_span()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(StmtKind::Declare(declarators))
    }

    fn parse_if(&mut self) -> Result<StmtKind, CompileError> {
        self.expect(TokenKind::Si)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Entonces)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(TokenKind::Sino) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::FinSi)?;
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_invocation(&mut self) -> Result<Invocation, CompileError> {
        let (name, start) = self.ident()?;
        let mut indexes = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                indexes.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(Invocation {
            name,
            indexes,
            span: start.to(self.previous_span()),
        })
    }

    fn parse_call(&mut self) -> Result<Call, CompileError> {
        let (name, start) = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Call {
            name,
            args,
            span: start.to(self.previous_span()),
        })
    }

    // ==================== EXPRESSIONS ====================

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.to(rhs.span);
        Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::O) {
            let rhs = self.parse_and()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_not()?;
        while self.eat(TokenKind::Y) {
            let rhs = self.parse_not()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, CompileError> {
        if self.at(TokenKind::No) {
            let start = self.advance().span;
            let operand = self.parse_not()?;
            let span = start.to(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            TokenKind::Less => BinaryOp::Minor,
            TokenKind::LessEq => BinaryOp::MinorEq,
            TokenKind::Greater => BinaryOp::Major,
            TokenKind::GreaterEq => BinaryOp::MajorEq,
            TokenKind::Eq => BinaryOp::Equal,
            TokenKind::NotEq => BinaryOp::Different,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Self::binary(op, lhs, rhs))
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Plus,
                TokenKind::Minus => BinaryOp::Minus,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Times,
                TokenKind::Slash => BinaryOp::Slash,
                TokenKind::Div => BinaryOp::Div,
                TokenKind::Mod => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.at(TokenKind::Minus) {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, CompileError> {
        let base = self.parse_primary()?;
        if self.eat(TokenKind::Caret) {
            // right associative, and `2 ^ -1` is allowed
            let exponent = self.parse_unary()?;
            return Ok(Self::binary(BinaryOp::Power, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let span = self.span();
        let kind = match self.peek() {
            TokenKind::IntLit => {
                let tok = self.advance();
                let value = tok
                    .text
                    .parse()
                    .map_err(|_| CompileError::InvalidToken {
                        text: tok.text.clone(),
                        span: tok.span.into(),
                        line: tok.span.line,
                    })?;
                ExprKind::Literal(Literal::Integer(value))
            }
            TokenKind::RealLit => {
                let tok = self.advance();
                let value = tok
                    .text
                    .parse()
                    .map_err(|_| CompileError::InvalidToken {
                        text: tok.text.clone(),
                        span: tok.span.into(),
                        line: tok.span.line,
                    })?;
                ExprKind::Literal(Literal::Real(value))
            }
            TokenKind::StrLit => {
                let text = &self.advance().text;
                // strip the quotes, which are single-byte characters
                let inner = &text[1..text.len() - 1];
                ExprKind::Literal(Literal::Text(inner.to_string()))
            }
            TokenKind::Verdadero => {
                self.advance();
                ExprKind::Literal(Literal::Logical(true))
            }
            TokenKind::Falso => {
                self.advance();
                ExprKind::Literal(Literal::Logical(false))
            }
            TokenKind::Ident if self.peek_n(1) == TokenKind::LParen => {
                ExprKind::Call(self.parse_call()?)
            }
            TokenKind::Ident => ExprKind::Invocation(self.parse_invocation()?),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: span.to(self.previous_span()),
                });
            }
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr {
            kind,
            span: span.to(self.previous_span()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> ParsedProgram {
        let tokens = lex(source).expect("lexing failed");
        parse(&tokens).expect("parsing failed")
    }

    #[test]
    fn test_precedence() {
        let program = parse_source("x <- 1 + 2 * 3 ^ 2");
        let StmtKind::Assign { value, .. } = &program.main.body[0].kind else {
            panic!("expected assignment");
        };
        let ExprKind::Binary { op, rhs, .. } = &value.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Plus);
        let ExprKind::Binary { op, rhs, .. } = &rhs.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Times);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Power,
                ..
            }
        ));
    }

    #[test]
    fn test_statement_lines() {
        let program = parse_source("entero a\n\na <- 2\nsi a > 1 entonces\n  a <- 3\nfinsi");
        let lines: Vec<_> = program.main.body.iter().map(|s| s.span.line).collect();
        assert_eq!(lines, vec![1, 3, 4]);
    }

    #[test]
    fn test_modules_after_main() {
        let program = parse_source(
            "p(1)\nprocedimiento p(entero ref x, real m[2, 3])\nfinprocedimiento\nfuncion f() : logico\n retornar verdadero\nfinfuncion",
        );
        assert_eq!(program.modules.len(), 2);
        let p = &program.modules["p"];
        assert!(p.params[0].by_ref);
        assert_eq!(p.params[1].dims, vec![2, 3]);
        assert_eq!(program.modules["f"].return_type, Some(AtomicKind::Logical));
    }

    #[test]
    fn test_repeated_module() {
        let tokens = lex("procedimiento p()\nfinprocedimiento\nprocedimiento p()\nfinprocedimiento")
            .expect("lexing failed");
        let err = parse(&tokens).unwrap_err();
        assert!(matches!(err, CompileError::RepeatedModule { line: 3, .. }));
    }

    #[test]
    fn test_dimensions_are_kept_verbatim() {
        let program = parse_source("entero v[0], m[4294967296, 2]");
        let StmtKind::Declare(declarators) = &program.main.body[0].kind else {
            panic!("expected a declaration");
        };
        assert_eq!(declarators[0].dims, vec![0]);
        assert_eq!(declarators[1].dims, vec![4294967296, 2]);
    }
}
