//! # Parser
//!
//! Recursive descent over a flat token vector with a `position` cursor.
//! One-token lookahead everywhere except the identifier-vs-assignment
//! disambiguation, which saves and restores the cursor.

mod notestream;

use crate::ast::{
    BinaryOp, ContextKind, Expr, ExprKind, Param, Program, Stmt, StmtKind, UnaryOp,
};
use crate::diagnostics::{Diagnostics, DiagnosticKind, SourceLocation};
use crate::lexer::{LocatedToken, Token};
use crate::types::Type;

pub struct Parser<'a> {
    tokens: Vec<LocatedToken>,
    pos: usize,
    diags: &'a mut Diagnostics,
}

/// Parses a complete program, recovering after each malformed statement
/// instead of aborting.
pub fn parse(tokens: Vec<LocatedToken>, diags: &mut Diagnostics) -> Program {
    let mut parser = Parser { tokens, pos: 0, diags };
    let mut program = Vec::new();
    while !parser.at_eof() {
        if parser.check(&Token::Semicolon) {
            parser.advance();
            continue;
        }
        match parser.parse_statement() {
            Some(stmt) => program.push(stmt),
            None => parser.synchronize(),
        }
    }
    program
}

impl<'a> Parser<'a> {
    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn location(&self) -> SourceLocation {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        SourceLocation::new(t.line, t.column)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            let loc = self.location();
            self.diags.push(
                DiagnosticKind::ParseUnexpectedToken(format!("expected {:?}, found {:?}", token, self.peek())),
                loc,
            );
            false
        }
    }

    fn expect_identifier(&mut self) -> Option<String> {
        if let Token::Identifier(name) = self.peek().clone() {
            self.advance();
            Some(name)
        } else {
            let loc = self.location();
            self.diags.push(
                DiagnosticKind::ParseUnexpectedToken(format!("expected identifier, found {:?}", self.peek())),
                loc,
            );
            None
        }
    }

    /// Advances to the next statement boundary after a parse error:
    /// a semicolon (consumed), `end`, a leading keyword, or EOF.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                Token::Semicolon => {
                    self.advance();
                    return;
                }
                Token::Eof
                | Token::End
                | Token::Proc
                | Token::Use
                | Token::Section
                | Token::TimeSig
                | Token::Tempo
                | Token::Swing
                | Token::Key
                | Token::Dynamics
                | Token::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        let loc = self.location();
        match self.peek().clone() {
            Token::Internal | Token::Proc => self.parse_proc_decl(loc),
            Token::TypeName(_) => self.parse_var_decl(loc),
            Token::Return => self.parse_return(loc),
            Token::Use => self.parse_use(loc),
            Token::TimeSig | Token::Tempo | Token::Swing | Token::Key | Token::Dynamics => {
                self.parse_context_block(loc)
            }
            Token::Section => self.parse_section(loc),
            Token::Identifier(_) => self.parse_assignment_or_expr_stmt(loc),
            _ => {
                let expr = self.parse_expression()?;
                Some(Stmt::new(StmtKind::Expr(expr), loc))
            }
        }
    }

    fn parse_proc_decl(&mut self, loc: SourceLocation) -> Option<Stmt> {
        let is_internal = if self.check(&Token::Internal) {
            self.advance();
            true
        } else {
            false
        };
        self.expect(&Token::Proc);
        let name = self.expect_identifier()?;
        self.expect(&Token::LParen);
        let params = self.parse_param_list(&Token::RParen);
        self.expect(&Token::RParen);

        let mut body = Vec::new();
        while !self.check(&Token::End) && !self.at_eof() {
            if self.check(&Token::Semicolon) {
                self.advance();
                continue;
            }
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(),
            }
        }
        if !self.expect(&Token::End) {
            self.diags.push(DiagnosticKind::ParseMissingEndProc, loc.clone());
        } else {
            self.expect(&Token::Proc);
        }

        Some(Stmt::new(StmtKind::ProcDecl { name, is_internal, params, body }, loc))
    }

    fn parse_param_list(&mut self, terminator: &Token) -> Vec<Param> {
        let mut params = Vec::new();
        while !self.check(terminator) && !self.at_eof() {
            if let Some(ty) = self.parse_type() {
                let is_varargs = ty.is_array() && self.check(&Token::Ellipsis);
                if is_varargs {
                    self.advance();
                }
                if let Some(name) = self.expect_identifier() {
                    params.push(Param { name, ty, is_varargs });
                }
            } else {
                self.advance();
            }
            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        params
    }

    fn parse_type(&mut self) -> Option<Type> {
        if let Token::TypeName(name) = self.peek().clone() {
            self.advance();
            Some(type_from_name(&name))
        } else {
            let loc = self.location();
            self.diags.push(
                DiagnosticKind::ParseUnexpectedToken(format!("expected a type name, found {:?}", self.peek())),
                loc,
            );
            None
        }
    }

    fn parse_var_decl(&mut self, loc: SourceLocation) -> Option<Stmt> {
        let ty = self.parse_type()?;
        let name = self.expect_identifier()?;
        let init = if self.check(&Token::Equals) {
            self.advance();
            self.parse_expression()
        } else {
            None
        };
        Some(Stmt::new(StmtKind::VarDecl { ty, name, init }, loc))
    }

    fn parse_assignment_or_expr_stmt(&mut self, loc: SourceLocation) -> Option<Stmt> {
        let saved = self.pos;
        if let Token::Identifier(name) = self.peek().clone() {
            self.advance();
            if self.check(&Token::Equals) {
                self.advance();
                let value = self.parse_expression()?;
                return Some(Stmt::new(StmtKind::Assign { name, value }, loc));
            }
        }
        self.pos = saved;
        let expr = self.parse_expression()?;
        Some(Stmt::new(StmtKind::Expr(expr), loc))
    }

    fn parse_return(&mut self, loc: SourceLocation) -> Option<Stmt> {
        self.advance();
        let value = if self.starts_expression() { self.parse_expression() } else { None };
        Some(Stmt::new(StmtKind::Return(value), loc))
    }

    fn parse_use(&mut self, loc: SourceLocation) -> Option<Stmt> {
        self.advance();
        if let Token::StringLit(path) = self.peek().clone() {
            self.advance();
            Some(Stmt::new(StmtKind::Use { path }, loc))
        } else {
            let l = self.location();
            self.diags.push(DiagnosticKind::ParseUnexpectedToken("expected a module path string".into()), l);
            None
        }
    }

    fn parse_block(&mut self) -> Vec<Stmt> {
        self.expect(&Token::LBrace);
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) && !self.at_eof() {
            if self.check(&Token::Semicolon) {
                self.advance();
                continue;
            }
            match self.parse_statement() {
                Some(stmt) => body.push(stmt),
                None => self.synchronize(),
            }
        }
        self.expect(&Token::RBrace);
        body
    }

    fn parse_context_block(&mut self, loc: SourceLocation) -> Option<Stmt> {
        let kind = match self.advance() {
            Token::TimeSig => {
                let numerator = self.expect_int_literal().unwrap_or(4) as u32;
                self.expect(&Token::Slash);
                let denominator = self.expect_int_literal().unwrap_or(4) as u32;
                ContextKind::TimeSig { numerator, denominator }
            }
            Token::Tempo => ContextKind::Tempo(self.parse_expression()?),
            Token::Swing => ContextKind::Swing(self.parse_expression()?),
            Token::Key => ContextKind::Key(self.expect_identifier()?),
            Token::Dynamics => ContextKind::Dynamics(self.expect_identifier()?),
            other => {
                let l = self.location();
                self.diags.push(DiagnosticKind::ParseUnexpectedToken(format!("{:?}", other)), l);
                return None;
            }
        };
        let body = self.parse_block();
        Some(Stmt::new(StmtKind::Context { kind, body }, loc))
    }

    fn expect_int_literal(&mut self) -> Option<i64> {
        if let Token::IntLit(v) = self.peek().clone() {
            self.advance();
            Some(v)
        } else {
            let loc = self.location();
            self.diags.push(DiagnosticKind::ParseUnexpectedToken("expected an integer".into()), loc);
            None
        }
    }

    fn parse_section(&mut self, loc: SourceLocation) -> Option<Stmt> {
        self.advance();
        let name = self.expect_identifier()?;
        let body = self.parse_block();
        Some(Stmt::new(StmtKind::Section { name, body }, loc))
    }

    fn starts_expression(&self) -> bool {
        is_argument_start(self.peek())
    }

    // ---- Expressions, lowest precedence first: flow, additive,
    // multiplicative, unary, postfix, primary.

    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_flow()
    }

    fn parse_flow(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        while self.check(&Token::Arrow) {
            let loc = self.location();
            self.advance();
            let right = self.parse_flow_rhs()?;
            left = Expr::new(ExprKind::Flow { left: Box::new(left), right: Box::new(right) }, loc);
        }
        Some(left)
    }

    /// The right side of `->`: a bare name optionally followed by one or
    /// more parenthesized argument groups, collected together.
    fn parse_flow_rhs(&mut self) -> Option<Expr> {
        let loc = self.location();
        if let Token::Identifier(name) = self.peek().clone() {
            self.advance();
            let mut args = Vec::new();
            while self.check(&Token::LParen) {
                self.advance();
                args.extend(self.parse_expr_list(&Token::RParen));
                self.expect(&Token::RParen);
            }
            Some(Expr::new(ExprKind::Call { callee: name, args }, loc))
        } else {
            self.parse_additive()
        }
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                Token::Less => BinaryOp::Lt,
                Token::Greater => BinaryOp::Gt,
                _ => break,
            };
            let loc = self.location();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(binary_expr(op, left, right), loc);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            let loc = self.location();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::new(binary_expr(op, left, right), loc);
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        if self.check(&Token::Minus) {
            let loc = self.location();
            self.advance();
            let operand = self.parse_unary()?;
            return Some(Expr::new(ExprKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }, loc));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&Token::At) {
                let loc = self.location();
                self.advance();
                let index = self.parse_unary()?;
                expr = Expr::new(ExprKind::Index { target: Box::new(expr), index: Box::new(index) }, loc);
            } else if self.check(&Token::Dot) {
                let loc = self.location();
                self.advance();
                let name = self.expect_identifier()?;
                expr = Expr::new(ExprKind::Member { target: Box::new(expr), name }, loc);
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_expr_list(&mut self, terminator: &Token) -> Vec<Expr> {
        let mut items = Vec::new();
        while !self.check(terminator) && !self.at_eof() {
            if let Some(e) = self.parse_expression() {
                items.push(e);
            } else {
                self.advance();
            }
            if self.check(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        items
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let loc = self.location();
        match self.peek().clone() {
            Token::IntLit(v) => { self.advance(); Some(Expr::new(ExprKind::IntLit(v), loc)) }
            Token::LongLit(v) => { self.advance(); Some(Expr::new(ExprKind::LongLit(v), loc)) }
            Token::FloatLit(v) => { self.advance(); Some(Expr::new(ExprKind::FloatLit(v), loc)) }
            Token::DoubleLit(v) => { self.advance(); Some(Expr::new(ExprKind::DoubleLit(v), loc)) }
            Token::StringLit(v) => { self.advance(); Some(Expr::new(ExprKind::StringLit(v), loc)) }
            Token::BoolLit(v) => { self.advance(); Some(Expr::new(ExprKind::BoolLit(v), loc)) }
            Token::SemitoneLit(v) => { self.advance(); Some(Expr::new(ExprKind::SemitoneLit(v), loc)) }
            Token::CentLit(v) => { self.advance(); Some(Expr::new(ExprKind::CentLit(v), loc)) }
            Token::MillisecondLit(v) => { self.advance(); Some(Expr::new(ExprKind::MillisecondLit(v), loc)) }
            Token::SecondLit(v) => { self.advance(); Some(Expr::new(ExprKind::SecondLit(v), loc)) }
            Token::DecibelLit(v) => { self.advance(); Some(Expr::new(ExprKind::DecibelLit(v), loc)) }
            Token::NoteLit { letter, alteration, octave } => {
                self.advance();
                Some(Expr::new(ExprKind::NoteLit { letter, alteration, octave }, loc))
            }
            Token::Identifier(name) => {
                self.advance();
                self.apply_bare_call_sugar(name, loc)
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression();
                self.expect(&Token::RParen);
                inner
            }
            Token::LBracket => {
                self.advance();
                let elements = self.parse_expr_list(&Token::RBracket);
                self.expect(&Token::RBracket);
                Some(Expr::new(ExprKind::ArrayLit(elements), loc))
            }
            Token::Fn => {
                self.advance();
                let params = self.parse_param_list(&Token::FatArrow);
                self.expect(&Token::FatArrow);
                let body = self.parse_expression()?;
                Some(Expr::new(ExprKind::Lambda { params, body: Box::new(body) }, loc))
            }
            Token::Lazy => {
                self.advance();
                self.expect(&Token::LParen);
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen);
                Some(Expr::new(ExprKind::Lazy(Box::new(inner)), loc))
            }
            Token::Pipe => {
                let bars = notestream::parse_note_stream(self);
                Some(Expr::new(ExprKind::NoteStream(bars), loc))
            }
            other => {
                self.diags.push(DiagnosticKind::ParseUnexpectedToken(format!("{:?}", other)), loc.clone());
                self.advance();
                Some(Expr::new(ExprKind::Identifier(String::new()), loc))
            }
        }
    }

    /// A bare identifier followed directly by one or more argument-start
    /// tokens becomes a call with those as arguments — readability sugar
    /// for musical code, e.g. `transpose s 5`.
    fn apply_bare_call_sugar(&mut self, name: String, loc: SourceLocation) -> Option<Expr> {
        if !is_argument_start(self.peek()) {
            return Some(Expr::new(ExprKind::Identifier(name), loc));
        }
        let mut args = Vec::new();
        while is_argument_start(self.peek()) {
            args.push(self.parse_bare_call_argument()?);
        }
        Some(Expr::new(ExprKind::Call { callee: name, args }, loc))
    }

    /// One argument inside bare-call sugar. A bare identifier stops at the
    /// identifier itself rather than recursing into its own bare-call sugar
    /// (parenthesize it to pass a nested call as an argument), so
    /// `transpose s 5` collects two arguments instead of `s 5` folding into
    /// `s(5)` and leaving `transpose` with only one.
    fn parse_bare_call_argument(&mut self) -> Option<Expr> {
        let loc = self.location();
        if let Token::Identifier(name) = self.peek().clone() {
            self.advance();
            return Some(Expr::new(ExprKind::Identifier(name), loc));
        }
        self.parse_primary()
    }
}

fn binary_expr(op: BinaryOp, left: Expr, right: Expr) -> ExprKind {
    ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }
}

fn is_argument_start(token: &Token) -> bool {
    matches!(
        token,
        Token::IntLit(_)
            | Token::LongLit(_)
            | Token::FloatLit(_)
            | Token::DoubleLit(_)
            | Token::StringLit(_)
            | Token::BoolLit(_)
            | Token::SemitoneLit(_)
            | Token::CentLit(_)
            | Token::MillisecondLit(_)
            | Token::SecondLit(_)
            | Token::DecibelLit(_)
            | Token::NoteLit { .. }
            | Token::Identifier(_)
            | Token::LParen
            | Token::LBracket
            | Token::Fn
            | Token::Lazy
            | Token::Pipe
    )
}

/// Resolves a lexed type name to a `Type`, applying the plural-type sugar:
/// a name ending in `s` whose singular names a known type denotes
/// `Array<singular>` (and `Voids` is `Array<Void>`, the universal
/// varargs placeholder).
pub fn type_from_name(name: &str) -> Type {
    if let Some(t) = singular_type(name) {
        return t;
    }
    if let Some(singular) = name.strip_suffix('s') {
        if let Some(inner) = singular_type(singular) {
            return Type::Array(Box::new(inner));
        }
    }
    Type::Void
}

fn singular_type(name: &str) -> Option<Type> {
    Some(match name {
        "Int" => Type::Int,
        "Long" => Type::Long,
        "Float" => Type::Float,
        "Double" => Type::Double,
        "String" => Type::String,
        "Bool" => Type::Bool,
        "Number" => Type::Number,
        "Void" => Type::Void,
        "Note" => Type::Note,
        "Semitone" => Type::Semitone,
        "Cent" => Type::Cent,
        "Millisecond" => Type::Millisecond,
        "Second" => Type::Second,
        "Decibel" => Type::Decibel,
        "Beat" => Type::Beat,
        "MusicalNote" => Type::MusicalNote,
        "Bar" => Type::Bar,
        "Sequence" => Type::Sequence,
        "Chord" => Type::Chord,
        "Section" => Type::Section,
        "Song" => Type::Song,
        "TimeSignature" => Type::TimeSignature,
        "NoteValue" => Type::NoteValue,
        "Buffer" => Type::Buffer,
        "OscillatorState" => Type::OscillatorState,
        "Envelope" => Type::Envelope,
        "Voice" => Type::Voice,
        "Track" => Type::Track,
        "Function" => Type::Function,
        "Buf" => Type::Buf,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> (Program, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(src, &mut diags);
        let program = parse(tokens, &mut diags);
        (program, diags)
    }

    #[test]
    fn parses_var_decl_with_arithmetic_initializer() {
        let (program, diags) = parse_src("Int x = 3 + 4 * 2");
        assert!(diags.is_empty());
        assert_eq!(program.len(), 1);
        assert!(matches!(&program[0].kind, StmtKind::VarDecl { ty: Type::Int, name, init: Some(_) } if name == "x"));
    }

    #[test]
    fn bare_identifier_call_sugar_collects_following_arguments() {
        let (program, diags) = parse_src("transpose s 5");
        assert!(diags.is_empty());
        match &program[0].kind {
            StmtKind::Expr(Expr { kind: ExprKind::Call { callee, args }, .. }) => {
                assert_eq!(callee, "transpose");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn parenthesized_call_form_nests_naturally() {
        let (program, diags) = parse_src("(print (str x))");
        assert!(diags.is_empty());
        match &program[0].kind {
            StmtKind::Expr(Expr { kind: ExprKind::Call { callee, args }, .. }) => {
                assert_eq!(callee, "print");
                assert_eq!(args.len(), 1);
                assert!(matches!(&args[0].kind, ExprKind::Call { callee, .. } if callee == "str"));
            }
            other => panic!("expected nested calls, got {:?}", other),
        }
    }

    #[test]
    fn flow_operator_rewrites_to_call_with_spliced_argument() {
        let (program, diags) = parse_src("x -> f(a, b)");
        assert!(diags.is_empty());
        match &program[0].kind {
            StmtKind::Expr(Expr { kind: ExprKind::Flow { right, .. }, .. }) => {
                assert!(matches!(&right.kind, ExprKind::Call { callee, args } if callee == "f" && args.len() == 2));
            }
            other => panic!("expected a flow node, got {:?}", other),
        }
    }

    #[test]
    fn plural_type_sugar_yields_array_type() {
        assert_eq!(type_from_name("Ints"), Type::Array(Box::new(Type::Int)));
        assert_eq!(type_from_name("Voids"), Type::Array(Box::new(Type::Void)));
    }

    #[test]
    fn missing_end_proc_is_diagnosed_but_recovers() {
        let (_program, diags) = parse_src("proc f(Int n) return n");
        assert!(diags.iter().any(|d| matches!(d.kind, DiagnosticKind::ParseMissingEndProc)));
    }
}
