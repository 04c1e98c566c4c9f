use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{
    AssignTarget, BinaryOperator, Expression, Program, Statement, UnaryOperator,
};
use crate::lexer::token::TokenKind;
use crate::lexer::{LexError, Lexer};
use crate::runtime::{Class, Method};

pub mod ast;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected}, got {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Unknown parent class '{name}' at line {line}")]
    UnknownParentClass { name: String, line: usize },
    #[error(transparent)]
    Lexer(#[from] LexError),
}

pub fn parse_program(lexer: &mut Lexer<'_>) -> Result<Program, ParseError> {
    Parser::new(lexer).parse_program()
}

/// Recursive-descent parser over the lexer cursor.
///
/// Declared classes are collected in a parse-time table so parent clauses
/// and `Name(args)` constructor calls resolve while parsing; at runtime the
/// built classes are ordinary scope values.
struct Parser<'a, 'l> {
    lexer: &'l mut Lexer<'a>,
    classes: HashMap<String, Rc<Class>>,
}

impl<'a, 'l> Parser<'a, 'l> {
    fn new(lexer: &'l mut Lexer<'a>) -> Self {
        Self {
            lexer,
            classes: HashMap::new(),
        }
    }

    fn parse_program(mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        while !matches!(self.current(), TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if matches!(self.current(), TokenKind::Class) {
            return self.parse_class_def();
        }
        if matches!(self.current(), TokenKind::If) {
            return self.parse_if();
        }
        if matches!(self.current(), TokenKind::Print) {
            return self.parse_print();
        }
        if matches!(self.current(), TokenKind::Return) {
            return self.parse_return();
        }
        if matches!(self.current(), TokenKind::Def) {
            // Method definitions only make sense inside a class body.
            return Err(self.unexpected("a statement"));
        }
        if self.looks_like_assignment() {
            return self.parse_assignment();
        }
        let expr = self.parse_expression()?;
        self.lexer.expect_newline()?;
        Ok(Statement::Expr(expr))
    }

    fn parse_class_def(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let name = self.lexer.expect_identifier()?.to_string();
        let parent = if matches!(self.current(), TokenKind::Char('(')) {
            self.advance();
            let parent_line = self.lexer.current_token().span().line;
            let parent_name = self.lexer.expect_identifier()?;
            let parent = self.classes.get(parent_name).cloned().ok_or_else(|| {
                ParseError::UnknownParentClass {
                    name: parent_name.to_string(),
                    line: parent_line,
                }
            })?;
            self.lexer.expect_char(')')?;
            Some(parent)
        } else {
            None
        };
        self.lexer.expect_char(':')?;
        self.lexer.expect_newline()?;
        self.lexer.expect_indent()?;
        let mut methods = Vec::new();
        while matches!(self.current(), TokenKind::Def) {
            methods.push(self.parse_method_def()?);
        }
        if methods.is_empty() {
            return Err(self.unexpected("a method definition"));
        }
        self.lexer.expect_dedent()?;

        let class = Rc::new(Class::new(name.clone(), methods, parent));
        self.classes.insert(name, Rc::clone(&class));
        Ok(Statement::ClassDef(class))
    }

    fn parse_method_def(&mut self) -> Result<Method, ParseError> {
        self.advance();
        let name = self.lexer.expect_identifier()?.to_string();
        self.lexer.expect_char('(')?;
        let mut params = Vec::new();
        if matches!(self.current(), TokenKind::Id(_)) {
            params.push(self.lexer.expect_identifier()?.to_string());
            while matches!(self.current(), TokenKind::Char(',')) {
                self.advance();
                params.push(self.lexer.expect_identifier()?.to_string());
            }
        }
        self.lexer.expect_char(')')?;
        self.lexer.expect_char(':')?;
        let body = self.parse_suite()?;
        // The receiver is bound implicitly at call time; a leading `self`
        // parameter declares it without taking part in arity.
        if params.first().is_some_and(|param| param == "self") {
            params.remove(0);
        }
        Ok(Method {
            name,
            formal_params: params,
            body,
        })
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let condition = self.parse_expression()?;
        self.lexer.expect_char(':')?;
        let then_body = self.parse_suite()?;
        let mut else_body = Vec::new();
        if matches!(self.current(), TokenKind::Else) {
            self.advance();
            self.lexer.expect_char(':')?;
            else_body = self.parse_suite()?;
        }
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    fn parse_suite(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.lexer.expect_newline()?;
        self.lexer.expect_indent()?;
        let mut body = Vec::new();
        while !matches!(self.current(), TokenKind::Dedent | TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.lexer.expect_dedent()?;
        Ok(body)
    }

    fn parse_print(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        let mut args = Vec::new();
        if !matches!(self.current(), TokenKind::Newline) {
            args.push(self.parse_expression()?);
            while matches!(self.current(), TokenKind::Char(',')) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.lexer.expect_newline()?;
        Ok(Statement::Print(args))
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        self.advance();
        if matches!(self.current(), TokenKind::Newline) {
            self.advance();
            return Ok(Statement::Return(None));
        }
        let value = self.parse_expression()?;
        self.lexer.expect_newline()?;
        Ok(Statement::Return(Some(value)))
    }

    // Assignment is told apart from an expression statement by scanning the
    // token buffer for `Id ('.' Id)* '='` ahead of the cursor.
    fn looks_like_assignment(&self) -> bool {
        if !matches!(self.current(), TokenKind::Id(_)) {
            return false;
        }
        let mut offset = 1;
        loop {
            match self.lexer.lookahead(offset) {
                TokenKind::Char('.') => {
                    if !matches!(self.lexer.lookahead(offset + 1), TokenKind::Id(_)) {
                        return false;
                    }
                    offset += 2;
                }
                TokenKind::Char('=') => return true,
                _ => return false,
            }
        }
    }

    fn parse_assignment(&mut self) -> Result<Statement, ParseError> {
        let mut targets = vec![self.parse_assign_target()?];
        self.lexer.expect_char('=')?;
        while self.looks_like_assignment() {
            targets.push(self.parse_assign_target()?);
            self.lexer.expect_char('=')?;
        }
        let value = self.parse_expression()?;
        self.lexer.expect_newline()?;
        Ok(Statement::Assign { targets, value })
    }

    fn parse_assign_target(&mut self) -> Result<AssignTarget, ParseError> {
        let first = self.lexer.expect_identifier()?.to_string();
        if !matches!(self.current(), TokenKind::Char('.')) {
            return Ok(AssignTarget::Name(first));
        }
        let mut object = Expression::Identifier(first);
        self.advance();
        let mut field = self.lexer.expect_identifier()?.to_string();
        while matches!(self.current(), TokenKind::Char('.')) {
            self.advance();
            let next = self.lexer.expect_identifier()?.to_string();
            object = Expression::FieldAccess {
                object: Box::new(object),
                name: field,
            };
            field = next;
        }
        Ok(AssignTarget::Field {
            object,
            name: field,
        })
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_and()?;
        while matches!(self.current(), TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            expr = binary(expr, BinaryOperator::Or, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_not()?;
        while matches!(self.current(), TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            expr = binary(expr, BinaryOperator::And, right);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expression, ParseError> {
        if matches!(self.current(), TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    // At most one comparison per level: `a < b < c` is a syntax error.
    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let expr = self.parse_additive()?;
        let op = match self.current() {
            TokenKind::Eq => BinaryOperator::Eq,
            TokenKind::NotEq => BinaryOperator::NotEq,
            TokenKind::LessOrEq => BinaryOperator::LessOrEq,
            TokenKind::GreaterOrEq => BinaryOperator::GreaterOrEq,
            TokenKind::Char('<') => BinaryOperator::Less,
            TokenKind::Char('>') => BinaryOperator::Greater,
            _ => return Ok(expr),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(binary(expr, op, right))
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                TokenKind::Char('+') => BinaryOperator::Add,
                TokenKind::Char('-') => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current() {
                TokenKind::Char('*') => BinaryOperator::Mul,
                TokenKind::Char('/') => BinaryOperator::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if matches!(self.current(), TokenKind::Char('-')) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        while matches!(self.current(), TokenKind::Char('.')) {
            self.advance();
            let name = self.lexer.expect_identifier()?.to_string();
            if matches!(self.current(), TokenKind::Char('(')) {
                let args = self.parse_args()?;
                expr = Expression::MethodCall {
                    object: Box::new(expr),
                    method: name,
                    args,
                };
            } else {
                expr = Expression::FieldAccess {
                    object: Box::new(expr),
                    name,
                };
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let kind = self.current().clone();
        match kind {
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expression::Number(value))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expression::String(value))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expression::None)
            }
            TokenKind::Id(name) => {
                // A declared class name followed by '(' is a constructor
                // call; everything else resolves by scope lookup at runtime.
                if matches!(self.lexer.lookahead(1), TokenKind::Char('(')) {
                    if let Some(class) = self.classes.get(name).cloned() {
                        self.advance();
                        let args = self.parse_args()?;
                        return Ok(Expression::NewInstance { class, args });
                    }
                }
                self.advance();
                Ok(Expression::Identifier(name.to_string()))
            }
            TokenKind::Char('(') => {
                self.advance();
                let expr = self.parse_expression()?;
                self.lexer.expect_char(')')?;
                Ok(expr)
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.lexer.expect_char('(')?;
        let mut args = Vec::new();
        if !matches!(self.current(), TokenKind::Char(')')) {
            args.push(self.parse_expression()?);
            while matches!(self.current(), TokenKind::Char(',')) {
                self.advance();
                args.push(self.parse_expression()?);
            }
        }
        self.lexer.expect_char(')')?;
        Ok(args)
    }

    fn current(&self) -> &TokenKind<'a> {
        self.lexer.current_token().kind()
    }

    fn advance(&mut self) {
        self.lexer.next_token();
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while matches!(self.current(), TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.lexer.current_token();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.kind().to_string(),
            line: token.span().line,
            column: token.span().column,
        }
    }
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}
