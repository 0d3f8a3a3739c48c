//=====================================================
// File: parser.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript recursive descent parser
// Objective: Build the AST from the token stream, desugar compound
//            assignment, increments and for loops, and recover from syntax
//            errors without aborting the file
//=====================================================

use std::collections::VecDeque;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{next_node_id, Expr, FunctionDecl, ListEntry, Literal, Stmt};
use crate::tokenizer::{Position, Token, TokenKind};

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Parser Error: {message} at {position}")]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    fn new(token: &Token, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: token.position,
        }
    }
}

//=====================================================
// Section 1: Parser state and entry point
//=====================================================

pub struct Parser {
    tokens: VecDeque<Token>,
    previous: Token,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: VecDeque<Token>) -> Self {
        Self {
            tokens,
            previous: Token::new(TokenKind::Noop, "", 0, 0),
            errors: Vec::new(),
        }
    }

    /// Parse every top-level declaration. A malformed construct records a
    /// `ParseError`, synchronizes to the next statement boundary and keeps
    /// going, so a single pass reports every syntax error in the file.
    pub fn parse(mut self) -> (Vec<Stmt>, Vec<ParseError>) {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        (statements, self.errors)
    }

    //=====================================================
    // Section 2: Token cursor helpers
    //=====================================================

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof) || self.tokens.is_empty()
    }

    fn peek(&self) -> &Token {
        self.tokens.front().unwrap_or(&self.previous)
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens
            .front()
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        if let Some(token) = self.tokens.pop_front() {
            self.previous = token;
        }
        self.previous.clone()
    }

    fn check(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek_kind())
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        if self.check(kinds) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, message: &str, kinds: &[TokenKind]) -> Result<Token, ParseError> {
        if self.check(kinds) {
            Ok(self.advance())
        } else {
            Err(ParseError::new(self.peek(), message))
        }
    }

    fn skip_eol(&mut self) {
        while self.matches(&[TokenKind::Eol]) {}
    }

    /// Panic-mode recovery: discard tokens until a statement boundary or a
    /// statement-starting keyword is seen.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if matches!(self.previous.kind, TokenKind::Semicolon | TokenKind::Eol) {
                return;
            }

            match self.peek_kind() {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Import => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn record(&mut self, error: ParseError) {
        log::error!("{error}");
        self.errors.push(error);
    }

    //=====================================================
    // Section 3: Declarations and statements
    //=====================================================

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.matches(&[TokenKind::Var]) {
            self.var_declaration()
        } else if self.matches(&[TokenKind::Fun]) {
            self.fun_declaration()
        } else if self.matches(&[TokenKind::Class]) {
            self.class_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => stmt,
            Err(error) => {
                self.synchronize();
                self.record(error);
                None
            }
        }
    }

    fn statement(&mut self) -> Result<Option<Stmt>, ParseError> {
        if self.matches(&[TokenKind::Return]) {
            return self.return_statement().map(Some);
        }
        if self.matches(&[TokenKind::For]) {
            return self.for_statement().map(Some);
        }
        if self.matches(&[TokenKind::If]) {
            return self.if_statement().map(Some);
        }
        if self.matches(&[TokenKind::While]) {
            return self.while_statement().map(Some);
        }
        if self.matches(&[TokenKind::LeftBrace]) {
            return Ok(Some(Stmt::Block {
                statements: self.block()?,
            }));
        }
        if self.matches(&[TokenKind::Import]) {
            return self.import_statement().map(Some);
        }

        self.expression_statement()
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();

        self.skip_eol();

        while !self.is_at_end() && !self.check(&[TokenKind::RightBrace]) {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
            self.skip_eol();
        }

        self.consume(
            "Expect a } at the end of a block",
            &[TokenKind::RightBrace],
        )?;

        Ok(statements)
    }

    fn var_declaration(&mut self) -> Result<Option<Stmt>, ParseError> {
        let name = self.consume("Expected variable name", &[TokenKind::Identifier])?;

        let initializer = if self.matches(&[TokenKind::Equal]) {
            self.skip_eol();
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            "Expected ; or end of line after a variable definition",
            &[TokenKind::Semicolon, TokenKind::Eol],
        )?;

        Ok(Some(Stmt::Var { name, initializer }))
    }

    fn fun_declaration(&mut self) -> Result<Option<Stmt>, ParseError> {
        let decl = self.make_fun("function")?;
        Ok(Some(Stmt::Function {
            decl: Rc::new(decl),
        }))
    }

    fn make_fun(&mut self, kind: &str) -> Result<FunctionDecl, ParseError> {
        let name = self.consume(&format!("Expected {kind} name"), &[TokenKind::Identifier])?;

        self.skip_eol();
        self.consume(
            "Expect '(' after a function declaration.",
            &[TokenKind::LeftParen],
        )?;
        self.skip_eol();

        let mut params = Vec::new();

        if !self.check(&[TokenKind::RightParen]) {
            loop {
                params.push(self.consume("Expected parameter name", &[TokenKind::Identifier])?);
                self.skip_eol();
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
                self.skip_eol();
            }
        }

        self.skip_eol();
        self.consume("Expect ')' after parameters", &[TokenKind::RightParen])?;

        // The body may start on the same line or on the next one.
        if self.matches(&[TokenKind::Eol]) {
            self.skip_eol();
        }

        let body = self
            .declaration()
            .unwrap_or(Stmt::Block { statements: Vec::new() });

        self.consume(
            "Expected ; or end of line after a function definition",
            &[TokenKind::Semicolon, TokenKind::Eol],
        )?;

        Ok(FunctionDecl { name, params, body })
    }

    fn class_declaration(&mut self) -> Result<Option<Stmt>, ParseError> {
        let name = self.consume("Expected class name", &[TokenKind::Identifier])?;

        let mut methods = Vec::new();

        if self.matches(&[TokenKind::Eol]) {
            self.skip_eol();

            // A class with no body is legal.
            if !self.check(&[TokenKind::LeftBrace]) {
                return Ok(Some(Stmt::Class { name, methods }));
            }
        }

        self.consume("Expect '{' before class body", &[TokenKind::LeftBrace])?;
        self.skip_eol();

        while !self.is_at_end() && !self.check(&[TokenKind::RightBrace]) {
            methods.push(Rc::new(self.make_fun("method")?));
            self.skip_eol();
        }

        self.consume("Expect '}' after class body", &[TokenKind::RightBrace])?;

        Ok(Some(Stmt::Class { name, methods }))
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.skip_eol();
        self.consume("Expect '(' after 'if'.", &[TokenKind::LeftParen])?;
        self.skip_eol();

        let condition = self.expression()?;

        self.skip_eol();
        self.consume("Expect ')' after 'if'.", &[TokenKind::RightParen])?;
        self.skip_eol();

        let then_branch = self.statement()?.map(Box::new).ok_or_else(|| {
            ParseError::new(&self.previous, "Expected statement after 'if'")
        })?;

        self.skip_eol();

        let else_branch = if self.matches(&[TokenKind::Else]) {
            self.statement()?.map(Box::new)
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.skip_eol();
        self.consume("Expect '(' after 'while'.", &[TokenKind::LeftParen])?;
        self.skip_eol();

        let condition = self.expression()?;

        self.skip_eol();
        self.consume("Expect ')' after 'while'.", &[TokenKind::RightParen])?;
        self.skip_eol();

        let body = self.statement()?.map(Box::new).ok_or_else(|| {
            ParseError::new(&self.previous, "Expected statement after 'while'")
        })?;

        Ok(Stmt::While { condition, body })
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous.clone();

        let value = if self.check(&[TokenKind::Semicolon, TokenKind::Eol]) {
            None
        } else {
            Some(self.expression()?)
        };

        self.consume(
            "Expected ; or end of line after a return statement.",
            &[TokenKind::Semicolon, TokenKind::Eol],
        )?;

        Ok(Stmt::Return { keyword, value })
    }

    fn import_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous.clone();

        let mut imports = vec![self.expression()?];
        let mut alias = None;

        if !self.check(&[TokenKind::Semicolon, TokenKind::Eol]) {
            let mut multiple = false;

            while self.matches(&[TokenKind::Comma]) {
                multiple = true;
                self.skip_eol();
                imports.push(self.expression()?);
            }

            // Aliasing a multi-import is unsupported: `as` after a comma list
            // falls through to the terminator check below and raises there.
            if !multiple && self.matches(&[TokenKind::As]) {
                alias = Some(self.expression()?);
            }
        }

        self.consume(
            "Expected ; or end of line after an import statement.",
            &[TokenKind::Semicolon, TokenKind::Eol],
        )?;

        Ok(Stmt::Import {
            keyword,
            imports,
            alias,
        })
    }

    fn expression_statement(&mut self) -> Result<Option<Stmt>, ParseError> {
        if self.is_at_end() {
            return Ok(None);
        }

        // Empty statements collapse into the next declaration.
        if self.matches(&[TokenKind::Semicolon, TokenKind::Eol]) {
            return Ok(self.declaration());
        }

        let expr = self.expression()?;

        self.consume(
            "Expect a ; or an end of line at the end of an expression",
            &[TokenKind::Semicolon, TokenKind::Eol],
        )?;

        Ok(Some(Stmt::Expression { expr }))
    }

    //=====================================================
    // Section 4: For loop lowering
    //=====================================================

    /// Both `for` forms are lowered entirely inside the parser into a `while`
    /// loop, so neither the resolver nor the interpreter carries a dedicated
    /// loop node.
    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.skip_eol();
        let token = self.consume("Expect '(' after 'for'.", &[TokenKind::LeftParen])?;
        self.skip_eol();

        let mut initializer = None;
        let mut range_based = false;
        let mut loop_var = None;

        if self.matches(&[TokenKind::Semicolon]) {
            // No initializer.
        } else if self.matches(&[TokenKind::Var]) {
            let name = self.consume("Expected variable name", &[TokenKind::Identifier])?;

            let mut init = None;
            if self.matches(&[TokenKind::Equal]) {
                self.skip_eol();
                init = Some(self.expression()?);
            }

            loop_var = Some(name.clone());
            initializer = Some(Stmt::Var {
                name,
                initializer: init,
            });

            if self.check(&[TokenKind::Colon]) {
                self.advance();
                range_based = true;
            } else {
                self.consume(
                    "Expected ; or end of line after a variable definition",
                    &[TokenKind::Semicolon, TokenKind::Eol],
                )?;
            }
        } else {
            initializer = self.expression_statement()?;
        }

        if range_based {
            self.for_range_statement(token, initializer, loop_var)
        } else {
            self.for_classic_statement(initializer)
        }
    }

    /// `for (var x : range) body` lowers to hidden `__it`, `__begin` and
    /// `__end` variables driving the iterator protocol
    /// (`it()`, `begin()`, `current()`, `next()`, `end()`).
    fn for_range_statement(
        &mut self,
        token: Token,
        initializer: Option<Stmt>,
        loop_var: Option<Token>,
    ) -> Result<Stmt, ParseError> {
        self.skip_eol();
        let range = self.expression()?;
        self.skip_eol();

        self.consume("Expect ')' after 'for'.", &[TokenKind::RightParen])?;
        self.skip_eol();

        let at = token.position;
        let ident = |text: &str| Token::synthetic(TokenKind::Identifier, text, at);

        // var __it = <range>.it()
        let it_name = ident("__it");
        let it_call = Expr::call(Expr::get(range, ident("it")), it_name.clone(), Vec::new());
        let it_stmt = Stmt::Var {
            name: it_name.clone(),
            initializer: Some(it_call),
        };

        let it_var = Expr::variable(it_name.clone());

        // var __begin = __it.begin()
        let begin_name = ident("__begin");
        let begin_call = Expr::call(
            Expr::get(it_var.clone(), ident("begin")),
            it_name.clone(),
            Vec::new(),
        );
        let begin_stmt = Stmt::Var {
            name: begin_name,
            initializer: Some(begin_call),
        };

        // __it.current() and __it.next()
        let current_call = Expr::call(
            Expr::get(it_var.clone(), ident("current")),
            it_name.clone(),
            Vec::new(),
        );
        let next_call = Expr::call(
            Expr::get(it_var.clone(), ident("next")),
            it_name.clone(),
            Vec::new(),
        );

        // var __end = __it.end()
        let end_name = ident("__end");
        let end_call = Expr::call(Expr::get(it_var, ident("end")), it_name, Vec::new());
        let end_stmt = Stmt::Var {
            name: end_name.clone(),
            initializer: Some(end_call),
        };

        // x = __it.current(), reused in the loop prologue and the loop body.
        let var_token = loop_var
            .ok_or_else(|| ParseError::new(&token, "Expected variable in range based for"))?;
        let assign_current = Expr::assign(var_token.clone(), current_call);

        // Loop condition: x != __end
        let condition = Expr::Binary {
            left: Box::new(Expr::variable(var_token)),
            op: Token::synthetic(TokenKind::NotEqual, "!=", at),
            right: Box::new(Expr::variable(end_name)),
        };

        let body = self.statement()?.map(Box::new).ok_or_else(|| {
            ParseError::new(&self.previous, "Expected statement after 'for'")
        })?;

        // Body of the while loop: run the body, advance the iterator, refresh
        // the named variable.
        let while_body = Stmt::Block {
            statements: vec![
                *body,
                Stmt::Expression { expr: next_call },
                Stmt::Expression {
                    expr: assign_current.clone(),
                },
            ],
        };

        let while_loop = Stmt::While {
            condition,
            body: Box::new(while_body),
        };

        let initializer = initializer
            .ok_or_else(|| ParseError::new(&token, "Expected initializer in range based for"))?;

        Ok(Stmt::Block {
            statements: vec![
                it_stmt,
                begin_stmt,
                end_stmt,
                initializer,
                Stmt::Expression {
                    expr: assign_current,
                },
                while_loop,
            ],
        })
    }

    /// `for (init; cond; incr) body` lowers to `{ init; while (cond) { body; incr; } }`.
    fn for_classic_statement(&mut self, initializer: Option<Stmt>) -> Result<Stmt, ParseError> {
        self.skip_eol();

        let mut condition = None;
        if !self.check(&[TokenKind::Semicolon]) {
            condition = Some(self.expression()?);
            self.skip_eol();
        }

        self.consume("Expect ';' after loop condition.", &[TokenKind::Semicolon])?;
        self.skip_eol();

        let mut increment = None;
        if !self.check(&[TokenKind::RightParen]) {
            increment = Some(self.expression()?);
            self.skip_eol();
        }

        self.consume("Expect ')' after 'for'.", &[TokenKind::RightParen])?;
        self.skip_eol();

        let mut body = self.statement()?.ok_or_else(|| {
            ParseError::new(&self.previous, "Expected statement after 'for'")
        })?;

        if let Some(increment) = increment {
            body = Stmt::Block {
                statements: vec![body, Stmt::Expression { expr: increment }],
            };
        }

        let condition = condition.unwrap_or(Expr::Atom {
            value: Literal::Bool(true),
        });

        body = Stmt::While {
            condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block {
                statements: vec![initializer, body],
            };
        }

        Ok(body)
    }

    //=====================================================
    // Section 5: Expressions, lowest to highest precedence
    //=====================================================

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.logic_or()?;

        if self.matches(&[
            TokenKind::Equal,
            TokenKind::PlusEqual,
            TokenKind::MinusEqual,
            TokenKind::StarEqual,
            TokenKind::SlashEqual,
            TokenKind::PercentEqual,
        ]) {
            let op = self.previous.clone();

            self.skip_eol();
            let mut value = self.assignment()?;

            // Desugar the compound operators into a plain assignment over an
            // equivalent binary expression.
            let binary_kind = match op.kind {
                TokenKind::PlusEqual => Some((TokenKind::Plus, "+")),
                TokenKind::MinusEqual => Some((TokenKind::Minus, "-")),
                TokenKind::StarEqual => Some((TokenKind::Star, "*")),
                TokenKind::SlashEqual => Some((TokenKind::Slash, "/")),
                TokenKind::PercentEqual => Some((TokenKind::Percent, "%")),
                _ => None,
            };

            if let Some((kind, text)) = binary_kind {
                value = Expr::Binary {
                    left: Box::new(expr.clone()),
                    op: Token::synthetic(kind, text, op.position),
                    right: Box::new(value),
                };
            }

            match expr {
                // Plain variable target.
                Expr::Variable { name, .. } => return Ok(Expr::assign(name, value)),

                // Property target: the get becomes a set.
                Expr::Get { object, name } => {
                    return Ok(Expr::Set {
                        object,
                        name,
                        value: Box::new(value),
                    })
                }

                // Subscript target: rewrite the `at` call into a `set` call
                // with the assigned value appended.
                Expr::Call {
                    callee,
                    paren,
                    mut args,
                    node_id,
                } if matches!(
                    callee.as_ref(),
                    Expr::Get { name, .. } if name.lexeme == "at"
                ) =>
                {
                    if let Expr::Get { object, name } = *callee {
                        let set_name =
                            Token::synthetic(TokenKind::Identifier, "set", name.position);
                        args.push(value);
                        return Ok(Expr::Call {
                            callee: Box::new(Expr::Get {
                                object,
                                name: set_name,
                            }),
                            paren,
                            args,
                            node_id,
                        });
                    }
                    unreachable!("guard matched a property get");
                }

                _ => {
                    self.record(ParseError::new(&op, "Invalid lvalue for assignment"));
                    return Ok(expr);
                }
            }
        }

        Ok(expr)
    }

    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.logic_and()?;

        while self.matches(&[TokenKind::OrOr]) {
            let op = self.previous.clone();
            self.skip_eol();
            let right = self.logic_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;

        while self.matches(&[TokenKind::AndAnd]) {
            let op = self.previous.clone();
            self.skip_eol();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;

        while self.matches(&[TokenKind::NotEqual, TokenKind::EqualEqual]) {
            let op = self.previous.clone();
            self.skip_eol();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.term()?;

        while self.matches(&[
            TokenKind::GreaterEqual,
            TokenKind::LessEqual,
            TokenKind::Greater,
            TokenKind::Less,
        ]) {
            let op = self.previous.clone();
            self.skip_eol();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.factor()?;

        while self.matches(&[TokenKind::Minus, TokenKind::Plus]) {
            let op = self.previous.clone();
            self.skip_eol();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;

        while self.matches(&[TokenKind::Slash, TokenKind::Star, TokenKind::Percent]) {
            let op = self.previous.clone();
            self.skip_eol();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.matches(&[TokenKind::Not, TokenKind::Minus]) {
            let op = self.previous.clone();
            let expr = self.unary()?;

            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        if self.matches(&[TokenKind::Increment, TokenKind::Decrement]) {
            let op = self.previous.clone();
            let expr = self.unary()?;

            // Prefix increment is only legal on a bare variable.
            if let Expr::Variable { ref name, .. } = expr {
                let name = name.clone();
                return Ok(Expr::Prefix {
                    op,
                    name,
                    expr: Box::new(expr),
                    node_id: next_node_id(),
                });
            }

            return Err(ParseError::new(
                self.peek(),
                "Expected Variable after pre fix operator",
            ));
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        if self.matches(&[TokenKind::Increment, TokenKind::Decrement]) {
            let op = self.previous.clone();

            // Postfix increment is only legal on a bare variable.
            if let Expr::Variable { ref name, .. } = expr {
                let name = name.clone();
                return Ok(Expr::Postfix {
                    op,
                    name,
                    expr: Box::new(expr),
                    node_id: next_node_id(),
                });
            }

            return Err(ParseError::new(
                self.peek(),
                "Expected Variable before post fix operator",
            ));
        }

        loop {
            if self.matches(&[TokenKind::LeftParen]) {
                self.skip_eol();
                expr = self.finish_call(expr)?;
            } else if self.matches(&[TokenKind::Dot]) {
                self.skip_eol();
                let name =
                    self.consume("Expect property name after '.'.", &[TokenKind::Identifier])?;
                expr = Expr::get(expr, name);
            } else if self.matches(&[TokenKind::LeftBracket]) {
                // Subscripting is sugar for a call to the `at` method.
                let token = self.previous.clone();

                expr = Expr::get(
                    expr,
                    Token::synthetic(TokenKind::Identifier, "at", token.position),
                );

                self.skip_eol();
                let argument = self.expression()?;
                self.skip_eol();

                self.consume(
                    "Expect ']' after an Array subscript call.",
                    &[TokenKind::RightBracket],
                )?;

                expr = Expr::call(expr, token, vec![argument]);
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut arguments = Vec::new();

        if !self.check(&[TokenKind::RightParen]) {
            loop {
                arguments.push(self.expression()?);
                self.skip_eol();
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }

        self.skip_eol();
        let paren = self.consume("Expect ')' after arguments", &[TokenKind::RightParen])?;

        Ok(Expr::call(callee, paren, arguments))
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.matches(&[TokenKind::True]) {
            return Ok(Expr::Atom {
                value: Literal::Bool(true),
            });
        }
        if self.matches(&[TokenKind::False]) {
            return Ok(Expr::Atom {
                value: Literal::Bool(false),
            });
        }

        if self.matches(&[TokenKind::Number]) {
            let value = self.previous.lexeme.parse::<i64>().map_err(|_| {
                ParseError::new(&self.previous, "Invalid integer literal")
            })?;
            return Ok(Expr::Atom {
                value: Literal::Int(value),
            });
        }

        if self.matches(&[TokenKind::Float]) {
            let value = self.previous.lexeme.parse::<f64>().map_err(|_| {
                ParseError::new(&self.previous, "Invalid float literal")
            })?;
            return Ok(Expr::Atom {
                value: Literal::Float(value),
            });
        }

        if self.matches(&[TokenKind::Str]) {
            return Ok(Expr::Atom {
                value: Literal::Str(self.previous.lexeme.clone()),
            });
        }

        if self.matches(&[TokenKind::This]) {
            return Ok(Expr::This {
                keyword: self.previous.clone(),
                node_id: next_node_id(),
            });
        }

        if self.matches(&[TokenKind::Identifier]) {
            return Ok(Expr::variable(self.previous.clone()));
        }

        if self.matches(&[TokenKind::LeftParen]) {
            self.skip_eol();
            let expr = self.expression()?;
            self.skip_eol();

            self.consume("Expect ')' after expression.", &[TokenKind::RightParen])?;

            return Ok(Expr::Grouping {
                expr: Box::new(expr),
            });
        }

        if self.matches(&[TokenKind::LeftBracket]) {
            return self.finish_list();
        }

        Err(ParseError::new(self.peek(), "Expected expression"))
    }

    /// List/record literal: positional entries are auto-numbered, explicit
    /// entries carry their own key expression.
    fn finish_list(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        let mut nb_entries: i64 = 0;

        if !self.check(&[TokenKind::RightBracket]) {
            loop {
                let first = self.expression()?;
                self.skip_eol();

                let entry = if self.matches(&[TokenKind::Colon]) {
                    self.skip_eol();
                    let value = self.expression()?;
                    self.skip_eol();
                    ListEntry { key: first, value }
                } else {
                    ListEntry {
                        key: Expr::Atom {
                            value: Literal::Int(nb_entries),
                        },
                        value: first,
                    }
                };

                nb_entries += 1;
                entries.push(entry);

                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }

        self.skip_eol();
        let bracket = self.consume("Expect ']' after arguments", &[TokenKind::RightBracket])?;

        Ok(Expr::List { bracket, entries })
    }
}

//=====================================================
// Tests
//=====================================================
