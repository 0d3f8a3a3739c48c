//=====================================================
// File: resolver.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript static scope resolution
// Objective: Walk the AST once and map every variable reference to the
//            number of enclosing scopes between its use and its declaration
//=====================================================

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::{Expr, FunctionDecl, NodeId, Stmt};
use crate::tokenizer::{Position, Token};

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Resolver Error: {message} at {position}")]
pub struct ResolveError {
    pub message: String,
    pub position: Position,
}

impl ResolveError {
    fn new(token: &Token, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: token.position,
        }
    }
}

/// Binding-distance table: node identity to the number of enclosing scopes
/// to cross at evaluation time. A missing entry means "global scope".
pub type Bindings = HashMap<NodeId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
}

pub struct Resolver {
    /// Scope stack. Each frame maps a declared name to an "is fully
    /// initialized" flag; `declare` inserts `false`, `define` flips it to
    /// `true` once the initializer has been resolved.
    scopes: Vec<HashMap<String, bool>>,
    bindings: Bindings,
    errors: Vec<ResolveError>,
    current_function: FunctionType,
    current_class: ClassType,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            bindings: Bindings::new(),
            errors: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Resolve a whole script. Errors are recovered per top-level statement
    /// so one pass reports them all.
    pub fn resolve(mut self, statements: &[Stmt]) -> (Bindings, Vec<ResolveError>) {
        for statement in statements {
            if let Err(error) = self.resolve_stmt(statement) {
                log::error!("{error}");
                self.errors.push(error);
            }
        }

        (self.bindings, self.errors)
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), ResolveError> {
        match stmt {
            Stmt::Expression { expr } => self.resolve_expr(expr),
            Stmt::Var { name, initializer } => {
                self.declare(&name.lexeme);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer)?;
                }
                self.define(&name.lexeme);
                Ok(())
            }
            Stmt::Function { decl } => {
                self.declare(&decl.name.lexeme);
                self.define(&decl.name.lexeme);

                self.resolve_function(decl, FunctionType::Function)
            }
            Stmt::Class { name, methods } => {
                let enclosing = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(&name.lexeme);
                self.define(&name.lexeme);

                self.scopes.push(HashMap::from([("this".to_string(), true)]));

                let result = methods
                    .iter()
                    .try_for_each(|method| self.resolve_function(method, FunctionType::Method));

                self.scopes.pop();
                self.current_class = enclosing;

                result
            }
            Stmt::Block { statements } => {
                self.scopes.push(HashMap::new());

                let result = statements.iter().try_for_each(|s| self.resolve_stmt(s));

                self.scopes.pop();

                result
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch)?;
                }
                Ok(())
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(body)
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    return Err(ResolveError::new(
                        keyword,
                        "Can't return from top-level code.",
                    ));
                }

                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            Stmt::Import { imports, alias, .. } => {
                // Aliased imports resolve their name expression only; the
                // interpreter reports them as unsupported.
                if alias.is_some() {
                    if let Some(import) = imports.first() {
                        self.resolve_expr(import)?;
                    }
                    return Ok(());
                }

                imports.iter().try_for_each(|import| self.resolve_expr(import))
            }
        }
    }

    fn resolve_function(
        &mut self,
        decl: &FunctionDecl,
        kind: FunctionType,
    ) -> Result<(), ResolveError> {
        let enclosing = self.current_function;
        self.current_function = kind;

        self.scopes.push(HashMap::new());

        for param in &decl.params {
            self.declare(&param.lexeme);
            self.define(&param.lexeme);
        }

        let result = self.resolve_stmt(&decl.body);

        self.scopes.pop();
        self.current_function = enclosing;

        result
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), ResolveError> {
        match expr {
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            Expr::Unary { expr, .. } | Expr::Grouping { expr } => self.resolve_expr(expr),
            Expr::Prefix {
                expr,
                name,
                node_id,
                ..
            }
            | Expr::Postfix {
                expr,
                name,
                node_id,
                ..
            } => {
                self.resolve_expr(expr)?;
                self.resolve_local(*node_id, &name.lexeme);
                Ok(())
            }
            Expr::Atom { .. } => Ok(()),
            Expr::List { entries, .. } => {
                for entry in entries {
                    self.resolve_expr(&entry.key)?;
                    self.resolve_expr(&entry.value)?;
                }
                Ok(())
            }
            Expr::This { keyword, node_id } => {
                if self.current_class == ClassType::None {
                    return Err(ResolveError::new(
                        keyword,
                        "Can't use 'this' outside a class",
                    ));
                }

                self.resolve_local(*node_id, &keyword.lexeme);
                Ok(())
            }
            Expr::Variable { name, node_id } => {
                // A local read inside its own initializer is declared but not
                // yet defined at this point.
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        return Err(ResolveError::new(
                            name,
                            "Can't read local variable inside its own initializer",
                        ));
                    }
                }

                self.resolve_local(*node_id, &name.lexeme);
                Ok(())
            }
            Expr::Assign {
                name,
                value,
                node_id,
            } => {
                self.resolve_expr(value)?;
                self.resolve_local(*node_id, &name.lexeme);
                Ok(())
            }
            Expr::Call {
                callee,
                args,
                node_id,
                ..
            } => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }

                self.resolve_local(*node_id, &callee.name());
                Ok(())
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)
            }
        }
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.entry(name.to_string()).or_insert(false);
        }
    }

    fn define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    /// Record the distance from the innermost scope to the first frame
    /// containing `name`. A node that was already resolved keeps its first
    /// binding, and a miss leaves the node to global lookup at evaluation.
    fn resolve_local(&mut self, node_id: NodeId, name: &str) {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.contains_key(name) {
                let distance = self.scopes.len() - 1 - i;
                self.bindings.entry(node_id).or_insert(distance);
                return;
            }
        }
    }
}

//=====================================================
// Tests
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::tokenizer::Tokenizer;

    fn resolve(source: &str) -> (Vec<Stmt>, Bindings, Vec<ResolveError>) {
        let tokens = Tokenizer::new(source).tokenize().expect("tokenize");
        let (statements, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "unexpected parse errors: {errors:?}");
        let (bindings, errors) = Resolver::new().resolve(&statements);
        (statements, bindings, errors)
    }

    fn variable_id(expr: &Expr) -> NodeId {
        match expr {
            Expr::Variable { node_id, .. } => *node_id,
            other => panic!("expected variable, found {other:?}"),
        }
    }

    #[test]
    fn shadowing_resolves_to_the_innermost_declaration() {
        let (statements, bindings, errors) =
            resolve("{ var x = 1; { var x = 2; x; } x; }");
        assert!(errors.is_empty());

        let outer = match &statements[0] {
            Stmt::Block { statements } => statements,
            other => panic!("expected block, found {other:?}"),
        };

        let inner = match &outer[1] {
            Stmt::Block { statements } => statements,
            other => panic!("expected inner block, found {other:?}"),
        };

        let inner_use = match &inner[1] {
            Stmt::Expression { expr } => variable_id(expr),
            other => panic!("expected expression, found {other:?}"),
        };
        let outer_use = match &outer[2] {
            Stmt::Expression { expr } => variable_id(expr),
            other => panic!("expected expression, found {other:?}"),
        };

        assert_eq!(bindings.get(&inner_use), Some(&0));
        assert_eq!(bindings.get(&outer_use), Some(&0));
    }

    #[test]
    fn free_variable_in_closure_gets_its_capture_distance() {
        let (statements, bindings, errors) =
            resolve("{\nvar captured = 1\nfun get() {\nreturn captured\n}\n}");
        assert!(errors.is_empty());

        let outer = match &statements[0] {
            Stmt::Block { statements } => statements,
            other => panic!("expected block, found {other:?}"),
        };

        let body = match &outer[1] {
            Stmt::Function { decl } => &decl.body,
            other => panic!("expected function, found {other:?}"),
        };
        let ret = match body {
            Stmt::Block { statements } => &statements[0],
            other => panic!("expected function body block, found {other:?}"),
        };
        let use_id = match ret {
            Stmt::Return {
                value: Some(expr), ..
            } => variable_id(expr),
            other => panic!("expected return, found {other:?}"),
        };

        // One function scope plus the body block between use and declaration.
        assert_eq!(bindings.get(&use_id), Some(&2));
    }

    #[test]
    fn reading_a_local_in_its_own_initializer_is_rejected() {
        let (_, _, errors) = resolve("{ var a = a; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("own initializer"));
    }

    #[test]
    fn global_self_reference_is_not_a_resolver_error() {
        // At global scope there is no frame to track initialization.
        let (_, _, errors) = resolve("var a = a;");
        assert!(errors.is_empty());
    }

    #[test]
    fn this_outside_a_class_is_rejected() {
        let (_, _, errors) = resolve("this;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("outside a class"));
    }

    #[test]
    fn this_inside_a_method_resolves() {
        let (_, _, errors) = resolve("class A {\nfun init() {\nthis.x = 1;\n}\n}");
        assert!(errors.is_empty());
    }

    #[test]
    fn return_at_top_level_is_rejected() {
        let (_, _, errors) = resolve("return 1;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("top-level"));
    }

    #[test]
    fn globals_have_no_binding_entry() {
        let (statements, bindings, errors) = resolve("var g = 1; g;");
        assert!(errors.is_empty());

        let use_id = match &statements[1] {
            Stmt::Expression { expr } => variable_id(expr),
            other => panic!("expected expression, found {other:?}"),
        };

        assert!(bindings.get(&use_id).is_none());
    }

    #[test]
    fn one_error_does_not_stop_the_pass() {
        let (_, _, errors) = resolve("this;\nreturn 1;");
        assert_eq!(errors.len(), 2);
    }
}
