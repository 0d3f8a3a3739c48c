//=====================================================
// File: interpreter/errors.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript runtime error type
// Objective: Carry line/column context for every failure raised while
//            evaluating a script
//=====================================================

use thiserror::Error;

use crate::tokenizer::{Position, Token};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Runtime Error: Undefined variable '{name}'. at {position}")]
    UndefinedVariable { name: String, position: Position },

    #[error("Runtime Error: Variable '{name}' must be declared first before assignment. at {position}")]
    UndeclaredAssignment { name: String, position: Position },

    #[error("Runtime Error: Undefined property '{name}'. at {position}")]
    UndefinedProperty { name: String, position: Position },

    #[error(
        "Runtime Error: Invalid number of arguments for function call: '{name}' \
         expected between: {min} and {max}, provided: {provided}. at {position}"
    )]
    Arity {
        name: String,
        min: usize,
        max: usize,
        provided: usize,
        position: Position,
    },

    #[error("Runtime Error: {message} at {position}")]
    General { message: String, position: Position },
}

impl RuntimeError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        RuntimeError::General {
            message: message.into(),
            position: token.position,
        }
    }

    pub fn undefined_variable(name: &str, token: &Token) -> Self {
        RuntimeError::UndefinedVariable {
            name: name.to_string(),
            position: token.position,
        }
    }

    pub fn undeclared_assignment(name: &str, token: &Token) -> Self {
        RuntimeError::UndeclaredAssignment {
            name: name.to_string(),
            position: token.position,
        }
    }

    pub fn undefined_property(name: &str, token: &Token) -> Self {
        RuntimeError::UndefinedProperty {
            name: name.to_string(),
            position: token.position,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            RuntimeError::UndefinedVariable { position, .. }
            | RuntimeError::UndeclaredAssignment { position, .. }
            | RuntimeError::UndefinedProperty { position, .. }
            | RuntimeError::Arity { position, .. }
            | RuntimeError::General { position, .. } => *position,
        }
    }
}
