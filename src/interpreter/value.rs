//=====================================================
// File: interpreter/value.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript runtime values
// Objective: Define the tagged value union and its operator semantics,
//            numeric promotion, truthiness and printing
//=====================================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::callable::{Class, Function, Instance, ListIter, NativeFunction};

/// PgScript runtime value.
///
/// Primitive kinds carry their payload directly, callable and object kinds
/// are shared through `Rc` so that closures, bound methods and instances all
/// alias the same underlying storage.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
    Function(Rc<Function>),
    Native(Rc<NativeFunction>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
    Iter(Rc<ListIter>),
}

/// Failure of a value-level operator. The interpreter wraps it with the
/// offending token's position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpError(pub String);

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn incompatible(op: &str, lhs: &Value, rhs: &Value) -> OpError {
    OpError(format!(
        "Operator {op} between two incompatible operand: {} and {}",
        lhs.type_name(),
        rhs.type_name()
    ))
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Unit => "nil",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Iter(_) => "iterator",
        }
    }

    pub fn is_true(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Bool(v) => *v,
            Value::Str(v) => !v.is_empty(),
            Value::Unit => false,
            Value::Function(_) | Value::Native(_) | Value::Class(_) => true,
            Value::Instance(_) | Value::Iter(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Native(_) | Value::Class(_)
        )
    }

    pub fn add(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => Err(incompatible("+", self, other)),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            _ => Err(incompatible("-", self, other)),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 * b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * *b as f64)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            _ => Err(incompatible("*", self, other)),
        }
    }

    /// Division always yields a float, even between two integers.
    pub fn div(&self, other: &Value) -> Result<Value, OpError> {
        let divisor = match other {
            Value::Int(b) => *b as f64,
            Value::Float(b) => *b,
            _ => return Err(incompatible("/", self, other)),
        };

        if divisor == 0.0 {
            return Err(OpError("Division by zero".to_string()));
        }

        let dividend = match self {
            Value::Int(a) => *a as f64,
            Value::Float(a) => *a,
            _ => return Err(incompatible("/", self, other)),
        };

        Ok(Value::Float(dividend / divisor))
    }

    pub fn rem(&self, other: &Value) -> Result<Value, OpError> {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Err(OpError("Modulo by zero".to_string())),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
            _ => Err(incompatible("%", self, other)),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn compare(&self, other: &Value, op: &str) -> Result<(f64, f64), OpError> {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(incompatible(op, self, other)),
        }
    }

    pub fn gt(&self, other: &Value) -> Result<Value, OpError> {
        self.compare(other, ">").map(|(a, b)| Value::Bool(a > b))
    }

    pub fn ge(&self, other: &Value) -> Result<Value, OpError> {
        self.compare(other, ">=").map(|(a, b)| Value::Bool(a >= b))
    }

    pub fn lt(&self, other: &Value) -> Result<Value, OpError> {
        self.compare(other, "<").map(|(a, b)| Value::Bool(a < b))
    }

    pub fn le(&self, other: &Value) -> Result<Value, OpError> {
        self.compare(other, "<=").map(|(a, b)| Value::Bool(a <= b))
    }

    /// Equality never fails: operands of unlike kinds simply compare unequal.
    /// Instances and callables compare through their printable identity.
    pub fn eq_value(&self, other: &Value) -> Value {
        let equal = match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Unit, Value::Unit) => true,
            (Value::Instance(_), Value::Instance(_))
            | (Value::Function(_), Value::Function(_))
            | (Value::Native(_), Value::Native(_))
            | (Value::Class(_), Value::Class(_)) => self.to_string() == other.to_string(),
            _ => false,
        };

        Value::Bool(equal)
    }

    pub fn ne_value(&self, other: &Value) -> Value {
        match self.eq_value(other) {
            Value::Bool(equal) => Value::Bool(!equal),
            _ => Value::Bool(true),
        }
    }

    pub fn neg(&self) -> Result<Value, OpError> {
        match self {
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Float(v) => Ok(Value::Float(-v)),
            _ => Err(OpError(format!(
                "Operator unary - on an incompatible operand: {}",
                self.type_name()
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Unit => write!(f, "nil"),
            Value::Function(fun) => write!(f, "{}", fun.name),
            Value::Native(fun) => write!(f, "{}", fun.name),
            Value::Class(class) => write!(f, "{}", class.name),
            Value::Instance(instance) => write!(f, "{}", instance.borrow().element()),
            Value::Iter(_) => write!(f, "Iterator"),
        }
    }
}

//=====================================================
// Tests
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_promotes_int_to_float() {
        assert!(matches!(
            Value::Int(1).add(&Value::Float(2.5)),
            Ok(Value::Float(v)) if v == 3.5
        ));
    }

    #[test]
    fn string_concatenation() {
        assert!(matches!(
            Value::Str("ab".into()).add(&Value::Str("cd".into())),
            Ok(Value::Str(s)) if s == "abcd"
        ));
    }

    #[test]
    fn mixed_string_and_number_addition_fails() {
        let err = Value::Str("a".into()).add(&Value::Int(1)).unwrap_err();
        assert!(err.0.contains("incompatible"));
    }

    #[test]
    fn integer_division_yields_a_float() {
        assert!(matches!(
            Value::Int(3).div(&Value::Int(2)),
            Ok(Value::Float(v)) if v == 1.5
        ));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = Value::Int(3).div(&Value::Int(0)).unwrap_err();
        assert!(err.0.contains("zero"));
    }

    #[test]
    fn equality_between_unlike_kinds_is_false_not_an_error() {
        assert!(matches!(
            Value::Str("a".into()).eq_value(&Value::Int(1)),
            Value::Bool(false)
        ));
        assert!(matches!(
            Value::Str("a".into()).ne_value(&Value::Int(1)),
            Value::Bool(true)
        ));
    }

    #[test]
    fn comparison_between_unlike_kinds_fails() {
        assert!(Value::Str("a".into()).gt(&Value::Int(1)).is_err());
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(2).is_true());
        assert!(!Value::Int(0).is_true());
        assert!(Value::Str("x".into()).is_true());
        assert!(!Value::Str(String::new()).is_true());
        assert!(!Value::Unit.is_true());
    }
}
