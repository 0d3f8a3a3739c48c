//=====================================================
// File: interpreter/callable.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript callable and object model
// Objective: User functions, native functions, classes, instances and the
//            iterator type, plus the synthetic methods shared by list and
//            record instances
//=====================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use super::environment::{EnvRef, Environment};
use super::errors::RuntimeError;
use super::value::Value;
use super::Interpreter;
use crate::ast::FunctionDecl;
use crate::tokenizer::{Position, Token};

/// Accepted argument-count range of a callable, validated on every
/// invocation before the body executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    pub fn exact(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && count <= self.max
    }
}

/// A user-defined function: the shared declaration plus the environment
/// captured at its definition site.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub token: Token,
    pub decl: Rc<FunctionDecl>,
    pub arity: Arity,
    pub closure: EnvRef,
}

impl Function {
    pub fn new(decl: Rc<FunctionDecl>, env: &EnvRef) -> Self {
        let arity = Arity::exact(decl.params.len());

        Self {
            name: decl.name.lexeme.clone(),
            token: decl.name.clone(),
            arity,
            closure: Environment::child(env),
            decl,
        }
    }

    /// Bind the function to an instance: the bound copy's captured
    /// environment additionally defines `this`.
    pub fn bind(&self, instance: &Rc<RefCell<Instance>>) -> Function {
        let closure = Environment::child(&self.closure);
        closure
            .borrow_mut()
            .declare("this", Value::Instance(instance.clone()));

        Function {
            name: self.name.clone(),
            token: self.token.clone(),
            decl: self.decl.clone(),
            arity: self.arity,
            closure,
        }
    }
}

// A recursive function's captured environment contains the function itself,
// so the closure chain stays out of the debug output.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

pub type NativeBody = Box<dyn Fn(&mut Interpreter, VecDeque<Value>) -> Result<Value, RuntimeError>>;

/// A native function: same arity contract as a user function, but the body
/// is host code. Configuration is captured by the closure at registration
/// time.
pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub body: NativeBody,
}

impl NativeFunction {
    pub fn value<F>(name: impl Into<String>, arity: Arity, body: F) -> Value
    where
        F: Fn(&mut Interpreter, VecDeque<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        Value::Native(Rc::new(NativeFunction {
            name: name.into(),
            arity,
            body: Box::new(body),
        }))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A class: a name plus its unbound methods. Calling the class constructs an
/// instance and rebinds every method to it.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub token: Token,
    pub methods: HashMap<String, Rc<Function>>,
}

impl Class {
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        self.methods.get(name).cloned()
    }
}

/// One named field of an instance. Fields keep declaration order so list
/// instances can be iterated deterministically.
#[derive(Debug, Clone)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

/// A runtime object: ordered field storage plus bound methods.
///
/// The same structure backs user objects, list literals, dict literals and
/// host-built result bundles.
#[derive(Debug)]
pub struct Instance {
    class: Option<Rc<Class>>,
    methods: HashMap<String, Value>,
    fields: Vec<Field>,
}

impl Instance {
    pub fn of_class(class: Rc<Class>) -> Rc<RefCell<Instance>> {
        Rc::new(RefCell::new(Instance {
            class: Some(class),
            methods: HashMap::new(),
            fields: Vec::new(),
        }))
    }

    pub fn system() -> Rc<RefCell<Instance>> {
        Rc::new(RefCell::new(Instance {
            class: None,
            methods: HashMap::new(),
            fields: Vec::new(),
        }))
    }

    pub fn class(&self) -> Option<Rc<Class>> {
        self.class.clone()
    }

    /// Printable identity, also used by the equality operator.
    pub fn element(&self) -> String {
        match &self.class {
            Some(class) => format!("Instance of {}", class.name),
            None => "Instance of System Class".to_string(),
        }
    }

    /// Look up a field first, then an attached method. Class methods are
    /// bound by `instance_get`, which owns the `Rc` needed for `this`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(field) = self.fields.iter().find(|f| f.key == name) {
            return Some(field.value.clone());
        }

        self.methods.get(name).cloned()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.key == key) {
            field.value = value;
        } else {
            self.fields.push(Field {
                key: key.to_string(),
                value,
            });
        }
    }

    /// Append under the stringified current size, the list append rule.
    pub fn pushback(&mut self, value: Value) {
        let key = self.fields.len().to_string();
        self.set(&key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.fields.retain(|f| f.key != key);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_at(&self, index: usize) -> Option<(String, Value)> {
        self.fields
            .get(index)
            .map(|f| (f.key.clone(), f.value.clone()))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn add_method(&mut self, name: impl Into<String>, value: Value) {
        self.methods.insert(name.into(), value);
    }
}

/// Field or method access on an instance, binding class methods on demand so
/// `this` resolves to this exact instance.
pub fn instance_get(
    instance: &Rc<RefCell<Instance>>,
    name: &Token,
) -> Result<Value, RuntimeError> {
    if let Some(value) = instance.borrow().get(&name.lexeme) {
        return Ok(value);
    }

    let class = instance.borrow().class();
    if let Some(class) = class {
        if let Some(method) = class.find_method(&name.lexeme) {
            return Ok(Value::Function(Rc::new(method.bind(instance))));
        }
    }

    Err(RuntimeError::undefined_property(&name.lexeme, name))
}

/// An iterator over another instance's field storage.
///
/// The iterator observes the storage through the shared handle instead of
/// copying it, so in-progress mutation of the underlying values is visible.
/// Changing the collection's size during iteration is undefined behavior.
#[derive(Debug)]
pub struct ListIter {
    source: Rc<RefCell<Instance>>,
    index: Cell<usize>,
}

impl ListIter {
    pub fn new(source: Rc<RefCell<Instance>>) -> Self {
        Self {
            source,
            index: Cell::new(0),
        }
    }

    pub fn begin(&self) -> Value {
        Value::Int(0)
    }

    pub fn end(&self) -> Value {
        Value::Int(self.source.borrow().len() as i64)
    }

    pub fn advance(&self) {
        if self.index.get() < self.source.borrow().len() {
            self.index.set(self.index.get() + 1);
        }
    }

    /// Current element as a `{first: key, second: value}` pair. Once the
    /// cursor is exhausted this yields the same value as `end()`, which is
    /// what terminates the lowered range-for loop.
    pub fn current(&self) -> Value {
        let source = self.source.borrow();

        if self.index.get() >= source.len() {
            return Value::Int(source.len() as i64);
        }

        let (key, value) = match source.field_at(self.index.get()) {
            Some(entry) => entry,
            None => return Value::Int(source.len() as i64),
        };

        let pair = Instance::system();
        pair.borrow_mut().set("first", Value::Str(key));
        pair.borrow_mut().set("second", value);

        Value::Instance(pair)
    }
}

/// Property access on an iterator: the four protocol methods.
pub fn iterator_method(iter: &Rc<ListIter>, name: &Token) -> Result<Value, RuntimeError> {
    let method = match name.lexeme.as_str() {
        "begin" => {
            let iter = iter.clone();
            NativeFunction::value("It Begin", Arity::exact(0), move |_, _| Ok(iter.begin()))
        }
        "current" => {
            let iter = iter.clone();
            NativeFunction::value("It Current", Arity::exact(0), move |_, _| Ok(iter.current()))
        }
        "next" => {
            let iter = iter.clone();
            NativeFunction::value("It Next", Arity::exact(0), move |_, _| {
                iter.advance();
                Ok(Value::Unit)
            })
        }
        "end" => {
            let iter = iter.clone();
            NativeFunction::value("It End", Arity::exact(0), move |_, _| Ok(iter.end()))
        }
        _ => return Err(RuntimeError::undefined_property(&name.lexeme, name)),
    };

    Ok(method)
}

//=====================================================
// Section: synthetic list methods
//=====================================================

fn list_position() -> Position {
    Position::new(0, 0)
}

/// Build the instance behind a list/record literal: plain field storage with
/// the synthetic `at`/`set`/`pushback`/`size`/`erase`/`it` methods attached.
///
/// The methods hold a weak handle to their own instance, keeping the object
/// graph acyclic under reference counting.
pub fn make_list_instance() -> Rc<RefCell<Instance>> {
    let instance = Instance::system();
    attach_list_methods(&instance);
    instance
}

fn upgrade(weak: &Weak<RefCell<Instance>>) -> Result<Rc<RefCell<Instance>>, RuntimeError> {
    weak.upgrade().ok_or(RuntimeError::General {
        message: "List instance is gone".to_string(),
        position: list_position(),
    })
}

fn attach_list_methods(instance: &Rc<RefCell<Instance>>) {
    let weak = Rc::downgrade(instance);
    let at = NativeFunction::value("List Get", Arity::exact(1), move |_, mut args| {
        let key = args.pop_front().unwrap_or(Value::Unit).to_string();
        let instance = upgrade(&weak)?;
        let value = instance.borrow().get(&key);
        value.ok_or(RuntimeError::UndefinedProperty {
            name: key,
            position: list_position(),
        })
    });

    let weak = Rc::downgrade(instance);
    let set = NativeFunction::value("List Set", Arity::exact(2), move |_, mut args| {
        let key = args.pop_front().unwrap_or(Value::Unit).to_string();
        let value = args.pop_front().unwrap_or(Value::Unit);
        let instance = upgrade(&weak)?;
        instance.borrow_mut().set(&key, value.clone());
        Ok(value)
    });

    let weak = Rc::downgrade(instance);
    let pushback = NativeFunction::value("List Pushback", Arity::exact(1), move |_, mut args| {
        let value = args.pop_front().unwrap_or(Value::Unit);
        let instance = upgrade(&weak)?;
        instance.borrow_mut().pushback(value);
        Ok(Value::Unit)
    });

    let weak = Rc::downgrade(instance);
    let size = NativeFunction::value("List Size", Arity::exact(0), move |_, _| {
        let instance = upgrade(&weak)?;
        let len = instance.borrow().len() as i64;
        Ok(Value::Int(len))
    });

    let weak = Rc::downgrade(instance);
    let erase = NativeFunction::value("List Erase", Arity::exact(1), move |_, mut args| {
        let key = args.pop_front().unwrap_or(Value::Unit).to_string();
        let instance = upgrade(&weak)?;
        instance.borrow_mut().remove(&key);
        Ok(Value::Unit)
    });

    let weak = Rc::downgrade(instance);
    let it = NativeFunction::value("List Iterator", Arity::exact(0), move |_, _| {
        let instance = upgrade(&weak)?;
        Ok(Value::Iter(Rc::new(ListIter::new(instance))))
    });

    let mut inner = instance.borrow_mut();
    inner.add_method("at", at);
    inner.add_method("set", set);
    inner.add_method("pushback", pushback);
    inner.add_method("size", size);
    inner.add_method("erase", erase);
    inner.add_method("it", it);
}

/// Host-side list construction: the same instance a list literal would
/// produce, filled from already evaluated values. Used to hand structured
/// argument bundles to script callbacks and to return structured data.
pub fn list_of(entries: Vec<(String, Value)>) -> Value {
    let instance = make_list_instance();

    for (key, value) in entries {
        instance.borrow_mut().set(&key, value);
    }

    Value::Instance(instance)
}

//=====================================================
// Tests
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_fields_keep_insertion_order() {
        let instance = Instance::system();
        instance.borrow_mut().set("b", Value::Int(1));
        instance.borrow_mut().set("a", Value::Int(2));

        assert_eq!(instance.borrow().field_at(0).map(|f| f.0), Some("b".into()));
        assert_eq!(instance.borrow().field_at(1).map(|f| f.0), Some("a".into()));
    }

    #[test]
    fn pushback_numbers_from_current_size() {
        let instance = Instance::system();
        instance.borrow_mut().pushback(Value::Int(10));
        instance.borrow_mut().pushback(Value::Int(20));

        assert_eq!(instance.borrow().field_at(1).map(|f| f.0), Some("1".into()));
    }

    #[test]
    fn iterator_observes_value_mutation_in_place() {
        let instance = make_list_instance();
        instance.borrow_mut().pushback(Value::Int(1));

        let iter = Rc::new(ListIter::new(instance.clone()));

        instance.borrow_mut().set("0", Value::Int(99));

        match iter.current() {
            Value::Instance(pair) => {
                let second = pair.borrow().get("second").expect("pair value");
                assert!(matches!(second, Value::Int(99)));
            }
            other => panic!("expected pair instance, found {other:?}"),
        }
    }

    #[test]
    fn exhausted_iterator_current_matches_end() {
        let instance = make_list_instance();
        instance.borrow_mut().pushback(Value::Int(1));

        let iter = ListIter::new(instance);
        iter.advance();

        assert!(matches!(iter.current(), Value::Int(1)));
        assert!(matches!(iter.end(), Value::Int(1)));
    }

    // Resizing the collection mid-iteration is undefined behavior at the
    // language level; this pins down what the shared-storage model does
    // today: the cursor keeps reading the live field list.
    #[test]
    fn growing_the_list_mid_iteration_extends_the_walk() {
        let instance = make_list_instance();
        instance.borrow_mut().pushback(Value::Int(1));

        let iter = ListIter::new(instance.clone());
        iter.advance();

        assert!(matches!(iter.current(), Value::Int(1)), "exhausted");

        instance.borrow_mut().pushback(Value::Int(2));

        match iter.current() {
            Value::Instance(pair) => {
                let second = pair.borrow().get("second").expect("pair value");
                assert!(matches!(second, Value::Int(2)));
            }
            other => panic!("expected pair instance, found {other:?}"),
        }
    }

    #[test]
    fn list_methods_do_not_keep_the_instance_alive() {
        let instance = make_list_instance();
        let weak = Rc::downgrade(&instance);
        drop(instance);
        assert!(weak.upgrade().is_none());
    }
}
