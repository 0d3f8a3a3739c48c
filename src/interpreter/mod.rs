//=====================================================
// File: interpreter/mod.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript tree-walking interpreter
// Objective: Evaluate the resolved AST against a chain of environments,
//            using the resolver's binding distances for variable access and
//            recovering from runtime errors per top-level statement
//=====================================================

pub mod callable;
pub mod environment;
pub mod errors;
pub mod value;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::ast::{Expr, Literal, NodeId, Stmt};
use crate::bridge::Bridge;
use crate::modules::ModuleLoader;
use crate::resolver::Bindings;
use crate::tokenizer::{Token, TokenKind};

use callable::{
    instance_get, iterator_method, make_list_instance, Class, Function, Instance, NativeFunction,
};
use environment::{EnvRef, Environment};
use errors::RuntimeError;
use value::Value;

//=====================================================
// Section 1: Interpreter state
//=====================================================

pub struct Interpreter {
    /// Current scope frame. Swapped while executing blocks and calls.
    env: EnvRef,
    /// Global frame of the script being interpreted.
    globals: EnvRef,
    bindings: Rc<Bindings>,
    script_name: String,
    loader: Rc<RefCell<ModuleLoader>>,
    bridge: Rc<RefCell<Bridge>>,
    return_triggered: bool,
    return_value: Value,
    had_error: bool,
}

impl Interpreter {
    pub fn new(
        bindings: Rc<Bindings>,
        script_name: impl Into<String>,
        loader: Rc<RefCell<ModuleLoader>>,
        bridge: Rc<RefCell<Bridge>>,
    ) -> Self {
        let globals = Environment::new();

        Self {
            env: globals.clone(),
            globals,
            bindings,
            script_name: script_name.into(),
            loader,
            bridge,
            return_triggered: false,
            return_value: Value::Int(0),
            had_error: false,
        }
    }

    /// A lightweight reference interpreter: it forwards every lookup to the
    /// same scope chain and binding table but owns its transient execution
    /// state, so independently triggered host callbacks can run functions
    /// from the same script without trampling each other.
    pub fn fork_ref(&self) -> Interpreter {
        let env = Environment::child(&self.env);

        Interpreter {
            env: env.clone(),
            globals: env,
            bindings: self.bindings.clone(),
            script_name: self.script_name.clone(),
            loader: self.loader.clone(),
            bridge: self.bridge.clone(),
            return_triggered: false,
            return_value: Value::Int(0),
            had_error: false,
        }
    }

    pub fn globals(&self) -> EnvRef {
        self.globals.clone()
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    /// Execute every top-level statement in order. A runtime error aborts
    /// only the statement that raised it; the rest of the script still runs.
    pub fn run(&mut self, statements: &[Stmt]) -> bool {
        for statement in statements {
            if let Err(error) = self.execute(statement) {
                log::error!("{error}");
                self.had_error = true;
            }
        }

        self.had_error
    }

    //=====================================================
    // Section 2: Statement execution
    //=====================================================

    fn execute(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Expression { expr } => {
                self.evaluate(expr)?;
                Ok(())
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Unit,
                };

                self.env.borrow_mut().declare(name.lexeme.clone(), value);
                Ok(())
            }

            Stmt::Function { decl } => {
                let function = Function::new(decl.clone(), &self.env);
                self.env
                    .borrow_mut()
                    .declare(decl.name.lexeme.clone(), Value::Function(Rc::new(function)));
                Ok(())
            }

            Stmt::Class { name, methods } => {
                self.env
                    .borrow_mut()
                    .declare(name.lexeme.clone(), Value::Unit);

                let mut table = HashMap::new();
                for decl in methods {
                    table.insert(
                        decl.name.lexeme.clone(),
                        Rc::new(Function::new(decl.clone(), &self.env)),
                    );
                }

                let class = Value::Class(Rc::new(Class {
                    name: name.lexeme.clone(),
                    token: name.clone(),
                    methods: table,
                }));

                Environment::assign(&self.env, &name.lexeme, name, class)
            }

            Stmt::Block { statements } => {
                self.execute_block(statements, Environment::child(&self.env))?;
                Ok(())
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if !self.return_triggered && self.evaluate(condition)?.is_true() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }

            Stmt::While { condition, body } => {
                while !self.return_triggered && self.evaluate(condition)?.is_true() {
                    self.execute(body)?;
                }
                Ok(())
            }

            Stmt::Return { value, .. } => {
                self.return_value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Int(0),
                };
                self.return_triggered = true;
                Ok(())
            }

            Stmt::Import {
                keyword,
                imports,
                alias,
            } => {
                if alias.is_some() {
                    log::error!("Named imports are not supported yet.");
                    return Ok(());
                }

                for import in imports {
                    let name = self.evaluate(import)?.to_string();
                    self.import_module(&name, keyword)?;
                }
                Ok(())
            }
        }
    }

    /// Run a statement list in the given frame, restoring the previous frame
    /// afterwards. Returns the in-flight return value when a `return`
    /// unwound the block, a zero value otherwise.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: EnvRef,
    ) -> Result<Value, RuntimeError> {
        let previous = std::mem::replace(&mut self.env, env);
        let result = self.run_block(statements);
        self.env = previous;
        result
    }

    fn run_block(&mut self, statements: &[Stmt]) -> Result<Value, RuntimeError> {
        for statement in statements {
            self.execute(statement)?;

            if self.return_triggered {
                return Ok(self.return_value.clone());
            }
        }

        Ok(Value::Int(0))
    }

    //=====================================================
    // Section 3: Expression evaluation
    //=====================================================

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Atom { value } => Ok(match value {
                Literal::Int(v) => Value::Int(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Str(v) => Value::Str(v.clone()),
                Literal::Bool(v) => Value::Bool(*v),
            }),

            Expr::Grouping { expr } => self.evaluate(expr),

            Expr::Binary { left, op, right } => {
                let lvalue = self.evaluate(left)?;
                let rvalue = self.evaluate(right)?;

                let result = match op.kind {
                    TokenKind::Plus => lvalue.add(&rvalue),
                    TokenKind::Minus => lvalue.sub(&rvalue),
                    TokenKind::Star => lvalue.mul(&rvalue),
                    TokenKind::Slash => lvalue.div(&rvalue),
                    TokenKind::Percent => lvalue.rem(&rvalue),
                    TokenKind::Greater => lvalue.gt(&rvalue),
                    TokenKind::GreaterEqual => lvalue.ge(&rvalue),
                    TokenKind::Less => lvalue.lt(&rvalue),
                    TokenKind::LessEqual => lvalue.le(&rvalue),
                    TokenKind::EqualEqual => Ok(lvalue.eq_value(&rvalue)),
                    TokenKind::NotEqual => Ok(lvalue.ne_value(&rvalue)),
                    _ => return Err(RuntimeError::new(op, "Unknown binary operation")),
                };

                result.map_err(|e| RuntimeError::new(op, e.0))
            }

            Expr::Logical { left, op, right } => {
                let lvalue = self.evaluate(left)?;

                // Short-circuit: `or` stops on a truthy left operand, `and`
                // on a falsy one. The result is always a boolean.
                match op.kind {
                    TokenKind::OrOr => {
                        if lvalue.is_true() {
                            return Ok(Value::Bool(true));
                        }
                    }
                    TokenKind::AndAnd => {
                        if !lvalue.is_true() {
                            return Ok(Value::Bool(false));
                        }
                    }
                    _ => return Err(RuntimeError::new(op, "Unknown logic operation")),
                }

                let rvalue = self.evaluate(right)?;
                Ok(Value::Bool(rvalue.is_true()))
            }

            Expr::Unary { op, expr } => {
                let value = self.evaluate(expr)?;

                match op.kind {
                    TokenKind::Not => Ok(Value::Bool(!value.is_true())),
                    TokenKind::Minus => value.neg().map_err(|e| RuntimeError::new(op, e.0)),
                    _ => Err(RuntimeError::new(op, "Unknown unary operation")),
                }
            }

            Expr::Prefix {
                op,
                name,
                expr,
                node_id,
            } => {
                let value = self.evaluate(expr)?;

                match op.kind {
                    TokenKind::Increment => {
                        // `++it` delegates to the iterator protocol instead
                        // of arithmetic.
                        if let Value::Iter(iter) = &value {
                            iter.advance();
                            return Ok(iter.current());
                        }

                        let result = value
                            .add(&Value::Int(1))
                            .map_err(|e| RuntimeError::new(op, e.0))?;
                        self.assign_variable(name, *node_id, result.clone())?;
                        Ok(result)
                    }
                    TokenKind::Decrement => {
                        let result = value
                            .sub(&Value::Int(1))
                            .map_err(|e| RuntimeError::new(op, e.0))?;
                        self.assign_variable(name, *node_id, result.clone())?;
                        Ok(result)
                    }
                    _ => Err(RuntimeError::new(op, "Unknown prefix operation")),
                }
            }

            Expr::Postfix {
                op,
                name,
                expr,
                node_id,
            } => {
                let value = self.evaluate(expr)?;

                match op.kind {
                    TokenKind::Increment => {
                        // `it++` advances the iterator and yields the
                        // iterator itself.
                        if let Value::Iter(iter) = &value {
                            iter.advance();
                            return Ok(value);
                        }

                        let result = value
                            .add(&Value::Int(1))
                            .map_err(|e| RuntimeError::new(op, e.0))?;
                        self.assign_variable(name, *node_id, result)?;
                        Ok(value)
                    }
                    TokenKind::Decrement => {
                        let result = value
                            .sub(&Value::Int(1))
                            .map_err(|e| RuntimeError::new(op, e.0))?;
                        self.assign_variable(name, *node_id, result)?;
                        Ok(value)
                    }
                    _ => Err(RuntimeError::new(op, "Unknown postfix operation")),
                }
            }

            Expr::List { entries, .. } => {
                let instance = make_list_instance();

                for entry in entries {
                    let key = self.evaluate(&entry.key)?;
                    let value = self.evaluate(&entry.value)?;

                    instance.borrow_mut().set(&key.to_string(), value);
                }

                Ok(Value::Instance(instance))
            }

            Expr::This { keyword, node_id } => {
                self.lookup_variable(&keyword.lexeme, keyword, *node_id)
            }

            Expr::Variable { name, node_id } => {
                self.lookup_variable(&name.lexeme, name, *node_id)
            }

            Expr::Assign {
                name,
                value,
                node_id,
            } => {
                let value = self.evaluate(value)?;
                self.assign_variable(name, *node_id, value.clone())?;
                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                args,
                node_id,
            } => {
                let callee_value = self.evaluate(callee)?;

                let mut arguments = VecDeque::new();
                for arg in args {
                    arguments.push_back(self.evaluate(arg)?);
                }

                if callee_value.is_callable() {
                    return self.call_callable(&callee_value, arguments, paren);
                }

                // Indirect call: the value names a global or bound function.
                let function =
                    self.lookup_variable(&callee_value.to_string(), paren, *node_id)?;
                self.call_callable(&function, arguments, paren)
            }

            Expr::Get { object, name } => {
                let object = self.evaluate(object)?;

                match object {
                    Value::Instance(instance) => instance_get(&instance, name),
                    Value::Iter(iter) => iterator_method(&iter, name),
                    _ => Err(RuntimeError::new(name, "Only instances have properties")),
                }
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object)?;

                let instance = match object {
                    Value::Instance(instance) => instance,
                    _ => return Err(RuntimeError::new(name, "Only instances have fields")),
                };

                let value = self.evaluate(value)?;
                instance.borrow_mut().set(&name.lexeme, value.clone());
                Ok(value)
            }
        }
    }

    //=====================================================
    // Section 4: Variable access through binding distances
    //=====================================================

    /// Scope walk of exactly the resolved distance; a node with no binding
    /// entry reads the global frame directly.
    fn lookup_variable(
        &self,
        name: &str,
        token: &Token,
        node_id: NodeId,
    ) -> Result<Value, RuntimeError> {
        if self.bindings.is_empty() {
            return Environment::get(&self.globals, name, token);
        }

        match self.bindings.get(&node_id) {
            Some(distance) => {
                let frame = Environment::ancestor(&self.env, *distance);
                Environment::get(&frame, name, token)
            }
            None => Environment::get(&self.globals, name, token),
        }
    }

    fn assign_variable(
        &mut self,
        name: &Token,
        node_id: NodeId,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if self.bindings.is_empty() {
            return Environment::assign(&self.globals, &name.lexeme, name, value);
        }

        match self.bindings.get(&node_id) {
            Some(distance) => {
                let frame = Environment::ancestor(&self.env, *distance);
                Environment::assign(&frame, &name.lexeme, name, value)
            }
            None => Environment::assign(&self.globals, &name.lexeme, name, value),
        }
    }

    //=====================================================
    // Section 5: Calls
    //=====================================================

    fn call_callable(
        &mut self,
        callee: &Value,
        args: VecDeque<Value>,
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => self.call_function(function, args),
            Value::Native(native) => self.call_native(native, args, paren),
            Value::Class(class) => self.instantiate(class, args),
            other => Err(RuntimeError::new(
                paren,
                format!("Can only call functions and classes, got {}", other.type_name()),
            )),
        }
    }

    /// Invoke a user-defined function: arity first, then one fresh frame
    /// parented on the *captured* environment, parameters bound in order.
    pub fn call_function(
        &mut self,
        function: &Function,
        mut args: VecDeque<Value>,
    ) -> Result<Value, RuntimeError> {
        if !function.arity.accepts(args.len()) {
            return Err(RuntimeError::Arity {
                name: function.name.clone(),
                min: function.arity.min,
                max: function.arity.max,
                provided: args.len(),
                position: function.token.position,
            });
        }

        let frame = Environment::child(&function.closure);
        for param in &function.decl.params {
            let value = args.pop_front().unwrap_or(Value::Unit);
            frame.borrow_mut().declare(param.lexeme.clone(), value);
        }

        let value = self.execute_block(
            std::slice::from_ref(&function.decl.body),
            Environment::child(&frame),
        )?;

        // Clear any return flag in case the function returned early.
        self.return_triggered = false;

        Ok(value)
    }

    fn call_native(
        &mut self,
        native: &Rc<NativeFunction>,
        args: VecDeque<Value>,
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        if !native.arity.accepts(args.len()) {
            return Err(RuntimeError::Arity {
                name: native.name.clone(),
                min: native.arity.min,
                max: native.arity.max,
                provided: args.len(),
                position: paren.position,
            });
        }

        let native = native.clone();
        (native.body)(self, args)
    }

    /// Construct an instance from a class: every method is rebound to the
    /// new instance, and a method literally named `init` runs as the
    /// constructor, its return value discarded.
    pub fn instantiate(
        &mut self,
        class: &Rc<Class>,
        args: VecDeque<Value>,
    ) -> Result<Value, RuntimeError> {
        let instance = Instance::of_class(class.clone());

        if let Some(init) = class.find_method("init") {
            let bound = init.bind(&instance);
            self.call_function(&bound, args)?;
        }

        Ok(Value::Instance(instance))
    }

    //=====================================================
    // Section 6: Imports
    //=====================================================

    fn import_module(&mut self, name: &str, keyword: &Token) -> Result<(), RuntimeError> {
        let script_path = Path::new(&self.script_name);

        // Resolve relative to the importing script's own directory.
        let base_dir = if script_path.is_file() {
            script_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            PathBuf::new()
        };

        // A module resolving back to the importing file is only legal when a
        // bridge module hides behind the same name.
        let module_path = base_dir.join(ModuleLoader::module_file_name(name));
        if script_path.is_file() && module_path == script_path {
            if self.bridge.borrow().has_module(name) {
                return self.declare_bridge_module(name, keyword);
            }
            return Err(RuntimeError::new(
                keyword,
                "Current module is trying to import itself...",
            ));
        }

        let loaded = self
            .loader
            .borrow_mut()
            .load(name, &base_dir)
            .map_err(|error| RuntimeError::new(keyword, error.to_string()))?;

        let script = match loaded {
            Some(script) => script,
            // No such file: fall back to a registered bridge module.
            None => return self.declare_bridge_module(name, keyword),
        };

        // Importing the same file twice reuses its already computed globals.
        if let Some(globals) = script.globals.clone() {
            self.flatten_globals(&globals);
            return Ok(());
        }

        self.loader
            .borrow_mut()
            .mark_loading(&script.name)
            .map_err(|error| RuntimeError::new(keyword, error.to_string()))?;

        // The module runs with its own private interpreter, seeded with the
        // same bridge functions as the importing script.
        let mut interpreter = Interpreter::new(
            script.bindings.clone(),
            script.name.clone(),
            self.loader.clone(),
            self.bridge.clone(),
        );
        self.bridge.borrow().seed(&interpreter.globals);

        let had_error = interpreter.run(&script.ast);

        self.loader.borrow_mut().finish_loading(&script.name);

        if had_error {
            return Err(RuntimeError::new(
                keyword,
                format!("Imported module '{name}' has some errors"),
            ));
        }

        self.loader
            .borrow_mut()
            .store_globals(&script.name, interpreter.globals());

        // Imports are flattening: every global the module produced is copied
        // into the importing script's global scope.
        self.flatten_globals(&interpreter.globals());

        Ok(())
    }

    fn declare_bridge_module(&mut self, name: &str, keyword: &Token) -> Result<(), RuntimeError> {
        let entries = self.bridge.borrow().module_entries(name);

        match entries {
            Some(entries) => {
                for (entry_name, value) in entries {
                    self.globals.borrow_mut().declare(entry_name, value);
                }
                Ok(())
            }
            None => Err(RuntimeError::new(
                keyword,
                format!("Couldn't load module '{name}': no such script file or bridge module"),
            )),
        }
    }

    fn flatten_globals(&mut self, module_globals: &EnvRef) {
        for (name, value) in module_globals.borrow().entries() {
            self.globals.borrow_mut().declare(name, value);
        }
    }
}

//=====================================================
// Section 7: Host-held script functions
//=====================================================

/// A script function handed to host code, e.g. an event callback.
///
/// The wrapper owns a forked interpreter reference so several of these can
/// exist for the same script, each with private transient state. Runtime
/// errors are caught at this boundary and logged; they never unwind into
/// host control flow.
pub struct ScriptFunction {
    function: Function,
    interpreter: RefCell<Interpreter>,
    script_name: String,
}

impl ScriptFunction {
    pub fn new(function: Function, source: &Interpreter) -> Self {
        Self {
            interpreter: RefCell::new(source.fork_ref()),
            script_name: source.script_name.clone(),
            function,
        }
    }

    pub fn invoke(&self, args: VecDeque<Value>) -> Value {
        let mut interpreter = self.interpreter.borrow_mut();

        match interpreter.call_function(&self.function, args) {
            Ok(value) => value,
            Err(error) => {
                log::error!("{error} in script: {}", self.script_name);
                Value::Unit
            }
        }
    }
}
