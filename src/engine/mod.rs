//=====================================================
// File: engine.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript embedding entry point
// Objective: Tie the pipeline together for host applications: bridge
//            registration, script interpretation from text or file, module
//            caching and the had-error outcome
//=====================================================

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::bridge::{register_builtins, Bridge, BridgeModule};
use crate::interpreter::callable::Arity;
use crate::interpreter::environment::EnvRef;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::value::Value;
use crate::interpreter::Interpreter;
use crate::modules::{ModuleLoader, ScriptImport};

/// Result of interpreting one script: the final global scope and whether
/// any stage reported an error.
pub struct ScriptOutcome {
    pub had_error: bool,
    pub globals: Option<EnvRef>,
}

impl ScriptOutcome {
    fn failed() -> Self {
        Self {
            had_error: true,
            globals: None,
        }
    }

    /// Convenience lookup of a global binding by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        let globals = self.globals.as_ref()?;
        globals
            .borrow()
            .entries()
            .into_iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
    }
}

/// The embedding surface of the interpreter.
///
/// Owns the bridge registry and the module cache; every interpreted script
/// gets its globals seeded from the bridge. Registration happens before
/// interpretation, never during it.
pub struct ScriptEngine {
    bridge: Rc<RefCell<Bridge>>,
    loader: Rc<RefCell<ModuleLoader>>,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine {
    /// An engine with the built-in natives and the `log` bridge module
    /// already registered.
    pub fn new() -> Self {
        let mut bridge = Bridge::new();
        register_builtins(&mut bridge);
        bridge.add_module("log", crate::bridge::log_module());

        Self {
            bridge: Rc::new(RefCell::new(bridge)),
            loader: Rc::new(RefCell::new(ModuleLoader::new())),
        }
    }

    /// An engine with an empty bridge, for hosts that want full control.
    pub fn bare() -> Self {
        Self {
            bridge: Rc::new(RefCell::new(Bridge::new())),
            loader: Rc::new(RefCell::new(ModuleLoader::new())),
        }
    }

    pub fn add_function<F>(&mut self, name: &str, arity: Arity, body: F)
    where
        F: Fn(&mut Interpreter, VecDeque<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        self.bridge.borrow_mut().add_function(name, arity, body);
    }

    pub fn add_module(&mut self, name: &str, module: BridgeModule) {
        self.bridge.borrow_mut().add_module(name, module);
    }

    pub fn add_constant(&mut self, name: &str, value: Value) {
        self.bridge.borrow_mut().add_constant(name, value);
    }

    pub fn interpret_text(&mut self, source: &str) -> ScriptOutcome {
        self.interpret(source, "", Vec::new())
    }

    /// Interpret with extra natives declared for this one script only.
    pub fn interpret_text_with(
        &mut self,
        source: &str,
        extras: Vec<(String, Value)>,
    ) -> ScriptOutcome {
        self.interpret(source, "", extras)
    }

    pub fn interpret_file(&mut self, path: &Path) -> ScriptOutcome {
        self.interpret_file_with(path, Vec::new())
    }

    pub fn interpret_file_with(
        &mut self,
        path: &Path,
        extras: Vec<(String, Value)>,
    ) -> ScriptOutcome {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                log::error!("Couldn't open script '{}': {error}", path.display());
                return ScriptOutcome::failed();
            }
        };

        self.interpret(&source, &path.to_string_lossy(), extras)
    }

    fn interpret(
        &mut self,
        source: &str,
        name: &str,
        extras: Vec<(String, Value)>,
    ) -> ScriptOutcome {
        let script = match ModuleLoader::compile(source, name) {
            Ok(script) => script,
            Err(error) => {
                log::error!("{error}");
                return ScriptOutcome::failed();
            }
        };

        let mut interpreter = Interpreter::new(
            script.bindings.clone(),
            name,
            self.loader.clone(),
            self.bridge.clone(),
        );

        self.bridge.borrow().seed(&interpreter.globals());

        for (extra_name, value) in extras {
            log::info!("Adding bridge function: {extra_name}");
            interpreter.globals().borrow_mut().declare(extra_name, value);
        }

        let had_error = interpreter.run(&script.ast);
        let globals = interpreter.globals();

        // File-backed scripts join the module cache so importing the same
        // file later reuses both the AST and these globals.
        if !name.is_empty() && !had_error {
            self.loader.borrow_mut().register(ScriptImport {
                globals: Some(globals.clone()),
                ..script
            });
        }

        ScriptOutcome {
            had_error,
            globals: Some(globals),
        }
    }
}
