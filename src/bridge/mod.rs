//=====================================================
// File: bridge.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript host bridge
// Objective: Registry of native functions, bridge modules and constants
//            exposed to scripts, plus the built-ins shipped with the crate
//=====================================================

use std::collections::{BTreeMap, VecDeque};

use chrono::Utc;
use rand::Rng;

use crate::interpreter::callable::{Arity, NativeFunction};
use crate::interpreter::environment::EnvRef;
use crate::interpreter::errors::RuntimeError;
use crate::interpreter::value::Value;
use crate::interpreter::Interpreter;

pub use crate::interpreter::callable::list_of;

/// A named, ordered collection of bridge entries. Registering a module makes
/// its entries importable by name (`import "log"`).
#[derive(Default)]
pub struct BridgeModule {
    entries: BTreeMap<String, Value>,
}

impl BridgeModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function<F>(&mut self, name: &str, arity: Arity, body: F)
    where
        F: Fn(&mut Interpreter, VecDeque<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        self.entries
            .insert(name.to_string(), NativeFunction::value(name, arity, body));
    }

    pub fn add_constant(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_string(), value);
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// The host bridge registry.
///
/// Everything here is registered before a script referencing it is
/// interpreted; there is no way to add entries mid-execution of the same
/// script. Functions and constants are seeded straight into each script's
/// global scope, modules only materialize when imported.
#[derive(Default)]
pub struct Bridge {
    functions: BTreeMap<String, Value>,
    constants: BTreeMap<String, Value>,
    modules: BTreeMap<String, BridgeModule>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function<F>(&mut self, name: &str, arity: Arity, body: F)
    where
        F: Fn(&mut Interpreter, VecDeque<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        self.functions
            .insert(name.to_string(), NativeFunction::value(name, arity, body));
    }

    pub fn add_constant(&mut self, name: &str, value: Value) {
        self.constants.insert(name.to_string(), value);
    }

    pub fn add_module(&mut self, name: &str, module: BridgeModule) {
        self.modules.insert(name.to_string(), module);
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module_entries(&self, name: &str) -> Option<Vec<(String, Value)>> {
        self.modules.get(name).map(BridgeModule::entries)
    }

    /// Declare every registered function and constant into a script's
    /// global scope.
    pub fn seed(&self, globals: &EnvRef) {
        for (name, value) in self.functions.iter().chain(self.constants.iter()) {
            globals.borrow_mut().declare(name.clone(), value.clone());
        }
    }
}

//=====================================================
// Section: built-in natives
//=====================================================

/// Built-in bridge functions shipped with the interpreter.
///
/// Bridge functions validate argument kinds themselves; misuse is logged and
/// answered with a nil result rather than raised, unlike user-defined
/// function failures.
pub fn register_builtins(bridge: &mut Bridge) {
    bridge.add_function("to_string", Arity::exact(1), |_, mut args| {
        let value = args.pop_front().unwrap_or(Value::Unit);
        Ok(Value::Str(value.to_string()))
    });

    bridge.add_function("log_info", Arity::exact(1), |_, mut args| {
        let value = args.pop_front().unwrap_or(Value::Unit);
        log::info!("{value}");
        Ok(Value::Unit)
    });

    bridge.add_function("hr_clock", Arity::exact(0), |_, _| {
        Ok(Value::Int(Utc::now().timestamp_millis()))
    });

    bridge.add_function("rand_range", Arity::exact(2), |_, mut args| {
        let low = args.pop_front().unwrap_or(Value::Unit);
        let high = args.pop_front().unwrap_or(Value::Unit);

        match (low, high) {
            (Value::Int(low), Value::Int(high)) if low < high => {
                Ok(Value::Int(rand::thread_rng().gen_range(low..high)))
            }
            (low, high) => {
                log::error!(
                    "rand_range expects two int arguments with low < high, got {} and {}",
                    low.type_name(),
                    high.type_name()
                );
                Ok(Value::Unit)
            }
        }
    });
}

/// The standard logging bridge module (`import "log"`).
pub fn log_module() -> BridgeModule {
    let mut module = BridgeModule::new();

    module.add_function("log_debug", Arity::exact(1), |_, mut args| {
        let value = args.pop_front().unwrap_or(Value::Unit);
        log::debug!("{value}");
        Ok(Value::Unit)
    });

    module.add_function("log_warn", Arity::exact(1), |_, mut args| {
        let value = args.pop_front().unwrap_or(Value::Unit);
        log::warn!("{value}");
        Ok(Value::Unit)
    });

    module.add_function("log_error", Arity::exact(1), |_, mut args| {
        let value = args.pop_front().unwrap_or(Value::Unit);
        log::error!("{value}");
        Ok(Value::Unit)
    });

    module
}

//=====================================================
// Tests
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::environment::Environment;
    use crate::tokenizer::{Token, TokenKind};

    #[test]
    fn seed_declares_functions_and_constants() {
        let mut bridge = Bridge::new();
        bridge.add_constant("answer", Value::Int(42));
        bridge.add_function("noop", Arity::exact(0), |_, _| Ok(Value::Unit));

        let globals = Environment::new();
        bridge.seed(&globals);

        let token = Token::new(TokenKind::Identifier, "answer", 0, 0);
        assert!(matches!(
            Environment::get(&globals, "answer", &token),
            Ok(Value::Int(42))
        ));
        assert!(Environment::get(&globals, "noop", &token).is_ok());
    }

    #[test]
    fn modules_are_not_seeded_until_imported() {
        let mut bridge = Bridge::new();
        bridge.add_module("log", log_module());

        let globals = Environment::new();
        bridge.seed(&globals);

        let token = Token::new(TokenKind::Identifier, "log_warn", 0, 0);
        assert!(Environment::get(&globals, "log_warn", &token).is_err());
        assert!(bridge.has_module("log"));
        assert_eq!(bridge.module_entries("log").map(|e| e.len()), Some(3));
    }
}
