//=====================================================
// File: modules.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript module loading
// Objective: Resolve import names to script files, run the front half of
//            the pipeline and cache parsed ASTs and computed globals by
//            relative path
//=====================================================

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::ast::Stmt;
use crate::interpreter::environment::EnvRef;
use crate::parser::Parser;
use crate::resolver::{Bindings, Resolver};
use crate::tokenizer::{LexerError, Tokenizer};

/// Script file extension.
pub const SCRIPT_EXTENSION: &str = ".pg";

/// A fully front-ended script: AST plus binding table, and, once the module
/// has been interpreted, its global scope.
#[derive(Clone, Debug)]
pub struct ScriptImport {
    /// Relative path used as the cache key, or the embedding-provided name
    /// for text scripts.
    pub name: String,
    pub ast: Rc<Vec<Stmt>>,
    pub bindings: Rc<Bindings>,
    pub globals: Option<EnvRef>,
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Failed reading module '{path}': {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("Lexer error while loading '{path}': {error}")]
    Lexer { path: String, error: LexerError },

    #[error("{count} parse error(s) while loading '{path}'")]
    Parse { path: String, count: usize },

    #[error("{count} resolver error(s) while loading '{path}'")]
    Resolve { path: String, count: usize },

    #[error("Cyclic module import detected for '{module}'")]
    Cyclic { module: String },
}

/// Loader and cache for script modules.
///
/// Importing the same file twice reuses the parsed AST, and — once the
/// first interpretation finished — its computed globals.
#[derive(Default)]
pub struct ModuleLoader {
    cache: HashMap<String, ScriptImport>,
    loading: HashSet<String>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the script extension when the import name lacks it.
    pub fn module_file_name(name: &str) -> String {
        if name.ends_with(SCRIPT_EXTENSION) {
            name.to_string()
        } else {
            format!("{name}{SCRIPT_EXTENSION}")
        }
    }

    /// Resolve a module name against a base directory.
    ///
    /// `Ok(None)` means the file does not exist — the caller may still find
    /// a bridge module registered under the same name.
    pub fn load(
        &mut self,
        name: &str,
        base_dir: &Path,
    ) -> Result<Option<ScriptImport>, ModuleError> {
        let file = base_dir.join(Self::module_file_name(name));

        if !file.is_file() {
            log::debug!(
                "Couldn't load module '{}': file doesn't exist, but it may be a bridge module.",
                file.display()
            );
            return Ok(None);
        }

        let key = file.to_string_lossy().to_string();

        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached.clone()));
        }

        let source = fs::read_to_string(&file).map_err(|error| ModuleError::Io {
            path: file.clone(),
            error,
        })?;

        let script = Self::compile(&source, &key)?;
        self.cache.insert(key, script.clone());

        Ok(Some(script))
    }

    /// Run the front half of the pipeline: tokenize, parse, resolve. Any
    /// stage error marks the whole script as failed.
    pub fn compile(source: &str, name: &str) -> Result<ScriptImport, ModuleError> {
        let tokens = Tokenizer::new(source)
            .tokenize()
            .map_err(|error| ModuleError::Lexer {
                path: name.to_string(),
                error,
            })?;

        let (ast, parse_errors) = Parser::new(tokens).parse();

        let (bindings, resolve_errors) = Resolver::new().resolve(&ast);

        if !parse_errors.is_empty() {
            return Err(ModuleError::Parse {
                path: name.to_string(),
                count: parse_errors.len(),
            });
        }

        if !resolve_errors.is_empty() {
            return Err(ModuleError::Resolve {
                path: name.to_string(),
                count: resolve_errors.len(),
            });
        }

        Ok(ScriptImport {
            name: name.to_string(),
            ast: Rc::new(ast),
            bindings: Rc::new(bindings),
            globals: None,
        })
    }

    /// Guard against a module importing itself through a cycle while its
    /// first interpretation is still in flight.
    pub fn mark_loading(&mut self, name: &str) -> Result<(), ModuleError> {
        if !self.loading.insert(name.to_string()) {
            return Err(ModuleError::Cyclic {
                module: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn finish_loading(&mut self, name: &str) {
        self.loading.remove(name);
    }

    /// Attach the globals computed by a module's first interpretation so
    /// later imports skip re-running it.
    pub fn store_globals(&mut self, name: &str, globals: EnvRef) {
        if let Some(entry) = self.cache.get_mut(name) {
            entry.globals = Some(globals);
        }
    }

    /// Register an already compiled top-level script so imports of the same
    /// file reuse it.
    pub fn register(&mut self, script: ScriptImport) {
        self.cache.insert(script.name.clone(), script);
    }
}

//=====================================================
// Tests
//=====================================================
