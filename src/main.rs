//=====================================================
// File: main.rs
//=====================================================
// Author: PgScript Contributors
// License: MIT (see LICENSE)
// Goal: PgScript CLI entry point
// Objective: Command-line interface for executing .pg source files and
//            inline snippets, with optional AST printing
//=====================================================

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use env_logger::Env;

use pgscript::modules::ModuleLoader;
use pgscript::ScriptEngine;

#[derive(Parser, Debug)]
#[command(name = "pgscript", about = "PgScript CLI")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a .pg source file.
    Run(RunArgs),
    /// Evaluate inline source text.
    Eval(EvalArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Path to the script to execute.
    pub script: PathBuf,

    /// Print the parsed AST before execution.
    #[arg(long = "print-ast")]
    pub print_ast: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct EvalArgs {
    /// Source text to interpret.
    pub code: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Run(run) => {
            if run.print_ast {
                let source = std::fs::read_to_string(&run.script)?;
                let script = ModuleLoader::compile(&source, &run.script.to_string_lossy())?;
                println!("{:#?}", script.ast);
            }

            let mut engine = ScriptEngine::new();
            let outcome = engine.interpret_file(&run.script);

            if outcome.had_error {
                bail!("script '{}' reported errors", run.script.display());
            }
        }
        Command::Eval(eval) => {
            let mut engine = ScriptEngine::new();
            let outcome = engine.interpret_text(&eval.code);

            if outcome.had_error {
                bail!("script reported errors");
            }
        }
    }

    Ok(())
}
