use std::cell::Cell;
use std::fs;
use std::rc::Rc;

use pgscript::interpreter::callable::Arity;
use pgscript::{ScriptEngine, Value};
use tempfile::TempDir;

/// Engine with a `Bump()` native counting how many times module code ran.
fn engine_with_counter() -> (ScriptEngine, Rc<Cell<i64>>) {
    let mut engine = ScriptEngine::new();
    let counter = Rc::new(Cell::new(0));

    let bump = counter.clone();
    engine.add_function("Bump", Arity::exact(0), move |_, _| {
        bump.set(bump.get() + 1);
        Ok(Value::Unit)
    });

    (engine, counter)
}

fn global_int(outcome: &pgscript::ScriptOutcome, name: &str) -> i64 {
    match outcome.global(name) {
        Some(Value::Int(value)) => value,
        other => panic!("expected int global '{name}', found {other:?}"),
    }
}

#[test]
fn importing_a_module_flattens_its_globals() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(
        dir.path().join("util.pg"),
        "var shared = 7\nfun double(x) { return x * 2; }\n",
    )
    .expect("write module");

    fs::write(
        dir.path().join("main.pg"),
        "import \"util\"\nvar result = double(shared)\n",
    )
    .expect("write main");

    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_file(&dir.path().join("main.pg"));

    assert!(!outcome.had_error);
    assert_eq!(global_int(&outcome, "result"), 14);
    assert_eq!(global_int(&outcome, "shared"), 7, "imports are flattening");
}

#[test]
fn importing_the_same_module_twice_runs_it_once() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("util.pg"), "Bump()\nvar tag = 1\n").expect("write module");
    fs::write(
        dir.path().join("main.pg"),
        "import \"util\"\nimport \"util\"\nvar ok = tag\n",
    )
    .expect("write main");

    let (mut engine, counter) = engine_with_counter();
    let outcome = engine.interpret_file(&dir.path().join("main.pg"));

    assert!(!outcome.had_error);
    assert_eq!(counter.get(), 1, "cached module must not re-run");
    assert_eq!(global_int(&outcome, "ok"), 1);
}

#[test]
fn module_cache_survives_across_scripts() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("util.pg"), "Bump()\nvar tag = 1\n").expect("write module");
    fs::write(dir.path().join("a.pg"), "import \"util\"\n").expect("write a");
    fs::write(dir.path().join("b.pg"), "import \"util\"\n").expect("write b");

    let (mut engine, counter) = engine_with_counter();

    assert!(!engine.interpret_file(&dir.path().join("a.pg")).had_error);
    assert!(!engine.interpret_file(&dir.path().join("b.pg")).had_error);

    assert_eq!(counter.get(), 1);
}

#[test]
fn multi_import_loads_every_module() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("one.pg"), "var first = 1\n").expect("write one");
    fs::write(dir.path().join("two.pg"), "var second = 2\n").expect("write two");
    fs::write(
        dir.path().join("main.pg"),
        "import \"one\", \"two\"\nvar sum = first + second\n",
    )
    .expect("write main");

    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_file(&dir.path().join("main.pg"));

    assert!(!outcome.had_error);
    assert_eq!(global_int(&outcome, "sum"), 3);
}

#[test]
fn missing_module_without_a_bridge_module_fails() {
    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_text("import \"no_such_module\"\n");

    assert!(outcome.had_error);
}

#[test]
fn bridge_module_import_declares_its_functions() {
    // `log` is registered as a bridge module; no file of that name exists.
    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_text("import \"log\"\nlog_warn(\"careful\")\nvar ok = 1\n");

    assert!(!outcome.had_error);
    assert_eq!(global_int(&outcome, "ok"), 1);
}

#[test]
fn module_with_errors_fails_the_import() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("broken.pg"), "var = ;\n").expect("write module");
    fs::write(
        dir.path().join("main.pg"),
        "import \"broken\"\nvar after = 1\n",
    )
    .expect("write main");

    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_file(&dir.path().join("main.pg"));

    assert!(outcome.had_error);
    // The import statement failed, not the whole script.
    assert_eq!(global_int(&outcome, "after"), 1);
}

#[test]
fn cyclic_imports_are_reported() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("a.pg"), "import \"b\"\nvar in_a = 1\n").expect("write a");
    fs::write(dir.path().join("b.pg"), "import \"a\"\nvar in_b = 1\n").expect("write b");
    fs::write(dir.path().join("main.pg"), "import \"a\"\n").expect("write main");

    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_file(&dir.path().join("main.pg"));

    assert!(outcome.had_error);
}

#[test]
fn aliased_single_import_is_reported_as_unsupported() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("util.pg"), "var tag = 1\n").expect("write module");
    fs::write(
        dir.path().join("main.pg"),
        "import \"util\" as u\nvar after = 2\n",
    )
    .expect("write main");

    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_file(&dir.path().join("main.pg"));

    // The alias form parses but the import itself is skipped.
    assert!(!outcome.had_error);
    assert_eq!(global_int(&outcome, "after"), 2);
    assert!(outcome.global("tag").is_none());
}

#[test]
fn module_importing_its_own_name_is_rejected() {
    let dir = TempDir::new().expect("temp dir");

    fs::write(dir.path().join("selfish.pg"), "import \"selfish\"\n").expect("write module");

    let mut engine = ScriptEngine::new();
    let outcome = engine.interpret_file(&dir.path().join("selfish.pg"));

    assert!(outcome.had_error);
}
