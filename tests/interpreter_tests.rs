use std::cell::RefCell;
use std::rc::Rc;

use pgscript::interpreter::callable::Arity;
use pgscript::{ScriptEngine, ScriptOutcome, Value};

/// Engine with a `Probe(...)` native recording every call's arguments.
fn engine_with_probe() -> (ScriptEngine, Rc<RefCell<Vec<Vec<Value>>>>) {
    let mut engine = ScriptEngine::new();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let sink = calls.clone();
    engine.add_function("Probe", Arity::range(0, 8), move |_, args| {
        sink.borrow_mut().push(args.into_iter().collect());
        Ok(Value::Unit)
    });

    (engine, calls)
}

fn run(source: &str) -> ScriptOutcome {
    let mut engine = ScriptEngine::new();
    engine.interpret_text(source)
}

fn run_ok(source: &str) -> ScriptOutcome {
    let outcome = run(source);
    assert!(!outcome.had_error, "script reported errors");
    outcome
}

fn global_int(outcome: &ScriptOutcome, name: &str) -> i64 {
    match outcome.global(name) {
        Some(Value::Int(value)) => value,
        other => panic!("expected int global '{name}', found {other:?}"),
    }
}

fn global_float(outcome: &ScriptOutcome, name: &str) -> f64 {
    match outcome.global(name) {
        Some(Value::Float(value)) => value,
        other => panic!("expected float global '{name}', found {other:?}"),
    }
}

#[test]
fn arithmetic_and_assignment() {
    let outcome = run_ok("var a = 1; var b = 2; var c = 3; \na = b + c\n");
    assert_eq!(global_int(&outcome, "a"), 5);
}

#[test]
fn end_to_end_expect_eq_scenario() {
    let mut engine = ScriptEngine::new();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let sink = calls.clone();
    engine.add_function("ExpectEq", Arity::exact(2), move |_, args| {
        sink.borrow_mut().push(args.into_iter().collect::<Vec<_>>());
        Ok(Value::Unit)
    });

    let outcome = engine.interpret_text("var a = 1; var b = 2; a = b + 3; ExpectEq(a, 5);");

    assert!(!outcome.had_error);
    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0][0], Value::Int(5)));
    assert!(matches!(calls[0][1], Value::Int(5)));
}

#[test]
fn integer_division_produces_a_float() {
    let outcome = run_ok("var d = 7 / 2\nvar m = 7 % 2\n");
    assert_eq!(global_float(&outcome, "d"), 3.5);
    assert_eq!(global_int(&outcome, "m"), 1);
}

#[test]
fn compound_assignment_matches_spelled_out_form() {
    let outcome = run_ok("var x = 1\nx += 1\nvar y = 1\ny = y + 1\n");
    assert_eq!(global_int(&outcome, "x"), global_int(&outcome, "y"));

    let outcome = run_ok("var x = 6\nx *= 2\nx -= 2\n");
    assert_eq!(global_int(&outcome, "x"), 10);
}

#[test]
fn compound_assignment_raises_the_same_error_as_the_spelled_out_form() {
    let sugar = run("var s = \"a\"\ns += 1\n");
    let spelled = run("var s = \"a\"\ns = s + 1\n");

    assert!(sugar.had_error);
    assert!(spelled.had_error);
}

#[test]
fn shadowing_never_leaks() {
    let (mut engine, calls) = engine_with_probe();

    let outcome = engine.interpret_text(
        "{ var x = 1; { var x = 2; Probe(x); } Probe(x); }",
    );

    assert!(!outcome.had_error);
    let calls = calls.borrow();
    assert!(matches!(calls[0][0], Value::Int(2)));
    assert!(matches!(calls[1][0], Value::Int(1)));
}

#[test]
fn closures_capture_their_defining_scope() {
    let outcome = run_ok(
        "fun make_counter() {\n\
         \tvar count = 0\n\
         \tfun increment() {\n\
         \t\tcount = count + 1\n\
         \t\treturn count\n\
         \t}\n\
         \treturn increment\n\
         }\n\
         var c1 = make_counter()\n\
         var c2 = make_counter()\n\
         var a = c1()\n\
         var b = c1()\n\
         var c = c2()\n",
    );

    assert_eq!(global_int(&outcome, "a"), 1);
    assert_eq!(global_int(&outcome, "b"), 2);
    assert_eq!(global_int(&outcome, "c"), 1, "each closure owns its counter");
}

#[test]
fn closures_observe_mutations_made_after_creation() {
    let outcome = run_ok(
        "var observed = 0\n\
         {\n\
         \tvar captured = 10\n\
         \tfun get() { return captured; }\n\
         \tcaptured = 99\n\
         \tobserved = get()\n\
         }\n",
    );

    assert_eq!(global_int(&outcome, "observed"), 99);
}

#[test]
fn arity_violation_raises_and_skips_the_body() {
    let (mut engine, calls) = engine_with_probe();

    let outcome = engine.interpret_text(
        "fun two(a, b) { Probe(a); return a; }\n\
         two(1)\n\
         two(1, 2, 3)\n",
    );

    assert!(outcome.had_error);
    assert!(calls.borrow().is_empty(), "function body must not execute");
}

#[test]
fn matching_arity_executes_normally() {
    let (mut engine, calls) = engine_with_probe();

    let outcome = engine.interpret_text("fun two(a, b) { Probe(a + b); }\ntwo(1, 2)\n");

    assert!(!outcome.had_error);
    assert!(matches!(calls.borrow()[0][0], Value::Int(3)));
}

#[test]
fn classes_bind_methods_per_instance() {
    let outcome = run_ok(
        "class Counter {\n\
         \tfun init(start) {\n\
         \t\tthis.value = start\n\
         \t}\n\
         \tfun bump() {\n\
         \t\tthis.value = this.value + 1\n\
         \t\treturn this.value\n\
         \t}\n\
         }\n\
         var c = Counter(5)\n\
         var d = Counter(100)\n\
         c.bump()\n\
         var cv = c.bump()\n\
         var dv = d.bump()\n",
    );

    assert_eq!(global_int(&outcome, "cv"), 7);
    assert_eq!(global_int(&outcome, "dv"), 101);
}

#[test]
fn constructor_arity_is_enforced() {
    let outcome = run(
        "class Point {\n\
         \tfun init(x, y) {\n\
         \t\tthis.x = x\n\
         \t\tthis.y = y\n\
         \t}\n\
         }\n\
         var p = Point(1)\n",
    );

    assert!(outcome.had_error);
}

#[test]
fn list_literals_support_subscript_and_synthetic_methods() {
    let outcome = run_ok(
        "var l = [1, 2, 3]\n\
         var n = l.size()\n\
         l.pushback(4)\n\
         var x = l[0] + l.at(3)\n\
         l[1] = 20\n\
         var y = l.at(1)\n\
         l.erase(\"0\")\n\
         var m = l.size()\n",
    );

    assert_eq!(global_int(&outcome, "n"), 3);
    assert_eq!(global_int(&outcome, "x"), 5);
    assert_eq!(global_int(&outcome, "y"), 20);
    assert_eq!(global_int(&outcome, "m"), 3);
}

#[test]
fn record_literals_expose_named_fields() {
    let outcome = run_ok(
        "var d = [\"name\": \"pg\", \"version\": 1]\n\
         var v = d.version\n\
         var v2 = d.at(\"version\")\n\
         d.patch = 7\n\
         var p = d.patch\n",
    );

    assert_eq!(global_int(&outcome, "v"), 1);
    assert_eq!(global_int(&outcome, "v2"), 1);
    assert_eq!(global_int(&outcome, "p"), 7);
}

#[test]
fn range_for_runs_the_body_once_per_entry() {
    let outcome = run_ok(
        "var l = [10, 20, 30]\n\
         var sum = 0\n\
         var count = 0\n\
         for (var v : l) {\n\
         \tsum = sum + v.second\n\
         \tcount = count + 1\n\
         }\n\
         var size_after = l.size()\n",
    );

    assert_eq!(global_int(&outcome, "count"), 3);
    assert_eq!(global_int(&outcome, "sum"), 60);
    assert_eq!(global_int(&outcome, "size_after"), 3, "iteration must not mutate storage");
}

#[test]
fn range_for_over_an_empty_list_never_runs() {
    let outcome = run_ok(
        "var count = 0\n\
         for (var v : []) {\n\
         \tcount = count + 1\n\
         }\n",
    );

    assert_eq!(global_int(&outcome, "count"), 0);
}

#[test]
fn classic_for_loops() {
    let outcome = run_ok(
        "var total = 0\n\
         for (var i = 0; i < 5; i = i + 1) {\n\
         \ttotal = total + i\n\
         }\n",
    );

    assert_eq!(global_int(&outcome, "total"), 10);
}

#[test]
fn iterator_increment_delegates_to_the_protocol() {
    let outcome = run_ok(
        "var l = [5, 6]\n\
         var it = l.it()\n\
         var first = it.current()\n\
         it++\n\
         var second = it.current()\n\
         var a = first.second\n\
         var b = second.second\n\
         var it2 = l.it()\n\
         var pair = ++it2\n\
         var c = pair.second\n",
    );

    assert_eq!(global_int(&outcome, "a"), 5);
    assert_eq!(global_int(&outcome, "b"), 6);
    assert_eq!(global_int(&outcome, "c"), 6);
}

#[test]
fn prefix_and_postfix_arithmetic() {
    let outcome = run_ok(
        "var i = 5\n\
         var a = i++\n\
         var b = ++i\n\
         var c = i--\n\
         var d = --i\n",
    );

    assert_eq!(global_int(&outcome, "a"), 5);
    assert_eq!(global_int(&outcome, "b"), 7);
    assert_eq!(global_int(&outcome, "c"), 7);
    assert_eq!(global_int(&outcome, "d"), 5);
    assert_eq!(global_int(&outcome, "i"), 5);
}

#[test]
fn logical_operators_short_circuit() {
    let outcome = run_ok(
        "var called = 0\n\
         fun bump() { called = called + 1; return 1; }\n\
         var a = false and bump()\n\
         var b = true or bump()\n\
         var c = true and bump()\n",
    );

    assert_eq!(global_int(&outcome, "called"), 1);
    assert!(matches!(outcome.global("a"), Some(Value::Bool(false))));
    assert!(matches!(outcome.global("b"), Some(Value::Bool(true))));
    assert!(matches!(outcome.global("c"), Some(Value::Bool(true))));
}

#[test]
fn return_unwinds_nested_control_flow() {
    let outcome = run_ok(
        "fun find() {\n\
         \tvar i = 0\n\
         \twhile (i < 10) {\n\
         \t\tif (i == 3) {\n\
         \t\t\treturn i\n\
         \t\t}\n\
         \t\ti = i + 1\n\
         \t}\n\
         \treturn 0 - 1\n\
         }\n\
         var found = find()\n",
    );

    assert_eq!(global_int(&outcome, "found"), 3);
}

#[test]
fn function_without_explicit_return_yields_zero() {
    let outcome = run_ok("fun noop() { var x = 1; }\nvar r = noop()\n");
    assert_eq!(global_int(&outcome, "r"), 0);
}

#[test]
fn runtime_error_aborts_only_its_statement() {
    let outcome = run("var a = 1\nmissing_function()\na = 2\n");

    assert!(outcome.had_error);
    assert_eq!(
        global_int(&outcome, "a"),
        2,
        "statements after a failed one must still run"
    );
}

#[test]
fn string_concatenation_and_comparison() {
    let outcome = run_ok(
        "var s = \"he\" + \"llo\"\n\
         var same = s == \"hello\"\n\
         var mixed = s == 5\n",
    );

    assert!(matches!(outcome.global("same"), Some(Value::Bool(true))));
    assert!(
        matches!(outcome.global("mixed"), Some(Value::Bool(false))),
        "unlike kinds compare unequal, not error"
    );
}

#[test]
fn comparison_between_incompatible_kinds_is_a_runtime_error() {
    let outcome = run("var bad = \"a\" < 1\n");
    assert!(outcome.had_error);
}
