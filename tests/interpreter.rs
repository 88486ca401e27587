use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::thread;

use rox::session::{RunError, Session};

/// In-memory `print` sink shared between the session and the test.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8(bytes).expect("print output is UTF-8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn session() -> (Session, SharedBuf) {
    let out = SharedBuf::default();
    (Session::with_output(Box::new(out.clone())), out)
}

fn run(source: &str) -> String {
    let (mut session, out) = session();

    if let Err(e) = session.run(source) {
        panic!("unexpected error:\n{}", e);
    }

    out.take()
}

/// Output printed before the failure, and the failure.
fn run_err(source: &str) -> (String, RunError) {
    let (mut session, out) = session();

    match session.run(source) {
        Ok(()) => panic!("expected an error, got output:\n{}", out.take()),
        Err(e) => (out.take(), e),
    }
}

fn runtime_message(source: &str) -> String {
    match run_err(source) {
        (_, e @ RunError::Runtime(_)) => e.to_string(),
        (_, e) => panic!("expected a runtime error, got:\n{}", e),
    }
}

// ───────────────────────────── expressions ─────────────────────────────

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("print 1 + 2 * 3;"), "7\n");
    assert_eq!(
        run("print (1 + 2) * 3; print 7 - 2 - 1; print 10 / 4; print -0;"),
        "9\n4\n2.5\n-0\n"
    );
}

#[test]
fn string_concatenation() {
    assert_eq!(run(r#"print "foo" + "bar";"#), "foobar\n");
    assert_eq!(
        runtime_message(r#"print "a" + 1;"#),
        "Operands must be two numbers or two strings.\n[line 1]"
    );
}

#[test]
fn numeric_operators_need_numbers() {
    assert_eq!(
        runtime_message(r#"print 1 < "2";"#),
        "Operands must be numbers.\n[line 1]"
    );
    assert_eq!(
        runtime_message("print -nil;"),
        "Operand must be a number.\n[line 1]"
    );
}

#[test]
fn equality_rules() {
    assert_eq!(
        run("print 1 == 1; print 0.1 + 0.2 == 0.3; print nil == nil; print nil == 1; print 1 != 2;"),
        "true\nfalse\ntrue\nfalse\ntrue\n"
    );

    assert_eq!(
        runtime_message(r#"print "a" == "a";"#),
        "Operands must both be numbers, or at least one nil.\n[line 1]"
    );
    assert_eq!(
        runtime_message("print true != false;"),
        "Operands must both be numbers, or at least one nil.\n[line 1]"
    );
}

#[test]
fn logical_operators_return_operands() {
    assert_eq!(
        run(r#"print nil or "default"; print 0 and "zero is truthy"; print false and 1; print "" or 2;"#),
        "default\nzero is truthy\nfalse\n\n"
    );
}

#[test]
fn ternary_skips_untaken_branch() {
    let output = run(
        "var hit = false;
         fun side() { hit = true; return 2; }
         print true ? 1 : side();
         print hit;
         print nil ? 1 : false ? 2 : 3;",
    );

    assert_eq!(output, "1\nfalse\n3\n");
}

#[test]
fn comma_yields_right_operand() {
    assert_eq!(
        run("var log = 0; var x = (log = log + 1, 10); print x; print log;"),
        "10\n1\n"
    );
}

#[test]
fn division_by_zero_halts_after_earlier_effects() {
    let (output, err) = run_err("print \"before\";\nprint 1 / 0;\nprint \"after\";");

    assert_eq!(output, "before\n");
    assert_eq!(err.to_string(), "Division by zero.\n[line 2]");
    assert_eq!(err.exit_code(), 70);
}

#[test]
fn print_formats() {
    let output = run(
        "fun f() {}
         class K {}
         print f;
         print clock;
         print K;
         print K();
         print fun () { return 1; };
         print nil;
         print 2.5;
         print 100;
         print \"s\";",
    );

    assert_eq!(
        output,
        "<fn f>\n<native fn>\nK\nK instance\n<fn lambda>\nnil\n2.5\n100\ns\n"
    );
}

#[test]
fn clock_returns_seconds() {
    assert_eq!(run("print clock() > 1000000000;"), "true\n");
}

// ───────────────────────────── variables ─────────────────────────────

#[test]
fn shadowing_reads_outer_in_initializer() {
    assert_eq!(
        run("var a = 1; { var a = a + 1; print a; } print a;"),
        "2\n1\n"
    );
}

#[test]
fn uninitialized_variables() {
    assert_eq!(
        runtime_message("var u;\nprint u;"),
        "Uninitialized variable 'u'.\n[line 2]"
    );
    assert_eq!(
        runtime_message("{ var u; print u; }"),
        "Uninitialized variable 'u'.\n[line 1]"
    );
    assert_eq!(run("var u; u = 3; print u;"), "3\n");
}

// ──────────────────────────── control flow ───────────────────────────

#[test]
fn loops_and_break() {
    assert_eq!(
        run("for (var i = 0; i < 10; i = i + 1) { if (i == 3) break; print i; }"),
        "0\n1\n2\n"
    );

    assert_eq!(
        run("var n = 0; while (true) { n = n + 1; if (n > 4) break; } print n;"),
        "5\n"
    );
}

#[test]
fn break_only_leaves_innermost_loop() {
    let output = run(
        "for (var i = 0; i < 2; i = i + 1) {
             for (var j = 0; j < 5; j = j + 1) {
                 if (j == 1) break;
                 print i * 10 + j;
             }
         }",
    );

    assert_eq!(output, "0\n10\n");
}

#[test]
fn return_unwinds_through_loops_and_blocks() {
    let output = run(
        "fun find() {
             var i = 0;
             while (true) {
                 { if (i == 2) return i; }
                 i = i + 1;
             }
         }
         print find();
         fun nothing() { return; }
         print nothing();",
    );

    assert_eq!(output, "2\nnil\n");
}

// ───────────────────────────── functions ─────────────────────────────

#[test]
fn closures_capture_by_reference() {
    let output = run(
        "fun makeCounter() {
             var i = 0;
             fun count() { i = i + 1; return i; }
             return count;
         }
         var c = makeCounter();
         print c();
         print c();",
    );

    assert_eq!(output, "1\n2\n");
}

#[test]
fn lambdas_capture_their_scope() {
    let output = run(
        "fun adder(n) { return fun (x) { return x + n; }; }
         var add2 = adder(2);
         print add2(40);",
    );

    assert_eq!(output, "42\n");
}

#[test]
fn recursion() {
    let output = run(
        "fun fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
         print fib(15);",
    );

    assert_eq!(output, "610\n");
}

#[test]
fn call_errors() {
    assert_eq!(
        runtime_message("fun f(a) { return a; }\nf(1, 2);"),
        "Expected 1 arguments but got 2.\n[line 2]"
    );
    assert_eq!(
        runtime_message(r#""str"();"#),
        "Can only call functions and classes.\n[line 1]"
    );
    assert_eq!(
        runtime_message("clock(1);"),
        "Expected 0 arguments but got 1.\n[line 1]"
    );
}

#[test]
fn deep_recursion_is_a_runtime_error() {
    // The host stack must hold the full call cap.
    let message = thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(|| runtime_message("fun r(n) { return r(n + 1); }\nr(0);"))
        .expect("spawn test thread")
        .join()
        .expect("no host stack overflow");

    assert_eq!(message, "Stack overflow.\n[line 1]");
}

// ────────────────────────────── classes ──────────────────────────────

#[test]
fn fields_and_methods() {
    let output = run(
        "class Point {
             init(x, y) { this.x = x; this.y = y; }
             sum() { return this.x + this.y; }
         }
         var p = Point(3, 4);
         print p.sum();
         p.x = 10;
         print p.sum();
         var m = p.sum;
         print m();",
    );

    assert_eq!(output, "7\n14\n14\n");
}

#[test]
fn initializer_always_returns_instance() {
    let output = run(
        "class P { init(x) { this.x = x; } }
         var p = P(3);
         print p.x;
         print p.init(4);
         print p.x;",
    );

    assert_eq!(output, "3\nP instance\n4\n");
}

#[test]
fn class_arity_comes_from_init() {
    assert_eq!(
        runtime_message("class A { init(a, b) { this.s = a + b; } }\nA(1);"),
        "Expected 2 arguments but got 1.\n[line 2]"
    );
    assert_eq!(run("class E {} print E();"), "E instance\n");
}

#[test]
fn single_inheritance_with_super() {
    let output = run(
        r#"class A { greet(){ return "A"; } }
           class B < A { greet(){ return super.greet() + "B"; } }
           print B().greet();"#,
    );

    assert_eq!(output, "AB\n");
}

#[test]
fn inherited_methods_and_initializers() {
    let output = run(
        "class Base { init(v) { this.v = v; } get() { return this.v; } }
         class Derived < Base { init(v) { super.init(v * 2); } }
         print Derived(21).get();",
    );

    assert_eq!(output, "42\n");
}

#[test]
fn getters_run_on_access() {
    let output = run(
        "class Circle {
             init(r) { this.r = r; }
             area { return 3 * this.r * this.r; }
             class unit() { return Circle(1); }
         }
         print Circle.unit().area;
         print Circle(2).area;",
    );

    assert_eq!(output, "3\n12\n");
}

#[test]
fn static_methods_are_inherited() {
    assert_eq!(
        run(r#"class Base { class make() { return "made"; } } class Derived < Base {} print Derived.make();"#),
        "made\n"
    );
}

#[test]
fn methods_are_found_before_fields() {
    assert_eq!(
        run(r#"class A { m() { return "method"; } } var a = A(); a.m = "field"; print a.m();"#),
        "method\n"
    );
}

#[test]
fn last_same_named_method_wins_at_runtime() {
    assert_eq!(
        run("class A { m() { return 1; } m(a) { return a; } } print A().m(5);"),
        "5\n"
    );
}

#[test]
fn property_errors() {
    assert_eq!(
        runtime_message("class A {} var a = A(); print a.missing;"),
        "Undefined property 'missing'.\n[line 1]"
    );
    assert_eq!(
        runtime_message("class A {} print A.missing;"),
        "Undefined static member 'missing'.\n[line 1]"
    );
    assert_eq!(
        runtime_message("class A {} A.x = 1;"),
        "Static members cannot be set.\n[line 1]"
    );
    assert_eq!(
        runtime_message("var n = 1; n.x = 2;"),
        "Only instances have fields.\n[line 1]"
    );
    assert_eq!(
        runtime_message("print 4.x;"),
        "Only instances have properties.\n[line 1]"
    );
    assert_eq!(
        runtime_message("var NotClass = 1; class B < NotClass {}"),
        "Superclass must be a class.\n[line 1]"
    );
}

// ──────────────────────────── static errors ──────────────────────────

#[test]
fn static_errors_prevent_execution() {
    for source in [
        "print \"never\"; class A < A {}",
        "print \"never\"; class A { init() { return; } }",
        "print \"never\"; break;",
        "print \"never\"; class A { class make() { return this; } }",
        "print \"never\"; { var unused = 1; }",
        "print \"never\"; { var a = 1; a = 2; }",
        "print \"never\"; fun f(a) { a = 3; return 1; } print f(1);",
        "print \"never\"; print 1 +;",
        "print \"never\"; print \"open;",
    ] {
        let (output, err) = run_err(source);

        assert_eq!(output, "", "{} should not run", source);
        assert!(matches!(err, RunError::Static(_)), "{}", source);
        assert_eq!(err.exit_code(), 65);
    }
}

#[test]
fn static_diagnostics_are_all_reported() {
    let (_, err) = run_err("print 1 +;\nvar = 2;");

    assert_eq!(
        err.to_string(),
        "[line 1] Error at ';': Expect expression.\n[line 2] Error at '=': Expect variable name."
    );
    assert_eq!(err.diagnostics().len(), 2);
}

// ───────────────────────────── sessions ──────────────────────────────

#[test]
fn repl_lines_share_globals() {
    let (mut session, out) = session();

    session.run("var a = 1;").unwrap();
    session.run("fun inc() { a = a + 1; return a; }").unwrap();
    session.run("print inc();").unwrap();
    session.run("print inc();").unwrap();

    assert_eq!(out.take(), "2\n3\n");
}

#[test]
fn rejected_line_leaves_no_trace() {
    let (mut session, out) = session();

    assert!(session.run("var b = 1; print nope;").is_err());

    let err = session.run("print b;").unwrap_err();
    assert_eq!(err.to_string(), "[line 1] Error at 'b': Undefined variable 'b'.");

    assert_eq!(out.take(), "");
}

#[test]
fn runtime_error_keeps_session_usable() {
    let (mut session, out) = session();

    session.run("var a = 1;").unwrap();
    session
        .run("fun boom() { var x = 1; return x / 0; }")
        .unwrap();

    let err = session.run("print a; boom();").unwrap_err();
    assert!(matches!(err, RunError::Runtime(_)));

    session.run("var z = 5; print z + a;").unwrap();

    assert_eq!(out.take(), "1\n6\n");
}

#[test]
fn globals_can_be_redeclared_across_lines() {
    let (mut session, out) = session();

    session.run("var a = 1;").unwrap();
    session.run("var a = a + 10; print a;").unwrap();

    assert_eq!(out.take(), "11\n");
}
