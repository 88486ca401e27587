use std::collections::HashSet;

use rox::error::LoxError;
use rox::expr::{Expr, LiteralValue};
use rox::parser::Parser;
use rox::scanner::scan_tokens;
use rox::stmt::Stmt;
use rox::token::TokenType;

fn parse(source: &str) -> (Vec<Stmt>, Vec<LoxError>) {
    let (tokens, scan_errors) = scan_tokens(source.as_bytes());
    assert!(scan_errors.is_empty(), "scan errors: {:?}", scan_errors);

    let mut parser = Parser::new(&tokens);
    let statements = parser.parse();

    (statements, parser.take_errors())
}

fn parse_ok(source: &str) -> Vec<Stmt> {
    let (statements, errors) = parse(source);
    assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
    statements
}

fn single_expression(source: &str) -> Expr {
    let mut statements = parse_ok(source);
    assert_eq!(statements.len(), 1);

    match statements.remove(0) {
        Stmt::Expression(expr) => expr,
        other => panic!("expected expression statement, got {:?}", other),
    }
}

fn messages(errors: &[LoxError]) -> Vec<String> {
    errors.iter().map(ToString::to_string).collect()
}

#[test]
fn factor_binds_tighter_than_term() {
    let Expr::Binary {
        left,
        operator,
        right,
    } = single_expression("1 + 2 * 3;")
    else {
        panic!("expected binary");
    };

    assert_eq!(*left, Expr::Literal(LiteralValue::Number(1.0)));
    assert_eq!(operator.token_type, TokenType::PLUS);
    assert!(matches!(
        *right,
        Expr::Binary { ref operator, .. } if operator.token_type == TokenType::STAR
    ));
}

#[test]
fn comma_is_lowest_but_call_arguments_split_on_it() {
    let Expr::Binary {
        left,
        operator,
        right,
    } = single_expression("f(a, b), c;")
    else {
        panic!("expected comma expression");
    };

    assert_eq!(operator.token_type, TokenType::COMMA);
    assert!(matches!(*right, Expr::Variable { ref name, .. } if name.lexeme == "c"));

    let Expr::Call { arguments, .. } = *left else {
        panic!("expected call on the left");
    };
    assert_eq!(arguments.len(), 2);
}

#[test]
fn ternary_is_right_associative() {
    let Expr::Ternary {
        condition,
        else_branch,
        ..
    } = single_expression("a ? b : c ? d : e;")
    else {
        panic!("expected ternary");
    };

    assert!(matches!(*condition, Expr::Variable { ref name, .. } if name.lexeme == "a"));
    assert!(matches!(*else_branch, Expr::Ternary { .. }));
}

#[test]
fn assignment_targets() {
    assert!(matches!(single_expression("a = b = 1;"), Expr::Assign { value, .. }
        if matches!(*value, Expr::Assign { .. })));

    assert!(matches!(single_expression("a.b = 1;"), Expr::Set { .. }));

    let (statements, errors) = parse("1 = 2;");
    assert_eq!(
        messages(&errors),
        vec!["[line 1] Error at '=': Invalid assignment target."]
    );
    // reported without unwinding; the statement survives
    assert_eq!(statements.len(), 1);
}

#[test]
fn for_loop_desugars_to_while() {
    let statements = parse_ok("for (var i = 0; i < 3; i = i + 1) print i;");
    assert_eq!(statements.len(), 1);

    let Stmt::Block(outer) = &statements[0] else {
        panic!("expected block around the loop");
    };
    assert!(matches!(outer[0], Stmt::Var { ref name, .. } if name.lexeme == "i"));

    let Stmt::While { condition, body } = &outer[1] else {
        panic!("expected while");
    };
    assert!(matches!(condition, Expr::Binary { .. }));

    let Stmt::Block(inner) = body.as_ref() else {
        panic!("expected body + increment block");
    };
    assert!(matches!(inner[0], Stmt::Print(_)));
    assert!(matches!(inner[1], Stmt::Expression(Expr::Assign { .. })));
}

#[test]
fn empty_for_clauses_loop_forever() {
    let statements = parse_ok("for (;;) break;");

    let [Stmt::While { condition, body }] = statements.as_slice() else {
        panic!("expected a bare while, got {:?}", statements);
    };

    assert_eq!(*condition, Expr::Literal(LiteralValue::True));
    assert!(matches!(body.as_ref(), Stmt::Break(_)));
}

#[test]
fn class_members() {
    let statements = parse_ok(
        "class Circle < Shape {
            init(r) { this.r = r; }
            area { return 3 * this.r * this.r; }
            class unit() { return Circle(1); }
        }",
    );

    let Stmt::Class(decl) = &statements[0] else {
        panic!("expected class");
    };

    assert_eq!(decl.name.lexeme, "Circle");
    assert!(matches!(decl.superclass, Some(Expr::Variable { ref name, .. }) if name.lexeme == "Shape"));

    assert_eq!(decl.methods.len(), 2);
    assert_eq!(decl.methods[0].display_name(), "init");
    assert_eq!(decl.methods[0].arity(), 1);
    assert!(decl.methods[1].is_getter());

    assert_eq!(decl.static_methods.len(), 1);
    assert_eq!(decl.static_methods[0].display_name(), "unit");
    assert!(!decl.static_methods[0].is_getter());
}

#[test]
fn fun_keyword_declares_or_builds_lambda() {
    let statements = parse_ok("fun named(a) { return a; } fun (x) { return x; };");

    assert!(matches!(&statements[0], Stmt::Function(decl) if decl.display_name() == "named"));

    let Stmt::Expression(Expr::Lambda(decl)) = &statements[1] else {
        panic!("expected lambda expression statement");
    };
    assert!(decl.name.is_none());
    assert_eq!(decl.display_name(), "lambda");
    assert_eq!(decl.arity(), 1);
}

#[test]
fn synchronize_reports_every_bad_statement() {
    let (statements, errors) = parse("var = 1; print 2; var x = ; print 3;");

    assert_eq!(
        messages(&errors),
        vec![
            "[line 1] Error at '=': Expect variable name.",
            "[line 1] Error at ';': Expect expression.",
        ]
    );

    assert_eq!(statements.len(), 2);
    assert!(statements.iter().all(|s| matches!(s, Stmt::Print(_))));
}

#[test]
fn error_at_end_of_input() {
    let (_, errors) = parse("print 1");

    assert_eq!(
        messages(&errors),
        vec!["[line 1] Error at end: Expect ';' after value."]
    );
    assert!(errors[0].is_static());
}

#[test]
fn too_many_parameters_is_reported_and_parsing_continues() {
    let names: Vec<String> = (0..256).map(|i| format!("p{}", i)).collect();
    let source = format!("fun f({}) {{ return 0; }}\nprint ;", names.join(", "));

    let (statements, errors) = parse(&source);

    assert_eq!(
        messages(&errors),
        vec![
            "[line 1] Error at 'p255': Can't have more than 255 parameters.",
            "[line 2] Error at ';': Expect expression.",
        ]
    );

    match &statements[..] {
        [Stmt::Function(decl)] => assert_eq!(decl.arity(), 256),
        other => panic!("expected one function, got {:?}", other),
    }
}

#[test]
fn too_many_arguments_is_reported_and_parsing_continues() {
    let args: Vec<String> = (0..256).map(|i| format!("a{}", i)).collect();
    let source = format!("f({});\nprint ;", args.join(", "));

    let (statements, errors) = parse(&source);

    assert_eq!(
        messages(&errors),
        vec![
            "[line 1] Error at 'a255': Can't have more than 255 arguments.",
            "[line 2] Error at ';': Expect expression.",
        ]
    );

    match &statements[..] {
        [Stmt::Expression(Expr::Call { arguments, .. })] => assert_eq!(arguments.len(), 256),
        other => panic!("expected one call, got {:?}", other),
    }
}

#[test]
fn exactly_255_parameters_and_arguments_are_accepted() {
    let names: Vec<String> = (0..255).map(|i| format!("p{}", i)).collect();
    let list = names.join(", ");

    parse_ok(&format!("fun f({}) {{ return 0; }} f({});", list, list));
}

#[test]
fn super_requires_a_method_name() {
    let (_, errors) = parse("super;");

    assert_eq!(
        messages(&errors),
        vec!["[line 1] Error at ';': Expect '.' after 'super'."]
    );
}

#[test]
fn node_ids_are_unique_and_continue_from_base() {
    let (tokens, _) = scan_tokens(b"a; b = a; this;");

    let mut parser = Parser::with_id_base(&tokens, 100);
    let statements = parser.parse();

    let ids: Vec<usize> = statements
        .iter()
        .map(|stmt| match stmt {
            Stmt::Expression(Expr::Variable { id, .. })
            | Stmt::Expression(Expr::Assign { id, .. })
            | Stmt::Expression(Expr::This { id, .. }) => *id,
            other => panic!("unexpected {:?}", other),
        })
        .collect();

    let unique: HashSet<usize> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
    assert!(ids.iter().all(|id| *id >= 100));
    assert!(parser.next_id() > *ids.iter().max().unwrap_or(&0));
}
