//! Lexer and parser tests

use pretty_assertions::assert_eq;
use pseudoc::CompileError;
use pseudoc::ast::{BinaryOp, ExprKind, Literal, ModuleKind, StmtKind};
use pseudoc::lexer::{TokenKind, lex};
use pseudoc::types::AtomicKind;

fn kinds(src: &str) -> Vec<TokenKind> {
    lex(src)
        .expect("lexing failed")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn test_keywords_and_identifiers() {
    assert_eq!(
        kinds("entero enteros finsi si_no"),
        vec![
            TokenKind::Entero,
            TokenKind::Ident,
            TokenKind::FinSi,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn test_operators() {
    assert_eq!(
        kinds("a <- b <= c <> d < e"),
        vec![
            TokenKind::Ident,
            TokenKind::Arrow,
            TokenKind::Ident,
            TokenKind::LessEq,
            TokenKind::Ident,
            TokenKind::NotEq,
            TokenKind::Ident,
            TokenKind::Less,
            TokenKind::Ident,
            TokenKind::Eof
        ]
    );
}

#[test]
fn test_literals() {
    assert_eq!(
        kinds("12 3.5 \"hola\" verdadero falso"),
        vec![
            TokenKind::IntLit,
            TokenKind::RealLit,
            TokenKind::StrLit,
            TokenKind::Verdadero,
            TokenKind::Falso,
            TokenKind::Eof
        ]
    );
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        kinds("// nothing here\nescribir(1) // trailing"),
        vec![
            TokenKind::Ident,
            TokenKind::LParen,
            TokenKind::IntLit,
            TokenKind::RParen,
            TokenKind::Eof
        ]
    );
}

#[test]
fn test_token_lines() {
    let tokens = lex("entero a\n\na <- 2").unwrap();
    let lines: Vec<u32> = tokens.iter().map(|t| t.span.line).collect();
    assert_eq!(lines[..5], [1, 1, 3, 3, 3]);
}

#[test]
fn test_invalid_token() {
    let err = lex("entero a\na <- 2 $").unwrap_err();
    match err {
        CompileError::InvalidToken { text, line, .. } => {
            assert_eq!(text, "$");
            assert_eq!(line, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_parse_program_shape() {
    let src = r#"
entero a, m[3, 2]
a <- 1
p(a)

procedimiento p(entero ref x)
    x <- x + 1
finprocedimiento

funcion f(real y) : logico
    retornar y > 0.5
finfuncion
"#;
    let program = pseudoc::parse(src).expect("parse failed");
    assert_eq!(program.main.kind, ModuleKind::Main);
    assert_eq!(program.main.body.len(), 3);
    let names: Vec<&str> = program.modules.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["p", "f"]);

    let p = &program.modules["p"];
    assert_eq!(p.kind, ModuleKind::Procedure);
    assert!(p.params[0].by_ref);
    let f = &program.modules["f"];
    assert_eq!(f.return_type, Some(AtomicKind::Logical));
    assert!(!f.params[0].by_ref);

    let StmtKind::Declare(decls) = &program.main.body[0].kind else {
        panic!("expected a declaration");
    };
    assert_eq!(decls[1].name, "m");
    assert_eq!(decls[1].dims, vec![3, 2]);
}

#[test]
fn test_power_binds_tighter_than_unary_minus() {
    let program = pseudoc::parse("real x\nx <- -2 ^ 2").unwrap();
    let StmtKind::Assign { value, .. } = &program.main.body[1].kind else {
        panic!("expected an assignment");
    };
    let ExprKind::Unary { operand, .. } = &value.kind else {
        panic!("expected a negation, found {:?}", value.kind);
    };
    assert!(matches!(
        operand.kind,
        ExprKind::Binary {
            op: BinaryOp::Power,
            ..
        }
    ));
}

#[test]
fn test_string_literal_quotes_stripped() {
    let program = pseudoc::parse("escribir(\"hola\")").unwrap();
    let StmtKind::Call(call) = &program.main.body[0].kind else {
        panic!("expected a call");
    };
    assert!(matches!(
        &call.args[0].kind,
        ExprKind::Literal(Literal::Text(text)) if text == "hola"
    ));
}

#[test]
fn test_syntax_error_is_single_diagnostic() {
    let errors = pseudoc::parse("entero a\nsi a > 1\nfinsi").unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        CompileError::UnexpectedToken { line: 3, .. }
    ));
}

#[test]
fn test_main_module_name_is_reserved() {
    let errors = pseudoc::parse("procedimiento principal()\nfinprocedimiento").unwrap_err();
    assert!(matches!(errors[0], CompileError::RepeatedModule { .. }));
}
