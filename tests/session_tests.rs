//! Session controller tests

use pretty_assertions::assert_eq;
use pseudoc::config::{Config, VmConfig};
use pseudoc::value::Value;
use pseudoc::vm::{State, StopReason, VmError};
use pseudoc::{CompileError, Session, SessionError};
use std::path::Path;

fn session(src: &str) -> Session {
    let mut session = Session::default();
    if let Err(errors) = session.load(src) {
        panic!("load failed: {errors:#?}");
    }
    session
}

#[test]
fn test_load_reports_diagnostics() {
    let mut session = Session::default();
    let errors = session
        .load("real a\nentero b\na <- 2.0 + verdadero\nb <- a")
        .unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], CompileError::IncompatibleOperands { .. }));
    assert!(matches!(errors[1], CompileError::IncompatibleAssignment { .. }));
    assert_eq!(session.state(), None);
    assert_eq!(session.run(), Err(SessionError::NotLoaded));
}

#[test]
fn test_oversized_array_is_a_diagnostic() {
    let mut session = Session::default();
    let errors = session
        .load("entero a[4294967296, 4294967296]\na[1, 1] <- 1")
        .unwrap_err();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CompileError::InvalidDimension { line: 1, .. }));
    assert_eq!(session.state(), None);
}

#[test]
fn test_empty_program() {
    let mut session = Session::default();
    let program = session.load("").unwrap();
    assert!(program.is_empty());
    let stop = session.run().unwrap();
    assert_eq!(stop.reason, StopReason::Finished);
    assert_eq!(session.executed(), 0);
    assert_eq!(session.state(), Some(State::Finished));
}

#[test]
fn test_run_and_inspect() {
    let mut session = session("entero a, m[2, 2]\na <- 2\nm[2, 1] <- a * 5");
    assert_eq!(session.run().unwrap().reason, StopReason::Finished);
    assert_eq!(session.value_of("a"), Some(Value::Integer(2)));
    assert_eq!(session.cell_of("m", &[2, 1]), Some(Value::Integer(10)));
    assert_eq!(session.cell_of("m", &[1, 1]), None);
    assert_eq!(session.value_of("nada"), None);
}

#[test]
fn test_pending_write_is_cleared() {
    let mut session = session("escribir(1)\nescribir(2)");
    assert_eq!(session.run().unwrap().reason, StopReason::Write);
    assert_eq!(session.pending_write(), Some(Value::Integer(1)));
    assert_eq!(session.pending_write(), None);
    assert_eq!(session.run().unwrap().reason, StopReason::Write);
    assert_eq!(session.pending_write(), Some(Value::Integer(2)));
    assert_eq!(session.run().unwrap().reason, StopReason::Finished);
}

#[test]
fn test_supply_raw_input() {
    let src = "logico b\nreal x\ncaracter c, nombre[8]\nleer(b, x, c, nombre)";
    let mut session = session(src);
    for raw in ["verdadero", "3.5", "z", "\"hola\""] {
        let stop = session.run().unwrap();
        assert_eq!(stop.reason, StopReason::Read);
        session.supply_input(raw).unwrap();
    }
    assert_eq!(session.run().unwrap().reason, StopReason::Finished);
    assert_eq!(session.value_of("b"), Some(Value::Logical(true)));
    assert_eq!(session.value_of("x"), Some(Value::Real(3.5)));
    assert_eq!(session.value_of("c"), Some(Value::Character('z')));
    assert_eq!(session.value_of("nombre").unwrap().to_string(), "hola");
}

#[test]
fn test_input_whitespace_is_ignored() {
    let mut session = session("caracter c\nentero n\nleer(c, n)");
    for raw in [" x", "\t7 \n"] {
        assert_eq!(session.run().unwrap().reason, StopReason::Read);
        session.supply_input(raw).unwrap();
    }
    assert_eq!(session.run().unwrap().reason, StopReason::Finished);
    assert_eq!(session.value_of("c"), Some(Value::Character('x')));
    assert_eq!(session.value_of("n"), Some(Value::Integer(7)));
}

#[test]
fn test_invalid_and_mismatched_input() {
    let mut session = session("entero a\nleer(a)");
    session.run().unwrap();
    assert_eq!(session.pending_read().map(|r| r.name.as_str()), Some("a"));
    assert_eq!(
        session.supply_input(""),
        Err(SessionError::InvalidInput { raw: String::new() })
    );
    // an unparsable line leaves the read pending
    assert_eq!(session.state(), Some(State::AwaitingRead));

    let error = session.supply_input("hola").unwrap_err();
    assert!(matches!(
        error,
        SessionError::Vm(VmError::InputMismatch { .. })
    ));
    assert_eq!(session.state(), Some(State::Error));
}

#[test]
fn test_breakpoints_by_line() {
    let src = "entero a\n\na <- 1\n\n// comment\na <- 2\na <- 3";
    let mut session = session(src);
    assert_eq!(session.add_breakpoint(4), Ok(Some(6)));
    assert_eq!(session.add_breakpoint(6), Ok(Some(6)));
    assert_eq!(session.breakpoints(), vec![6]);
    assert_eq!(session.add_breakpoint(99), Ok(None));

    let stop = session.run().unwrap();
    assert_eq!(stop.reason, StopReason::Breakpoint);
    assert_eq!(stop.line, Some(6));
    assert_eq!(session.value_of("a"), Some(Value::Integer(1)));

    assert_eq!(session.run().unwrap().reason, StopReason::Finished);
    assert_eq!(session.value_of("a"), Some(Value::Integer(3)));
}

#[test]
fn test_remove_breakpoint_by_line() {
    let mut session = session("entero a\na <- 1\na <- 2");
    session.add_breakpoint(3).unwrap();
    assert_eq!(session.remove_breakpoint(3), Ok(true));
    assert_eq!(session.remove_breakpoint(3), Ok(false));
    assert!(session.breakpoints().is_empty());
    assert_eq!(session.run().unwrap().reason, StopReason::Finished);
}

#[test]
fn test_step_reports_lines() {
    let mut session = session("entero a\na <- 1\na <- a + 1");
    assert_eq!(session.step().unwrap().line, Some(2));
    assert_eq!(session.step().unwrap().line, Some(3));
    assert_eq!(session.value_of("a"), Some(Value::Integer(1)));
    assert_eq!(session.step().unwrap().reason, StopReason::Finished);
    assert_eq!(session.value_of("a"), Some(Value::Integer(2)));
}

#[test]
fn test_restart_keeps_breakpoints() {
    let mut session = session("entero a\na <- 1\na <- 2");
    session.add_breakpoint(3).unwrap();
    assert_eq!(session.run().unwrap().reason, StopReason::Breakpoint);
    assert_eq!(session.run().unwrap().reason, StopReason::Finished);

    session.restart().unwrap();
    assert_eq!(session.executed(), 0);
    assert_eq!(session.value_of("a"), None);
    assert_eq!(session.breakpoints(), vec![3]);
    assert_eq!(session.run().unwrap().reason, StopReason::Breakpoint);
}

#[test]
fn test_configured_limits() {
    let config = Config::from_toml("[vm]\nmax_steps = 50\n", Path::new("psc.toml")).unwrap();
    assert_eq!(config.vm.max_steps, Some(50));
    assert_eq!(config.vm.max_call_depth, VmConfig::default().max_call_depth);

    let mut session = Session::new(config.vm);
    session.load("mientras verdadero\nfinmientras").unwrap();
    assert_eq!(
        session.run(),
        Err(SessionError::Vm(VmError::StepLimit { limit: 50 }))
    );
    assert_eq!(session.state(), Some(State::Error));
}
