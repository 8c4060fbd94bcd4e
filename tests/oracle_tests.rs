//! The bytecode machine and the tree-walking interpreter must agree on
//! output, final global state and faults

use pretty_assertions::assert_eq;
use pseudoc::config::VmConfig;
use pseudoc::interp::{InterpError, Interpreter};
use pseudoc::value::Value;
use pseudoc::vm::{Machine, StopReason, VmError};

struct Outcome {
    output: Vec<Value>,
    globals: Vec<(String, Option<Vec<Option<Value>>>)>,
    error: Option<InterpError>,
}

fn global_names(src: &str) -> Vec<String> {
    let program = pseudoc::parse(src).expect("parse failed");
    let hir = pseudoc::analyze(&program).expect("analysis failed");
    hir.main()
        .expect("main module")
        .symbols
        .iter()
        .map(|symbol| symbol.name.clone())
        .collect()
}

fn on_machine(src: &str, input: &[Value]) -> Outcome {
    let program = pseudoc::compile(src).expect("compilation failed");
    let mut machine = Machine::new(program, VmConfig::default()).unwrap();
    let mut input = input.iter().cloned();
    let mut output = Vec::new();
    let error = loop {
        let stop = match machine.run() {
            Ok(stop) => stop,
            Err(error) => break Some(InterpError::Fault(error)),
        };
        match stop.reason {
            StopReason::Write => output.extend(machine.take_output()),
            StopReason::Read => match input.next() {
                Some(value) => {
                    if let Err(error) = machine.supply_input(value) {
                        break Some(InterpError::Fault(error));
                    }
                }
                None => break Some(InterpError::InputExhausted),
            },
            StopReason::Breakpoint | StopReason::Step => {}
            StopReason::Finished => break None,
        }
    };
    let globals = global_names(src)
        .into_iter()
        .map(|name| {
            let cells = machine.cells_of(&name);
            (name, cells)
        })
        .collect();
    Outcome {
        output,
        globals,
        error,
    }
}

fn on_interpreter(src: &str, input: &[Value]) -> Outcome {
    let program = pseudoc::parse(src).expect("parse failed");
    let hir = pseudoc::analyze(&program).expect("analysis failed");
    let mut interpreter = Interpreter::new(&hir).with_input(input.to_vec());
    let error = interpreter.run().err();
    let globals = global_names(src)
        .into_iter()
        .map(|name| {
            let cells = interpreter.cells_of(&name);
            (name, cells)
        })
        .collect();
    Outcome {
        output: interpreter.output().to_vec(),
        globals,
        error,
    }
}

/// Run both back ends and return the shared outcome
fn agree(src: &str, input: &[Value]) -> Outcome {
    let machine = on_machine(src, input);
    let interpreter = on_interpreter(src, input);
    assert_eq!(machine.output, interpreter.output, "output differs");
    assert_eq!(machine.globals, interpreter.globals, "globals differ");
    assert_eq!(machine.error, interpreter.error, "faults differ");
    machine
}

fn rendered(outcome: &Outcome) -> Vec<String> {
    outcome.output.iter().map(Value::to_string).collect()
}

#[test]
fn test_conditionals() {
    let src = r#"
entero a, b
a <- 7
si a mod 2 = 0 entonces
    b <- 0
sino
    b <- 1
finsi
si a > 5 y b = 1 entonces
    escribir("grande e impar")
finsi
si no (a > 5) entonces
sino
    escribir(a)
finsi
"#;
    let outcome = agree(src, &[]);
    assert_eq!(rendered(&outcome), vec!["grande e impar", "7"]);
}

#[test]
fn test_loops() {
    let src = r#"
entero i, suma, n
suma <- 0
para i <- 1 hasta 10
    suma <- suma + i
finpara
escribir(suma, i)
n <- 0
mientras n < 3
    n <- n + 1
finmientras
repetir
    n <- n - 1
hasta que n <= 0
escribir(n)
para i <- 5 hasta 1
    escribir("nunca")
finpara
escribir(i)
"#;
    let outcome = agree(src, &[]);
    assert_eq!(rendered(&outcome), vec!["55", "11", "0", "5"]);
}

#[test]
fn test_counter_in_array_cell() {
    let src = r#"
entero v[3], k
v[1] <- 0
v[2] <- 0
v[3] <- 0
k <- 1
para v[k] <- 1 hasta 3
    k <- 2
    escribir(v[1], v[2])
finpara
"#;
    agree(src, &[]);
}

#[test]
fn test_arrays_and_text() {
    let src = r#"
entero m[2, 3], fila[3], i, j
caracter nombre[6], c
real r[2]
para i <- 1 hasta 2
    para j <- 1 hasta 3
        m[i, j] <- i * 10 + j
    finpara
finpara
fila <- m[2]
escribir(m, fila)
nombre <- "ana"
c <- 'z'
nombre[4] <- c
escribir(nombre)
r[1] <- 3
r[2] <- r[1] / 2.0
escribir(r)
"#;
    let outcome = agree(src, &[]);
    assert_eq!(
        rendered(&outcome),
        vec!["11 12 13 21 22 23", "21 22 23", "anaz", "3.0 1.5"]
    );
}

#[test]
fn test_references_and_slices() {
    let src = r#"
entero m[2, 2], a
a <- 1
duplicar(a)
duplicar(a)
m[1, 1] <- 1
m[1, 2] <- 2
m[2, 1] <- 3
m[2, 2] <- 4
invertir(m[2])
duplicar(m[1, 2])
escribir(a, m)

procedimiento duplicar(entero ref x)
    sumar(x, x)
finprocedimiento

procedimiento sumar(entero ref destino, entero valor)
    destino <- destino + valor
finprocedimiento

procedimiento invertir(entero ref fila[2])
    entero t
    t <- fila[1]
    fila[1] <- fila[2]
    fila[2] <- t
finprocedimiento
"#;
    let outcome = agree(src, &[]);
    assert_eq!(rendered(&outcome), vec!["4", "1 4 4 3"]);
}

#[test]
fn test_by_value_array_is_copied() {
    let src = r#"
entero v[2]
v[1] <- 1
v[2] <- 2
cambiar(v)
escribir(v)

procedimiento cambiar(entero w[2])
    w[1] <- 99
    escribir(w)
finprocedimiento
"#;
    let outcome = agree(src, &[]);
    assert_eq!(rendered(&outcome), vec!["99 2", "1 2"]);
}

#[test]
fn test_recursive_functions() {
    let src = r#"
entero n
n <- fib(10) + factorial(5)
escribir(n)

funcion fib(entero k) : entero
    si k < 2 entonces
        retornar k
    finsi
    retornar fib(k - 1) + fib(k - 2)
finfuncion

funcion factorial(entero k) : entero
    si k <= 1 entonces
        retornar 1
    sino
        retornar k * factorial(k - 1)
    finsi
finfuncion
"#;
    let outcome = agree(src, &[]);
    assert_eq!(rendered(&outcome), vec!["175"]);
}

#[test]
fn test_input() {
    let src = r#"
entero n, v[3], i
real media
caracter nombre[10]
leer(nombre, n)
para i <- 1 hasta n
    leer(v[i])
finpara
media <- v[1] + v[2] + v[3]
media <- media / 3.0
escribir(nombre, media)
"#;
    let input = [
        Value::text("eva"),
        Value::Integer(3),
        Value::Integer(4),
        Value::Integer(5),
        Value::Integer(9),
    ];
    let outcome = agree(src, &input);
    assert_eq!(rendered(&outcome), vec!["eva", "6.0"]);
}

#[test]
fn test_index_fault_agrees() {
    let src = "entero v[3], i\npara i <- 1 hasta 4\n    v[i] <- i\n    escribir(i)\nfinpara";
    let outcome = agree(src, &[]);
    assert_eq!(outcome.output.len(), 3);
    assert!(matches!(
        outcome.error,
        Some(InterpError::Fault(VmError::IndexOutOfBounds { index: 4, size: 3, .. }))
    ));
}

#[test]
fn test_arithmetic_fault_agrees() {
    let outcome = agree("entero a, b\nb <- 0\nescribir(1)\na <- 5 div b", &[]);
    assert!(matches!(
        outcome.error,
        Some(InterpError::Fault(VmError::Arithmetic(_)))
    ));
}

#[test]
fn test_missing_return_agrees() {
    let src = r#"
entero a
a <- f(0)

funcion f(entero k) : entero
    si k > 0 entonces
        retornar k
    finsi
finfuncion
"#;
    let outcome = agree(src, &[]);
    assert_eq!(
        outcome.error,
        Some(InterpError::Fault(VmError::MissingReturn {
            module: "f".to_string()
        }))
    );
}

#[test]
fn test_input_exhausted_agrees() {
    let outcome = agree("entero a, b\nleer(a, b)\nescribir(a)", &[Value::Integer(1)]);
    assert_eq!(outcome.error, Some(InterpError::InputExhausted));
}

#[test]
fn test_interpret_entry_point() {
    let output = pseudoc::interpret("entero a\nleer(a)\nescribir(a * 2)", [Value::Integer(21)])
        .expect("program runs");
    assert_eq!(output, vec![Value::Integer(42)]);
}
