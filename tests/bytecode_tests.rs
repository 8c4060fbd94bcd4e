//! Bytecode generation tests

use pretty_assertions::assert_eq;
use pseudoc::bytecode::{AddressRange, Instruction, Program, Slot};
use pseudoc::types::AtomicKind;
use pseudoc::value::Value;

use Instruction::*;

fn compile(src: &str) -> Program {
    match pseudoc::compile(src) {
        Ok(program) => program,
        Err(errors) => panic!("compilation failed: {errors:#?}"),
    }
}

fn load(name: &str, indexes: usize) -> Instruction {
    Load {
        name: name.to_string(),
        indexes,
    }
}

fn store(name: &str, indexes: usize) -> Instruction {
    Store {
        name: name.to_string(),
        indexes,
    }
}

fn int(n: i64) -> Instruction {
    Push(Value::Integer(n))
}

#[test]
fn test_empty_program() {
    let program = compile("");
    assert!(program.is_empty());
    assert_eq!(program.main(), Some("principal"));
    assert_eq!(program.range("principal"), Some(AddressRange { start: 0, end: 0 }));
}

#[test]
fn test_declarations_generate_nothing() {
    let program = compile("entero a, v[3]\nreal m[2, 2]");
    assert!(program.is_empty());
    let template = program.template("principal").unwrap();
    assert_eq!(template.slots["a"], Slot::Scalar(AtomicKind::Integer));
    assert_eq!(
        template.slots["m"],
        Slot::Vector {
            kind: AtomicKind::Real,
            dims: vec![2, 2]
        }
    );
}

#[test]
fn test_assignment_is_postfix() {
    let program = compile("entero a, v[3]\na <- 2\nv[a] <- a * 3");
    assert_eq!(
        program.code,
        vec![
            int(2),
            store("a", 0),
            load("a", 0),
            load("a", 0),
            int(3),
            Mul,
            store("v", 1),
        ]
    );
    assert_eq!(program.line_at(0), Some(2));
    assert_eq!(program.line_at(2), Some(3));
    assert_eq!(program.line_for(4), Some(3));
}

#[test]
fn test_if_without_else() {
    let program = compile("entero a\nsi a > 0 entonces\n    a <- 0\nfinsi\na <- 1");
    assert_eq!(
        program.code,
        vec![
            load("a", 0),
            int(0),
            Gt,
            JumpIfFalse(6),
            int(0),
            store("a", 0),
            int(1),
            store("a", 0),
        ]
    );
}

#[test]
fn test_if_with_only_else() {
    let program = compile("entero a\nsi a > 0 entonces\nsino\n    a <- 0\nfinsi");
    assert_eq!(
        program.code,
        vec![load("a", 0), int(0), Gt, JumpIfTrue(6), int(0), store("a", 0)]
    );
}

#[test]
fn test_if_with_both_branches() {
    let program = compile("entero a\nsi a > 0 entonces\n    a <- 1\nsino\n    a <- 2\nfinsi");
    assert_eq!(
        program.code,
        vec![
            load("a", 0),
            int(0),
            Gt,
            JumpIfFalse(7),
            int(1),
            store("a", 0),
            Jump(9),
            int(2),
            store("a", 0),
        ]
    );
}

#[test]
fn test_empty_if_generates_nothing() {
    let program = compile("entero a\nsi a > 0 entonces\n    si a > 1 entonces\n    finsi\nfinsi");
    assert!(program.is_empty());
}

#[test]
fn test_while_loop() {
    let program = compile("entero a\nmientras a < 3\n    a <- a + 1\nfinmientras");
    assert_eq!(
        program.code,
        vec![
            load("a", 0),
            int(3),
            Lt,
            JumpIfFalse(9),
            load("a", 0),
            int(1),
            Add,
            store("a", 0),
            Jump(0),
        ]
    );
}

#[test]
fn test_until_loop_maps_its_condition() {
    let program = compile("entero a\nrepetir\n    a <- a + 1\nhasta que a = 3");
    assert_eq!(
        program.code,
        vec![
            load("a", 0),
            int(1),
            Add,
            store("a", 0),
            load("a", 0),
            int(3),
            Eq,
            JumpIfFalse(0),
        ]
    );
    // the body's first statement owns address 0
    assert_eq!(program.line_at(0), Some(3));
    assert_eq!(program.line_at(4), Some(4));
    assert_eq!(program.address_of_line(2), Some((2, 0)));
}

#[test]
fn test_for_loop_layout() {
    let program = compile("entero i\npara i <- 1 hasta 3\n    escribir(i)\nfinpara");
    assert_eq!(
        program.code,
        vec![
            int(1),
            store("i", 0),
            int(3),
            SetBound(0),
            load("i", 0),
            LoadBound(0),
            Gt,
            JumpIfTrue(15),
            load("i", 0),
            Write { cells: 1 },
            load("i", 0),
            int(1),
            Add,
            store("i", 0),
            Jump(4),
        ]
    );
    assert_eq!(program.line_at(4), Some(2));
    assert_eq!(program.line_at(8), Some(3));
}

#[test]
fn test_nested_for_loops_use_separate_bounds() {
    let src = "entero i, j\npara i <- 1 hasta 2\n    para j <- 1 hasta 2\n    finpara\nfinpara";
    let program = compile(src);
    let bounds: Vec<usize> = program
        .code
        .iter()
        .filter_map(|i| match i {
            SetBound(slot) => Some(*slot),
            _ => None,
        })
        .collect();
    assert_eq!(bounds, vec![0, 1]);
}

#[test]
fn test_write_expands_arrays() {
    let program = compile("entero m[2, 2]\nescribir(m[2])");
    assert_eq!(
        program.code,
        vec![
            int(2),
            int(1),
            load("m", 2),
            int(2),
            int(2),
            load("m", 2),
            Write { cells: 2 },
        ]
    );
}

#[test]
fn test_read_then_store() {
    let program = compile("entero v[3]\nleer(v[2])");
    assert_eq!(
        program.code,
        vec![
            int(2),
            Read {
                name: "v".to_string(),
                ty: pseudoc::Type::INTEGER
            },
            store("v", 1),
        ]
    );
}

#[test]
fn test_array_copy() {
    let program = compile("entero m[3, 2], fila[2]\nfila <- m[3]");
    assert_eq!(
        program.code,
        vec![
            int(3),
            CopyArray {
                target: "fila".to_string(),
                target_indexes: 0,
                source: "m".to_string(),
                source_indexes: 1,
            },
        ]
    );
}

#[test]
fn test_call_protocol_and_module_layout() {
    let src = r#"
entero a, v[2]
p(a, v, 1)
procedimiento p(entero ref x, entero w[2], real r)
    x <- 0
finprocedimiento
"#;
    let program = compile(src);
    assert_eq!(
        program.code[..6],
        [
            Alloc {
                module: "p".to_string()
            },
            BindRef {
                param: "x".to_string(),
                source: "a".to_string(),
                indexes: 0,
            },
            InitArray {
                param: "w".to_string(),
                source: "v".to_string(),
                indexes: 0,
            },
            int(1),
            StoreParam {
                param: "r".to_string()
            },
            Invoke {
                module: "p".to_string()
            },
        ]
    );
    assert_eq!(program.range("principal"), Some(AddressRange { start: 0, end: 6 }));
    assert_eq!(program.range("p"), Some(AddressRange { start: 6, end: 9 }));
    assert_eq!(program.code[8], Return);
    assert_eq!(program.module_at(7), Some("p"));

    let template = program.template("p").unwrap();
    assert_eq!(template.params, vec!["x", "w", "r"]);
    assert_eq!(template.slots["x"], Slot::Reference);
}

#[test]
fn test_function_ends_with_missing_return() {
    let src = r#"
entero a
a <- f()
funcion f() : entero
    retornar 1
finfuncion
"#;
    let program = compile(src);
    let range = program.range("f").unwrap();
    assert_eq!(
        program.code[range.start..range.end],
        [
            int(1),
            Return,
            MissingReturn {
                module: "f".to_string()
            },
        ]
    );
}

#[test]
fn test_breakpoint_lines_move_forward() {
    let program = compile("entero a\n\n// nothing\na <- 1\n\na <- 2");
    assert_eq!(program.address_of_line(1), Some((4, 0)));
    assert_eq!(program.address_of_line(5), Some((6, 2)));
    assert_eq!(program.address_of_line(7), None);
}
