use pretty_assertions::assert_eq;
use quill::{ProgramFile, Value, VM};
use quill_vm::VMIo;

fn run(json: &str, args: Vec<Value>) -> Result<Value, quill::VMError> {
    let vm = VM::new().expect("Failed to start vm");
    let file = ProgramFile::parse(json)
        .and_then(|f| f.compile())
        .expect("Failed to compile");
    file.run(&vm, VMIo::default(), args)
}

macro_rules! test_demo {
    ($($name:ident $file:literal ($($arg:expr),*) = $expected:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let result = run(include_str!(concat!("../demos/", $file)), vec![$($arg.into()),*]);
                assert_eq!(result, $expected, "Failed to run {}", $file)
            }
        )*
    };
}

test_demo! {
    sum "sum.json" () = Ok(5.into()),
    fib_10 "fib.json" (10) = Ok(55.into()),
    fib_80 "fib.json" (80) = Ok(23_416_728_348_467_685i64.into()),
    pipeline "pipeline.json" () = Ok(6.into()),
}

#[test]
fn failure_reports_source_location() {
    let json = r#"{
        "programs": {
            "main": {
                "source": "div.q",
                "instructions": [
                    {"op": "load", "value": 1},
                    {"op": "load", "value": 0, "line": 7, "column": 9},
                    {"op": "binary", "operation": "div"}
                ]
            }
        }
    }"#;
    let err = run(json, vec![]).unwrap_err();
    assert_eq!(err.trail().len(), 1);
    assert_eq!(err.trail()[0].to_string(), "at main (div.q:7:9) [ip 2]");
}

#[test]
fn inspect_lists_every_program() {
    let file = ProgramFile::parse(include_str!("../demos/fib.json"))
        .and_then(|f| f.compile())
        .unwrap();
    let listing = file.disassemble();
    assert!(listing.contains("program fib"));
    assert!(listing.contains("program main"));
    assert!(listing.contains("call self/1"));
    assert!(listing.contains("call fib/1 permanent"));
}

#[test]
fn captured_output() {
    let json = r#"{
        "programs": {
            "main": {
                "instructions": [
                    {"op": "load", "value": [1, "two"]},
                    {"op": "print"}
                ]
            }
        }
    }"#;
    let vm = VM::new().unwrap();
    let file = ProgramFile::parse(json).and_then(|f| f.compile()).unwrap();
    let (io, out, _) = VMIo::captured("");
    assert_eq!(file.run(&vm, io, vec![]), Ok(Value::None));
    assert_eq!(out.contents(), "[1, two]\n");
}
