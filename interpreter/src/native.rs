use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use reflox_core::Token;

use crate::callable::{Callable, Native, NativeFn};
use crate::env::Environment;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::value::Value;

const NATIVES: [(&str, NativeFn, usize); 11] = [
    ("print", print, 1),
    ("put", put, 1),
    ("input", input, 0),
    ("clock", clock, 0),
    ("str", stringify, 1),
    ("num", parse_num, 1),
    ("round", round, 1),
    ("len", len, 1),
    ("readFile", read_file, 1),
    ("writeFile", write_file, 2),
    ("appendFile", append_file, 2),
];

/// Defines every native function in `globals`, plus an empty `argv`.
pub(crate) fn install(globals: &mut Environment) {
    for (name, func, arity) in NATIVES {
        globals.define(name, native_value(func, name, arity));
    }
    globals.define("argv", Value::array(Vec::new()));
}

pub(crate) fn native_value(func: NativeFn, name: &str, arity: usize) -> Value {
    Value::Callable(Callable::Native(Rc::new(Native::new(func, name, arity))))
}

fn write_out(interpreter: &mut Interpreter, paren: &Token, text: &str) -> Result<Value, Error> {
    let mut stdout = interpreter.stdout.borrow_mut();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|err| Error::runtime_error(paren, &format!("Could not write output: {}.", err)))?;
    Ok(Value::Nil)
}

fn print(interpreter: &mut Interpreter, paren: &Token, args: &[Value]) -> Result<Value, Error> {
    write_out(interpreter, paren, &format!("{}\n", args[0]))
}

fn put(interpreter: &mut Interpreter, paren: &Token, args: &[Value]) -> Result<Value, Error> {
    write_out(interpreter, paren, &args[0].to_string())
}

fn input(_: &mut Interpreter, _: &Token, _: &[Value]) -> Result<Value, Error> {
    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => Ok(Value::Nil),
        Ok(_) => {
            let len = line.trim_end_matches(|c| c == '\n' || c == '\r').len();
            line.truncate(len);
            Ok(Value::from(line))
        }
    }
}

fn clock(_: &mut Interpreter, _: &Token, _: &[Value]) -> Result<Value, Error> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Num(since_epoch))
}

fn stringify(_: &mut Interpreter, _: &Token, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::from(args[0].to_string()))
}

fn parse_num(_: &mut Interpreter, _: &Token, args: &[Value]) -> Result<Value, Error> {
    match args[0].to_string().trim().parse::<f64>() {
        Ok(num) => Ok(Value::Num(num)),
        Err(_) => Ok(Value::Nil),
    }
}

fn round(_: &mut Interpreter, paren: &Token, args: &[Value]) -> Result<Value, Error> {
    match args[0] {
        Value::Num(num) => Ok(Value::Num(num.trunc())),
        _ => Err(Error::runtime_error(
            paren,
            "Argument to 'round' must be a number.",
        )),
    }
}

fn len(_: &mut Interpreter, _: &Token, args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Str(string) => Ok(Value::from(string.chars().count())),
        Value::Array(array) => Ok(Value::from(array.borrow().len())),
        _ => Ok(Value::Nil),
    }
}

fn read_file(_: &mut Interpreter, _: &Token, args: &[Value]) -> Result<Value, Error> {
    match fs::read_to_string(args[0].to_string()) {
        Ok(contents) => Ok(Value::from(contents)),
        Err(_) => Ok(Value::Nil),
    }
}

fn write_file(_: &mut Interpreter, _: &Token, args: &[Value]) -> Result<Value, Error> {
    let written = fs::write(args[0].to_string(), args[1].to_string());
    Ok(Value::Bool(written.is_ok()))
}

fn append_file(_: &mut Interpreter, _: &Token, args: &[Value]) -> Result<Value, Error> {
    let appended = OpenOptions::new()
        .append(true)
        .create(true)
        .open(args[0].to_string())
        .and_then(|mut file| file.write_all(args[1].to_string().as_bytes()));
    Ok(Value::Bool(appended.is_ok()))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::env;
    use std::fs;
    use std::rc::Rc;
    use std::str;

    use crate::error::{Error, RunError};
    use crate::interpreter::Interpreter;

    fn run(src: &str) -> (String, Result<(), RunError>) {
        let output: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let mut interpreter = Interpreter::new(output.clone());
        let result = interpreter.run(src);
        let out = String::from(str::from_utf8(&output.borrow()).unwrap());
        (out, result)
    }

    fn expect_output(src: &str, expected: &str) {
        let (out, result) = run(src);
        if let Err(err) = result {
            panic!("Not expecting any error, found '{}'", err);
        }
        assert_eq!(expected, out, "source: {}", src);
    }

    #[test]
    fn test_print_and_put() {
        expect_output("put(1)\nput(\"a\")\nprint(nil)", "1anil\n");
        expect_output("print(print)", "<native fn>\n");
        expect_output("print(print(1))", "1\nnil\n");
    }

    #[test]
    fn test_conversions() {
        let tests = [
            ("print(str(1.5) + \"!\")", "1.5!\n"),
            ("print(str([1, \"a\"]))", "[1, a]\n"),
            ("print(num(\"42\") + 1)", "43\n"),
            ("print(num(\" 2.5 \"))", "2.5\n"),
            ("print(num(\"abc\"))", "nil\n"),
            ("print(num(7))", "7\n"),
            ("print(round(3.7))", "3\n"),
            ("print(round(-3.7))", "-3\n"),
            ("print(len(\"héllo\"))", "5\n"),
            ("print(len([1, 2, 3]))", "3\n"),
            ("print(len(1))", "nil\n"),
        ];

        for (src, expected) in tests {
            expect_output(src, expected);
        }
    }

    #[test]
    fn test_round_requires_number() {
        let (_, result) = run("round(\"1\")");
        match result {
            Err(RunError::Runtime(Error::RuntimeError { msg, .. })) => {
                assert_eq!("Argument to 'round' must be a number.", msg)
            }
            other => panic!("Expecting a runtime error, found {:?}", other),
        }
    }

    #[test]
    fn test_clock_is_a_number() {
        expect_output("print(clock() > 0)", "true\n");
    }

    #[test]
    fn test_files() {
        let path = env::temp_dir().join(format!("reflox-native-{}.txt", std::process::id()));
        let path = path.to_str().unwrap().replace('\\', "/");

        let src = format!(
            "\
print(writeFile(\"{path}\", \"one\"))
print(appendFile(\"{path}\", 2))
print(readFile(\"{path}\"))
"
        );
        expect_output(&src, "true\ntrue\none2\n");
        fs::remove_file(&path).unwrap();

        expect_output(&format!("print(readFile(\"{path}\"))"), "nil\n");
    }

    #[test]
    fn test_argv_defaults_to_empty() {
        expect_output("print(argv)", "[]\n");
    }
}
