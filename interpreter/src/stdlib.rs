use ahash::AHashMap;
use reflox_core::Token;

use crate::callable::{Class, Instance};
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::native::native_value;
use crate::value::Value;

const FILE: &str = "\
class File {
  init(path) {
    this.path = path
  }

  read() {
    return readFile(this.path)
  }

  write(data) {
    return writeFile(this.path, data)
  }

  append(data) {
    return appendFile(this.path, data)
  }
}
";

// Linear congruential generator with the glibc constants, seeded from the clock on import.
const RANDOM: &str = "\
import \"std:Bitwise\"

var _stdRandomSeed = clock()

class Random {
  class seed(number) {
    _stdRandomSeed = number
  }

  class random() {
    _stdRandomSeed = (1103515245 * _stdRandomSeed + 12345) % 2147483648
    return Bitwise.rightShift(_stdRandomSeed, 0)
  }

  class inRange(min, max) {
    return min + round((max - min + 1) * this.random() / 2147483648)
  }
}
";

/// Loads the standard library module `std:<name>` into the global scope.
pub(crate) fn import(interpreter: &mut Interpreter, keyword: &Token, name: &str) -> Result<(), Error> {
    match name {
        "File" => interpreter.run_module(FILE, keyword, "std:File"),
        "Random" => interpreter.run_module(RANDOM, keyword, "std:Random"),
        "Bitwise" => {
            interpreter.define_global("Bitwise", bitwise());
            Ok(())
        }
        "all" => {
            interpreter.define_global("Bitwise", bitwise());
            interpreter.run_module(FILE, keyword, "std:File")?;
            interpreter.run_module(RANDOM, keyword, "std:Random")
        }
        _ => Err(Error::runtime_error(
            keyword,
            &format!("'std:{}' is not a standard library module.", name),
        )),
    }
}

// `Bitwise` is a plain instance whose fields hold natives, so `Bitwise.leftShift(1, 2)` is an
// ordinary property read followed by a call.
fn bitwise() -> Value {
    let class = Class::new("Bitwise", None, AHashMap::new(), None);
    let instance = Instance::new(class);
    {
        let mut fields = instance.borrow_mut();
        fields.set("leftShift", native_value(left_shift, "leftShift", 2));
        fields.set("rightShift", native_value(right_shift, "rightShift", 2));
    }
    Value::Instance(instance)
}

// Shifts work on 32-bit integers. Out of range operands saturate and the shift amount wraps.
fn shift_operands(paren: &Token, args: &[Value]) -> Result<(i32, u32), Error> {
    match (&args[0], &args[1]) {
        (Value::Num(value), Value::Num(amount)) => Ok((*value as i32, *amount as i32 as u32)),
        _ => Err(Error::runtime_error(paren, "Operands must be numbers.")),
    }
}

fn left_shift(_: &mut Interpreter, paren: &Token, args: &[Value]) -> Result<Value, Error> {
    let (value, amount) = shift_operands(paren, args)?;
    Ok(Value::from(value.wrapping_shl(amount)))
}

fn right_shift(_: &mut Interpreter, paren: &Token, args: &[Value]) -> Result<Value, Error> {
    let (value, amount) = shift_operands(paren, args)?;
    Ok(Value::from(value.wrapping_shr(amount)))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
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

    fn expect_runtime_error(src: &str, expected: &str) {
        match run(src).1 {
            Err(RunError::Runtime(Error::RuntimeError { msg, .. })) => assert_eq!(expected, msg),
            other => panic!("Expecting a runtime error, found {:?}", other),
        }
    }

    #[test]
    fn test_bitwise() {
        let src = "\
import \"std:Bitwise\"
print(Bitwise)
print(Bitwise.leftShift(1, 4))
print(Bitwise.rightShift(-16, 2))
print(Bitwise.leftShift(1, 31))
print(Bitwise.rightShift(7.9, 1))
";
        expect_output(src, "<Bitwise instance>\n16\n-4\n-2147483648\n3\n");
        expect_runtime_error(
            "import \"std:Bitwise\"\nBitwise.leftShift(\"1\", 2)",
            "Operands must be numbers.",
        );
    }

    #[test]
    fn test_random() {
        let src = "\
import \"std:Random\"
Random.seed(1)
print(Random.random())
Random.seed(1)
print(Random.inRange(1, 6))
var x = Random.inRange(10, 20)
print(x >= 10 and x <= 20)
";
        expect_output(src, "1103527590\n4\ntrue\n");
    }

    #[test]
    fn test_file() {
        let path = std::env::temp_dir().join(format!("reflox-stdlib-{}.txt", std::process::id()));
        let path = path.to_str().unwrap().replace('\\', "/");

        let src = format!(
            "\
import \"std:File\"
var file = File(\"{path}\")
print(file.write(\"a\"))
print(file.append(\"b\"))
print(file.read())
"
        );
        expect_output(&src, "true\ntrue\nab\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_all() {
        expect_output(
            "import \"std:all\"\nprint(File)\nprint(Random)\nprint(Bitwise)",
            "File\nRandom\n<Bitwise instance>\n",
        );
    }

    #[test]
    fn test_unknown_module() {
        expect_runtime_error(
            "import \"std:Missing\"",
            "'std:Missing' is not a standard library module.",
        );
        expect_runtime_error("import 1", "Module name must be a string.");
        expect_runtime_error(
            "import \"does/not/exist.lox\"",
            "Could not import module 'does/not/exist.lox'.",
        );
    }
}
