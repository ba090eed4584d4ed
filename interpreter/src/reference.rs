use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use reflox_core::Token;

use crate::ast::Expr;
use crate::env::Env;
use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::limits::MAX_REFERENCE_HOPS;
use crate::value::Value;

/// The value of `&target`: a handle to a storage location.
///
/// The target is re-evaluated on every read and write, in the environment that was current when
/// the reference was made. A reference to `a[i]` therefore follows later changes of `a` and `i`.
pub(crate) struct Reference {
    operator: Token,
    target: Rc<Expr>,
    env: Env,
}

impl Reference {
    pub(crate) fn new(operator: Token, target: Rc<Expr>, env: Env) -> Self {
        Reference {
            operator,
            target,
            env,
        }
    }
}

impl Debug for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ref line {}>", self.operator.line)
    }
}

impl Interpreter {
    /// Follows references until a plain value is reached.
    pub(crate) fn dereference(&mut self, value: Value) -> Result<Value, Error> {
        let mut value = value;
        let mut hops = 0;

        while let Value::Reference(reference) = value {
            if hops == MAX_REFERENCE_HOPS {
                return Err(Error::runtime_error(
                    &reference.operator,
                    "Reference cycle detected.",
                ));
            }
            hops += 1;

            let target = Rc::clone(&reference.target);
            value = self.with_env(Rc::clone(&reference.env), |interpreter| {
                interpreter.evaluate_raw(&target)
            })?;
        }

        Ok(value)
    }

    /// Stores `value` into the location `reference` points at.
    pub(crate) fn assign_through(
        &mut self,
        reference: &Reference,
        value: Value,
        hops: usize,
    ) -> Result<(), Error> {
        if hops >= MAX_REFERENCE_HOPS {
            return Err(Error::runtime_error(
                &reference.operator,
                "Reference cycle detected.",
            ));
        }

        let target = Rc::clone(&reference.target);
        self.with_env(Rc::clone(&reference.env), |interpreter| {
            match target.as_ref() {
                Expr::Variable { name } => interpreter.store_variable(name, value, hops + 1),
                Expr::Get { object, name } => {
                    let object = interpreter.evaluate(object)?;
                    interpreter.set_property(object, name, value)
                }
                Expr::Subscript {
                    object,
                    bracket,
                    index,
                } => {
                    let object = interpreter.evaluate(object)?;
                    let index = interpreter.evaluate(index)?;
                    interpreter.set_element(object, bracket, index, value)
                }
                _ => Err(Error::runtime_error(
                    &reference.operator,
                    "Invalid reference target.",
                )),
            }
        })
    }
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
        assert_eq!(expected, out);
    }

    #[test]
    fn test_variable_alias() {
        expect_output("var a = 1\nvar b = &a\nb = 2\nprint(a)", "2\n");
        expect_output("var a = 1\nvar b = &a\na = 3\nprint(b)", "3\n");
        expect_output("var a = 1\nvar b = &a\nvar c = &b\nc = 4\nprint(a)", "4\n");
        // an alias of an alias is still an alias
        expect_output("var a = 1\nvar b = &a\nvar c = b\nc = 5\nprint(a)", "5\n");
    }

    #[test]
    fn test_reference_display_and_copy() {
        // Anything other than a declaration reads through the reference.
        expect_output("var a = [1]\nvar b = &a\nprint(b)\nprint(len(b))", "[1]\n1\n");
        expect_output("var a = 1\nvar b = &a\nprint(b + 1)", "2\n");
        expect_output("var a = 1\nvar r = [&a]\na = 2\nprint(r)", "[1]\n");
    }

    #[test]
    fn test_property_and_element_references() {
        let src = "\
class Box {}
var box = Box()
box.value = 1
var r = &box.value
r = 2
print(box.value)
box.value = 3
print(r)
";
        expect_output(src, "2\n3\n");

        let src = "\
var arr = [1, 2, 3]
var i = 0
var r = &arr[i]
r = 10
i = 2
r = 30
print(arr)
";
        expect_output(src, "[10, 2, 30]\n");
    }

    #[test]
    fn test_references_in_functions() {
        let src = "\
fun make() {
  var hidden = \"inside\"
  return &hidden
}
var r = make()
print(r)
";
        expect_output(src, "inside\n");

        let src = "\
var a = 1
var b = 2
var ra = &a
var rb = &b
fun swapRefs() {
  var x = ra
  var y = rb
  var tmp = a
  x = b
  y = tmp
}
swapRefs()
print(a)
print(b)
";
        expect_output(src, "2\n1\n");
    }

    #[test]
    fn test_reference_cycle() {
        let (_, result) = run("var a = 1\na = &a\nprint(a)");
        // Assignment reads through the reference on the right, so `a` keeps a plain value.
        assert!(result.is_ok());

        let (_, result) = run("var a = &a\nprint(a)");
        match result {
            Err(RunError::Runtime(Error::RuntimeError { msg, .. })) => {
                assert_eq!("Reference cycle detected.", msg)
            }
            other => panic!("Expecting a cycle error, found {:?}", other),
        }

        let (_, result) = run("var a = &a\na = 1");
        match result {
            Err(RunError::Runtime(Error::RuntimeError { msg, .. })) => {
                assert_eq!("Reference cycle detected.", msg)
            }
            other => panic!("Expecting a cycle error, found {:?}", other),
        }
    }
}
