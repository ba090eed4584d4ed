use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use ahash::AHashSet;
use reflox_core::Literal;

use crate::callable::{Callable, Instance};
use crate::reference::Reference;
use crate::stack::ensure_sufficient_stack;

pub(crate) type Array = Rc<RefCell<Elements>>;

/// The storage behind an array value.
///
/// Dropping a deeply nested array releases the inner arrays one at a time instead of recursing,
/// so `a = [a]` in a long loop cannot exhaust the stack when the outermost array goes away.
/// Arrays nested through instances or closures are still released recursively.
#[derive(Debug, Default)]
pub(crate) struct Elements(Vec<Value>);

impl Deref for Elements {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Elements {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Drop for Elements {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.0);
        while let Some(value) = pending.pop() {
            if let Value::Array(array) = value {
                // Only the last handle owns the elements, shared arrays are merely released.
                if let Ok(cell) = Rc::try_unwrap(array) {
                    pending.append(&mut cell.into_inner().0);
                }
            }
        }
    }
}

type ArrayPtr = *const RefCell<Elements>;

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Callable(Callable),
    Instance(Rc<RefCell<Instance>>),
    Array(Array),
    Reference(Rc<Reference>),
    Str(Rc<String>),
    Num(f64),
    Bool(bool),
    Nil,
}

impl Value {
    pub(crate) fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub(crate) fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(Elements(elements))))
    }

    fn write_array(
        array: &Array,
        seen: &mut AHashSet<ArrayPtr>,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        // An array can contain itself through `a + a`.
        if !seen.insert(Rc::as_ptr(array)) {
            return write!(f, "[...]");
        }

        write!(f, "[")?;
        for (i, element) in array.borrow().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match element {
                Value::Array(inner) => {
                    ensure_sufficient_stack(|| Value::write_array(inner, seen, f))?
                }
                other => write!(f, "{}", other)?,
            }
        }
        seen.remove(&Rc::as_ptr(array));
        write!(f, "]")
    }

    // Structural comparison. A pair of arrays already being compared further up counts as equal,
    // which keeps self-containing arrays from recursing forever.
    fn arrays_equal(
        lhs: &Array,
        rhs: &Array,
        comparing: &mut AHashSet<(ArrayPtr, ArrayPtr)>,
    ) -> bool {
        if Rc::ptr_eq(lhs, rhs) {
            return true;
        }

        let (left, right) = (lhs.borrow(), rhs.borrow());
        if left.len() != right.len() {
            return false;
        }

        let pair = (Rc::as_ptr(lhs), Rc::as_ptr(rhs));
        if !comparing.insert(pair) {
            return true;
        }

        let equal = left.iter().zip(right.iter()).all(|elements| match elements {
            (Value::Array(lhs), Value::Array(rhs)) => {
                ensure_sufficient_stack(|| Value::arrays_equal(lhs, rhs, comparing))
            }
            (lhs, rhs) => lhs == rhs,
        });
        comparing.remove(&pair);
        equal
    }
}

impl From<Literal> for Value {
    fn from(value: Literal) -> Self {
        match value {
            Literal::Str(val) => Value::Str(Rc::new(val)),
            Literal::Num(val) => Value::Num(val),
            Literal::Bool(val) => Value::Bool(val),
            Literal::Nil => Value::Nil,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Callable(lhs), Value::Callable(rhs)) => lhs.ptr_eq(rhs),
            (Value::Instance(lhs), Value::Instance(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Reference(lhs), Value::Reference(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::Array(lhs), Value::Array(rhs)) => Value::arrays_equal(lhs, rhs, &mut AHashSet::new()),
            (Value::Str(lhs), Value::Str(rhs)) => lhs == rhs,
            (Value::Num(lhs), Value::Num(rhs)) => lhs == rhs,
            (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::new(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::new(String::from(value)))
    }
}

macro_rules! impl_from_num_for_value {
    ( $( $t:ident )* ) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Value {
                    Value::Num(n as f64)
                }
            }
        )*
    }
}

impl_from_num_for_value!(u8 i8 u16 i16 u32 i32 u64 i64 usize isize f32 f64);

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Callable(val) => write!(f, "{}", val),
            Value::Instance(instance) => write!(f, "{}", RefCell::borrow(instance)),
            Value::Array(array) => Value::write_array(array, &mut AHashSet::new(), f),
            Value::Reference(_) => write!(f, "<ref>"),
            Value::Str(val) => write!(f, "{}", val),
            // Integral numbers print without a fractional part, `{}` on f64 already does that.
            Value::Num(val) => write!(f, "{}", val),
            Value::Bool(val) => write!(f, "{}", val),
            Value::Nil => write!(f, "nil"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(Value::from(0).is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!("3", Value::from(3.0).to_string());
        assert_eq!("2.5", Value::from(2.5).to_string());
        assert_eq!("-1", Value::from(-1).to_string());
        assert_eq!("nil", Value::Nil.to_string());
        assert_eq!("true", Value::from(true).to_string());
        assert_eq!("hi", Value::from("hi").to_string());

        let inner = Value::array(vec![Value::from(2), Value::from("x")]);
        let outer = Value::array(vec![Value::from(1), inner, Value::Nil]);
        assert_eq!("[1, [2, x], nil]", outer.to_string());
        assert_eq!("[]", Value::array(vec![]).to_string());
    }

    #[test]
    fn test_self_containing_array_display() {
        let array = Value::array(vec![Value::from(1)]);
        if let Value::Array(inner) = &array {
            inner.borrow_mut().push(array.clone());
        }
        assert_eq!("[1, [...]]", array.to_string());
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::from(false));
        assert_ne!(Value::from(0), Value::from("0"));
        assert_eq!(Value::from("ab"), Value::from(String::from("ab")));

        let lhs = Value::array(vec![Value::from(1), Value::from("a")]);
        let rhs = Value::array(vec![Value::from(1), Value::from("a")]);
        assert_eq!(lhs, rhs);
        assert_ne!(lhs, Value::array(vec![Value::from(1)]));
    }

    fn self_containing(elements: Vec<Value>) -> Value {
        let array = Value::array(elements);
        if let Value::Array(inner) = &array {
            inner.borrow_mut().push(array.clone());
        }
        array
    }

    #[test]
    fn test_self_containing_array_equality() {
        let lhs = self_containing(vec![Value::from(1)]);
        let rhs = self_containing(vec![Value::from(1)]);
        assert_eq!(lhs, rhs);
        assert_eq!(lhs, lhs.clone());
        assert_ne!(lhs, self_containing(vec![Value::from(2)]));
        assert_ne!(lhs, self_containing(vec![]));
    }

    #[test]
    fn test_deeply_nested_arrays() {
        let nest = |depth: usize| {
            let mut array = Value::array(vec![]);
            for _ in 0..depth {
                array = Value::array(vec![array]);
            }
            array
        };

        let lhs = nest(200_000);
        let rhs = nest(200_000);
        assert_eq!(lhs, rhs);
        assert_ne!(lhs, nest(199_999));

        let shallow = nest(2);
        assert_eq!("[[[]]]", shallow.to_string());
        assert!(lhs.to_string().starts_with("[[[["));

        // Dropping the outermost handle releases the whole nest.
        drop(lhs);
        drop(rhs);
    }
}
